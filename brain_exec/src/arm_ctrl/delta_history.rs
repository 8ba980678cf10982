//! Fixed depth history of per-channel deltas

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use std::collections::VecDeque;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// The last `depth` deltas of a group of channels, newest first.
///
/// Exactly one delta is pushed per channel every cycle, zero if there was no fresh reading, so
/// the history always spans the same number of cycles.
#[derive(Debug, Clone)]
pub struct DeltaHistory {
    rings: Vec<VecDeque<f64>>,
    depth: usize,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl DeltaHistory {
    /// Create a history of zeros. The depth is at least one.
    pub fn new(num_channels: usize, depth: usize) -> Self {
        let depth = depth.max(1);
        let mut ring = VecDeque::with_capacity(depth);
        ring.resize(depth, 0.0);

        Self {
            rings: vec![ring; num_channels],
            depth,
        }
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Push one delta per channel, dropping the oldest.
    pub fn push(&mut self, deltas: &[f64]) {
        for (ring, delta) in self.rings.iter_mut().zip(deltas.iter()) {
            ring.pop_back();
            ring.push_front(*delta);
        }
    }

    /// Push a zero delta to every channel.
    pub fn push_zero(&mut self) {
        for ring in self.rings.iter_mut() {
            ring.pop_back();
            ring.push_front(0.0);
        }
    }

    /// Sum of the deltas of a channel, zero for an unknown channel.
    pub fn sum(&self, channel: usize) -> f64 {
        self.rings.get(channel).map_or(0.0, |r| r.iter().sum())
    }

    /// Mean delta of a channel over the history.
    pub fn mean(&self, channel: usize) -> f64 {
        self.sum(channel) / self.depth as f64
    }

    /// Newest delta of a channel.
    pub fn latest(&self, channel: usize) -> f64 {
        self.rings
            .get(channel)
            .and_then(|r| r.front().copied())
            .unwrap_or(0.0)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_history() {
        let mut h = DeltaHistory::new(2, 3);

        h.push(&[1.0, -1.0]);
        h.push_zero();
        h.push(&[2.0, 0.5]);
        assert_eq!(h.sum(0), 3.0);
        assert_eq!(h.latest(1), 0.5);
        assert_eq!(h.mean(0), 1.0);

        // Oldest value drops out
        h.push_zero();
        assert_eq!(h.sum(0), 2.0);
        assert_eq!(h.sum(1), 0.5);

        assert_eq!(h.sum(5), 0.0);
        assert_eq!(DeltaHistory::new(1, 0).depth(), 1);
    }
}
