//! Interaction detection from the string pot deltas

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use log::info;
use std::time::Instant;

use super::{ArmCtrl, ArmEvents, GripState};
use comms_if::eqpt::{INNER_OVER, NUM_SEGMENT_BELLOWS, OUTER_OVER};

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl ArmCtrl {
    /// Look for receive, deliver and touch gestures in the delta histories.
    ///
    /// Only meaningful while the arm is not moving under its own pressure changes.
    pub(crate) fn detect_events(&self, now: Instant) -> ArmEvents {
        let mut events = ArmEvents::default();

        // Positive when both segments are pushed down
        let down = (self.pot_deltas.sum(INNER_OVER) + self.pot_deltas.sum(OUTER_OVER))
            / self.pot_deltas.depth() as f64;

        let cooled_down = self.release_done.map_or(true, |t| now > t);

        if self.grip == GripState::Relaxed && cooled_down && down > self.params.grip_threshold {
            info!(
                "Receive detected ({:.4} > {:.4})",
                down, self.params.grip_threshold
            );
            events.receive = true;
            events.touch = true;
        }

        if self.grip == GripState::Holding && down < self.params.release_threshold {
            info!(
                "Deliver detected ({:.4} < {:.4})",
                down, self.params.release_threshold
            );
            events.deliver = true;
            events.touch = true;
        }

        if !events.touch {
            for i in 0..NUM_SEGMENT_BELLOWS {
                let motion =
                    (self.pot_deltas.latest(i) + self.pot_deltas.latest(i + NUM_SEGMENT_BELLOWS)).abs();

                if motion > self.params.touched_threshold {
                    info!(
                        "Touch detected (pots {}+{} moved {:.4})",
                        i,
                        i + NUM_SEGMENT_BELLOWS,
                        motion
                    );
                    events.touch = true;
                }
            }
        }

        events
    }
}
