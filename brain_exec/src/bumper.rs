//! # Bumper guard
//!
//! Wraps the robot's contact bumper. The control loop checks the bumper at the start of every
//! cycle and stops the drive immediately on contact.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use log::warn;
use serde::Deserialize;
use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use crate::shared::SensorCache;
use comms_if::eqpt::HardwareLink;
use util::time;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Parameters of the bumper guard.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Params {
    /// Maximum age of the cached bumper state before a read is forced.
    ///
    /// Units: milliseconds
    pub data_max_age_ms: u64,
}

/// Bumper guard
pub struct Bumper {
    link: Arc<dyn HardwareLink>,
    cache: Arc<SensorCache>,
    params: Params,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Default for Params {
    fn default() -> Self {
        Self {
            data_max_age_ms: 200,
        }
    }
}

impl Bumper {
    pub fn new(link: Arc<dyn HardwareLink>, cache: Arc<SensorCache>, params: Params) -> Self {
        Self {
            link,
            cache,
            params,
        }
    }

    /// Returns true if the bumper is in contact.
    ///
    /// If the cached state is older than the maximum data age the bumper is read through the
    /// link first. Should that read fail the cached state is used.
    pub fn contact(&self, now: Instant) -> bool {
        let cached = self.cache.bumper();

        if cached.age(now) > Duration::from_millis(self.params.data_max_age_ms) {
            match self.link.bumper() {
                Ok(contact) => {
                    self.cache.set_bumper(contact, now);
                    return contact;
                }
                Err(e) => warn!("Could not refresh the bumper state: {}", e),
            }
        }

        cached.value.contact
    }

    /// Time since contact was last registered, `None` if there never was contact.
    pub fn last_contact(&self, now: Instant) -> Option<Duration> {
        self.cache
            .bumper()
            .value
            .last_contact
            .map(|t| time::age(now, t))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use comms_if::eqpt::sim::SimLink;

    #[test]
    fn test_contact_refresh() {
        let sim = Arc::new(SimLink::manual());
        sim.connect("sim").unwrap();
        let cache = Arc::new(SensorCache::new());
        let bumper = Bumper::new(sim.clone(), cache.clone(), Params::default());

        let t0 = Instant::now();
        cache.set_bumper(false, t0);

        // Fresh cache is trusted even if the hardware changed
        sim.set_bumper(true);
        assert!(!bumper.contact(t0 + Duration::from_millis(100)));
        assert_eq!(bumper.last_contact(t0), None);

        // Stale cache is refreshed
        let t1 = t0 + Duration::from_millis(300);
        assert!(bumper.contact(t1));
        assert_eq!(
            bumper.last_contact(t1 + Duration::from_millis(50)),
            Some(Duration::from_millis(50))
        );
    }
}
