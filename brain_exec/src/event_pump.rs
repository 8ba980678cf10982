//! # Event Pump
//!
//! Background thread which continually asks the hardware link to deliver its buffered callbacks
//! and stores the carried readings in the [`SensorCache`]. No cached reading updates unless the
//! pump is running.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

use log::{debug, error, info, warn};

use crate::shared::SensorCache;
use comms_if::eqpt::{HardwareLink, HwEvent};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Handle to the event pump thread. The thread is stopped when the handle is dropped.
pub struct EventPump {
    bg_jh: Option<JoinHandle<()>>,
    bg_run: Arc<AtomicBool>,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl EventPump {
    /// Start pumping events from `link` into `cache`, sleeping `interval` between passes.
    pub fn start(
        link: Arc<dyn HardwareLink>,
        cache: Arc<SensorCache>,
        interval: Duration,
    ) -> Self {
        let bg_run = Arc::new(AtomicBool::new(true));
        let bg_run_clone = bg_run.clone();

        let bg_jh = Some(thread::spawn(move || {
            bg_thread(link, cache, interval, bg_run_clone)
        }));

        Self { bg_jh, bg_run }
    }

    /// Returns true while the pump thread is running.
    pub fn is_running(&self) -> bool {
        self.bg_run.load(Ordering::Acquire)
    }

    /// Stop the pump and wait for the thread to exit.
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.bg_run.store(false, Ordering::Release);

        if let Some(jh) = self.bg_jh.take() {
            if jh.join().is_err() {
                error!("EventPump thread panicked");
            }
        }
    }
}

impl Drop for EventPump {
    fn drop(&mut self) {
        self.shutdown();
    }
}

// ------------------------------------------------------------------------------------------------
// FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Deliver one batch of events to the cache, logging the connection events.
///
/// Returns the number of events processed.
pub fn pump_once(link: &dyn HardwareLink, cache: &SensorCache) -> usize {
    let events = link.process_events();
    let now = Instant::now();

    for event in events.iter() {
        if cache.apply_event(event, now) {
            continue;
        }

        match event {
            HwEvent::Connected => info!("Hardware link connected"),
            HwEvent::ConnectionClosed => warn!("Hardware link connection closed"),
            HwEvent::Error(e) => error!("Hardware link error: {}", e),
            HwEvent::Log(m) => debug!("Hardware link: {}", m),
            _ => (),
        }
    }

    events.len()
}

fn bg_thread(
    link: Arc<dyn HardwareLink>,
    cache: Arc<SensorCache>,
    interval: Duration,
    run: Arc<AtomicBool>,
) {
    info!("EventPump thread started");

    while run.load(Ordering::Acquire) {
        pump_once(link.as_ref(), &cache);
        thread::sleep(interval);
    }

    info!("EventPump thread exited");
}
