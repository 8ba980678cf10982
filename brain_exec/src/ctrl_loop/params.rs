//! Parameters structure for the CtrlLoop

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use serde::Deserialize;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Parameters of the control loop and the event pump feeding it.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Params {
    /// Target period of one cycle.
    ///
    /// Units: milliseconds
    pub period_ms: u64,

    /// Number of times events are drained before the first cycle, so that readings taken while
    /// starting up are not reacted to.
    pub flush_count: u32,

    /// Interval between two start-up flushes.
    ///
    /// Units: milliseconds
    pub flush_interval_ms: u64,

    /// Sleep between two passes of the event pump.
    ///
    /// Units: microseconds
    pub event_pump_interval_us: u64,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Default for Params {
    fn default() -> Self {
        Self {
            period_ms: 50,
            flush_count: 6,
            flush_interval_ms: 100,
            event_pump_interval_us: 10,
        }
    }
}
