//! # Data Store
//!
//! Holds the cyclic modules and the per-cycle contexts they are run with. The store is owned by
//! the brain behind a mutex, which the control loop locks for the duration of one cycle.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use std::time::Instant;

use crate::{
    arm_ctrl::ArmCtrl, bumper::Bumper, drive_ctrl::DriveCtrl, pos_track::PosTrack,
    sensor_bridge::SensorHandle, shared::SensorSnapshot,
};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Global data store for the brain.
pub struct DataStore {
    // Cycle management
    /// Number of cycles already executed
    pub num_cycles: u64,

    /// Number of consecutive cycle overruns
    pub num_consec_cycle_overruns: u64,

    // Modules
    pub pos_track: PosTrack,
    pub bumper: Bumper,
    pub drive_ctrl: DriveCtrl,
    pub arm_ctrl: ArmCtrl,

    /// The external coordinate sensor, if enabled
    pub sensor: Option<SensorHandle>,
}

/// Context shared by all modules during one cycle.
pub struct CycleCtx<'a> {
    /// Time at which the cycle started
    pub now: Instant,

    /// Sensor values for this cycle
    pub snapshot: &'a SensorSnapshot,

    /// The external coordinate sensor, if enabled
    pub sensor: Option<&'a SensorHandle>,
}

/// Context of the control modules, which also read the position tracker.
pub struct ControlCtx<'a> {
    pub cycle: &'a CycleCtx<'a>,
    pub pos_track: &'a PosTrack,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl DataStore {
    pub fn new(pos_track: PosTrack, bumper: Bumper, drive_ctrl: DriveCtrl, arm_ctrl: ArmCtrl) -> Self {
        Self {
            num_cycles: 0,
            num_consec_cycle_overruns: 0,
            pos_track,
            bumper,
            drive_ctrl,
            arm_ctrl,
            sensor: None,
        }
    }

    /// True if an external sensor is enabled and its reader is running.
    pub fn sensor_available(&self) -> bool {
        self.sensor.as_ref().map_or(false, |s| s.is_running())
    }
}
