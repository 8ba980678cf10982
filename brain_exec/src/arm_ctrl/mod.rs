//! Arm control module
//!
//! Controls the compliant pneumatic arm and its gripper. The arm has two segments of three
//! bellows each, plus two bellows rotating the gripper. Arm bellow pressures are ramped towards
//! their targets, the rotation bellows are driven directly.
//!
//! The arm has no touch sensor. Interaction is instead inferred from the deltas of the bellow
//! pressures and string pots:
//!
//! - **receive**: the arm is pushed down while empty, an object is being handed over, so the
//!   gripper closes.
//! - **deliver**: the arm lifts while holding, the object is being taken, so the gripper opens.
//! - **touch**: any segment was nudged. Touches are handed to a caller waiting in
//!   `get_touch_coordinate`, or else used to recalibrate the odometry from the external sensor.

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

mod calibrate;
mod delta_history;
mod detect;
mod params;
mod state;

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use std::time::Instant;

// Internal
pub use calibrate::*;
pub use delta_history::*;
pub use params::*;
pub use state::*;
use comms_if::eqpt::LinkError;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Interaction events detected on a cycle.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub struct ArmEvents {
    pub touch: bool,
    pub receive: bool,
    pub deliver: bool,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// State of the gripper. Transitions are timed, there is no feedback from the gripper.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum GripState {
    /// Not holding anything.
    Relaxed,

    /// Intake valve open, holding once the deadline passes.
    Gripping { deadline: Instant },

    /// Holding an object.
    Holding,

    /// Outlet open, relaxed once the deadline passes.
    Releasing { deadline: Instant },
}

/// Possible errors that can occur during ArmCtrl operation.
#[derive(Debug, thiserror::Error)]
pub enum ArmCtrlError {
    #[error("Hardware link error: {0}")]
    LinkError(#[from] LinkError),

    #[error("There is no pressure channel {0}")]
    InvalidChannel(usize),

    #[error("Expected a finite pressure, found {0}")]
    InvalidPressure(f64),
}
