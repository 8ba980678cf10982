//! Drive control module
//!
//! Computes velocity commands for the holonomic drive base which take the robot to a destination,
//! and optionally turn it to face a pointing target once it has arrived.
//!
//! Far from the destination the robot **travels**: it drives forwards while turning to face the
//! destination. Close to the destination it **manouvres**: it translates directly towards it
//! without turning. Every axis is passed through a soft acceleration limiter before being sent to
//! the drive base.

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

mod calc_manouvre;
mod calc_point;
mod calc_travel;
mod params;
mod state;

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use nalgebra::Vector2;
use serde::Serialize;

// Internal
pub use params::*;
pub use state::*;
use comms_if::eqpt::LinkError;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// A velocity command in the robot's body frame.
#[derive(Debug, Default, Copy, Clone, PartialEq, Serialize)]
pub struct VelocityCommand {
    /// Forward speed, meters/second
    pub vx: f64,

    /// Leftward speed, meters/second
    pub vy: f64,

    /// Anticlockwise turn rate, radians/second
    pub omega: f64,
}

/// Where the robot is driving to.
#[derive(Debug, Copy, Clone, PartialEq, Serialize)]
pub struct Destination {
    pub position_m: Vector2<f64>,

    /// Distance from the destination within which the robot is considered to have arrived.
    pub stop_within_m: f64,
}

/// What the robot turns to face once near its destination.
#[derive(Debug, Copy, Clone, PartialEq, Serialize)]
pub struct PointingTarget {
    pub position_m: Vector2<f64>,
    pub active: bool,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// The way the velocity command was computed on the last cycle.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize)]
pub enum DriveMode {
    /// The stop flag is set.
    Stopped,

    /// Driving forwards while turning towards the destination.
    Travel,

    /// Translating towards the destination without turning.
    Manouvre,

    /// Holding a velocity set by the operator.
    Manual,
}

/// Possible errors that can occur during DriveCtrl operation.
#[derive(Debug, thiserror::Error)]
pub enum DriveCtrlError {
    #[error("Could not send the velocity command: {0}")]
    LinkError(#[from] LinkError),
}

// ---------------------------------------------------------------------------
// FUNCTIONS
// ---------------------------------------------------------------------------

/// Limit the magnitude of a speed to `[min, max]`, keeping its sign.
///
/// Speeds smaller than a quarter of the minimum are zeroed.
pub fn shape_speed(speed: f64, min: f64, max: f64) -> f64 {
    let abs = speed.abs();

    if abs > max {
        max.copysign(speed)
    } else if abs < min / 4.0 {
        0.0
    } else if abs < min {
        min.copysign(speed)
    } else {
        speed
    }
}
