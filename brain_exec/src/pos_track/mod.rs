//! # Position tracking module
//!
//! Tracks the robot's pose and speed from the drive base odometry, and allows the odometry to be
//! recalibrated.

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

mod params;
mod state;

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use nalgebra::Vector2;
use serde::{Deserialize, Serialize};

// Internal
pub use params::*;
pub use state::*;
use comms_if::eqpt::LinkError;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// The pose of the robot in the odometry frame.
#[derive(Debug, Default, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pose {
    /// Position of the robot's centre.
    ///
    /// Units: meters
    pub position_m: Vector2<f64>,

    /// Heading, the angle between the robot's forward axis and the frame's x axis, in the range
    /// (-pi, pi].
    ///
    /// Units: radians
    pub heading_rad: f64,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Possible errors that can occur during position tracking.
#[derive(Debug, thiserror::Error)]
pub enum PosTrackError {
    #[error("Hardware link error: {0}")]
    LinkError(#[from] LinkError),

    #[error("The parameters are invalid: {0}")]
    InvalidParams(String),
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Pose {
    /// Create a new pose, wrapping the heading into (-pi, pi].
    pub fn new(x: f64, y: f64, heading_rad: f64) -> Self {
        Self {
            position_m: Vector2::new(x, y),
            heading_rad: util::maths::wrap_pi(heading_rad),
        }
    }

    pub fn x(&self) -> f64 {
        self.position_m.x
    }

    pub fn y(&self) -> f64 {
        self.position_m.y
    }

    /// Vector from this pose's position to the target.
    pub fn vector_to(&self, target: &Vector2<f64>) -> Vector2<f64> {
        target - self.position_m
    }

    /// Signed angle the robot must turn through to face along `vector`, in (-pi, pi].
    pub fn heading_error(&self, vector: &Vector2<f64>) -> f64 {
        util::maths::wrap_pi(vector.y.atan2(vector.x) - self.heading_rad)
    }
}
