//! Manouvre calculations

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External imports
use nalgebra::{Rotation2, Vector2};

// Internal imports
use super::*;
use crate::pos_track::Pose;

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl DriveCtrl {

    /// Translate towards the destination without turning.
    pub(crate) fn calc_manouvre(&self, pose: &Pose, dest_vec: &Vector2<f64>) -> VelocityCommand {
        if dest_vec.norm() < self.destination.stop_within_m {
            return VelocityCommand::default();
        }

        // Destination vector in the body frame
        let body_vec = Rotation2::new(-pose.heading_rad) * *dest_vec;

        VelocityCommand {
            vx: self.manouvre_speed(body_vec.x),
            vy: self.manouvre_speed(body_vec.y),
            omega: 0.0,
        }
    }

    fn manouvre_speed(&self, length: f64) -> f64 {
        shape_speed(
            length * self.params.speed_gain,
            self.params.manouvre_min_speed_ms,
            self.params.manouvre_max_speed_ms,
        )
    }
}
