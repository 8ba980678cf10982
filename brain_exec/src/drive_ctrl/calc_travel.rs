//! Travel calculations

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External imports
use nalgebra::Vector2;

// Internal imports
use super::*;
use crate::pos_track::Pose;

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl DriveCtrl {

    /// Drive forwards while turning to face the destination.
    ///
    /// The forward speed falls off linearly with the heading error and is zero once the error
    /// exceeds the maximum travel angle, so the robot turns on the spot towards a destination
    /// behind it.
    pub(crate) fn calc_travel(&self, pose: &Pose, dest_vec: &Vector2<f64>) -> VelocityCommand {
        let dist = dest_vec.norm();

        if dist < self.destination.stop_within_m {
            return VelocityCommand::default();
        }

        let heading_error = pose.heading_error(dest_vec);

        VelocityCommand {
            vx: self.travel_speed(dist, heading_error),
            vy: 0.0,
            omega: self.turn_rate(heading_error),
        }
    }

    fn travel_speed(&self, dist: f64, heading_error: f64) -> f64 {
        let max_angle = self.params.travel_max_angle_rad;

        if heading_error.abs() > max_angle {
            return 0.0;
        }

        let speed = dist * self.params.speed_gain * (max_angle - heading_error.abs()) / max_angle;

        shape_speed(
            speed,
            self.params.travel_min_speed_ms,
            self.params.travel_max_speed_ms,
        )
    }

    /// Turn rate which reduces the given heading error.
    pub(crate) fn turn_rate(&self, heading_error: f64) -> f64 {
        shape_speed(
            heading_error * self.params.rotate_gain,
            self.params.rotate_min_speed_rads,
            self.params.rotate_max_speed_rads,
        )
    }
}
