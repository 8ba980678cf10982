//! Pointing calculations

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External imports
use log::info;

// Internal imports
use super::*;
use crate::pos_track::Pose;

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl DriveCtrl {

    /// Turn rate which brings the robot to face the pointing target.
    ///
    /// Returns `None` if the target is too close to point at, or if the robot already faces the
    /// target, in which case pointing is deactivated.
    pub(crate) fn calc_point(&mut self, pose: &Pose) -> Option<f64> {
        let target_vec = pose.vector_to(&self.point_at.position_m);

        if target_vec.norm()
            < self.params.pointing_target_min_distance_m + self.destination.stop_within_m
        {
            return None;
        }

        let heading_error = pose.heading_error(&target_vec);

        if heading_error.abs() > self.params.pointing_acceptable_delta_angle_rad {
            Some(self.turn_rate(heading_error))
        } else {
            info!(
                "Pointing at ({:.3}, {:.3}) complete",
                self.point_at.position_m.x, self.point_at.position_m.y
            );
            self.point_at.active = false;
            None
        }
    }
}
