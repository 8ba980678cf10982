//! Parameters structure for ArmCtrl

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use serde::Deserialize;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Parameters for arm control.
///
/// The detection thresholds were tuned by hand on the real arm, they are not derived from any
/// model.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Params {

    // ---- PRESSURES ----

    /// Highest pressure which can be commanded to a bellow.
    ///
    /// Units: bar
    pub max_pressure_bar: f64,

    /// Upper limit of the arm speed, the pressure change of an arm bellow per cycle.
    ///
    /// Units: bar
    pub pressure_max_adjust_bar: f64,

    /// Lower limit of the arm speed.
    ///
    /// Units: bar
    pub pressure_min_adjust_bar: f64,

    /// Applied pressure above which an arm bellow is considered in use.
    ///
    /// Units: bar
    pub pressure_required_threshold_bar: f64,

    // ---- GRIPPER ----

    /// Time the intake valve is held open to grip.
    ///
    /// Units: milliseconds
    pub grip_time_ms: u64,

    /// Time taken to release.
    ///
    /// Units: milliseconds
    pub release_time_ms: u64,

    // ---- DETECTION ----

    /// Number of cycles of deltas kept for each channel.
    pub delta_depth: usize,

    /// Difference between read and target pressure above which the arm is considered moving.
    ///
    /// Units: bar
    pub arm_activity_threshold: f64,

    /// Mean pressure delta above which the arm is considered moving.
    ///
    /// Units: bar
    pub arm_activity_deltas_threshold: f64,

    /// Mean downward motion of the over bellows which signals a receive.
    pub grip_threshold: f64,

    /// Mean downward motion of the over bellows below which a deliver is signalled.
    pub release_threshold: f64,

    /// Combined delta of a string pot pair above which a touch is signalled.
    pub touched_threshold: f64,

    // ---- CALIBRATION ----

    /// Distance from the robot's centre to the gripper with the arm relaxed.
    ///
    /// Units: meters
    pub relaxed_distance_from_centre_m: f64,

    /// Maximum age of the external coordinate used to calibrate.
    ///
    /// Units: milliseconds
    pub calibrate_coord_max_age_ms: u64,

    /// Lowest height of a coordinate accepted for calibration.
    ///
    /// Units: meters
    pub calibrate_min_height_m: f64,

    /// Highest height of a coordinate accepted for calibration.
    ///
    /// Units: meters
    pub calibrate_max_height_m: f64,

    /// Largest correction accepted along each axis.
    ///
    /// Units: meters
    pub calibrate_max_xy_deviation_m: f64,

    /// Speed above which the robot is considered driving.
    ///
    /// Units: meters/second
    pub calibrate_max_drive_velocity_ms: f64,

    /// Turn rate above which the robot is considered turning.
    ///
    /// Units: radians/second
    pub calibrate_max_rotation_velocity_rads: f64,

    // ---- TOUCH COORDINATE ----

    /// Maximum age of the external coordinate paired with a touch.
    ///
    /// Units: milliseconds
    pub touch_coord_max_age_ms: u64,

    /// Interval at which a caller waiting for a touch polls for cancellation and fresh
    /// coordinates.
    ///
    /// Units: milliseconds
    pub touch_poll_interval_ms: u64,
}

impl Default for Params {
    fn default() -> Self {
        Self {
            max_pressure_bar: 1.5,
            pressure_max_adjust_bar: 0.5,
            pressure_min_adjust_bar: 0.05,
            pressure_required_threshold_bar: 0.1,
            grip_time_ms: 4000,
            release_time_ms: 2000,
            delta_depth: 4,
            arm_activity_threshold: 0.1,
            arm_activity_deltas_threshold: 0.005,
            grip_threshold: 0.005,
            release_threshold: -0.005,
            touched_threshold: 0.01,
            relaxed_distance_from_centre_m: 0.47,
            calibrate_coord_max_age_ms: 300,
            calibrate_min_height_m: 0.1,
            calibrate_max_height_m: 0.4,
            calibrate_max_xy_deviation_m: 2.2,
            calibrate_max_drive_velocity_ms: 0.01,
            calibrate_max_rotation_velocity_rads: 0.01,
            touch_coord_max_age_ms: 100,
            touch_poll_interval_ms: 5,
        }
    }
}
