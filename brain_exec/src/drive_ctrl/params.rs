//! Parameters structure for DriveCtrl

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use serde::Deserialize;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Parameters for drive control.
///
/// The defaults are empirically tuned values.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Params {

    // ---- TRAVEL ----

    /// Maximum forward speed while travelling.
    ///
    /// Units: meters/second
    pub travel_max_speed_ms: f64,

    /// Minimum forward speed while travelling.
    ///
    /// Units: meters/second
    pub travel_min_speed_ms: f64,

    /// Heading error above which the robot turns on the spot rather than driving forwards.
    ///
    /// Units: radians
    pub travel_max_angle_rad: f64,

    /// Distance to the destination below which the robot manouvres instead of travelling.
    ///
    /// Units: meters
    pub travel_min_distance_m: f64,

    /// Smallest allowed arrival tolerance.
    ///
    /// Units: meters
    pub min_acceptable_distance_m: f64,

    // ---- MANOUVRE ----

    /// Maximum speed along each axis while manouvring.
    ///
    /// Units: meters/second
    pub manouvre_max_speed_ms: f64,

    /// Minimum speed along each axis while manouvring.
    ///
    /// Units: meters/second
    pub manouvre_min_speed_ms: f64,

    // ---- ROTATION ----

    /// Maximum turn rate.
    ///
    /// Units: radians/second
    pub rotate_max_speed_rads: f64,

    /// Minimum turn rate.
    ///
    /// Units: radians/second
    pub rotate_min_speed_rads: f64,

    // ---- POINTING ----

    /// Heading error within which the robot is considered to face its pointing target.
    ///
    /// Units: radians
    pub pointing_acceptable_delta_angle_rad: f64,

    /// Pointing is only performed when the robot is within this distance, plus the arrival
    /// tolerance, of its destination.
    ///
    /// Units: meters
    pub pointing_destination_max_distance_m: f64,

    /// Pointing is skipped when the target is closer than this distance, plus the arrival
    /// tolerance.
    ///
    /// Units: meters
    pub pointing_target_min_distance_m: f64,

    // ---- GAINS AND LIMITS ----

    /// Gain from distance to linear speed.
    pub speed_gain: f64,

    /// Gain from heading error to turn rate.
    pub rotate_gain: f64,

    /// Maximum change of a linear speed per cycle.
    ///
    /// Units: meters/second
    pub velocity_max_adjust_ms: f64,

    /// Maximum change of the turn rate per cycle.
    ///
    /// Units: radians/second
    pub rotate_max_adjust_rads: f64,

    /// Maximum speed accepted by a manual velocity command.
    ///
    /// Units: meters/second (radians/second for the turn rate)
    pub manual_max_speed: f64,
}

impl Default for Params {
    fn default() -> Self {
        Self {
            travel_max_speed_ms: 0.5,
            travel_min_speed_ms: 0.05,
            travel_max_angle_rad: 1.0,
            travel_min_distance_m: 0.1,
            min_acceptable_distance_m: 0.02,
            manouvre_max_speed_ms: 0.3,
            manouvre_min_speed_ms: 0.05,
            rotate_max_speed_rads: 1.8,
            rotate_min_speed_rads: 0.2,
            pointing_acceptable_delta_angle_rad: 0.01,
            pointing_destination_max_distance_m: 0.05,
            pointing_target_min_distance_m: 0.0,
            speed_gain: 1.3,
            rotate_gain: 1.5,
            velocity_max_adjust_ms: 0.02,
            rotate_max_adjust_rads: 0.4,
            manual_max_speed: 0.7,
        }
    }
}
