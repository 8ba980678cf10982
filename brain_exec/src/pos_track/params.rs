//! Parameters structure for PosTrack

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use serde::Deserialize;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Parameters for position tracking.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Params {
    /// Scale between the odometry reported by the drive base and true distances. Readings are
    /// multiplied by this factor, poses sent to the drive base are divided by it.
    pub adjustment_factor: f64,

    /// Maximum age of the cached odometry before a read is forced.
    ///
    /// Units: milliseconds
    pub data_max_age_ms: u64,

    /// Tolerance used to confirm that a newly set pose was accepted by the drive base.
    ///
    /// Units: meters
    pub set_verify_tolerance_m: f64,
}

impl Default for Params {
    fn default() -> Self {
        Self {
            adjustment_factor: 1.0,
            data_max_age_ms: 200,
            set_verify_tolerance_m: 1e-3,
        }
    }
}
