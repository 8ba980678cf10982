//! # Brain Parameters
//!
//! Aggregates the parameters of every module. Each module's parameters are read from their own
//! file in the parameters directory, falling back on the defaults if the file is missing.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use log::info;
use serde::Deserialize;

use crate::{arm_ctrl, bumper, ctrl_loop, drive_ctrl, pos_track, sensor_bridge};
use util::params::{load_or_default, LoadError};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct BrainParams {
    pub ctrl_loop: ctrl_loop::Params,
    pub pos_track: pos_track::Params,
    pub bumper: bumper::Params,
    pub drive_ctrl: drive_ctrl::Params,
    pub arm_ctrl: arm_ctrl::Params,
    pub sensor_bridge: sensor_bridge::Params,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl BrainParams {
    /// Load every module's parameters from `$BRAIN_SW_ROOT/params`.
    pub fn load() -> Result<Self, LoadError> {
        let params = Self {
            ctrl_loop: load_or_default("ctrl_loop.toml")?,
            pos_track: load_or_default("pos_track.toml")?,
            bumper: load_or_default("bumper.toml")?,
            drive_ctrl: load_or_default("drive_ctrl.toml")?,
            arm_ctrl: load_or_default("arm_ctrl.toml")?,
            sensor_bridge: load_or_default("sensor_bridge.toml")?,
        };

        info!("Brain parameters loaded");

        Ok(params)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_partial_params() {
        let params: BrainParams = util::params::from_str(
            r#"
            [drive_ctrl]
            travel_max_speed_ms = 0.3

            [arm_ctrl]
            grip_time_ms = 1000
            "#,
        )
        .unwrap();

        assert_eq!(params.drive_ctrl.travel_max_speed_ms, 0.3);
        assert_eq!(params.drive_ctrl.travel_min_speed_ms, 0.05);
        assert_eq!(params.arm_ctrl.grip_time_ms, 1000);
        assert_eq!(params.ctrl_loop.period_ms, 50);
    }
}
