//! Parameters structure for the SensorBridge

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use serde::Deserialize;

use comms_if::net::DEFAULT_CLICK_TOKEN;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Parameters of the external coordinate sensor bridge.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Params {
    /// Number of consecutive valid samples averaged into one published sample.
    pub average: usize,

    /// Samples whose summed absolute components are below this are discarded.
    ///
    /// Units: millimeters
    pub noise_floor_mm: f64,

    /// Offset added to the depth axis after conversion.
    ///
    /// Units: meters
    pub depth_offset_m: f64,

    /// Initial height of the sensor above the floor.
    ///
    /// Units: meters
    pub height_m: f64,

    /// Heights at or below this are rejected.
    ///
    /// Units: meters
    pub min_height_m: f64,

    /// If true the sensor's lateral axis is inverted to match the robot frame.
    pub invert_lateral: bool,

    /// Number of consecutive connection failures after which the bridge gives up.
    pub max_connect_failures: u32,

    /// Delay between two connection attempts.
    ///
    /// Units: milliseconds
    pub reconnect_delay_ms: u64,

    /// Timeout of a single connection attempt.
    ///
    /// Units: milliseconds
    pub connect_timeout_ms: u64,

    /// Socket read timeout, bounding how long a stop request waits.
    ///
    /// Units: milliseconds
    pub read_timeout_ms: u64,

    /// Line sent by the sensor on a click.
    pub click_token: String,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Default for Params {
    fn default() -> Self {
        Self {
            average: 1,
            noise_floor_mm: 0.1,
            depth_offset_m: -0.1,
            height_m: 0.05,
            min_height_m: 0.05,
            invert_lateral: true,
            max_connect_failures: 5,
            reconnect_delay_ms: 500,
            connect_timeout_ms: 1000,
            read_timeout_ms: 50,
            click_token: DEFAULT_CLICK_TOKEN.into(),
        }
    }
}
