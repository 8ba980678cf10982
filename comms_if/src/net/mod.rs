//! # Network Module
//!
//! Line protocol of the external coordinate sensor. The sensor streams one record per line,
//! either a comma separated `x,y,z` coordinate in millimeters in the sensor's own frame, or a
//! click token carrying no coordinate.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use std::num::ParseFloatError;

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Token sent by the sensor when the operator clicks.
pub const DEFAULT_CLICK_TOKEN: &str = "Click";

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// A raw coordinate from the sensor, in millimeters in the sensor frame.
#[derive(Debug, Default, Copy, Clone, PartialEq)]
pub struct RawPoint {
    pub x_mm: f64,
    pub y_mm: f64,
    pub z_mm: f64,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// A single parsed line of the sensor stream.
#[derive(Debug, Copy, Clone, PartialEq)]
pub enum SensorLine {
    Click,
    Point(RawPoint),
}

/// Errors raised while parsing a sensor line.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SensorLineError {
    #[error("The line is empty")]
    Empty,

    #[error("Expected 3 comma separated fields, found {0} in {1:?}")]
    WrongFieldCount(usize, String),

    #[error("Invalid number {0:?}: {1}")]
    InvalidNumber(String, ParseFloatError),

    #[error("Non-finite coordinate in {0:?}")]
    NonFinite(String),
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl RawPoint {
    /// Sum of the absolute values of the components, used to reject null readings.
    pub fn abs_sum(&self) -> f64 {
        self.x_mm.abs() + self.y_mm.abs() + self.z_mm.abs()
    }
}

impl SensorLine {
    /// Parse a line of the sensor stream. Surrounding whitespace, including the line terminator,
    /// is ignored.
    pub fn parse(line: &str, click_token: &str) -> Result<Self, SensorLineError> {
        let line = line.trim();

        if line.is_empty() {
            return Err(SensorLineError::Empty);
        }

        if line == click_token {
            return Ok(SensorLine::Click);
        }

        let fields: Vec<&str> = line.split(',').map(str::trim).collect();
        if fields.len() != 3 {
            return Err(SensorLineError::WrongFieldCount(fields.len(), line.into()));
        }

        let mut vals = [0f64; 3];
        for (v, f) in vals.iter_mut().zip(fields.iter()) {
            *v = f
                .parse::<f64>()
                .map_err(|e| SensorLineError::InvalidNumber((*f).into(), e))?;
        }

        if vals.iter().any(|v| !v.is_finite()) {
            return Err(SensorLineError::NonFinite(line.into()));
        }

        Ok(SensorLine::Point(RawPoint {
            x_mm: vals[0],
            y_mm: vals[1],
            z_mm: vals[2],
        }))
    }
}
