//! # Operator commands
//!
//! Types used by operator interfaces to command the brain.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use std::{fmt, num::ParseFloatError, str::FromStr};

use serde::{Deserialize, Serialize};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// A 2D coordinate in the odometry frame, written `x:y` in meters.
#[derive(Debug, Default, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub x: f64,
    pub y: f64,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CoordinateParseError {
    #[error("Expected a coordinate of the form x:y, found {0:?}")]
    BadFormat(String),

    #[error("Invalid number in coordinate: {0}")]
    InvalidNumber(ParseFloatError),
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl FromStr for Coordinate {
    type Err = CoordinateParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.trim().splitn(2, ':');

        let (x, y) = match (parts.next(), parts.next()) {
            (Some(x), Some(y)) => (x, y),
            _ => return Err(CoordinateParseError::BadFormat(s.into())),
        };

        Ok(Coordinate {
            x: x.trim().parse().map_err(CoordinateParseError::InvalidNumber)?,
            y: y.trim().parse().map_err(CoordinateParseError::InvalidNumber)?,
        })
    }
}

impl fmt::Display for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}:{}", self.x, self.y)
    }
}
