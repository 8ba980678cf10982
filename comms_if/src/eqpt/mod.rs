//! # Equipment Interface
//!
//! This module defines the contract between the brain and the vendor hardware link, which gives
//! access to the drive base, the compliant arm's pneumatics and the robot's sensors.
//!
//! The link is event driven: sensor callbacks are buffered by the link and delivered when
//! [`HardwareLink::process_events`] is called. Commands are assumed to be non-blocking.

// -----------------------------------------------------------------------------------------------
// MODULES
// -----------------------------------------------------------------------------------------------

pub mod sim;

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use serde::{Deserialize, Serialize};

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Total number of pressure channels (bellows) on the arm.
pub const NUM_BELLOWS: usize = 8;

/// Number of bellows which position the arm, the remaining two rotate the gripper.
pub const NUM_ARM_BELLOWS: usize = 6;

/// Number of string potentiometers measuring the arm's segment lengths.
pub const NUM_STRING_POTS: usize = 6;

/// Number of bellows in one arm segment.
pub const NUM_SEGMENT_BELLOWS: usize = 3;

/// Inner segment, over bellow
pub const INNER_OVER: usize = 0;
/// Inner segment, right bellow
pub const INNER_RIGHT: usize = 1;
/// Inner segment, left bellow
pub const INNER_LEFT: usize = 2;
/// Outer segment, over bellow
pub const OUTER_OVER: usize = 3;
/// Outer segment, right bellow
pub const OUTER_RIGHT: usize = 4;
/// Outer segment, left bellow
pub const OUTER_LEFT: usize = 5;
/// Gripper rotation into the horizontal position
pub const ROTATE_HORIZONTAL: usize = 6;
/// Gripper rotation into the vertical position
pub const ROTATE_VERTICAL: usize = 7;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// An odometry reading from the drive base.
///
/// Positions are in meters in the odometry frame, `phi` in radians. Velocities are given in the
/// robot's body frame.
#[derive(Debug, Default, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct OdomReading {
    pub x: f64,
    pub y: f64,
    pub phi: f64,
    pub vx: f64,
    pub vy: f64,
    pub omega: f64,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// An event delivered by the hardware link when processing its buffered callbacks.
#[derive(Debug, Clone, PartialEq)]
pub enum HwEvent {
    /// New bellow pressures, in bar.
    PressuresChanged([f64; NUM_BELLOWS]),

    /// State of the compressor's pressure sensor (true when the tank is at pressure).
    PressureSensorChanged(bool),

    /// New string potentiometer readings.
    StringPotsChanged([f64; NUM_STRING_POTS]),

    /// New foil potentiometer reading.
    FoilPotChanged(f64),

    /// New odometry reading.
    OdometryChanged(OdomReading),

    /// New bumper state, true if in contact.
    BumperChanged(bool),

    /// The link has established its connection.
    Connected,

    /// The link's connection has been closed.
    ConnectionClosed,

    /// The link reported an error.
    Error(String),

    /// The link emitted a log message.
    Log(String),
}

/// Errors which can be reported by a hardware link.
#[derive(Debug, thiserror::Error)]
pub enum LinkError {
    #[error("Could not connect to the hardware at {0}: {1}")]
    ConnectFailed(String, String),

    #[error("The hardware link is not connected")]
    NotConnected,

    #[error("The hardware rejected the command: {0}")]
    CommandRejected(String),
}

// ------------------------------------------------------------------------------------------------
// TRAITS
// ------------------------------------------------------------------------------------------------

/// Access to the robot's actuators and sensors.
///
/// Implementations must be shareable between threads, the event pump and the control loop both
/// hold the link.
pub trait HardwareLink: Send + Sync {
    /// Connect to the hardware at the given address.
    fn connect(&self, address: &str) -> Result<(), LinkError>;

    /// Close the connection to the hardware.
    fn disconnect(&self);

    /// Returns true if the link is connected.
    fn is_connected(&self) -> bool;

    /// Deliver all callbacks buffered since the last call.
    fn process_events(&self) -> Vec<HwEvent>;

    /// Command the drive base velocity, in the robot's body frame.
    fn set_velocity(&self, vx: f64, vy: f64, omega: f64) -> Result<(), LinkError>;

    /// Read the current bellow pressures.
    fn pressures(&self) -> Result<[f64; NUM_BELLOWS], LinkError>;

    /// Command the bellow pressures.
    fn set_pressures(&self, pressures: &[f64; NUM_BELLOWS]) -> Result<(), LinkError>;

    /// Read the string potentiometers.
    fn string_pots(&self) -> Result<[f64; NUM_STRING_POTS], LinkError>;

    /// Read the foil potentiometer.
    fn foil_pot(&self) -> Result<f64, LinkError>;

    /// Read the compressor pressure sensor.
    fn pressure_sensor(&self) -> Result<bool, LinkError>;

    /// Read the odometry.
    fn odometry(&self) -> Result<OdomReading, LinkError>;

    /// Overwrite the odometry pose.
    fn set_odometry(&self, x: f64, y: f64, phi: f64) -> Result<(), LinkError>;

    /// Read the bumper, true if in contact.
    fn bumper(&self) -> Result<bool, LinkError>;

    /// Switch the compressor on or off.
    fn set_compressor(&self, on: bool) -> Result<(), LinkError>;

    /// Open or close the water drain valve.
    fn set_drain_valve(&self, open: bool) -> Result<(), LinkError>;

    /// Open or close the gripper's intake valve.
    fn set_gripper_valve1(&self, open: bool) -> Result<(), LinkError>;

    /// Open or close the gripper's hold valve.
    fn set_gripper_valve2(&self, open: bool) -> Result<(), LinkError>;

    /// Convert a position of an arm segment's tip relative to its relaxed position into the
    /// pressures of the segment's over, right and left bellows, in that order.
    fn xy_to_pressure(&self, x: f64, y: f64) -> [f64; NUM_SEGMENT_BELLOWS];
}
