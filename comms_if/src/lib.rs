//! # Communications interface crate.
//!
//! Provides all external interface contracts used by the brain: the hardware link to the robot's
//! actuators and sensors, the external coordinate sensor's line protocol, and operator command
//! parsing.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

/// Hardware link contract and equipment definitions
pub mod eqpt;

/// External coordinate sensor protocol
pub mod net;

/// Operator command types
pub mod tc;
