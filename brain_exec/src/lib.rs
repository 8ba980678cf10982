//! # Brain library.
//!
//! The control core of the robot: position tracking, drive and arm control, the external sensor
//! bridge and the control loop running them. Executables build a [`brain::Brain`] on top of a
//! [`comms_if::eqpt::HardwareLink`].

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

/// Arm control module - bellow pressures, gripper and touch detection
pub mod arm_ctrl;

/// The brain - owns every module and exposes the robot's operations
pub mod brain;

/// Bumper - reports contact of the front bumper
pub mod bumper;

/// Control loop - runs the cyclic modules at a fixed period
pub mod ctrl_loop;

/// Data store - the modules shared between the brain and the control loop
pub mod data_store;

/// Drive control module - steers the drive base to a destination
pub mod drive_ctrl;

/// Event pump - drains the hardware link's callbacks into the sensor cache
pub mod event_pump;

/// Parameters of every module
pub mod params;

/// Position tracking module - odometry pose and speeds
pub mod pos_track;

/// Sensor bridge - reads the external coordinate sensor over TCP
pub mod sensor_bridge;

/// State shared between threads
pub mod shared;
