//! # Vehicle library.
//!
//! This library allows other crates in the workspace, and the integration tests, to access items
//! defined inside the vehicle crate.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

/// Collaborator interfaces - steering, brakes, power, temperature and video frames
pub mod collab;

/// Data store - per-cycle counters and the telemetry merge
pub mod data_store;

/// Hardware bring-up - opens the buses on the vehicle computer
pub mod hw;

/// Inertial measurement unit - BMI160 driver and sensor fusion
pub mod imu;

/// Motor control - PWM ramp, simulated gearbox and efficiency zones
pub mod motor_ctrl;

/// Executable parameters
pub mod params;

/// Telecommand processor - executes control commands against the actuators
pub mod tc_processor;

/// Vehicle server - client registration, command replies and telemetry broadcast
pub mod veh_server;
