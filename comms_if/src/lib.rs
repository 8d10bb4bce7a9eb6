//! # Communications interface crate.
//!
//! Provides all common communications interfaces between the vehicle and its operators.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

/// Operator commands and replies
pub mod tc;

/// Status records for equipment (sensors and actuators)
pub mod eqpt;

/// Network module
pub mod net;

/// Telemetry value model
pub mod tlm;
