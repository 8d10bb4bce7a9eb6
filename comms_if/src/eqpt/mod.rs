//! # Equipment Interface
//!
//! This module defines the status records produced by the vehicle's equipment. Every record can be
//! flattened into telemetry with [`ToTlm`](crate::tlm::ToTlm).

// -----------------------------------------------------------------------------------------------
// MODULES
// -----------------------------------------------------------------------------------------------

pub mod collab;
pub mod imu;
pub mod motor;
