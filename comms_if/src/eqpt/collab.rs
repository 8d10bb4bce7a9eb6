//! # Collaborator equipment records
//!
//! Status of the equipment which sits alongside the motor and inertial sensor: steering, brakes,
//! power monitoring and temperature.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use serde::{Deserialize, Serialize};

use crate::tlm::{insert, TlmMap, ToTlm};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Steering actuator status.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct SteeringStatus {
    /// Commanded steering, -100 full left to 100 full right.
    ///
    /// Units: percent
    pub input_pct: f64,

    /// Units: degrees
    pub angle_deg: f64,

    pub available: bool,
}

/// Brake actuator status.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct BrakeStatus {
    /// Units: percent
    pub input_pct: f64,

    /// Front/rear split, 0 fully front and 100 fully rear.
    ///
    /// Units: percent
    pub balance_pct: f64,

    /// Units: percent
    pub front_force_pct: f64,

    /// Units: percent
    pub rear_force_pct: f64,

    pub available: bool,
}

/// Electrical power measurements.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PowerSnapshot {
    /// Units: volts
    pub battery_voltage: f64,

    /// Units: amps
    pub total_current: f64,

    /// Units: watts
    pub total_power: f64,

    pub available: bool,
}

/// A single temperature measurement.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct TemperatureReading {
    /// Units: degrees Celsius
    pub temperature_c: f64,

    pub available: bool,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl ToTlm for SteeringStatus {
    fn to_tlm(&self) -> TlmMap {
        let mut map = TlmMap::new();
        insert(&mut map, "steering_input", self.input_pct);
        insert(&mut map, "steering_angle", self.angle_deg);
        insert(&mut map, "steering_available", self.available);
        map
    }
}

impl ToTlm for BrakeStatus {
    fn to_tlm(&self) -> TlmMap {
        let mut map = TlmMap::new();
        insert(&mut map, "total_brake_input", self.input_pct);
        insert(&mut map, "brake_balance", self.balance_pct);
        insert(&mut map, "front_brake_force", self.front_force_pct);
        insert(&mut map, "rear_brake_force", self.rear_force_pct);
        insert(&mut map, "brakes_available", self.available);
        map
    }
}

impl ToTlm for PowerSnapshot {
    fn to_tlm(&self) -> TlmMap {
        let mut map = TlmMap::new();
        insert(&mut map, "battery_voltage", self.battery_voltage);
        insert(&mut map, "total_current", self.total_current);
        insert(&mut map, "total_power", self.total_power);
        insert(&mut map, "power_available", self.available);
        map
    }
}

impl ToTlm for TemperatureReading {
    fn to_tlm(&self) -> TlmMap {
        let mut map = TlmMap::new();
        insert(&mut map, "temperature_c", self.temperature_c);
        insert(&mut map, "temperature_available", self.available);
        map
    }
}
