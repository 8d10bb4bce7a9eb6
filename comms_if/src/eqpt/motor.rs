//! # Motor and transmission records

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::tlm::{insert, TlmMap, ToTlm};

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// Drive direction of the motor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    Forward,
    Reverse,
    Stopped,
}

/// Efficiency band of the current duty cycle within the current gear.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EfficiencyZone {
    Ideal,
    Suboptimal,
    Poor,
}

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Snapshot of the motor controller.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MotorStatus {
    pub direction: Direction,

    /// Units: percent
    pub current_duty: f64,

    /// Units: percent
    pub target_duty: f64,

    /// Last commanded throttle before gear mapping.
    ///
    /// Units: percent
    pub throttle: f64,

    pub gear: u8,
    pub gear_ratio: f64,
    pub clutch_engaged: bool,
    pub shifting: bool,

    pub zone: EfficiencyZone,
    pub zone_multiplier: f64,

    /// Position of the duty cycle inside the gear's ideal band, 0 below it and 100 above it.
    ///
    /// Units: percent
    pub ideal_zone_pct: f64,

    pub engine_rpm: f64,
    pub wheel_rpm: f64,
    pub speed_kmh: f64,

    pub gear_changes: u64,

    /// Time the control loop has been running.
    ///
    /// Units: seconds
    pub runtime_s: f64,

    /// Distance covered at the simulated road speed.
    ///
    /// Units: kilometers
    pub distance_km: f64,

    /// True if the PWM outputs are connected to hardware.
    pub hardware_ready: bool,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Forward => "forward",
            Direction::Reverse => "reverse",
            Direction::Stopped => "stop",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl EfficiencyZone {
    /// Multiplier applied to the base acceleration step while in this zone.
    pub fn multiplier(&self) -> f64 {
        match self {
            EfficiencyZone::Ideal => 1.0,
            EfficiencyZone::Suboptimal => 0.25,
            EfficiencyZone::Poor => 0.05,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EfficiencyZone::Ideal => "IDEAL",
            EfficiencyZone::Suboptimal => "SUBOPTIMAL",
            EfficiencyZone::Poor => "POOR",
        }
    }
}

impl fmt::Display for EfficiencyZone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl ToTlm for MotorStatus {
    fn to_tlm(&self) -> TlmMap {
        let mut map = TlmMap::new();
        insert(&mut map, "motor_direction", self.direction.as_str());
        insert(&mut map, "current_pwm", self.current_duty);
        insert(&mut map, "target_pwm", self.target_duty);
        insert(&mut map, "throttle", self.throttle);
        insert(&mut map, "current_gear", self.gear);
        insert(&mut map, "gear_ratio", self.gear_ratio);
        insert(&mut map, "clutch_engaged", self.clutch_engaged);
        insert(&mut map, "is_shifting", self.shifting);
        insert(&mut map, "efficiency_zone", self.zone.as_str());
        insert(&mut map, "zone_acceleration_rate", self.zone_multiplier);
        insert(&mut map, "rpm_percent", self.ideal_zone_pct);
        insert(&mut map, "engine_rpm", self.engine_rpm);
        insert(&mut map, "wheel_rpm", self.wheel_rpm);
        insert(&mut map, "speed_kmh", self.speed_kmh);
        insert(&mut map, "gear_changes", self.gear_changes);
        insert(&mut map, "total_runtime", self.runtime_s);
        insert(&mut map, "total_distance", self.distance_km);
        insert(&mut map, "motor_hardware_ready", self.hardware_ready);
        map
    }
}
