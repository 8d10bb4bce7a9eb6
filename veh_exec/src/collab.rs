//! # Collaborator equipment
//!
//! Interfaces to the equipment the core drives or reads alongside the motor and inertial sensor.
//! The vehicle software only depends on these traits. The implementations here latch the
//! commanded values without driving any hardware, which keeps commands, telemetry and shutdown
//! consistent on hosts where the equipment is absent.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use std::sync::{Mutex, MutexGuard};

use comms_if::eqpt::collab::{BrakeStatus, PowerSnapshot, SteeringStatus, TemperatureReading};
use serde::Deserialize;
use util::maths::clamp;

// ------------------------------------------------------------------------------------------------
// TRAITS
// ------------------------------------------------------------------------------------------------

pub trait SteeringCtrl: Send + Sync {
    /// Steer to `input_pct`, -100 full left to 100 full right.
    fn set_steering_input(&self, input_pct: f64);

    fn center(&self);

    fn status(&self) -> SteeringStatus;
}

pub trait BrakeCtrl: Send + Sync {
    /// Brake at `input_pct` of full force.
    fn apply_brake(&self, input_pct: f64);

    /// Split between front (0) and rear (100).
    fn set_balance(&self, balance_pct: f64);

    fn release(&self) {
        self.apply_brake(0.0)
    }

    fn status(&self) -> BrakeStatus;
}

pub trait PowerMonitor: Send + Sync {
    fn get_power_snapshot(&self) -> PowerSnapshot;
}

pub trait TempSensor: Send + Sync {
    fn get_temperature(&self) -> TemperatureReading;
}

/// Source of encoded video frames.
pub trait FrameSource: Send {
    /// The latest encoded frame, or `None` if there is no new frame.
    fn latest_frame(&mut self) -> Option<Vec<u8>>;
}

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CollabParams {
    /// Steering angle at full input.
    ///
    /// Units: degrees
    pub max_steering_angle_deg: f64,

    /// Initial brake balance.
    ///
    /// Units: percent
    pub brake_balance_pct: f64,

    /// Cap on the total brake force.
    ///
    /// Units: percent
    pub max_brake_force_pct: f64,
}

/// Steering which only latches its demand.
pub struct LatchedSteering {
    max_angle_deg: f64,
    status: Mutex<SteeringStatus>,
}

/// Brakes which only latch their demand.
pub struct LatchedBrakes {
    max_force_pct: f64,
    status: Mutex<BrakeStatus>,
}

/// Stands in for a power monitor or temperature sensor that is not fitted.
#[derive(Debug, Default)]
pub struct NotFitted;

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl Default for CollabParams {
    fn default() -> Self {
        Self {
            max_steering_angle_deg: 45.0,
            brake_balance_pct: 60.0,
            max_brake_force_pct: 100.0,
        }
    }
}

impl LatchedSteering {
    pub fn new(params: &CollabParams) -> Self {
        Self {
            max_angle_deg: clamp(&params.max_steering_angle_deg, &10.0, &90.0),
            status: Mutex::new(SteeringStatus::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SteeringStatus> {
        self.status.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl SteeringCtrl for LatchedSteering {
    fn set_steering_input(&self, input_pct: f64) {
        let input = if input_pct.is_finite() {
            clamp(&input_pct, &-100.0, &100.0)
        }
        else {
            0.0
        };

        let mut s = self.lock();
        s.input_pct = input;
        s.angle_deg = input / 100.0 * self.max_angle_deg;
    }

    fn center(&self) {
        self.set_steering_input(0.0);
    }

    fn status(&self) -> SteeringStatus {
        *self.lock()
    }
}

impl LatchedBrakes {
    pub fn new(params: &CollabParams) -> Self {
        let status = BrakeStatus {
            balance_pct: clamp(&params.brake_balance_pct, &0.0, &100.0),
            ..Default::default()
        };

        Self {
            max_force_pct: clamp(&params.max_brake_force_pct, &0.0, &100.0),
            status: Mutex::new(status),
        }
    }

    fn lock(&self) -> MutexGuard<'_, BrakeStatus> {
        self.status.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl BrakeCtrl for LatchedBrakes {
    fn apply_brake(&self, input_pct: f64) {
        let input = if input_pct.is_finite() {
            clamp(&input_pct, &0.0, &100.0)
        }
        else {
            0.0
        };

        let mut s = self.lock();
        s.input_pct = input;
        distribute(&mut s, self.max_force_pct);
    }

    fn set_balance(&self, balance_pct: f64) {
        if !balance_pct.is_finite() {
            return;
        }

        let mut s = self.lock();
        s.balance_pct = clamp(&balance_pct, &0.0, &100.0);
        distribute(&mut s, self.max_force_pct);
    }

    fn status(&self) -> BrakeStatus {
        *self.lock()
    }
}

impl PowerMonitor for NotFitted {
    fn get_power_snapshot(&self) -> PowerSnapshot {
        PowerSnapshot::default()
    }
}

impl TempSensor for NotFitted {
    fn get_temperature(&self) -> TemperatureReading {
        TemperatureReading::default()
    }
}

impl FrameSource for NotFitted {
    fn latest_frame(&mut self) -> Option<Vec<u8>> {
        None
    }
}

// ------------------------------------------------------------------------------------------------
// FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Split the brake input between the axles according to the balance.
fn distribute(s: &mut BrakeStatus, max_force_pct: f64) {
    let force = s.input_pct.min(max_force_pct);
    s.front_force_pct = force * (100.0 - s.balance_pct) / 100.0;
    s.rear_force_pct = force * s.balance_pct / 100.0;
}
