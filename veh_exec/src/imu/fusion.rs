//! # Sensor fusion
//!
//! Turns calibrated accelerations and angular rates into g-forces, driving events, integrated
//! attitude and force feedback intensities. Pure computation, no bus access.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use std::collections::VecDeque;

use comms_if::eqpt::imu::{Attitude, DrivingEvents, GForces, Haptics};
use util::maths::{clamp, std_dev, wrap_deg};

use super::params::Params;

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Standard gravity.
///
/// Units: m/s^2
pub const GRAVITY: f64 = 9.81;

/// Fraction of the frontal g-force applied to the seat pitch.
const SEAT_PITCH_FACTOR: f64 = 0.7;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Everything derived from one sample.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct FusionOutput {
    pub g_force: GForces,
    pub attitude: Attitude,
    pub events: DrivingEvents,
    pub haptics: Haptics,
}

/// Fusion state carried between samples.
#[derive(Debug, Clone)]
pub struct Fusion {
    params: Params,

    /// Recent accelerations, newest at the back.
    accel_history: VecDeque<[f64; 3]>,

    attitude: Attitude,

    /// Bouncing is only re-evaluated once the window is full, so it is latched here.
    bouncing: bool,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl Fusion {
    pub fn new(params: &Params) -> Self {
        Self {
            params: params.clone(),
            accel_history: VecDeque::with_capacity(params.buffer_size),
            attitude: Attitude::default(),
            bouncing: false,
        }
    }

    /// Fuse one sample.
    ///
    /// `accel` is in m/s^2, `gyro` in degrees/second, `dt_s` is the time since the previous
    /// sample in seconds.
    pub fn update(&mut self, accel: [f64; 3], gyro: [f64; 3], dt_s: f64) -> FusionOutput {
        self.push_history(accel);

        let g_force = g_forces(accel);
        let events = self.detect_events(accel, gyro);
        self.integrate(gyro, dt_s);
        let haptics = self.haptics(&g_force, &events, gyro[2]);

        FusionOutput {
            g_force,
            attitude: self.attitude,
            events,
            haptics
        }
    }

    /// Zero the integrated angles.
    pub fn reset_angles(&mut self) {
        self.attitude = Attitude::default();
    }

    pub fn attitude(&self) -> Attitude {
        self.attitude
    }

    /// Number of samples currently held in the history.
    pub fn history_len(&self) -> usize {
        self.accel_history.len()
    }

    fn push_history(&mut self, accel: [f64; 3]) {
        let cap = self.params.buffer_size.max(self.params.bounce_window).max(1);

        while self.accel_history.len() >= cap {
            self.accel_history.pop_front();
        }
        self.accel_history.push_back(accel);
    }

    fn detect_events(&mut self, accel: [f64; 3], gyro: [f64; 3]) -> DrivingEvents {
        let p = &self.params;

        // Positive yaw rate is a right hand turn
        let yaw_rate = gyro[2];
        let turning_right = yaw_rate > p.turn_threshold_dps;
        let turning_left = yaw_rate < -p.turn_threshold_dps;

        let accelerating = accel[0] > p.accel_threshold_ms2;
        let braking = accel[0] < -p.accel_threshold_ms2;

        let window = p.bounce_window;
        if window > 0 && self.accel_history.len() >= window {
            let recent_z: Vec<f64> = self.accel_history
                .iter()
                .skip(self.accel_history.len() - window)
                .map(|a| a[2])
                .collect();

            self.bouncing = std_dev(&recent_z)
                .map(|sd| sd > p.bounce_threshold_ms2)
                .unwrap_or(false);
        }

        let impact = accel[0].abs() > p.impact_threshold_ms2
            || accel[1].abs() > p.impact_threshold_ms2
            || (accel[2] - GRAVITY).abs() > p.impact_threshold_ms2;

        DrivingEvents {
            turning_left,
            turning_right,
            accelerating,
            braking,
            bouncing: self.bouncing,
            impact
        }
    }

    fn integrate(&mut self, gyro: [f64; 3], dt_s: f64) {
        if !dt_s.is_finite() || dt_s <= 0.0 {
            return;
        }

        self.attitude.roll = wrap_deg(self.attitude.roll + gyro[0] * dt_s);
        self.attitude.pitch = wrap_deg(self.attitude.pitch + gyro[1] * dt_s);
        self.attitude.yaw = wrap_deg(self.attitude.yaw + gyro[2] * dt_s);
    }

    fn haptics(&self, g: &GForces, events: &DrivingEvents, yaw_rate: f64) -> Haptics {
        let max_tilt = self.params.max_seat_tilt_deg;

        let yaw_component = (yaw_rate.abs() / 60.0 * 50.0).min(50.0);
        let steering = (g.lateral.abs() * 50.0 + yaw_component).min(100.0);

        let brake_resistance = if events.braking {
            (g.frontal.abs() * 60.0).min(100.0)
        }
        else {
            0.0
        };

        let accelerator = if events.accelerating {
            (g.frontal * 40.0).min(80.0)
        }
        else {
            0.0
        };

        // Both halves of a bounce shake the seat
        let mut seat_vibration = 0.0;
        if events.bouncing {
            seat_vibration = (g.vertical.abs() * 80.0).min(100.0);
        }
        if events.impact {
            seat_vibration = 100.0;
        }

        // Lateral g is signed, so it already carries the side of the turn
        let seat_tilt_x = clamp(&(g.lateral * max_tilt), &-max_tilt, &max_tilt);
        let seat_tilt_y = clamp(
            &(-g.frontal * max_tilt * SEAT_PITCH_FACTOR), 
            &-max_tilt, 
            &max_tilt
        );

        Haptics {
            steering,
            brake_resistance,
            accelerator,
            seat_vibration,
            seat_tilt_x,
            seat_tilt_y
        }
    }
}

// ------------------------------------------------------------------------------------------------
// FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// G-forces from an acceleration in m/s^2, with gravity removed from the vertical axis.
pub fn g_forces(accel: [f64; 3]) -> GForces {
    GForces {
        frontal: accel[0] / GRAVITY,
        lateral: accel[1] / GRAVITY,
        vertical: (accel[2] - GRAVITY) / GRAVITY,
    }
}
