//! # Motor state machine
//!
//! Everything the control loop computes on a tick, kept free of threads and hardware so it can be
//! stepped deterministically.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use std::f64::consts::PI;

use comms_if::eqpt::motor::{Direction, EfficiencyZone, MotorStatus};
use util::maths::{clamp, lin_map};

use super::params::{MotorCtrlParams, NUM_GEARS};

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Duty error below which the ramp snaps onto the target.
///
/// Units: percent
const SNAP_THRESHOLD: f64 = 0.1;

/// Exponent of the engine speed response curve.
const RPM_CURVE_EXPONENT: f64 = 0.7;

/// Frequency of the engine speed noise.
///
/// Units: Hz
const DITHER_FREQ_HZ: f64 = 3.0;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct MotorState {
    pub direction: Direction,

    /// Units: percent
    pub current_duty: f64,

    /// Units: percent
    pub target_duty: f64,

    /// Last commanded throttle, reapplied after a gear change.
    ///
    /// Units: percent
    pub throttle: f64,

    /// Current gear, 1 based.
    pub gear: u8,

    pub clutch_engaged: bool,

    pub shifting: bool,

    pub zone: EfficiencyZone,

    pub engine_rpm: f64,

    pub wheel_rpm: f64,

    pub speed_kmh: f64,

    pub gear_changes: u64,

    pub runtime_s: f64,

    pub distance_km: f64,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl MotorState {
    /// Stopped in first gear with the clutch engaged.
    pub fn new(params: &MotorCtrlParams) -> Self {
        Self {
            direction: Direction::Stopped,
            current_duty: 0.0,
            target_duty: 0.0,
            throttle: 0.0,
            gear: 1,
            clutch_engaged: true,
            shifting: false,
            zone: params.zones.classify(1, 0.0),
            engine_rpm: params.idle_rpm[0],
            wheel_rpm: 0.0,
            speed_kmh: 0.0,
            gear_changes: 0,
            runtime_s: 0.0,
            distance_km: 0.0,
        }
    }

    /// Command a throttle position, clamped to `[0, 100]`.
    ///
    /// The target duty is the throttle scaled by the current gear's limiter. A stopped motor starts
    /// moving forward on any positive throttle.
    pub fn set_throttle(&mut self, params: &MotorCtrlParams, throttle_pct: f64) {
        let throttle = if throttle_pct.is_finite() {
            clamp(&throttle_pct, &0.0, &100.0)
        }
        else {
            0.0
        };

        self.throttle = throttle;

        if throttle > 0.0 && self.direction == Direction::Stopped {
            self.direction = Direction::Forward;
        }

        self.target_duty = self.mapped_duty(params, throttle);
    }

    /// Select the drive direction.
    pub fn set_reverse(&mut self, reverse: bool) {
        self.direction = if reverse {
            Direction::Reverse
        }
        else {
            Direction::Forward
        };
    }

    /// Cut the output immediately.
    pub fn emergency_stop(&mut self) {
        self.direction = Direction::Stopped;
        self.throttle = 0.0;
        self.target_duty = 0.0;
        self.current_duty = 0.0;
    }

    /// Start a change to `new_gear`, disengaging the clutch.
    ///
    /// Returns `false` without changing anything if the gear is out of range, already selected, or
    /// a change is in progress.
    pub fn begin_shift(&mut self, new_gear: u8) -> bool {
        if MotorCtrlParams::gear_index(new_gear).is_none() 
            || new_gear == self.gear 
            || self.shifting 
        {
            return false;
        }

        self.shifting = true;
        self.clutch_engaged = false;
        true
    }

    /// Finish a change started with [`MotorState::begin_shift`].
    ///
    /// Re-engages the clutch and reapplies the last throttle against the new gear's limiter.
    pub fn complete_shift(&mut self, params: &MotorCtrlParams, new_gear: u8) {
        if !self.shifting || MotorCtrlParams::gear_index(new_gear).is_none() {
            return;
        }

        self.gear = new_gear;
        self.clutch_engaged = true;
        self.shifting = false;
        self.gear_changes += 1;

        if self.throttle > 0.0 {
            self.target_duty = self.mapped_duty(params, self.throttle);
        }
    }

    /// Advance the state by one control tick of length `dt_s` seconds.
    pub fn step(&mut self, params: &MotorCtrlParams, dt_s: f64) {
        self.zone = params.zones.classify(self.gear, self.current_duty);
        self.ramp(params);

        self.runtime_s += dt_s;
        self.engine_rpm = self.engine_rpm(params);

        if !self.clutch_engaged {
            self.wheel_rpm *= params.clutch_decay;
        }
        else if self.current_duty > 0.0 && self.direction != Direction::Stopped {
            self.wheel_rpm = self.engine_rpm / self.gear_ratio(params);
        }
        else {
            self.wheel_rpm = 0.0;
        }

        self.speed_kmh = self.wheel_rpm * params.wheel_circumference_m * 60.0 / 1000.0;
        self.distance_km += self.speed_kmh * dt_s / 3600.0;
    }

    pub fn gear_ratio(&self, params: &MotorCtrlParams) -> f64 {
        params.gear_ratios[self.gear_idx()]
    }

    pub fn status(&self, params: &MotorCtrlParams, hardware_ready: bool) -> MotorStatus {
        MotorStatus {
            direction: self.direction,
            current_duty: self.current_duty,
            target_duty: self.target_duty,
            throttle: self.throttle,
            gear: self.gear,
            gear_ratio: self.gear_ratio(params),
            clutch_engaged: self.clutch_engaged,
            shifting: self.shifting,
            zone: self.zone,
            zone_multiplier: self.zone.multiplier(),
            ideal_zone_pct: params.zones.ideal_zone_pct(self.gear, self.current_duty),
            engine_rpm: self.engine_rpm,
            wheel_rpm: self.wheel_rpm,
            speed_kmh: self.speed_kmh,
            gear_changes: self.gear_changes,
            runtime_s: self.runtime_s,
            distance_km: self.distance_km,
            hardware_ready,
        }
    }

    /// Move the duty towards the target. Acceleration is scaled by the zone, deceleration never is.
    fn ramp(&mut self, params: &MotorCtrlParams) {
        let diff = self.target_duty - self.current_duty;
        let base = params.base_step();

        if diff.abs() < SNAP_THRESHOLD {
            self.current_duty = self.target_duty;
        }
        else if diff > 0.0 {
            self.current_duty += (base * self.zone.multiplier()).min(diff);
        }
        else {
            self.current_duty -= base.min(-diff);
        }
    }

    fn engine_rpm(&self, params: &MotorCtrlParams) -> f64 {
        let i = self.gear_idx();
        let idle = params.idle_rpm[i];
        let limiter = params.gear_limiters[i];

        let pos = if limiter > 0.0 {
            clamp(&(self.current_duty / limiter), &0.0, &1.0)
        }
        else {
            0.0
        };

        let dither = params.rpm_dither * (2.0 * PI * DITHER_FREQ_HZ * self.runtime_s).sin();
        let rpm = lin_map((0.0, 1.0), (idle, params.max_rpm), pos.powf(RPM_CURVE_EXPONENT)) + dither;

        clamp(&rpm, &params.min_rpm, &params.max_rpm)
    }

    fn mapped_duty(&self, params: &MotorCtrlParams, throttle: f64) -> f64 {
        throttle / 100.0 * params.gear_limiters[self.gear_idx()]
    }

    fn gear_idx(&self) -> usize {
        MotorCtrlParams::gear_index(self.gear).unwrap_or(0).min(NUM_GEARS - 1)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn params() -> MotorCtrlParams {
        MotorCtrlParams {
            rpm_dither: 0.0,
            ..Default::default()
        }
    }

    fn run(state: &mut MotorState, p: &MotorCtrlParams, ticks: usize) {
        for _ in 0..ticks {
            state.step(p, p.tick_period_s());
        }
    }

    #[test]
    fn test_throttle_mapping() {
        let p = params();
        let mut s = MotorState::new(&p);

        s.set_throttle(&p, 50.0);
        assert_eq!(s.target_duty, 20.0);
        assert_eq!(s.direction, Direction::Forward);

        s.set_throttle(&p, 150.0);
        assert_eq!(s.throttle, 100.0);
        assert_eq!(s.target_duty, 40.0);

        s.set_throttle(&p, f64::NAN);
        assert_eq!(s.target_duty, 0.0);
    }

    #[test]
    fn test_ideal_ramp_is_one_percent_per_tick() {
        let p = params();
        let mut s = MotorState::new(&p);
        s.set_throttle(&p, 50.0);

        run(&mut s, &p, 10);
        assert!((s.current_duty - 10.0).abs() < 1e-9);
        assert_eq!(s.zone, EfficiencyZone::Ideal);

        run(&mut s, &p, 10);
        assert!((s.current_duty - 20.0).abs() < 1e-9);
        run(&mut s, &p, 5);
        assert!((s.current_duty - 20.0).abs() < 1e-9);
    }

    #[test]
    fn test_acceleration_slows_outside_ideal_band() {
        let p = params();
        let mut s = MotorState::new(&p);
        s.gear = 5;
        s.set_throttle(&p, 100.0);

        // Poor zone from 0 to 70% duty in fifth gear
        s.step(&p, 0.02);
        assert!((s.current_duty - 0.05).abs() < 1e-9);
        assert_eq!(s.zone, EfficiencyZone::Poor);
    }

    #[test]
    fn test_deceleration_is_never_scaled() {
        let p = params();
        let mut s = MotorState::new(&p);
        s.gear = 5;
        s.direction = Direction::Forward;
        s.current_duty = 50.0;
        s.target_duty = 0.0;

        s.step(&p, 0.02);
        assert_eq!(s.zone, EfficiencyZone::Poor);
        assert!((s.current_duty - 49.0).abs() < 1e-9);
    }

    #[test]
    fn test_shift_reapplies_throttle() {
        let p = params();
        let mut s = MotorState::new(&p);
        s.set_throttle(&p, 50.0);

        assert!(!s.begin_shift(0));
        assert!(!s.begin_shift(1));
        assert!(s.begin_shift(2));
        assert!(!s.begin_shift(3));
        assert!(!s.clutch_engaged);

        s.complete_shift(&p, 2);
        assert_eq!(s.gear, 2);
        assert!(s.clutch_engaged);
        assert_eq!(s.gear_changes, 1);
        assert_eq!(s.target_duty, 30.0);
        assert_eq!(s.gear_ratio(&p), 2.2);
    }

    #[test]
    fn test_clutch_slip_decays_wheel_speed() {
        let p = params();
        let mut s = MotorState::new(&p);
        s.set_throttle(&p, 100.0);
        run(&mut s, &p, 40);

        let engaged = s.wheel_rpm;
        assert!((engaged - s.engine_rpm / 3.5).abs() < 1e-9);
        assert!(s.speed_kmh > 0.0);

        assert!(s.begin_shift(2));
        s.step(&p, 0.02);
        assert!((s.wheel_rpm - engaged * 0.95).abs() < 1e-6);
    }

    #[test]
    fn test_engine_rpm_curve() {
        let p = params();
        let mut s = MotorState::new(&p);

        s.step(&p, 0.02);
        assert_eq!(s.engine_rpm, 1200.0);
        assert_eq!(s.wheel_rpm, 0.0);

        // Full limiter in first gear is max speed
        s.direction = Direction::Forward;
        s.current_duty = 40.0;
        s.target_duty = 40.0;
        s.step(&p, 0.02);
        assert_eq!(s.engine_rpm, 19550.0);

        // Wheel speed and road speed follow the ratio and circumference
        assert!((s.wheel_rpm - 19550.0 / 3.5).abs() < 1e-9);
        assert!((s.speed_kmh - 19550.0 / 3.5 * 0.22 * 0.06).abs() < 1e-9);
    }

    #[test]
    fn test_emergency_stop() {
        let p = params();
        let mut s = MotorState::new(&p);
        s.set_throttle(&p, 80.0);
        run(&mut s, &p, 10);
        assert!(s.begin_shift(2));

        s.emergency_stop();
        assert_eq!(s.current_duty, 0.0);
        assert_eq!(s.direction, Direction::Stopped);

        // Finishing the shift must not restart the motor
        s.complete_shift(&p, 2);
        assert_eq!(s.target_duty, 0.0);
    }
}
