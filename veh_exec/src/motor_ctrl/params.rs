//! # Motor controller parameters

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use serde::Deserialize;

use super::zones::ZoneTable;

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Number of forward gears.
pub const NUM_GEARS: usize = 5;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MotorCtrlParams {

    // ---- HARDWARE ----

    /// Index of the I2C bus the PWM board is on.
    pub i2c_bus: u8,

    /// 7-bit address of the PCA9685 board.
    pub pwm_board_address: u8,

    /// PCA9685 channel driving the forward half bridge (RPWM).
    pub forward_channel: u8,

    /// PCA9685 channel driving the reverse half bridge (LPWM).
    pub reverse_channel: u8,

    /// Units: Hz
    pub pwm_frequency_hz: f64,

    // ---- CONTROL LOOP ----

    /// Units: Hz
    pub tick_rate_hz: f64,

    /// Time for an unobstructed ramp from 0 to 100% duty.
    ///
    /// Units: seconds
    pub ramp_time_s: f64,

    /// Units: seconds
    pub shift_time_s: f64,

    /// Factor applied to the wheel speed on every tick while the clutch is disengaged.
    pub clutch_decay: f64,

    // ---- TRANSMISSION ----

    /// Ratio of engine to wheel speed for each gear.
    pub gear_ratios: [f64; NUM_GEARS],

    /// Maximum duty cycle reachable in each gear.
    ///
    /// Units: percent
    pub gear_limiters: [f64; NUM_GEARS],

    /// Engine speed at zero throttle in each gear.
    ///
    /// Units: RPM
    pub idle_rpm: [f64; NUM_GEARS],

    pub zones: ZoneTable,

    // ---- DERIVED OUTPUTS ----

    /// Units: RPM
    pub max_rpm: f64,

    /// Lowest stable engine speed.
    ///
    /// Units: RPM
    pub min_rpm: f64,

    /// Amplitude of the engine speed noise.
    ///
    /// Units: RPM
    pub rpm_dither: f64,

    /// Units: meters
    pub wheel_circumference_m: f64,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl Default for MotorCtrlParams {
    fn default() -> Self {
        Self {
            i2c_bus: 1,
            pwm_board_address: 0x40,
            forward_channel: 0,
            reverse_channel: 1,
            pwm_frequency_hz: 1500.0,
            tick_rate_hz: 50.0,
            ramp_time_s: 2.0,
            shift_time_s: 0.3,
            clutch_decay: 0.95,
            gear_ratios: [3.5, 2.2, 1.4, 0.9, 0.7],
            gear_limiters: [40.0, 60.0, 80.0, 100.0, 100.0],
            idle_rpm: [1200.0; NUM_GEARS],
            zones: ZoneTable::default(),
            max_rpm: 19550.0,
            min_rpm: 800.0,
            rpm_dither: 50.0,
            wheel_circumference_m: 0.22,
        }
    }
}

impl MotorCtrlParams {
    /// Duty change per tick at the unmultiplied rate.
    ///
    /// Units: percent
    pub fn base_step(&self) -> f64 {
        let ticks = (self.ramp_time_s * self.tick_rate_hz).max(1.0);
        100.0 / ticks
    }

    /// Units: seconds
    pub fn tick_period_s(&self) -> f64 {
        1.0 / self.tick_rate_hz.max(1.0)
    }

    /// Parameters for gear `gear` (1 based), or `None` if out of range.
    pub fn gear_index(gear: u8) -> Option<usize> {
        match gear as usize {
            g @ 1..=NUM_GEARS => Some(g - 1),
            _ => None
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_base_step() {
        let p = MotorCtrlParams::default();
        assert_eq!(p.base_step(), 1.0);
        assert_eq!(p.tick_period_s(), 0.02);
    }

    #[test]
    fn test_gear_index() {
        assert_eq!(MotorCtrlParams::gear_index(0), None);
        assert_eq!(MotorCtrlParams::gear_index(1), Some(0));
        assert_eq!(MotorCtrlParams::gear_index(5), Some(4));
        assert_eq!(MotorCtrlParams::gear_index(6), None);
    }

    #[test]
    fn test_partial_toml() {
        let p: MotorCtrlParams = util::params::from_str(
            "pwm_frequency_hz = 1000.0\ngear_limiters = [50.0, 60.0, 70.0, 80.0, 90.0]"
        ).unwrap();

        assert_eq!(p.pwm_frequency_hz, 1000.0);
        assert_eq!(p.gear_limiters[0], 50.0);
        assert_eq!(p.gear_ratios[0], 3.5);
    }
}
