//! # Vehicle Executable Parameters
//!
//! This module provide parameters for the vehicle executable.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use serde::Deserialize;

use crate::collab::CollabParams;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct VehExecParams {

    /// Rate of the telemetry cycle
    pub cycle_rate_hz: f64,

    /// Run the sensor's offset calibration before entering the main loop
    pub calibrate_on_start: bool,

    /// Cut the throttle and apply full brake when an impact is detected
    pub stop_on_impact: bool,

    /// Period between status summaries in the log, zero disables them
    pub status_log_period_s: f64,

    /// Name of the network parameter file
    pub net_params_file: String,

    /// Name of the sensor parameter file
    pub imu_params_file: String,

    /// Name of the motor controller parameter file
    pub motor_ctrl_params_file: String,

    /// Steering and brake defaults
    pub collab: CollabParams,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl Default for VehExecParams {
    fn default() -> Self {
        Self {
            cycle_rate_hz: 30.0,
            calibrate_on_start: false,
            stop_on_impact: false,
            status_log_period_s: 10.0,
            net_params_file: "net.toml".into(),
            imu_params_file: "imu.toml".into(),
            motor_ctrl_params_file: "motor_ctrl.toml".into(),
            collab: CollabParams::default(),
        }
    }
}

impl VehExecParams {
    /// Target period of one telemetry cycle.
    ///
    /// Rates outside 1 to 1000 Hz are clamped.
    pub fn cycle_period_s(&self) -> f64 {
        let rate = if self.cycle_rate_hz.is_finite() {
            util::maths::clamp(&self.cycle_rate_hz, &1.0, &1000.0)
        }
        else {
            30.0
        };

        1.0 / rate
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_partial_file_keeps_defaults() {
        let p: VehExecParams = util::params::from_str(
            "cycle_rate_hz = 60.0\n\
             stop_on_impact = true\n\
             [collab]\n\
             brake_balance_pct = 55.0\n"
        ).unwrap();

        assert_eq!(p.cycle_rate_hz, 60.0);
        assert!(p.stop_on_impact);
        assert!(!p.calibrate_on_start);
        assert_eq!(p.imu_params_file, "imu.toml");
        assert_eq!(p.collab.brake_balance_pct, 55.0);
        assert_eq!(p.collab.max_steering_angle_deg, 45.0);
    }

    #[test]
    fn test_cycle_period() {
        let mut p = VehExecParams::default();
        assert!((p.cycle_period_s() - 1.0 / 30.0).abs() < 1e-12);

        p.cycle_rate_hz = 0.0;
        assert_eq!(p.cycle_period_s(), 1.0);

        p.cycle_rate_hz = f64::NAN;
        assert!((p.cycle_period_s() - 1.0 / 30.0).abs() < 1e-12);
    }
}
