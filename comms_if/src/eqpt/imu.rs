//! # Inertial sensor records

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use serde::{Deserialize, Serialize};

use crate::tlm::{insert, TlmMap, ToTlm};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Accelerations expressed as multiples of standard gravity.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct GForces {
    pub frontal: f64,
    pub lateral: f64,
    pub vertical: f64,
}

/// Integrated attitude angles.
///
/// Units: degrees, in `[0, 360)`.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Attitude {
    pub roll: f64,
    pub pitch: f64,
    pub yaw: f64,
}

/// Driving events detected from the latest sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DrivingEvents {
    pub turning_left: bool,
    pub turning_right: bool,
    pub accelerating: bool,
    pub braking: bool,
    pub bouncing: bool,
    pub impact: bool,
}

/// Intensities for the operator's force feedback devices.
///
/// Intensities are percentages in `[0, 100]`, tilts are degrees in `[-15, 15]`.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Haptics {
    pub steering: f64,
    pub brake_resistance: f64,
    pub accelerator: f64,
    pub seat_vibration: f64,
    pub seat_tilt_x: f64,
    pub seat_tilt_y: f64,
}

/// One fused snapshot of the inertial sensor.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct TelemetryRecord {
    /// Raw accelerometer samples (x, y, z).
    ///
    /// Units: LSB
    pub accel_raw: [i16; 3],

    /// Raw gyroscope samples (x, y, z).
    ///
    /// Units: LSB
    pub gyro_raw: [i16; 3],

    /// Calibrated acceleration.
    ///
    /// Units: m/s^2
    pub accel_ms2: [f64; 3],

    /// Calibrated angular rate.
    ///
    /// Units: degrees/second
    pub gyro_dps: [f64; 3],

    pub g_force: GForces,

    pub attitude: Attitude,

    pub events: DrivingEvents,

    pub haptics: Haptics,

    /// Number of successful reads since start up.
    pub seq: u64,

    /// UNIX time of the read in seconds.
    pub timestamp: f64,
}

/// Configuration and health of the inertial sensor.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ImuStatus {
    pub initialised: bool,
    pub sample_rate_hz: u32,
    pub accel_range_g: u8,
    pub gyro_range_dps: u16,

    /// Units: g/LSB
    pub accel_scale: f64,

    /// Units: (degrees/second)/LSB
    pub gyro_scale: f64,

    pub read_errors: u64,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

const AXES: [&str; 3] = ["x", "y", "z"];

impl ToTlm for TelemetryRecord {
    fn to_tlm(&self) -> TlmMap {
        let mut map = TlmMap::new();

        for (i, axis) in AXES.iter().enumerate() {
            insert(&mut map, &format!("bmi160_accel_{}_raw", axis), self.accel_raw[i]);
            insert(&mut map, &format!("bmi160_gyro_{}_raw", axis), self.gyro_raw[i]);
            insert(&mut map, &format!("bmi160_accel_{}", axis), self.accel_ms2[i]);
            insert(&mut map, &format!("bmi160_gyro_{}", axis), self.gyro_dps[i]);
        }

        insert(&mut map, "g_force_frontal", self.g_force.frontal);
        insert(&mut map, "g_force_lateral", self.g_force.lateral);
        insert(&mut map, "g_force_vertical", self.g_force.vertical);

        insert(&mut map, "roll_angle", self.attitude.roll);
        insert(&mut map, "pitch_angle", self.attitude.pitch);
        insert(&mut map, "yaw_angle", self.attitude.yaw);

        insert(&mut map, "is_turning_left", self.events.turning_left);
        insert(&mut map, "is_turning_right", self.events.turning_right);
        insert(&mut map, "is_accelerating", self.events.accelerating);
        insert(&mut map, "is_braking", self.events.braking);
        insert(&mut map, "is_bouncing", self.events.bouncing);
        insert(&mut map, "impact_detected", self.events.impact);

        insert(&mut map, "steering_feedback_intensity", self.haptics.steering);
        insert(&mut map, "brake_pedal_resistance", self.haptics.brake_resistance);
        insert(&mut map, "accelerator_feedback", self.haptics.accelerator);
        insert(&mut map, "seat_vibration_intensity", self.haptics.seat_vibration);
        insert(&mut map, "seat_tilt_x", self.haptics.seat_tilt_x);
        insert(&mut map, "seat_tilt_y", self.haptics.seat_tilt_y);

        insert(&mut map, "readings_count", self.seq);
        insert(&mut map, "timestamp", self.timestamp);

        map
    }
}

impl ToTlm for ImuStatus {
    fn to_tlm(&self) -> TlmMap {
        let mut map = TlmMap::new();
        insert(&mut map, "is_initialized", self.initialised);
        insert(&mut map, "sample_rate", self.sample_rate_hz);
        insert(&mut map, "accel_range_g", self.accel_range_g);
        insert(&mut map, "gyro_range_dps", self.gyro_range_dps);
        insert(&mut map, "accel_scale_factor", self.accel_scale);
        insert(&mut map, "gyro_scale_factor", self.gyro_scale);
        insert(&mut map, "imu_read_errors", self.read_errors);
        map
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::tlm::TlmValue;

    #[test]
    fn test_record_flattens_with_expected_keys() {
        let rec = TelemetryRecord {
            accel_raw: [0, 0, 16384],
            accel_ms2: [0.0, 0.0, 9.81],
            events: DrivingEvents { braking: true, ..Default::default() },
            seq: 3,
            ..Default::default()
        };

        let map = rec.to_tlm();
        assert_eq!(map["bmi160_accel_z_raw"], TlmValue::Int(16384));
        assert_eq!(map["bmi160_accel_z"], TlmValue::Float(9.81));
        assert_eq!(map["is_braking"], TlmValue::Bool(true));
        assert_eq!(map["readings_count"], TlmValue::Int(3));

        // No nested values in the sensor record
        assert!(map.values().all(|v| !matches!(v, TlmValue::Map(_))));
    }
}
