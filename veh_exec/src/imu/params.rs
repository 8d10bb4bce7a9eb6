//! Parameters structure for the inertial sensor

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use serde::Deserialize;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Parameters for the inertial sensor driver and fusion.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Params {

    // ---- BUS ----

    /// Index of the I2C bus the sensor is on.
    pub i2c_bus: u8,

    /// 7-bit I2C address of the sensor, 0x68 with SDO low or 0x69 with SDO high.
    pub address: u8,

    // ---- SENSOR CONFIGURATION ----

    pub accel_range: AccelRange,

    pub gyro_range: GyroRange,

    /// Target output data rate, rounded up to the nearest supported rate.
    ///
    /// Units: Hz
    pub sample_rate_hz: u32,

    // ---- FUSION ----

    /// Number of samples kept in the history buffers.
    pub buffer_size: usize,

    /// Number of most recent vertical samples used for bounce detection.
    pub bounce_window: usize,

    /// Units: degrees/second
    pub turn_threshold_dps: f64,

    /// Units: m/s^2
    pub accel_threshold_ms2: f64,

    /// Standard deviation of the vertical acceleration above which the vehicle is bouncing.
    ///
    /// Units: m/s^2
    pub bounce_threshold_ms2: f64,

    /// Units: m/s^2
    pub impact_threshold_ms2: f64,

    /// Units: degrees
    pub max_seat_tilt_deg: f64,

    // ---- CALIBRATION ----

    /// Time to wait for the hardware fast offset compensation to finish.
    ///
    /// Units: seconds
    pub foc_wait_s: f64,

    /// Duration of the averaging pass.
    ///
    /// Units: seconds
    pub calibration_duration_s: f64,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Accelerometer measurement range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum AccelRange {
    #[serde(rename = "2g")]
    G2,
    #[serde(rename = "4g")]
    G4,
    #[serde(rename = "8g")]
    G8,
    #[serde(rename = "16g")]
    G16,
}

/// Gyroscope measurement range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum GyroRange {
    #[serde(rename = "125dps")]
    Dps125,
    #[serde(rename = "250dps")]
    Dps250,
    #[serde(rename = "500dps")]
    Dps500,
    #[serde(rename = "1000dps")]
    Dps1000,
    #[serde(rename = "2000dps")]
    Dps2000,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Default for Params {
    fn default() -> Self {
        Self {
            i2c_bus: 1,
            address: 0x68,
            accel_range: AccelRange::G2,
            gyro_range: GyroRange::Dps250,
            sample_rate_hz: 100,
            buffer_size: 50,
            bounce_window: 10,
            turn_threshold_dps: 10.0,
            accel_threshold_ms2: 1.5,
            bounce_threshold_ms2: 1.0,
            impact_threshold_ms2: 5.0,
            max_seat_tilt_deg: 15.0,
            foc_wait_s: 0.3,
            calibration_duration_s: 5.0,
        }
    }
}

impl AccelRange {
    /// Value written to the `ACC_RANGE` register.
    pub fn reg_value(&self) -> u8 {
        match self {
            AccelRange::G2 => 0x03,
            AccelRange::G4 => 0x05,
            AccelRange::G8 => 0x08,
            AccelRange::G16 => 0x0C,
        }
    }

    /// Full scale range.
    ///
    /// Units: g
    pub fn range_g(&self) -> u8 {
        match self {
            AccelRange::G2 => 2,
            AccelRange::G4 => 4,
            AccelRange::G8 => 8,
            AccelRange::G16 => 16,
        }
    }

    /// Units: g/LSB
    pub fn scale(&self) -> f64 {
        self.range_g() as f64 / 32768.0
    }
}

impl GyroRange {
    /// Value written to the `GYR_RANGE` register.
    pub fn reg_value(&self) -> u8 {
        match self {
            GyroRange::Dps2000 => 0x00,
            GyroRange::Dps1000 => 0x01,
            GyroRange::Dps500 => 0x02,
            GyroRange::Dps250 => 0x03,
            GyroRange::Dps125 => 0x04,
        }
    }

    /// Full scale range.
    ///
    /// Units: degrees/second
    pub fn range_dps(&self) -> u16 {
        match self {
            GyroRange::Dps125 => 125,
            GyroRange::Dps250 => 250,
            GyroRange::Dps500 => 500,
            GyroRange::Dps1000 => 1000,
            GyroRange::Dps2000 => 2000,
        }
    }

    /// Units: (degrees/second)/LSB
    pub fn scale(&self) -> f64 {
        self.range_dps() as f64 / 32768.0
    }
}

/// Output data rate code for the `*_CONF` registers, rounding the rate up.
pub fn odr_code(sample_rate_hz: u32) -> u8 {
    match sample_rate_hz {
        0..=25 => 0x06,
        26..=50 => 0x07,
        51..=100 => 0x08,
        101..=200 => 0x09,
        201..=400 => 0x0A,
        401..=800 => 0x0B,
        _ => 0x0C,
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_odr_code() {
        assert_eq!(odr_code(25), 0x06);
        assert_eq!(odr_code(100), 0x08);
        assert_eq!(odr_code(101), 0x09);
        assert_eq!(odr_code(5000), 0x0C);
    }

    #[test]
    fn test_params_from_toml() {
        let p: Params = util::params::from_str(
            "accel_range = \"4g\"\ngyro_range = \"500dps\"\nsample_rate_hz = 200"
        ).unwrap();

        assert_eq!(p.accel_range, AccelRange::G4);
        assert_eq!(p.gyro_range.reg_value(), 0x02);
        assert_eq!(p.address, 0x68);
        assert_eq!(p.accel_range.scale(), 4.0 / 32768.0);
    }
}
