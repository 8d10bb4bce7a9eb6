//! # Inertial Measurement Unit
//!
//! Owns the BMI160 and its bus, converts raw samples into physical units and runs the fusion on
//! every new sample. A sensor that fails to come up leaves the rest of the vehicle running, its
//! telemetry simply stays at the last known (initially zero) values.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

pub mod bmi160;
pub mod calib;
pub mod fusion;
pub mod params;

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use std::fmt;
use std::thread;
use std::time::{Duration, Instant};

use comms_if::eqpt::imu::{ImuStatus, TelemetryRecord};
use log::{debug, error, info, warn};
use util::logger::RateLimiter;

pub use bmi160::{Bmi160, BusError, I2cBus, RawSample};
pub use calib::CalibrationOffsets;
pub use params::Params;

use calib::CalibrationAccumulator;
use fusion::{Fusion, GRAVITY};

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Minimum time between two read failure warnings.
const READ_WARN_INTERVAL: Duration = Duration::from_secs(5);

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Sensor manager.
pub struct Imu {
    params: Params,

    device: Option<Bmi160>,

    initialised: bool,

    offsets: CalibrationOffsets,

    fusion: Fusion,

    latest: TelemetryRecord,

    last_update: Option<Instant>,

    seq: u64,

    read_errors: u64,

    read_warn: RateLimiter,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// Steps of the start-up sequence, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitStep {
    CheckChipId,
    SoftReset,
    RecheckChipId,
    EnableAccel,
    AccelRange,
    AccelConf,
    EnableGyro,
    GyroRange,
    GyroConf,
    TestRead,
}

#[derive(Debug, thiserror::Error)]
pub enum ImuError {
    #[error("No I2C bus is available for the sensor")]
    NoBus,

    #[error("Initialisation failed at {step}: {source}")]
    InitFailed {
        step: InitStep,
        source: BusError
    },

    #[error("Unexpected chip ID 0x{found:02X} at {step}, expected 0xD1")]
    WrongChipId {
        step: InitStep,
        found: u8
    },

    #[error("The sensor is not initialised")]
    NotInitialised,

    #[error("No samples could be read during calibration")]
    NoCalibrationSamples,

    #[error(transparent)]
    Bus(#[from] BusError),
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl fmt::Display for InitStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            InitStep::CheckChipId => "chip ID check",
            InitStep::SoftReset => "soft reset",
            InitStep::RecheckChipId => "chip ID check after reset",
            InitStep::EnableAccel => "accelerometer enable",
            InitStep::AccelRange => "accelerometer range",
            InitStep::AccelConf => "accelerometer data rate",
            InitStep::EnableGyro => "gyroscope enable",
            InitStep::GyroRange => "gyroscope range",
            InitStep::GyroConf => "gyroscope data rate",
            InitStep::TestRead => "test read",
        };

        write!(f, "{}", s)
    }
}

impl Imu {
    /// Create the manager. `bus` is `None` on hosts without an I2C bus, in which case
    /// [`Imu::init`] always fails.
    pub fn new(params: &Params, bus: Option<Box<dyn I2cBus>>) -> Self {
        Self {
            params: params.clone(),
            device: bus.map(|b| Bmi160::new(b, params.address)),
            initialised: false,
            offsets: CalibrationOffsets::default(),
            fusion: Fusion::new(params),
            latest: TelemetryRecord::default(),
            last_update: None,
            seq: 0,
            read_errors: 0,
            read_warn: RateLimiter::new(READ_WARN_INTERVAL),
        }
    }

    /// Bring the sensor up. Returns `true` on success.
    pub fn init(&mut self) -> bool {
        match self.try_init() {
            Ok(()) => {
                info!(
                    "BMI160 initialised at 0x{:02X} (accel {:?}, gyro {:?}, {} Hz)",
                    self.params.address,
                    self.params.accel_range,
                    self.params.gyro_range,
                    self.params.sample_rate_hz
                );
                self.initialised = true;
                self.last_update = Some(Instant::now());
                true
            },
            Err(e) => {
                error!("BMI160 initialisation failed: {}", e);
                self.initialised = false;
                false
            }
        }
    }

    pub fn is_initialised(&self) -> bool {
        self.initialised
    }

    /// Take a new sample if one is due. See [`Imu::update_at`].
    pub fn update(&mut self) -> Option<TelemetryRecord> {
        self.update_at(Instant::now())
    }

    /// Take a new sample if at least one sample period has passed since the last one.
    ///
    /// Returns the new record, or `None` if no sample was due, the sensor is not initialised or
    /// the read failed. In every case [`Imu::latest`] holds the last good record.
    pub fn update_at(&mut self, now: Instant) -> Option<TelemetryRecord> {
        if !self.initialised {
            return None;
        }

        let dt_s = match self.last_update {
            Some(t) => now.saturating_duration_since(t).as_secs_f64(),
            None => 0.0
        };

        if self.last_update.is_some() && dt_s < self.sample_period_s() {
            return None;
        }

        let (raw, accel, gyro) = match self.read_converted() {
            Ok(s) => s,
            Err(e) => {
                self.read_errors += 1;
                if let Some(n) = self.read_warn.check() {
                    warn!("BMI160 read failed: {} ({} more failures suppressed)", e, n);
                }
                return None;
            }
        };

        let (accel, gyro) = self.offsets.apply(accel, gyro);
        let out = self.fusion.update(accel, gyro, dt_s);

        self.seq += 1;
        self.last_update = Some(now);

        self.latest = TelemetryRecord {
            accel_raw: raw.accel,
            gyro_raw: raw.gyro,
            accel_ms2: accel,
            gyro_dps: gyro,
            g_force: out.g_force,
            attitude: out.attitude,
            events: out.events,
            haptics: out.haptics,
            seq: self.seq,
            timestamp: util::time::unix_timestamp_s(),
        };

        Some(self.latest)
    }

    /// The most recent good record.
    pub fn latest(&self) -> TelemetryRecord {
        self.latest
    }

    pub fn status(&self) -> ImuStatus {
        ImuStatus {
            initialised: self.initialised,
            sample_rate_hz: self.params.sample_rate_hz,
            accel_range_g: self.params.accel_range.range_g(),
            gyro_range_dps: self.params.gyro_range.range_dps(),
            accel_scale: self.params.accel_range.scale(),
            gyro_scale: self.params.gyro_range.scale(),
            read_errors: self.read_errors,
        }
    }

    pub fn offsets(&self) -> CalibrationOffsets {
        self.offsets
    }

    pub fn set_offsets(&mut self, offsets: CalibrationOffsets) {
        self.offsets = offsets;
    }

    /// Calibrate the sensor, which must be stationary and level.
    ///
    /// Runs the hardware fast offset compensation, then averages samples for the configured
    /// duration. The resulting offsets replace the current ones.
    pub fn calibrate(&mut self) -> Result<CalibrationOffsets, ImuError> {
        if !self.initialised {
            return Err(ImuError::NotInitialised);
        }

        info!(
            "Calibrating BMI160 for {:.1} s, keep the vehicle stationary and level", 
            self.params.calibration_duration_s
        );

        let device = self.device.as_mut().ok_or(ImuError::NoBus)?;
        match device.start_foc() {
            Ok(()) => {
                thread::sleep(secs(self.params.foc_wait_s));
                debug!("Fast offset compensation complete");
            },
            Err(e) => warn!("Could not start fast offset compensation: {}", e)
        }

        let mut acc = CalibrationAccumulator::new();
        let duration = secs(self.params.calibration_duration_s);
        let period = secs(self.sample_period_s());
        let start = Instant::now();

        while start.elapsed() < duration {
            match self.read_converted() {
                Ok((_, accel, gyro)) => acc.add(accel, gyro),
                Err(e) => {
                    self.read_errors += 1;
                    debug!("Calibration read failed: {}", e);
                }
            }

            thread::sleep(period);
        }

        let offsets = acc.finish().ok_or(ImuError::NoCalibrationSamples)?;
        self.offsets = offsets;

        info!(
            "Calibration complete over {} samples: accel {:?} m/s^2, gyro {:?} deg/s",
            offsets.num_samples, offsets.accel, offsets.gyro
        );

        Ok(offsets)
    }

    /// Zero the integrated attitude.
    pub fn reset_angles(&mut self) {
        self.fusion.reset_angles();
        self.latest.attitude = self.fusion.attitude();
        info!("Attitude angles reset");
    }

    /// Put the sensor into suspend mode. Returns `true` if the sensor was suspended.
    pub fn suspend(&mut self) -> bool {
        if !self.initialised {
            return false;
        }

        self.initialised = false;

        match self.device.as_mut().map(|d| d.suspend()) {
            Some(Ok(())) => {
                info!("BMI160 suspended");
                true
            },
            Some(Err(e)) => {
                warn!("Could not suspend the BMI160: {}", e);
                false
            },
            None => false
        }
    }

    fn try_init(&mut self) -> Result<(), ImuError> {
        let device = self.device.as_mut().ok_or(ImuError::NoBus)?;

        device.init(
            self.params.accel_range,
            self.params.gyro_range,
            params::odr_code(self.params.sample_rate_hz)
        )
    }

    /// Read one sample and convert it to m/s^2 and degrees/second, without offsets.
    fn read_converted(&mut self) -> Result<(RawSample, [f64; 3], [f64; 3]), ImuError> {
        let device = self.device.as_mut().ok_or(ImuError::NoBus)?;
        let raw = device.read_raw()?;

        let accel_scale = self.params.accel_range.scale() * GRAVITY;
        let gyro_scale = self.params.gyro_range.scale();

        let mut accel = [0f64; 3];
        let mut gyro = [0f64; 3];
        for i in 0..3 {
            accel[i] = raw.accel[i] as f64 * accel_scale;
            gyro[i] = raw.gyro[i] as f64 * gyro_scale;
        }

        Ok((raw, accel, gyro))
    }

    fn sample_period_s(&self) -> f64 {
        1.0 / self.params.sample_rate_hz.max(1) as f64
    }
}

fn secs(s: f64) -> Duration {
    if s.is_finite() && s > 0.0 {
        Duration::from_secs_f64(s)
    }
    else {
        Duration::from_secs(0)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use bmi160::{cmd, reg};
    use embedded_hal::blocking::i2c::{Write, WriteRead};
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    /// In-memory BMI160 register file.
    #[derive(Default)]
    struct FakeState {
        regs: HashMap<u8, u8>,
        writes: Vec<(u8, u8)>,
        fail_writes_to: Option<(u8, u8)>,
        fail_reads: bool,
    }

    #[derive(Clone, Default)]
    struct FakeBus(Arc<Mutex<FakeState>>);

    #[derive(Debug)]
    struct FakeError;

    impl FakeBus {
        fn bmi160() -> Self {
            let bus = Self::default();
            bus.0.lock().unwrap().regs.insert(reg::CHIP_ID, bmi160::CHIP_ID);
            bus
        }

        fn set_block(&self, start: u8, axes: [i16; 3]) {
            let mut s = self.0.lock().unwrap();
            for (i, v) in axes.iter().enumerate() {
                let b = v.to_le_bytes();
                s.regs.insert(start + 2 * i as u8, b[0]);
                s.regs.insert(start + 2 * i as u8 + 1, b[1]);
            }
        }

        fn writes(&self) -> Vec<(u8, u8)> {
            self.0.lock().unwrap().writes.clone()
        }
    }

    impl Write for FakeBus {
        type Error = FakeError;

        fn write(&mut self, _addr: u8, bytes: &[u8]) -> Result<(), FakeError> {
            let mut s = self.0.lock().unwrap();
            let w = (bytes[0], bytes[1]);
            if s.fail_writes_to == Some(w) {
                return Err(FakeError);
            }
            s.writes.push(w);
            Ok(())
        }
    }

    impl WriteRead for FakeBus {
        type Error = FakeError;

        fn write_read(
            &mut self, 
            _addr: u8, 
            bytes: &[u8], 
            buffer: &mut [u8]
        ) -> Result<(), FakeError> {
            let s = self.0.lock().unwrap();
            if s.fail_reads {
                return Err(FakeError);
            }
            for (i, b) in buffer.iter_mut().enumerate() {
                *b = *s.regs.get(&(bytes[0] + i as u8)).unwrap_or(&0);
            }
            Ok(())
        }
    }

    fn fast_params() -> Params {
        Params {
            foc_wait_s: 0.0,
            calibration_duration_s: 0.05,
            sample_rate_hz: 1000,
            ..Default::default()
        }
    }

    #[test]
    fn test_init_sequence_order() {
        let bus = FakeBus::bmi160();
        let mut imu = Imu::new(&Params::default(), Some(Box::new(bus.clone())));

        assert!(imu.init());
        assert!(imu.is_initialised());

        // 100 Hz with normal filter mode
        assert_eq!(
            bus.writes(),
            vec![
                (reg::CMD, cmd::SOFT_RESET),
                (reg::CMD, cmd::ACC_NORMAL),
                (reg::ACC_RANGE, 0x03),
                (reg::ACC_CONF, 0x28),
                (reg::CMD, cmd::GYR_NORMAL),
                (reg::GYR_RANGE, 0x03),
                (reg::GYR_CONF, 0x28),
            ]
        );
    }

    #[test]
    fn test_init_failures() {
        // Wrong device
        let bus = FakeBus::default();
        bus.0.lock().unwrap().regs.insert(reg::CHIP_ID, 0x00);
        let mut dev = Bmi160::new(Box::new(bus), 0x68);
        assert!(matches!(
            dev.init(params::AccelRange::G2, params::GyroRange::Dps250, 0x08),
            Err(ImuError::WrongChipId { step: InitStep::CheckChipId, found: 0x00 })
        ));

        // Gyro enable rejected, nothing after it is written
        let bus = FakeBus::bmi160();
        bus.0.lock().unwrap().fail_writes_to = Some((reg::CMD, cmd::GYR_NORMAL));
        let mut dev = Bmi160::new(Box::new(bus.clone()), 0x68);
        assert!(matches!(
            dev.init(params::AccelRange::G2, params::GyroRange::Dps250, 0x08),
            Err(ImuError::InitFailed { step: InitStep::EnableGyro, .. })
        ));
        assert_eq!(bus.writes().len(), 4);

        // No bus at all
        let mut imu = Imu::new(&Params::default(), None);
        assert!(!imu.init());
        assert!(imu.update().is_none());
    }

    #[test]
    fn test_update_converts_and_keeps_last_known() {
        let bus = FakeBus::bmi160();
        bus.set_block(reg::ACCEL_DATA, [0, 0, 16384]);
        bus.set_block(reg::GYRO_DATA, [0, 0, -32768]);

        let mut imu = Imu::new(&fast_params(), Some(Box::new(bus.clone())));
        assert!(imu.init());

        let t0 = Instant::now() + Duration::from_millis(10);
        let rec = imu.update_at(t0).unwrap();

        // 16384 LSB at +-2 g is 1 g
        assert_eq!(rec.accel_raw, [0, 0, 16384]);
        assert!((rec.accel_ms2[2] - GRAVITY).abs() < 1e-9);
        assert!((rec.gyro_dps[2] + 250.0).abs() < 1e-9);
        assert!(rec.events.turning_left);
        assert_eq!(rec.seq, 1);

        // Not due yet
        assert!(imu.update_at(t0).is_none());

        // Bus failure keeps the last record
        bus.0.lock().unwrap().fail_reads = true;
        assert!(imu.update_at(t0 + Duration::from_millis(10)).is_none());
        assert_eq!(imu.latest().seq, 1);
        assert_eq!(imu.status().read_errors, 1);
    }

    #[test]
    fn test_calibration_zeroes_rest() {
        let bus = FakeBus::bmi160();
        // Small bias on x and the gyro
        bus.set_block(reg::ACCEL_DATA, [164, 0, 16384]);
        bus.set_block(reg::GYRO_DATA, [131, 0, 0]);

        let mut imu = Imu::new(&fast_params(), Some(Box::new(bus.clone())));
        assert!(imu.init());

        let offsets = imu.calibrate().unwrap();
        assert!(offsets.num_samples > 0);
        assert!(offsets.accel[2].abs() < 1e-9);
        assert!((offsets.accel[0] - 164.0 * 2.0 / 32768.0 * GRAVITY).abs() < 1e-9);
        assert!(bus.writes().contains(&(reg::CMD, cmd::START_FOC)));

        let rec = imu.update_at(Instant::now() + Duration::from_millis(10)).unwrap();
        assert!(rec.accel_ms2[0].abs() < 1e-9);
        assert!(rec.gyro_dps[0].abs() < 1e-9);
        assert!((rec.accel_ms2[2] - GRAVITY).abs() < 1e-9);
    }

    #[test]
    fn test_suspend() {
        let bus = FakeBus::bmi160();
        let mut imu = Imu::new(&Params::default(), Some(Box::new(bus.clone())));
        assert!(!imu.suspend());
        assert!(imu.init());
        assert!(imu.suspend());
        assert!(!imu.is_initialised());

        let writes = bus.writes();
        assert_eq!(
            &writes[writes.len() - 2..], 
            &[(reg::CMD, cmd::ACC_SUSPEND), (reg::CMD, cmd::GYR_SUSPEND)]
        );
    }
}
