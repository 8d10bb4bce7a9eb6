//! # BMI160 driver
//!
//! Register level access to the Bosch BMI160 over I2C. The bring-up sequence follows the
//! datasheet start-up requirements, including the settling time after each command.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use embedded_hal::blocking::i2c::{Write, WriteRead};
use log::{debug, info};
use std::fmt;
use std::thread;
use std::time::Duration;

use super::{ImuError, InitStep};
use super::params::{AccelRange, GyroRange};

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Register addresses
pub mod reg {
    pub const CHIP_ID: u8 = 0x00;
    pub const GYRO_DATA: u8 = 0x0C;
    pub const ACCEL_DATA: u8 = 0x12;
    pub const ACC_CONF: u8 = 0x40;
    pub const ACC_RANGE: u8 = 0x41;
    pub const GYR_CONF: u8 = 0x42;
    pub const GYR_RANGE: u8 = 0x43;
    pub const CMD: u8 = 0x7E;
}

/// Values for the `CMD` register
pub mod cmd {
    pub const START_FOC: u8 = 0x03;
    pub const ACC_SUSPEND: u8 = 0x10;
    pub const ACC_NORMAL: u8 = 0x11;
    pub const GYR_SUSPEND: u8 = 0x14;
    pub const GYR_NORMAL: u8 = 0x15;
    pub const SOFT_RESET: u8 = 0xB6;
}

/// Expected contents of the `CHIP_ID` register.
pub const CHIP_ID: u8 = 0xD1;

/// Normal filter mode, placed in the bandwidth bits of the `*_CONF` registers.
const BWP_NORMAL: u8 = 0x02 << 4;

const SOFT_RESET_WAIT: Duration = Duration::from_millis(15);
const ACC_STARTUP_WAIT: Duration = Duration::from_millis(10);
const GYR_STARTUP_WAIT: Duration = Duration::from_millis(60);
const FINAL_SETTLE_WAIT: Duration = Duration::from_millis(100);

// ------------------------------------------------------------------------------------------------
// TRAITS
// ------------------------------------------------------------------------------------------------

/// An I2C bus the driver can own.
///
/// Implemented for every `embedded-hal` blocking I2C implementation, so both the Raspberry Pi bus
/// and test doubles can be boxed into the driver.
pub trait I2cBus: Send {
    fn write_bytes(&mut self, address: u8, bytes: &[u8]) -> Result<(), BusError>;

    fn write_read_bytes(
        &mut self, 
        address: u8, 
        bytes: &[u8], 
        buffer: &mut [u8]
    ) -> Result<(), BusError>;
}

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// An I2C transaction failed.
#[derive(Debug, Clone, thiserror::Error)]
#[error("I2C transaction failed: {0}")]
pub struct BusError(pub String);

/// One raw sample of both sensors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RawSample {
    pub accel: [i16; 3],
    pub gyro: [i16; 3],
}

/// BMI160 device handle, owning its bus.
pub struct Bmi160 {
    bus: Box<dyn I2cBus>,
    address: u8,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl<T, E> I2cBus for T
where
    T: Write<Error = E> + WriteRead<Error = E> + Send,
    E: fmt::Debug
{
    fn write_bytes(&mut self, address: u8, bytes: &[u8]) -> Result<(), BusError> {
        Write::write(self, address, bytes)
            .map_err(|e| BusError(format!("{:?}", e)))
    }

    fn write_read_bytes(
        &mut self, 
        address: u8, 
        bytes: &[u8], 
        buffer: &mut [u8]
    ) -> Result<(), BusError> {
        WriteRead::write_read(self, address, bytes, buffer)
            .map_err(|e| BusError(format!("{:?}", e)))
    }
}

impl Bmi160 {
    /// Create a new handle. No bus traffic occurs until [`Bmi160::init`] is called.
    pub fn new(bus: Box<dyn I2cBus>, address: u8) -> Self {
        Self { bus, address }
    }

    /// Run the start-up sequence.
    ///
    /// Every step must succeed in order, the first failing step is returned in the error.
    pub fn init(
        &mut self, 
        accel_range: AccelRange, 
        gyro_range: GyroRange, 
        odr: u8
    ) -> Result<(), ImuError> {
        // 1. Identity
        self.check_chip_id(InitStep::CheckChipId)?;
        debug!("BMI160 chip ID verified");

        // 2. Soft reset
        self.step(InitStep::SoftReset, |d| d.write_reg(reg::CMD, cmd::SOFT_RESET))?;
        thread::sleep(SOFT_RESET_WAIT);

        // 3. Identity after reset
        self.check_chip_id(InitStep::RecheckChipId)?;

        // 4. Accelerometer to normal mode before configuring it
        self.step(InitStep::EnableAccel, |d| d.write_reg(reg::CMD, cmd::ACC_NORMAL))?;
        thread::sleep(ACC_STARTUP_WAIT);

        // 5, 6. Accelerometer range then rate
        self.step(
            InitStep::AccelRange, 
            |d| d.write_reg(reg::ACC_RANGE, accel_range.reg_value())
        )?;
        self.step(InitStep::AccelConf, |d| d.write_reg(reg::ACC_CONF, odr | BWP_NORMAL))?;

        // 7. Gyroscope to normal mode, it has a much longer start-up
        self.step(InitStep::EnableGyro, |d| d.write_reg(reg::CMD, cmd::GYR_NORMAL))?;
        thread::sleep(GYR_STARTUP_WAIT);

        // 8. Gyroscope range then rate
        self.step(
            InitStep::GyroRange, 
            |d| d.write_reg(reg::GYR_RANGE, gyro_range.reg_value())
        )?;
        self.step(InitStep::GyroConf, |d| d.write_reg(reg::GYR_CONF, odr | BWP_NORMAL))?;

        // 9. Settle
        thread::sleep(FINAL_SETTLE_WAIT);

        // 10. Test read of both data blocks
        let sample = self.step(InitStep::TestRead, |d| d.read_raw())?;
        info!(
            "BMI160 test read OK: accel {:?} LSB, gyro {:?} LSB", 
            sample.accel, sample.gyro
        );

        Ok(())
    }

    /// Read one sample from the accelerometer then the gyroscope.
    pub fn read_raw(&mut self) -> Result<RawSample, BusError> {
        let accel = self.read_block(reg::ACCEL_DATA)?;
        let gyro = self.read_block(reg::GYRO_DATA)?;

        Ok(RawSample {
            accel: block_to_axes(&accel),
            gyro: block_to_axes(&gyro),
        })
    }

    /// Start the hardware fast offset compensation.
    pub fn start_foc(&mut self) -> Result<(), BusError> {
        self.write_reg(reg::CMD, cmd::START_FOC)
    }

    /// Put both sensors into suspend mode.
    pub fn suspend(&mut self) -> Result<(), BusError> {
        self.write_reg(reg::CMD, cmd::ACC_SUSPEND)?;
        self.write_reg(reg::CMD, cmd::GYR_SUSPEND)
    }

    /// Release the bus.
    pub fn release(self) -> Box<dyn I2cBus> {
        self.bus
    }

    pub fn read_reg(&mut self, reg: u8) -> Result<u8, BusError> {
        let mut buf = [0u8; 1];
        self.bus.write_read_bytes(self.address, &[reg], &mut buf)?;
        Ok(buf[0])
    }

    pub fn write_reg(&mut self, reg: u8, value: u8) -> Result<(), BusError> {
        self.bus.write_bytes(self.address, &[reg, value])
    }

    fn read_block(&mut self, reg: u8) -> Result<[u8; 6], BusError> {
        let mut buf = [0u8; 6];
        self.bus.write_read_bytes(self.address, &[reg], &mut buf)?;
        Ok(buf)
    }

    fn check_chip_id(&mut self, step: InitStep) -> Result<(), ImuError> {
        let id = self.step(step, |d| d.read_reg(reg::CHIP_ID))?;

        if id != CHIP_ID {
            return Err(ImuError::WrongChipId { step, found: id });
        }

        Ok(())
    }

    fn step<T, F>(&mut self, step: InitStep, f: F) -> Result<T, ImuError>
    where
        F: FnOnce(&mut Self) -> Result<T, BusError>
    {
        f(self).map_err(|source| ImuError::InitFailed { step, source })
    }
}

// ------------------------------------------------------------------------------------------------
// FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Three little endian two's complement axes.
fn block_to_axes(block: &[u8; 6]) -> [i16; 3] {
    [
        i16::from_le_bytes([block[0], block[1]]),
        i16::from_le_bytes([block[2], block[3]]),
        i16::from_le_bytes([block[4], block[5]]),
    ]
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_block_to_axes() {
        assert_eq!(
            block_to_axes(&[0x00, 0x40, 0xFF, 0xFF, 0x00, 0x80]), 
            [16384, -1, -32768]
        );
    }
}
