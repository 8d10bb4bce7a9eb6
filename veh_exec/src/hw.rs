//! # Hardware bring-up
//!
//! Opens the I2C buses used by the sensor and the PWM board. Only the Raspberry Pi build has real
//! buses, every other target runs without hardware.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use crate::imu::I2cBus;
use crate::motor_ctrl::{MotorCtrlParams, MotorOutput};

#[cfg(target_arch = "arm")]
use crate::motor_ctrl::HBridgeOutput;
#[cfg(target_arch = "arm")]
use log::{info, warn};
#[cfg(not(target_arch = "arm"))]
use log::info;

// ------------------------------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Open the bus the sensor sits on.
#[cfg(target_arch = "arm")]
pub fn imu_bus(bus: u8) -> Option<Box<dyn I2cBus>> {
    match rppal::i2c::I2c::with_bus(bus) {
        Ok(i2c) => {
            info!("Opened I2C bus {} for the IMU", bus);
            Some(Box::new(i2c))
        },
        Err(e) => {
            warn!("Could not open I2C bus {} for the IMU: {}", bus, e);
            None
        }
    }
}

/// Open the bus the sensor sits on.
#[cfg(not(target_arch = "arm"))]
pub fn imu_bus(bus: u8) -> Option<Box<dyn I2cBus>> {
    info!("No I2C bus {} on this host, the IMU will be offline", bus);
    None
}

/// Open the PWM board which drives the motor.
#[cfg(target_arch = "arm")]
pub fn motor_output(params: &MotorCtrlParams) -> Option<Box<dyn MotorOutput>> {
    let i2c = match rppal::i2c::I2c::with_bus(params.i2c_bus) {
        Ok(i) => i,
        Err(e) => {
            warn!("Could not open I2C bus {} for the PWM board: {}", params.i2c_bus, e);
            return None;
        }
    };

    match HBridgeOutput::pca9685(i2c, params) {
        Ok(o) => {
            info!("PCA9685 ready at 0x{:02X}", params.pwm_board_address);
            Some(Box::new(o))
        },
        Err(e) => {
            warn!("Could not initialise the PCA9685: {}", e);
            None
        }
    }
}

/// Open the PWM board which drives the motor.
#[cfg(not(target_arch = "arm"))]
pub fn motor_output(params: &MotorCtrlParams) -> Option<Box<dyn MotorOutput>> {
    info!(
        "No PWM board on this host (expected at 0x{:02X}), motor runs in simulation only",
        params.pwm_board_address
    );
    None
}
