//! # Motor outputs
//!
//! The drive motor sits behind a BTS7960 H-bridge whose two half bridges are fed from PCA9685
//! channels, one per direction.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use comms_if::eqpt::motor::Direction;
use embedded_hal::blocking::i2c::{Write, WriteRead};
use pwm_pca9685::{Address, Channel, Pca9685};

use super::params::MotorCtrlParams;

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Number of counts in one PCA9685 PWM period.
const MAX_PWM: u16 = 4096;

/// PCA9685 internal oscillator frequency.
///
/// Units: Hz
const OSC_FREQ_HZ: f64 = 25_000_000.0;

// ------------------------------------------------------------------------------------------------
// TRAITS
// ------------------------------------------------------------------------------------------------

/// Trait to provide a unified API for PWM driver boards.
pub trait PwmDriver {

    /// The type that the underlying driver uses for channel identification
    type Channel: Copy;

    /// Set the duty cycle of a channel.
    ///
    /// ## Arguments
    /// - `channel` - The channel to set the duty cycle for
    /// - `duty_cycle` - The duty cycle to set. Must be a value between 0.0 and 1.0. Values outside
    ///   this range will be rejected.
    fn set_duty_cycle(
        &mut self, 
        channel: Self::Channel, 
        duty_cycle: f64
    ) -> Result<(), MotorOutputError>;
}

/// Something that can drive the motor in either direction.
pub trait MotorOutput: Send {

    /// Drive at `duty_pct` percent in `direction`. `Stopped` drives both sides low.
    fn drive(&mut self, direction: Direction, duty_pct: f64) -> Result<(), MotorOutputError>;

    /// Drive both sides low.
    fn neutral(&mut self) -> Result<(), MotorOutputError> {
        self.drive(Direction::Stopped, 0.0)
    }
}

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// An H-bridge fed from two channels of a PWM driver.
pub struct HBridgeOutput<D: PwmDriver> {
    driver: D,
    forward: D::Channel,
    reverse: D::Channel,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

#[derive(thiserror::Error, Debug)]
pub enum MotorOutputError {
    #[error("An I2C error occured: {0}")]
    I2c(String),

    #[error("Duty cycle must be between 0.0 and 1.0")]
    InvalidDutyCycle,

    #[error("Channel {0} does not exist on the PWM board")]
    InvalidChannel(u8),

    #[error("Forward and reverse must use different channels")]
    SharedChannel,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl<I2C, E> PwmDriver for Pca9685<I2C>
where 
    I2C: Write<Error = E> + WriteRead<Error = E>,
    E: std::fmt::Debug
{
    type Channel = Channel;

    fn set_duty_cycle(
        &mut self, 
        channel: Self::Channel, 
        duty_cycle: f64
    ) -> Result<(), MotorOutputError> {

        // If the duty cycle is out of range return an error
        if !(0.0..=1.0).contains(&duty_cycle) {
            return Err(MotorOutputError::InvalidDutyCycle)
        }

        let off = (duty_cycle * MAX_PWM as f64).round() as u16;

        let result = if off == 0 {
            self.set_channel_full_off(channel)
        }
        else if off >= MAX_PWM {
            self.set_channel_full_on(channel, 0)
        }
        else {
            self.set_channel_on_off(channel, 0, off)
        };

        result.map_err(pca_error)
    }
}

impl<D: PwmDriver> HBridgeOutput<D> {
    pub fn new(driver: D, forward: D::Channel, reverse: D::Channel) -> Self {
        Self { driver, forward, reverse }
    }

    /// Release the driver.
    pub fn into_inner(self) -> D {
        self.driver
    }
}

impl<I2C, E> HBridgeOutput<Pca9685<I2C>>
where 
    I2C: Write<Error = E> + WriteRead<Error = E> + Send,
    E: std::fmt::Debug
{
    /// Bring up a PCA9685 on `i2c` and wrap it as an H-bridge, with both outputs low.
    pub fn pca9685(i2c: I2C, params: &MotorCtrlParams) -> Result<Self, MotorOutputError> {
        if params.forward_channel == params.reverse_channel {
            return Err(MotorOutputError::SharedChannel);
        }

        let forward = channel(params.forward_channel)?;
        let reverse = channel(params.reverse_channel)?;

        let mut pwm = Pca9685::new(i2c, Address::from(params.pwm_board_address))
            .map_err(pca_error)?;
        pwm.set_prescale(prescale(params.pwm_frequency_hz)).map_err(pca_error)?;
        pwm.enable().map_err(pca_error)?;

        let mut output = Self::new(pwm, forward, reverse);
        output.neutral()?;

        Ok(output)
    }
}

impl<D> MotorOutput for HBridgeOutput<D>
where
    D: PwmDriver + Send,
    D::Channel: Send
{
    fn drive(&mut self, direction: Direction, duty_pct: f64) -> Result<(), MotorOutputError> {
        let duty = if duty_pct.is_finite() {
            (duty_pct / 100.0).max(0.0).min(1.0)
        }
        else {
            0.0
        };

        // The idle side is always driven low before the active side is raised
        match direction {
            Direction::Forward => {
                self.driver.set_duty_cycle(self.reverse, 0.0)?;
                self.driver.set_duty_cycle(self.forward, duty)
            },
            Direction::Reverse => {
                self.driver.set_duty_cycle(self.forward, 0.0)?;
                self.driver.set_duty_cycle(self.reverse, duty)
            },
            Direction::Stopped => {
                self.driver.set_duty_cycle(self.forward, 0.0)?;
                self.driver.set_duty_cycle(self.reverse, 0.0)
            }
        }
    }
}

// ------------------------------------------------------------------------------------------------
// FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Prescale register value for the given PWM frequency, limited to what the board accepts.
pub fn prescale(freq_hz: f64) -> u8 {
    if !freq_hz.is_finite() || freq_hz <= 0.0 {
        return u8::MAX;
    }

    let value = (OSC_FREQ_HZ / (MAX_PWM as f64 * freq_hz)).round() - 1.0;
    value.max(3.0).min(255.0) as u8
}

/// Map a channel number onto the driver's channel type.
pub fn channel(index: u8) -> Result<Channel, MotorOutputError> {
    let c = match index {
        0 => Channel::C0,
        1 => Channel::C1,
        2 => Channel::C2,
        3 => Channel::C3,
        4 => Channel::C4,
        5 => Channel::C5,
        6 => Channel::C6,
        7 => Channel::C7,
        8 => Channel::C8,
        9 => Channel::C9,
        10 => Channel::C10,
        11 => Channel::C11,
        12 => Channel::C12,
        13 => Channel::C13,
        14 => Channel::C14,
        15 => Channel::C15,
        i => return Err(MotorOutputError::InvalidChannel(i))
    };

    Ok(c)
}

fn pca_error<E: std::fmt::Debug>(e: pwm_pca9685::Error<E>) -> MotorOutputError {
    match e {
        pwm_pca9685::Error::I2C(e) => MotorOutputError::I2c(format!("{:?}", e)),
        pwm_pca9685::Error::InvalidInputData => MotorOutputError::InvalidDutyCycle
    }
}

#[cfg(test)]
mod test {
    use super::*;

    /// Records every duty written per channel.
    #[derive(Default)]
    struct RecordingDriver {
        writes: Vec<(u8, f64)>,
    }

    impl PwmDriver for RecordingDriver {
        type Channel = u8;

        fn set_duty_cycle(&mut self, channel: u8, duty_cycle: f64) -> Result<(), MotorOutputError> {
            self.writes.push((channel, duty_cycle));
            Ok(())
        }
    }

    #[test]
    fn test_prescale() {
        assert_eq!(prescale(200.0), 30);
        assert_eq!(prescale(1500.0), 3);
        assert_eq!(prescale(2000.0), 3);
        assert_eq!(prescale(1.0), 255);
    }

    #[test]
    fn test_channel_map() {
        assert!(channel(15).is_ok());
        assert!(matches!(channel(16), Err(MotorOutputError::InvalidChannel(16))));
    }

    #[test]
    fn test_hbridge_sides() {
        let mut out = HBridgeOutput::new(RecordingDriver::default(), 0u8, 1u8);

        out.drive(Direction::Forward, 50.0).unwrap();
        out.drive(Direction::Reverse, 150.0).unwrap();
        out.neutral().unwrap();

        assert_eq!(
            out.into_inner().writes,
            vec![(1, 0.0), (0, 0.5), (0, 0.0), (1, 1.0), (0, 0.0), (1, 0.0)]
        );
    }
}
