//! # Telecommand processor
//!
//! Executes `CONTROL:` commands against the actuators.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use comms_if::tc::ControlCmd;
use log::{debug, info, warn};
use util::logger::RateLimiter;

use crate::collab::{BrakeCtrl, SteeringCtrl};
use crate::motor_ctrl::MotorCtrl;
use crate::veh_server::CommandHandler;

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

const PARSE_WARN_INTERVAL: Duration = Duration::from_secs(5);

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

pub struct TcProcessor {
    motor: Arc<MotorCtrl>,

    steering: Arc<dyn SteeringCtrl>,

    brakes: Arc<dyn BrakeCtrl>,

    /// Set when an angle reset is requested, the sensor owner clears it.
    reset_angles: AtomicBool,

    parse_warn: Mutex<RateLimiter>,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl TcProcessor {
    pub fn new(
        motor: Arc<MotorCtrl>, 
        steering: Arc<dyn SteeringCtrl>, 
        brakes: Arc<dyn BrakeCtrl>
    ) -> Self {
        Self {
            motor,
            steering,
            brakes,
            reset_angles: AtomicBool::new(false),
            parse_warn: Mutex::new(RateLimiter::new(PARSE_WARN_INTERVAL)),
        }
    }

    /// Execute a single control command.
    pub fn exec(&self, cmd: &ControlCmd) {
        debug!("Executing {}", cmd);

        match *cmd {
            ControlCmd::Throttle(pct) => self.motor.set_throttle(pct),
            ControlCmd::Brake(pct) => self.brakes.apply_brake(pct),
            ControlCmd::BrakeBalance(pct) => self.brakes.set_balance(pct),
            ControlCmd::Steering(pct) => self.steering.set_steering_input(pct),
            ControlCmd::GearUp => {
                if !self.motor.shift_up() {
                    info!("Gear up refused");
                }
            },
            ControlCmd::GearDown => {
                if !self.motor.shift_down() {
                    info!("Gear down refused");
                }
            },
            ControlCmd::Reverse(r) => self.motor.set_reverse(r),
            ControlCmd::Stop => self.motor.emergency_stop(),
            ControlCmd::ResetAngles => self.reset_angles.store(true, Ordering::Relaxed),
        }
    }

    /// Returns true once for each angle reset request.
    pub fn take_reset_angles(&self) -> bool {
        self.reset_angles.swap(false, Ordering::Relaxed)
    }

    /// Bring every actuator to a safe state.
    pub fn neutralise(&self) {
        self.motor.set_throttle(0.0);
        self.motor.emergency_stop();
        self.brakes.release();
        self.steering.center();
        info!("Actuators neutralised");
    }
}

impl CommandHandler for TcProcessor {
    fn on_control(&self, text: &str, src: SocketAddr) {
        match ControlCmd::parse(text) {
            Ok(cmd) => self.exec(&cmd),
            Err(e) => {
                let mut limiter = self.parse_warn.lock().unwrap_or_else(|e| e.into_inner());
                if let Some(n) = limiter.check() {
                    warn!("Ignoring control from {}: {} ({} more suppressed)", src, e, n);
                }
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::collab::{CollabParams, LatchedBrakes, LatchedSteering};
    use crate::motor_ctrl::MotorCtrlParams;
    use comms_if::eqpt::motor::Direction;

    fn processor() -> (TcProcessor, Arc<MotorCtrl>, Arc<LatchedSteering>, Arc<LatchedBrakes>) {
        let motor = Arc::new(MotorCtrl::start(&MotorCtrlParams::default(), None));
        let steering = Arc::new(LatchedSteering::new(&CollabParams::default()));
        let brakes = Arc::new(LatchedBrakes::new(&CollabParams::default()));

        let tc = TcProcessor::new(motor.clone(), steering.clone(), brakes.clone());
        (tc, motor, steering, brakes)
    }

    #[test]
    fn test_dispatch() {
        let (tc, motor, steering, brakes) = processor();
        let src: SocketAddr = "127.0.0.1:5000".parse().unwrap();

        tc.on_control("THROTTLE:50", src);
        tc.on_control("STEERING:-100", src);
        tc.on_control("BRAKE:10", src);
        tc.on_control("REVERSE:1", src);
        tc.on_control("NOT_A_COMMAND", src);

        let m = motor.get_motor_status();
        assert_eq!(m.target_duty, 20.0);
        assert_eq!(m.direction, Direction::Reverse);
        assert_eq!(steering.status().angle_deg, -45.0);
        assert_eq!(brakes.status().input_pct, 10.0);

        tc.on_control("STOP", src);
        assert_eq!(motor.get_motor_status().direction, Direction::Stopped);

        assert!(!tc.take_reset_angles());
        tc.on_control("RESET_ANGLES", src);
        assert!(tc.take_reset_angles());
        assert!(!tc.take_reset_angles());

        motor.shutdown();
    }

    #[test]
    fn test_neutralise() {
        let (tc, motor, steering, brakes) = processor();

        tc.exec(&ControlCmd::Throttle(80.0));
        tc.exec(&ControlCmd::Steering(30.0));
        tc.exec(&ControlCmd::Brake(40.0));
        tc.neutralise();

        let m = motor.get_motor_status();
        assert_eq!(m.current_duty, 0.0);
        assert_eq!(m.throttle, 0.0);
        assert_eq!(steering.status().angle_deg, 0.0);
        assert_eq!(brakes.status().input_pct, 0.0);

        motor.shutdown();
    }
}
