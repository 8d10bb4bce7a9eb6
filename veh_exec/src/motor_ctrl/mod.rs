//! # Motor Controller
//!
//! Runs the drive motor state machine on its own fixed rate thread. Commands from the listener
//! only touch the shared state, the control thread is the only thing that talks to the PWM board.
//! Gear changes finish on a one shot timer so neither side ever sleeps holding the state lock.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

pub mod output;
pub mod params;
pub mod state;
pub mod zones;

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use comms_if::eqpt::motor::MotorStatus;
use log::{debug, info, warn};
use util::{logger::RateLimiter, timer::OneShotTimer};

pub use output::{HBridgeOutput, MotorOutput, MotorOutputError, PwmDriver};
pub use params::MotorCtrlParams;
pub use state::MotorState;

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

const OUTPUT_WARN_INTERVAL: Duration = Duration::from_secs(5);

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Handle to the motor control loop.
pub struct MotorCtrl {
    params: Arc<MotorCtrlParams>,

    state: Arc<Mutex<MotorState>>,

    /// True if the loop is driving real outputs.
    hardware_ready: bool,

    stop: Arc<AtomicBool>,

    loop_handle: Mutex<Option<JoinHandle<()>>>,

    shift_timer: Mutex<Option<OneShotTimer>>,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl MotorCtrl {
    /// Start the control loop.
    ///
    /// With no `output` the full state machine still runs, only the readiness flag shows that
    /// nothing is being driven.
    pub fn start(params: &MotorCtrlParams, output: Option<Box<dyn MotorOutput>>) -> Self {
        let params = Arc::new(params.clone());
        let state = Arc::new(Mutex::new(MotorState::new(&params)));
        let stop = Arc::new(AtomicBool::new(false));
        let hardware_ready = output.is_some();

        if !hardware_ready {
            warn!("No motor output available, motor control running without hardware");
        }

        let handle = {
            let params = params.clone();
            let state = state.clone();
            let stop = stop.clone();
            thread::spawn(move || control_loop(params, state, stop, output))
        };

        info!(
            "Motor control started at {} Hz (ramp {} s, shift {} s)",
            params.tick_rate_hz, params.ramp_time_s, params.shift_time_s
        );

        Self {
            params,
            state,
            hardware_ready,
            stop,
            loop_handle: Mutex::new(Some(handle)),
            shift_timer: Mutex::new(None),
        }
    }

    /// Set the throttle position in percent.
    pub fn set_throttle(&self, throttle_pct: f64) {
        let mut state = self.lock_state();
        state.set_throttle(&self.params, throttle_pct);
        debug!(
            "Throttle {:.1}% -> target duty {:.1}% in gear {}", 
            state.throttle, state.target_duty, state.gear
        );
    }

    /// Change up one gear. Returns `false` if already in top gear or shifting.
    pub fn shift_up(&self) -> bool {
        self.shift_by(1)
    }

    /// Change down one gear. Returns `false` if already in first gear or shifting.
    pub fn shift_down(&self) -> bool {
        self.shift_by(-1)
    }

    /// Cut the motor output immediately.
    pub fn emergency_stop(&self) {
        self.lock_state().emergency_stop();
        warn!("Motor emergency stop");
    }

    pub fn set_reverse(&self, reverse: bool) {
        self.lock_state().set_reverse(reverse);
        info!("Motor direction set to {}", if reverse { "reverse" } else { "forward" });
    }

    pub fn get_motor_status(&self) -> MotorStatus {
        self.lock_state().status(&self.params, self.hardware_ready)
    }

    pub fn is_hardware_ready(&self) -> bool {
        self.hardware_ready
    }

    /// Stop the control loop, leaving the outputs low.
    ///
    /// Safe to call more than once.
    pub fn shutdown(&self) {
        if let Some(mut timer) = lock(&self.shift_timer).take() {
            timer.cancel();
        }

        self.lock_state().emergency_stop();
        self.stop.store(true, Ordering::Relaxed);

        let handle = lock(&self.loop_handle).take();
        if let Some(h) = handle {
            if h.join().is_err() {
                warn!("Motor control thread panicked");
            }
            info!("Motor control stopped");
        }
    }

    fn shift_by(&self, delta: i8) -> bool {
        let mut state = self.lock_state();
        let new_gear = state.gear as i16 + delta as i16;

        if new_gear < 1 || new_gear > params::NUM_GEARS as i16 {
            return false;
        }

        let new_gear = new_gear as u8;
        if !state.begin_shift(new_gear) {
            return false;
        }

        info!("Shifting {} -> {} at {:.1}% duty", state.gear, new_gear, state.current_duty);

        let params = self.params.clone();
        let shared = self.state.clone();
        let timer = OneShotTimer::start(
            Duration::from_secs_f64(self.params.shift_time_s.max(0.0)), 
            move || {
                let mut state = lock(&shared);
                state.complete_shift(&params, new_gear);
                info!(
                    "In gear {} (ratio {:.1}), target duty {:.1}%", 
                    state.gear, state.gear_ratio(&params), state.target_duty
                );
            }
        );

        // Stored before the state lock is released, so the timer cannot complete and let
        // another shift replace it first
        *lock(&self.shift_timer) = Some(timer);

        true
    }

    fn lock_state(&self) -> MutexGuard<'_, MotorState> {
        lock(&self.state)
    }
}

impl Drop for MotorCtrl {
    fn drop(&mut self) {
        self.shutdown();
    }
}

// ------------------------------------------------------------------------------------------------
// FUNCTIONS
// ------------------------------------------------------------------------------------------------

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

fn control_loop(
    params: Arc<MotorCtrlParams>, 
    state: Arc<Mutex<MotorState>>, 
    stop: Arc<AtomicBool>,
    mut output: Option<Box<dyn MotorOutput>>
) {
    let period = Duration::from_secs_f64(params.tick_period_s());
    let mut warn_limiter = RateLimiter::new(OUTPUT_WARN_INTERVAL);
    let mut last_tick = Instant::now();

    while !stop.load(Ordering::Relaxed) {
        let tick_start = Instant::now();
        let dt_s = tick_start.duration_since(last_tick).as_secs_f64();
        last_tick = tick_start;

        let (direction, duty) = {
            let mut s = lock(&state);
            s.step(&params, dt_s);
            (s.direction, s.current_duty)
        };

        if let Some(out) = output.as_mut() {
            if let Err(e) = out.drive(direction, duty) {
                if let Some(n) = warn_limiter.check() {
                    warn!("Could not drive the motor: {} ({} more suppressed)", e, n);
                }
            }
        }

        thread::sleep(period.saturating_sub(tick_start.elapsed()));
    }

    if let Some(out) = output.as_mut() {
        if let Err(e) = out.neutral() {
            warn!("Could not neutralise the motor output: {}", e);
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use comms_if::eqpt::motor::Direction;

    #[derive(Clone, Default)]
    struct RecordingOutput(Arc<Mutex<Vec<(Direction, f64)>>>);

    impl MotorOutput for RecordingOutput {
        fn drive(&mut self, direction: Direction, duty_pct: f64) -> Result<(), MotorOutputError> {
            self.0.lock().unwrap().push((direction, duty_pct));
            Ok(())
        }
    }

    fn fast_params() -> MotorCtrlParams {
        MotorCtrlParams {
            shift_time_s: 0.05,
            ..Default::default()
        }
    }

    #[test]
    fn test_degraded_mode_still_ramps() {
        let ctrl = MotorCtrl::start(&fast_params(), None);
        assert!(!ctrl.is_hardware_ready());

        ctrl.set_throttle(50.0);
        thread::sleep(Duration::from_millis(200));

        let status = ctrl.get_motor_status();
        assert!(!status.hardware_ready);
        assert_eq!(status.target_duty, 20.0);
        assert!(status.current_duty > 0.0);
        assert!(status.engine_rpm > 0.0);

        ctrl.shutdown();
        ctrl.shutdown();
    }

    #[test]
    fn test_gear_bounds_and_shift_timing() {
        let ctrl = MotorCtrl::start(&fast_params(), None);

        assert!(!ctrl.shift_down());
        assert!(ctrl.shift_up());

        // A second request while the first is in progress is refused
        assert!(!ctrl.shift_up());
        assert!(ctrl.get_motor_status().shifting);

        thread::sleep(Duration::from_millis(200));
        let status = ctrl.get_motor_status();
        assert_eq!(status.gear, 2);
        assert!(!status.shifting);
        assert_eq!(status.gear_changes, 1);

        for _ in 0..3 {
            assert!(ctrl.shift_up());
            thread::sleep(Duration::from_millis(150));
        }
        assert_eq!(ctrl.get_motor_status().gear, 5);
        assert!(!ctrl.shift_up());

        ctrl.shutdown();
    }

    #[test]
    fn test_instant_shifts_from_many_threads() {
        let ctrl = Arc::new(MotorCtrl::start(
            &MotorCtrlParams { shift_time_s: 0.0, ..Default::default() }, 
            None
        ));

        let workers: Vec<_> = (0..4)
            .map(|i| {
                let ctrl = ctrl.clone();
                thread::spawn(move || {
                    for _ in 0..50 {
                        if i % 2 == 0 { ctrl.shift_up(); } else { ctrl.shift_down(); }
                    }
                })
            })
            .collect();
        for w in workers {
            w.join().unwrap();
        }

        // Every armed shift completes, none is left pending
        thread::sleep(Duration::from_millis(100));
        let status = ctrl.get_motor_status();
        assert!(!status.shifting);
        assert!(status.gear >= 1 && status.gear <= 5);
        assert!(ctrl.shift_up() || status.gear == 5);

        ctrl.shutdown();
    }

    #[test]
    fn test_outputs_driven_and_left_low() {
        let out = RecordingOutput::default();
        let ctrl = MotorCtrl::start(&fast_params(), Some(Box::new(out.clone())));
        assert!(ctrl.is_hardware_ready());

        ctrl.set_throttle(100.0);
        ctrl.set_reverse(true);
        thread::sleep(Duration::from_millis(100));
        ctrl.shutdown();

        let writes = out.0.lock().unwrap();
        assert!(writes.iter().any(|(d, duty)| *d == Direction::Reverse && *duty > 0.0));
        assert_eq!(writes.last(), Some(&(Direction::Stopped, 0.0)));
    }
}
