//! Main vehicle-side executable entry point.
//!
//! # Architecture
//!
//! The general execution methodology consists of:
//!
//!     - Initialise all modules
//!     - Start the motor control loop and the command listener, both run in their own threads
//!     - Main loop at the telemetry rate:
//!         - IMU sensing and fusion
//!         - Collection of the actuator and auxiliary statuses
//!         - Telemetry assembly and broadcast to every registered client
//!     - On interrupt, neutralise the actuators, terminate the clients and shut down

// ---------------------------------------------------------------------------
// USE MODULES FROM LIBRARY
// ---------------------------------------------------------------------------

use comms_if::{net::NetParams, tc::ControlCmd};
use veh_lib::{
    collab::{
        BrakeCtrl, FrameSource, LatchedBrakes, LatchedSteering, NotFitted, PowerMonitor,
        SteeringCtrl, TempSensor
    },
    data_store::{DataStore, SystemStatus},
    hw,
    imu::{self, Imu},
    motor_ctrl::{MotorCtrl, MotorCtrlParams},
    params::VehExecParams,
    tc_processor::TcProcessor,
    veh_server::VehServer,
};

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use color_eyre::{eyre::WrapErr, Report};
use log::{debug, info, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use structopt::StructOpt;

// Internal
use util::{
    host,
    logger::{logger_init, LevelFilter, RateLimiter},
    session::Session,
};

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Minimum time between two cycle overrun warnings.
const OVERRUN_WARN_INTERVAL: Duration = Duration::from_secs(5);

/// Session-relative path the calibration offsets are saved to.
const CALIBRATION_PATH: &str = "imu/calibration.json";

// ---------------------------------------------------------------------------
// STRUCTS
// ---------------------------------------------------------------------------

#[derive(Debug, StructOpt)]
#[structopt(name = "veh_exec", about = "Vehicle control and telemetry executable")]
struct Opts {
    /// Calibrate the IMU before starting, whatever the parameter file says
    #[structopt(long)]
    calibrate: bool,

    /// Log debug messages, give twice to also log trace messages
    #[structopt(short, long, parse(from_occurrences))]
    verbose: u8,
}

// ---------------------------------------------------------------------------
// FUNCTIONS
// ---------------------------------------------------------------------------

/// Executable main function, entry point.
fn main() -> Result<(), Report> {

    color_eyre::install()?;

    let opts = Opts::from_args();

    // ---- EARLY INITIALISATION ----

    // Initialise session
    let session = Session::new(
        "veh_exec",
        "sessions"
    ).wrap_err("Failed to create the session")?;

    // Initialise logger
    let level = match opts.verbose {
        0 => LevelFilter::Info,
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace
    };
    logger_init(level, &session)
        .wrap_err("Failed to initialise logging")?;

    // Log information on this execution.
    info!("Vehicle Executable\n");
    info!(
        "Running on: {:#?}",
        host::get_uname().wrap_err("Failed to get host information")?
    );
    info!("Session directory: {:?}\n", session.session_root);
    debug!("CLI options: {:?}", opts);

    // ---- INTERRUPT HANDLING ----

    let running = Arc::new(AtomicBool::new(true));
    {
        let running = running.clone();
        ctrlc::set_handler(move || running.store(false, Ordering::SeqCst))
            .wrap_err("Failed to set the interrupt handler")?;
    }

    // ---- LOAD PARAMETERS ----

    let exec_params: VehExecParams = util::params::load_or_default("veh_exec.toml");
    let net_params: NetParams = util::params::load_or_default(&exec_params.net_params_file);
    let imu_params: imu::Params = util::params::load_or_default(&exec_params.imu_params_file);
    let motor_params: MotorCtrlParams = util::params::load_or_default(
        &exec_params.motor_ctrl_params_file
    );

    info!("Exec parameters loaded");

    // ---- INITIALISE MODULES ----

    info!("Initialising modules...");

    let mut imu = Imu::new(&imu_params, hw::imu_bus(imu_params.i2c_bus));
    if imu.init() {
        info!("IMU init complete");

        if opts.calibrate || exec_params.calibrate_on_start {
            match imu.calibrate() {
                Ok(offsets) => {
                    info!("IMU calibrated from {} samples", offsets.num_samples);
                    util::session::save_with_timestamp(CALIBRATION_PATH, offsets);
                },
                Err(e) => warn!("IMU calibration failed, continuing without offsets: {}", e)
            }
        }
    }
    else {
        warn!("IMU unavailable, sensor telemetry will hold default values");
    }

    let motor = Arc::new(MotorCtrl::start(&motor_params, hw::motor_output(&motor_params)));
    info!(
        "MotorCtrl started ({})",
        if motor.is_hardware_ready() { "hardware" } else { "simulation only" }
    );

    let steering = Arc::new(LatchedSteering::new(&exec_params.collab));
    let brakes = Arc::new(LatchedBrakes::new(&exec_params.collab));
    let power = NotFitted;
    let temperature = NotFitted;
    let mut frames = NotFitted;

    let tc = Arc::new(TcProcessor::new(motor.clone(), steering.clone(), brakes.clone()));

    info!("Module initialisation complete\n");

    // ---- INITIALISE NETWORK ----

    info!("Initialising network");

    let server = VehServer::new(&net_params)
        .wrap_err("Failed to initialise the VehServer")?;
    server.start_listener(tc.clone())
        .wrap_err("Failed to start the command listener")?;

    info!("Network initialisation complete");

    // ---- DATASTORE ----

    let mut ds = DataStore::new(SystemStatus {
        camera: false,
        sensors: imu.is_initialised(),
        motor: motor.is_hardware_ready(),
        brakes: brakes.status().available,
        steering: steering.status().available,
        network: true,
    });

    info!("{}/6 components online", ds.system_status.num_online());

    // ---- MAIN LOOP ----

    info!("Beginning main loop\n");

    let cycle_period = Duration::from_secs_f64(exec_params.cycle_period_s());
    let mut overrun_warn = RateLimiter::new(OVERRUN_WARN_INTERVAL);
    let mut last_status_log = Instant::now();
    let mut last_impact = false;

    while running.load(Ordering::SeqCst) {

        // Get cycle start time
        let cycle_start_instant = Instant::now();

        // ---- SENSOR INPUT ----

        if tc.take_reset_angles() {
            imu.reset_angles();
        }

        if imu.update().is_some() {
            ds.sensor_count += 1;
        }
        let imu_record = imu.latest();
        let imu_status = imu.status();

        // Only the rising edge of an impact stops the vehicle
        let impact = imu_record.events.impact;
        if impact && !last_impact && exec_params.stop_on_impact {
            warn!("Impact detected, stopping the vehicle");
            tc.exec(&ControlCmd::Stop);
            tc.exec(&ControlCmd::Brake(100.0));
        }
        last_impact = impact;

        // ---- COLLABORATOR INPUT ----

        let motor_status = motor.get_motor_status();
        let steering_status = steering.status();
        let brake_status = brakes.status();
        let power_snapshot = power.get_power_snapshot();
        let temperature_reading = temperature.get_temperature();
        let frame = frames.latest_frame();

        // ---- TELEMETRY ----

        let tlm = ds.assemble(
            &[
                &imu_record,
                &imu_status,
                &motor_status,
                &steering_status,
                &brake_status,
                &power_snapshot,
                &temperature_reading,
            ],
            &server.stats()
        );

        let frame_bytes = frame.as_deref().unwrap_or(&[]);
        if server.broadcast(frame_bytes, &tlm) {
            if !frame_bytes.is_empty() {
                ds.frame_count += 1;
            }
        }
        else if !server.clients().is_empty() {
            ds.send_failures += 1;
        }

        if exec_params.status_log_period_s > 0.0
            && last_status_log.elapsed().as_secs_f64() >= exec_params.status_log_period_s
        {
            info!(
                "Cycle {}: {} client(s), gear {}, {:.1} km/h, {} sensor records",
                ds.loop_count,
                server.clients().len(),
                motor_status.gear,
                motor_status.speed_kmh,
                ds.sensor_count
            );
            last_status_log = Instant::now();
        }

        // ---- CYCLE MANAGEMENT ----

        ds.loop_count += 1;

        let cycle_dur = Instant::now() - cycle_start_instant;

        // Get sleep duration
        match cycle_period.checked_sub(cycle_dur) {
            Some(d) => thread::sleep(d),
            None => {
                if let Some(n) = overrun_warn.check() {
                    warn!(
                        "Cycle overran by {:.06} s ({} more overruns suppressed)",
                        (cycle_dur - cycle_period).as_secs_f64(),
                        n
                    );
                }
            }
        }
    }

    // ---- SHUTDOWN ----

    info!("Interrupt received, shutting down");

    tc.neutralise();
    server.send_termination();
    server.shutdown();

    // Sockets are closed before the hardware is released
    drop(server);

    motor.shutdown();

    if imu.is_initialised() && !imu.suspend() {
        warn!("Could not suspend the IMU");
    }

    info!(
        "Ran {} cycles in {:.1} s, {} cycles without a client reached",
        ds.loop_count,
        ds.uptime_s(),
        ds.send_failures
    );

    info!("End of execution");

    session.exit();

    Ok(())
}
