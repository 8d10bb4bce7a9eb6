//! The parameter files shipped in `params/` load and match the built-in defaults.

use std::path::PathBuf;

use comms_if::net::NetParams;
use veh_lib::{imu, motor_ctrl::MotorCtrlParams, params::VehExecParams};

fn params_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("..").join("params")
}

#[test]
fn test_exec_params() {
    let p: VehExecParams = util::params::load_path(params_dir().join("veh_exec.toml")).unwrap();
    let d = VehExecParams::default();

    assert_eq!(p.cycle_rate_hz, d.cycle_rate_hz);
    assert_eq!(p.net_params_file, d.net_params_file);
    assert_eq!(p.collab.brake_balance_pct, d.collab.brake_balance_pct);
}

#[test]
fn test_net_params() {
    let p: NetParams = util::params::load_path(params_dir().join("net.toml")).unwrap();

    assert_eq!(p.command_port, 9998);
    assert_eq!(p.default_telemetry_port, 9999);
    assert!(p.client_timeout().is_none());
}

#[test]
fn test_imu_params() {
    let p: imu::Params = util::params::load_path(params_dir().join("imu.toml")).unwrap();
    let d = imu::Params::default();

    assert_eq!(p.address, 0x68);
    assert_eq!(p.accel_range, d.accel_range);
    assert_eq!(p.gyro_range, d.gyro_range);
    assert_eq!(p.bounce_window, d.bounce_window);
}

#[test]
fn test_motor_ctrl_params() {
    let p: MotorCtrlParams = util::params::load_path(params_dir().join("motor_ctrl.toml")).unwrap();
    let d = MotorCtrlParams::default();

    assert_eq!(p.gear_ratios, d.gear_ratios);
    assert_eq!(p.gear_limiters, d.gear_limiters);
    assert_eq!(p.zones, d.zones);
    assert_eq!(p.base_step(), 1.0);
}
