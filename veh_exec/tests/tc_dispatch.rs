//! Control commands sent over loopback reach the actuators.

use std::net::UdpSocket;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use comms_if::net::NetParams;
use veh_lib::{
    collab::{BrakeCtrl, CollabParams, LatchedBrakes, LatchedSteering, SteeringCtrl},
    motor_ctrl::{MotorCtrl, MotorCtrlParams},
    tc_processor::TcProcessor,
    veh_server::VehServer,
};

const TIMEOUT: Duration = Duration::from_secs(2);

fn wait_for<F: Fn() -> bool>(cond: F) -> bool {
    let start = Instant::now();
    while start.elapsed() < TIMEOUT {
        if cond() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    cond()
}

#[test]
fn test_control_commands_drive_actuators() {
    let motor = Arc::new(MotorCtrl::start(&MotorCtrlParams::default(), None));
    let steering = Arc::new(LatchedSteering::new(&CollabParams::default()));
    let brakes = Arc::new(LatchedBrakes::new(&CollabParams::default()));
    let tc = Arc::new(TcProcessor::new(motor.clone(), steering.clone(), brakes.clone()));

    let server = VehServer::new(&NetParams {
        bind_addr: "127.0.0.1".into(),
        command_port: 0,
        recv_timeout_s: 0.05,
        ..Default::default()
    }).unwrap();
    server.start_listener(tc.clone()).unwrap();
    let addr = server.command_addr().unwrap();

    let op = UdpSocket::bind("127.0.0.1:0").unwrap();
    for cmd in &[
        "CONTROL:STEERING:50",
        "CONTROL:BRAKE:40",
        "CONTROL:THROTTLE:100",
        "CONTROL:GEAR_UP",
        "CONTROL:RESET_ANGLES",
        "CONTROL:NOT_A_COMMAND",
    ] {
        op.send_to(cmd.as_bytes(), addr).unwrap();
    }

    assert!(wait_for(|| steering.status().angle_deg == 22.5));
    assert!(wait_for(|| brakes.status().input_pct == 40.0));
    assert!(wait_for(|| tc.take_reset_angles()));

    // Gear 1 limits the target to 40 % duty, the shift then lifts it to gear 2's 60 %
    assert!(wait_for(|| motor.get_motor_status().gear == 2));
    assert!(wait_for(|| motor.get_motor_status().target_duty == 60.0));

    // Stopping zeroes the demand
    op.send_to(b"CONTROL:STOP", addr).unwrap();
    assert!(wait_for(|| motor.get_motor_status().target_duty == 0.0));

    tc.neutralise();
    assert_eq!(brakes.status().input_pct, 0.0);
    assert_eq!(steering.status().angle_deg, 0.0);

    server.shutdown();
    motor.shutdown();
}
