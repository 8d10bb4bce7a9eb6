//! # Data store
//!
//! Per-cycle bookkeeping for the telemetry loop and the merge of every component's status into
//! the single flat map that goes out with each packet.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use std::time::Instant;

use comms_if::{
    net::NetStats,
    tlm::{insert, TlmMap, TlmValue, ToTlm},
};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Which components came up at start-up.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SystemStatus {
    pub camera: bool,
    pub sensors: bool,
    pub motor: bool,
    pub brakes: bool,
    pub steering: bool,
    pub network: bool,
}

/// Counters kept by the telemetry loop.
#[derive(Debug, Clone)]
pub struct DataStore {
    pub system_status: SystemStatus,

    /// Number of telemetry cycles run.
    pub loop_count: u64,

    /// Number of video frames sent.
    pub frame_count: u64,

    /// Number of fresh sensor records produced.
    pub sensor_count: u64,

    /// Number of cycles where no client was sent the packet.
    pub send_failures: u64,

    start_time: Instant,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl SystemStatus {
    pub fn num_online(&self) -> usize {
        [
            self.camera, self.sensors, self.motor, self.brakes, self.steering, self.network
        ].iter().filter(|s| **s).count()
    }
}

impl ToTlm for SystemStatus {
    fn to_tlm(&self) -> TlmMap {
        let online = |s: bool| if s { "Online" } else { "Offline" };

        let mut map = TlmMap::new();
        insert(&mut map, "camera", online(self.camera));
        insert(&mut map, "sensors", online(self.sensors));
        insert(&mut map, "motor", online(self.motor));
        insert(&mut map, "brakes", online(self.brakes));
        insert(&mut map, "steering", online(self.steering));
        insert(&mut map, "network", online(self.network));
        map
    }
}

impl DataStore {
    pub fn new(system_status: SystemStatus) -> Self {
        Self {
            system_status,
            loop_count: 0,
            frame_count: 0,
            sensor_count: 0,
            send_failures: 0,
            start_time: Instant::now(),
        }
    }

    /// Seconds since the store was created.
    pub fn uptime_s(&self) -> f64 {
        self.start_time.elapsed().as_secs_f64()
    }

    /// Merge the component records into one map.
    ///
    /// Records are flattened in order, so a later record overwrites an earlier one on a shared
    /// key. The component status and network statistics are nested under their own keys.
    pub fn assemble(&self, records: &[&dyn ToTlm], net: &NetStats) -> TlmMap {
        let mut map = TlmMap::new();

        for r in records {
            r.merge_into(&mut map);
        }

        map.insert("system_status".into(), TlmValue::Map(self.system_status.to_tlm()));
        map.insert("network".into(), TlmValue::Map(net.to_tlm()));
        insert(&mut map, "frame_count", self.frame_count);
        insert(&mut map, "sensor_count", self.sensor_count);
        insert(&mut map, "loop_count", self.loop_count);
        insert(&mut map, "system_uptime", self.uptime_s());

        map
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use comms_if::eqpt::{collab::SteeringStatus, motor::MotorStatus};
    use comms_if::eqpt::imu::TelemetryRecord;
    use comms_if::net::{packet, Decoded, TmPacket};

    #[test]
    fn test_assemble_is_flat_with_nested_status() {
        let mut store = DataStore::new(SystemStatus { 
            motor: true, 
            network: true, 
            ..Default::default() 
        });
        store.loop_count = 3;

        let imu = TelemetryRecord { seq: 7, ..Default::default() };
        let steering = SteeringStatus { angle_deg: 12.5, ..Default::default() };

        let map = store.assemble(&[&imu, &steering], &NetStats::default());

        assert_eq!(map["readings_count"], TlmValue::Int(7));
        assert_eq!(map["steering_angle"], TlmValue::Float(12.5));
        assert_eq!(map["loop_count"], TlmValue::Int(3));

        match &map["system_status"] {
            TlmValue::Map(s) => {
                assert_eq!(s["motor"], TlmValue::Str("Online".into()));
                assert_eq!(s["camera"], TlmValue::Str("Offline".into()));
            },
            v => panic!("Expected a nested map, got {:?}", v)
        }
        assert_eq!(store.system_status.num_online(), 2);
    }

    #[test]
    fn test_assembled_map_survives_the_wire() {
        let store = DataStore::new(SystemStatus::default());
        let motor = MotorStatus {
            engine_rpm: f64::NAN,
            ..stopped_motor()
        };

        let map = store.assemble(&[&motor], &NetStats::default());
        let bytes = packet::encode(b"jpeg", &map).unwrap();

        match TmPacket::decode(&bytes).unwrap() {
            Decoded::Data(p) => {
                assert_eq!(p.frame, b"jpeg".to_vec());
                assert_eq!(p.tlm["engine_rpm"], TlmValue::Str("NaN".into()));
                assert_eq!(p.tlm["current_gear"], TlmValue::Int(1));
            },
            Decoded::Termination => panic!("Expected data")
        }
    }

    fn stopped_motor() -> MotorStatus {
        use comms_if::eqpt::motor::{Direction, EfficiencyZone};

        MotorStatus {
            direction: Direction::Stopped,
            current_duty: 0.0,
            target_duty: 0.0,
            throttle: 0.0,
            gear: 1,
            gear_ratio: 3.5,
            clutch_engaged: true,
            shifting: false,
            zone: EfficiencyZone::Ideal,
            zone_multiplier: 1.0,
            ideal_zone_pct: 0.0,
            engine_rpm: 1200.0,
            wheel_rpm: 0.0,
            speed_kmh: 0.0,
            gear_changes: 0,
            runtime_s: 0.0,
            distance_km: 0.0,
            hardware_ready: false,
        }
    }
}
