//! # Transmission statistics

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use std::time::Instant;

use crate::tlm::{insert, TlmMap, ToTlm};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Counters for the telemetry send path.
#[derive(Debug, Clone, Copy)]
pub struct NetStats {
    /// Datagrams successfully sent, counting each client separately.
    pub packets_sent: u64,

    pub bytes_sent: u64,

    /// Failed sends, counting each client separately.
    pub send_errors: u64,

    /// Datagrams received on the command socket.
    pub commands_received: u64,

    /// Command datagrams which could not be decoded.
    pub commands_dropped: u64,

    /// Number of currently connected clients.
    pub num_clients: usize,

    pub start_time: Instant,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl NetStats {
    pub fn new(start_time: Instant) -> Self {
        Self {
            packets_sent: 0,
            bytes_sent: 0,
            send_errors: 0,
            commands_received: 0,
            commands_dropped: 0,
            num_clients: 0,
            start_time,
        }
    }

    /// Seconds since the stats started.
    pub fn elapsed_s(&self) -> f64 {
        self.start_time.elapsed().as_secs_f64()
    }

    /// Mean sending rate in packets per second.
    pub fn packets_per_second(&self) -> f64 {
        rate(self.packets_sent, self.elapsed_s())
    }

    /// Mean sending rate in megabits per second.
    pub fn mbps(&self) -> f64 {
        rate(self.bytes_sent, self.elapsed_s()) * 8.0 / (1024.0 * 1024.0)
    }
}

impl Default for NetStats {
    fn default() -> Self {
        Self::new(Instant::now())
    }
}

impl ToTlm for NetStats {
    fn to_tlm(&self) -> TlmMap {
        let mut map = TlmMap::new();
        insert(&mut map, "packets_sent", self.packets_sent);
        insert(&mut map, "bytes_sent", self.bytes_sent);
        insert(&mut map, "send_errors", self.send_errors);
        insert(&mut map, "commands_received", self.commands_received);
        insert(&mut map, "commands_dropped", self.commands_dropped);
        insert(&mut map, "num_clients", self.num_clients);
        insert(&mut map, "packets_per_second", self.packets_per_second());
        insert(&mut map, "mbps", self.mbps());
        map
    }
}

fn rate(count: u64, elapsed_s: f64) -> f64 {
    if elapsed_s > 0.0 {
        count as f64 / elapsed_s
    }
    else {
        0.0
    }
}
