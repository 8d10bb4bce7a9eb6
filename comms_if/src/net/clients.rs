//! # Connected client table
//!
//! Operators announce themselves with `CONNECT` and are keyed by IP address, so there is at most
//! one entry per IP. The table lock is only ever held to read or mutate the map. Callers take a
//! snapshot of the targets and send outside the lock.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// A single discovered operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientEntry {
    pub ip: IpAddr,

    /// Port the operator listens on for telemetry.
    pub port: u16,

    pub last_seen: Instant,
}

/// Thread safe table of connected operators.
#[derive(Debug, Default)]
pub struct ClientTable {
    clients: Mutex<HashMap<IpAddr, ClientEntry>>,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// Outcome of a `CONNECT`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Registration {
    /// First time this IP has connected.
    New,

    /// The IP was already known, its port and last-seen time were refreshed.
    Existing,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl ClientEntry {
    /// Address telemetry should be sent to.
    pub fn telemetry_addr(&self) -> SocketAddr {
        SocketAddr::new(self.ip, self.port)
    }
}

impl ClientTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register or refresh a client.
    pub fn register(&self, ip: IpAddr, port: u16, now: Instant) -> Registration {
        let mut clients = self.lock();

        match clients.get_mut(&ip) {
            Some(entry) => {
                entry.port = port;
                entry.last_seen = now;
                Registration::Existing
            },
            None => {
                clients.insert(ip, ClientEntry { ip, port, last_seen: now });
                Registration::New
            }
        }
    }

    /// Update the last-seen time of a known client. Returns false if the IP is unknown.
    pub fn touch(&self, ip: IpAddr, now: Instant) -> bool {
        match self.lock().get_mut(&ip) {
            Some(entry) => {
                entry.last_seen = now;
                true
            },
            None => false
        }
    }

    /// Remove a client, returning the removed entry if it was known.
    pub fn remove(&self, ip: IpAddr) -> Option<ClientEntry> {
        self.lock().remove(&ip)
    }

    /// Remove every client not seen within `timeout` of `now`.
    pub fn prune_stale(&self, timeout: Duration, now: Instant) -> Vec<ClientEntry> {
        let mut clients = self.lock();

        let stale: Vec<IpAddr> = clients.values()
            .filter(|c| now.saturating_duration_since(c.last_seen) > timeout)
            .map(|c| c.ip)
            .collect();

        stale.iter()
            .filter_map(|ip| clients.remove(ip))
            .collect()
    }

    /// Snapshot of the telemetry addresses of all clients.
    pub fn targets(&self) -> Vec<SocketAddr> {
        self.lock()
            .values()
            .map(ClientEntry::telemetry_addr)
            .collect()
    }

    /// Snapshot of all entries.
    pub fn entries(&self) -> Vec<ClientEntry> {
        self.lock().values().copied().collect()
    }

    pub fn get(&self, ip: IpAddr) -> Option<ClientEntry> {
        self.lock().get(&ip).copied()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// A panic while the lock was held cannot leave the map half-updated, so a poisoned lock is
    /// still usable.
    fn lock(&self) -> MutexGuard<HashMap<IpAddr, ClientEntry>> {
        self.clients.lock().unwrap_or_else(|e| e.into_inner())
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use std::net::Ipv4Addr;

    const IP_X: IpAddr = IpAddr::V4(Ipv4Addr::new(192, 168, 5, 120));
    const IP_Y: IpAddr = IpAddr::V4(Ipv4Addr::new(192, 168, 5, 121));

    #[test]
    fn test_register_is_idempotent_per_ip() {
        let table = ClientTable::new();
        let t0 = Instant::now();
        let t1 = t0 + Duration::from_secs(1);

        assert_eq!(table.register(IP_X, 9999, t0), Registration::New);
        assert_eq!(table.register(IP_X, 9000, t1), Registration::Existing);
        assert_eq!(table.len(), 1);

        let entry = table.get(IP_X).unwrap();
        assert_eq!(entry.port, 9000);
        assert_eq!(entry.last_seen, t1);
    }

    #[test]
    fn test_remove_and_touch() {
        let table = ClientTable::new();
        let t0 = Instant::now();

        assert!(!table.touch(IP_X, t0));
        table.register(IP_X, 9999, t0);
        assert!(table.touch(IP_X, t0 + Duration::from_millis(10)));

        assert!(table.remove(IP_X).is_some());
        assert!(table.remove(IP_X).is_none());
        assert!(table.is_empty());
    }

    #[test]
    fn test_prune_stale() {
        let table = ClientTable::new();
        let t0 = Instant::now();

        table.register(IP_X, 9999, t0);
        table.register(IP_Y, 9999, t0 + Duration::from_secs(8));

        let pruned = table.prune_stale(Duration::from_secs(5), t0 + Duration::from_secs(10));
        assert_eq!(pruned.len(), 1);
        assert_eq!(pruned[0].ip, IP_X);
        assert_eq!(table.targets(), vec![SocketAddr::new(IP_Y, 9999)]);
    }
}
