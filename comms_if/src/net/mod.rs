//! # Network Module
//!
//! This module provides the UDP protocol shared by the vehicle and its operators: packet
//! framing, the connected-client table, and the socket configuration.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

pub mod clients;
pub mod packet;
pub mod stats;

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use serde::Deserialize;
use std::net::UdpSocket;
use std::time::Duration;

pub use clients::{ClientEntry, ClientTable, Registration};
pub use packet::{Decoded, PacketError, TmPacket};
pub use stats::NetStats;

// ------------------------------------------------------------------------------------------------
// MACROS
// ------------------------------------------------------------------------------------------------

macro_rules! set_sockopts {
    ($socket:expr, $(($opt:ident, $val:expr)),+) => {
        $(
            $socket.$opt($val)
                .map_err(|e| SocketOptionError(stringify!($opt).into(), e))?;
        )+
    };
}

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Default port the vehicle listens on for commands.
pub const DEFAULT_COMMAND_PORT: u16 = 9998;

/// Default port operators listen on for telemetry, used when `CONNECT` carries no port.
pub const DEFAULT_TELEMETRY_PORT: u16 = 9999;

/// Largest payload which fits in a single IPv4 UDP datagram.
pub const MAX_DATAGRAM_SIZE: usize = 65_507;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Network parameters for the vehicle.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NetParams {
    /// Address the sockets bind to.
    pub bind_addr: String,

    /// Port the command socket listens on.
    pub command_port: u16,

    /// Telemetry port used for operators which connect without giving one.
    pub default_telemetry_port: u16,

    /// Read timeout on the command socket in seconds. Keeps the listener responsive to shutdown.
    pub recv_timeout_s: f64,

    /// Write timeout on the data socket in seconds.
    pub send_timeout_s: f64,

    /// Remove clients which have not been heard from in this many seconds. Zero disables
    /// pruning.
    pub client_timeout_s: f64,

    /// Minimum interval between repeated warnings about the same fault, in seconds.
    pub warn_interval_s: f64,
}

/// Represents options which can be set on a UDP socket.
///
/// `None` durations mean the socket blocks indefinitely.
#[derive(Debug, Clone)]
pub struct SocketOptions {
    /// Maximum time a receive blocks before returning `WouldBlock`/`TimedOut`.
    pub recv_timeout: Option<Duration>,

    /// Maximum time a send blocks before returning an error.
    pub send_timeout: Option<Duration>,

    /// Allow sending to broadcast addresses.
    pub broadcast: bool,

    /// IP time-to-live of outgoing packets.
    pub ttl: u32,
}

// ------------------------------------------------------------------------------------------------
// ERRORS
// ------------------------------------------------------------------------------------------------

/// Setting an option on a socket failed.
#[derive(thiserror::Error, Debug)]
#[error("Could not set the {0} socket option: {1}")]
pub struct SocketOptionError(pub String, pub std::io::Error);

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl NetParams {
    /// Socket options for the command (receive) socket.
    pub fn command_socket_options(&self) -> SocketOptions {
        SocketOptions {
            recv_timeout: secs_to_duration(self.recv_timeout_s),
            ..Default::default()
        }
    }

    /// Socket options for the data (send) socket.
    pub fn data_socket_options(&self) -> SocketOptions {
        SocketOptions {
            send_timeout: secs_to_duration(self.send_timeout_s),
            ..Default::default()
        }
    }

    /// The stale client timeout, or `None` if pruning is disabled.
    pub fn client_timeout(&self) -> Option<Duration> {
        secs_to_duration(self.client_timeout_s)
    }
}

impl Default for NetParams {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0".into(),
            command_port: DEFAULT_COMMAND_PORT,
            default_telemetry_port: DEFAULT_TELEMETRY_PORT,
            recv_timeout_s: 0.1,
            send_timeout_s: 0.05,
            client_timeout_s: 0.0,
            warn_interval_s: 5.0,
        }
    }
}

impl SocketOptions {
    /// Set these options on the given socket.
    pub fn set(&self, socket: &UdpSocket) -> Result<(), SocketOptionError> {
        set_sockopts!(
            socket,
            (set_read_timeout, self.recv_timeout),
            (set_write_timeout, self.send_timeout),
            (set_broadcast, self.broadcast),
            (set_ttl, self.ttl)
        );

        Ok(())
    }
}

impl Default for SocketOptions {
    fn default() -> Self {
        Self {
            recv_timeout: None,
            send_timeout: None,
            broadcast: false,
            ttl: 64,
        }
    }
}

// ------------------------------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Zero or negative (or non-finite) seconds means no timeout.
fn secs_to_duration(secs: f64) -> Option<Duration> {
    if secs.is_finite() && secs > 0.0 {
        Some(Duration::from_secs_f64(secs))
    }
    else {
        None
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_default_params() {
        let p = NetParams::default();
        assert_eq!(p.command_port, 9998);
        assert_eq!(p.default_telemetry_port, 9999);
        assert_eq!(p.client_timeout(), None);
        assert_eq!(
            p.command_socket_options().recv_timeout, 
            Some(Duration::from_millis(100))
        );
    }

    #[test]
    fn test_options_apply_to_socket() {
        let socket = UdpSocket::bind("127.0.0.1:0").unwrap();
        let opts = SocketOptions {
            recv_timeout: Some(Duration::from_millis(20)),
            ..Default::default()
        };

        opts.set(&socket).unwrap();
        assert_eq!(socket.read_timeout().unwrap(), Some(Duration::from_millis(20)));
    }
}
