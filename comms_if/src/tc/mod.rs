//! # Telecommand module
//!
//! Operators send one command per datagram as plain UTF-8 text. Commands are parsed once at the
//! protocol boundary into a [`Command`], and parsing never fails: anything unrecognised becomes
//! [`Command::Unknown`].

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

pub mod control;

pub use control::ControlCmd;

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use std::fmt;
use thiserror::Error;

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// A command sent by an operator to the vehicle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Register with the vehicle, optionally giving the port to send telemetry to.
    Connect { port: Option<u16> },

    /// Unregister from the vehicle.
    Disconnect,

    /// Liveness check, the token is echoed back.
    Ping { token: Option<String> },

    /// Actuation command, the text after `CONTROL:` verbatim.
    Control(String),

    /// Anything else.
    Unknown(String),
}

/// A reply sent by the vehicle on the command channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Connected,
    Reconnected,
    Pong { token: Option<String> },
}

/// Possible parsing errors.
#[derive(Debug, Error, PartialEq)]
pub enum TcParseError {
    #[error("Command datagram is not valid UTF-8")]
    InvalidUtf8,

    #[error("Unrecognised control command: {0:?}")]
    UnknownControl(String),

    #[error("Control command {0} expects a value")]
    MissingValue(&'static str),

    #[error("Invalid value {1:?} for control command {0}")]
    InvalidValue(&'static str, String),
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Command {
    /// Parse a command from its text form.
    ///
    /// Surrounding whitespace is ignored. A `CONNECT` with a port which is not a valid non-zero
    /// `u16` is treated as unknown rather than silently using the default port.
    pub fn parse(text: &str) -> Self {
        let text = text.trim();

        let (head, arg) = match text.split_once(':') {
            Some((h, a)) => (h, Some(a)),
            None => (text, None)
        };

        match (head, arg) {
            ("CONNECT", None) => Command::Connect { port: None },
            ("CONNECT", Some(p)) => match p.trim().parse::<u16>() {
                Ok(port) if port != 0 => Command::Connect { port: Some(port) },
                _ => Command::Unknown(text.to_string())
            },
            ("DISCONNECT", None) => Command::Disconnect,
            ("PING", None) => Command::Ping { token: None },
            ("PING", Some(t)) if t.is_empty() => Command::Ping { token: None },
            ("PING", Some(t)) => Command::Ping { token: Some(t.to_string()) },
            ("CONTROL", Some(rest)) => Command::Control(rest.to_string()),
            _ => Command::Unknown(text.to_string())
        }
    }

    /// Parse a command from a raw datagram.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, TcParseError> {
        std::str::from_utf8(bytes)
            .map(Self::parse)
            .map_err(|_| TcParseError::InvalidUtf8)
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::Connect { port: None } => write!(f, "CONNECT"),
            Command::Connect { port: Some(p) } => write!(f, "CONNECT:{}", p),
            Command::Disconnect => write!(f, "DISCONNECT"),
            Command::Ping { token: None } => write!(f, "PING"),
            Command::Ping { token: Some(t) } => write!(f, "PING:{}", t),
            Command::Control(rest) => write!(f, "CONTROL:{}", rest),
            Command::Unknown(text) => write!(f, "{}", text),
        }
    }
}

impl Reply {
    /// Parse a reply from its text form, returning `None` if it isn't one.
    pub fn parse(text: &str) -> Option<Self> {
        match text.trim() {
            "CONNECTED" => Some(Reply::Connected),
            "RECONNECTED" => Some(Reply::Reconnected),
            "PONG" => Some(Reply::Pong { token: None }),
            t => t.strip_prefix("PONG:")
                .map(|tok| Reply::Pong { token: Some(tok.to_string()) })
        }
    }
}

impl fmt::Display for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reply::Connected => write!(f, "CONNECTED"),
            Reply::Reconnected => write!(f, "RECONNECTED"),
            Reply::Pong { token: None } => write!(f, "PONG"),
            Reply::Pong { token: Some(t) } => write!(f, "PONG:{}", t),
        }
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_parse_connect() {
        assert_eq!(Command::parse("CONNECT"), Command::Connect { port: None });
        assert_eq!(Command::parse("CONNECT:9000"), Command::Connect { port: Some(9000) });
        assert_eq!(Command::parse("CONNECT:9000\n"), Command::Connect { port: Some(9000) });
        assert_eq!(
            Command::parse("CONNECT:abc"), 
            Command::Unknown("CONNECT:abc".into())
        );
        assert_eq!(Command::parse("CONNECT:0"), Command::Unknown("CONNECT:0".into()));
    }

    #[test]
    fn test_parse_ping() {
        assert_eq!(Command::parse("PING"), Command::Ping { token: None });
        assert_eq!(Command::parse("PING:"), Command::Ping { token: None });
        assert_eq!(
            Command::parse("PING:1712.5"), 
            Command::Ping { token: Some("1712.5".into()) }
        );
    }

    #[test]
    fn test_parse_control_and_unknown() {
        assert_eq!(
            Command::parse("CONTROL:BRAKE_BALANCE:60.0"), 
            Command::Control("BRAKE_BALANCE:60.0".into())
        );
        assert_eq!(Command::parse("DISCONNECT"), Command::Disconnect);
        assert_eq!(Command::parse("DISCONNECT:now"), Command::Unknown("DISCONNECT:now".into()));
        assert_eq!(Command::parse("HELLO"), Command::Unknown("HELLO".into()));
        assert_eq!(Command::parse("CONTROL"), Command::Unknown("CONTROL".into()));
        assert_eq!(Command::parse("connect"), Command::Unknown("connect".into()));
    }

    #[test]
    fn test_invalid_utf8() {
        assert_eq!(Command::from_bytes(&[0xFF, 0xFE]), Err(TcParseError::InvalidUtf8));
        assert_eq!(Command::from_bytes(b"PING"), Ok(Command::Ping { token: None }));
    }

    #[test]
    fn test_reply_text() {
        assert_eq!(Reply::Connected.to_string(), "CONNECTED");
        assert_eq!(Reply::Reconnected.to_string(), "RECONNECTED");
        assert_eq!(Reply::Pong { token: Some("7".into()) }.to_string(), "PONG:7");
        assert_eq!(Reply::parse("PONG:7"), Some(Reply::Pong { token: Some("7".into()) }));
        assert_eq!(Reply::parse("PONG"), Some(Reply::Pong { token: None }));
        assert_eq!(Reply::parse("NOPE"), None);
    }

    #[test]
    fn test_command_display_round_trips() {
        for text in &["CONNECT", "CONNECT:9999", "DISCONNECT", "PING:x", "CONTROL:STOP"] {
            assert_eq!(Command::parse(text).to_string(), *text);
        }
    }
}
