//! # Control commands
//!
//! The text after `CONTROL:` in an operator command, for example `THROTTLE:30.0` or `GEAR_UP`.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use std::fmt;
use std::str::FromStr;

use super::TcParseError;

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// An actuation command.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ControlCmd {
    /// Throttle demand in percent, 0 to 100.
    Throttle(f64),

    /// Brake demand in percent, 0 to 100.
    Brake(f64),

    /// Brake balance in percent, 0 is fully front and 100 fully rear.
    BrakeBalance(f64),

    /// Steering demand in percent, -100 is full left and 100 full right.
    Steering(f64),

    GearUp,

    GearDown,

    /// Select reverse (`true`) or forward (`false`) drive.
    Reverse(bool),

    /// Emergency stop of the motor.
    Stop,

    /// Zero the integrated attitude angles.
    ResetAngles,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl ControlCmd {
    /// Parse a control command.
    pub fn parse(text: &str) -> Result<Self, TcParseError> {
        let text = text.trim();

        let (name, value) = match text.split_once(':') {
            Some((n, v)) => (n, Some(v.trim())),
            None => (text, None)
        };

        match name {
            "THROTTLE" => parse_pct("THROTTLE", value).map(ControlCmd::Throttle),
            "BRAKE" => parse_pct("BRAKE", value).map(ControlCmd::Brake),
            "BRAKE_BALANCE" => parse_pct("BRAKE_BALANCE", value).map(ControlCmd::BrakeBalance),
            "STEERING" => parse_pct("STEERING", value).map(ControlCmd::Steering),
            "GEAR_UP" => Ok(ControlCmd::GearUp),
            "GEAR_DOWN" => Ok(ControlCmd::GearDown),
            "REVERSE" => match value {
                Some("1") => Ok(ControlCmd::Reverse(true)),
                Some("0") => Ok(ControlCmd::Reverse(false)),
                Some(v) => Err(TcParseError::InvalidValue("REVERSE", v.to_string())),
                None => Err(TcParseError::MissingValue("REVERSE"))
            },
            "STOP" => Ok(ControlCmd::Stop),
            "RESET_ANGLES" => Ok(ControlCmd::ResetAngles),
            _ => Err(TcParseError::UnknownControl(text.to_string()))
        }
    }
}

impl FromStr for ControlCmd {
    type Err = TcParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for ControlCmd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ControlCmd::Throttle(v) => write!(f, "THROTTLE:{}", v),
            ControlCmd::Brake(v) => write!(f, "BRAKE:{}", v),
            ControlCmd::BrakeBalance(v) => write!(f, "BRAKE_BALANCE:{}", v),
            ControlCmd::Steering(v) => write!(f, "STEERING:{}", v),
            ControlCmd::GearUp => write!(f, "GEAR_UP"),
            ControlCmd::GearDown => write!(f, "GEAR_DOWN"),
            ControlCmd::Reverse(r) => write!(f, "REVERSE:{}", if *r { 1 } else { 0 }),
            ControlCmd::Stop => write!(f, "STOP"),
            ControlCmd::ResetAngles => write!(f, "RESET_ANGLES"),
        }
    }
}

// ---------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ---------------------------------------------------------------------------

/// Parse a finite percentage value. Range limiting is left to the actuator.
fn parse_pct(name: &'static str, value: Option<&str>) -> Result<f64, TcParseError> {
    let v = value.ok_or(TcParseError::MissingValue(name))?;

    match v.parse::<f64>() {
        Ok(f) if f.is_finite() => Ok(f),
        _ => Err(TcParseError::InvalidValue(name, v.to_string()))
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_parse_values() {
        assert_eq!(ControlCmd::parse("THROTTLE:30.0"), Ok(ControlCmd::Throttle(30.0)));
        assert_eq!(ControlCmd::parse("BRAKE:50"), Ok(ControlCmd::Brake(50.0)));
        assert_eq!(
            ControlCmd::parse("BRAKE_BALANCE:60.0"), 
            Ok(ControlCmd::BrakeBalance(60.0))
        );
        assert_eq!(ControlCmd::parse("STEERING:-15.0"), Ok(ControlCmd::Steering(-15.0)));
        assert_eq!(ControlCmd::parse("REVERSE:1"), Ok(ControlCmd::Reverse(true)));
    }

    #[test]
    fn test_parse_flags() {
        assert_eq!(ControlCmd::parse("GEAR_UP"), Ok(ControlCmd::GearUp));
        assert_eq!(ControlCmd::parse("GEAR_DOWN"), Ok(ControlCmd::GearDown));
        assert_eq!(ControlCmd::parse("STOP"), Ok(ControlCmd::Stop));
        assert_eq!(ControlCmd::parse("RESET_ANGLES"), Ok(ControlCmd::ResetAngles));
    }

    #[test]
    fn test_parse_errors() {
        assert_eq!(
            ControlCmd::parse("THROTTLE:fast"), 
            Err(TcParseError::InvalidValue("THROTTLE", "fast".into()))
        );
        assert_eq!(
            ControlCmd::parse("THROTTLE:NaN"), 
            Err(TcParseError::InvalidValue("THROTTLE", "NaN".into()))
        );
        assert_eq!(ControlCmd::parse("BRAKE"), Err(TcParseError::MissingValue("BRAKE")));
        assert_eq!(
            ControlCmd::parse("REVERSE:yes"), 
            Err(TcParseError::InvalidValue("REVERSE", "yes".into()))
        );
        assert_eq!(
            ControlCmd::parse("HORN"), 
            Err(TcParseError::UnknownControl("HORN".into()))
        );
    }
}
