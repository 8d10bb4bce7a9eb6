//! # Telemetry packet framing
//!
//! Layout of a telemetry datagram, all integers little endian:
//!
//! | Offset           | Size          | Field                       |
//! |------------------|---------------|-----------------------------|
//! | 0                | 4             | `frame_size` (u32)          |
//! | 4                | 4             | `sensor_size` (u32)         |
//! | 8                | `frame_size`  | opaque video frame          |
//! | 8 + `frame_size` | `sensor_size` | UTF-8 JSON telemetry map    |
//!
//! A header with both sizes zero is the termination signal and carries no payload.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use byteorder::{ByteOrder, LittleEndian};
use thiserror::Error;

use super::MAX_DATAGRAM_SIZE;
use crate::tlm::{canonical_map, TlmMap};

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Length of the size header.
pub const HEADER_LEN: usize = 8;

/// The termination signal.
pub const TERMINATION: [u8; HEADER_LEN] = [0; HEADER_LEN];

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// A telemetry packet: one video frame and one telemetry map.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TmPacket {
    /// Opaque video payload, may be empty.
    pub frame: Vec<u8>,

    /// Telemetry for this cycle.
    pub tlm: TlmMap,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// The result of decoding a datagram.
#[derive(Debug, Clone, PartialEq)]
pub enum Decoded {
    /// The sender is shutting down.
    Termination,

    /// A normal telemetry packet.
    Data(TmPacket),
}

/// Errors raised while framing or unframing packets.
#[derive(Debug, Error)]
pub enum PacketError {
    #[error("Datagram is {0} bytes, shorter than the {} byte header", HEADER_LEN)]
    TooShort(usize),

    #[error("Header declares {declared} bytes but the datagram holds {actual}")]
    SizeMismatch { declared: u64, actual: usize },

    #[error("Packet of {0} bytes exceeds the maximum datagram size of {} bytes", MAX_DATAGRAM_SIZE)]
    TooLarge(usize),

    #[error("Telemetry payload is not valid UTF-8: {0}")]
    InvalidUtf8(std::str::Utf8Error),

    #[error("Telemetry payload is not a valid telemetry map: {0}")]
    InvalidTlm(serde_json::Error),

    #[error("Could not serialise the telemetry map: {0}")]
    SerialiseError(serde_json::Error),
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl TmPacket {
    /// Create a new packet.
    pub fn new(frame: Vec<u8>, tlm: TlmMap) -> Self {
        Self { frame, tlm }
    }

    /// Encode the packet into a datagram.
    pub fn encode(&self) -> Result<Vec<u8>, PacketError> {
        encode(&self.frame, &self.tlm)
    }

    /// Decode a datagram.
    ///
    /// The termination signal is recognised from the header alone, so trailing bytes after a
    /// zero header are ignored.
    pub fn decode(bytes: &[u8]) -> Result<Decoded, PacketError> {
        if bytes.len() < HEADER_LEN {
            return Err(PacketError::TooShort(bytes.len()));
        }

        let frame_size = LittleEndian::read_u32(&bytes[0..4]) as usize;
        let sensor_size = LittleEndian::read_u32(&bytes[4..8]) as usize;

        if frame_size == 0 && sensor_size == 0 {
            return Ok(Decoded::Termination);
        }

        let declared = HEADER_LEN as u64 + frame_size as u64 + sensor_size as u64;
        if declared != bytes.len() as u64 {
            return Err(PacketError::SizeMismatch { declared, actual: bytes.len() });
        }

        let frame_end = HEADER_LEN + frame_size;
        let frame = bytes[HEADER_LEN..frame_end].to_vec();
        let sensor_bytes = &bytes[frame_end..];

        let tlm = if sensor_bytes.is_empty() {
            TlmMap::new()
        }
        else {
            let text = std::str::from_utf8(sensor_bytes)
                .map_err(PacketError::InvalidUtf8)?;
            serde_json::from_str(text)
                .map_err(PacketError::InvalidTlm)?
        };

        Ok(Decoded::Data(TmPacket { frame, tlm }))
    }
}

// ------------------------------------------------------------------------------------------------
// FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Serialise a telemetry map into its canonical JSON text.
pub fn encode_tlm(tlm: &TlmMap) -> Result<String, PacketError> {
    serde_json::to_string(&canonical_map(tlm.clone()))
        .map_err(PacketError::SerialiseError)
}

/// Frame a video payload and telemetry map into a datagram.
pub fn encode(frame: &[u8], tlm: &TlmMap) -> Result<Vec<u8>, PacketError> {
    let sensor = encode_tlm(tlm)?;

    let total = HEADER_LEN + frame.len() + sensor.len();
    if total > MAX_DATAGRAM_SIZE {
        return Err(PacketError::TooLarge(total));
    }

    let mut header = [0u8; HEADER_LEN];
    LittleEndian::write_u32(&mut header[0..4], frame.len() as u32);
    LittleEndian::write_u32(&mut header[4..8], sensor.len() as u32);

    let mut buf = Vec::with_capacity(total);
    buf.extend_from_slice(&header);
    buf.extend_from_slice(frame);
    buf.extend_from_slice(sensor.as_bytes());

    Ok(buf)
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use crate::tlm::{insert, TlmValue};

    fn sample_tlm() -> TlmMap {
        let mut tlm = TlmMap::new();
        insert(&mut tlm, "bmi160_accel_x", 9.81);
        insert(&mut tlm, "readings_count", 12u64);
        insert(&mut tlm, "is_braking", false);
        insert(&mut tlm, "gear_zone", "IDEAL");
        insert(&mut tlm, "broken_sensor", f64::NAN);
        tlm
    }

    #[test]
    fn test_round_trip() {
        let frame = vec![0xFF, 0xD8, 0x00, 0x42, 0xFF, 0xD9];
        let tlm = sample_tlm();

        let bytes = encode(&frame, &tlm).unwrap();
        assert_eq!(LittleEndian::read_u32(&bytes[0..4]), 6);

        match TmPacket::decode(&bytes).unwrap() {
            Decoded::Data(p) => {
                assert_eq!(p.frame, frame);
                assert_eq!(p.tlm, canonical_map(tlm));
                assert_eq!(p.tlm["broken_sensor"], TlmValue::Str("NaN".into()));
            },
            Decoded::Termination => panic!("Expected data, got termination")
        }
    }

    #[test]
    fn test_termination_with_trailing_bytes() {
        assert_eq!(TmPacket::decode(&TERMINATION).unwrap(), Decoded::Termination);

        let mut bytes = TERMINATION.to_vec();
        bytes.extend_from_slice(b"garbage");
        assert_eq!(TmPacket::decode(&bytes).unwrap(), Decoded::Termination);
    }

    #[test]
    fn test_short_and_mismatched_datagrams() {
        assert!(matches!(TmPacket::decode(&[1, 0, 0]), Err(PacketError::TooShort(3))));

        // Declares a 10 byte frame but carries 2
        let mut bytes = vec![10, 0, 0, 0, 0, 0, 0, 0];
        bytes.extend_from_slice(&[1, 2]);
        assert!(matches!(
            TmPacket::decode(&bytes),
            Err(PacketError::SizeMismatch { declared: 18, actual: 10 })
        ));
    }

    #[test]
    fn test_invalid_utf8_is_rejected() {
        let mut bytes = vec![0, 0, 0, 0, 2, 0, 0, 0];
        bytes.extend_from_slice(&[0xC3, 0x28]);
        assert!(matches!(TmPacket::decode(&bytes), Err(PacketError::InvalidUtf8(_))));
    }

    #[test]
    fn test_frame_only_packet() {
        let bytes = encode(&[1, 2, 3], &TlmMap::new()).unwrap();

        // An empty map is still sent as "{}"
        assert_eq!(LittleEndian::read_u32(&bytes[4..8]), 2);
        match TmPacket::decode(&bytes).unwrap() {
            Decoded::Data(p) => assert!(p.tlm.is_empty()),
            Decoded::Termination => panic!("Expected data, got termination")
        }
    }

    #[test]
    fn test_oversize_frame_is_rejected() {
        let frame = vec![0u8; MAX_DATAGRAM_SIZE];
        assert!(matches!(encode(&frame, &TlmMap::new()), Err(PacketError::TooLarge(_))));
    }
}
