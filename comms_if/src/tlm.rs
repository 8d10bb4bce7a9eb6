//! # Telemetry value model
//!
//! Every value which goes out on the wire is first converted into a [`TlmValue`]. The set of
//! variants is closed, so the encoder only ever sees booleans, integers, finite floats, strings,
//! and nested maps of the same.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::convert::TryFrom;

// ------------------------------------------------------------------------------------------------
// TYPES
// ------------------------------------------------------------------------------------------------

/// An ordered key-value telemetry map.
pub type TlmMap = BTreeMap<String, TlmValue>;

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// A single canonical telemetry value.
///
/// The variant order matters for deserialisation: integers must be tried before floats so that
/// whole numbers sent as integers come back as integers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TlmValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Map(TlmMap),
}

// ------------------------------------------------------------------------------------------------
// TRAITS
// ------------------------------------------------------------------------------------------------

/// A record which can be flattened into telemetry.
pub trait ToTlm {
    /// Convert the record into a telemetry map.
    fn to_tlm(&self) -> TlmMap;

    /// Insert all of this record's entries into an existing map, overwriting duplicate keys.
    fn merge_into(&self, map: &mut TlmMap) {
        map.extend(self.to_tlm());
    }
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl TlmValue {
    /// Return the canonical form of this value.
    ///
    /// Non-finite floats have no JSON representation and are replaced with the strings `"NaN"`,
    /// `"inf"` and `"-inf"`. Maps are canonicalised recursively.
    pub fn canonical(self) -> Self {
        match self {
            TlmValue::Float(f) => float_to_tlm(f),
            TlmValue::Map(m) => TlmValue::Map(canonical_map(m)),
            v => v
        }
    }

    /// Get the value as a float if it is numeric.
    pub fn as_f64(&self) -> Option<f64> {
        match *self {
            TlmValue::Int(i) => Some(i as f64),
            TlmValue::Float(f) => Some(f),
            _ => None
        }
    }

    /// Get the value as a bool if it is one.
    pub fn as_bool(&self) -> Option<bool> {
        match *self {
            TlmValue::Bool(b) => Some(b),
            _ => None
        }
    }

    /// Get the value as a string slice if it is one.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            TlmValue::Str(s) => Some(s.as_str()),
            _ => None
        }
    }
}

macro_rules! impl_from_int {
    ($($t:ty),+) => {
        $(
            impl From<$t> for TlmValue {
                fn from(v: $t) -> Self {
                    TlmValue::Int(v as i64)
                }
            }
        )+
    };
}

impl_from_int!(i8, i16, i32, i64, u8, u16, u32);

impl From<u64> for TlmValue {
    fn from(v: u64) -> Self {
        match i64::try_from(v) {
            Ok(i) => TlmValue::Int(i),
            Err(_) => TlmValue::Float(v as f64)
        }
    }
}

impl From<usize> for TlmValue {
    fn from(v: usize) -> Self {
        TlmValue::from(v as u64)
    }
}

impl From<f64> for TlmValue {
    fn from(v: f64) -> Self {
        float_to_tlm(v)
    }
}

impl From<f32> for TlmValue {
    fn from(v: f32) -> Self {
        float_to_tlm(v as f64)
    }
}

impl From<bool> for TlmValue {
    fn from(v: bool) -> Self {
        TlmValue::Bool(v)
    }
}

impl From<String> for TlmValue {
    fn from(v: String) -> Self {
        TlmValue::Str(v)
    }
}

impl From<&str> for TlmValue {
    fn from(v: &str) -> Self {
        TlmValue::Str(v.to_string())
    }
}

impl From<TlmMap> for TlmValue {
    fn from(v: TlmMap) -> Self {
        TlmValue::Map(v)
    }
}

// ------------------------------------------------------------------------------------------------
// FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Canonicalise every value in the map, recursing into nested maps.
pub fn canonical_map(map: TlmMap) -> TlmMap {
    map.into_iter()
        .map(|(k, v)| (k, v.canonical()))
        .collect()
}

/// Insert a value into the map under `key`.
pub fn insert<V: Into<TlmValue>>(map: &mut TlmMap, key: &str, value: V) {
    map.insert(key.to_string(), value.into());
}

fn float_to_tlm(f: f64) -> TlmValue {
    if f.is_nan() {
        TlmValue::Str("NaN".into())
    }
    else if f.is_infinite() {
        TlmValue::Str(if f > 0.0 { "inf" } else { "-inf" }.into())
    }
    else {
        TlmValue::Float(f)
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_non_finite_floats_become_strings() {
        assert_eq!(TlmValue::from(f64::NAN), TlmValue::Str("NaN".into()));
        assert_eq!(TlmValue::from(f64::INFINITY), TlmValue::Str("inf".into()));
        assert_eq!(TlmValue::from(f32::NEG_INFINITY), TlmValue::Str("-inf".into()));
        assert_eq!(TlmValue::from(1.5f64), TlmValue::Float(1.5));
    }

    #[test]
    fn test_canonical_recurses() {
        let mut inner = TlmMap::new();
        inner.insert("bad".into(), TlmValue::Float(f64::NAN));

        let mut outer = TlmMap::new();
        outer.insert("nested".into(), TlmValue::Map(inner));
        outer.insert("ok".into(), TlmValue::Int(3));

        let canon = canonical_map(outer);
        match &canon["nested"] {
            TlmValue::Map(m) => assert_eq!(m["bad"], TlmValue::Str("NaN".into())),
            v => panic!("Expected a map, got {:?}", v)
        }
        assert_eq!(canon["ok"], TlmValue::Int(3));
    }

    #[test]
    fn test_large_unsigned_does_not_wrap() {
        assert_eq!(TlmValue::from(u64::MAX), TlmValue::Float(u64::MAX as f64));
        assert_eq!(TlmValue::from(7usize), TlmValue::Int(7));
    }

    #[test]
    fn test_json_keeps_ints_and_floats_apart() {
        let mut map = TlmMap::new();
        insert(&mut map, "count", 4u32);
        insert(&mut map, "whole_float", 2.0f64);
        insert(&mut map, "flag", true);

        let json = serde_json::to_string(&map).unwrap();
        let back: TlmMap = serde_json::from_str(&json).unwrap();

        assert_eq!(back, map);
    }
}
