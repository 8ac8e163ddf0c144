//! The `x402Version` marker.

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Protocol version understood by this crate.
pub const X402_VERSION: u8 = 1;

/// Marker for the `x402Version` field of outgoing messages.
///
/// Always serializes as `1`. Deserialization rejects any other value, so a
/// message typed with this field can only ever carry version 1.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash)]
pub struct X402V1;

impl PartialEq<u8> for X402V1 {
    fn eq(&self, other: &u8) -> bool {
        *other == X402_VERSION
    }
}

impl From<X402V1> for u8 {
    fn from(_: X402V1) -> Self {
        X402_VERSION
    }
}

impl Serialize for X402V1 {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(X402_VERSION)
    }
}

impl<'de> Deserialize<'de> for X402V1 {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        match u8::deserialize(deserializer)? {
            X402_VERSION => Ok(Self),
            v => Err(serde::de::Error::custom(format!(
                "expected x402Version {X402_VERSION}, got {v}"
            ))),
        }
    }
}
