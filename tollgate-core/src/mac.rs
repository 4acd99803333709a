use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::InvalidAddressFormat;

/// A 6-byte MAC address.
///
/// Ordering and equality are byte-value ordering. The `Display` form is
/// colon-delimited lowercase hex; [`MacAddress::raw_hex`] is the bare hex
/// form used in protocol payloads.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MacAddress([u8; 6]);

impl MacAddress {
    pub const fn new(octets: [u8; 6]) -> Self {
        MacAddress(octets)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, InvalidAddressFormat> {
        let octets: [u8; 6] = bytes
            .try_into()
            .map_err(|_| InvalidAddressFormat::new(hex::encode(bytes)))?;
        Ok(MacAddress(octets))
    }

    pub const fn octets(&self) -> [u8; 6] {
        self.0
    }

    /// Non-delimited lowercase hex representation.
    pub fn raw_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl FromStr for MacAddress {
    type Err = InvalidAddressFormat;

    /// Parses standard (`aa:bb:cc:dd:ee:ff`), Cisco (`aabb.ccdd.eeff`), or
    /// non-delimited (`aabbccddeeff`) notation.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let cleaned: String = s.chars().filter(|c| *c != ':' && *c != '.').collect();
        if cleaned.len() != 12 {
            return Err(InvalidAddressFormat::new(s));
        }
        let bytes = hex::decode(&cleaned).map_err(|_| InvalidAddressFormat::new(s))?;
        MacAddress::from_bytes(&bytes).map_err(|_| InvalidAddressFormat::new(s))
    }
}

impl fmt::Display for MacAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            self.0[0], self.0[1], self.0[2], self.0[3], self.0[4], self.0[5]
        )
    }
}

impl fmt::Debug for MacAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MacAddress({})", self)
    }
}

impl Serialize for MacAddress {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for MacAddress {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
