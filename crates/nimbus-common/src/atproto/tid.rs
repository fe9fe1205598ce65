//! TID (Timestamp Identifier) type and generation.
//!
//! TIDs are record keys encoding a 64-bit value as 13 characters of a
//! sortable base32 alphabet. The value packs a microsecond timestamp in the
//! high 54 bits and a 10-bit clock id in the low bits, so lexicographic
//! order on the string equals numeric order on the packed value.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::Error;

/// Base32 sort alphabet used for TID encoding.
const BASE32_SORT: &[u8; 32] = b"234567abcdefghijklmnopqrstuvwxyz";

/// Length of a TID string.
const TID_LENGTH: usize = 13;

/// Mask for the 10-bit clock id.
const CLOCK_ID_MASK: u64 = 0x03FF;

/// A validated Timestamp Identifier (TID).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Tid(String);

impl Tid {
    /// Creates a new TID from a string, validating the format.
    ///
    /// # Errors
    /// Returns an error if the TID format is invalid.
    pub fn new(s: impl Into<String>) -> Result<Self, Error> {
        let s = s.into();
        Self::validate(&s)?;
        Ok(Self(s))
    }

    /// Parses a TID, returning `None` on invalid input.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        Self::new(s).ok()
    }

    /// Generates a new TID from the current time and a random clock id.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn now() -> Self {
        let timestamp_us = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_micros() as u64) // won't overflow until year ~586,000
            .unwrap_or(0);
        Self::from_timestamp(timestamp_us)
    }

    /// Creates a TID from a microsecond timestamp and a random clock id.
    #[must_use]
    pub fn from_timestamp(timestamp_us: u64) -> Self {
        let clock_id: u16 = rand::random();
        Self::from_parts(timestamp_us, clock_id)
    }

    /// Creates a TID from a timestamp and clock id.
    ///
    /// The clock id is masked to its low 10 bits.
    #[must_use]
    pub fn from_parts(timestamp_us: u64, clock_id: u16) -> Self {
        let packed = (timestamp_us << 10) | (u64::from(clock_id) & CLOCK_ID_MASK);
        Self(Self::encode_base32_sort(packed))
    }

    /// Validates a TID string.
    ///
    /// # Errors
    /// Returns an error if the TID format is invalid.
    pub fn validate(s: &str) -> Result<(), Error> {
        if s.len() != TID_LENGTH {
            return Err(Error::InvalidTid(format!(
                "TID must be {TID_LENGTH} characters, got {}",
                s.len()
            )));
        }

        for c in s.bytes() {
            if !BASE32_SORT.contains(&c) {
                return Err(Error::InvalidTid(format!(
                    "invalid character: {}",
                    c as char
                )));
            }
        }

        // The high bit of the packed value must be zero, so the first
        // character's alphabet index is < 16.
        let first = s.as_bytes()[0];
        if char_index(first) >= 16 {
            return Err(Error::InvalidTid(
                "first character out of range (high bit set)".into(),
            ));
        }

        Ok(())
    }

    fn encode_base32_sort(mut value: u64) -> String {
        let mut result = [0u8; TID_LENGTH];
        for slot in result.iter_mut().rev() {
            *slot = BASE32_SORT[(value & 0x1F) as usize];
            value >>= 5;
        }
        String::from_utf8(result.to_vec()).unwrap_or_default()
    }

    // Characters are validated at construction, so every lookup hits.
    fn decode_base32_sort(&self) -> u64 {
        self.0
            .bytes()
            .fold(0u64, |acc, b| (acc << 5) | char_index(b))
    }

    /// Returns the TID string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the packed 64-bit representation.
    #[must_use]
    pub fn packed(&self) -> u64 {
        self.decode_base32_sort()
    }

    /// Returns the timestamp in microseconds since the Unix epoch.
    #[must_use]
    pub fn timestamp_us(&self) -> u64 {
        self.packed() >> 10
    }

    /// Returns the 10-bit clock id.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn clock_id(&self) -> u16 {
        (self.packed() & CLOCK_ID_MASK) as u16
    }
}

fn char_index(b: u8) -> u64 {
    BASE32_SORT
        .iter()
        .position(|&c| c == b)
        .unwrap_or(0) as u64
}

impl fmt::Display for Tid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Tid {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl AsRef<str> for Tid {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for Tid {
    type Error = Error;

    fn try_from(s: String) -> Result<Self, Error> {
        Self::new(s)
    }
}

impl From<Tid> for String {
    fn from(tid: Tid) -> Self {
        tid.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tid_generation() {
        let tid = Tid::now();
        assert_eq!(tid.as_str().len(), TID_LENGTH);
        assert!(Tid::validate(tid.as_str()).is_ok());
    }

    #[test]
    fn test_tid_validation() {
        assert!(Tid::validate("3jzfcijpj2z2a").is_ok());

        // Wrong length
        assert!(Tid::validate("abc").is_err());
        assert!(Tid::validate("3jzfcijpj2z2aa").is_err());

        // 0 and 1 are not in the alphabet
        assert!(Tid::validate("0000000000001").is_err());
    }

    #[test]
    fn test_tid_rejects_high_bit() {
        // 'k' is index 16, so a TID starting with it encodes a set high bit.
        assert!(Tid::validate("k222222222222").is_err());
        assert!(Tid::validate("j222222222222").is_ok());
    }

    #[test]
    fn test_tid_parts_roundtrip() {
        let timestamp_us: u64 = 1_704_067_200_000_000; // 2024-01-01 00:00:00 UTC
        let tid = Tid::from_parts(timestamp_us, 42);

        assert_eq!(tid.timestamp_us(), timestamp_us);
        assert_eq!(tid.clock_id(), 42);
        assert_eq!(tid.packed(), (timestamp_us << 10) | 42);
    }

    #[test]
    fn test_tid_clock_id_masked() {
        let tid = Tid::from_parts(1_000_000, 0xFFFF);
        assert_eq!(tid.clock_id(), 0x03FF);
    }

    #[test]
    fn test_tid_encoding_bijective() {
        for (ts, clock) in [(0u64, 0u16), (1, 1), (1_000_000, 1023), (u64::MAX >> 11, 512)] {
            let tid = Tid::from_parts(ts, clock);
            let reparsed = Tid::new(tid.as_str()).unwrap();
            assert_eq!(reparsed.timestamp_us(), ts);
            assert_eq!(reparsed.clock_id(), clock);
        }
    }

    #[test]
    fn test_tid_string_order_matches_packed_order() {
        let a = Tid::from_parts(1_000_000, 5);
        let b = Tid::from_parts(1_000_000, 6);
        let c = Tid::from_parts(2_000_000, 0);

        assert!(a.as_str() < b.as_str());
        assert!(b.as_str() < c.as_str());
        assert!(a.packed() < b.packed());
        assert!(b.packed() < c.packed());
        assert!(a < b && b < c);
    }

    #[test]
    fn test_tid_json_roundtrip() {
        let tid = Tid::from_parts(1_704_067_200_000_000, 7);
        let json = serde_json::to_string(&tid).unwrap();
        let parsed: Tid = serde_json::from_str(&json).unwrap();
        assert_eq!(tid, parsed);
    }

    #[test]
    fn test_tid_json_decode_rejects_invalid() {
        assert!(serde_json::from_str::<Tid>("\"short\"").is_err());
    }
}
