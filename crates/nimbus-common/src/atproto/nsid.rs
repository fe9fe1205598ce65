//! NSID (Namespaced Identifier) type and validation.
//!
//! NSIDs name XRPC methods and record types in reverse-domain notation,
//! e.g. `app.bsky.feed.post`: the authority is `app.bsky.feed` and the
//! name is `post`.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::Error;

/// Maximum total length of an NSID.
const MAX_NSID_LENGTH: usize = 317;

/// Maximum length of a single segment.
const MAX_SEGMENT_LENGTH: usize = 63;

/// A validated Namespaced Identifier (NSID).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Nsid(String);

impl Nsid {
    /// Creates a new NSID from a string, validating the format.
    ///
    /// # Errors
    /// Returns an error if the NSID format is invalid.
    pub fn new(s: impl Into<String>) -> Result<Self, Error> {
        let s = s.into();
        Self::validate(&s)?;
        Ok(Self(s))
    }

    /// Parses an NSID, returning `None` on invalid input.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        Self::new(s).ok()
    }

    /// Validates an NSID string.
    ///
    /// # Errors
    /// Returns an error if the NSID format is invalid.
    pub fn validate(s: &str) -> Result<(), Error> {
        if s.len() > MAX_NSID_LENGTH {
            return Err(Error::InvalidNsid(format!(
                "NSID exceeds maximum length of {MAX_NSID_LENGTH}"
            )));
        }

        let segments: Vec<&str> = s.split('.').collect();
        if segments.len() < 3 {
            return Err(Error::InvalidNsid(
                "NSID must have at least three dot-separated segments".into(),
            ));
        }

        let (name, authority) = segments
            .split_last()
            .ok_or_else(|| Error::InvalidNsid("empty NSID".into()))?;

        for segment in authority {
            Self::validate_segment(segment, true)?;
        }
        Self::validate_segment(name, false)?;

        Ok(())
    }

    fn validate_segment(segment: &str, allow_hyphen: bool) -> Result<(), Error> {
        if segment.is_empty() {
            return Err(Error::InvalidNsid("empty segment in NSID".into()));
        }
        if segment.len() > MAX_SEGMENT_LENGTH {
            return Err(Error::InvalidNsid(format!(
                "segment exceeds maximum length of {MAX_SEGMENT_LENGTH}"
            )));
        }

        let first = segment.chars().next().unwrap_or('0');
        if !first.is_ascii_alphabetic() {
            return Err(Error::InvalidNsid(format!(
                "segment must start with a letter: {segment}"
            )));
        }

        let valid = segment
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || (allow_hyphen && c == '-'));
        if !valid {
            return Err(Error::InvalidNsid(format!(
                "segment contains invalid characters: {segment}"
            )));
        }

        Ok(())
    }

    /// Returns the full NSID string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the terminal name segment (e.g. "post").
    #[must_use]
    pub fn name(&self) -> &str {
        self.0.rsplit('.').next().unwrap_or("")
    }

    /// Returns the authority segments joined with dots (e.g. "app.bsky.feed").
    #[must_use]
    pub fn authority(&self) -> &str {
        match self.0.rfind('.') {
            Some(idx) => &self.0[..idx],
            None => "",
        }
    }
}

impl fmt::Display for Nsid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Nsid {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl AsRef<str> for Nsid {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for Nsid {
    type Error = Error;

    fn try_from(s: String) -> Result<Self, Error> {
        Self::new(s)
    }
}

impl From<Nsid> for String {
    fn from(nsid: Nsid) -> Self {
        nsid.0
    }
}
