//! Handle type and validation.
//!
//! Handles are user-facing identifiers formatted as domain names, e.g.
//! `alice.bsky.social`. Handles are case-normalized to lowercase on
//! construction, so equality and hashing operate on the canonical form.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::Error;

/// Maximum length for a handle.
const MAX_HANDLE_LENGTH: usize = 253;

/// Maximum length for a single label.
const MAX_LABEL_LENGTH: usize = 63;

/// A validated, lowercase-normalized AT Protocol handle.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Handle(String);

impl Handle {
    /// Creates a new handle, normalizing to lowercase and validating.
    ///
    /// # Errors
    /// Returns an error if the handle format is invalid.
    pub fn new(s: impl Into<String>) -> Result<Self, Error> {
        let s = s.into().to_ascii_lowercase();
        Self::validate(&s)?;
        Ok(Self(s))
    }

    /// Parses a handle, returning `None` on invalid input.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        Self::new(s).ok()
    }

    /// Validates an already-normalized handle string.
    ///
    /// # Errors
    /// Returns an error if the handle format is invalid.
    pub fn validate(s: &str) -> Result<(), Error> {
        if s.is_empty() {
            return Err(Error::InvalidHandle("handle cannot be empty".into()));
        }

        if s.len() > MAX_HANDLE_LENGTH {
            return Err(Error::InvalidHandle(format!(
                "handle exceeds maximum length of {MAX_HANDLE_LENGTH}"
            )));
        }

        let labels: Vec<&str> = s.split('.').collect();
        if labels.len() < 2 {
            return Err(Error::InvalidHandle(
                "handle must have at least two dot-separated labels".into(),
            ));
        }

        for label in &labels {
            Self::validate_label(label)?;
        }

        // Safety: labels.len() >= 2 was checked above
        let tld = labels[labels.len() - 1];
        if tld.chars().all(|c| c.is_ascii_digit()) {
            return Err(Error::InvalidHandle(
                "top-level label cannot be all digits".into(),
            ));
        }

        Ok(())
    }

    fn validate_label(label: &str) -> Result<(), Error> {
        if label.is_empty() {
            return Err(Error::InvalidHandle("empty label in handle".into()));
        }

        if label.len() > MAX_LABEL_LENGTH {
            return Err(Error::InvalidHandle(format!(
                "label exceeds maximum length of {MAX_LABEL_LENGTH}"
            )));
        }

        if label.starts_with('-') || label.ends_with('-') {
            return Err(Error::InvalidHandle(
                "label cannot start or end with hyphen".into(),
            ));
        }

        if !label
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-')
        {
            return Err(Error::InvalidHandle(
                "label must contain only ASCII letters, digits, and hyphens".into(),
            ));
        }

        Ok(())
    }

    /// Returns the normalized handle string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the TLD (top-level label) of the handle.
    #[must_use]
    pub fn tld(&self) -> &str {
        self.0.rsplit('.').next().unwrap_or("")
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Handle {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl AsRef<str> for Handle {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for Handle {
    type Error = Error;

    fn try_from(s: String) -> Result<Self, Error> {
        Self::new(s)
    }
}

impl From<Handle> for String {
    fn from(handle: Handle) -> Self {
        handle.0
    }
}
