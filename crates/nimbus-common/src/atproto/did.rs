//! DID (Decentralized Identifier) type and validation.
//!
//! DIDs have the form `did:<method>:<identifier>`. The methods the AT
//! Protocol ecosystem actually uses are `plc`, `web`, and `key`; any other
//! syntactically valid method is carried through and tagged [`DidMethod::Other`].

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::Error;

/// The method component of a DID.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DidMethod {
    /// PLC directory DID (`did:plc:*`).
    Plc,
    /// Web-based DID (`did:web:*`).
    Web,
    /// Key DID (`did:key:*`).
    Key,
    /// Any other method.
    Other,
}

/// A validated Decentralized Identifier (DID).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Did(String);

impl Did {
    /// Creates a new DID from a string, validating the format.
    ///
    /// # Errors
    /// Returns an error if the DID format is invalid.
    pub fn new(s: impl Into<String>) -> Result<Self, Error> {
        let s = s.into();
        Self::validate(&s)?;
        Ok(Self(s))
    }

    /// Parses a DID, returning `None` on invalid input.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        Self::new(s).ok()
    }

    /// Validates a DID string without creating a new instance.
    ///
    /// # Errors
    /// Returns an error if the DID format is invalid.
    pub fn validate(s: &str) -> Result<(), Error> {
        let rest = s
            .strip_prefix("did:")
            .ok_or_else(|| Error::InvalidDid("must start with 'did:'".into()))?;

        let (method, identifier) = rest
            .split_once(':')
            .ok_or_else(|| Error::InvalidDid("must have method and identifier".into()))?;

        if method.is_empty() {
            return Err(Error::InvalidDid("method cannot be empty".into()));
        }
        if !method
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
        {
            return Err(Error::InvalidDid(format!(
                "method must be lowercase alphanumeric: {method}"
            )));
        }
        if identifier.is_empty() {
            return Err(Error::InvalidDid("identifier cannot be empty".into()));
        }

        Ok(())
    }

    /// Returns the DID method tag.
    #[must_use]
    pub fn method(&self) -> DidMethod {
        match self.method_str() {
            "plc" => DidMethod::Plc,
            "web" => DidMethod::Web,
            "key" => DidMethod::Key,
            _ => DidMethod::Other,
        }
    }

    /// Returns the raw method string (e.g. "plc").
    #[must_use]
    pub fn method_str(&self) -> &str {
        self.0.split(':').nth(1).unwrap_or("")
    }

    /// Returns the DID identifier (everything after the method).
    ///
    /// Further colons are part of the identifier; `did:web` uses them for
    /// path segments.
    #[must_use]
    pub fn identifier(&self) -> &str {
        self.0.splitn(3, ':').nth(2).unwrap_or("")
    }

    /// Returns the full DID string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Checks if this is a PLC DID.
    #[must_use]
    pub fn is_plc(&self) -> bool {
        self.method() == DidMethod::Plc
    }

    /// Checks if this is a web DID.
    #[must_use]
    pub fn is_web(&self) -> bool {
        self.method() == DidMethod::Web
    }
}

impl fmt::Display for Did {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Did {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl AsRef<str> for Did {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for Did {
    type Error = Error;

    fn try_from(s: String) -> Result<Self, Error> {
        Self::new(s)
    }
}

impl From<Did> for String {
    fn from(did: Did) -> Self {
        did.0
    }
}
