//! AT URI type and parsing.
//!
//! AT URIs identify repositories, collections, and records. Format:
//! `at://<authority>[/<collection>[/<rkey>]]` where the authority is a DID or
//! handle and the collection is an NSID.
//! Example: `at://did:plc:z72i7hdynmk6r22z27h6tvur/app.bsky.feed.post/3jzfcijpj2z2a`

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::{Did, Handle, Nsid};
use crate::error::Error;

/// The authority component of an AT URI (either a DID or Handle).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Authority {
    /// A DID authority.
    Did(Did),
    /// A handle authority.
    Handle(Handle),
}

impl fmt::Display for Authority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Did(did) => write!(f, "{did}"),
            Self::Handle(handle) => write!(f, "{handle}"),
        }
    }
}

/// A validated AT Protocol URI.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AtUri(String);

impl AtUri {
    /// Creates a new AT URI from a string, validating the format.
    ///
    /// # Errors
    /// Returns an error if the AT URI format is invalid.
    pub fn new(s: impl Into<String>) -> Result<Self, Error> {
        let s = s.into();
        Self::validate(&s)?;
        Ok(Self(s))
    }

    /// Parses an AT URI, returning `None` on invalid input.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        Self::new(s).ok()
    }

    /// Creates an AT URI from components.
    #[must_use]
    pub fn make(authority: &str, collection: &str, rkey: &str) -> Self {
        Self(format!("at://{authority}/{collection}/{rkey}"))
    }

    /// Creates an AT URI for a collection (without rkey).
    #[must_use]
    pub fn for_collection(authority: &str, collection: &str) -> Self {
        Self(format!("at://{authority}/{collection}"))
    }

    /// Creates an AT URI for just an authority.
    #[must_use]
    pub fn authority_only(authority: &str) -> Self {
        Self(format!("at://{authority}"))
    }

    /// Validates an AT URI string.
    ///
    /// # Errors
    /// Returns an error if the AT URI format is invalid.
    pub fn validate(s: &str) -> Result<(), Error> {
        let rest = s
            .strip_prefix("at://")
            .ok_or_else(|| Error::InvalidAtUri("must start with 'at://'".into()))?;
        if rest.is_empty() {
            return Err(Error::InvalidAtUri("authority cannot be empty".into()));
        }

        let mut parts = rest.splitn(3, '/');
        let authority = parts.next().unwrap_or("");

        if authority.starts_with("did:") {
            Did::validate(authority)
                .map_err(|e| Error::InvalidAtUri(format!("invalid authority: {e}")))?;
        } else {
            Handle::validate(authority)
                .map_err(|e| Error::InvalidAtUri(format!("invalid authority: {e}")))?;
        }

        if let Some(collection) = parts.next() {
            if collection.is_empty() {
                return Err(Error::InvalidAtUri(
                    "collection cannot be empty if present".into(),
                ));
            }
            Nsid::validate(collection)
                .map_err(|e| Error::InvalidAtUri(format!("invalid collection: {e}")))?;

            if let Some(rkey) = parts.next() {
                if rkey.is_empty() {
                    return Err(Error::InvalidAtUri("rkey cannot be empty if present".into()));
                }
            }
        }

        Ok(())
    }

    /// Returns the full AT URI string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the authority part of the URI.
    #[must_use]
    pub fn authority_str(&self) -> &str {
        let rest = &self.0[5..]; // skip "at://"
        rest.split('/').next().unwrap_or("")
    }

    /// Parses and returns the authority as either a DID or Handle.
    ///
    /// # Errors
    /// Returns an error if the authority cannot be parsed.
    pub fn authority(&self) -> Result<Authority, Error> {
        let auth = self.authority_str();
        if auth.starts_with("did:") {
            Ok(Authority::Did(Did::new(auth)?))
        } else {
            Ok(Authority::Handle(Handle::new(auth)?))
        }
    }

    /// Returns the collection part of the URI, if present.
    #[must_use]
    pub fn collection(&self) -> Option<&str> {
        let rest = &self.0[5..];
        rest.splitn(3, '/').nth(1).filter(|c| !c.is_empty())
    }

    /// Returns the record key part of the URI, if present.
    #[must_use]
    pub fn rkey(&self) -> Option<&str> {
        let rest = &self.0[5..];
        rest.splitn(3, '/').nth(2).filter(|r| !r.is_empty())
    }
}

impl fmt::Display for AtUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for AtUri {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl AsRef<str> for AtUri {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for AtUri {
    type Error = Error;

    fn try_from(s: String) -> Result<Self, Error> {
        Self::new(s)
    }
}

impl From<AtUri> for String {
    fn from(uri: AtUri) -> Self {
        uri.0
    }
}
