//! OAuth session state.

/// The authorization state of an OAuth client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OAuthSession {
    /// No tokens and no flow in progress.
    Unauthenticated,
    /// An authorization flow is awaiting its callback.
    Authorizing {
        /// The `state` parameter of the pending flow.
        state: String,
    },
    /// Valid tokens are held for a subject.
    Authenticated {
        /// The authenticated user's DID.
        did: String,
    },
    /// Tokens are held but past their expiry.
    Expired,
    /// The flow failed terminally.
    Failed {
        /// Description of the failure.
        error: String,
    },
}

impl OAuthSession {
    /// True iff the session is `Authenticated`.
    #[must_use]
    pub const fn is_authenticated(&self) -> bool {
        matches!(self, Self::Authenticated { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_authenticated_counts() {
        assert!(OAuthSession::Authenticated {
            did: "did:plc:abc".to_string()
        }
        .is_authenticated());

        assert!(!OAuthSession::Unauthenticated.is_authenticated());
        assert!(!OAuthSession::Authorizing {
            state: "s".to_string()
        }
        .is_authenticated());
        assert!(!OAuthSession::Expired.is_authenticated());
        assert!(!OAuthSession::Failed {
            error: "boom".to_string()
        }
        .is_authenticated());
    }
}
