//! Typed repository events.
//!
//! Message frames dispatch on their `t` discriminator into the event
//! variants below. Missing fields take defaults: integers 0, `tooBig`
//! false, `active` true, strings empty. Unrecognized types are carried
//! through as [`RepoEvent::Unknown`] with the raw frame bytes.

use ciborium::Value as CborValue;

use nimbus_common::cbor;
use nimbus_common::cid::CidLink;
use nimbus_common::{Error, Result};

use crate::frames::Frame;

/// A live repository event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RepoEvent {
    /// A repository commit with its operations.
    Commit(CommitEvent),
    /// An identity change (DID document updated).
    Identity(IdentityEvent),
    /// A handle change.
    Handle(HandleEvent),
    /// An account status change.
    Account(AccountEvent),
    /// An informational message from the relay.
    Info(InfoEvent),
    /// A message type this SDK does not recognize.
    Unknown {
        /// The frame's `t` discriminator.
        kind: String,
        /// The full raw frame bytes.
        raw: Vec<u8>,
    },
}

/// A repository commit event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitEvent {
    /// Sequence number.
    pub seq: i64,
    /// Whether blocks were omitted for size.
    pub too_big: bool,
    /// Repository DID.
    pub repo: String,
    /// Commit CID.
    pub commit: Option<CidLink>,
    /// Previous commit CID.
    pub prev: Option<CidLink>,
    /// Revision (TID) after this commit.
    pub rev: String,
    /// ISO-8601 timestamp.
    pub time: String,
    /// Operations in commit order.
    pub ops: Vec<RepoOp>,
    /// CAR-encoded blocks, when included.
    pub blocks: Option<Vec<u8>>,
}

/// Action of a repository operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepoOpAction {
    /// Record created.
    Create,
    /// Record updated.
    Update,
    /// Record deleted.
    Delete,
}

impl RepoOpAction {
    /// Maps an action name, defaulting to `Create` on unknown input.
    #[must_use]
    pub fn from_str_lossy(s: &str) -> Self {
        match s {
            "update" => Self::Update,
            "delete" => Self::Delete,
            _ => Self::Create,
        }
    }
}

/// A single operation within a commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoOp {
    /// The operation kind.
    pub action: RepoOpAction,
    /// Record path (`collection/rkey`).
    pub path: String,
    /// CID of the record; null only for deletes.
    pub cid: Option<CidLink>,
}

impl RepoOp {
    /// The collection segment of the path, when present.
    #[must_use]
    pub fn collection(&self) -> Option<&str> {
        self.path
            .split('/')
            .next()
            .filter(|c| !c.is_empty())
    }

    /// The record-key segment of the path, when present.
    #[must_use]
    pub fn rkey(&self) -> Option<&str> {
        self.path
            .split_once('/')
            .map(|(_, rkey)| rkey)
            .filter(|r| !r.is_empty())
    }
}

/// An identity event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityEvent {
    /// Sequence number.
    pub seq: i64,
    /// Subject DID.
    pub did: String,
    /// ISO-8601 timestamp.
    pub time: String,
    /// New handle, when the event carries one.
    pub handle: Option<String>,
}

/// A handle change event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandleEvent {
    /// Sequence number.
    pub seq: i64,
    /// Subject DID.
    pub did: String,
    /// The new handle.
    pub handle: String,
    /// ISO-8601 timestamp.
    pub time: String,
}

/// An account status event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountEvent {
    /// Sequence number.
    pub seq: i64,
    /// Subject DID.
    pub did: String,
    /// ISO-8601 timestamp.
    pub time: String,
    /// Whether the account is active.
    pub active: bool,
    /// Status detail when inactive (e.g. `takendown`).
    pub status: Option<String>,
}

/// An informational event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InfoEvent {
    /// Info name (e.g. `OutdatedCursor`).
    pub name: String,
    /// Optional detail message.
    pub message: Option<String>,
}

/// Decodes a binary frame into a typed event.
///
/// An error frame surfaces as [`Error::ConnectionClosed`]; malformed
/// frames surface as [`Error::FrameDecoding`].
///
/// # Errors
/// See above.
pub fn decode_event(bytes: &[u8]) -> Result<RepoEvent> {
    match Frame::decode(bytes)? {
        Frame::Error { error, message } => Err(Error::ConnectionClosed(Some(match message {
            Some(message) => format!("{error}: {message}"),
            None => error,
        }))),
        Frame::Message { t, body } => {
            let map = match &body {
                CborValue::Map(map) => map.as_slice(),
                _ => return Err(Error::FrameDecoding("body must be a map".into())),
            };

            match t.as_deref() {
                Some("#commit") => Ok(RepoEvent::Commit(decode_commit(map))),
                Some("#identity") => Ok(RepoEvent::Identity(IdentityEvent {
                    seq: int_or_zero(map, "seq"),
                    did: text_or_empty(map, "did"),
                    time: text_or_empty(map, "time"),
                    handle: text_opt(map, "handle"),
                })),
                Some("#handle") => Ok(RepoEvent::Handle(HandleEvent {
                    seq: int_or_zero(map, "seq"),
                    did: text_or_empty(map, "did"),
                    handle: text_or_empty(map, "handle"),
                    time: text_or_empty(map, "time"),
                })),
                Some("#account") => Ok(RepoEvent::Account(AccountEvent {
                    seq: int_or_zero(map, "seq"),
                    did: text_or_empty(map, "did"),
                    time: text_or_empty(map, "time"),
                    active: cbor::map_get(map, "active")
                        .and_then(cbor::as_bool)
                        .unwrap_or(true),
                    status: text_opt(map, "status"),
                })),
                Some("#info") => Ok(RepoEvent::Info(InfoEvent {
                    name: text_or_empty(map, "name"),
                    message: text_opt(map, "message"),
                })),
                other => Ok(RepoEvent::Unknown {
                    kind: other.unwrap_or("").to_string(),
                    raw: bytes.to_vec(),
                }),
            }
        }
    }
}

fn decode_commit(map: &[(CborValue, CborValue)]) -> CommitEvent {
    let ops = match cbor::map_get(map, "ops") {
        Some(CborValue::Array(items)) => items
            .iter()
            .filter_map(|item| {
                let CborValue::Map(op) = item else {
                    return None;
                };
                Some(RepoOp {
                    action: RepoOpAction::from_str_lossy(
                        cbor::map_get(op, "action")
                            .and_then(cbor::as_text)
                            .unwrap_or(""),
                    ),
                    path: text_or_empty(op, "path"),
                    cid: link_opt(op, "cid"),
                })
            })
            .collect(),
        _ => Vec::new(),
    };

    CommitEvent {
        seq: int_or_zero(map, "seq"),
        too_big: cbor::map_get(map, "tooBig")
            .and_then(cbor::as_bool)
            .unwrap_or(false),
        repo: text_or_empty(map, "repo"),
        commit: link_opt(map, "commit"),
        prev: link_opt(map, "prev"),
        rev: text_or_empty(map, "rev"),
        time: text_or_empty(map, "time"),
        ops,
        blocks: cbor::map_get(map, "blocks")
            .and_then(cbor::as_bytes)
            .map(<[u8]>::to_vec),
    }
}

fn int_or_zero(map: &[(CborValue, CborValue)], key: &str) -> i64 {
    cbor::map_get(map, key).and_then(cbor::as_i64).unwrap_or(0)
}

fn text_or_empty(map: &[(CborValue, CborValue)], key: &str) -> String {
    cbor::map_get(map, key)
        .and_then(cbor::as_text)
        .unwrap_or("")
        .to_string()
}

fn text_opt(map: &[(CborValue, CborValue)], key: &str) -> Option<String> {
    cbor::map_get(map, key)
        .and_then(cbor::as_text)
        .map(str::to_string)
}

fn link_opt(map: &[(CborValue, CborValue)], key: &str) -> Option<CidLink> {
    cbor::map_get(map, key)
        .and_then(cbor::as_cid_string)
        .and_then(|s| CidLink::new(s).ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode_item(value: &CborValue) -> Vec<u8> {
        let mut buf = Vec::new();
        ciborium::into_writer(value, &mut buf).unwrap();
        buf
    }

    fn text_entry(key: &str, value: &str) -> (CborValue, CborValue) {
        (CborValue::Text(key.into()), CborValue::Text(value.into()))
    }

    fn frame(t: &str, body: CborValue) -> Vec<u8> {
        let header = CborValue::Map(vec![
            (CborValue::Text("op".into()), CborValue::Integer(1.into())),
            (CborValue::Text("t".into()), CborValue::Text(t.into())),
        ]);
        let mut bytes = encode_item(&header);
        bytes.extend(encode_item(&body));
        bytes
    }

    #[test]
    fn test_commit_dispatch() {
        let body = CborValue::Map(vec![
            (CborValue::Text("seq".into()), CborValue::Integer(42.into())),
            text_entry("repo", "did:plc:x"),
            text_entry("time", "2024-01-01T00:00:00.000Z"),
            (
                CborValue::Text("ops".into()),
                CborValue::Array(vec![CborValue::Map(vec![
                    text_entry("action", "create"),
                    text_entry("path", "app.bsky.feed.post/abc"),
                ])]),
            ),
        ]);

        match decode_event(&frame("#commit", body)).unwrap() {
            RepoEvent::Commit(commit) => {
                assert_eq!(commit.seq, 42);
                assert_eq!(commit.repo, "did:plc:x");
                assert!(!commit.too_big);
                assert_eq!(commit.ops.len(), 1);
                let op = &commit.ops[0];
                assert_eq!(op.action, RepoOpAction::Create);
                assert_eq!(op.collection(), Some("app.bsky.feed.post"));
                assert_eq!(op.rkey(), Some("abc"));
            }
            other => panic!("expected commit, got {other:?}"),
        }
    }

    #[test]
    fn test_commit_defaults() {
        let body = CborValue::Map(vec![]);
        match decode_event(&frame("#commit", body)).unwrap() {
            RepoEvent::Commit(commit) => {
                assert_eq!(commit.seq, 0);
                assert!(!commit.too_big);
                assert_eq!(commit.repo, "");
                assert!(commit.ops.is_empty());
                assert!(commit.blocks.is_none());
            }
            other => panic!("expected commit, got {other:?}"),
        }
    }

    #[test]
    fn test_unknown_action_defaults_to_create() {
        assert_eq!(RepoOpAction::from_str_lossy("mystery"), RepoOpAction::Create);
        assert_eq!(RepoOpAction::from_str_lossy("update"), RepoOpAction::Update);
        assert_eq!(RepoOpAction::from_str_lossy("delete"), RepoOpAction::Delete);
    }

    #[test]
    fn test_op_path_segments() {
        let op = RepoOp {
            action: RepoOpAction::Create,
            path: "app.bsky.feed.post/abc".to_string(),
            cid: None,
        };
        assert_eq!(op.collection(), Some("app.bsky.feed.post"));
        assert_eq!(op.rkey(), Some("abc"));

        let bare = RepoOp {
            action: RepoOpAction::Delete,
            path: String::new(),
            cid: None,
        };
        assert_eq!(bare.collection(), None);
        assert_eq!(bare.rkey(), None);
    }

    #[test]
    fn test_identity_dispatch() {
        let body = CborValue::Map(vec![
            (CborValue::Text("seq".into()), CborValue::Integer(7.into())),
            text_entry("did", "did:plc:x"),
            text_entry("time", "2024-01-01T00:00:00.000Z"),
            text_entry("handle", "alice.bsky.social"),
        ]);

        match decode_event(&frame("#identity", body)).unwrap() {
            RepoEvent::Identity(event) => {
                assert_eq!(event.seq, 7);
                assert_eq!(event.handle.as_deref(), Some("alice.bsky.social"));
            }
            other => panic!("expected identity, got {other:?}"),
        }
    }

    #[test]
    fn test_account_active_defaults_true() {
        let body = CborValue::Map(vec![text_entry("did", "did:plc:x")]);
        match decode_event(&frame("#account", body)).unwrap() {
            RepoEvent::Account(event) => {
                assert!(event.active);
                assert_eq!(event.status, None);
            }
            other => panic!("expected account, got {other:?}"),
        }
    }

    #[test]
    fn test_info_dispatch() {
        let body = CborValue::Map(vec![
            text_entry("name", "OutdatedCursor"),
            text_entry("message", "cursor too old"),
        ]);
        match decode_event(&frame("#info", body)).unwrap() {
            RepoEvent::Info(event) => {
                assert_eq!(event.name, "OutdatedCursor");
                assert_eq!(event.message.as_deref(), Some("cursor too old"));
            }
            other => panic!("expected info, got {other:?}"),
        }
    }

    #[test]
    fn test_unknown_type_keeps_raw_bytes() {
        let body = CborValue::Map(vec![text_entry("x", "y")]);
        let bytes = frame("#mystery", body);

        match decode_event(&bytes).unwrap() {
            RepoEvent::Unknown { kind, raw } => {
                assert_eq!(kind, "#mystery");
                assert_eq!(raw, bytes);
            }
            other => panic!("expected unknown, got {other:?}"),
        }
    }

    #[test]
    fn test_error_frame_closes_connection() {
        let header = CborValue::Map(vec![(
            CborValue::Text("op".into()),
            CborValue::Integer((-1).into()),
        )]);
        let body = CborValue::Map(vec![text_entry("error", "FutureCursor")]);
        let mut bytes = encode_item(&header);
        bytes.extend(encode_item(&body));

        match decode_event(&bytes) {
            Err(Error::ConnectionClosed(Some(reason))) => {
                assert!(reason.contains("FutureCursor"));
            }
            other => panic!("expected connection closed, got {other:?}"),
        }
    }
}
