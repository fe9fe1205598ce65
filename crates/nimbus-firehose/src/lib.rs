//! Live repository event stream for the nimbus client SDK.
//!
//! Connects to a relay's `com.atproto.sync.subscribeRepos` endpoint over a
//! pluggable WebSocket transport, decodes CBOR-framed messages, and yields
//! typed events on a back-pressured stream.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod client;
pub mod events;
pub mod frames;
pub mod transport;

pub use client::{EventStream, FirehoseClient, DEFAULT_RELAY_URL};
pub use events::{
    AccountEvent, CommitEvent, HandleEvent, IdentityEvent, InfoEvent, RepoEvent, RepoOp,
    RepoOpAction,
};
pub use frames::{Frame, FrameHeader};
pub use transport::{TungsteniteTransport, WebSocketConnection, WebSocketTransport, WsMessage};
