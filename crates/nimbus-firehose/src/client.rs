//! Firehose subscription client.
//!
//! One producer task owns the WebSocket connection and pushes decoded
//! events into a bounded channel, so slow consumers back-pressure the
//! socket. Frame-decoding failures are dropped without disturbing the
//! stream; transport failures and server error frames terminate it.

use std::pin::Pin;
use std::task::{Context, Poll};

use futures_util::Stream;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, Mutex};
use tracing::{debug, info, warn};

use nimbus_common::{Error, Result};

use crate::events::{decode_event, RepoEvent};
use crate::transport::{WebSocketTransport, WsMessage};

/// Default relay endpoint.
pub const DEFAULT_RELAY_URL: &str = "wss://bsky.network";

/// Subscription endpoint NSID.
pub const SUBSCRIBE_REPOS_NSID: &str = "com.atproto.sync.subscribeRepos";

/// Number of events buffered between the producer and the consumer.
const EVENT_BUFFER: usize = 64;

struct SubscriptionHandle {
    shutdown: oneshot::Sender<()>,
}

/// Client for the live repository event stream.
pub struct FirehoseClient {
    relay_url: String,
    transport: Arc<dyn WebSocketTransport>,
    connection: Mutex<Option<SubscriptionHandle>>,
}

impl FirehoseClient {
    /// Creates a client against the default relay.
    #[must_use]
    pub fn new(transport: Arc<dyn WebSocketTransport>) -> Self {
        Self::with_relay(DEFAULT_RELAY_URL, transport)
    }

    /// Creates a client against a custom relay URL.
    #[must_use]
    pub fn with_relay(relay_url: impl Into<String>, transport: Arc<dyn WebSocketTransport>) -> Self {
        Self {
            relay_url: relay_url.into(),
            transport,
            connection: Mutex::new(None),
        }
    }

    /// Builds the subscription URL, with an optional cursor.
    #[must_use]
    pub fn subscription_url(&self, cursor: Option<i64>) -> String {
        let base = format!(
            "{}/xrpc/{SUBSCRIBE_REPOS_NSID}",
            self.relay_url.trim_end_matches('/')
        );
        match cursor {
            Some(cursor) => format!("{base}?cursor={cursor}"),
            None => base,
        }
    }

    /// Opens a subscription, replacing any existing one.
    ///
    /// # Errors
    /// Returns an error if the transport cannot connect.
    pub async fn subscribe_repos(&self, cursor: Option<i64>) -> Result<EventStream> {
        self.disconnect().await;

        let url = self.subscription_url(cursor);
        info!(%url, "connecting to firehose");
        let mut connection = self.transport.connect(&url).await?;

        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = &mut shutdown_rx => {
                        debug!("firehose disconnect requested");
                        let _ = connection.close().await;
                        break;
                    }
                    received = connection.receive() => match received {
                        Ok(Some(WsMessage::Binary(data))) => match decode_event(&data) {
                            Ok(event) => {
                                if tx.send(Ok(event)).await.is_err() {
                                    // Consumer dropped the stream.
                                    let _ = connection.close().await;
                                    break;
                                }
                            }
                            Err(Error::ConnectionClosed(reason)) => {
                                let _ = tx.send(Err(Error::ConnectionClosed(reason))).await;
                                let _ = connection.close().await;
                                break;
                            }
                            Err(e) => {
                                // Individual bad frames do not end the stream.
                                warn!(error = %e, "dropping undecodable frame");
                            }
                        },
                        Ok(Some(WsMessage::Text(_))) => {}
                        Ok(None) => {
                            debug!("firehose closed by server");
                            break;
                        }
                        Err(e) => {
                            let _ = tx.send(Err(e)).await;
                            break;
                        }
                    }
                }
            }
        });

        *self.connection.lock().await = Some(SubscriptionHandle {
            shutdown: shutdown_tx,
        });

        Ok(EventStream { receiver: rx })
    }

    /// Closes the active subscription, if any.
    pub async fn disconnect(&self) {
        if let Some(handle) = self.connection.lock().await.take() {
            let _ = handle.shutdown.send(());
        }
    }
}

/// The consumer side of a subscription.
pub struct EventStream {
    receiver: mpsc::Receiver<Result<RepoEvent>>,
}

impl EventStream {
    /// Receives the next event; `None` when the stream has ended.
    pub async fn next(&mut self) -> Option<Result<RepoEvent>> {
        self.receiver.recv().await
    }
}

impl Stream for EventStream {
    type Item = Result<RepoEvent>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.receiver.poll_recv(cx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::WebSocketConnection;

    use async_trait::async_trait;
    use ciborium::Value as CborValue;
    use std::collections::VecDeque;
    use std::sync::Mutex as StdMutex;

    fn encode_item(value: &CborValue) -> Vec<u8> {
        let mut buf = Vec::new();
        ciborium::into_writer(value, &mut buf).unwrap();
        buf
    }

    fn commit_frame(seq: i64) -> Vec<u8> {
        let header = CborValue::Map(vec![
            (CborValue::Text("op".into()), CborValue::Integer(1.into())),
            (CborValue::Text("t".into()), CborValue::Text("#commit".into())),
        ]);
        let body = CborValue::Map(vec![
            (CborValue::Text("seq".into()), CborValue::Integer(seq.into())),
            (
                CborValue::Text("repo".into()),
                CborValue::Text("did:plc:x".into()),
            ),
            (
                CborValue::Text("time".into()),
                CborValue::Text("2024-01-01T00:00:00.000Z".into()),
            ),
        ]);
        let mut bytes = encode_item(&header);
        bytes.extend(encode_item(&body));
        bytes
    }

    type ScriptItem = Result<Option<WsMessage>>;

    struct ScriptedConnection {
        script: VecDeque<ScriptItem>,
        closed: Arc<StdMutex<bool>>,
    }

    #[async_trait]
    impl WebSocketConnection for ScriptedConnection {
        async fn receive(&mut self) -> Result<Option<WsMessage>> {
            match self.script.pop_front() {
                Some(item) => item,
                // An exhausted script blocks, as an idle socket would.
                None => std::future::pending().await,
            }
        }

        async fn close(&mut self) -> Result<()> {
            *self.closed.lock().unwrap() = true;
            Ok(())
        }
    }

    struct ScriptedTransport {
        script: StdMutex<VecDeque<ScriptItem>>,
        connected_urls: StdMutex<Vec<String>>,
        closed: Arc<StdMutex<bool>>,
    }

    impl ScriptedTransport {
        fn new(script: Vec<ScriptItem>) -> Self {
            Self {
                script: StdMutex::new(script.into()),
                connected_urls: StdMutex::new(Vec::new()),
                closed: Arc::new(StdMutex::new(false)),
            }
        }
    }

    #[async_trait]
    impl WebSocketTransport for ScriptedTransport {
        async fn connect(&self, url: &str) -> Result<Box<dyn WebSocketConnection>> {
            self.connected_urls.lock().unwrap().push(url.to_string());
            Ok(Box::new(ScriptedConnection {
                script: std::mem::take(&mut *self.script.lock().unwrap()),
                closed: self.closed.clone(),
            }))
        }
    }

    #[test]
    fn test_subscription_url() {
        let transport = Arc::new(ScriptedTransport::new(vec![]));
        let client = FirehoseClient::new(transport);

        assert_eq!(
            client.subscription_url(None),
            "wss://bsky.network/xrpc/com.atproto.sync.subscribeRepos"
        );
        assert_eq!(
            client.subscription_url(Some(123)),
            "wss://bsky.network/xrpc/com.atproto.sync.subscribeRepos?cursor=123"
        );
    }

    #[tokio::test]
    async fn test_events_arrive_in_order() {
        let transport = Arc::new(ScriptedTransport::new(vec![
            Ok(Some(WsMessage::Binary(commit_frame(1)))),
            Ok(Some(WsMessage::Binary(commit_frame(2)))),
            Ok(None),
        ]));
        let client = FirehoseClient::with_relay("wss://relay.test", transport.clone());

        let mut stream = client.subscribe_repos(None).await.unwrap();

        let seqs: Vec<i64> = [
            stream.next().await.unwrap().unwrap(),
            stream.next().await.unwrap().unwrap(),
        ]
        .into_iter()
        .map(|event| match event {
            RepoEvent::Commit(commit) => commit.seq,
            other => panic!("expected commit, got {other:?}"),
        })
        .collect();

        assert_eq!(seqs, [1, 2]);
        assert!(stream.next().await.is_none());
        assert_eq!(
            transport.connected_urls.lock().unwrap()[0],
            "wss://relay.test/xrpc/com.atproto.sync.subscribeRepos"
        );
    }

    #[tokio::test]
    async fn test_bad_frames_are_dropped_silently() {
        let transport = Arc::new(ScriptedTransport::new(vec![
            Ok(Some(WsMessage::Binary(vec![0xFF, 0xFF, 0xFF]))),
            Ok(Some(WsMessage::Binary(commit_frame(5)))),
            Ok(None),
        ]));
        let client = FirehoseClient::with_relay("wss://relay.test", transport);

        let mut stream = client.subscribe_repos(None).await.unwrap();
        match stream.next().await.unwrap().unwrap() {
            RepoEvent::Commit(commit) => assert_eq!(commit.seq, 5),
            other => panic!("expected commit, got {other:?}"),
        }
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn test_text_messages_are_ignored() {
        let transport = Arc::new(ScriptedTransport::new(vec![
            Ok(Some(WsMessage::Text("hello".to_string()))),
            Ok(Some(WsMessage::Binary(commit_frame(9)))),
            Ok(None),
        ]));
        let client = FirehoseClient::with_relay("wss://relay.test", transport);

        let mut stream = client.subscribe_repos(None).await.unwrap();
        match stream.next().await.unwrap().unwrap() {
            RepoEvent::Commit(commit) => assert_eq!(commit.seq, 9),
            other => panic!("expected commit, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_transport_error_terminates_stream() {
        let transport = Arc::new(ScriptedTransport::new(vec![
            Ok(Some(WsMessage::Binary(commit_frame(1)))),
            Err(Error::Network("socket reset".to_string())),
        ]));
        let client = FirehoseClient::with_relay("wss://relay.test", transport);

        let mut stream = client.subscribe_repos(None).await.unwrap();
        assert!(stream.next().await.unwrap().is_ok());
        assert!(matches!(
            stream.next().await.unwrap(),
            Err(Error::Network(_))
        ));
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn test_disconnect_closes_connection() {
        let transport = Arc::new(ScriptedTransport::new(vec![]));
        let client = FirehoseClient::with_relay("wss://relay.test", transport.clone());

        let _stream = client.subscribe_repos(None).await.unwrap();
        client.disconnect().await;

        // Give the producer a chance to observe the shutdown.
        tokio::task::yield_now().await;
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        assert!(*transport.closed.lock().unwrap());
    }

    #[tokio::test]
    async fn test_cursor_included_in_url() {
        let transport = Arc::new(ScriptedTransport::new(vec![Ok(None)]));
        let client = FirehoseClient::with_relay("wss://relay.test", transport.clone());

        let _stream = client.subscribe_repos(Some(42)).await.unwrap();
        assert_eq!(
            transport.connected_urls.lock().unwrap()[0],
            "wss://relay.test/xrpc/com.atproto.sync.subscribeRepos?cursor=42"
        );
    }
}
