//! WebSocket fallback transport.
//!
//! When no storage peer is reachable over the stream protocols, store and
//! retrieve can run through a relay over a single persistent WebSocket.
//! Requests are multiplexed on that socket: each call registers a pending
//! entry under a random correlation id, sends its envelope, and waits for
//! the reader task to route back the response with the matching id. A
//! pending entry is removed exactly once, whether by its response, by its
//! timeout, or by socket close (which rejects everything outstanding).

#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]

use std::{
    collections::HashMap,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use bytes::Bytes;
use futures_util::{SinkExt, StreamExt, stream::SplitSink, stream::SplitStream};
use hashd_net_proto::{FallbackMessage, decode_base64, encode_base64_chunked};
use hashd_primitives::ContentId;
use parking_lot::Mutex;
use rand::Rng as _;
use tokio::{net::TcpStream, sync::oneshot, task::JoinHandle};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async, tungstenite::Message};
use tracing::{debug, trace, warn};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type PendingMap = HashMap<String, oneshot::Sender<FallbackMessage>>;

/// Failure surfaced by the fallback transport.
#[derive(Debug, thiserror::Error)]
pub enum WsError {
    /// The socket could not be established.
    #[error("connect failed: {0}")]
    Connect(String),
    /// The socket closed before the request resolved.
    #[error("socket closed")]
    ConnectionClosed,
    /// No matching response arrived within the budget.
    #[error("request timed out after {0:?}")]
    Timeout(Duration),
    /// The relay answered and explicitly signalled failure.
    #[error("relay reported failure: {0}")]
    Application(String),
    /// The relay answered with an envelope of the wrong kind.
    #[error("unexpected response envelope: {0}")]
    Protocol(String),
    /// The response payload could not be decoded.
    #[error("invalid response payload: {0}")]
    Decode(String),
    /// Sending on the socket failed.
    #[error("send failed: {0}")]
    Send(String),
}

/// Timing configuration for fallback requests.
#[derive(Debug, Clone)]
pub struct WsConfig {
    /// Budget for one request/response correlation.
    pub request_timeout: Duration,
}

impl Default for WsConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(30),
        }
    }
}

/// Client for the relay's WebSocket fallback endpoint.
pub struct WsFallbackClient {
    sink: tokio::sync::Mutex<SplitSink<WsStream, Message>>,
    pending: Arc<Mutex<PendingMap>>,
    closed: Arc<AtomicBool>,
    reader: JoinHandle<()>,
    config: WsConfig,
}

impl WsFallbackClient {
    /// Connect to a relay's fallback endpoint.
    pub async fn connect(url: &str) -> Result<Self, WsError> {
        Self::connect_with_config(url, WsConfig::default()).await
    }

    /// Connect with custom timing.
    pub async fn connect_with_config(url: &str, config: WsConfig) -> Result<Self, WsError> {
        let (stream, _response) = connect_async(url)
            .await
            .map_err(|e| WsError::Connect(e.to_string()))?;
        debug!(url, "fallback socket connected");

        let (sink, source) = stream.split();
        let pending: Arc<Mutex<PendingMap>> = Arc::new(Mutex::new(HashMap::new()));
        let closed = Arc::new(AtomicBool::new(false));
        let reader = tokio::spawn(run_reader(source, Arc::clone(&pending), Arc::clone(&closed)));

        Ok(Self {
            sink: tokio::sync::Mutex::new(sink),
            pending,
            closed,
            reader,
            config,
        })
    }

    /// Whether the socket has closed.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Number of requests still awaiting a response.
    pub fn pending_requests(&self) -> usize {
        self.pending.lock().len()
    }

    /// Store a payload through the relay.
    pub async fn store(
        &self,
        payload: &[u8],
        mime_type: &str,
        app_id: Option<&str>,
    ) -> Result<ContentId, WsError> {
        let cid = ContentId::from_payload(payload);
        let envelope = FallbackMessage::StorageRequest {
            request_id: fresh_request_id(),
            cid: cid.to_string(),
            mime_type: mime_type.to_owned(),
            ciphertext: encode_base64_chunked(payload),
            app_id: app_id.map(str::to_owned),
        };

        match self.request(envelope).await? {
            FallbackMessage::StorageResponse {
                success,
                cid: response_cid,
                error,
                ..
            } => {
                if !success {
                    return Err(WsError::Application(
                        error.unwrap_or_else(|| "unspecified".to_owned()),
                    ));
                }
                Ok(match response_cid.as_deref().map(ContentId::parse) {
                    Some(Ok(relay_cid)) => relay_cid,
                    _ => cid,
                })
            }
            other => Err(WsError::Protocol(format!("{other:?}"))),
        }
    }

    /// Retrieve a payload through the relay.
    pub async fn retrieve(&self, cid: &ContentId) -> Result<(Bytes, Option<String>), WsError> {
        let envelope = FallbackMessage::RetrieveRequest {
            request_id: fresh_request_id(),
            cid: cid.to_string(),
        };

        match self.request(envelope).await? {
            FallbackMessage::RetrieveResponse {
                success,
                ciphertext,
                mime_type,
                error,
                ..
            } => {
                if !success {
                    return Err(WsError::Application(
                        error.unwrap_or_else(|| "unspecified".to_owned()),
                    ));
                }
                let payload = decode_base64(&ciphertext.unwrap_or_default())
                    .map_err(|e| WsError::Decode(e.to_string()))?;
                Ok((Bytes::from(payload), mime_type))
            }
            other => Err(WsError::Protocol(format!("{other:?}"))),
        }
    }

    /// Close the socket gracefully. Outstanding requests are rejected.
    pub async fn close(&self) {
        let _ = self.sink.lock().await.send(Message::Close(None)).await;
    }

    /// Send one envelope and wait for the correlated response.
    async fn request(&self, envelope: FallbackMessage) -> Result<FallbackMessage, WsError> {
        if self.is_closed() {
            return Err(WsError::ConnectionClosed);
        }
        let request_id = envelope.request_id().to_owned();
        let (tx, rx) = oneshot::channel();
        self.pending.lock().insert(request_id.clone(), tx);

        let text = match serde_json::to_string(&envelope) {
            Ok(text) => text,
            Err(e) => {
                self.pending.lock().remove(&request_id);
                return Err(WsError::Send(e.to_string()));
            }
        };
        if let Err(e) = self.sink.lock().await.send(Message::Text(text)).await {
            self.pending.lock().remove(&request_id);
            return Err(WsError::Send(e.to_string()));
        }
        trace!(request_id, "fallback request sent");

        match tokio::time::timeout(self.config.request_timeout, rx).await {
            Ok(Ok(response)) => Ok(response),
            // The reader dropped the sender: socket closed.
            Ok(Err(_)) => Err(WsError::ConnectionClosed),
            Err(_) => {
                // Remove the pending entry unless the reader resolved it in
                // the same instant; either way it is removed exactly once.
                self.pending.lock().remove(&request_id);
                Err(WsError::Timeout(self.config.request_timeout))
            }
        }
    }
}

impl Drop for WsFallbackClient {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

fn fresh_request_id() -> String {
    hex::encode(rand::rng().random::<[u8; 16]>())
}

/// Route inbound envelopes to their pending requests; on socket close,
/// reject everything outstanding and clear the pending set.
async fn run_reader(
    mut source: SplitStream<WsStream>,
    pending: Arc<Mutex<PendingMap>>,
    closed: Arc<AtomicBool>,
) {
    while let Some(result) = source.next().await {
        let message = match result {
            Ok(message) => message,
            Err(e) => {
                debug!(error = %e, "fallback socket read failed");
                break;
            }
        };
        let text = match message {
            Message::Text(text) => text,
            Message::Binary(bytes) => match String::from_utf8(bytes) {
                Ok(text) => text,
                Err(_) => {
                    warn!("dropping non-UTF-8 fallback frame");
                    continue;
                }
            },
            Message::Close(_) => break,
            _ => continue,
        };
        let envelope: FallbackMessage = match serde_json::from_str(&text) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!(error = %e, "dropping undecodable fallback frame");
                continue;
            }
        };
        if !envelope.is_response() {
            continue;
        }

        let slot = pending.lock().remove(envelope.request_id());
        match slot {
            Some(tx) => {
                // The requester may have timed out concurrently; its
                // receiver is gone and the send result is irrelevant.
                let _ = tx.send(envelope);
            }
            None => trace!(request_id = envelope.request_id(), "late or unmatched response"),
        }
    }

    closed.store(true, Ordering::Release);
    let outstanding: Vec<_> = pending.lock().drain().collect();
    if !outstanding.is_empty() {
        debug!(count = outstanding.len(), "rejecting outstanding fallback requests");
    }
    // Dropping the senders rejects the corresponding requests.
    drop(outstanding);
}
