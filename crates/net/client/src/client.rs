//! The protocol client.

use std::{sync::Arc, time::Duration};

use bytes::Bytes;
use hashd_net_codec::{CodecError, read_message, write_message};
use hashd_net_proto::{
    AuthorizationEnvelope, HAVE_LIST_PROTOCOL, HEALTH_PROTOCOL, HaveListRequest, HaveListResponse,
    HealthResponse, INFO_PROTOCOL, InfoResponse, PEER_DIRECTORY_PROTOCOL, PeerDirectoryResponse,
    RETRIEVE_PROTOCOL, RetrieveRequest, RetrieveResponse, STORE_PROTOCOL, StoreRequest,
    StoreResponse, decode_base64, encode_base64_chunked,
};
use hashd_net_transport::Transport;
use hashd_primitives::ContentId;
use libp2p::PeerId;
use serde::{Serialize, de::DeserializeOwned};
use tokio::io::AsyncWriteExt as _;
use tracing::{debug, trace};

use crate::error::ProtocolError;

/// Timing configuration for protocol calls.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Budget for zero-payload probes (health, info, directory, have-list).
    pub request_timeout: Duration,
    /// Base budget for a store exchange.
    pub store_base_timeout: Duration,
    /// Additional store budget per megabyte of payload.
    pub store_timeout_per_mib: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(15),
            store_base_timeout: Duration::from_secs(30),
            store_timeout_per_mib: Duration::from_secs(10),
        }
    }
}

/// Acknowledgement of a successful store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreReceipt {
    /// The content id the blob is stored under.
    pub cid: ContentId,
    /// The peer holding the blob.
    pub peer_id: PeerId,
}

/// A retrieved payload with its declared media type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetrievedContent {
    /// The payload bytes.
    pub payload: Bytes,
    /// Media type declared by the serving peer.
    pub mime_type: Option<String>,
}

/// One request/response client per named protocol.
///
/// Every method opens a fresh stream for its protocol, writes exactly one
/// request, reads exactly one response, and closes the stream.
#[derive(Debug)]
pub struct ProtocolClient<T> {
    transport: Arc<T>,
    config: ClientConfig,
}

impl<T> Clone for ProtocolClient<T> {
    fn clone(&self) -> Self {
        Self {
            transport: Arc::clone(&self.transport),
            config: self.config.clone(),
        }
    }
}

impl<T: Transport> ProtocolClient<T> {
    /// Create a client over the given transport with default timing.
    pub fn new(transport: Arc<T>) -> Self {
        Self::with_config(transport, ClientConfig::default())
    }

    /// Create a client with custom timing.
    pub fn with_config(transport: Arc<T>, config: ClientConfig) -> Self {
        Self { transport, config }
    }

    /// The timing configuration in use.
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// The store budget for a payload of the given size.
    pub fn store_timeout(&self, payload_len: usize) -> Duration {
        let mibs = payload_len.div_ceil(1024 * 1024) as u32;
        self.config.store_base_timeout + self.config.store_timeout_per_mib * mibs
    }

    /// Store a payload on a peer.
    ///
    /// The content id is derived from the payload bytes before the request
    /// is sent. The whole exchange is raced against a budget proportional
    /// to the payload size; if the timer settles first the call reports
    /// [`ProtocolError::Timeout`] and the exchange future is dropped, so a
    /// late peer response is discarded rather than merged into state the
    /// caller has already observed.
    #[allow(clippy::too_many_arguments)]
    pub async fn store(
        &self,
        peer_id: &PeerId,
        payload: &[u8],
        mime_type: &str,
        content_type: Option<&str>,
        app_id: Option<&str>,
        authorization: Option<AuthorizationEnvelope>,
    ) -> Result<StoreReceipt, ProtocolError> {
        let cid = ContentId::from_payload(payload);
        let timeout = self.store_timeout(payload.len());
        let request = StoreRequest {
            cid: cid.to_string(),
            mime_type: mime_type.to_owned(),
            ciphertext: encode_base64_chunked(payload),
            app_id: app_id.map(str::to_owned),
            content_type: content_type.map(str::to_owned),
            sender: authorization.as_ref().map(|a| a.sender.clone()),
            timestamp: authorization.as_ref().map(|a| a.timestamp),
            metadata: None,
            authorization,
        };

        debug!(peer = %peer_id, %cid, payload_len = payload.len(), ?timeout, "storing blob");
        let exchange = self.exchange::<_, StoreResponse>(peer_id, STORE_PROTOCOL, &request);
        let response = match tokio::time::timeout(timeout, exchange).await {
            Ok(result) => result?,
            Err(_) => {
                return Err(ProtocolError::Timeout {
                    protocol: STORE_PROTOCOL,
                    timeout,
                });
            }
        };

        if !response.success {
            return Err(ProtocolError::Application {
                protocol: STORE_PROTOCOL,
                reason: response.error.unwrap_or_else(|| "unspecified".to_owned()),
            });
        }
        let cid = match response.cid.as_deref().map(ContentId::parse) {
            Some(Ok(peer_cid)) => peer_cid,
            // A peer omitting or mangling the id in its acknowledgement
            // still stored the payload we hashed.
            _ => cid,
        };
        Ok(StoreReceipt {
            cid,
            peer_id: *peer_id,
        })
    }

    /// Retrieve a payload from a peer by content id.
    ///
    /// No internal budget: the orchestrator races each retrieve attempt
    /// against its own per-attempt timer.
    pub async fn retrieve(
        &self,
        peer_id: &PeerId,
        cid: &ContentId,
    ) -> Result<RetrievedContent, ProtocolError> {
        let request = RetrieveRequest {
            cid: cid.to_string(),
        };
        debug!(peer = %peer_id, %cid, "retrieving blob");
        let response: RetrieveResponse =
            self.exchange(peer_id, RETRIEVE_PROTOCOL, &request).await?;

        if !response.success {
            return Err(ProtocolError::Application {
                protocol: RETRIEVE_PROTOCOL,
                reason: response.error.unwrap_or_else(|| "unspecified".to_owned()),
            });
        }
        let ciphertext = response.ciphertext.unwrap_or_default();
        let payload = decode_base64(&ciphertext).map_err(|e| ProtocolError::Codec {
            protocol: RETRIEVE_PROTOCOL,
            reason: format!("invalid base64 payload: {e}"),
        })?;
        Ok(RetrievedContent {
            payload: Bytes::from(payload),
            mime_type: response.mime_type,
        })
    }

    /// Fetch a peer's health and capacity snapshot.
    pub async fn health(&self, peer_id: &PeerId) -> Result<HealthResponse, ProtocolError> {
        self.probe(peer_id, HEALTH_PROTOCOL).await
    }

    /// Fetch a peer's static metadata.
    pub async fn info(&self, peer_id: &PeerId) -> Result<InfoResponse, ProtocolError> {
        self.probe(peer_id, INFO_PROTOCOL).await
    }

    /// Request a relay's snapshot of the peers it currently knows.
    pub async fn peer_directory(
        &self,
        relay: &PeerId,
    ) -> Result<PeerDirectoryResponse, ProtocolError> {
        self.probe(relay, PEER_DIRECTORY_PROTOCOL).await
    }

    /// Ask which of the given content ids a peer holds.
    pub async fn have_list(
        &self,
        peer_id: &PeerId,
        cids: &[ContentId],
    ) -> Result<HaveListResponse, ProtocolError> {
        let request = HaveListRequest {
            cids: cids.iter().map(ContentId::to_string).collect(),
        };
        let exchange = self.exchange(peer_id, HAVE_LIST_PROTOCOL, &request);
        self.timed(HAVE_LIST_PROTOCOL, exchange).await
    }

    /// A zero-argument request bounded by the probe budget.
    async fn probe<Resp: DeserializeOwned>(
        &self,
        peer_id: &PeerId,
        protocol: &'static str,
    ) -> Result<Resp, ProtocolError> {
        let request = serde_json::json!({});
        let exchange = self.exchange(peer_id, protocol, &request);
        self.timed(protocol, exchange).await
    }

    async fn timed<Resp>(
        &self,
        protocol: &'static str,
        exchange: impl Future<Output = Result<Resp, ProtocolError>>,
    ) -> Result<Resp, ProtocolError> {
        let timeout = self.config.request_timeout;
        match tokio::time::timeout(timeout, exchange).await {
            Ok(result) => result,
            Err(_) => Err(ProtocolError::Timeout { protocol, timeout }),
        }
    }

    /// One full request/response exchange on a fresh stream.
    async fn exchange<Req, Resp>(
        &self,
        peer_id: &PeerId,
        protocol: &'static str,
        request: &Req,
    ) -> Result<Resp, ProtocolError>
    where
        Req: Serialize,
        Resp: DeserializeOwned,
    {
        let mut stream = self
            .transport
            .open_stream(peer_id, protocol)
            .await
            .map_err(|e| ProtocolError::Decline {
                protocol,
                reason: e.to_string(),
            })?;

        write_message(&mut stream, request)
            .await
            .map_err(|e| codec_error(protocol, e))?;
        trace!(peer = %peer_id, protocol, "request written, awaiting response");

        let response = read_message::<_, Resp>(&mut stream)
            .await
            .map_err(|e| codec_error(protocol, e))?
            .ok_or(ProtocolError::Decline {
                protocol,
                reason: "stream closed before response".to_owned(),
            })?;

        // Best-effort close; the exchange is already complete.
        let _ = stream.shutdown().await;
        Ok(response)
    }
}

/// Map framing failures: a reset stream is a decline (soft, try the next
/// candidate); undecodable bytes are a codec failure.
fn codec_error(protocol: &'static str, error: CodecError) -> ProtocolError {
    match error {
        CodecError::Io(e) => ProtocolError::Decline {
            protocol,
            reason: e.to_string(),
        },
        other => ProtocolError::Codec {
            protocol,
            reason: other.to_string(),
        },
    }
}
