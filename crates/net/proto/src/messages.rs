//! Wire records for the stream protocols.
//!
//! Field names follow the network's camelCase JSON convention. Responses
//! deserialize leniently: peers may send extra fields, and optional fields
//! default when absent.

use hashd_primitives::AcceptedContentTypes;
use serde::{Deserialize, Serialize};

/// Request to store a blob on a peer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreRequest {
    /// Content id the payload hashes to.
    pub cid: String,
    /// Declared media type of the plaintext.
    pub mime_type: String,
    /// Base64-encoded payload bytes.
    pub ciphertext: String,
    /// Application namespace the content belongs to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_id: Option<String>,
    /// Content category, matched against the peer's accepted set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    /// Sender identity (address) when the request is authorized.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender: Option<String>,
    /// Client-side timestamp, seconds since the Unix epoch.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<u64>,
    /// Free-form metadata forwarded to the peer untouched.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
    /// Authorization envelope; validated by the receiving peer, never here.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authorization: Option<AuthorizationEnvelope>,
}

/// Peer response to a [`StoreRequest`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreResponse {
    /// Whether the peer accepted and stored the blob.
    pub success: bool,
    /// Content id the peer stored the blob under.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cid: Option<String>,
    /// Failure reason when `success` is false.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl StoreResponse {
    /// A successful store acknowledgement.
    pub fn ok(cid: impl Into<String>) -> Self {
        Self {
            success: true,
            cid: Some(cid.into()),
            error: None,
        }
    }

    /// A store rejection with a reason.
    pub fn error(reason: impl Into<String>) -> Self {
        Self {
            success: false,
            cid: None,
            error: Some(reason.into()),
        }
    }
}

/// Request to retrieve a blob by content id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetrieveRequest {
    /// The content id to retrieve.
    pub cid: String,
}

/// Peer response to a [`RetrieveRequest`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetrieveResponse {
    /// Whether the peer holds the blob and returned it.
    pub success: bool,
    /// Base64-encoded payload bytes when successful.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ciphertext: Option<String>,
    /// Declared media type of the payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    /// Failure reason when `success` is false.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RetrieveResponse {
    /// A successful delivery.
    pub fn ok(ciphertext: impl Into<String>, mime_type: impl Into<String>) -> Self {
        Self {
            success: true,
            ciphertext: Some(ciphertext.into()),
            mime_type: Some(mime_type.into()),
            error: None,
        }
    }

    /// A retrieval failure with a reason.
    pub fn error(reason: impl Into<String>) -> Self {
        Self {
            success: false,
            ciphertext: None,
            mime_type: None,
            error: Some(reason.into()),
        }
    }
}

/// Peer-reported health and capacity snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct HealthResponse {
    /// The peer's own id, as it reports it.
    pub peer_id: String,
    /// Free-form status string, `"ok"` for a healthy peer.
    pub status: String,
    /// Number of blobs currently held.
    pub blob_count: u64,
    /// Bytes of storage in use.
    pub storage_used: u64,
    /// Bytes of storage available in total.
    pub storage_max: u64,
    /// Seconds since the peer started.
    pub uptime: u64,
    /// Software version string.
    pub version: String,
    /// Addresses the peer is reachable at.
    pub multiaddrs: Vec<String>,
    /// Content categories the peer accepts.
    pub content_types: AcceptedContentTypes,
    /// Whether the peer claims on-chain registration.
    pub registered: Option<bool>,
    /// Operator address, when disclosed.
    pub owner: Option<String>,
}

/// Peer-reported static metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct InfoResponse {
    /// The peer's own id, as it reports it.
    pub peer_id: String,
    /// Declared public key.
    pub public_key: Option<String>,
    /// Software version string.
    pub version: String,
    /// Operator address, when disclosed.
    pub owner: Option<String>,
    /// Application namespaces the peer serves.
    pub app_ids: Vec<String>,
}

/// One peer entry in a relay's directory snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeerDirectoryEntry {
    /// The listed peer's id.
    pub peer_id: String,
    /// Relay-routable addresses for the peer.
    #[serde(default)]
    pub multiaddrs: Vec<String>,
    /// When the relay last saw the peer, seconds since the Unix epoch.
    #[serde(default)]
    pub last_seen: u64,
}

/// A relay's snapshot of the peers it currently knows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct PeerDirectoryResponse {
    /// The peers known to the relay.
    pub peers: Vec<PeerDirectoryEntry>,
    /// When the snapshot was taken, seconds since the Unix epoch.
    pub timestamp: u64,
}

/// Request asking which of a set of content ids a peer holds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HaveListRequest {
    /// Content ids to check.
    pub cids: Vec<String>,
}

/// Response listing the subset of requested content ids the peer holds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct HaveListResponse {
    /// The held content ids, a subset of the request.
    pub cids: Vec<String>,
    /// Total number of blobs the peer holds across all content.
    pub total: u64,
    /// Whether the peer truncated its answer.
    pub has_more: bool,
}

/// Sender-signed authorization attached to store requests.
///
/// Constructed client-side when a signer is available; validation is the
/// receiving peer's responsibility.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthorizationEnvelope {
    /// Sender address, 0x-prefixed hex.
    pub sender: String,
    /// Hex-encoded signature over the canonical message.
    pub signature: String,
    /// Seconds since the Unix epoch at signing time.
    pub timestamp: u64,
    /// Random nonce, hex-encoded.
    pub nonce: String,
    /// Application namespace the authorization is scoped to.
    pub app_id: String,
    /// Digest of the payload the authorization covers.
    pub content_digest: String,
}
