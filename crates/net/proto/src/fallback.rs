//! Envelopes for the WebSocket fallback transport.
//!
//! The fallback socket multiplexes independent requests over one
//! connection; every envelope carries a `requestId` used to correlate a
//! response with the request that produced it.

use serde::{Deserialize, Serialize};

/// A message on the fallback socket, discriminated by its `type` field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum FallbackMessage {
    /// Client request to store a blob via the relay.
    #[serde(rename = "storage-request", rename_all = "camelCase")]
    StorageRequest {
        /// Correlation id for the response.
        request_id: String,
        /// Content id the payload hashes to.
        cid: String,
        /// Declared media type.
        mime_type: String,
        /// Base64-encoded payload bytes.
        ciphertext: String,
        /// Application namespace.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        app_id: Option<String>,
    },
    /// Relay response to a storage request.
    #[serde(rename = "storage-response", rename_all = "camelCase")]
    StorageResponse {
        /// Correlation id copied from the request.
        request_id: String,
        /// Whether the blob was stored.
        success: bool,
        /// Content id the blob was stored under.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        cid: Option<String>,
        /// Failure reason when `success` is false.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    /// Client request to retrieve a blob via the relay.
    #[serde(rename = "retrieve-request", rename_all = "camelCase")]
    RetrieveRequest {
        /// Correlation id for the response.
        request_id: String,
        /// The content id to retrieve.
        cid: String,
    },
    /// Relay response to a retrieve request.
    #[serde(rename = "retrieve-response", rename_all = "camelCase")]
    RetrieveResponse {
        /// Correlation id copied from the request.
        request_id: String,
        /// Whether the blob was found and returned.
        success: bool,
        /// Base64-encoded payload bytes when successful.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        ciphertext: Option<String>,
        /// Declared media type of the payload.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        mime_type: Option<String>,
        /// Failure reason when `success` is false.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
}

impl FallbackMessage {
    /// The correlation id carried by this envelope.
    pub fn request_id(&self) -> &str {
        match self {
            Self::StorageRequest { request_id, .. }
            | Self::StorageResponse { request_id, .. }
            | Self::RetrieveRequest { request_id, .. }
            | Self::RetrieveResponse { request_id, .. } => request_id,
        }
    }

    /// Whether this envelope is a response (resolves a pending request).
    pub fn is_response(&self) -> bool {
        matches!(
            self,
            Self::StorageResponse { .. } | Self::RetrieveResponse { .. }
        )
    }
}
