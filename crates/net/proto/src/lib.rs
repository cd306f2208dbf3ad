//! Protocol names and wire records for the hashd peer protocols.
//!
//! Every named operation runs over its own point-to-point stream protocol;
//! the stream carries exactly one request frame followed by one response
//! frame (framing lives in `hashd-net-codec`). This crate defines the
//! protocol name constants, the serde records exchanged on those streams,
//! the authorization envelope attached to store requests, and the envelopes
//! used by the WebSocket fallback transport.

#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]

mod encoding;
mod fallback;
mod messages;

pub use encoding::{BASE64_CHUNK_LEN, decode_base64, encode_base64_chunked};
pub use fallback::FallbackMessage;
pub use messages::{
    AuthorizationEnvelope, HaveListRequest, HaveListResponse, HealthResponse, InfoResponse,
    PeerDirectoryEntry, PeerDirectoryResponse, RetrieveRequest, RetrieveResponse, StoreRequest,
    StoreResponse,
};

/// Stream protocol for storing a blob on a peer.
pub const STORE_PROTOCOL: &str = "/hashd/store/1.0.0";

/// Stream protocol for retrieving a blob from a peer.
pub const RETRIEVE_PROTOCOL: &str = "/hashd/retrieve/1.0.0";

/// Stream protocol for querying a peer's health and capacity.
pub const HEALTH_PROTOCOL: &str = "/hashd/health/1.0.0";

/// Stream protocol for querying a peer's static metadata.
pub const INFO_PROTOCOL: &str = "/hashd/info/1.0.0";

/// Stream protocol for requesting a relay's peer directory snapshot.
pub const PEER_DIRECTORY_PROTOCOL: &str = "/hashd/peers/1.0.0";

/// Stream protocol for asking which of a set of content ids a peer holds.
pub const HAVE_LIST_PROTOCOL: &str = "/hashd/have/1.0.0";
