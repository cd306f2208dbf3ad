//! Orchestrator error taxonomy.

use hashd_net_client::{ProtocolError, SignerError};
use hashd_net_transport::TransportError;
use hashd_primitives::{ContentId, UrlError};
use libp2p::PeerId;

/// Failure surfaced by a [`crate::StorageNode`] workflow.
///
/// Per-peer soft failures are handled internally by advancing to the next
/// candidate; only after every candidate is exhausted does an aggregated
/// variant surface, listing each peer's reason. Validation failures are
/// returned before any network access.
#[derive(Debug, thiserror::Error)]
pub enum NodeError {
    /// The transport was never started, or failed to start.
    #[error("node is not connected")]
    NotStarted,
    /// The transport runtime reported a failure.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),
    /// No storage peers are connected.
    #[error("no storage peers connected")]
    NoPeers,
    /// The payload exceeds the configured size limit.
    #[error("payload of {len} bytes exceeds the {max} byte limit")]
    PayloadTooLarge {
        /// Offered payload size.
        len: usize,
        /// Configured limit.
        max: usize,
    },
    /// Authorization is required but no signer is configured.
    #[error("store requires authorization but no signer is configured")]
    SignerRequired,
    /// The signer collaborator failed.
    #[error(transparent)]
    Signer(#[from] SignerError),
    /// The content URL could not be parsed.
    #[error("invalid content URL: {0}")]
    InvalidUrl(#[from] UrlError),
    /// Peers are connected, but none holds the requested content.
    #[error("content {cid} not found on any connected peer")]
    NotFound {
        /// The requested content id.
        cid: ContentId,
    },
    /// Every store candidate failed.
    #[error("store failed on all {} candidate peers: {}", failures.len(), format_failures(failures))]
    AllStoresFailed {
        /// Each attempted peer with its failure.
        failures: Vec<(PeerId, ProtocolError)>,
    },
    /// Every retrieval candidate failed.
    #[error("retrieve of {cid} failed on all {} holders: {}", failures.len(), format_failures(failures))]
    AllRetrievalsFailed {
        /// The requested content id.
        cid: ContentId,
        /// Each attempted peer with its failure.
        failures: Vec<(PeerId, ProtocolError)>,
    },
}

impl NodeError {
    /// Whether every peer path was exhausted (as opposed to a validation
    /// or lifecycle failure). Only exhausted workflows may divert to the
    /// fallback transport.
    pub fn is_exhausted(&self) -> bool {
        matches!(
            self,
            Self::NoPeers
                | Self::NotFound { .. }
                | Self::AllStoresFailed { .. }
                | Self::AllRetrievalsFailed { .. }
        )
    }
}

fn format_failures(failures: &[(PeerId, ProtocolError)]) -> String {
    failures
        .iter()
        .map(|(peer_id, error)| format!("{peer_id}: {error}"))
        .collect::<Vec<_>>()
        .join("; ")
}
