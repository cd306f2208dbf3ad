//! Node-runtime transport boundary.
//!
//! The peer-to-peer runtime itself (dialing, stream security, NAT
//! traversal, pub/sub) is an external collaborator; this crate defines the
//! seam the rest of hashd talks to it through. A production deployment
//! backs [`Transport`] with its node runtime; tests back it with an
//! in-memory implementation.

#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]

use async_trait::async_trait;
use libp2p::{Multiaddr, PeerId};
use tokio::{
    io::{AsyncRead, AsyncWrite},
    sync::broadcast,
};

/// A point-to-point protocol stream.
pub trait ProtocolStream: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T: AsyncRead + AsyncWrite + Send + Unpin> ProtocolStream for T {}

/// An owned, type-erased protocol stream.
pub type BoxStream = Box<dyn ProtocolStream>;

/// Connection lifecycle events reported by the runtime.
#[derive(Debug, Clone)]
pub enum TransportEvent {
    /// A peer connection was established.
    PeerConnected {
        /// The connected peer.
        peer_id: PeerId,
    },
    /// A peer connection was closed.
    PeerDisconnected {
        /// The disconnected peer.
        peer_id: PeerId,
    },
    /// A peer announced itself (gossip or relay broadcast).
    PeerAnnounced {
        /// The announcing peer.
        peer_id: PeerId,
        /// Addresses the peer announced.
        multiaddrs: Vec<Multiaddr>,
    },
    /// Relay signaling notice (connection brokering chatter).
    Signaling {
        /// Free-form signaling payload.
        detail: String,
    },
}

/// Errors reported by the runtime boundary.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The runtime has not been started (or failed to start).
    #[error("transport not started")]
    NotStarted,
    /// Dialing an address failed.
    #[error("dial {addr} failed: {reason}")]
    DialFailure {
        /// The dialed address.
        addr: Multiaddr,
        /// Runtime-reported reason.
        reason: String,
    },
    /// The peer is not connected.
    #[error("peer {peer_id} is not connected")]
    NotConnected {
        /// The target peer.
        peer_id: PeerId,
    },
    /// Opening a protocol stream failed (reset, or protocol unsupported).
    #[error("open {protocol} to {peer_id} failed: {reason}")]
    StreamFailure {
        /// The target peer.
        peer_id: PeerId,
        /// The requested protocol name.
        protocol: String,
        /// Runtime-reported reason.
        reason: String,
    },
    /// Other runtime failure.
    #[error("transport error: {0}")]
    Other(String),
}

/// The node-runtime seam.
///
/// Implementations must be cheap to share behind an `Arc`; all methods
/// take `&self`.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Bring the runtime up. Idempotent.
    async fn start(&self) -> Result<(), TransportError>;

    /// Tear the runtime down, closing every connection.
    async fn stop(&self) -> Result<(), TransportError>;

    /// The local node's peer id.
    fn local_peer_id(&self) -> PeerId;

    /// Dial an address, returning the connected peer's id.
    async fn dial(&self, addr: &Multiaddr) -> Result<PeerId, TransportError>;

    /// Open a fresh stream to a connected peer for the given protocol.
    async fn open_stream(
        &self,
        peer_id: &PeerId,
        protocol: &str,
    ) -> Result<BoxStream, TransportError>;

    /// Peers with a live connection right now.
    fn connected_peers(&self) -> Vec<PeerId>;

    /// Whether the given peer has a live connection.
    fn is_connected(&self, peer_id: &PeerId) -> bool;

    /// Subscribe to connection lifecycle events.
    fn subscribe(&self) -> broadcast::Receiver<TransportEvent>;
}

/// Extract the peer id component from a multiaddr, if it carries one.
///
/// Relay and bootstrap addresses conventionally end in `/p2p/{peer-id}`.
pub fn peer_id_from_multiaddr(addr: &Multiaddr) -> Option<PeerId> {
    addr.iter().find_map(|component| match component {
        libp2p::multiaddr::Protocol::P2p(peer_id) => Some(peer_id),
        _ => None,
    })
}
