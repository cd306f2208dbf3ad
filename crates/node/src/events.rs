//! Connection state and lifecycle events.

use libp2p::PeerId;

/// Connection state of the node as a whole.
///
/// Owned solely by the orchestrator; every transition is published as a
/// [`NodeEvent::ConnectionStateChanged`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum ConnectionState {
    /// Not started, or stopped.
    Disconnected,
    /// Transport coming up, discovery in progress.
    Connecting,
    /// Transport up. Does not imply any storage peer is live.
    Connected,
    /// Startup failed.
    Error,
}

/// Lifecycle notifications published to subscribers.
///
/// Delivered over a broadcast channel: each subscriber sees events in send
/// order, subscribers are independent of one another, and dropping the
/// receiver unsubscribes.
#[derive(Debug, Clone)]
pub enum NodeEvent {
    /// The node's connection state changed.
    ConnectionStateChanged(ConnectionState),
    /// A peer connection was established.
    PeerConnected(PeerId),
    /// A peer connection was closed.
    PeerDisconnected(PeerId),
    /// Relay signaling chatter, forwarded verbatim.
    Signaling(String),
}
