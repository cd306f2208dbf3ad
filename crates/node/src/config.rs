//! Node configuration.

use std::time::Duration;

use hashd_net_client::ClientConfig;
use libp2p::Multiaddr;

/// Default maximum store payload size.
pub(crate) const DEFAULT_MAX_PAYLOAD: usize = 10 * 1024 * 1024;

/// Default budget per retrieve attempt.
pub(crate) const DEFAULT_RETRIEVE_TIMEOUT: Duration = Duration::from_secs(30);

/// Configuration for a [`crate::StorageNode`].
#[derive(Debug, Clone)]
pub struct NodeConfig {
    /// Application namespace stamped on stored content.
    pub app_id: String,
    /// Addresses dialed best-effort when the node starts.
    pub bootstrap: Vec<Multiaddr>,
    /// Relay addresses queried for peer directories. Each must carry a
    /// `/p2p/{peer-id}` component; the relay peers themselves are excluded
    /// from storage candidate sets.
    pub relays: Vec<Multiaddr>,
    /// Maximum store payload size; larger payloads fail validation before
    /// any network access.
    pub max_payload: usize,
    /// Budget for each retrieve attempt against one candidate peer.
    pub retrieve_timeout: Duration,
    /// When set, a background task re-runs peer discovery at this period.
    pub refresh_interval: Option<Duration>,
    /// When true, store calls fail immediately unless a signer is
    /// configured.
    pub require_authorization: bool,
    /// Timing for the underlying protocol client.
    pub client: ClientConfig,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            app_id: "hashd".to_owned(),
            bootstrap: Vec::new(),
            relays: Vec::new(),
            max_payload: DEFAULT_MAX_PAYLOAD,
            retrieve_timeout: DEFAULT_RETRIEVE_TIMEOUT,
            refresh_interval: None,
            require_authorization: false,
            client: ClientConfig::default(),
        }
    }
}
