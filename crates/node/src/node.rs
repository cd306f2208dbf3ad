//! The storage orchestrator.

use std::{collections::HashSet, sync::Arc, time::Duration};

use hashd_net_client::{
    MessageSigner, ProtocolClient, ProtocolError, RetrievedContent, StoreReceipt,
    build_authorization,
};
use hashd_net_proto::{HealthResponse, InfoResponse, PeerDirectoryResponse, RETRIEVE_PROTOCOL};
use hashd_net_transport::{Transport, TransportEvent, peer_id_from_multiaddr};
use hashd_peers::{PeerDirectory, PeerRecord};
use hashd_primitives::ContentId;
use libp2p::{Multiaddr, PeerId};
use parking_lot::{Mutex, RwLock};
use tokio::{sync::broadcast, task::JoinHandle, time::MissedTickBehavior};
use tracing::{debug, info, trace, warn};

use crate::{
    config::NodeConfig,
    error::NodeError,
    events::{ConnectionState, NodeEvent},
    registry::NodeRegistry,
};

const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Top-level storage orchestrator.
///
/// Owns the [`ConnectionState`] machine, the peer directory, and the
/// store/retrieve workflows. All methods take `&self`; share the node
/// behind an [`Arc`].
pub struct StorageNode<T> {
    transport: Arc<T>,
    client: ProtocolClient<T>,
    directory: Arc<PeerDirectory>,
    config: NodeConfig,
    relay_peers: HashSet<PeerId>,
    state: RwLock<ConnectionState>,
    events: broadcast::Sender<NodeEvent>,
    signer: Option<Arc<dyn MessageSigner>>,
    registry: Option<Arc<dyn NodeRegistry>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl<T: Transport> StorageNode<T> {
    /// Create a node over the given transport.
    pub fn new(transport: Arc<T>, config: NodeConfig) -> Self {
        let relay_peers = config
            .relays
            .iter()
            .filter_map(peer_id_from_multiaddr)
            .collect();
        let client = ProtocolClient::with_config(Arc::clone(&transport), config.client.clone());
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            transport,
            client,
            directory: Arc::new(PeerDirectory::new()),
            config,
            relay_peers,
            state: RwLock::new(ConnectionState::Disconnected),
            events,
            signer: None,
            registry: None,
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// Attach a signer; store requests will carry authorization envelopes.
    pub fn with_signer(mut self, signer: Arc<dyn MessageSigner>) -> Self {
        self.signer = Some(signer);
        self
    }

    /// Attach a registry; discovered peers with a registered operator are
    /// preferred store candidates.
    pub fn with_registry(mut self, registry: Arc<dyn NodeRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        *self.state.read()
    }

    /// The node's configuration.
    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    /// Subscribe to lifecycle events. Dropping the receiver unsubscribes.
    pub fn subscribe(&self) -> broadcast::Receiver<NodeEvent> {
        self.events.subscribe()
    }

    /// Every known peer, overlaid with live transport state.
    pub fn peers(&self) -> Vec<PeerRecord> {
        self.directory.list(&self.transport.connected_peers())
    }

    /// Fetch a live health snapshot from one peer, refreshing its record.
    pub async fn peer_health(&self, peer_id: &PeerId) -> Result<HealthResponse, ProtocolError> {
        let started = tokio::time::Instant::now();
        let health = self.client.health(peer_id).await?;
        self.directory
            .apply_health(*peer_id, &health, Some(started.elapsed()));
        Ok(health)
    }

    /// Fetch a peer's static metadata, refreshing its record.
    pub async fn peer_info(&self, peer_id: &PeerId) -> Result<InfoResponse, ProtocolError> {
        let info = self.client.info(peer_id).await?;
        self.directory.apply_info(*peer_id, &info);
        Ok(info)
    }

    /// Bring the node up.
    ///
    /// Starts the transport, dials bootstrap addresses best-effort, runs
    /// one round of relay peer discovery, and transitions to
    /// [`ConnectionState::Connected`]. Reaching connected does not require
    /// any storage peer to be live, only that the transport started.
    pub async fn start(&self) -> Result<(), NodeError> {
        self.set_state(ConnectionState::Connecting);
        if let Err(e) = self.transport.start().await {
            self.set_state(ConnectionState::Error);
            return Err(e.into());
        }
        self.spawn_event_pump();

        for addr in &self.config.bootstrap {
            match self.transport.dial(addr).await {
                Ok(peer_id) => {
                    self.directory.mark_connected(peer_id);
                    debug!(%addr, peer = %peer_id, "bootstrap peer connected");
                }
                Err(e) => warn!(%addr, error = %e, "bootstrap dial failed, skipping"),
            }
        }

        let adopted = self.refresh_peers().await;
        info!(peers = adopted, "peer discovery complete");

        if let Some(period) = self.config.refresh_interval {
            self.spawn_refresh_task(period);
        }
        self.set_state(ConnectionState::Connected);
        Ok(())
    }

    /// Tear the node down. Background tasks stop, the transport stops, and
    /// the state transitions to [`ConnectionState::Disconnected`].
    pub async fn stop(&self) -> Result<(), NodeError> {
        for task in self.tasks.lock().drain(..) {
            task.abort();
        }
        self.transport.stop().await?;
        self.set_state(ConnectionState::Disconnected);
        Ok(())
    }

    /// Re-run relay peer discovery, reconnecting to peers that dropped and
    /// refreshing cached metadata. Peers already connected are not
    /// redialed.
    pub async fn refresh_peers(&self) -> usize {
        run_discovery(
            self.transport.as_ref(),
            &self.client,
            &self.directory,
            &self.config.relays,
            self.registry.as_deref(),
        )
        .await
    }

    /// Store a payload on the network.
    ///
    /// Candidates are the transport-connected storage peers (relay
    /// infrastructure excluded), registered peers first, then the rest in
    /// discovery order. Attempts run strictly in order; the first success
    /// wins, and only after every candidate fails does the aggregated
    /// error surface.
    pub async fn store(
        &self,
        payload: &[u8],
        mime_type: &str,
        content_type: Option<&str>,
    ) -> Result<StoreReceipt, NodeError> {
        if self.state() != ConnectionState::Connected {
            return Err(NodeError::NotStarted);
        }
        if payload.len() > self.config.max_payload {
            return Err(NodeError::PayloadTooLarge {
                len: payload.len(),
                max: self.config.max_payload,
            });
        }
        if self.config.require_authorization && self.signer.is_none() {
            return Err(NodeError::SignerRequired);
        }

        let mut candidates = self.storage_candidates();
        if let Some(content_type) = content_type {
            candidates.retain(|record| record.accepted.accepts(content_type));
        }
        if candidates.is_empty() {
            return Err(NodeError::NoPeers);
        }
        // Stable sort: registered first, discovery order within each group.
        candidates.sort_by_key(|record| !record.registered);

        let cid = ContentId::from_payload(payload);
        let authorization = match &self.signer {
            Some(signer) => {
                Some(build_authorization(signer.as_ref(), &self.config.app_id, &cid).await?)
            }
            None => None,
        };

        let mut failures = Vec::new();
        for candidate in &candidates {
            if !candidate.registered {
                warn!(
                    peer = %candidate.peer_id,
                    "storing via unregistered peer; content will not be replicated"
                );
            }
            match self
                .client
                .store(
                    &candidate.peer_id,
                    payload,
                    mime_type,
                    content_type,
                    Some(self.config.app_id.as_str()),
                    authorization.clone(),
                )
                .await
            {
                Ok(receipt) => {
                    info!(peer = %receipt.peer_id, cid = %receipt.cid, "blob stored");
                    return Ok(receipt);
                }
                Err(e) => {
                    debug!(peer = %candidate.peer_id, error = %e, "store attempt failed, advancing");
                    failures.push((candidate.peer_id, e));
                }
            }
        }
        Err(NodeError::AllStoresFailed { failures })
    }

    /// Retrieve a payload from the network.
    ///
    /// Queries every connected storage peer's have-list to build the
    /// candidate set, then attempts retrieval from each holder in order,
    /// each attempt bounded by its own timer. "No peers connected" and
    /// "peers connected but none holds the content" are distinct errors.
    pub async fn retrieve(&self, cid: &ContentId) -> Result<RetrievedContent, NodeError> {
        if self.state() != ConnectionState::Connected {
            return Err(NodeError::NotStarted);
        }
        let candidates = self.storage_candidates();
        if candidates.is_empty() {
            return Err(NodeError::NoPeers);
        }

        let mut holders = Vec::new();
        for candidate in &candidates {
            match self
                .client
                .have_list(&candidate.peer_id, std::slice::from_ref(cid))
                .await
            {
                Ok(response) if response.cids.iter().any(|c| c == cid.as_str()) => {
                    holders.push(candidate.peer_id);
                }
                Ok(_) => trace!(peer = %candidate.peer_id, "peer does not hold content"),
                Err(e) => debug!(peer = %candidate.peer_id, error = %e, "have-list probe failed"),
            }
        }
        if holders.is_empty() {
            return Err(NodeError::NotFound { cid: cid.clone() });
        }

        let mut failures = Vec::new();
        for peer_id in holders {
            let attempt = self.client.retrieve(&peer_id, cid);
            match tokio::time::timeout(self.config.retrieve_timeout, attempt).await {
                Ok(Ok(content)) => {
                    debug!(peer = %peer_id, %cid, "blob retrieved");
                    return Ok(content);
                }
                Ok(Err(e)) => failures.push((peer_id, e)),
                Err(_) => failures.push((
                    peer_id,
                    ProtocolError::Timeout {
                        protocol: RETRIEVE_PROTOCOL,
                        timeout: self.config.retrieve_timeout,
                    },
                )),
            }
        }
        Err(NodeError::AllRetrievalsFailed {
            cid: cid.clone(),
            failures,
        })
    }

    /// Transport-connected peers eligible as storage candidates.
    fn storage_candidates(&self) -> Vec<PeerRecord> {
        let live = self.transport.connected_peers();
        self.directory
            .list(&live)
            .into_iter()
            .filter(|record| record.is_connected() && !self.relay_peers.contains(&record.peer_id))
            .collect()
    }

    /// Translate transport events into directory updates and node events.
    fn spawn_event_pump(&self) {
        let mut rx = self.transport.subscribe();
        let directory = Arc::clone(&self.directory);
        let events = self.events.clone();
        let handle = tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(TransportEvent::PeerConnected { peer_id }) => {
                        directory.mark_connected(peer_id);
                        let _ = events.send(NodeEvent::PeerConnected(peer_id));
                    }
                    Ok(TransportEvent::PeerDisconnected { peer_id }) => {
                        directory.mark_disconnected(peer_id);
                        let _ = events.send(NodeEvent::PeerDisconnected(peer_id));
                    }
                    Ok(TransportEvent::PeerAnnounced {
                        peer_id,
                        multiaddrs,
                    }) => directory.apply_announcement(peer_id, &multiaddrs, None),
                    Ok(TransportEvent::Signaling { detail }) => {
                        let _ = events.send(NodeEvent::Signaling(detail));
                    }
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        warn!(missed, "event pump lagged behind the transport");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });
        self.tasks.lock().push(handle);
    }

    fn spawn_refresh_task(&self, period: Duration) {
        let transport = Arc::clone(&self.transport);
        let client = self.client.clone();
        let directory = Arc::clone(&self.directory);
        let relays = self.config.relays.clone();
        let registry = self.registry.clone();
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The immediate first tick; discovery already ran in start.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let refreshed = run_discovery(
                    transport.as_ref(),
                    &client,
                    &directory,
                    &relays,
                    registry.as_deref(),
                )
                .await;
                trace!(refreshed, "periodic peer refresh");
            }
        });
        self.tasks.lock().push(handle);
    }

    fn set_state(&self, next: ConnectionState) {
        let mut state = self.state.write();
        if *state == next {
            return;
        }
        debug!(from = %*state, to = %next, "connection state changed");
        *state = next;
        drop(state);
        let _ = self.events.send(NodeEvent::ConnectionStateChanged(next));
    }
}

/// One round of relay directory discovery.
///
/// Queries each configured relay in order and stops after the first one
/// that yields a non-empty peer list. Shared by startup discovery, manual
/// refresh, and the periodic refresh task; every directory update it makes
/// is idempotent, so concurrent rounds converge on last-write-wins.
async fn run_discovery<T: Transport>(
    transport: &T,
    client: &ProtocolClient<T>,
    directory: &PeerDirectory,
    relays: &[Multiaddr],
    registry: Option<&dyn NodeRegistry>,
) -> usize {
    for relay_addr in relays {
        let Some(relay_id) = peer_id_from_multiaddr(relay_addr) else {
            warn!(%relay_addr, "relay address lacks a /p2p component, skipping");
            continue;
        };
        if !transport.is_connected(&relay_id) {
            if let Err(e) = transport.dial(relay_addr).await {
                warn!(%relay_addr, error = %e, "relay dial failed, skipping");
                continue;
            }
        }
        let snapshot = match client.peer_directory(&relay_id).await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!(relay = %relay_id, error = %e, "peer directory query failed");
                continue;
            }
        };
        if snapshot.peers.is_empty() {
            debug!(relay = %relay_id, "relay returned an empty directory");
            continue;
        }
        let adopted = adopt_directory(transport, client, directory, snapshot).await;
        apply_registry(directory, registry).await;
        return adopted;
    }
    0
}

/// Fold a relay directory snapshot into the peer directory, connecting to
/// each listed peer through its advertised addresses. Peers already
/// connected are not redialed; their metadata is refreshed in place.
async fn adopt_directory<T: Transport>(
    transport: &T,
    client: &ProtocolClient<T>,
    directory: &PeerDirectory,
    snapshot: PeerDirectoryResponse,
) -> usize {
    let mut adopted = 0;
    for entry in snapshot.peers {
        let Ok(peer_id) = entry.peer_id.parse::<PeerId>() else {
            warn!(raw = %entry.peer_id, "directory entry has an unparseable peer id");
            continue;
        };
        let addrs: Vec<Multiaddr> = entry
            .multiaddrs
            .iter()
            .filter_map(|a| a.parse().ok())
            .collect();
        directory.apply_announcement(peer_id, &addrs, Some(entry.last_seen));

        if !transport.is_connected(&peer_id) {
            let mut connected = false;
            for addr in &addrs {
                match transport.dial(addr).await {
                    Ok(_) => {
                        connected = true;
                        break;
                    }
                    Err(e) => debug!(%addr, error = %e, "advertised address failed"),
                }
            }
            if !connected {
                debug!(peer = %peer_id, "peer unreachable on every advertised address");
                continue;
            }
        }
        directory.mark_connected(peer_id);

        let started = tokio::time::Instant::now();
        match client.health(&peer_id).await {
            Ok(health) => {
                directory.apply_health(peer_id, &health, Some(started.elapsed()));
                adopted += 1;
            }
            Err(e) => debug!(peer = %peer_id, error = %e, "health probe failed"),
        }
    }
    adopted
}

/// Mark directory records whose operator appears in the registry.
async fn apply_registry(directory: &PeerDirectory, registry: Option<&dyn NodeRegistry>) {
    let Some(registry) = registry else {
        return;
    };
    match registry.active_nodes().await {
        Ok(active) => {
            let active: HashSet<_> = active.into_iter().collect();
            for record in directory.list(&[]) {
                if let Some(owner) = record.owner {
                    directory.set_registered(&record.peer_id, active.contains(&owner));
                }
            }
        }
        Err(e) => warn!(error = %e, "registry query failed"),
    }
}
