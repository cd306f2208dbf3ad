//! In-memory directory of known and connected storage peers.
//!
//! Records are created on first announcement or first live connection and
//! updated on every subsequent announcement, connect, disconnect, or probe.
//! Records are never deleted: a disconnect only moves the record to
//! [`PeerState::Disconnected`], keeping learned addresses and metadata for
//! reconnection.
//!
//! Bootstrap discovery and periodic refresh can both update the same record;
//! every update here is idempotent and last-write-wins per field, with
//! fields absent from the newer message preserving the previously learned
//! value.

#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]

use std::{collections::HashMap, time::Duration};

use alloy_primitives::Address;
use hashd_net_proto::{HealthResponse, InfoResponse};
use hashd_primitives::AcceptedContentTypes;
use libp2p::{Multiaddr, PeerId};
use parking_lot::RwLock;
use tracing::{debug, trace};

/// Connection state of a single peer record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum PeerState {
    /// Learned from a directory or announcement, never dialed.
    Known,
    /// Live and stream-capable right now.
    Connected,
    /// Was connected, is not now. Record retained for reconnection.
    Disconnected,
}

/// Everything learned about one peer.
#[derive(Debug, Clone)]
pub struct PeerRecord {
    /// The peer's id.
    pub peer_id: PeerId,
    /// Declared public key, when the peer disclosed one.
    pub public_key: Option<String>,
    /// Content categories the peer accepts.
    pub accepted: AcceptedContentTypes,
    /// Current connection state.
    pub state: PeerState,
    /// Last measured probe round-trip, if any.
    pub latency: Option<Duration>,
    /// Whether the peer is confirmed in the external registry.
    pub registered: bool,
    /// Operator address, when disclosed.
    pub owner: Option<Address>,
    /// Relay-routable addresses for the peer.
    pub multiaddrs: Vec<Multiaddr>,
    /// When a relay last saw the peer, seconds since the Unix epoch.
    pub last_seen: Option<u64>,
    /// Monotonic discovery sequence, used to keep listing order stable.
    seq: u64,
}

impl PeerRecord {
    fn new(peer_id: PeerId, state: PeerState, seq: u64) -> Self {
        Self {
            peer_id,
            public_key: None,
            accepted: AcceptedContentTypes::All,
            state,
            latency: None,
            registered: false,
            owner: None,
            multiaddrs: Vec::new(),
            last_seen: None,
            seq,
        }
    }

    /// Whether the record is currently marked connected.
    pub fn is_connected(&self) -> bool {
        self.state == PeerState::Connected
    }
}

/// Registry of every peer this node has learned about.
#[derive(Debug, Default)]
pub struct PeerDirectory {
    inner: RwLock<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    records: HashMap<PeerId, PeerRecord>,
    next_seq: u64,
}

impl Inner {
    fn entry(&mut self, peer_id: PeerId, state: PeerState) -> &mut PeerRecord {
        let seq = self.next_seq;
        let record = self
            .records
            .entry(peer_id)
            .or_insert_with(|| PeerRecord::new(peer_id, state, seq));
        if record.seq == self.next_seq {
            self.next_seq += 1;
        }
        record
    }
}

impl PeerDirectory {
    /// Create an empty directory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold in a directory entry or announcement.
    ///
    /// Creates the record as [`PeerState::Known`] if absent. Fields the
    /// announcement omits (empty address list, missing timestamp) preserve
    /// their previously learned values.
    pub fn apply_announcement(
        &self,
        peer_id: PeerId,
        multiaddrs: &[Multiaddr],
        last_seen: Option<u64>,
    ) {
        let mut inner = self.inner.write();
        let record = inner.entry(peer_id, PeerState::Known);
        if !multiaddrs.is_empty() {
            record.multiaddrs = multiaddrs.to_vec();
        }
        if last_seen.is_some() {
            record.last_seen = last_seen;
        }
        trace!(peer = %peer_id, addrs = record.multiaddrs.len(), "announcement applied");
    }

    /// Record a successful dial or transport-reported connect.
    pub fn mark_connected(&self, peer_id: PeerId) {
        let mut inner = self.inner.write();
        let record = inner.entry(peer_id, PeerState::Connected);
        record.state = PeerState::Connected;
        debug!(peer = %peer_id, "peer connected");
    }

    /// Record a transport-reported disconnect. The record is retained.
    pub fn mark_disconnected(&self, peer_id: PeerId) {
        let mut inner = self.inner.write();
        if let Some(record) = inner.records.get_mut(&peer_id) {
            record.state = PeerState::Disconnected;
            debug!(peer = %peer_id, "peer disconnected");
        }
    }

    /// Fold in a health snapshot and the measured probe round-trip.
    pub fn apply_health(
        &self,
        peer_id: PeerId,
        health: &HealthResponse,
        latency: Option<Duration>,
    ) {
        let mut inner = self.inner.write();
        let record = inner.entry(peer_id, PeerState::Known);
        record.accepted = health.content_types.clone();
        if let Some(registered) = health.registered {
            record.registered = registered;
        }
        if let Some(owner) = health.owner.as_deref().and_then(parse_address) {
            record.owner = Some(owner);
        }
        let addrs: Vec<Multiaddr> = health
            .multiaddrs
            .iter()
            .filter_map(|a| a.parse().ok())
            .collect();
        if !addrs.is_empty() {
            record.multiaddrs = addrs;
        }
        if latency.is_some() {
            record.latency = latency;
        }
    }

    /// Fold in a static-metadata snapshot.
    pub fn apply_info(&self, peer_id: PeerId, info: &InfoResponse) {
        let mut inner = self.inner.write();
        let record = inner.entry(peer_id, PeerState::Known);
        if info.public_key.is_some() {
            record.public_key = info.public_key.clone();
        }
        if let Some(owner) = info.owner.as_deref().and_then(parse_address) {
            record.owner = Some(owner);
        }
    }

    /// Set the external-registry flag for a peer.
    pub fn set_registered(&self, peer_id: &PeerId, registered: bool) {
        let mut inner = self.inner.write();
        if let Some(record) = inner.records.get_mut(peer_id) {
            record.registered = registered;
        }
    }

    /// A copy of one record.
    pub fn get(&self, peer_id: &PeerId) -> Option<PeerRecord> {
        self.inner.read().records.get(peer_id).cloned()
    }

    /// Number of records in the directory.
    pub fn len(&self) -> usize {
        self.inner.read().records.len()
    }

    /// Whether the directory holds no records.
    pub fn is_empty(&self) -> bool {
        self.inner.read().records.is_empty()
    }

    /// Every record, overlaid with live transport state, in discovery order.
    ///
    /// A record is listed as connected iff the transport reports it live
    /// right now. Transport-connected peers the directory has never heard
    /// of are appended with default metadata.
    pub fn list(&self, live: &[PeerId]) -> Vec<PeerRecord> {
        let inner = self.inner.read();
        let mut records: Vec<PeerRecord> = inner
            .records
            .values()
            .map(|record| {
                let mut record = record.clone();
                record.state = if live.contains(&record.peer_id) {
                    PeerState::Connected
                } else if record.state == PeerState::Connected {
                    PeerState::Disconnected
                } else {
                    record.state
                };
                record
            })
            .collect();
        records.sort_by_key(|r| r.seq);

        let mut extra_seq = inner.next_seq;
        for peer_id in live {
            if !inner.records.contains_key(peer_id) {
                records.push(PeerRecord::new(*peer_id, PeerState::Connected, extra_seq));
                extra_seq += 1;
            }
        }
        records
    }
}

fn parse_address(s: &str) -> Option<Address> {
    s.parse().ok()
}
