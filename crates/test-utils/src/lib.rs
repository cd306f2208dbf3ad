//! In-memory transport and scripted peers for hashd tests.
//!
//! [`MemoryTransport`] implements the node-runtime boundary entirely in
//! process: dialing resolves against registered [`ScriptedPeer`]s, and
//! opening a stream yields one half of a duplex pipe whose other half is
//! served by the peer's scripted behaviour for that protocol. Requests and
//! responses travel through the real framing codec, so tests exercise the
//! same byte path as production.

#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]

use std::{
    collections::{HashMap, HashSet},
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};

use async_trait::async_trait;
use hashd_net_codec::{read_message, write_message};
use hashd_net_transport::{BoxStream, Transport, TransportError, TransportEvent};
use libp2p::{Multiaddr, PeerId};
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::broadcast;
use tracing::trace;

/// Install a compact tracing subscriber honouring `RUST_LOG`, once per
/// process. Safe to call from every test.
pub fn init_tracing() {
    use std::sync::Once;
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// Deterministic peer id derived from a one-byte seed.
pub fn test_peer_id(seed: u8) -> PeerId {
    let keypair = libp2p::identity::Keypair::ed25519_from_bytes([seed; 32])
        .expect("32-byte seed is a valid ed25519 secret");
    keypair.public().to_peer_id()
}

type ResponderFn = Arc<dyn Fn(Value) -> Value + Send + Sync>;

#[derive(Clone)]
enum Behaviour {
    /// Read the request, apply the function, write the response.
    Respond(ResponderFn),
    /// Read the request and never answer.
    Hang,
    /// Close the stream without reading or writing.
    Reset,
}

/// A peer with scripted per-protocol behaviour.
#[derive(Clone)]
pub struct ScriptedPeer {
    peer_id: PeerId,
    addrs: Vec<Multiaddr>,
    behaviours: HashMap<String, Behaviour>,
}

impl ScriptedPeer {
    /// A peer with no addresses and no supported protocols.
    pub fn new(peer_id: PeerId) -> Self {
        Self {
            peer_id,
            addrs: Vec::new(),
            behaviours: HashMap::new(),
        }
    }

    /// The peer's id.
    pub fn peer_id(&self) -> PeerId {
        self.peer_id
    }

    /// Make the peer dialable at an address.
    pub fn with_addr(mut self, addr: Multiaddr) -> Self {
        self.addrs.push(addr);
        self
    }

    /// Script a request/response handler for a protocol.
    pub fn respond<F>(mut self, protocol: &str, handler: F) -> Self
    where
        F: Fn(Value) -> Value + Send + Sync + 'static,
    {
        self.behaviours
            .insert(protocol.to_owned(), Behaviour::Respond(Arc::new(handler)));
        self
    }

    /// Script the peer to read requests on a protocol and never answer.
    pub fn hang(mut self, protocol: &str) -> Self {
        self.behaviours.insert(protocol.to_owned(), Behaviour::Hang);
        self
    }

    /// Script the peer to reset streams opened for a protocol.
    pub fn reset(mut self, protocol: &str) -> Self {
        self.behaviours.insert(protocol.to_owned(), Behaviour::Reset);
        self
    }
}

/// In-memory implementation of the node-runtime boundary.
pub struct MemoryTransport {
    local_peer_id: PeerId,
    started: AtomicBool,
    fail_start: AtomicBool,
    peers: Mutex<HashMap<PeerId, ScriptedPeer>>,
    addr_index: Mutex<HashMap<Multiaddr, PeerId>>,
    unreachable: Mutex<HashSet<Multiaddr>>,
    connected: Mutex<HashSet<PeerId>>,
    opened: Mutex<Vec<(PeerId, String)>>,
    dialed: Mutex<Vec<Multiaddr>>,
    events: broadcast::Sender<TransportEvent>,
}

impl Default for MemoryTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryTransport {
    /// A stopped transport with no peers.
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            local_peer_id: test_peer_id(0),
            started: AtomicBool::new(false),
            fail_start: AtomicBool::new(false),
            peers: Mutex::new(HashMap::new()),
            addr_index: Mutex::new(HashMap::new()),
            unreachable: Mutex::new(HashSet::new()),
            connected: Mutex::new(HashSet::new()),
            opened: Mutex::new(Vec::new()),
            dialed: Mutex::new(Vec::new()),
            events,
        }
    }

    /// Register a dialable peer.
    pub fn add_peer(&self, peer: ScriptedPeer) {
        let mut index = self.addr_index.lock();
        for addr in &peer.addrs {
            index.insert(addr.clone(), peer.peer_id);
        }
        self.peers.lock().insert(peer.peer_id, peer);
    }

    /// Register a peer and mark it already connected.
    pub fn add_connected_peer(&self, peer: ScriptedPeer) {
        let peer_id = peer.peer_id;
        self.add_peer(peer);
        self.connected.lock().insert(peer_id);
    }

    /// Make an address fail every dial.
    pub fn set_unreachable(&self, addr: Multiaddr) {
        self.unreachable.lock().insert(addr);
    }

    /// Make the next `start` call fail.
    pub fn fail_next_start(&self) {
        self.fail_start.store(true, Ordering::SeqCst);
    }

    /// Simulate a runtime-reported connection.
    pub fn connect(&self, peer_id: PeerId) {
        self.connected.lock().insert(peer_id);
        let _ = self.events.send(TransportEvent::PeerConnected { peer_id });
    }

    /// Simulate a runtime-reported disconnect.
    pub fn disconnect(&self, peer_id: PeerId) {
        self.connected.lock().remove(&peer_id);
        let _ = self.events.send(TransportEvent::PeerDisconnected { peer_id });
    }

    /// Simulate a gossiped peer announcement.
    pub fn announce(&self, peer_id: PeerId, multiaddrs: Vec<Multiaddr>) {
        let _ = self
            .events
            .send(TransportEvent::PeerAnnounced { peer_id, multiaddrs });
    }

    /// Every `(peer, protocol)` stream opened so far.
    pub fn opened_streams(&self) -> Vec<(PeerId, String)> {
        self.opened.lock().clone()
    }

    /// Every address dialed so far.
    pub fn dialed_addrs(&self) -> Vec<Multiaddr> {
        self.dialed.lock().clone()
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn start(&self) -> Result<(), TransportError> {
        if self.fail_start.swap(false, Ordering::SeqCst) {
            return Err(TransportError::Other("scripted start failure".into()));
        }
        self.started.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn stop(&self) -> Result<(), TransportError> {
        self.started.store(false, Ordering::SeqCst);
        self.connected.lock().clear();
        Ok(())
    }

    fn local_peer_id(&self) -> PeerId {
        self.local_peer_id
    }

    async fn dial(&self, addr: &Multiaddr) -> Result<PeerId, TransportError> {
        if !self.started.load(Ordering::SeqCst) {
            return Err(TransportError::NotStarted);
        }
        self.dialed.lock().push(addr.clone());
        if self.unreachable.lock().contains(addr) {
            return Err(TransportError::DialFailure {
                addr: addr.clone(),
                reason: "scripted unreachable".into(),
            });
        }
        let peer_id = self
            .addr_index
            .lock()
            .get(addr)
            .copied()
            .ok_or_else(|| TransportError::DialFailure {
                addr: addr.clone(),
                reason: "no peer at address".into(),
            })?;
        if self.connected.lock().insert(peer_id) {
            let _ = self.events.send(TransportEvent::PeerConnected { peer_id });
        }
        Ok(peer_id)
    }

    async fn open_stream(
        &self,
        peer_id: &PeerId,
        protocol: &str,
    ) -> Result<BoxStream, TransportError> {
        if !self.started.load(Ordering::SeqCst) {
            return Err(TransportError::NotStarted);
        }
        if !self.connected.lock().contains(peer_id) {
            return Err(TransportError::NotConnected { peer_id: *peer_id });
        }
        let behaviour = self
            .peers
            .lock()
            .get(peer_id)
            .and_then(|peer| peer.behaviours.get(protocol).cloned())
            .ok_or_else(|| TransportError::StreamFailure {
                peer_id: *peer_id,
                protocol: protocol.to_owned(),
                reason: "protocol not supported".into(),
            })?;
        self.opened.lock().push((*peer_id, protocol.to_owned()));
        trace!(peer = %peer_id, protocol, "scripted stream opened");

        let (local, mut remote) = tokio::io::duplex(512 * 1024);
        tokio::spawn(async move {
            match behaviour {
                Behaviour::Respond(handler) => {
                    if let Ok(Some(request)) = read_message::<_, Value>(&mut remote).await {
                        let response = handler(request);
                        let _ = write_message(&mut remote, &response).await;
                    }
                }
                Behaviour::Hang => {
                    let _ = read_message::<_, Value>(&mut remote).await;
                    std::future::pending::<()>().await;
                }
                Behaviour::Reset => drop(remote),
            }
        });
        Ok(Box::new(local))
    }

    fn connected_peers(&self) -> Vec<PeerId> {
        self.connected.lock().iter().copied().collect()
    }

    fn is_connected(&self, peer_id: &PeerId) -> bool {
        self.connected.lock().contains(peer_id)
    }

    fn subscribe(&self) -> broadcast::Receiver<TransportEvent> {
        self.events.subscribe()
    }
}
