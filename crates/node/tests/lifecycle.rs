//! Lifecycle, discovery and event notification tests.

use std::{sync::Arc, time::Duration};

use hashd_net_proto::{HEALTH_PROTOCOL, PEER_DIRECTORY_PROTOCOL};
use hashd_node::{ConnectionState, NodeConfig, NodeError, NodeEvent, StorageNode};
use hashd_peers::PeerState;
use hashd_test_utils::{MemoryTransport, ScriptedPeer, test_peer_id};
use libp2p::{Multiaddr, PeerId};
use serde_json::{Value, json};
use tokio::sync::broadcast;

fn relay_multiaddr(port: u16, relay_id: &PeerId) -> Multiaddr {
    format!("/ip4/127.0.0.1/tcp/{port}/p2p/{relay_id}")
        .parse()
        .unwrap()
}

fn peer_addr(port: u16) -> Multiaddr {
    format!("/ip4/10.0.0.1/tcp/{port}").parse().unwrap()
}

fn health_ok() -> impl Fn(Value) -> Value + Send + Sync + 'static {
    |_| json!({ "peerId": "peer", "status": "ok", "contentTypes": "all" })
}

async fn next_event(rx: &mut broadcast::Receiver<NodeEvent>) -> NodeEvent {
    tokio::time::timeout(Duration::from_secs(1), rx.recv())
        .await
        .expect("timed out waiting for event")
        .expect("event channel closed")
}

#[tokio::test]
async fn test_start_reaches_connected_without_storage_peers() {
    let transport = Arc::new(MemoryTransport::new());
    let node = Arc::new(StorageNode::new(transport, NodeConfig::default()));
    let mut events = node.subscribe();

    node.start().await.unwrap();

    assert_eq!(node.state(), ConnectionState::Connected);
    assert!(matches!(
        next_event(&mut events).await,
        NodeEvent::ConnectionStateChanged(ConnectionState::Connecting)
    ));
    assert!(matches!(
        next_event(&mut events).await,
        NodeEvent::ConnectionStateChanged(ConnectionState::Connected)
    ));
}

#[tokio::test]
async fn test_failed_transport_start_is_an_error_state() {
    let transport = Arc::new(MemoryTransport::new());
    transport.fail_next_start();
    let node = Arc::new(StorageNode::new(Arc::clone(&transport), NodeConfig::default()));

    let err = node.start().await.unwrap_err();
    assert!(matches!(err, NodeError::Transport(_)));
    assert_eq!(node.state(), ConnectionState::Error);
}

#[tokio::test]
async fn test_bootstrap_dial_failures_are_skipped() {
    let transport = Arc::new(MemoryTransport::new());
    let dead: Multiaddr = "/ip4/192.0.2.1/tcp/1".parse().unwrap();
    transport.set_unreachable(dead.clone());

    let config = NodeConfig {
        bootstrap: vec![dead],
        ..NodeConfig::default()
    };
    let node = Arc::new(StorageNode::new(Arc::clone(&transport), config));
    node.start().await.unwrap();

    assert_eq!(node.state(), ConnectionState::Connected);
}

#[tokio::test]
async fn test_discovery_stops_after_first_relay_with_peers() {
    let transport = Arc::new(MemoryTransport::new());
    let empty_relay = test_peer_id(10);
    let full_relay = test_peer_id(11);
    let spare_relay = test_peer_id(12);
    let peer = test_peer_id(1);

    transport.add_peer(
        ScriptedPeer::new(empty_relay)
            .with_addr(relay_multiaddr(9001, &empty_relay))
            .respond(PEER_DIRECTORY_PROTOCOL, |_| json!({ "peers": [], "timestamp": 0 })),
    );
    let entry = json!({
        "peers": [
            { "peerId": peer.to_string(), "multiaddrs": [peer_addr(1).to_string()], "lastSeen": 5 },
        ],
        "timestamp": 9,
    });
    transport.add_peer(
        ScriptedPeer::new(full_relay)
            .with_addr(relay_multiaddr(9002, &full_relay))
            .respond(PEER_DIRECTORY_PROTOCOL, move |_| entry.clone()),
    );
    transport.add_peer(
        ScriptedPeer::new(spare_relay)
            .with_addr(relay_multiaddr(9003, &spare_relay))
            .respond(PEER_DIRECTORY_PROTOCOL, |_| json!({ "peers": [], "timestamp": 0 })),
    );
    transport.add_peer(
        ScriptedPeer::new(peer)
            .with_addr(peer_addr(1))
            .respond(HEALTH_PROTOCOL, health_ok()),
    );

    let config = NodeConfig {
        relays: vec![
            relay_multiaddr(9001, &empty_relay),
            relay_multiaddr(9002, &full_relay),
            relay_multiaddr(9003, &spare_relay),
        ],
        ..NodeConfig::default()
    };
    let node = Arc::new(StorageNode::new(Arc::clone(&transport), config));
    node.start().await.unwrap();

    let directory_queries: Vec<PeerId> = transport
        .opened_streams()
        .into_iter()
        .filter(|(_, protocol)| protocol == PEER_DIRECTORY_PROTOCOL)
        .map(|(peer_id, _)| peer_id)
        .collect();
    // The empty relay is consulted, the full relay satisfies discovery,
    // and the spare relay is never queried.
    assert_eq!(directory_queries, vec![empty_relay, full_relay]);

    let record = node
        .peers()
        .into_iter()
        .find(|r| r.peer_id == peer)
        .unwrap();
    assert_eq!(record.state, PeerState::Connected);
    assert_eq!(record.last_seen, Some(5));
}

#[tokio::test]
async fn test_refresh_skips_redial_for_connected_peers() {
    let transport = Arc::new(MemoryTransport::new());
    let relay_id = test_peer_id(10);
    let peer = test_peer_id(1);

    let entry = json!({
        "peers": [
            { "peerId": peer.to_string(), "multiaddrs": [peer_addr(1).to_string()], "lastSeen": 5 },
        ],
        "timestamp": 9,
    });
    transport.add_peer(
        ScriptedPeer::new(relay_id)
            .with_addr(relay_multiaddr(9001, &relay_id))
            .respond(PEER_DIRECTORY_PROTOCOL, move |_| entry.clone()),
    );
    transport.add_peer(
        ScriptedPeer::new(peer)
            .with_addr(peer_addr(1))
            .respond(HEALTH_PROTOCOL, health_ok()),
    );

    let config = NodeConfig {
        relays: vec![relay_multiaddr(9001, &relay_id)],
        ..NodeConfig::default()
    };
    let node = Arc::new(StorageNode::new(Arc::clone(&transport), config));
    node.start().await.unwrap();

    let dials_after_start = transport
        .dialed_addrs()
        .iter()
        .filter(|a| **a == peer_addr(1))
        .count();
    assert_eq!(dials_after_start, 1);

    let refreshed = node.refresh_peers().await;
    assert_eq!(refreshed, 1);

    // Still one dial: the peer was already connected.
    let dials_after_refresh = transport
        .dialed_addrs()
        .iter()
        .filter(|a| **a == peer_addr(1))
        .count();
    assert_eq!(dials_after_refresh, 1);

    // But its metadata was re-fetched.
    let health_probes = transport
        .opened_streams()
        .into_iter()
        .filter(|(peer_id, protocol)| *peer_id == peer && protocol == HEALTH_PROTOCOL)
        .count();
    assert_eq!(health_probes, 2);
}

#[tokio::test]
async fn test_transport_events_reach_subscribers_and_directory() {
    let transport = Arc::new(MemoryTransport::new());
    let node = Arc::new(StorageNode::new(Arc::clone(&transport), NodeConfig::default()));
    node.start().await.unwrap();

    let mut events = node.subscribe();
    let peer = test_peer_id(1);

    transport.connect(peer);
    assert!(matches!(
        next_event(&mut events).await,
        NodeEvent::PeerConnected(p) if p == peer
    ));

    transport.disconnect(peer);
    assert!(matches!(
        next_event(&mut events).await,
        NodeEvent::PeerDisconnected(p) if p == peer
    ));

    // The record survives the disconnect for later reconnection.
    let record = node
        .peers()
        .into_iter()
        .find(|r| r.peer_id == peer)
        .unwrap();
    assert_eq!(record.state, PeerState::Disconnected);
}

#[tokio::test]
async fn test_announcements_populate_the_directory() {
    let transport = Arc::new(MemoryTransport::new());
    let node = Arc::new(StorageNode::new(Arc::clone(&transport), NodeConfig::default()));
    node.start().await.unwrap();

    let peer = test_peer_id(2);
    transport.announce(peer, vec![peer_addr(7)]);

    // The pump runs asynchronously; poll until the record lands.
    let deadline = tokio::time::Instant::now() + Duration::from_secs(1);
    loop {
        if let Some(record) = node.peers().into_iter().find(|r| r.peer_id == peer) {
            assert_eq!(record.state, PeerState::Known);
            assert_eq!(record.multiaddrs, vec![peer_addr(7)]);
            break;
        }
        assert!(tokio::time::Instant::now() < deadline, "announcement never applied");
        tokio::task::yield_now().await;
    }
}

#[tokio::test]
async fn test_stop_transitions_to_disconnected() {
    let transport = Arc::new(MemoryTransport::new());
    let node = Arc::new(StorageNode::new(Arc::clone(&transport), NodeConfig::default()));
    node.start().await.unwrap();

    let mut events = node.subscribe();
    node.stop().await.unwrap();

    assert_eq!(node.state(), ConnectionState::Disconnected);
    assert!(matches!(
        next_event(&mut events).await,
        NodeEvent::ConnectionStateChanged(ConnectionState::Disconnected)
    ));

    // Workflows refuse to run on a stopped node.
    assert!(matches!(
        node.store(b"x", "text/plain", None).await.unwrap_err(),
        NodeError::NotStarted
    ));
}
