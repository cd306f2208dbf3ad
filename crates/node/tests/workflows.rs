//! Store and retrieve workflow tests against scripted peers.

use std::sync::Arc;

use hashd_net_proto::{
    HAVE_LIST_PROTOCOL, HEALTH_PROTOCOL, PEER_DIRECTORY_PROTOCOL, RETRIEVE_PROTOCOL, STORE_PROTOCOL,
    encode_base64_chunked,
};
use hashd_node::{NodeConfig, NodeError, StorageNode};
use hashd_primitives::ContentId;
use hashd_test_utils::{MemoryTransport, ScriptedPeer, test_peer_id};
use libp2p::{Multiaddr, PeerId};
use parking_lot::Mutex;
use serde_json::{Value, json};

fn peer_addr(port: u16) -> Multiaddr {
    format!("/ip4/10.0.0.1/tcp/{port}").parse().unwrap()
}

fn relay_multiaddr(relay_id: &PeerId) -> Multiaddr {
    format!("/ip4/127.0.0.1/tcp/9000/p2p/{relay_id}")
        .parse()
        .unwrap()
}

fn store_ok() -> impl Fn(Value) -> Value + Send + Sync + 'static {
    |request| json!({ "success": true, "cid": request["cid"] })
}

fn health(registered: bool) -> impl Fn(Value) -> Value + Send + Sync + 'static {
    move |_| {
        json!({
            "peerId": "reported-by-peer",
            "status": "ok",
            "contentTypes": "all",
            "registered": registered,
        })
    }
}

async fn started_node(transport: Arc<MemoryTransport>, config: NodeConfig) -> Arc<StorageNode<MemoryTransport>> {
    hashd_test_utils::init_tracing();
    let node = Arc::new(StorageNode::new(transport, config));
    node.start().await.unwrap();
    node
}

#[tokio::test]
async fn test_store_prefers_registered_peers() {
    let transport = Arc::new(MemoryTransport::new());
    let relay_id = test_peer_id(10);
    let p1 = test_peer_id(1);
    let p2 = test_peer_id(2);
    let p3 = test_peer_id(3);

    let relay_addr = relay_multiaddr(&relay_id);
    let directory = json!({
        "peers": [
            { "peerId": p1.to_string(), "multiaddrs": [peer_addr(1).to_string()], "lastSeen": 1 },
            { "peerId": p2.to_string(), "multiaddrs": [peer_addr(2).to_string()], "lastSeen": 2 },
            { "peerId": p3.to_string(), "multiaddrs": [peer_addr(3).to_string()], "lastSeen": 3 },
        ],
        "timestamp": 100,
    });
    transport.add_peer(
        ScriptedPeer::new(relay_id)
            .with_addr(relay_addr.clone())
            .respond(PEER_DIRECTORY_PROTOCOL, move |_| directory.clone()),
    );
    transport.add_peer(
        ScriptedPeer::new(p1)
            .with_addr(peer_addr(1))
            .respond(HEALTH_PROTOCOL, health(false))
            .respond(STORE_PROTOCOL, store_ok()),
    );
    transport.add_peer(
        ScriptedPeer::new(p2)
            .with_addr(peer_addr(2))
            .respond(HEALTH_PROTOCOL, health(true))
            .respond(STORE_PROTOCOL, store_ok()),
    );
    transport.add_peer(
        ScriptedPeer::new(p3)
            .with_addr(peer_addr(3))
            .respond(HEALTH_PROTOCOL, health(true))
            .respond(STORE_PROTOCOL, store_ok()),
    );

    let config = NodeConfig {
        relays: vec![relay_addr],
        ..NodeConfig::default()
    };
    let node = started_node(Arc::clone(&transport), config).await;

    let receipt = node.store(b"ordered payload", "text/plain", None).await.unwrap();

    // P1 was discovered first but is unregistered; P2 is the first
    // registered candidate and must be attempted before it.
    assert_eq!(receipt.peer_id, p2);
    let store_streams: Vec<PeerId> = transport
        .opened_streams()
        .into_iter()
        .filter(|(_, protocol)| protocol == STORE_PROTOCOL)
        .map(|(peer_id, _)| peer_id)
        .collect();
    assert_eq!(store_streams, vec![p2]);
}

#[tokio::test]
async fn test_store_via_single_unregistered_peer() {
    let transport = Arc::new(MemoryTransport::new());
    let peer_id = test_peer_id(1);
    transport.add_connected_peer(ScriptedPeer::new(peer_id).respond(STORE_PROTOCOL, store_ok()));

    let node = started_node(Arc::clone(&transport), NodeConfig::default()).await;
    let payload = b"small payload";
    let receipt = node.store(payload, "text/plain", None).await.unwrap();

    assert_eq!(receipt.cid, ContentId::from_payload(payload));
    assert_eq!(receipt.peer_id, peer_id);
}

#[tokio::test]
async fn test_oversized_payload_never_touches_the_network() {
    let transport = Arc::new(MemoryTransport::new());
    let config = NodeConfig {
        max_payload: 1024,
        ..NodeConfig::default()
    };
    let node = started_node(Arc::clone(&transport), config).await;

    let err = node
        .store(&vec![0u8; 2048], "application/octet-stream", None)
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        NodeError::PayloadTooLarge { len: 2048, max: 1024 }
    ));
    assert!(transport.opened_streams().is_empty());
    assert!(transport.dialed_addrs().is_empty());
}

#[tokio::test]
async fn test_store_aggregates_every_candidate_failure() {
    let transport = Arc::new(MemoryTransport::new());
    let refusing = test_peer_id(1);
    let unsupported = test_peer_id(2);
    transport.add_connected_peer(
        ScriptedPeer::new(refusing)
            .respond(STORE_PROTOCOL, |_| json!({ "success": false, "error": "disk full" })),
    );
    // No STORE handler at all: the stream open is declined.
    transport.add_connected_peer(ScriptedPeer::new(unsupported));

    let node = started_node(Arc::clone(&transport), NodeConfig::default()).await;
    let err = node.store(b"payload", "text/plain", None).await.unwrap_err();

    match err {
        NodeError::AllStoresFailed { failures } => {
            assert_eq!(failures.len(), 2);
            assert!(failures.iter().any(|(_, e)| e.is_application()));
            assert!(failures.iter().any(|(_, e)| e.is_decline()));
        }
        other => panic!("expected AllStoresFailed, got {other:?}"),
    }
}

#[tokio::test]
async fn test_store_with_signer_attaches_authorization() {
    let transport = Arc::new(MemoryTransport::new());
    let peer_id = test_peer_id(1);
    let captured: Arc<Mutex<Option<Value>>> = Arc::new(Mutex::new(None));
    let capture = Arc::clone(&captured);
    transport.add_connected_peer(ScriptedPeer::new(peer_id).respond(
        STORE_PROTOCOL,
        move |request| {
            *capture.lock() = Some(request.clone());
            json!({ "success": true, "cid": request["cid"] })
        },
    ));

    let signer = alloy_signer_local::PrivateKeySigner::random();
    let sender = signer.address().to_string();
    let node = Arc::new(
        StorageNode::new(Arc::clone(&transport), NodeConfig::default())
            .with_signer(Arc::new(signer)),
    );
    node.start().await.unwrap();

    let payload = b"authorized payload";
    node.store(payload, "text/plain", None).await.unwrap();

    let request = captured.lock().clone().unwrap();
    let authorization = &request["authorization"];
    assert_eq!(authorization["sender"], json!(sender));
    assert_eq!(
        authorization["contentDigest"],
        json!(ContentId::from_payload(payload).to_string())
    );
    assert_eq!(request["sender"], json!(sender));
}

#[tokio::test]
async fn test_retrieve_distinguishes_no_peers_from_not_found() {
    let transport = Arc::new(MemoryTransport::new());
    let node = started_node(Arc::clone(&transport), NodeConfig::default()).await;
    let cid = ContentId::from_payload(b"absent");

    // No connected peers at all.
    assert!(matches!(
        node.retrieve(&cid).await.unwrap_err(),
        NodeError::NoPeers
    ));

    // Peers connected, but none holds the content.
    for seed in [1, 2] {
        transport.add_connected_peer(ScriptedPeer::new(test_peer_id(seed)).respond(
            HAVE_LIST_PROTOCOL,
            |_| json!({ "cids": [], "total": 0, "hasMore": false }),
        ));
    }
    assert!(matches!(
        node.retrieve(&cid).await.unwrap_err(),
        NodeError::NotFound { .. }
    ));
}

#[tokio::test]
async fn test_retrieve_targets_only_the_holding_peer() {
    let transport = Arc::new(MemoryTransport::new());
    let empty_peer = test_peer_id(1);
    let holder = test_peer_id(2);
    let payload = b"retrieved bytes";
    let cid = ContentId::from_payload(payload);
    let cid_string = cid.to_string();

    transport.add_connected_peer(ScriptedPeer::new(empty_peer).respond(
        HAVE_LIST_PROTOCOL,
        |_| json!({ "cids": [], "total": 0, "hasMore": false }),
    ));
    let have_cid = cid_string.clone();
    transport.add_connected_peer(
        ScriptedPeer::new(holder)
            .respond(HAVE_LIST_PROTOCOL, move |_| {
                json!({ "cids": [have_cid.clone()], "total": 1, "hasMore": false })
            })
            .respond(RETRIEVE_PROTOCOL, move |_| {
                json!({
                    "success": true,
                    "ciphertext": encode_base64_chunked(payload),
                    "mimeType": "text/plain",
                })
            }),
    );

    let node = started_node(Arc::clone(&transport), NodeConfig::default()).await;
    let content = node.retrieve(&cid).await.unwrap();

    assert_eq!(content.payload.as_ref(), payload);
    assert_eq!(content.mime_type.as_deref(), Some("text/plain"));
    let retrieve_streams: Vec<PeerId> = transport
        .opened_streams()
        .into_iter()
        .filter(|(_, protocol)| protocol == RETRIEVE_PROTOCOL)
        .map(|(peer_id, _)| peer_id)
        .collect();
    assert_eq!(retrieve_streams, vec![holder]);
}

#[tokio::test]
async fn test_relay_peers_are_never_storage_candidates() {
    let transport = Arc::new(MemoryTransport::new());
    let relay_id = test_peer_id(10);
    let relay_addr = relay_multiaddr(&relay_id);
    // The relay itself answers store requests, but must never be asked.
    transport.add_peer(
        ScriptedPeer::new(relay_id)
            .with_addr(relay_addr.clone())
            .respond(PEER_DIRECTORY_PROTOCOL, |_| json!({ "peers": [], "timestamp": 0 }))
            .respond(STORE_PROTOCOL, store_ok()),
    );

    let config = NodeConfig {
        relays: vec![relay_addr],
        ..NodeConfig::default()
    };
    let node = started_node(Arc::clone(&transport), config).await;

    assert!(matches!(
        node.store(b"payload", "text/plain", None).await.unwrap_err(),
        NodeError::NoPeers
    ));
}
