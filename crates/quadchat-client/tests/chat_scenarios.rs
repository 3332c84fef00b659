//! End-to-end chat scenarios against an in-process rendezvous broker.
//!
//! Each test spins up its own broker on an ephemeral port and drives real
//! engines over loopback TCP, observing only the public handle and event
//! surface.

use std::net::SocketAddr;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::time::timeout;

use quadchat_broker::config::BrokerConfig;
use quadchat_client::{
    spawn_chat, ChatConfig, ChatError, ChatEvent, ChatHandle, ErrorKind, MessageOrigin,
};
use quadchat_shared::types::ConnectionStatus;

const WAIT: Duration = Duration::from_secs(5);

async fn start_broker() -> SocketAddr {
    let config = BrokerConfig {
        listen_addr: ([127, 0, 0, 1], 0).into(),
        ..BrokerConfig::default()
    };
    let (addr, _handle) = quadchat_broker::spawn_broker(config)
        .await
        .expect("broker must bind an ephemeral port");
    addr
}

async fn start_peer(
    broker: SocketAddr,
    name: &str,
) -> (ChatHandle, broadcast::Receiver<ChatEvent>) {
    let handle = spawn_chat(ChatConfig::new(broker, name))
        .await
        .expect("engine must start against a live broker");
    let events = handle.subscribe();
    (handle, events)
}

/// Block until an event matching `pred` arrives, skipping the rest.
async fn wait_for<F>(rx: &mut broadcast::Receiver<ChatEvent>, mut pred: F) -> ChatEvent
where
    F: FnMut(&ChatEvent) -> bool,
{
    timeout(WAIT, async {
        loop {
            match rx.recv().await {
                Ok(event) if pred(&event) => return event,
                Ok(_) => {}
                Err(broadcast::error::RecvError::Lagged(_)) => {}
                Err(broadcast::error::RecvError::Closed) => {
                    panic!("event channel closed while waiting")
                }
            }
        }
    })
    .await
    .expect("timed out waiting for event")
}

// Scenario: Bob dials Alice, Bob's key becomes the shared session key, and
// a message from Alice reads back as plaintext at Bob.
#[tokio::test]
async fn test_dialer_key_wins_and_message_round_trips() {
    let broker = start_broker().await;
    let (alice, mut alice_events) = start_peer(broker, "Alice").await;
    let (bob, mut bob_events) = start_peer(broker, "Bob").await;

    bob.connect_to(alice.identity().as_str()).await.unwrap();
    wait_for(&mut bob_events, |e| {
        matches!(e, ChatEvent::PeerConnected { .. })
    })
    .await;
    // Alice adopting Bob's key means the handshake is complete end to end.
    wait_for(&mut alice_events, |e| {
        matches!(e, ChatEvent::SessionKeyAccepted { .. })
    })
    .await;

    alice.send_text("hello").await.unwrap();

    let event = wait_for(&mut bob_events, |e| {
        matches!(e, ChatEvent::MessageAppended { .. })
    })
    .await;
    let ChatEvent::MessageAppended { message } = event else {
        unreachable!()
    };
    assert_eq!(message.content, "hello");
    assert_eq!(message.sender_name, "Alice");
    assert_eq!(message.origin, MessageOrigin::Remote);

    let snapshot = bob.snapshot().await;
    assert_eq!(snapshot.connection_status, ConnectionStatus::Connected);
    assert_eq!(snapshot.messages.len(), 1);
    assert_eq!(snapshot.messages[0].content, "hello");
}

// Scenario: a 2048-byte notes.pdf lands in the receiver's catalog with a
// downloadable payload and a companion transcript message.
#[tokio::test]
async fn test_file_transfer_materializes_resource_and_notice() {
    let broker = start_broker().await;
    let (alice, mut alice_events) = start_peer(broker, "Alice").await;
    let (bob, mut bob_events) = start_peer(broker, "Bob").await;

    // Alice dials, so her key is the shared one and her companion message
    // decrypts at Bob.
    alice.connect_to(bob.identity().as_str()).await.unwrap();
    wait_for(&mut alice_events, |e| {
        matches!(e, ChatEvent::PeerConnected { .. })
    })
    .await;
    wait_for(&mut bob_events, |e| {
        matches!(e, ChatEvent::SessionKeyAccepted { .. })
    })
    .await;

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("notes.pdf");
    std::fs::write(&path, vec![0x42u8; 2048]).unwrap();

    let resource_id = alice.send_file(&path).await.unwrap();

    let event = wait_for(&mut bob_events, |e| {
        matches!(e, ChatEvent::ResourceAdded { .. })
    })
    .await;
    let ChatEvent::ResourceAdded {
        resource,
        sender_name,
    } = event
    else {
        unreachable!()
    };
    assert_eq!(resource.id, resource_id);
    assert_eq!(resource.name, "notes.pdf");
    assert_eq!(resource.mime, "application/pdf");
    assert_eq!(resource.size, 2048);
    assert_eq!(sender_name, "Alice");

    let event = wait_for(&mut bob_events, |e| {
        matches!(e, ChatEvent::MessageAppended { .. })
    })
    .await;
    let ChatEvent::MessageAppended { message } = event else {
        unreachable!()
    };
    let descriptor = message
        .resource
        .expect("companion message names the resource");
    assert_eq!(descriptor.id, resource_id);
    assert_eq!(descriptor.name, "notes.pdf");

    let payload = bob
        .resource_payload(&resource_id)
        .await
        .expect("payload materialized on the receiving side");
    assert_eq!(payload.len(), 2048);

    // The sender recorded both sides too.
    let snapshot = alice.snapshot().await;
    assert_eq!(snapshot.resources.len(), 1);
    assert_eq!(snapshot.messages.len(), 1);
}

// Scenario: with zero open links a send is rejected up front and the
// transcript stays empty.
#[tokio::test]
async fn test_send_with_no_peers_rejected() {
    let broker = start_broker().await;
    let (alice, _alice_events) = start_peer(broker, "Alice").await;

    let result = alice.send_text("into the void").await;
    assert!(matches!(result, Err(ChatError::NoPeersConnected)));

    let snapshot = alice.snapshot().await;
    assert!(snapshot.messages.is_empty());
    assert_eq!(snapshot.connection_status, ConnectionStatus::Disconnected);

    // The shell-facing JSON shape.
    let json = serde_json::to_value(&snapshot).unwrap();
    assert_eq!(json["connection_status"], "disconnected");
    assert_eq!(json["identity"], alice.identity().as_str());
    assert!(json["messages"].as_array().unwrap().is_empty());
    assert!(json["resources"].as_array().unwrap().is_empty());
    assert!(json["last_error"].is_null());
}

// Scenario: a hub connected to two peers keeps delivering to the survivor
// after one disconnects; each send appends exactly once per transcript.
#[tokio::test]
async fn test_broadcast_fans_out_and_survives_peer_loss() {
    let broker = start_broker().await;
    let (hub, mut hub_events) = start_peer(broker, "Hub").await;
    let (bob, mut bob_events) = start_peer(broker, "Bob").await;
    let (carol, mut carol_events) = start_peer(broker, "Carol").await;

    // The hub dials both, so everyone ends up on the hub's key.
    hub.connect_to(bob.identity().as_str()).await.unwrap();
    wait_for(&mut bob_events, |e| {
        matches!(e, ChatEvent::SessionKeyAccepted { .. })
    })
    .await;
    hub.connect_to(carol.identity().as_str()).await.unwrap();
    wait_for(&mut carol_events, |e| {
        matches!(e, ChatEvent::SessionKeyAccepted { .. })
    })
    .await;

    hub.send_text("to everyone").await.unwrap();

    for events in [&mut bob_events, &mut carol_events] {
        let event = wait_for(events, |e| matches!(e, ChatEvent::MessageAppended { .. })).await;
        let ChatEvent::MessageAppended { message } = event else {
            unreachable!()
        };
        assert_eq!(message.content, "to everyone");
    }
    // One broadcast, one local append.
    assert_eq!(hub.snapshot().await.messages.len(), 1);

    bob.shutdown().await;
    wait_for(&mut hub_events, |e| {
        matches!(e, ChatEvent::PeerDisconnected { .. })
    })
    .await;

    // Carol must still be reachable; the lost peer is not an error.
    hub.send_text("still here").await.unwrap();
    let event = wait_for(&mut carol_events, |e| {
        matches!(e, ChatEvent::MessageAppended { .. })
    })
    .await;
    let ChatEvent::MessageAppended { message } = event else {
        unreachable!()
    };
    assert_eq!(message.content, "still here");

    let snapshot = hub.snapshot().await;
    assert_eq!(snapshot.messages.len(), 2);
    assert_eq!(snapshot.connection_status, ConnectionStatus::Connected);
}

// A peer holding a superseded key produces an unreadable-payload error at
// the receiver, and nothing is appended as garbage.
#[tokio::test]
async fn test_stale_key_surfaces_unreadable_payload() {
    let broker = start_broker().await;
    let (hub, mut hub_events) = start_peer(broker, "Hub").await;
    let (bob, mut bob_events) = start_peer(broker, "Bob").await;
    let (carol, mut carol_events) = start_peer(broker, "Carol").await;

    // Bob dials first: the hub adopts Bob's key.
    bob.connect_to(hub.identity().as_str()).await.unwrap();
    wait_for(&mut hub_events, |e| {
        matches!(e, ChatEvent::SessionKeyAccepted { .. })
    })
    .await;
    wait_for(&mut bob_events, |e| {
        matches!(e, ChatEvent::PeerConnected { .. })
    })
    .await;

    // Carol dials next: her key replaces Bob's at the hub.
    carol.connect_to(hub.identity().as_str()).await.unwrap();
    wait_for(&mut hub_events, |e| {
        matches!(e, ChatEvent::SessionKeyAccepted { .. })
    })
    .await;
    wait_for(&mut carol_events, |e| {
        matches!(e, ChatEvent::PeerConnected { .. })
    })
    .await;

    // Bob still encrypts under his own key, which the hub no longer holds.
    bob.send_text("am I still readable?").await.unwrap();

    let event = wait_for(&mut hub_events, |e| matches!(e, ChatEvent::Error { .. })).await;
    let ChatEvent::Error { notice } = event else {
        unreachable!()
    };
    assert_eq!(notice.kind, ErrorKind::UnreadablePayload);

    let snapshot = hub.snapshot().await;
    assert!(snapshot.messages.is_empty());
    assert!(snapshot.last_error.is_some());
}

// Dialing an unregistered identity fails as a recoverable event, not a
// crash, and the status falls back to disconnected.
#[tokio::test]
async fn test_dial_unknown_identity_reports_error() {
    let broker = start_broker().await;
    let (alice, mut alice_events) = start_peer(broker, "Alice").await;

    alice.connect_to("ghost-000000").await.unwrap();

    let event = wait_for(&mut alice_events, |e| matches!(e, ChatEvent::Error { .. })).await;
    let ChatEvent::Error { notice } = event else {
        unreachable!()
    };
    assert_eq!(notice.kind, ErrorKind::DialFailed);

    let snapshot = alice.snapshot().await;
    assert_eq!(snapshot.connection_status, ConnectionStatus::Disconnected);
}

// Clearing the transcript drops messages but keeps shared resources.
#[tokio::test]
async fn test_clear_transcript_leaves_resources_intact() {
    let broker = start_broker().await;
    let (alice, mut alice_events) = start_peer(broker, "Alice").await;
    let (bob, mut bob_events) = start_peer(broker, "Bob").await;

    alice.connect_to(bob.identity().as_str()).await.unwrap();
    wait_for(&mut alice_events, |e| {
        matches!(e, ChatEvent::PeerConnected { .. })
    })
    .await;
    wait_for(&mut bob_events, |e| {
        matches!(e, ChatEvent::SessionKeyAccepted { .. })
    })
    .await;

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("syllabus.txt");
    std::fs::write(&path, b"week one: introductions").unwrap();
    alice.send_file(&path).await.unwrap();
    alice.send_text("see the attached syllabus").await.unwrap();

    let before = alice.snapshot().await;
    assert_eq!(before.messages.len(), 2);
    assert_eq!(before.resources.len(), 1);

    alice.clear_transcript().await;
    wait_for(&mut alice_events, |e| {
        matches!(e, ChatEvent::TranscriptCleared)
    })
    .await;

    let after = alice.snapshot().await;
    assert!(after.messages.is_empty());
    assert_eq!(after.resources.len(), 1);
    assert_eq!(after.resources[0].name, "syllabus.txt");
}
