mod common;

use common::{connect, new_coordinator, MemoryRoomStore};

use codepair::models::ServerMessage;
use uuid::Uuid;

#[tokio::test]
async fn offer_and_answer_are_forwarded_with_caller_identity() {
    let store = MemoryRoomStore::new();
    let coordinator = new_coordinator(store);

    let mut a = connect(&coordinator, "alice").await;
    let mut b = connect(&coordinator, "bob").await;

    let offer = serde_json::json!({"type": "offer", "sdp": "v=0..."});
    coordinator
        .relay_call_offer(a.connection_id, b.connection_id, offer.clone())
        .await;

    match b.recv().await {
        ServerMessage::IncomingCall {
            from_connection_id,
            from,
            offer: forwarded,
        } => {
            assert_eq!(from_connection_id, a.connection_id);
            assert_eq!(from.user_id, "alice");
            assert_eq!(forwarded, offer);
        }
        other => panic!("expected incoming-call, got {:?}", other),
    }

    let answer = serde_json::json!({"type": "answer", "sdp": "v=0..."});
    coordinator
        .relay_call_answer(b.connection_id, a.connection_id, answer.clone())
        .await;

    match a.recv().await {
        ServerMessage::CallAccepted {
            from_connection_id,
            from,
            answer: forwarded,
        } => {
            assert_eq!(from_connection_id, b.connection_id);
            assert_eq!(from.user_id, "bob");
            assert_eq!(forwarded, answer);
        }
        other => panic!("expected call-accepted, got {:?}", other),
    }
}

#[tokio::test]
async fn reject_and_ice_are_forwarded() {
    let store = MemoryRoomStore::new();
    let coordinator = new_coordinator(store);

    let mut a = connect(&coordinator, "alice").await;
    let b = connect(&coordinator, "bob").await;

    coordinator
        .relay_call_reject(
            b.connection_id,
            a.connection_id,
            Some("busy".to_string()),
        )
        .await;
    match a.recv().await {
        ServerMessage::CallRejected {
            from_connection_id,
            reason,
        } => {
            assert_eq!(from_connection_id, b.connection_id);
            assert_eq!(reason.as_deref(), Some("busy"));
        }
        other => panic!("expected call-rejected, got {:?}", other),
    }

    let candidate = serde_json::json!({"candidate": "candidate:1 1 UDP ...", "sdpMid": "0"});
    coordinator
        .relay_ice_candidate(b.connection_id, a.connection_id, candidate.clone())
        .await;
    match a.recv().await {
        ServerMessage::IceCandidate {
            candidate: forwarded,
            from,
            ..
        } => {
            assert_eq!(forwarded, candidate);
            assert_eq!(from.user_id, "bob");
        }
        other => panic!("expected ice-candidate, got {:?}", other),
    }
}

#[tokio::test]
async fn messages_to_gone_targets_are_silently_dropped() {
    let store = MemoryRoomStore::new();
    let coordinator = new_coordinator(store);

    let a = connect(&coordinator, "alice").await;

    // Unknown target: nothing happens, nothing crashes.
    coordinator
        .relay_call_offer(
            a.connection_id,
            Uuid::new_v4(),
            serde_json::json!({"type": "offer"}),
        )
        .await;

    // Disconnected target: same silent drop.
    let b = connect(&coordinator, "bob").await;
    coordinator.disconnect(b.connection_id).await;
    coordinator
        .relay_ice_candidate(
            a.connection_id,
            b.connection_id,
            serde_json::json!({"candidate": "x"}),
        )
        .await;
}
