mod common;

use std::time::Duration;

use common::{connect, new_coordinator, settle, MemoryRoomStore};

use codepair::models::{CursorPosition, ServerMessage};

#[tokio::test]
async fn stale_cursors_are_evicted_and_broadcast() {
    let store = MemoryRoomStore::new();
    let coordinator = new_coordinator(store);

    let mut a = connect(&coordinator, "alice").await;
    let mut b = connect(&coordinator, "bob").await;
    coordinator.join(a.connection_id, "r1").await.unwrap();
    coordinator.join(b.connection_id, "r1").await.unwrap();
    settle().await;
    a.drain();
    b.drain();

    coordinator
        .handle_cursor_update(
            a.connection_id,
            "r1",
            CursorPosition { line: 1, column: 1 },
            None,
        )
        .await;
    b.drain();

    // With a zero staleness budget every entry is overdue by the time the
    // sweep runs.
    let evicted = coordinator.sweep_stale_cursors(Duration::ZERO).await;
    assert_eq!(evicted, 1);

    for peer in [&mut a, &mut b] {
        match peer.recv().await {
            ServerMessage::CursorRemoved { user_id, room_id } => {
                assert_eq!(user_id, "alice");
                assert_eq!(room_id, "r1");
            }
            other => panic!("expected cursor-removed, got {:?}", other),
        }
    }
}

#[tokio::test]
async fn fresh_cursors_survive_a_sweep() {
    let store = MemoryRoomStore::new();
    let coordinator = new_coordinator(store);

    let a = connect(&coordinator, "alice").await;
    let mut b = connect(&coordinator, "bob").await;
    coordinator.join(a.connection_id, "r1").await.unwrap();
    coordinator.join(b.connection_id, "r1").await.unwrap();
    settle().await;
    b.drain();

    coordinator
        .handle_cursor_update(
            a.connection_id,
            "r1",
            CursorPosition { line: 5, column: 0 },
            None,
        )
        .await;
    b.drain();

    let evicted = coordinator
        .sweep_stale_cursors(Duration::from_secs(30))
        .await;
    assert_eq!(evicted, 0);
    assert!(b.drain().is_empty());
}

#[tokio::test]
async fn sweep_runs_repeatedly_without_rooms() {
    let store = MemoryRoomStore::new();
    let coordinator = new_coordinator(store);

    assert_eq!(coordinator.sweep_stale_cursors(Duration::ZERO).await, 0);
    assert_eq!(coordinator.sweep_stale_cursors(Duration::ZERO).await, 0);
}

#[tokio::test]
async fn departing_user_takes_their_cursor_along() {
    let store = MemoryRoomStore::new();
    let coordinator = new_coordinator(store);

    let a = connect(&coordinator, "alice").await;
    let b = connect(&coordinator, "bob").await;
    coordinator.join(a.connection_id, "r1").await.unwrap();
    coordinator.join(b.connection_id, "r1").await.unwrap();

    coordinator
        .handle_cursor_update(
            a.connection_id,
            "r1",
            CursorPosition { line: 2, column: 2 },
            None,
        )
        .await;
    coordinator.leave(a.connection_id, "r1").await;

    // Nothing left for the sweep to evict.
    assert_eq!(coordinator.sweep_stale_cursors(Duration::ZERO).await, 0);
}
