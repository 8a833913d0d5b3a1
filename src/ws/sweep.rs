use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use crate::models::messages::ServerMessage;
use crate::ws::rooms::RoomCoordinator;

impl RoomCoordinator {
    /// Evict every cursor whose owner has not moved it within
    /// `stale_after`, broadcasting a removal per eviction so clients drop
    /// the stale remote cursor. Returns the number of evictions.
    pub async fn sweep_stale_cursors(&self, stale_after: Duration) -> usize {
        self.with_rooms_mut(|rooms| {
            let mut evicted = 0;
            for (room_id, live) in rooms.iter_mut() {
                let stale: Vec<String> = live
                    .cursors
                    .iter()
                    .filter(|(_, cursor)| cursor.last_seen.elapsed() > stale_after)
                    .map(|(user_id, _)| user_id.clone())
                    .collect();
                for user_id in stale {
                    live.cursors.remove(&user_id);
                    let message = ServerMessage::CursorRemoved {
                        room_id: room_id.clone(),
                        user_id: user_id.clone(),
                    };
                    live.broadcast(None, &message);
                    debug!("Evicted stale cursor of user {} in room '{}'", user_id, room_id);
                    evicted += 1;
                }
            }
            evicted
        })
        .await
    }
}

/// Spawn the periodic cursor staleness sweep
pub fn spawn_cursor_sweep(
    coordinator: Arc<RoomCoordinator>,
    interval: Duration,
    stale_after: Duration,
) -> JoinHandle<()> {
    info!(
        "Cursor sweep running every {:?}, evicting cursors idle for {:?}",
        interval, stale_after
    );
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let evicted = coordinator.sweep_stale_cursors(stale_after).await;
            if evicted > 0 {
                debug!("Cursor sweep evicted {} stale entries", evicted);
            }
        }
    })
}
