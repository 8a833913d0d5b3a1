use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, Mutex, RwLock};
use tracing::{error, info, warn};

use crate::db::RoomStore;
use crate::models::messages::ServerMessage;
use crate::models::room::{
    CompilationEntry, CompileMarker, ConnectionId, CursorPosition, CursorSelection,
    DisplayIdentity, Language, Participant, RemoteCursor, RoomRecord, RoomRejection, RoomSnapshot,
};
use crate::ws::registry::ConnectionRegistry;

/// Compile runs remembered per room
pub(crate) const COMPILE_HISTORY_CAP: usize = 10;

/// A remote cursor with its freshness stamp
#[derive(Clone, Debug)]
pub struct CursorPresence {
    pub position: CursorPosition,
    pub selection: Option<CursorSelection>,
    pub display_identity: DisplayIdentity,
    pub last_seen: Instant,
}

/// One connection currently counted against room capacity
pub(crate) struct RoomMember {
    pub user_id: String,
    pub display_identity: DisplayIdentity,
    pub sender: mpsc::UnboundedSender<ServerMessage>,
}

impl RoomMember {
    pub fn participant(&self, connection_id: ConnectionId) -> Participant {
        Participant {
            connection_id,
            user_id: self.user_id.clone(),
            name: self.display_identity.name.clone(),
            email: self.display_identity.email.clone(),
        }
    }
}

/// Ephemeral per-room shared state.
///
/// Exists exactly as long as the room has at least one active connection:
/// created when the first connection is admitted, destroyed the moment the
/// last one leaves. A rejoin after a drain sees a fresh empty document, not
/// leftover data.
pub(crate) struct RoomLiveState {
    pub record: RoomRecord,
    pub code: String,
    pub language: Language,
    pub program_input: String,
    pub compile_in_flight: Option<CompileMarker>,
    pub last_compilation: Option<CompilationEntry>,
    pub compile_history: Vec<CompilationEntry>,
    pub members: HashMap<ConnectionId, RoomMember>,
    pub cursors: HashMap<String, CursorPresence>,
}

impl RoomLiveState {
    fn new(record: RoomRecord) -> Self {
        Self {
            record,
            code: String::new(),
            language: Language::default(),
            program_input: String::new(),
            compile_in_flight: None,
            last_compilation: None,
            compile_history: Vec::new(),
            members: HashMap::new(),
            cursors: HashMap::new(),
        }
    }

    /// Push queued fan-out to every member, optionally excluding one
    /// connection. Sends are synchronous channel pushes; the per-connection
    /// socket task drains them in order.
    pub fn broadcast(&self, exclude: Option<ConnectionId>, message: &ServerMessage) {
        for (connection_id, member) in &self.members {
            if Some(*connection_id) == exclude {
                continue;
            }
            // A member with a closed channel is on its way out; its
            // departure cleanup handles the rest.
            let _ = member.sender.send(message.clone());
        }
    }

    /// Consistent view handed to a joining connection
    pub fn snapshot_for(&self, connection_id: ConnectionId) -> RoomSnapshot {
        let participants = self
            .members
            .iter()
            .filter(|(id, _)| **id != connection_id)
            .map(|(id, member)| member.participant(*id))
            .collect();
        let cursors = self
            .cursors
            .iter()
            .map(|(user_id, cursor)| RemoteCursor {
                user_id: user_id.clone(),
                name: cursor.display_identity.name.clone(),
                position: cursor.position,
                selection: cursor.selection,
            })
            .collect();
        RoomSnapshot {
            room: self.record.clone(),
            participants,
            code: self.code.clone(),
            language: self.language,
            program_input: self.program_input.clone(),
            compile_in_flight: self.compile_in_flight.clone(),
            last_compilation: self.last_compilation.clone(),
            compile_history: self.compile_history.clone(),
            cursors,
        }
    }
}

/// Counters reported by the diagnostics endpoint
pub struct CoordinatorStats {
    pub connections: usize,
    pub rooms: usize,
    pub room_connections: usize,
    pub cursors: usize,
}

/// The realtime coordination core: connection registry, room admission and
/// departure, live shared state, and fan-out.
///
/// Constructed once at process start and handed around as an `Arc`; all
/// shared maps live behind `tokio::sync` locks and no write guard is ever
/// held across an await. The only suspension on the admission path (the
/// durable record fetch/create) runs under a per-room join lock so two
/// concurrent joiners can never both observe a free slot.
pub struct RoomCoordinator {
    registry: ConnectionRegistry,
    rooms: RwLock<HashMap<String, RoomLiveState>>,
    join_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
    store: Arc<dyn RoomStore>,
    notify_delay: Duration,
}

enum Departure {
    Announced,
    Drained,
}

impl RoomCoordinator {
    pub fn new(store: Arc<dyn RoomStore>, notify_delay: Duration) -> Self {
        Self {
            registry: ConnectionRegistry::new(),
            rooms: RwLock::new(HashMap::new()),
            join_locks: Mutex::new(HashMap::new()),
            store,
            notify_delay,
        }
    }

    pub fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    pub(crate) fn store(&self) -> &Arc<dyn RoomStore> {
        &self.store
    }

    pub(crate) async fn with_rooms_mut<R>(
        &self,
        f: impl FnOnce(&mut HashMap<String, RoomLiveState>) -> R,
    ) -> R {
        let mut rooms = self.rooms.write().await;
        f(&mut rooms)
    }

    /// Admit a connection into a room.
    ///
    /// Returns a consistent snapshot on success, or a definitive rejection
    /// (`INVALID_ROOM`, `ROOM_FULL`, `JOIN_ERROR`) that is reported to the
    /// requesting connection only. Remaining room members learn about the
    /// new participant shortly after the joiner has its snapshot.
    pub async fn join(
        self: &Arc<Self>,
        connection_id: ConnectionId,
        room_id_raw: &str,
    ) -> Result<RoomSnapshot, RoomRejection> {
        let room_id = room_id_raw.trim();
        if room_id.is_empty() {
            warn!("Rejecting join with empty room id from connection {}", connection_id);
            return Err(RoomRejection::invalid_room());
        }

        let session = match self.registry.lookup(connection_id).await {
            Some(session) => session,
            None => return Err(RoomRejection::join_error("connection is not registered")),
        };

        // Already in this exact room: hand back the current snapshot
        // without re-running admission.
        if session.room_id.as_deref() == Some(room_id) {
            let rooms = self.rooms.read().await;
            if let Some(live) = rooms.get(room_id) {
                if live.members.contains_key(&connection_id) {
                    info!(
                        "Connection {} rejoined room '{}' in place",
                        connection_id, room_id
                    );
                    return Ok(live.snapshot_for(connection_id));
                }
            }
        }

        // A connection occupies at most one room; depart the old one first.
        if let Some(previous) = session.room_id.as_deref() {
            if previous != room_id {
                info!(
                    "Connection {} switching rooms '{}' -> '{}'",
                    connection_id, previous, room_id
                );
                self.leave(connection_id, previous).await;
            }
        }

        // Serialize with any other in-flight join for this room id.
        let join_lock = self.join_lock(room_id).await;
        let _guard = join_lock.lock().await;

        // Fetch or lazily create the durable room record. This is the one
        // suspension point of admission; the join lock covers it.
        let mut record = match self.store.find_room(room_id).await {
            Ok(Some(record)) => record,
            Ok(None) => match self.store.create_room(room_id, &session.user_id).await {
                Ok(record) => record,
                Err(e) => {
                    error!("Failed to create room '{}': {}", room_id, e);
                    return Err(RoomRejection::join_error(e));
                }
            },
            Err(e) => {
                error!("Failed to load room '{}': {}", room_id, e);
                return Err(RoomRejection::join_error(e));
            }
        };

        // Capacity gate. Prior participants, the creator, and users who
        // already hold a live connection here are always re-admitted.
        {
            let rooms = self.rooms.read().await;
            let live = rooms.get(room_id);
            let occupancy = live.map_or(0, |l| l.members.len());
            let already_active =
                live.is_some_and(|l| l.members.values().any(|m| m.user_id == session.user_id));
            let privileged = already_active
                || record.created_by == session.user_id
                || record.participant_user_ids.iter().any(|u| u == &session.user_id);
            if !privileged && occupancy >= record.capacity as usize {
                info!(
                    "Room '{}' full ({}/{}), rejecting user {}",
                    room_id, occupancy, record.capacity, session.user_id
                );
                return Err(RoomRejection::room_full(occupancy, record.capacity));
            }
        }

        // Persist durable membership before mutating live state so a
        // storage failure leaves nothing half-admitted.
        if !record.participant_user_ids.iter().any(|u| u == &session.user_id) {
            if let Err(e) = self.store.append_participant(room_id, &session.user_id).await {
                error!(
                    "Failed to append participant {} to room '{}': {}",
                    session.user_id, room_id, e
                );
                return Err(RoomRejection::join_error(e));
            }
            record.participant_user_ids.push(session.user_id.clone());
        }

        // Admit: create live state on first entry, insert the member, and
        // take the snapshot in a single critical section.
        let snapshot = {
            let mut rooms = self.rooms.write().await;
            let live = rooms.entry(room_id.to_string()).or_insert_with(|| {
                info!("Room '{}' live state created", room_id);
                RoomLiveState::new(record.clone())
            });
            live.record = record;
            live.members.insert(
                connection_id,
                RoomMember {
                    user_id: session.user_id.clone(),
                    display_identity: session.display_identity.clone(),
                    sender: session.sender().clone(),
                },
            );
            live.snapshot_for(connection_id)
        };
        self.registry.set_room(connection_id, Some(room_id.to_string())).await;

        // The storage call above was a suspension point; the connection may
        // have dropped while we were away. Its disconnect cleanup may have
        // run before our insert, so undo the admission instead of leaving a
        // zombie member behind.
        if self.registry.lookup(connection_id).await.is_none() {
            warn!(
                "Connection {} closed during admission to '{}', rolling back",
                connection_id, room_id
            );
            self.leave(connection_id, room_id).await;
            return Err(RoomRejection::join_error("connection closed during join"));
        }

        info!(
            "Connection {} (user {}) admitted to room '{}'",
            connection_id, session.user_id, room_id
        );

        // Tell the rest of the room after a short pause. The joiner's
        // snapshot is already queued, so peers never start signaling at a
        // client that hasn't finished its own setup.
        let coordinator = Arc::clone(self);
        let participant = Participant {
            connection_id,
            user_id: session.user_id.clone(),
            name: session.display_identity.name.clone(),
            email: session.display_identity.email.clone(),
        };
        let room = room_id.to_string();
        let delay = self.notify_delay;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            coordinator.notify_participant_joined(&room, participant).await;
        });

        Ok(snapshot)
    }

    /// Remove a connection from a room.
    ///
    /// Idempotent: a connection that is not a member of the room is a
    /// no-op, so disconnect cleanup and an explicit leave-room can race
    /// without a duplicate participant-left broadcast. Leaving never
    /// shrinks the durable participant set.
    pub async fn leave(&self, connection_id: ConnectionId, room_id: &str) {
        let departure = {
            let mut rooms = self.rooms.write().await;
            let Some(live) = rooms.get_mut(room_id) else {
                return;
            };
            let Some(member) = live.members.remove(&connection_id) else {
                return;
            };

            // Keep the cursor if the same user still has another live
            // connection in the room.
            let user_still_active = live.members.values().any(|m| m.user_id == member.user_id);
            if !user_still_active {
                live.cursors.remove(&member.user_id);
            }

            if live.members.is_empty() {
                rooms.remove(room_id);
                info!("Room '{}' drained, live state destroyed", room_id);
                Departure::Drained
            } else {
                let message = ServerMessage::ParticipantLeft {
                    room_id: room_id.to_string(),
                    participant: member.participant(connection_id),
                };
                live.broadcast(None, &message);
                info!(
                    "Connection {} left room '{}' ({} remaining)",
                    connection_id,
                    room_id,
                    live.members.len()
                );
                Departure::Announced
            }
        };

        self.registry.set_room(connection_id, None).await;

        if matches!(departure, Departure::Drained) {
            self.drop_join_lock(room_id).await;

            // Best-effort ended_at stamp; a storage hiccup never blocks the
            // in-memory teardown that already happened.
            let store = Arc::clone(&self.store);
            let room = room_id.to_string();
            tokio::spawn(async move {
                if let Err(e) = store.end_room(&room).await {
                    warn!("Failed to mark room '{}' ended: {}", room, e);
                }
            });
        }
    }

    /// Unconditional cleanup for a closed transport. Does not depend on any
    /// client acknowledgement and is safe to run after an explicit leave.
    pub async fn disconnect(&self, connection_id: ConnectionId) {
        let Some(session) = self.registry.unregister(connection_id).await else {
            return;
        };
        if let Some(room_id) = session.room_id {
            self.leave(connection_id, &room_id).await;
        }
    }

    pub(crate) async fn notify_participant_joined(&self, room_id: &str, participant: Participant) {
        let rooms = self.rooms.read().await;
        // The joiner may already be gone again; nothing to announce then.
        let Some(live) = rooms.get(room_id) else {
            return;
        };
        if !live.members.contains_key(&participant.connection_id) {
            return;
        }
        let message = ServerMessage::ParticipantJoined {
            room_id: room_id.to_string(),
            participant: participant.clone(),
        };
        live.broadcast(Some(participant.connection_id), &message);
    }

    /// Look up the session and confirm it is a member of the room an event
    /// names. Events for rooms the sender is not in are dropped.
    pub(crate) async fn session_in_room(
        &self,
        connection_id: ConnectionId,
        room_id: &str,
    ) -> Option<crate::ws::registry::ConnectionSession> {
        let session = self.registry.lookup(connection_id).await?;
        if session.room_id.as_deref() != Some(room_id) {
            warn!(
                "Dropping event from connection {} for room '{}' it is not in",
                connection_id, room_id
            );
            return None;
        }
        Some(session)
    }

    pub async fn stats(&self) -> CoordinatorStats {
        let connections = self.registry.connection_count().await;
        let rooms = self.rooms.read().await;
        let room_connections = rooms.values().map(|l| l.members.len()).sum();
        let cursors = rooms.values().map(|l| l.cursors.len()).sum();
        CoordinatorStats {
            connections,
            rooms: rooms.len(),
            room_connections,
            cursors,
        }
    }

    async fn join_lock(&self, room_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.join_locks.lock().await;
        locks
            .entry(room_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Forget the join lock for a drained room, unless an admission is
    /// still holding it.
    async fn drop_join_lock(&self, room_id: &str) {
        let mut locks = self.join_locks.lock().await;
        let unused = locks
            .get(room_id)
            .is_some_and(|lock| Arc::strong_count(lock) == 1);
        if unused {
            locks.remove(room_id);
        }
    }
}
