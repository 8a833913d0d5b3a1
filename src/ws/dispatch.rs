use chrono::Utc;
use std::sync::Arc;
use std::time::Instant;
use tracing::warn;

use crate::models::messages::ServerMessage;
use crate::models::room::{
    CompilationEntry, CompileMarker, ConnectionId, CursorPosition, CursorSelection, Language,
};
use crate::ws::rooms::{CursorPresence, RoomCoordinator, COMPILE_HISTORY_CAP};

/// Per-event handlers of the broadcast dispatcher.
///
/// Every handler follows the same shape: validate, mutate the shared
/// document, fan out — with mutation and fan-out inside one critical
/// section so per-room delivery order matches the order the server handled
/// the events in. Durable mirrors run on spawned tasks afterwards and can
/// fail without affecting anyone's live view.
impl RoomCoordinator {
    /// Overwrite the shared code (last write wins) and tell the other
    /// connections about it.
    pub async fn handle_code_update(
        &self,
        connection_id: ConnectionId,
        room_id: &str,
        code: String,
        language: Language,
    ) {
        let Some(session) = self.session_in_room(connection_id, room_id).await else {
            return;
        };

        let mirror = self
            .with_rooms_mut(|rooms| {
                let live = rooms.get_mut(room_id)?;
                live.code = code.clone();
                live.language = language;
                let message = ServerMessage::CodeUpdate {
                    room_id: room_id.to_string(),
                    code,
                    language,
                    from: session.participant(),
                };
                live.broadcast(Some(connection_id), &message);
                Some((live.code.clone(), live.language, live.program_input.clone()))
            })
            .await;

        if let Some((code, language, input)) = mirror {
            self.spawn_activity_mirror(room_id, code, language, input);
        }
    }

    /// Upsert the sender's cursor and fan it out to everyone else. The
    /// sender never receives an echo of its own cursor.
    pub async fn handle_cursor_update(
        &self,
        connection_id: ConnectionId,
        room_id: &str,
        position: CursorPosition,
        selection: Option<CursorSelection>,
    ) {
        let Some(session) = self.session_in_room(connection_id, room_id).await else {
            return;
        };

        // A garbage position is harmless staleness, not a client error
        // worth surfacing; drop it and move on.
        if !position.is_valid() || selection.as_ref().is_some_and(|s| !s.is_valid()) {
            warn!(
                "Dropping cursor update with invalid coordinates from user {}",
                session.user_id
            );
            return;
        }

        self.with_rooms_mut(|rooms| {
            let Some(live) = rooms.get_mut(room_id) else {
                return;
            };
            live.cursors.insert(
                session.user_id.clone(),
                CursorPresence {
                    position,
                    selection,
                    display_identity: session.display_identity.clone(),
                    last_seen: Instant::now(),
                },
            );
            let message = ServerMessage::CursorUpdate {
                room_id: room_id.to_string(),
                position,
                selection,
                from: session.participant(),
            };
            live.broadcast(Some(connection_id), &message);
        })
        .await;
    }

    /// Overwrite the shared program stdin (last write wins)
    pub async fn handle_input_update(
        &self,
        connection_id: ConnectionId,
        room_id: &str,
        input: String,
    ) {
        let Some(session) = self.session_in_room(connection_id, room_id).await else {
            return;
        };

        let mirror = self
            .with_rooms_mut(|rooms| {
                let live = rooms.get_mut(room_id)?;
                live.program_input = input.clone();
                let message = ServerMessage::InputUpdate {
                    room_id: room_id.to_string(),
                    input,
                    from: session.participant(),
                };
                live.broadcast(Some(connection_id), &message);
                Some((live.code.clone(), live.language, live.program_input.clone()))
            })
            .await;

        if let Some((code, language, input)) = mirror {
            self.spawn_activity_mirror(room_id, code, language, input);
        }
    }

    /// Mark the room-wide "compiling…" indicator. Every connection —
    /// including the one that triggered it — sees the same marker. The
    /// actual compiler invocation is the triggering client's business;
    /// this core only coordinates state.
    pub async fn handle_compile_start(&self, connection_id: ConnectionId, room_id: &str) {
        let Some(session) = self.session_in_room(connection_id, room_id).await else {
            return;
        };

        self.with_rooms_mut(|rooms| {
            let Some(live) = rooms.get_mut(room_id) else {
                return;
            };
            let marker = CompileMarker {
                started_by: session.user_id.clone(),
                started_by_name: session.display_identity.name.clone(),
            };
            live.compile_in_flight = Some(marker.clone());
            let message = ServerMessage::CompileStart {
                room_id: room_id.to_string(),
                started_by: marker,
            };
            live.broadcast(None, &message);
        })
        .await;
    }

    /// Record a finished compile run and fan the identical result out to
    /// every connection, clearing the in-flight marker.
    pub async fn handle_compile_result(
        &self,
        connection_id: ConnectionId,
        room_id: &str,
        result: Option<serde_json::Value>,
        error: Option<String>,
    ) {
        let Some(session) = self.session_in_room(connection_id, room_id).await else {
            return;
        };

        let entry = CompilationEntry {
            result,
            error,
            triggered_by: session.user_id.clone(),
            triggered_by_name: session.display_identity.name.clone(),
            finished_at: Utc::now(),
        };

        let recorded = self
            .with_rooms_mut(|rooms| {
                let live = rooms.get_mut(room_id)?;
                live.compile_in_flight = None;
                live.last_compilation = Some(entry.clone());
                if live.compile_history.len() >= COMPILE_HISTORY_CAP {
                    live.compile_history.remove(0);
                }
                live.compile_history.push(entry.clone());
                let message = ServerMessage::CompileResult {
                    room_id: room_id.to_string(),
                    entry: entry.clone(),
                };
                live.broadcast(None, &message);
                Some(())
            })
            .await;

        if recorded.is_some() {
            let store = Arc::clone(self.store());
            let room = room_id.to_string();
            tokio::spawn(async move {
                if let Err(e) = store.append_compilation(&room, &entry).await {
                    warn!("Failed to mirror compilation for room '{}': {}", room, e);
                }
            });
        }
    }

    /// Fan a chat message out to the other room members and append it to
    /// the durable log.
    pub async fn handle_chat_message(
        &self,
        connection_id: ConnectionId,
        room_id: &str,
        content: String,
    ) {
        let Some(session) = self.session_in_room(connection_id, room_id).await else {
            return;
        };

        let delivered = self
            .with_rooms_mut(|rooms| {
                let live = rooms.get_mut(room_id)?;
                let message = ServerMessage::ChatMessage {
                    room_id: room_id.to_string(),
                    content: content.clone(),
                    from: session.participant(),
                    sent_at: Utc::now(),
                };
                live.broadcast(Some(connection_id), &message);
                Some(())
            })
            .await;

        if delivered.is_some() {
            let store = Arc::clone(self.store());
            let room = room_id.to_string();
            let user_id = session.user_id.clone();
            tokio::spawn(async move {
                if let Err(e) = store.append_chat(&room, &user_id, &content).await {
                    warn!("Failed to persist chat message for room '{}': {}", room, e);
                }
            });
        }
    }

    fn spawn_activity_mirror(
        &self,
        room_id: &str,
        code: String,
        language: Language,
        input: String,
    ) {
        let store = Arc::clone(self.store());
        let room = room_id.to_string();
        tokio::spawn(async move {
            if let Err(e) = store.mirror_activity(&room, &code, language, &input).await {
                warn!("Failed to mirror activity for room '{}': {}", room, e);
            }
        });
    }
}
