use std::collections::HashMap;
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, info};

use crate::models::messages::ServerMessage;
use crate::models::room::{ConnectionId, DisplayIdentity, Participant};

/// One live, authenticated transport connection.
///
/// Created on successful authentication at connect time and destroyed on
/// disconnect. Owned exclusively by the registry; other components read it
/// through `lookup` and never mutate it directly.
#[derive(Clone, Debug)]
pub struct ConnectionSession {
    pub connection_id: ConnectionId,
    pub user_id: String,
    pub display_identity: DisplayIdentity,
    /// The room this connection currently occupies, if any. A connection is
    /// a member of at most one room at a time.
    pub room_id: Option<String>,
    sender: mpsc::UnboundedSender<ServerMessage>,
}

impl ConnectionSession {
    pub fn participant(&self) -> Participant {
        Participant {
            connection_id: self.connection_id,
            user_id: self.user_id.clone(),
            name: self.display_identity.name.clone(),
            email: self.display_identity.email.clone(),
        }
    }

    pub(crate) fn sender(&self) -> &mpsc::UnboundedSender<ServerMessage> {
        &self.sender
    }
}

/// Maps transport-level connection ids to verified sessions and routes
/// outbound messages to them.
pub struct ConnectionRegistry {
    connections: RwLock<HashMap<ConnectionId, ConnectionSession>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
        }
    }

    pub async fn register(
        &self,
        connection_id: ConnectionId,
        user_id: String,
        display_identity: DisplayIdentity,
        sender: mpsc::UnboundedSender<ServerMessage>,
    ) {
        let session = ConnectionSession {
            connection_id,
            user_id,
            display_identity,
            room_id: None,
            sender,
        };
        let mut connections = self.connections.write().await;
        connections.insert(connection_id, session);
        info!("Registered connection {} ({} total)", connection_id, connections.len());
    }

    /// Remove a connection, returning its last session so the caller can
    /// run implicit room departure.
    pub async fn unregister(&self, connection_id: ConnectionId) -> Option<ConnectionSession> {
        let mut connections = self.connections.write().await;
        let session = connections.remove(&connection_id);
        if session.is_some() {
            info!("Unregistered connection {} ({} total)", connection_id, connections.len());
        }
        session
    }

    pub async fn lookup(&self, connection_id: ConnectionId) -> Option<ConnectionSession> {
        self.connections.read().await.get(&connection_id).cloned()
    }

    pub async fn set_room(&self, connection_id: ConnectionId, room_id: Option<String>) {
        let mut connections = self.connections.write().await;
        if let Some(session) = connections.get_mut(&connection_id) {
            session.room_id = room_id;
        }
    }

    /// Forward a message to one connection. A missing target or a closed
    /// channel is a silent drop: the sender will independently learn of the
    /// departure via the room's participant-left broadcast.
    pub async fn send_to(&self, connection_id: ConnectionId, message: ServerMessage) {
        let connections = self.connections.read().await;
        match connections.get(&connection_id) {
            Some(session) => {
                if session.sender.send(message).is_err() {
                    debug!("Dropped message for closing connection {}", connection_id);
                }
            }
            None => {
                debug!("Dropped message for unknown connection {}", connection_id);
            }
        }
    }

    pub async fn connection_count(&self) -> usize {
        self.connections.read().await.len()
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
