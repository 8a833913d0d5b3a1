use tracing::debug;

use crate::models::messages::ServerMessage;
use crate::models::room::ConnectionId;
use crate::ws::rooms::RoomCoordinator;

/// Call-setup relay: directed forwarding of WebRTC signaling payloads
/// between two connections. Payloads pass through unchanged — media never
/// touches this server. No state is kept here; routing happens over the
/// connection registry, and a message to a connection that is gone is
/// silently dropped (the caller learns of the departure through the room's
/// participant-left broadcast instead).
impl RoomCoordinator {
    pub async fn relay_call_offer(
        &self,
        from_connection: ConnectionId,
        target: ConnectionId,
        offer: serde_json::Value,
    ) {
        let Some(session) = self.registry().lookup(from_connection).await else {
            return;
        };
        debug!("Relaying call offer {} -> {}", from_connection, target);
        self.registry()
            .send_to(
                target,
                ServerMessage::IncomingCall {
                    from_connection_id: from_connection,
                    from: session.participant(),
                    offer,
                },
            )
            .await;
    }

    pub async fn relay_call_answer(
        &self,
        from_connection: ConnectionId,
        target: ConnectionId,
        answer: serde_json::Value,
    ) {
        let Some(session) = self.registry().lookup(from_connection).await else {
            return;
        };
        debug!("Relaying call answer {} -> {}", from_connection, target);
        self.registry()
            .send_to(
                target,
                ServerMessage::CallAccepted {
                    from_connection_id: from_connection,
                    from: session.participant(),
                    answer,
                },
            )
            .await;
    }

    pub async fn relay_call_reject(
        &self,
        from_connection: ConnectionId,
        target: ConnectionId,
        reason: Option<String>,
    ) {
        if self.registry().lookup(from_connection).await.is_none() {
            return;
        }
        debug!("Relaying call reject {} -> {}", from_connection, target);
        self.registry()
            .send_to(
                target,
                ServerMessage::CallRejected {
                    from_connection_id: from_connection,
                    reason,
                },
            )
            .await;
    }

    pub async fn relay_ice_candidate(
        &self,
        from_connection: ConnectionId,
        target: ConnectionId,
        candidate: serde_json::Value,
    ) {
        let Some(session) = self.registry().lookup(from_connection).await else {
            return;
        };
        self.registry()
            .send_to(
                target,
                ServerMessage::IceCandidate {
                    from_connection_id: from_connection,
                    from: session.participant(),
                    candidate,
                },
            )
            .await;
    }
}
