use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::{error, info};
use uuid::Uuid;

use crate::models::{ClientMessage, DisplayIdentity, ErrorResponse, ServerMessage};
use crate::services::auth_service;
use crate::ws::rooms::RoomCoordinator;
use crate::AppState;

#[derive(Deserialize)]
pub struct WsAuthQuery {
    pub token: Option<String>,
}

/// WebSocket handler
///
/// The bearer credential is verified before the upgrade: a missing or
/// invalid token gets a 401 and never becomes a socket.
pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    Query(query): Query<WsAuthQuery>,
    headers: HeaderMap,
    State(app_state): State<Arc<AppState>>,
) -> Response {
    info!("New WebSocket connection attempt");

    let token = match query
        .token
        .or_else(|| auth_service::get_auth_token(&headers).ok())
    {
        Some(token) => token,
        None => return auth_error("Missing credential"),
    };

    let secret = match &app_state.config.auth_jwt_secret {
        Some(secret) => secret.clone(),
        None => {
            error!("Auth JWT secret not configured");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse {
                    code: StatusCode::INTERNAL_SERVER_ERROR.as_u16(),
                    status: StatusCode::INTERNAL_SERVER_ERROR.to_string(),
                    error: "Identity verification unavailable".to_string(),
                }),
            )
                .into_response();
        }
    };

    let user_id = match auth_service::get_user_id(&token, &secret) {
        Ok(user_id) => user_id,
        Err(e) => {
            error!("Refusing connection: {}", e);
            return auth_error("Invalid credential");
        }
    };

    let display_identity = app_state.identity.get_or_fetch(&user_id).await;

    ws.on_upgrade(move |socket| handle_socket(socket, app_state, user_id, display_identity))
}

fn auth_error(detail: &str) -> Response {
    let status = StatusCode::UNAUTHORIZED;
    (
        status,
        Json(ErrorResponse {
            code: status.as_u16(),
            status: status.to_string(),
            error: detail.to_string(),
        }),
    )
        .into_response()
}

/// Handle WebSocket connection
async fn handle_socket(
    socket: WebSocket,
    app_state: Arc<AppState>,
    user_id: String,
    display_identity: DisplayIdentity,
) {
    // Generate unique connection ID to identify this client
    let connection_id = Uuid::new_v4();
    let coordinator = Arc::clone(&app_state.coordinator);

    info!(
        "WebSocket connection established for user {} with connection_id: {}",
        user_id, connection_id
    );

    // Split the socket into sender and receiver
    let (mut sink, mut receiver) = socket.split();

    // Everything addressed to this connection goes through one queue that
    // the write task drains in order.
    let (tx, mut rx) = mpsc::unbounded_channel::<ServerMessage>();
    coordinator
        .registry()
        .register(connection_id, user_id, display_identity, tx)
        .await;

    // Pump queued outbound messages into the socket
    let mut send_task = tokio::spawn(async move {
        while let Some(message) = rx.recv().await {
            let payload = match serde_json::to_string(&message) {
                Ok(payload) => payload,
                Err(e) => {
                    error!("Failed to serialize outbound message: {}", e);
                    continue;
                }
            };
            if sink.send(Message::Text(payload)).await.is_err() {
                break;
            }
        }
    });

    // Read frames from the socket and dispatch them
    let recv_coordinator = Arc::clone(&coordinator);
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(message)) = receiver.next().await {
            let Message::Text(text) = message else {
                continue;
            };

            // Parse the incoming message as JSON
            let parsed: ClientMessage = match serde_json::from_str(&text) {
                Ok(parsed) => parsed,
                Err(e) => {
                    error!(
                        "Failed to parse message from connection {}: {}",
                        connection_id, e
                    );
                    continue;
                }
            };

            dispatch_client_message(&recv_coordinator, connection_id, parsed).await;
        }
    });

    // Wait for either task to finish (and finish the other)
    tokio::select! {
        _ = (&mut send_task) => recv_task.abort(),
        _ = (&mut recv_task) => send_task.abort(),
    };

    // Transport closed: unconditional, idempotent cleanup. Needs no client
    // acknowledgement.
    coordinator.disconnect(connection_id).await;
    info!("WebSocket connection terminated for connection {}", connection_id);
}

/// Route one parsed client message to the owning component
pub async fn dispatch_client_message(
    coordinator: &Arc<RoomCoordinator>,
    connection_id: Uuid,
    message: ClientMessage,
) {
    match message {
        ClientMessage::JoinRoom { room_id } => {
            let reply = match coordinator.join(connection_id, &room_id).await {
                Ok(snapshot) => ServerMessage::RoomJoined { snapshot },
                Err(rejection) => {
                    info!("Join rejected for connection {}: {}", connection_id, rejection);
                    ServerMessage::RoomError {
                        code: rejection.code,
                        message: rejection.message,
                    }
                }
            };
            coordinator.registry().send_to(connection_id, reply).await;
        }
        ClientMessage::LeaveRoom { room_id } => {
            coordinator.leave(connection_id, room_id.trim()).await;
        }
        ClientMessage::CodeUpdate {
            room_id,
            code,
            language,
        } => {
            coordinator
                .handle_code_update(connection_id, &room_id, code, language)
                .await;
        }
        ClientMessage::CursorUpdate {
            room_id,
            position,
            selection,
        } => {
            coordinator
                .handle_cursor_update(connection_id, &room_id, position, selection)
                .await;
        }
        ClientMessage::InputUpdate { room_id, input } => {
            coordinator
                .handle_input_update(connection_id, &room_id, input)
                .await;
        }
        ClientMessage::CompileStart { room_id } => {
            coordinator.handle_compile_start(connection_id, &room_id).await;
        }
        ClientMessage::CompileResult {
            room_id,
            result,
            error,
        } => {
            coordinator
                .handle_compile_result(connection_id, &room_id, result, error)
                .await;
        }
        ClientMessage::ChatMessage { room_id, content } => {
            coordinator
                .handle_chat_message(connection_id, &room_id, content)
                .await;
        }
        ClientMessage::CallOffer {
            target_connection_id,
            offer,
        } => {
            coordinator
                .relay_call_offer(connection_id, target_connection_id, offer)
                .await;
        }
        ClientMessage::CallAnswer {
            target_connection_id,
            answer,
        } => {
            coordinator
                .relay_call_answer(connection_id, target_connection_id, answer)
                .await;
        }
        ClientMessage::CallReject {
            target_connection_id,
            reason,
        } => {
            coordinator
                .relay_call_reject(connection_id, target_connection_id, reason)
                .await;
        }
        ClientMessage::IceCandidate {
            target_connection_id,
            candidate,
        } => {
            coordinator
                .relay_ice_candidate(connection_id, target_connection_id, candidate)
                .await;
        }
    }
}
