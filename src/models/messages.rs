use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::room::{
    CompilationEntry, CompileMarker, ConnectionId, CursorPosition, CursorSelection, Language,
    Participant, RejectionCode, RoomSnapshot,
};

/// Messages a connection may send to the server
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(tag = "type")]
pub enum ClientMessage {
    #[serde(rename = "join-room", rename_all = "camelCase")]
    JoinRoom { room_id: String },

    #[serde(rename = "leave-room", rename_all = "camelCase")]
    LeaveRoom { room_id: String },

    #[serde(rename = "code-update", rename_all = "camelCase")]
    CodeUpdate {
        room_id: String,
        code: String,
        language: Language,
    },

    #[serde(rename = "cursor-update", rename_all = "camelCase")]
    CursorUpdate {
        room_id: String,
        position: CursorPosition,
        selection: Option<CursorSelection>,
    },

    #[serde(rename = "input-update", rename_all = "camelCase")]
    InputUpdate { room_id: String, input: String },

    #[serde(rename = "compile-start", rename_all = "camelCase")]
    CompileStart { room_id: String },

    #[serde(rename = "compile-result", rename_all = "camelCase")]
    CompileResult {
        room_id: String,
        result: Option<serde_json::Value>,
        error: Option<String>,
    },

    #[serde(rename = "chat-message", rename_all = "camelCase")]
    ChatMessage { room_id: String, content: String },

    #[serde(rename = "call-offer", rename_all = "camelCase")]
    CallOffer {
        target_connection_id: ConnectionId,
        offer: serde_json::Value,
    },

    #[serde(rename = "call-answer", rename_all = "camelCase")]
    CallAnswer {
        target_connection_id: ConnectionId,
        answer: serde_json::Value,
    },

    #[serde(rename = "call-reject", rename_all = "camelCase")]
    CallReject {
        target_connection_id: ConnectionId,
        reason: Option<String>,
    },

    #[serde(rename = "ice-candidate", rename_all = "camelCase")]
    IceCandidate {
        target_connection_id: ConnectionId,
        candidate: serde_json::Value,
    },
}

/// Messages the server may push to a connection
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(tag = "type")]
pub enum ServerMessage {
    #[serde(rename = "room-joined", rename_all = "camelCase")]
    RoomJoined { snapshot: RoomSnapshot },

    #[serde(rename = "participant-joined", rename_all = "camelCase")]
    ParticipantJoined {
        room_id: String,
        participant: Participant,
    },

    #[serde(rename = "participant-left", rename_all = "camelCase")]
    ParticipantLeft {
        room_id: String,
        participant: Participant,
    },

    #[serde(rename = "room-error", rename_all = "camelCase")]
    RoomError {
        code: RejectionCode,
        message: String,
    },

    #[serde(rename = "code-update", rename_all = "camelCase")]
    CodeUpdate {
        room_id: String,
        code: String,
        language: Language,
        from: Participant,
    },

    #[serde(rename = "cursor-update", rename_all = "camelCase")]
    CursorUpdate {
        room_id: String,
        position: CursorPosition,
        selection: Option<CursorSelection>,
        from: Participant,
    },

    #[serde(rename = "cursor-removed", rename_all = "camelCase")]
    CursorRemoved { room_id: String, user_id: String },

    #[serde(rename = "input-update", rename_all = "camelCase")]
    InputUpdate {
        room_id: String,
        input: String,
        from: Participant,
    },

    #[serde(rename = "compile-start", rename_all = "camelCase")]
    CompileStart {
        room_id: String,
        started_by: CompileMarker,
    },

    #[serde(rename = "compile-result", rename_all = "camelCase")]
    CompileResult {
        room_id: String,
        entry: CompilationEntry,
    },

    #[serde(rename = "chat-message", rename_all = "camelCase")]
    ChatMessage {
        room_id: String,
        content: String,
        from: Participant,
        sent_at: DateTime<Utc>,
    },

    #[serde(rename = "incoming-call", rename_all = "camelCase")]
    IncomingCall {
        from_connection_id: ConnectionId,
        from: Participant,
        offer: serde_json::Value,
    },

    #[serde(rename = "call-accepted", rename_all = "camelCase")]
    CallAccepted {
        from_connection_id: ConnectionId,
        from: Participant,
        answer: serde_json::Value,
    },

    #[serde(rename = "call-rejected", rename_all = "camelCase")]
    CallRejected {
        from_connection_id: ConnectionId,
        reason: Option<String>,
    },

    #[serde(rename = "ice-candidate", rename_all = "camelCase")]
    IceCandidate {
        from_connection_id: ConnectionId,
        from: Participant,
        candidate: serde_json::Value,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn join_room_parses_from_tagged_json() {
        let raw = r#"{"type":"join-room","roomId":"interview-42"}"#;
        let msg: ClientMessage = serde_json::from_str(raw).unwrap();
        match msg {
            ClientMessage::JoinRoom { room_id } => assert_eq!(room_id, "interview-42"),
            other => panic!("unexpected message: {:?}", other),
        }
    }

    #[test]
    fn code_update_round_trips_language() {
        let raw = r#"{"type":"code-update","roomId":"r1","code":"print(1)","language":"python"}"#;
        let msg: ClientMessage = serde_json::from_str(raw).unwrap();
        match msg {
            ClientMessage::CodeUpdate { language, code, .. } => {
                assert_eq!(language, Language::Python);
                assert_eq!(code, "print(1)");
            }
            other => panic!("unexpected message: {:?}", other),
        }
    }

    #[test]
    fn unknown_language_is_rejected() {
        let raw = r#"{"type":"code-update","roomId":"r1","code":"","language":"cobol"}"#;
        assert!(serde_json::from_str::<ClientMessage>(raw).is_err());
    }

    #[test]
    fn room_error_serializes_screaming_code() {
        let msg = ServerMessage::RoomError {
            code: RejectionCode::RoomFull,
            message: "Room is full (2 of 2 participants)".to_string(),
        };
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains(r#""type":"room-error""#));
        assert!(json.contains(r#""code":"ROOM_FULL""#));
    }

    #[test]
    fn signaling_payloads_pass_through_unchanged() {
        let target = Uuid::new_v4();
        let raw = format!(
            r#"{{"type":"ice-candidate","targetConnectionId":"{}","candidate":{{"sdpMid":"0","fragment":"abc"}}}}"#,
            target
        );
        let msg: ClientMessage = serde_json::from_str(&raw).unwrap();
        match msg {
            ClientMessage::IceCandidate {
                target_connection_id,
                candidate,
            } => {
                assert_eq!(target_connection_id, target);
                assert_eq!(candidate["sdpMid"], "0");
            }
            other => panic!("unexpected message: {:?}", other),
        }
    }
}
