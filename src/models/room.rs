use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifier of one live transport-level connection. A user who opens two
/// tabs holds two connection ids but a single user id.
pub type ConnectionId = Uuid;

/// Languages the shared editor can be set to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    #[default]
    Python,
    Javascript,
    Typescript,
    Rust,
    C,
    Cpp,
    Java,
    Go,
}

/// Human-facing identity attached to a verified user
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DisplayIdentity {
    pub name: String,
    pub email: Option<String>,
}

/// A participant as seen by other room members
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Participant {
    pub connection_id: ConnectionId,
    pub user_id: String,
    pub name: String,
    pub email: Option<String>,
}

/// Durable room record, mirrored in the `rooms` table.
///
/// `participant_user_ids` is the "ever admitted" set: it grows when a new
/// user is admitted and never shrinks when someone leaves. Capacity is
/// enforced against live connections, not against this set.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct RoomRecord {
    pub room_id: String,
    pub created_by: String,
    pub participant_user_ids: Vec<String>,
    pub capacity: i32,
    pub created_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
}

/// Row from the `users` directory table
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct UserRow {
    pub user_id: String,
    pub name: String,
    pub email: Option<String>,
}

/// Cursor coordinates within the shared editor
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CursorPosition {
    pub line: i64,
    pub column: i64,
}

impl CursorPosition {
    const MAX_COORDINATE: i64 = 10_000_000;

    /// A position is usable when both coordinates are non-negative and
    /// within editor bounds. Anything else came from a confused client and
    /// is dropped rather than fanned out.
    pub fn is_valid(&self) -> bool {
        (0..Self::MAX_COORDINATE).contains(&self.line)
            && (0..Self::MAX_COORDINATE).contains(&self.column)
    }
}

/// Selected range within the shared editor
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CursorSelection {
    pub start: CursorPosition,
    pub end: CursorPosition,
}

impl CursorSelection {
    pub fn is_valid(&self) -> bool {
        self.start.is_valid() && self.end.is_valid()
    }
}

/// Marker set while a compile run is in flight
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompileMarker {
    pub started_by: String,
    pub started_by_name: String,
}

/// One finished compile run, as broadcast to the room and mirrored to the
/// bounded history.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompilationEntry {
    pub result: Option<serde_json::Value>,
    pub error: Option<String>,
    pub triggered_by: String,
    pub triggered_by_name: String,
    pub finished_at: DateTime<Utc>,
}

/// A remote cursor as shipped inside a room snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteCursor {
    pub user_id: String,
    pub name: String,
    pub position: CursorPosition,
    pub selection: Option<CursorSelection>,
}

/// Consistent view of a room handed to a connection on admission
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomSnapshot {
    pub room: RoomRecord,
    /// Current participants excluding the joiner itself
    pub participants: Vec<Participant>,
    pub code: String,
    pub language: Language,
    pub program_input: String,
    pub compile_in_flight: Option<CompileMarker>,
    pub last_compilation: Option<CompilationEntry>,
    pub compile_history: Vec<CompilationEntry>,
    pub cursors: Vec<RemoteCursor>,
}

/// Machine-readable reason a join was refused
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RejectionCode {
    InvalidRoom,
    RoomFull,
    JoinError,
}

/// A definitive join refusal returned to the requesting connection only
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomRejection {
    pub code: RejectionCode,
    pub message: String,
}

impl RoomRejection {
    pub fn invalid_room() -> Self {
        Self {
            code: RejectionCode::InvalidRoom,
            message: "Room id must be a non-empty string".to_string(),
        }
    }

    pub fn room_full(current: usize, max: i32) -> Self {
        Self {
            code: RejectionCode::RoomFull,
            message: format!("Room is full ({} of {} participants)", current, max),
        }
    }

    pub fn join_error(detail: impl std::fmt::Display) -> Self {
        Self {
            code: RejectionCode::JoinError,
            message: format!("Could not join room: {}", detail),
        }
    }
}

impl std::fmt::Display for RoomRejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}: {}", self.code, self.message)
    }
}
