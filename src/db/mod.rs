pub mod room_store;

pub use room_store::PgRoomStore;

use async_trait::async_trait;

use crate::models::room::{CompilationEntry, Language, RoomRecord, UserRow};

/// Error from the durable store
#[derive(Debug)]
pub enum StoreError {
    Database(sqlx::Error),
    Unavailable(String),
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::Database(e) => write!(f, "Database error: {}", e),
            StoreError::Unavailable(reason) => write!(f, "Store unavailable: {}", reason),
        }
    }
}

impl std::error::Error for StoreError {}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        StoreError::Database(e)
    }
}

/// Durable storage consumed by the coordination core.
///
/// Room records and the user directory are read on the admission path;
/// everything else is a best-effort mirror invoked from spawned tasks and
/// never blocks a broadcast.
#[async_trait]
pub trait RoomStore: Send + Sync {
    /// Look up a room record by its stable id
    async fn find_room(&self, room_id: &str) -> Result<Option<RoomRecord>, StoreError>;

    /// Create a room record on first join of an unknown room id. The
    /// creator is the first entry of `participant_user_ids`.
    async fn create_room(&self, room_id: &str, created_by: &str)
        -> Result<RoomRecord, StoreError>;

    /// Append a newly admitted user to the durable participant set
    async fn append_participant(&self, room_id: &str, user_id: &str) -> Result<(), StoreError>;

    /// Stamp `ended_at` once the room has drained. Leaves the record in
    /// place; rooms are never deleted here.
    async fn end_room(&self, room_id: &str) -> Result<(), StoreError>;

    /// Resolve a user's display identity from the directory
    async fn find_user(&self, user_id: &str) -> Result<Option<UserRow>, StoreError>;

    /// Mirror the shared document (code, language, stdin) for a room
    async fn mirror_activity(
        &self,
        room_id: &str,
        code: &str,
        language: Language,
        input: &str,
    ) -> Result<(), StoreError>;

    /// Append a chat message to the room's durable log
    async fn append_chat(
        &self,
        room_id: &str,
        user_id: &str,
        content: &str,
    ) -> Result<(), StoreError>;

    /// Append a compile run to the room's history, keeping only the most
    /// recent entries
    async fn append_compilation(
        &self,
        room_id: &str,
        entry: &CompilationEntry,
    ) -> Result<(), StoreError>;
}
