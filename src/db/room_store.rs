use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::Error as SqlxError;
use std::time::Duration;
use tracing::info;

use crate::db::{RoomStore, StoreError};
use crate::models::room::{CompilationEntry, Language, RoomRecord, UserRow};

/// How many compile runs are kept per room in the durable history
const COMPILE_HISTORY_LIMIT: i64 = 10;

/// PostgreSQL-backed room store
pub struct PgRoomStore {
    pool: PgPool,
}

impl PgRoomStore {
    /// Create a new database connection pool
    ///
    /// # Arguments
    /// * `database_url` - PostgreSQL connection string
    ///
    /// # Returns
    /// * `Result<Self, SqlxError>` - Database connection pool or error
    pub async fn new(database_url: &str) -> Result<Self, SqlxError> {
        info!("Connecting to database...");

        let pool = PgPoolOptions::new()
            .max_connections(20)
            .min_connections(2)
            .acquire_timeout(Duration::from_secs(30))
            .idle_timeout(Duration::from_secs(600)) // Close idle connections after 10 minutes
            .max_lifetime(Duration::from_secs(1800)) // Recycle connections after 30 minutes
            .connect(database_url)
            .await?;

        info!("Database connection pool created successfully");

        Ok(Self { pool })
    }

    /// Get a reference to the connection pool
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    fn language_tag(language: Language) -> &'static str {
        match language {
            Language::Python => "python",
            Language::Javascript => "javascript",
            Language::Typescript => "typescript",
            Language::Rust => "rust",
            Language::C => "c",
            Language::Cpp => "cpp",
            Language::Java => "java",
            Language::Go => "go",
        }
    }
}

#[async_trait]
impl RoomStore for PgRoomStore {
    async fn find_room(&self, room_id: &str) -> Result<Option<RoomRecord>, StoreError> {
        let query_sql = r#"
            SELECT room_id, created_by, participant_user_ids, capacity, created_at, ended_at
            FROM rooms
            WHERE room_id = $1
        "#;

        let record = sqlx::query_as::<_, RoomRecord>(query_sql)
            .bind(room_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(record)
    }

    async fn create_room(
        &self,
        room_id: &str,
        created_by: &str,
    ) -> Result<RoomRecord, StoreError> {
        info!("Creating room record '{}' for user {}", room_id, created_by);

        // A concurrent create for the same room id loses the insert race and
        // falls back to the winner's row.
        let query_sql = r#"
            INSERT INTO rooms (room_id, created_by, participant_user_ids, capacity)
            VALUES ($1, $2, ARRAY[$2], 2)
            ON CONFLICT (room_id) DO NOTHING
            RETURNING room_id, created_by, participant_user_ids, capacity, created_at, ended_at
        "#;

        let inserted = sqlx::query_as::<_, RoomRecord>(query_sql)
            .bind(room_id)
            .bind(created_by)
            .fetch_optional(&self.pool)
            .await?;

        match inserted {
            Some(record) => Ok(record),
            None => self
                .find_room(room_id)
                .await?
                .ok_or_else(|| StoreError::Unavailable(format!("room '{}' vanished", room_id))),
        }
    }

    async fn append_participant(&self, room_id: &str, user_id: &str) -> Result<(), StoreError> {
        let query_sql = r#"
            UPDATE rooms
            SET participant_user_ids = array_append(participant_user_ids, $2)
            WHERE room_id = $1
              AND NOT ($2 = ANY(participant_user_ids))
        "#;

        sqlx::query(query_sql)
            .bind(room_id)
            .bind(user_id)
            .execute(&self.pool)
            .await?;

        info!("Appended participant {} to room '{}'", user_id, room_id);
        Ok(())
    }

    async fn end_room(&self, room_id: &str) -> Result<(), StoreError> {
        let query_sql = r#"
            UPDATE rooms
            SET ended_at = NOW()
            WHERE room_id = $1
              AND ended_at IS NULL
        "#;

        sqlx::query(query_sql).bind(room_id).execute(&self.pool).await?;

        info!("Room '{}' marked ended", room_id);
        Ok(())
    }

    async fn find_user(&self, user_id: &str) -> Result<Option<UserRow>, StoreError> {
        let query_sql = r#"
            SELECT user_id, name, email
            FROM users
            WHERE user_id = $1
        "#;

        let row = sqlx::query_as::<_, UserRow>(query_sql)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row)
    }

    async fn mirror_activity(
        &self,
        room_id: &str,
        code: &str,
        language: Language,
        input: &str,
    ) -> Result<(), StoreError> {
        let query_sql = r#"
            INSERT INTO room_activity (room_id, code, language, program_input, updated_at)
            VALUES ($1, $2, $3, $4, NOW())
            ON CONFLICT (room_id) DO UPDATE
            SET code = $2,
                language = $3,
                program_input = $4,
                updated_at = NOW()
        "#;

        sqlx::query(query_sql)
            .bind(room_id)
            .bind(code)
            .bind(Self::language_tag(language))
            .bind(input)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn append_chat(
        &self,
        room_id: &str,
        user_id: &str,
        content: &str,
    ) -> Result<(), StoreError> {
        let query_sql = r#"
            INSERT INTO room_messages (room_id, user_id, content)
            VALUES ($1, $2, $3)
        "#;

        sqlx::query(query_sql)
            .bind(room_id)
            .bind(user_id)
            .bind(content)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn append_compilation(
        &self,
        room_id: &str,
        entry: &CompilationEntry,
    ) -> Result<(), StoreError> {
        let payload = serde_json::to_value(entry)
            .map_err(|e| StoreError::Unavailable(format!("unserializable entry: {}", e)))?;

        // Begin a transaction: append, then prune everything older than the
        // most recent COMPILE_HISTORY_LIMIT entries for the room.
        let mut tx = self.pool.begin().await?;

        let insert_sql = r#"
            INSERT INTO room_compilations (room_id, triggered_by, entry, finished_at)
            VALUES ($1, $2, $3, $4)
        "#;
        sqlx::query(insert_sql)
            .bind(room_id)
            .bind(&entry.triggered_by)
            .bind(payload)
            .bind(entry.finished_at)
            .execute(&mut *tx)
            .await?;

        let prune_sql = r#"
            DELETE FROM room_compilations
            WHERE room_id = $1
              AND id NOT IN (
                SELECT id FROM room_compilations
                WHERE room_id = $1
                ORDER BY finished_at DESC, id DESC
                LIMIT $2
              )
        "#;
        sqlx::query(prune_sql)
            .bind(room_id)
            .bind(COMPILE_HISTORY_LIMIT)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        Ok(())
    }
}
