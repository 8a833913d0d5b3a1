use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{mpsc, Mutex};
use uuid::Uuid;

use codepair::db::{RoomStore, StoreError};
use codepair::models::{
    CompilationEntry, ConnectionId, DisplayIdentity, Language, RoomRecord, ServerMessage, UserRow,
};
use codepair::ws::RoomCoordinator;

/// In-memory RoomStore that captures every mirror write for verification
/// and can be switched into a failing mode.
pub struct MemoryRoomStore {
    rooms: Mutex<HashMap<String, RoomRecord>>,
    users: Mutex<HashMap<String, UserRow>>,
    pub chats: Mutex<Vec<(String, String, String)>>,
    pub compilations: Mutex<Vec<(String, CompilationEntry)>>,
    pub activity: Mutex<HashMap<String, (String, Language, String)>>,
    pub ended: Mutex<Vec<String>>,
    fail_all: AtomicBool,
}

impl MemoryRoomStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            rooms: Mutex::new(HashMap::new()),
            users: Mutex::new(HashMap::new()),
            chats: Mutex::new(Vec::new()),
            compilations: Mutex::new(Vec::new()),
            activity: Mutex::new(HashMap::new()),
            ended: Mutex::new(Vec::new()),
            fail_all: AtomicBool::new(false),
        })
    }

    /// Make every store call fail until switched back
    pub fn fail_all(&self, fail: bool) {
        self.fail_all.store(fail, Ordering::SeqCst);
    }

    pub async fn room(&self, room_id: &str) -> Option<RoomRecord> {
        self.rooms.lock().await.get(room_id).cloned()
    }

    fn check(&self) -> Result<(), StoreError> {
        if self.fail_all.load(Ordering::SeqCst) {
            Err(StoreError::Unavailable("forced test failure".to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl RoomStore for MemoryRoomStore {
    async fn find_room(&self, room_id: &str) -> Result<Option<RoomRecord>, StoreError> {
        self.check()?;
        Ok(self.rooms.lock().await.get(room_id).cloned())
    }

    async fn create_room(
        &self,
        room_id: &str,
        created_by: &str,
    ) -> Result<RoomRecord, StoreError> {
        self.check()?;
        let record = RoomRecord {
            room_id: room_id.to_string(),
            created_by: created_by.to_string(),
            participant_user_ids: vec![created_by.to_string()],
            capacity: 2,
            created_at: Utc::now(),
            ended_at: None,
        };
        self.rooms
            .lock()
            .await
            .insert(room_id.to_string(), record.clone());
        Ok(record)
    }

    async fn append_participant(&self, room_id: &str, user_id: &str) -> Result<(), StoreError> {
        self.check()?;
        let mut rooms = self.rooms.lock().await;
        if let Some(record) = rooms.get_mut(room_id) {
            if !record.participant_user_ids.iter().any(|u| u == user_id) {
                record.participant_user_ids.push(user_id.to_string());
            }
        }
        Ok(())
    }

    async fn end_room(&self, room_id: &str) -> Result<(), StoreError> {
        self.check()?;
        if let Some(record) = self.rooms.lock().await.get_mut(room_id) {
            record.ended_at = Some(Utc::now());
        }
        self.ended.lock().await.push(room_id.to_string());
        Ok(())
    }

    async fn find_user(&self, user_id: &str) -> Result<Option<UserRow>, StoreError> {
        self.check()?;
        Ok(self.users.lock().await.get(user_id).cloned())
    }

    async fn mirror_activity(
        &self,
        room_id: &str,
        code: &str,
        language: Language,
        input: &str,
    ) -> Result<(), StoreError> {
        self.check()?;
        self.activity.lock().await.insert(
            room_id.to_string(),
            (code.to_string(), language, input.to_string()),
        );
        Ok(())
    }

    async fn append_chat(
        &self,
        room_id: &str,
        user_id: &str,
        content: &str,
    ) -> Result<(), StoreError> {
        self.check()?;
        self.chats.lock().await.push((
            room_id.to_string(),
            user_id.to_string(),
            content.to_string(),
        ));
        Ok(())
    }

    async fn append_compilation(
        &self,
        room_id: &str,
        entry: &CompilationEntry,
    ) -> Result<(), StoreError> {
        self.check()?;
        self.compilations
            .lock()
            .await
            .push((room_id.to_string(), entry.clone()));
        Ok(())
    }
}

/// A fake connected client: registered in the coordinator's registry with a
/// plain channel standing in for the socket write task.
pub struct TestPeer {
    pub connection_id: ConnectionId,
    pub user_id: String,
    pub rx: mpsc::UnboundedReceiver<ServerMessage>,
}

impl TestPeer {
    /// Receive the next queued message, failing the test after a second
    pub async fn recv(&mut self) -> ServerMessage {
        tokio::time::timeout(Duration::from_secs(1), self.rx.recv())
            .await
            .expect("timed out waiting for a message")
            .expect("connection channel closed")
    }

    /// Take everything queued right now without waiting
    pub fn drain(&mut self) -> Vec<ServerMessage> {
        let mut messages = Vec::new();
        while let Ok(message) = self.rx.try_recv() {
            messages.push(message);
        }
        messages
    }
}

pub fn new_coordinator(store: Arc<MemoryRoomStore>) -> Arc<RoomCoordinator> {
    // No notification delay in tests; ordering is asserted directly.
    Arc::new(RoomCoordinator::new(store, Duration::ZERO))
}

pub async fn connect(coordinator: &Arc<RoomCoordinator>, user_id: &str) -> TestPeer {
    let connection_id = Uuid::new_v4();
    let (tx, rx) = mpsc::unbounded_channel();
    coordinator
        .registry()
        .register(
            connection_id,
            user_id.to_string(),
            DisplayIdentity {
                name: user_id.to_string(),
                email: Some(format!("{}@example.com", user_id)),
            },
            tx,
        )
        .await;
    TestPeer {
        connection_id,
        user_id: user_id.to_string(),
        rx,
    }
}

/// Give spawned best-effort tasks (mirrors, delayed notifications) a moment
/// to run.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(50)).await;
}
