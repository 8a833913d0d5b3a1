pub mod auth;
pub mod config;
pub mod db;
pub mod docs;
pub mod handlers;
pub mod models;
pub mod routes;
pub mod services;
pub mod ws;

use std::sync::Arc;
use std::time::Duration;

use config::Config;
use db::RoomStore;
use services::IdentityDirectory;
use ws::RoomCoordinator;

/// Shared services, constructed once at process start and passed by handle
/// to every handler. Nothing here is reachable through ambient globals.
pub struct AppState {
    pub config: Config,
    pub coordinator: Arc<RoomCoordinator>,
    pub identity: Arc<IdentityDirectory>,
}

impl AppState {
    pub fn new(config: Config, store: Arc<dyn RoomStore>) -> Arc<Self> {
        let notify_delay = Duration::from_millis(config.participant_notify_delay_ms);
        let coordinator = Arc::new(RoomCoordinator::new(Arc::clone(&store), notify_delay));
        let identity = Arc::new(IdentityDirectory::new(store));
        Arc::new(Self {
            config,
            coordinator,
            identity,
        })
    }
}
