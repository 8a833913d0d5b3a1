use std::sync::{Arc, Mutex, OnceLock};

use axum::{
    extract::{Extension, State},
    http::StatusCode,
    Json,
};
use sysinfo::System;
use tracing::info;

use crate::auth::auth;
use crate::models::{DiagnosticsResponse, ErrorResponse};
use crate::routes::auth_middleware::CallerIdentity;
use crate::AppState;

static SYSTEM_MONITOR: OnceLock<Mutex<System>> = OnceLock::new();

/// Diagnostics snapshot of the coordination core
pub async fn diagnostics(
    State(app_state): State<Arc<AppState>>,
    Extension(caller): Extension<CallerIdentity>,
) -> Result<(StatusCode, Json<DiagnosticsResponse>), (StatusCode, Json<ErrorResponse>)> {
    // Only admins get to see process internals
    auth::ensure_admin(&caller.roles)?;

    // Aggregate counters from the coordinator
    let stats = app_state.coordinator.stats().await;
    let n_identity_cache = app_state.identity.cached_count() as u32;

    // System stats
    let (cpu_usage, memory_alloc, memory_free, memory_total) = {
        let sys_lock = SYSTEM_MONITOR.get_or_init(|| Mutex::new(System::new_all()));
        match sys_lock.lock() {
            Ok(mut sys) => {
                sys.refresh_cpu();
                sys.refresh_memory();
                (
                    sys.global_cpu_info().cpu_usage(),
                    sys.used_memory(),
                    sys.free_memory(),
                    sys.total_memory(),
                )
            }
            Err(_) => (0.0, 0, 0, 0),
        }
    };

    info!(
        "Diagnostics: CPU: {:.2}%, Mem: {}/{} MB (Free: {} MB), Conn: {}, Rooms: {}",
        cpu_usage,
        memory_alloc / 1024 / 1024,
        memory_total / 1024 / 1024,
        memory_free / 1024 / 1024,
        stats.connections,
        stats.rooms
    );

    Ok((
        StatusCode::OK,
        Json(DiagnosticsResponse {
            n_conn: stats.connections as u32,
            n_rooms: stats.rooms as u32,
            n_room_conn: stats.room_connections as u32,
            n_cursors: stats.cursors as u32,
            n_identity_cache,
            cpu_usage,
            memory_alloc,
            memory_total,
            memory_free,
        }),
    ))
}
