use axum::{extract::State, http::StatusCode, Json};
use std::sync::{Arc, Mutex, OnceLock, PoisonError};
use sysinfo::System;
use tracing::info;

use crate::models::{DiagnosticsResponse, ErrorResponse};
use crate::AppState;

static SYSTEM_MONITOR: OnceLock<Mutex<System>> = OnceLock::new();

/// Live room, connection and host figures
pub async fn diagnostics(
    State(state): State<Arc<AppState>>,
) -> Result<(StatusCode, Json<DiagnosticsResponse>), (StatusCode, Json<ErrorResponse>)> {
    let n_rooms = state.registry.room_count() as u32;
    let n_conn = state.registry.connection_count() as u32;
    let n_result_channels = state.registry.result_channel_count() as u32;

    // System stats
    let (cpu_usage, memory_alloc, memory_free, memory_total) = {
        let sys_lock = SYSTEM_MONITOR.get_or_init(|| Mutex::new(System::new_all()));
        let mut sys = sys_lock.lock().unwrap_or_else(PoisonError::into_inner);
        sys.refresh_cpu();
        sys.refresh_memory();
        (
            sys.global_cpu_info().cpu_usage(),
            sys.used_memory(),
            sys.free_memory(),
            sys.total_memory(),
        )
    };

    info!(
        "Diagnostics: CPU: {:.2}%, Mem: {}/{} MB (Free: {} MB), Conn: {}, Rooms: {}",
        cpu_usage,
        memory_alloc / 1024 / 1024,
        memory_total / 1024 / 1024,
        memory_free / 1024 / 1024,
        n_conn,
        n_rooms
    );

    Ok((
        StatusCode::OK,
        Json(DiagnosticsResponse {
            n_conn,
            n_rooms,
            n_result_channels,
            cpu_usage,
            memory_alloc,
            memory_total,
            memory_free,
        }),
    ))
}
