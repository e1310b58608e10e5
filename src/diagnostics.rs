use serde::Serialize;

use crate::{
    core::unix_now_secs,
    dispatch,
    model::{ClientState, ConnectionState},
};

/// Point-in-time snapshot of the connection and delivery state, for status
/// surfaces and debugging.
#[derive(Debug, Serialize, Clone)]
pub struct RuntimeDiagnostics {
    pub connection_state: ConnectionState,
    pub should_run: bool,
    pub user_id: Option<String>,
    pub reconnect_attempts: u32,
    pub backoff_ms: u64,
    pub last_connected_at: Option<u64>,
    pub last_stream_event_at: Option<u64>,
    pub last_event_at: Option<u64>,
    pub last_event_id: Option<String>,
    pub stale_for_seconds: Option<u64>,
    pub last_error: Option<String>,
    pub unread: u64,
}

pub(crate) fn snapshot(state: &ClientState) -> RuntimeDiagnostics {
    let unread = dispatch::unread_count(state);
    let runtime = state.runtime.lock().unwrap_or_else(|e| e.into_inner());

    let now = unix_now_secs();
    let stale_for_seconds = runtime
        .last_stream_event_at
        .map(|last| now.saturating_sub(last));

    RuntimeDiagnostics {
        connection_state: *state.state_tx.borrow(),
        should_run: runtime.should_run,
        user_id: runtime.user_id.clone(),
        reconnect_attempts: runtime.reconnect_attempts,
        backoff_ms: runtime.backoff_ms,
        last_connected_at: runtime.last_connected_at,
        last_stream_event_at: runtime.last_stream_event_at,
        last_event_at: runtime.last_event_at,
        last_event_id: runtime.last_event_id.clone(),
        stale_for_seconds,
        last_error: runtime.last_error.clone(),
        unread,
    }
}
