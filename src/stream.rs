use std::{sync::Arc, time::Duration};

use futures_util::{SinkExt, StreamExt};
use tokio::sync::watch;
use tokio_tungstenite::{
    connect_async,
    tungstenite::{client::IntoClientRequest, http::HeaderValue, Message},
};
use tracing::{debug, trace, warn};

use crate::{
    consts::{
        HEARTBEAT_ACK_FRAME, HEARTBEAT_INTERVAL_SECS, HEARTBEAT_PING_FRAME,
        LOG_ERROR_PREVIEW_CHARS, RECONNECT_BASE_DELAY_MS, RECONNECT_MAX_ATTEMPTS,
        RECONNECT_MAX_DELAY_MS, STREAM_CONNECT_TIMEOUT_SECS,
    },
    core::{truncate_message, unix_now_secs},
    dispatch,
    error::NotifyError,
    model::{ClientState, ConnectionState},
    settings::build_notifications_ws_url,
};

/// Open the push channel for a user. A live channel for the same user makes
/// this a no-op; a live channel for a different user is stopped first.
pub(crate) fn connect(state: &Arc<ClientState>, user_id: &str) -> Result<(), NotifyError> {
    let ws_url = build_notifications_ws_url(&state.config.base_url, user_id)?;
    debug!(user = user_id, "connect requested");

    let stop_rx;
    let task_epoch;
    {
        let mut runtime = state.runtime.lock().unwrap_or_else(|e| e.into_inner());

        if runtime.stop_tx.is_some() {
            let current = *state.state_tx.borrow();
            if runtime.user_id.as_deref() == Some(user_id.trim())
                && current != ConnectionState::Exhausted
            {
                return Ok(());
            }
            // a channel for another user (or an exhausted one) gives way
            if let Some(stop_tx) = runtime.stop_tx.take() {
                let _ = stop_tx.send(true);
            }
        }

        let (tx, rx) = watch::channel(false);
        runtime.stop_tx = Some(tx);
        runtime.stream_epoch = runtime.stream_epoch.wrapping_add(1);
        task_epoch = runtime.stream_epoch;
        runtime.should_run = true;
        runtime.user_id = Some(user_id.trim().to_string());
        runtime.reconnect_attempts = 0;
        runtime.backoff_ms = 0;
        runtime.last_error = None;
        stop_rx = rx;
    }

    set_connection_state(state, ConnectionState::Connecting);
    let task_state = Arc::clone(state);
    tokio::spawn(async move {
        run_stream_loop(task_state, ws_url, stop_rx, task_epoch).await;
    });

    Ok(())
}

/// Intentional teardown: suppresses reconnection, cancels the heartbeat and
/// any pending backoff sleep (both live inside the stream task), and clears
/// the stored user id.
pub(crate) fn disconnect(state: &Arc<ClientState>) {
    {
        let mut runtime = state.runtime.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(stop_tx) = runtime.stop_tx.take() {
            let _ = stop_tx.send(true);
        }
        runtime.should_run = false;
        runtime.user_id = None;
        runtime.backoff_ms = 0;
    }

    set_connection_state(state, ConnectionState::Disconnected);
}

pub(crate) fn set_connection_state(state: &ClientState, next: ConnectionState) {
    let previous = state.state_tx.send_replace(next);
    if previous != next {
        debug!(from = %previous, to = %next, "connection state");
    }
}

/// Delay before reconnect attempt `attempt` (1-based): capped exponential.
pub(crate) fn backoff_delay(attempt: u32) -> Duration {
    let factor = 1u64.checked_shl(attempt).unwrap_or(u64::MAX);
    let ms = RECONNECT_BASE_DELAY_MS
        .saturating_mul(factor)
        .min(RECONNECT_MAX_DELAY_MS);
    Duration::from_millis(ms)
}

/// Next attempt number, or `None` once the ceiling is reached.
pub(crate) fn next_attempt(attempts_so_far: u32) -> Option<u32> {
    if attempts_so_far < RECONNECT_MAX_ATTEMPTS {
        Some(attempts_so_far + 1)
    } else {
        None
    }
}

async fn run_stream_loop(
    state: Arc<ClientState>,
    ws_url: String,
    mut stop_rx: watch::Receiver<bool>,
    task_epoch: u64,
) {
    debug!("stream task started");

    loop {
        if *stop_rx.borrow() {
            break;
        }

        set_connection_state(&state, ConnectionState::Connecting);
        match stream_once(&state, &ws_url, &mut stop_rx).await {
            Ok(()) => {
                // only an intentional stop ends a session cleanly
                break;
            }
            Err(error) => {
                if *stop_rx.borrow() {
                    break;
                }

                warn!(%error, "stream session failed");
                let attempt = {
                    let mut runtime = state.runtime.lock().unwrap_or_else(|e| e.into_inner());
                    runtime.last_error =
                        Some(truncate_message(&error.to_string(), LOG_ERROR_PREVIEW_CHARS));
                    match next_attempt(runtime.reconnect_attempts) {
                        Some(attempt) => {
                            runtime.reconnect_attempts = attempt;
                            runtime.backoff_ms = backoff_delay(attempt).as_millis() as u64;
                            Some(attempt)
                        }
                        None => None,
                    }
                };

                let Some(attempt) = attempt else {
                    warn!(
                        attempts = RECONNECT_MAX_ATTEMPTS,
                        "reconnect attempts exhausted, giving up until next connect"
                    );
                    set_connection_state(&state, ConnectionState::Exhausted);
                    break;
                };

                set_connection_state(&state, ConnectionState::Backoff);
                let delay = backoff_delay(attempt);
                debug!(attempt, delay_ms = delay.as_millis() as u64, "reconnect scheduled");
                tokio::select! {
                    _ = stop_rx.changed() => {
                        if *stop_rx.borrow() {
                            break;
                        }
                    }
                    _ = tokio::time::sleep(delay) => {}
                }
            }
        }
    }

    let mut runtime = state.runtime.lock().unwrap_or_else(|e| e.into_inner());
    if runtime.stream_epoch == task_epoch {
        runtime.stop_tx = None;
        runtime.should_run = false;
        runtime.backoff_ms = 0;
        drop(runtime);
        if *state.state_tx.borrow() != ConnectionState::Exhausted {
            set_connection_state(&state, ConnectionState::Disconnected);
        }
    }
    debug!("stream task ended");
}

async fn stream_once(
    state: &Arc<ClientState>,
    ws_url: &str,
    stop_rx: &mut watch::Receiver<bool>,
) -> Result<(), NotifyError> {
    let mut ws_request = ws_url
        .into_client_request()
        .map_err(|error| NotifyError::Connect(format!("failed to build websocket request: {error}")))?;
    if let Some(token) = state.config.token.as_deref() {
        let header = HeaderValue::from_str(&format!("Bearer {}", token.trim()))
            .map_err(|error| NotifyError::Config(format!("invalid token for websocket header: {error}")))?;
        ws_request.headers_mut().insert("Authorization", header);
    }

    let (mut ws_stream, _) = tokio::time::timeout(
        Duration::from_secs(STREAM_CONNECT_TIMEOUT_SECS),
        connect_async(ws_request),
    )
    .await
    .map_err(|_| NotifyError::ConnectTimeout(STREAM_CONNECT_TIMEOUT_SECS))?
    .map_err(|error| NotifyError::Connect(error.to_string()))?;

    debug!("ws connected");
    let now = unix_now_secs();
    {
        let mut runtime = state.runtime.lock().unwrap_or_else(|e| e.into_inner());
        runtime.last_connected_at = Some(now);
        runtime.last_stream_event_at = Some(now);
        runtime.last_error = None;
        runtime.reconnect_attempts = 0;
        runtime.backoff_ms = 0;
    }
    set_connection_state(state, ConnectionState::Connected);

    // reconcile whatever was missed while offline
    let refresh_state = Arc::clone(state);
    tokio::spawn(async move {
        if let Err(error) = dispatch::refresh(&refresh_state).await {
            debug!(%error, "post-connect refresh failed");
        }
    });

    let mut heartbeat = tokio::time::interval(Duration::from_secs(HEARTBEAT_INTERVAL_SECS));
    heartbeat.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    heartbeat.tick().await;
    let mut pending_ping = false;

    loop {
        tokio::select! {
            _ = stop_rx.changed() => {
                if *stop_rx.borrow() {
                    let _ = ws_stream.close(None).await;
                    return Ok(());
                }
            }
            incoming = ws_stream.next() => {
                match incoming {
                    Some(Ok(Message::Text(text))) => {
                        mark_stream_activity(state);
                        pending_ping = false;
                        let text: &str = text.as_ref();
                        if text == HEARTBEAT_ACK_FRAME {
                            trace!("heartbeat ack");
                        } else {
                            dispatch::on_frame(state, text);
                        }
                    }
                    Some(Ok(Message::Ping(payload))) => {
                        mark_stream_activity(state);
                        pending_ping = false;
                        ws_stream
                            .send(Message::Pong(payload))
                            .await
                            .map_err(|error| NotifyError::Stream(format!("failed to send pong: {error}")))?;
                    }
                    Some(Ok(Message::Pong(_))) => {
                        mark_stream_activity(state);
                        pending_ping = false;
                    }
                    Some(Ok(Message::Close(_))) => {
                        return Err(NotifyError::Stream("stream closed by server".to_string()));
                    }
                    Some(Ok(_)) => {
                        mark_stream_activity(state);
                    }
                    Some(Err(error)) => {
                        return Err(NotifyError::Stream(format!("stream read error: {error}")));
                    }
                    None => {
                        return Err(NotifyError::Stream("stream ended unexpectedly".to_string()));
                    }
                }
            }
            _ = heartbeat.tick() => {
                if pending_ping {
                    return Err(NotifyError::Stream(format!(
                        "no heartbeat reply within {HEARTBEAT_INTERVAL_SECS}s"
                    )));
                }
                ws_stream
                    .send(Message::text(HEARTBEAT_PING_FRAME))
                    .await
                    .map_err(|error| NotifyError::Stream(format!("failed to send heartbeat ping: {error}")))?;
                pending_ping = true;
            }
        }
    }
}

fn mark_stream_activity(state: &ClientState) {
    let mut runtime = state.runtime.lock().unwrap_or_else(|e| e.into_inner());
    runtime.last_stream_event_at = Some(unix_now_secs());
}
