use std::{
    panic::AssertUnwindSafe,
    sync::{atomic::Ordering, Arc, Weak},
};

use tracing::{debug, warn};

use crate::{
    consts::{ENVELOPE_KIND_NOTIFICATION, LOG_PAYLOAD_PREVIEW_CHARS},
    core::{truncate_message, unix_now_secs},
    error::NotifyError,
    model::{ClientState, NotificationEvent, StreamEnvelope, SubscriberFn},
    notifications,
    settings::normalize_cache_limit,
};

/// Handle returned by `subscribe`. `unsubscribe` removes exactly that
/// registration; calling it again (or after the client is gone) is a no-op.
pub struct Subscription {
    id: u64,
    state: Weak<ClientState>,
}

impl Subscription {
    pub fn unsubscribe(&self) {
        let Some(state) = self.state.upgrade() else {
            return;
        };
        let mut subscribers = state
            .subscribers
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        subscribers.retain(|(id, _)| *id != self.id);
    }
}

pub(crate) fn subscribe(state: &Arc<ClientState>, callback: Arc<SubscriberFn>) -> Subscription {
    let id = state.next_subscriber_id.fetch_add(1, Ordering::Relaxed);
    state
        .subscribers
        .lock()
        .unwrap_or_else(|e| e.into_inner())
        .push((id, callback));
    Subscription {
        id,
        state: Arc::downgrade(state),
    }
}

/// Decode one text frame from the transport and hand it to delivery.
/// Undecodable or unrecognized frames are dropped; the channel stays up.
pub(crate) fn on_frame(state: &Arc<ClientState>, text: &str) {
    let envelope = match serde_json::from_str::<StreamEnvelope>(text) {
        Ok(envelope) => envelope,
        Err(error) => {
            warn!(
                %error,
                payload = %truncate_message(text, LOG_PAYLOAD_PREVIEW_CHARS),
                "dropping undecodable frame"
            );
            return;
        }
    };

    if envelope.kind != ENVELOPE_KIND_NOTIFICATION {
        warn!(kind = %envelope.kind, "dropping unrecognized envelope");
        return;
    }

    deliver(state, envelope.data);
}

/// At-most-once delivery: dedup by id, count, cache, fan out, then run the
/// presentation gate.
pub(crate) fn deliver(state: &Arc<ClientState>, event: NotificationEvent) {
    {
        let mut seen = state.seen_ids.lock().unwrap_or_else(|e| e.into_inner());
        if !seen.insert(event.id.clone()) {
            debug!(id = %event.id, "duplicate event dropped");
            return;
        }
    }

    {
        let mut unread = state.unread.lock().unwrap_or_else(|e| e.into_inner());
        *unread += 1;
    }

    {
        let cache_limit = normalize_cache_limit(state.config.cache_limit);
        let mut feed = state.feed.lock().unwrap_or_else(|e| e.into_inner());
        feed.insert(0, event.clone());
        if feed.len() > cache_limit {
            feed.truncate(cache_limit);
        }
    }

    {
        let mut runtime = state.runtime.lock().unwrap_or_else(|e| e.into_inner());
        runtime.last_event_at = Some(unix_now_secs());
        runtime.last_event_id = Some(event.id.clone());
    }

    debug!(id = %event.id, kind = ?event.kind, "event delivered");
    fan_out(state, &event);
    notifications::present(state, &event);
}

/// Invoke every subscriber in registration order. A panicking subscriber is
/// logged and skipped; the rest still receive the event.
fn fan_out(state: &Arc<ClientState>, event: &NotificationEvent) {
    let subscribers: Vec<(u64, Arc<SubscriberFn>)> = state
        .subscribers
        .lock()
        .unwrap_or_else(|e| e.into_inner())
        .clone();

    for (id, callback) in subscribers {
        if std::panic::catch_unwind(AssertUnwindSafe(|| callback(event))).is_err() {
            warn!(subscriber = id, event = %event.id, "subscriber panicked during delivery");
        }
    }
}

/// Optimistic local decrement plus a fire-and-forget backend ack. Never
/// rolled back; the next `refresh` reconciles any drift.
pub(crate) fn mark_read(state: &Arc<ClientState>, event_id: &str) {
    {
        let mut unread = state.unread.lock().unwrap_or_else(|e| e.into_inner());
        *unread = unread.saturating_sub(1);
    }

    let api = state.api.clone();
    let event_id = event_id.to_string();
    tokio::spawn(async move {
        if let Err(error) = api.mark_read(&event_id).await {
            warn!(%error, id = %event_id, "mark-read ack failed");
        }
    });
}

pub(crate) fn mark_all_read(state: &Arc<ClientState>) {
    {
        let mut unread = state.unread.lock().unwrap_or_else(|e| e.into_inner());
        *unread = 0;
    }

    let api = state.api.clone();
    tokio::spawn(async move {
        match api.mark_all_read().await {
            Ok(affected) => debug!(affected, "marked all notifications read"),
            Err(error) => warn!(%error, "mark-all-read ack failed"),
        }
    });
}

/// Replace local unread count and feed with a REST snapshot. Snapshot ids are
/// marked seen so a transport replay of one of them is not re-delivered. On
/// failure, prior local state is left untouched.
pub(crate) async fn refresh(state: &Arc<ClientState>) -> Result<(), NotifyError> {
    let count = state.api.fetch_unread_count().await?;
    let page = state
        .api
        .fetch_notifications(state.config.page_limit, 0, false)
        .await?;

    {
        let mut seen = state.seen_ids.lock().unwrap_or_else(|e| e.into_inner());
        for event in &page {
            seen.insert(event.id.clone());
        }
    }
    {
        let mut feed = state.feed.lock().unwrap_or_else(|e| e.into_inner());
        *feed = page;
    }
    {
        let mut unread = state.unread.lock().unwrap_or_else(|e| e.into_inner());
        *unread = count;
    }

    debug!(count, "unread count reconciled from snapshot");
    Ok(())
}

pub(crate) fn unread_count(state: &ClientState) -> u64 {
    *state.unread.lock().unwrap_or_else(|e| e.into_inner())
}

pub(crate) fn feed_snapshot(state: &ClientState) -> Vec<NotificationEvent> {
    state.feed.lock().unwrap_or_else(|e| e.into_inner()).clone()
}
