use std::{
    collections::HashSet,
    sync::{atomic::AtomicU64, Arc, Mutex},
};

use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use crate::{
    api::ApiClient,
    notifications::Presenter,
    settings::{ClientConfig, NotificationPreferences},
};

/// Lifecycle of the push channel.
///
/// `Exhausted` is terminal: automatic reconnection gave up after the attempt
/// ceiling and only an explicit `connect` call leaves this state.
#[derive(Debug, Serialize, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Backoff,
    Exhausted,
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            ConnectionState::Disconnected => "Disconnected",
            ConnectionState::Connecting => "Connecting",
            ConnectionState::Connected => "Connected",
            ConnectionState::Backoff => "Backoff",
            ConnectionState::Exhausted => "Exhausted",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    NewMessage,
    PaymentReceived,
    TranslatorAccepted,
    TranslatorRejected,
    TranslationReady,
    InternalNote,
    DeadlineWarning,
    DeadlinePassed,
}

/// One server-pushed event. `id` is the deduplication key; an id seen once in
/// a session is never delivered to subscribers again.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct NotificationEvent {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: NotificationKind,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub entity_type: Option<String>,
    #[serde(default)]
    pub entity_id: Option<String>,
    #[serde(default)]
    pub action_url: Option<String>,
    #[serde(default)]
    pub requires_sound: bool,
    #[serde(default)]
    pub created_at: String,
}

/// Envelope shape for notification frames. `data.id` and `data.type` are
/// required; a frame missing either fails to decode and is dropped.
#[derive(Debug, Deserialize)]
pub(crate) struct StreamEnvelope {
    #[serde(rename = "type")]
    pub(crate) kind: String,
    pub(crate) data: NotificationEvent,
}

#[derive(Debug, Deserialize)]
pub(crate) struct NotificationListWire {
    #[serde(default)]
    pub(crate) notifications: Vec<NotificationEvent>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct UnreadCountWire {
    pub(crate) count: u64,
}

#[derive(Debug, Deserialize)]
pub(crate) struct MarkAllReadWire {
    #[serde(default)]
    pub(crate) affected: u64,
}

pub(crate) struct RuntimeState {
    pub(crate) stop_tx: Option<watch::Sender<bool>>,
    /// Incremented every time a new stream task is spawned. The task captures
    /// its epoch at spawn time and only writes cleanup state if the epoch
    /// still matches, preventing a late-exiting superseded task from
    /// clobbering a freshly started replacement task's state.
    pub(crate) stream_epoch: u64,
    pub(crate) should_run: bool,
    pub(crate) user_id: Option<String>,
    pub(crate) reconnect_attempts: u32,
    pub(crate) backoff_ms: u64,
    pub(crate) last_connected_at: Option<u64>,
    pub(crate) last_stream_event_at: Option<u64>,
    pub(crate) last_event_at: Option<u64>,
    pub(crate) last_event_id: Option<String>,
    pub(crate) last_error: Option<String>,
}

impl Default for RuntimeState {
    fn default() -> Self {
        Self {
            stop_tx: None,
            stream_epoch: 0,
            should_run: false,
            user_id: None,
            reconnect_attempts: 0,
            backoff_ms: 0,
            last_connected_at: None,
            last_stream_event_at: None,
            last_event_at: None,
            last_event_id: None,
            last_error: None,
        }
    }
}

pub(crate) type SubscriberFn = dyn Fn(&NotificationEvent) + Send + Sync;

/// Shared state behind every `NotifyClient` handle.
///
/// All mutable pieces sit behind their own `Mutex`; locks are never held
/// across an await point or a subscriber callback.
pub(crate) struct ClientState {
    pub(crate) config: ClientConfig,
    pub(crate) api: ApiClient,
    pub(crate) presenter: Arc<dyn Presenter>,
    pub(crate) runtime: Mutex<RuntimeState>,
    pub(crate) state_tx: watch::Sender<ConnectionState>,
    pub(crate) seen_ids: Mutex<HashSet<String>>,
    pub(crate) unread: Mutex<u64>,
    pub(crate) feed: Mutex<Vec<NotificationEvent>>,
    pub(crate) prefs: Mutex<NotificationPreferences>,
    pub(crate) subscribers: Mutex<Vec<(u64, Arc<SubscriberFn>)>>,
    pub(crate) next_subscriber_id: AtomicU64,
}

impl ClientState {
    pub(crate) fn new(
        config: ClientConfig,
        presenter: Arc<dyn Presenter>,
        prefs: NotificationPreferences,
    ) -> Self {
        let api = ApiClient::new(config.base_url.clone(), config.token.clone());
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            config,
            api,
            presenter,
            runtime: Mutex::new(RuntimeState::default()),
            state_tx,
            seen_ids: Mutex::new(HashSet::new()),
            unread: Mutex::new(0),
            feed: Mutex::new(Vec::new()),
            prefs: Mutex::new(prefs),
            subscribers: Mutex::new(Vec::new()),
            next_subscriber_id: AtomicU64::new(1),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_decodes_notification_frame() {
        let envelope: StreamEnvelope = serde_json::from_str(
            r#"{"type":"notification","data":{"id":"n1","type":"new_message","title":"New message","message":"hello","requires_sound":true}}"#,
        )
        .unwrap();
        assert_eq!(envelope.kind, "notification");
        assert_eq!(envelope.data.id, "n1");
        assert_eq!(envelope.data.kind, NotificationKind::NewMessage);
        assert!(envelope.data.requires_sound);
        assert!(envelope.data.action_url.is_none());
    }

    #[test]
    fn envelope_requires_event_id() {
        let result = serde_json::from_str::<StreamEnvelope>(
            r#"{"type":"notification","data":{"type":"new_message","title":"x"}}"#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn envelope_requires_event_kind() {
        let result = serde_json::from_str::<StreamEnvelope>(
            r#"{"type":"notification","data":{"id":"n1","title":"x"}}"#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn unknown_kind_is_a_decode_error() {
        let result = serde_json::from_str::<StreamEnvelope>(
            r#"{"type":"notification","data":{"id":"n1","type":"solar_flare"}}"#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn kind_uses_snake_case_on_the_wire() {
        let json = serde_json::to_string(&NotificationKind::PaymentReceived).unwrap();
        assert_eq!(json, r#""payment_received""#);
        let kind: NotificationKind = serde_json::from_str(r#""deadline_warning""#).unwrap();
        assert_eq!(kind, NotificationKind::DeadlineWarning);
    }
}
