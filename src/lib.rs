//! Realtime notification core for the LinguaDesk agency workspace.
//!
//! Owns one persistent push channel per authenticated user (with heartbeat
//! and capped-backoff reconnect), deduplicates incoming events, fans them out
//! to registered subscribers exactly once, keeps an unread counter reconciled
//! against the backend, and gates toast/sound/OS-notification side effects on
//! user preferences and quiet hours.
//!
//! The client is an explicit context object: create it at login, call
//! [`NotifyClient::connect`], and drop it (or call
//! [`NotifyClient::disconnect`]) at logout. Nothing lives at module scope.
//!
//! ```no_run
//! use std::sync::Arc;
//! use linguadesk_notify::{ClientConfig, NoopPresenter, NotifyClient};
//!
//! # async fn run() -> Result<(), linguadesk_notify::NotifyError> {
//! let config = ClientConfig {
//!     base_url: "https://api.linguadesk.example".to_string(),
//!     token: Some("secret".to_string()),
//!     ..ClientConfig::default()
//! };
//! let client = NotifyClient::new(config, Arc::new(NoopPresenter))?;
//! let subscription = client.subscribe(|event| println!("{}: {}", event.id, event.title));
//! client.connect("u1")?;
//! # let _ = subscription;
//! # Ok(())
//! # }
//! ```

mod api;
mod consts;
mod core;
mod diagnostics;
mod dispatch;
mod error;
mod model;
mod navigate;
mod notifications;
mod settings;
mod stream;

use std::sync::Arc;

use tokio::sync::watch;

use model::ClientState;

pub use diagnostics::RuntimeDiagnostics;
pub use dispatch::Subscription;
pub use error::NotifyError;
pub use model::{ConnectionState, NotificationEvent, NotificationKind};
pub use navigate::{resolve_action_url, NavigationTarget};
#[cfg(target_os = "macos")]
pub use notifications::send_macos_notification;
pub use notifications::{NoopPresenter, Presenter};
pub use settings::{ClientConfig, NotificationPreferences, QuietHours};

/// Handle to the notification core for one authenticated session.
///
/// Cheap to pass by reference; dropping the last handle tears the stream
/// down. Must be used from within a tokio runtime: the stream task and
/// fire-and-forget acks are spawned onto it.
pub struct NotifyClient {
    state: Arc<ClientState>,
}

impl NotifyClient {
    pub fn new(config: ClientConfig, presenter: Arc<dyn Presenter>) -> Result<Self, NotifyError> {
        let base_url = settings::normalize_base_url(&config.base_url)?;
        let config = ClientConfig { base_url, ..config };
        let prefs = match config.preferences_path.as_deref() {
            Some(path) => settings::read_cached_preferences(path),
            None => NotificationPreferences::default(),
        };

        Ok(Self {
            state: Arc::new(ClientState::new(config, presenter, prefs)),
        })
    }

    /// Open the push channel for `user_id`. Idempotent while a channel for
    /// the same user is open or connecting; a channel for a different user is
    /// closed first.
    pub fn connect(&self, user_id: &str) -> Result<(), NotifyError> {
        stream::connect(&self.state, user_id)
    }

    /// Close the channel and suppress automatic reconnection. Complete once
    /// it returns: no timer outlives this call.
    pub fn disconnect(&self) {
        stream::disconnect(&self.state);
    }

    pub fn connection_state(&self) -> ConnectionState {
        *self.state.state_tx.borrow()
    }

    /// Watch channel for connection-state observers (e.g. a "disconnected"
    /// badge once reconnection is exhausted).
    pub fn watch_connection_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.state_tx.subscribe()
    }

    /// Register a delivery callback. Every non-duplicate event reaches every
    /// registered subscriber exactly once, in registration order. Callbacks
    /// run on the frame-delivery path and must stay fast.
    pub fn subscribe(
        &self,
        callback: impl Fn(&NotificationEvent) + Send + Sync + 'static,
    ) -> Subscription {
        dispatch::subscribe(&self.state, Arc::new(callback))
    }

    /// Replace the unread counter and notification feed with a backend
    /// snapshot. Called automatically after every successful (re)connect.
    pub async fn refresh(&self) -> Result<(), NotifyError> {
        dispatch::refresh(&self.state).await
    }

    /// Optimistically decrement the unread counter and ack the notification
    /// in the background. Not rolled back on failure; the next `refresh`
    /// reconciles.
    pub fn mark_read(&self, event_id: &str) {
        dispatch::mark_read(&self.state, event_id);
    }

    pub fn mark_all_read(&self) {
        dispatch::mark_all_read(&self.state);
    }

    pub fn unread_count(&self) -> u64 {
        dispatch::unread_count(&self.state)
    }

    /// Snapshot of the in-memory feed, newest first.
    pub fn notifications(&self) -> Vec<NotificationEvent> {
        dispatch::feed_snapshot(&self.state)
    }

    pub fn preferences(&self) -> NotificationPreferences {
        self.state
            .prefs
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Fetch preferences from the backend and replace the cached copy.
    pub async fn sync_preferences(&self) -> Result<NotificationPreferences, NotifyError> {
        let prefs = self.state.api.fetch_preferences().await?;
        self.store_preferences(prefs.clone());
        Ok(prefs)
    }

    /// Push updated preferences to the backend, then adopt them locally.
    pub async fn update_preferences(
        &self,
        prefs: NotificationPreferences,
    ) -> Result<(), NotifyError> {
        self.state.api.update_preferences(&prefs).await?;
        self.store_preferences(prefs);
        Ok(())
    }

    /// React to a click on any effect produced for `event`: resolve its
    /// `action_url`, drive the navigate-then-select choreography, and mark
    /// the event read.
    pub fn handle_notification_click(&self, event: &NotificationEvent) {
        notifications::handle_click(&self.state, event);
    }

    pub fn diagnostics(&self) -> RuntimeDiagnostics {
        diagnostics::snapshot(&self.state)
    }

    fn store_preferences(&self, prefs: NotificationPreferences) {
        if let Some(path) = self.state.config.preferences_path.as_deref() {
            if let Err(error) = settings::save_cached_preferences(path, &prefs) {
                tracing::warn!(%error, "failed to persist preferences cache");
            }
        }
        *self.state.prefs.lock().unwrap_or_else(|e| e.into_inner()) = prefs;
    }
}

impl Drop for NotifyClient {
    fn drop(&mut self) {
        stream::disconnect(&self.state);
    }
}
