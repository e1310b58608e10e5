use std::{
    collections::HashMap,
    fs,
    path::{Path, PathBuf},
    sync::atomic::{AtomicU64, Ordering},
};

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::{
    consts::{DEFAULT_CACHE_LIMIT, DEFAULT_PAGE_LIMIT, MAX_CACHE_LIMIT, NOTIFICATIONS_WS_PATH},
    error::NotifyError,
    model::NotificationKind,
};

/// Monotonic counter for generating unique temp-file suffixes.
static FILE_SUFFIX_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Host-supplied configuration for one authenticated session.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct ClientConfig {
    /// Backend origin, e.g. `https://api.linguadesk.example`. Serves both the
    /// REST collaborator and (scheme-swapped) the push endpoint.
    pub base_url: String,
    /// Bearer token attached to REST calls and the stream handshake.
    pub token: Option<String>,
    /// Upper bound on the in-memory notification feed.
    pub cache_limit: usize,
    /// Page size used by `refresh`.
    pub page_limit: usize,
    /// Optional on-disk cache for notification preferences, so the
    /// presentation gate has settings before the first backend fetch.
    pub preferences_path: Option<PathBuf>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            token: None,
            cache_limit: DEFAULT_CACHE_LIMIT,
            page_limit: DEFAULT_PAGE_LIMIT,
            preferences_path: None,
        }
    }
}

/// Quiet-hours schedule. The weekday window is a half-open circular interval
/// over hours of the day; `start == end` means the whole day. Weekends are
/// quiet only when `weekend_all_day` is set.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct QuietHours {
    pub weekday_start: Option<u8>,
    pub weekday_end: Option<u8>,
    pub weekend_all_day: bool,
}

impl Default for QuietHours {
    fn default() -> Self {
        Self {
            weekday_start: None,
            weekday_end: None,
            weekend_all_day: false,
        }
    }
}

/// Read-mostly user settings consulted by the presentation gate. Fetched from
/// and updated through the backend; the core never mutates them on its own.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct NotificationPreferences {
    pub enabled: bool,
    pub sound_enabled: bool,
    pub desktop_enabled: bool,
    pub vibration_enabled: bool,
    /// Per-kind enable map; a kind absent from the map is enabled.
    pub kinds: HashMap<NotificationKind, bool>,
    pub quiet_hours: QuietHours,
}

impl Default for NotificationPreferences {
    fn default() -> Self {
        Self {
            enabled: true,
            sound_enabled: true,
            desktop_enabled: true,
            vibration_enabled: false,
            kinds: HashMap::new(),
            quiet_hours: QuietHours::default(),
        }
    }
}

impl NotificationPreferences {
    pub fn kind_enabled(&self, kind: NotificationKind) -> bool {
        self.kinds.get(&kind).copied().unwrap_or(true)
    }
}

pub(crate) fn normalize_cache_limit(limit: usize) -> usize {
    if limit == 0 {
        return DEFAULT_CACHE_LIMIT;
    }
    limit.min(MAX_CACHE_LIMIT)
}

pub(crate) fn normalize_base_url(input: &str) -> Result<String, NotifyError> {
    let trimmed = input.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        return Err(NotifyError::Config("server URL is required".to_string()));
    }

    let url = reqwest::Url::parse(trimmed)
        .map_err(|error| NotifyError::InvalidUrl(format!("{trimmed}: {error}")))?;

    let scheme = url.scheme();
    if scheme != "http" && scheme != "https" {
        return Err(NotifyError::InvalidUrl(
            "server URL must start with http:// or https://".to_string(),
        ));
    }

    Ok(trimmed.to_string())
}

/// Build the push-endpoint URL for a user, upgrading the origin scheme to the
/// matching WebSocket scheme.
pub(crate) fn build_notifications_ws_url(
    base_url: &str,
    user_id: &str,
) -> Result<String, NotifyError> {
    if user_id.trim().is_empty() {
        return Err(NotifyError::Config("user id is required".to_string()));
    }

    let mut ws_url = reqwest::Url::parse(base_url)
        .map_err(|error| NotifyError::InvalidUrl(format!("{base_url}: {error}")))?;

    match ws_url.scheme() {
        "http" => {
            ws_url
                .set_scheme("ws")
                .map_err(|_| NotifyError::InvalidUrl("unable to convert URL scheme to ws".to_string()))?;
        }
        "https" => {
            ws_url
                .set_scheme("wss")
                .map_err(|_| NotifyError::InvalidUrl("unable to convert URL scheme to wss".to_string()))?;
        }
        _ => {
            return Err(NotifyError::InvalidUrl(
                "server URL must start with http:// or https://".to_string(),
            ))
        }
    }

    let mut path = ws_url.path().trim_end_matches('/').to_string();
    path.push_str(NOTIFICATIONS_WS_PATH);
    path.push('/');
    path.push_str(user_id.trim());
    ws_url.set_path(&path);
    Ok(ws_url.to_string())
}

/// Load cached preferences from disk. A missing or unreadable cache degrades
/// to defaults; the next successful preferences fetch rewrites it.
pub(crate) fn read_cached_preferences(path: &Path) -> NotificationPreferences {
    if !path.exists() {
        return NotificationPreferences::default();
    }

    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(error) => {
            warn!(?path, %error, "failed to read preferences cache");
            return NotificationPreferences::default();
        }
    };
    match serde_json::from_str::<NotificationPreferences>(&content) {
        Ok(prefs) => prefs,
        Err(error) => {
            warn!(?path, %error, "preferences cache parse failed, using defaults");
            NotificationPreferences::default()
        }
    }
}

pub(crate) fn save_cached_preferences(
    path: &Path,
    prefs: &NotificationPreferences,
) -> Result<(), NotifyError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let content = serde_json::to_string_pretty(prefs)?;
    let tmp_path = path.with_extension(format!("tmp-{}", unique_time_suffix()));
    fs::write(&tmp_path, content)?;
    restrict_file_permissions(&tmp_path);
    fs::rename(&tmp_path, path)?;
    Ok(())
}

pub(crate) fn unique_time_suffix() -> u64 {
    FILE_SUFFIX_COUNTER.fetch_add(1, Ordering::Relaxed)
}

#[cfg(unix)]
pub(crate) fn restrict_file_permissions(path: &Path) {
    use std::os::unix::fs::PermissionsExt as _;

    if path.exists() {
        if let Err(error) = fs::set_permissions(path, fs::Permissions::from_mode(0o600)) {
            warn!(?path, %error, "failed to restrict preferences cache permissions");
        }
    }
}

#[cfg(not(unix))]
pub(crate) fn restrict_file_permissions(_path: &Path) {}
