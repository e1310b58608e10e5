pub(crate) const DEFAULT_CACHE_LIMIT: usize = 100;
pub(crate) const MAX_CACHE_LIMIT: usize = 2000;
pub(crate) const DEFAULT_PAGE_LIMIT: usize = 50;
pub(crate) const MAX_API_PAGE_LIMIT: usize = 200;

pub(crate) const STREAM_CONNECT_TIMEOUT_SECS: u64 = 10;
pub(crate) const HEARTBEAT_INTERVAL_SECS: u64 = 30;
pub(crate) const HEARTBEAT_PING_FRAME: &str = "ping";
pub(crate) const HEARTBEAT_ACK_FRAME: &str = "pong";

pub(crate) const RECONNECT_BASE_DELAY_MS: u64 = 1_000;
pub(crate) const RECONNECT_MAX_DELAY_MS: u64 = 30_000;
/// Automatic reconnect attempts before giving up; a later explicit
/// `connect` starts over from zero.
pub(crate) const RECONNECT_MAX_ATTEMPTS: u32 = 5;

pub(crate) const NOTIFICATIONS_WS_PATH: &str = "/ws/notifications";
pub(crate) const ENVELOPE_KIND_NOTIFICATION: &str = "notification";

/// Delay between the navigate signal and the entity-selection signal,
/// giving the target view time to mount.
pub(crate) const NAVIGATE_SELECT_DELAY_MS: u64 = 200;

pub(crate) const LOG_PAYLOAD_PREVIEW_CHARS: usize = 140;
pub(crate) const LOG_ERROR_PREVIEW_CHARS: usize = 300;
