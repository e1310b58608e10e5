use thiserror::Error;

/// Errors surfaced by the notification core.
///
/// Transport-level failures inside the stream task are handled by the
/// reconnect policy and only show up here through diagnostics; the variants
/// below are what callers of the public API can observe directly.
#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("invalid server URL: {0}")]
    InvalidUrl(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("stream connection failed: {0}")]
    Connect(String),

    #[error("stream connection timed out after {0} seconds")]
    ConnectTimeout(u64),

    #[error("stream error: {0}")]
    Stream(String),

    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("request failed with HTTP {status}: {body}")]
    Api { status: u16, body: String },

    #[error("failed to decode payload: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("{0}")]
    Io(#[from] std::io::Error),
}
