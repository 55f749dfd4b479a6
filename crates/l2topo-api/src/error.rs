use thiserror::Error;

/// Top-level error type for the `l2topo-api` crate.
///
/// Covers every failure mode of a device endpoint: collection, transport,
/// payload decoding, and lifecycle. Collection errors are what a running
/// endpoint pushes onto its error stream; `l2topo-core` never treats any of
/// them as fatal.
#[derive(Debug, Error)]
pub enum Error {
    // ── Collection ──────────────────────────────────────────────────
    /// The device could not be reached or refused the request.
    #[error("Endpoint {device} unavailable: {reason}")]
    Unavailable { device: String, reason: String },

    /// The device did not answer within the per-request timeout.
    #[error("Endpoint {device} timed out after {timeout_ms}ms")]
    Timeout { device: String, timeout_ms: u64 },

    /// The device answered with a non-retryable HTTP status.
    #[error("Endpoint {device} rejected the request (HTTP {status})")]
    Rejected { device: String, status: u16 },

    // ── Transport ───────────────────────────────────────────────────
    /// HTTP transport error that could not be classified further.
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// URL parsing error.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// TLS setup or certificate error.
    #[error("TLS error: {0}")]
    Tls(String),

    // ── Data ────────────────────────────────────────────────────────
    /// JSON deserialization failed, with the raw body for debugging.
    #[error("Deserialization error: {message}")]
    Deserialization { message: String, body: String },

    // ── Lifecycle ───────────────────────────────────────────────────
    /// `start()` was called on an endpoint that is already running.
    #[error("Endpoint {device} already started")]
    AlreadyStarted { device: String },

    /// Final value on the error stream of an endpoint that was stopped.
    #[error("Endpoint {device} stopped")]
    Stopped { device: String },
}

impl Error {
    /// Returns `true` if this is a transient error worth retrying.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport(e) => e.is_timeout() || e.is_connect(),
            Self::Timeout { .. } | Self::Unavailable { .. } => true,
            _ => false,
        }
    }

    /// Returns `true` for the terminal `Stopped` marker.
    pub fn is_stopped(&self) -> bool {
        matches!(self, Self::Stopped { .. })
    }

    /// Classify a raw `reqwest` failure for the given device.
    pub(crate) fn from_request(device: &str, err: reqwest::Error, timeout_ms: u64) -> Self {
        if err.is_timeout() {
            Self::Timeout {
                device: device.to_owned(),
                timeout_ms,
            }
        } else if err.is_connect() || err.is_request() {
            Self::Unavailable {
                device: device.to_owned(),
                reason: err.to_string(),
            }
        } else {
            Self::Transport(err)
        }
    }
}
