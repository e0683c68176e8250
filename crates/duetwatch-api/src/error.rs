use thiserror::Error;

/// Top-level error type for the `duetwatch-api` crate.
///
/// Covers every failure mode of the RepRapFirmware HTTP surface:
/// session handling, transport, HTTP status codes, and payload decoding.
/// `duetwatch-core` maps these into user-facing diagnostics.
#[derive(Debug, Error)]
pub enum Error {
    // ── Session ─────────────────────────────────────────────────────
    /// `rr_connect` rejected the password (`err: 1`).
    #[error("Authentication failed: {message}")]
    Authentication { message: String },

    /// `rr_connect` refused the session because every slot is taken (`err: 2`).
    #[error("No free session slot on the board")]
    NoFreeSession,

    /// The board answered 401: the session timed out or was never opened.
    #[error("Session expired -- reconnect required")]
    SessionExpired,

    // ── Transport ───────────────────────────────────────────────────
    /// HTTP transport error (connection refused, DNS failure, timeout, etc.)
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// URL parsing error.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// TLS setup error.
    #[error("TLS error: {0}")]
    Tls(String),

    // ── HTTP status ─────────────────────────────────────────────────
    /// HTTP 503. The board's reply buffer is saturated.
    #[error("Service unavailable (HTTP 503)")]
    ServiceUnavailable,

    /// Any other non-success status.
    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    // ── Data ────────────────────────────────────────────────────────
    /// JSON deserialization failed, with the raw body for debugging.
    #[error("Deserialization error: {message}")]
    Deserialization { message: String, body: String },

    /// The board answered with a well-formed but unexpected payload.
    #[error("Protocol error: {0}")]
    Protocol(String),
}

impl Error {
    /// Returns `true` if this error indicates the session has expired
    /// and reconnecting might resolve it.
    pub fn is_auth_expired(&self) -> bool {
        matches!(self, Self::SessionExpired)
    }

    /// Returns `true` if this is a transient error worth retrying on the
    /// next poll cycle.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport(e) => e.is_timeout() || e.is_connect(),
            Self::ServiceUnavailable | Self::NoFreeSession => true,
            _ => false,
        }
    }

    /// The HTTP status code carried by this error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::SessionExpired => Some(401),
            Self::ServiceUnavailable => Some(503),
            Self::Status { status, .. } => Some(*status),
            Self::Transport(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}
