// ── Core error types ──
//
// User-facing errors from duetwatch-core. Consumers never see raw HTTP
// statuses or JSON parse failures; the `From<duetwatch_api::Error>` impl
// translates transport-layer errors into domain variants.

use thiserror::Error;

use crate::merge::MergeError;

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Connection errors ────────────────────────────────────────────
    #[error("Cannot connect to board at {url}: {reason}")]
    ConnectionFailed { url: String, reason: String },

    #[error("Authentication failed: {message}")]
    AuthenticationFailed { message: String },

    #[error("Board session expired -- reconnect required")]
    SessionExpired,

    #[error("Timed out waiting for {operation}")]
    Timeout { operation: String },

    #[error("Printer disconnected")]
    Disconnected,

    #[error("Board overloaded (HTTP 503)")]
    Overloaded,

    // ── Data errors ──────────────────────────────────────────────────
    /// An update tried to grow an array subtree. Never retried.
    #[error(
        "Array length mismatch at '{key}': update has {source_len} elements, current has {destination_len}"
    )]
    LengthMismatch {
        key: String,
        source_len: usize,
        destination_len: usize,
    },

    #[error("Protocol error: {message}")]
    Protocol { message: String },

    // ── API errors (wrapped, not exposed raw) ────────────────────────
    #[error("API error: {message}")]
    Api {
        message: String,
        /// HTTP status code (if applicable).
        status: Option<u16>,
    },

    // ── Configuration errors ─────────────────────────────────────────
    #[error("Configuration error: {message}")]
    Config { message: String },
}

impl CoreError {
    /// Errors that indicate a logic or protocol bug rather than a flaky
    /// board. The poller stops instead of ticking again.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::LengthMismatch { .. })
    }

    /// Whether reconnecting is likely to clear the error.
    pub fn is_session_expired(&self) -> bool {
        matches!(self, Self::SessionExpired)
    }
}

// ── Conversion from transport-layer errors ───────────────────────────

impl From<duetwatch_api::Error> for CoreError {
    fn from(err: duetwatch_api::Error) -> Self {
        use duetwatch_api::Error as ApiError;

        match err {
            ApiError::Authentication { message } => CoreError::AuthenticationFailed { message },
            ApiError::NoFreeSession => CoreError::ConnectionFailed {
                url: String::new(),
                reason: "no free session slot on the board".into(),
            },
            ApiError::SessionExpired => CoreError::SessionExpired,
            ApiError::Transport(ref e) => {
                if e.is_timeout() {
                    CoreError::Timeout {
                        operation: "board response".into(),
                    }
                } else if e.is_connect() {
                    CoreError::ConnectionFailed {
                        url: e
                            .url()
                            .map_or_else(|| "<unknown>".into(), ToString::to_string),
                        reason: e.to_string(),
                    }
                } else {
                    CoreError::Api {
                        message: e.to_string(),
                        status: e.status().map(|s| s.as_u16()),
                    }
                }
            }
            ApiError::InvalidUrl(e) => CoreError::Config {
                message: format!("Invalid URL: {e}"),
            },
            ApiError::Tls(msg) => CoreError::ConnectionFailed {
                url: String::new(),
                reason: format!("TLS error: {msg}"),
            },
            ApiError::ServiceUnavailable => CoreError::Overloaded,
            ApiError::Status { status, body } => CoreError::Api {
                message: body,
                status: Some(status),
            },
            ApiError::Deserialization { message, .. } => CoreError::Protocol { message },
            ApiError::Protocol(message) => CoreError::Protocol { message },
        }
    }
}

impl From<MergeError> for CoreError {
    fn from(err: MergeError) -> Self {
        match err {
            MergeError::LengthMismatch {
                key,
                source_len,
                destination_len,
            } => CoreError::LengthMismatch {
                key,
                source_len,
                destination_len,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_errors_translate_to_domain_variants() {
        assert!(matches!(
            CoreError::from(duetwatch_api::Error::ServiceUnavailable),
            CoreError::Overloaded
        ));
        assert!(CoreError::from(duetwatch_api::Error::SessionExpired).is_session_expired());
        assert!(matches!(
            CoreError::from(duetwatch_api::Error::Status {
                status: 500,
                body: "boom".into()
            }),
            CoreError::Api {
                status: Some(500),
                ..
            }
        ));
    }

    #[test]
    fn only_length_mismatch_is_fatal() {
        let mismatch = CoreError::from(MergeError::LengthMismatch {
            key: "tools".into(),
            source_len: 3,
            destination_len: 2,
        });
        assert!(mismatch.is_fatal());
        assert!(!CoreError::Overloaded.is_fatal());
        assert!(!CoreError::SessionExpired.is_fatal());
    }
}
