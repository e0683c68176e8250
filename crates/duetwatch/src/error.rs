//! CLI error types with miette diagnostics.
//!
//! Maps `CoreError` and `ConfigError` into user-facing errors with
//! actionable help text.

use miette::Diagnostic;
use thiserror::Error;

use duetwatch_config::ConfigError;
use duetwatch_core::CoreError;

/// Process exit codes. Success is 0.
pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const AUTH: i32 = 3;
    pub const CONNECTION: i32 = 7;
    pub const TIMEOUT: i32 = 8;
    pub const PROTOCOL: i32 = 9;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Connection ───────────────────────────────────────────────────

    #[error("Could not connect to board at {url}")]
    #[diagnostic(
        code(duetwatch::connection_failed),
        help(
            "Check that the board is powered and reachable.\n\
             Reason: {reason}"
        )
    )]
    ConnectionFailed { url: String, reason: String },

    #[error("Authentication failed")]
    #[diagnostic(
        code(duetwatch::auth_failed),
        help(
            "The board rejected the password.\n\
             Run: duetwatch config set-password --profile {profile}"
        )
    )]
    AuthFailed { profile: String },

    #[error("Timed out waiting for {operation}")]
    #[diagnostic(
        code(duetwatch::timeout),
        help("Increase --timeout or reply_timeout, or check the board's load.")
    )]
    Timeout { operation: String },

    // ── Mirroring ────────────────────────────────────────────────────

    #[error("Mirror stopped: {message}")]
    #[diagnostic(
        code(duetwatch::protocol),
        help("The board sent data the local mirror cannot reconcile. Reconnect to start over.")
    )]
    Protocol { message: String },

    #[error("Board error: {message}")]
    #[diagnostic(code(duetwatch::api))]
    Api { message: String },

    #[error("No value at '{key}' in the object model")]
    #[diagnostic(
        code(duetwatch::not_found),
        help("Run: duetwatch model to see the full tree")
    )]
    KeyNotFound { key: String },

    // ── Configuration ────────────────────────────────────────────────

    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(duetwatch::validation))]
    Validation { field: String, reason: String },

    #[error("Profile '{name}' not found in configuration")]
    #[diagnostic(
        code(duetwatch::profile_not_found),
        help("Available profiles: {available}")
    )]
    ProfileNotFound { name: String, available: String },

    #[error("No board address configured")]
    #[diagnostic(
        code(duetwatch::no_config),
        help(
            "Pass --address, set DUETWATCH_ADDRESS, or add a profile to\n\
             {path}"
        )
    )]
    NoConfig { path: String },

    #[error(transparent)]
    #[diagnostic(code(duetwatch::config))]
    Config(ConfigError),

    // ── IO / Serialization ────────────────────────────────────────────

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Failed to render output: {0}")]
    #[diagnostic(code(duetwatch::render))]
    Render(String),
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::ConnectionFailed { .. } => exit_code::CONNECTION,
            Self::AuthFailed { .. } => exit_code::AUTH,
            Self::Timeout { .. } => exit_code::TIMEOUT,
            Self::Protocol { .. } => exit_code::PROTOCOL,
            Self::Validation { .. } | Self::NoConfig { .. } => exit_code::USAGE,
            _ => exit_code::GENERAL,
        }
    }
}

// ── CoreError → CliError mapping ─────────────────────────────────────

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::ConnectionFailed { url, reason } => Self::ConnectionFailed { url, reason },

            CoreError::AuthenticationFailed { .. } | CoreError::SessionExpired => {
                Self::AuthFailed {
                    profile: "current".into(),
                }
            }

            CoreError::Disconnected => Self::ConnectionFailed {
                url: "(disconnected)".into(),
                reason: "the board session was closed".into(),
            },

            CoreError::Timeout { operation } => Self::Timeout { operation },

            err @ CoreError::LengthMismatch { .. } => Self::Protocol {
                message: err.to_string(),
            },

            CoreError::Protocol { message } => Self::Protocol { message },

            CoreError::Overloaded => Self::Api {
                message: "the board's command buffer is full".into(),
            },

            CoreError::Api { message, status } => Self::Api {
                message: match status {
                    Some(code) => format!("HTTP {code}: {message}"),
                    None => message,
                },
            },

            CoreError::Config { message } => Self::Validation {
                field: "config".into(),
                reason: message,
            },
        }
    }
}

impl From<ConfigError> for CliError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::Validation { field, reason } => Self::Validation { field, reason },
            ConfigError::ProfileNotFound { name, available } => {
                Self::ProfileNotFound { name, available }
            }
            other => Self::Config(other),
        }
    }
}
