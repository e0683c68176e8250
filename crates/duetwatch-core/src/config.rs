// ── Runtime connection configuration ──
//
// Describes how to reach one board and how to mirror it. Carries the
// credential but never touches disk; the CLI builds a `PrinterConfig`
// from its profile and hands it in.

use std::time::Duration;

use secrecy::SecretString;
use url::Url;

use crate::sync::ApplyPolicy;

/// Password RepRapFirmware uses when none is configured.
pub const DEFAULT_PASSWORD: &str = "reprap";

/// TLS verification strategy.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum TlsVerification {
    /// System CA store (strict). Default; boards normally speak plain HTTP.
    #[default]
    SystemDefaults,
    /// Custom CA certificate file.
    CustomCa(std::path::PathBuf),
    /// Skip verification (self-signed reverse proxies).
    DangerAcceptInvalid,
}

/// Configuration for mirroring a single board.
#[derive(Debug, Clone)]
pub struct PrinterConfig {
    /// Board URL (e.g., `http://192.168.1.50`).
    pub address: Url,
    pub password: SecretString,
    pub tls: TlsVerification,
    /// Per-request HTTP timeout.
    pub timeout: Duration,
    /// Delay between poller ticks.
    pub poll_interval: Duration,
    /// Upper bound on waiting for a command reply. `None` waits forever.
    pub reply_timeout: Option<Duration>,
    pub apply_policy: ApplyPolicy,
}

impl PrinterConfig {
    /// Defaults for everything but the address.
    pub fn new(address: Url) -> Self {
        Self {
            address,
            password: SecretString::from(DEFAULT_PASSWORD.to_owned()),
            tls: TlsVerification::default(),
            timeout: Duration::from_secs(10),
            poll_interval: Duration::from_millis(250),
            reply_timeout: None,
            apply_policy: ApplyPolicy::default(),
        }
    }

    pub(crate) fn transport_config(&self) -> duetwatch_api::TransportConfig {
        let tls = match &self.tls {
            TlsVerification::SystemDefaults => duetwatch_api::TlsMode::System,
            TlsVerification::CustomCa(path) => duetwatch_api::TlsMode::CustomCa(path.clone()),
            TlsVerification::DangerAcceptInvalid => duetwatch_api::TlsMode::DangerAcceptInvalid,
        };
        duetwatch_api::TransportConfig {
            tls,
            timeout: self.timeout,
        }
    }
}
