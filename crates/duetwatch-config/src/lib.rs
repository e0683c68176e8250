//! Profiles and credentials for duetwatch.
//!
//! TOML profiles, password resolution (env + keyring + plaintext), and
//! translation to `duetwatch_core::PrinterConfig`. The CLI layers its
//! flag overrides on top.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

use duetwatch_core::{ApplyPolicy, DEFAULT_PASSWORD, PrinterConfig, TlsVerification};

/// Keyring service name; entries are keyed `"{profile}/password"`.
pub const KEYRING_SERVICE: &str = "duetwatch";

/// Environment variable consulted after a profile's `password_env`.
pub const PASSWORD_ENV: &str = "DUETWATCH_PASSWORD";

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("profile '{name}' not found (available: {available})")]
    ProfileNotFound { name: String, available: String },

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("keyring error: {0}")]
    Keyring(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

impl From<keyring::Error> for ConfigError {
    fn from(err: keyring::Error) -> Self {
        Self::Keyring(err.to_string())
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level TOML configuration.
#[derive(Debug, Deserialize, Serialize)]
pub struct Config {
    /// Profile used when `--profile` is not given.
    pub default_profile: Option<String>,

    #[serde(default)]
    pub defaults: Defaults,

    /// Named printer profiles.
    #[serde(default)]
    pub profiles: HashMap<String, Profile>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_profile: Some("default".into()),
            defaults: Defaults::default(),
            profiles: HashMap::new(),
        }
    }
}

impl Config {
    /// Look up a profile, listing the known names on a miss.
    pub fn profile(&self, name: &str) -> Result<&Profile, ConfigError> {
        self.profiles.get(name).ok_or_else(|| {
            let mut available: Vec<_> = self.profiles.keys().cloned().collect();
            available.sort();
            ConfigError::ProfileNotFound {
                name: name.into(),
                available: if available.is_empty() {
                    "(none)".into()
                } else {
                    available.join(", ")
                },
            }
        })
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Defaults {
    #[serde(default = "default_output")]
    pub output: String,

    /// Per-request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout: u64,

    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Reply wait limit in seconds. Absent means wait forever.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_timeout: Option<u64>,

    #[serde(default)]
    pub apply_policy: ApplyPolicy,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            output: default_output(),
            timeout: default_timeout(),
            poll_interval_ms: default_poll_interval_ms(),
            reply_timeout: None,
            apply_policy: ApplyPolicy::default(),
        }
    }
}

fn default_output() -> String {
    "json".into()
}
fn default_timeout() -> u64 {
    10
}
fn default_poll_interval_ms() -> u64 {
    250
}

/// A named printer profile. Unset fields fall back to [`Defaults`].
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Profile {
    /// Board address: a URL or a bare host (`http://` is assumed).
    pub address: String,

    /// Board password (plaintext; prefer keyring or env var).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,

    /// Environment variable name holding the password.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password_env: Option<String>,

    /// CA certificate for boards behind a TLS proxy.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ca_cert: Option<PathBuf>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub insecure: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub poll_interval_ms: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_timeout: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub apply_policy: Option<ApplyPolicy>,
}

// ── Config file path ────────────────────────────────────────────────

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    ProjectDirs::from("com", "duetwatch", "duetwatch").map_or_else(
        || {
            let mut p = dirs_fallback();
            p.push("config.toml");
            p
        },
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

fn dirs_fallback() -> PathBuf {
    let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
    p.push(".config");
    p.push("duetwatch");
    p
}

// ── Loading and saving ──────────────────────────────────────────────

/// Load the config from the canonical path plus environment.
pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from(&config_path())
}

/// Load the config from `path`, layered over defaults and under
/// `DUETWATCH_*` variables (`__` separates nested keys, e.g.
/// `DUETWATCH_DEFAULTS__TIMEOUT`). A missing file is not an error.
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    let figment = Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed("DUETWATCH_").split("__"));

    Ok(figment.extract()?)
}

/// Load config, returning a default if it is missing or unreadable.
pub fn load_config_or_default() -> Config {
    load_config().unwrap_or_default()
}

/// Serialize config to TOML at the canonical path.
pub fn save_config(cfg: &Config) -> Result<(), ConfigError> {
    save_config_to(cfg, &config_path())
}

pub fn save_config_to(cfg: &Config, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let toml_str = toml::to_string_pretty(cfg)?;
    std::fs::write(path, toml_str)?;
    Ok(())
}

// ── Credential resolution ───────────────────────────────────────────

/// Where a resolved password came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "kebab-case")]
pub enum PasswordSource {
    ProfileEnv,
    Env,
    Keyring,
    Plaintext,
    FirmwareDefault,
}

/// Resolve a profile's password: `password_env` → `DUETWATCH_PASSWORD`
/// → keyring → plaintext → `"reprap"`.
pub fn resolve_password(profile: &Profile, profile_name: &str) -> (SecretString, PasswordSource) {
    if let Some(ref env_name) = profile.password_env {
        if let Ok(val) = std::env::var(env_name) {
            return (SecretString::from(val), PasswordSource::ProfileEnv);
        }
    }

    if let Ok(val) = std::env::var(PASSWORD_ENV) {
        return (SecretString::from(val), PasswordSource::Env);
    }

    if let Ok(entry) = keyring::Entry::new(KEYRING_SERVICE, &keyring_user(profile_name)) {
        if let Ok(pw) = entry.get_password() {
            return (SecretString::from(pw), PasswordSource::Keyring);
        }
    }

    if let Some(ref pw) = profile.password {
        return (SecretString::from(pw.clone()), PasswordSource::Plaintext);
    }

    (
        SecretString::from(DEFAULT_PASSWORD.to_owned()),
        PasswordSource::FirmwareDefault,
    )
}

/// Store a profile's password in the system keyring.
pub fn store_password(profile_name: &str, password: &str) -> Result<(), ConfigError> {
    if password.is_empty() {
        return Err(ConfigError::Validation {
            field: "password".into(),
            reason: "value cannot be empty".into(),
        });
    }
    let entry = keyring::Entry::new(KEYRING_SERVICE, &keyring_user(profile_name))?;
    entry.set_password(password)?;
    Ok(())
}

fn keyring_user(profile_name: &str) -> String {
    format!("{profile_name}/password")
}

// ── Translation ─────────────────────────────────────────────────────

/// Parse a board address. Bare hosts (`192.168.1.50`, `duet.local:8080`)
/// get an `http://` scheme.
pub fn parse_address(address: &str) -> Result<Url, ConfigError> {
    let trimmed = address.trim();
    let candidate = if trimmed.contains("://") {
        trimmed.to_owned()
    } else {
        format!("http://{trimmed}")
    };
    let url = Url::parse(&candidate).map_err(|e| ConfigError::Validation {
        field: "address".into(),
        reason: format!("invalid address '{address}': {e}"),
    })?;
    match url.scheme() {
        "http" | "https" if url.host().is_some() => Ok(url),
        _ => Err(ConfigError::Validation {
            field: "address".into(),
            reason: format!("expected an http(s) board address, got '{address}'"),
        }),
    }
}

/// Build a `PrinterConfig` from a profile, without CLI overrides.
pub fn profile_to_printer_config(
    profile: &Profile,
    profile_name: &str,
    defaults: &Defaults,
) -> Result<PrinterConfig, ConfigError> {
    let mut config = PrinterConfig::new(parse_address(&profile.address)?);
    config.password = resolve_password(profile, profile_name).0;

    config.tls = if profile.insecure.unwrap_or(false) {
        TlsVerification::DangerAcceptInvalid
    } else if let Some(ref ca_path) = profile.ca_cert {
        TlsVerification::CustomCa(ca_path.clone())
    } else {
        TlsVerification::SystemDefaults
    };

    config.timeout = Duration::from_secs(profile.timeout.unwrap_or(defaults.timeout));
    let poll_ms = profile.poll_interval_ms.unwrap_or(defaults.poll_interval_ms);
    if poll_ms == 0 {
        return Err(ConfigError::Validation {
            field: "poll_interval_ms".into(),
            reason: "must be greater than zero".into(),
        });
    }
    config.poll_interval = Duration::from_millis(poll_ms);
    config.reply_timeout = profile
        .reply_timeout
        .or(defaults.reply_timeout)
        .map(Duration::from_secs);
    config.apply_policy = profile.apply_policy.unwrap_or(defaults.apply_policy);

    Ok(config)
}
