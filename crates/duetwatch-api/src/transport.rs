// Transport configuration and the narrow transport contract.
//
// `TransportConfig` builds the reqwest client. `DuetTransport` is the
// surface the core consumes: model polling, fire-and-forget commands,
// reply reads, lifecycle, and a status-code handler table.

use std::collections::HashMap;
use std::future::Future;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use futures_util::future::BoxFuture;
use reqwest::StatusCode;

use crate::error::Error;
use crate::model::{ModelQuery, ModelResponse};

/// TLS verification mode. Duet boards usually speak plain HTTP; HTTPS
/// only matters behind a reverse proxy.
#[derive(Debug, Clone)]
pub enum TlsMode {
    /// Use the system certificate store.
    System,
    /// Use a custom CA certificate from the given PEM file.
    CustomCa(PathBuf),
    /// Accept any certificate (for self-signed proxies).
    DangerAcceptInvalid,
}

/// Shared transport configuration for building HTTP clients.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    pub tls: TlsMode,
    pub timeout: Duration,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            tls: TlsMode::System,
            timeout: Duration::from_secs(10),
        }
    }
}

impl TransportConfig {
    /// Build a `reqwest::Client` from this config.
    pub fn build_client(&self) -> Result<reqwest::Client, Error> {
        let mut builder = reqwest::Client::builder()
            .timeout(self.timeout)
            .user_agent(concat!("duetwatch/", env!("CARGO_PKG_VERSION")));

        match &self.tls {
            TlsMode::System => {}
            TlsMode::CustomCa(path) => {
                let cert_pem = std::fs::read(path)
                    .map_err(|e| Error::Tls(format!("failed to read CA cert: {e}")))?;
                let cert = reqwest::Certificate::from_pem(&cert_pem)
                    .map_err(|e| Error::Tls(format!("invalid CA cert: {e}")))?;
                builder = builder.add_root_certificate(cert);
            }
            TlsMode::DangerAcceptInvalid => {
                builder = builder.danger_accept_invalid_certs(true);
            }
        }

        builder
            .build()
            .map_err(|e| Error::Tls(format!("failed to build HTTP client: {e}")))
    }
}

// ── Status handlers ──────────────────────────────────────────────────

/// Async callback invoked when the transport observes a given HTTP status.
///
/// The returned future runs to completion before the failing request
/// returns its error to the caller.
pub type StatusHandler =
    Arc<dyn Fn(StatusCode) -> BoxFuture<'static, Result<(), Error>> + Send + Sync>;

/// Status code -> handler mapping owned by a transport.
///
/// Dispatch is not re-entrant: a status observed while a handler is
/// already running (for example a 503 seen by the drain itself) is not
/// dispatched a second time.
#[derive(Default)]
pub struct StatusHandlers {
    handlers: RwLock<HashMap<StatusCode, StatusHandler>>,
    dispatching: AtomicBool,
}

impl StatusHandlers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) the handler for `status`.
    pub fn register(&self, status: StatusCode, handler: StatusHandler) {
        self.handlers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(status, handler);
    }

    pub fn is_registered(&self, status: StatusCode) -> bool {
        self.handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(&status)
    }

    /// Run the handler registered for `status`, if any.
    ///
    /// Returns `None` when nothing ran (no handler, or a dispatch is
    /// already in progress), otherwise the handler's own result.
    pub async fn dispatch(&self, status: StatusCode) -> Option<Result<(), Error>> {
        let handler = self
            .handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&status)
            .cloned()?;

        if self
            .dispatching
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return None;
        }
        let _reset = DispatchGuard(&self.dispatching);

        Some(handler.as_ref()(status).await)
    }
}

impl std::fmt::Debug for StatusHandlers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut codes: Vec<u16> = self
            .handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .map(StatusCode::as_u16)
            .collect();
        codes.sort_unstable();
        f.debug_struct("StatusHandlers")
            .field("codes", &codes)
            .finish_non_exhaustive()
    }
}

struct DispatchGuard<'a>(&'a AtomicBool);

impl Drop for DispatchGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

// ── Transport contract ───────────────────────────────────────────────

/// Everything the object-model mirror needs from a board connection.
///
/// Implemented by [`DuetClient`](crate::DuetClient); tests substitute
/// scripted fakes.
pub trait DuetTransport: Send + Sync + 'static {
    /// Open a session.
    fn connect(&self) -> impl Future<Output = Result<(), Error>> + Send;

    /// Close the session.
    fn close(&self) -> impl Future<Output = Result<(), Error>> + Send;

    /// Fetch one page of the object model.
    fn fetch_model(
        &self,
        query: &ModelQuery,
    ) -> impl Future<Output = Result<ModelResponse, Error>> + Send;

    /// Queue a G-code command. With `no_reply` the command's output is
    /// left in the board's reply buffer for a later [`fetch_reply`](Self::fetch_reply).
    fn send_command(
        &self,
        command: &str,
        no_reply: bool,
    ) -> impl Future<Output = Result<(), Error>> + Send;

    /// Read the buffered reply text; `""` when nothing is buffered.
    fn fetch_reply(&self, no_cache: bool) -> impl Future<Output = Result<String, Error>> + Send;

    /// Register an async handler invoked whenever `status` is observed.
    fn register_status_handler(&self, status: StatusCode, handler: StatusHandler);
}
