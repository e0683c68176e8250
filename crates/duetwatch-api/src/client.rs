// RepRapFirmware HTTP client
//
// Wraps `reqwest::Client` with board URL construction, session-key
// propagation, and status-code dispatch. Endpoint groups (session, model,
// gcode) are implemented as inherent methods in separate files to keep
// this module focused on transport mechanics.

use std::sync::{PoisonError, RwLock};

use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use secrecy::SecretString;
use tracing::{debug, trace, warn};
use url::Url;

use crate::error::Error;
use crate::model::{ModelQuery, ModelResponse};
use crate::transport::{DuetTransport, StatusHandler, StatusHandlers, TransportConfig};

const SESSION_KEY_HEADER: &str = "X-Session-Key";
const BODY_PREVIEW_CHARS: usize = 200;

/// Raw HTTP client for a Duet board's `rr_*` API.
///
/// One instance represents one client session on the board. The board
/// keeps a reply buffer per session, which is why the status handler
/// table lives here: whoever owns the replies must hear about 503s.
pub struct DuetClient {
    http: reqwest::Client,
    base_url: Url,
    password: SecretString,
    /// Session key handed out by `rr_connect` on firmware that supports it.
    session_key: RwLock<Option<String>>,
    handlers: StatusHandlers,
}

impl DuetClient {
    /// Create a new client from a `TransportConfig`.
    ///
    /// `base_url` is the board root (e.g. `http://192.168.1.50`).
    pub fn new(
        base_url: Url,
        password: SecretString,
        transport: &TransportConfig,
    ) -> Result<Self, Error> {
        let http = transport.build_client()?;
        Ok(Self::with_client(http, base_url, password))
    }

    /// Create a client with a pre-built `reqwest::Client`.
    pub fn with_client(http: reqwest::Client, base_url: Url, password: SecretString) -> Self {
        Self {
            http,
            base_url: normalize_base_url(base_url),
            password,
            session_key: RwLock::new(None),
            handlers: StatusHandlers::new(),
        }
    }

    /// The board base URL (always ends with `/`).
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub(crate) fn password(&self) -> &SecretString {
        &self.password
    }

    /// The status handler table consulted on every non-success response.
    pub fn status_handlers(&self) -> &StatusHandlers {
        &self.handlers
    }

    // ── Session key management ───────────────────────────────────────

    pub(crate) fn set_session_key(&self, key: Option<String>) {
        if key.is_some() {
            debug!("storing session key");
        }
        *self
            .session_key
            .write()
            .unwrap_or_else(PoisonError::into_inner) = key;
    }

    /// Whether `rr_connect` handed out a session key.
    pub fn has_session_key(&self) -> bool {
        self.session_key
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    fn apply_session(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        let guard = self
            .session_key
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        match guard.as_deref() {
            Some(key) => builder.header(SESSION_KEY_HEADER, key),
            None => builder,
        }
    }

    // ── URL builders ─────────────────────────────────────────────────

    /// Build the URL for an `rr_*` endpoint.
    pub(crate) fn endpoint(&self, name: &str) -> Url {
        let mut url = self.base_url.clone();
        let path = format!("{}{name}", url.path());
        url.set_path(&path);
        url
    }

    // ── Request helpers ──────────────────────────────────────────────

    /// Send a GET request and check the status.
    pub(crate) async fn get(
        &self,
        builder: reqwest::RequestBuilder,
    ) -> Result<reqwest::Response, Error> {
        let resp = self
            .apply_session(builder)
            .send()
            .await
            .map_err(Error::Transport)?;
        self.check_status(resp).await
    }

    pub(crate) fn request(&self, url: Url) -> reqwest::RequestBuilder {
        debug!("GET {}", url);
        self.http.get(url)
    }

    /// GET `url` and decode the JSON body.
    pub(crate) async fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<T, Error> {
        let resp = self.get(self.request(url)).await?;
        let body = resp.text().await.map_err(Error::Transport)?;
        trace!(len = body.len(), "response body received");
        serde_json::from_str(&body).map_err(|e| Error::Deserialization {
            message: format!("{e} (body preview: {:?})", preview(&body)),
            body,
        })
    }

    /// GET `url` and return the raw text body.
    pub(crate) async fn get_text(&self, builder: reqwest::RequestBuilder) -> Result<String, Error> {
        let resp = self.get(builder).await?;
        resp.text().await.map_err(Error::Transport)
    }

    /// Map non-success statuses to errors, running any registered handler
    /// for the status first.
    async fn check_status(&self, resp: reqwest::Response) -> Result<reqwest::Response, Error> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }

        if let Some(Err(e)) = self.handlers.dispatch(status).await {
            warn!(status = status.as_u16(), error = %e, "status handler failed");
        }

        match status {
            StatusCode::UNAUTHORIZED => Err(Error::SessionExpired),
            StatusCode::SERVICE_UNAVAILABLE => Err(Error::ServiceUnavailable),
            _ => {
                let body = resp.text().await.unwrap_or_default();
                Err(Error::Status {
                    status: status.as_u16(),
                    body: preview(&body).to_owned(),
                })
            }
        }
    }
}

impl std::fmt::Debug for DuetClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DuetClient")
            .field("base_url", &self.base_url.as_str())
            .field("session_key", &self.has_session_key())
            .field("handlers", &self.handlers)
            .finish_non_exhaustive()
    }
}

impl DuetTransport for DuetClient {
    async fn connect(&self) -> Result<(), Error> {
        self.rr_connect().await.map(|_| ())
    }

    async fn close(&self) -> Result<(), Error> {
        self.rr_disconnect().await
    }

    async fn fetch_model(&self, query: &ModelQuery) -> Result<ModelResponse, Error> {
        self.rr_model(query).await
    }

    async fn send_command(&self, command: &str, no_reply: bool) -> Result<(), Error> {
        self.rr_gcode(command, no_reply).await.map(|_| ())
    }

    async fn fetch_reply(&self, no_cache: bool) -> Result<String, Error> {
        self.rr_reply(no_cache).await
    }

    fn register_status_handler(&self, status: StatusCode, handler: StatusHandler) {
        self.handlers.register(status, handler);
    }
}

fn normalize_base_url(mut url: Url) -> Url {
    url.set_query(None);
    url.set_fragment(None);
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    url
}

fn preview(body: &str) -> &str {
    match body.char_indices().nth(BODY_PREVIEW_CHARS) {
        Some((idx, _)) => &body[..idx],
        None => body,
    }
}
