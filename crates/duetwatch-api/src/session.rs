// Session endpoints
//
// `rr_connect` opens a client session (and with it a reply buffer slot on
// the board); `rr_disconnect` releases it. Newer firmware hands out a
// session key that must accompany every subsequent request.

use secrecy::ExposeSecret;
use serde::Deserialize;
use tracing::debug;

use crate::client::DuetClient;
use crate::error::Error;

/// Body of a `rr_connect` response.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectResponse {
    /// 0 = ok, 1 = wrong password, 2 = no free session.
    pub err: u8,
    #[serde(default)]
    pub session_timeout: Option<u64>,
    #[serde(default)]
    pub board_type: Option<String>,
    #[serde(default)]
    pub api_level: Option<u32>,
    /// Numeric on current firmware; kept loose for older builds.
    #[serde(default)]
    pub session_key: Option<serde_json::Value>,
}

impl ConnectResponse {
    fn session_key_string(&self) -> Option<String> {
        match self.session_key.as_ref()? {
            serde_json::Value::String(s) => Some(s.clone()),
            serde_json::Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }
}

impl DuetClient {
    /// Open a session with the board password.
    ///
    /// `GET /rr_connect?password=...&time=...`
    pub async fn rr_connect(&self) -> Result<ConnectResponse, Error> {
        let mut url = self.endpoint("rr_connect");
        let time = chrono::Local::now().format("%Y-%m-%dT%H:%M:%S").to_string();
        url.query_pairs_mut()
            .append_pair("password", self.password().expose_secret())
            .append_pair("time", &time);

        debug!(base = %self.base_url(), "connecting to board");
        // A stale key from an earlier session must not be sent with the login.
        self.set_session_key(None);
        let resp: ConnectResponse = self.get_json(url).await?;

        match resp.err {
            0 => {
                self.set_session_key(resp.session_key_string());
                debug!(board = ?resp.board_type, api_level = ?resp.api_level, "session established");
                Ok(resp)
            }
            1 => Err(Error::Authentication {
                message: "invalid board password".into(),
            }),
            2 => Err(Error::NoFreeSession),
            other => Err(Error::Protocol(format!("rr_connect returned err={other}"))),
        }
    }

    /// Close the session.
    ///
    /// `GET /rr_disconnect`
    pub async fn rr_disconnect(&self) -> Result<(), Error> {
        let url = self.endpoint("rr_disconnect");
        debug!("disconnecting from board");
        let result = self.get(self.request(url)).await.map(|_| ());
        self.set_session_key(None);
        result
    }
}
