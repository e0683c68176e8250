// Command endpoints
//
// `rr_gcode` queues a command; its output lands in the session's reply
// buffer and is read with `rr_reply`.

use serde::Deserialize;
use tracing::debug;

use crate::client::DuetClient;
use crate::error::Error;

#[derive(Debug, Deserialize)]
struct GcodeResponse {
    /// Free space left in the board's G-code input buffer.
    #[serde(default)]
    buff: Option<u32>,
}

impl DuetClient {
    /// Queue a G-code command.
    ///
    /// `GET /rr_gcode?gcode=...`
    ///
    /// With `no_reply` the reply stays buffered on the board and an empty
    /// string is returned; otherwise `rr_reply` is read straight away.
    pub async fn rr_gcode(&self, command: &str, no_reply: bool) -> Result<String, Error> {
        let mut url = self.endpoint("rr_gcode");
        url.query_pairs_mut().append_pair("gcode", command);

        debug!(command, no_reply, "sending gcode");
        let resp: GcodeResponse = self.get_json(url).await?;
        debug!(buff = ?resp.buff, "gcode queued");

        if no_reply {
            Ok(String::new())
        } else {
            self.rr_reply(false).await
        }
    }

    /// Read the buffered reply text (`""` when nothing is pending).
    ///
    /// `GET /rr_reply`
    pub async fn rr_reply(&self, no_cache: bool) -> Result<String, Error> {
        let url = self.endpoint("rr_reply");
        let mut builder = self.request(url);
        if no_cache {
            builder = builder.header(reqwest::header::CACHE_CONTROL, "no-cache");
        }
        self.get_text(builder).await
    }
}
