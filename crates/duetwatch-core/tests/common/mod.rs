// Scripted in-memory board shared by the integration tests.

#![allow(dead_code, clippy::unwrap_used)]

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};

use duetwatch_api::{
    DuetTransport, Error, ModelQuery, ModelResponse, StatusCode, StatusHandler, StatusHandlers,
};
use serde_json::{Value, json};

/// A board whose object model lives in a `serde_json::Value` the test can
/// mutate between ticks. Depth limits and array paging are emulated the
/// way the firmware applies them.
#[derive(Default)]
pub struct FakeBoard {
    state: Mutex<BoardState>,
    handlers: StatusHandlers,
}

type Mutation = Box<dyn FnOnce(&mut Value) + Send>;

#[derive(Default)]
struct BoardState {
    model: Value,
    page_sizes: HashMap<String, usize>,
    failing_keys: HashSet<String>,
    replies: VecDeque<String>,
    overload_commands: usize,
    expire_next_poll: bool,
    after_query: Option<(String, Mutation)>,
    queries: Vec<ModelQuery>,
    commands: Vec<String>,
    reply_reads: usize,
    connects: usize,
    closes: usize,
}

impl FakeBoard {
    pub fn new(model: Value) -> Arc<Self> {
        let board = Self::default();
        board.state.lock().unwrap().model = model;
        Arc::new(board)
    }

    /// A small but realistically shaped object model.
    pub fn sample_model() -> Value {
        json!({
            "boards": [{ "firmwareName": "RepRapFirmware", "firmwareVersion": "3.5.1" }],
            "job": {
                "file": { "fileName": null, "size": 0 },
                "layer": null,
                "lastFileName": "0:/gcodes/benchy.gcode"
            },
            "move": {
                "axes": [
                    { "letter": "X", "homed": false },
                    { "letter": "Y", "homed": false },
                    { "letter": "Z", "homed": false }
                ],
                "speedFactor": 1.0
            },
            "seqs": { "reply": 5, "job": 2, "move": 7, "volChanges": [0, 0] },
            "state": { "status": "idle", "upTime": 120 },
            "tools": [{ "number": 0, "name": "T0" }, { "number": 1, "name": "T1" }]
        })
    }

    pub fn update(&self, f: impl FnOnce(&mut Value)) {
        f(&mut self.state.lock().unwrap().model);
    }

    /// Set one sequence counter.
    pub fn bump(&self, key: &str, value: u64) {
        self.update(|model| model["seqs"][key] = json!(value));
    }

    /// Serve the array under `key` in pages of `size` elements.
    pub fn paginate(&self, key: &str, size: usize) {
        self.state
            .lock()
            .unwrap()
            .page_sizes
            .insert(key.to_owned(), size);
    }

    /// Answer every model request for `key` (or below it) with HTTP 500.
    pub fn fail_key(&self, key: &str) {
        self.state
            .lock()
            .unwrap()
            .failing_keys
            .insert(key.to_owned());
    }

    pub fn heal_key(&self, key: &str) {
        self.state.lock().unwrap().failing_keys.remove(key);
    }

    pub fn queue_replies<I, S>(&self, replies: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.state
            .lock()
            .unwrap()
            .replies
            .extend(replies.into_iter().map(Into::into));
    }

    /// The next `count` commands are answered with HTTP 503.
    pub fn overload_commands(&self, count: usize) {
        self.state.lock().unwrap().overload_commands = count;
    }

    /// The next `seqs` poll is answered with HTTP 401.
    pub fn expire_session(&self) {
        self.state.lock().unwrap().expire_next_poll = true;
    }

    /// Mutate the model right after the next query for `key` is answered,
    /// as if the board changed while a walk was under way.
    pub fn after_query(&self, key: &str, f: impl FnOnce(&mut Value) + Send + 'static) {
        self.state.lock().unwrap().after_query = Some((key.to_owned(), Box::new(f)));
    }

    pub fn queries(&self) -> Vec<ModelQuery> {
        self.state.lock().unwrap().queries.clone()
    }

    pub fn queried_keys(&self) -> Vec<String> {
        self.queries().into_iter().map(|q| q.key).collect()
    }

    pub fn clear_log(&self) {
        let mut state = self.state.lock().unwrap();
        state.queries.clear();
        state.reply_reads = 0;
    }

    pub fn commands(&self) -> Vec<String> {
        self.state.lock().unwrap().commands.clone()
    }

    pub fn reply_reads(&self) -> usize {
        self.state.lock().unwrap().reply_reads
    }

    pub fn pending_replies(&self) -> usize {
        self.state.lock().unwrap().replies.len()
    }

    pub fn connects(&self) -> usize {
        self.state.lock().unwrap().connects
    }

    pub fn closes(&self) -> usize {
        self.state.lock().unwrap().closes
    }

    fn answer(&self, query: &ModelQuery) -> Result<ModelResponse, Error> {
        let mut state = self.state.lock().unwrap();
        let response = Self::respond(&mut state, query);
        if state
            .after_query
            .as_ref()
            .is_some_and(|(key, _)| *key == query.key)
        {
            if let Some((_, mutate)) = state.after_query.take() {
                mutate(&mut state.model);
            }
        }
        response
    }

    fn respond(state: &mut BoardState, query: &ModelQuery) -> Result<ModelResponse, Error> {
        state.queries.push(query.clone());

        if query.key == "seqs" && query.flags.frequently && state.expire_next_poll {
            state.expire_next_poll = false;
            return Err(Error::SessionExpired);
        }
        let failing = state
            .failing_keys
            .iter()
            .any(|k| query.key == *k || query.key.starts_with(&format!("{k}.")));
        if failing {
            return Err(Error::Status {
                status: 500,
                body: "internal".into(),
            });
        }

        let value = lookup(&state.model, &query.key).unwrap_or(Value::Null);
        let value = truncate(&value, query.depth);

        if let (Value::Array(items), Some(&size)) = (&value, state.page_sizes.get(&query.key)) {
            let offset = usize::try_from(query.array.unwrap_or(0)).unwrap();
            let end = (offset + size).min(items.len());
            let next = if end < items.len() {
                u64::try_from(end).unwrap()
            } else {
                0
            };
            return Ok(ModelResponse {
                key: Some(query.key.clone()),
                flags: Some(query.flags_param()),
                result: Value::Array(items[offset..end].to_vec()),
                next: Some(next),
            });
        }

        Ok(ModelResponse {
            key: Some(query.key.clone()),
            flags: Some(query.flags_param()),
            result: value,
            next: None,
        })
    }
}

fn lookup(model: &Value, key: &str) -> Option<Value> {
    if key.is_empty() {
        return Some(model.clone());
    }
    key.split('.')
        .try_fold(model, |node, part| node.get(part))
        .cloned()
}

/// Collapse everything nested deeper than `depth` to an empty container.
fn truncate(value: &Value, depth: u32) -> Value {
    match value {
        Value::Object(_) if depth == 0 => Value::Object(serde_json::Map::new()),
        Value::Array(_) if depth == 0 => Value::Array(Vec::new()),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), truncate(v, depth - 1)))
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.iter().map(|v| truncate(v, depth - 1)).collect()),
        other => other.clone(),
    }
}

impl DuetTransport for FakeBoard {
    async fn connect(&self) -> Result<(), Error> {
        self.state.lock().unwrap().connects += 1;
        Ok(())
    }

    async fn close(&self) -> Result<(), Error> {
        self.state.lock().unwrap().closes += 1;
        Ok(())
    }

    async fn fetch_model(&self, query: &ModelQuery) -> Result<ModelResponse, Error> {
        self.answer(query)
    }

    async fn send_command(&self, command: &str, _no_reply: bool) -> Result<(), Error> {
        let overloaded = {
            let mut state = self.state.lock().unwrap();
            state.commands.push(command.to_owned());
            if state.overload_commands > 0 {
                state.overload_commands -= 1;
                true
            } else {
                false
            }
        };
        if overloaded {
            if let Some(Err(e)) = self.handlers.dispatch(StatusCode::SERVICE_UNAVAILABLE).await {
                panic!("overload handler failed: {e}");
            }
            return Err(Error::ServiceUnavailable);
        }
        Ok(())
    }

    async fn fetch_reply(&self, _no_cache: bool) -> Result<String, Error> {
        let mut state = self.state.lock().unwrap();
        state.reply_reads += 1;
        Ok(state.replies.pop_front().unwrap_or_default())
    }

    fn register_status_handler(&self, status: StatusCode, handler: StatusHandler) {
        self.handlers.register(status, handler);
    }
}
