// Object model polling endpoint
//
// `GET /rr_model?key=<key>&flags=<flags>[&array=<offset>]`
//
// The board caps the size of a single response, so callers drive depth
// limits and array continuation themselves (see `duetwatch-core`).

use serde::Deserialize;
use tracing::debug;

use crate::client::DuetClient;
use crate::error::Error;

/// Depth sentinel meaning "no depth limit". The firmware still pages
/// long arrays at this depth.
pub const UNBOUNDED_DEPTH: u32 = 99;

/// Detail flags sent with every `rr_model` request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ModelFlags {
    /// Only report frequently changing values (`f`).
    pub frequently: bool,
    /// Report `null` values and empty arrays instead of omitting them (`n`).
    pub include_null: bool,
    /// Report values hidden in non-verbose output (`v`).
    pub verbose: bool,
    /// Report obsolete fields kept for compatibility (`o`).
    pub include_obsolete: bool,
}

impl ModelFlags {
    /// The detail level used to mirror the full object model:
    /// not just frequent values, nulls included, verbose.
    pub fn full_detail() -> Self {
        Self {
            frequently: false,
            include_null: true,
            verbose: true,
            include_obsolete: false,
        }
    }
}

/// A single `rr_model` request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelQuery {
    /// Dotted key path (`""` for the root, `"move.axes"`, `"boards[0]"`).
    pub key: String,
    /// Maximum nesting depth the board expands.
    pub depth: u32,
    pub flags: ModelFlags,
    /// Array continuation offset reported by a previous page's `next`.
    pub array: Option<u64>,
}

impl ModelQuery {
    pub fn new(key: impl Into<String>, depth: u32, flags: ModelFlags) -> Self {
        Self {
            key: key.into(),
            depth,
            flags,
            array: None,
        }
    }

    /// Lightweight query for a single frequently-updated leaf such as
    /// `seqs`, expanded without a depth limit.
    pub fn leaf(key: impl Into<String>) -> Self {
        let flags = ModelFlags {
            frequently: true,
            verbose: true,
            ..ModelFlags::default()
        };
        Self::new(key, UNBOUNDED_DEPTH, flags)
    }

    /// The same query continued at array offset `offset`.
    #[must_use]
    pub fn continued_at(&self, offset: u64) -> Self {
        Self {
            array: Some(offset),
            ..self.clone()
        }
    }

    /// Encode the flags string: `d<depth>` followed by `f`, `v`, `n`, `o`.
    pub fn flags_param(&self) -> String {
        let mut flags = format!("d{}", self.depth);
        if self.flags.frequently {
            flags.push('f');
        }
        if self.flags.verbose {
            flags.push('v');
        }
        if self.flags.include_null {
            flags.push('n');
        }
        if self.flags.include_obsolete {
            flags.push('o');
        }
        flags
    }
}

/// One page of object model data.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ModelResponse {
    #[serde(default)]
    pub key: Option<String>,
    #[serde(default)]
    pub flags: Option<String>,
    /// Loosely-typed payload: object, array page, or scalar.
    #[serde(default)]
    pub result: serde_json::Value,
    /// Offset of the next array page; absent or `0` when complete.
    #[serde(default)]
    pub next: Option<u64>,
}

impl ModelResponse {
    /// The continuation offset if more array data remains.
    pub fn continuation(&self) -> Option<u64> {
        self.next.filter(|&n| n > 0)
    }
}

impl DuetClient {
    /// Fetch one page of the object model.
    ///
    /// `GET /rr_model?key=...&flags=...[&array=...]`
    pub async fn rr_model(&self, query: &ModelQuery) -> Result<ModelResponse, Error> {
        let mut url = self.endpoint("rr_model");
        {
            let mut pairs = url.query_pairs_mut();
            pairs.append_pair("key", &query.key);
            pairs.append_pair("flags", &query.flags_param());
            if let Some(offset) = query.array {
                pairs.append_pair("array", &offset.to_string());
            }
        }
        debug!(key = %query.key, depth = query.depth, array = ?query.array, "fetching object model");
        self.get_json(url).await
    }
}
