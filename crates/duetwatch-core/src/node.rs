// ── Object model tree ──
//
// The board reports its state as loosely-shaped JSON whose structure is
// only known at runtime. `Node` is the explicit tagged union the rest of
// the crate works with.

use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize};

/// One node of the object model.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Node {
    #[default]
    Null,
    Bool(bool),
    Number(serde_json::Number),
    String(String),
    /// Device arrays such as `boards` or `tools`.
    Array(Vec<Node>),
    Object(IndexMap<String, Node>),
}

impl Node {
    /// An empty mapping.
    pub fn object() -> Self {
        Self::Object(IndexMap::new())
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub fn is_object(&self) -> bool {
        matches!(self, Self::Object(_))
    }

    pub fn is_array(&self) -> bool {
        matches!(self, Self::Array(_))
    }

    pub fn as_object(&self) -> Option<&IndexMap<String, Node>> {
        match self {
            Self::Object(map) => Some(map),
            _ => None,
        }
    }

    pub fn as_object_mut(&mut self) -> Option<&mut IndexMap<String, Node>> {
        match self {
            Self::Object(map) => Some(map),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Node]> {
        match self {
            Self::Array(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Self::Number(n) => n.as_u64(),
            _ => None,
        }
    }

    /// Number of children: elements of an array, entries of a mapping,
    /// zero for scalars.
    pub fn len(&self) -> usize {
        match self {
            Self::Array(items) => items.len(),
            Self::Object(map) => map.len(),
            _ => 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Child of a mapping by key.
    pub fn get(&self, key: &str) -> Option<&Node> {
        self.as_object()?.get(key)
    }

    /// Resolve a dotted path with optional array indices, e.g.
    /// `"move.axes[0].homed"` or `"boards[0]"`. The empty path is `self`.
    pub fn pointer(&self, path: &str) -> Option<&Node> {
        if path.is_empty() {
            return Some(self);
        }
        let mut current = self;
        for segment in path.split('.') {
            let (name, indices) = split_indices(segment)?;
            if !name.is_empty() {
                current = current.get(name)?;
            }
            for index in indices {
                current = current.as_array()?.get(index)?;
            }
        }
        Some(current)
    }
}

/// Split `"tools[1][2]"` into `("tools", [1, 2])`.
fn split_indices(segment: &str) -> Option<(&str, Vec<usize>)> {
    let Some(open) = segment.find('[') else {
        return Some((segment, Vec::new()));
    };
    let (name, mut rest) = segment.split_at(open);
    let mut indices = Vec::new();
    while let Some(stripped) = rest.strip_prefix('[') {
        let close = stripped.find(']')?;
        indices.push(stripped[..close].trim().parse().ok()?);
        rest = &stripped[close + 1..];
    }
    rest.is_empty().then_some((name, indices))
}

// ── Conversions ──────────────────────────────────────────────────────

impl From<serde_json::Value> for Node {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Self::Null,
            serde_json::Value::Bool(b) => Self::Bool(b),
            serde_json::Value::Number(n) => Self::Number(n),
            serde_json::Value::String(s) => Self::String(s),
            serde_json::Value::Array(items) => {
                Self::Array(items.into_iter().map(Node::from).collect())
            }
            serde_json::Value::Object(map) => {
                Self::Object(map.into_iter().map(|(k, v)| (k, Node::from(v))).collect())
            }
        }
    }
}

impl From<Node> for serde_json::Value {
    fn from(node: Node) -> Self {
        match node {
            Node::Null => Self::Null,
            Node::Bool(b) => Self::Bool(b),
            Node::Number(n) => Self::Number(n),
            Node::String(s) => Self::String(s),
            Node::Array(items) => Self::Array(items.into_iter().map(Self::from).collect()),
            Node::Object(map) => {
                Self::Object(map.into_iter().map(|(k, v)| (k, Self::from(v))).collect())
            }
        }
    }
}

impl From<&str> for Node {
    fn from(s: &str) -> Self {
        Self::String(s.to_owned())
    }
}

impl From<u64> for Node {
    fn from(n: u64) -> Self {
        Self::Number(n.into())
    }
}

impl<'de> Deserialize<'de> for Node {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        serde_json::Value::deserialize(deserializer).map(Node::from)
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match serde_json::to_string(self) {
            Ok(json) => f.write_str(&json),
            Err(_) => Err(fmt::Error),
        }
    }
}
