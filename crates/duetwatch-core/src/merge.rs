// ── Structural merge ──
//
// Reconciles a source tree (defaults, or a previous snapshot) into an
// authoritative destination tree. The destination wins wherever it has a
// value; the source only fills gaps. Arrays never grow through a merge.

use indexmap::IndexMap;
use thiserror::Error;

use crate::node::Node;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MergeError {
    /// The source array is longer than the destination array it targets.
    #[error("List length mismatch in merge for key '{key}': source {source_len}, destination {destination_len}")]
    LengthMismatch {
        key: String,
        source_len: usize,
        destination_len: usize,
    },
}

impl MergeError {
    /// Qualify the reported key with the branch the merge ran under.
    #[must_use]
    pub fn within(self, parent: &str) -> Self {
        match self {
            Self::LengthMismatch {
                key,
                source_len,
                destination_len,
            } => Self::LengthMismatch {
                key: join_key(parent, &key),
                source_len,
                destination_len,
            },
        }
    }
}

/// Merge `source` into `destination` and return the result.
///
/// Per key:
/// - both mappings: recurse (a missing destination counts as empty)
/// - source array: kept when the destination is missing or empty, fails
///   when longer than the destination, yields the destination when
///   shorter, and is merged element-wise when lengths match
/// - anything else: the destination value if present, else the source
///
/// Keys only present in the destination are carried over unchanged.
pub fn merge(source: &Node, destination: &Node) -> Result<Node, MergeError> {
    merge_value("", source, Some(destination))
}

fn merge_value(path: &str, source: &Node, destination: Option<&Node>) -> Result<Node, MergeError> {
    match (source, destination) {
        (Node::Object(src), None) => merge_objects(path, src, &IndexMap::new()).map(Node::Object),
        (Node::Object(src), Some(Node::Object(dst))) => {
            merge_objects(path, src, dst).map(Node::Object)
        }
        (Node::Array(src), None) => Ok(Node::Array(src.clone())),
        (Node::Array(src), Some(Node::Array(dst))) => merge_arrays(path, src, dst).map(Node::Array),
        (_, Some(dst)) => Ok(dst.clone()),
        (src, None) => Ok(src.clone()),
    }
}

fn merge_objects(
    path: &str,
    source: &IndexMap<String, Node>,
    destination: &IndexMap<String, Node>,
) -> Result<IndexMap<String, Node>, MergeError> {
    let mut result = IndexMap::with_capacity(source.len().max(destination.len()));
    for (key, value) in source {
        let child_path = join_key(path, key);
        result.insert(
            key.clone(),
            merge_value(&child_path, value, destination.get(key))?,
        );
    }
    for (key, value) in destination {
        if !result.contains_key(key) {
            result.insert(key.clone(), value.clone());
        }
    }
    Ok(result)
}

fn merge_arrays(path: &str, source: &[Node], destination: &[Node]) -> Result<Vec<Node>, MergeError> {
    if destination.is_empty() {
        return Ok(source.to_vec());
    }
    if source.len() > destination.len() {
        return Err(MergeError::LengthMismatch {
            key: path.to_owned(),
            source_len: source.len(),
            destination_len: destination.len(),
        });
    }
    if source.len() < destination.len() {
        return Ok(destination.to_vec());
    }

    source
        .iter()
        .zip(destination)
        .enumerate()
        .map(|(idx, (src, dst))| match (src, dst) {
            // A null slot carries no information of its own.
            (_, Node::Null) => Ok(src.clone()),
            (Node::Object(s), Node::Object(d)) => {
                merge_objects(&format!("{path}[{idx}]"), s, d).map(Node::Object)
            }
            _ => Ok(dst.clone()),
        })
        .collect()
}

fn join_key(parent: &str, key: &str) -> String {
    match (parent.is_empty(), key.is_empty()) {
        (true, _) => key.to_owned(),
        (false, true) => parent.to_owned(),
        (false, false) if key.starts_with('[') => format!("{parent}{key}"),
        (false, false) => format!("{parent}.{key}"),
    }
}
