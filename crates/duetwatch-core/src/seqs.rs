// ── Sequence counters ──
//
// The board bumps a counter under `seqs` whenever a top-level branch of
// the object model changes. Diffing two snapshots tells us which branches
// need refetching.

use indexmap::IndexMap;
use serde::Serialize;

use crate::node::Node;

/// Top-level key carrying the counters themselves.
pub const SEQS_KEY: &str = "seqs";
/// Counter bumped when new reply text is buffered. Not a model branch.
pub const REPLY_KEY: &str = "reply";
/// Counter tracking mounted volume changes. Reported but not refetched.
pub const VOL_CHANGES_KEY: &str = "volChanges";

/// Snapshot of the board's `seqs` mapping.
///
/// Values are kept as `Node` since not every counter is an integer
/// (`volChanges` is an array on current firmware).
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct SequenceCounters(IndexMap<String, Node>);

impl SequenceCounters {
    /// Interpret a `seqs` payload. `None` unless it is a mapping.
    pub fn from_node(node: &Node) -> Option<Self> {
        node.as_object().map(|map| Self(map.clone()))
    }

    pub fn get(&self, key: &str) -> Option<&Node> {
        self.0.get(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Node)> {
        self.0.iter()
    }

    /// Keys whose counters changed between `previous` and `current`.
    ///
    /// Without a previous snapshot every key counts as changed. Otherwise
    /// only keys present in both snapshots with differing values are
    /// reported; keys that just appeared are not.
    pub fn changed_keys(previous: Option<&Self>, current: &Self) -> Vec<String> {
        let Some(previous) = previous else {
            return current.0.keys().cloned().collect();
        };
        current
            .0
            .iter()
            .filter(|(key, value)| previous.0.get(*key).is_some_and(|old| old != *value))
            .map(|(key, _)| key.clone())
            .collect()
    }

    /// Take over every value from `newer`. Keys missing from `newer`
    /// keep their last observed value.
    pub fn absorb(&mut self, newer: &Self) {
        for (key, value) in &newer.0 {
            self.0.insert(key.clone(), value.clone());
        }
    }

    /// Put `keys` back to their values in `previous`, so the next diff
    /// reports them again.
    pub fn restore(&mut self, previous: &Self, keys: &[String]) {
        for key in keys {
            if let Some(old) = previous.0.get(key) {
                self.0.insert(key.clone(), old.clone());
            }
        }
    }

    pub fn to_node(&self) -> Node {
        Node::Object(self.0.clone())
    }
}
