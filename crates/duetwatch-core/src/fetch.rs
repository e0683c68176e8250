// ── Chunked object model fetch ──
//
// The board caps the size of a single `rr_model` response, so a subtree
// is reconstructed from many depth-limited requests plus array pages.
// Every child of a mapping is requested again: mappings one level deeper,
// anything else without a depth limit. Arrays are followed through their
// `next` continuation until complete.

use duetwatch_api::{DuetTransport, ModelFlags, ModelQuery, UNBOUNDED_DEPTH};
use tracing::{debug, trace};

use crate::error::CoreError;
use crate::node::Node;

/// Transient per-request state of a chunked fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchCursor {
    /// Board key path (`""` for the root).
    pub key: String,
    pub depth: u32,
    /// Array continuation offset; `None` for the first page.
    pub array: Option<u64>,
}

impl FetchCursor {
    pub fn new(key: impl Into<String>, depth: u32) -> Self {
        Self {
            key: key.into(),
            depth,
            array: None,
        }
    }

    /// Cursor for a child of this cursor's mapping result.
    fn child(&self, name: &str, value: &Node) -> Self {
        let key = if self.key.is_empty() {
            name.to_owned()
        } else {
            format!("{}.{name}", self.key)
        };
        let depth = if value.is_object() {
            self.depth + 1
        } else {
            UNBOUNDED_DEPTH
        };
        Self::new(key, depth)
    }

    fn query(&self, flags: ModelFlags) -> ModelQuery {
        let query = ModelQuery::new(self.key.clone(), self.depth, flags);
        match self.array {
            Some(offset) => query.continued_at(offset),
            None => query,
        }
    }
}

/// One pending request: where to fetch from and where the result goes,
/// relative to the root of the fetch.
struct Pending {
    cursor: FetchCursor,
    path: Vec<String>,
}

/// Reconstructs complete object model subtrees from chunked responses.
pub struct ChunkedFetcher<'a, T> {
    transport: &'a T,
    flags: ModelFlags,
    requests: usize,
}

impl<'a, T: DuetTransport> ChunkedFetcher<'a, T> {
    pub fn new(transport: &'a T, flags: ModelFlags) -> Self {
        Self {
            transport,
            flags,
            requests: 0,
        }
    }

    /// Number of `rr_model` requests issued so far.
    pub fn requests(&self) -> usize {
        self.requests
    }

    /// Fetch the complete subtree under `key`, starting at `depth`.
    ///
    /// Any transport error aborts the whole fetch; nothing partial is
    /// returned and nothing is retried.
    pub async fn fetch(&mut self, key: &str, depth: u32) -> Result<Node, CoreError> {
        let mut root = Node::Null;
        let mut stack = vec![Pending {
            cursor: FetchCursor::new(key, depth),
            path: Vec::new(),
        }];

        while let Some(Pending { cursor, path }) = stack.pop() {
            let node = self.fetch_one(cursor.clone()).await?;

            if let Node::Object(children) = &node {
                // Reversed so children are requested in document order.
                for (name, value) in children.iter().rev() {
                    let mut child_path = path.clone();
                    child_path.push(name.clone());
                    stack.push(Pending {
                        cursor: cursor.child(name, value),
                        path: child_path,
                    });
                }
            }

            place(&mut root, &path, node)?;
        }

        debug!(key, requests = self.requests, "chunked fetch complete");
        Ok(root)
    }

    /// Fetch a single key, following array pages until complete.
    async fn fetch_one(&mut self, mut cursor: FetchCursor) -> Result<Node, CoreError> {
        let mut page = self.request(&cursor).await?;
        let mut result = Node::from(std::mem::take(&mut page.result));

        while let Some(next) = page.continuation() {
            let Node::Array(items) = &mut result else {
                break;
            };
            trace!(key = %cursor.key, next, "following array continuation");
            cursor.array = Some(next);
            page = self.request(&cursor).await?;
            match Node::from(std::mem::take(&mut page.result)) {
                Node::Array(more) => items.extend(more),
                other => {
                    return Err(CoreError::Protocol {
                        message: format!(
                            "array continuation for '{}' returned a non-array page: {other}",
                            cursor.key
                        ),
                    });
                }
            }
        }

        Ok(result)
    }

    async fn request(
        &mut self,
        cursor: &FetchCursor,
    ) -> Result<duetwatch_api::ModelResponse, CoreError> {
        self.requests += 1;
        Ok(self.transport.fetch_model(&cursor.query(self.flags)).await?)
    }
}

/// Store `node` at `path` below `root`, replacing the shallow value the
/// parent's response left there.
fn place(root: &mut Node, path: &[String], node: Node) -> Result<(), CoreError> {
    let Some((last, parents)) = path.split_last() else {
        *root = node;
        return Ok(());
    };

    let mut current = root;
    for name in parents {
        current = current
            .as_object_mut()
            .and_then(|map| map.get_mut(name))
            .ok_or_else(|| missing_parent(path))?;
    }
    current
        .as_object_mut()
        .ok_or_else(|| missing_parent(path))?
        .insert(last.clone(), node);
    Ok(())
}

fn missing_parent(path: &[String]) -> CoreError {
    CoreError::Protocol {
        message: format!("object model parent vanished while placing '{}'", path.join(".")),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn child_cursor_drills_mappings_and_unbounds_leaves() {
        let root = FetchCursor::new("", 1);
        let job = root.child("job", &Node::object());
        assert_eq!(job, FetchCursor::new("job", 2));

        let tools = root.child("tools", &Node::Array(Vec::new()));
        assert_eq!(tools, FetchCursor::new("tools", UNBOUNDED_DEPTH));

        let file = job.child("file", &Node::object());
        assert_eq!(file, FetchCursor::new("job.file", 3));
    }

    #[test]
    fn place_replaces_shallow_children() {
        let mut root = Node::Null;
        place(&mut root, &[], Node::object()).unwrap();
        place(&mut root, &["job".to_owned()], Node::object()).unwrap();
        place(&mut root, &["job".to_owned(), "layer".to_owned()], Node::from(4_u64)).unwrap();
        assert_eq!(root.pointer("job.layer").and_then(Node::as_u64), Some(4));
    }

    #[test]
    fn place_under_scalar_is_a_protocol_error() {
        let mut root = Node::from(1_u64);
        assert!(matches!(
            place(&mut root, &["job".to_owned()], Node::Null),
            Err(CoreError::Protocol { .. })
        ));
    }
}
