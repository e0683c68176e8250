// ── Object model synchronizer ──
//
// Owns the baseline mirror and the last-seen sequence counters. The first
// tick pulls the whole model; later ticks poll `seqs` and refetch only
// the branches whose counters moved.

use duetwatch_api::{DuetTransport, ModelFlags, ModelQuery};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use tracing::{debug, info, warn};

use crate::error::CoreError;
use crate::fetch::ChunkedFetcher;
use crate::merge::merge;
use crate::node::Node;
use crate::reply::ReplyCorrelator;
use crate::seqs::{REPLY_KEY, SEQS_KEY, SequenceCounters, VOL_CHANGES_KEY};

/// Depth used when refetching a single changed branch.
const BRANCH_DEPTH: u32 = 2;

/// How a refetched branch is folded into the baseline.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ApplyPolicy {
    /// The fresh branch replaces the old one wholesale.
    #[default]
    Replace,
    /// The fresh branch is authoritative and the old one fills gaps.
    /// Arrays may not grow through the merge.
    Merge,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    Uninitialized,
    BaselineEstablished,
    Polling,
}

/// What a single tick did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    /// The tick pulled the whole model.
    pub full_fetch: bool,
    /// Keys whose counters changed, in board order.
    pub changed: Vec<String>,
    /// Branches refetched and applied.
    pub refreshed: Vec<String>,
    /// A new reply was published.
    pub reply: bool,
}

impl TickReport {
    pub fn is_idle(&self) -> bool {
        !self.full_fetch && self.changed.is_empty()
    }
}

#[derive(Debug)]
pub struct ObjectModelSynchronizer {
    state: SyncState,
    model: Option<Node>,
    seqs: Option<SequenceCounters>,
    policy: ApplyPolicy,
    /// Bumped whenever `model` changes.
    revision: u64,
}

impl ObjectModelSynchronizer {
    pub fn new(policy: ApplyPolicy) -> Self {
        Self {
            state: SyncState::Uninitialized,
            model: None,
            seqs: None,
            policy,
            revision: 0,
        }
    }

    pub fn state(&self) -> SyncState {
        self.state
    }

    /// The baseline mirror, once established.
    pub fn model(&self) -> Option<&Node> {
        self.model.as_ref()
    }

    pub fn seqs(&self) -> Option<&SequenceCounters> {
        self.seqs.as_ref()
    }

    pub fn policy(&self) -> ApplyPolicy {
        self.policy
    }

    /// Counts baseline mutations; equal values mean an identical model.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Forget the baseline so the next tick starts over with a full fetch.
    pub fn reset(&mut self) {
        self.state = SyncState::Uninitialized;
        self.model = None;
        self.seqs = None;
        self.revision += 1;
    }

    /// Advance the mirror by one step.
    pub async fn tick<T: DuetTransport>(
        &mut self,
        transport: &T,
        replies: &ReplyCorrelator,
    ) -> Result<TickReport, CoreError> {
        match (&self.model, &self.seqs) {
            (Some(_), Some(_)) => self.poll(transport, replies).await,
            _ => self.establish_baseline(transport).await,
        }
    }

    /// Pull the whole model and its counters.
    ///
    /// The counters are read before the walk starts: a branch that moves
    /// while the walk is under way then shows up as changed on the next
    /// tick instead of being masked by a newer counter.
    async fn establish_baseline<T: DuetTransport>(
        &mut self,
        transport: &T,
    ) -> Result<TickReport, CoreError> {
        let seqs = poll_seqs(transport).await?;

        let mut fetcher = ChunkedFetcher::new(transport, ModelFlags::full_detail());
        let mut model = fetcher.fetch("", 1).await?;
        if !model.is_object() {
            return Err(CoreError::Protocol {
                message: format!("object model root is not a mapping: {model}"),
            });
        }
        if let Some(map) = model.as_object_mut() {
            map.insert(SEQS_KEY.to_owned(), seqs.to_node());
        }

        // Whatever the board buffered before this session is not an answer
        // to anything we will send.
        match transport.fetch_reply(false).await {
            Ok(stale) if !stale.is_empty() => {
                debug!(reply = %stale, "discarded reply buffered before connect");
            }
            Ok(_) => {}
            Err(e) => warn!(error = %e, "could not clear the reply buffer"),
        }

        let changed = SequenceCounters::changed_keys(None, &seqs);
        info!(
            keys = model.len(),
            requests = fetcher.requests(),
            "object model baseline established"
        );
        self.model = Some(model);
        self.seqs = Some(seqs);
        self.state = SyncState::BaselineEstablished;
        self.revision += 1;

        Ok(TickReport {
            full_fetch: true,
            changed,
            ..TickReport::default()
        })
    }

    /// Poll the counters and refresh whatever moved.
    async fn poll<T: DuetTransport>(
        &mut self,
        transport: &T,
        replies: &ReplyCorrelator,
    ) -> Result<TickReport, CoreError> {
        let current = poll_seqs(transport).await?;
        let previous = self.seqs.clone();
        let changed = SequenceCounters::changed_keys(previous.as_ref(), &current);

        if let Some(seqs) = self.seqs.as_mut() {
            seqs.absorb(&current);
        }
        self.state = SyncState::Polling;

        let mut report = TickReport {
            changed,
            ..TickReport::default()
        };
        if report.changed.is_empty() {
            return Ok(report);
        }
        debug!(changed = ?report.changed, "sequence counters moved");

        // The reply is handled first so command issuers are not held up
        // behind branch refetches.
        let mut work: Vec<String> = Vec::with_capacity(report.changed.len());
        if report.changed.iter().any(|k| k == REPLY_KEY) {
            work.push(REPLY_KEY.to_owned());
        }
        work.extend(
            report
                .changed
                .iter()
                .filter(|k| *k != REPLY_KEY && *k != VOL_CHANGES_KEY)
                .cloned(),
        );

        for (idx, key) in work.iter().enumerate() {
            let outcome = if key == REPLY_KEY {
                replies
                    .on_reply_changed(transport)
                    .await
                    .map_err(CoreError::from)
                    .map(|()| report.reply = true)
            } else {
                self.refresh_branch(transport, key)
                    .await
                    .map(|()| report.refreshed.push(key.clone()))
            };

            if let Err(e) = outcome {
                let unprocessed = work.get(idx..).unwrap_or_default();
                warn!(key = %key, error = %e, "branch refresh failed; rolling back counters");
                if let (Some(seqs), Some(previous)) = (self.seqs.as_mut(), previous.as_ref()) {
                    seqs.restore(previous, unprocessed);
                }
                self.store_seqs_branch();
                return Err(e);
            }
        }

        self.store_seqs_branch();
        Ok(report)
    }

    /// Refetch one top-level branch and fold it into the baseline.
    async fn refresh_branch<T: DuetTransport>(
        &mut self,
        transport: &T,
        key: &str,
    ) -> Result<(), CoreError> {
        let fresh = ChunkedFetcher::new(transport, ModelFlags::full_detail())
            .fetch(key, BRANCH_DEPTH)
            .await?;

        let Some(map) = self.model.as_mut().and_then(Node::as_object_mut) else {
            return Err(CoreError::Protocol {
                message: "no baseline to apply the update to".into(),
            });
        };

        let updated = match (self.policy, map.get(key)) {
            (ApplyPolicy::Merge, Some(previous)) => {
                merge(previous, &fresh).map_err(|e| CoreError::from(e.within(key)))?
            }
            _ => fresh,
        };
        map.insert(key.to_owned(), updated);
        self.revision += 1;
        Ok(())
    }

    /// Mirror the stored counters into the baseline's `seqs` branch.
    fn store_seqs_branch(&mut self) {
        let (Some(model), Some(seqs)) = (self.model.as_mut(), self.seqs.as_ref()) else {
            return;
        };
        let node = seqs.to_node();
        if let Some(map) = model.as_object_mut() {
            if map.get(SEQS_KEY) != Some(&node) {
                map.insert(SEQS_KEY.to_owned(), node);
                self.revision += 1;
            }
        }
    }
}

impl Default for ObjectModelSynchronizer {
    fn default() -> Self {
        Self::new(ApplyPolicy::default())
    }
}

/// Read the lightweight `seqs` leaf.
async fn poll_seqs<T: DuetTransport>(transport: &T) -> Result<SequenceCounters, CoreError> {
    let page = transport.fetch_model(&ModelQuery::leaf(SEQS_KEY)).await?;
    let node = Node::from(page.result);
    SequenceCounters::from_node(&node).ok_or_else(|| CoreError::Protocol {
        message: format!("'seqs' is not a mapping: {node}"),
    })
}
