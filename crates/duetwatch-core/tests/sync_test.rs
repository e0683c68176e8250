#![allow(clippy::unwrap_used)]
// Integration tests for `ObjectModelSynchronizer` against a scripted board.

mod common;

use duetwatch_core::{
    ApplyPolicy, CoreError, Node, ObjectModelSynchronizer, ReplyCorrelator, SequenceCounters,
    SyncState,
};
use pretty_assertions::assert_eq;
use serde_json::json;

use common::FakeBoard;

fn counters(value: serde_json::Value) -> SequenceCounters {
    SequenceCounters::from_node(&Node::from(value)).unwrap()
}

async fn established(
    policy: ApplyPolicy,
) -> (
    std::sync::Arc<FakeBoard>,
    ObjectModelSynchronizer,
    ReplyCorrelator,
) {
    let board = FakeBoard::new(FakeBoard::sample_model());
    let mut sync = ObjectModelSynchronizer::new(policy);
    let replies = ReplyCorrelator::default();
    sync.tick(board.as_ref(), &replies).await.unwrap();
    board.clear_log();
    (board, sync, replies)
}

// ── Baseline ────────────────────────────────────────────────────────

#[tokio::test]
async fn first_tick_fetches_everything_and_sets_counters() {
    let board = FakeBoard::new(FakeBoard::sample_model());
    let mut sync = ObjectModelSynchronizer::default();
    let replies = ReplyCorrelator::default();

    let report = sync.tick(board.as_ref(), &replies).await.unwrap();

    assert!(report.full_fetch);
    assert_eq!(report.changed, ["reply", "job", "move", "volChanges"]);
    assert_eq!(sync.state(), SyncState::BaselineEstablished);
    assert_eq!(
        sync.model().cloned().map(serde_json::Value::from),
        Some(FakeBoard::sample_model())
    );
    assert_eq!(
        sync.seqs(),
        Some(&counters(
            json!({ "reply": 5, "job": 2, "move": 7, "volChanges": [0, 0] })
        ))
    );

    let queries = board.queries();
    assert_eq!(queries[0].key, "seqs");
    let root = queries.iter().find(|q| q.key.is_empty()).unwrap();
    assert_eq!(root.flags_param(), "d1vn");
}

#[tokio::test]
async fn branch_changing_during_baseline_walk_is_refetched() {
    let board = FakeBoard::new(FakeBoard::sample_model());
    let mut sync = ObjectModelSynchronizer::default();
    let replies = ReplyCorrelator::default();
    board.after_query("job", |m| {
        m["job"]["layer"] = json!(3);
        m["seqs"]["job"] = json!(3);
    });

    sync.tick(board.as_ref(), &replies).await.unwrap();
    assert_eq!(
        sync.seqs().unwrap().get("job").and_then(Node::as_u64),
        Some(2),
        "counters are the ones read before the walk"
    );

    let report = sync.tick(board.as_ref(), &replies).await.unwrap();
    assert_eq!(report.changed, ["job"]);
    assert_eq!(report.refreshed, ["job"]);
    assert_eq!(
        sync.model().unwrap().pointer("job.layer").and_then(Node::as_u64),
        Some(3)
    );
}

#[tokio::test]
async fn reply_buffered_before_connect_is_discarded() {
    let board = FakeBoard::new(FakeBoard::sample_model());
    board.queue_replies(["ok\n"]);
    let mut sync = ObjectModelSynchronizer::default();
    let replies = ReplyCorrelator::default();
    let rx = replies.subscribe();

    let report = sync.tick(board.as_ref(), &replies).await.unwrap();

    assert!(!report.reply);
    assert_eq!(board.pending_replies(), 0);
    assert_eq!(board.reply_reads(), 1);
    assert!(!rx.has_changed().unwrap());
}

#[tokio::test]
async fn baseline_without_seqs_branch_polls_counters() {
    let mut model = FakeBoard::sample_model();
    let seqs = model.as_object_mut().unwrap().remove("seqs").unwrap();
    let board = FakeBoard::new(model);
    let mut sync = ObjectModelSynchronizer::default();

    // The leaf poll still answers from the (now absent) branch: null.
    let result = sync.tick(board.as_ref(), &ReplyCorrelator::default()).await;
    assert!(matches!(result, Err(CoreError::Protocol { .. })));
    assert!(sync.model().is_none(), "baseline must not exist without counters");
    assert!(sync.seqs().is_none());

    board.update(|m| m["seqs"] = seqs.clone());
    sync.tick(board.as_ref(), &ReplyCorrelator::default())
        .await
        .unwrap();
    assert!(sync.model().is_some());
    assert!(sync.seqs().is_some());
}

#[tokio::test]
async fn paged_arrays_are_concatenated() {
    let board = FakeBoard::new(FakeBoard::sample_model());
    board.update(|m| {
        m["tools"] = json!([
            { "number": 0 }, { "number": 1 }, { "number": 2 }, { "number": 3 }, { "number": 4 }
        ]);
    });
    board.paginate("tools", 2);

    let mut sync = ObjectModelSynchronizer::default();
    sync.tick(board.as_ref(), &ReplyCorrelator::default())
        .await
        .unwrap();

    let tools = sync.model().unwrap().get("tools").unwrap();
    assert_eq!(tools.len(), 5);
    assert_eq!(
        tools.pointer("[4].number").and_then(Node::as_u64),
        Some(4)
    );

    let offsets: Vec<_> = board
        .queries()
        .into_iter()
        .filter(|q| q.key == "tools")
        .map(|q| q.array)
        .collect();
    assert_eq!(offsets, [None, Some(2), Some(4)]);
}

// ── Polling ─────────────────────────────────────────────────────────

#[tokio::test]
async fn identical_counters_fetch_nothing_else() {
    let (board, mut sync, replies) = established(ApplyPolicy::Replace).await;

    let report = sync.tick(board.as_ref(), &replies).await.unwrap();

    assert!(report.is_idle());
    assert_eq!(sync.state(), SyncState::Polling);
    let queries = board.queries();
    assert_eq!(queries.len(), 1);
    assert_eq!(queries[0].key, "seqs");
    assert_eq!(queries[0].flags_param(), "d99fv");
    assert_eq!(board.reply_reads(), 0);
}

#[tokio::test]
async fn changed_counter_refetches_only_that_branch() {
    let (board, mut sync, replies) = established(ApplyPolicy::Replace).await;
    board.update(|m| {
        m["job"]["layer"] = json!(12);
        m["job"]["file"]["fileName"] = json!("0:/gcodes/benchy.gcode");
        m["seqs"]["job"] = json!(3);
        // Not tracked by a counter bump: must stay stale.
        m["state"]["upTime"] = json!(999);
    });

    let report = sync.tick(board.as_ref(), &replies).await.unwrap();

    assert_eq!(report.changed, ["job"]);
    assert_eq!(report.refreshed, ["job"]);
    assert!(
        board
            .queried_keys()
            .iter()
            .skip(1)
            .all(|k| k == "job" || k.starts_with("job.")),
        "unexpected keys: {:?}",
        board.queried_keys()
    );
    assert_eq!(board.queries()[1].flags_param(), "d2vn");

    let model = sync.model().unwrap();
    assert_eq!(model.pointer("job.layer").and_then(Node::as_u64), Some(12));
    assert_eq!(
        model.pointer("job.file.fileName").and_then(Node::as_str),
        Some("0:/gcodes/benchy.gcode")
    );
    assert_eq!(model.pointer("state.upTime").and_then(Node::as_u64), Some(120));
    assert_eq!(
        sync.seqs().unwrap().get("job").and_then(Node::as_u64),
        Some(3)
    );
    assert_eq!(
        model.pointer("seqs.job").and_then(Node::as_u64),
        Some(3),
        "baseline seqs branch follows the stored counters"
    );
}

#[tokio::test]
async fn new_counter_keys_are_stored_but_not_refetched() {
    let (board, mut sync, replies) = established(ApplyPolicy::Replace).await;
    board.bump("tools", 1);

    let report = sync.tick(board.as_ref(), &replies).await.unwrap();

    assert!(report.changed.is_empty());
    assert_eq!(board.queries().len(), 1);
    assert_eq!(
        sync.seqs().unwrap().get("tools").and_then(Node::as_u64),
        Some(1)
    );
}

#[tokio::test]
async fn reply_counter_publishes_reply_instead_of_fetching_it() {
    let (board, mut sync, replies) = established(ApplyPolicy::Replace).await;
    let mut rx = replies.subscribe();
    board.queue_replies(["ok\n"]);
    board.bump("reply", 6);

    let report = sync.tick(board.as_ref(), &replies).await.unwrap();

    assert!(report.reply);
    assert!(report.refreshed.is_empty());
    assert!(rx.has_changed().unwrap());
    assert_eq!(*rx.borrow_and_update(), "ok\n");
    assert_eq!(board.reply_reads(), 1);
    assert!(!board.queried_keys().iter().any(|k| k == "reply"));
}

#[tokio::test]
async fn vol_changes_counter_is_not_refetched() {
    let (board, mut sync, replies) = established(ApplyPolicy::Replace).await;
    board.update(|m| m["seqs"]["volChanges"] = json!([1, 0]));

    let report = sync.tick(board.as_ref(), &replies).await.unwrap();

    assert_eq!(report.changed, ["volChanges"]);
    assert!(report.refreshed.is_empty());
    assert_eq!(board.queries().len(), 1);
}

// ── Failure handling ────────────────────────────────────────────────

#[tokio::test]
async fn failed_branch_rolls_back_its_counter() {
    let (board, mut sync, replies) = established(ApplyPolicy::Replace).await;
    board.update(|m| {
        m["job"]["layer"] = json!(3);
        m["move"]["speedFactor"] = json!(1.5);
        m["seqs"]["job"] = json!(3);
        m["seqs"]["move"] = json!(8);
    });
    board.fail_key("move");

    let err = sync.tick(board.as_ref(), &replies).await.unwrap_err();
    assert!(matches!(err, CoreError::Api { status: Some(500), .. }));

    let seqs = sync.seqs().unwrap();
    assert_eq!(seqs.get("job").and_then(Node::as_u64), Some(3), "applied key keeps its counter");
    assert_eq!(seqs.get("move").and_then(Node::as_u64), Some(7), "failed key is rolled back");
    let model = sync.model().unwrap();
    assert_eq!(model.pointer("job.layer").and_then(Node::as_u64), Some(3));
    assert_eq!(model.pointer("move.speedFactor"), Some(&Node::from(json!(1.0))));

    board.heal_key("move");
    board.clear_log();
    let report = sync.tick(board.as_ref(), &replies).await.unwrap();
    assert_eq!(report.refreshed, ["move"]);
    assert_eq!(
        sync.model().unwrap().pointer("move.speedFactor"),
        Some(&Node::from(json!(1.5)))
    );
}

#[tokio::test]
async fn failed_counter_poll_changes_nothing() {
    let (board, mut sync, replies) = established(ApplyPolicy::Replace).await;
    let before = sync.seqs().cloned();
    board.fail_key("seqs");

    let revision = sync.revision();
    board.fail_key("seqs");

    assert!(sync.tick(board.as_ref(), &replies).await.is_err());
    assert_eq!(sync.seqs().cloned(), before);
    assert_eq!(sync.revision(), revision);
}

#[tokio::test]
async fn revision_moves_only_when_the_model_does() {
    let (board, mut sync, replies) = established(ApplyPolicy::Replace).await;
    let idle = sync.revision();

    sync.tick(board.as_ref(), &replies).await.unwrap();
    assert_eq!(sync.revision(), idle);

    board.update(|m| {
        m["job"]["layer"] = json!(1);
        m["seqs"]["job"] = json!(3);
    });
    sync.tick(board.as_ref(), &replies).await.unwrap();
    assert!(sync.revision() > idle);
}

// ── Apply policies ──────────────────────────────────────────────────

#[tokio::test]
async fn replace_policy_drops_keys_missing_from_update() {
    let (board, mut sync, replies) = established(ApplyPolicy::Replace).await;
    board.update(|m| {
        m["job"].as_object_mut().unwrap().remove("lastFileName");
        m["seqs"]["job"] = json!(3);
    });

    sync.tick(board.as_ref(), &replies).await.unwrap();
    assert!(sync.model().unwrap().pointer("job.lastFileName").is_none());
}

#[tokio::test]
async fn merge_policy_keeps_keys_missing_from_update() {
    let (board, mut sync, replies) = established(ApplyPolicy::Merge).await;
    board.update(|m| {
        m["job"].as_object_mut().unwrap().remove("lastFileName");
        m["job"]["layer"] = json!(4);
        m["seqs"]["job"] = json!(3);
    });

    sync.tick(board.as_ref(), &replies).await.unwrap();
    let model = sync.model().unwrap();
    assert_eq!(
        model.pointer("job.lastFileName").and_then(Node::as_str),
        Some("0:/gcodes/benchy.gcode")
    );
    assert_eq!(model.pointer("job.layer").and_then(Node::as_u64), Some(4));
}

#[tokio::test]
async fn merge_policy_rejects_mismatched_arrays() {
    let (board, mut sync, replies) = established(ApplyPolicy::Merge).await;
    board.update(|m| {
        m["move"]["axes"].as_array_mut().unwrap().pop();
        m["seqs"]["move"] = json!(8);
    });

    let err = sync.tick(board.as_ref(), &replies).await.unwrap_err();

    assert!(err.is_fatal());
    match err {
        CoreError::LengthMismatch {
            key,
            source_len,
            destination_len,
        } => {
            assert_eq!(key, "move.axes");
            assert_eq!((source_len, destination_len), (3, 2));
        }
        other => panic!("expected LengthMismatch, got {other:?}"),
    }
    assert_eq!(
        sync.model().unwrap().pointer("move.axes").map(Node::len),
        Some(3),
        "offending update is discarded"
    );
    assert_eq!(
        sync.seqs().unwrap().get("move").and_then(Node::as_u64),
        Some(7)
    );
}
