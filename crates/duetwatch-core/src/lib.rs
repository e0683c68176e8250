//! Object model mirroring for RepRapFirmware (Duet) boards.
//!
//! Sits between `duetwatch-api` and the command-line driver:
//!
//! - **[`Printer`]** -- Lifecycle facade: [`connect()`](Printer::connect)
//!   opens a session and arms the overload drain,
//!   [`spawn_poller()`](Printer::spawn_poller) ticks the mirror on a fixed
//!   cadence, [`gcode()`](Printer::gcode) sends commands and waits for
//!   their replies.
//!
//! - **[`ObjectModelSynchronizer`]** -- Owns the baseline and the sequence
//!   counters. First tick: full chunked fetch. Later ticks: poll `seqs`,
//!   refetch the branches whose counters moved.
//!
//! - **[`ChunkedFetcher`]** -- Rebuilds a subtree from depth-limited and
//!   paged `rr_model` responses.
//!
//! - **[`ReplyCorrelator`]** -- Single-slot reply mailbox with the
//!   HTTP 503 drain.
//!
//! - **[`merge`]** -- Structural merge where the destination is
//!   authoritative and arrays never grow.

pub mod config;
pub mod error;
pub mod fetch;
pub mod merge;
pub mod node;
pub mod printer;
pub mod reply;
pub mod seqs;
pub mod sync;

// ── Primary re-exports ──────────────────────────────────────────────
pub use config::{DEFAULT_PASSWORD, PrinterConfig, TlsVerification};
pub use error::CoreError;
pub use fetch::{ChunkedFetcher, FetchCursor};
pub use merge::{MergeError, merge};
pub use node::Node;
pub use printer::{ConnectionState, Printer};
pub use reply::{MAX_BUFFERED_CLIENTS, ReplyCorrelator};
pub use seqs::SequenceCounters;
pub use sync::{ApplyPolicy, ObjectModelSynchronizer, SyncState, TickReport};
