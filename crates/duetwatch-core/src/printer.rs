// ── Printer abstraction ──
//
// Lifecycle management for one board: connects the transport, wires the
// overload drain to HTTP 503, runs the periodic poller and exposes the
// mirrored model through watch channels.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use duetwatch_api::{DuetClient, DuetTransport, StatusCode, StatusHandler};
use futures_util::FutureExt;
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::PrinterConfig;
use crate::error::CoreError;
use crate::node::Node;
use crate::reply::ReplyCorrelator;
use crate::seqs::SequenceCounters;
use crate::sync::{ObjectModelSynchronizer, SyncState, TickReport};

// ── ConnectionState ──────────────────────────────────────────────

/// Connection state observable by consumers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    /// Stopped after an unrecoverable error.
    Failed,
}

// ── Printer ──────────────────────────────────────────────────────

/// The main entry point for consumers.
///
/// Cheaply cloneable via `Arc<PrinterInner>`. The baseline is only
/// mutated by [`tick()`](Self::tick); everything else reads snapshots.
pub struct Printer<T: DuetTransport = DuetClient> {
    inner: Arc<PrinterInner<T>>,
}

struct PrinterInner<T> {
    poll_interval: Duration,
    transport: Arc<T>,
    sync: Mutex<ObjectModelSynchronizer>,
    replies: Arc<ReplyCorrelator>,
    model: watch::Sender<Option<Arc<Node>>>,
    last_tick: watch::Sender<TickReport>,
    connection_state: watch::Sender<ConnectionState>,
    cancel: CancellationToken,
    /// Child token for the current connection -- cancelled on disconnect,
    /// replaced on reconnect.
    cancel_child: Mutex<CancellationToken>,
    task_handles: Mutex<Vec<JoinHandle<()>>>,
}

impl<T: DuetTransport> Clone for Printer<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl Printer<DuetClient> {
    /// Build the HTTP client described by `config`. Does NOT connect.
    pub fn from_config(config: &PrinterConfig) -> Result<Self, CoreError> {
        let client = DuetClient::new(
            config.address.clone(),
            config.password.clone(),
            &config.transport_config(),
        )?;
        Ok(Self::new(Arc::new(client), config))
    }
}

impl<T: DuetTransport> Printer<T> {
    /// Wrap an existing transport. Does NOT connect -- call
    /// [`connect()`](Self::connect) first.
    pub fn new(transport: Arc<T>, config: &PrinterConfig) -> Self {
        let (model, _) = watch::channel(None);
        let (last_tick, _) = watch::channel(TickReport::default());
        let (connection_state, _) = watch::channel(ConnectionState::Disconnected);
        let cancel = CancellationToken::new();
        let cancel_child = cancel.child_token();

        Self {
            inner: Arc::new(PrinterInner {
                poll_interval: config.poll_interval,
                transport,
                sync: Mutex::new(ObjectModelSynchronizer::new(config.apply_policy)),
                replies: Arc::new(ReplyCorrelator::new(config.reply_timeout)),
                model,
                last_tick,
                connection_state,
                cancel,
                cancel_child: Mutex::new(cancel_child),
                task_handles: Mutex::new(Vec::new()),
            }),
        }
    }

    pub fn transport(&self) -> &Arc<T> {
        &self.inner.transport
    }

    // ── Connection lifecycle ─────────────────────────────────────

    /// Open a board session and arm the overload drain.
    pub async fn connect(&self) -> Result<(), CoreError> {
        let _ = self
            .inner
            .connection_state
            .send(ConnectionState::Connecting);

        if let Err(e) = self.inner.transport.connect().await {
            let _ = self.inner.connection_state.send(ConnectionState::Failed);
            return Err(e.into());
        }
        self.register_overload_handler();

        {
            let mut child = self.inner.cancel_child.lock().await;
            if child.is_cancelled() {
                *child = self.inner.cancel.child_token();
            }
        }

        let _ = self.inner.connection_state.send(ConnectionState::Connected);
        info!("connected to board");
        Ok(())
    }

    /// Route HTTP 503 to the reply buffer drain.
    ///
    /// The handler lives inside the transport, so it only holds a weak
    /// reference back to it.
    fn register_overload_handler(&self) {
        let replies = Arc::clone(&self.inner.replies);
        let transport = Arc::downgrade(&self.inner.transport);
        let handler: StatusHandler = Arc::new(move |status: StatusCode| {
            let replies = Arc::clone(&replies);
            let transport = transport.clone();
            async move {
                let Some(transport) = transport.upgrade() else {
                    return Ok(());
                };
                warn!(status = status.as_u16(), "board reply buffer saturated; draining");
                replies.drain_after_overload(transport.as_ref()).await
            }
            .boxed()
        });
        self.inner
            .transport
            .register_status_handler(StatusCode::SERVICE_UNAVAILABLE, handler);
    }

    /// Stop the poller, close the session and drop the baseline.
    pub async fn disconnect(&self) {
        self.inner.cancel_child.lock().await.cancel();

        let mut handles = self.inner.task_handles.lock().await;
        for handle in handles.drain(..) {
            let _ = handle.await;
        }
        drop(handles);

        if let Err(e) = self.inner.transport.close().await {
            warn!(error = %e, "closing board session failed (non-fatal)");
        }

        self.inner.sync.lock().await.reset();
        self.inner.model.send_replace(None);
        let _ = self
            .inner
            .connection_state
            .send(ConnectionState::Disconnected);
        info!("disconnected from board");
    }

    /// Connect, establish the baseline, run `f`, disconnect.
    pub async fn oneshot<F, Fut, R>(&self, f: F) -> Result<R, CoreError>
    where
        F: FnOnce(Self) -> Fut,
        Fut: Future<Output = Result<R, CoreError>>,
    {
        self.connect().await?;
        let result = match self.tick().await {
            Ok(_) => f(self.clone()).await,
            Err(e) => Err(e),
        };
        self.disconnect().await;
        result
    }

    // ── Mirroring ────────────────────────────────────────────────

    /// Advance the mirror by one step and publish the new snapshot.
    pub async fn tick(&self) -> Result<TickReport, CoreError> {
        let mut sync = self.inner.sync.lock().await;
        let revision = sync.revision();
        let result = sync
            .tick(self.inner.transport.as_ref(), &self.inner.replies)
            .await;

        // A failed tick may still have applied some branches.
        if sync.revision() != revision {
            let snapshot = sync.model().cloned().map(Arc::new);
            self.inner.model.send_replace(snapshot);
        }
        if let Ok(report) = &result {
            if !report.is_idle() {
                self.inner.last_tick.send_replace(report.clone());
            }
        }
        result
    }

    /// Spawn the background poller, ticking every `poll_interval` until
    /// [`disconnect()`](Self::disconnect).
    pub async fn spawn_poller(&self) {
        let cancel = self.inner.cancel_child.lock().await.clone();
        let handle = tokio::spawn(poll_task(self.clone(), self.inner.poll_interval, cancel));
        self.inner.task_handles.lock().await.push(handle);
    }

    // ── Commands ─────────────────────────────────────────────────

    /// Send a G-code command and wait for its reply.
    pub async fn gcode(&self, command: &str) -> Result<String, CoreError> {
        self.inner
            .replies
            .send(self.inner.transport.as_ref(), command)
            .await
    }

    /// Wait for the next reply, whoever caused it.
    pub async fn reply(&self) -> Result<String, CoreError> {
        self.inner.replies.await_reply().await
    }

    // ── State observation ────────────────────────────────────────

    /// Latest baseline snapshot.
    pub fn model(&self) -> Option<Arc<Node>> {
        self.inner.model.borrow().clone()
    }

    pub fn subscribe_model(&self) -> watch::Receiver<Option<Arc<Node>>> {
        self.inner.model.subscribe()
    }

    /// Every published reply, including ones nobody waited for.
    pub fn subscribe_replies(&self) -> watch::Receiver<String> {
        self.inner.replies.subscribe()
    }

    /// The most recent tick that changed anything.
    pub fn subscribe_ticks(&self) -> watch::Receiver<TickReport> {
        self.inner.last_tick.subscribe()
    }

    pub async fn seqs(&self) -> Option<SequenceCounters> {
        self.inner.sync.lock().await.seqs().cloned()
    }

    pub async fn sync_state(&self) -> SyncState {
        self.inner.sync.lock().await.state()
    }

    /// Subscribe to connection state changes.
    pub fn connection_state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.connection_state.subscribe()
    }
}

// ── Background tasks ─────────────────────────────────────────────

/// Tick on a fixed cadence. Transport errors are logged and the next
/// tick tries again; an expired session is reopened first. Errors that
/// mean the mirror can no longer be trusted stop the poller.
async fn poll_task<T: DuetTransport>(
    printer: Printer<T>,
    period: Duration,
    cancel: CancellationToken,
) {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            _ = interval.tick() => {
                match printer.tick().await {
                    Ok(_) => {}
                    Err(e) if e.is_fatal() => {
                        error!(error = %e, "object model update rejected; stopping poller");
                        let _ = printer.inner.connection_state.send(ConnectionState::Failed);
                        break;
                    }
                    Err(e) if e.is_session_expired() => {
                        warn!("board session expired; reconnecting");
                        if let Err(e) = printer.inner.transport.connect().await {
                            warn!(error = %e, "reconnect failed");
                        }
                    }
                    Err(e) => warn!(error = %e, "poll tick failed"),
                }
            }
        }
    }
    debug!("poller stopped");
}
