// ── Command/reply correlation ──
//
// The board does not tag replies with the command that produced them.
// Correlation is temporal: a command is queued without an inline reply,
// and the next reply published afterwards belongs to it. The mailbox is a
// `watch` channel holding the latest reply text; subscribing marks the
// current value as seen, publishing wakes every waiter.

use std::time::Duration;

use duetwatch_api::DuetTransport;
use tokio::sync::watch;
use tracing::{debug, trace};

use crate::error::CoreError;

/// Upper bound on clients the board buffers replies for. The overload
/// drain never reads more than this many replies.
pub const MAX_BUFFERED_CLIENTS: usize = 10;

/// Single-slot reply mailbox shared by command issuers, the poller and
/// the overload handler.
#[derive(Debug)]
pub struct ReplyCorrelator {
    slot: watch::Sender<String>,
    timeout: Option<Duration>,
}

impl ReplyCorrelator {
    /// `timeout` bounds how long [`send`](Self::send) and
    /// [`await_reply`](Self::await_reply) wait; `None` waits forever.
    pub fn new(timeout: Option<Duration>) -> Self {
        let (slot, _) = watch::channel(String::new());
        Self { slot, timeout }
    }

    /// Queue `command` and wait for the next reply.
    ///
    /// A 503 while queueing is not an error here: the overload drain has
    /// already published whatever the board had buffered, and that is
    /// what this call returns.
    pub async fn send<T: DuetTransport>(
        &self,
        transport: &T,
        command: &str,
    ) -> Result<String, CoreError> {
        let mut rx = self.slot.subscribe();
        match transport.send_command(command, true).await {
            Ok(()) => {}
            Err(duetwatch_api::Error::ServiceUnavailable) => {
                debug!(command, "command hit an overloaded board; waiting on drained reply");
            }
            Err(e) => return Err(e.into()),
        }
        self.wait(&mut rx).await
    }

    /// Wait for the next published reply without queueing anything.
    pub async fn await_reply(&self) -> Result<String, CoreError> {
        let mut rx = self.slot.subscribe();
        let reply = self.wait(&mut rx).await?;
        tokio::task::yield_now().await;
        Ok(reply)
    }

    /// The most recently published reply text.
    pub fn latest(&self) -> String {
        self.slot.borrow().clone()
    }

    /// Observe every published reply.
    pub fn subscribe(&self) -> watch::Receiver<String> {
        self.slot.subscribe()
    }

    /// The `reply` counter moved: read the buffered reply and hand it to
    /// whoever is waiting.
    pub async fn on_reply_changed<T: DuetTransport>(
        &self,
        transport: &T,
    ) -> Result<(), duetwatch_api::Error> {
        let reply = transport.fetch_reply(false).await?;
        self.publish(reply).await;
        Ok(())
    }

    /// Empty the board's reply buffer after a 503.
    ///
    /// Reads at most [`MAX_BUFFERED_CLIENTS`] replies, stops at the first
    /// empty one, and publishes the last non-empty reply seen (or `""`).
    /// Transport failures are returned to the status handler dispatcher.
    pub async fn drain_after_overload<T: DuetTransport>(
        &self,
        transport: &T,
    ) -> Result<(), duetwatch_api::Error> {
        let mut retained = None;
        for attempt in 1..=MAX_BUFFERED_CLIENTS {
            let reply = transport.fetch_reply(true).await?;
            if reply.is_empty() {
                trace!(attempt, "reply buffer drained");
                break;
            }
            retained = Some(reply);
        }
        debug!(retained = retained.is_some(), "overload drain finished");
        self.publish(retained.unwrap_or_default()).await;
        Ok(())
    }

    async fn publish(&self, reply: String) {
        self.slot.send_replace(reply);
        // Let waiters observe the reply before the next cycle overwrites it.
        tokio::task::yield_now().await;
    }

    async fn wait(&self, rx: &mut watch::Receiver<String>) -> Result<String, CoreError> {
        let next = async {
            rx.changed().await.map_err(|_| CoreError::Disconnected)?;
            Ok(rx.borrow_and_update().clone())
        };
        match self.timeout {
            None => next.await,
            Some(limit) => tokio::time::timeout(limit, next)
                .await
                .map_err(|_| CoreError::Timeout {
                    operation: format!("reply after {limit:?}"),
                })?,
        }
    }
}

impl Default for ReplyCorrelator {
    fn default() -> Self {
        Self::new(None)
    }
}
