//! Session exclusivity and the outbound message queue.
//!
//! Only one tuning or analysis session may run per daemon. Exclusivity is an
//! explicit compare-and-swap guard rather than an implicit lock scattered
//! through handlers. Outbound messages flow through an unbounded queue into
//! a single forwarder task, so every queued message is delivered before the
//! session tears down.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use kt_types::{TuneError, TuneResult, TuningMessage};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Daemon-wide single-session lock.
#[derive(Debug, Default)]
pub struct SessionLock {
    busy: AtomicBool,
}

impl SessionLock {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Try to claim the session. Returns `None` when another session holds
    /// it; the returned guard releases on drop.
    pub fn try_acquire(self: &Arc<Self>) -> Option<SessionGuard> {
        if self
            .busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            debug!("session lock acquired");
            Some(SessionGuard {
                lock: Arc::clone(self),
            })
        } else {
            None
        }
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }
}

/// Releases the session lock when dropped.
#[derive(Debug)]
pub struct SessionGuard {
    lock: Arc<SessionLock>,
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        self.lock.busy.store(false, Ordering::Release);
        debug!("session lock released");
    }
}

// ---------------------------------------------------------------------------
// Outbound queue
// ---------------------------------------------------------------------------

/// Destination of session messages, usually the client connection.
#[async_trait]
pub trait MessageSink: Send {
    async fn deliver(&mut self, message: TuningMessage) -> TuneResult<()>;
}

#[async_trait]
impl MessageSink for mpsc::UnboundedSender<TuningMessage> {
    async fn deliver(&mut self, message: TuningMessage) -> TuneResult<()> {
        self.send(message).map_err(|_| TuneError::ChannelClosed)
    }
}

/// Sending half of the session's outbound queue.
#[derive(Debug, Clone)]
pub struct Outbound {
    tx: mpsc::UnboundedSender<TuningMessage>,
}

impl Outbound {
    pub fn send(&self, message: TuningMessage) -> TuneResult<()> {
        self.tx.send(message).map_err(|_| TuneError::ChannelClosed)
    }

    pub fn display(&self, text: impl Into<String>) -> TuneResult<()> {
        self.send(TuningMessage::display(text))
    }
}

/// Spawn the forwarder task draining the outbound queue into `sink`.
///
/// The task exits only after the queue is closed and fully drained, so
/// dropping every [`Outbound`] and awaiting the handle guarantees ordered
/// delivery of everything sent before teardown.
pub fn spawn_forwarder<S>(mut sink: S) -> (Outbound, JoinHandle<()>)
where
    S: MessageSink + 'static,
{
    let (tx, mut rx) = mpsc::unbounded_channel();
    let handle = tokio::spawn(async move {
        while let Some(message) = rx.recv().await {
            if let Err(e) = sink.deliver(message).await {
                warn!(error = %e, "dropping outbound message, sink closed");
                break;
            }
        }
    });
    (Outbound { tx }, handle)
}
