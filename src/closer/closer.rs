//! # Broadcast-once cancellation plus a completion counter.
//!
//! [`Closer`] is shared (via `Arc`) by the dispatcher, every worker and the
//! orchestrator:
//!
//! ```text
//!  interrupt / worker error ──► signal() ──► token.cancel()  (at most once)
//!                                              │
//!                     dispatcher select! ◄─────┤
//!                     worker select!     ◄─────┘
//!
//!  worker exit ──► done() ──► pending -= 1 ──► (pending == 0) ──► wait() returns
//! ```
//!
//! ## Rules
//! - `signal()` broadcasts exactly once; later calls are no-ops returning `false`.
//! - `done()` saturates at zero; extra calls never wrap or re-notify.
//! - `wait()` returns immediately when the count is already zero.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

/// Cancellation token and completion counter for one run.
#[derive(Debug)]
pub struct Closer {
    token: CancellationToken,
    signalled: AtomicBool,
    pending: AtomicUsize,
    drained: Notify,
}

impl Closer {
    /// Creates a closer expecting `count` calls to [`Closer::done`].
    pub fn new(count: usize) -> Self {
        Self {
            token: CancellationToken::new(),
            signalled: AtomicBool::new(false),
            pending: AtomicUsize::new(count),
            drained: Notify::new(),
        }
    }

    /// Non-blocking check.
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Broadcasts cancellation.
    ///
    /// Returns `true` only for the call that actually flipped the state.
    pub fn signal(&self) -> bool {
        if self.signalled.swap(true, Ordering::SeqCst) {
            return false;
        }
        self.token.cancel();
        true
    }

    /// Resolves once [`Closer::signal`] has been called.
    pub async fn cancelled(&self) {
        self.token.cancelled().await
    }

    /// Marks one participant as finished.
    pub fn done(&self) {
        let prev = self
            .pending
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        if prev == Ok(1) {
            self.drained.notify_waiters();
        }
    }

    /// Number of participants that have not called [`Closer::done`] yet.
    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::SeqCst)
    }

    /// Blocks until every participant has called [`Closer::done`].
    pub async fn wait(&self) {
        loop {
            // Registered before the check so a concurrent final `done()` is not missed.
            let notified = self.drained.notified();
            if self.pending() == 0 {
                return;
            }
            notified.await;
        }
    }
}
