//! # Rendezvous hand-off between the dispatcher and the worker pool.
//!
//! A task is only released when a worker is actually waiting for it: each
//! [`TaskReceiver::recv`] call posts a one-shot slot, and the dispatcher fills
//! exactly one slot per task. Nothing is buffered on the task side, so a task
//! is either still owned by the dispatcher or owned by exactly one worker.
//!
//! ```text
//! worker ── recv() ── oneshot::Sender ──► requests ──► TaskSender::dispatch
//!    ▲                                                       │
//!    └──────────────────── slot.send(task) ◄─────────────────┘
//! ```
//!
//! ## Rules
//! - cancellation is observed here, not by the workers: it is checked before
//!   every hand-off, and once observed the dispatcher stops and the remaining
//!   tasks stay undelivered;
//! - when dispatch ends every pending slot is dropped, so workers waiting in
//!   `recv` see a closed hand-off (`None`) rather than racing cancellation
//!   themselves;
//! - a slot whose worker went away is skipped and the task is offered to the next one;
//! - a task counted as sent sits in a slot whose worker is still awaiting it.

use tokio::sync::{mpsc, oneshot};
use tracing::info;

use super::task::Task;
use crate::closer::Closer;

type Slot = oneshot::Sender<Task>;

/// Creates the hand-off for a pool of `workers`.
pub fn handoff(workers: usize) -> (TaskSender, TaskReceiver) {
    let (tx, rx) = mpsc::channel(workers.max(1));
    (TaskSender { requests: rx }, TaskReceiver { requests: tx })
}

/// Worker side; clone one per worker.
#[derive(Clone, Debug)]
pub struct TaskReceiver {
    requests: mpsc::Sender<Slot>,
}

impl TaskReceiver {
    /// Waits for the next task; `None` once the dispatcher is gone.
    ///
    /// # Cancel safety
    /// Not cancel safe: dropping the future after the dispatcher filled the
    /// slot loses the task. Await it to completion; dispatch ending is what
    /// unblocks it.
    pub async fn recv(&self) -> Option<Task> {
        let (slot, task) = oneshot::channel();
        self.requests.send(slot).await.ok()?;
        task.await.ok()
    }
}

/// Dispatcher side.
#[derive(Debug)]
pub struct TaskSender {
    requests: mpsc::Receiver<Slot>,
}

/// What [`TaskSender::dispatch`] managed to deliver.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DispatchSummary {
    pub total: usize,
    pub sent: usize,
    /// Dispatch stopped because cancellation was observed.
    pub cancelled: bool,
}

impl DispatchSummary {
    pub fn undelivered(&self) -> usize {
        self.total - self.sent
    }
}

impl TaskSender {
    /// Hands `tasks` out in order until done, cancelled, or no worker is left.
    pub async fn dispatch(mut self, tasks: Vec<Task>, closer: &Closer) -> DispatchSummary {
        let total = tasks.len();
        let mut sent = 0;
        let mut cancelled = false;
        let mut queue = tasks.into_iter();
        let mut next = queue.next();

        while let Some(task) = next.take() {
            let slot = tokio::select! {
                biased;
                _ = closer.cancelled() => {
                    cancelled = true;
                    break;
                }
                slot = self.requests.recv() => match slot {
                    Some(slot) => slot,
                    None => break,
                },
            };

            match slot.send(task) {
                Ok(()) => {
                    sent += 1;
                    info!(target: "testvisor.dispatch", "Sent {sent}/{total} tasks for processing.");
                    next = queue.next();
                }
                Err(task) => next = Some(task),
            }
        }

        self.requests.close();
        DispatchSummary { total, sent, cancelled }
    }
}
