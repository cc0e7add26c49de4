//! # Operator interrupts.
//!
//! Interrupt handling is split into a source and a policy so the policy can be
//! driven without real process signals:
//!
//! - [`InterruptSource`]: yields one item per interrupt ([`OsSignals`] binds the
//!   real ones: `SIGINT` and `SIGTERM` on unix, Ctrl-C elsewhere);
//! - [`watch_interrupts`]: counts interrupts and drives the [`Closer`];
//! - [`Terminate`]: the escape hatch fired on the third interrupt.
//!
//! ```text
//! 1st ──► closer.signal()        (graceful: in-flight tasks finish, clusters stop)
//! 2nd ──► closer.signal() no-op  (absorbed)
//! 3rd ──► terminate.terminate()  (exit now, teardown skipped)
//! ```

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{error, info, warn};

use super::Closer;

/// Number of interrupts after which the process is terminated immediately.
pub const FORCE_AFTER: u32 = 3;

/// Stream of operator interrupts.
#[async_trait]
pub trait InterruptSource: Send + 'static {
    /// Resolves on the next interrupt; `None` once the source can yield no more.
    async fn next(&mut self) -> Option<()>;
}

/// Immediate termination hook.
pub trait Terminate: Send + Sync + 'static {
    fn terminate(&self);
}

/// Exits the process with status 1, skipping every pending teardown.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExitProcess;

impl Terminate for ExitProcess {
    fn terminate(&self) {
        std::process::exit(1);
    }
}

/// Real process signals.
///
/// Listeners are registered at construction; once registered the default
/// "kill on Ctrl-C" behavior is gone for the life of the process.
#[cfg(unix)]
pub struct OsSignals {
    sigint: tokio::signal::unix::Signal,
    sigterm: tokio::signal::unix::Signal,
}

#[cfg(unix)]
impl OsSignals {
    pub fn new() -> std::io::Result<Self> {
        use tokio::signal::unix::{SignalKind, signal};

        Ok(Self {
            sigint: signal(SignalKind::interrupt())?,
            sigterm: signal(SignalKind::terminate())?,
        })
    }
}

#[cfg(unix)]
#[async_trait]
impl InterruptSource for OsSignals {
    async fn next(&mut self) -> Option<()> {
        tokio::select! {
            v = self.sigint.recv()  => v,
            v = self.sigterm.recv() => v,
        }
    }
}

/// Real process signals.
#[cfg(not(unix))]
pub struct OsSignals;

#[cfg(not(unix))]
impl OsSignals {
    pub fn new() -> std::io::Result<Self> {
        Ok(Self)
    }
}

#[cfg(not(unix))]
#[async_trait]
impl InterruptSource for OsSignals {
    async fn next(&mut self) -> Option<()> {
        tokio::signal::ctrl_c().await.ok()
    }
}

/// Drives `closer` from `source` until the source ends or termination fires.
///
/// Returns the number of interrupts observed.
pub async fn watch_interrupts<S, T>(mut source: S, closer: Arc<Closer>, terminate: T) -> u32
where
    S: InterruptSource,
    T: Terminate,
{
    let mut seen = 0u32;
    while source.next().await.is_some() {
        seen += 1;
        if seen >= FORCE_AFTER {
            error!(target: "testvisor.closer", interrupts = seen, "forcing exit; cluster teardown skipped");
            terminate.terminate();
            break;
        }
        if closer.signal() {
            warn!(target: "testvisor.closer", "interrupt received; finishing in-flight tasks");
        } else {
            info!(
                target: "testvisor.closer",
                interrupts = seen,
                "already shutting down; interrupt {} more time(s) to force exit",
                FORCE_AFTER - seen
            );
        }
    }
    seen
}
