//! Cancellation coordination.
//!
//! - [`Closer`]: broadcast-once cancellation and a completion counter shared by
//!   the dispatcher, workers and orchestrator;
//! - [`watch_interrupts`]: turns operator interrupts into closer signals, with a
//!   forced exit on the third one;
//! - [`OsSignals`]: the only place real process signals are bound.

#[allow(clippy::module_inception)]
mod closer;
mod interrupt;

pub use closer::Closer;
pub use interrupt::{
    ExitProcess, FORCE_AFTER, InterruptSource, OsSignals, Terminate, watch_interrupts,
};
