//! # Task source and scheduler.
//!
//! - [`Task`] / [`TaskKind`] / [`Stage`] the work items and how they get a cluster;
//! - [`Discover`] / [`FsDiscovery`] where candidates come from;
//! - [`plan`] filtering and slow-first ordering;
//! - [`handoff`] the rendezvous between the dispatcher and the worker pool.

mod discover;
mod dispatch;
mod plan;
mod task;

pub use discover::{Candidate, DESCRIPTOR_FILE, Discover, FsDiscovery, STAGES_FILE};
pub use dispatch::{DispatchSummary, TaskReceiver, TaskSender, handoff};
pub use plan::{Filters, plan, slow_first};
pub use task::{SLOW_KEYWORDS, Stage, Task, TaskKind, is_slow};
