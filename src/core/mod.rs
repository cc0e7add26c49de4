//! Runtime core: the worker pool and the orchestrator that drives it.
//!
//! Internal modules:
//! - [`worker`]: one pool lane; owns cluster lifecycle per task;
//! - [`orchestrator`]: plan, build, spawn, dispatch, wait, report.

mod orchestrator;
mod worker;

pub use orchestrator::{Orchestrator, OrchestratorBuilder, RunReport};
pub use worker::{Worker, WorkerContext, WorkerSettings};
