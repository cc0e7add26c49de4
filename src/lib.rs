//! # testvisor
//!
//! **testvisor** runs package test suites in parallel, each worker provisioning
//! the containerized cluster its packages need, and prints a deterministic
//! timeline of what happened once everything has drained.
//!
//! ## Architecture
//! ### Overview
//! ```text
//!     ┌──────────────┐
//!     │  Discover    │  FsDiscovery: packages, descriptors, stages
//!     └──────┬───────┘
//!            ▼
//!     ┌──────────────┐
//!     │    plan()    │  filters, slow-first partition
//!     └──────┬───────┘
//!            ▼
//! ┌───────────────────────────────────────────────────────────────────┐
//! │  Orchestrator                                                     │
//! │  - interrupt watcher, started first                               │
//! │    (1st: cancel, 2nd: absorbed, 3rd: exit)                        │
//! │  - build step (COMPILE)                                           │
//! │  - TaskSender::dispatch (rendezvous, cancellable)                 │
//! └──────┬──────────────────┬──────────────────┬──────────────────────┘
//!        ▼                  ▼                  ▼
//!     ┌──────────────┐   ┌──────────────┐   ┌──────────────┐
//!     │   Worker 1   │   │   Worker 2   │   │   Worker N   │
//!     │ shared + own │   │ shared + own │   │ shared + own │
//!     │   clusters   │   │   clusters   │   │   clusters   │
//!     └┬─────────────┘   └┬─────────────┘   └┬─────────────┘
//!      │ ClusterManager (start / stop / resolve / probes)
//!      │ Executor (test command, stdout ─► Telemetry)
//!      ▼                  ▼                  ▼
//! ┌───────────────────────────────────────────────────────────────────┐
//! │  Telemetry: duration records + failure catcher ─► TIMELINE report │
//! └───────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ### Lifecycle of a worker
//! ```text
//! work():
//! loop {
//!   ├─► cancelled? ─► break
//!   ├─► recv() (rendezvous; None ─► break)
//!   ├─► Common        ─► shared cluster (once) ─► login ─► execute
//!   ├─► CustomCluster ─► start ─► health ─► execute ─► stop (async)
//!   ├─► SpecialCased  ─► staged start + setup ─► login ─► execute ─► stop (async)
//!   └─► error ─► return it
//! }
//! orchestrator: error? ─► signal cancellation
//! finish(): stop shared cluster ─► wait for all stops ─► DONE record
//! orchestrator: closer.done()
//! ```
//!
//! ## Features
//! | Area              | Description                                           | Key types / traits                      |
//! |-------------------|-------------------------------------------------------|-----------------------------------------|
//! | **Cancellation**  | Broadcast-once token plus completion counter.         | [`Closer`], [`InterruptSource`]         |
//! | **Clusters**      | Start/stop/resolve through a pluggable control plane. | [`ClusterManager`], [`ControlPlane`]    |
//! | **Probes**        | Bounded readiness retries.                            | [`RetryPolicy`], [`Probe`]              |
//! | **Scheduling**    | Discovery, planning and rendezvous dispatch.          | [`Discover`], [`plan`], [`handoff`]     |
//! | **Telemetry**     | Durations, caught failures, the final timeline.       | [`Telemetry`], [`Tee`]                  |
//! | **Errors**        | Typed errors with stable labels.                      | [`RunError`], [`WorkerError`]           |
//!
//! ## Example
//! ```no_run
//! use testvisor::{Cli, ExitProcess, Orchestrator, OsSignals};
//! use clap::Parser;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let cfg = Cli::parse().into_config()?;
//!     let orchestrator = Orchestrator::builder(cfg).build()?;
//!     orchestrator.run(OsSignals::new()?, ExitProcess).await?;
//!     Ok(())
//! }
//! ```

mod closer;
mod cluster;
mod config;
mod core;
mod error;
mod exec;
mod namespace;
mod policies;
mod tasks;
mod telemetry;

pub mod logger;

// ---- Public re-exports ----

pub use closer::{
    Closer, ExitProcess, FORCE_AFTER, InterruptSource, OsSignals, Terminate, watch_interrupts,
};
pub use cluster::{
    CLEAR_STOP_TIMEOUT, ClearSummary, ClusterManager, Compose, Container, ControlPlane,
    DEFAULT_SETTLE, HealthProbe, Instance, LoginProbe, Network, PREFIX_ENV, PortMapping,
    http_client, parse_ports, parse_ps,
};
pub use config::{Cli, Config, ProbeConfig};
pub use core::{Orchestrator, OrchestratorBuilder, RunReport, Worker, WorkerContext, WorkerSettings};
pub use error::{ClusterError, ConfigError, ExecError, ProbeError, RunError, WorkerError};
pub use exec::{CommandExecutor, DRY_RUN_PAUSE, Executor, build};
pub use namespace::{Namespaces, PREFIX_ROOT};
pub use policies::{Probe, RetryPolicy, retry_probe};
pub use tasks::{
    Candidate, DESCRIPTOR_FILE, Discover, DispatchSummary, Filters, FsDiscovery, SLOW_KEYWORDS,
    STAGES_FILE, Stage, Task, TaskKind, TaskReceiver, TaskSender, handoff, is_slow, plan,
    slow_first,
};
pub use telemetry::{
    DurationRecord, FAILURE_MARKERS, FailureCatcher, Inspect, REPORT_THRESHOLD, Tee, Telemetry,
    human,
};
