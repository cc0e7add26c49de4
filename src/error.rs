//! Error types used by the orchestrator, its workers and collaborators.
//!
//! The taxonomy mirrors how far an error is allowed to travel:
//!
//! - [`ConfigError`] detected before any worker starts; aborts the run with zero partial work.
//! - [`ClusterError`] provisioning failures (fatal) and control-plane query failures.
//! - [`ProbeError`] readiness probe exhaustion (fatal for login, a warning for health).
//! - [`ExecError`] test command failures; returned by the owning worker.
//! - [`WorkerError`] anything a worker returns to the orchestrator.
//! - [`RunError`] the single error surfaced by [`Orchestrator::run`](crate::Orchestrator::run).
//!
//! Teardown errors have no type here: they are logged and swallowed where they happen.
//!
//! Every enum exposes `as_label()` with a short stable snake_case label for logs.

use std::path::PathBuf;

use thiserror::Error;

use crate::tasks::DispatchSummary;

/// # Errors detected while turning options and the source tree into a task list.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Package and test filters are mutually exclusive.
    #[error("both package filter {pkg:?} and test filter {test:?} are set")]
    ConflictingFilters { pkg: String, test: String },

    /// Filters (or an empty tree) left nothing to run.
    #[error("couldn't find any packages under {base:?}")]
    NoTasks { base: PathBuf },

    /// A worker pool of size zero can never drain the hand-off.
    #[error("concurrency must be at least 1")]
    ZeroConcurrency,

    /// The discovery source failed to read the tree.
    #[error("discovery failed: {error}")]
    Discovery { error: String },

    /// The HTTP client used by readiness probes could not be built.
    #[error("building http client: {error}")]
    HttpClient { error: String },
}

impl ConfigError {
    pub fn as_label(&self) -> &'static str {
        match self {
            ConfigError::ConflictingFilters { .. } => "config_conflicting_filters",
            ConfigError::NoTasks { .. } => "config_no_tasks",
            ConfigError::ZeroConcurrency => "config_zero_concurrency",
            ConfigError::Discovery { .. } => "config_discovery",
            ConfigError::HttpClient { .. } => "config_http_client",
        }
    }
}

/// # Errors produced by the cluster control plane and lifecycle manager.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum ClusterError {
    /// An external control-plane command could not be spawned or exited non-zero.
    #[error("{command} failed: {reason}")]
    Command { command: String, reason: String },

    /// Control-plane output could not be decoded.
    #[error("decoding control plane output: {error}")]
    Decode { error: String },

    /// Bringing a cluster up failed; the environment is unusable.
    #[error("starting cluster {prefix} from {descriptor:?}: {source}")]
    Start {
        descriptor: PathBuf,
        prefix: String,
        #[source]
        source: Box<ClusterError>,
    },

    /// A stage setup command failed for a special-cased cluster.
    #[error("setup {command:?} for cluster {prefix}: {reason}")]
    Setup {
        prefix: String,
        command: Vec<String>,
        reason: String,
    },
}

impl ClusterError {
    pub fn as_label(&self) -> &'static str {
        match self {
            ClusterError::Command { .. } => "cluster_command",
            ClusterError::Decode { .. } => "cluster_decode",
            ClusterError::Start { .. } => "cluster_start",
            ClusterError::Setup { .. } => "cluster_setup",
        }
    }
}

/// # Readiness probe failures.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum ProbeError {
    /// Every attempt failed.
    #[error("{probe} probe exhausted after {attempts} attempts; last error: {last}")]
    Exhausted {
        probe: &'static str,
        attempts: u32,
        last: String,
    },
}

impl ProbeError {
    pub fn as_label(&self) -> &'static str {
        match self {
            ProbeError::Exhausted { .. } => "probe_exhausted",
        }
    }
}

/// # Test command failures.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum ExecError {
    /// The command could not be started.
    #[error("spawning {program}: {error}")]
    Spawn { program: String, error: String },

    /// The command ran and reported failure.
    #[error("tests failed for {task}: {status}")]
    Failed { task: String, status: String },

    /// The build step run before dispatch failed.
    #[error("build step {command:?} failed: {status}")]
    Build { command: Vec<String>, status: String },

    /// Reading the command output failed.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl ExecError {
    pub fn as_label(&self) -> &'static str {
        match self {
            ExecError::Spawn { .. } => "exec_spawn",
            ExecError::Failed { .. } => "exec_failed",
            ExecError::Build { .. } => "exec_build",
            ExecError::Io(_) => "exec_io",
        }
    }
}

/// # Errors a worker hands back to the orchestrator.
///
/// Any of these stops the worker; the orchestrator turns the first one into a
/// coordinator-wide cancellation so siblings stop taking new tasks.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum WorkerError {
    #[error(transparent)]
    Cluster(#[from] ClusterError),

    #[error(transparent)]
    Probe(#[from] ProbeError),

    #[error(transparent)]
    Exec(#[from] ExecError),

    /// The worker task itself panicked or was aborted.
    #[error("worker aborted: {reason}")]
    Aborted { reason: String },
}

impl WorkerError {
    pub fn as_label(&self) -> &'static str {
        match self {
            WorkerError::Cluster(e) => e.as_label(),
            WorkerError::Probe(e) => e.as_label(),
            WorkerError::Exec(e) => e.as_label(),
            WorkerError::Aborted { .. } => "worker_aborted",
        }
    }

    /// Provisioning and login failures invalidate the environment itself,
    /// as opposed to a single failing test package.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            WorkerError::Cluster(_) | WorkerError::Probe(_) | WorkerError::Aborted { .. }
        )
    }
}

/// # The error returned by a whole run.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum RunError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Build(ExecError),

    /// At least one worker failed; `first` is the earliest one collected.
    #[error("{failed} worker(s) failed; first: {first}")]
    Workers {
        failed: usize,
        first: WorkerError,
        /// How far dispatch got before the failure cancelled it.
        dispatch: DispatchSummary,
    },

    /// An operator interrupt stopped the run before any worker started.
    #[error("interrupted during {stage}")]
    Interrupted { stage: &'static str },
}

impl RunError {
    pub fn as_label(&self) -> &'static str {
        match self {
            RunError::Config(e) => e.as_label(),
            RunError::Build(e) => e.as_label(),
            RunError::Workers { .. } => "run_workers_failed",
            RunError::Interrupted { .. } => "run_interrupted",
        }
    }
}
