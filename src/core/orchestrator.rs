//! # Orchestrator: one run from options to verdict.
//!
//! ```text
//! interrupt watcher ── signal / terminate ──► (whole run, every return path)
//!
//! clear mode ──► ClusterManager::clear("test-") ──► done
//!
//! START ─► plan ─► build (COMPILE) ─► spawn N workers ─► dispatch (rendezvous)
//!   worker error ──► closer.signal() (here, once the worker returns it)
//!
//! closer.wait() ─► join workers ─► print timeline ─► "Tests PASSED." | "Tests FAILED."
//! ```
//!
//! ## Rules
//! - the watcher starts before anything else, so the third interrupt always
//!   terminates, even during clear or build;
//! - clear and build give up as soon as cancellation is signalled;
//! - configuration errors surface before any worker exists;
//! - any worker error cancels the run: dispatch stops, idle workers drain and
//!   busy ones finish their in-flight task;
//! - the report is printed whether the run passed or failed.

use std::sync::Arc;

use tokio::task::{JoinHandle, JoinSet};
use tokio::time::Instant;
use tracing::{error, info, warn};

use super::worker::{Worker, WorkerContext, WorkerSettings};
use crate::closer::{Closer, InterruptSource, Terminate, watch_interrupts};
use crate::cluster::{ClearSummary, ClusterManager, Compose, ControlPlane, http_client};
use crate::config::Config;
use crate::error::{ConfigError, RunError, WorkerError};
use crate::exec::{self, CommandExecutor, Executor};
use crate::namespace::{Namespaces, PREFIX_ROOT};
use crate::tasks::{Discover, DispatchSummary, FsDiscovery, handoff, plan};
use crate::telemetry::{Telemetry, human};

/// Length given to the `START` marker record.
const START_MARK: std::time::Duration = std::time::Duration::from_millis(1);

/// What a successful run did.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RunReport {
    /// Leftover resources were removed; nothing was tested.
    Cleared(ClearSummary),
    /// Tests ran; `dispatch` tells how many tasks reached a worker.
    Tested {
        workers: usize,
        dispatch: DispatchSummary,
    },
}

/// Builder for an [`Orchestrator`]; every collaborator has a production default.
pub struct OrchestratorBuilder {
    config: Config,
    discovery: Option<Arc<dyn Discover>>,
    plane: Option<Arc<dyn ControlPlane>>,
    executor: Option<Arc<dyn Executor>>,
    telemetry: Option<Arc<Telemetry>>,
    namespaces: Option<Arc<Namespaces>>,
}

impl OrchestratorBuilder {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            discovery: None,
            plane: None,
            executor: None,
            telemetry: None,
            namespaces: None,
        }
    }

    pub fn with_discovery(mut self, discovery: Arc<dyn Discover>) -> Self {
        self.discovery = Some(discovery);
        self
    }

    pub fn with_control_plane(mut self, plane: Arc<dyn ControlPlane>) -> Self {
        self.plane = Some(plane);
        self
    }

    pub fn with_executor(mut self, executor: Arc<dyn Executor>) -> Self {
        self.executor = Some(executor);
        self
    }

    pub fn with_telemetry(mut self, telemetry: Arc<Telemetry>) -> Self {
        self.telemetry = Some(telemetry);
        self
    }

    pub fn with_namespaces(mut self, namespaces: Arc<Namespaces>) -> Self {
        self.namespaces = Some(namespaces);
        self
    }

    /// Fills in defaults and builds the shared HTTP client.
    pub fn build(self) -> Result<Orchestrator, ConfigError> {
        let cfg = self.config;

        let discovery = self
            .discovery
            .unwrap_or_else(|| Arc::new(FsDiscovery::new(&cfg.base)));
        let plane = self.plane.unwrap_or_else(|| Arc::new(Compose::new()));
        let executor = self.executor.unwrap_or_else(|| {
            Arc::new(
                CommandExecutor::new(&cfg.base)
                    .with_count(cfg.iterations())
                    .with_run_filter(cfg.filters.test.clone())
                    .with_json(cfg.json_output)
                    .with_dry_run(cfg.dry),
            )
        });
        let telemetry = self
            .telemetry
            .unwrap_or_else(|| Arc::new(Telemetry::new().with_offset(cfg.local_offset)));
        let namespaces = self.namespaces.unwrap_or_default();
        let http = http_client(cfg.probe.request_timeout)?;
        let clusters = ClusterManager::new(plane).with_settle(cfg.settle);

        Ok(Orchestrator {
            cfg,
            discovery,
            clusters,
            executor,
            telemetry,
            namespaces,
            http,
        })
    }
}

/// Drives one run.
pub struct Orchestrator {
    cfg: Config,
    discovery: Arc<dyn Discover>,
    clusters: ClusterManager,
    executor: Arc<dyn Executor>,
    telemetry: Arc<Telemetry>,
    namespaces: Arc<Namespaces>,
    http: reqwest::Client,
}

impl Orchestrator {
    pub fn builder(config: Config) -> OrchestratorBuilder {
        OrchestratorBuilder::new(config)
    }

    pub fn telemetry(&self) -> &Arc<Telemetry> {
        &self.telemetry
    }

    /// Runs to completion; interrupts come from `interrupts`, forced exit goes through `terminate`.
    pub async fn run<S, T>(&self, interrupts: S, terminate: T) -> Result<RunReport, RunError>
    where
        S: InterruptSource,
        T: Terminate,
    {
        let n = self.cfg.worker_count();
        let closer = Arc::new(Closer::new(n));
        let _watcher = Watcher(tokio::spawn(watch_interrupts(
            interrupts,
            Arc::clone(&closer),
            terminate,
        )));

        if self.cfg.clear {
            let summary = tokio::select! {
                biased;
                _ = closer.cancelled() => return Err(interrupted("clear")),
                summary = self.clusters.clear(PREFIX_ROOT) => summary,
            };
            info!(target: "testvisor.run", ?summary, "cleared leftover test resources");
            return Ok(RunReport::Cleared(summary));
        }

        let started = Instant::now();
        self.telemetry.took(0, "START", START_MARK);

        let tasks = plan(self.discovery.as_ref(), &self.cfg.filters, &self.cfg.base)?;

        if self.cfg.should_build() {
            let t0 = Instant::now();
            let built = tokio::select! {
                biased;
                _ = closer.cancelled() => return Err(interrupted("build")),
                built = exec::build(&self.cfg.base, &self.cfg.build_command) => built,
            };
            if let Err(e) = built {
                error!(target: "testvisor.run", error = %e, "build failed");
                return Err(RunError::Build(e));
            }
            self.telemetry.took(0, "COMPILE", t0.elapsed());
        }

        let ctx = Arc::new(self.worker_context(Arc::clone(&closer)));
        let (sender, receiver) = handoff(n);
        let mut workers = JoinSet::new();
        for _ in 0..n {
            let mut worker = Worker::new(Arc::clone(&ctx), receiver.clone());
            let closer = Arc::clone(&closer);
            workers.spawn(async move {
                let _done = DoneGuard(Arc::clone(&closer));
                let result = worker.work().await;
                if result.is_err() && closer.signal() {
                    warn!(target: "testvisor.run", worker = worker.id(), "worker failed; cancelling the run");
                }
                worker.finish().await;
                result
            });
        }
        drop(receiver);

        let dispatch = sender.dispatch(tasks, &closer).await;
        if dispatch.cancelled {
            warn!(
                target: "testvisor.run",
                sent = dispatch.sent,
                undelivered = dispatch.undelivered(),
                "dispatch cancelled"
            );
        }

        closer.wait().await;
        let failures = join_all_workers(&mut workers).await;

        if let Err(e) = self.telemetry.print() {
            warn!(target: "testvisor.run", error = %e, "printing report failed");
        }

        let mut failures = failures.into_iter();
        match failures.next() {
            None => {
                self.announce(&format!("Tests PASSED. Time taken: {}", human(started.elapsed())));
                Ok(RunReport::Tested { workers: n, dispatch })
            }
            Some(first) => {
                let failed = 1 + failures.count();
                self.announce(&format!("Got error: {first}."));
                self.announce("Tests FAILED.");
                Err(RunError::Workers {
                    failed,
                    first,
                    dispatch,
                })
            }
        }
    }

    fn worker_context(&self, closer: Arc<Closer>) -> WorkerContext {
        WorkerContext {
            closer,
            telemetry: Arc::clone(&self.telemetry),
            namespaces: Arc::clone(&self.namespaces),
            clusters: self.clusters.clone(),
            executor: Arc::clone(&self.executor),
            http: self.http.clone(),
            settings: WorkerSettings {
                keep: self.cfg.keep,
                custom_only: self.cfg.custom_only,
                shared_descriptor: self.cfg.shared_descriptor_path(),
                probe: self.cfg.probe.clone(),
            },
        }
    }

    fn announce(&self, line: &str) {
        if let Err(e) = self.telemetry.announce(line) {
            warn!(target: "testvisor.run", error = %e, "writing verdict failed");
        }
    }
}

/// Calls [`Closer::done`] when dropped, including on panic.
struct DoneGuard(Arc<Closer>);

impl Drop for DoneGuard {
    fn drop(&mut self) {
        self.0.done();
    }
}

/// Aborts the interrupt watcher when the run returns.
struct Watcher(JoinHandle<u32>);

impl Drop for Watcher {
    fn drop(&mut self) {
        self.0.abort();
    }
}

fn interrupted(stage: &'static str) -> RunError {
    warn!(target: "testvisor.run", stage, "interrupted");
    RunError::Interrupted { stage }
}

async fn join_all_workers(workers: &mut JoinSet<Result<(), WorkerError>>) -> Vec<WorkerError> {
    let mut failures = Vec::new();
    while let Some(joined) = workers.join_next().await {
        match joined {
            Ok(Ok(())) => {}
            Ok(Err(e)) => failures.push(e),
            Err(e) => failures.push(WorkerError::Aborted { reason: e.to_string() }),
        }
    }
    failures
}
