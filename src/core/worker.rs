//! # Worker: one lane of the pool.
//!
//! A worker pulls tasks from the hand-off until it is closed or cancellation
//! is observed, provisioning whatever cluster each task needs.
//!
//! ## Per task
//! ```text
//! NoContent      ─► skip
//! Common         ─► (custom_only? skip) ─► ensure_shared ─► execute
//!                     first time only: start(all) ─► login (fatal)
//! CustomCluster  ─► start(all) ─► health (advisory) ─► execute ─► stop
//! SpecialCased   ─► for stage: start(subset) ─► setup ─► login (fatal) ─► execute ─► stop
//! ```
//!
//! ## States
//! ```text
//! Idle ─► Preparing(task) ─► Executing ─► Idle
//! Idle ─► Draining ─► Stopping (owns shared) ─► Done
//! Preparing | Executing ── error ──► Failed ─► Draining
//! ```
//!
//! ## Rules
//! - the shared cluster is started at most once per worker and never torn down
//!   between tasks;
//! - ownership of a cluster is recorded before it is started, so a failed start
//!   still gets a stop (unless `keep`);
//! - every stop is spawned on the worker's tracker, and [`Worker::finish`] waits
//!   for all of them;
//! - the first error ends the loop and is returned; the worker never broadcasts
//!   cancellation itself, whoever drives it decides what the error means;
//! - cancellation reaches an idle worker as a closed hand-off.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::time::Instant;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

use crate::closer::Closer;
use crate::cluster::{ClusterManager, HealthProbe, Instance, LoginProbe};
use crate::config::ProbeConfig;
use crate::error::WorkerError;
use crate::exec::Executor;
use crate::namespace::Namespaces;
use crate::policies::retry_probe;
use crate::tasks::{Stage, Task, TaskKind, TaskReceiver};
use crate::telemetry::{Telemetry, human};

/// Worker knobs taken from the run configuration.
#[derive(Clone, Debug)]
pub struct WorkerSettings {
    pub keep: bool,
    pub custom_only: bool,
    /// Absolute path of the shared cluster descriptor.
    pub shared_descriptor: PathBuf,
    pub probe: ProbeConfig,
}

/// Collaborators shared by every worker of a run.
pub struct WorkerContext {
    pub closer: Arc<Closer>,
    pub telemetry: Arc<Telemetry>,
    pub namespaces: Arc<Namespaces>,
    pub clusters: ClusterManager,
    pub executor: Arc<dyn Executor>,
    pub http: reqwest::Client,
    pub settings: WorkerSettings,
}

pub struct Worker {
    id: u32,
    ctx: Arc<WorkerContext>,
    tasks: TaskReceiver,
    stops: TaskTracker,
    shared: Option<String>,
    started: Instant,
}

impl Worker {
    pub fn new(ctx: Arc<WorkerContext>, tasks: TaskReceiver) -> Self {
        let id = ctx.namespaces.next_worker_id();
        Self {
            id,
            ctx,
            tasks,
            stops: TaskTracker::new(),
            shared: None,
            started: Instant::now(),
        }
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    /// [`Worker::work`] followed by [`Worker::finish`].
    pub async fn run(mut self) -> Result<(), WorkerError> {
        let result = self.work().await;
        self.finish().await;
        result
    }

    /// Takes tasks until the hand-off closes, cancellation is seen between
    /// tasks, or the first error.
    pub async fn work(&mut self) -> Result<(), WorkerError> {
        let result = self.drive().await;
        if let Err(e) = &result {
            error!(target: "testvisor.worker", worker = self.id, label = e.as_label(), error = %e, "worker failed");
        }
        result
    }

    /// Stops the shared cluster, waits for every stop, records `DONE`.
    pub async fn finish(mut self) {
        debug!(target: "testvisor.worker", worker = self.id, "draining");
        self.shutdown().await;
        self.ctx.telemetry.took(self.id, "DONE", self.started.elapsed());
    }

    async fn drive(&mut self) -> Result<(), WorkerError> {
        loop {
            if self.ctx.closer.is_cancelled() {
                return Ok(());
            }
            // Awaited to completion; the dispatcher closes the hand-off on cancellation.
            let Some(task) = self.tasks.recv().await else {
                return Ok(());
            };
            debug!(target: "testvisor.worker", worker = self.id, task = %task.id, "preparing");
            self.handle(&task).await?;
        }
    }

    async fn handle(&mut self, task: &Task) -> Result<(), WorkerError> {
        match &task.kind {
            TaskKind::NoContent => {
                debug!(target: "testvisor.worker", worker = self.id, task = %task.id, "no test files; skipping");
                Ok(())
            }
            TaskKind::Common if self.ctx.settings.custom_only => {
                debug!(target: "testvisor.worker", worker = self.id, task = %task.id, "custom clusters only; skipping");
                Ok(())
            }
            TaskKind::Common => {
                let prefix = self.ensure_shared().await?;
                self.execute(task, &prefix).await
            }
            TaskKind::CustomCluster { descriptor } => self.run_custom(task, descriptor).await,
            TaskKind::SpecialCased { descriptor, stages } => {
                self.run_staged(task, descriptor, stages).await
            }
        }
    }

    async fn ensure_shared(&mut self) -> Result<String, WorkerError> {
        if let Some(prefix) = &self.shared {
            return Ok(prefix.clone());
        }
        let prefix = self.ctx.namespaces.next_prefix();
        self.shared = Some(prefix.clone());

        info!(target: "testvisor.worker", worker = self.id, prefix = %prefix, "starting shared cluster");
        self.ctx
            .clusters
            .start_cluster(&self.ctx.settings.shared_descriptor, &prefix, &[])
            .await?;
        self.login(&prefix).await?;
        Ok(prefix)
    }

    async fn run_custom(&self, task: &Task, descriptor: &Path) -> Result<(), WorkerError> {
        info!(target: "testvisor.worker", worker = self.id, task = %task.id, "Bringing up cluster for package: {}", task.id);
        let prefix = self.ctx.namespaces.next_prefix();

        let result = match self.ctx.clusters.start_cluster(descriptor, &prefix, &[]).await {
            Ok(()) => {
                self.health(&prefix).await;
                self.execute(task, &prefix).await
            }
            Err(e) => Err(e.into()),
        };

        self.stop(descriptor, &prefix);
        result
    }

    async fn run_staged(
        &self,
        task: &Task,
        descriptor: &Path,
        stages: &[Stage],
    ) -> Result<(), WorkerError> {
        info!(target: "testvisor.worker", worker = self.id, task = %task.id, stages = stages.len(), "Bringing up staged cluster for package: {}", task.id);
        let prefix = self.ctx.namespaces.next_prefix();

        let result = self.provision_stages(descriptor, &prefix, stages).await;
        let result = match result {
            Ok(()) => self.execute(task, &prefix).await,
            Err(e) => Err(e),
        };

        self.stop(descriptor, &prefix);
        result
    }

    async fn provision_stages(
        &self,
        descriptor: &Path,
        prefix: &str,
        stages: &[Stage],
    ) -> Result<(), WorkerError> {
        let all = [Stage::default()];
        let stages = if stages.is_empty() { &all[..] } else { stages };

        for stage in stages {
            self.ctx
                .clusters
                .start_cluster(descriptor, prefix, &stage.services)
                .await?;
            if let Some(command) = &stage.setup {
                self.ctx.clusters.run_setup(descriptor, prefix, command).await?;
            }
        }
        self.login(prefix).await
    }

    async fn login(&self, prefix: &str) -> Result<(), WorkerError> {
        let p = &self.ctx.settings.probe;
        let probe = LoginProbe::new(
            self.ctx.clusters.clone(),
            self.ctx.http.clone(),
            Instance::new(prefix, p.instance.clone()),
            p.login_port,
            p.user.clone(),
            p.password.clone(),
        );
        retry_probe(&probe, &p.login).await.map_err(|e| {
            error!(target: "testvisor.worker", worker = self.id, prefix, error = %e, "unable to login");
            WorkerError::from(e)
        })?;
        Ok(())
    }

    /// Advisory: exhaustion is logged and execution proceeds.
    async fn health(&self, prefix: &str) {
        let p = &self.ctx.settings.probe;
        let instance = Instance::new(prefix, p.instance.clone());
        let Some(port) = self.ctx.clusters.resolve_port(&instance, p.health_port).await else {
            debug!(target: "testvisor.worker", worker = self.id, instance = %instance, "no health port published; skipping health check");
            return;
        };

        let probe = HealthProbe::new(self.ctx.http.clone(), port, prefix);
        if let Err(e) = retry_probe(&probe, &p.health).await {
            warn!(target: "testvisor.worker", worker = self.id, prefix, error = %e, "cluster never reported healthy; running tests anyway");
        }
    }

    async fn execute(&self, task: &Task, prefix: &str) -> Result<(), WorkerError> {
        debug!(target: "testvisor.worker", worker = self.id, task = %task.id, prefix, "executing");
        let started = Instant::now();
        let result = self.ctx.executor.run(task, prefix, &self.ctx.telemetry).await;
        let took = started.elapsed();
        self.ctx.telemetry.took(self.id, task.id.clone(), took);

        match &result {
            Ok(()) => info!(target: "testvisor.worker", worker = self.id, task = %task.id, "Ran tests for package: {} in {}", task.id, human(took)),
            Err(e) => error!(target: "testvisor.worker", worker = self.id, task = %task.id, error = %e, "tests failed"),
        }
        result.map_err(WorkerError::from)
    }

    fn stop(&self, descriptor: &Path, prefix: &str) {
        if self.ctx.settings.keep {
            info!(target: "testvisor.worker", worker = self.id, prefix, "keeping cluster");
            return;
        }
        self.ctx.clusters.stop_cluster(descriptor, prefix, &self.stops);
    }

    async fn shutdown(&mut self) {
        if let Some(prefix) = self.shared.take() {
            debug!(target: "testvisor.worker", worker = self.id, prefix = %prefix, "stopping shared cluster");
            let descriptor = self.ctx.settings.shared_descriptor.clone();
            self.stop(&descriptor, &prefix);
        }
        self.stops.close();
        self.stops.wait().await;
    }
}
