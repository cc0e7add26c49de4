//! # Cluster lifecycle manager.
//!
//! Start, stop, and look up clusters through an injected [`ControlPlane`].
//!
//! ```text
//! start_cluster ── up(subset) ──► sleep(settle) ──► Ok
//!                     └─ Err ──► ClusterError::Start (fatal for the run)
//!
//! stop_cluster ──► tracker.spawn(down) ──► "CLUSTER DOWN: <prefix>" | warn, swallowed
//! ```
//!
//! ## Rules
//! - stops are fire-and-forget; completion is only observable by waiting on the
//!   [`TaskTracker`] they were spawned on;
//! - lookups hit the control plane every time; query failures resolve to `None`.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tokio_util::task::TaskTracker;
use tracing::{info, warn};

use super::control::{Container, ControlPlane};
use super::instance::Instance;
use crate::error::ClusterError;

/// Stabilization pause after every `up`.
pub const DEFAULT_SETTLE: Duration = Duration::from_secs(3);
/// Grace given to each container by [`ClusterManager::clear`].
pub const CLEAR_STOP_TIMEOUT: Duration = Duration::from_secs(10);

/// Outcome of [`ClusterManager::clear`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ClearSummary {
    pub containers_removed: usize,
    pub containers_failed: usize,
    pub networks_removed: usize,
    pub networks_failed: usize,
}

/// Handle over the control plane; cheap to clone.
#[derive(Clone)]
pub struct ClusterManager {
    plane: Arc<dyn ControlPlane>,
    settle: Duration,
}

impl ClusterManager {
    pub fn new(plane: Arc<dyn ControlPlane>) -> Self {
        Self {
            plane,
            settle: DEFAULT_SETTLE,
        }
    }

    pub fn with_settle(mut self, settle: Duration) -> Self {
        self.settle = settle;
        self
    }

    /// Brings up `services` (all when empty) and waits for the cluster to settle.
    pub async fn start_cluster(
        &self,
        descriptor: &Path,
        prefix: &str,
        services: &[String],
    ) -> Result<(), ClusterError> {
        info!(
            target: "testvisor.cluster",
            prefix,
            descriptor = %descriptor.display(),
            services = ?services,
            "starting cluster"
        );
        self.plane
            .up(descriptor, prefix, services)
            .await
            .map_err(|e| ClusterError::Start {
                descriptor: descriptor.to_path_buf(),
                prefix: prefix.to_string(),
                source: Box::new(e),
            })?;

        tokio::time::sleep(self.settle).await;
        Ok(())
    }

    /// Spawns the teardown of `prefix` onto `tracker` and returns immediately.
    pub fn stop_cluster(&self, descriptor: &Path, prefix: &str, tracker: &TaskTracker) {
        let plane = Arc::clone(&self.plane);
        let descriptor: PathBuf = descriptor.to_path_buf();
        let prefix = prefix.to_string();

        tracker.spawn(async move {
            match plane.down(&descriptor, &prefix).await {
                Ok(()) => info!(target: "testvisor.cluster", prefix = %prefix, "CLUSTER DOWN: {prefix}"),
                Err(e) => warn!(
                    target: "testvisor.cluster",
                    prefix = %prefix,
                    error = %e,
                    "error while bringing down cluster"
                ),
            }
        });
    }

    /// The container backing `instance`, if it exists right now.
    pub async fn resolve_instance(&self, instance: &Instance) -> Option<Container> {
        match self.plane.containers(&instance.prefix).await {
            Ok(all) => all.into_iter().find(|c| instance.matches(c)),
            Err(e) => {
                warn!(target: "testvisor.cluster", instance = %instance, error = %e, "listing containers failed");
                None
            }
        }
    }

    /// Host port published for `private` on `instance`.
    pub async fn resolve_port(&self, instance: &Instance, private: u16) -> Option<u16> {
        self.resolve_instance(instance).await?.public_port(private)
    }

    /// Runs a stage setup command against a started cluster.
    pub async fn run_setup(
        &self,
        descriptor: &Path,
        prefix: &str,
        command: &[String],
    ) -> Result<(), ClusterError> {
        info!(target: "testvisor.cluster", prefix, command = ?command, "running setup");
        self.plane.setup(descriptor, prefix, command).await
    }

    /// Stops and removes every container and network whose name starts with `root`.
    ///
    /// Containers are handled concurrently; every failure is logged and counted.
    pub async fn clear(&self, root: &str) -> ClearSummary {
        let mut summary = ClearSummary::default();

        match self.plane.containers(root).await {
            Ok(containers) => {
                let removals = containers.iter().map(|c| self.remove(c));
                for ok in join_all(removals).await {
                    if ok {
                        summary.containers_removed += 1;
                    } else {
                        summary.containers_failed += 1;
                    }
                }
            }
            Err(e) => warn!(target: "testvisor.cluster", error = %e, "listing containers failed"),
        }

        match self.plane.networks(root).await {
            Ok(networks) => {
                for n in networks {
                    match self.plane.remove_network(&n.id).await {
                        Ok(()) => {
                            info!(target: "testvisor.cluster", network = %n.name, "removed network");
                            summary.networks_removed += 1;
                        }
                        Err(e) => {
                            warn!(target: "testvisor.cluster", network = %n.name, error = %e, "removing network failed");
                            summary.networks_failed += 1;
                        }
                    }
                }
            }
            Err(e) => warn!(target: "testvisor.cluster", error = %e, "listing networks failed"),
        }

        summary
    }

    async fn remove(&self, c: &Container) -> bool {
        let name = c.names.first().map(String::as_str).unwrap_or(c.id.as_str());

        let stopped = self.plane.stop_container(&c.id, CLEAR_STOP_TIMEOUT).await;
        match &stopped {
            Ok(()) => info!(target: "testvisor.cluster", container = name, "stopped container"),
            Err(e) => warn!(target: "testvisor.cluster", container = name, error = %e, "stopping container failed"),
        }

        let removed = self.plane.remove_container(&c.id).await;
        match &removed {
            Ok(()) => info!(target: "testvisor.cluster", container = name, "removed container"),
            Err(e) => warn!(target: "testvisor.cluster", container = name, error = %e, "removing container failed"),
        }

        removed.is_ok()
    }
}
