//! # Container control plane seam.
//!
//! Everything the lifecycle manager needs from the container runtime goes
//! through [`ControlPlane`]. The shipped adapter is
//! [`Compose`](super::Compose); tests substitute in-memory fakes.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::ClusterError;

/// A published port of a container.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PortMapping {
    pub private: u16,
    pub public: u16,
}

/// A container as listed by the control plane.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Container {
    pub id: String,
    /// Names without a leading `/`.
    pub names: Vec<String>,
    pub ports: Vec<PortMapping>,
}

impl Container {
    pub fn public_port(&self, private: u16) -> Option<u16> {
        self.ports.iter().find(|p| p.private == private).map(|p| p.public)
    }
}

/// A container network.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Network {
    pub id: String,
    pub name: String,
}

/// Operations on the container runtime.
///
/// `prefix` arguments select resources whose name starts with it.
#[async_trait]
pub trait ControlPlane: Send + Sync + 'static {
    /// Brings up `services` (all when empty) of `descriptor` under project `prefix`.
    async fn up(&self, descriptor: &Path, prefix: &str, services: &[String]) -> Result<(), ClusterError>;

    /// Tears down project `prefix` of `descriptor`.
    async fn down(&self, descriptor: &Path, prefix: &str) -> Result<(), ClusterError>;

    async fn containers(&self, prefix: &str) -> Result<Vec<Container>, ClusterError>;

    async fn stop_container(&self, id: &str, timeout: Duration) -> Result<(), ClusterError>;

    async fn remove_container(&self, id: &str) -> Result<(), ClusterError>;

    async fn networks(&self, prefix: &str) -> Result<Vec<Network>, ClusterError>;

    async fn remove_network(&self, id: &str) -> Result<(), ClusterError>;

    /// Runs a setup `command` against project `prefix` of `descriptor`.
    async fn setup(&self, descriptor: &Path, prefix: &str, command: &[String]) -> Result<(), ClusterError>;
}
