//! # Cluster lifecycle.
//!
//! - [`ControlPlane`] the runtime seam, with [`Compose`] as the CLI adapter;
//! - [`ClusterManager`] start / stop / resolve / clear on top of it;
//! - [`Instance`] a named service inside one namespace;
//! - [`LoginProbe`] / [`HealthProbe`] readiness checks run via
//!   [`retry_probe`](crate::policies::retry_probe).

mod compose;
mod control;
mod instance;
mod manager;
mod probe;

pub use compose::{Compose, PREFIX_ENV, parse_ports, parse_ps};
pub use control::{Container, ControlPlane, Network, PortMapping};
pub use instance::Instance;
pub use manager::{CLEAR_STOP_TIMEOUT, ClearSummary, ClusterManager, DEFAULT_SETTLE};
pub use probe::{HealthProbe, LoginProbe, http_client};
