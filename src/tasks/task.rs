//! # Work items handed to the worker pool.
//!
//! A [`Task`] is produced once by planning and consumed exactly once by one
//! worker. Its [`TaskKind`] is decided at discovery time so workers never
//! re-inspect the filesystem.
//!
//! ```text
//! TaskKind::NoContent     ─► skipped, no side effects
//! TaskKind::Common        ─► worker's shared cluster (lazy, reused)
//! TaskKind::CustomCluster ─► dedicated cluster from `descriptor`
//! TaskKind::SpecialCased  ─► dedicated cluster started stage by stage
//! ```

use std::path::{Path, PathBuf};

use serde::Deserialize;

/// Id fragments of packages known to run long; they are dispatched first.
pub const SLOW_KEYWORDS: [&str; 4] = ["systest", "ee/acl", "cmd/alpha", "worker"];

/// One step of a staged cluster start.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Stage {
    /// Services to bring up in this step (empty = all).
    #[serde(default)]
    pub services: Vec<String>,
    /// Command run after the services are up, with the namespace exported.
    #[serde(default)]
    pub setup: Option<Vec<String>>,
}

/// How a task gets its cluster.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TaskKind {
    /// Runs against the worker's shared cluster.
    Common,
    /// Brings up its own cluster from a descriptor next to the package.
    CustomCluster { descriptor: PathBuf },
    /// Nothing to test; dropped by the worker before any side effect.
    NoContent,
    /// Own cluster, started in stages with setup commands in between.
    SpecialCased {
        descriptor: PathBuf,
        stages: Vec<Stage>,
    },
}

/// A package to test.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Task {
    /// Path of the package relative to the base directory.
    pub id: String,
    pub kind: TaskKind,
    pub slow: bool,
}

impl Task {
    pub fn new(id: impl Into<String>, kind: TaskKind) -> Self {
        let id = id.into();
        let slow = is_slow(&id);
        Self { id, kind, slow }
    }

    pub fn is_common(&self) -> bool {
        self.kind == TaskKind::Common
    }

    /// Descriptor of the dedicated cluster, if the task has one.
    pub fn descriptor(&self) -> Option<&Path> {
        match &self.kind {
            TaskKind::CustomCluster { descriptor } | TaskKind::SpecialCased { descriptor, .. } => {
                Some(descriptor)
            }
            TaskKind::Common | TaskKind::NoContent => None,
        }
    }
}

/// True when `id` contains any of [`SLOW_KEYWORDS`].
pub fn is_slow(id: &str) -> bool {
    SLOW_KEYWORDS.iter().any(|k| id.contains(k))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slow_is_derived_from_id() {
        assert!(Task::new("systest/bulk", TaskKind::Common).slow);
        assert!(Task::new("dgraph/cmd/alpha/http", TaskKind::Common).slow);
        assert!(Task::new("ee/acl", TaskKind::Common).slow);
        assert!(!Task::new("query", TaskKind::Common).slow);
    }

    #[test]
    fn test_descriptor_only_for_dedicated_clusters() {
        let d = PathBuf::from("systest/acl/docker-compose.yml");
        let custom = Task::new("systest/acl", TaskKind::CustomCluster { descriptor: d.clone() });
        assert_eq!(custom.descriptor(), Some(d.as_path()));
        assert!(!custom.is_common());

        let common = Task::new("query", TaskKind::Common);
        assert!(common.is_common());
        assert_eq!(common.descriptor(), None);
    }
}
