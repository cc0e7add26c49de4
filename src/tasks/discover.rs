//! # Discovery of candidate packages.
//!
//! [`Discover`] is the seam between planning and the source tree. The crate
//! ships one adapter, [`FsDiscovery`], which walks the base directory:
//!
//! - a candidate is a directory holding at least one `.go` file;
//! - its id is the directory path relative to the base (`.` for the base itself);
//! - it has test content when some `_test.go` file lives at or below it;
//! - a `docker-compose.yml` in the directory gives it a dedicated cluster;
//! - a `cluster-stages.toml` next to that descriptor makes the start staged.
//!
//! Hidden directories and `vendor/` are never entered.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::debug;
use walkdir::{DirEntry, WalkDir};

use super::task::{Stage, Task, TaskKind};
use crate::error::ConfigError;

/// File name of the per-package cluster descriptor.
pub const DESCRIPTOR_FILE: &str = "docker-compose.yml";
/// File name of the optional staged-start description.
pub const STAGES_FILE: &str = "cluster-stages.toml";

/// Source of candidate packages.
pub trait Discover: Send + Sync {
    /// All candidates, in a stable order.
    fn candidates(&self) -> Result<Vec<Candidate>, ConfigError>;

    /// Ids of candidates whose test files mention `test`.
    fn mentioning(&self, test: &str) -> Result<Vec<String>, ConfigError>;
}

/// A package found by discovery, before it becomes a [`Task`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Candidate {
    pub id: String,
    pub descriptor: Option<PathBuf>,
    pub stages: Option<Vec<Stage>>,
    pub has_tests: bool,
}

impl Candidate {
    pub fn into_task(self) -> Task {
        let kind = match (self.has_tests, self.descriptor, self.stages) {
            (false, _, _) => TaskKind::NoContent,
            (true, Some(descriptor), Some(stages)) => TaskKind::SpecialCased { descriptor, stages },
            (true, Some(descriptor), None) => TaskKind::CustomCluster { descriptor },
            (true, None, _) => TaskKind::Common,
        };
        Task::new(self.id, kind)
    }
}

#[derive(Deserialize)]
struct StagesFile {
    #[serde(rename = "stage", default)]
    stages: Vec<Stage>,
}

/// Filesystem-backed [`Discover`].
#[derive(Clone, Debug)]
pub struct FsDiscovery {
    base: PathBuf,
}

impl FsDiscovery {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }

    pub fn base(&self) -> &Path {
        &self.base
    }

    fn walk(&self) -> impl Iterator<Item = Result<DirEntry, ConfigError>> + '_ {
        WalkDir::new(&self.base)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| e.depth() == 0 || !skipped(e))
            .map(|e| e.map_err(|error| ConfigError::Discovery { error: error.to_string() }))
    }

    fn id_of(&self, dir: &Path) -> String {
        let rel = dir.strip_prefix(&self.base).unwrap_or(dir);
        let id = rel
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        if id.is_empty() { ".".to_string() } else { id }
    }

    fn stages_for(&self, dir: &Path) -> Result<Option<Vec<Stage>>, ConfigError> {
        let path = dir.join(STAGES_FILE);
        if !path.is_file() {
            return Ok(None);
        }
        let raw = fs::read_to_string(&path).map_err(|e| ConfigError::Discovery {
            error: format!("reading {}: {e}", path.display()),
        })?;
        let file: StagesFile = toml::from_str(&raw).map_err(|e| ConfigError::Discovery {
            error: format!("parsing {}: {e}", path.display()),
        })?;
        Ok(Some(file.stages))
    }
}

impl Discover for FsDiscovery {
    fn candidates(&self) -> Result<Vec<Candidate>, ConfigError> {
        let mut source_dirs = BTreeSet::new();
        let mut test_dirs = BTreeSet::new();

        for entry in self.walk() {
            let entry = entry?;
            if !entry.file_type().is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy();
            if !name.ends_with(".go") {
                continue;
            }
            if let Some(parent) = entry.path().parent() {
                source_dirs.insert(parent.to_path_buf());
                if name.ends_with("_test.go") {
                    test_dirs.insert(parent.to_path_buf());
                }
            }
        }

        let mut out = Vec::with_capacity(source_dirs.len());
        for dir in source_dirs {
            let descriptor = Some(dir.join(DESCRIPTOR_FILE)).filter(|p| p.is_file());
            let stages = match descriptor {
                Some(_) => self.stages_for(&dir)?,
                None => None,
            };
            let has_tests = test_dirs.iter().any(|t| t.starts_with(&dir));
            let candidate = Candidate {
                id: self.id_of(&dir),
                descriptor,
                stages,
                has_tests,
            };
            debug!(target: "testvisor.discover", id = %candidate.id, has_tests, "candidate");
            out.push(candidate);
        }
        Ok(out)
    }

    fn mentioning(&self, test: &str) -> Result<Vec<String>, ConfigError> {
        if test.is_empty() {
            return Ok(Vec::new());
        }
        let mut ids = BTreeSet::new();
        for entry in self.walk() {
            let entry = entry?;
            if !entry.file_type().is_file() || !entry.file_name().to_string_lossy().ends_with("_test.go") {
                continue;
            }
            let body = fs::read(entry.path()).map_err(|e| ConfigError::Discovery {
                error: format!("reading {}: {e}", entry.path().display()),
            })?;
            if body.windows(test.len()).any(|w| w == test.as_bytes()) {
                if let Some(parent) = entry.path().parent() {
                    ids.insert(self.id_of(parent));
                }
            }
        }
        Ok(ids.into_iter().collect())
    }
}

fn skipped(entry: &DirEntry) -> bool {
    let name = entry.file_name().to_string_lossy();
    entry.file_type().is_dir() && (name.starts_with('.') || name == "vendor")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn touch(root: &Path, rel: &str, body: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, body).unwrap();
    }

    fn tree() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        touch(root, "query/query.go", "package query");
        touch(root, "query/query_test.go", "func TestQueryBasic(t *testing.T) {}");
        touch(root, "systest/acl/acl_test.go", "func TestAclLogin(t *testing.T) {}");
        touch(root, "systest/acl/docker-compose.yml", "version: '3'");
        touch(root, "systest/bulk/main.go", "package main");
        touch(root, "systest/bulk/docker-compose.yml", "version: '3'");
        touch(root, "systest/bulk/cluster-stages.toml", "[[stage]]\nservices = [\"zero1\"]\n\n[[stage]]\nsetup = [\"./load.sh\"]\n");
        touch(root, "tools/gen.go", "package tools");
        touch(root, ".git/hooks/x.go", "package hooks");
        touch(root, "vendor/dep/dep_test.go", "func TestQueryBasic() {}");
        dir
    }

    #[test]
    fn test_candidates_are_classified() {
        let dir = tree();
        let disc = FsDiscovery::new(dir.path());
        let tasks: Vec<Task> = disc
            .candidates()
            .unwrap()
            .into_iter()
            .map(Candidate::into_task)
            .collect();

        let ids: Vec<&str> = tasks.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["query", "systest/acl", "systest/bulk", "tools"]);

        assert_eq!(tasks[0].kind, TaskKind::Common);
        assert_eq!(
            tasks[1].kind,
            TaskKind::CustomCluster {
                descriptor: dir.path().join("systest/acl").join(DESCRIPTOR_FILE)
            }
        );
        // bulk has a descriptor and stages but no test files
        assert_eq!(tasks[2].kind, TaskKind::NoContent);
        assert_eq!(tasks[3].kind, TaskKind::NoContent);
    }

    #[test]
    fn test_stages_file_is_parsed() {
        let dir = tree();
        touch(dir.path(), "systest/bulk/bulk_test.go", "func TestBulk() {}");
        let disc = FsDiscovery::new(dir.path());
        let bulk = disc
            .candidates()
            .unwrap()
            .into_iter()
            .find(|c| c.id == "systest/bulk")
            .unwrap();

        assert_eq!(
            bulk.stages,
            Some(vec![
                Stage { services: vec!["zero1".into()], setup: None },
                Stage { services: vec![], setup: Some(vec!["./load.sh".into()]) },
            ])
        );
        assert!(matches!(bulk.into_task().kind, TaskKind::SpecialCased { .. }));
    }

    #[test]
    fn test_broken_stages_file_is_a_config_error() {
        let dir = tree();
        touch(dir.path(), "systest/bulk/cluster-stages.toml", "[[stage]]\nservices = 3\n");
        let err = FsDiscovery::new(dir.path()).candidates().unwrap_err();
        assert_eq!(err.as_label(), "config_discovery");
    }

    #[test]
    fn test_mentioning_finds_test_dirs_outside_vendor() {
        let dir = tree();
        let disc = FsDiscovery::new(dir.path());
        assert_eq!(disc.mentioning("TestQueryBasic").unwrap(), vec!["query"]);
        assert_eq!(disc.mentioning("TestAcl").unwrap(), vec!["systest/acl"]);
        assert!(disc.mentioning("TestNothing").unwrap().is_empty());
        assert!(disc.mentioning("").unwrap().is_empty());
    }
}
