//! # Planning: candidates → ordered task list.
//!
//! ```text
//! Discover::candidates ─► filter (pkg suffix | test mention) ─► Candidate::into_task
//!                                                              └─► slow_first (stable)
//! ```
//!
//! Both filters at once, or nothing left after filtering, is a [`ConfigError`].

use std::path::Path;

use tracing::info;

use super::discover::Discover;
use super::task::Task;
use crate::error::ConfigError;

/// Optional narrowing of the run to one package or one test.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Filters {
    /// Keep packages whose id ends with this.
    pub pkg: Option<String>,
    /// Keep packages whose test files mention this test name.
    pub test: Option<String>,
}

impl Filters {
    pub fn is_set(&self) -> bool {
        self.pkg.is_some() || self.test.is_some()
    }
}

/// Builds the ordered task list.
pub fn plan(source: &dyn Discover, filters: &Filters, base: &Path) -> Result<Vec<Task>, ConfigError> {
    if let (Some(pkg), Some(test)) = (&filters.pkg, &filters.test) {
        return Err(ConfigError::ConflictingFilters {
            pkg: pkg.clone(),
            test: test.clone(),
        });
    }

    let limit_to = match &filters.test {
        Some(test) => Some(source.mentioning(test)?),
        None => None,
    };

    let mut tasks = Vec::new();
    for candidate in source.candidates()? {
        if let Some(pkg) = &filters.pkg {
            if !candidate.id.ends_with(pkg.as_str()) {
                continue;
            }
        }
        if let Some(ids) = &limit_to {
            if !ids.iter().any(|id| *id == candidate.id) {
                continue;
            }
            info!(target: "testvisor.plan", test = filters.test.as_deref(), id = %candidate.id, "found package for test");
        }
        tasks.push(candidate.into_task());
    }

    if tasks.is_empty() {
        return Err(ConfigError::NoTasks { base: base.to_path_buf() });
    }

    let tasks = slow_first(tasks);
    for task in &tasks {
        info!(target: "testvisor.plan", id = %task.id, common = task.is_common(), "found valid task");
    }
    info!(target: "testvisor.plan", count = tasks.len(), "Running tests for {} packages.", tasks.len());
    Ok(tasks)
}

/// Moves slow tasks to the front, keeping relative order on both sides.
pub fn slow_first(tasks: Vec<Task>) -> Vec<Task> {
    let (mut slow, fast): (Vec<Task>, Vec<Task>) = tasks.into_iter().partition(|t| t.slow);
    slow.extend(fast);
    slow
}
