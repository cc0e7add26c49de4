//! # Run configuration.
//!
//! [`Cli`] is the command-line surface (`clap` derive); [`Cli::into_config`]
//! validates it into a plain [`Config`] the orchestrator consumes.
//!
//! ## Sentinel values
//! - `count = 0` → no `-count` override (see [`Config::iterations`])
//! - `pkg` / `test` empty → filter unset
//!
//! Setting either filter forces a single worker (see [`Config::worker_count`]).

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use time::UtcOffset;

use crate::cluster::DEFAULT_SETTLE;
use crate::error::ConfigError;
use crate::logger::{LoggerConfig, LoggerFormat};
use crate::policies::RetryPolicy;
use crate::tasks::Filters;

/// Runs package tests in parallel, each worker owning its own cluster.
#[derive(Debug, Clone, Parser)]
#[command(name = "testvisor", version, about, long_about = None)]
pub struct Cli {
    /// Base directory of the source tree.
    #[arg(long, default_value = "../")]
    pub base: PathBuf,

    /// Only run packages whose path ends with this.
    #[arg(short = 'p', long)]
    pub pkg: Option<String>,

    /// Only run this test (and the packages mentioning it).
    #[arg(short = 't', long)]
    pub test: Option<String>,

    /// Only run packages that bring their own cluster.
    #[arg(short = 'o', long = "custom-only")]
    pub custom_only: bool,

    /// Number of times each test runs (0 keeps the test tool's default).
    #[arg(short = 'c', long, default_value_t = 0)]
    pub count: u32,

    /// Number of parallel workers.
    #[arg(short = 'j', long, default_value_t = 3)]
    pub concurrency: usize,

    /// Leave clusters running after the tests.
    #[arg(short = 'k', long)]
    pub keep: bool,

    /// Remove every leftover test container and network, then exit.
    #[arg(short = 'r', long)]
    pub clear: bool,

    /// Sleep instead of running the test command; also skips the build step.
    #[arg(long)]
    pub dry: bool,

    /// Do not run the build step before testing.
    #[arg(long)]
    pub skip_build: bool,

    /// Log filter directive.
    #[arg(long, env = "TESTVISOR_LOG", default_value = "info")]
    pub log_level: String,

    /// Log format (text or json).
    #[arg(long, default_value = "text")]
    pub log_format: LoggerFormat,

    /// Set by TeamCity; switches the test tool to json output.
    #[arg(long, env = "TEAMCITY_VERSION", hide = true)]
    pub teamcity: Option<String>,
}

impl Cli {
    pub fn into_config(self) -> Result<Config, ConfigError> {
        let filters = Filters {
            pkg: self.pkg.filter(|s| !s.is_empty()),
            test: self.test.filter(|s| !s.is_empty()),
        };
        if let (Some(pkg), Some(test)) = (&filters.pkg, &filters.test) {
            return Err(ConfigError::ConflictingFilters {
                pkg: pkg.clone(),
                test: test.clone(),
            });
        }
        if self.concurrency == 0 {
            return Err(ConfigError::ZeroConcurrency);
        }

        Ok(Config {
            base: self.base,
            filters,
            custom_only: self.custom_only,
            count: self.count,
            concurrency: self.concurrency,
            keep: self.keep,
            clear: self.clear,
            dry: self.dry,
            skip_build: self.skip_build,
            json_output: self.teamcity.is_some_and(|v| !v.is_empty()),
            logger: LoggerConfig {
                format: self.log_format,
                level: self.log_level,
                ..LoggerConfig::default()
            },
            ..Config::default()
        })
    }
}

/// Readiness probe settings.
#[derive(Clone, Debug, PartialEq)]
pub struct ProbeConfig {
    /// Service whose HTTP port is probed.
    pub instance: String,
    pub login_port: u16,
    pub health_port: u16,
    pub user: String,
    pub password: String,
    /// Failure is fatal for the worker.
    pub login: RetryPolicy,
    /// Failure is only a warning.
    pub health: RetryPolicy,
    /// Per-request timeout.
    pub request_timeout: Duration,
}

impl Default for ProbeConfig {
    /// `alpha1:8080`, `groot`/`password`, 30 × 1s for both probes, 10s per request.
    fn default() -> Self {
        Self {
            instance: "alpha1".into(),
            login_port: 8080,
            health_port: 8080,
            user: "groot".into(),
            password: "password".into(),
            login: RetryPolicy::default(),
            health: RetryPolicy::default(),
            request_timeout: Duration::from_secs(10),
        }
    }
}

/// Everything a run needs to know.
///
/// All fields are public; use the accessors instead of re-deriving sentinels.
#[derive(Clone, Debug)]
pub struct Config {
    pub base: PathBuf,
    pub filters: Filters,
    pub custom_only: bool,
    /// `0` = no override.
    pub count: u32,
    /// Requested workers; see [`Config::worker_count`].
    pub concurrency: usize,
    /// Never stop clusters.
    pub keep: bool,
    /// Clear leftovers instead of running.
    pub clear: bool,
    pub dry: bool,
    pub skip_build: bool,
    /// Pass `-json` to the test tool.
    pub json_output: bool,
    pub build_command: Vec<String>,
    /// Shared cluster descriptor, relative to `base`.
    pub shared_descriptor: PathBuf,
    /// Pause after every cluster start.
    pub settle: Duration,
    pub probe: ProbeConfig,
    pub logger: LoggerConfig,
    /// Offset the timeline clock is shown in; UTC unless the binary captured
    /// the local one at startup.
    pub local_offset: UtcOffset,
}

impl Config {
    /// Uses `offset` for both log timestamps and the timeline clock.
    pub fn with_local_offset(mut self, offset: UtcOffset) -> Self {
        self.local_offset = offset;
        self.logger.offset = offset;
        self
    }

    /// Workers to spawn: one when filtering, `concurrency` otherwise.
    pub fn worker_count(&self) -> usize {
        if self.filters.is_set() {
            1
        } else {
            self.concurrency
        }
    }

    /// `-count` override, if any.
    pub fn iterations(&self) -> Option<u32> {
        (self.count > 0).then_some(self.count)
    }

    pub fn shared_descriptor_path(&self) -> PathBuf {
        self.base.join(&self.shared_descriptor)
    }

    /// Whether the build step runs before dispatch.
    pub fn should_build(&self) -> bool {
        !self.skip_build && !self.dry && !self.build_command.is_empty()
    }
}

impl Default for Config {
    /// - `base = ../`, no filters, `concurrency = 3`, `count = 0`
    /// - `build_command = make install`
    /// - `shared_descriptor = dgraph/docker-compose.yml`
    /// - `settle = 3s`
    fn default() -> Self {
        Self {
            base: PathBuf::from("../"),
            filters: Filters::default(),
            custom_only: false,
            count: 0,
            concurrency: 3,
            keep: false,
            clear: false,
            dry: false,
            skip_build: false,
            json_output: false,
            build_command: vec!["make".into(), "install".into()],
            shared_descriptor: PathBuf::from("dgraph/docker-compose.yml"),
            settle: DEFAULT_SETTLE,
            probe: ProbeConfig::default(),
            logger: LoggerConfig::default(),
            local_offset: UtcOffset::UTC,
        }
    }
}
