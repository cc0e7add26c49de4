//! In-memory collaborators for end-to-end runs of the orchestrator.
#![allow(dead_code)]

use std::collections::BTreeSet;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::json;
use tokio::sync::mpsc;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use testvisor::{
    Candidate, ClusterError, Config, ConfigError, Container, ControlPlane, Discover, ExecError,
    Executor, InterruptSource, Namespaces, Network, Orchestrator, PortMapping, RetryPolicy, Task,
    Telemetry, Terminate,
};

pub const SHARED: &str = "dgraph/docker-compose.yml";

/// A config with no build step, no settle pause and fast readiness retries.
pub fn config(workers: usize) -> Config {
    let mut cfg = Config::default();
    cfg.base = PathBuf::from("/src");
    cfg.concurrency = workers;
    cfg.skip_build = true;
    cfg.settle = Duration::ZERO;
    cfg.probe.login = RetryPolicy::fixed(5, Duration::from_millis(5));
    cfg.probe.health = RetryPolicy::fixed(30, Duration::from_millis(1));
    cfg.probe.request_timeout = Duration::from_secs(2);
    cfg
}

pub fn orchestrator(
    cfg: Config,
    discovery: FixedDiscovery,
    plane: Arc<FakePlane>,
    executor: Arc<FakeExecutor>,
) -> Orchestrator {
    Orchestrator::builder(cfg)
        .with_discovery(Arc::new(discovery))
        .with_control_plane(plane)
        .with_executor(executor)
        .with_telemetry(Arc::new(Telemetry::with_console(Box::new(io::sink()))))
        .with_namespaces(Arc::new(Namespaces::with_salt(7)))
        .build()
        .expect("orchestrator builds")
}

// ---- Discovery ----

pub struct FixedDiscovery(pub Vec<Candidate>);

impl FixedDiscovery {
    /// Packages that run against the shared cluster.
    pub fn common(ids: &[&str]) -> Self {
        Self(ids.iter().map(|id| common(id)).collect())
    }
}

pub fn common(id: &str) -> Candidate {
    Candidate {
        id: id.to_string(),
        descriptor: None,
        stages: None,
        has_tests: true,
    }
}

impl Discover for FixedDiscovery {
    fn candidates(&self) -> Result<Vec<Candidate>, ConfigError> {
        Ok(self.0.clone())
    }

    fn mentioning(&self, _test: &str) -> Result<Vec<String>, ConfigError> {
        Ok(self.0.iter().map(|c| c.id.clone()).collect())
    }
}

// ---- Control plane ----

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Up {
    pub descriptor: PathBuf,
    pub prefix: String,
    pub services: Vec<String>,
}

/// Records lifecycle calls; every live project exposes `alpha1` with 8080
/// published on `http_port`.
#[derive(Default)]
pub struct FakePlane {
    pub http_port: Option<u16>,
    pub fail_up: bool,
    /// Listing containers never returns.
    pub hang_listing: bool,
    pub ups: Mutex<Vec<Up>>,
    pub downs: Mutex<Vec<String>>,
    pub setups: Mutex<Vec<(String, Vec<String>)>>,
    live: Mutex<BTreeSet<String>>,
}

impl FakePlane {
    pub fn serving(http_port: u16) -> Arc<Self> {
        Arc::new(Self {
            http_port: Some(http_port),
            ..Self::default()
        })
    }

    /// Containers publish no ports.
    pub fn unreachable() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Every `up` fails after being recorded.
    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            fail_up: true,
            ..Self::default()
        })
    }

    /// Listing containers blocks forever.
    pub fn hanging() -> Arc<Self> {
        Arc::new(Self {
            hang_listing: true,
            ..Self::default()
        })
    }

    pub fn up_prefixes(&self) -> BTreeSet<String> {
        self.ups.lock().iter().map(|u| u.prefix.clone()).collect()
    }

    pub fn downs_of(&self, prefix: &str) -> usize {
        self.downs.lock().iter().filter(|p| *p == prefix).count()
    }
}

#[async_trait]
impl ControlPlane for FakePlane {
    async fn up(&self, descriptor: &Path, prefix: &str, services: &[String]) -> Result<(), ClusterError> {
        self.ups.lock().push(Up {
            descriptor: descriptor.to_path_buf(),
            prefix: prefix.to_string(),
            services: services.to_vec(),
        });
        if self.fail_up {
            return Err(ClusterError::Command {
                command: "up".into(),
                reason: "no such image".into(),
            });
        }
        self.live.lock().insert(prefix.to_string());
        Ok(())
    }

    async fn down(&self, _descriptor: &Path, prefix: &str) -> Result<(), ClusterError> {
        self.downs.lock().push(prefix.to_string());
        self.live.lock().remove(prefix);
        Ok(())
    }

    async fn containers(&self, prefix: &str) -> Result<Vec<Container>, ClusterError> {
        if self.hang_listing {
            std::future::pending::<()>().await;
        }
        Ok(self
            .live
            .lock()
            .iter()
            .filter(|p| p.starts_with(prefix))
            .map(|p| Container {
                id: format!("id-{p}"),
                names: vec![format!("{p}_alpha1_1")],
                ports: self
                    .http_port
                    .map(|public| PortMapping { private: 8080, public })
                    .into_iter()
                    .collect(),
            })
            .collect())
    }

    async fn stop_container(&self, _id: &str, _timeout: Duration) -> Result<(), ClusterError> {
        Ok(())
    }

    async fn remove_container(&self, _id: &str) -> Result<(), ClusterError> {
        Ok(())
    }

    async fn networks(&self, _prefix: &str) -> Result<Vec<Network>, ClusterError> {
        Ok(Vec::new())
    }

    async fn remove_network(&self, _id: &str) -> Result<(), ClusterError> {
        Ok(())
    }

    async fn setup(&self, _descriptor: &Path, prefix: &str, command: &[String]) -> Result<(), ClusterError> {
        self.setups.lock().push((prefix.to_string(), command.to_vec()));
        Ok(())
    }
}

// ---- Executor ----

type Hook = Box<dyn Fn(&Task) -> Result<(), ExecError> + Send + Sync>;

/// Records `(task, prefix)` per run, sleeps `delay`, then defers to `hook`.
pub struct FakeExecutor {
    pub runs: Mutex<Vec<(String, String)>>,
    delay: Duration,
    hook: Hook,
}

impl FakeExecutor {
    pub fn passing(delay: Duration) -> Arc<Self> {
        Self::with_hook(delay, |_| Ok(()))
    }

    pub fn with_hook(
        delay: Duration,
        hook: impl Fn(&Task) -> Result<(), ExecError> + Send + Sync + 'static,
    ) -> Arc<Self> {
        Arc::new(Self {
            runs: Mutex::new(Vec::new()),
            delay,
            hook: Box::new(hook),
        })
    }

    pub fn ran(&self) -> Vec<String> {
        self.runs.lock().iter().map(|(id, _)| id.clone()).collect()
    }

    pub fn prefixes(&self) -> BTreeSet<String> {
        self.runs.lock().iter().map(|(_, p)| p.clone()).collect()
    }
}

#[async_trait]
impl Executor for FakeExecutor {
    async fn run(&self, task: &Task, prefix: &str, telemetry: &Telemetry) -> Result<(), ExecError> {
        self.runs.lock().push((task.id.clone(), prefix.to_string()));
        (self.hook)(task)?;
        tokio::time::sleep(self.delay).await;
        telemetry.write(format!("ok  \t{}\n", task.id).as_bytes())?;
        Ok(())
    }
}

// ---- Interrupts ----

pub struct Scripted(pub mpsc::UnboundedReceiver<()>);

#[async_trait]
impl InterruptSource for Scripted {
    async fn next(&mut self) -> Option<()> {
        self.0.recv().await
    }
}

/// A source that stays quiet for as long as the returned sender lives.
pub fn interrupts() -> (mpsc::UnboundedSender<()>, Scripted) {
    let (tx, rx) = mpsc::unbounded_channel();
    (tx, Scripted(rx))
}

#[derive(Clone, Default)]
pub struct CountTerminate(pub Arc<AtomicU32>);

impl CountTerminate {
    pub fn count(&self) -> u32 {
        self.0.load(Ordering::SeqCst)
    }
}

impl Terminate for CountTerminate {
    fn terminate(&self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}

// ---- HTTP ----

/// Answers `POST /login` with `200 {}` and `GET /health` with `health_status`.
pub struct HttpStub {
    pub port: u16,
    server: MockServer,
}

impl HttpStub {
    pub async fn spawn(health_status: u16) -> Self {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/login"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/health"))
            .respond_with(ResponseTemplate::new(health_status).set_body_json(json!({})))
            .mount(&server)
            .await;
        Self {
            port: server.address().port(),
            server,
        }
    }

    pub async fn hits(&self, route: &str) -> usize {
        self.server
            .received_requests()
            .await
            .unwrap_or_default()
            .iter()
            .filter(|r| r.url.path() == route)
            .count()
    }
}
