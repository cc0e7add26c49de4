//! # HTTP readiness probes.
//!
//! Both probes resolve the instance's published port on every attempt, since
//! a freshly recreated container may come up on a different host port.
//!
//! - [`LoginProbe`] `POST /login` with credentials; a failure to log in within
//!   the retry budget is fatal for the worker.
//! - [`HealthProbe`] `GET /health`; only advisory.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tracing::info;

use super::instance::Instance;
use super::manager::ClusterManager;
use crate::error::ConfigError;
use crate::policies::Probe;

/// Builds the client shared by all probes of a run.
pub fn http_client(timeout: Duration) -> Result<reqwest::Client, ConfigError> {
    reqwest::Client::builder()
        .timeout(timeout)
        .no_proxy()
        .build()
        .map_err(|e| ConfigError::HttpClient { error: e.to_string() })
}

/// Logs into an instance over HTTP.
pub struct LoginProbe {
    manager: ClusterManager,
    client: reqwest::Client,
    instance: Instance,
    port: u16,
    user: String,
    password: String,
}

impl LoginProbe {
    pub fn new(
        manager: ClusterManager,
        client: reqwest::Client,
        instance: Instance,
        port: u16,
        user: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            manager,
            client,
            instance,
            port,
            user: user.into(),
            password: password.into(),
        }
    }
}

#[async_trait]
impl Probe for LoginProbe {
    fn name(&self) -> &'static str {
        "login"
    }

    async fn check(&self) -> Result<(), String> {
        let port = self
            .manager
            .resolve_port(&self.instance, self.port)
            .await
            .ok_or_else(|| format!("unable to find container: {}", self.instance))?;

        let resp = self
            .client
            .post(format!("http://localhost:{port}/login"))
            .json(&json!({ "userid": self.user, "password": self.password }))
            .send()
            .await
            .map_err(|e| format!("while logging in: {e}"))?;

        let status = resp.status();
        let body: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| format!("while reading login response ({status}): {e}"))?;

        if !status.is_success() {
            return Err(format!("login returned {status}: {body}"));
        }
        if let Some(errors) = body.get("errors") {
            return Err(format!("login rejected: {errors}"));
        }

        info!(target: "testvisor.probe", instance = %self.instance, "Logged into {}", self.instance);
        Ok(())
    }
}

/// Polls an already resolved health endpoint.
pub struct HealthProbe {
    client: reqwest::Client,
    url: String,
    prefix: String,
}

impl HealthProbe {
    pub fn new(client: reqwest::Client, port: u16, prefix: impl Into<String>) -> Self {
        Self {
            client,
            url: format!("http://localhost:{port}/health"),
            prefix: prefix.into(),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl Probe for HealthProbe {
    fn name(&self) -> &'static str {
        "health"
    }

    async fn check(&self) -> Result<(), String> {
        let resp = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| format!("health request failed: {e}"))?;

        let status = resp.status();
        if status == reqwest::StatusCode::OK {
            info!(target: "testvisor.probe", prefix = %self.prefix, %status, "Health check: OK for {}", self.prefix);
            return Ok(());
        }
        let body = resp.text().await.unwrap_or_default();
        Err(format!("health returned {status}; response: {body:?}"))
    }
}
