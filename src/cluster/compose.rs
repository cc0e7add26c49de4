//! # `docker-compose` / `docker` CLI adapter.
//!
//! ```text
//! up      docker-compose -f D -p P up --force-recreate --remove-orphans --detach [svc..]
//! down    docker-compose -f D -p P down
//! list    docker ps -a --format '{{json .}}'
//! stop    docker stop -t SECS ID
//! remove  docker rm ID
//! nets    docker network ls --format '{{json .}}'
//! rm net  docker network rm ID
//! setup   CMD.. (cwd = dir of D, TEST_DOCKER_PREFIX=P, COMPOSE_PROJECT_NAME=P, COMPOSE_FILE=D)
//! ```
//!
//! Listing output is one JSON object per line, decoded with `serde_json`.

use std::path::{Path, PathBuf};
use std::process::Output;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::process::Command;
use tracing::debug;

use super::control::{Container, ControlPlane, Network, PortMapping};
use crate::error::ClusterError;

/// Environment variable carrying the cluster namespace into child processes.
pub const PREFIX_ENV: &str = "TEST_DOCKER_PREFIX";

/// Control plane backed by the `docker-compose` and `docker` binaries.
#[derive(Clone, Debug)]
pub struct Compose {
    compose: PathBuf,
    docker: PathBuf,
}

impl Default for Compose {
    fn default() -> Self {
        Self {
            compose: PathBuf::from("docker-compose"),
            docker: PathBuf::from("docker"),
        }
    }
}

impl Compose {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overrides the binaries (e.g. absolute paths or wrappers).
    pub fn with_binaries(compose: impl Into<PathBuf>, docker: impl Into<PathBuf>) -> Self {
        Self {
            compose: compose.into(),
            docker: docker.into(),
        }
    }

    fn compose_args(descriptor: &Path, prefix: &str) -> Vec<String> {
        vec![
            "-f".into(),
            descriptor.display().to_string(),
            "-p".into(),
            prefix.into(),
        ]
    }

    async fn docker(&self, args: &[&str]) -> Result<String, ClusterError> {
        let mut cmd = Command::new(&self.docker);
        cmd.args(args);
        let out = run(cmd, &self.docker, args.iter().copied()).await?;
        Ok(String::from_utf8_lossy(&out.stdout).into_owned())
    }
}

#[async_trait]
impl ControlPlane for Compose {
    async fn up(&self, descriptor: &Path, prefix: &str, services: &[String]) -> Result<(), ClusterError> {
        let mut args = Self::compose_args(descriptor, prefix);
        args.extend(
            ["up", "--force-recreate", "--remove-orphans", "--detach"]
                .into_iter()
                .map(String::from),
        );
        args.extend(services.iter().cloned());

        let mut cmd = Command::new(&self.compose);
        cmd.args(&args);
        run(cmd, &self.compose, args.iter().map(String::as_str)).await?;
        Ok(())
    }

    async fn down(&self, descriptor: &Path, prefix: &str) -> Result<(), ClusterError> {
        let mut args = Self::compose_args(descriptor, prefix);
        args.push("down".into());

        let mut cmd = Command::new(&self.compose);
        cmd.args(&args);
        run(cmd, &self.compose, args.iter().map(String::as_str)).await?;
        Ok(())
    }

    async fn containers(&self, prefix: &str) -> Result<Vec<Container>, ClusterError> {
        let raw = self.docker(&["ps", "-a", "--format", "{{json .}}"]).await?;
        let all = parse_ps(&raw)?;
        Ok(all
            .into_iter()
            .filter(|c| c.names.iter().any(|n| n.starts_with(prefix)))
            .collect())
    }

    async fn stop_container(&self, id: &str, timeout: Duration) -> Result<(), ClusterError> {
        let secs = timeout.as_secs().to_string();
        self.docker(&["stop", "-t", &secs, id]).await.map(drop)
    }

    async fn remove_container(&self, id: &str) -> Result<(), ClusterError> {
        self.docker(&["rm", id]).await.map(drop)
    }

    async fn networks(&self, prefix: &str) -> Result<Vec<Network>, ClusterError> {
        let raw = self.docker(&["network", "ls", "--format", "{{json .}}"]).await?;
        Ok(parse_networks(&raw)?
            .into_iter()
            .filter(|n| n.name.starts_with(prefix))
            .collect())
    }

    async fn remove_network(&self, id: &str) -> Result<(), ClusterError> {
        self.docker(&["network", "rm", id]).await.map(drop)
    }

    async fn setup(&self, descriptor: &Path, prefix: &str, command: &[String]) -> Result<(), ClusterError> {
        let setup_err = |reason: String| ClusterError::Setup {
            prefix: prefix.to_string(),
            command: command.to_vec(),
            reason,
        };
        let (program, args) = command
            .split_first()
            .ok_or_else(|| setup_err("empty command".into()))?;

        let mut cmd = Command::new(program);
        cmd.args(args)
            .env(PREFIX_ENV, prefix)
            .env("COMPOSE_PROJECT_NAME", prefix)
            .env("COMPOSE_FILE", descriptor);
        if let Some(dir) = descriptor.parent().filter(|d| !d.as_os_str().is_empty()) {
            cmd.current_dir(dir);
        }

        run(cmd, Path::new(program), args.iter().map(String::as_str))
            .await
            .map(drop)
            .map_err(|e| setup_err(e.to_string()))
    }
}

async fn run<'a>(
    mut cmd: Command,
    program: &Path,
    args: impl Iterator<Item = &'a str>,
) -> Result<Output, ClusterError> {
    let line = std::iter::once(program.display().to_string())
        .chain(args.map(String::from))
        .collect::<Vec<_>>()
        .join(" ");
    debug!(target: "testvisor.compose", command = %line, "running");

    let out = cmd
        .kill_on_drop(true)
        .output()
        .await
        .map_err(|e| ClusterError::Command {
            command: line.clone(),
            reason: e.to_string(),
        })?;

    if !out.status.success() {
        let stderr = String::from_utf8_lossy(&out.stderr);
        return Err(ClusterError::Command {
            command: line,
            reason: format!("{}: {}", out.status, stderr.trim()),
        });
    }
    Ok(out)
}

#[derive(Deserialize)]
struct PsLine {
    #[serde(rename = "ID")]
    id: String,
    #[serde(rename = "Names", default)]
    names: String,
    #[serde(rename = "Ports", default)]
    ports: String,
}

#[derive(Deserialize)]
struct NetworkLine {
    #[serde(rename = "ID")]
    id: String,
    #[serde(rename = "Name")]
    name: String,
}

fn decode<T: for<'de> Deserialize<'de>>(raw: &str) -> Result<Vec<T>, ClusterError> {
    raw.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(|l| serde_json::from_str(l).map_err(|e| ClusterError::Decode { error: e.to_string() }))
        .collect()
}

/// Decodes `docker ps --format '{{json .}}'` output.
pub fn parse_ps(raw: &str) -> Result<Vec<Container>, ClusterError> {
    Ok(decode::<PsLine>(raw)?
        .into_iter()
        .map(|l| Container {
            id: l.id,
            names: l
                .names
                .split(',')
                .map(|n| n.trim().trim_start_matches('/').to_string())
                .filter(|n| !n.is_empty())
                .collect(),
            ports: parse_ports(&l.ports),
        })
        .collect())
}

fn parse_networks(raw: &str) -> Result<Vec<Network>, ClusterError> {
    Ok(decode::<NetworkLine>(raw)?
        .into_iter()
        .map(|l| Network { id: l.id, name: l.name })
        .collect())
}

/// Parses the `Ports` column, e.g. `0.0.0.0:32768->8080/tcp, :::32768->8080/tcp, 9080/tcp`.
///
/// Unpublished ports and malformed entries are skipped; duplicates across
/// address families are collapsed.
pub fn parse_ports(raw: &str) -> Vec<PortMapping> {
    let mut out: Vec<PortMapping> = Vec::new();
    for entry in raw.split(',').map(str::trim) {
        let Some((host, container)) = entry.split_once("->") else {
            continue;
        };
        let Some((_, public)) = host.rsplit_once(':') else {
            continue;
        };
        let private = container.split('/').next().unwrap_or_default();

        for mapping in expand(public, private) {
            if !out.contains(&mapping) {
                out.push(mapping);
            }
        }
    }
    out
}

fn expand(public: &str, private: &str) -> Vec<PortMapping> {
    let range = |s: &str| -> Option<(u16, u16)> {
        match s.split_once('-') {
            Some((a, b)) => Some((a.parse().ok()?, b.parse().ok()?)),
            None => s.parse().ok().map(|p| (p, p)),
        }
    };
    let (Some((pub_lo, pub_hi)), Some((priv_lo, priv_hi))) = (range(public), range(private)) else {
        return Vec::new();
    };
    if pub_hi < pub_lo || priv_hi < priv_lo || pub_hi - pub_lo != priv_hi - priv_lo {
        return Vec::new();
    }
    (0..=pub_hi - pub_lo)
        .map(|i| PortMapping {
            private: priv_lo + i,
            public: pub_lo + i,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_ps_lines() {
        let raw = r#"
{"Command":"\"/gobin/dgraph alpha\"","ID":"a1b2","Names":"test-007-1_alpha1_1","Ports":"0.0.0.0:32771->8080/tcp, :::32771->8080/tcp, 0.0.0.0:32770->9080/tcp","State":"running"}
{"ID":"c3d4","Names":"test-007-1_zero1_1,other","Ports":"5080/tcp"}
"#;
        let got = parse_ps(raw).unwrap();
        assert_eq!(got.len(), 2);
        assert_eq!(got[0].id, "a1b2");
        assert_eq!(got[0].public_port(8080), Some(32771));
        assert_eq!(got[0].public_port(9080), Some(32770));
        assert_eq!(got[0].ports.len(), 2);
        assert_eq!(got[1].names, vec!["test-007-1_zero1_1", "other"]);
        assert_eq!(got[1].public_port(5080), None);
    }

    #[test]
    fn test_parse_ps_rejects_garbage() {
        let err = parse_ps("not json\n").unwrap_err();
        assert_eq!(err.as_label(), "cluster_decode");
    }

    #[test]
    fn test_parse_port_ranges() {
        let got = parse_ports("0.0.0.0:32768-32769->8080-8081/tcp, [::]:1->2/udp, junk->x");
        assert_eq!(
            got,
            vec![
                PortMapping { private: 8080, public: 32768 },
                PortMapping { private: 8081, public: 32769 },
                PortMapping { private: 2, public: 1 },
            ]
        );
    }

    #[test]
    fn test_parse_networks() {
        let raw = "{\"ID\":\"n1\",\"Name\":\"test-007-1_default\"}\n{\"ID\":\"n2\",\"Name\":\"bridge\"}\n";
        let got = parse_networks(raw).unwrap();
        assert_eq!(got[0], Network { id: "n1".into(), name: "test-007-1_default".into() });
        assert_eq!(got.len(), 2);
    }

    #[tokio::test]
    async fn test_setup_exports_namespace() {
        let dir = tempfile::tempdir().unwrap();
        let descriptor = dir.path().join("docker-compose.yml");
        std::fs::write(&descriptor, "version: '3'").unwrap();

        let cmd = vec![
            "sh".to_string(),
            "-c".to_string(),
            "test \"$TEST_DOCKER_PREFIX\" = test-001-1 && test \"$COMPOSE_PROJECT_NAME\" = test-001-1 && test -f docker-compose.yml".to_string(),
        ];
        Compose::new().setup(&descriptor, "test-001-1", &cmd).await.unwrap();

        let err = Compose::new()
            .setup(&descriptor, "test-001-2", &cmd)
            .await
            .unwrap_err();
        assert_eq!(err.as_label(), "cluster_setup");
    }

    #[tokio::test]
    async fn test_setup_rejects_empty_command() {
        let err = Compose::new()
            .setup(Path::new("docker-compose.yml"), "p", &[])
            .await
            .unwrap_err();
        assert!(err.to_string().contains("empty command"));
    }
}
