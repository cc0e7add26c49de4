//! # Bounded retry for readiness probes.
//!
//! [`retry_probe`] runs a [`Probe`] until it succeeds or `max_attempts` is
//! reached, sleeping a fixed interval between attempts. It never
//! decides criticality: the caller chooses whether exhaustion is fatal
//! (login) or a warning (health).
//!
//! ```text
//! attempt 1 ──► check() ── Ok ──► return Ok(1)
//!                  │
//!                 Err ──► sleep(interval)      ──► attempt 2 ... attempt N
//!                                                                 │
//!                                                                Err ──► ProbeError::Exhausted
//! ```

use std::time::Duration;

use async_trait::async_trait;
use tracing::warn;

use crate::error::ProbeError;

/// One readiness check.
#[async_trait]
pub trait Probe: Send + Sync {
    /// Short name used in logs and errors (`login`, `health`).
    fn name(&self) -> &'static str;

    /// Performs one attempt; the error is a human-readable reason.
    async fn check(&self) -> Result<(), String>;
}

/// How many times and how often a probe is retried.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    /// Pause between two attempts.
    pub interval: Duration,
}

impl RetryPolicy {
    /// `max_attempts` attempts separated by a fixed `interval`.
    pub fn fixed(max_attempts: u32, interval: Duration) -> Self {
        Self {
            max_attempts,
            interval,
        }
    }
}

impl Default for RetryPolicy {
    /// 30 attempts, one second apart.
    fn default() -> Self {
        Self::fixed(30, Duration::from_secs(1))
    }
}

/// Runs `probe` under `policy`.
///
/// Returns the 1-based attempt that succeeded. A policy with zero attempts
/// never calls the probe and reports exhaustion immediately.
pub async fn retry_probe<P>(probe: &P, policy: &RetryPolicy) -> Result<u32, ProbeError>
where
    P: Probe + ?Sized,
{
    let mut last = String::from("no attempts made");

    for attempt in 0..policy.max_attempts {
        match probe.check().await {
            Ok(()) => return Ok(attempt + 1),
            Err(reason) => {
                warn!(
                    target: "testvisor.probe",
                    probe = probe.name(),
                    attempt = attempt + 1,
                    max = policy.max_attempts,
                    error = %reason,
                    "probe failed; retrying"
                );
                last = reason;
            }
        }
        if attempt + 1 < policy.max_attempts {
            tokio::time::sleep(policy.interval).await;
        }
    }

    Err(ProbeError::Exhausted {
        probe: probe.name(),
        attempts: policy.max_attempts,
        last,
    })
}
