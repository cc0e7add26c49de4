//! Retry policy for readiness probes.
//!
//! - [`RetryPolicy`] how many attempts, and how far apart;
//! - [`retry_probe`] runs a [`Probe`] under a [`RetryPolicy`].
//!
//! `RetryPolicy::default()` is 30 attempts, one second apart.

mod retry;

pub use retry::{Probe, RetryPolicy, retry_probe};
