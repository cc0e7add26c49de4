//! # Namespace and worker identity service.
//!
//! Every provisioning attempt needs a prefix that no other attempt in the
//! process (or a concurrently running process) will use. [`Namespaces`]
//! combines a random per-process salt with a single atomic counter:
//!
//! ```text
//! test-042-1   test-042-2   test-042-3 ...
//!      │   └── counter (process-wide, never reused)
//!      └────── salt (random at construction, 0..1000)
//! ```
//!
//! The service is owned and injected into the orchestrator and workers;
//! tests build it with [`Namespaces::with_salt`] for predictable prefixes.

use std::sync::atomic::{AtomicU32, Ordering};

use rand::Rng;

/// Root shared by every prefix; `--clear` removes everything that starts with it.
pub const PREFIX_ROOT: &str = "test-";

/// Allocates collision-free cluster prefixes and worker ids.
#[derive(Debug)]
pub struct Namespaces {
    salt: u32,
    prefixes: AtomicU32,
    workers: AtomicU32,
}

impl Namespaces {
    /// Creates a service with a random salt.
    pub fn new() -> Self {
        Self::with_salt(rand::rng().random_range(0..1000))
    }

    /// Creates a service with a fixed salt.
    pub fn with_salt(salt: u32) -> Self {
        Self {
            salt,
            prefixes: AtomicU32::new(0),
            workers: AtomicU32::new(0),
        }
    }

    pub fn salt(&self) -> u32 {
        self.salt
    }

    /// Returns the next unused prefix, e.g. `test-042-7`.
    pub fn next_prefix(&self) -> String {
        let id = self.prefixes.fetch_add(1, Ordering::Relaxed) + 1;
        format!("{PREFIX_ROOT}{:03}-{id}", self.salt)
    }

    /// Returns the next worker id, starting at 1 (0 is the orchestrator itself).
    pub fn next_worker_id(&self) -> u32 {
        self.workers.fetch_add(1, Ordering::Relaxed) + 1
    }
}

impl Default for Namespaces {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Mutex;

    #[test]
    fn test_prefix_format() {
        let ns = Namespaces::with_salt(7);
        assert_eq!(ns.next_prefix(), "test-007-1");
        assert_eq!(ns.next_prefix(), "test-007-2");
    }

    #[test]
    fn test_worker_ids_start_at_one() {
        let ns = Namespaces::with_salt(0);
        assert_eq!(ns.next_worker_id(), 1);
        assert_eq!(ns.next_worker_id(), 2);
    }

    #[test]
    fn test_random_salt_in_range() {
        for _ in 0..50 {
            assert!(Namespaces::new().salt() < 1000);
        }
    }

    #[test]
    fn test_prefixes_distinct_across_threads() {
        let ns = Namespaces::with_salt(123);
        let seen = Mutex::new(Vec::new());

        std::thread::scope(|s| {
            for _ in 0..8 {
                s.spawn(|| {
                    let mine: Vec<String> = (0..200).map(|_| ns.next_prefix()).collect();
                    seen.lock().unwrap().extend(mine);
                });
            }
        });

        let all = seen.into_inner().unwrap();
        let unique: HashSet<&String> = all.iter().collect();
        assert_eq!(all.len(), 1600);
        assert_eq!(unique.len(), all.len());
    }
}
