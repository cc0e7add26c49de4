//! # Forward-and-inspect sink.
//!
//! [`Tee`] composes two sinks: every chunk goes unchanged to the `forward`
//! writer (the real console), and whatever was accepted is shown to the
//! `inspect` side. [`FailureCatcher`] is the inspector used by the telemetry
//! collector: it keeps every chunk containing a failure marker.
//!
//! ```text
//! chunk ──► Tee::write ──► forward.write(chunk)  (console, unchanged)
//!                      └─► inspect.inspect(chunk) ── contains FAIL/TODO? ──► buffer
//! ```

use std::io::{self, Write};

/// Passive observer of forwarded bytes.
pub trait Inspect: Send {
    fn inspect(&mut self, chunk: &[u8]);
}

/// Writes to `forward` and reports accepted bytes to `inspect`.
pub struct Tee<F, I> {
    forward: F,
    inspect: I,
}

impl<F, I> Tee<F, I> {
    pub fn new(forward: F, inspect: I) -> Self {
        Self { forward, inspect }
    }

    pub fn inspector(&self) -> &I {
        &self.inspect
    }

    pub fn forward_mut(&mut self) -> &mut F {
        &mut self.forward
    }
}

impl<F: Write, I: Inspect> Write for Tee<F, I> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.forward.write(buf)?;
        self.inspect.inspect(&buf[..n]);
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.forward.flush()
    }
}

/// Markers that flag a chunk as worth repeating in the final report.
pub const FAILURE_MARKERS: [&[u8]; 2] = [b"FAIL", b"TODO"];

/// Accumulates chunks that contain a failure marker.
#[derive(Debug, Default)]
pub struct FailureCatcher {
    caught: Vec<u8>,
}

impl FailureCatcher {
    pub fn caught(&self) -> &[u8] {
        &self.caught
    }
}

impl Inspect for FailureCatcher {
    fn inspect(&mut self, chunk: &[u8]) {
        if FAILURE_MARKERS.iter().any(|m| contains(chunk, m)) {
            self.caught.extend_from_slice(chunk);
        }
    }
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|w| w == needle)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forwards_everything_and_catches_markers() {
        let mut tee = Tee::new(Vec::new(), FailureCatcher::default());

        tee.write_all(b"=== RUN TestAlpha\n").unwrap();
        tee.write_all(b"--- FAIL: TestAlpha (0.01s)\n").unwrap();
        tee.write_all(b"ok  \tsystest/acl\t1.2s\n").unwrap();
        tee.write_all(b"// TODO: flaky\n").unwrap();

        assert_eq!(
            tee.forward_mut().as_slice(),
            b"=== RUN TestAlpha\n--- FAIL: TestAlpha (0.01s)\nok  \tsystest/acl\t1.2s\n// TODO: flaky\n"
        );
        assert_eq!(
            tee.inspector().caught(),
            b"--- FAIL: TestAlpha (0.01s)\n// TODO: flaky\n"
        );
    }

    #[test]
    fn test_marker_is_case_sensitive() {
        let mut catcher = FailureCatcher::default();
        catcher.inspect(b"failed to fail quietly\n");
        assert!(catcher.caught().is_empty());
    }
}
