//! # Telemetry collector: durations, caught failures, final report.
//!
//! One [`Telemetry`] is shared by the orchestrator and all workers. A single
//! mutex guards both the duration records and the console tee; write rates are
//! tiny compared to test durations, so contention is not a concern.
//!
//! ## Report layout
//! ```text
//! TIMELINE starting at 3:04:05 PM
//! [    0s][0] COMPILE took: 41s
//! [   48s]   [1] systest/acl took: 7s
//! [ 1m10s]      [2] worker took: 1m2s
//! [ 1m20s]   [1] DONE took: 1m29s
//! Caught output:
//! --- FAIL: TestAlpha (0.01s)
//! ```
//!
//! ## Rules
//! - records are stable-sorted by timestamp before printing, so the output is
//!   non-decreasing in time whatever the insertion order was;
//! - records shorter than [`REPORT_THRESHOLD`] are omitted;
//! - indentation is three spaces per worker id.

use std::io::{self, Write};
use std::time::{Duration, SystemTime};

use parking_lot::Mutex;
use time::{OffsetDateTime, UtcOffset, macros::format_description};

use super::tee::{FailureCatcher, Tee};

/// Records shorter than this are not worth a timeline line.
pub const REPORT_THRESHOLD: Duration = Duration::from_secs(1);

/// One measured span.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DurationRecord {
    /// Worker that measured it (0 for the orchestrator).
    pub worker: u32,
    /// Task id or a phase label (`START`, `COMPILE`, `DONE`).
    pub label: String,
    pub took: Duration,
    /// When the record was taken.
    pub at: SystemTime,
}

struct State {
    records: Vec<DurationRecord>,
    console: Tee<Box<dyn Write + Send>, FailureCatcher>,
}

/// Concurrency-safe duration recorder and console interceptor.
pub struct Telemetry {
    state: Mutex<State>,
    /// Offset the timeline clock is shown in.
    offset: UtcOffset,
}

impl Telemetry {
    /// Collector forwarding to stdout.
    pub fn new() -> Self {
        Self::with_console(Box::new(io::stdout()))
    }

    /// Collector forwarding to an arbitrary console sink.
    pub fn with_console(console: Box<dyn Write + Send>) -> Self {
        Self {
            state: Mutex::new(State {
                records: Vec::new(),
                console: Tee::new(console, FailureCatcher::default()),
            }),
            offset: UtcOffset::UTC,
        }
    }

    /// Shows the timeline clock in `offset` (UTC by default).
    ///
    /// The local offset can only be read reliably before any thread is
    /// spawned, so callers capture it at startup and pass it in.
    pub fn with_offset(mut self, offset: UtcOffset) -> Self {
        self.offset = offset;
        self
    }

    /// Appends a record stamped with the current time.
    pub fn took(&self, worker: u32, label: impl Into<String>, took: Duration) {
        self.record(DurationRecord {
            worker,
            label: label.into(),
            took,
            at: SystemTime::now(),
        });
    }

    /// Appends a pre-built record.
    pub fn record(&self, rec: DurationRecord) {
        self.state.lock().records.push(rec);
    }

    /// Forwards `chunk` to the console and keeps it if it carries a failure marker.
    pub fn write(&self, chunk: &[u8]) -> io::Result<()> {
        self.state.lock().console.write_all(chunk)
    }

    /// Writes one line to the console without inspecting it.
    pub fn announce(&self, line: &str) -> io::Result<()> {
        let mut state = self.state.lock();
        let out = state.console.forward_mut();
        writeln!(out, "{line}")?;
        out.flush()
    }

    /// Copy of the failure buffer.
    pub fn caught(&self) -> Vec<u8> {
        self.state.lock().console.inspector().caught().to_vec()
    }

    /// Records sorted by timestamp (stable).
    pub fn records(&self) -> Vec<DurationRecord> {
        let mut records = self.state.lock().records.clone();
        records.sort_by_key(|r| r.at);
        records
    }

    /// Renders the timeline and caught output.
    pub fn report(&self) -> String {
        let records = self.records();
        let caught = self.caught();
        render(&records, &caught, self.offset)
    }

    /// Prints [`Telemetry::report`] to the console.
    pub fn print(&self) -> io::Result<()> {
        let report = self.report();
        let mut state = self.state.lock();
        let out = state.console.forward_mut();
        out.write_all(report.as_bytes())?;
        out.flush()
    }
}

impl Default for Telemetry {
    fn default() -> Self {
        Self::new()
    }
}

fn render(records: &[DurationRecord], caught: &[u8], offset: UtcOffset) -> String {
    let mut out = String::new();

    match records.first() {
        Some(first) => {
            let origin = first.at;
            out.push_str(&format!("TIMELINE starting at {}\n", clock(origin, offset)));
            for rec in records.iter().filter(|r| r.took >= REPORT_THRESHOLD) {
                let elapsed = rec.at.duration_since(origin).unwrap_or_default();
                out.push_str(&format!(
                    "[{:>6}]{}[{}] {} took: {}\n",
                    human(elapsed),
                    "   ".repeat(rec.worker as usize),
                    rec.worker,
                    rec.label,
                    human(rec.took),
                ));
            }
        }
        None => out.push_str("TIMELINE empty\n"),
    }

    if !caught.is_empty() {
        out.push_str("Caught output:\n");
        out.push_str(&String::from_utf8_lossy(caught));
        out.push('\n');
    }
    out
}

/// Wall-clock time as `3:04:05 PM` in `offset`.
fn clock(at: SystemTime, offset: UtcOffset) -> String {
    let at = OffsetDateTime::from(at).to_offset(offset);
    at.format(format_description!(
        "[hour repr:12 padding:none]:[minute]:[second] [period]"
    ))
    .unwrap_or_else(|_| at.to_string())
}

/// Duration rounded to whole seconds, rendered as `1h2m3s`, `4m5s`, `6s` or `0s`.
pub fn human(d: Duration) -> String {
    let total = (d.as_millis() + 500) / 1000;
    let (h, m, s) = (total / 3600, (total % 3600) / 60, total % 60);
    match (h, m) {
        (0, 0) => format!("{s}s"),
        (0, _) => format!("{m}m{s}s"),
        _ => format!("{h}h{m}m{s}s"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[derive(Clone, Default)]
    struct Shared(Arc<Mutex<Vec<u8>>>);

    impl Write for Shared {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().extend_from_slice(buf);
            Ok(buf.len())
        }
        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn rec(worker: u32, label: &str, took_s: u64, at_s: u64) -> DurationRecord {
        DurationRecord {
            worker,
            label: label.into(),
            took: Duration::from_secs(took_s),
            at: SystemTime::UNIX_EPOCH + Duration::from_secs(1_700_000_000 + at_s),
        }
    }

    #[test]
    fn test_human_durations() {
        assert_eq!(human(Duration::ZERO), "0s");
        assert_eq!(human(Duration::from_millis(1499)), "1s");
        assert_eq!(human(Duration::from_millis(1500)), "2s");
        assert_eq!(human(Duration::from_secs(65)), "1m5s");
        assert_eq!(human(Duration::from_secs(3723)), "1h2m3s");
    }

    #[test]
    fn test_report_is_sorted_filtered_and_indented() {
        let t = Telemetry::with_console(Box::new(io::sink()));
        t.record(rec(2, "worker", 62, 70));
        t.record(rec(0, "START", 0, 0));
        t.record(rec(1, "systest/acl", 7, 48));
        t.record(rec(1, "fast/pkg", 0, 50));

        let report = t.report();
        let lines: Vec<&str> = report.lines().collect();

        assert!(lines[0].starts_with("TIMELINE starting at "));
        assert_eq!(lines[1], "[   48s]   [1] systest/acl took: 7s");
        assert_eq!(lines[2], "[ 1m10s]      [2] worker took: 1m2s");
        assert_eq!(lines.len(), 3);
    }

    #[test]
    fn test_equal_timestamps_keep_insertion_order() {
        let t = Telemetry::with_console(Box::new(io::sink()));
        t.record(rec(1, "b", 2, 5));
        t.record(rec(2, "a", 2, 5));
        t.record(rec(3, "c", 2, 1));

        let labels: Vec<String> = t.records().into_iter().map(|r| r.label).collect();
        assert_eq!(labels, vec!["c", "b", "a"]);
    }

    #[test]
    fn test_concurrent_records_print_non_decreasing() {
        let t = Arc::new(Telemetry::with_console(Box::new(io::sink())));

        std::thread::scope(|s| {
            for w in 0..6u32 {
                let t = t.clone();
                s.spawn(move || {
                    for i in 0..50u64 {
                        // interleave timestamps across workers in reverse order
                        t.record(rec(w, "pkg", 1, 1000 - i * 7 - u64::from(w)));
                    }
                });
            }
        });

        let records = t.records();
        assert_eq!(records.len(), 300);
        assert!(records.windows(2).all(|w| w[0].at <= w[1].at));
    }

    #[test]
    fn test_write_forwards_and_report_dumps_caught_output() {
        let console = Shared::default();
        let t = Telemetry::with_console(Box::new(console.clone()));

        t.write(b"=== RUN TestA\n").unwrap();
        t.write(b"--- FAIL: TestA\n").unwrap();
        t.took(1, "pkg", Duration::from_secs(3));
        t.print().unwrap();

        let out = String::from_utf8(console.0.lock().clone()).unwrap();
        assert!(out.starts_with("=== RUN TestA\n--- FAIL: TestA\nTIMELINE starting at "));
        assert!(out.ends_with("Caught output:\n--- FAIL: TestA\n\n"));
        assert_eq!(t.caught(), b"--- FAIL: TestA\n");
    }

    #[test]
    fn test_timeline_clock_uses_given_offset() {
        // 1_700_000_000 is 22:13:20 UTC.
        let utc = Telemetry::with_console(Box::new(io::sink()));
        utc.record(rec(0, "START", 0, 0));
        assert!(utc.report().starts_with("TIMELINE starting at 10:13:20 PM\n"));

        let plus_two = UtcOffset::from_hms(2, 0, 0).unwrap();
        let local = Telemetry::with_console(Box::new(io::sink())).with_offset(plus_two);
        local.record(rec(0, "START", 0, 0));
        assert!(local.report().starts_with("TIMELINE starting at 12:13:20 AM\n"));
    }

    #[test]
    fn test_empty_report_does_not_panic() {
        let t = Telemetry::with_console(Box::new(io::sink()));
        assert_eq!(t.report(), "TIMELINE empty\n");
    }
}
