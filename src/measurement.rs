//! Measurement data model: directions, byte counters, and results.

use std::fmt;
use std::time::Duration;

use serde::Serialize;
use tokio::time::Instant;

/// Which leg of the test a value belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Server-to-client measurement leg.
    Download,
    /// Client-to-server measurement leg.
    Upload,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Download => f.write_str("download"),
            Direction::Upload => f.write_str("upload"),
        }
    }
}

/// Throughput in megabits per second: `bytes * 8 / (elapsed_secs * 1e6)`.
///
/// Returns 0.0 when no time has elapsed, so a rate is always a finite,
/// non-negative number.
pub fn mbps(bytes: u64, elapsed: Duration) -> f64 {
    let secs = elapsed.as_secs_f64();
    if secs <= 0.0 {
        return 0.0;
    }
    (bytes as f64 * 8.0) / (secs * 1_000_000.0)
}

/// Byte counter for one meter run.
///
/// Created when the session opens, mutated only by the owning meter, read
/// at completion. The count never decreases; elapsed time is monotonic
/// (not wall-clock sensitive).
#[derive(Debug)]
pub struct ThroughputSample {
    bytes: u64,
    start: Instant,
}

impl ThroughputSample {
    /// Start counting now.
    pub fn new() -> Self {
        ThroughputSample {
            bytes: 0,
            start: Instant::now(),
        }
    }

    /// Add `n` transferred bytes.
    pub fn record(&mut self, n: u64) {
        self.bytes += n;
    }

    /// Total bytes recorded so far.
    pub fn bytes(&self) -> u64 {
        self.bytes
    }

    /// Instant the sample was started.
    pub fn started_at(&self) -> Instant {
        self.start
    }

    /// Time elapsed since the sample was started.
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Current rate over the elapsed time.
    pub fn mbps(&self) -> f64 {
        mbps(self.bytes, self.elapsed())
    }

    /// Snapshot for the progress channel.
    pub fn snapshot(&self, direction: Direction) -> Progress {
        Progress {
            direction,
            bytes: self.bytes,
            elapsed: self.elapsed(),
        }
    }
}

impl Default for ThroughputSample {
    fn default() -> Self {
        Self::new()
    }
}

/// Point-in-time view of a running meter, published to the event sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    /// Leg being measured.
    pub direction: Direction,
    /// Bytes transferred so far.
    pub bytes: u64,
    /// Time since the meter started.
    pub elapsed: Duration,
}

impl Progress {
    /// Rate implied by this snapshot.
    pub fn mbps(&self) -> f64 {
        mbps(self.bytes, self.elapsed)
    }
}

/// Outcome of one measurement cycle.
///
/// A field of 0.0 means that direction failed or genuinely measured zero;
/// it never means "not tested".
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MeasurementResult {
    /// Download rate in Mbit/s.
    pub download_mbps: f64,
    /// Upload rate in Mbit/s.
    pub upload_mbps: f64,
}

impl MeasurementResult {
    /// Result reported when a cycle could not measure anything.
    pub const ZERO: MeasurementResult = MeasurementResult {
        download_mbps: 0.0,
        upload_mbps: 0.0,
    };

    /// True when both directions failed (or measured zero).
    pub fn is_zero(&self) -> bool {
        self.download_mbps == 0.0 && self.upload_mbps == 0.0
    }
}
