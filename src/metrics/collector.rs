use std::collections::VecDeque;
use std::time::Instant;

use chrono::Utc;
use hdrhistogram::Histogram;
use parking_lot::Mutex;
use serde::Serialize;

use super::percentiles::PercentileSet;
use super::Sample;

// ─── Configuration ───────────────────────────────────────────────

/// Closed reporting intervals kept for the volume history
const MAX_VOLUME_POINTS: usize = 120;

/// HdrHistogram range: 1 μs → 60 s, 3 significant figures
const HIST_LOW: u64 = 1;
const HIST_HIGH: u64 = 60_000_000;
const HIST_SIGFIG: u8 = 3;

// ─── Public types ────────────────────────────────────────────────

/// Thread-safe ingest metrics.
/// The dispatcher calls `record()`, the volume reporter calls
/// `close_interval()`, the metrics endpoints call `snapshot()`.
pub struct MetricsCollector {
    inner: Mutex<Inner>,
}

/// Request volume of one closed reporting interval.
#[derive(Debug, Clone, Serialize)]
pub struct VolumePoint {
    pub timestamp_ms: i64,
    pub visits: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub write_latency: PercentileSet,
    pub e2e: PercentileSet,

    pub total_requests: u64,
    pub total_errors: u64,
    pub streams: usize,
    pub requests_per_sec: f64,
    pub elapsed_secs: f64,

    /// Visits counted since the last closed interval
    pub current_visits: u64,
    pub volume: Vec<VolumePoint>,
}

// ─── Internal state ──────────────────────────────────────────────

struct Inner {
    write_hist: Histogram<u64>,
    e2e_hist: Histogram<u64>,

    total_requests: u64,
    total_errors: u64,

    volume: VecDeque<VolumePoint>,

    start_time: Option<Instant>,
}

// ─── MetricsCollector impl ───────────────────────────────────────

impl MetricsCollector {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner::new()),
        }
    }

    pub fn record(&self, sample: Sample) {
        self.inner.lock().record(sample);
    }

    /// Append the visit count of an interval that just ended.
    pub fn close_interval(&self, visits: u64) {
        self.inner.lock().push_volume(visits);
    }

    /// `streams` and `current_visits` come from the registry, which owns
    /// those counters.
    pub fn snapshot(&self, streams: usize, current_visits: u64) -> MetricsSnapshot {
        self.inner.lock().snapshot(streams, current_visits)
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

// ─── Inner impl ──────────────────────────────────────────────────

fn new_histogram() -> Histogram<u64> {
    Histogram::<u64>::new_with_bounds(HIST_LOW, HIST_HIGH, HIST_SIGFIG)
        .expect("static histogram bounds are valid")
}

impl Inner {
    fn new() -> Self {
        Self {
            write_hist: new_histogram(),
            e2e_hist: new_histogram(),
            total_requests: 0,
            total_errors: 0,
            volume: VecDeque::with_capacity(MAX_VOLUME_POINTS + 1),
            start_time: None,
        }
    }

    fn record(&mut self, sample: Sample) {
        self.start_time.get_or_insert_with(Instant::now);

        self.total_requests += 1;
        if !sample.success {
            self.total_errors += 1;
            return;
        }

        // Clamp into the histogram range
        let _ = self.write_hist.record(sample.write_us.clamp(HIST_LOW, HIST_HIGH));
        let _ = self.e2e_hist.record(sample.total_us.clamp(HIST_LOW, HIST_HIGH));
    }

    fn push_volume(&mut self, visits: u64) {
        self.volume.push_back(VolumePoint {
            timestamp_ms: Utc::now().timestamp_millis(),
            visits,
        });
        if self.volume.len() > MAX_VOLUME_POINTS {
            self.volume.pop_front();
        }
    }

    fn snapshot(&self, streams: usize, current_visits: u64) -> MetricsSnapshot {
        let elapsed_secs = self
            .start_time
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0);

        let rps = if elapsed_secs > 0.0 {
            self.total_requests as f64 / elapsed_secs
        } else {
            0.0
        };

        MetricsSnapshot {
            write_latency: PercentileSet::from_histogram(&self.write_hist),
            e2e: PercentileSet::from_histogram(&self.e2e_hist),
            total_requests: self.total_requests,
            total_errors: self.total_errors,
            streams,
            requests_per_sec: rps,
            elapsed_secs,
            current_visits,
            volume: self.volume.iter().cloned().collect(),
        }
    }
}
