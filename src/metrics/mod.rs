pub mod collector;
pub mod percentiles;
pub mod stream;
pub mod volume;

pub use collector::{MetricsCollector, MetricsSnapshot};
pub use volume::run_volume_reporter;

/// A single ingest observation recorded by the dispatcher.
#[derive(Debug, Clone)]
pub struct Sample {
    /// Microseconds spent inside `StatsWriter::write`
    pub write_us: u64,
    /// Total handler wall time in microseconds
    pub total_us: u64,
    /// false when decoding, setup or the write failed
    pub success: bool,
}
