use std::sync::Arc;
use std::time::Duration;

use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::info;

use super::MetricsCollector;
use crate::registry::StreamRegistry;

/// Every `every`, take-and-reset the registry's visit counter, log it and
/// append it to the metrics history. Runs until the task is aborted.
pub async fn run_volume_reporter(
    registry: Arc<StreamRegistry>,
    metrics: Arc<MetricsCollector>,
    every: Duration,
) {
    let mut ticker = time::interval_at(Instant::now() + every, every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        let visits = registry.take_visits();
        let streams = registry.len();
        info!(
            visits,
            streams,
            interval_secs = every.as_secs(),
            "request volume"
        );
        metrics.close_interval(visits);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::StreamPaths;
    use crate::stat::Stat;
    use crate::writer::{DocumentStore, WriterConfig};
    use async_trait::async_trait;

    struct Discard;

    #[async_trait]
    impl DocumentStore for Discard {
        async fn add_document(&self, _: &str, _: &Stat) -> crate::error::Result<()> {
            Ok(())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn closes_one_interval_per_tick() {
        let registry = Arc::new(StreamRegistry::new(
            Arc::new(WriterConfig::DocumentStore(Arc::new(Discard))),
            StreamPaths::default(),
        ));
        let metrics = Arc::new(MetricsCollector::new());

        let reporter = tokio::spawn(run_volume_reporter(
            registry.clone(),
            metrics.clone(),
            Duration::from_secs(10),
        ));

        for _ in 0..3 {
            registry.resolve("cpu").await.ok().unwrap();
        }
        time::sleep(Duration::from_secs(15)).await;
        registry.resolve("cpu").await.ok().unwrap();
        time::sleep(Duration::from_secs(10)).await;

        let snap = metrics.snapshot(registry.len(), registry.visits());
        let visits: Vec<u64> = snap.volume.iter().map(|p| p.visits).collect();
        assert_eq!(visits, [3, 1]);
        assert_eq!(snap.current_visits, 0);

        reporter.abort();
    }
}
