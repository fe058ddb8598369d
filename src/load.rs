//! Load generator: many concurrent tasks posting stats to one stream.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::debug;

use crate::client::StatsEndpoint;
use crate::error::{Error, Result};
use crate::stat::Stat;

#[derive(Debug, Clone)]
pub struct LoadOptions {
    /// Total stats to post
    pub count: u64,
    pub concurrency: u32,
    /// Operand range for the generated sums
    pub min: u64,
    pub max: u64,
    /// Worker `n` seeds its RNG with `seed + n`
    pub seed: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadReport {
    pub sent: u64,
    pub failed: u64,
    pub elapsed: Duration,
}

// ─── Public entry point ──────────────────────────────────────────

/// Spawns `concurrency` Tokio tasks that share `count` posts between them
/// and waits for all of them.
pub async fn run(endpoint: StatsEndpoint, opts: LoadOptions) -> Result<LoadReport> {
    if opts.concurrency == 0 {
        return Err(Error::Config("concurrency must be non-zero".into()));
    }
    if opts.min > opts.max {
        return Err(Error::Config(format!("min {} exceeds max {}", opts.min, opts.max)));
    }

    let start = Instant::now();
    let issued = Arc::new(AtomicU64::new(0));
    let failed = Arc::new(AtomicU64::new(0));

    let mut handles = Vec::with_capacity(opts.concurrency as usize);
    for worker_id in 0..opts.concurrency {
        let endpoint = endpoint.clone();
        let issued = issued.clone();
        let failed = failed.clone();
        let opts = opts.clone();

        handles.push(tokio::spawn(async move {
            worker(worker_id, endpoint, issued, failed, opts).await;
        }));
    }

    // Wait for all workers to finish
    for h in handles {
        let _ = h.await;
    }

    let failed = failed.load(Ordering::SeqCst);
    Ok(LoadReport {
        sent: opts.count - failed,
        failed,
        elapsed: start.elapsed(),
    })
}

// ─── Worker loop ─────────────────────────────────────────────────

async fn worker(
    id: u32,
    endpoint: StatsEndpoint,
    issued: Arc<AtomicU64>,
    failed: Arc<AtomicU64>,
    opts: LoadOptions,
) {
    let mut rng = StdRng::seed_from_u64(opts.seed + id as u64);

    while issued.fetch_add(1, Ordering::Relaxed) < opts.count {
        let (sum, prime) = work(&mut rng, opts.min, opts.max);
        let stat = Stat {
            value: vec![sum as f64],
            time: Utc::now(),
            id: prime.to_string(),
            extra: Vec::new(),
        };

        if let Err(e) = endpoint.post_stat(&stat).await {
            debug!(worker = id, error = %e, "post failed");
            failed.fetch_add(1, Ordering::Relaxed);
        }
    }
}

/// An even and an odd number from `[min, max]` (nudged up by one when the
/// draw has the wrong parity), their sum, and whether that sum is prime.
fn work(rng: &mut StdRng, min: u64, max: u64) -> (u64, bool) {
    let even = rng.gen_range(min..=max);
    let even = even + even % 2;
    let odd = rng.gen_range(min..=max);
    let odd = odd + (1 - odd % 2);
    let sum = even + odd;
    (sum, is_prime(sum))
}

fn is_prime(n: u64) -> bool {
    if n < 2 {
        return false;
    }
    let mut i = 2;
    while i * i <= n {
        if n % i == 0 {
            return false;
        }
        i += 1;
    }
    true
}
