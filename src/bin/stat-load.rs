use clap::Parser;
use tracing::info;

use stat_sink::client::StatsEndpoint;
use stat_sink::load::{self, LoadOptions};
use stat_sink::logging;

#[derive(Parser, Debug)]
#[command(name = "stat-load", version, about = "Posts generated stats to a stat-sink stream")]
struct Args {
    /// stat-sink host
    #[arg(long, default_value = "127.0.0.1", env = "STAT_LOAD_HOST")]
    host: String,

    #[arg(short, long, default_value_t = 20080, env = "STAT_LOAD_PORT")]
    port: u16,

    /// Stream the stats are posted to
    #[arg(long, default_value = "mojo", env = "STAT_LOAD_STREAM")]
    stream: String,

    /// Number of stats to post
    #[arg(long, default_value_t = 20)]
    count: u64,

    /// Concurrent posting tasks
    #[arg(long, default_value_t = 20)]
    concurrency: u32,

    #[arg(long, default_value_t = 1_000_000)]
    min: u64,

    #[arg(long, default_value_t = 1_000_000_000)]
    max: u64,

    #[arg(long, default_value_t = 1000)]
    seed: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    logging::init();

    let endpoint = StatsEndpoint::new(args.host, args.port, args.stream);
    info!(url = %endpoint.url(), count = args.count, concurrency = args.concurrency, "starting load");

    let report = load::run(
        endpoint,
        LoadOptions {
            count: args.count,
            concurrency: args.concurrency,
            min: args.min,
            max: args.max,
            seed: args.seed,
        },
    )
    .await?;

    info!(
        sent = report.sent,
        failed = report.failed,
        elapsed_ms = report.elapsed.as_millis() as u64,
        "load finished"
    );
    Ok(())
}
