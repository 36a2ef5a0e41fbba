//! Observable Map Demo
//!
//! Replays a short scripted sequence against an observable map, then lets
//! several concurrent producers hammer a shared set of keys while a logging
//! listener and a per-key observer watch.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use clap::Parser;
use tokio::task::JoinSet;
use tracing::{error, info, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use concurrent_observable::adapters::LoggingObserver;
use concurrent_observable::{MapConfig, ObservableMap, Result};

// =============================================================================
// CLI Arguments
// =============================================================================

/// Observable map demo - concurrent producers with change observers
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Number of concurrent producer tasks
    #[arg(long, env = "OBSERVABLE_DEMO_PRODUCERS", default_value = "4")]
    producers: usize,

    /// Updates performed by each producer
    #[arg(long, env = "OBSERVABLE_DEMO_OPS", default_value = "250")]
    ops: u64,

    /// Number of distinct keys producers write to
    #[arg(long, env = "OBSERVABLE_DEMO_KEYS", default_value = "8")]
    keys: u64,

    /// Shard amount for the underlying map (power of two)
    #[arg(long, env = "OBSERVABLE_DEMO_SHARDS")]
    shards: Option<usize>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Output logs as JSON
    #[arg(long, env = "LOG_JSON")]
    log_json: bool,
}

// =============================================================================
// Main
// =============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(&args);

    info!("Starting observable map demo");
    info!("  Producers: {}", args.producers);
    info!("  Ops per producer: {}", args.ops);
    info!("  Keys: {}", args.keys);

    let mut config = MapConfig::with_capacity(args.keys as usize);
    config.shard_amount = args.shards;
    let cache: Arc<ObservableMap<String, f64>> = Arc::new(ObservableMap::with_config(config)?);

    cache.subscribe_observer(Arc::new(LoggingObserver::debug_level()));
    cache.subscribe(|e| {
        if let (Some(key), Some(value)) = (e.key(), e.new_value()) {
            info!("{}: {}", key, value);
        }
    });
    cache.add_partial_callback(
        |e| {
            if let (Some(key), Some(value)) = (e.key(), e.new_value()) {
                info!("Auto observer: {}: {}", key, value);
            }
        },
        ["a".to_string()],
    )?;

    run_script(&cache)?;

    let partial_hits = Arc::new(AtomicU64::new(0));
    let hits = partial_hits.clone();
    cache.add_partial_callback(
        move |_| {
            hits.fetch_add(1, Ordering::Relaxed);
        },
        (0..args.keys).map(|i| format!("key-{}", i)),
    )?;

    run_producers(&cache, &args).await;

    let stats = cache.stats();
    info!(
        "Observed {} changes on producer keys via partial observer",
        partial_hits.load(Ordering::Relaxed)
    );
    info!(
        stats = %serde_json::to_string(&stats).unwrap_or_default(),
        entries = cache.len(),
        "Demo complete"
    );

    Ok(())
}

/// Scripted walkthrough: the second write of 22.2 to "a" is silent.
fn run_script(cache: &ObservableMap<String, f64>) -> Result<()> {
    cache.insert("a".to_string(), 22.2)?;
    cache.insert("b".to_string(), 23.2)?;
    cache.insert("c".to_string(), 24.2)?;
    cache.insert("a".to_string(), 22.2)?;
    cache.insert("a".to_string(), 25.2)?;
    Ok(())
}

async fn run_producers(cache: &Arc<ObservableMap<String, f64>>, args: &Args) {
    let mut join_set = JoinSet::new();

    for producer in 0..args.producers {
        let cache = cache.clone();
        let ops = args.ops;
        let keys = args.keys.max(1);
        join_set.spawn_blocking(move || -> Result<()> {
            for op in 0..ops {
                let key = format!("key-{}", (op * 31 + producer as u64) % keys);
                match op % 4 {
                    0 => {
                        cache.add_or_update(key, 1.0, |_, v| v + 1.0)?;
                    }
                    1 => {
                        cache.get_or_add(key, 0.0)?;
                    }
                    2 => {
                        if let Some(current) = cache.get(&key) {
                            cache.try_update(key, current * 2.0, &current)?;
                        }
                    }
                    _ => {
                        cache.try_remove(&key)?;
                    }
                }
            }
            Ok(())
        });
    }

    while let Some(result) = join_set.join_next().await {
        match result {
            Ok(Ok(())) => {}
            Ok(Err(e)) => error!("Producer failed: {}", e),
            Err(e) => error!("Producer task panicked: {}", e),
        }
    }
}

// =============================================================================
// Logging Setup
// =============================================================================

fn init_logging(args: &Args) {
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let filter = EnvFilter::from_default_env().add_directive(level.into());

    if args.log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true))
            .init();
    }
}
