//! Uptime Sampler Binary

use clap::Parser;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uptime_sampler::{
    Cli, Config, HttpProbe, MeteredSink, Mode, RedisSink, Result, SimpleSampler, WindowedSampler,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    initialize_tracing();

    let cli = Cli::parse();

    info!("Starting uptime sampler v{}", env!("CARGO_PKG_VERSION"));

    let config = Config::from(cli.command);

    // Validate configuration
    if let Err(e) = config.validate() {
        error!("Configuration validation failed: {}", e);
        std::process::exit(1);
    }

    info!(
        "Sampler configuration - Name: {}, URL: {}, Interval: {}, Window: {}, Expiration: {}, Redis: {}",
        config.name,
        config.url,
        humantime::format_duration(config.interval),
        config
            .window()
            .map(|w| humantime::format_duration(w).to_string())
            .unwrap_or_else(|| "none".to_string()),
        humantime::format_duration(config.expiration),
        config.redis_addr
    );

    let redis = match RedisSink::new(&config.redis_url()) {
        Ok(redis) => redis,
        Err(e) => {
            error!("{}", e);
            std::process::exit(1);
        }
    };

    if !redis.test_connectivity().await {
        info!("Redis is not reachable yet, records will be written once it is");
    }

    let sink = Arc::new(MeteredSink::new(redis));
    let shutdown = CancellationToken::new();

    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => {
                    info!("Shutting down uptime sampler");
                    shutdown.cancel();
                }
                Err(e) => error!("Failed to wait for shutdown signal: {}", e),
            }
        }
    });

    let result = match config.mode {
        Mode::Simple => {
            let probe = HttpProbe::new(config.url.clone(), config.probe_timeout)?
                .capturing_body(true);
            let mut sampler = SimpleSampler::new(&config, probe, Arc::clone(&sink))?;
            sampler.run(shutdown).await
        }
        Mode::Windowed { .. } => {
            let probe = HttpProbe::new(config.url.clone(), config.probe_timeout)?;
            let mut sampler = WindowedSampler::new(&config, probe, Arc::clone(&sink))?;
            sampler.run(shutdown).await
        }
    };

    let metrics = sink.metrics().await;
    info!(
        "Final store metrics - Success rate: {:.1}%, Total attempts: {}, Avg duration: {}ms",
        metrics.success_rate, metrics.attempts, metrics.avg_duration_ms
    );

    if let Err(e) = result {
        error!("Sampler failed: {}", e);
        std::process::exit(1);
    }

    Ok(())
}

/// Initialize structured logging
fn initialize_tracing() {
    let log_level = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_thread_ids(false)
        .with_thread_names(false)
        .with_file(false)
        .with_line_number(false)
        .json();

    let filter_layer = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(&log_level))
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter_layer)
        .with(fmt_layer)
        .init();
}
