//! `delivery-server`: serves stored audio with range support, adaptive
//! quality and predictive preloading.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{command, Parser, ValueHint};
use core_runtime::config::CoreConfig;
use core_runtime::logging::{init_logging, LogFormat, LogLevel, LoggingConfig};
use tracing::{debug, error, info};

/// Command line arguments as parsed by `clap`.
#[derive(Clone, Debug, Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Address to listen on
    #[arg(long, env = "DELIVERY_BIND", default_value = "127.0.0.1:8080")]
    bind: SocketAddr,

    /// JSON catalog manifest
    #[arg(long, env = "DELIVERY_CATALOG", value_name = "FILE", value_hint = ValueHint::FilePath)]
    catalog: PathBuf,

    /// Directory holding the audio files referenced by the catalog
    #[arg(long, env = "DELIVERY_MEDIA_DIR", value_name = "DIR", value_hint = ValueHint::DirPath)]
    media_dir: PathBuf,

    /// Preload cache capacity in megabytes
    #[arg(long, env = "DELIVERY_CACHE_MB", default_value_t = 64)]
    cache_mb: usize,

    /// Speed (Mbps) at or above which the network is `high`
    #[arg(long, env = "DELIVERY_HIGH_MBPS", default_value_t = 5.0)]
    high_mbps: f64,

    /// Speed (Mbps) below which the network is `low`
    #[arg(long, env = "DELIVERY_LOW_MBPS", default_value_t = 1.0)]
    low_mbps: f64,

    /// URL downloaded to measure throughput
    #[arg(long, env = "DELIVERY_PROBE_URL", value_hint = ValueHint::Url)]
    probe_url: Option<String>,

    /// Seconds between periodic probes; requires --probe-url
    #[arg(long, env = "DELIVERY_PROBE_INTERVAL_SECS")]
    probe_interval_secs: Option<u64>,

    /// Seconds between behavior cleanup passes (0 disables)
    #[arg(long, env = "DELIVERY_CLEANUP_INTERVAL_SECS", default_value_t = 3600)]
    cleanup_interval_secs: u64,

    /// Disable predictive preloading
    #[arg(long, env = "DELIVERY_NO_PRELOAD", default_value_t = false)]
    no_preload: bool,

    /// Disable network-driven quality selection
    #[arg(long, env = "DELIVERY_NO_ADAPTIVE", default_value_t = false)]
    no_adaptive: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "DELIVERY_LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Log format (pretty, json, compact)
    #[arg(long, env = "DELIVERY_LOG_FORMAT")]
    log_format: Option<String>,
}

impl Args {
    fn logging(&self) -> anyhow::Result<LoggingConfig> {
        let mut config = LoggingConfig::default().with_level(self.log_level.parse::<LogLevel>()?);
        if let Some(format) = &self.log_format {
            config = config.with_format(format.parse::<LogFormat>()?);
        }
        Ok(config)
    }

    fn core_config(&self) -> anyhow::Result<CoreConfig> {
        let mut builder = CoreConfig::builder()
            .bind_address(self.bind)
            .catalog_path(&self.catalog)
            .media_dir(&self.media_dir)
            .preload_cache_mb(self.cache_mb)
            .network_thresholds(self.low_mbps, self.high_mbps)
            .enable_preloading(!self.no_preload)
            .enable_adaptive_streaming(!self.no_adaptive)
            .behavior_cleanup_interval(
                (self.cleanup_interval_secs > 0).then(|| Duration::from_secs(self.cleanup_interval_secs)),
            );

        if let Some(url) = &self.probe_url {
            builder = builder.probe_url(url.clone());
        }
        if let Some(secs) = self.probe_interval_secs {
            builder = builder
                .probe_interval(Duration::from_secs(secs))
                .enable_periodic_probe(true);
        }

        Ok(builder.build()?)
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for shutdown signal");
    }
}

async fn run(args: Args) -> anyhow::Result<()> {
    let config = args.core_config().context("invalid configuration")?;
    let bind = config.bind_address;

    let service = Arc::new(
        core_service::bootstrap(config)
            .await
            .context("failed to start delivery service")?,
    );
    service.start_background_tasks();

    if service.network().has_probe() {
        let metrics = service.network().perform_network_test().await;
        info!(quality = %metrics.quality, speed_mbps = metrics.speed_mbps, "Initial network probe");
    }

    let app = core_service::api::router(service.clone());
    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .with_context(|| format!("failed to bind {bind}"))?;
    info!(address = %bind, "Listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    service.shutdown().await;
    Ok(())
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    match args.logging() {
        Ok(logging) => {
            if let Err(e) = init_logging(logging) {
                eprintln!("failed to initialize logging: {e}");
            }
        }
        Err(e) => {
            eprintln!("{e}");
            process::exit(2);
        }
    }

    let cmd = command!();
    info!(
        name = cmd.get_name(),
        version = cmd.get_version().unwrap_or("UNKNOWN"),
        "Starting"
    );
    debug!(?args, "Command line");

    if let Err(e) = run(args).await {
        error!("{e:#}");
        process::exit(1);
    }
}
