//! Clip merge worker binary.

use std::sync::Arc;

use anyhow::Context;
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use clipmerge_media::{check_ffmpeg, check_ffprobe, FfmpegEngine, HttpClipFetcher};
use clipmerge_models::EncodingConfig;
use clipmerge_source::{HttpJobSource, JobSourceConfig};
use clipmerge_storage::StorageClient;
use clipmerge_worker::{metrics, MergeOrchestrator, ScratchContext, WorkerConfig};

#[tokio::main(flavor = "current_thread")]
async fn main() {
    // Load environment variables
    dotenvy::dotenv().ok();

    init_tracing();

    if let Err(e) = run().await {
        error!("Worker failed to start: {:#}", e);
        std::process::exit(1);
    }

    info!("Worker shutdown complete");
}

/// JSON logs when `LOG_FORMAT=json`, coloured human-readable logs otherwise.
fn init_tracing() {
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("warn,clipmerge=info"));

    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_ansi(true)
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false),
            )
            .with(env_filter)
            .init();
    }
}

async fn run() -> anyhow::Result<()> {
    // Install rustls crypto provider before any HTTPS client is built
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("failed to install rustls crypto provider"))?;

    info!("Starting clipmerge-worker");

    let config = WorkerConfig::from_env()?;
    info!("Worker config: {:?}", config);

    if let Some(port) = config.metrics_port {
        metrics::install_exporter(port)?;
        info!("Serving metrics on port {}", port);
    }

    let ffmpeg = check_ffmpeg()?;
    let ffprobe = check_ffprobe()?;
    info!("Using {} and {}", ffmpeg.display(), ffprobe.display());

    let storage = StorageClient::from_env().context("storage configuration")?;
    info!("Publishing to bucket {}", storage.bucket());

    let source = HttpJobSource::new(
        JobSourceConfig::new(&config.job_source_url, &config.report_url)
            .with_timeout(config.http_timeout),
    )
    .context("jobs API client")?;
    let fetcher = HttpClipFetcher::new(config.http_timeout).context("download client")?;

    // Setup signal handler
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received shutdown signal");
            let _ = shutdown_tx.send(true);
        }
    });

    let engine = FfmpegEngine::new(EncodingConfig::default())
        .with_timeout(config.ffmpeg_timeout.as_secs())
        .with_cancel(shutdown_rx.clone());

    let orchestrator = MergeOrchestrator::new(
        Arc::new(source),
        Arc::new(fetcher),
        Arc::new(engine),
        Arc::new(storage),
    )
    .with_config(&config);

    orchestrator
        .run(&ScratchContext::from_config(&config), shutdown_rx)
        .await;

    Ok(())
}
