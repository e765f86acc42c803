//! Shrinkray - batch image compression
//!
//! Headless entry point. It initializes:
//! - Logging infrastructure (file rotation + console output)
//! - Tokio async runtime
//! - Settings loading ([`ConfigManager`]) served live by a [`SettingsStore`]
//! - The compression [`Pipeline`] driving an external encoder
//!
//! # Execution Flow
//!
//! 1. Initialize logging -> logs/shrinkray.<date>
//! 2. Load `settings.yaml` (plus `SHRINKRAY_*` overrides) and apply CLI overrides
//! 3. Expand every input into image files and queue them
//! 4. Wait for all jobs; Ctrl-C clears the queue instead
//! 5. Log per-file results and the aggregate summary, then shut down

use anyhow::{Context, Result};
use camino::Utf8PathBuf;
use clap::Parser;
use shrinkray::services::{
    CommandCompressor, FsFileInfoService, LogNotifier, SystemCpuCount, find_images,
};
use shrinkray::{
    APP_NAME, ClearFilesEvent, ConfigManager, JobOutcome, Pipeline, SettingsStore, VERSION,
};
use std::sync::Arc;
use tokio::sync::mpsc;

#[derive(Parser, Debug)]
#[command(name = "shrinkray", version, about = "Compress images in parallel", long_about = None)]
struct Cli {
    /// Image files or directories to compress
    #[arg(value_name = "INPUT", required = true)]
    inputs: Vec<Utf8PathBuf>,

    /// Directory holding settings.yaml
    #[arg(long, default_value = "shrinkray-data")]
    config_dir: Utf8PathBuf,

    /// Directory for rotating log files
    #[arg(long, default_value = "logs")]
    log_dir: String,

    /// Concurrent compressions (0 = one per CPU); overrides the settings file
    #[arg(short, long)]
    threads: Option<u32>,

    /// Activate the profile with this id for this run
    #[arg(short, long)]
    profile: Option<u32>,

    /// Debug-level logging
    #[arg(short, long)]
    debug: bool,

    /// Log to the file only
    #[arg(short, long)]
    quiet: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let _guard =
        shrinkray::logging::setup_logging_with_console(&cli.log_dir, APP_NAME, cli.debug, !cli.quiet)?;

    tracing::info!("Starting {} v{}", APP_NAME, VERSION);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .thread_name("shrinkray-worker")
        .build()
        .context("Failed to create tokio runtime")?;

    let result = runtime.block_on(run(cli));

    runtime.shutdown_timeout(std::time::Duration::from_secs(5));
    tracing::info!("Shutdown complete");

    result
}

async fn run(cli: Cli) -> Result<()> {
    let config_manager = ConfigManager::new(&cli.config_dir)?;
    let mut settings = config_manager.load_settings()?;

    if let Some(threads) = cli.threads {
        settings.threads = threads;
    }
    if let Some(id) = cli.profile {
        shrinkray::config::set_active_profile(&mut settings, id);
    }

    let compressor = CommandCompressor::new(settings.compressor.clone());
    tracing::info!("Active profile: {}", settings.active_profile().name);

    let pipeline = Pipeline::builder(SettingsStore::new(settings), FsFileInfoService, compressor)
        .cpu_count(Arc::new(SystemCpuCount))
        .notifier(Arc::new(LogNotifier::new()))
        .build();

    let (clear_tx, clear_rx) = mpsc::channel(4);
    let listener = pipeline.listen_for_clear(clear_rx);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted - clearing the queue");
            let _ = clear_tx.send(ClearFilesEvent).await;
        }
    });

    let mut handles = Vec::new();
    for input in &cli.inputs {
        let images = find_images(input.clone()).await;
        if images.is_empty() {
            tracing::warn!("No supported images found at {}", input);
        }
        handles.extend(images.into_iter().filter_map(|image| pipeline.add_file(image)));
    }
    tracing::info!("Queued {} image(s)", handles.len());

    for handle in handles {
        match handle.await {
            Ok(JobOutcome::Finished(job)) => match &job.error {
                Some(error) => tracing::info!("{}: {} ({})", job.path, job.status, error),
                None => tracing::info!(
                    "{}: {} ({:.1}% saved)",
                    job.path,
                    job.status,
                    job.savings.unwrap_or_default()
                ),
            },
            Ok(JobOutcome::Abandoned) => {}
            Err(e) => tracing::error!("Job task failed: {}", e),
        }
    }

    let summary = pipeline.registry().summary();
    tracing::info!(
        "Done: {} complete, {} already smaller, {} failed, {} bytes saved",
        summary.completed,
        summary.already_smaller,
        summary.failed,
        summary.bytes_saved
    );

    pipeline.shutdown();
    listener.abort();
    Ok(())
}
