use anyhow::Context;
use aviary_app::external::MemoryDatastore;
use aviary_app::{Pipeline, PipelineDeps, Settings};
use aviary_foundation::ShutdownHandler;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::fmt::writer::MakeWriterExt;

#[derive(Parser, Debug)]
#[command(name = "aviary", about = "Realtime bird-audio detection pipeline")]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Capture sources (sound card names or RTSP URLs); overrides config.
    #[arg(short, long)]
    source: Vec<String>,

    /// Seconds to wait for components during shutdown.
    #[arg(long, default_value_t = 30)]
    shutdown_timeout: u64,
}

fn init_logging() -> anyhow::Result<()> {
    std::fs::create_dir_all("logs")?;

    let file_appender = RollingFileAppender::new(Rotation::DAILY, "logs", "aviary.log");
    let (non_blocking_file, guard) = tracing_appender::non_blocking(file_appender);

    let log_level = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());

    tracing_subscriber::fmt()
        .with_writer(std::io::stdout.and(non_blocking_file))
        .with_env_filter(log_level)
        .init();

    // Keep the appender guard alive for the life of the process.
    std::mem::forget(guard);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging()?;
    let cli = Cli::parse();

    let mut settings = match &cli.config {
        Some(path) => Settings::load(path)
            .with_context(|| format!("loading configuration from {}", path.display()))?,
        None => Settings::default(),
    };
    if !cli.source.is_empty() {
        settings.capture.sources = cli.source.clone();
    }

    tracing::info!(
        node = %settings.main.name,
        sources = settings.capture.sources.len(),
        "starting aviary"
    );

    let deps = PipelineDeps::with_store(Arc::new(MemoryDatastore::new()));
    let pipeline = Pipeline::start(settings, deps)
        .await
        .context("starting pipeline")?;

    let shutdown = ShutdownHandler::new().install().await;
    shutdown.wait().await;

    pipeline
        .shutdown(Duration::from_secs(cli.shutdown_timeout))
        .await
        .context("shutting down pipeline")?;
    Ok(())
}
