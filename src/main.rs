//! S3 Loadgen - multipart upload load generator for S3-compatible stores

use clap::{Parser, Subcommand};
use s3_loadgen::cleanup;
use s3_loadgen::config::Config;
use s3_loadgen::logging;
use s3_loadgen::s3::S3Client;
use s3_loadgen::scheduler::IterationScheduler;
use s3_loadgen::source::{self, FileSource};
use s3_loadgen::upload::TransferSpec;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{info, warn};

/// S3 Loadgen - upload, delete, repeat
#[derive(Parser, Debug)]
#[command(name = "s3-loadgen")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "loadgen.yaml")]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error), overrides the config file
    #[arg(short, long)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run upload waves until interrupted (default)
    Run,
    /// Abort in-progress multipart uploads left in the bucket
    AbortStale {
        /// Only abort uploads whose key starts with this prefix
        #[arg(long, default_value = "")]
        prefix: String,

        /// Aborts in flight at once
        #[arg(long, default_value_t = 16)]
        concurrency: usize,
    },
    /// Create the source file and exit
    Generate,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let config = Config::load(&args.config)?;
    let _logging = logging::init_logging(&config.logging, args.log_level.as_deref())?;

    info!("Starting S3 Loadgen v{}", s3_loadgen::VERSION);
    info!("Loaded configuration from {:?}", args.config);
    config.log_warnings();

    match args.command.unwrap_or(Command::Run) {
        Command::Run => run(config).await,
        Command::AbortStale {
            prefix,
            concurrency,
        } => abort_stale(config, &prefix, concurrency).await,
        Command::Generate => generate(&config).await,
    }
}

async fn generate(config: &Config) -> anyhow::Result<()> {
    source::generate_file(&config.load.source_path, config.load.object_size_bytes()).await?;
    Ok(())
}

async fn abort_stale(config: Config, prefix: &str, concurrency: usize) -> anyhow::Result<()> {
    let client = S3Client::new(&config.s3).await?;
    let summary = cleanup::abort_stale(&client, &config.s3.bucket, prefix, concurrency).await?;
    info!(
        found = summary.found,
        aborted = summary.aborted,
        failed = summary.failed,
        "Cleanup summary"
    );
    Ok(())
}

async fn run(config: Config) -> anyhow::Result<()> {
    generate(&config).await?;

    let client = S3Client::new(&config.s3).await?;
    info!(
        endpoint = %client.endpoint(),
        region = %client.region(),
        bucket = %config.s3.bucket,
        mode = config.load.mode.as_str(),
        wave_width = config.load.wave_width,
        part_size_mb = config.load.part_size_mb,
        "S3 client ready"
    );

    #[cfg(feature = "metrics")]
    let mut metrics_server = if config.metrics.enabled {
        let mut server =
            s3_loadgen::metrics::server::MetricsServer::new(config.metrics.address.clone());
        server.start().await?;
        Some(server)
    } else {
        None
    };

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, stopping after the current wave");
            let _ = shutdown_tx.send(true);
        }
    });

    let scheduler = IterationScheduler::new(
        Arc::new(client),
        Arc::new(FileSource::new(&config.load.source_path)),
        TransferSpec::from_config(&config.s3, &config.load),
        config.load.wave_width,
        Duration::from_secs(config.load.wave_delay_secs),
    )
    .with_max_waves(config.load.max_waves);

    let summary = scheduler.run(shutdown_rx).await;

    #[cfg(feature = "metrics")]
    {
        if let Some(server) = metrics_server.as_mut() {
            server.shutdown().await;
        }
    }

    info!(
        waves = summary.waves,
        succeeded = summary.succeeded,
        failed = summary.upload_failed + summary.delete_failed + summary.panicked,
        "Shutdown complete"
    );
    Ok(())
}
