//! Logging setup
//!
//! Builds the process-wide `tracing` subscriber from [`LoggingConfig`]:
//!
//! ```text
//! Registry
//!   ├── console      fmt (text or json), RUST_LOG or configured level
//!   ├── main_file    every event at the configured level
//!   ├── error_file   ERROR events only
//!   └── request_file DEBUG events from the AWS SDK and HTTP stack
//! ```
//!
//! File sinks are opened in append mode. The returned [`LoggingGuard`]
//! syncs them to disk when dropped, so keep it alive for the whole run.

use crate::config::LoggingConfig;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing_subscriber::filter::{LevelFilter, Targets};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer, Registry};

/// Targets whose debug output makes up the request log
const REQUEST_TARGETS: &[&str] = &[
    "aws_smithy_runtime",
    "aws_sdk_s3",
    "aws_smithy_http_client",
    "hyper",
];

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Errors that can occur during logging initialization
#[derive(Error, Debug)]
pub enum LoggingError {
    #[error("Invalid log level: {0}")]
    InvalidLevel(String),

    #[error("Cannot open log file {path}: {source}")]
    FileError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to set global subscriber (may already be initialized): {0}")]
    InitError(String),
}

/// Keeps the log files of one run open and syncs them on drop
#[derive(Debug, Default)]
pub struct LoggingGuard {
    files: Vec<Arc<File>>,
}

impl LoggingGuard {
    /// Number of file sinks in use
    pub fn file_count(&self) -> usize {
        self.files.len()
    }
}

impl Drop for LoggingGuard {
    fn drop(&mut self) {
        for file in &self.files {
            let _ = file.sync_all();
        }
    }
}

/// Install the global subscriber.
///
/// `level_override` (from the command line) replaces `config.level`.
/// `RUST_LOG`, when set, still wins for the console.
pub fn init_logging(
    config: &LoggingConfig,
    level_override: Option<&str>,
) -> Result<LoggingGuard, LoggingError> {
    let (layers, guard) = build_layers(config, level_override)?;

    tracing_subscriber::registry()
        .with(layers)
        .try_init()
        .map_err(|e| LoggingError::InitError(e.to_string()))?;

    Ok(guard)
}

/// Build every configured layer without installing them
pub fn build_layers(
    config: &LoggingConfig,
    level_override: Option<&str>,
) -> Result<(Vec<BoxedLayer>, LoggingGuard), LoggingError> {
    let level_name = level_override.unwrap_or(&config.level);
    let level: LevelFilter = level_name
        .parse()
        .map_err(|_| LoggingError::InvalidLevel(level_name.to_string()))?;
    let json = config.format == "json";

    let mut guard = LoggingGuard::default();
    let mut layers: Vec<BoxedLayer> = Vec::new();

    let console_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.to_string()));
    let console = fmt::layer()
        .with_target(true)
        .with_thread_ids(true)
        .with_line_number(true);
    layers.push(if json {
        console.json().with_filter(console_filter).boxed()
    } else {
        console.with_filter(console_filter).boxed()
    });

    if let Some(path) = &config.main_file {
        let file = open_log_file(path)?;
        layers.push(file_layer(Arc::clone(&file), json, level));
        guard.files.push(file);
    }

    if let Some(path) = &config.error_file {
        let file = open_log_file(path)?;
        layers.push(file_layer(Arc::clone(&file), json, LevelFilter::ERROR));
        guard.files.push(file);
    }

    if let Some(path) = &config.request_file {
        let file = open_log_file(path)?;
        let targets = REQUEST_TARGETS
            .iter()
            .fold(Targets::new(), |t, target| {
                t.with_target(*target, LevelFilter::DEBUG)
            });
        layers.push(file_layer(Arc::clone(&file), json, targets));
        guard.files.push(file);
    }

    Ok((layers, guard))
}

fn file_layer<F>(file: Arc<File>, json: bool, filter: F) -> BoxedLayer
where
    F: tracing_subscriber::layer::Filter<Registry> + Send + Sync + 'static,
{
    let layer = fmt::layer()
        .with_writer(file)
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(true);
    if json {
        layer.json().with_filter(filter).boxed()
    } else {
        layer.with_filter(filter).boxed()
    }
}

fn open_log_file(path: &Path) -> Result<Arc<File>, LoggingError> {
    let file_error = |source| LoggingError::FileError {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(file_error)?;
    }
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(file_error)?;
    Ok(Arc::new(file))
}
