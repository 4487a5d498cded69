//! S3 Loadgen Library
//!
//! Load generator for S3-compatible object stores. Runs waves of concurrent
//! multipart (or single-shot) uploads, deletes every object it wrote, and
//! repeats until stopped.
//!
//! # Features
//!
//! - **Multipart protocol driver**: initiate, upload parts, complete, abort
//! - **Wave scheduler**: fixed-width fan-out, full fan-in before the next wave
//! - **Error classification**: S3 error codes explained in the logs
//! - **Cleanup**: sweep stale multipart uploads left in a bucket
//!
//! # Example
//!
//! ```no_run
//! use s3_loadgen::config::Config;
//! use s3_loadgen::s3::S3Client;
//! use s3_loadgen::scheduler::IterationScheduler;
//! use s3_loadgen::source::FileSource;
//! use s3_loadgen::upload::TransferSpec;
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load("loadgen.yaml")?;
//!     let client = S3Client::new(&config.s3).await?;
//!     let scheduler = IterationScheduler::new(
//!         Arc::new(client),
//!         Arc::new(FileSource::new(&config.load.source_path)),
//!         TransferSpec::from_config(&config.s3, &config.load),
//!         config.load.wave_width,
//!         Duration::from_secs(config.load.wave_delay_secs),
//!     );
//!     let (_tx, rx) = tokio::sync::watch::channel(false);
//!     scheduler.run(rx).await;
//!     Ok(())
//! }
//! ```

pub mod classifier;
pub mod cleanup;
pub mod config;
pub mod logging;
pub mod metrics;
pub mod s3;
pub mod scheduler;
pub mod source;
pub mod upload;

// Re-export commonly used types
pub use config::Config;
pub use scheduler::IterationScheduler;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
