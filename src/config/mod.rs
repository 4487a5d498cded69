//! Load-test configuration
//!
//! One YAML file with `s3`, `load`, `logging` and `metrics` sections.
//! `${VAR}` placeholders are expanded before parsing (see [`ConfigLoader`]).
//!
//! The configuration is read once at process start and then treated as
//! immutable; components receive the sections they need at construction.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

mod loader;

pub use loader::ConfigLoader;

/// One mebibyte, the unit used for object and part sizes
pub const MIB: u64 = 1024 * 1024;

/// Smallest non-final part size most S3 implementations accept
pub const MIN_PART_SIZE_MB: u64 = 5;

/// Maximum number of parts in one multipart upload
pub const MAX_PARTS: u64 = 10_000;

fn has_http_scheme(url: &str) -> bool {
    url.starts_with("http://") || url.starts_with("https://")
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    ParseError(#[from] serde_yaml::Error),

    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

/// Everything one load run needs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub s3: S3Config,
    #[serde(default)]
    pub load: LoadConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

impl Config {
    /// Read, expand and validate `path`
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        ConfigLoader::load(path)
    }

    /// Settings that load but are likely to fail against a real store
    pub fn warnings(&self) -> Vec<String> {
        self.load.warnings()
    }

    /// Emit [`Config::warnings`] as `warn` events.
    ///
    /// Call once the subscriber is installed; loading happens before that.
    pub fn log_warnings(&self) {
        for warning in self.warnings() {
            tracing::warn!("{}", warning);
        }
    }

    /// Check cross-field constraints every section must satisfy
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.s3.validate()?;
        self.load.validate()?;

        match self.logging.format.as_str() {
            "text" | "json" => {}
            other => {
                return Err(ConfigError::ValidationError(format!(
                    "Invalid log format '{}': must be 'text' or 'json'",
                    other
                )))
            }
        }

        if self.metrics.enabled && self.metrics.address.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "Metrics address cannot be empty when metrics are enabled".into(),
            ));
        }

        Ok(())
    }
}

/// Target bucket and client settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct S3Config {
    pub bucket: String,
    pub region: String,
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub access_key: Option<String>,
    #[serde(default)]
    pub secret_key: Option<String>,
    #[serde(default)]
    pub session_token: Option<String>,
    #[serde(default = "default_force_path_style")]
    pub force_path_style: bool,
    /// SDK attempts per request. 1 disables SDK-level retries.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default)]
    pub connect_timeout_secs: Option<u64>,
    #[serde(default)]
    pub operation_timeout_secs: Option<u64>,
}

impl S3Config {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.bucket.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "s3.bucket cannot be empty".into(),
            ));
        }

        if self.region.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "s3.region cannot be empty".into(),
            ));
        }

        if let Some(ref endpoint) = self.endpoint {
            if !has_http_scheme(endpoint) {
                return Err(ConfigError::ValidationError(format!(
                    "Invalid endpoint '{}': must start with http:// or https://",
                    endpoint
                )));
            }
        }

        if self.access_key.is_some() != self.secret_key.is_some() {
            return Err(ConfigError::ValidationError(
                "s3.access_key and s3.secret_key must be set together".into(),
            ));
        }

        if self.max_attempts == 0 {
            return Err(ConfigError::ValidationError(
                "s3.max_attempts must be at least 1".into(),
            ));
        }

        Ok(())
    }
}

fn default_force_path_style() -> bool {
    true
}

fn default_max_attempts() -> u32 {
    1
}

/// Transfer mode used by every task of a wave
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UploadMode {
    /// CreateMultipartUpload / UploadPart x N / CompleteMultipartUpload
    #[default]
    Multipart,
    /// A single PutObject carrying the whole source
    Put,
}

impl UploadMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            UploadMode::Multipart => "multipart",
            UploadMode::Put => "put",
        }
    }
}

/// Load generation configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoadConfig {
    #[serde(default)]
    pub mode: UploadMode,
    #[serde(default = "default_source_path")]
    pub source_path: PathBuf,
    #[serde(default = "default_object_size_mb")]
    pub object_size_mb: u64,
    #[serde(default = "default_part_size_mb")]
    pub part_size_mb: u64,
    #[serde(default = "default_wave_width")]
    pub wave_width: usize,
    #[serde(default = "default_wave_delay_secs")]
    pub wave_delay_secs: u64,
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,
    #[serde(default = "default_key_suffix")]
    pub key_suffix: String,
    /// Stop after this many waves. Runs forever when unset.
    #[serde(default)]
    pub max_waves: Option<u64>,
}

impl Default for LoadConfig {
    fn default() -> Self {
        Self {
            mode: UploadMode::default(),
            source_path: default_source_path(),
            object_size_mb: default_object_size_mb(),
            part_size_mb: default_part_size_mb(),
            wave_width: default_wave_width(),
            wave_delay_secs: default_wave_delay_secs(),
            key_prefix: default_key_prefix(),
            key_suffix: default_key_suffix(),
            max_waves: None,
        }
    }
}

impl LoadConfig {
    /// Size of the generated source object in bytes
    pub fn object_size_bytes(&self) -> u64 {
        self.object_size_mb * MIB
    }

    /// Size of every non-final part in bytes
    pub fn part_size_bytes(&self) -> u64 {
        self.part_size_mb * MIB
    }

    /// Number of parts a multipart transfer of the source will upload
    pub fn total_parts(&self) -> u64 {
        self.object_size_bytes().div_ceil(self.part_size_bytes())
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.object_size_mb == 0 {
            return Err(ConfigError::ValidationError(
                "load.object_size_mb must be greater than 0".into(),
            ));
        }

        if self.part_size_mb == 0 {
            return Err(ConfigError::ValidationError(
                "load.part_size_mb must be greater than 0".into(),
            ));
        }

        if self.wave_width == 0 {
            return Err(ConfigError::ValidationError(
                "load.wave_width must be greater than 0".into(),
            ));
        }

        if self.source_path.as_os_str().is_empty() {
            return Err(ConfigError::ValidationError(
                "load.source_path cannot be empty".into(),
            ));
        }

        if self.mode == UploadMode::Multipart {
            if self.total_parts() > MAX_PARTS {
                return Err(ConfigError::ValidationError(format!(
                    "load.object_size_mb / load.part_size_mb yields {} parts, limit is {}",
                    self.total_parts(),
                    MAX_PARTS
                )));
            }
        }

        Ok(())
    }

    fn warnings(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        if self.mode == UploadMode::Multipart
            && self.part_size_mb < MIN_PART_SIZE_MB
            && self.total_parts() > 1
        {
            warnings.push(format!(
                "Part size {} MB is below {} MB, the store will likely reject completion (EntityTooSmall)",
                self.part_size_mb, MIN_PART_SIZE_MB
            ));
        }
        warnings
    }
}

fn default_source_path() -> PathBuf {
    PathBuf::from("/tmp/s3-loadgen/test-bigfile.bin")
}

fn default_object_size_mb() -> u64 {
    1024
}

fn default_part_size_mb() -> u64 {
    20
}

fn default_wave_width() -> usize {
    100
}

fn default_wave_delay_secs() -> u64 {
    5
}

fn default_key_prefix() -> String {
    "test-bigfile".to_string()
}

fn default_key_suffix() -> String {
    ".bin".to_string()
}

/// Logging configuration
///
/// Console output is always on. Each `*_file` sink is appended to when set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    /// "text" or "json"
    #[serde(default = "default_log_format")]
    pub format: String,
    #[serde(default)]
    pub main_file: Option<PathBuf>,
    #[serde(default)]
    pub error_file: Option<PathBuf>,
    /// Wire-level AWS SDK request log
    #[serde(default)]
    pub request_file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            main_file: None,
            error_file: None,
            request_file: None,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

/// Prometheus scrape endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_metrics_address")]
    pub address: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            address: default_metrics_address(),
        }
    }
}

fn default_metrics_address() -> String {
    "0.0.0.0:9090".to_string()
}
