//! Configuration module for mailvault.
//!
//! Provides typed configuration structs that map to the YAML configuration
//! file, with loading, validation, defaults, and a builder pattern for
//! programmatic use.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Config struct with sub-sections
// ---------------------------------------------------------------------------

/// Top-level configuration for mailvault.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    pub store: StoreConfig,
    pub rate_limiting: RateLimitingConfig,
    pub attachments: AttachmentsConfig,
    pub deletion: DeletionConfig,
    pub logging: LoggingConfig,
}

/// Local store location settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Path to the SQLite database file that holds the mirrored mailbox.
    pub database_path: PathBuf,
}

/// Rate limiter settings (§4.2). `requested_qps` scales the token bucket's
/// refill rate linearly up to `default_refill_rate`, clamped at a positive
/// minimum so division by the rate never occurs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitingConfig {
    /// Token bucket capacity.
    pub capacity: u32,
    /// Default (maximum) refill rate, tokens/sec.
    pub default_refill_rate: f64,
    /// Requested QPS; scales the effective refill rate up to `default_refill_rate`.
    pub requested_qps: f64,
    /// Concurrent in-flight fetches during `get_messages_raw_batch` (§4.4).
    pub batch_fetch_concurrency: usize,
}

/// Content-addressed attachment storage settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttachmentsConfig {
    /// Root directory under which `<hash[:2]>/<hash>` files are written.
    pub dir: PathBuf,
}

/// Deletion manifest manager settings (§4.9).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeletionConfig {
    /// Root directory holding the `pending`/`in_progress`/`completed`/`failed`
    /// manifest subdirectories.
    pub manifests_dir: PathBuf,
    /// Chunk size for the batch-delete execution path.
    pub batch_chunk_size: usize,
}

/// Logging / tracing settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level: `trace`, `debug`, `info`, `warn`, or `error`.
    pub level: String,
    /// Emit structured JSON log lines instead of the human-readable format.
    pub json: bool,
}

// ---------------------------------------------------------------------------
// Config::load()
// ---------------------------------------------------------------------------

impl Config {
    /// Load configuration from a YAML file at `path`.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Try to load from `path`; fall back to [`Config::default`] on any error.
    pub fn load_or_default(path: &Path) -> Self {
        Self::load(path).unwrap_or_default()
    }

    /// Platform-appropriate default path for the configuration file.
    ///
    /// Typically `$XDG_CONFIG_HOME/mailvault/config.yaml` on Linux.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("~/.config"))
            .join("mailvault")
            .join("config.yaml")
    }
}

// ---------------------------------------------------------------------------
// Config::default()
// ---------------------------------------------------------------------------

impl Default for StoreConfig {
    fn default() -> Self {
        let data_dir = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("~/.local/share"))
            .join("mailvault");
        Self {
            database_path: data_dir.join("mailvault.db"),
        }
    }
}

impl Default for RateLimitingConfig {
    fn default() -> Self {
        Self {
            capacity: 250,
            default_refill_rate: 250.0,
            requested_qps: 250.0,
            batch_fetch_concurrency: 10,
        }
    }
}

impl Default for AttachmentsConfig {
    fn default() -> Self {
        let data_dir = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("~/.local/share"))
            .join("mailvault");
        Self {
            dir: data_dir.join("attachments"),
        }
    }
}

impl Default for DeletionConfig {
    fn default() -> Self {
        let data_dir = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("~/.local/share"))
            .join("mailvault");
        Self {
            manifests_dir: data_dir.join("manifests"),
            batch_chunk_size: 1000,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Config::validate()
// ---------------------------------------------------------------------------

/// A single validation error found in the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path to the offending field, e.g. `"rate_limiting.capacity"`.
    pub field: String,
    /// Human-readable explanation.
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Valid values for `logging.level`.
const VALID_LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Minimum QPS the rate limiter will accept (§4.2: "QPS is clamped at a
/// positive minimum (0.1) to prevent division-by-zero").
pub const MIN_QPS: f64 = 0.1;

impl Config {
    /// Validate the configuration and return all errors found.
    ///
    /// An empty vector means the configuration is valid.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        // --- rate_limiting ---
        if self.rate_limiting.capacity == 0 {
            errors.push(ValidationError {
                field: "rate_limiting.capacity".into(),
                message: "must be greater than 0".into(),
            });
        }
        if self.rate_limiting.default_refill_rate <= 0.0 {
            errors.push(ValidationError {
                field: "rate_limiting.default_refill_rate".into(),
                message: "must be greater than 0".into(),
            });
        }
        if self.rate_limiting.requested_qps < MIN_QPS {
            errors.push(ValidationError {
                field: "rate_limiting.requested_qps".into(),
                message: format!("must be at least {MIN_QPS}"),
            });
        }
        if self.rate_limiting.batch_fetch_concurrency == 0 {
            errors.push(ValidationError {
                field: "rate_limiting.batch_fetch_concurrency".into(),
                message: "must be greater than 0".into(),
            });
        }

        // --- deletion ---
        if self.deletion.batch_chunk_size == 0 {
            errors.push(ValidationError {
                field: "deletion.batch_chunk_size".into(),
                message: "must be greater than 0".into(),
            });
        }
        if self.deletion.batch_chunk_size > 1000 {
            errors.push(ValidationError {
                field: "deletion.batch_chunk_size".into(),
                message: "must not exceed the provider's batch-delete limit of 1000".into(),
            });
        }

        // --- logging ---
        if !VALID_LOG_LEVELS.contains(&self.logging.level.as_str()) {
            errors.push(ValidationError {
                field: "logging.level".into(),
                message: format!(
                    "invalid level '{}'; valid options: {}",
                    self.logging.level,
                    VALID_LOG_LEVELS.join(", ")
                ),
            });
        }

        errors
    }
}

// ---------------------------------------------------------------------------
// ConfigBuilder
// ---------------------------------------------------------------------------

/// Builder for constructing a [`Config`] programmatically.
///
/// Starts from [`Config::default`] and allows selective overrides.
///
/// # Example
///
/// ```rust,no_run
/// use mailvault_core::config::ConfigBuilder;
/// use std::path::PathBuf;
///
/// let config = ConfigBuilder::new()
///     .store_database_path(PathBuf::from("/var/lib/mailvault/mailvault.db"))
///     .rate_limiting_requested_qps(50.0)
///     .logging_level("debug")
///     .build();
/// ```
#[derive(Debug, Clone)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Create a new builder initialised with [`Config::default`] values.
    pub fn new() -> Self {
        Self {
            config: Config::default(),
        }
    }

    // --- store ---

    pub fn store_database_path(mut self, path: PathBuf) -> Self {
        self.config.store.database_path = path;
        self
    }

    // --- rate_limiting ---

    pub fn rate_limiting_capacity(mut self, capacity: u32) -> Self {
        self.config.rate_limiting.capacity = capacity;
        self
    }

    pub fn rate_limiting_default_refill_rate(mut self, rate: f64) -> Self {
        self.config.rate_limiting.default_refill_rate = rate;
        self
    }

    pub fn rate_limiting_requested_qps(mut self, qps: f64) -> Self {
        self.config.rate_limiting.requested_qps = qps;
        self
    }

    pub fn rate_limiting_batch_fetch_concurrency(mut self, n: usize) -> Self {
        self.config.rate_limiting.batch_fetch_concurrency = n;
        self
    }

    // --- attachments ---

    pub fn attachments_dir(mut self, dir: PathBuf) -> Self {
        self.config.attachments.dir = dir;
        self
    }

    // --- deletion ---

    pub fn deletion_manifests_dir(mut self, dir: PathBuf) -> Self {
        self.config.deletion.manifests_dir = dir;
        self
    }

    pub fn deletion_batch_chunk_size(mut self, size: usize) -> Self {
        self.config.deletion.batch_chunk_size = size;
        self
    }

    // --- logging ---

    pub fn logging_level(mut self, level: impl Into<String>) -> Self {
        self.config.logging.level = level.into();
        self
    }

    pub fn logging_json(mut self, json: bool) -> Self {
        self.config.logging.json = json;
        self
    }

    // --- build ---

    /// Consume the builder and return the finished [`Config`].
    pub fn build(self) -> Config {
        self.config
    }

    /// Build and validate in one step. Returns `Err` with the list of
    /// validation errors if the configuration is invalid.
    pub fn build_validated(self) -> Result<Config, Vec<ValidationError>> {
        let config = self.build();
        let errors = config.validate();
        if errors.is_empty() {
            Ok(config)
        } else {
            Err(errors)
        }
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Clamps a requested QPS at [`MIN_QPS`] and the configured default refill
/// rate, per §4.2: "QPS is clamped at a positive minimum (0.1)".
pub fn effective_refill_rate(requested_qps: f64, default_refill_rate: f64) -> f64 {
    requested_qps.max(MIN_QPS).min(default_refill_rate)
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn default_config_has_sensible_values() {
        let cfg = Config::default();
        assert_eq!(cfg.rate_limiting.capacity, 250);
        assert_eq!(cfg.rate_limiting.default_refill_rate, 250.0);
        assert_eq!(cfg.rate_limiting.requested_qps, 250.0);
        assert_eq!(cfg.rate_limiting.batch_fetch_concurrency, 10);
        assert_eq!(cfg.deletion.batch_chunk_size, 1000);
        assert_eq!(cfg.logging.level, "info");
        assert!(!cfg.logging.json);
    }

    #[test]
    fn default_config_passes_validation() {
        let cfg = Config::default();
        assert!(cfg.validate().is_empty());
    }

    #[test]
    fn load_from_yaml_file() {
        let yaml = r#"
store:
  database_path: /tmp/test-mailvault.db
rate_limiting:
  capacity: 100
  default_refill_rate: 100.0
  requested_qps: 20.0
  batch_fetch_concurrency: 4
attachments:
  dir: /tmp/attachments
deletion:
  manifests_dir: /tmp/manifests
  batch_chunk_size: 500
logging:
  level: debug
  json: true
"#;
        let mut tmp = tempfile::NamedTempFile::new().expect("create temp file");
        tmp.write_all(yaml.as_bytes()).unwrap();
        tmp.flush().unwrap();

        let cfg = Config::load(tmp.path()).expect("load config");
        assert_eq!(cfg.store.database_path, PathBuf::from("/tmp/test-mailvault.db"));
        assert_eq!(cfg.rate_limiting.capacity, 100);
        assert_eq!(cfg.rate_limiting.requested_qps, 20.0);
        assert_eq!(cfg.deletion.batch_chunk_size, 500);
        assert_eq!(cfg.logging.level, "debug");
        assert!(cfg.logging.json);
    }

    #[test]
    fn load_or_default_returns_default_on_missing_file() {
        let cfg = Config::load_or_default(Path::new("/nonexistent/config.yaml"));
        assert_eq!(cfg.rate_limiting.capacity, 250);
    }

    #[test]
    fn load_returns_error_on_invalid_yaml() {
        let mut tmp = tempfile::NamedTempFile::new().expect("create temp file");
        tmp.write_all(b"not: [valid: yaml: {{{").unwrap();
        tmp.flush().unwrap();

        let result = Config::load(tmp.path());
        assert!(result.is_err());
    }

    #[test]
    fn validate_catches_zero_capacity() {
        let mut cfg = Config::default();
        cfg.rate_limiting.capacity = 0;
        let errors = cfg.validate();
        assert!(errors.iter().any(|e| e.field == "rate_limiting.capacity"));
    }

    #[test]
    fn validate_catches_qps_below_minimum() {
        let mut cfg = Config::default();
        cfg.rate_limiting.requested_qps = 0.0;
        let errors = cfg.validate();
        assert!(errors
            .iter()
            .any(|e| e.field == "rate_limiting.requested_qps"));
    }

    #[test]
    fn validate_catches_batch_chunk_over_limit() {
        let mut cfg = Config::default();
        cfg.deletion.batch_chunk_size = 5000;
        let errors = cfg.validate();
        assert!(errors
            .iter()
            .any(|e| e.field == "deletion.batch_chunk_size"));
    }

    #[test]
    fn validate_catches_zero_batch_chunk() {
        let mut cfg = Config::default();
        cfg.deletion.batch_chunk_size = 0;
        let errors = cfg.validate();
        assert!(errors
            .iter()
            .any(|e| e.field == "deletion.batch_chunk_size"));
    }

    #[test]
    fn validate_catches_invalid_log_level() {
        let mut cfg = Config::default();
        cfg.logging.level = "verbose".to_string();
        let errors = cfg.validate();
        assert!(errors.iter().any(|e| e.field == "logging.level"));
    }

    #[test]
    fn validate_accepts_all_valid_log_levels() {
        for level in VALID_LOG_LEVELS {
            let mut cfg = Config::default();
            cfg.logging.level = level.to_string();
            assert!(!cfg.validate().iter().any(|e| e.field == "logging.level"));
        }
    }

    #[test]
    fn builder_starts_from_defaults() {
        let cfg = ConfigBuilder::new().build();
        assert_eq!(cfg.rate_limiting.capacity, 250);
    }

    #[test]
    fn builder_overrides_fields() {
        let cfg = ConfigBuilder::new()
            .store_database_path(PathBuf::from("/custom/path.db"))
            .rate_limiting_capacity(500)
            .rate_limiting_default_refill_rate(500.0)
            .rate_limiting_requested_qps(50.0)
            .rate_limiting_batch_fetch_concurrency(20)
            .attachments_dir(PathBuf::from("/custom/attachments"))
            .deletion_manifests_dir(PathBuf::from("/custom/manifests"))
            .deletion_batch_chunk_size(250)
            .logging_level("debug")
            .logging_json(true)
            .build();

        assert_eq!(cfg.store.database_path, PathBuf::from("/custom/path.db"));
        assert_eq!(cfg.rate_limiting.capacity, 500);
        assert_eq!(cfg.rate_limiting.requested_qps, 50.0);
        assert_eq!(cfg.attachments.dir, PathBuf::from("/custom/attachments"));
        assert_eq!(cfg.deletion.manifests_dir, PathBuf::from("/custom/manifests"));
        assert_eq!(cfg.deletion.batch_chunk_size, 250);
        assert_eq!(cfg.logging.level, "debug");
        assert!(cfg.logging.json);
    }

    #[test]
    fn builder_build_validated_succeeds_for_valid_config() {
        let result = ConfigBuilder::new().rate_limiting_requested_qps(10.0).build_validated();
        assert!(result.is_ok());
    }

    #[test]
    fn builder_build_validated_fails_for_invalid_config() {
        let result = ConfigBuilder::new()
            .rate_limiting_capacity(0)
            .logging_level("nope")
            .build_validated();
        assert!(result.is_err());
        let errors = result.unwrap_err();
        assert!(errors.len() >= 2);
    }

    #[test]
    fn default_path_ends_with_config_yaml() {
        let p = Config::default_path();
        assert!(p.ends_with("mailvault/config.yaml"));
    }

    #[test]
    fn validation_error_display() {
        let err = ValidationError {
            field: "rate_limiting.capacity".into(),
            message: "must be greater than 0".into(),
        };
        assert_eq!(err.to_string(), "rate_limiting.capacity: must be greater than 0");
    }

    #[test]
    fn effective_refill_rate_clamps_to_minimum() {
        assert_eq!(effective_refill_rate(0.0, 250.0), MIN_QPS);
        assert_eq!(effective_refill_rate(-5.0, 250.0), MIN_QPS);
    }

    #[test]
    fn effective_refill_rate_clamps_to_default() {
        assert_eq!(effective_refill_rate(1000.0, 250.0), 250.0);
    }

    #[test]
    fn effective_refill_rate_passes_through_within_range() {
        assert_eq!(effective_refill_rate(50.0, 250.0), 50.0);
    }
}
