//! Configuration module for Lifeline telemetry.
//!
//! Provides typed configuration structs that map to the YAML configuration file,
//! with loading, validation, defaults, and a builder pattern for programmatic use.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::domain::LogLevel;

// ---------------------------------------------------------------------------
// Config struct with sub-sections
// ---------------------------------------------------------------------------

/// Top-level configuration for the telemetry client.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub endpoint: EndpointConfig,
    pub buffer: BufferConfig,
    pub session: SessionConfig,
    pub logger: LoggerConfig,
    pub analytics: AnalyticsConfig,
    pub errors: ErrorsConfig,
    pub performance: PerformanceConfig,
    pub logging: LoggingConfig,
}

/// Backend the batches are posted to.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EndpointConfig {
    /// Base URL of the booking API, e.g. `https://api.example.com`.
    pub base_url: String,
    /// Per-request timeout in seconds.
    pub request_timeout_secs: u64,
    pub logs_path: String,
    pub analytics_path: String,
    pub errors_path: String,
    pub performance_path: String,
}

/// Buffering and flush cadence shared by every channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BufferConfig {
    /// Number of pending records that triggers an immediate flush.
    pub batch_size: usize,
    /// Hard cap on pending records per channel; oldest are dropped beyond it.
    pub max_queue_size: usize,
    /// Seconds between timer-driven flushes.
    pub flush_interval_secs: u64,
    /// Upper bound on the final flush performed at shutdown, in milliseconds.
    pub shutdown_timeout_ms: u64,
    /// Maximum number of timer ticks skipped after consecutive failures.
    pub max_backoff_ticks: u32,
}

/// Session lifetime and static context.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Minutes of inactivity after which a new session id is issued.
    pub idle_timeout_mins: u64,
    /// Environment name attached to every record (`production`, `staging`, ...).
    pub environment: String,
    /// Application version attached to every record.
    pub app_version: String,
}

/// Application logger settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggerConfig {
    /// Entries below this level are discarded: `debug`, `info`, `warn`, or `error`.
    pub min_level: String,
    /// Whether entries are buffered for the logs endpoint.
    pub remote: bool,
    /// Whether entries are persisted to the local log file.
    pub local: bool,
    /// Maximum number of entries kept in the local log file.
    pub local_max_entries: usize,
    /// Path of the local log file.
    pub local_path: PathBuf,
}

/// Analytics settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyticsConfig {
    pub enabled: bool,
    /// Probability in `0.0..=1.0` that an event is kept.
    pub sampling_rate: f64,
}

/// Error tracker settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ErrorsConfig {
    pub enabled: bool,
    /// Probability in `0.0..=1.0` that an admitted error is kept.
    pub sampling_rate: f64,
    /// Errors accepted per rolling minute.
    pub max_per_minute: u32,
    /// Length of the breadcrumb ring.
    pub max_breadcrumbs: usize,
    /// Regular expressions; matching messages are dropped before any processing.
    pub ignore_patterns: Vec<String>,
    /// Reports are flushed once this many are pending.
    pub batch_size: usize,
}

/// Performance monitor settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PerformanceConfig {
    pub enabled: bool,
    /// Probability in `0.0..=1.0` that a metric is kept.
    pub sampling_rate: f64,
    /// Per-metric upper bounds; a metric above its bound is marked failed.
    pub thresholds: BTreeMap<String, f64>,
}

/// Logging / tracing settings for the hosting process.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: `trace`, `debug`, `info`, `warn`, or `error`.
    pub level: String,
    /// Emit JSON lines instead of human-readable output.
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
    /// Typically `$XDG_CONFIG_HOME/lifeline/telemetry.yaml` on Linux.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("~/.config"))
            .join("lifeline")
            .join("telemetry.yaml")
    }
}

// ---------------------------------------------------------------------------
// Defaults
// ---------------------------------------------------------------------------

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080".to_string(),
            request_timeout_secs: 10,
            logs_path: "/api/logs".to_string(),
            analytics_path: "/api/analytics".to_string(),
            errors_path: "/api/errors".to_string(),
            performance_path: "/api/performance".to_string(),
        }
    }
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            batch_size: 10,
            max_queue_size: 500,
            flush_interval_secs: 30,
            shutdown_timeout_ms: 2000,
            max_backoff_ticks: 8,
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            idle_timeout_mins: 30,
            environment: "production".to_string(),
            app_version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

impl Default for LoggerConfig {
    fn default() -> Self {
        let data_dir = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("~/.local/share"))
            .join("lifeline");
        Self {
            min_level: "info".to_string(),
            remote: true,
            local: false,
            local_max_entries: 100,
            local_path: data_dir.join("logs.json"),
        }
    }
}

impl Default for AnalyticsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            sampling_rate: 1.0,
        }
    }
}

/// Messages that browsers emit routinely and that carry no signal.
pub const DEFAULT_IGNORE_PATTERNS: &[&str] = &[
    r"ResizeObserver loop (limit exceeded|completed with undelivered notifications)",
    r"^Script error\.?$",
    r"Non-Error promise rejection captured",
];

impl Default for ErrorsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            sampling_rate: 1.0,
            max_per_minute: 10,
            max_breadcrumbs: 50,
            ignore_patterns: DEFAULT_IGNORE_PATTERNS
                .iter()
                .map(|p| p.to_string())
                .collect(),
            batch_size: 1,
        }
    }
}

/// Default web-vital thresholds (milliseconds, except CLS which is a score).
pub fn default_thresholds() -> BTreeMap<String, f64> {
    [
        ("LCP", 2500.0),
        ("FID", 100.0),
        ("INP", 200.0),
        ("CLS", 0.1),
        ("FCP", 1800.0),
        ("TTFB", 800.0),
    ]
    .into_iter()
    .map(|(name, value)| (name.to_string(), value))
    .collect()
}

impl Default for PerformanceConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            sampling_rate: 1.0,
            thresholds: default_thresholds(),
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
    /// Dotted path to the offending field, e.g. `"buffer.batch_size"`.
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

fn check_rate(errors: &mut Vec<ValidationError>, field: &str, rate: f64) {
    if !(0.0..=1.0).contains(&rate) {
        errors.push(ValidationError {
            field: field.into(),
            message: format!("must be in range 0.0..=1.0, got {rate}"),
        });
    }
}

fn check_positive(errors: &mut Vec<ValidationError>, field: &str, value: u64) {
    if value == 0 {
        errors.push(ValidationError {
            field: field.into(),
            message: "must be greater than 0".into(),
        });
    }
}

fn check_at_most(errors: &mut Vec<ValidationError>, field: &str, value: u64, max: u64) {
    if value > max {
        errors.push(ValidationError {
            field: field.into(),
            message: format!("must be at most {max}, got {value}"),
        });
    }
}

/// Longest accepted flush interval: one day
pub const MAX_FLUSH_INTERVAL_SECS: u64 = 24 * 60 * 60;

/// Longest accepted session idle timeout: one week
pub const MAX_IDLE_TIMEOUT_MINS: u64 = 7 * 24 * 60;

impl Config {
    /// Validate the configuration and return all errors found.
    ///
    /// An empty vector means the configuration is valid.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        // --- endpoint ---
        if !self.endpoint.base_url.starts_with("http://")
            && !self.endpoint.base_url.starts_with("https://")
        {
            errors.push(ValidationError {
                field: "endpoint.base_url".into(),
                message: format!(
                    "must start with http:// or https://, got '{}'",
                    self.endpoint.base_url
                ),
            });
        }
        check_positive(
            &mut errors,
            "endpoint.request_timeout_secs",
            self.endpoint.request_timeout_secs,
        );
        for (field, path) in [
            ("endpoint.logs_path", &self.endpoint.logs_path),
            ("endpoint.analytics_path", &self.endpoint.analytics_path),
            ("endpoint.errors_path", &self.endpoint.errors_path),
            ("endpoint.performance_path", &self.endpoint.performance_path),
        ] {
            if !path.starts_with('/') {
                errors.push(ValidationError {
                    field: field.into(),
                    message: format!("must start with '/', got '{path}'"),
                });
            }
        }

        // --- buffer ---
        check_positive(&mut errors, "buffer.batch_size", self.buffer.batch_size as u64);
        check_positive(
            &mut errors,
            "buffer.flush_interval_secs",
            self.buffer.flush_interval_secs,
        );
        check_at_most(
            &mut errors,
            "buffer.flush_interval_secs",
            self.buffer.flush_interval_secs,
            MAX_FLUSH_INTERVAL_SECS,
        );
        check_positive(
            &mut errors,
            "buffer.shutdown_timeout_ms",
            self.buffer.shutdown_timeout_ms,
        );
        if self.buffer.max_queue_size < self.buffer.batch_size {
            errors.push(ValidationError {
                field: "buffer.max_queue_size".into(),
                message: format!(
                    "max_queue_size ({}) must not be smaller than batch_size ({})",
                    self.buffer.max_queue_size, self.buffer.batch_size
                ),
            });
        }

        // --- session ---
        check_positive(
            &mut errors,
            "session.idle_timeout_mins",
            self.session.idle_timeout_mins,
        );
        check_at_most(
            &mut errors,
            "session.idle_timeout_mins",
            self.session.idle_timeout_mins,
            MAX_IDLE_TIMEOUT_MINS,
        );
        if self.session.environment.trim().is_empty() {
            errors.push(ValidationError {
                field: "session.environment".into(),
                message: "must not be empty".into(),
            });
        }

        // --- logger ---
        if self.logger.min_level.parse::<LogLevel>().is_err() {
            errors.push(ValidationError {
                field: "logger.min_level".into(),
                message: format!(
                    "invalid level '{}'; valid options: debug, info, warn, error",
                    self.logger.min_level
                ),
            });
        }
        check_positive(
            &mut errors,
            "logger.local_max_entries",
            self.logger.local_max_entries as u64,
        );

        // --- sampling ---
        check_rate(&mut errors, "analytics.sampling_rate", self.analytics.sampling_rate);
        check_rate(&mut errors, "errors.sampling_rate", self.errors.sampling_rate);
        check_rate(
            &mut errors,
            "performance.sampling_rate",
            self.performance.sampling_rate,
        );

        // --- errors ---
        check_positive(
            &mut errors,
            "errors.max_per_minute",
            self.errors.max_per_minute as u64,
        );
        check_positive(
            &mut errors,
            "errors.max_breadcrumbs",
            self.errors.max_breadcrumbs as u64,
        );
        check_positive(&mut errors, "errors.batch_size", self.errors.batch_size as u64);
        for (i, pattern) in self.errors.ignore_patterns.iter().enumerate() {
            if let Err(e) = regex::Regex::new(pattern) {
                errors.push(ValidationError {
                    field: format!("errors.ignore_patterns[{i}]"),
                    message: format!("invalid regex: {e}"),
                });
            }
        }

        // --- performance ---
        for (name, threshold) in &self.performance.thresholds {
            if !threshold.is_finite() || *threshold < 0.0 {
                errors.push(ValidationError {
                    field: format!("performance.thresholds.{name}"),
                    message: format!("must be a non-negative number, got {threshold}"),
                });
            }
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

/// Programmatic construction of a [`Config`], starting from defaults.
#[derive(Debug, Clone)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Start from [`Config::default`].
    pub fn new() -> Self {
        Self {
            config: Config::default(),
        }
    }

    // --- endpoint ---

    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.config.endpoint.base_url = url.into();
        self
    }

    pub fn request_timeout_secs(mut self, seconds: u64) -> Self {
        self.config.endpoint.request_timeout_secs = seconds;
        self
    }

    // --- buffer ---

    pub fn batch_size(mut self, n: usize) -> Self {
        self.config.buffer.batch_size = n;
        self
    }

    pub fn max_queue_size(mut self, n: usize) -> Self {
        self.config.buffer.max_queue_size = n;
        self
    }

    pub fn flush_interval_secs(mut self, seconds: u64) -> Self {
        self.config.buffer.flush_interval_secs = seconds;
        self
    }

    pub fn shutdown_timeout_ms(mut self, ms: u64) -> Self {
        self.config.buffer.shutdown_timeout_ms = ms;
        self
    }

    // --- session ---

    pub fn idle_timeout_mins(mut self, minutes: u64) -> Self {
        self.config.session.idle_timeout_mins = minutes;
        self
    }

    pub fn environment(mut self, environment: impl Into<String>) -> Self {
        self.config.session.environment = environment.into();
        self
    }

    // --- logger ---

    pub fn logger_min_level(mut self, level: impl Into<String>) -> Self {
        self.config.logger.min_level = level.into();
        self
    }

    pub fn logger_remote(mut self, remote: bool) -> Self {
        self.config.logger.remote = remote;
        self
    }

    pub fn logger_local(mut self, path: PathBuf, max_entries: usize) -> Self {
        self.config.logger.local = true;
        self.config.logger.local_path = path;
        self.config.logger.local_max_entries = max_entries;
        self
    }

    // --- sampling ---

    pub fn analytics_sampling_rate(mut self, rate: f64) -> Self {
        self.config.analytics.sampling_rate = rate;
        self
    }

    pub fn errors_sampling_rate(mut self, rate: f64) -> Self {
        self.config.errors.sampling_rate = rate;
        self
    }

    pub fn performance_sampling_rate(mut self, rate: f64) -> Self {
        self.config.performance.sampling_rate = rate;
        self
    }

    // --- errors ---

    pub fn errors_max_per_minute(mut self, n: u32) -> Self {
        self.config.errors.max_per_minute = n;
        self
    }

    pub fn errors_max_breadcrumbs(mut self, n: usize) -> Self {
        self.config.errors.max_breadcrumbs = n;
        self
    }

    pub fn errors_ignore_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.config.errors.ignore_patterns.push(pattern.into());
        self
    }

    // --- performance ---

    pub fn performance_threshold(mut self, name: impl Into<String>, value: f64) -> Self {
        self.config.performance.thresholds.insert(name.into(), value);
        self
    }

    // --- logging ---

    pub fn logging_level(mut self, level: impl Into<String>) -> Self {
        self.config.logging.level = level.into();
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
