//! Configuration management for ru-export
//!
//! Configuration is assembled once, validated, and then handed to the export
//! components as an immutable value. Sources, highest precedence first:
//! 1. Command-line arguments
//! 2. Environment variables (`RU_EXPORT_*`)
//! 3. Configuration file (TOML)
//! 4. Default values
//!
//! Nothing below the command layer reads the environment; the pipelines only
//! see the finished [`Config`] (or the smaller settings values derived from it).

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use crate::error::{ConfigError, Result};
use crate::export::pager::PacingPolicy;
use crate::export::streaming::PageOptions;
use crate::export::writers::ShardSettings;

/// Prefix for environment variable overrides.
pub const ENV_PREFIX: &str = "RU_EXPORT_";

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Store connection target
    #[serde(default)]
    pub connection: ConnectionConfig,

    /// Export pacing, batching and output settings
    #[serde(default)]
    pub export: ExportConfig,

    /// Columns written by the identifier export
    #[serde(default)]
    pub projection: ProjectionConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Connection-related configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// Connection URI of the document store
    #[serde(default = "default_uri")]
    pub uri: String,

    /// Database holding the collection
    #[serde(default)]
    pub database: String,

    /// Collection (container) to export from
    #[serde(default)]
    pub collection: String,

    /// Connection timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout: u64,

    /// Application name reported to the server
    #[serde(default)]
    pub app_name: Option<String>,
}

/// Export engine settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportConfig {
    /// Aggregation pipeline (JSON) for the scalar export
    #[serde(default)]
    pub query: String,

    /// Field holding the scalar value in each result document
    #[serde(default = "default_value_field")]
    pub value_field: String,

    /// Header of the single scalar column
    #[serde(default = "default_value_header")]
    pub value_header: String,

    /// Identifier list for the reconciling export
    #[serde(default)]
    pub id_file: Option<PathBuf>,

    /// Aggregation pipeline (JSON) for one identifier batch; must reference `"@ids"`.
    /// Generated from the projection when absent.
    #[serde(default)]
    pub ids_query: Option<String>,

    /// Identifiers per store query
    #[serde(default = "default_id_batch_size")]
    pub id_batch_size: usize,

    /// Maximum rows per output file, header included
    #[serde(default = "default_max_rows_per_file")]
    pub max_rows_per_file: usize,

    /// Page cost above which the next fetch is delayed
    #[serde(default = "default_ru_threshold")]
    pub ru_threshold: f64,

    /// Pause inserted after an over-threshold page, in milliseconds
    #[serde(default = "default_pacing_delay_ms")]
    pub pacing_delay_ms: u64,

    /// Rows requested per page
    #[serde(default = "default_page_size")]
    pub page_size: u32,

    /// Degree of parallelism hint passed to the store
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: u32,

    /// Directory receiving the CSV files
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    /// File name prefix; files are named `{prefix}_{n}.csv`
    #[serde(default = "default_file_prefix")]
    pub file_prefix: String,

    /// Show a progress spinner on the terminal
    #[serde(default = "default_progress")]
    pub progress: bool,
}

/// Output column layout for the identifier export
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectionConfig {
    /// Columns in output order; the first one is the identifier
    #[serde(default = "default_columns")]
    pub columns: Vec<ColumnConfig>,
}

/// One output column
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnConfig {
    /// CSV header text
    pub header: String,

    /// Document field, dotted for nested values
    pub field: String,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (error, warn, info, debug, trace)
    #[serde(default = "default_log_level")]
    pub level: LogLevel,

    /// Enable timestamps in logs
    #[serde(default = "default_log_timestamps")]
    pub timestamps: bool,
}

/// Log level options
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

// Default value functions
fn default_uri() -> String {
    "mongodb://localhost:27017".to_string()
}

fn default_timeout() -> u64 {
    30
}

fn default_value_field() -> String {
    "value".to_string()
}

fn default_value_header() -> String {
    "value".to_string()
}

fn default_id_batch_size() -> usize {
    100
}

fn default_max_rows_per_file() -> usize {
    100_000
}

fn default_ru_threshold() -> f64 {
    1000.0
}

fn default_pacing_delay_ms() -> u64 {
    1000
}

fn default_page_size() -> u32 {
    1000
}

fn default_max_concurrency() -> u32 {
    1
}

fn default_output_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_file_prefix() -> String {
    "export".to_string()
}

fn default_progress() -> bool {
    true
}

fn default_columns() -> Vec<ColumnConfig> {
    ["id", "name", "status", "updatedAt"]
        .iter()
        .map(|name| ColumnConfig {
            header: name.to_string(),
            field: name.to_string(),
        })
        .collect()
}

fn default_log_level() -> LogLevel {
    LogLevel::Info
}

fn default_log_timestamps() -> bool {
    true
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            uri: default_uri(),
            database: String::new(),
            collection: String::new(),
            timeout: default_timeout(),
            app_name: None,
        }
    }
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            query: String::new(),
            value_field: default_value_field(),
            value_header: default_value_header(),
            id_file: None,
            ids_query: None,
            id_batch_size: default_id_batch_size(),
            max_rows_per_file: default_max_rows_per_file(),
            ru_threshold: default_ru_threshold(),
            pacing_delay_ms: default_pacing_delay_ms(),
            page_size: default_page_size(),
            max_concurrency: default_max_concurrency(),
            output_dir: default_output_dir(),
            file_prefix: default_file_prefix(),
            progress: default_progress(),
        }
    }
}

impl Default for ProjectionConfig {
    fn default() -> Self {
        Self {
            columns: default_columns(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            timestamps: default_log_timestamps(),
        }
    }
}

impl Config {
    /// Default configuration file location (`<config dir>/ru-export/config.toml`)
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("ru-export")
            .join("config.toml")
    }

    /// Load configuration from a TOML file
    ///
    /// An explicitly given path must exist. When no path is given the default
    /// location is tried and a missing file yields the defaults.
    pub fn load_from_file(path: Option<&Path>) -> Result<Self> {
        let (path, explicit) = match path {
            Some(p) => (p.to_path_buf(), true),
            None => (Self::default_config_path(), false),
        };

        if !path.exists() {
            if explicit {
                return Err(ConfigError::FileNotFound(path.display().to_string()).into());
            }
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(&path)?;
        Self::from_toml_str(&content)
    }

    /// Parse configuration from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| ConfigError::InvalidFormat(e.to_string()).into())
    }

    /// Render the configuration as TOML
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::InvalidFormat(e.to_string()).into())
    }

    /// Overlay `RU_EXPORT_*` environment variables
    pub fn apply_env(&mut self) -> std::result::Result<(), ConfigError> {
        self.apply_env_from(|key| std::env::var(key).ok())
    }

    /// Overlay variables provided by `lookup`, keyed by full variable name
    pub fn apply_env_from<F>(&mut self, lookup: F) -> std::result::Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(&format!("{ENV_PREFIX}{name}"));

        if let Some(v) = var("URI") {
            self.connection.uri = v;
        }
        if let Some(v) = var("DATABASE") {
            self.connection.database = v;
        }
        if let Some(v) = var("COLLECTION") {
            self.connection.collection = v;
        }
        if let Some(v) = var("QUERY") {
            self.export.query = v;
        }
        if let Some(v) = var("IDS_QUERY") {
            self.export.ids_query = Some(v);
        }
        if let Some(v) = var("ID_FILE") {
            self.export.id_file = Some(PathBuf::from(v));
        }
        if let Some(v) = var("ID_BATCH_SIZE") {
            self.export.id_batch_size = parse_env("ID_BATCH_SIZE", &v)?;
        }
        if let Some(v) = var("MAX_ROWS_PER_FILE") {
            self.export.max_rows_per_file = parse_env("MAX_ROWS_PER_FILE", &v)?;
        }
        if let Some(v) = var("RU_THRESHOLD") {
            self.export.ru_threshold = parse_env("RU_THRESHOLD", &v)?;
        }
        if let Some(v) = var("PACING_DELAY_MS") {
            self.export.pacing_delay_ms = parse_env("PACING_DELAY_MS", &v)?;
        }
        if let Some(v) = var("PAGE_SIZE") {
            self.export.page_size = parse_env("PAGE_SIZE", &v)?;
        }
        if let Some(v) = var("MAX_CONCURRENCY") {
            self.export.max_concurrency = parse_env("MAX_CONCURRENCY", &v)?;
        }
        if let Some(v) = var("OUTPUT_DIR") {
            self.export.output_dir = PathBuf::from(v);
        }
        if let Some(v) = var("FILE_PREFIX") {
            self.export.file_prefix = v;
        }
        if let Some(v) = var("LOG_LEVEL") {
            self.logging.level = parse_env("LOG_LEVEL", &v)?;
        }

        Ok(())
    }

    /// Validate settings shared by both export commands
    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        if self.connection.uri.trim().is_empty() {
            return Err(ConfigError::MissingField("connection.uri".into()));
        }
        if self.connection.database.trim().is_empty() {
            return Err(ConfigError::MissingField("connection.database".into()));
        }
        if self.connection.collection.trim().is_empty() {
            return Err(ConfigError::MissingField("connection.collection".into()));
        }

        let export = &self.export;
        if export.id_batch_size == 0 {
            return Err(invalid("export.id_batch_size", export.id_batch_size));
        }
        // Header plus at least one data row.
        if export.max_rows_per_file < 2 {
            return Err(invalid("export.max_rows_per_file", export.max_rows_per_file));
        }
        if !export.ru_threshold.is_finite() || export.ru_threshold < 0.0 {
            return Err(invalid("export.ru_threshold", export.ru_threshold));
        }
        if export.page_size == 0 {
            return Err(invalid("export.page_size", export.page_size));
        }
        if export.max_concurrency == 0 {
            return Err(invalid("export.max_concurrency", export.max_concurrency));
        }
        if export.file_prefix.trim().is_empty() {
            return Err(ConfigError::MissingField("export.file_prefix".into()));
        }
        if export
            .file_prefix
            .contains(|c: char| c == '/' || c == '\\')
        {
            return Err(invalid("export.file_prefix", &export.file_prefix));
        }

        Ok(())
    }

    /// Query text for the scalar export
    pub fn require_query(&self) -> std::result::Result<&str, ConfigError> {
        let query = self.export.query.trim();
        if query.is_empty() {
            return Err(ConfigError::MissingField("export.query".into()));
        }
        if self.export.value_field.trim().is_empty() {
            return Err(ConfigError::MissingField("export.value_field".into()));
        }
        Ok(query)
    }

    /// Identifier file and projection for the reconciling export
    pub fn require_id_file(&self) -> std::result::Result<&Path, ConfigError> {
        let path = self
            .export
            .id_file
            .as_deref()
            .ok_or_else(|| ConfigError::MissingField("export.id_file".into()))?;

        if self.projection.columns.is_empty() {
            return Err(ConfigError::MissingField("projection.columns".into()));
        }
        if let Some(col) = self
            .projection
            .columns
            .iter()
            .find(|c| c.field.trim().is_empty() || c.header.trim().is_empty())
        {
            return Err(invalid("projection.columns", format!("{col:?}")));
        }
        if let Some(query) = &self.export.ids_query {
            if !query.contains("\"@ids\"") {
                return Err(invalid("export.ids_query", "missing \"@ids\" placeholder"));
            }
        }

        Ok(path)
    }

    /// Pacing policy derived from the export settings
    pub fn pacing(&self) -> PacingPolicy {
        PacingPolicy::new(
            self.export.ru_threshold,
            Duration::from_millis(self.export.pacing_delay_ms),
        )
    }

    /// Page size and parallelism hints for the store
    pub fn page_options(&self) -> PageOptions {
        PageOptions {
            page_size: self.export.page_size,
            max_concurrency: self.export.max_concurrency,
        }
    }

    /// Output settings for the CSV sink
    pub fn shard_settings(&self) -> ShardSettings {
        ShardSettings {
            output_dir: self.export.output_dir.clone(),
            prefix: self.export.file_prefix.clone(),
            max_rows: self.export.max_rows_per_file,
        }
    }
}

impl LogLevel {
    /// Convert to tracing::Level
    pub fn to_tracing_level(&self) -> tracing::Level {
        match self {
            LogLevel::Error => tracing::Level::ERROR,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Trace => tracing::Level::TRACE,
        }
    }
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "error" => Ok(LogLevel::Error),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "info" => Ok(LogLevel::Info),
            "debug" => Ok(LogLevel::Debug),
            "trace" => Ok(LogLevel::Trace),
            other => Err(format!("unknown log level '{other}'")),
        }
    }
}

fn parse_env<T: FromStr>(name: &str, value: &str) -> std::result::Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidValue {
        field: format!("{ENV_PREFIX}{name}"),
        value: value.to_string(),
    })
}

fn invalid(field: &str, value: impl ToString) -> ConfigError {
    ConfigError::InvalidValue {
        field: field.to_string(),
        value: value.to_string(),
    }
}
