use std::{fmt, io};

use crate::error::mongo::format_mongodb_error;

/// Crate-wide `Result` type using [`ExportError`] as the error.
pub type Result<T> = std::result::Result<T, ExportError>;

/// Top-level error type for export runs.
///
/// Wraps the more specific kinds so that every component can propagate
/// failures with `?` up to the command that started the run.
#[derive(Debug)]
pub enum ExportError {
    /// Invalid or missing configuration.
    Config(ConfigError),

    /// Could not reach or authenticate against the store.
    Connection(ConnectionError),

    /// The store rejected or failed a page request.
    Fetch(FetchError),

    /// Writing a shard failed.
    Sink(SinkError),

    /// Problem with the identifier list.
    Input(InputError),

    /// I/O errors.
    Io(io::Error),

    /// MongoDB driver errors.
    MongoDb(mongodb::error::Error),

    /// The run was interrupted before completion.
    Cancelled,
}

/// Configuration errors.
#[derive(Debug)]
pub enum ConfigError {
    /// Config file not found.
    FileNotFound(String),

    /// Config file could not be parsed.
    InvalidFormat(String),

    /// Missing required field.
    MissingField(String),

    /// Invalid field value.
    InvalidValue { field: String, value: String },
}

/// Connection errors.
#[derive(Debug)]
pub enum ConnectionError {
    /// Invalid connection URI.
    InvalidUri(String),

    /// Failed to establish a connection.
    ConnectionFailed(String),

    /// Ping command failed.
    PingFailed(String),
}

/// Errors raised while pulling pages from the store.
#[derive(Debug)]
pub enum FetchError {
    /// Query text could not be turned into a store request.
    InvalidQuery(String),

    /// A query parameter referenced in the text was never bound.
    UnboundParameter(String),

    /// The store answered with something that is not a page.
    MalformedResponse(String),

    /// The store reported a failure for the page request.
    Rejected(String),
}

/// Shard output errors.
#[derive(Debug)]
pub enum SinkError {
    /// Output directory is unusable.
    OutputDirectory { path: String, reason: String },

    /// A shard could not be written in full.
    ShardWrite { path: String, reason: String },

    /// A row did not match the header width.
    RowWidth { expected: usize, found: usize },
}

/// Identifier list errors.
#[derive(Debug)]
pub enum InputError {
    /// The identifier file could not be read.
    Unreadable { path: String, reason: String },

    /// Nothing left after dropping blanks, comments and duplicates.
    EmptyIdSet,
}

impl ExportError {
    /// Whether this outcome is a zero-work completion rather than a failure.
    ///
    /// An identifier list that normalizes to nothing ends the run without
    /// touching the store and without a non-zero exit status.
    pub fn is_benign(&self) -> bool {
        matches!(self, ExportError::Input(InputError::EmptyIdSet))
    }
}

/* ========================= Display & Error impls ========================= */

impl fmt::Display for ExportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExportError::Config(e) => write!(f, "Configuration error: {e}"),
            ExportError::Connection(e) => write!(f, "Connection error: {e}"),
            ExportError::Fetch(e) => write!(f, "Fetch error: {e}"),
            ExportError::Sink(e) => write!(f, "Output error: {e}"),
            ExportError::Input(e) => write!(f, "Input error: {e}"),
            ExportError::Io(e) => write!(f, "I/O error: {e}"),
            ExportError::MongoDb(e) => format_mongodb_error(f, e),
            ExportError::Cancelled => write!(f, "Export cancelled"),
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::FileNotFound(path) => write!(f, "Config file not found: {path}"),
            ConfigError::InvalidFormat(msg) => write!(f, "Invalid config format: {msg}"),
            ConfigError::MissingField(field) => write!(f, "Missing required field: {field}"),
            ConfigError::InvalidValue { field, value } => {
                write!(f, "Invalid value '{value}' for field '{field}'")
            }
        }
    }
}

impl fmt::Display for ConnectionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionError::InvalidUri(msg) => write!(f, "Invalid connection URI: {msg}"),
            ConnectionError::ConnectionFailed(msg) => write!(f, "Failed to connect: {msg}"),
            ConnectionError::PingFailed(msg) => write!(f, "Ping failed: {msg}"),
        }
    }
}

impl fmt::Display for FetchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FetchError::InvalidQuery(msg) => write!(f, "Invalid query: {msg}"),
            FetchError::UnboundParameter(name) => write!(f, "Unbound query parameter: {name}"),
            FetchError::MalformedResponse(msg) => write!(f, "Malformed page response: {msg}"),
            FetchError::Rejected(msg) => write!(f, "Page request rejected: {msg}"),
        }
    }
}

impl fmt::Display for SinkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SinkError::OutputDirectory { path, reason } => {
                write!(f, "Output directory {path} unusable: {reason}")
            }
            SinkError::ShardWrite { path, reason } => {
                write!(f, "Failed to write shard {path}: {reason}")
            }
            SinkError::RowWidth { expected, found } => {
                write!(f, "Row has {found} fields, header has {expected}")
            }
        }
    }
}

impl fmt::Display for InputError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InputError::Unreadable { path, reason } => {
                write!(f, "Cannot read identifier file {path}: {reason}")
            }
            InputError::EmptyIdSet => write!(f, "Identifier list is empty, nothing to export"),
        }
    }
}

impl std::error::Error for ExportError {}
impl std::error::Error for ConfigError {}
impl std::error::Error for ConnectionError {}
impl std::error::Error for FetchError {}
impl std::error::Error for SinkError {}
impl std::error::Error for InputError {}

/* ========================= Conversions to ExportError ========================= */

impl From<io::Error> for ExportError {
    fn from(err: io::Error) -> Self {
        ExportError::Io(err)
    }
}

impl From<mongodb::error::Error> for ExportError {
    fn from(err: mongodb::error::Error) -> Self {
        ExportError::MongoDb(err)
    }
}

impl From<ConfigError> for ExportError {
    fn from(err: ConfigError) -> Self {
        ExportError::Config(err)
    }
}

impl From<ConnectionError> for ExportError {
    fn from(err: ConnectionError) -> Self {
        ExportError::Connection(err)
    }
}

impl From<FetchError> for ExportError {
    fn from(err: FetchError) -> Self {
        ExportError::Fetch(err)
    }
}

impl From<SinkError> for ExportError {
    fn from(err: SinkError) -> Self {
        ExportError::Sink(err)
    }
}

impl From<InputError> for ExportError {
    fn from(err: InputError) -> Self {
        ExportError::Input(err)
    }
}
