//! Error handling for export runs.
//!
//! Every failure in a run surfaces as an [`ExportError`]. The kinds mirror the
//! operator-facing taxonomy:
//! - configuration problems, detected before any store interaction
//! - store fetch failures, fatal and never retried here
//! - shard flush failures on the output side
//! - input problems with the identifier list
//!
//! Driver errors are rendered as structured JSON so a single diagnostic line
//! carries the server code and message.
//!
//! # Example
//!
//! ```rust,no_run
//! use ru_export::error::{ConfigError, Result};
//!
//! fn require_query(query: &str) -> Result<()> {
//!     if query.trim().is_empty() {
//!         return Err(ConfigError::MissingField("export.query".into()).into());
//!     }
//!     Ok(())
//! }
//! ```

pub mod kinds;
pub mod mongo;

pub use kinds::{
    ConfigError, ConnectionError, ExportError, FetchError, InputError, Result, SinkError,
};
pub use mongo::{ErrorInfo, extract_error_info};
