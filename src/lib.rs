//! ru-export library
//!
//! Bulk export from a rate-limited document store into size-bounded CSV
//! shards. Every page fetch reports a request-unit cost; pages costing more
//! than the configured threshold are followed by a fixed pause before the
//! next fetch.
//!
//! # Modules
//!
//! - `cli`: Command-line interface and argument parsing
//! - `config`: Configuration management
//! - `connection`: Driver client setup
//! - `error`: Error types and handling
//! - `export`: Pager, pipelines and CSV sink
//! - `store`: MongoDB-wire query store adapter
//!
//! # Example
//!
//! ```no_run
//! use ru_export::config::Config;
//! use ru_export::connection::ConnectionManager;
//! use ru_export::export::{CsvShardWriter, QuerySpec, ScalarExport};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut config = Config::default();
//!     config.connection.database = "sales".into();
//!     config.connection.collection = "orders".into();
//!     config.validate()?;
//!
//!     let mut manager = ConnectionManager::new(config.connection.clone());
//!     manager.connect().await?;
//!     let store = manager.store()?;
//!
//!     let mut sink = CsvShardWriter::create(config.shard_settings(), vec!["sku".into()]).await?;
//!     let summary = ScalarExport::new(
//!         &store,
//!         QuerySpec::new(r#"[{"$project": {"_id": 0, "value": "$sku"}}]"#),
//!         "value",
//!         config.page_options(),
//!         config.pacing(),
//!     )
//!     .run(&mut sink)
//!     .await?;
//!
//!     println!("{summary}");
//!     manager.disconnect().await;
//!     Ok(())
//! }
//! ```

pub mod cli;
pub mod config;
pub mod connection;
pub mod error;
pub mod export;
pub mod store;

// Re-export commonly used types
pub use config::Config;
pub use connection::ConnectionManager;
pub use error::{ExportError, Result};
pub use export::{CsvShardWriter, ExportSummary, IdReconcilingExport, ScalarExport};
pub use store::MongoStore;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Get library version string
pub fn version() -> &'static str {
    VERSION
}
