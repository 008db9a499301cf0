//! Request-unit aware export engine
//!
//! This module turns paged store queries into sharded CSV output while
//! keeping each page's cost under control.
//!
//! # Architecture
//!
//! 1. **QueryStore / PageStream**: the store capability, one page per round trip
//! 2. **CostAwarePager**: pulls pages lazily and pauses after expensive ones
//! 3. **ScalarExport** and **IdReconcilingExport**: the two pipelines
//! 4. **RowSink**: receives resolved rows; `CsvShardWriter` splits them into files
//!
//! Both pipelines run strictly sequentially: one query in flight, one page
//! buffered, one shard buffered.
//!
//! # Example
//!
//! ```no_run
//! use ru_export::export::{
//!     CsvShardWriter, PacingPolicy, PageOptions, QuerySpec, ScalarExport, ShardSettings,
//! };
//! use ru_export::export::streaming::QueryStore;
//! use std::time::Duration;
//!
//! async fn export_names(store: &dyn QueryStore) -> ru_export::Result<()> {
//!     let settings = ShardSettings {
//!         output_dir: "out".into(),
//!         prefix: "names".into(),
//!         max_rows: 50_000,
//!     };
//!     let mut sink = CsvShardWriter::create(settings, vec!["name".into()]).await?;
//!     let query = QuerySpec::new(r#"[{"$project": {"_id": 0, "value": "$name"}}]"#);
//!     let pacing = PacingPolicy::new(1000.0, Duration::from_secs(1));
//!
//!     let summary = ScalarExport::new(store, query, "value", PageOptions::default(), pacing)
//!         .run(&mut sink)
//!         .await?;
//!     println!("{summary}");
//!     Ok(())
//! }
//! ```

pub mod ids;
pub mod pager;
pub mod progress;
pub mod projection;
pub mod query;
pub mod reconcile;
pub mod row;
pub mod scalar;
pub mod streaming;
pub mod summary;
pub mod writers;

#[cfg(test)]
pub(crate) mod testing;

pub use ids::IdSet;
pub use pager::{CostAwarePager, PacingPolicy, PagerStats};
pub use progress::ProgressTracker;
pub use projection::Projection;
pub use query::{IDS_PARAM, QuerySpec};
pub use reconcile::IdReconcilingExport;
pub use row::ExportRow;
pub use scalar::ScalarExport;
pub use streaming::{Page, PageOptions, PageStream, QueryStore};
pub use summary::ExportSummary;
pub use writers::{CsvShardWriter, RowSink, ShardSettings};
