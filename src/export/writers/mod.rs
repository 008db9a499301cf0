//! Row sinks for export operations
//!
//! A [`RowSink`] receives fully resolved rows in emission order. The CSV
//! implementation splits them into size-bounded shard files.

use async_trait::async_trait;
use std::path::{Path, PathBuf};

use crate::error::{Result, SinkError};

pub mod csv;

pub use csv::CsvShardWriter;

/// Trait for consuming export rows
#[async_trait]
pub trait RowSink: Send {
    /// Append one row, flushing a shard if it becomes full
    async fn emit(&mut self, row: Vec<String>) -> Result<()>;

    /// Flush whatever is left
    async fn finalize(&mut self) -> Result<()>;

    /// Data rows accepted so far
    fn rows_emitted(&self) -> u64;

    /// Files written so far, in shard order
    fn shards(&self) -> &[PathBuf];
}

/// Where and how large the shards are
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShardSettings {
    pub output_dir: PathBuf,
    pub prefix: String,
    /// Maximum lines per file, header included
    pub max_rows: usize,
}

impl ShardSettings {
    /// `{output_dir}/{prefix}_{index}.csv`
    pub fn shard_path(&self, index: u32) -> PathBuf {
        self.output_dir.join(format!("{}_{}.csv", self.prefix, index))
    }
}

/// Create the output directory if needed
pub(crate) async fn prepare_output_dir(dir: &Path) -> Result<()> {
    if dir.as_os_str().is_empty() {
        return Ok(());
    }

    tokio::fs::create_dir_all(dir)
        .await
        .map_err(|e| SinkError::OutputDirectory {
            path: dir.display().to_string(),
            reason: e.to_string(),
        })?;
    Ok(())
}
