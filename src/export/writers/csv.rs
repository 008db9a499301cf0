//! CSV shard writer
//!
//! Rows are formatted on arrival and buffered together with the header. Once
//! the buffer holds `max_rows` lines it is written to the next
//! `{prefix}_{n}.csv` file and re-seeded with the header. Each shard is written
//! to a temporary file and renamed into place, so a shard either exists in
//! full or not at all.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs::{self, File};
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{Result, SinkError};

use super::{RowSink, ShardSettings, prepare_output_dir};

/// Writer splitting rows into bounded CSV files
pub struct CsvShardWriter {
    settings: ShardSettings,
    /// Formatted header line
    header: String,
    /// Number of columns every row must have
    width: usize,
    /// Formatted lines of the current shard, header first
    buffer: Vec<String>,
    /// Index the next flushed shard gets
    next_index: u32,
    /// Paths of shards written so far
    shards: Vec<PathBuf>,
    /// Data rows accepted
    rows: u64,
}

impl CsvShardWriter {
    /// Create a writer, making sure the output directory exists
    ///
    /// # Arguments
    /// * `settings` - Output location, file prefix and row limit
    /// * `headers` - Column names, in output order
    pub async fn create(settings: ShardSettings, headers: Vec<String>) -> Result<Self> {
        prepare_output_dir(&settings.output_dir).await?;

        let header = format_row(&headers);
        debug!(
            "Created CSV shard writer: {} ({} columns, {} rows per file)",
            settings.shard_path(1).display(),
            headers.len(),
            settings.max_rows
        );

        Ok(Self {
            width: headers.len(),
            buffer: vec![header.clone()],
            header,
            settings,
            next_index: 1,
            shards: Vec::new(),
            rows: 0,
        })
    }

    /// Write the buffered shard and start a new one
    async fn flush_shard(&mut self) -> Result<()> {
        let path = self.settings.shard_path(self.next_index);
        let lines = self.buffer.len();

        write_atomically(&path, &self.buffer).await?;

        info!("Wrote {} ({} data rows)", path.display(), lines - 1);
        self.shards.push(path);
        self.next_index += 1;
        self.buffer.clear();
        self.buffer.push(self.header.clone());
        Ok(())
    }
}

#[async_trait]
impl RowSink for CsvShardWriter {
    async fn emit(&mut self, row: Vec<String>) -> Result<()> {
        if row.len() != self.width {
            return Err(SinkError::RowWidth {
                expected: self.width,
                found: row.len(),
            }
            .into());
        }

        self.buffer.push(format_row(&row));
        self.rows += 1;

        if self.buffer.len() >= self.settings.max_rows {
            self.flush_shard().await?;
        }
        Ok(())
    }

    async fn finalize(&mut self) -> Result<()> {
        // Header only means nothing left to write.
        if self.buffer.len() > 1 {
            self.flush_shard().await?;
        }
        debug!(
            "Finalized CSV output: {} rows in {} files",
            self.rows,
            self.shards.len()
        );
        Ok(())
    }

    fn rows_emitted(&self) -> u64 {
        self.rows
    }

    fn shards(&self) -> &[PathBuf] {
        &self.shards
    }
}

/// Quote a field: always wrapped, embedded quotes doubled
pub fn escape_field(value: &str) -> String {
    format!("\"{}\"", value.replace('"', "\"\""))
}

/// Format a row as one CSV line without the terminator
pub fn format_row<S: AsRef<str>>(fields: &[S]) -> String {
    fields
        .iter()
        .map(|f| escape_field(f.as_ref()))
        .collect::<Vec<_>>()
        .join(",")
}

/// Write `lines` to a temporary sibling of `path`, then rename it into place
async fn write_atomically(path: &Path, lines: &[String]) -> Result<()> {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let tmp_path = path.with_file_name(format!(".{}.{}.tmp", file_name, Uuid::new_v4()));

    let result = async {
        let file = File::create(&tmp_path).await?;
        let mut writer = BufWriter::new(file);
        for line in lines {
            writer.write_all(line.as_bytes()).await?;
            writer.write_all(b"\n").await?;
        }
        writer.flush().await?;
        writer.get_ref().sync_all().await?;
        drop(writer);
        fs::rename(&tmp_path, path).await
    }
    .await;

    if let Err(e) = result {
        // The temporary file is never a valid shard.
        if let Err(cleanup) = fs::remove_file(&tmp_path).await {
            debug!("Could not remove {}: {}", tmp_path.display(), cleanup);
        }
        return Err(SinkError::ShardWrite {
            path: path.display().to_string(),
            reason: e.to_string(),
        }
        .into());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(dir: &Path, max_rows: usize) -> ShardSettings {
        ShardSettings {
            output_dir: dir.to_path_buf(),
            prefix: "export".into(),
            max_rows,
        }
    }

    async fn read(path: &Path) -> String {
        fs::read_to_string(path).await.unwrap()
    }

    #[test]
    fn test_escape_field() {
        assert_eq!(escape_field("simple"), "\"simple\"");
        assert_eq!(escape_field(""), "\"\"");
        assert_eq!(escape_field("with,comma"), "\"with,comma\"");
        assert_eq!(escape_field("with\"quote"), "\"with\"\"quote\"");
        assert_eq!(escape_field("with\nnewline"), "\"with\nnewline\"");
    }

    #[test]
    fn test_format_row() {
        assert_eq!(format_row(&["a", "", "b\"c"]), "\"a\",\"\",\"b\"\"c\"");
    }

    #[tokio::test]
    async fn test_shards_of_fixed_capacity() {
        let dir = tempfile::tempdir().unwrap();
        let mut writer = CsvShardWriter::create(settings(dir.path(), 3), vec!["value".into()])
            .await
            .unwrap();

        for v in ["a", "b", "c", "d", "e"] {
            writer.emit(vec![v.to_string()]).await.unwrap();
        }
        writer.finalize().await.unwrap();

        let shards = writer.shards().to_vec();
        assert_eq!(shards.len(), 3);
        assert_eq!(shards[0], dir.path().join("export_1.csv"));
        assert_eq!(read(&shards[0]).await, "\"value\"\n\"a\"\n\"b\"\n");
        assert_eq!(read(&shards[1]).await, "\"value\"\n\"c\"\n\"d\"\n");
        assert_eq!(read(&shards[2]).await, "\"value\"\n\"e\"\n");
        assert_eq!(writer.rows_emitted(), 5);
    }

    #[tokio::test]
    async fn test_exact_fill_leaves_no_header_only_shard() {
        let dir = tempfile::tempdir().unwrap();
        let mut writer = CsvShardWriter::create(settings(dir.path(), 3), vec!["value".into()])
            .await
            .unwrap();

        for v in ["a", "b", "c", "d"] {
            writer.emit(vec![v.to_string()]).await.unwrap();
        }
        writer.finalize().await.unwrap();

        assert_eq!(writer.shards().len(), 2);
        assert!(!dir.path().join("export_3.csv").exists());
    }

    #[tokio::test]
    async fn test_no_rows_no_files() {
        let dir = tempfile::tempdir().unwrap();
        let mut writer = CsvShardWriter::create(settings(dir.path(), 3), vec!["value".into()])
            .await
            .unwrap();
        tokio_test::assert_ok!(writer.finalize().await);

        assert!(writer.shards().is_empty());
        let mut entries = fs::read_dir(dir.path()).await.unwrap();
        assert!(entries.next_entry().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_shards_concatenate_to_emitted_rows() {
        let dir = tempfile::tempdir().unwrap();
        let headers = vec!["id".to_string(), "note".to_string()];
        let mut writer = CsvShardWriter::create(settings(dir.path(), 4), headers)
            .await
            .unwrap();

        let emitted: Vec<Vec<String>> = (0..10)
            .map(|i| vec![format!("id{i}"), format!("note \"{i}\", ok")])
            .collect();
        for row in &emitted {
            writer.emit(row.clone()).await.unwrap();
        }
        writer.finalize().await.unwrap();

        let mut data_lines = Vec::new();
        for shard in writer.shards() {
            let content = read(shard).await;
            let mut lines = content.lines();
            assert_eq!(lines.next(), Some("\"id\",\"note\""));
            data_lines.extend(lines.map(str::to_string));
        }
        let expected: Vec<String> = emitted.iter().map(|r| format_row(r)).collect();
        assert_eq!(data_lines, expected);
    }

    #[tokio::test]
    async fn test_row_width_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        let headers = vec!["a".into(), "b".into()];
        let mut writer = CsvShardWriter::create(settings(dir.path(), 3), headers)
            .await
            .unwrap();

        let err = writer.emit(vec!["only one".into()]).await.unwrap_err();
        assert!(matches!(
            err,
            crate::error::ExportError::Sink(SinkError::RowWidth { expected: 2, found: 1 })
        ));
    }

    #[tokio::test]
    async fn test_flush_failure_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let mut writer = CsvShardWriter::create(settings(dir.path(), 2), vec!["v".into()])
            .await
            .unwrap();
        // A directory where the shard should go makes the rename fail.
        std::fs::create_dir(dir.path().join("export_1.csv")).unwrap();
        std::fs::write(dir.path().join("export_1.csv").join("keep"), "x").unwrap();

        let err = writer.emit(vec!["a".into()]).await.unwrap_err();
        assert!(matches!(
            err,
            crate::error::ExportError::Sink(SinkError::ShardWrite { .. })
        ));

        let leftovers: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }
}
