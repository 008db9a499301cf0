//! Run summary reported when an export finishes.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use super::pager::PagerStats;

/// What an export run did
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExportSummary {
    /// Data rows handed to the sink
    pub rows_written: u64,
    /// Shard files, in order
    pub shards: Vec<PathBuf>,
    /// Pages fetched across all queries
    pub pages: u64,
    /// Sum of page costs; reporting only
    pub total_cost: f64,
    /// Pauses inserted after expensive pages
    pub pacing_pauses: u64,
    /// Store queries issued (one per identifier batch for the reconciling export)
    pub queries: u64,
    /// Identifiers matched by a stored document
    pub found: u64,
    /// Identifiers written as placeholders
    pub placeholders: u64,
    /// Documents skipped for lacking an identifier
    pub invalid_rows: u64,
    pub elapsed: Duration,
}

impl ExportSummary {
    /// Fold one finished page sequence into the totals
    pub fn record_pager(&mut self, stats: PagerStats) {
        self.queries += 1;
        self.pages += stats.pages;
        self.total_cost += stats.total_cost;
        self.pacing_pauses += stats.pauses;
    }
}

impl fmt::Display for ExportSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Exported {} rows to {} file(s) in {:.1}s",
            self.rows_written,
            self.shards.len(),
            self.elapsed.as_secs_f64()
        )?;
        write!(
            f,
            "  {} queries, {} pages, {:.2} RU total, {} pacing pauses",
            self.queries, self.pages, self.total_cost, self.pacing_pauses
        )?;
        if self.found + self.placeholders > 0 {
            write!(
                f,
                "\n  {} found, {} placeholders, {} rows without id skipped",
                self.found, self.placeholders, self.invalid_rows
            )?;
        }
        for shard in &self.shards {
            write!(f, "\n  {}", shard.display())?;
        }
        Ok(())
    }
}
