//! Scalar export pipeline
//!
//! Runs one query whose result documents each carry a single value and
//! writes those values, one per row, in fetch order.

use std::time::Instant;

use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::error::Result;

use super::pager::{CostAwarePager, PacingPolicy};
use super::progress::ProgressTracker;
use super::query::QuerySpec;
use super::row::{ExportRow, lookup_path, optional_text};
use super::streaming::{PageOptions, QueryStore};
use super::summary::ExportSummary;
use super::writers::RowSink;

/// Export of a single-column query result
pub struct ScalarExport<'a> {
    store: &'a dyn QueryStore,
    query: QuerySpec,
    /// Field holding the value in each result document
    value_field: String,
    options: PageOptions,
    pacing: PacingPolicy,
    tracker: ProgressTracker,
    cancel_token: Option<CancellationToken>,
}

impl<'a> ScalarExport<'a> {
    pub fn new(
        store: &'a dyn QueryStore,
        query: QuerySpec,
        value_field: impl Into<String>,
        options: PageOptions,
        pacing: PacingPolicy,
    ) -> Self {
        Self {
            store,
            query,
            value_field: value_field.into(),
            options,
            pacing,
            tracker: ProgressTracker::hidden(),
            cancel_token: None,
        }
    }

    pub fn with_progress(mut self, tracker: ProgressTracker) -> Self {
        self.tracker = tracker;
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel_token = Some(token);
        self
    }

    /// Drive the query to exhaustion and finalize the sink
    pub async fn run(self, sink: &mut dyn RowSink) -> Result<ExportSummary> {
        let start = Instant::now();
        info!("Starting scalar export");

        let result = self.drive(sink).await;
        self.tracker.finish();

        let mut summary = result?;
        summary.elapsed = start.elapsed();
        info!(
            "Scalar export completed: {} rows, {} files, {:.2} RU",
            summary.rows_written,
            summary.shards.len(),
            summary.total_cost
        );
        Ok(summary)
    }

    async fn drive(&self, sink: &mut dyn RowSink) -> Result<ExportSummary> {
        let mut pager =
            CostAwarePager::open(self.store, &self.query, &self.options, self.pacing).await?;
        if let Some(token) = &self.cancel_token {
            pager = pager.with_cancellation(token.clone());
        }

        let mut page_no = 0u64;
        let mut total = 0u64;

        while let Some(page) = pager.next_page().await? {
            page_no += 1;

            // The whole page is resolved before anything reaches the sink.
            let values: Vec<String> = page
                .rows
                .iter()
                .map(|doc| optional_text(lookup_path(doc, &self.value_field)))
                .collect();
            total += values.len() as u64;

            info!(
                "Page {}: {} items (total {}), cost {:.2} RU",
                page_no,
                values.len(),
                total,
                page.cost
            );

            for value in values {
                sink.emit(ExportRow::Scalar(value).into_fields()).await?;
            }

            let stats = pager.stats();
            self.tracker.update(total, stats.pages, stats.total_cost);
        }

        sink.finalize().await?;

        let mut summary = ExportSummary {
            rows_written: sink.rows_emitted(),
            shards: sink.shards().to_vec(),
            ..Default::default()
        };
        summary.record_pager(pager.stats());
        Ok(summary)
    }
}
