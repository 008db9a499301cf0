//! Identifier-reconciling export pipeline
//!
//! The identifier list is queried in fixed-size batches. Rows returned for a
//! batch are keyed by their uppercased identifier (a later row for the same
//! identifier replaces an earlier one). Every identifier of the batch is then
//! written exactly once, in list order: the matched row if the store had one,
//! otherwise a placeholder carrying only the identifier.

use std::collections::{HashMap, HashSet};
use std::time::Instant;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{InputError, Result};

use super::ids::{IdSet, fold_case};
use super::pager::{CostAwarePager, PacingPolicy};
use super::progress::ProgressTracker;
use super::projection::Projection;
use super::query::QuerySpec;
use super::row::ExportRow;
use super::streaming::{PageOptions, QueryStore};
use super::summary::ExportSummary;
use super::writers::RowSink;

/// Export producing one row per requested identifier
pub struct IdReconcilingExport<'a> {
    store: &'a dyn QueryStore,
    ids: IdSet,
    projection: Projection,
    /// Batch query text; binds `@ids`
    query_text: String,
    batch_size: usize,
    options: PageOptions,
    pacing: PacingPolicy,
    tracker: ProgressTracker,
    cancel_token: Option<CancellationToken>,
}

/// Normalized identifier → last row seen for it, for one batch
type ReconciliationMap = HashMap<String, ExportRow>;

impl<'a> IdReconcilingExport<'a> {
    pub fn new(
        store: &'a dyn QueryStore,
        ids: IdSet,
        projection: Projection,
        batch_size: usize,
        options: PageOptions,
        pacing: PacingPolicy,
    ) -> Self {
        let query_text = projection.default_ids_query();
        Self {
            store,
            ids,
            projection,
            query_text,
            batch_size: batch_size.max(1),
            options,
            pacing,
            tracker: ProgressTracker::hidden(),
            cancel_token: None,
        }
    }

    /// Use a custom batch query instead of the one derived from the projection
    pub fn with_query(mut self, text: impl Into<String>) -> Self {
        self.query_text = text.into();
        self
    }

    pub fn with_progress(mut self, tracker: ProgressTracker) -> Self {
        self.tracker = tracker;
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel_token = Some(token);
        self
    }

    /// Run every batch, then finalize the sink
    ///
    /// An empty identifier set returns [`InputError::EmptyIdSet`] without
    /// touching the store or the sink.
    pub async fn run(self, sink: &mut dyn RowSink) -> Result<ExportSummary> {
        if self.ids.is_empty() {
            return Err(InputError::EmptyIdSet.into());
        }

        let start = Instant::now();
        info!(
            "Starting identifier export: {} ids in {} batches of up to {}",
            self.ids.len(),
            self.ids.batch_count(self.batch_size),
            self.batch_size
        );

        let result = self.drive(sink).await;
        self.tracker.finish();

        let mut summary = result?;
        summary.elapsed = start.elapsed();
        info!(
            "Identifier export completed: {} rows ({} found, {} placeholders), {} files, {:.2} RU",
            summary.rows_written,
            summary.found,
            summary.placeholders,
            summary.shards.len(),
            summary.total_cost
        );
        Ok(summary)
    }

    async fn drive(&self, sink: &mut dyn RowSink) -> Result<ExportSummary> {
        let mut summary = ExportSummary::default();
        let mut emitted: HashSet<String> = HashSet::with_capacity(self.ids.len());
        let batch_total = self.ids.batch_count(self.batch_size);

        for (index, batch) in self.ids.batches(self.batch_size).enumerate() {
            let batch_no = index + 1;
            let mut found = self.fetch_batch(batch_no, batch, &mut summary).await?;

            let mut batch_found = 0u64;
            let mut batch_missing = 0u64;
            for id in batch {
                if !emitted.insert(id.clone()) {
                    debug!("Identifier {} already written, skipping", id);
                    continue;
                }

                let row = match found.remove(id) {
                    Some(row) => {
                        batch_found += 1;
                        row
                    }
                    None => {
                        batch_missing += 1;
                        self.projection.placeholder(id)
                    }
                };
                sink.emit(row.into_fields()).await?;
            }

            summary.found += batch_found;
            summary.placeholders += batch_missing;
            info!(
                "Batch {}/{}: {} found, {} placeholders",
                batch_no, batch_total, batch_found, batch_missing
            );
            self.tracker
                .update(sink.rows_emitted(), summary.pages, summary.total_cost);
        }

        sink.finalize().await?;

        summary.rows_written = sink.rows_emitted();
        summary.shards = sink.shards().to_vec();
        Ok(summary)
    }

    /// Pull every page for one batch into a reconciliation map
    async fn fetch_batch(
        &self,
        batch_no: usize,
        batch: &[String],
        summary: &mut ExportSummary,
    ) -> Result<ReconciliationMap> {
        let query = QuerySpec::for_ids(&self.query_text, batch);
        let mut pager =
            CostAwarePager::open(self.store, &query, &self.options, self.pacing).await?;
        if let Some(token) = &self.cancel_token {
            pager = pager.with_cancellation(token.clone());
        }

        let requested: HashSet<&str> = batch.iter().map(String::as_str).collect();
        let mut found = ReconciliationMap::with_capacity(batch.len());
        let mut page_no = 0u64;
        let mut total = 0u64;

        while let Some(page) = pager.next_page().await? {
            page_no += 1;
            total += page.len() as u64;
            info!(
                "Batch {} page {}: {} items (total {}), cost {:.2} RU",
                batch_no,
                page_no,
                page.len(),
                total,
                page.cost
            );

            for doc in &page.rows {
                let Some(row) = self.projection.project(doc) else {
                    summary.invalid_rows += 1;
                    warn!(
                        "Skipping document without '{}' in batch {}",
                        self.projection.id_field(),
                        batch_no
                    );
                    continue;
                };

                let key = fold_case(row.id().unwrap_or_default().trim());
                if !requested.contains(key.as_str()) {
                    debug!("Ignoring unrequested identifier {} in batch {}", key, batch_no);
                    continue;
                }
                if found.insert(key.clone(), row).is_some() {
                    debug!("Duplicate rows for {}, keeping the last one", key);
                }
            }
        }

        summary.record_pager(pager.stats());
        Ok(found)
    }
}
