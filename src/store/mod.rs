//! Document store adapter
//!
//! Runs export queries against a MongoDB-wire-compatible database, such as a
//! Cosmos DB account exposing the MongoDB API. Each page is exactly one
//! `aggregate` or `getMore` round trip. After every round trip the adapter
//! asks the server for `getLastRequestStatistics` and uses `RequestCharge` as
//! the page cost. Servers that do not know that command report a cost of 0.

pub mod binding;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use mongodb::Database;
use mongodb::bson::{Bson, Document, doc};
use tracing::{debug, warn};

use crate::error::{ExportError, FetchError, Result};
use crate::export::{Page, PageOptions, PageStream, QuerySpec, QueryStore};

pub use binding::bind_pipeline;

/// Query store backed by one collection
pub struct MongoStore {
    db: Database,
    collection: String,
    /// Cleared once the server has shown it does not report request charges
    cost_probe: Arc<AtomicBool>,
}

impl MongoStore {
    pub fn new(db: Database, collection: impl Into<String>) -> Self {
        Self {
            db,
            collection: collection.into(),
            cost_probe: Arc::new(AtomicBool::new(true)),
        }
    }
}

#[async_trait]
impl QueryStore for MongoStore {
    async fn open(
        &self,
        query: &QuerySpec,
        options: &PageOptions,
    ) -> Result<Box<dyn PageStream>> {
        let pipeline = bind_pipeline(query)?;
        debug!(
            "Opening aggregate on {}.{} ({} stages, page size {}, parallelism hint {})",
            self.db.name(),
            self.collection,
            pipeline.len(),
            options.page_size,
            options.max_concurrency
        );

        Ok(Box::new(MongoPageStream {
            db: self.db.clone(),
            cursor: CursorCommands::new(self.collection.clone(), pipeline, options.page_size),
            cost_probe: Arc::clone(&self.cost_probe),
            finished: false,
        }))
    }
}

/// Command sequence for one server-side cursor
///
/// `aggregate` first, then `getMore` until the server reports cursor id 0.
#[derive(Debug, Clone)]
pub struct CursorCommands {
    collection: String,
    /// Pipeline not yet sent; `None` after the first round trip
    pending: Option<Vec<Document>>,
    cursor_id: Option<i64>,
    batch_size: i32,
}

impl CursorCommands {
    pub fn new(collection: String, pipeline: Vec<Document>, page_size: u32) -> Self {
        Self {
            collection,
            pending: Some(pipeline),
            cursor_id: None,
            batch_size: i32::try_from(page_size).unwrap_or(i32::MAX),
        }
    }

    /// Command for the next page; `None` once the cursor is exhausted
    pub fn next_command(&mut self) -> Option<Document> {
        if let Some(pipeline) = self.pending.take() {
            return Some(doc! {
                "aggregate": &self.collection,
                "pipeline": pipeline,
                "cursor": { "batchSize": self.batch_size },
            });
        }

        match self.cursor_id {
            Some(id) if id != 0 => Some(doc! {
                "getMore": id,
                "collection": &self.collection,
                "batchSize": self.batch_size,
            }),
            _ => None,
        }
    }

    /// Record the cursor id from the last reply
    pub fn advance(&mut self, cursor_id: i64) {
        self.cursor_id = Some(cursor_id);
    }

    /// `killCursors` for a cursor still open on the server; forgets the cursor
    pub fn kill_command(&mut self) -> Option<Document> {
        self.pending = None;
        let id = self.cursor_id.take().filter(|id| *id != 0)?;
        Some(doc! { "killCursors": &self.collection, "cursors": [id] })
    }
}

/// Server-side cursor driven one batch at a time
pub struct MongoPageStream {
    db: Database,
    cursor: CursorCommands,
    cost_probe: Arc<AtomicBool>,
    finished: bool,
}

impl MongoPageStream {
    /// Cost of the last command on this connection
    async fn request_charge(&self) -> f64 {
        if !self.cost_probe.load(Ordering::Relaxed) {
            return 0.0;
        }

        match self
            .db
            .run_command(doc! { "getLastRequestStatistics": 1 })
            .await
        {
            Ok(stats) => parse_request_charge(&stats).unwrap_or_else(|| {
                debug!("No RequestCharge in request statistics: {}", stats);
                0.0
            }),
            Err(e) => {
                if self.cost_probe.swap(false, Ordering::Relaxed) {
                    warn!(
                        "Server does not report request charges, pages are not paced: {}",
                        ExportError::from(e)
                    );
                }
                0.0
            }
        }
    }
}

#[async_trait]
impl PageStream for MongoPageStream {
    async fn next_page(&mut self) -> Result<Option<Page>> {
        if self.finished {
            return Ok(None);
        }

        let Some(command) = self.cursor.next_command() else {
            self.finished = true;
            return Ok(None);
        };

        let reply = match self.db.run_command(command).await {
            Ok(reply) => reply,
            Err(e) => {
                self.finished = true;
                return Err(e.into());
            }
        };

        let (rows, cursor_id) = match parse_cursor_reply(reply) {
            Ok(parsed) => parsed,
            Err(e) => {
                self.finished = true;
                return Err(e.into());
            }
        };

        let cost = self.request_charge().await;
        self.cursor.advance(cursor_id);
        if cursor_id == 0 {
            self.finished = true;
        }

        Ok(Some(Page::new(rows, cost, cursor_id != 0)))
    }

    async fn close(&mut self) -> Result<()> {
        self.finished = true;

        if let Some(command) = self.cursor.kill_command() {
            if let Err(e) = self.db.run_command(command).await {
                debug!("killCursors failed: {}", e);
            }
        }
        Ok(())
    }
}

/// Split an `aggregate` / `getMore` reply into its rows and the cursor id
pub fn parse_cursor_reply(
    mut reply: Document,
) -> std::result::Result<(Vec<Document>, i64), FetchError> {
    let mut cursor = match reply.remove("cursor") {
        Some(Bson::Document(cursor)) => cursor,
        _ => return Err(FetchError::MalformedResponse("reply has no cursor".into())),
    };

    let cursor_id = match cursor.get("id") {
        Some(Bson::Int64(id)) => *id,
        Some(Bson::Int32(id)) => i64::from(*id),
        _ => return Err(FetchError::MalformedResponse("cursor has no id".into())),
    };

    let batch = match cursor
        .remove("firstBatch")
        .or_else(|| cursor.remove("nextBatch"))
    {
        Some(Bson::Array(batch)) => batch,
        _ => return Err(FetchError::MalformedResponse("cursor has no batch".into())),
    };

    let rows = batch
        .into_iter()
        .map(|row| match row {
            Bson::Document(doc) => Ok(doc),
            other => Err(FetchError::MalformedResponse(format!(
                "expected a document row, found {other}"
            ))),
        })
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok((rows, cursor_id))
}

/// `RequestCharge` from a `getLastRequestStatistics` reply
pub fn parse_request_charge(stats: &Document) -> Option<f64> {
    match stats.get("RequestCharge")? {
        Bson::Double(charge) => Some(*charge),
        Bson::Int32(charge) => Some(f64::from(*charge)),
        Bson::Int64(charge) => Some(*charge as f64),
        _ => None,
    }
}
