//! In-memory store and sink used by the export tests.

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use mongodb::bson::{Document, doc};
use tokio::time::Instant;

use crate::error::{FetchError, Result};

use super::query::QuerySpec;
use super::streaming::{Page, PageOptions, PageStream, QueryStore};
use super::writers::RowSink;

type Responder = Box<dyn Fn(&QuerySpec) -> Vec<Page> + Send + Sync>;

#[derive(Default)]
struct Shared {
    fetches: Vec<Instant>,
    closed: usize,
}

/// Store answering every query through a closure and recording what it saw
pub(crate) struct MockStore {
    responder: Responder,
    opened: Mutex<Vec<QuerySpec>>,
    shared: Arc<Mutex<Shared>>,
    fail_at_fetch: Option<usize>,
}

impl MockStore {
    pub(crate) fn new<F>(responder: F) -> Self
    where
        F: Fn(&QuerySpec) -> Vec<Page> + Send + Sync + 'static,
    {
        Self {
            responder: Box::new(responder),
            opened: Mutex::new(Vec::new()),
            shared: Arc::new(Mutex::new(Shared::default())),
            fail_at_fetch: None,
        }
    }

    /// Every query returns the same pages
    pub(crate) fn with_pages(pages: Vec<Page>) -> Self {
        Self::new(move |_| pages.clone())
    }

    /// The n-th fetch overall (0-based) fails
    pub(crate) fn failing_at_fetch(mut self, n: usize) -> Self {
        self.fail_at_fetch = Some(n);
        self
    }

    pub(crate) fn opened(&self) -> Vec<QuerySpec> {
        self.opened.lock().unwrap().clone()
    }

    pub(crate) fn fetch_times(&self) -> Vec<Instant> {
        self.shared.lock().unwrap().fetches.clone()
    }

    pub(crate) fn closed_streams(&self) -> usize {
        self.shared.lock().unwrap().closed
    }
}

#[async_trait]
impl QueryStore for MockStore {
    async fn open(&self, query: &QuerySpec, _options: &PageOptions) -> Result<Box<dyn PageStream>> {
        self.opened.lock().unwrap().push(query.clone());
        Ok(Box::new(MockStream {
            pages: (self.responder)(query).into(),
            shared: Arc::clone(&self.shared),
            fail_at_fetch: self.fail_at_fetch,
        }))
    }
}

struct MockStream {
    pages: VecDeque<Page>,
    shared: Arc<Mutex<Shared>>,
    fail_at_fetch: Option<usize>,
}

#[async_trait]
impl PageStream for MockStream {
    async fn next_page(&mut self) -> Result<Option<Page>> {
        let fetch_no = {
            let mut shared = self.shared.lock().unwrap();
            shared.fetches.push(Instant::now());
            shared.fetches.len() - 1
        };
        if self.fail_at_fetch == Some(fetch_no) {
            return Err(FetchError::Rejected("request rate too large".into()).into());
        }
        Ok(self.pages.pop_front())
    }

    async fn close(&mut self) -> Result<()> {
        self.shared.lock().unwrap().closed += 1;
        Ok(())
    }
}

/// Sink keeping rows in memory
#[derive(Default)]
pub(crate) struct MemorySink {
    pub(crate) rows: Vec<Vec<String>>,
    pub(crate) finalized: bool,
}

#[async_trait]
impl RowSink for MemorySink {
    async fn emit(&mut self, row: Vec<String>) -> Result<()> {
        self.rows.push(row);
        Ok(())
    }

    async fn finalize(&mut self) -> Result<()> {
        self.finalized = true;
        Ok(())
    }

    fn rows_emitted(&self) -> u64 {
        self.rows.len() as u64
    }

    fn shards(&self) -> &[PathBuf] {
        &[]
    }
}

/// Page of `n` filler documents with the given cost
pub(crate) fn page_with_cost(n: usize, cost: f64, has_more: bool) -> Page {
    let rows = (0..n).map(|i| doc! { "value": format!("v{i}") }).collect();
    Page::new(rows, cost, has_more)
}

/// Page of the given documents with zero cost
pub(crate) fn page_of(rows: Vec<Document>, has_more: bool) -> Page {
    Page::new(rows, 0.0, has_more)
}
