//! Paged query abstractions
//!
//! The store is reached through two small traits: a [`QueryStore`] turns a
//! [`QuerySpec`] into a [`PageStream`], and the stream hands out one [`Page`]
//! per round trip until the result set is exhausted. Each page carries the
//! cost the store reported for producing it.

use async_trait::async_trait;
use mongodb::bson::Document;

use crate::error::Result;

use super::query::QuerySpec;

/// One fetch result.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Page {
    /// Rows in the order the store returned them
    pub rows: Vec<Document>,
    /// Cost the store charged for this page (request units)
    pub cost: f64,
    /// Whether the store signalled more pages after this one
    pub has_more: bool,
}

impl Page {
    pub fn new(rows: Vec<Document>, cost: f64, has_more: bool) -> Self {
        Self {
            rows,
            cost,
            has_more,
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Hints passed to the store when a query is opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageOptions {
    /// Rows requested per page
    pub page_size: u32,
    /// Degree of parallelism the store may use to produce a page
    pub max_concurrency: u32,
}

impl Default for PageOptions {
    fn default() -> Self {
        Self {
            page_size: 1000,
            max_concurrency: 1,
        }
    }
}

/// A sequence of pages for one query
#[async_trait]
pub trait PageStream: Send {
    /// Fetch the next page
    ///
    /// # Returns
    /// * `Result<Option<Page>>` - Next page, or None once the query is exhausted
    async fn next_page(&mut self) -> Result<Option<Page>>;

    /// Release server-side resources held by the query
    async fn close(&mut self) -> Result<()>;
}

/// Something that can run paged queries
#[async_trait]
pub trait QueryStore: Send + Sync {
    /// Start a fresh page sequence for `query`
    async fn open(&self, query: &QuerySpec, options: &PageOptions)
    -> Result<Box<dyn PageStream>>;
}
