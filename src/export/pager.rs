//! Cost-aware paging
//!
//! [`CostAwarePager`] pulls pages from a [`PageStream`] one at a time. When a
//! page costs more than the configured threshold it waits a fixed delay
//! before handing the page back, so the next fetch can only start after the
//! pause. Fetch failures are returned as-is; nothing is retried here.

use std::time::Duration;

use futures::stream::{self, Stream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::error::{ExportError, Result};

use super::query::QuerySpec;
use super::streaming::{Page, PageOptions, PageStream, QueryStore};

/// Threshold and delay used to pace page fetches.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PacingPolicy {
    threshold: f64,
    delay: Duration,
}

impl PacingPolicy {
    pub fn new(threshold: f64, delay: Duration) -> Self {
        Self { threshold, delay }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Strictly above the threshold; a page costing exactly the threshold is not paced.
    pub fn should_pause(&self, cost: f64) -> bool {
        cost > self.threshold
    }
}

/// Counters for one page sequence
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PagerStats {
    pub pages: u64,
    pub rows: u64,
    pub total_cost: f64,
    pub pauses: u64,
}

/// Lazy page sequence with pacing
pub struct CostAwarePager {
    stream: Box<dyn PageStream>,
    policy: PacingPolicy,
    stats: PagerStats,
    exhausted: bool,
    cancel_token: Option<CancellationToken>,
}

impl CostAwarePager {
    /// Wrap an already opened stream
    pub fn new(stream: Box<dyn PageStream>, policy: PacingPolicy) -> Self {
        Self {
            stream,
            policy,
            stats: PagerStats::default(),
            exhausted: false,
            cancel_token: None,
        }
    }

    /// Open `query` on `store` and start a fresh sequence
    pub async fn open(
        store: &dyn QueryStore,
        query: &QuerySpec,
        options: &PageOptions,
        policy: PacingPolicy,
    ) -> Result<Self> {
        let stream = store.open(query, options).await?;
        Ok(Self::new(stream, policy))
    }

    /// Abort the sequence once `token` fires, including mid-fetch and mid-pause
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel_token = Some(token);
        self
    }

    pub fn stats(&self) -> PagerStats {
        self.stats
    }

    /// Fetch the next page, pausing afterwards if it was too expensive
    ///
    /// # Returns
    /// * `Result<Option<Page>>` - Next page, or None once exhausted
    pub async fn next_page(&mut self) -> Result<Option<Page>> {
        if self.exhausted {
            return Ok(None);
        }

        if self.is_cancelled() {
            self.shutdown().await;
            return Err(ExportError::Cancelled);
        }

        let fetched = match self.cancel_token.clone() {
            Some(token) => tokio::select! {
                result = self.stream.next_page() => Some(result),
                _ = token.cancelled() => None,
            },
            None => Some(self.stream.next_page().await),
        };
        let Some(fetched) = fetched else {
            debug!("Cancelled during page fetch {}", self.stats.pages + 1);
            self.shutdown().await;
            return Err(ExportError::Cancelled);
        };

        let page = match fetched {
            Ok(Some(page)) => page,
            Ok(None) => {
                debug!("Page sequence exhausted after {} pages", self.stats.pages);
                self.shutdown().await;
                return Ok(None);
            }
            Err(e) => {
                self.shutdown().await;
                return Err(e);
            }
        };

        self.stats.pages += 1;
        self.stats.rows += page.len() as u64;
        self.stats.total_cost += page.cost;

        if self.policy.should_pause(page.cost) {
            self.stats.pauses += 1;
            info!(
                "Page {} cost {:.2} RU exceeds threshold {:.2}, pausing {} ms",
                self.stats.pages,
                page.cost,
                self.policy.threshold,
                self.policy.delay.as_millis()
            );
            self.pause().await?;
        }

        Ok(Some(page))
    }

    async fn pause(&mut self) -> Result<()> {
        match self.cancel_token.clone() {
            Some(token) => {
                tokio::select! {
                    _ = tokio::time::sleep(self.policy.delay) => Ok(()),
                    _ = token.cancelled() => {
                        self.shutdown().await;
                        Err(ExportError::Cancelled)
                    }
                }
            }
            None => {
                tokio::time::sleep(self.policy.delay).await;
                Ok(())
            }
        }
    }

    /// Consume the pager as a [`Stream`] of pages; ends after the first error
    pub fn into_stream(self) -> impl Stream<Item = Result<Page>> + Send {
        stream::unfold(Some(self), |state| async move {
            let mut pager = state?;
            match pager.next_page().await {
                Ok(Some(page)) => Some((Ok(page), Some(pager))),
                Ok(None) => None,
                Err(e) => Some((Err(e), None)),
            }
        })
    }

    fn is_cancelled(&self) -> bool {
        self.cancel_token
            .as_ref()
            .is_some_and(CancellationToken::is_cancelled)
    }

    async fn shutdown(&mut self) {
        if self.exhausted {
            return;
        }
        self.exhausted = true;
        if let Err(e) = self.stream.close().await {
            debug!("Ignoring error while closing page stream: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::export::testing::{MockStore, page_with_cost};
    use async_trait::async_trait;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Stream whose fetches never complete
    struct StalledStream {
        closed: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl PageStream for StalledStream {
        async fn next_page(&mut self) -> Result<Option<Page>> {
            std::future::pending().await
        }

        async fn close(&mut self) -> Result<()> {
            self.closed.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn cancel_after(token: &CancellationToken, after: Duration) {
        let token = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(after).await;
            token.cancel();
        });
    }

    const DELAY: Duration = Duration::from_millis(500);

    async fn drain(pager: &mut CostAwarePager) -> Vec<Page> {
        let mut pages = Vec::new();
        while let Some(page) = pager.next_page().await.unwrap() {
            pages.push(page);
        }
        pages
    }

    #[test]
    fn test_threshold_is_strict() {
        let policy = PacingPolicy::new(1000.0, DELAY);
        assert!(!policy.should_pause(999.9));
        assert!(!policy.should_pause(1000.0));
        assert!(policy.should_pause(1000.01));
    }

    #[tokio::test(start_paused = true)]
    async fn test_pause_only_after_expensive_page() {
        let store = MockStore::with_pages(vec![
            page_with_cost(2, 500.0, true),
            page_with_cost(2, 1200.0, true),
            page_with_cost(1, 300.0, false),
        ]);
        let policy = PacingPolicy::new(1000.0, DELAY);
        let mut pager =
            CostAwarePager::open(&store, &QuerySpec::new("[]"), &PageOptions::default(), policy)
                .await
                .unwrap();

        let pages = drain(&mut pager).await;
        assert_eq!(pages.len(), 3);

        let fetches = store.fetch_times();
        // Three pages plus the exhausting call.
        assert_eq!(fetches.len(), 4);
        assert_eq!(fetches[1] - fetches[0], Duration::ZERO);
        assert!(fetches[2] - fetches[1] >= DELAY);
        assert_eq!(fetches[3] - fetches[2], Duration::ZERO);

        let stats = pager.stats();
        assert_eq!(stats.pages, 3);
        assert_eq!(stats.rows, 5);
        assert_eq!(stats.pauses, 1);
        assert_eq!(stats.total_cost, 2000.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cost_equal_to_threshold_does_not_pause() {
        let store = MockStore::with_pages(vec![
            page_with_cost(1, 1000.0, true),
            page_with_cost(1, 1000.0, false),
        ]);
        let policy = PacingPolicy::new(1000.0, DELAY);
        let mut pager =
            CostAwarePager::open(&store, &QuerySpec::new("[]"), &PageOptions::default(), policy)
                .await
                .unwrap();

        drain(&mut pager).await;
        let fetches = store.fetch_times();
        assert!(fetches.windows(2).all(|w| w[1] == w[0]));
        assert_eq!(pager.stats().pauses, 0);
    }

    #[tokio::test]
    async fn test_empty_result_is_empty_sequence() {
        let store = MockStore::with_pages(Vec::new());
        let mut pager = CostAwarePager::open(
            &store,
            &QuerySpec::new("[]"),
            &PageOptions::default(),
            PacingPolicy::new(0.0, DELAY),
        )
        .await
        .unwrap();

        assert!(pager.next_page().await.unwrap().is_none());
        // Exhausted sequences stay exhausted without touching the store again.
        assert!(pager.next_page().await.unwrap().is_none());
        assert_eq!(store.fetch_times().len(), 1);
        assert_eq!(store.closed_streams(), 1);
    }

    #[tokio::test]
    async fn test_fetch_error_propagates_without_retry() {
        let store = MockStore::with_pages(vec![
            page_with_cost(1, 1.0, true),
            page_with_cost(1, 1.0, false),
        ])
        .failing_at_fetch(1);
        let mut pager = CostAwarePager::open(
            &store,
            &QuerySpec::new("[]"),
            &PageOptions::default(),
            PacingPolicy::new(1000.0, DELAY),
        )
        .await
        .unwrap();

        assert!(pager.next_page().await.unwrap().is_some());
        let err = pager.next_page().await.unwrap_err();
        assert!(matches!(err, ExportError::Fetch(_)));
        assert_eq!(store.fetch_times().len(), 2);
        assert!(pager.next_page().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_cancelled_before_fetch() {
        let store = MockStore::with_pages(vec![page_with_cost(1, 1.0, false)]);
        let token = CancellationToken::new();
        let mut pager = CostAwarePager::open(
            &store,
            &QuerySpec::new("[]"),
            &PageOptions::default(),
            PacingPolicy::new(1000.0, DELAY),
        )
        .await
        .unwrap()
        .with_cancellation(token.clone());

        token.cancel();
        assert!(matches!(pager.next_page().await, Err(ExportError::Cancelled)));
        assert!(store.fetch_times().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stream_yields_pages_in_fetch_order() {
        use futures::StreamExt;

        let store = MockStore::with_pages(vec![
            page_with_cost(2, 1500.0, true),
            page_with_cost(1, 10.0, false),
        ]);
        let pager = CostAwarePager::open(
            &store,
            &QuerySpec::new("[]"),
            &PageOptions::default(),
            PacingPolicy::new(1000.0, DELAY),
        )
        .await
        .unwrap();

        let pages: Vec<Page> = pager
            .into_stream()
            .map(|page| page.unwrap())
            .collect()
            .await;
        assert_eq!(pages.iter().map(Page::len).collect::<Vec<_>>(), vec![2, 1]);

        let fetches = store.fetch_times();
        assert!(fetches[1] - fetches[0] >= DELAY);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_interrupts_stalled_fetch() {
        let closed = Arc::new(AtomicUsize::new(0));
        let stream = StalledStream {
            closed: Arc::clone(&closed),
        };
        let token = CancellationToken::new();
        let mut pager = CostAwarePager::new(Box::new(stream), PacingPolicy::new(1000.0, DELAY))
            .with_cancellation(token.clone());

        cancel_after(&token, Duration::from_millis(50));
        let result = tokio::time::timeout(Duration::from_secs(2), pager.next_page())
            .await
            .expect("fetch was not interrupted");

        assert!(matches!(result, Err(ExportError::Cancelled)));
        assert_eq!(closed.load(Ordering::SeqCst), 1);
        assert!(pager.next_page().await.unwrap().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_during_pause() {
        let store = MockStore::with_pages(vec![
            page_with_cost(1, 1500.0, true),
            page_with_cost(1, 10.0, false),
        ]);
        let token = CancellationToken::new();
        let mut pager = CostAwarePager::open(
            &store,
            &QuerySpec::new("[]"),
            &PageOptions::default(),
            PacingPolicy::new(1000.0, DELAY),
        )
        .await
        .unwrap()
        .with_cancellation(token.clone());

        let started = tokio::time::Instant::now();
        cancel_after(&token, DELAY / 5);
        assert!(matches!(pager.next_page().await, Err(ExportError::Cancelled)));

        assert!(started.elapsed() < DELAY);
        assert_eq!(store.fetch_times().len(), 1);
        assert_eq!(store.closed_streams(), 1);
        assert_eq!(pager.stats().pauses, 1);
    }
}
