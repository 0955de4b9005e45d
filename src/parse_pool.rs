//! CPU worker pool for HTML extraction.
//!
//! Parsing a page into a DOM is CPU-bound, so it never runs on the async
//! scheduler's threads. Each job is handed to tokio's blocking pool, and a
//! semaphore fixes how many of them run at once, independently of how many
//! requests are in flight.
//!
//! A job owns its permit for as long as it runs, even if the future awaiting
//! it is dropped on cancellation. [`ParserPool::join`] therefore waits for
//! every started job to finish.

use crate::error::ParseError;
use crate::models::{ExtractedArticle, ListingLinks};
use crate::scrapers::ExtractionStrategy;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{debug, instrument};

/// Fixed-size pool running an [`ExtractionStrategy`] off the I/O threads.
#[derive(Debug)]
pub struct ParserPool<S> {
    strategy: Arc<S>,
    permits: Arc<Semaphore>,
    workers: usize,
}

impl<S: ExtractionStrategy> ParserPool<S> {
    pub fn new(strategy: Arc<S>, workers: usize) -> Self {
        Self {
            strategy,
            permits: Arc::new(Semaphore::new(workers)),
            workers,
        }
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Run `job` against the strategy on a worker.
    async fn submit<R, F>(&self, job: F) -> Result<R, ParseError>
    where
        R: Send + 'static,
        F: FnOnce(&S) -> R + Send + 'static,
    {
        let permit = Arc::clone(&self.permits)
            .acquire_owned()
            .await
            .map_err(|_| ParseError::PoolClosed)?;
        let strategy = Arc::clone(&self.strategy);

        tokio::task::spawn_blocking(move || {
            let _permit = permit;
            job(&strategy)
        })
        .await
        .map_err(|e| ParseError::Worker(e.to_string()))
    }

    /// Extract one article.
    #[instrument(level = "debug", skip_all, fields(bytes = html.len()))]
    pub async fn parse(&self, html: String) -> Result<ExtractedArticle, ParseError> {
        self.submit(move |s| s.extract_article(&html)).await?
    }

    /// Extract article links and the next-page link from a listing page.
    #[instrument(level = "debug", skip_all, fields(bytes = html.len()))]
    pub async fn extract_listing(&self, html: String) -> Result<ListingLinks, ParseError> {
        self.submit(move |s| ListingLinks {
            links: s.extract_links(&html),
            next_page: s.extract_next_page(&html),
        })
        .await
    }

    /// Wait for every running job, then refuse new ones.
    pub async fn join(&self) {
        // acquire_many only fails once the semaphore is closed, which means
        // an earlier join already drained it.
        if let Ok(all) = self.permits.acquire_many(self.workers as u32).await {
            all.forget();
        }
        self.permits.close();
        debug!(workers = self.workers, "Parser pool joined");
    }
}
