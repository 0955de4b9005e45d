//! Listing pages and pagination for one date.
//!
//! A [`ListingCursor`] walks a date's listing: the first page, then every
//! "next page" link the strategy reports, until one of:
//!
//! - the page has no next-page link
//! - a next-page fetch fails ([`PaginationError`], logged)
//! - the next-page link points at a page already visited for this date
//! - the per-date page cap is reached
//!
//! A failing *first* page means the date simply has zero links.

use crate::error::{FailureKind, PaginationError};
use crate::fetch::{ArticleFetcher, HttpTransport};
use crate::models::FetchOutcome;
use crate::parse_pool::ParserPool;
use crate::scrapers::ExtractionStrategy;
use chrono::NaiveDate;
use std::collections::HashSet;
use tracing::{info, instrument, warn};

/// One fetched listing page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingPage {
    pub url: String,
    /// 1-based position within the date's pagination.
    pub number: usize,
    pub links: Vec<String>,
    pub has_more: bool,
}

/// Pagination state for a single date.
#[derive(Debug)]
pub struct ListingCursor {
    date: NaiveDate,
    next: Option<String>,
    visited: HashSet<String>,
    fetched: usize,
    max_pages: usize,
    failure: Option<PaginationError>,
}

impl ListingCursor {
    pub fn new(date: NaiveDate, first_url: String, max_pages: usize) -> Self {
        Self {
            date,
            next: Some(first_url),
            visited: HashSet::new(),
            fetched: 0,
            max_pages,
            failure: None,
        }
    }

    /// Number of pages fetched successfully so far.
    pub fn pages_fetched(&self) -> usize {
        self.fetched
    }

    /// The error that ended pagination early, if any.
    pub fn failure(&self) -> Option<&PaginationError> {
        self.failure.as_ref()
    }

    /// Fetch and extract the next listing page, or `None` when done.
    #[instrument(level = "info", skip_all, fields(date = %self.date, page = self.fetched + 1))]
    pub async fn next_page<T, S>(
        &mut self,
        fetcher: &ArticleFetcher<T>,
        pool: &ParserPool<S>,
    ) -> Option<ListingPage>
    where
        T: HttpTransport,
        S: ExtractionStrategy,
    {
        let url = self.next.take()?;

        if self.fetched >= self.max_pages {
            warn!(%url, max_pages = self.max_pages, "Listing page cap reached; ending pagination");
            return None;
        }
        if !self.visited.insert(url.clone()) {
            warn!(%url, "Listing links back to a visited page; ending pagination");
            return None;
        }

        let html = match fetcher.fetch(&url).await {
            FetchOutcome::Success(html) => html,
            FetchOutcome::Failure { kind, detail } => {
                self.record_failure(url, kind, detail);
                return None;
            }
        };

        let extracted = match pool.extract_listing(html).await {
            Ok(extracted) => extracted,
            Err(e) => {
                self.record_failure(url, FailureKind::Other, e.to_string());
                return None;
            }
        };

        self.fetched += 1;
        self.next = extracted.next_page;
        let page = ListingPage {
            url,
            number: self.fetched,
            links: extracted.links,
            has_more: self.next.is_some(),
        };
        info!(
            url = %page.url,
            number = page.number,
            links = page.links.len(),
            has_more = page.has_more,
            "Fetched listing page"
        );
        Some(page)
    }

    fn record_failure(&mut self, url: String, kind: FailureKind, detail: String) {
        if self.fetched == 0 {
            warn!(date = %self.date, %url, %kind, %detail, "Listing fetch failed; no links for this date");
            return;
        }
        let err = PaginationError {
            date: self.date,
            url,
            kind,
            detail,
        };
        warn!(error = %err, "Pagination ended early");
        self.failure = Some(err);
    }
}
