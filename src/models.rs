//! Data models shared by the pipeline stages.
//!
//! - [`ExtractedArticle`]: what an extraction strategy pulls out of article HTML
//! - [`ArticleRecord`]: one persisted row, keyed by URL
//! - [`ArticleBatch`]: records from one listing pass, written as a unit
//! - [`FetchOutcome`]: per-URL fetch result
//! - [`ResumeCursor`]: decides where a rerun starts
//! - [`RunSummary`]: reported on every shutdown

use crate::error::{FailureKind, ParseError};
use chrono::NaiveDate;
use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;

/// Column order of the persisted store. Never reorder.
pub const CSV_HEADER: [&str; 6] = ["date", "url", "topic", "tags", "title", "text"];

/// Structured content of one article page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedArticle {
    pub title: Option<String>,
    pub body: String,
    pub topic: Option<String>,
    pub tags: Option<String>,
}

/// Links and pagination found on one listing page.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListingLinks {
    pub links: Vec<String>,
    pub next_page: Option<String>,
}

/// A single row of the archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArticleRecord {
    /// Unique key across the whole store.
    pub url: String,
    /// Listing date the article was discovered under.
    pub date: NaiveDate,
    pub title: Option<String>,
    /// Never empty once the record exists.
    pub body: String,
    pub topic: Option<String>,
    pub tags: Option<String>,
}

impl ArticleRecord {
    /// Build a record from extracted content, rejecting an empty body.
    pub fn new(url: String, date: NaiveDate, article: ExtractedArticle) -> Result<Self, ParseError> {
        if article.body.trim().is_empty() {
            return Err(ParseError::EmptyBody);
        }
        Ok(Self {
            url,
            date,
            title: article.title,
            body: article.body,
            topic: article.topic,
            tags: article.tags,
        })
    }

    /// Fields in [`CSV_HEADER`] order.
    pub fn to_row(&self) -> [String; 6] {
        [
            self.date.format("%Y-%m-%d").to_string(),
            self.url.clone(),
            self.topic.clone().unwrap_or_default(),
            self.tags.clone().unwrap_or_default(),
            self.title.clone().unwrap_or_default(),
            self.body.clone(),
        ]
    }
}

/// Result of fetching one URL. Exactly one of body or failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    Success(String),
    Failure { kind: FailureKind, detail: String },
}

/// Records gathered from one listing pass (a page, or a whole date).
///
/// A batch is appended to the sink in a single write or not at all.
#[derive(Debug, Clone)]
pub struct ArticleBatch {
    pub date: NaiveDate,
    records: Vec<ArticleRecord>,
    urls: HashSet<String>,
}

impl ArticleBatch {
    pub fn new(date: NaiveDate) -> Self {
        Self {
            date,
            records: Vec::new(),
            urls: HashSet::new(),
        }
    }

    /// Add a record; returns `false` if its URL is already in the batch.
    pub fn push(&mut self, record: ArticleRecord) -> bool {
        if !self.urls.insert(record.url.clone()) {
            return false;
        }
        self.records.push(record);
        true
    }

    /// Drop every record whose URL matches `known`; returns how many went.
    pub fn retain_unknown(&mut self, known: impl Fn(&str) -> bool) -> usize {
        let before = self.records.len();
        self.records.retain(|r| !known(&r.url));
        self.urls = self.records.iter().map(|r| r.url.clone()).collect();
        before - self.records.len()
    }

    pub fn records(&self) -> &[ArticleRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Latest persisted date plus the requested start date.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResumeCursor {
    pub requested_start: NaiveDate,
    pub latest_persisted: Option<NaiveDate>,
    pub fast_forward: bool,
}

impl ResumeCursor {
    /// The later of the requested start and the latest persisted date when
    /// fast-forward is on; otherwise the requested start.
    ///
    /// The latest persisted date itself is revisited because its coverage
    /// may be partial; the skip set keeps that revisit idempotent.
    pub fn effective_start(&self) -> NaiveDate {
        match self.latest_persisted {
            Some(latest) if self.fast_forward && latest > self.requested_start => latest,
            _ => self.requested_start,
        }
    }
}

/// End-of-run report.
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    pub destination: PathBuf,
    pub records_written: usize,
    pub dates_completed: Vec<NaiveDate>,
    pub links_discovered: usize,
    pub skipped_known: usize,
    pub fetch_failures: usize,
    pub parse_failures: usize,
    pub pagination_failures: usize,
    pub interrupted: bool,
    pub elapsed: Duration,
}
