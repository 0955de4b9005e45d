//! Error taxonomy for the archive pipeline.
//!
//! Failures are split by how far they are allowed to travel:
//!
//! | Error | Scope | Effect |
//! |-------|-------|--------|
//! | [`TransportError`] / [`FailureKind`] | one URL | URL dropped from its batch |
//! | [`ParseError`] | one article | article dropped from its batch |
//! | [`PaginationError`] | one date | pagination for that date ends |
//! | [`ResumeError`] | startup | warning, fresh-start fallback |
//! | [`StorageError`] | run | fatal, run aborts after a clean shutdown |
//! | [`ConfigError`] | startup | fatal before any network traffic |

use chrono::NaiveDate;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Tag describing why a single fetch did not produce a page body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// The server answered with a non-2xx status (redirects included).
    Status(u16),
    /// Connect or read timeout elapsed.
    Timeout,
    /// The connection could not be established.
    Connect,
    /// The response body could not be read or decoded.
    Body,
    /// The fetcher was shut down before the request could start.
    Closed,
    /// Anything else the transport reported.
    Other,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureKind::Status(code) => write!(f, "http status {code}"),
            FailureKind::Timeout => f.write_str("timeout"),
            FailureKind::Connect => f.write_str("connection error"),
            FailureKind::Body => f.write_str("unreadable body"),
            FailureKind::Closed => f.write_str("fetcher closed"),
            FailureKind::Other => f.write_str("request error"),
        }
    }
}

/// Error returned by an [`HttpTransport`](crate::fetch::HttpTransport).
#[derive(Debug, Clone, Error)]
#[error("{kind}: {detail}")]
pub struct TransportError {
    pub kind: FailureKind,
    pub detail: String,
}

impl TransportError {
    pub fn new(kind: FailureKind, detail: impl Into<String>) -> Self {
        Self {
            kind,
            detail: detail.into(),
        }
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(e: reqwest::Error) -> Self {
        let kind = if e.is_timeout() {
            FailureKind::Timeout
        } else if e.is_connect() {
            FailureKind::Connect
        } else if e.is_body() || e.is_decode() {
            FailureKind::Body
        } else if let Some(status) = e.status() {
            FailureKind::Status(status.as_u16())
        } else {
            FailureKind::Other
        };
        Self::new(kind, e.to_string())
    }
}

/// Raised when article HTML cannot be turned into a record.
///
/// Optional fields never produce this error; only the absence of the
/// content that makes a record worth keeping does.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("required element `{0}` not found")]
    MissingContainer(&'static str),
    #[error("article body is empty")]
    EmptyBody,
    #[error("parser pool is shut down")]
    PoolClosed,
    #[error("parser worker failed: {0}")]
    Worker(String),
}

/// A next-page fetch failed; pagination for `date` stops at `url`.
#[derive(Debug, Clone, Error)]
#[error("pagination for {date} stopped at {url}: {kind}: {detail}")]
pub struct PaginationError {
    pub date: NaiveDate,
    pub url: String,
    pub kind: FailureKind,
    pub detail: String,
}

/// The record sink could not be opened or appended to.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("i/o error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("csv encoding error on {path}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
    #[error("{path} has no `url` column (header: {found}); refusing to append")]
    Header { path: PathBuf, found: String },
}

/// Prior output exists but could not be scanned.
#[derive(Debug, Error)]
pub enum ResumeError {
    #[error("cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("cannot decode {path}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
    #[error("resume scan task failed: {0}")]
    Task(String),
}

/// Invalid settings, detected before the crawl starts.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config file {path}: {source}")]
    Yaml {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("start date {start} is after end date {end}")]
    InvertedRange { start: NaiveDate, end: NaiveDate },
    #[error("date {date} is before the archive floor {floor}")]
    BeforeFloor { date: NaiveDate, floor: NaiveDate },
    #[error("`{0}` must be greater than zero")]
    Zero(&'static str),
    #[error("invalid base url {url:?}: {source}")]
    BaseUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },
}

/// Errors that end a crawl run.
#[derive(Debug, Error)]
pub enum CrawlError {
    #[error(transparent)]
    Storage(#[from] StorageError),
}
