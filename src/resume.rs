//! Dedup and resume state rebuilt from prior output.
//!
//! On startup the existing CSV store (if any) is streamed exactly once to
//! build:
//!
//! - the [`SkipSet`] of URLs already persisted
//! - the latest persisted date, which feeds the
//!   [`ResumeCursor`](crate::models::ResumeCursor)
//!
//! Columns are located by header name, so stores written with a different
//! column order (or without a `date` column at all) still seed the skip set.
//! Nothing here is fatal: an unreadable store degrades to a fresh start with
//! a warning.

use crate::error::ResumeError;
use chrono::NaiveDate;
use std::collections::HashSet;
use std::fs::File;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use tracing::{debug, info, instrument, warn};

/// Date formats accepted in the `date` column, current first.
const DATE_FORMATS: [&str; 2] = ["%Y-%m-%d", "%Y/%m/%d"];

/// URLs already durably stored. Grows during a run, never shrinks.
#[derive(Debug, Default, Clone)]
pub struct SkipSet {
    urls: HashSet<String>,
}

impl SkipSet {
    pub fn is_known(&self, url: &str) -> bool {
        self.urls.contains(url)
    }

    /// Mark `url` as persisted; returns `false` if it already was.
    pub fn record(&mut self, url: impl Into<String>) -> bool {
        self.urls.insert(url.into())
    }

    pub fn len(&self) -> usize {
        self.urls.len()
    }
}

/// Everything learned from prior output.
#[derive(Debug, Default)]
pub struct ResumeState {
    pub skip: SkipSet,
    pub latest_date: Option<NaiveDate>,
    /// Data rows read (header excluded).
    pub rows: usize,
    /// Rows that could not be decoded or carried no usable URL.
    pub bad_rows: usize,
    /// Rows repeating a URL seen earlier in the file.
    pub duplicate_rows: usize,
}

/// Scan `path` if it exists. Never fails; problems are logged and yield an
/// empty state.
#[instrument(level = "info", skip_all, fields(path = %path.display()))]
pub async fn load(path: &Path) -> ResumeState {
    match tokio::fs::metadata(path).await {
        Ok(_) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            info!("No prior output; starting fresh");
            return ResumeState::default();
        }
        Err(e) => {
            let err = ResumeError::Io {
                path: path.to_path_buf(),
                source: e,
            };
            warn!(error = %err, "Prior output is not accessible; starting fresh");
            return ResumeState::default();
        }
    }

    let owned: PathBuf = path.to_path_buf();
    let scanned = tokio::task::spawn_blocking(move || scan_file(&owned))
        .await
        .map_err(|e| ResumeError::Task(e.to_string()))
        .and_then(|r| r);

    match scanned {
        Ok(state) => {
            info!(
                known_urls = state.skip.len(),
                rows = state.rows,
                bad_rows = state.bad_rows,
                duplicate_rows = state.duplicate_rows,
                latest_date = ?state.latest_date,
                "Loaded prior output"
            );
            state
        }
        Err(e) => {
            warn!(error = %e, "Prior output is unreadable; starting fresh");
            ResumeState::default()
        }
    }
}

fn scan_file(path: &Path) -> Result<ResumeState, ResumeError> {
    let file = File::open(path).map_err(|source| ResumeError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    scan(file).map_err(|source| ResumeError::Csv {
        path: path.to_path_buf(),
        source,
    })
}

/// Stream CSV from `reader` into a [`ResumeState`].
///
/// Empty and header-only inputs are valid and produce an empty state.
/// Malformed rows are counted and skipped; an I/O error aborts the scan.
pub fn scan<R: Read>(reader: R) -> Result<ResumeState, csv::Error> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(reader);

    let headers = rdr.headers()?.clone();
    let mut state = ResumeState::default();
    if headers.is_empty() {
        return Ok(state);
    }

    let column = |name: &str| headers.iter().position(|h| h.trim() == name);
    let Some(url_col) = column("url") else {
        warn!(headers = ?headers, "Prior output has no `url` column; nothing to skip");
        return Ok(state);
    };
    let date_col = column("date");

    for result in rdr.records() {
        let record = match result {
            Ok(r) => r,
            Err(e) if matches!(e.kind(), csv::ErrorKind::Io(_)) => return Err(e),
            Err(e) => {
                debug!(error = %e, "Skipping malformed row");
                state.bad_rows += 1;
                continue;
            }
        };
        state.rows += 1;

        match record.get(url_col).map(str::trim).filter(|u| !u.is_empty()) {
            Some(url) => {
                if !state.skip.record(url) {
                    state.duplicate_rows += 1;
                }
            }
            None => {
                state.bad_rows += 1;
                continue;
            }
        }

        if let Some(date) = date_col.and_then(|i| record.get(i)).and_then(parse_date) {
            state.latest_date = state.latest_date.max(Some(date));
        }
    }

    Ok(state)
}

fn parse_date(s: &str) -> Option<NaiveDate> {
    let s = s.trim();
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(s, fmt).ok())
}
