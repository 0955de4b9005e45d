//! Runtime settings: YAML file, CLI overrides, validation.
//!
//! [`Settings`] is the loose, user-facing shape (every field optional in the
//! file). [`Settings::plan`] checks it once at startup and produces a
//! [`CrawlPlan`] of typed, validated values. Nothing downstream re-validates.

use crate::cli::Cli;
use crate::dates::{DateRange, Direction};
use crate::error::ConfigError;
use crate::fetch::TransportSettings;
use crate::models::ResumeCursor;
use chrono::NaiveDate;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, instrument};
use url::Url;

/// Granularity of sink writes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum BatchScope {
    /// All pagination pages of a date form one batch.
    #[default]
    Date,
    /// Each listing page is its own batch.
    Page,
}

/// User-facing settings, as read from YAML and the command line.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    pub outfile: PathBuf,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub direction: Direction,
    pub max_connections: usize,
    pub cpu_workers: Option<usize>,
    pub read_timeout_secs: u64,
    pub connect_timeout_secs: u64,
    pub fast_forward: bool,
    pub batch_scope: BatchScope,
    pub max_listing_pages: usize,
    pub user_agent: String,
    pub shutdown_grace_ms: u64,
    pub base_url: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            outfile: PathBuf::from("lenta-ru-news.csv"),
            start_date: None,
            end_date: None,
            direction: Direction::Ascending,
            max_connections: 64,
            cpu_workers: None,
            read_timeout_secs: 10,
            connect_timeout_secs: 10,
            fast_forward: true,
            batch_scope: BatchScope::Date,
            max_listing_pages: 50,
            user_agent: concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")).to_string(),
            shutdown_grace_ms: 250,
            base_url: None,
        }
    }
}

impl Settings {
    /// Read settings from a YAML file.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Read`] or [`ConfigError::Yaml`].
    #[instrument(level = "info", skip_all, fields(path = %path.display()))]
    pub async fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| ConfigError::Read {
                path: path.to_path_buf(),
                source,
            })?;
        let settings = Self::from_yaml(&text).map_err(|source| ConfigError::Yaml {
            path: path.to_path_buf(),
            source,
        })?;
        info!("Loaded settings file");
        Ok(settings)
    }

    pub fn from_yaml(text: &str) -> Result<Self, serde_yaml::Error> {
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(text)
    }

    /// Overlay options given on the command line.
    pub fn apply_cli(&mut self, cli: &Cli) {
        if let Some(outfile) = &cli.outfile {
            self.outfile = outfile.clone();
        }
        if cli.start_date.is_some() {
            self.start_date = cli.start_date;
        }
        if cli.end_date.is_some() {
            self.end_date = cli.end_date;
        }
        if let Some(direction) = cli.direction {
            self.direction = direction;
        }
        if let Some(n) = cli.max_connections {
            self.max_connections = n;
        }
        if cli.cpu_workers.is_some() {
            self.cpu_workers = cli.cpu_workers;
        }
        if let Some(secs) = cli.read_timeout_secs {
            self.read_timeout_secs = secs;
        }
        if let Some(secs) = cli.connect_timeout_secs {
            self.connect_timeout_secs = secs;
        }
        if cli.no_fast_forward {
            self.fast_forward = false;
        }
        if let Some(scope) = cli.batch_scope {
            self.batch_scope = scope;
        }
        if let Some(n) = cli.max_listing_pages {
            self.max_listing_pages = n;
        }
        if let Some(base) = &cli.base_url {
            self.base_url = Some(base.clone());
        }
        if let Some(agent) = &cli.user_agent {
            self.user_agent = agent.clone();
        }
        if let Some(ms) = cli.shutdown_grace_ms {
            self.shutdown_grace_ms = ms;
        }
    }

    /// Validate into a [`CrawlPlan`].
    ///
    /// `floor` is the source's oldest listing date, `today` the default end.
    pub fn plan(&self, floor: NaiveDate, today: NaiveDate) -> Result<CrawlPlan, ConfigError> {
        let start = self.start_date.unwrap_or(floor);
        let end = self.end_date.unwrap_or(today);
        // Reject a bad range before any I/O happens.
        DateRange::new(start, end, floor, self.direction)?;

        let nonzero = |value: usize, name: &'static str| {
            if value == 0 { Err(ConfigError::Zero(name)) } else { Ok(value) }
        };
        let max_connections = nonzero(self.max_connections, "max_connections")?;
        let cpu_workers = nonzero(
            self.cpu_workers.unwrap_or_else(default_cpu_workers),
            "cpu_workers",
        )?;
        let max_listing_pages = nonzero(self.max_listing_pages, "max_listing_pages")?;
        if self.read_timeout_secs == 0 {
            return Err(ConfigError::Zero("read_timeout_secs"));
        }
        if self.connect_timeout_secs == 0 {
            return Err(ConfigError::Zero("connect_timeout_secs"));
        }

        let base_url = self
            .base_url
            .as_deref()
            .map(|raw| {
                Url::parse(raw).map_err(|source| ConfigError::BaseUrl {
                    url: raw.to_string(),
                    source,
                })
            })
            .transpose()?;

        Ok(CrawlPlan {
            outfile: self.outfile.clone(),
            requested_start: start,
            end,
            floor,
            direction: self.direction,
            fast_forward: self.fast_forward,
            batch_scope: self.batch_scope,
            max_listing_pages,
            cpu_workers,
            transport: TransportSettings {
                connect_timeout: Duration::from_secs(self.connect_timeout_secs),
                read_timeout: Duration::from_secs(self.read_timeout_secs),
                max_connections,
                user_agent: self.user_agent.clone(),
            },
            shutdown_grace: Duration::from_millis(self.shutdown_grace_ms),
            base_url,
        })
    }
}

fn default_cpu_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

/// Validated inputs for one run.
#[derive(Debug, Clone)]
pub struct CrawlPlan {
    pub outfile: PathBuf,
    pub requested_start: NaiveDate,
    pub end: NaiveDate,
    pub floor: NaiveDate,
    pub direction: Direction,
    pub fast_forward: bool,
    pub batch_scope: BatchScope,
    pub max_listing_pages: usize,
    pub cpu_workers: usize,
    pub transport: TransportSettings,
    pub shutdown_grace: Duration,
    pub base_url: Option<Url>,
}

impl CrawlPlan {
    /// Resume cursor for this plan. Fast-forward only applies to an
    /// ascending walk; a countdown relies on the skip set alone.
    pub fn resume_cursor(&self, latest_persisted: Option<NaiveDate>) -> ResumeCursor {
        ResumeCursor {
            requested_start: self.requested_start,
            latest_persisted,
            fast_forward: self.fast_forward && self.direction == Direction::Ascending,
        }
    }

    /// Dates to walk, starting from the cursor's effective start.
    ///
    /// An effective start past the end bound is clamped to the end, so the
    /// last date is revisited rather than the run failing.
    pub fn date_range(&self, cursor: &ResumeCursor) -> Result<DateRange, ConfigError> {
        let start = cursor.effective_start().min(self.end);
        DateRange::new(start, self.end, self.floor, self.direction)
    }
}
