//! Command-line interface definitions for News Archive.
//!
//! This module defines the CLI arguments and options using the `clap` crate.
//! Every option can also come from the YAML settings file passed with
//! `--config`; flags given on the command line win.

use crate::config::BatchScope;
use crate::dates::Direction;
use chrono::NaiveDate;
use clap::Parser;
use std::path::PathBuf;

/// Command-line arguments for the News Archive application.
///
/// # Examples
///
/// ```sh
/// # Walk the whole Lenta archive forward, resuming from an existing file
/// news_archive --outfile lenta-ru-news.csv
///
/// # Count down from today to 2010-01-01 with 8 parser workers
/// news_archive --direction countdown --start-date 2010-01-01 --cpu-workers 8
///
/// # Read the remaining options from a settings file
/// news_archive -c archive.yaml
/// ```
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// Optional path to a YAML settings file
    #[arg(short, long, env = "NEWS_ARCHIVE_CONFIG")]
    pub config: Option<PathBuf>,

    /// CSV file to create or resume
    #[arg(short, long, env = "NEWS_ARCHIVE_OUTFILE")]
    pub outfile: Option<PathBuf>,

    /// First listing date (YYYY-MM-DD); defaults to the archive floor
    #[arg(long, env = "NEWS_ARCHIVE_START_DATE")]
    pub start_date: Option<NaiveDate>,

    /// Last listing date (YYYY-MM-DD); defaults to today
    #[arg(long, env = "NEWS_ARCHIVE_END_DATE")]
    pub end_date: Option<NaiveDate>,

    /// Walk dates oldest-first or count down from the end date
    #[arg(long, value_enum, env = "NEWS_ARCHIVE_DIRECTION")]
    pub direction: Option<Direction>,

    /// Maximum simultaneous HTTP requests
    #[arg(long, env = "NEWS_ARCHIVE_MAX_CONNECTIONS")]
    pub max_connections: Option<usize>,

    /// Number of CPU workers for HTML parsing
    #[arg(long, env = "NEWS_ARCHIVE_CPU_WORKERS")]
    pub cpu_workers: Option<usize>,

    /// Read timeout per request, in seconds
    #[arg(long, env = "NEWS_ARCHIVE_READ_TIMEOUT_SECS")]
    pub read_timeout_secs: Option<u64>,

    /// Connect timeout per request, in seconds
    #[arg(long, env = "NEWS_ARCHIVE_CONNECT_TIMEOUT_SECS")]
    pub connect_timeout_secs: Option<u64>,

    /// Do not skip ahead to the latest date already in the output
    #[arg(long)]
    pub no_fast_forward: bool,

    /// Write one batch per listing page or per date
    #[arg(long, value_enum, env = "NEWS_ARCHIVE_BATCH_SCOPE")]
    pub batch_scope: Option<BatchScope>,

    /// Stop paginating a date after this many listing pages
    #[arg(long, env = "NEWS_ARCHIVE_MAX_LISTING_PAGES")]
    pub max_listing_pages: Option<usize>,

    /// Alternate origin for the source (mirrors, local fixtures)
    #[arg(long, env = "NEWS_ARCHIVE_BASE_URL")]
    pub base_url: Option<String>,

    /// User-Agent header sent with every request
    #[arg(long, env = "NEWS_ARCHIVE_USER_AGENT")]
    pub user_agent: Option<String>,

    /// Pause after closing connections before the output is closed, in milliseconds
    #[arg(long, env = "NEWS_ARCHIVE_SHUTDOWN_GRACE_MS")]
    pub shutdown_grace_ms: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_defaults_are_unset() {
        let cli = Cli::parse_from(["news_archive"]);
        assert!(cli.outfile.is_none());
        assert!(cli.start_date.is_none());
        assert!(!cli.no_fast_forward);
    }

    #[test]
    fn test_cli_parsing() {
        let cli = Cli::parse_from([
            "news_archive",
            "--outfile",
            "./out.csv",
            "--start-date",
            "2001-02-03",
            "--direction",
            "countdown",
            "--cpu-workers",
            "3",
            "--batch-scope",
            "page",
            "--no-fast-forward",
            "--user-agent",
            "archiver/2.0",
            "--shutdown-grace-ms",
            "0",
        ]);

        assert_eq!(cli.outfile, Some(PathBuf::from("./out.csv")));
        assert_eq!(cli.start_date, NaiveDate::from_ymd_opt(2001, 2, 3));
        assert_eq!(cli.direction, Some(Direction::Countdown));
        assert_eq!(cli.cpu_workers, Some(3));
        assert_eq!(cli.batch_scope, Some(BatchScope::Page));
        assert!(cli.no_fast_forward);
        assert_eq!(cli.user_agent.as_deref(), Some("archiver/2.0"));
        assert_eq!(cli.shutdown_grace_ms, Some(0));
    }

    #[test]
    fn test_cli_short_flags() {
        let cli = Cli::parse_from(["news_archive", "-o", "/tmp/a.csv", "-c", "/tmp/a.yaml"]);
        assert_eq!(cli.outfile, Some(PathBuf::from("/tmp/a.csv")));
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/a.yaml")));
    }

    #[test]
    fn test_cli_rejects_bad_date() {
        assert!(Cli::try_parse_from(["news_archive", "--start-date", "1999/08/30"]).is_err());
    }
}
