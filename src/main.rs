//! # News Archive
//!
//! A resumable archiver for news sites that publish a listing page per
//! calendar day. It walks the archive date by date, follows each day's
//! pagination, downloads every article concurrently, extracts title, body,
//! topic and tags off the I/O threads, and appends the results to a CSV file
//! one durable batch at a time.
//!
//! ## Features
//!
//! - Lenta.ru support out of the box (legacy and current markup)
//! - Bounded, non-redirecting HTTP fetching with connect/read timeouts
//! - CPU-bound parsing on a fixed-size worker pool
//! - Resume: URLs already in the output are never downloaded again, and an
//!   ascending walk fast-forwards to the latest stored date
//! - Ctrl-C drains cleanly: the batch in flight is dropped, never half-written
//!
//! ## Usage
//!
//! ```sh
//! news_archive --outfile lenta-ru-news.csv --start-date 2015-01-01
//! ```
//!
//! ## Architecture
//!
//! The application follows a pipeline architecture:
//! 1. **Resume**: Scan prior output for known URLs and the latest date
//! 2. **Listing**: Discover article URLs for each date, across pagination
//! 3. **Fetching**: Download articles, a bounded number at a time
//! 4. **Parsing**: Extract structured content on the CPU pool
//! 5. **Output**: Append surviving records to the CSV store per batch

use chrono::Local;
use clap::Parser;
use std::error::Error;
use std::sync::Arc;
use tokio::signal;
use tracing::{debug, error, info, instrument};
use tracing_subscriber::{EnvFilter, fmt as tfmt};

mod cli;
mod config;
mod dates;
mod error;
mod fetch;
mod listing;
mod models;
mod outputs;
mod parse_pool;
mod pipeline;
mod resume;
mod scrapers;
mod utils;

use cli::Cli;
use config::Settings;
use fetch::{ArticleFetcher, ReqwestTransport};
use outputs::sink::CsvSink;
use parse_pool::ParserPool;
use pipeline::{Orchestrator, PipelineOptions, watch_interrupts};
use scrapers::ExtractionStrategy;
use scrapers::lenta::LentaStrategy;
use utils::ensure_writable_parent;

#[tokio::main]
#[instrument]
async fn main() -> Result<(), Box<dyn Error>> {
    // --- Tracing init ---
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tfmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .init();

    info!(version = env!("CARGO_PKG_VERSION"), "news_archive starting up");

    // Parse CLI
    let args = Cli::parse();
    debug!(?args, "Parsed CLI arguments");

    // ---- Settings ----
    let mut settings = match &args.config {
        Some(path) => Settings::load(path).await?,
        None => Settings::default(),
    };
    settings.apply_cli(&args);

    let today = Local::now().date_naive();
    let plan = settings.plan(LentaStrategy::new().earliest_date(), today)?;
    let strategy = Arc::new(match &plan.base_url {
        Some(base) => LentaStrategy::with_base(base.clone()),
        None => LentaStrategy::new(),
    });
    info!(
        source = strategy.name(),
        outfile = %plan.outfile.display(),
        direction = ?plan.direction,
        max_connections = plan.transport.max_connections,
        cpu_workers = plan.cpu_workers,
        batch_scope = ?plan.batch_scope,
        "Crawl plan ready"
    );

    // Early check: ensure the output location is writable
    if let Err(e) = ensure_writable_parent(&plan.outfile).await {
        error!(
            path = %plan.outfile.display(),
            error = %e,
            "Output directory is not writable (fix perms or choose a different path)"
        );
        return Err(e.into());
    }

    // ---- Resume ----
    let resume = resume::load(&plan.outfile).await;
    let cursor = plan.resume_cursor(resume.latest_date);
    let dates = plan.date_range(&cursor)?;
    if cursor.effective_start() != plan.requested_start {
        info!(
            requested = %plan.requested_start,
            effective = %cursor.effective_start(),
            "Fast-forwarding to the latest stored date"
        );
    }

    // ---- Pipeline ----
    let sink = CsvSink::open(&plan.outfile).await?;
    let transport = ReqwestTransport::new(&plan.transport)?;
    let fetcher = ArticleFetcher::new(transport, plan.transport.max_connections);
    let pool = ParserPool::new(Arc::clone(&strategy), plan.cpu_workers);
    let options = PipelineOptions {
        batch_scope: plan.batch_scope,
        max_listing_pages: plan.max_listing_pages,
        shutdown_grace: plan.shutdown_grace,
    };

    let orchestrator = Orchestrator::new(strategy, fetcher, pool, sink, resume.skip, dates, options);
    let cancel = orchestrator.cancellation_token();

    tokio::spawn(async move {
        match watch_interrupts(cancel, signal::ctrl_c).await {
            Ok(()) => std::process::exit(130),
            Err(e) => error!(error = %e, "Could not listen for Ctrl-C"),
        }
    });

    let summary = orchestrator.run().await?;

    info!(
        records = summary.records_written,
        destination = %summary.destination.display(),
        interrupted = summary.interrupted,
        secs = summary.elapsed.as_secs(),
        millis = summary.elapsed.subsec_millis(),
        "Execution complete"
    );

    Ok(())
}
