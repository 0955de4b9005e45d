//! Crawl orchestration.
//!
//! The [`Orchestrator`] walks the date range strictly in order:
//!
//! ```text
//! Idle ─▶ RunningDate(d) ─▶ RunningPage(d, p) ─▶ RunningPage(d, p') ─▶ …
//!              ▲                    │
//!              └── RunningDate(d+1) ◀┘  (no next page / listing failed)
//!
//! RunningDate(last) ─▶ Drained        interrupt / storage error ─▶ Drained
//! ```
//!
//! For each batch of links: drop URLs already in the skip set, fetch the rest
//! concurrently, parse each page on the CPU pool as soon as it arrives, then
//! re-check the skip set and append the survivors in one durable write.
//! Nothing for the next page or date starts before that write returns.
//!
//! An interrupt is observed at the next await on the network or the parser
//! pool. The batch in flight is dropped, never partially written, and the
//! shutdown path runs. [`Orchestrator::run`] consumes the orchestrator, so
//! shutdown happens exactly once however the walk ended.

use crate::config::BatchScope;
use crate::dates::DateRange;
use crate::error::{CrawlError, StorageError};
use crate::fetch::{ArticleFetcher, HttpTransport};
use crate::listing::ListingCursor;
use crate::models::{ArticleBatch, ArticleRecord, FetchOutcome, RunSummary};
use crate::outputs::sink::CsvSink;
use crate::parse_pool::ParserPool;
use crate::resume::SkipSet;
use crate::scrapers::ExtractionStrategy;
use chrono::NaiveDate;
use futures::stream::{self, StreamExt};
use itertools::Itertools;
use std::future::Future;
use std::io;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

/// Where the orchestrator is in its walk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CrawlState {
    Idle,
    RunningDate(NaiveDate),
    RunningPage { date: NaiveDate, url: String },
    Drained,
}

/// Knobs that shape the walk but not the components.
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub batch_scope: BatchScope,
    pub max_listing_pages: usize,
    /// Pause after closing the HTTP side, before the sink is closed.
    pub shutdown_grace: Duration,
}

enum Flow {
    Continue,
    Interrupted,
}

enum ArticleOutcome {
    Parsed(ArticleRecord),
    FetchFailed,
    ParseFailed,
}

/// Result of fetching and parsing one batch of links.
struct BatchReport {
    batch: ArticleBatch,
    fetch_failed: usize,
    parse_failed: usize,
}

/// Drives dates, pages and batches from start to drain.
pub struct Orchestrator<T, S> {
    strategy: Arc<S>,
    fetcher: ArticleFetcher<T>,
    pool: ParserPool<S>,
    sink: CsvSink,
    skip: SkipSet,
    dates: DateRange,
    options: PipelineOptions,
    cancel: CancellationToken,
    state: CrawlState,
    summary: RunSummary,
    started: Instant,
}

impl<T, S> Orchestrator<T, S>
where
    T: HttpTransport,
    S: ExtractionStrategy,
{
    pub fn new(
        strategy: Arc<S>,
        fetcher: ArticleFetcher<T>,
        pool: ParserPool<S>,
        sink: CsvSink,
        skip: SkipSet,
        dates: DateRange,
        options: PipelineOptions,
    ) -> Self {
        Self {
            strategy,
            fetcher,
            pool,
            sink,
            skip,
            dates,
            options,
            cancel: CancellationToken::new(),
            state: CrawlState::Idle,
            summary: RunSummary::default(),
            started: Instant::now(),
        }
    }

    /// Token that requests a graceful shutdown when cancelled.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Walk every date, then shut down.
    ///
    /// # Errors
    ///
    /// [`CrawlError::Storage`] if the sink fails. The shutdown path has
    /// already run and logged its summary when this returns.
    #[instrument(level = "info", skip_all, fields(source = self.strategy.name()))]
    pub async fn run(mut self) -> Result<RunSummary, CrawlError> {
        self.started = Instant::now();
        info!(
            first = %self.dates.first(),
            last = %self.dates.last(),
            days = self.dates.len(),
            known_urls = self.skip.len(),
            cpu_workers = self.pool.workers(),
            sink_mode = ?self.sink.mode(),
            destination = %self.sink.path().display(),
            "Starting crawl"
        );

        let outcome = self.drive().await;
        if let Err(e) = &outcome {
            error!(error = %e, "Crawl aborted");
        }
        let (summary, closed) = self.shutdown().await;

        outcome?;
        closed?;
        Ok(summary)
    }

    async fn drive(&mut self) -> Result<(), CrawlError> {
        for date in self.dates.iter() {
            if self.cancel.is_cancelled() {
                self.summary.interrupted = true;
                return Ok(());
            }
            self.enter(CrawlState::RunningDate(date));
            match self.run_date(date).await? {
                Flow::Continue => self.summary.dates_completed.push(date),
                Flow::Interrupted => {
                    self.summary.interrupted = true;
                    return Ok(());
                }
            }
        }
        Ok(())
    }

    #[instrument(level = "info", skip(self))]
    async fn run_date(&mut self, date: NaiveDate) -> Result<Flow, StorageError> {
        let mut cursor = ListingCursor::new(
            date,
            self.strategy.listing_url(date),
            self.options.max_listing_pages,
        );
        let mut pending = Vec::new();

        loop {
            let Some(next) = self
                .interruptible(cursor.next_page(&self.fetcher, &self.pool))
                .await
            else {
                return Ok(Flow::Interrupted);
            };
            let Some(page) = next else { break };

            self.enter(CrawlState::RunningPage {
                date,
                url: page.url.clone(),
            });
            match self.options.batch_scope {
                BatchScope::Page => {
                    if let Flow::Interrupted = self.process(date, page.links).await? {
                        return Ok(Flow::Interrupted);
                    }
                }
                BatchScope::Date => pending.extend(page.links),
            }
        }

        if cursor.failure().is_some() {
            self.summary.pagination_failures += 1;
        }
        if cursor.pages_fetched() == 0 {
            info!(%date, "No listing for this date; moving on");
        }

        match self.options.batch_scope {
            BatchScope::Date => self.process(date, pending.into_iter().unique().collect()).await,
            BatchScope::Page => Ok(Flow::Continue),
        }
    }

    /// Fetch, parse, filter and persist one batch of article links.
    async fn process(&mut self, date: NaiveDate, links: Vec<String>) -> Result<Flow, StorageError> {
        if links.is_empty() {
            return Ok(Flow::Continue);
        }
        self.summary.links_discovered += links.len();

        let (known, fresh): (Vec<String>, Vec<String>) =
            links.into_iter().partition(|url| self.skip.is_known(url));
        self.summary.skipped_known += known.len();
        if fresh.is_empty() {
            debug!(%date, skipped = known.len(), "Every link is already stored");
            return Ok(Flow::Continue);
        }

        let Some(report) = self.interruptible(self.collect_batch(date, fresh)).await else {
            return Ok(Flow::Interrupted);
        };
        self.summary.fetch_failures += report.fetch_failed;
        self.summary.parse_failures += report.parse_failed;
        self.commit(report.batch).await?;
        Ok(Flow::Continue)
    }

    #[instrument(level = "info", skip_all, fields(%date, links = urls.len()))]
    async fn collect_batch(&self, date: NaiveDate, urls: Vec<String>) -> BatchReport {
        let outcomes: Vec<ArticleOutcome> = stream::iter(urls)
            .map(|url| async move { self.fetch_and_parse(date, url).await })
            .buffer_unordered(self.fetcher.max_in_flight())
            .collect()
            .await;

        let mut report = BatchReport {
            batch: ArticleBatch::new(date),
            fetch_failed: 0,
            parse_failed: 0,
        };
        for outcome in outcomes {
            match outcome {
                ArticleOutcome::Parsed(record) => {
                    report.batch.push(record);
                }
                ArticleOutcome::FetchFailed => report.fetch_failed += 1,
                ArticleOutcome::ParseFailed => report.parse_failed += 1,
            }
        }
        info!(
            parsed = report.batch.len(),
            fetch_failed = report.fetch_failed,
            parse_failed = report.parse_failed,
            "Collected batch"
        );
        report
    }

    async fn fetch_and_parse(&self, date: NaiveDate, url: String) -> ArticleOutcome {
        let html = match self.fetcher.fetch(&url).await {
            FetchOutcome::Success(html) => html,
            // The fetcher has already logged the failure with its URL.
            FetchOutcome::Failure { .. } => return ArticleOutcome::FetchFailed,
        };

        let parsed = self
            .pool
            .parse(html)
            .await
            .and_then(|article| ArticleRecord::new(url.clone(), date, article));
        match parsed {
            Ok(record) => ArticleOutcome::Parsed(record),
            Err(e) => {
                warn!(%url, error = %e, "Article parse failed; dropping it from the batch");
                ArticleOutcome::ParseFailed
            }
        }
    }

    /// Append whatever survives a final skip-set check, then remember it.
    async fn commit(&mut self, mut batch: ArticleBatch) -> Result<(), StorageError> {
        let dropped = batch.retain_unknown(|url| self.skip.is_known(url));
        self.summary.skipped_known += dropped;
        if batch.is_empty() {
            return Ok(());
        }

        let written = self.sink.append(&batch).await?;
        for record in batch.records() {
            self.skip.record(record.url.as_str());
        }
        self.summary.records_written += written;
        info!(
            date = %batch.date,
            written,
            total = self.summary.records_written,
            "Persisted batch"
        );
        Ok(())
    }

    /// Await `fut` unless an interrupt arrives first.
    async fn interruptible<F: Future>(&self, fut: F) -> Option<F::Output> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => {
                warn!(state = ?self.state, "Interrupt received; dropping in-flight work");
                None
            }
            out = fut => Some(out),
        }
    }

    fn enter(&mut self, state: CrawlState) {
        debug!(?state, "State transition");
        self.state = state;
    }

    /// Close the HTTP side, let it settle, close the sink, join the pool.
    async fn shutdown(mut self) -> (RunSummary, Result<(), StorageError>) {
        self.enter(CrawlState::Drained);
        let Self {
            fetcher,
            pool,
            sink,
            mut summary,
            options,
            started,
            ..
        } = self;

        fetcher.close();
        drop(fetcher);
        tokio::time::sleep(options.shutdown_grace).await;

        summary.destination = sink.path().to_path_buf();
        let closed = sink.close().await.map(|_| ());
        if let Err(e) = &closed {
            error!(error = %e, "Failed to close record sink");
        }
        pool.join().await;

        summary.elapsed = started.elapsed();
        info!(
            records_written = summary.records_written,
            destination = %summary.destination.display(),
            dates_completed = summary.dates_completed.len(),
            links = summary.links_discovered,
            skipped_known = summary.skipped_known,
            fetch_failures = summary.fetch_failures,
            parse_failures = summary.parse_failures,
            pagination_failures = summary.pagination_failures,
            interrupted = summary.interrupted,
            elapsed_ms = summary.elapsed.as_millis() as u64,
            "Crawl finished"
        );
        (summary, closed)
    }
}

/// Cancel `cancel` on the first signal; return once a second one arrives.
///
/// The caller decides what a second interrupt means (normally a hard exit).
///
/// # Errors
///
/// Whatever `next_signal` returns if the signal source cannot be watched.
pub async fn watch_interrupts<F, Fut>(cancel: CancellationToken, mut next_signal: F) -> io::Result<()>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = io::Result<()>>,
{
    next_signal().await?;
    warn!("Interrupt received, draining... (interrupt again to force exit)");
    cancel.cancel();

    next_signal().await?;
    error!("Second interrupt received; exiting without a clean shutdown");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dates::Direction;
    use crate::error::FailureKind;
    use crate::fetch::testing::StaticTransport;
    use crate::resume;
    use crate::scrapers::lenta::{LentaStrategy, fixtures};
    use std::path::Path;

    const DAY1: &str = "https://lenta.ru/news/2020/01/01/";
    const DAY1_P2: &str = "https://lenta.ru/news/2020/01/01/page/2/";
    const DAY2: &str = "https://lenta.ru/news/2020/01/02/";

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2020, 1, day).unwrap()
    }

    fn article_url(slug: &str) -> String {
        format!("https://lenta.ru/news/{slug}/")
    }

    fn with_articles(mut transport: StaticTransport, slugs: &[&str]) -> StaticTransport {
        for slug in slugs {
            transport = transport.page(
                &article_url(slug),
                fixtures::article(&format!("Title {slug}"), &[&format!("Body of {slug}.")]),
            );
        }
        transport
    }

    fn hrefs(slugs: &[&str]) -> Vec<String> {
        slugs.iter().map(|s| format!("/news/{s}/")).collect()
    }

    fn listing(slugs: &[&str], next: Option<&str>) -> String {
        let links = hrefs(slugs);
        let refs: Vec<&str> = links.iter().map(String::as_str).collect();
        fixtures::listing(&refs, next)
    }

    async fn orchestrator(
        transport: Arc<StaticTransport>,
        path: &Path,
        start: NaiveDate,
        end: NaiveDate,
        scope: BatchScope,
    ) -> Orchestrator<Arc<StaticTransport>, LentaStrategy> {
        let state = resume::load(path).await;
        build(transport, path, state.skip, start, end, scope, Direction::Ascending).await
    }

    async fn build(
        transport: Arc<StaticTransport>,
        path: &Path,
        skip: SkipSet,
        start: NaiveDate,
        end: NaiveDate,
        scope: BatchScope,
        direction: Direction,
    ) -> Orchestrator<Arc<StaticTransport>, LentaStrategy> {
        let strategy = Arc::new(LentaStrategy::new());
        let sink = CsvSink::open(path).await.unwrap();
        let dates = DateRange::new(start, end, strategy.earliest_date(), direction).unwrap();
        Orchestrator::new(
            Arc::clone(&strategy),
            ArticleFetcher::new(transport, 4),
            ParserPool::new(strategy, 2),
            sink,
            skip,
            dates,
            PipelineOptions {
                batch_scope: scope,
                max_listing_pages: 10,
                shutdown_grace: Duration::ZERO,
            },
        )
    }

    async fn run(
        transport: Arc<StaticTransport>,
        path: &Path,
        start: NaiveDate,
        end: NaiveDate,
    ) -> RunSummary {
        orchestrator(transport, path, start, end, BatchScope::Date)
            .await
            .run()
            .await
            .unwrap()
    }

    fn rows(path: &Path) -> Vec<csv::StringRecord> {
        let mut rdr = csv::Reader::from_path(path).unwrap();
        rdr.records().map(|r| r.unwrap()).collect()
    }

    fn urls(path: &Path) -> Vec<String> {
        rows(path).iter().map(|r| r[1].to_string()).sorted().collect()
    }

    #[tokio::test]
    async fn test_fresh_store_single_day() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("out.csv");
        let transport = with_articles(
            StaticTransport::new().page(DAY1, listing(&["a", "b", "c"], None)),
            &["a", "b", "c"],
        );

        let summary = run(Arc::new(transport), &path, d(1), d(1)).await;

        assert_eq!(summary.records_written, 3);
        assert_eq!(summary.dates_completed, vec![d(1)]);
        assert!(!summary.interrupted);
        let rows = rows(&path);
        assert_eq!(rows.len(), 3);
        assert!(rows.iter().all(|r| &r[0] == "2020-01-01"));
        assert!(rows.iter().any(|r| &r[4] == "Title b" && &r[5] == "Body of b."));
    }

    #[tokio::test]
    async fn test_rerun_adds_nothing_and_skips_downloads() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("out.csv");
        let build = || {
            Arc::new(with_articles(
                StaticTransport::new().page(DAY1, listing(&["a", "b", "c"], None)),
                &["a", "b", "c"],
            ))
        };
        run(build(), &path, d(1), d(1)).await;

        let preloaded = resume::load(&path).await;
        assert_eq!(preloaded.skip.len(), 3);

        let transport = build();
        let summary = run(Arc::clone(&transport), &path, d(1), d(1)).await;
        assert_eq!(summary.records_written, 0);
        assert_eq!(summary.skipped_known, 3);
        assert_eq!(transport.requests(), vec![DAY1.to_string()]);
        assert_eq!(rows(&path).len(), 3);
    }

    #[tokio::test]
    async fn test_timeout_drops_only_that_article() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("out.csv");
        let transport = with_articles(
            StaticTransport::new()
                .page(DAY1, listing(&["a", "b", "c"], None))
                .page(DAY2, listing(&["d"], None)),
            &["a", "c", "d"],
        )
        .error(&article_url("b"), FailureKind::Timeout);

        let summary = run(Arc::new(transport), &path, d(1), d(2)).await;

        assert_eq!(summary.fetch_failures, 1);
        assert_eq!(summary.records_written, 3);
        assert_eq!(summary.dates_completed, vec![d(1), d(2)]);
        assert_eq!(
            urls(&path),
            vec![article_url("a"), article_url("c"), article_url("d")]
        );
    }

    #[tokio::test]
    async fn test_pagination_merges_pages_before_writing() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("out.csv");
        let transport = Arc::new(with_articles(
            StaticTransport::new()
                .page(DAY1, listing(&["a", "b"], Some("/news/2020/01/01/page/2/")))
                .page(DAY1_P2, listing(&["b", "c"], None)),
            &["a", "b", "c"],
        ));

        let summary = run(Arc::clone(&transport), &path, d(1), d(1)).await;

        assert_eq!(summary.records_written, 3);
        let requests = transport.requests();
        assert_eq!(&requests[..2], &[DAY1.to_string(), DAY1_P2.to_string()]);
        assert_eq!(requests.len(), 5);
        assert_eq!(rows(&path).iter().filter(|r| &r[0] == "2020-01-01").count(), 3);
    }

    #[tokio::test]
    async fn test_page_scope_writes_each_page_before_the_next() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("out.csv");
        let transport = Arc::new(with_articles(
            StaticTransport::new()
                .page(DAY1, listing(&["a", "b"], Some("/news/2020/01/01/page/2/")))
                .page(DAY1_P2, listing(&["c"], None)),
            &["a", "b", "c"],
        ));

        let summary = orchestrator(Arc::clone(&transport), &path, d(1), d(1), BatchScope::Page)
            .await
            .run()
            .await
            .unwrap();

        assert_eq!(summary.records_written, 3);
        let requests = transport.requests();
        let pos = |u: &str| requests.iter().position(|r| r == u).unwrap();
        assert!(pos(&article_url("a")) < pos(DAY1_P2));
        assert!(pos(&article_url("b")) < pos(DAY1_P2));
        assert!(pos(DAY1_P2) < pos(&article_url("c")));
    }

    #[tokio::test]
    async fn test_missing_body_drops_only_that_article() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("out.csv");
        let transport = with_articles(
            StaticTransport::new().page(DAY1, listing(&["a", "b", "c"], None)),
            &["a", "c"],
        )
        .page(&article_url("b"), fixtures::article_without_body("No body"));

        let summary = run(Arc::new(transport), &path, d(1), d(1)).await;

        assert_eq!(summary.parse_failures, 1);
        assert_eq!(summary.records_written, 2);
        assert_eq!(urls(&path), vec![article_url("a"), article_url("c")]);
    }

    #[tokio::test]
    async fn test_failed_listing_days_keep_coverage_contiguous() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("out.csv");
        let transport = with_articles(
            StaticTransport::new()
                .page(DAY1, listing(&["a"], None))
                .error(DAY2, FailureKind::Connect)
                .page("https://lenta.ru/news/2020/01/04/", listing(&["b"], None)),
            &["a", "b"],
        );

        let summary = run(Arc::new(transport), &path, d(1), d(5)).await;

        assert_eq!(summary.dates_completed, vec![d(1), d(2), d(3), d(4), d(5)]);
        assert_eq!(summary.records_written, 2);
    }

    #[tokio::test]
    async fn test_next_page_failure_keeps_first_page() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("out.csv");
        let transport = with_articles(
            StaticTransport::new()
                .page(DAY1, listing(&["a"], Some("/news/2020/01/01/page/2/")))
                .status(DAY1_P2, 500)
                .page(DAY2, listing(&["b"], None)),
            &["a", "b"],
        );

        let summary = run(Arc::new(transport), &path, d(1), d(2)).await;

        assert_eq!(summary.pagination_failures, 1);
        assert_eq!(summary.records_written, 2);
        assert_eq!(summary.dates_completed, vec![d(1), d(2)]);
    }

    #[tokio::test]
    async fn test_rerun_after_partial_failure_fills_the_gap_once() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("out.csv");
        let flaky = with_articles(
            StaticTransport::new().page(DAY1, listing(&["a", "b"], None)),
            &["a"],
        )
        .error(&article_url("b"), FailureKind::Timeout);
        run(Arc::new(flaky), &path, d(1), d(1)).await;
        assert_eq!(urls(&path), vec![article_url("a")]);

        let healthy = Arc::new(with_articles(
            StaticTransport::new().page(DAY1, listing(&["a", "b"], None)),
            &["a", "b"],
        ));
        let summary = run(Arc::clone(&healthy), &path, d(1), d(1)).await;
        assert_eq!(summary.records_written, 1);
        assert!(!healthy.requests().contains(&article_url("a")));
        assert_eq!(urls(&path), vec![article_url("a"), article_url("b")]);

        let header_count = std::fs::read_to_string(&path)
            .unwrap()
            .matches("date,url,topic")
            .count();
        assert_eq!(header_count, 1);
    }

    #[tokio::test]
    async fn test_countdown_walks_contiguous_descending_dates() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("out.csv");
        let transport = Arc::new(with_articles(
            StaticTransport::new()
                .page(DAY1, listing(&["a"], None))
                .page("https://lenta.ru/news/2020/01/03/", listing(&["c"], None))
                .page("https://lenta.ru/news/2020/01/04/", listing(&["d"], None)),
            &["a", "c", "d"],
        ));
        let state = resume::load(&path).await;
        let orch = build(
            Arc::clone(&transport),
            &path,
            state.skip,
            d(1),
            d(4),
            BatchScope::Date,
            Direction::Countdown,
        )
        .await;

        let summary = orch.run().await.unwrap();

        assert_eq!(summary.dates_completed, vec![d(4), d(3), d(2), d(1)]);
        assert!(
            summary
                .dates_completed
                .windows(2)
                .all(|w| w[0].pred_opt() == Some(w[1]))
        );
        let listings: Vec<String> = transport
            .requests()
            .into_iter()
            .filter(|u| u.starts_with("https://lenta.ru/news/2020/"))
            .collect();
        assert_eq!(
            listings,
            vec![
                "https://lenta.ru/news/2020/01/04/".to_string(),
                "https://lenta.ru/news/2020/01/03/".to_string(),
                DAY2.to_string(),
                DAY1.to_string(),
            ]
        );
        let dates: Vec<String> = rows(&path).iter().map(|r| r[0].to_string()).collect();
        assert_eq!(dates, vec!["2020-01-04", "2020-01-03", "2020-01-01"]);
    }

    #[tokio::test]
    async fn test_rerun_on_legacy_layout_store_adds_nothing() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("out.csv");
        std::fs::write(
            &path,
            "url,title,text,topic,tags\nhttps://lenta.ru/news/old/,T,body,,\n",
        )
        .unwrap();
        let build = || {
            Arc::new(with_articles(
                StaticTransport::new().page(DAY1, listing(&["a", "b"], None)),
                &["a", "b"],
            ))
        };

        let first = run(build(), &path, d(1), d(1)).await;
        assert_eq!(first.records_written, 2);

        let preloaded = resume::load(&path).await;
        assert!(preloaded.skip.is_known(&article_url("a")));
        assert!(preloaded.skip.is_known(&article_url("b")));
        assert!(preloaded.skip.is_known("https://lenta.ru/news/old/"));

        let transport = build();
        let second = run(Arc::clone(&transport), &path, d(1), d(1)).await;
        assert_eq!(second.records_written, 0);
        assert_eq!(transport.requests(), vec![DAY1.to_string()]);

        let mut rdr = csv::Reader::from_path(&path).unwrap();
        let header: Vec<String> = rdr.headers().unwrap().iter().map(str::to_string).collect();
        assert_eq!(header, ["url", "title", "text", "topic", "tags"]);
        let stored: Vec<String> = rdr
            .records()
            .map(|r| r.unwrap()[0].to_string())
            .sorted()
            .collect();
        assert_eq!(
            stored,
            vec![
                article_url("a"),
                article_url("b"),
                "https://lenta.ru/news/old/".to_string()
            ]
        );
    }

    #[tokio::test]
    async fn test_interrupt_before_start_writes_nothing() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("out.csv");
        let transport = with_articles(
            StaticTransport::new().page(DAY1, listing(&["a"], None)),
            &["a"],
        );
        let orch = orchestrator(Arc::new(transport), &path, d(1), d(3), BatchScope::Date).await;
        orch.cancellation_token().cancel();

        let summary = orch.run().await.unwrap();
        assert!(summary.interrupted);
        assert_eq!(summary.records_written, 0);
        assert!(summary.dates_completed.is_empty());
        assert_eq!(std::fs::metadata(&path).unwrap().len(), 0);
    }

    #[tokio::test]
    async fn test_interrupt_mid_batch_drops_the_batch() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("out.csv");
        let transport = with_articles(
            StaticTransport::new().page(DAY1, listing(&["a", "b"], None)),
            &["a", "b"],
        )
        .with_delay(Duration::from_millis(200));
        let orch = orchestrator(Arc::new(transport), &path, d(1), d(1), BatchScope::Date).await;
        let token = orch.cancellation_token();

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(300)).await;
            token.cancel();
        });

        let summary = orch.run().await.unwrap();
        assert!(summary.interrupted);
        assert_eq!(summary.records_written, 0);
        assert_eq!(std::fs::metadata(&path).unwrap().len(), 0);
    }

    #[tokio::test]
    async fn test_first_interrupt_cancels_second_returns() {
        let signals = Arc::new(tokio::sync::Semaphore::new(0));
        let next_signal = {
            let signals = Arc::clone(&signals);
            move || {
                let signals = Arc::clone(&signals);
                async move {
                    signals.acquire().await.map(|p| p.forget()).map_err(io::Error::other)
                }
            }
        };
        let token = CancellationToken::new();
        let watcher = tokio::spawn(watch_interrupts(token.clone(), next_signal));

        signals.add_permits(1);
        tokio::time::timeout(Duration::from_secs(1), token.cancelled())
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!watcher.is_finished());

        signals.add_permits(1);
        let result = tokio::time::timeout(Duration::from_secs(1), watcher).await.unwrap();
        assert!(result.unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_unwatchable_signal_source_is_reported() {
        let token = CancellationToken::new();
        let result = watch_interrupts(token.clone(), || async {
            Err(io::Error::other("no signal handler"))
        })
        .await;
        assert!(result.is_err());
        assert!(!token.is_cancelled());
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn test_storage_failure_aborts_after_shutdown() {
        let transport = with_articles(
            StaticTransport::new()
                .page(DAY1, listing(&["a"], None))
                .page(DAY2, listing(&["b"], None)),
            &["a", "b"],
        );
        let transport = Arc::new(transport);
        // /dev/full accepts the open but fails every write with ENOSPC.
        let orch = build(
            Arc::clone(&transport),
            Path::new("/dev/full"),
            SkipSet::default(),
            d(1),
            d(2),
            BatchScope::Date,
            Direction::Ascending,
        )
        .await;

        let err = orch.run().await.unwrap_err();
        assert!(matches!(err, CrawlError::Storage(StorageError::Io { .. })));
        assert!(!transport.requests().contains(&DAY2.to_string()));
    }
}
