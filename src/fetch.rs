//! HTTP fetching with a global in-flight bound.
//!
//! The pipeline consumes a single capability, [`HttpTransport::get`], and
//! wraps it in an [`ArticleFetcher`] that:
//!
//! - caps simultaneously in-flight requests across the whole process
//! - maps every result to a [`FetchOutcome`] so one bad URL never unwinds
//!   past its batch
//! - logs each failure with the offending URL
//!
//! [`ReqwestTransport`] is the production transport: one shared client, no
//! redirects, fixed connect and read timeouts.

use crate::error::{FailureKind, TransportError};
use crate::models::FetchOutcome;
use crate::utils::truncate_for_log;
use reqwest::Client;
use reqwest::redirect::Policy;
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::{debug, instrument, warn};

/// Raw HTTP response as seen by the pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

/// Minimal transport capability the pipeline depends on.
pub trait HttpTransport {
    /// Issue a single non-redirecting GET.
    async fn get(&self, url: &str) -> Result<HttpResponse, TransportError>;
}

/// Transport tuning knobs.
#[derive(Debug, Clone)]
pub struct TransportSettings {
    pub connect_timeout: Duration,
    pub read_timeout: Duration,
    pub max_connections: usize,
    pub user_agent: String,
}

/// [`HttpTransport`] backed by a shared `reqwest::Client`.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    /// Build the shared client.
    ///
    /// # Errors
    ///
    /// Returns the reqwest builder error if the TLS backend cannot be
    /// initialised.
    pub fn new(settings: &TransportSettings) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .redirect(Policy::none())
            .connect_timeout(settings.connect_timeout)
            .timeout(settings.connect_timeout + settings.read_timeout)
            .read_timeout(settings.read_timeout)
            .pool_max_idle_per_host(settings.max_connections)
            .user_agent(settings.user_agent.clone())
            .build()?;
        Ok(Self { client })
    }
}

impl HttpTransport for ReqwestTransport {
    async fn get(&self, url: &str) -> Result<HttpResponse, TransportError> {
        let response = self.client.get(url).send().await?;
        let status = response.status().as_u16();
        let body = response.text().await?;
        Ok(HttpResponse { status, body })
    }
}

/// Bounded-concurrency fetcher shared by listing and article requests.
#[derive(Debug)]
pub struct ArticleFetcher<T> {
    transport: T,
    permits: Semaphore,
    max_in_flight: usize,
}

impl<T: HttpTransport> ArticleFetcher<T> {
    pub fn new(transport: T, max_in_flight: usize) -> Self {
        Self {
            transport,
            permits: Semaphore::new(max_in_flight),
            max_in_flight,
        }
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight
    }

    #[cfg(test)]
    pub(crate) fn transport(&self) -> &T {
        &self.transport
    }

    /// Fetch one URL. Never fails; failures come back tagged.
    #[instrument(level = "debug", skip(self))]
    pub async fn fetch(&self, url: &str) -> FetchOutcome {
        let Ok(_permit) = self.permits.acquire().await else {
            return FetchOutcome::Failure {
                kind: FailureKind::Closed,
                detail: "fetcher is shut down".to_string(),
            };
        };

        match self.transport.get(url).await {
            Ok(HttpResponse { status, body }) if (200..300).contains(&status) => {
                debug!(%url, status, bytes = body.len(), "Fetched page");
                FetchOutcome::Success(body)
            }
            Ok(HttpResponse { status, .. }) => {
                warn!(%url, status, "Fetch returned non-success status");
                FetchOutcome::Failure {
                    kind: FailureKind::Status(status),
                    detail: format!("unexpected status {status}"),
                }
            }
            Err(e) => {
                warn!(
                    %url,
                    kind = %e.kind,
                    error = %truncate_for_log(&e.detail, 300),
                    "Fetch failed"
                );
                FetchOutcome::Failure {
                    kind: e.kind,
                    detail: e.detail,
                }
            }
        }
    }

    /// Refuse new requests; in-flight ones finish or are dropped by the caller.
    pub fn close(&self) {
        self.permits.close();
    }
}
