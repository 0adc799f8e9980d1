//! Discovery of new certification candidates
//!
//! The [`DiscoveryScraper`] polls every enabled source concurrently. Each source
//! is resolved to an [`Adapter`] by kind, its listing pages are fetched through
//! the shared [`HostRateLimiter`], and the pages are parsed into
//! [`DiscoveryCandidate`]s. Sources fail independently: a source whose listings
//! all fail to load is reported as unavailable and contributes nothing.
//!
//! Candidates are returned in source order, then page order, then document
//! order, regardless of which source finished first.

pub mod adapters;
pub mod heuristics;

use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::config::{Config, SourceConfig};
use crate::error::{CheckError, DiscoveryError};
use crate::merge::fingerprint::url_fingerprint;
use crate::merge::{RejectReason, RejectedCandidate};
use crate::rate_limiter::HostRateLimiter;
use crate::retry::{RetryPolicy, run_with_retry};
use crate::types::DiscoveryCandidate;

pub use adapters::{Adapter, AdapterRegistry, Page, ParseLimits, ParsedPage};

/// Listing pages of one source fetched concurrently
const PAGES_IN_FLIGHT: usize = 2;

/// Parse errors kept per source in the report
const MAX_REPORTED_PARSE_ERRORS: usize = 20;

/// How a source fared
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceOutcome {
    /// At least one listing page was fetched and parsed
    Ok,
    /// No listing page could be fetched
    Unavailable,
    /// The source could not be set up (unknown adapter, bad URL, bad selector)
    Failed,
}

/// Per-source diagnostics
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SourceReport {
    /// Source id
    pub id: String,
    /// Adapter kind as configured
    pub kind: String,
    /// Outcome
    pub outcome: SourceOutcome,
    /// Candidates kept after confidence filtering
    pub candidates: usize,
    /// Listing pages fetched successfully
    pub pages_fetched: usize,
    /// Listing pages that failed to load
    pub pages_failed: usize,
    /// First few parse errors
    pub parse_errors: Vec<String>,
    /// Total parse errors, including those not listed
    pub parse_error_count: usize,
    /// Source-level error, when not `Ok`
    pub error: Option<String>,
}

impl SourceReport {
    fn new(source: &SourceConfig) -> Self {
        Self {
            id: source.id.clone(),
            kind: source.kind.clone(),
            outcome: SourceOutcome::Ok,
            candidates: 0,
            pages_fetched: 0,
            pages_failed: 0,
            parse_errors: Vec::new(),
            parse_error_count: 0,
            error: None,
        }
    }

    fn fail(&mut self, outcome: SourceOutcome, error: &DiscoveryError) {
        self.outcome = outcome;
        self.error = Some(error.to_string());
    }

    fn record_parse_error(&mut self, error: String) {
        self.parse_error_count += 1;
        if self.parse_errors.len() < MAX_REPORTED_PARSE_ERRORS {
            self.parse_errors.push(error);
        }
    }
}

/// Everything one discovery pass produced
#[derive(Clone, Debug, Default)]
pub struct DiscoveryRun {
    /// Candidates in (source, page, document) order
    pub candidates: Vec<DiscoveryCandidate>,
    /// Candidates dropped for low confidence
    pub rejected: Vec<RejectedCandidate>,
    /// One report per polled source, in configuration order
    pub sources: Vec<SourceReport>,
}

struct SourceResult {
    candidates: Vec<DiscoveryCandidate>,
    rejected: Vec<RejectedCandidate>,
    report: SourceReport,
}

/// Concurrent scraper over the configured sources
#[derive(Clone)]
pub struct DiscoveryScraper {
    client: reqwest::Client,
    limiter: HostRateLimiter,
    retry: RetryPolicy,
    registry: AdapterRegistry,
    sources: Arc<[SourceConfig]>,
    concurrency: usize,
    limits: ParseLimits,
    min_confidence: f64,
    search_endpoint: String,
}

impl DiscoveryScraper {
    /// Create a scraper sharing the run's HTTP client and host limiter
    pub fn new(config: &Config, client: reqwest::Client, limiter: HostRateLimiter) -> Self {
        let discovery = &config.discovery;
        Self {
            client,
            limiter,
            retry: RetryPolicy::from_config(&config.retry),
            registry: AdapterRegistry::default(),
            sources: discovery.sources.iter().filter(|s| s.enabled).cloned().collect(),
            concurrency: discovery.concurrency.max(1),
            limits: ParseLimits {
                max_links: discovery.max_links_per_page,
                max_results: discovery.max_search_results,
            },
            min_confidence: discovery.min_confidence,
            search_endpoint: discovery.search_endpoint.clone(),
        }
    }

    /// Poll every enabled source
    pub async fn discover(&self, cancel: &CancellationToken) -> DiscoveryRun {
        tracing::info!(
            sources = self.sources.len(),
            concurrency = self.concurrency,
            "Starting discovery"
        );

        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let mut tasks = JoinSet::new();
        for index in 0..self.sources.len() {
            let scraper = self.clone();
            let semaphore = semaphore.clone();
            let cancel = cancel.clone();
            tasks.spawn(async move {
                let _permit = semaphore.acquire_owned().await.ok();
                (index, scraper.scrape_source(index, &cancel).await)
            });
        }

        let mut results: Vec<Option<SourceResult>> =
            std::iter::repeat_with(|| None).take(self.sources.len()).collect();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, result)) => results[index] = Some(result),
                Err(e) => tracing::error!(error = %e, "Discovery task failed"),
            }
        }

        let mut run = DiscoveryRun::default();
        for (source, result) in self.sources.iter().zip(results) {
            let result = result.unwrap_or_else(|| {
                let mut report = SourceReport::new(source);
                report.outcome = SourceOutcome::Failed;
                report.error = Some("discovery task failed".to_string());
                SourceResult {
                    candidates: Vec::new(),
                    rejected: Vec::new(),
                    report,
                }
            });
            run.candidates.extend(result.candidates);
            run.rejected.extend(result.rejected);
            run.sources.push(result.report);
        }

        let unavailable = run
            .sources
            .iter()
            .filter(|s| s.outcome != SourceOutcome::Ok)
            .count();
        tracing::info!(
            candidates = run.candidates.len(),
            low_confidence = run.rejected.len(),
            unavailable,
            "Discovery finished"
        );
        run
    }

    async fn scrape_source(&self, index: usize, cancel: &CancellationToken) -> SourceResult {
        let source = &self.sources[index];
        let mut result = SourceResult {
            candidates: Vec::new(),
            rejected: Vec::new(),
            report: SourceReport::new(source),
        };

        let adapter = match self.registry.resolve(source) {
            Ok(adapter) => adapter,
            Err(e) => {
                tracing::warn!(source_id = %source.id, error = %e, "Skipping source");
                result.report.fail(SourceOutcome::Failed, &e);
                return result;
            }
        };
        let listings = match adapter.enumerate_listings(source, &self.search_endpoint) {
            Ok(listings) => listings,
            Err(e) => {
                tracing::warn!(source_id = %source.id, error = %e, "Skipping source");
                result.report.fail(SourceOutcome::Failed, &e);
                return result;
            }
        };

        let pages: Vec<(Url, std::result::Result<Page, CheckError>)> = stream::iter(listings)
            .map(|url| async move {
                let page = self.fetch_page(&url, cancel).await;
                (url, page)
            })
            .buffered(PAGES_IN_FLIGHT)
            .collect()
            .await;

        let mut seen = HashSet::new();
        let mut last_error = None;
        for (url, page) in pages {
            let page = match page {
                Ok(page) => page,
                Err(e) => {
                    tracing::warn!(source_id = %source.id, url = %url, error = %e, "Listing fetch failed");
                    result.report.pages_failed += 1;
                    last_error = Some(format!("{url}: {e}"));
                    continue;
                }
            };
            result.report.pages_fetched += 1;

            let parsed = match adapter.parse_entry(source, &page, self.limits) {
                Ok(parsed) => parsed,
                Err(e) => {
                    result.report.record_parse_error(e.to_string());
                    continue;
                }
            };
            for error in parsed.errors {
                tracing::debug!(source_id = %source.id, error = %error, "Unparsable link");
                result.report.record_parse_error(error);
            }

            for candidate in parsed.candidates {
                let fingerprint = url_fingerprint(&candidate.url).unwrap_or_default();
                if !seen.insert(fingerprint) {
                    continue;
                }
                if candidate.confidence < self.min_confidence {
                    result.rejected.push(RejectedCandidate {
                        candidate,
                        reason: RejectReason::LowConfidence {
                            minimum: self.min_confidence,
                        },
                    });
                } else {
                    result.candidates.push(candidate);
                }
            }
        }

        if result.report.pages_fetched == 0 {
            let e = DiscoveryError::SourceUnavailable {
                source_id: source.id.clone(),
                reason: last_error.unwrap_or_else(|| "no listing pages".to_string()),
            };
            tracing::warn!(error = %e, "Source unavailable");
            result.report.fail(SourceOutcome::Unavailable, &e);
        }
        result.report.candidates = result.candidates.len();

        tracing::info!(
            source_id = %source.id,
            kind = adapter.kind(),
            candidates = result.candidates.len(),
            low_confidence = result.rejected.len(),
            parse_errors = result.report.parse_error_count,
            "Source scraped"
        );
        result
    }

    /// Fetch one listing page under the host limiter, retrying transient failures
    async fn fetch_page(
        &self,
        url: &Url,
        cancel: &CancellationToken,
    ) -> std::result::Result<Page, CheckError> {
        let retried = run_with_retry(&self.retry, cancel, || async move {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => Err(CheckError::Cancelled),
                page = self.fetch_once(url) => page,
            }
        })
        .await;
        retried.result
    }

    async fn fetch_once(&self, url: &Url) -> std::result::Result<Page, CheckError> {
        let host = url.host_str().unwrap_or_default();
        let _permit = self.limiter.acquire(host).await;

        let response = self.client.get(url.clone()).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(CheckError::Status(status.as_u16()));
        }
        let final_url = response.url().clone();
        let body = response.text().await?;
        Ok(Page {
            url: final_url,
            body,
        })
    }
}
