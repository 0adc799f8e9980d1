//! Concurrent URL liveness checks
//!
//! The [`UrlValidator`] checks every entry's URL with a bounded pool of tokio
//! tasks. Each check issues `HEAD` and falls back to `GET` when `HEAD` does not
//! answer 2xx/3xx (servers that reject or mishandle `HEAD`). Transient failures
//! are retried under the run's [`RetryPolicy`]; every request to a host passes
//! through the shared [`HostRateLimiter`].
//!
//! Results are classified as:
//! - `Valid` for a 2xx/3xx final response
//! - `Dead` for 404/410, the only proof that a page is gone
//! - `Ambiguous` for everything else (403, 429, 5xx, timeouts, network errors)
//!
//! [`apply_outcome`] advances an entry's consecutive-dead counter from an outcome;
//! [`is_removal_eligible`] is the removal rule built on it.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::config::{Config, ValidatorConfig};
use crate::error::{CheckError, CheckErrorKind, Error, Result};
use crate::rate_limiter::HostRateLimiter;
use crate::retry::{RetryPolicy, run_with_retry};
use crate::types::{CertificationEntry, CheckStatus, ValidationOutcome};

/// Result of checking one URL
#[derive(Clone, Debug, PartialEq)]
pub struct UrlCheck {
    /// Classification
    pub status: CheckStatus,
    /// Final HTTP status, when a response was received
    pub http_code: Option<u16>,
    /// Failure kind, when no conclusive response was received
    pub error: Option<CheckErrorKind>,
    /// Requests issued, including retries
    pub attempts: u32,
    /// When the check finished
    pub checked_at: DateTime<Utc>,
}

impl UrlCheck {
    fn from_result(result: std::result::Result<u16, CheckError>, attempts: u32) -> Self {
        let (status, http_code, error) = match result {
            Ok(code) => (CheckStatus::from_http(code), Some(code), None),
            Err(e) => (CheckStatus::Ambiguous, e.http_code(), Some(e.kind())),
        };
        Self {
            status,
            http_code,
            error,
            attempts,
            checked_at: Utc::now(),
        }
    }

    /// Stand-in for a check whose task panicked
    fn lost() -> Self {
        Self::from_result(Err(CheckError::Request("check task failed".to_string())), 0)
    }
}

/// Build the HTTP client shared by the validator and the scraper
pub(crate) fn build_http_client(config: &ValidatorConfig) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(config.request_timeout)
        .user_agent(config.user_agent.clone())
        .redirect(reqwest::redirect::Policy::limited(config.max_redirects))
        .build()
        .map_err(Error::Network)
}

/// Concurrent URL checker
///
/// Cloning is cheap and shares the HTTP client and host limiter.
#[derive(Clone)]
pub struct UrlValidator {
    client: reqwest::Client,
    limiter: HostRateLimiter,
    retry: RetryPolicy,
    concurrency: usize,
}

impl UrlValidator {
    /// Create a validator from the run configuration and the shared host limiter
    pub fn new(config: &Config, limiter: HostRateLimiter) -> Result<Self> {
        Ok(Self::with_client(
            build_http_client(&config.validator)?,
            config,
            limiter,
        ))
    }

    /// Create a validator reusing an existing HTTP client
    pub fn with_client(client: reqwest::Client, config: &Config, limiter: HostRateLimiter) -> Self {
        Self {
            client,
            limiter,
            retry: RetryPolicy::from_config(&config.retry),
            concurrency: config.validator.concurrency.max(1),
        }
    }

    /// Check every entry; outcomes come back sorted by entry id
    pub async fn validate(
        &self,
        entries: &[CertificationEntry],
        cancel: &CancellationToken,
    ) -> Vec<ValidationOutcome> {
        tracing::info!(
            entries = entries.len(),
            concurrency = self.concurrency,
            "Validating URLs"
        );

        let urls = entries.iter().map(|e| e.url.clone()).collect();
        let checks = self.check_many(urls, cancel).await;

        let mut outcomes: Vec<ValidationOutcome> = entries
            .iter()
            .zip(checks)
            .map(|(entry, check)| ValidationOutcome {
                entry_id: entry.id,
                url: entry.url.clone(),
                status: check.status,
                http_code: check.http_code,
                error: check.error,
                attempt_count: check.attempts,
                timestamp: check.checked_at,
            })
            .collect();
        outcomes.sort_by_key(|o| o.entry_id);

        let dead = outcomes
            .iter()
            .filter(|o| o.status == CheckStatus::Dead)
            .count();
        let ambiguous = outcomes
            .iter()
            .filter(|o| o.status == CheckStatus::Ambiguous)
            .count();
        tracing::info!(
            checked = outcomes.len(),
            dead,
            ambiguous,
            "URL validation finished"
        );

        outcomes
    }

    /// Check a list of URLs concurrently; results keep the input order
    pub async fn check_many(&self, urls: Vec<String>, cancel: &CancellationToken) -> Vec<UrlCheck> {
        let total = urls.len();
        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let mut tasks = JoinSet::new();

        for (index, url) in urls.into_iter().enumerate() {
            let validator = self.clone();
            let semaphore = semaphore.clone();
            let cancel = cancel.clone();
            tasks.spawn(async move {
                // The pool semaphore is never closed
                let _permit = semaphore.acquire_owned().await.ok();
                (index, validator.check_url(&url, &cancel).await)
            });
        }

        let mut results: Vec<Option<UrlCheck>> = vec![None; total];
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, check)) => results[index] = Some(check),
                Err(e) => tracing::error!(error = %e, "URL check task failed"),
            }
        }

        results
            .into_iter()
            .map(|check| check.unwrap_or_else(UrlCheck::lost))
            .collect()
    }

    /// Check one URL, retrying transient failures
    pub async fn check_url(&self, url: &str, cancel: &CancellationToken) -> UrlCheck {
        let parsed = match Url::parse(url) {
            Ok(parsed) => parsed,
            Err(e) => {
                tracing::warn!(url, error = %e, "Unparsable URL");
                return UrlCheck::from_result(Err(CheckError::Request(e.to_string())), 0);
            }
        };

        let target = &parsed;
        let retried = run_with_retry(&self.retry, cancel, || async move {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => Err(CheckError::Cancelled),
                result = self.attempt(target) => result,
            }
        })
        .await;

        let check = UrlCheck::from_result(retried.result, retried.attempts);
        tracing::debug!(
            url,
            status = %check.status,
            http_code = check.http_code,
            attempt = check.attempts,
            "URL checked"
        );
        check
    }

    /// One HEAD request, with a GET fallback when HEAD is not conclusive
    async fn attempt(&self, url: &Url) -> std::result::Result<u16, CheckError> {
        let host = url.host_str().unwrap_or_default();

        let head = {
            let _permit = self.limiter.acquire(host).await;
            self.client.head(url.clone()).send().await?
        };
        let code = head.status().as_u16();
        if CheckStatus::from_http(code) == CheckStatus::Valid {
            return Ok(code);
        }

        tracing::trace!(url = %url, head_status = code, "HEAD inconclusive, retrying with GET");
        let get = {
            let _permit = self.limiter.acquire(host).await;
            self.client.get(url.clone()).send().await?
        };
        classify(get.status().as_u16())
    }
}

/// Conclusive statuses become `Ok`, everything else an error for the retry policy
fn classify(code: u16) -> std::result::Result<u16, CheckError> {
    match CheckStatus::from_http(code) {
        CheckStatus::Valid | CheckStatus::Dead => Ok(code),
        CheckStatus::Ambiguous => Err(CheckError::Status(code)),
    }
}

/// Advance an entry's maintenance state from one outcome
///
/// `Dead` increments the consecutive-dead counter; any other status resets it.
pub fn apply_outcome(entry: &mut CertificationEntry, outcome: &ValidationOutcome) {
    entry.consecutive_dead_count = match outcome.status {
        CheckStatus::Dead => entry.consecutive_dead_count.saturating_add(1),
        CheckStatus::Valid | CheckStatus::Ambiguous => 0,
    };
    entry.last_status = Some(outcome.status);
    entry.last_checked_at = Some(outcome.timestamp);
}

/// Whether the entry has been confirmed dead often enough to be removed
pub fn is_removal_eligible(entry: &CertificationEntry, threshold: u32) -> bool {
    entry.consecutive_dead_count >= threshold
}
