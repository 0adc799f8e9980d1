//! Pipeline orchestration
//!
//! A run loads the dataset, then validates URLs and discovers candidates
//! concurrently, depending on the [`RunMode`]. Entries about to be removed get
//! a chance at a replacement URL; everything is then merged into the next
//! snapshot, and the dataset files and the run report are replaced together.
//!
//! The whole run is bounded by `run_deadline`. When the deadline fires, every
//! in-flight request and retry sleep is cancelled and the run fails with
//! [`Error::DeadlineExceeded`] before anything is written.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::discovery::{DiscoveryRun, DiscoveryScraper};
use crate::error::{Error, Result};
use crate::merge::{MergeOutcome, MergePolicy, RejectReason, RejectedCandidate, merge};
use crate::rate_limiter::HostRateLimiter;
use crate::repair::{UrlRepair, apply_repairs, choose_repairs, plan_repairs};
use crate::report::{ReportInputs, RunReport};
use crate::store::{DatasetStore, Staging};
use crate::taxonomy::Taxonomy;
use crate::types::{CheckStatus, Dataset, DiscoveryCandidate, ValidationOutcome};
use crate::validator::{UrlValidator, build_http_client};

/// What a run does
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunMode {
    /// Check URLs and persist counters; never removes or adds entries
    Validate,
    /// Scrape sources and merge new entries; counters untouched
    Discover,
    /// Validate, remove confirmed-dead entries, discover and merge
    Maintain,
}

impl RunMode {
    /// Whether URLs are checked
    pub fn validates(self) -> bool {
        matches!(self, RunMode::Validate | RunMode::Maintain)
    }

    /// Whether sources are scraped
    pub fn discovers(self) -> bool {
        matches!(self, RunMode::Discover | RunMode::Maintain)
    }

    /// Whether removal-eligible entries are dropped
    pub fn prunes(self) -> bool {
        matches!(self, RunMode::Maintain)
    }

    /// Lowercase name
    pub fn as_str(self) -> &'static str {
        match self {
            RunMode::Validate => "validate",
            RunMode::Discover => "discover",
            RunMode::Maintain => "maintain",
        }
    }
}

impl std::fmt::Display for RunMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The maintenance pipeline
pub struct Pipeline {
    config: Config,
    store: DatasetStore,
    validator: UrlValidator,
    scraper: DiscoveryScraper,
}

impl Pipeline {
    /// Build the pipeline and its shared HTTP client and host limiter
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;

        let client = build_http_client(&config.validator)?;
        let limiter = HostRateLimiter::new(config.host_limit.clone());
        let validator = UrlValidator::with_client(client.clone(), &config, limiter.clone());
        let scraper = DiscoveryScraper::new(&config, client, limiter);
        let store = DatasetStore::new(
            config.paths.clone(),
            Taxonomy::with_extra(config.extra_categories.iter().cloned()),
        );

        Ok(Self {
            config,
            store,
            validator,
            scraper,
        })
    }

    /// Run configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Execute one run within the configured deadline
    pub async fn run(&self, mode: RunMode) -> Result<RunReport> {
        let deadline = self.config.run_deadline;
        let cancel = CancellationToken::new();
        // Cancels outstanding work however this future ends
        let _guard = cancel.clone().drop_guard();

        tracing::info!(mode = %mode, deadline_secs = deadline.as_secs(), "Starting run");
        match tokio::time::timeout(deadline, self.execute(mode, &cancel)).await {
            Ok(result) => result,
            Err(_) => {
                cancel.cancel();
                tracing::error!(
                    mode = %mode,
                    deadline_secs = deadline.as_secs(),
                    "Run deadline exceeded, dataset left untouched"
                );
                Err(Error::DeadlineExceeded { deadline })
            }
        }
    }

    async fn execute(&self, mode: RunMode, cancel: &CancellationToken) -> Result<RunReport> {
        let started_at = Utc::now();
        let mut dataset = self.store.load()?;

        let validation = async {
            if mode.validates() {
                self.validator.validate(&dataset.entries, cancel).await
            } else {
                Vec::new()
            }
        };
        let discovery = async {
            if mode.discovers() {
                self.scraper.discover(cancel).await
            } else {
                DiscoveryRun::default()
            }
        };
        let (mut outcomes, discovery) = tokio::join!(validation, discovery);

        let repaired = if mode.prunes() && self.config.removal.repair_urls {
            self.repair_dead(&mut dataset, &mut outcomes, cancel).await
        } else {
            Vec::new()
        };

        let policy = MergePolicy::from_config(&self.config, mode.prunes());
        let merged = self
            .merge_verified(&dataset, &outcomes, &discovery.candidates, &policy, cancel)
            .await;

        // Everything below is synchronous, so the deadline cannot interrupt the commit
        let generated_at = Utc::now();
        let mut rejected = discovery.rejected;
        rejected.extend(merged.rejected);
        let report = RunReport::new(ReportInputs {
            mode,
            started_at,
            generated_at,
            entries: &merged.dataset.entries,
            outcomes: &outcomes,
            added: merged.added,
            removed: merged.removed,
            repaired,
            rejected,
            sources: discovery.sources,
        });

        let mut staging = Staging::new();
        self.store
            .stage_snapshot(&mut staging, &merged.dataset, generated_at)?;
        report.stage(&mut staging, self.store.paths())?;
        let written = staging.commit()?;

        tracing::info!(
            mode = %mode,
            files = written.len(),
            entries = report.dataset_size,
            added = report.added.len(),
            removed = report.removed.len(),
            repaired = report.repaired.len(),
            flagged = report.flagged.len(),
            rejected = report.rejected.len(),
            "Run complete"
        );
        Ok(report)
    }

    /// Move entries about to be removed to a working replacement URL, if one exists
    async fn repair_dead(
        &self,
        dataset: &mut Dataset,
        outcomes: &mut [ValidationOutcome],
        cancel: &CancellationToken,
    ) -> Vec<UrlRepair> {
        let removal = &self.config.removal;
        let plans = plan_repairs(
            dataset,
            outcomes,
            removal.dead_threshold,
            &removal.known_replacements,
        );
        if plans.is_empty() {
            return Vec::new();
        }

        let urls: Vec<String> = plans
            .iter()
            .flat_map(|plan| plan.replacements.iter().cloned())
            .collect();
        tracing::info!(
            entries = plans.len(),
            urls = urls.len(),
            "Looking for replacement URLs"
        );
        let checks = self.validator.check_many(urls, cancel).await;

        let repairs = choose_repairs(&plans, &checks);
        apply_repairs(dataset, outcomes, &repairs);
        repairs
    }

    /// Merge, checking the URLs of accepted candidates first when configured
    ///
    /// A preview merge decides which candidates survive deduplication; only
    /// those are checked, and the snapshot is rebuilt from the reachable ones.
    /// Candidates that duplicated an unreachable one stay rejected.
    async fn merge_verified(
        &self,
        dataset: &Dataset,
        outcomes: &[ValidationOutcome],
        candidates: &[DiscoveryCandidate],
        policy: &MergePolicy,
        cancel: &CancellationToken,
    ) -> MergeOutcome {
        let preview = merge(dataset.clone(), outcomes, candidates, policy);
        if !self.config.discovery.verify_candidates || preview.added.is_empty() {
            return preview;
        }

        tracing::info!(candidates = preview.added.len(), "Checking candidate URLs");
        let urls = preview.added.iter().map(|a| a.entry.url.clone()).collect();
        let checks = self.validator.check_many(urls, cancel).await;

        let mut reachable = Vec::new();
        let mut original_index = Vec::new();
        let mut unreachable = Vec::new();
        for (added, check) in preview.added.iter().zip(checks) {
            let candidate = candidates[added.candidate_index].clone();
            if check.status == CheckStatus::Valid {
                reachable.push(candidate);
                original_index.push(added.candidate_index);
            } else {
                tracing::info!(
                    url = %candidate.url,
                    status = %check.status,
                    http_code = check.http_code,
                    "Candidate unreachable"
                );
                unreachable.push(RejectedCandidate {
                    candidate,
                    reason: RejectReason::Unreachable {
                        status: check.status,
                        http_code: check.http_code,
                        error: check.error,
                    },
                });
            }
        }

        let mut outcome = merge(dataset.clone(), outcomes, &reachable, policy);
        for added in &mut outcome.added {
            added.candidate_index = original_index[added.candidate_index];
        }
        outcome.rejected = preview.rejected;
        outcome.rejected.extend(unreachable);
        outcome
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_capabilities() {
        assert!(RunMode::Validate.validates());
        assert!(!RunMode::Validate.discovers());
        assert!(!RunMode::Validate.prunes());
        assert!(!RunMode::Discover.validates());
        assert!(RunMode::Discover.discovers());
        assert!(!RunMode::Discover.prunes());
        assert!(RunMode::Maintain.validates());
        assert!(RunMode::Maintain.discovers());
        assert!(RunMode::Maintain.prunes());
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let mut config = Config::default();
        config.validator.concurrency = 0;
        assert!(matches!(Pipeline::new(config), Err(Error::Config { .. })));
    }

    #[test]
    fn test_mode_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&RunMode::Maintain).unwrap(),
            "\"maintain\""
        );
        assert_eq!(RunMode::Discover.to_string(), "discover");
    }
}
