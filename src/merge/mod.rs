//! Deduplication and merge of validation outcomes and discovered candidates
//!
//! [`merge`] is a pure function: it takes the loaded [`Dataset`], this run's
//! [`ValidationOutcome`]s and the collected [`DiscoveryCandidate`]s and returns
//! the next snapshot together with every decision it made. No I/O happens here,
//! and the result depends only on input order, never on task completion order.
//!
//! Order of operations:
//! 1. apply each outcome to its entry (consecutive-dead state machine)
//! 2. when pruning, drop entries whose dead count reached the threshold
//! 3. screen candidates in slice order against the surviving entries and
//!    every candidate accepted before them
//! 4. give accepted candidates the next id and append them to their category group

pub mod fingerprint;

use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};

use crate::config::Config;
use crate::error::CheckErrorKind;
use crate::taxonomy::{Level, Taxonomy};
use crate::types::{
    CertificationEntry, CheckStatus, Dataset, DiscoveryCandidate, EntryId, ValidationOutcome,
};
use crate::validator::{apply_outcome, is_removal_eligible};
use fingerprint::{jaccard, name_tokens, normalize_url, provider_key, url_fingerprint};

/// Thresholds and switches for one merge
#[derive(Clone, Debug)]
pub struct MergePolicy {
    /// Consecutive dead runs that make an entry removable
    pub dead_threshold: u32,
    /// Name Jaccard similarity at or above which same-provider names collide
    pub name_similarity: f64,
    /// Whether removable entries are dropped from the snapshot
    pub prune_dead: bool,
    /// Accepted categories
    pub taxonomy: Taxonomy,
}

impl MergePolicy {
    /// Policy derived from the run configuration
    pub fn from_config(config: &Config, prune_dead: bool) -> Self {
        Self {
            dead_threshold: config.removal.dead_threshold,
            name_similarity: config.removal.name_similarity,
            prune_dead,
            taxonomy: Taxonomy::with_extra(config.extra_categories.iter().cloned()),
        }
    }
}

impl Default for MergePolicy {
    fn default() -> Self {
        Self::from_config(&Config::default(), true)
    }
}

/// Why a candidate did not become an entry
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum RejectReason {
    /// A required field was empty
    MissingField {
        /// "name", "provider", "url" or "category"
        field: String,
    },
    /// URL is not an absolute http(s) URL
    InvalidUrl,
    /// Category outside the taxonomy
    UnknownCategory,
    /// Same URL fingerprint as an existing or earlier accepted entry
    DuplicateUrl {
        /// Entry it collides with
        existing_id: EntryId,
    },
    /// Same provider and a near-identical name
    DuplicateName {
        /// Entry it collides with
        existing_id: EntryId,
    },
    /// Heuristic score below the configured minimum
    LowConfidence {
        /// The minimum that was not reached
        minimum: f64,
    },
    /// Candidate URL did not validate as reachable
    Unreachable {
        /// Check result
        status: CheckStatus,
        /// Final HTTP status, if any
        http_code: Option<u16>,
        /// Failure kind, if any
        error: Option<CheckErrorKind>,
    },
}

impl std::fmt::Display for RejectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RejectReason::MissingField { field } => write!(f, "missing {field}"),
            RejectReason::InvalidUrl => f.write_str("invalid URL"),
            RejectReason::UnknownCategory => f.write_str("unknown category"),
            RejectReason::DuplicateUrl { existing_id } => {
                write!(f, "duplicate URL of entry {existing_id}")
            }
            RejectReason::DuplicateName { existing_id } => {
                write!(f, "duplicate name of entry {existing_id}")
            }
            RejectReason::LowConfidence { minimum } => {
                write!(f, "confidence below {minimum:.2}")
            }
            RejectReason::Unreachable {
                status, http_code, ..
            } => match http_code {
                Some(code) => write!(f, "unreachable ({status}, HTTP {code})"),
                None => write!(f, "unreachable ({status})"),
            },
        }
    }
}

/// A candidate that was turned down, with the reason
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RejectedCandidate {
    /// The candidate as collected
    #[serde(flatten)]
    pub candidate: DiscoveryCandidate,
    /// Why it was rejected
    #[serde(flatten)]
    pub reason: RejectReason,
}

/// An entry created from a candidate
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AddedEntry {
    /// The new entry
    #[serde(flatten)]
    pub entry: CertificationEntry,
    /// Source that produced the candidate
    pub source_id: String,
    /// Candidate score
    pub confidence: f64,
    /// Position of the candidate in the merged slice
    #[serde(skip)]
    pub candidate_index: usize,
}

/// An entry dropped by the confirmed-dead rule
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RemovedEntry {
    /// The entry as it was when removed
    #[serde(flatten)]
    pub entry: CertificationEntry,
    /// Final HTTP status observed, if any
    pub http_code: Option<u16>,
}

/// Result of [`merge`]
#[derive(Clone, Debug, Default)]
pub struct MergeOutcome {
    /// Next snapshot
    pub dataset: Dataset,
    /// Entries created from candidates, in insertion order
    pub added: Vec<AddedEntry>,
    /// Entries removed as confirmed dead, in dataset order
    pub removed: Vec<RemovedEntry>,
    /// Candidates turned down, in candidate order
    pub rejected: Vec<RejectedCandidate>,
}

/// Fingerprints of the entries a candidate is compared against
#[derive(Default)]
struct DedupIndex {
    urls: HashMap<String, EntryId>,
    names: Vec<(String, BTreeSet<String>, EntryId)>,
}

impl DedupIndex {
    fn insert(&mut self, entry: &CertificationEntry) {
        if let Some(fp) = url_fingerprint(&entry.url) {
            self.urls.entry(fp).or_insert(entry.id);
        }
        self.names
            .push((provider_key(&entry.provider), name_tokens(&entry.name), entry.id));
    }

    fn find_duplicate(
        &self,
        url_fp: &str,
        provider: &str,
        name: &str,
        threshold: f64,
    ) -> Option<RejectReason> {
        if let Some(&existing_id) = self.urls.get(url_fp) {
            return Some(RejectReason::DuplicateUrl { existing_id });
        }
        let provider = provider_key(provider);
        let tokens = name_tokens(name);
        self.names
            .iter()
            .find(|(p, t, _)| *p == provider && jaccard(t, &tokens) >= threshold)
            .map(|(_, _, existing_id)| RejectReason::DuplicateName {
                existing_id: *existing_id,
            })
    }
}

/// Collapse runs of whitespace and trim
pub(crate) fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Field-level checks a candidate must pass before deduplication
fn check_fields(
    candidate: &DiscoveryCandidate,
    taxonomy: &Taxonomy,
) -> Result<(String, String), RejectReason> {
    let missing = |field: &str| RejectReason::MissingField {
        field: field.to_string(),
    };
    if candidate.name.trim().is_empty() {
        return Err(missing("name"));
    }
    if candidate.provider.trim().is_empty() {
        return Err(missing("provider"));
    }
    if candidate.url.trim().is_empty() {
        return Err(missing("url"));
    }
    let url = normalize_url(&candidate.url).ok_or(RejectReason::InvalidUrl)?;
    let category = match candidate.category.as_deref().map(str::trim) {
        None | Some("") => return Err(missing("category")),
        Some(category) if !taxonomy.contains(category) => {
            return Err(RejectReason::UnknownCategory);
        }
        Some(category) => category.to_string(),
    };
    Ok((url, category))
}

fn entry_from_candidate(
    id: EntryId,
    candidate: &DiscoveryCandidate,
    url: String,
    category: String,
) -> CertificationEntry {
    let provider = collapse_whitespace(&candidate.provider);
    let description = match collapse_whitespace(&candidate.description) {
        d if d.is_empty() => format!("Free certification from {provider}"),
        d => d,
    };
    CertificationEntry {
        id,
        category,
        name: collapse_whitespace(&candidate.name),
        provider,
        url,
        description,
        duration: "Self-paced".to_string(),
        level: Level::Beginner,
        prerequisites: None,
        expiration: None,
        consecutive_dead_count: 0,
        last_checked_at: None,
        last_status: None,
    }
}

/// Produce the next snapshot from `dataset`, this run's outcomes and candidates
pub fn merge(
    mut dataset: Dataset,
    outcomes: &[ValidationOutcome],
    candidates: &[DiscoveryCandidate],
    policy: &MergePolicy,
) -> MergeOutcome {
    let by_id: HashMap<EntryId, &ValidationOutcome> =
        outcomes.iter().map(|o| (o.entry_id, o)).collect();

    for entry in dataset.entries.iter_mut() {
        if let Some(outcome) = by_id.get(&entry.id) {
            apply_outcome(entry, outcome);
        }
    }

    let mut removed = Vec::new();
    if policy.prune_dead {
        let (dead, alive): (Vec<_>, Vec<_>) = std::mem::take(&mut dataset.entries)
            .into_iter()
            .partition(|e| is_removal_eligible(e, policy.dead_threshold));
        dataset.entries = alive;
        removed = dead
            .into_iter()
            .map(|entry| {
                let http_code = by_id.get(&entry.id).and_then(|o| o.http_code);
                tracing::info!(
                    entry_id = %entry.id,
                    url = %entry.url,
                    dead_count = entry.consecutive_dead_count,
                    "Removing confirmed-dead entry"
                );
                RemovedEntry { entry, http_code }
            })
            .collect();
    }

    let mut index = DedupIndex::default();
    for entry in &dataset.entries {
        index.insert(entry);
    }

    let mut added = Vec::new();
    let mut rejected = Vec::new();
    let mut reject = |candidate: &DiscoveryCandidate, reason: RejectReason| {
        tracing::debug!(
            source_id = %candidate.source_id,
            url = %candidate.url,
            reason = %reason,
            "Candidate rejected"
        );
        rejected.push(RejectedCandidate {
            candidate: candidate.clone(),
            reason,
        });
    };

    for (candidate_index, candidate) in candidates.iter().enumerate() {
        let (url, category) = match check_fields(candidate, &policy.taxonomy) {
            Ok(fields) => fields,
            Err(reason) => {
                reject(candidate, reason);
                continue;
            }
        };
        let Some(url_fp) = url_fingerprint(&url) else {
            reject(candidate, RejectReason::InvalidUrl);
            continue;
        };
        if let Some(reason) = index.find_duplicate(
            &url_fp,
            &candidate.provider,
            &candidate.name,
            policy.name_similarity,
        ) {
            reject(candidate, reason);
            continue;
        }

        let id = dataset.allocate_id();
        let entry = entry_from_candidate(id, candidate, url, category);
        index.insert(&entry);
        dataset.insert_in_group(entry.clone());
        added.push(AddedEntry {
            entry,
            source_id: candidate.source_id.clone(),
            confidence: candidate.confidence,
            candidate_index,
        });
    }

    MergeOutcome {
        dataset,
        added,
        removed,
        rejected,
    }
}
