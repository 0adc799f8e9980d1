//! Repair of dead catalog URLs
//!
//! Course platforms move pages around. Before an entry is removed as confirmed
//! dead, the pipeline tries a few replacement URLs: a configured list of known
//! moves first, then the URL layouts the large platforms use, built from a slug
//! of the entry name. The first replacement that validates keeps the entry under
//! its new URL.
//!
//! Planning and applying repairs is pure; only checking the replacement URLs
//! touches the network, through the [`UrlValidator`](crate::UrlValidator).

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use url::Url;

use crate::merge::fingerprint::{normalize_url, url_fingerprint};
use crate::types::{CertificationEntry, CheckStatus, Dataset, EntryId, ValidationOutcome};
use crate::validator::{UrlCheck, apply_outcome, is_removal_eligible};

/// An entry kept under a new URL instead of being removed
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct UrlRepair {
    /// Entry id
    pub entry_id: EntryId,
    /// Entry name
    pub name: String,
    /// The dead URL
    pub old_url: String,
    /// The replacement that validated
    pub new_url: String,
    /// HTTP status of the replacement
    pub http_code: Option<u16>,
}

/// Replacement URLs to try for one entry that is about to be removed
#[derive(Clone, Debug, PartialEq)]
pub struct RepairPlan {
    /// Entry id
    pub entry_id: EntryId,
    /// Entry name
    pub name: String,
    /// The dead URL
    pub old_url: String,
    /// Candidates in preference order
    pub replacements: Vec<String>,
}

/// Lowercase ASCII slug with single dashes
fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    for c in name.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
        } else if (c.is_whitespace() || c == '-') && !slug.ends_with('-') {
            slug.push('-');
        }
    }
    slug.trim_matches('-').to_string()
}

/// URL layouts of the platforms whose pages are known to move
fn platform_layouts(host: &str) -> &'static [&'static str] {
    if host.ends_with("coursera.org") {
        &[
            "https://www.coursera.org/learn/",
            "https://www.coursera.org/specializations/",
            "https://www.coursera.org/professional-certificates/",
        ]
    } else if host.ends_with("edx.org") {
        &["https://www.edx.org/learn/", "https://www.edx.org/course/"]
    } else if host.ends_with("futurelearn.com") {
        &["https://www.futurelearn.com/courses/"]
    } else if host == "learn.microsoft.com" {
        &[
            "https://learn.microsoft.com/en-us/training/paths/",
            "https://learn.microsoft.com/en-us/training/modules/",
        ]
    } else {
        &[]
    }
}

/// Replacement URLs for `entry`, known moves first, without its own URL
pub fn replacement_urls(
    entry: &CertificationEntry,
    known: &BTreeMap<String, String>,
) -> Vec<String> {
    let Some(own) = url_fingerprint(&entry.url) else {
        return Vec::new();
    };

    let mut urls: Vec<String> = known
        .iter()
        .filter(|(old, _)| url_fingerprint(old).as_deref() == Some(own.as_str()))
        .filter_map(|(_, new)| normalize_url(new))
        .collect();

    let host = Url::parse(&entry.url)
        .ok()
        .and_then(|u| u.host_str().map(str::to_ascii_lowercase))
        .unwrap_or_default();
    let slug = slugify(&entry.name);
    if !slug.is_empty() {
        urls.extend(
            platform_layouts(&host)
                .iter()
                .map(|prefix| format!("{prefix}{slug}")),
        );
    }

    let mut seen = HashSet::from([own]);
    urls.retain(|url| url_fingerprint(url).is_some_and(|fp| seen.insert(fp)));
    urls
}

/// Plans for the entries this run's outcomes would make removable
///
/// Replacements already used by another entry are left out.
pub fn plan_repairs(
    dataset: &Dataset,
    outcomes: &[ValidationOutcome],
    dead_threshold: u32,
    known: &BTreeMap<String, String>,
) -> Vec<RepairPlan> {
    let by_id: HashMap<EntryId, &ValidationOutcome> =
        outcomes.iter().map(|o| (o.entry_id, o)).collect();
    let taken: HashSet<String> = dataset
        .entries
        .iter()
        .filter_map(|e| url_fingerprint(&e.url))
        .collect();

    dataset
        .entries
        .iter()
        .filter_map(|entry| {
            let outcome = by_id.get(&entry.id)?;
            let mut next = entry.clone();
            apply_outcome(&mut next, outcome);
            if !is_removal_eligible(&next, dead_threshold) {
                return None;
            }
            let replacements: Vec<String> = replacement_urls(entry, known)
                .into_iter()
                .filter(|url| url_fingerprint(url).is_some_and(|fp| !taken.contains(&fp)))
                .collect();
            (!replacements.is_empty()).then(|| RepairPlan {
                entry_id: entry.id,
                name: entry.name.clone(),
                old_url: entry.url.clone(),
                replacements,
            })
        })
        .collect()
}

/// Pick the first valid replacement of each plan
///
/// `checks` holds one result per replacement, in plan order. A URL claimed by
/// an earlier plan is not given to a later one.
pub fn choose_repairs(plans: &[RepairPlan], checks: &[UrlCheck]) -> Vec<UrlRepair> {
    let mut checks = checks.iter();
    let mut claimed = HashSet::new();
    let mut repairs = Vec::new();

    for plan in plans {
        let mut chosen = None;
        for url in &plan.replacements {
            let Some(check) = checks.next() else {
                break;
            };
            if chosen.is_some() || check.status != CheckStatus::Valid {
                continue;
            }
            if url_fingerprint(url).is_some_and(|fp| claimed.insert(fp)) {
                chosen = Some(UrlRepair {
                    entry_id: plan.entry_id,
                    name: plan.name.clone(),
                    old_url: plan.old_url.clone(),
                    new_url: url.clone(),
                    http_code: check.http_code,
                });
            }
        }
        repairs.extend(chosen);
    }
    repairs
}

/// Move repaired entries to their new URL and count this run's check as valid
pub fn apply_repairs(
    dataset: &mut Dataset,
    outcomes: &mut [ValidationOutcome],
    repairs: &[UrlRepair],
) {
    for repair in repairs {
        if let Some(entry) = dataset.entries.iter_mut().find(|e| e.id == repair.entry_id) {
            entry.url = repair.new_url.clone();
        }
        if let Some(outcome) = outcomes.iter_mut().find(|o| o.entry_id == repair.entry_id) {
            outcome.url = repair.new_url.clone();
            outcome.status = CheckStatus::Valid;
            outcome.http_code = repair.http_code;
            outcome.error = None;
        }
        tracing::info!(
            entry_id = %repair.entry_id,
            url = %repair.old_url,
            new_url = %repair.new_url,
            "Repaired dead URL"
        );
    }
}
