//! Core types for certkeeper

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::error::CheckErrorKind;
use crate::taxonomy::Level;

/// Unique, stable identifier of a dataset entry
///
/// Ids are assigned sequentially and never reused after an entry is removed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntryId(pub u64);

impl EntryId {
    /// Get the inner u64 value
    pub fn get(&self) -> u64 {
        self.0
    }
}

impl From<u64> for EntryId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for EntryId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Result class of one URL check
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckStatus {
    /// 2xx/3xx final response
    Valid,
    /// 404 or 410: confirmed not found
    Dead,
    /// 403, 429, 5xx, timeout or network error: cannot tell death from blocking
    Ambiguous,
}

impl CheckStatus {
    /// Classify a final HTTP status code
    pub fn from_http(code: u16) -> Self {
        match code {
            200..=399 => CheckStatus::Valid,
            404 | 410 => CheckStatus::Dead,
            _ => CheckStatus::Ambiguous,
        }
    }
}

impl std::fmt::Display for CheckStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            CheckStatus::Valid => "valid",
            CheckStatus::Dead => "dead",
            CheckStatus::Ambiguous => "ambiguous",
        };
        f.write_str(s)
    }
}

/// One certification record
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CertificationEntry {
    /// Stable sequential id
    pub id: EntryId,
    /// Category from the taxonomy
    pub category: String,
    /// Certification name
    pub name: String,
    /// Issuing provider
    pub provider: String,
    /// Normalized absolute URL
    pub url: String,
    /// Free-text description
    pub description: String,
    /// Free-text duration ("Self-paced", "6 hours", ...)
    pub duration: String,
    /// Difficulty level
    pub level: Level,
    /// Prerequisites, if any
    pub prerequisites: Option<String>,
    /// Expiration policy, if any
    pub expiration: Option<String>,
    /// Runs in a row that returned `Dead`
    #[serde(default)]
    pub consecutive_dead_count: u32,
    /// When the URL was last checked
    #[serde(default)]
    pub last_checked_at: Option<DateTime<Utc>>,
    /// Status of the last check
    #[serde(default)]
    pub last_status: Option<CheckStatus>,
}

/// The ordered certification dataset
///
/// Entries are grouped by category (groups in first-appearance order) and kept
/// in insertion order inside a group.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Dataset {
    /// Entries in canonical order
    pub entries: Vec<CertificationEntry>,
    /// Next id to hand out; strictly greater than every id ever assigned
    pub next_id: u64,
}

impl Dataset {
    /// Build a dataset, raising `next_id` above every present id
    pub fn new(entries: Vec<CertificationEntry>, next_id: u64) -> Self {
        let floor = entries.iter().map(|e| e.id.0 + 1).max().unwrap_or(1);
        Self {
            entries,
            next_id: next_id.max(floor),
        }
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the dataset has no entries
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Look up an entry by id
    pub fn get(&self, id: EntryId) -> Option<&CertificationEntry> {
        self.entries.iter().find(|e| e.id == id)
    }

    /// Hand out the next unused id
    pub fn allocate_id(&mut self) -> EntryId {
        let id = EntryId(self.next_id.max(1));
        self.next_id = id.0 + 1;
        id
    }

    /// Append `entry` at the end of its category group, or at the end of the
    /// dataset when the category is new
    pub fn insert_in_group(&mut self, entry: CertificationEntry) {
        match self
            .entries
            .iter()
            .rposition(|e| e.category == entry.category)
        {
            Some(last) => self.entries.insert(last + 1, entry),
            None => self.entries.push(entry),
        }
    }

    /// Sorted distinct categories
    pub fn categories(&self) -> Vec<String> {
        self.distinct(|e| &e.category)
    }

    /// Sorted distinct providers
    pub fn providers(&self) -> Vec<String> {
        self.distinct(|e| &e.provider)
    }

    /// Sorted distinct levels
    pub fn levels(&self) -> Vec<String> {
        self.entries
            .iter()
            .map(|e| e.level.as_str().to_string())
            .filter(|s| !s.is_empty())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    fn distinct<F>(&self, field: F) -> Vec<String>
    where
        F: Fn(&CertificationEntry) -> &String,
    {
        self.entries
            .iter()
            .map(|e| field(e).trim())
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }
}

/// Result of checking one entry's URL
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ValidationOutcome {
    /// Entry that was checked
    pub entry_id: EntryId,
    /// URL that was checked
    pub url: String,
    /// Classification
    pub status: CheckStatus,
    /// Final HTTP status, when a response was received
    pub http_code: Option<u16>,
    /// Failure kind, when no conclusive response was received
    pub error: Option<CheckErrorKind>,
    /// Requests issued, including retries
    pub attempt_count: u32,
    /// When the check finished
    pub timestamp: DateTime<Utc>,
}

/// A possible new entry found by a discovery source
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DiscoveryCandidate {
    /// Certification name (empty when missing)
    pub name: String,
    /// Provider (empty when missing)
    pub provider: String,
    /// Absolute URL (empty when missing)
    pub url: String,
    /// Short description or search snippet
    pub description: String,
    /// Category given by the source or inferred from keywords
    pub category: Option<String>,
    /// Source that produced the candidate
    pub source_id: String,
    /// Heuristic score in 0.0..=1.0
    pub confidence: f64,
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    /// Minimal valid entry for tests
    pub fn entry(id: u64, category: &str, name: &str, url: &str) -> CertificationEntry {
        CertificationEntry {
            id: EntryId(id),
            category: category.to_string(),
            name: name.to_string(),
            provider: "Example Org".to_string(),
            url: url.to_string(),
            description: format!("{name} description"),
            duration: "Self-paced".to_string(),
            level: Level::Beginner,
            prerequisites: None,
            expiration: None,
            consecutive_dead_count: 0,
            last_checked_at: None,
            last_status: None,
        }
    }

    /// Minimal candidate for tests
    pub fn candidate(name: &str, provider: &str, url: &str) -> DiscoveryCandidate {
        DiscoveryCandidate {
            name: name.to_string(),
            provider: provider.to_string(),
            url: url.to_string(),
            description: String::new(),
            category: Some("Cloud Computing".to_string()),
            source_id: "test-source".to_string(),
            confidence: 0.9,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::entry;
    use super::*;

    #[test]
    fn test_status_from_http() {
        assert_eq!(CheckStatus::from_http(200), CheckStatus::Valid);
        assert_eq!(CheckStatus::from_http(301), CheckStatus::Valid);
        assert_eq!(CheckStatus::from_http(404), CheckStatus::Dead);
        assert_eq!(CheckStatus::from_http(410), CheckStatus::Dead);
        assert_eq!(CheckStatus::from_http(403), CheckStatus::Ambiguous);
        assert_eq!(CheckStatus::from_http(500), CheckStatus::Ambiguous);
        assert_eq!(CheckStatus::from_http(429), CheckStatus::Ambiguous);
    }

    #[test]
    fn test_insert_in_group_appends_after_last_member() {
        let mut dataset = Dataset::new(
            vec![
                entry(1, "Cloud Computing", "A", "https://a.org/1"),
                entry(2, "Cloud Computing", "B", "https://a.org/2"),
                entry(3, "Data Science & Analytics", "C", "https://a.org/3"),
            ],
            4,
        );
        dataset.insert_in_group(entry(4, "Cloud Computing", "D", "https://a.org/4"));
        dataset.insert_in_group(entry(5, "Web Development", "E", "https://a.org/5"));

        let ids: Vec<u64> = dataset.entries.iter().map(|e| e.id.0).collect();
        assert_eq!(ids, vec![1, 2, 4, 3, 5]);
    }

    #[test]
    fn test_next_id_never_below_existing_ids() {
        let mut dataset = Dataset::new(vec![entry(9, "Cloud Computing", "A", "https://a.org")], 3);
        assert_eq!(dataset.next_id, 10);
        assert_eq!(dataset.allocate_id(), EntryId(10));
        assert_eq!(dataset.allocate_id(), EntryId(11));
    }

    #[test]
    fn test_empty_dataset_starts_at_one() {
        let mut dataset = Dataset::new(Vec::new(), 0);
        assert_eq!(dataset.allocate_id(), EntryId(1));
    }

    #[test]
    fn test_distinct_metadata_sorted() {
        let mut b = entry(2, "Cloud Computing", "B", "https://a.org/2");
        b.provider = "Acme".to_string();
        b.level = Level::Advanced;
        let dataset = Dataset::new(
            vec![entry(1, "Web Development", "A", "https://a.org/1"), b],
            3,
        );
        assert_eq!(
            dataset.categories(),
            vec!["Cloud Computing".to_string(), "Web Development".to_string()]
        );
        assert_eq!(
            dataset.providers(),
            vec!["Acme".to_string(), "Example Org".to_string()]
        );
        assert_eq!(
            dataset.levels(),
            vec!["Advanced".to_string(), "Beginner".to_string()]
        );
    }
}
