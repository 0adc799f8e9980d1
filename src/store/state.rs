//! Maintenance state sidecar
//!
//! The CSV has no columns for ids or counters, so they live next to it in a
//! small JSON file keyed by URL fingerprint.
//!
//! The sidecar also records the SHA-256 digest of the CSV it was committed
//! with and the records of entries that commit removed. When the CSV on disk
//! does not match the digest (a commit torn between the two renames, or a
//! hand edit), the retired records are consulted as well so rows keep their
//! ids.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{HashMap, HashSet};
use std::path::Path;

use crate::error::DataIntegrityError;
use crate::merge::fingerprint::url_fingerprint;
use crate::types::{CertificationEntry, CheckStatus, Dataset, EntryId};

/// Persisted state of one entry
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StateRecord {
    /// Entry id
    pub id: EntryId,
    /// Normalized URL the record belongs to
    pub url: String,
    /// Consecutive dead runs
    #[serde(default)]
    pub consecutive_dead_count: u32,
    /// Last check time
    #[serde(default)]
    pub last_checked_at: Option<DateTime<Utc>>,
    /// Last check status
    #[serde(default)]
    pub last_status: Option<CheckStatus>,
}

/// Contents of `maintenance_state.json`
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct StateFile {
    /// Id high-water mark
    pub next_id: u64,
    /// Digest of the CSV committed with this state
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub csv_digest: Option<String>,
    /// One record per entry, in dataset order
    #[serde(default)]
    pub entries: Vec<StateRecord>,
    /// Records of the entries removed by the commit that wrote this state
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub retired: Vec<StateRecord>,
}

/// Hex SHA-256 of a CSV file's bytes
pub fn csv_digest(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

impl StateFile {
    /// Capture the state of `dataset`, committed together with `csv`
    pub fn from_dataset(dataset: &Dataset, csv: &[u8]) -> Self {
        Self {
            next_id: dataset.next_id,
            csv_digest: Some(csv_digest(csv)),
            entries: dataset
                .entries
                .iter()
                .map(|e| StateRecord {
                    id: e.id,
                    url: e.url.clone(),
                    consecutive_dead_count: e.consecutive_dead_count,
                    last_checked_at: e.last_checked_at,
                    last_status: e.last_status,
                })
                .collect(),
            retired: Vec::new(),
        }
    }

    /// Keep the records of `previous` whose entries are gone from this state
    pub fn retire_missing(&mut self, previous: &StateFile) {
        let live: HashSet<EntryId> = self.entries.iter().map(|r| r.id).collect();
        self.retired = previous
            .entries
            .iter()
            .filter(|r| !live.contains(&r.id))
            .cloned()
            .collect();
    }

    /// Whether `csv` is the file this state was committed with
    ///
    /// A sidecar without a digest predates digests and is trusted.
    pub fn matches_csv(&self, csv: &[u8]) -> bool {
        self.csv_digest
            .as_deref()
            .is_none_or(|digest| digest == csv_digest(csv))
    }

    /// Parse a sidecar, rejecting duplicate ids
    pub fn parse(path: &Path, bytes: &[u8]) -> Result<Self, DataIntegrityError> {
        let state: StateFile =
            serde_json::from_slice(bytes).map_err(|e| DataIntegrityError::MalformedState {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;

        let mut ids = HashSet::new();
        for record in state.entries.iter().chain(&state.retired) {
            if !ids.insert(record.id) {
                return Err(DataIntegrityError::DuplicateId { id: record.id.get() });
            }
        }
        Ok(state)
    }

    /// Pretty JSON with a trailing newline
    pub fn render(&self) -> Result<Vec<u8>, serde_json::Error> {
        let mut bytes = serde_json::to_vec_pretty(self)?;
        bytes.push(b'\n');
        Ok(bytes)
    }

    /// Records keyed by URL fingerprint
    pub fn by_fingerprint(&self) -> HashMap<String, &StateRecord> {
        self.entries
            .iter()
            .filter_map(|r| url_fingerprint(&r.url).map(|fp| (fp, r)))
            .collect()
    }

    /// Live and retired records keyed by URL fingerprint, live records first
    pub fn with_retired_by_fingerprint(&self) -> HashMap<String, &StateRecord> {
        let mut records = self.by_fingerprint();
        for record in &self.retired {
            if let Some(fp) = url_fingerprint(&record.url) {
                records.entry(fp).or_insert(record);
            }
        }
        records
    }
}

/// Copy persisted state onto an entry
pub fn restore(entry: &mut CertificationEntry, record: &StateRecord) {
    entry.id = record.id;
    entry.consecutive_dead_count = record.consecutive_dead_count;
    entry.last_checked_at = record.last_checked_at;
    entry.last_status = record.last_status;
}
