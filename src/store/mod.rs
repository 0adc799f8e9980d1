//! Dataset persistence
//!
//! The [`DatasetStore`] exposes only two operations on the dataset files:
//! - [`load`](DatasetStore::load) reads the canonical CSV and the maintenance
//!   state sidecar into a [`Dataset`]
//! - [`stage_snapshot`](DatasetStore::stage_snapshot) prepares the CSV, the
//!   sidecar and the JSON projection for an all-or-nothing [`Staging::commit`]
//!
//! CSV rows are matched to sidecar records by URL fingerprint. Rows without a
//! record are new manual contributions and get fresh ids above the persisted
//! `next_id`, in row order.

pub mod atomic;
pub mod csv_file;
pub mod projection;
pub mod state;

use chrono::{DateTime, Utc};
use std::path::Path;

use crate::config::PathsConfig;
use crate::error::{DataIntegrityError, Result};
use crate::taxonomy::Taxonomy;
use crate::types::Dataset;

pub use atomic::Staging;
pub use csv_file::CSV_HEADER;
pub use projection::Projection;
pub use state::StateFile;

/// Reader and writer of the dataset files
#[derive(Clone, Debug)]
pub struct DatasetStore {
    paths: PathsConfig,
    taxonomy: Taxonomy,
}

fn read_file(path: &Path) -> std::result::Result<Vec<u8>, DataIntegrityError> {
    std::fs::read(path).map_err(|source| DataIntegrityError::Unreadable {
        path: path.to_path_buf(),
        source,
    })
}

impl DatasetStore {
    /// Store over `paths`, validating categories against `taxonomy`
    pub fn new(paths: PathsConfig, taxonomy: Taxonomy) -> Self {
        Self { paths, taxonomy }
    }

    /// File locations
    pub fn paths(&self) -> &PathsConfig {
        &self.paths
    }

    /// Read the sidecar, or an empty state when there is none yet
    fn read_state(&self) -> std::result::Result<StateFile, DataIntegrityError> {
        match std::fs::read(&self.paths.state) {
            Ok(bytes) => StateFile::parse(&self.paths.state, &bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(
                    path = %self.paths.state.display(),
                    "No maintenance state found, assigning fresh ids"
                );
                Ok(StateFile::default())
            }
            Err(source) => Err(DataIntegrityError::Unreadable {
                path: self.paths.state.clone(),
                source,
            }),
        }
    }

    /// Load the current snapshot
    ///
    /// A missing sidecar is not an error (first run, or a freshly cloned
    /// dataset); a missing or malformed CSV is.
    pub fn load(&self) -> std::result::Result<Dataset, DataIntegrityError> {
        let csv_bytes = read_file(&self.paths.csv)?;
        let rows = csv_file::parse_csv(&self.paths.csv, &csv_bytes, &self.taxonomy)?;

        let state = self.read_state()?;
        let records = if state.matches_csv(&csv_bytes) {
            state.by_fingerprint()
        } else {
            tracing::warn!(
                path = %self.paths.csv.display(),
                "Dataset CSV differs from the one the maintenance state was committed with"
            );
            state.with_retired_by_fingerprint()
        };

        let mut entries = Vec::with_capacity(rows.len());
        let mut fresh = Vec::new();
        for (index, row) in rows.into_iter().enumerate() {
            let mut entry = row.entry;
            match records.get(&row.fingerprint) {
                Some(record) => state::restore(&mut entry, record),
                None => fresh.push(index),
            }
            entries.push(entry);
        }

        let mut dataset = Dataset::new(entries, state.next_id);
        for &index in &fresh {
            let id = dataset.allocate_id();
            dataset.entries[index].id = id;
        }

        tracing::info!(
            path = %self.paths.csv.display(),
            entries = dataset.len(),
            new_rows = fresh.len(),
            next_id = dataset.next_id,
            "Loaded dataset"
        );
        Ok(dataset)
    }

    /// Stage the CSV, sidecar and projection of `dataset`, in commit order
    ///
    /// The CSV is renamed first: a commit interrupted after it leaves the new
    /// rows next to the previous sidecar, which still holds every surviving
    /// id. The CSV is left out when its canonical form equals the file on
    /// disk, so a run that changes nothing does not rewrite it.
    pub fn stage_snapshot(
        &self,
        staging: &mut Staging,
        dataset: &Dataset,
        generated_at: DateTime<Utc>,
    ) -> Result<()> {
        let csv = csv_file::render_csv(&self.paths.csv, &dataset.entries)?;
        let unchanged = std::fs::read(&self.paths.csv)
            .map(|current| current == csv)
            .unwrap_or(false);
        if unchanged {
            tracing::debug!(path = %self.paths.csv.display(), "Dataset CSV unchanged");
        } else {
            staging.stage(&self.paths.csv, &csv)?;
        }

        let mut state = StateFile::from_dataset(dataset, &csv);
        state.retire_missing(&self.read_state()?);
        staging.stage(&self.paths.state, &state.render()?)?;

        staging.stage(
            &self.paths.json,
            &Projection::new(dataset, generated_at).render()?,
        )?;
        Ok(())
    }

    /// Stage and commit `dataset` in one step
    pub fn replace(&self, dataset: &Dataset, generated_at: DateTime<Utc>) -> Result<()> {
        let mut staging = Staging::new();
        self.stage_snapshot(&mut staging, dataset, generated_at)?;
        staging.commit()?;
        Ok(())
    }
}
