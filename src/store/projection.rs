//! Read-only JSON projection of the dataset consumed by the static site

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;

use crate::types::{Dataset, EntryId};

/// Dataset summary shown above the listing
#[derive(Debug, Serialize)]
pub struct ProjectionMetadata {
    /// Number of entries
    pub total_certifications: usize,
    /// When the projection was generated (RFC 3339)
    pub last_updated: String,
    /// Sorted distinct categories
    pub categories: Vec<String>,
    /// Sorted distinct providers
    pub providers: Vec<String>,
    /// Sorted distinct levels
    pub levels: Vec<String>,
}

/// One projected entry
#[derive(Debug, Serialize)]
pub struct ProjectedEntry<'a> {
    /// Stable id
    pub id: EntryId,
    /// Category
    pub category: &'a str,
    /// Name
    pub name: &'a str,
    /// Provider
    pub provider: &'a str,
    /// URL
    pub url: &'a str,
    /// Description
    pub description: &'a str,
    /// Duration
    pub duration: &'a str,
    /// Level
    pub level: &'a str,
    /// Prerequisites
    pub prerequisites: Option<&'a str>,
    /// Expiration
    pub expiration: Option<&'a str>,
}

/// Contents of `certifications.json`
#[derive(Debug, Serialize)]
pub struct Projection<'a> {
    /// Summary
    pub metadata: ProjectionMetadata,
    /// Entries in dataset order
    pub certifications: Vec<ProjectedEntry<'a>>,
}

impl<'a> Projection<'a> {
    /// Project `dataset` as of `generated_at`
    pub fn new(dataset: &'a Dataset, generated_at: DateTime<Utc>) -> Self {
        Self {
            metadata: ProjectionMetadata {
                total_certifications: dataset.len(),
                last_updated: generated_at.to_rfc3339_opts(SecondsFormat::Secs, true),
                categories: dataset.categories(),
                providers: dataset.providers(),
                levels: dataset.levels(),
            },
            certifications: dataset
                .entries
                .iter()
                .map(|e| ProjectedEntry {
                    id: e.id,
                    category: &e.category,
                    name: &e.name,
                    provider: &e.provider,
                    url: &e.url,
                    description: &e.description,
                    duration: &e.duration,
                    level: e.level.as_str(),
                    prerequisites: e.prerequisites.as_deref(),
                    expiration: e.expiration.as_deref(),
                })
                .collect(),
        }
    }

    /// Pretty JSON with a trailing newline
    pub fn render(&self) -> Result<Vec<u8>, serde_json::Error> {
        let mut bytes = serde_json::to_vec_pretty(self)?;
        bytes.push(b'\n');
        Ok(bytes)
    }
}
