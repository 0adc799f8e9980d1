//! Run report
//!
//! A [`RunReport`] summarizes one pipeline run: validation counts, entries added
//! and removed, entries flagged for human review, rejected candidates and
//! per-source discovery diagnostics. It is persisted as JSON next to the dataset
//! and rendered as a Markdown status page, both staged with the snapshot so the
//! report always describes the files on disk.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt::Write as _;

use crate::config::PathsConfig;
use crate::discovery::{SourceOutcome, SourceReport};
use crate::error::{CheckErrorKind, Result};
use crate::merge::{AddedEntry, RejectedCandidate, RemovedEntry};
use crate::pipeline::RunMode;
use crate::repair::UrlRepair;
use crate::store::Staging;
use crate::types::{CertificationEntry, CheckStatus, EntryId, ValidationOutcome};

/// Flagged rows listed in the Markdown summary
pub const MAX_FLAGGED_ROWS: usize = 50;

/// Longest name shown in a Markdown table cell
const MAX_NAME_CHARS: usize = 50;

/// An entry that needs a human look
///
/// Either the check was inconclusive, or the URL answered `Dead` but has not
/// yet reached the removal threshold.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FlaggedEntry {
    /// Entry id
    pub id: EntryId,
    /// Entry name
    pub name: String,
    /// Entry provider
    pub provider: String,
    /// Checked URL
    pub url: String,
    /// Status of this run's check
    pub status: CheckStatus,
    /// Final HTTP status, if any
    pub http_code: Option<u16>,
    /// Failure kind, if any
    pub error: Option<CheckErrorKind>,
    /// Consecutive dead results so far
    pub consecutive_dead_count: u32,
}

/// Contents of the run report
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    /// Pipeline mode
    pub mode: RunMode,
    /// When the run started
    pub started_at: DateTime<Utc>,
    /// When the snapshot and this report were generated
    pub generated_at: DateTime<Utc>,
    /// Entries in the written dataset
    pub dataset_size: usize,
    /// URLs checked
    pub total: usize,
    /// Checks classified `Valid`
    pub valid: usize,
    /// Checks classified `Dead`
    pub dead: usize,
    /// Checks classified `Ambiguous`
    pub ambiguous: usize,
    /// Entries added from candidates
    pub added: Vec<AddedEntry>,
    /// Entries removed as confirmed dead
    pub removed: Vec<RemovedEntry>,
    /// Dead entries kept under a working replacement URL
    #[serde(default)]
    pub repaired: Vec<UrlRepair>,
    /// Entries kept but needing review
    pub flagged: Vec<FlaggedEntry>,
    /// Candidates that did not become entries
    pub rejected: Vec<RejectedCandidate>,
    /// Discovery diagnostics, one per polled source
    pub sources: Vec<SourceReport>,
    /// Whether entries were added, removed or moved to a new URL
    pub dataset_changed: bool,
}

/// Everything a report is built from
pub struct ReportInputs<'a> {
    /// Pipeline mode
    pub mode: RunMode,
    /// When the run started
    pub started_at: DateTime<Utc>,
    /// Generation timestamp shared with the snapshot
    pub generated_at: DateTime<Utc>,
    /// Entries after merging, with updated counters
    pub entries: &'a [CertificationEntry],
    /// This run's validation outcomes
    pub outcomes: &'a [ValidationOutcome],
    /// Entries added
    pub added: Vec<AddedEntry>,
    /// Entries removed
    pub removed: Vec<RemovedEntry>,
    /// Entries moved to a replacement URL
    pub repaired: Vec<UrlRepair>,
    /// Rejected candidates
    pub rejected: Vec<RejectedCandidate>,
    /// Discovery diagnostics
    pub sources: Vec<SourceReport>,
}

fn count(outcomes: &[ValidationOutcome], status: CheckStatus) -> usize {
    outcomes.iter().filter(|o| o.status == status).count()
}

impl RunReport {
    /// Build the report of one run
    pub fn new(inputs: ReportInputs<'_>) -> Self {
        let by_id: HashMap<EntryId, &CertificationEntry> =
            inputs.entries.iter().map(|e| (e.id, e)).collect();

        // Removed entries are not in `entries`, so only retained ones are flagged
        let flagged = inputs
            .outcomes
            .iter()
            .filter(|o| o.status != CheckStatus::Valid)
            .filter_map(|o| {
                by_id.get(&o.entry_id).map(|entry| FlaggedEntry {
                    id: entry.id,
                    name: entry.name.clone(),
                    provider: entry.provider.clone(),
                    url: o.url.clone(),
                    status: o.status,
                    http_code: o.http_code,
                    error: o.error,
                    consecutive_dead_count: entry.consecutive_dead_count,
                })
            })
            .collect();

        Self {
            mode: inputs.mode,
            started_at: inputs.started_at,
            generated_at: inputs.generated_at,
            dataset_size: inputs.entries.len(),
            total: inputs.outcomes.len(),
            valid: count(inputs.outcomes, CheckStatus::Valid),
            dead: count(inputs.outcomes, CheckStatus::Dead),
            ambiguous: count(inputs.outcomes, CheckStatus::Ambiguous),
            dataset_changed: !inputs.added.is_empty()
                || !inputs.removed.is_empty()
                || !inputs.repaired.is_empty(),
            added: inputs.added,
            removed: inputs.removed,
            repaired: inputs.repaired,
            flagged,
            rejected: inputs.rejected,
            sources: inputs.sources,
        }
    }

    /// Share of checked URLs that were valid, in percent
    pub fn valid_percentage(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        (self.valid as f64 / self.total as f64 * 10_000.0).round() / 100.0
    }

    /// One-paragraph summary printed at the end of a run
    pub fn summary_line(&self) -> String {
        format!(
            "{} run: {} entries, {} checked ({} valid, {} dead, {} ambiguous), \
             {} added, {} removed, {} repaired, {} flagged, {} candidates rejected.",
            self.mode,
            self.dataset_size,
            self.total,
            self.valid,
            self.dead,
            self.ambiguous,
            self.added.len(),
            self.removed.len(),
            self.repaired.len(),
            self.flagged.len(),
            self.rejected.len(),
        )
    }

    /// Pretty JSON with a trailing newline
    pub fn render_json(&self) -> Result<Vec<u8>> {
        let mut bytes = serde_json::to_vec_pretty(self)?;
        bytes.push(b'\n');
        Ok(bytes)
    }

    /// Markdown status page
    pub fn render_markdown(&self) -> String {
        let mut out = String::new();
        // Writing into a String cannot fail
        let _ = self.write_markdown(&mut out);
        out
    }

    fn write_markdown(&self, out: &mut String) -> std::fmt::Result {
        writeln!(out, "# Certification Maintenance Status\n")?;
        writeln!(
            out,
            "**Generated:** {} ({} run)\n",
            self.generated_at.to_rfc3339_opts(SecondsFormat::Secs, true),
            self.mode
        )?;

        writeln!(out, "## Summary\n")?;
        writeln!(out, "| Metric | Value |")?;
        writeln!(out, "|--------|-------|")?;
        writeln!(out, "| Certifications | {} |", self.dataset_size)?;
        writeln!(out, "| URLs checked | {} |", self.total)?;
        writeln!(out, "| Valid | {} |", self.valid)?;
        writeln!(out, "| Dead | {} |", self.dead)?;
        writeln!(out, "| Ambiguous | {} |", self.ambiguous)?;
        writeln!(out, "| Success rate | {}% |", self.valid_percentage())?;
        writeln!(out, "| Added | {} |", self.added.len())?;
        writeln!(out, "| Removed | {} |", self.removed.len())?;
        writeln!(out, "| Repaired | {} |", self.repaired.len())?;
        writeln!(out, "| Rejected candidates | {} |", self.rejected.len())?;

        if !self.removed.is_empty() {
            writeln!(out, "\n## Removed ({})\n", self.removed.len())?;
            for removed in &self.removed {
                let code = removed
                    .http_code
                    .map(|c| format!(" (HTTP {c})"))
                    .unwrap_or_default();
                writeln!(
                    out,
                    "- **{}** ({}) {}{}",
                    removed.entry.name, removed.entry.provider, removed.entry.url, code
                )?;
            }
        }

        if !self.repaired.is_empty() {
            writeln!(out, "\n## Repaired ({})\n", self.repaired.len())?;
            for repaired in &self.repaired {
                writeln!(
                    out,
                    "- **{}** {} -> {}",
                    repaired.name, repaired.old_url, repaired.new_url
                )?;
            }
        }

        if !self.added.is_empty() {
            writeln!(out, "\n## Added ({})\n", self.added.len())?;
            for added in &self.added {
                writeln!(
                    out,
                    "- **{}** ({}) {} [{}]",
                    added.entry.name, added.entry.provider, added.entry.url, added.entry.category
                )?;
            }
        }

        if !self.flagged.is_empty() {
            writeln!(out, "\n## Needs Review ({})\n", self.flagged.len())?;
            writeln!(out, "| Certification | Status | Detail |")?;
            writeln!(out, "|---------------|--------|--------|")?;
            for flagged in self.flagged.iter().take(MAX_FLAGGED_ROWS) {
                writeln!(
                    out,
                    "| {} | {} | {} |",
                    table_cell(&truncate(&flagged.name, MAX_NAME_CHARS)),
                    flagged.status,
                    flag_detail(flagged)
                )?;
            }
            if self.flagged.len() > MAX_FLAGGED_ROWS {
                writeln!(
                    out,
                    "\n*... and {} more*",
                    self.flagged.len() - MAX_FLAGGED_ROWS
                )?;
            }
        }

        if !self.sources.is_empty() {
            writeln!(out, "\n## Sources\n")?;
            writeln!(out, "| Source | Outcome | Candidates | Parse errors |")?;
            writeln!(out, "|--------|---------|------------|--------------|")?;
            for source in &self.sources {
                let outcome = match source.outcome {
                    SourceOutcome::Ok => "ok",
                    SourceOutcome::Unavailable => "unavailable",
                    SourceOutcome::Failed => "failed",
                };
                writeln!(
                    out,
                    "| {} | {} | {} | {} |",
                    table_cell(&source.id),
                    outcome,
                    source.candidates,
                    source.parse_error_count
                )?;
            }
        }
        Ok(())
    }

    /// Stage the JSON report and the Markdown summary
    pub fn stage(&self, staging: &mut Staging, paths: &PathsConfig) -> Result<()> {
        staging.stage(&paths.report, &self.render_json()?)?;
        staging.stage(&paths.summary, self.render_markdown().as_bytes())?;
        Ok(())
    }
}

fn flag_detail(flagged: &FlaggedEntry) -> String {
    let mut parts = Vec::new();
    if let Some(code) = flagged.http_code {
        parts.push(format!("HTTP {code}"));
    }
    if let Some(error) = flagged.error {
        // CheckErrorKind serializes as a bare snake_case string
        if let Ok(serde_json::Value::String(kind)) = serde_json::to_value(error) {
            parts.push(kind);
        }
    }
    if flagged.status == CheckStatus::Dead {
        parts.push(format!("dead {}x", flagged.consecutive_dead_count));
    }
    if parts.is_empty() {
        "-".to_string()
    } else {
        parts.join(", ")
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let head: String = s.chars().take(max).collect();
    format!("{head}...")
}

fn table_cell(s: &str) -> String {
    s.replace('|', "\\|")
}
