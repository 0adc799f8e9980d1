//! # certkeeper
//!
//! Maintenance pipeline for a curated, human-edited dataset of free online
//! certifications.
//!
//! ## What a run does
//!
//! - **Validates** every entry's URL concurrently, classifying each as valid,
//!   dead (404/410) or ambiguous (blocked, server errors, timeouts)
//! - **Removes** entries only after they were confirmed dead on consecutive runs
//! - **Discovers** new candidates from configured catalog pages and web search
//! - **Merges** candidates into the dataset with URL and name deduplication
//! - **Replaces** the CSV, its JSON projection, the maintenance state and the
//!   run report in one all-or-nothing step
//!
//! ## Quick Start
//!
//! ```no_run
//! use certkeeper::{Config, Pipeline, RunMode};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut config = Config::load(None)?;
//!     config.apply_env()?;
//!
//!     let pipeline = Pipeline::new(config)?;
//!     let report = pipeline.run(RunMode::Maintain).await?;
//!     println!("{}", report.summary_line());
//!
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Configuration types
pub mod config;
/// Discovery of new candidates from configured sources
pub mod discovery;
/// Error types
pub mod error;
/// Candidate deduplication and snapshot merging
pub mod merge;
/// Pipeline orchestration
pub mod pipeline;
/// Per-host request limiting
pub mod rate_limiter;
/// Replacement URLs for entries about to be removed
pub mod repair;
/// Run reports
pub mod report;
/// Retry logic with exponential backoff
pub mod retry;
/// Dataset persistence
pub mod store;
/// Category taxonomy and levels
pub mod taxonomy;
/// Core types
pub mod types;
/// URL liveness checks
pub mod validator;

// Re-export commonly used types
pub use config::{Config, SourceConfig};
pub use discovery::{DiscoveryRun, DiscoveryScraper, SourceOutcome, SourceReport};
pub use error::{CheckError, DataIntegrityError, DiscoveryError, Error, Result};
pub use merge::{MergeOutcome, MergePolicy, RejectReason, merge};
pub use pipeline::{Pipeline, RunMode};
pub use rate_limiter::HostRateLimiter;
pub use repair::UrlRepair;
pub use report::RunReport;
pub use store::DatasetStore;
pub use types::{
    CertificationEntry, CheckStatus, Dataset, DiscoveryCandidate, EntryId, ValidationOutcome,
};
pub use validator::UrlValidator;
