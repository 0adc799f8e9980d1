//! Error types for certkeeper
//!
//! This module provides the error taxonomy for the maintenance pipeline:
//! - [`Error`] - crate-level error returned by fallible public operations
//! - [`DataIntegrityError`] - the only class of error that is fatal to a run
//! - [`CheckError`] - the failure of one HTTP request made by the validator or scraper
//! - [`DiscoveryError`] - a discovery source that could not be enumerated or parsed
//!
//! Per-URL and per-source failures never escape a run: they are folded into the
//! [`RunReport`](crate::report::RunReport). Only [`Error`] values reach the caller.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Result type alias for certkeeper operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for certkeeper
///
/// Every variant aborts the current run before the dataset is replaced.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "validator.concurrency")
        key: Option<String>,
    },

    /// The dataset could not be read, was malformed, or could not be written
    #[error("data integrity error: {0}")]
    DataIntegrity(#[from] DataIntegrityError),

    /// The run exceeded its overall deadline
    #[error("run deadline of {}s exceeded; dataset left untouched", .deadline.as_secs())]
    DeadlineExceeded {
        /// The configured deadline
        deadline: Duration,
    },

    /// HTTP client could not be constructed
    #[error("failed to create HTTP client: {0}")]
    Network(#[from] reqwest::Error),

    /// I/O error outside of the dataset files (e.g. reading a config file)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Other error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Shorthand for a configuration error tied to a specific key
    pub fn config(key: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Config {
            message: message.into(),
            key: Some(key.into()),
        }
    }
}

/// Errors that make the dataset untrustworthy to read or replace.
///
/// Any of these aborts the run before the atomic replace, leaving the previous
/// snapshot in place.
#[derive(Debug, Error)]
pub enum DataIntegrityError {
    /// A dataset file could not be opened or read
    #[error("cannot read {path}: {source}")]
    Unreadable {
        /// File that failed to read
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// The canonical CSV is structurally invalid
    #[error("malformed CSV {path} (line {line}): {reason}")]
    MalformedCsv {
        /// CSV file path
        path: PathBuf,
        /// 1-based line number (0 when the header itself is wrong)
        line: u64,
        /// What is wrong with the row
        reason: String,
    },

    /// The maintenance state sidecar is invalid
    #[error("malformed maintenance state {path}: {reason}")]
    MalformedState {
        /// Sidecar file path
        path: PathBuf,
        /// What is wrong with the file
        reason: String,
    },

    /// A row references a category outside the taxonomy
    #[error("unknown category {category:?} on line {line}")]
    UnknownCategory {
        /// 1-based CSV line
        line: u64,
        /// The offending category
        category: String,
    },

    /// Two rows normalize to the same URL
    #[error("duplicate URL {url} on lines {first_line} and {line}")]
    DuplicateUrl {
        /// Normalized URL shared by both rows
        url: String,
        /// Line of the first occurrence
        first_line: u64,
        /// Line of the repeated occurrence
        line: u64,
    },

    /// The same id is assigned to more than one entry
    #[error("duplicate entry id {id}")]
    DuplicateId {
        /// The repeated id
        id: u64,
    },

    /// Writing or renaming a staged file failed
    #[error("failed to write {path}: {source}")]
    WriteFailed {
        /// Destination path
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },
}

/// Failure of a single HTTP request issued by the validator or the scraper.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CheckError {
    /// Request did not complete within the per-request timeout
    #[error("request timed out")]
    Timeout,

    /// TCP/TLS connection could not be established or was reset
    #[error("connection error: {0}")]
    Connect(String),

    /// Server answered with a status that is neither success nor confirmed not-found
    #[error("HTTP {0}")]
    Status(u16),

    /// Any other client-side failure (bad redirect chain, body decode, invalid URL)
    #[error("request error: {0}")]
    Request(String),

    /// The run deadline fired while the request was pending
    #[error("cancelled by run deadline")]
    Cancelled,
}

impl CheckError {
    /// Coarse kind recorded in validation outcomes and reports
    pub fn kind(&self) -> CheckErrorKind {
        match self {
            CheckError::Timeout => CheckErrorKind::Timeout,
            CheckError::Connect(_) => CheckErrorKind::Connect,
            CheckError::Status(403) | CheckError::Status(429) => CheckErrorKind::Blocked,
            CheckError::Status(_) => CheckErrorKind::ServerError,
            CheckError::Request(_) => CheckErrorKind::Request,
            CheckError::Cancelled => CheckErrorKind::Cancelled,
        }
    }

    /// HTTP status carried by the error, if any
    pub fn http_code(&self) -> Option<u16> {
        match self {
            CheckError::Status(code) => Some(*code),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for CheckError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            CheckError::Timeout
        } else if e.is_connect() {
            CheckError::Connect(e.to_string())
        } else if let Some(status) = e.status() {
            CheckError::Status(status.as_u16())
        } else {
            CheckError::Request(e.to_string())
        }
    }
}

/// Serializable classification of a [`CheckError`]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckErrorKind {
    /// Per-request timeout
    Timeout,
    /// Connection refused/reset, DNS, TLS
    Connect,
    /// 403 or 429, usually anti-automation defenses
    Blocked,
    /// 5xx or an unexpected 4xx
    ServerError,
    /// Client-side request failure
    Request,
    /// Run deadline fired
    Cancelled,
}

/// Errors raised by discovery adapters.
///
/// These never abort a run; they are recorded per source in the report.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DiscoveryError {
    /// No listing page of the source could be fetched
    #[error("source {source_id} unavailable: {reason}")]
    SourceUnavailable {
        /// Configured source id
        source_id: String,
        /// Last fetch error
        reason: String,
    },

    /// A page or link could not be turned into a candidate
    #[error("parse error in {source_id}: {reason}")]
    Parse {
        /// Configured source id
        source_id: String,
        /// What could not be parsed
        reason: String,
    },

    /// The source names an adapter kind that is not registered
    #[error("source {source_id} uses unknown adapter {kind:?}")]
    UnknownAdapter {
        /// Configured source id
        source_id: String,
        /// The unregistered kind
        kind: String,
    },
}
