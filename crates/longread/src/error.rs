//! Typed error hierarchy for longread.
//!
//! One enum per failure domain:
//! - `ConfigError`: bad level names, missing credentials, invalid settings.
//!   Raised before any chunking starts.
//! - `ExtractionError`: the source could not be turned into text.
//! - `CompletionError`: a completion request failed for good (retries
//!   exhausted or a non-retryable service error).
//! - `RunError`: a summarization run aborted; names the chunk when one was
//!   in flight.
//! - `OutputError`: the finished summary could not be written.

use std::path::PathBuf;

use thiserror::Error;

use crate::api::service::ServiceErrorKind;

/// Configuration problems detected before a run starts.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unknown summary level '{name}' (known levels: {})", .known.join(", "))]
    UnknownLevel { name: String, known: Vec<String> },

    #[error("missing credential: set {variable}")]
    MissingCredential { variable: String },

    #[error("invalid value for '{key}': {message}")]
    InvalidValue { key: String, message: String },

    #[error("invalid artifact marker pattern '{pattern}': {source}")]
    InvalidMarker {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("failed to read config file at {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file at {path}: {message}")]
    Parse { path: PathBuf, message: String },
}

/// Failures from the text-extraction collaborator.
#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("unsupported source format '{format}' for {locator}")]
    UnsupportedFormat { locator: String, format: String },

    #[error("failed to read {locator}: {message}")]
    Unreadable { locator: String, message: String },

    #[error("failed to fetch {url}: {message}")]
    NetworkFailure { url: String, message: String },
}

/// Coarse classification of a [`CompletionError`], used as the failure
/// reason of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionErrorKind {
    RateLimitExhausted,
    TimeoutExhausted,
    Fatal,
    Cancelled,
}

impl std::fmt::Display for CompletionErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CompletionErrorKind::RateLimitExhausted => write!(f, "rate-limit-exhausted"),
            CompletionErrorKind::TimeoutExhausted => write!(f, "timeout-exhausted"),
            CompletionErrorKind::Fatal => write!(f, "fatal"),
            CompletionErrorKind::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Unrecoverable failure of a single completion request.
#[derive(Debug, Error)]
pub enum CompletionError {
    #[error("rate limit persisted after {attempts} attempts: {message}")]
    RateLimitExhausted { attempts: u32, message: String },

    #[error("timeouts persisted after {attempts} attempts: {message}")]
    TimeoutExhausted { attempts: u32, message: String },

    #[error("completion service error ({kind}): {message}")]
    Fatal {
        kind: ServiceErrorKind,
        message: String,
    },

    #[error("request cancelled")]
    Cancelled,
}

impl CompletionError {
    pub fn kind(&self) -> CompletionErrorKind {
        match self {
            CompletionError::RateLimitExhausted { .. } => CompletionErrorKind::RateLimitExhausted,
            CompletionError::TimeoutExhausted { .. } => CompletionErrorKind::TimeoutExhausted,
            CompletionError::Fatal { .. } => CompletionErrorKind::Fatal,
            CompletionError::Cancelled => CompletionErrorKind::Cancelled,
        }
    }
}

/// Why a summarization run stopped without producing a summary.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("input text is empty; nothing to summarize")]
    EmptyInput,

    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("chunk {} of {total_chunks} failed ({}): {source}", .chunk_index + 1, .source.kind())]
    Completion {
        /// Zero-based index of the chunk being summarized.
        chunk_index: usize,
        total_chunks: usize,
        #[source]
        source: CompletionError,
    },

    #[error("run cancelled before chunk {} completed", .chunk_index + 1)]
    Cancelled { chunk_index: usize },
}

impl RunError {
    /// Zero-based index of the chunk that was in flight, if any.
    pub fn chunk_index(&self) -> Option<usize> {
        match self {
            RunError::EmptyInput | RunError::Config(_) => None,
            RunError::Completion { chunk_index, .. } | RunError::Cancelled { chunk_index } => {
                Some(*chunk_index)
            }
        }
    }

    pub fn kind(&self) -> Option<CompletionErrorKind> {
        match self {
            RunError::EmptyInput | RunError::Config(_) => None,
            RunError::Completion { source, .. } => Some(source.kind()),
            RunError::Cancelled { .. } => Some(CompletionErrorKind::Cancelled),
        }
    }
}

/// Failure writing the finished summary.
#[derive(Debug, Error)]
pub enum OutputError {
    #[error("failed to write summary to {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
