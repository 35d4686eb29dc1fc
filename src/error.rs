//! Error types for the Cangshu acquisition core.
//!
//! Uses `thiserror` for structured error definitions. Chapter-level
//! failures are not errors in this sense: they are recorded as
//! [`ChapterError`](crate::record::ChapterError) values on the chapter
//! record so a single bad chapter never aborts a novel.

use thiserror::Error;

/// Failure of a single page fetch after the fetcher's retry policy ran.
#[derive(Error, Debug)]
pub enum FetchError {
    /// Server answered 404; never retried.
    #[error("Page not found (404): {url}")]
    NotFound { url: String },

    /// Non-retryable HTTP status other than 404.
    #[error("HTTP {status} for {url}")]
    Status { url: String, status: u16 },

    /// Transient failures (5xx, timeouts, connection errors) outlasted the retry budget.
    #[error("Gave up on {url} after {attempts} attempts: {last}")]
    RetriesExhausted {
        url: String,
        attempts: u32,
        last: String,
    },

    /// The HTTP client could not be constructed or the request could not be built.
    #[error("HTTP client error: {0}")]
    Client(#[from] reqwest::Error),
}

impl FetchError {
    /// Returns true if the failure came from a permanent server answer.
    pub fn is_permanent(&self) -> bool {
        matches!(self, FetchError::NotFound { .. } | FetchError::Status { .. })
    }
}

/// Main error type for site-level scraping operations.
#[derive(Error, Debug)]
pub enum ScraperError {
    /// Page fetch failed.
    #[error(transparent)]
    Fetch(#[from] FetchError),

    /// No site with this name is registered
    #[error("Unknown site: {0}")]
    UnknownSite(String),

    /// The site has no mapping for this category
    #[error("Unknown category '{category}' for site {site}")]
    UnknownCategory { site: String, category: String },

    /// Persisting artifacts failed.
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

impl ScraperError {
    /// Returns true for errors caused by bad user input or configuration.
    ///
    /// These are the only errors that make the CLI exit non-zero.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            ScraperError::UnknownSite(_) | ScraperError::UnknownCategory { .. }
        )
    }
}

/// Error type for configuration operations.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to read config file
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    /// Failed to parse config file
    #[error("Failed to parse config: {0}")]
    ParseError(String),

    /// Invalid configuration value
    #[error("Invalid config value for '{key}': {message}")]
    InvalidValue { key: String, message: String },

    /// A `[[sites]]` entry names an adapter that does not exist
    #[error("Unknown adapter '{adapter}' for site {site}")]
    UnknownAdapter { site: String, adapter: String },

    /// Config directory not found
    #[error("Could not determine config directory")]
    NoConfigDir,
}

/// Error type for checkpoint persistence.
#[derive(Error, Debug)]
pub enum CheckpointError {
    /// Failed to read or write the checkpoint file
    #[error("Checkpoint I/O failed: {0}")]
    Io(#[from] std::io::Error),

    /// Checkpoint file is not valid JSON for the expected shape
    #[error("Failed to parse checkpoint: {0}")]
    Parse(#[from] serde_json::Error),

    /// Checkpoint was written by an incompatible format version
    #[error("Unsupported checkpoint version {found} (expected {expected})")]
    Version { found: u32, expected: u32 },
}

/// Error type for writing novel artifacts.
#[derive(Error, Debug)]
pub enum StorageError {
    /// Filesystem operation failed
    #[error("Failed to write novel files: {0}")]
    Io(#[from] std::io::Error),

    /// Metadata serialisation failed
    #[error("Failed to serialise metadata: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias using anyhow for application-level error handling.
pub type Result<T> = anyhow::Result<T>;
