//! Cangshu - resilient novel acquisition for Chinese web novel sites.
//!
//! This library provides functionality for:
//! - Fetching pages with retry, backoff and adaptive pacing
//! - Parsing site-specific listings, indexes and chapters through adapters
//! - Discovering paginated chapter indexes
//! - Validating and cleaning chapter content, checkpointing progress
//! - Writing accepted novels and batch summaries to disk

pub mod adapters;
pub mod checkpoint;
pub mod config;
pub mod console;
pub mod error;
pub mod fetcher;
pub mod html;
pub mod logging;
pub mod orchestrator;
pub mod pagination;
pub mod record;
pub mod storage;
pub mod utils;
pub mod validator;

// Re-export commonly used types
pub use adapters::{
    AdapterKind, ChapterRef, NovelMetadata, NovelTarget, SiteAdapter, SiteConfig, SiteRegistry,
};
pub use checkpoint::{ProgressCheckpoint, ScrapeProgress};
pub use config::Config;
pub use console::Console;
pub use error::{CheckpointError, ConfigError, FetchError, ScraperError, StorageError};
pub use fetcher::{AdaptiveDelay, HttpFetcher, PageSource};
pub use orchestrator::{BatchReport, BatchRequest, NovelOutcome, ScrapeOrchestrator};
pub use pagination::{PaginationDiscoverer, PaginationEvidence, PaginationOutcome};
pub use record::{ChapterError, ChapterRecord, ErrorKind, NovelRecord, ValidationStats};
pub use storage::NovelStore;
pub use validator::ContentValidator;
