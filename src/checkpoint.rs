//! Per-novel progress checkpoints.
//!
//! A checkpoint holds the prefix of chapter records fetched so far, stored as
//! versioned JSON in `.{title}_progress.json` inside the novel directory.

use crate::adapters::ChapterRef;
use crate::error::CheckpointError;
use crate::record::ChapterRecord;
use crate::utils::sanitize_filename;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Current on-disk format version.
pub const CHECKPOINT_VERSION: u32 = 1;

/// Saved acquisition progress for one novel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScrapeProgress {
    pub version: u32,

    /// URL of the novel's index page.
    pub novel_url: String,

    pub title: String,

    /// Completed chapters, in chapter order.
    pub chapters: Vec<ChapterRecord>,
}

impl ScrapeProgress {
    pub fn new(novel_url: &str, title: &str, chapters: Vec<ChapterRecord>) -> Self {
        Self {
            version: CHECKPOINT_VERSION,
            novel_url: novel_url.to_string(),
            title: title.to_string(),
            chapters,
        }
    }

    /// Returns true if the saved chapters are a prefix of `chapters`.
    pub fn is_prefix_of(&self, chapters: &[ChapterRef]) -> bool {
        self.chapters.len() <= chapters.len()
            && self
                .chapters
                .iter()
                .zip(chapters)
                .all(|(saved, fresh)| saved.url == fresh.url)
    }
}

/// Checkpoint file for one novel directory.
#[derive(Debug, Clone)]
pub struct ProgressCheckpoint {
    path: PathBuf,
}

impl ProgressCheckpoint {
    /// Checkpoint for the novel titled `title` stored in `novel_dir`.
    pub fn new(novel_dir: &Path, title: &str) -> Self {
        let file_name = format!(".{}_progress.json", sanitize_filename(title));
        Self {
            path: novel_dir.join(file_name),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Writes the completed prefix, replacing any earlier checkpoint.
    pub fn save(&self, progress: &ScrapeProgress) -> Result<(), CheckpointError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let json = serde_json::to_string_pretty(progress)?;
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, &self.path)?;

        debug!(
            "Checkpoint saved: {} chapters -> {}",
            progress.chapters.len(),
            self.path.display()
        );
        Ok(())
    }

    /// Loads the saved progress, or `None` if no checkpoint exists.
    pub fn load(&self) -> Result<Option<ScrapeProgress>, CheckpointError> {
        if !self.path.exists() {
            return Ok(None);
        }

        let content = std::fs::read_to_string(&self.path)?;
        let progress: ScrapeProgress = serde_json::from_str(&content)?;

        if progress.version != CHECKPOINT_VERSION {
            return Err(CheckpointError::Version {
                found: progress.version,
                expected: CHECKPOINT_VERSION,
            });
        }

        Ok(Some(progress))
    }

    /// Loads a checkpoint that can continue the given chapter list.
    ///
    /// Unreadable, foreign or mismatched checkpoints are logged and ignored.
    pub fn resume(&self, novel_url: &str, chapters: &[ChapterRef]) -> Vec<ChapterRecord> {
        let progress = match self.load() {
            Ok(Some(progress)) => progress,
            Ok(None) => return Vec::new(),
            Err(e) => {
                warn!("Ignoring checkpoint {}: {}", self.path.display(), e);
                return Vec::new();
            }
        };

        if progress.novel_url != novel_url || !progress.is_prefix_of(chapters) {
            warn!(
                "Checkpoint {} does not match the current chapter list; starting over",
                self.path.display()
            );
            return Vec::new();
        }

        info!(
            "Resuming from checkpoint: {}/{} chapters done",
            progress.chapters.len(),
            chapters.len()
        );
        progress.chapters
    }

    /// Removes the checkpoint file if present.
    pub fn clear(&self) -> Result<(), CheckpointError> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
