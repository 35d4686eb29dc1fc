//! Output layout for accepted novels.
//!
//! ```text
//! <output>/novels/<site>/<category>/<title>/<title>.txt
//! <output>/novels/<site>/<category>/<title>/<title>.json
//! <output>/novels/summary.json
//! <output>/novels/scraped_novels.json
//! ```

use crate::error::StorageError;
use crate::record::{ErrorKind, NovelRecord, ValidationStats};
use crate::utils::sanitize_filename;
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::{self, Write as _};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Author written when the page did not name one.
pub const UNKNOWN_AUTHOR: &str = "未知";

const SEPARATOR_WIDTH: usize = 50;

/// Metadata record written next to each novel's text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NovelMetadataRecord {
    pub title: String,
    pub author: String,
    pub description: String,
    pub url: String,
    pub site: String,
    pub category: String,

    /// Local time, `%Y-%m-%d %H:%M:%S`.
    pub scraped_time: String,

    /// Valid chapters.
    pub chapters: usize,

    pub total_chapters: usize,

    /// Characters in valid chapters.
    pub total_chars: usize,

    pub validation_stats: ValidationStats,
}

impl NovelMetadataRecord {
    pub fn new(
        record: &NovelRecord,
        url: &str,
        site: &str,
        category: &str,
        stats: ValidationStats,
        scraped_at: DateTime<Local>,
    ) -> Self {
        let metadata = &record.metadata;
        Self {
            title: metadata.title.clone(),
            author: metadata
                .author
                .clone()
                .unwrap_or_else(|| UNKNOWN_AUTHOR.to_string()),
            description: metadata.description.clone().unwrap_or_default(),
            url: url.to_string(),
            site: site.to_string(),
            category: category.to_string(),
            scraped_time: scraped_at.format("%Y-%m-%d %H:%M:%S").to_string(),
            chapters: stats.valid_chapters,
            total_chapters: stats.total_chapters,
            total_chars: stats.valid_chars,
            validation_stats: stats,
        }
    }
}

/// Success and failure counts for one site.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SiteStats {
    pub success: usize,
    pub failed: usize,
}

/// How a candidate failed to become a persisted novel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Failed whole-novel validation.
    Rejected,
    /// Index, chapters or files could not be fetched or written.
    Failed,
    /// Stopped by an interrupt with progress checkpointed.
    Interrupted,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            FailureKind::Rejected => "rejected",
            FailureKind::Failed => "failed",
            FailureKind::Interrupted => "interrupted",
        };
        f.write_str(label)
    }
}

/// Batch-wide counters.
///
/// `total == success + failed + skipped` once the batch has run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchStats {
    pub total: usize,
    pub success: usize,
    pub failed: usize,

    /// Candidates never attempted because the batch was interrupted.
    pub skipped: usize,

    pub total_chapters: usize,
    pub total_chars: usize,
    pub sites: BTreeMap<String, SiteStats>,

    /// Failed novels by kind.
    pub failures: BTreeMap<FailureKind, usize>,

    /// Failed chapters of persisted and rejected novels by error kind.
    pub chapter_failures: BTreeMap<ErrorKind, usize>,
}

impl BatchStats {
    pub fn record_success(&mut self, site: &str, stats: &ValidationStats) {
        self.success += 1;
        self.total_chapters += stats.valid_chapters;
        self.total_chars += stats.valid_chars;
        self.sites.entry(site.to_string()).or_default().success += 1;
    }

    pub fn record_failure(&mut self, site: &str, kind: FailureKind) {
        self.failed += 1;
        *self.failures.entry(kind).or_default() += 1;
        self.sites.entry(site.to_string()).or_default().failed += 1;
    }

    /// Adds one novel's failed-chapter counts.
    pub fn record_chapter_failures(&mut self, counts: &BTreeMap<ErrorKind, usize>) {
        for (kind, n) in counts {
            *self.chapter_failures.entry(*kind).or_default() += n;
        }
    }
}

/// A novel that was written to disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedNovel {
    pub title: String,
    pub site: String,
    pub category: String,

    /// Path of the `.txt` file.
    pub file: PathBuf,
}

/// A candidate that did not produce a novel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedNovel {
    pub title: String,
    pub url: String,
    pub reason: String,
}

/// Contents of `summary.json`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchSummary {
    pub stats: BatchStats,
    pub successful_novels: Vec<PersistedNovel>,
    pub failed_novels: Vec<FailedNovel>,
}

/// Writes novels below `<output>/novels`.
#[derive(Debug, Clone)]
pub struct NovelStore {
    root: PathBuf,
}

impl NovelStore {
    /// Store rooted at the `novels` directory.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Working directory for one novel.
    pub fn novel_dir(&self, site: &str, category: &str, title: &str) -> PathBuf {
        self.root
            .join(sanitize_filename(site))
            .join(sanitize_filename(category))
            .join(sanitize_filename(title))
    }

    /// Writes `<title>.txt` into `dir`.
    pub fn write_text(&self, dir: &Path, record: &NovelRecord) -> Result<PathBuf, StorageError> {
        std::fs::create_dir_all(dir)?;
        let path = dir.join(format!("{}.txt", sanitize_filename(&record.metadata.title)));
        std::fs::write(&path, render_text(record))?;
        debug!("Wrote {}", path.display());
        Ok(path)
    }

    /// Writes `<title>.json` into `dir`.
    pub fn write_metadata(
        &self,
        dir: &Path,
        metadata: &NovelMetadataRecord,
    ) -> Result<PathBuf, StorageError> {
        std::fs::create_dir_all(dir)?;
        let path = dir.join(format!("{}.json", sanitize_filename(&metadata.title)));
        std::fs::write(&path, serde_json::to_string_pretty(metadata)?)?;
        debug!("Wrote {}", path.display());
        Ok(path)
    }

    /// Writes the text and metadata files of an accepted novel.
    ///
    /// If the metadata cannot be written the text file is removed again, so
    /// a novel is on disk with both files or with neither. Other files in
    /// `dir` (the checkpoint) are left alone.
    pub fn persist(
        &self,
        dir: &Path,
        record: &NovelRecord,
        metadata: &NovelMetadataRecord,
    ) -> Result<PathBuf, StorageError> {
        let file = self.write_text(dir, record)?;
        if let Err(e) = self.write_metadata(dir, metadata) {
            if let Err(remove) = std::fs::remove_file(&file) {
                warn!("Could not remove {}: {}", file.display(), remove);
            }
            return Err(e);
        }
        Ok(file)
    }

    /// Deletes a novel directory and everything in it.
    pub fn remove_novel(&self, dir: &Path) -> Result<(), StorageError> {
        match std::fs::remove_dir_all(dir) {
            Ok(()) => {
                debug!("Removed {}", dir.display());
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Writes `summary.json` and `scraped_novels.json`.
    pub fn write_batch_summary(
        &self,
        summary: &BatchSummary,
        novels: &[NovelMetadataRecord],
    ) -> Result<PathBuf, StorageError> {
        std::fs::create_dir_all(&self.root)?;

        let summary_path = self.root.join("summary.json");
        std::fs::write(&summary_path, serde_json::to_string_pretty(summary)?)?;
        std::fs::write(
            self.root.join("scraped_novels.json"),
            serde_json::to_string_pretty(novels)?,
        )?;

        Ok(summary_path)
    }
}

/// Renders the plain-text form of a novel.
pub fn render_text(record: &NovelRecord) -> String {
    let metadata = &record.metadata;
    let rule = "=".repeat(SEPARATOR_WIDTH);
    let mut out = String::new();

    let _ = writeln!(out, "标题: {}", metadata.title);
    let _ = writeln!(
        out,
        "作者: {}",
        metadata.author.as_deref().unwrap_or(UNKNOWN_AUTHOR)
    );
    let _ = writeln!(
        out,
        "\n简介:\n{}",
        metadata.description.as_deref().unwrap_or("无")
    );
    let _ = write!(out, "\n{}\n\n", rule);

    for (i, chapter) in record.chapters.iter().enumerate() {
        let _ = write!(out, "\n第 {} 章: {}\n{}\n\n", i + 1, chapter.title, rule);
        match (chapter.content(), chapter.error()) {
            (Some(content), _) => {
                let _ = write!(out, "{}\n\n", content);
            }
            (None, Some(error)) => {
                let _ = write!(out, "[内容获取失败: {}]\n\n", error);
            }
            (None, None) => {
                let _ = write!(out, "[内容获取失败: 未知错误]\n\n");
            }
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::{ChapterRef, NovelMetadata};
    use crate::record::{ChapterError, ChapterRecord};
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn record() -> NovelRecord {
        let one = ChapterRef::new("第1章 开端", "https://example.com/1.html", Some(1));
        let two = ChapterRef::new("第2章 远行", "https://example.com/2.html", Some(2));
        NovelRecord::new(
            NovelMetadata {
                title: "测试/小说".to_string(),
                author: None,
                description: Some("少年离家。".to_string()),
            },
            vec![
                ChapterRecord::fetched(&one, "山风吹过竹林。".to_string()),
                ChapterRecord::failed(&two, ChapterError::NoContent),
            ],
        )
    }

    fn stats() -> ValidationStats {
        ValidationStats {
            total_chapters: 2,
            valid_chapters: 1,
            empty_chapters: 1,
            total_chars: 7,
            valid_chars: 7,
        }
    }

    #[test]
    fn test_render_text() {
        let text = render_text(&record());
        let rule = "=".repeat(50);

        assert!(text.starts_with("标题: 测试/小说\n作者: 未知\n\n简介:\n少年离家。\n"));
        assert!(text.contains(&format!("\n第 1 章: 第1章 开端\n{}\n\n山风吹过竹林。\n\n", rule)));
        assert!(text.contains("\n第 2 章: 第2章 远行\n"));
        assert!(text.contains("[内容获取失败: no content block found]"));
    }

    #[test]
    fn test_metadata_record() {
        let at = Local.with_ymd_and_hms(2024, 5, 1, 8, 30, 0).unwrap();
        let meta = NovelMetadataRecord::new(
            &record(),
            "https://example.com/",
            "m.shuhaige.net",
            "都市",
            stats(),
            at,
        );

        assert_eq!(meta.author, "未知");
        assert_eq!(meta.scraped_time, "2024-05-01 08:30:00");
        assert_eq!(meta.chapters, 1);
        assert_eq!(meta.total_chapters, 2);

        let json = serde_json::to_value(&meta).unwrap();
        assert_eq!(json["validation_stats"]["empty_chapters"], 1);
        assert_eq!(json["total_chars"], 7);
    }

    #[test]
    fn test_write_and_remove_novel() {
        let dir = TempDir::new().unwrap();
        let store = NovelStore::new(dir.path().join("novels"));
        let novel_dir = store.novel_dir("m.shuhaige.net", "都市", "测试/小说");
        assert!(novel_dir.ends_with("m.shuhaige.net/都市/测试小说"));

        let text = store.write_text(&novel_dir, &record()).unwrap();
        assert_eq!(text.file_name().unwrap().to_str().unwrap(), "测试小说.txt");

        let meta = NovelMetadataRecord::new(&record(), "u", "s", "c", stats(), Local::now());
        let json = store.write_metadata(&novel_dir, &meta).unwrap();
        assert!(json.exists());

        store.remove_novel(&novel_dir).unwrap();
        assert!(!novel_dir.exists());
        store.remove_novel(&novel_dir).unwrap();
    }

    #[test]
    fn test_persist_keeps_both_files_or_neither() {
        let dir = TempDir::new().unwrap();
        let store = NovelStore::new(dir.path().join("novels"));
        let novel_dir = store.novel_dir("m.shuhaige.net", "都市", "测试小说");
        let meta = NovelMetadataRecord::new(&record(), "u", "s", "c", stats(), Local::now());

        // A directory where the metadata file should go makes the write fail.
        std::fs::create_dir_all(novel_dir.join("测试小说.json")).unwrap();
        let checkpoint = novel_dir.join(".测试小说_progress.json");
        std::fs::write(&checkpoint, "{}").unwrap();

        assert!(store.persist(&novel_dir, &record(), &meta).is_err());
        assert!(!novel_dir.join("测试小说.txt").exists());
        assert!(checkpoint.exists());

        std::fs::remove_dir(novel_dir.join("测试小说.json")).unwrap();
        let file = store.persist(&novel_dir, &record(), &meta).unwrap();
        assert!(file.exists());
        assert!(novel_dir.join("测试小说.json").exists());
    }

    #[test]
    fn test_batch_summary() {
        let dir = TempDir::new().unwrap();
        let store = NovelStore::new(dir.path().join("novels"));

        let mut summary = BatchSummary::default();
        summary.stats.total = 2;
        summary.stats.record_success("ixdzs8.com", &stats());
        summary.stats.record_failure("ixdzs8.com", FailureKind::Rejected);
        summary
            .stats
            .record_chapter_failures(&record().failure_counts());
        summary.failed_novels.push(FailedNovel {
            title: "坏书".to_string(),
            url: "https://ixdzs8.com/read/1/".to_string(),
            reason: "rejected".to_string(),
        });

        let path = store.write_batch_summary(&summary, &[]).unwrap();
        let back: BatchSummary =
            serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap();
        assert_eq!(back, summary);
        assert_eq!(back.stats.sites["ixdzs8.com"], SiteStats { success: 1, failed: 1 });
        assert_eq!(back.stats.failures[&FailureKind::Rejected], 1);
        assert_eq!(back.stats.chapter_failures[&ErrorKind::NoContent], 1);

        let raw = std::fs::read_to_string(dir.path().join("novels/summary.json")).unwrap();
        let json: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(json["stats"]["failures"]["rejected"], 1);
        assert_eq!(json["stats"]["chapter_failures"]["no_content"], 1);
        assert!(dir.path().join("novels/scraped_novels.json").exists());
    }
}
