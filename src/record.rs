//! Chapter and novel records produced by the fetch loop.
//!
//! A [`ChapterRecord`] carries either content or an error, never both.
//! Records are what checkpoints persist and what the final validation
//! step inspects.

use crate::adapters::{ChapterRef, NovelMetadata};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

/// Why a chapter's content was rejected.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum InvalidReason {
    /// The server substituted a challenge/verification page.
    #[error("anti-crawl page")]
    AntiCrawlPage,

    /// No text was extracted.
    #[error("empty content")]
    Empty,

    /// Fewer characters than required.
    #[error("too short ({chars} chars, need {min})")]
    TooShort { chars: usize, min: usize },

    /// Not enough CJK ideographs to be chapter prose.
    #[error("insufficient script density ({han} han chars, need {min})")]
    InsufficientScript { han: usize, min: usize },

    /// Too many navigation/promotional patterns.
    #[error("too much boilerplate ({hits} pattern hits, max {max})")]
    TooMuchBoilerplate { hits: usize, max: usize },
}

/// Classified failure for a single chapter.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ChapterError {
    /// The page could not be fetched (404, exhausted retries, client error).
    #[error("page fetch failed: {detail}")]
    PageFetchFailed { detail: String },

    /// The page was fetched but its content did not pass validation.
    #[error("invalid content: {reason}")]
    InvalidContent { reason: InvalidReason },

    /// The adapter found no content block on the page.
    #[error("no content block found")]
    NoContent,
}

impl ChapterError {
    /// Short grouping key for failure summaries.
    pub fn kind(&self) -> ErrorKind {
        match self {
            ChapterError::PageFetchFailed { .. } => ErrorKind::PageFetchFailed,
            ChapterError::InvalidContent {
                reason: InvalidReason::AntiCrawlPage,
            } => ErrorKind::AntiCrawlPage,
            ChapterError::InvalidContent { .. } => ErrorKind::InvalidContent,
            ChapterError::NoContent => ErrorKind::NoContent,
        }
    }
}

impl From<InvalidReason> for ChapterError {
    fn from(reason: InvalidReason) -> Self {
        ChapterError::InvalidContent { reason }
    }
}

/// Grouping key used when reporting failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    PageFetchFailed,
    AntiCrawlPage,
    InvalidContent,
    NoContent,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ErrorKind::PageFetchFailed => "page fetch failed",
            ErrorKind::AntiCrawlPage => "anti-crawl page",
            ErrorKind::InvalidContent => "invalid content",
            ErrorKind::NoContent => "no content block",
        };
        f.write_str(label)
    }
}

/// A chapter after one fetch attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChapterRecord {
    /// Chapter title as listed in the index.
    pub title: String,

    /// Chapter page URL.
    pub url: String,

    /// 1-based position in the ordered chapter list.
    pub index: usize,

    /// Cleaned chapter text, present on success.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    content: Option<String>,

    /// Failure classification, present on failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    error: Option<ChapterError>,
}

impl ChapterRecord {
    /// Record for a chapter whose content was fetched and cleaned.
    pub fn fetched(chapter: &ChapterRef, content: String) -> Self {
        Self {
            title: chapter.title.clone(),
            url: chapter.url.clone(),
            index: chapter.index,
            content: Some(content),
            error: None,
        }
    }

    /// Record for a chapter that failed.
    pub fn failed(chapter: &ChapterRef, error: ChapterError) -> Self {
        Self {
            title: chapter.title.clone(),
            url: chapter.url.clone(),
            index: chapter.index,
            content: None,
            error: Some(error),
        }
    }

    /// Chapter text, if the fetch succeeded.
    pub fn content(&self) -> Option<&str> {
        self.content.as_deref()
    }

    /// Failure, if the fetch did not succeed.
    pub fn error(&self) -> Option<&ChapterError> {
        self.error.as_ref()
    }

    /// Returns true if this record holds content.
    pub fn is_fetched(&self) -> bool {
        self.content.is_some()
    }
}

/// Counters derived by whole-novel validation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationStats {
    pub total_chapters: usize,
    pub valid_chapters: usize,
    pub empty_chapters: usize,
    pub total_chars: usize,
    pub valid_chars: usize,
}

impl ValidationStats {
    /// Fraction of chapters that passed validation.
    pub fn valid_ratio(&self) -> f64 {
        if self.total_chapters == 0 {
            0.0
        } else {
            self.valid_chapters as f64 / self.total_chapters as f64
        }
    }
}

/// A novel assembled by the fetch loop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NovelRecord {
    /// Title, author and description.
    pub metadata: NovelMetadata,

    /// Chapters in index order.
    pub chapters: Vec<ChapterRecord>,
}

impl NovelRecord {
    pub fn new(metadata: NovelMetadata, chapters: Vec<ChapterRecord>) -> Self {
        Self { metadata, chapters }
    }

    /// Number of chapters holding content.
    pub fn fetched_count(&self) -> usize {
        self.chapters.iter().filter(|c| c.is_fetched()).count()
    }

    /// Total characters of fetched content.
    pub fn content_chars(&self) -> usize {
        self.chapters
            .iter()
            .filter_map(|c| c.content())
            .map(|c| c.chars().count())
            .sum()
    }

    /// Failed chapters grouped by error kind, with their titles.
    pub fn failures_by_kind(&self) -> BTreeMap<ErrorKind, Vec<&str>> {
        let mut groups: BTreeMap<ErrorKind, Vec<&str>> = BTreeMap::new();
        for chapter in &self.chapters {
            if let Some(error) = chapter.error() {
                groups
                    .entry(error.kind())
                    .or_default()
                    .push(chapter.title.as_str());
            }
        }
        groups
    }

    /// Number of failed chapters per error kind.
    pub fn failure_counts(&self) -> BTreeMap<ErrorKind, usize> {
        self.failures_by_kind()
            .into_iter()
            .map(|(kind, titles)| (kind, titles.len()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chapter(index: usize) -> ChapterRef {
        ChapterRef {
            title: format!("第{}章", index),
            url: format!("http://example.com/{}.html", index),
            index,
            number: Some(index as u32),
        }
    }

    #[test]
    fn test_record_holds_exactly_one_side() {
        let ok = ChapterRecord::fetched(&chapter(1), "正文".to_string());
        assert_eq!(ok.content(), Some("正文"));
        assert!(ok.error().is_none());

        let failed = ChapterRecord::failed(
            &chapter(2),
            ChapterError::PageFetchFailed {
                detail: "HTTP 404".to_string(),
            },
        );
        assert!(failed.content().is_none());
        assert_eq!(failed.error().unwrap().kind(), ErrorKind::PageFetchFailed);
    }

    #[test]
    fn test_record_json_shape() {
        let failed = ChapterRecord::failed(&chapter(3), InvalidReason::AntiCrawlPage.into());
        let json = serde_json::to_value(&failed).unwrap();
        assert_eq!(json["error"]["kind"], "invalid_content");
        assert_eq!(json["error"]["reason"]["reason"], "anti_crawl_page");
        assert!(json.get("content").is_none());

        let back: ChapterRecord = serde_json::from_value(json).unwrap();
        assert_eq!(back, failed);
    }

    #[test]
    fn test_failures_by_kind() {
        let record = NovelRecord::new(
            NovelMetadata::default(),
            vec![
                ChapterRecord::fetched(&chapter(1), "正文".to_string()),
                ChapterRecord::failed(&chapter(2), ChapterError::NoContent),
                ChapterRecord::failed(&chapter(3), InvalidReason::Empty.into()),
                ChapterRecord::failed(&chapter(4), InvalidReason::AntiCrawlPage.into()),
            ],
        );

        let groups = record.failures_by_kind();
        assert_eq!(groups.len(), 3);
        assert_eq!(groups[&ErrorKind::NoContent], vec!["第2章"]);
        assert_eq!(groups[&ErrorKind::AntiCrawlPage], vec!["第4章"]);
        assert_eq!(record.fetched_count(), 1);
        assert_eq!(record.content_chars(), 2);

        let counts = record.failure_counts();
        assert_eq!(counts[&ErrorKind::NoContent], 1);
        assert_eq!(counts[&ErrorKind::InvalidContent], 1);
        assert_eq!(counts.values().sum::<usize>(), 3);
    }

    #[test]
    fn test_valid_ratio() {
        let stats = ValidationStats {
            total_chapters: 4,
            valid_chapters: 2,
            ..Default::default()
        };
        assert_eq!(stats.valid_ratio(), 0.5);
        assert_eq!(ValidationStats::default().valid_ratio(), 0.0);
    }
}
