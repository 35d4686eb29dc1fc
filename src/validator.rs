//! Content quality checks and cleaning.
//!
//! Chapter checks reject challenge pages, stubs and navigation debris;
//! the whole-novel check decides whether a fetched novel is kept at all.

use crate::config::ValidationConfig;
use crate::html;
use crate::record::{InvalidReason, NovelRecord, ValidationStats};
use crate::utils::{char_count, han_count};
use regex::Regex;
use scraper::Html;
use std::sync::LazyLock;
use thiserror::Error;

/// Keywords that identify a challenge/verification page.
const ANTI_CRAWL_KEYWORDS: &[&str] = &["正在验证浏览器", "验证", "安全验证", "请稍等", "challenge"];

/// Lines that are pure navigation.
const NAVIGATION_LINES: &[&str] = &["首页", "上一页", "下一页", "目录", "返回", "上一章", "下一章"];

/// Lines shorter than this are dropped when they match a boilerplate pattern.
const SHORT_LINE_CHARS: usize = 100;

/// Word counts, status markers, author labels, buttons and navigation.
static BOILERPLATE_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"\d+\.\d+万字",
        r"已完结|连载中",
        r"作者[：:]",
        r"点击|收藏|推荐|订阅|加入书架",
        r"上一页|下一页|目录|返回",
        r"首页|上一章|下一章",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("Invalid boilerplate pattern"))
    .collect()
});

static BLANK_RUN_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n{3,}").expect("Invalid BLANK_RUN_REGEX"));

static INLINE_SPACE_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[ \t]+").expect("Invalid INLINE_SPACE_REGEX"));

/// A repeated `第N章 ...` heading line inside the body.
static HEADING_LINE_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^\s*第\d+章.*$").expect("Invalid HEADING_LINE_REGEX"));

/// Why a whole novel was rejected.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RejectReason {
    #[error("missing title")]
    MissingTitle,

    #[error("too few chapters ({count}, need {min})")]
    TooFewChapters { count: usize, min: usize },

    #[error("no valid chapters")]
    NoValidChapters,

    #[error("too little content ({chars} valid chars, need {min})")]
    TooLittleContent { chars: usize, min: usize },

    #[error("valid chapter ratio too low ({:.1}%, need {:.1}%)", .ratio * 100.0, .min * 100.0)]
    LowValidRatio { ratio: f64, min: f64 },
}

/// A rejected novel with the statistics gathered before rejection.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{reason}")]
pub struct NovelRejection {
    pub reason: RejectReason,
    pub stats: ValidationStats,
}

/// Validates and cleans chapter content.
#[derive(Debug, Clone)]
pub struct ContentValidator {
    config: ValidationConfig,
}

impl Default for ContentValidator {
    fn default() -> Self {
        Self::new(ValidationConfig::default())
    }
}

impl ContentValidator {
    pub fn new(config: ValidationConfig) -> Self {
        Self { config }
    }

    /// Returns true if the page is a challenge/verification page.
    ///
    /// Looks at the `<title>` and the first slice of page text.
    pub fn is_anti_crawl_page(&self, doc: &Html) -> bool {
        if let Some(title) = html::page_title(doc)
            && contains_anti_crawl_keyword(&title)
        {
            return true;
        }

        let text = html::page_text(doc);
        let head: String = text.chars().take(self.config.anti_crawl_scan_chars).collect();
        contains_anti_crawl_keyword(&head)
    }

    /// Checks a chapter body against the length, density and boilerplate thresholds.
    pub fn validate_chapter_content(&self, text: &str) -> Result<(), InvalidReason> {
        if text.trim().is_empty() {
            return Err(InvalidReason::Empty);
        }

        let chars = char_count(text);
        if chars < self.config.min_chapter_chars {
            return Err(InvalidReason::TooShort {
                chars,
                min: self.config.min_chapter_chars,
            });
        }

        let han = han_count(text);
        if han < self.config.min_han_chars {
            return Err(InvalidReason::InsufficientScript {
                han,
                min: self.config.min_han_chars,
            });
        }

        let hits = boilerplate_hits(text);
        if hits > self.config.max_boilerplate_hits {
            return Err(InvalidReason::TooMuchBoilerplate {
                hits,
                max: self.config.max_boilerplate_hits,
            });
        }

        Ok(())
    }

    /// Normalises whitespace and drops navigation/promotional lines.
    pub fn clean_content(&self, text: &str) -> String {
        if text.is_empty() {
            return String::new();
        }

        let text = BLANK_RUN_REGEX.replace_all(text, "\n\n");
        let text = INLINE_SPACE_REGEX.replace_all(&text, " ");
        let text = HEADING_LINE_REGEX.replace_all(&text, "");

        text.lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .filter(|line| !is_boilerplate_line(line))
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Applies the whole-novel acceptance gates.
    ///
    /// A novel needs a title, enough chapters, at least one valid chapter,
    /// enough valid characters, and a valid-chapter ratio of at least the
    /// configured minimum (inclusive).
    pub fn validate_novel(&self, record: &NovelRecord) -> Result<ValidationStats, NovelRejection> {
        let mut stats = ValidationStats::default();

        if record.metadata.title.trim().is_empty() {
            return Err(NovelRejection {
                reason: RejectReason::MissingTitle,
                stats,
            });
        }

        stats.total_chapters = record.chapters.len();
        if stats.total_chapters < self.config.min_chapter_count {
            return Err(NovelRejection {
                reason: RejectReason::TooFewChapters {
                    count: stats.total_chapters,
                    min: self.config.min_chapter_count,
                },
                stats,
            });
        }

        for chapter in &record.chapters {
            let content = chapter.content().unwrap_or_default();
            let chars = char_count(content);
            stats.total_chars += chars;

            if self.validate_chapter_content(content).is_ok() {
                stats.valid_chapters += 1;
                stats.valid_chars += chars;
            } else {
                stats.empty_chapters += 1;
            }
        }

        if stats.valid_chapters == 0 {
            return Err(NovelRejection {
                reason: RejectReason::NoValidChapters,
                stats,
            });
        }

        if stats.valid_chars < self.config.min_novel_chars {
            return Err(NovelRejection {
                reason: RejectReason::TooLittleContent {
                    chars: stats.valid_chars,
                    min: self.config.min_novel_chars,
                },
                stats,
            });
        }

        let ratio = stats.valid_ratio();
        if ratio < self.config.min_valid_ratio {
            return Err(NovelRejection {
                reason: RejectReason::LowValidRatio {
                    ratio,
                    min: self.config.min_valid_ratio,
                },
                stats,
            });
        }

        Ok(stats)
    }
}

fn contains_anti_crawl_keyword(text: &str) -> bool {
    ANTI_CRAWL_KEYWORDS.iter().any(|k| text.contains(k))
}

/// Number of distinct boilerplate patterns present in the text.
fn boilerplate_hits(text: &str) -> usize {
    BOILERPLATE_PATTERNS
        .iter()
        .filter(|p| p.is_match(text))
        .count()
}

fn is_boilerplate_line(line: &str) -> bool {
    if NAVIGATION_LINES.contains(&line) {
        return true;
    }
    char_count(line) < SHORT_LINE_CHARS && BOILERPLATE_PATTERNS.iter().any(|p| p.is_match(line))
}
