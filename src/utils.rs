//! Utility functions for common text and URL operations.

use regex::Regex;
use std::sync::LazyLock;
use std::time::Duration;

/// `第12章`, `第 12 章`.
static ARABIC_CHAPTER_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"第\s*(\d+)\s*章").expect("Invalid ARABIC_CHAPTER_REGEX"));

/// `第十二章`, `第一百零五章`.
static HAN_CHAPTER_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"第\s*([零〇一二两三四五六七八九十百千万]+)\s*章")
        .expect("Invalid HAN_CHAPTER_REGEX")
});

/// `Chapter 12`.
static LATIN_CHAPTER_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)chapter\s*(\d+)").expect("Invalid LATIN_CHAPTER_REGEX"));

/// `12. title`, `12、title`.
static LEADING_NUMBER_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*(\d+)\s*[\.、]").expect("Invalid LEADING_NUMBER_REGEX"));

/// Characters that are not allowed in file names.
static UNSAFE_FILENAME_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"[<>:"/\\|?*]"#).expect("Invalid UNSAFE_FILENAME_REGEX"));

/// Returns true for CJK unified ideographs in the U+4E00..=U+9FA5 block.
pub fn is_han(c: char) -> bool {
    ('\u{4e00}'..='\u{9fa5}').contains(&c)
}

/// Counts CJK ideographs in the text.
pub fn han_count(text: &str) -> usize {
    text.chars().filter(|c| is_han(*c)).count()
}

/// Counts characters (not bytes).
pub fn char_count(text: &str) -> usize {
    text.chars().count()
}

/// Returns true if the title looks like a chapter title.
pub fn is_chapter_title(title: &str) -> bool {
    ARABIC_CHAPTER_REGEX.is_match(title)
        || HAN_CHAPTER_REGEX.is_match(title)
        || LATIN_CHAPTER_REGEX.is_match(title)
        || LEADING_NUMBER_REGEX.is_match(title)
}

/// Extracts the chapter number embedded in a chapter title.
///
/// Understands Arabic digits (`第12章`, `Chapter 12`, `12.`) and Chinese
/// numerals (`第一百零五章`).
pub fn chapter_number(title: &str) -> Option<u32> {
    if let Some(caps) = ARABIC_CHAPTER_REGEX.captures(title) {
        return caps[1].parse().ok();
    }

    if let Some(caps) = HAN_CHAPTER_REGEX.captures(title) {
        return parse_han_numeral(&caps[1]);
    }

    if let Some(caps) = LATIN_CHAPTER_REGEX.captures(title) {
        return caps[1].parse().ok();
    }

    LEADING_NUMBER_REGEX
        .captures(title)
        .and_then(|caps| caps[1].parse().ok())
}

/// Converts a Chinese numeral such as `一百零五` into an integer.
pub fn parse_han_numeral(text: &str) -> Option<u32> {
    let mut total: u32 = 0;
    let mut section: u32 = 0;
    let mut digit: Option<u32> = None;

    for c in text.chars() {
        match c {
            '零' | '〇' => digit = Some(0),
            '一' => digit = Some(1),
            '二' | '两' => digit = Some(2),
            '三' => digit = Some(3),
            '四' => digit = Some(4),
            '五' => digit = Some(5),
            '六' => digit = Some(6),
            '七' => digit = Some(7),
            '八' => digit = Some(8),
            '九' => digit = Some(9),
            '十' | '百' | '千' => {
                let unit = match c {
                    '十' => 10,
                    '百' => 100,
                    _ => 1000,
                };
                // A bare `十` means ten.
                let value = digit.take().unwrap_or(1).checked_mul(unit)?;
                section = section.checked_add(value)?;
            }
            '万' => {
                section = section.checked_add(digit.take().unwrap_or(0))?;
                total = total.checked_add(section.max(1).checked_mul(10_000)?)?;
                section = 0;
            }
            _ => return None,
        }
    }

    let value = total.checked_add(section)?.checked_add(digit.unwrap_or(0))?;
    (value > 0).then_some(value)
}

/// Removes characters that are not allowed in file names.
pub fn sanitize_filename(name: &str) -> String {
    let cleaned = UNSAFE_FILENAME_REGEX.replace_all(name, "");
    let cleaned = cleaned.trim();
    if cleaned.is_empty() {
        "novel".to_string()
    } else {
        cleaned.to_string()
    }
}

/// Resolves a possibly relative link against the page it appeared on.
pub fn resolve_url(base: &str, relative: &str) -> String {
    if relative.starts_with("http://") || relative.starts_with("https://") {
        return relative.to_string();
    }

    if let Ok(base_url) = url::Url::parse(base)
        && let Ok(resolved) = base_url.join(relative)
    {
        return resolved.to_string();
    }

    let base = base.trim_end_matches('/');
    format!("{}/{}", base, relative.trim_start_matches('/'))
}

/// Returns the URL without its query string and fragment.
pub fn strip_query(url: &str) -> &str {
    let end = url.find(['?', '#']).unwrap_or(url.len());
    &url[..end]
}

/// Returns the host of a URL, or the input itself if it is already a bare host.
pub fn host_of(url_or_host: &str) -> String {
    url::Url::parse(url_or_host)
        .ok()
        .and_then(|u| u.host_str().map(str::to_string))
        .unwrap_or_else(|| {
            url_or_host
                .trim_end_matches('/')
                .split('/')
                .next()
                .unwrap_or_default()
                .to_string()
        })
}

/// Shortens text to at most `max` characters, appending `...` when cut.
pub fn truncate_chars(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let cut: String = text.chars().take(max).collect();
    format!("{}...", cut)
}

/// Formats a duration as `MmSs`, or `HhMm` for long runs.
pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    if secs >= 3600 {
        format!("{}h{:02}m", secs / 3600, (secs % 3600) / 60)
    } else {
        format!("{}m{:02}s", secs / 60, secs % 60)
    }
}
