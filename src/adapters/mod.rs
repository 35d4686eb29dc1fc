//! Site adapter trait and common types for novel sites.
//!
//! Each adapter encodes one site's HTML conventions as pure functions over
//! a parsed document. Absence of any field is a normal outcome: adapters
//! return partial data and the orchestrator decides what is acceptable.

mod ixdzs8;
mod shuhaige;

pub use ixdzs8::Ixdzs8Adapter;
pub use shuhaige::ShuhaigeAdapter;

use crate::config::SiteEntry;
use crate::error::ConfigError;
use crate::html;
use crate::utils::{char_count, han_count, host_of};
use regex::Regex;
use scraper::{ElementRef, Html};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::sync::LazyLock;

/// Markers of a series still being written. Checked before the completed markers.
static ONGOING_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    ["连载中", "更新中", "连载", "未完", "未完结", "持续更新"]
        .iter()
        .map(|p| Regex::new(p).expect("Invalid ongoing pattern"))
        .collect()
});

/// Markers of a finished series.
static COMPLETED_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        "已完结", "完结", "完本", "全本", "已完本", "大结局", "全文完", "全书完", "完$",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("Invalid completed pattern"))
    .collect()
});

/// Title of a last chapter that closes the story.
static FINALE_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"大结局|全文完|全书完|完$").expect("Invalid FINALE_REGEX"));

/// `简介：...` style description label.
static DESCRIPTION_LABEL_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)(?:内容简介|作品简介|简介)[：:]\s*(.*)").expect("Invalid DESCRIPTION_LABEL_REGEX")
});

/// Metadata for a novel.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NovelMetadata {
    /// Novel title.
    pub title: String,

    /// Author name, if the page shows one.
    pub author: Option<String>,

    /// Blurb, if the page shows one.
    pub description: Option<String>,
}

/// A candidate novel found on a category page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NovelTarget {
    /// Title as shown in the listing.
    pub title: String,

    /// Novel index page URL, without query string.
    pub url: String,

    /// Category the listing belongs to.
    pub category: String,

    /// Author, if the listing shows one.
    pub author: Option<String>,

    /// Best-effort completion flag from listing text.
    pub completed: bool,

    /// Stable per-site novel ID taken from the URL.
    pub novel_id: String,
}

/// A chapter link on a novel index page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChapterRef {
    /// Chapter title.
    pub title: String,

    /// Chapter page URL.
    pub url: String,

    /// 1-based position after ordering. Zero until [`order_chapters`] runs.
    pub index: usize,

    /// Chapter number embedded in the title (or URL, per site).
    pub number: Option<u32>,
}

impl ChapterRef {
    /// An unordered chapter link.
    pub fn new(title: impl Into<String>, url: impl Into<String>, number: Option<u32>) -> Self {
        Self {
            title: title.into(),
            url: url.into(),
            index: 0,
            number,
        }
    }
}

/// Per-site parsing capabilities.
pub trait SiteAdapter: Send + Sync {
    /// Registry name of the site.
    fn name(&self) -> &str;

    /// Root URL of the site, without trailing slash.
    fn base_url(&self) -> &str;

    /// URL of the listing page for a category, if the site knows the category.
    fn category_url(&self, category: &str) -> Option<String>;

    /// Extracts candidate novels from a category listing, deduplicated by novel ID.
    fn parse_category_page(&self, doc: &Html, page_url: &str, category: &str) -> Vec<NovelTarget>;

    /// Extracts title, author and description from a novel page.
    fn extract_metadata(&self, doc: &Html) -> NovelMetadata;

    /// Extracts ordered chapter links from a novel index page.
    fn extract_chapters(&self, doc: &Html, page_url: &str) -> Vec<ChapterRef>;

    /// Extracts the body text of a chapter page. Empty when nothing was found.
    fn extract_chapter_content(&self, doc: &Html) -> String;

    /// Returns true if the text marks the novel as finished.
    fn check_completed(&self, text: &str) -> bool {
        check_completed(text)
    }
}

/// Completion check shared by all adapters.
///
/// Ongoing markers win over completed markers, so `连载中，已完结` is not completed.
pub fn check_completed(text: &str) -> bool {
    if text.is_empty() {
        return false;
    }
    if ONGOING_PATTERNS.iter().any(|p| p.is_match(text)) {
        return false;
    }
    COMPLETED_PATTERNS.iter().any(|p| p.is_match(text))
}

/// Returns true if a chapter title reads like the end of the story.
pub fn is_finale_title(title: &str) -> bool {
    FINALE_REGEX.is_match(title.trim())
}

/// Deduplicates chapters by URL, orders them and assigns 1-based indices.
///
/// Chapters are ordered by their number. A chapter without a number keeps
/// its discovery position by taking the key of the nearest preceding
/// numbered chapter; the sort is stable so equal keys keep discovery order.
pub fn order_chapters(chapters: Vec<ChapterRef>) -> Vec<ChapterRef> {
    let mut seen = HashSet::new();
    let mut last_key = 0u32;

    let mut keyed: Vec<(u32, ChapterRef)> = chapters
        .into_iter()
        .filter(|c| seen.insert(c.url.clone()))
        .map(|c| {
            if let Some(n) = c.number {
                last_key = n;
            }
            (last_key, c)
        })
        .collect();

    keyed.sort_by_key(|(key, _)| *key);

    keyed
        .into_iter()
        .enumerate()
        .map(|(i, (_, mut c))| {
            c.index = i + 1;
            c
        })
        .collect()
}

/// First selector whose block text is longer than `min_chars`.
pub(crate) fn content_by_selectors(doc: &Html, selectors: &[&str], min_chars: usize) -> Option<String> {
    selectors.iter().find_map(|selector| {
        let elem = html::select_first(doc, selector)?;
        let text = html::block_text(elem);
        (char_count(&text) > min_chars).then_some(text)
    })
}

/// Largest `<div>` by Han count whose text passes the size and density floors.
///
/// `min_density` is the share of Han characters in the block's text. Wrapper
/// divs are narrowed to the innermost candidate that still holds most of
/// their Han text.
pub(crate) fn densest_block(
    doc: &Html,
    min_chars: usize,
    min_han: usize,
    min_density: f64,
) -> Option<String> {
    let candidates: Vec<(ElementRef<'_>, usize)> = html::divs(doc)
        .filter_map(|div| {
            let flat = html::flat_text(div);
            let chars = char_count(&flat);
            let han = han_count(&flat);
            let dense = chars > min_chars
                && han > min_han
                && (han as f64 / chars as f64) >= min_density;
            dense.then_some((div, han))
        })
        .collect();

    let mut best = *candidates.iter().max_by_key(|(_, han)| *han)?;
    loop {
        let inner = candidates
            .iter()
            .filter(|(div, _)| {
                html::element_ancestors(*div).any(|ancestor| ancestor.id() == best.0.id())
            })
            .max_by_key(|(_, han)| *han);

        match inner {
            Some(&(div, han)) if han * 5 >= best.1 * 4 => best = (div, han),
            _ => break,
        }
    }

    Some(html::block_text(best.0))
}

/// Text following a `简介：` label, up to the first blank line or chapter line.
pub(crate) fn description_after_label(text: &str) -> Option<String> {
    let caps = DESCRIPTION_LABEL_REGEX.captures(text)?;
    let rest = caps.get(1)?.as_str();
    let end = [rest.find("\n\n"), rest.find("\n第")]
        .into_iter()
        .flatten()
        .min()
        .unwrap_or(rest.len());
    let description = rest[..end].trim();
    (!description.is_empty()).then(|| description.to_string())
}

/// Returns true if the URL is on the same host as the page it was found on.
pub(crate) fn same_host(url: &str, page_url: &str) -> bool {
    host_of(url) == host_of(page_url)
}

/// The parsing strategy a site uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AdapterKind {
    Shuhaige,
    Ixdzs8,
}

impl AdapterKind {
    /// Identifier used in config files.
    pub fn as_str(self) -> &'static str {
        match self {
            AdapterKind::Shuhaige => "shuhaige",
            AdapterKind::Ixdzs8 => "ixdzs8",
        }
    }

    /// Parses a config identifier.
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "shuhaige" => Some(AdapterKind::Shuhaige),
            "ixdzs8" => Some(AdapterKind::Ixdzs8),
            _ => None,
        }
    }

    /// Category name to URL segment table used when a site registers none.
    pub fn default_categories(self) -> BTreeMap<String, String> {
        let table: &[(&str, &str)] = match self {
            AdapterKind::Shuhaige => &[
                ("都市", "DuShi"),
                ("玄幻", "XuanHuan"),
                ("言情", "YanQing"),
                ("武侠", "WuXia"),
                ("科幻", "KeHuan"),
                ("悬疑", "XuanYi"),
                ("历史", "LiShi"),
                ("军事", "JunShi"),
                ("游戏", "YouXi"),
                ("竞技", "JingJi"),
                ("仙侠", "XianXia"),
            ],
            AdapterKind::Ixdzs8 => &[
                ("玄幻", "1"),
                ("武侠", "2"),
                ("都市", "3"),
                ("修真", "4"),
                ("军事", "6"),
                ("历史", "6"),
                ("网游", "7"),
                ("竞技", "7"),
                ("科幻", "8"),
                ("灵异", "8"),
                ("言情", "9"),
                ("穿越", "9"),
                ("耽美", "10"),
                ("同人", "10"),
                ("台言", "11"),
                ("古言", "11"),
            ],
        };

        table
            .iter()
            .map(|(name, code)| (name.to_string(), code.to_string()))
            .collect()
    }
}

impl fmt::Display for AdapterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A registered site.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SiteConfig {
    /// Registry key, the host without `www.`.
    pub name: String,

    /// Root URL, without trailing slash.
    pub base_url: String,

    /// Parsing strategy.
    pub kind: AdapterKind,

    /// Category name to URL segment.
    pub categories: BTreeMap<String, String>,
}

impl SiteConfig {
    /// A site using the adapter's default category table.
    pub fn new(name: &str, base_url: &str, kind: AdapterKind) -> Self {
        Self {
            name: name.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
            kind,
            categories: kind.default_categories(),
        }
    }

    /// Builds the adapter for this site.
    pub fn adapter(&self) -> Box<dyn SiteAdapter> {
        match self.kind {
            AdapterKind::Shuhaige => Box::new(ShuhaigeAdapter::new(self.clone())),
            AdapterKind::Ixdzs8 => Box::new(Ixdzs8Adapter::new(self.clone())),
        }
    }

    /// Category names sorted for display.
    pub fn category_names(&self) -> Vec<&str> {
        self.categories.keys().map(String::as_str).collect()
    }
}

/// Table of known sites, built at startup.
#[derive(Debug, Clone)]
pub struct SiteRegistry {
    sites: Vec<SiteConfig>,
}

impl Default for SiteRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

impl SiteRegistry {
    /// The built-in site table.
    pub fn builtin() -> Self {
        Self {
            sites: vec![
                SiteConfig::new("m.shuhaige.net", "https://m.shuhaige.net", AdapterKind::Shuhaige),
                SiteConfig::new("shuhaige.net", "https://www.shuhaige.net", AdapterKind::Shuhaige),
                SiteConfig::new("ixdzs8.com", "https://ixdzs8.com", AdapterKind::Ixdzs8),
            ],
        }
    }

    /// The built-in table with config-file registrations merged over it.
    pub fn with_entries(entries: &[SiteEntry]) -> Result<Self, ConfigError> {
        let mut registry = Self::builtin();
        for entry in entries {
            registry.register(site_from_entry(entry)?);
        }
        Ok(registry)
    }

    /// Adds a site, replacing any site with the same name.
    pub fn register(&mut self, site: SiteConfig) {
        match self.sites.iter_mut().find(|s| s.name == site.name) {
            Some(existing) => *existing = site,
            None => self.sites.push(site),
        }
    }

    /// Looks up a site by name, host or URL.
    pub fn get(&self, name_or_url: &str) -> Option<&SiteConfig> {
        let key = site_key(name_or_url);
        self.sites
            .iter()
            .find(|s| s.name == key)
            .or_else(|| self.sites.iter().find(|s| site_key(&s.base_url) == key))
    }

    /// All registered sites.
    pub fn all(&self) -> &[SiteConfig] {
        &self.sites
    }
}

/// Normalises a URL or host into a registry key.
fn site_key(name_or_url: &str) -> String {
    let host = host_of(name_or_url.trim()).to_lowercase();
    host.strip_prefix("www.").map(str::to_string).unwrap_or(host)
}

fn site_from_entry(entry: &SiteEntry) -> Result<SiteConfig, ConfigError> {
    let kind = AdapterKind::parse(&entry.adapter).ok_or_else(|| ConfigError::UnknownAdapter {
        site: entry.name.clone(),
        adapter: entry.adapter.clone(),
    })?;

    let mut site = SiteConfig::new(&site_key(&entry.name), &entry.base_url, kind);
    if !entry.categories.is_empty() {
        site.categories = entry.categories.clone();
    }
    Ok(site)
}
