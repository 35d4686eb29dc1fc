//! 书海阁 (m.shuhaige.net / www.shuhaige.net) adapter.
//!
//! Novels live at `/{id}/`; category listings sit at `/{code}/` with the
//! novels in list containers, though some layouts only expose bare links.

use super::{
    ChapterRef, NovelMetadata, NovelTarget, SiteAdapter, SiteConfig, content_by_selectors,
    densest_block, description_after_label, order_chapters, same_host,
};
use crate::html::{self, Link};
use crate::utils::{chapter_number, char_count, is_chapter_title, resolve_url, strip_query};
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use std::collections::HashSet;
use std::sync::LazyLock;

/// Content containers in priority order.
const CONTENT_SELECTORS: &[&str] = &[
    "#content",
    ".content",
    "#chaptercontent",
    ".chaptercontent",
    "#novelcontent",
    ".novelcontent",
    "#text",
    ".text",
];

/// URL fragments that never point at a novel.
const NON_NOVEL_URL_PARTS: &[&str] = &["login", "register", "search", "category", "list", "sort", "tag"];

/// Listing cap per category page.
const MAX_TARGETS: usize = 200;

/// Siblings of an item's parent that are scanned for completion markers.
const SIBLING_SCAN: usize = 3;

static CONTAINER_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("ul, ol, div").expect("Invalid container selector"));

static LI_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("li").expect("Invalid li selector"));

static ANCHOR_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("a[href]").expect("Invalid anchor selector"));

static H1_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("h1").expect("Invalid h1 selector"));

/// Class names of list containers.
static CONTAINER_CLASS_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"list|book|novel|item").expect("Invalid CONTAINER_CLASS_REGEX"));

/// A novel ID path segment.
static NOVEL_ID_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/(\d{4,})/").expect("Invalid NOVEL_ID_REGEX"));

/// A link that ends at a novel ID.
static NOVEL_LINK_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/\d{4,}/$").expect("Invalid NOVEL_LINK_REGEX"));

/// Legacy `/shu_{id}.html` novel links.
static SHU_LINK_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/shu_(\d+)\.html").expect("Invalid SHU_LINK_REGEX"));

static AUTHOR_LABEL_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"作者[：:]").expect("Invalid AUTHOR_LABEL_REGEX"));

static AUTHOR_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"作者[：:]\s*(\S+)").expect("Invalid AUTHOR_REGEX"));

/// Author on a novel page, where the name runs straight into the next label.
static AUTHOR_BEFORE_LABEL_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"作者[：:]\s*(\S+?)\s*(?:都市|已完结|最新章节|万字|最后更新|\d+章)")
        .expect("Invalid AUTHOR_BEFORE_LABEL_REGEX")
});

static DESCRIPTION_LABEL_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"简介[：:]").expect("Invalid DESCRIPTION_LABEL_REGEX"));

static LIST_SUFFIX_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s*列表\s*$").expect("Invalid LIST_SUFFIX_REGEX"));

/// Site watermark and reader chrome inside chapter bodies.
static WATERMARK_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"书海阁|www\.shuhaige\.net|手机阅读|返回书页|上一章.*下一章")
        .expect("Invalid WATERMARK_REGEX")
});

/// Adapter for 书海阁.
pub struct ShuhaigeAdapter {
    site: SiteConfig,
}

impl ShuhaigeAdapter {
    pub fn new(site: SiteConfig) -> Self {
        Self { site }
    }

    /// List items that hold novels, by the first strategy that finds any.
    fn listing_items<'a>(&self, doc: &'a Html) -> Vec<ElementRef<'a>> {
        let from_containers: Vec<ElementRef<'a>> = doc
            .select(&CONTAINER_SELECTOR)
            .filter(|c| html::class_matches(*c, &CONTAINER_CLASS_REGEX))
            .flat_map(|c| {
                html::element_children(c).filter(|child| matches!(child.value().name(), "li" | "div"))
            })
            .collect();
        if !from_containers.is_empty() {
            return from_containers;
        }

        let from_list_items: Vec<ElementRef<'a>> = doc
            .select(&LI_SELECTOR)
            .filter(|li| {
                li.select(&ANCHOR_SELECTOR).any(|a| {
                    let href = a.value().attr("href").unwrap_or_default().to_lowercase();
                    NOVEL_ID_REGEX.is_match(&href) || href.contains("novel") || href.contains("book")
                })
            })
            .collect();
        if !from_list_items.is_empty() {
            return from_list_items;
        }

        doc.select(&ANCHOR_SELECTOR)
            .filter(|a| {
                let href = a.value().attr("href").unwrap_or_default();
                NOVEL_LINK_REGEX.is_match(href) && !html::flat_text(*a).is_empty()
            })
            .collect()
    }

    /// Builds a target from one listing item.
    fn target_from_item(
        &self,
        item: ElementRef<'_>,
        page_url: &str,
        category: &str,
    ) -> Option<NovelTarget> {
        let (link, container) = if item.value().name() == "a" {
            (item, item.parent().and_then(ElementRef::wrap))
        } else {
            (item.select(&ANCHOR_SELECTOR).next()?, Some(item))
        };

        let mut title = html::flat_text(link);
        if char_count(&title) < 2
            && let Some(container) = container
        {
            title = html::text_lines(container)
                .into_iter()
                .next()
                .unwrap_or_default()
                .chars()
                .take(100)
                .collect();
        }
        if char_count(&title) < 2 {
            return None;
        }

        let mut href = link.value().attr("href")?.trim().to_string();
        if let Some(caps) = SHU_LINK_REGEX.captures(&href) {
            href = format!("/{}/", &caps[1]);
        }
        if href.is_empty() {
            return None;
        }

        let resolved = resolve_url(page_url, &href);
        let url = format!("{}/", strip_query(&resolved).trim_end_matches('/'));
        if url.contains(".html") {
            return None;
        }
        let novel_id = NOVEL_ID_REGEX.captures(&url)?[1].to_string();

        let lowered = url.to_lowercase();
        if NON_NOVEL_URL_PARTS.iter().any(|part| lowered.contains(part)) {
            return None;
        }

        Some(NovelTarget {
            title,
            url,
            category: category.to_string(),
            author: listing_author(item),
            completed: self.check_completed(&completion_text(item)),
            novel_id,
        })
    }

    fn is_chapter_link(&self, link: &Link, url: &str, page_url: &str) -> bool {
        !link.text.is_empty()
            && is_chapter_title(&link.text)
            && same_host(url, page_url)
            && strip_query(url) != strip_query(page_url)
    }
}

impl SiteAdapter for ShuhaigeAdapter {
    fn name(&self) -> &str {
        &self.site.name
    }

    fn base_url(&self) -> &str {
        &self.site.base_url
    }

    fn category_url(&self, category: &str) -> Option<String> {
        let code = self.site.categories.get(category)?;
        Some(format!("{}/{}/", self.site.base_url, code))
    }

    fn parse_category_page(&self, doc: &Html, page_url: &str, category: &str) -> Vec<NovelTarget> {
        let mut seen = HashSet::new();

        self.listing_items(doc)
            .into_iter()
            .filter_map(|item| self.target_from_item(item, page_url, category))
            .filter(|target| seen.insert(target.novel_id.clone()))
            .take(MAX_TARGETS)
            .collect()
    }

    fn extract_metadata(&self, doc: &Html) -> NovelMetadata {
        let title = doc
            .select(&H1_SELECTOR)
            .next()
            .map(html::flat_text)
            .map(|t| LIST_SUFFIX_REGEX.replace(&t, "").trim().to_string())
            .filter(|t| !t.is_empty())
            .or_else(|| {
                html::page_title(doc)
                    .and_then(|t| t.split(['_', '-']).next().map(|s| s.trim().to_string()))
            })
            .unwrap_or_default();

        let author = html::parent_text_of_match(doc, &AUTHOR_LABEL_REGEX).and_then(|text| {
            let caps = AUTHOR_BEFORE_LABEL_REGEX
                .captures(&text)
                .or_else(|| AUTHOR_REGEX.captures(&text))?;
            let name = caps[1].trim_end_matches([':', '：']).trim().to_string();
            (!name.is_empty() && char_count(&name) < 30).then_some(name)
        });

        let description = html::parent_block_of_match(doc, &DESCRIPTION_LABEL_REGEX)
            .and_then(|text| description_after_label(&text));

        NovelMetadata {
            title,
            author,
            description,
        }
    }

    fn extract_chapters(&self, doc: &Html, page_url: &str) -> Vec<ChapterRef> {
        let chapters = html::links(doc)
            .into_iter()
            .filter_map(|link| {
                let url = resolve_url(page_url, &link.href);
                self.is_chapter_link(&link, &url, page_url).then(|| {
                    let number = chapter_number(&link.text);
                    ChapterRef::new(link.text, url, number)
                })
            })
            .collect();

        order_chapters(chapters)
    }

    fn extract_chapter_content(&self, doc: &Html) -> String {
        let text = content_by_selectors(doc, CONTENT_SELECTORS, 100)
            .or_else(|| densest_block(doc, 500, 0, 0.0));

        match text {
            Some(text) => text
                .lines()
                .map(str::trim)
                .filter(|line| !line.is_empty() && !WATERMARK_REGEX.is_match(line))
                .collect::<Vec<_>>()
                .join("\n"),
            None => String::new(),
        }
    }
}

/// Text scanned for completion markers: the item, its parent and the parent's neighbours.
fn completion_text(item: ElementRef<'_>) -> String {
    let mut parts = vec![html::block_text(item)];

    if let Some(parent) = item.parent().and_then(ElementRef::wrap) {
        parts.push(html::block_text(parent));
        parts.extend(
            parent
                .next_siblings()
                .filter_map(ElementRef::wrap)
                .take(SIBLING_SCAN)
                .map(html::block_text),
        );
        parts.extend(
            parent
                .prev_siblings()
                .filter_map(ElementRef::wrap)
                .take(SIBLING_SCAN)
                .map(html::block_text),
        );
    }

    parts.join(" ")
}

/// Author from an `作者：` label inside a listing item.
fn listing_author(item: ElementRef<'_>) -> Option<String> {
    item.descendants()
        .filter(|node| node.value().as_text().is_some_and(|t| AUTHOR_LABEL_REGEX.is_match(t)))
        .find_map(|node| node.parent().and_then(ElementRef::wrap))
        .and_then(|parent| {
            let text = html::flat_text(parent);
            AUTHOR_REGEX.captures(&text).map(|caps| caps[1].to_string())
        })
}
