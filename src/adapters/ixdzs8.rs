//! 爱下电子书 (ixdzs8.com) adapter.
//!
//! Novels live at `/read/{id}/` and chapters at `/read/{id}/p{n}.html`.
//! Category listings are filtered to completed works on the server side.

use super::{
    ChapterRef, NovelMetadata, NovelTarget, SiteAdapter, SiteConfig, content_by_selectors,
    densest_block, description_after_label, order_chapters,
};
use crate::html;
use crate::utils::{chapter_number, char_count, resolve_url, strip_query};
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
    "#article",
    ".article",
    "#read",
    ".read",
    "#booktext",
    ".booktext",
];

/// Listing cap per category page.
const MAX_TARGETS: usize = 200;

/// How far up from a listing link to look for author and status text.
const ANCESTOR_SCAN: usize = 5;

static ANCHOR_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("a[href]").expect("Invalid anchor selector"));

static H1_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("h1").expect("Invalid h1 selector"));

/// A novel link, optionally with a query string.
static NOVEL_LINK_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/read/(\d+)/(?:[?#].*)?$").expect("Invalid NOVEL_LINK_REGEX"));

/// A chapter link; captures the chapter number.
static CHAPTER_LINK_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/read/\d+/p(\d+)\.html").expect("Invalid CHAPTER_LINK_REGEX"));

/// `书名_作者:某某_爱下电子书`.
static PAGE_TITLE_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([^_]+)_作者[：:]?([^_]+)_").expect("Invalid PAGE_TITLE_REGEX"));

static AUTHOR_LABEL_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"作者[：:]").expect("Invalid AUTHOR_LABEL_REGEX"));

static AUTHOR_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"作者[：:]\s*(\S+)").expect("Invalid AUTHOR_REGEX"));

/// Author patterns inside a listing entry, in priority order.
static LISTING_AUTHOR_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [r"(\S+)\s+\d+\.\d+万字", r"作者[：:]\s*(\S+)", r"(\S+)\s+已完结"]
        .iter()
        .map(|p| Regex::new(p).expect("Invalid listing author pattern"))
        .collect()
});

/// Words that mean a listing author match grabbed a status field instead.
static NOT_AN_AUTHOR_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"万字|完结|更新|章节").expect("Invalid NOT_AN_AUTHOR_REGEX"));

static DESCRIPTION_LABEL_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"简介[：:]|作品简介").expect("Invalid DESCRIPTION_LABEL_REGEX")
});

static DESCRIPTION_CLASS_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)desc|intro|summary").expect("Invalid DESCRIPTION_CLASS_REGEX"));

/// Promotional and navigation tails inside fallback content blocks.
static PROMO_LINE_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"(点击|收藏|推荐|订阅|加入书架).*$",
        r"上一页.*下一页.*$",
        r"目录.*返回.*$",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("Invalid promo pattern"))
    .collect()
});

/// Adapter for 爱下电子书.
pub struct Ixdzs8Adapter {
    site: SiteConfig,
}

impl Ixdzs8Adapter {
    pub fn new(site: SiteConfig) -> Self {
        Self { site }
    }

    /// Author and completion flag from the link's nearest ancestors.
    fn listing_details(&self, link: ElementRef<'_>) -> (Option<String>, bool) {
        let mut author = None;
        let mut completed = false;

        for ancestor in html::element_ancestors(link)
            .take_while(|a| !matches!(a.value().name(), "body" | "html"))
            .take(ANCESTOR_SCAN)
        {
            let text = html::block_text(ancestor);

            if author.is_none() {
                author = listing_author(&text);
            }
            if !completed {
                completed = self.check_completed(&text);
            }
            if author.is_some() && completed {
                break;
            }
        }

        (author, completed)
    }
}

impl SiteAdapter for Ixdzs8Adapter {
    fn name(&self) -> &str {
        &self.site.name
    }

    fn base_url(&self) -> &str {
        &self.site.base_url
    }

    fn category_url(&self, category: &str) -> Option<String> {
        let id = self.site.categories.get(category)?;
        Some(format!(
            "{}/sort/{}/index-{}-2-0-0.html",
            self.site.base_url, id, id
        ))
    }

    fn parse_category_page(&self, doc: &Html, page_url: &str, category: &str) -> Vec<NovelTarget> {
        let mut seen = HashSet::new();
        let mut targets = Vec::new();

        for link in doc.select(&ANCHOR_SELECTOR) {
            let href = link.value().attr("href").unwrap_or_default().trim();
            let Some(caps) = NOVEL_LINK_REGEX.captures(href) else {
                continue;
            };

            let title = html::flat_text(link);
            if char_count(&title) < 2 {
                continue;
            }

            let novel_id = caps[1].to_string();
            if !seen.insert(novel_id.clone()) {
                continue;
            }

            let (author, completed) = self.listing_details(link);
            targets.push(NovelTarget {
                title,
                url: strip_query(&resolve_url(page_url, href)).to_string(),
                category: category.to_string(),
                author,
                completed,
                novel_id,
            });

            if targets.len() >= MAX_TARGETS {
                break;
            }
        }

        targets
    }

    fn extract_metadata(&self, doc: &Html) -> NovelMetadata {
        let page_title = html::page_title(doc).unwrap_or_default();

        let (mut title, mut author) = match PAGE_TITLE_REGEX.captures(&page_title) {
            Some(caps) => (
                caps[1].trim().to_string(),
                Some(caps[2].trim().to_string()).filter(|a| !a.is_empty()),
            ),
            None => (
                page_title.split('_').next().unwrap_or_default().trim().to_string(),
                None,
            ),
        };

        if title.is_empty()
            && let Some(h1) = doc.select(&H1_SELECTOR).next()
        {
            title = html::flat_text(h1);
        }

        if author.is_none() {
            author = html::parent_text_of_match(doc, &AUTHOR_LABEL_REGEX)
                .and_then(|text| AUTHOR_REGEX.captures(&text).map(|caps| caps[1].to_string()));
        }

        let description = html::parent_block_of_match(doc, &DESCRIPTION_LABEL_REGEX)
            .and_then(|text| description_after_label(&text))
            .or_else(|| {
                html::divs(doc)
                    .filter(|div| html::class_matches(*div, &DESCRIPTION_CLASS_REGEX))
                    .map(html::flat_text)
                    .find(|text| char_count(text) > 50)
            });

        NovelMetadata {
            title,
            author,
            description,
        }
    }

    fn extract_chapters(&self, doc: &Html, page_url: &str) -> Vec<ChapterRef> {
        let mut seen_numbers = HashSet::new();

        let chapters = html::links(doc)
            .into_iter()
            .filter_map(|link| {
                let page_number: u32 = CHAPTER_LINK_REGEX.captures(&link.href)?[1].parse().ok()?;
                if link.text.is_empty() || !seen_numbers.insert(page_number) {
                    return None;
                }
                let number = chapter_number(&link.text).or(Some(page_number));
                let url = resolve_url(page_url, &link.href);
                Some(ChapterRef::new(link.text, url, number))
            })
            .collect();

        order_chapters(chapters)
    }

    fn extract_chapter_content(&self, doc: &Html) -> String {
        if let Some(text) = content_by_selectors(doc, CONTENT_SELECTORS, 200) {
            return text.trim().to_string();
        }

        match densest_block(doc, 500, 100, 0.0) {
            Some(text) => text
                .lines()
                .map(strip_promo)
                .filter(|line| !line.is_empty())
                .collect::<Vec<_>>()
                .join("\n"),
            None => String::new(),
        }
    }
}

/// First listing author pattern that yields a plausible name.
fn listing_author(text: &str) -> Option<String> {
    LISTING_AUTHOR_PATTERNS.iter().find_map(|pattern| {
        let caps = pattern.captures(text)?;
        let name = caps[1].trim();
        let plausible = char_count(name) < 30 && !NOT_AN_AUTHOR_REGEX.is_match(name);
        plausible.then(|| name.to_string())
    })
}

/// Cuts a line at the first promotional or navigation marker.
fn strip_promo(line: &str) -> &str {
    let cut = PROMO_LINE_PATTERNS
        .iter()
        .filter_map(|p| p.find(line).map(|m| m.start()))
        .min()
        .unwrap_or(line.len());
    line[..cut].trim()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::AdapterKind;

    fn adapter() -> Ixdzs8Adapter {
        Ixdzs8Adapter::new(SiteConfig::new(
            "ixdzs8.com",
            "https://ixdzs8.com",
            AdapterKind::Ixdzs8,
        ))
    }

    #[test]
    fn test_category_url() {
        let adapter = adapter();
        assert_eq!(
            adapter.category_url("玄幻").as_deref(),
            Some("https://ixdzs8.com/sort/1/index-1-2-0-0.html")
        );
        assert_eq!(
            adapter.category_url("古言").as_deref(),
            Some("https://ixdzs8.com/sort/11/index-11-2-0-0.html")
        );
        assert_eq!(adapter.category_url("推理"), None);
    }

    #[test]
    fn test_parse_category_page_dedupes_by_id() {
        let doc = Html::parse_document(
            r#"<html><body><ul>
<li><div class="info"><a href="/read/5566/">剑来长歌</a><span>墨客 3.5万字</span><span>已完结</span></div></li>
<li><div class="info"><a href="/read/5566/?ref=rank">剑来长歌</a></div></li>
<li><div class="info"><a href="/read/7788/">星海</a><span>作者：远帆</span><span>连载中</span></div></li>
<li><a href="/read/9/">X</a></li>
<li><a href="/read/5566/p1.html">第1章</a></li>
</ul></body></html>"#,
        );

        let targets = adapter().parse_category_page(&doc, "https://ixdzs8.com/sort/1/", "玄幻");
        assert_eq!(targets.len(), 2);

        assert_eq!(targets[0].novel_id, "5566");
        assert_eq!(targets[0].url, "https://ixdzs8.com/read/5566/");
        assert_eq!(targets[0].author.as_deref(), Some("墨客"));
        assert!(targets[0].completed);

        assert_eq!(targets[1].novel_id, "7788");
        assert_eq!(targets[1].author.as_deref(), Some("远帆"));
        assert!(!targets[1].completed);
    }

    #[test]
    fn test_extract_metadata_from_page_title() {
        let doc = Html::parse_document(
            r#"<html><head><title>剑来长歌_作者:墨客_爱下电子书</title></head><body>
<h1>剑来长歌</h1>
<div class="novel-intro">少年负剑出山，一路向北，遇见许多人，也告别许多人。江湖很大，大到容得下所有的离别与重逢。山河辽阔，人心更远。</div>
</body></html>"#,
        );

        let meta = adapter().extract_metadata(&doc);
        assert_eq!(meta.title, "剑来长歌");
        assert_eq!(meta.author.as_deref(), Some("墨客"));
        assert!(meta.description.unwrap().starts_with("少年负剑出山"));
    }

    #[test]
    fn test_extract_metadata_fallbacks() {
        let doc = Html::parse_document(
            r#"<html><head><title></title></head><body>
<h1>星海</h1><p>作者：远帆</p><p>简介：星辰大海。</p>
</body></html>"#,
        );

        let meta = adapter().extract_metadata(&doc);
        assert_eq!(meta.title, "星海");
        assert_eq!(meta.author.as_deref(), Some("远帆"));
        assert_eq!(meta.description.as_deref(), Some("星辰大海。"));
    }

    #[test]
    fn test_extract_chapters_orders_by_number() {
        let doc = Html::parse_document(
            r#"<html><body><ul>
<li><a href="/read/5566/p2.html">第2章 下山</a></li>
<li><a href="/read/5566/p1.html">第1章 入门</a></li>
<li><a href="/read/5566/p3.html">后记</a></li>
<li><a href="/read/5566/p1.html">第1章 入门</a></li>
<li><a href="/read/5566/">返回</a></li>
</ul></body></html>"#,
        );

        let chapters = adapter().extract_chapters(&doc, "https://ixdzs8.com/read/5566/");
        let titles: Vec<_> = chapters.iter().map(|c| c.title.as_str()).collect();
        assert_eq!(titles, vec!["第1章 入门", "第2章 下山", "后记"]);
        assert_eq!(chapters[2].number, Some(3));
        assert_eq!(chapters[0].url, "https://ixdzs8.com/read/5566/p1.html");
    }

    #[test]
    fn test_extract_chapter_content_selector() {
        let body = "他把剑插回鞘中，望向远处的群山。".repeat(15);
        let doc = Html::parse_document(&format!(
            r#"<html><body><div class="page-content"><p>{}</p></div><div id="content"><p>{}</p><script>ad()</script></div></body></html>"#,
            "短", body
        ));
        assert_eq!(adapter().extract_chapter_content(&doc), body);
    }

    #[test]
    fn test_extract_chapter_content_fallback_strips_promo() {
        let body = "他把剑插回鞘中，望向远处的群山。".repeat(40);
        let doc = Html::parse_document(&format!(
            r#"<html><body><div class="chapter"><p>{}</p><p>点击收藏本站</p><p>上一页 目录 下一页</p></div></body></html>"#,
            body
        ));
        assert_eq!(adapter().extract_chapter_content(&doc), body);
    }

    #[test]
    fn test_strip_promo() {
        assert_eq!(strip_promo("好句子。点击收藏"), "好句子。");
        assert_eq!(strip_promo("上一页 下一页"), "");
        assert_eq!(strip_promo("平常的一行"), "平常的一行");
    }
}
