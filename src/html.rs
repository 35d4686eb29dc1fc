//! Document helpers on top of `scraper`.
//!
//! Text extraction here mirrors what a browser shows as readable text:
//! text nodes are trimmed, empty ones dropped, and anything inside
//! script/style/navigation chrome is skipped.

use regex::Regex;
use scraper::node::Node;
use scraper::{ElementRef, Html, Selector};
use std::sync::LazyLock;

/// Elements whose text never counts as content.
const SKIPPED_ELEMENTS: &[&str] = &[
    "script", "style", "noscript", "nav", "header", "footer", "aside",
];

static ANCHOR_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("a[href]").expect("Invalid anchor selector"));

static DIV_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("div").expect("Invalid div selector"));

static TITLE_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("title").expect("Invalid title selector"));

/// A link found on a page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Link {
    /// Raw `href` attribute.
    pub href: String,
    /// Trimmed link text.
    pub text: String,
}

/// Collects the trimmed, non-empty text lines of an element.
pub fn text_lines(elem: ElementRef<'_>) -> Vec<String> {
    let mut lines = Vec::new();

    for node in elem.descendants() {
        if let Node::Text(t) = node.value() {
            let skipped = node.ancestors().any(|ancestor| {
                ancestor
                    .value()
                    .as_element()
                    .is_some_and(|e| SKIPPED_ELEMENTS.contains(&e.name()))
            });
            if skipped {
                continue;
            }
            let trimmed = t.trim();
            if !trimmed.is_empty() {
                lines.push(trimmed.to_string());
            }
        }
    }

    lines
}

/// Readable text of an element, one text node per line.
pub fn block_text(elem: ElementRef<'_>) -> String {
    text_lines(elem).join("\n")
}

/// Readable text of an element with text nodes concatenated.
pub fn flat_text(elem: ElementRef<'_>) -> String {
    text_lines(elem).concat()
}

/// Readable text of the whole page, one text node per line.
pub fn page_text(doc: &Html) -> String {
    block_text(doc.root_element())
}

/// Contents of the `<title>` element.
pub fn page_title(doc: &Html) -> Option<String> {
    doc.select(&TITLE_SELECTOR)
        .next()
        .map(|t| t.text().collect::<String>().trim().to_string())
        .filter(|t| !t.is_empty())
}

/// All links on the page, in document order.
pub fn links(doc: &Html) -> Vec<Link> {
    doc.select(&ANCHOR_SELECTOR)
        .filter_map(|a| {
            let href = a.value().attr("href")?.trim().to_string();
            Some(Link {
                href,
                text: a.text().collect::<String>().trim().to_string(),
            })
        })
        .collect()
}

/// All `<div>` elements, in document order.
pub fn divs(doc: &Html) -> impl Iterator<Item = ElementRef<'_>> {
    doc.select(&DIV_SELECTOR)
}

/// First element matching a CSS selector.
pub fn select_first<'a>(doc: &'a Html, selector: &str) -> Option<ElementRef<'a>> {
    let selector = Selector::parse(selector).ok()?;
    doc.select(&selector).next()
}

/// Finds the first text node matching `pattern` and returns its parent element's text.
///
/// Used for label/value layouts like `<p>作者：某某</p>` where the label
/// and value share a parent.
pub fn parent_text_of_match(doc: &Html, pattern: &Regex) -> Option<String> {
    parent_of_match(doc, pattern).map(flat_text)
}

/// Like [`parent_text_of_match`], keeping one line per text node.
pub fn parent_block_of_match(doc: &Html, pattern: &Regex) -> Option<String> {
    parent_of_match(doc, pattern).map(block_text)
}

fn parent_of_match<'a>(doc: &'a Html, pattern: &Regex) -> Option<ElementRef<'a>> {
    doc.root_element()
        .descendants()
        .filter(|node| matches!(node.value(), Node::Text(t) if pattern.is_match(t)))
        .find_map(|node| node.parent().and_then(ElementRef::wrap))
}

/// Returns true if any class on the element matches the pattern.
pub fn class_matches(elem: ElementRef<'_>, pattern: &Regex) -> bool {
    elem.value().classes().any(|class| pattern.is_match(class))
}

/// Element ancestors of an element, nearest first.
pub fn element_ancestors(elem: ElementRef<'_>) -> impl Iterator<Item = ElementRef<'_>> {
    elem.ancestors().filter_map(ElementRef::wrap)
}

/// Direct element children of an element.
pub fn element_children(elem: ElementRef<'_>) -> impl Iterator<Item = ElementRef<'_>> {
    elem.children().filter_map(ElementRef::wrap)
}
