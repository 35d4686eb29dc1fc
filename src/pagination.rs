//! Chapter index pagination discovery.
//!
//! Some sites split a chapter index over several pages. Page-range links
//! (`第51-100章`) are used when the page offers enough of them; otherwise a
//! declared chapter total (`共312章`) drives a probe of known URL templates.
//! Only one page number is probed per template and the first template that
//! yields chapters is adopted. A template that only becomes distinguishable
//! at a later page number is therefore missed.

use crate::adapters::{ChapterRef, SiteAdapter, order_chapters, same_host};
use crate::config::PaginationConfig;
use crate::fetcher::PageSource;
use crate::html;
use crate::utils::{resolve_url, strip_query};
use regex::Regex;
use scraper::Html;
use std::collections::HashSet;
use std::fmt;
use std::sync::LazyLock;
use tracing::{info, warn};

/// `共312章`.
static DECLARED_TOTAL_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"共\s*(\d+)\s*章").expect("Invalid DECLARED_TOTAL_REGEX"));

/// `第51-100章`.
static RANGE_LINK_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"第(\d+)\s*-\s*(\d+)章").expect("Invalid RANGE_LINK_REGEX"));

/// `51-100`.
static BARE_RANGE_LINK_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d+)\s*-\s*\d+$").expect("Invalid BARE_RANGE_LINK_REGEX"));

/// Known chapter index URL conventions, in probe order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageTemplate {
    /// `{base}?page=N`
    QueryPage,
    /// `{base}/page/N`
    PathPage,
    /// `{base}?p=N`
    QueryP,
}

impl PageTemplate {
    pub const ALL: [PageTemplate; 3] = [
        PageTemplate::QueryPage,
        PageTemplate::PathPage,
        PageTemplate::QueryP,
    ];

    /// URL of page `n` of the index at `base`.
    pub fn url(self, base: &str, n: usize) -> String {
        let base = base.trim_end_matches('/');
        match self {
            PageTemplate::QueryPage => format!("{}?page={}", base, n),
            PageTemplate::PathPage => format!("{}/page/{}", base, n),
            PageTemplate::QueryP => format!("{}?p={}", base, n),
        }
    }
}

impl fmt::Display for PageTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let pattern = match self {
            PageTemplate::QueryPage => "?page={n}",
            PageTemplate::PathPage => "/page/{n}",
            PageTemplate::QueryP => "?p={n}",
        };
        f.write_str(pattern)
    }
}

/// What the first index page says about pagination.
#[derive(Debug, Clone)]
pub struct PaginationEvidence {
    /// URL of the first index page.
    pub page_url: String,

    /// Total chapter count printed on the page.
    pub declared_total: Option<usize>,

    /// Distinct page-range link URLs, ordered by the first chapter they cover.
    pub page_links: Vec<String>,

    /// Chapters listed on the first page, ordered.
    pub first_page: Vec<ChapterRef>,
}

impl PaginationEvidence {
    /// Collects evidence from the first index page.
    pub fn from_document(doc: &Html, page_url: &str, adapter: &dyn SiteAdapter) -> Self {
        let declared_total = DECLARED_TOTAL_REGEX
            .captures(&html::page_text(doc))
            .and_then(|caps| caps[1].parse().ok());

        let mut seen = HashSet::new();
        let mut ranged: Vec<(u32, String)> = html::links(doc)
            .into_iter()
            .filter_map(|link| {
                let start = RANGE_LINK_REGEX
                    .captures(&link.text)
                    .or_else(|| BARE_RANGE_LINK_REGEX.captures(&link.text))
                    .and_then(|caps| caps[1].parse().ok())?;
                let url = resolve_url(page_url, &link.href);
                let usable = same_host(&url, page_url) && strip_query(&url) != strip_query(page_url);
                usable.then_some((start, url))
            })
            .filter(|(_, url)| seen.insert(url.clone()))
            .collect();
        ranged.sort_by_key(|(start, _)| *start);

        Self {
            page_url: page_url.to_string(),
            declared_total,
            page_links: ranged.into_iter().map(|(_, url)| url).collect(),
            first_page: adapter.extract_chapters(doc, page_url),
        }
    }

    /// Returns true if the index probably continues on other pages.
    pub fn is_paginated(&self) -> bool {
        !self.page_links.is_empty()
            || self
                .declared_total
                .is_some_and(|total| total > self.first_page.len())
    }
}

/// How the chapter list was assembled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaginationOutcome {
    /// Everything was on the first page.
    SinglePage,

    /// Pages came from page-range links.
    Links { pages: usize },

    /// Pages came from a probed URL template.
    Template { template: PageTemplate, pages: usize },

    /// The index looked paginated but no page URLs could be found.
    NotFound { declared_total: Option<usize> },
}

/// Ordered chapters plus how they were found.
#[derive(Debug, Clone)]
pub struct Discovery {
    pub chapters: Vec<ChapterRef>,
    pub outcome: PaginationOutcome,
}

/// Infers a site's chapter index pagination.
pub struct PaginationDiscoverer {
    config: PaginationConfig,
    page_retries: u32,
}

impl PaginationDiscoverer {
    /// `page_retries` is the retry budget for fetching confirmed pages.
    pub fn new(config: PaginationConfig, page_retries: u32) -> Self {
        Self {
            config,
            page_retries,
        }
    }

    /// Assembles the full chapter list starting from the first page's evidence.
    pub async fn discover(
        &self,
        evidence: PaginationEvidence,
        source: &dyn PageSource,
        adapter: &dyn SiteAdapter,
    ) -> Discovery {
        if !evidence.is_paginated() {
            return Discovery {
                chapters: evidence.first_page,
                outcome: PaginationOutcome::SinglePage,
            };
        }

        let (pages, outcome) = self.page_plan(&evidence, source, adapter).await;
        let Some(outcome) = outcome else {
            warn!(
                "Chapter index at {} looks paginated (declared total {:?}, {} on first page) but no page URLs were found; keeping the first page only",
                evidence.page_url,
                evidence.declared_total,
                evidence.first_page.len()
            );
            return Discovery {
                chapters: evidence.first_page,
                outcome: PaginationOutcome::NotFound {
                    declared_total: evidence.declared_total,
                },
            };
        };

        let mut all = evidence.first_page;
        for page in pages {
            match page {
                PlannedPage::Fetched(chapters) => all.extend(chapters),
                PlannedPage::Pending(url) => {
                    match source.fetch_page(&url, self.page_retries, false).await {
                        Ok(body) => all.extend(chapters_in(&body, &url, adapter)),
                        Err(e) => warn!("Skipping chapter index page {}: {}", url, e),
                    }
                }
            }
        }

        Discovery {
            chapters: order_chapters(all),
            outcome,
        }
    }

    /// Decides which pages to read. `None` outcome means nothing was found.
    async fn page_plan(
        &self,
        evidence: &PaginationEvidence,
        source: &dyn PageSource,
        adapter: &dyn SiteAdapter,
    ) -> (Vec<PlannedPage>, Option<PaginationOutcome>) {
        let link_pages = || -> Vec<PlannedPage> {
            evidence
                .page_links
                .iter()
                .cloned()
                .map(PlannedPage::Pending)
                .collect()
        };

        if evidence.page_links.len() >= self.config.sufficient_page_links {
            let pages = evidence.page_links.len();
            return (link_pages(), Some(PaginationOutcome::Links { pages }));
        }

        if let Some(total) = evidence.declared_total {
            let pages = total.div_ceil(self.config.chapters_per_page);
            info!(
                "Index declares {} chapters, expecting {} pages; probing URL templates",
                total, pages
            );

            if let Some((template, probed)) = self.probe(&evidence.page_url, source, adapter).await {
                info!("Adopted pagination template {}", template);
                let probe_page = self.config.probe_page;
                let plan = (2..=pages.max(probe_page))
                    .map(|n| {
                        if n == probe_page {
                            PlannedPage::Fetched(probed.clone())
                        } else {
                            PlannedPage::Pending(template.url(&evidence.page_url, n))
                        }
                    })
                    .collect();
                return (plan, Some(PaginationOutcome::Template { template, pages }));
            }
        }

        if evidence.page_links.is_empty() {
            return (Vec::new(), None);
        }

        let pages = evidence.page_links.len();
        (link_pages(), Some(PaginationOutcome::Links { pages }))
    }

    /// Tries each template once at the probe page number.
    async fn probe(
        &self,
        page_url: &str,
        source: &dyn PageSource,
        adapter: &dyn SiteAdapter,
    ) -> Option<(PageTemplate, Vec<ChapterRef>)> {
        for template in PageTemplate::ALL {
            let url = template.url(page_url, self.config.probe_page);
            let Ok(body) = source.fetch_page(&url, self.config.probe_retries, true).await else {
                continue;
            };

            let chapters = chapters_in(&body, &url, adapter);
            if !chapters.is_empty() {
                return Some((template, chapters));
            }
        }
        None
    }
}

enum PlannedPage {
    Fetched(Vec<ChapterRef>),
    Pending(String),
}

fn chapters_in(body: &str, url: &str, adapter: &dyn SiteAdapter) -> Vec<ChapterRef> {
    let doc = Html::parse_document(body);
    adapter.extract_chapters(&doc, url)
}
