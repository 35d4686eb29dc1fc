//! Batch workflow: list candidates, verify completion, fetch, validate, persist.
//!
//! Each novel moves through `Listed -> Verifying -> Fetching -> Validating`
//! and ends as one of the [`NovelOutcome`] variants. A novel's failure is
//! recorded in the batch statistics and never stops the batch.

use crate::adapters::{
    ChapterRef, NovelMetadata, NovelTarget, SiteAdapter, SiteConfig, SiteRegistry,
    is_finale_title,
};
use crate::checkpoint::{ProgressCheckpoint, ScrapeProgress};
use crate::config::Config;
use crate::console::Console;
use crate::error::{CheckpointError, FetchError, ScraperError};
use crate::fetcher::HttpFetcher;
use crate::html;
use crate::pagination::{PaginationDiscoverer, PaginationEvidence};
use crate::record::{ChapterError, ChapterRecord, ErrorKind, InvalidReason, NovelRecord};
use crate::storage::{
    BatchSummary, FailedNovel, FailureKind, NovelMetadataRecord, NovelStore, PersistedNovel,
};
use crate::utils::{format_duration, resolve_url, truncate_chars};
use crate::validator::{ContentValidator, NovelRejection};
use chrono::Local;
use futures::stream::{self, StreamExt};
use scraper::Html;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Href fragments of links that may lead to a full chapter catalog.
const CATALOG_HINTS: &[&str] = &["catalog", "index", "list"];

/// Minimum spot-check pass rate before a warning is shown.
const SPOT_CHECK_PASS_RATE: f64 = 0.5;

/// One batch run.
#[derive(Debug, Clone)]
pub struct BatchRequest {
    /// Site name, host or URL.
    pub site: String,

    pub category: String,

    /// Number of novels to fetch.
    pub count: usize,

    /// Only fetch novels verified as finished.
    pub filter_completed: bool,
}

/// How one novel ended.
#[derive(Debug)]
pub enum NovelOutcome {
    /// Validated and written to disk.
    Persisted {
        record: NovelRecord,
        metadata: NovelMetadataRecord,
        file: PathBuf,

        /// Highest adaptive delay reached while fetching.
        peak_delay: Duration,
    },

    /// Fetched but failed whole-novel validation; all artifacts removed.
    Rejected {
        title: String,
        rejection: NovelRejection,

        /// Failed chapters by error kind.
        chapter_failures: BTreeMap<ErrorKind, usize>,
    },

    /// Could not be fetched or persisted.
    Failed { title: String, reason: String },

    /// Stopped by an interrupt; progress was checkpointed.
    Interrupted {
        title: String,
        completed: usize,
        total: usize,
    },
}

impl NovelOutcome {
    /// Failure kind for the batch statistics, `None` for persisted novels.
    pub fn failure_kind(&self) -> Option<FailureKind> {
        match self {
            NovelOutcome::Persisted { .. } => None,
            NovelOutcome::Rejected { .. } => Some(FailureKind::Rejected),
            NovelOutcome::Failed { .. } => Some(FailureKind::Failed),
            NovelOutcome::Interrupted { .. } => Some(FailureKind::Interrupted),
        }
    }

    /// Human-readable failure reason, `None` for persisted novels.
    pub fn failure_reason(&self) -> Option<String> {
        match self {
            NovelOutcome::Persisted { .. } => None,
            NovelOutcome::Rejected { rejection, .. } => {
                Some(format!("validation failed: {}", rejection))
            }
            NovelOutcome::Failed { reason, .. } => Some(reason.clone()),
            NovelOutcome::Interrupted {
                completed, total, ..
            } => Some(format!("interrupted after {}/{} chapters", completed, total)),
        }
    }
}

/// Result of a batch run.
#[derive(Debug, Clone, Default)]
pub struct BatchReport {
    pub summary: BatchSummary,

    /// Metadata of every persisted novel.
    pub novels: Vec<NovelMetadataRecord>,

    /// The batch stopped early because of an interrupt.
    pub interrupted: bool,
}

/// What the first index page yielded.
struct IndexPage {
    metadata: NovelMetadata,
    evidence: PaginationEvidence,
    catalog_links: Vec<String>,
}

/// How the chapter loop ended.
enum FetchEnd {
    Complete,
    Interrupted,
}

/// Drives the acquisition workflow.
pub struct ScrapeOrchestrator {
    config: Config,
    registry: SiteRegistry,
    validator: ContentValidator,
    store: NovelStore,
    console: Console,
    cancel: CancellationToken,
}

impl ScrapeOrchestrator {
    pub fn new(config: Config, registry: SiteRegistry) -> Self {
        Self {
            validator: ContentValidator::new(config.validation.clone()),
            store: NovelStore::new(config.novels_dir()),
            console: Console::new(),
            cancel: CancellationToken::new(),
            config,
            registry,
        }
    }

    /// Replaces the console (tests disable colours).
    pub fn with_console(mut self, console: Console) -> Self {
        self.console = console;
        self
    }

    /// Token that stops the run when cancelled.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn registry(&self) -> &SiteRegistry {
        &self.registry
    }

    pub fn store(&self) -> &NovelStore {
        &self.store
    }

    /// Looks up a site and the listing URL for one of its categories.
    pub fn resolve(&self, site: &str, category: &str) -> Result<(&SiteConfig, String), ScraperError> {
        let site_config = self
            .registry
            .get(site)
            .ok_or_else(|| ScraperError::UnknownSite(site.to_string()))?;

        let url = site_config
            .adapter()
            .category_url(category)
            .ok_or_else(|| ScraperError::UnknownCategory {
                site: site_config.name.clone(),
                category: category.to_string(),
            })?;

        Ok((site_config, url))
    }

    /// Runs a whole batch and writes the batch summary files.
    pub async fn run_batch(&self, request: &BatchRequest) -> Result<BatchReport, ScraperError> {
        let (site, _) = self.resolve(&request.site, &request.category)?;

        self.console.section(&format!(
            "Batch: {} / {} / {} novels",
            site.name, request.category, request.count
        ));

        let candidates = self
            .list_candidates(site, &request.category, request.count, request.filter_completed)
            .await?;

        let mut report = BatchReport::default();

        if candidates.is_empty() {
            self.console.warning("No matching novels found");
        } else if candidates.len() < request.count {
            self.console.warning(&format!(
                "Only {} matching novels found ({} requested)",
                candidates.len(),
                request.count
            ));
        }

        let outcomes = self.scrape_all(site, &candidates).await;

        let stats = &mut report.summary.stats;
        stats.total = candidates.len();
        stats.skipped = candidates.len() - outcomes.len();
        report.interrupted = stats.skipped > 0;

        for (target, outcome) in outcomes {
            match outcome {
                NovelOutcome::Persisted {
                    record,
                    metadata,
                    file,
                    ..
                } => {
                    let stats = &mut report.summary.stats;
                    stats.record_success(&site.name, &metadata.validation_stats);
                    stats.record_chapter_failures(&record.failure_counts());
                    report.summary.successful_novels.push(PersistedNovel {
                        title: metadata.title.clone(),
                        site: site.name.clone(),
                        category: target.category.clone(),
                        file,
                    });
                    report.novels.push(metadata);
                }
                outcome => {
                    let kind = outcome.failure_kind().unwrap_or(FailureKind::Failed);
                    if kind == FailureKind::Interrupted {
                        report.interrupted = true;
                    }
                    if let NovelOutcome::Rejected {
                        chapter_failures, ..
                    } = &outcome
                    {
                        report.summary.stats.record_chapter_failures(chapter_failures);
                    }
                    report.summary.stats.record_failure(&site.name, kind);
                    report.summary.failed_novels.push(FailedNovel {
                        title: target.title.clone(),
                        url: target.url.clone(),
                        reason: outcome.failure_reason().unwrap_or_default(),
                    });
                }
            }
        }

        let summary_path = self
            .store
            .write_batch_summary(&report.summary, &report.novels)?;
        info!("Batch summary written to {}", summary_path.display());

        self.console.batch_summary(&report.summary.stats);
        if report.interrupted {
            self.console
                .warning("Interrupted; rerun the same command to resume from checkpoints");
        }

        Ok(report)
    }

    /// Fetches each candidate, sequentially or with a bounded worker pool.
    async fn scrape_all<'a>(
        &self,
        site: &SiteConfig,
        candidates: &'a [NovelTarget],
    ) -> Vec<(&'a NovelTarget, NovelOutcome)> {
        let workers = self.config.batch.workers.max(1);

        if workers > 1 {
            return stream::iter(candidates)
                .map(|target| async move { (target, self.scrape_novel(site, target).await) })
                .buffer_unordered(workers)
                .collect()
                .await;
        }

        let gap = Duration::from_millis(self.config.batch.novel_gap_ms);
        let mut outcomes = Vec::with_capacity(candidates.len());

        for (i, target) in candidates.iter().enumerate() {
            if self.cancel.is_cancelled() {
                break;
            }

            self.console.step(&format!("[{}/{}] {}", i + 1, candidates.len(), target.title));
            outcomes.push((target, self.scrape_novel(site, target).await));

            if i + 1 < candidates.len() && !gap.is_zero() {
                tokio::select! {
                    _ = self.cancel.cancelled() => {}
                    _ = tokio::time::sleep(gap) => {}
                }
            }
        }

        outcomes
    }

    /// Lists candidates from the category page, optionally keeping only finished novels.
    pub async fn list_candidates(
        &self,
        site: &SiteConfig,
        category: &str,
        count: usize,
        filter_completed: bool,
    ) -> Result<Vec<NovelTarget>, ScraperError> {
        let adapter = site.adapter();
        let url = adapter
            .category_url(category)
            .ok_or_else(|| ScraperError::UnknownCategory {
                site: site.name.clone(),
                category: category.to_string(),
            })?;

        self.console.step(&format!("Fetching category page {}", url));
        let fetcher = HttpFetcher::new(&self.config.fetch)?;
        let body = fetcher.fetch(&url).await;
        fetcher.close();
        let body = body?;

        let targets = parse_category(adapter.as_ref(), &body, &url, category);
        self.console
            .info(&format!("Found {} novels on the category page", targets.len()));

        if !filter_completed {
            return Ok(targets.into_iter().take(count).collect());
        }

        let marked = targets.iter().filter(|t| t.completed).count();
        let threshold = targets.len() as f64 * self.config.batch.completion_signal_ratio;

        let completed = if marked == 0 || (marked as f64) < threshold {
            self.console.info(&format!(
                "Only {} listed as finished; checking detail pages",
                marked
            ));
            self.verify_completion(adapter.as_ref(), targets, count).await
        } else {
            let completed: Vec<NovelTarget> = targets.into_iter().filter(|t| t.completed).collect();
            self.spot_check(adapter.as_ref(), &completed).await;
            completed
        };

        self.console
            .success(&format!("{} finished novels selected", completed.len().min(count)));
        Ok(completed.into_iter().take(count).collect())
    }

    /// Probes detail pages until `count` finished novels are found or the probe budget runs out.
    async fn verify_completion(
        &self,
        adapter: &dyn SiteAdapter,
        targets: Vec<NovelTarget>,
        count: usize,
    ) -> Vec<NovelTarget> {
        let budget = targets.len().min(self.config.batch.max_verify);
        let mut verified = Vec::new();

        for (i, mut target) in targets.into_iter().take(budget).enumerate() {
            if verified.len() >= count || self.cancel.is_cancelled() {
                break;
            }

            let label = truncate_chars(&target.title, 30);
            match self.probe_completion(adapter, &target.url, true).await {
                Some(true) => {
                    debug!("[{}/{}] {} is finished", i + 1, budget, label);
                    target.completed = true;
                    verified.push(target);
                }
                Some(false) => debug!("[{}/{}] {} is ongoing", i + 1, budget, label),
                None => debug!("[{}/{}] {} could not be checked", i + 1, budget, label),
            }
        }

        info!("Detail page checks found {} finished novels", verified.len());
        verified
    }

    /// Re-probes the first few listing-marked novels and warns on a low pass rate.
    async fn spot_check(&self, adapter: &dyn SiteAdapter, completed: &[NovelTarget]) {
        let sample = &completed[..completed.len().min(self.config.batch.spot_check)];
        if sample.is_empty() {
            return;
        }

        let mut passed = 0;
        for target in sample {
            if self.probe_completion(adapter, &target.url, false).await == Some(true) {
                passed += 1;
            }
        }

        if (passed as f64) < sample.len() as f64 * SPOT_CHECK_PASS_RATE {
            self.console.warning(&format!(
                "Spot check passed only {}/{}; listing completion markers may be unreliable",
                passed,
                sample.len()
            ));
        }
    }

    /// Fetches a detail page with a short-lived fetcher and checks completion.
    ///
    /// With `deep`, the last chapter title is checked when the page text has no marker.
    async fn probe_completion(&self, adapter: &dyn SiteAdapter, url: &str, deep: bool) -> Option<bool> {
        let probe_delay = Duration::from_millis(self.config.batch.probe_delay_ms);
        let fetcher = match HttpFetcher::with_base_delay(&self.config.fetch, probe_delay) {
            Ok(fetcher) => fetcher,
            Err(e) => {
                warn!("Could not build probe fetcher: {}", e);
                return None;
            }
        };

        let body = fetcher
            .fetch_with(url, self.config.pagination.probe_retries, true)
            .await;
        fetcher.close();

        let body = body.ok()?;
        Some(page_is_completed(adapter, &body, url, deep))
    }

    /// Fetches, validates and persists one novel.
    pub async fn scrape_novel(&self, site: &SiteConfig, target: &NovelTarget) -> NovelOutcome {
        if self.cancel.is_cancelled() {
            return NovelOutcome::Interrupted {
                title: target.title.clone(),
                completed: 0,
                total: 0,
            };
        }

        info!("Scraping {} ({})", target.title, target.url);

        let fetcher = match HttpFetcher::new(&self.config.fetch) {
            Ok(fetcher) => fetcher,
            Err(e) => return failed(&target.title, format!("HTTP client: {}", e)),
        };

        let outcome = self.scrape_with(&fetcher, site, target).await;
        fetcher.close();

        match &outcome {
            NovelOutcome::Persisted { metadata, .. } => self.console.success(&format!(
                "Persisted {} ({}/{} chapters valid, {} chars)",
                metadata.title, metadata.chapters, metadata.total_chapters, metadata.total_chars
            )),
            NovelOutcome::Interrupted { title, .. } => {
                self.console.warning(&format!("Interrupted: {}", title))
            }
            NovelOutcome::Rejected {
                title, rejection, ..
            } => {
                let stats = &rejection.stats;
                self.console.error(&format!(
                    "Rejected {}: {} (chapters {}, valid {}, empty {}, chars {}, valid chars {})",
                    title,
                    rejection.reason,
                    stats.total_chapters,
                    stats.valid_chapters,
                    stats.empty_chapters,
                    stats.total_chars,
                    stats.valid_chars
                ));
            }
            NovelOutcome::Failed { title, reason } => {
                self.console.error(&format!("Failed {}: {}", title, reason))
            }
        }

        outcome
    }

    async fn scrape_with(
        &self,
        fetcher: &HttpFetcher,
        site: &SiteConfig,
        target: &NovelTarget,
    ) -> NovelOutcome {
        let adapter = site.adapter();
        let adapter = adapter.as_ref();

        let body = match fetcher.fetch(&target.url).await {
            Ok(body) => body,
            Err(e) => return failed(&target.title, format!("index page: {}", e)),
        };

        let IndexPage {
            mut metadata,
            mut evidence,
            catalog_links,
        } = parse_index(adapter, &body, &target.url);

        if evidence.first_page.is_empty() {
            evidence = self
                .follow_catalog(fetcher, adapter, catalog_links)
                .await
                .unwrap_or(evidence);
        }

        let discoverer = PaginationDiscoverer::new(
            self.config.pagination.clone(),
            self.config.fetch.max_retries,
        );
        let discovery = discoverer.discover(evidence, fetcher, adapter).await;
        debug!("Chapter list assembled: {:?}", discovery.outcome);

        let chapters = discovery.chapters;
        if chapters.is_empty() {
            return failed(&target.title, "no chapters found".to_string());
        }

        if metadata.title.trim().is_empty() {
            metadata.title = target.title.clone();
        }
        let title = metadata.title.clone();

        self.console.info(&format!(
            "{} by {}, {} chapters",
            title,
            metadata.author.as_deref().unwrap_or("?"),
            chapters.len()
        ));

        let novel_dir = self.store.novel_dir(&site.name, &target.category, &title);
        let checkpoint = ProgressCheckpoint::new(&novel_dir, &title);

        let mut records = if self.config.checkpoint.resume {
            checkpoint.resume(&target.url, &chapters)
        } else {
            Vec::new()
        };

        let started = Instant::now();
        let resumed = records.len();
        let end = match self
            .fetch_chapters(fetcher, adapter, &chapters, &mut records, &checkpoint, &target.url, &title)
            .await
        {
            Ok(end) => end,
            Err(e) => return failed(&title, format!("checkpoint: {}", e)),
        };

        if let FetchEnd::Interrupted = end {
            return NovelOutcome::Interrupted {
                title,
                completed: records.len(),
                total: chapters.len(),
            };
        }

        let record = NovelRecord::new(metadata, records);
        self.report_fetch(&record, started.elapsed(), record.chapters.len() - resumed);

        match self.validator.validate_novel(&record) {
            Err(rejection) => {
                if let Err(e) = self.store.remove_novel(&novel_dir) {
                    warn!("Could not remove {}: {}", novel_dir.display(), e);
                }
                NovelOutcome::Rejected {
                    title,
                    rejection,
                    chapter_failures: record.failure_counts(),
                }
            }
            Ok(stats) => {
                let metadata = NovelMetadataRecord::new(
                    &record,
                    &target.url,
                    &site.name,
                    &target.category,
                    stats,
                    Local::now(),
                );

                let file = match self.store.persist(&novel_dir, &record, &metadata) {
                    Ok(file) => file,
                    Err(e) => return failed(&title, e.to_string()),
                };

                if let Err(e) = checkpoint.clear() {
                    warn!("Could not clear checkpoint {}: {}", checkpoint.path().display(), e);
                }

                NovelOutcome::Persisted {
                    record,
                    metadata,
                    file,
                    peak_delay: fetcher.peak_delay(),
                }
            }
        }
    }

    /// Tries catalog links until one yields chapters.
    async fn follow_catalog(
        &self,
        fetcher: &HttpFetcher,
        adapter: &dyn SiteAdapter,
        catalog_links: Vec<String>,
    ) -> Option<PaginationEvidence> {
        for url in catalog_links {
            info!("No chapters on the index page, trying catalog {}", url);
            let Ok(body) = fetcher.fetch(&url).await else {
                continue;
            };

            let evidence = parse_evidence(adapter, &body, &url);
            if !evidence.first_page.is_empty() {
                return Some(evidence);
            }
        }
        None
    }

    /// Fetches chapters after the resumed prefix, checkpointing every interval.
    #[allow(clippy::too_many_arguments)]
    async fn fetch_chapters(
        &self,
        fetcher: &HttpFetcher,
        adapter: &dyn SiteAdapter,
        chapters: &[ChapterRef],
        records: &mut Vec<ChapterRecord>,
        checkpoint: &ProgressCheckpoint,
        novel_url: &str,
        title: &str,
    ) -> Result<FetchEnd, CheckpointError> {
        let total = chapters.len();
        let start = records.len();
        let interval = self.config.checkpoint.interval.max(1);
        let session = Instant::now();

        let save = |records: &[ChapterRecord]| {
            checkpoint.save(&ScrapeProgress::new(novel_url, title, records.to_vec()))
        };

        for chapter in &chapters[start..] {
            let result = tokio::select! {
                _ = self.cancel.cancelled() => None,
                result = fetcher.fetch_with(&chapter.url, self.config.fetch.max_retries, true) => Some(result),
            };

            let Some(result) = result else {
                self.console.finish_progress();
                save(records.as_slice())?;
                info!("Interrupted; {} chapters checkpointed", records.len());
                return Ok(FetchEnd::Interrupted);
            };

            records.push(chapter_record(&self.validator, adapter, chapter, result));

            if records.len() % interval == 0 {
                save(records.as_slice())?;
            }

            let done = records.len();
            let fetched = done - start;
            let eta = (session.elapsed() / fetched as u32).checked_mul((total - done) as u32);
            self.console.chapter_progress(done, total, eta, &chapter.title);
        }

        if start < total {
            self.console.finish_progress();
        }
        Ok(FetchEnd::Complete)
    }

    /// Prints the per-novel fetch report.
    fn report_fetch(&self, record: &NovelRecord, elapsed: Duration, fetched_now: usize) {
        let total = record.chapters.len();
        let minutes = elapsed.as_secs_f64() / 60.0;
        let rate = if minutes > 0.0 {
            fetched_now as f64 / minutes
        } else {
            0.0
        };

        self.console.info(&format!(
            "Fetched {}/{} chapters in {} ({:.1} chapters/min), {} chars",
            self.console.count(record.fetched_count()),
            total,
            format_duration(elapsed),
            rate,
            self.console.count(record.content_chars())
        ));
        self.console.failure_breakdown(&record.failures_by_kind());
    }
}

fn failed(title: &str, reason: String) -> NovelOutcome {
    NovelOutcome::Failed {
        title: title.to_string(),
        reason,
    }
}

/// Turns one fetch result into a chapter record.
///
/// Challenge pages, empty extractions and content failing the thresholds
/// become classified errors; accepted content is cleaned.
pub fn chapter_record(
    validator: &ContentValidator,
    adapter: &dyn SiteAdapter,
    chapter: &ChapterRef,
    result: Result<String, FetchError>,
) -> ChapterRecord {
    let body = match result {
        Ok(body) => body,
        Err(e) => {
            return ChapterRecord::failed(
                chapter,
                ChapterError::PageFetchFailed {
                    detail: e.to_string(),
                },
            );
        }
    };

    let doc = Html::parse_document(&body);
    if validator.is_anti_crawl_page(&doc) {
        return ChapterRecord::failed(chapter, InvalidReason::AntiCrawlPage.into());
    }

    let text = adapter.extract_chapter_content(&doc);
    if text.trim().is_empty() {
        return ChapterRecord::failed(chapter, ChapterError::NoContent);
    }

    match validator.validate_chapter_content(&text) {
        Ok(()) => ChapterRecord::fetched(chapter, validator.clean_content(&text)),
        Err(reason) => ChapterRecord::failed(chapter, reason.into()),
    }
}

fn parse_category(adapter: &dyn SiteAdapter, body: &str, url: &str, category: &str) -> Vec<NovelTarget> {
    let doc = Html::parse_document(body);
    adapter.parse_category_page(&doc, url, category)
}

fn parse_index(adapter: &dyn SiteAdapter, body: &str, url: &str) -> IndexPage {
    let doc = Html::parse_document(body);
    let evidence = PaginationEvidence::from_document(&doc, url, adapter);

    let catalog_links = if evidence.first_page.is_empty() {
        catalog_links(&doc, url)
    } else {
        Vec::new()
    };

    IndexPage {
        metadata: adapter.extract_metadata(&doc),
        evidence,
        catalog_links,
    }
}

fn parse_evidence(adapter: &dyn SiteAdapter, body: &str, url: &str) -> PaginationEvidence {
    let doc = Html::parse_document(body);
    PaginationEvidence::from_document(&doc, url, adapter)
}

/// Links that look like a full chapter catalog, in page order.
fn catalog_links(doc: &Html, page_url: &str) -> Vec<String> {
    let mut links: Vec<String> = Vec::new();
    for link in html::links(doc) {
        let href = link.href.to_lowercase();
        if CATALOG_HINTS.iter().any(|hint| href.contains(hint)) {
            let url = resolve_url(page_url, &link.href);
            if url != page_url && !links.contains(&url) {
                links.push(url);
            }
        }
    }
    links
}

/// Completion check on a detail page: page text first, then the last chapter title.
fn page_is_completed(adapter: &dyn SiteAdapter, body: &str, url: &str, deep: bool) -> bool {
    let doc = Html::parse_document(body);
    if adapter.check_completed(&html::page_text(&doc)) {
        return true;
    }
    if !deep {
        return false;
    }

    adapter
        .extract_chapters(&doc, url)
        .last()
        .is_some_and(|last| adapter.check_completed(&last.title) || is_finale_title(&last.title))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::AdapterKind;

    const PAGE: &str = "https://m.shuhaige.net/350415/";

    fn adapter() -> Box<dyn SiteAdapter> {
        SiteConfig::new("m.shuhaige.net", "https://m.shuhaige.net", AdapterKind::Shuhaige).adapter()
    }

    fn chapter() -> ChapterRef {
        let mut chapter = ChapterRef::new("第1章 开端", "https://m.shuhaige.net/350415/1.html", Some(1));
        chapter.index = 1;
        chapter
    }

    fn prose() -> String {
        "山风吹过竹林，少年提着灯笼走下石阶。".repeat(14)
    }

    #[test]
    fn test_chapter_record_classification() {
        let validator = ContentValidator::default();
        let adapter = adapter();
        let classify = |result| chapter_record(&validator, adapter.as_ref(), &chapter(), result);

        let ok = classify(Ok(format!(r#"<html><body><div id="content">{}</div></body></html>"#, prose())));
        assert_eq!(ok.content(), Some(prose().as_str()));

        let gone = classify(Err(FetchError::NotFound {
            url: chapter().url,
        }));
        assert_eq!(gone.error().unwrap().kind(), crate::record::ErrorKind::PageFetchFailed);

        let challenge = classify(Ok(
            "<html><head><title>安全验证</title></head><body>请稍等</body></html>".to_string(),
        ));
        assert_eq!(
            challenge.error(),
            Some(&ChapterError::InvalidContent {
                reason: InvalidReason::AntiCrawlPage
            })
        );

        let empty = classify(Ok("<html><body></body></html>".to_string()));
        assert_eq!(empty.error(), Some(&ChapterError::NoContent));

        let short = classify(Ok(format!(
            r#"<html><body><div id="content">{}</div></body></html>"#,
            "山风吹过竹林，少年提着灯笼走下石阶。".repeat(7)
        )));
        assert!(matches!(
            short.error(),
            Some(ChapterError::InvalidContent {
                reason: InvalidReason::TooShort { .. }
            })
        ));
    }

    #[test]
    fn test_catalog_links() {
        let doc = Html::parse_document(
            r#"<a href="/350415/catalog/">目录</a><a href="/350415/index.html">全部章节</a>
               <a href="/350415/catalog/">目录</a><a href="/about/">关于</a>"#,
        );
        assert_eq!(
            catalog_links(&doc, PAGE),
            vec![
                "https://m.shuhaige.net/350415/catalog/".to_string(),
                "https://m.shuhaige.net/350415/index.html".to_string(),
            ]
        );
    }

    #[test]
    fn test_page_is_completed() {
        let adapter = adapter();
        let marked = "<html><body><p>状态：已完结</p></body></html>";
        assert!(page_is_completed(adapter.as_ref(), marked, PAGE, false));

        let finale = r#"<html><body><p>分类：连载</p><ul>
            <li><a href="/350415/1.html">第1章 开端</a></li>
            <li><a href="/350415/2.html">第2章 大结局</a></li>
        </ul></body></html>"#;
        assert!(!page_is_completed(adapter.as_ref(), finale, PAGE, false));
        assert!(page_is_completed(adapter.as_ref(), finale, PAGE, true));

        let ongoing = r#"<html><body><ul>
            <li><a href="/350415/1.html">第1章 开端</a></li>
            <li><a href="/350415/2.html">第2章 远行</a></li>
        </ul></body></html>"#;
        assert!(!page_is_completed(adapter.as_ref(), ongoing, PAGE, true));
    }

    #[test]
    fn test_failure_reason() {
        let outcome = NovelOutcome::Interrupted {
            title: "测试".to_string(),
            completed: 3,
            total: 10,
        };
        assert_eq!(
            outcome.failure_reason().as_deref(),
            Some("interrupted after 3/10 chapters")
        );
        assert_eq!(outcome.failure_kind(), Some(FailureKind::Interrupted));

        let failed = failed("测试", "no chapters found".to_string());
        assert_eq!(failed.failure_kind(), Some(FailureKind::Failed));
    }
}
