// ABOUTME: Scraper: the crawl orchestrator driving list-page fetches, card extraction and detail enrichment.
// ABOUTME: Transient failures only shrink the result; configuration errors and cancellation are returned to the caller.

//! Crawl orchestration.
//!
//! A crawl walks `Idle → FetchingList → ExtractingCards → EnrichingDetails`
//! once per page and ends in `Done`, or in `Failed` when the request itself is
//! unusable. A page that cannot be fetched is skipped; a detail page that
//! cannot be fetched leaves its record as extracted from the list page.
//! Every request after the first waits out the politeness delay.

use std::collections::HashSet;
use std::fmt;

use futures::stream::{self, StreamExt};
use scraper::Html;
use serde::Serialize;
use url::Url;

use crate::cancel::CancelHandle;
use crate::cards::locate_cards;
use crate::config::{PortalConfig, PortalsConfig};
use crate::error::ScrapeError;
use crate::extract::{document_base, extract_card, extract_detail};
use crate::fetcher::Fetcher;
use crate::model::{ExtractionContext, JobFields, JobRecord};
use crate::options::{Options, RenderMode, ScraperBuilder};
use crate::pacing::Pacer;
use crate::resource::{validate_url, RawDocument};
use crate::strategy::{load_builtin_registry, Portal, ResolvedStrategy, StrategyRegistry};

/// Orchestrator states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CrawlState {
    Idle,
    FetchingList,
    ExtractingCards,
    EnrichingDetails,
    Done,
    Failed,
}

impl fmt::Display for CrawlState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CrawlState::Idle => "idle",
            CrawlState::FetchingList => "fetching_list",
            CrawlState::ExtractingCards => "extracting_cards",
            CrawlState::EnrichingDetails => "enriching_details",
            CrawlState::Done => "done",
            CrawlState::Failed => "failed",
        };
        write!(f, "{}", s)
    }
}

/// What to crawl.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrawlRequest {
    pub url: String,
    /// Portal id; detected from the URL host when absent.
    pub portal: Option<String>,
    pub pages: u32,
    /// Overrides the configured render mode.
    pub render: Option<RenderMode>,
    /// Overrides `Options::enrich_details`.
    pub enrich: Option<bool>,
}

impl CrawlRequest {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            portal: None,
            pages: 1,
            render: None,
            enrich: None,
        }
    }

    pub fn portal(mut self, portal_id: impl Into<String>) -> Self {
        self.portal = Some(portal_id.into());
        self
    }

    pub fn pages(mut self, pages: u32) -> Self {
        self.pages = pages;
        self
    }

    pub fn render(mut self, render: RenderMode) -> Self {
        self.render = Some(render);
        self
    }

    pub fn enrich(mut self, enrich: bool) -> Self {
        self.enrich = Some(enrich);
        self
    }
}

/// Result of a crawl plus counters for observability.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CrawlReport {
    pub portal: String,
    pub records: Vec<JobRecord>,
    pub pages_attempted: u32,
    pub pages_skipped: u32,
    pub details_enriched: u32,
    pub details_failed: u32,
    pub state: CrawlState,
}

enum DetailOutcome {
    Enriched,
    Failed,
    NoUrl,
}

/// Prepends `https://` to URLs that carry no scheme.
pub fn with_default_scheme(url: &str) -> String {
    let url = url.trim();
    if url.is_empty() || url.contains("://") {
        url.to_string()
    } else {
        format!("https://{}", url)
    }
}

/// URL of result page `page` (1-based).
///
/// An existing `page`/`p` query parameter is advanced by `page - 1`;
/// otherwise a `start` offset of `(page - 1) * page_size` is set. Page 1 is
/// the URL unchanged.
pub fn page_url(base: &Url, page: u32, page_size: u32) -> Url {
    if page <= 1 {
        return base.clone();
    }
    let step = page - 1;
    let mut pairs: Vec<(String, String)> = base.query_pairs().into_owned().collect();

    if let Some(pair) = pairs.iter_mut().find(|(k, _)| k == "page" || k == "p") {
        let current: u32 = pair.1.parse().unwrap_or(1);
        pair.1 = (current + step).to_string();
    } else if let Some(pair) = pairs.iter_mut().find(|(k, _)| k == "start") {
        let current: u32 = pair.1.parse().unwrap_or(0);
        pair.1 = (current + step * page_size).to_string();
    } else {
        pairs.push(("start".to_string(), (step * page_size).to_string()));
    }

    let mut url = base.clone();
    url.query_pairs_mut().clear().extend_pairs(pairs.iter());
    url
}

fn transition(state: &mut CrawlState, next: CrawlState, url: &str) {
    tracing::debug!(from = %state, to = %next, url, "crawl state");
    *state = next;
}

/// Waits out the politeness delay unless the crawl is cancelled first.
async fn pace(
    pacer: &Pacer,
    cancel: &CancelHandle,
    url: &str,
    op: &str,
) -> Result<(), ScrapeError> {
    tokio::select! {
        _ = pacer.pause() => {}
        _ = cancel.cancelled() => {}
    }
    if cancel.is_cancelled() {
        tracing::info!(url, op, "crawl cancelled before request");
        return Err(ScrapeError::cancelled(url, op));
    }
    Ok(())
}

fn validate_target(url: &str) -> Result<Url, ScrapeError> {
    validate_url(&with_default_scheme(url), "crawl")
}

/// Parses a results page and extracts one field set per located card.
fn extract_list_page(
    html: &str,
    page_url: &Url,
    portal: &Portal,
    strategy: &ResolvedStrategy,
    user_agent: &str,
) -> Vec<JobFields> {
    let doc = Html::parse_document(html);
    let ctx = ExtractionContext::new(page_url.clone(), portal.clone(), user_agent)
        .with_base(document_base(&doc, page_url));
    locate_cards(&doc, strategy)
        .into_iter()
        .map(|card| extract_card(card.element, &ctx, strategy))
        .collect()
}

fn extract_detail_page(
    raw: &RawDocument,
    portal: &Portal,
    strategy: &ResolvedStrategy,
) -> Result<JobFields, ScrapeError> {
    let page_url = Url::parse(&raw.final_url)
        .or_else(|_| Url::parse(&raw.url))
        .map_err(|e| {
            ScrapeError::parse(&raw.url, "extract detail", Some(anyhow::Error::new(e)))
        })?;
    let doc = Html::parse_document(&raw.html);
    let ctx = ExtractionContext::new(page_url.clone(), portal.clone(), raw.user_agent.as_str())
        .with_base(document_base(&doc, &page_url));
    Ok(extract_detail(&doc, &ctx, strategy))
}

/// Keeps the field sets that satisfy the record invariant.
fn into_records(all: Vec<JobFields>, page_url: &str) -> Vec<JobRecord> {
    all.into_iter()
        .filter_map(|fields| match JobRecord::new(fields) {
            Ok(record) => Some(record),
            Err(reason) => {
                tracing::debug!(url = page_url, %reason, "dropping incomplete card");
                None
            }
        })
        .collect()
}

/// The job-listing scraper.
#[derive(Debug, Clone)]
pub struct Scraper {
    opts: Options,
    fetcher: Fetcher,
    registry: StrategyRegistry,
    portals: PortalsConfig,
}

impl Scraper {
    pub fn new(opts: Options) -> Self {
        let registry = opts.registry.clone().unwrap_or_else(load_builtin_registry);
        registry.precompile();
        let portals = opts.portals.clone().unwrap_or_default();
        let fetcher = Fetcher::new(&opts);
        Self {
            opts,
            fetcher,
            registry,
            portals,
        }
    }

    pub fn builder() -> ScraperBuilder {
        ScraperBuilder::new()
    }

    pub fn options(&self) -> &Options {
        &self.opts
    }

    pub fn portals(&self) -> &PortalsConfig {
        &self.portals
    }

    pub fn registry(&self) -> &StrategyRegistry {
        &self.registry
    }

    /// Scrapes one results page with the strategy for `portal_id`.
    /// Unknown ids use the generic strategy.
    pub async fn scrape(&self, portal_id: &str, url: &str) -> Result<Vec<JobRecord>, ScrapeError> {
        let report = self.crawl(CrawlRequest::new(url).portal(portal_id)).await?;
        Ok(report.records)
    }

    /// Scrapes `page_count` consecutive result pages; the portal is detected
    /// from the URL host. Records repeated across pages are kept once.
    pub async fn scrape_multiple_pages(
        &self,
        base_url: &str,
        page_count: u32,
    ) -> Result<Vec<JobRecord>, ScrapeError> {
        let report = self
            .crawl(CrawlRequest::new(base_url).pages(page_count))
            .await?;
        Ok(report.records)
    }

    /// Extracts records from already-fetched HTML. Nothing is fetched, so no
    /// detail enrichment happens.
    pub fn scrape_html(
        &self,
        portal_id: &str,
        html: &str,
        url: &str,
    ) -> Result<Vec<JobRecord>, ScrapeError> {
        let page_url = validate_target(url)?;
        let portal = Portal::from_id(portal_id);
        let strategy = self.registry.resolve(&portal);
        let fields = extract_list_page(html, &page_url, &portal, &strategy, "");
        Ok(into_records(fields, page_url.as_str()))
    }

    pub async fn crawl(&self, request: CrawlRequest) -> Result<CrawlReport, ScrapeError> {
        self.crawl_with_cancel(request, &CancelHandle::new()).await
    }

    /// Runs a crawl that can be interrupted through `cancel` at page and
    /// detail boundaries.
    pub async fn crawl_with_cancel(
        &self,
        request: CrawlRequest,
        cancel: &CancelHandle,
    ) -> Result<CrawlReport, ScrapeError> {
        let mut state = CrawlState::Idle;

        let base = match validate_target(&request.url) {
            Ok(url) => url,
            Err(e) => {
                transition(&mut state, CrawlState::Failed, &request.url);
                tracing::error!(url = %request.url, error = %e, "crawl rejected");
                return Err(e);
            }
        };
        if request.pages < 1 {
            transition(&mut state, CrawlState::Failed, base.as_str());
            return Err(ScrapeError::configuration(
                base.as_str(),
                "crawl",
                Some(anyhow::anyhow!("page count must be at least 1")),
            ));
        }

        let portal = match &request.portal {
            Some(id) => Portal::from_id(id),
            None => self.portals.detect(&base),
        };
        let strategy = self.registry.resolve(&portal);
        let mode = request
            .render
            .unwrap_or_else(|| self.render_mode_for(&portal));
        let enrich = request.enrich.unwrap_or(self.opts.enrich_details);
        let pacer = Pacer::new(self.opts.politeness, self.opts.sleeper.clone());

        tracing::info!(
            url = %base,
            portal = %portal,
            pages = request.pages,
            mode = %mode,
            enrich,
            "crawl started"
        );

        let mut report = CrawlReport {
            portal: portal.id().to_string(),
            records: Vec::new(),
            pages_attempted: 0,
            pages_skipped: 0,
            details_enriched: 0,
            details_failed: 0,
            state,
        };
        let mut seen: HashSet<String> = HashSet::new();

        for page in 1..=request.pages {
            if cancel.is_cancelled() {
                return Err(ScrapeError::cancelled(base.as_str(), "crawl"));
            }
            let target = page_url(&base, page, self.opts.page_size);
            transition(&mut state, CrawlState::FetchingList, target.as_str());
            report.pages_attempted += 1;

            pace(&pacer, cancel, target.as_str(), "crawl").await?;
            let raw = match self.fetcher.fetch(target.as_str(), mode, cancel).await {
                Ok(raw) => raw,
                Err(e) if e.is_cancelled() => return Err(e),
                Err(e) => {
                    tracing::warn!(page, url = %target, error = %e, "skipping page");
                    report.pages_skipped += 1;
                    continue;
                }
            };

            transition(&mut state, CrawlState::ExtractingCards, target.as_str());
            let page_base = Url::parse(&raw.final_url).unwrap_or_else(|_| target.clone());
            let fields =
                extract_list_page(&raw.html, &page_base, &portal, &strategy, &raw.user_agent);
            let card_count = fields.len();
            let mut page_records = Vec::new();
            for record in into_records(fields, target.as_str()) {
                if seen.insert(record.signature()) {
                    page_records.push(record);
                } else {
                    tracing::debug!(
                        title = record.title(),
                        "dropping record repeated across pages"
                    );
                }
            }
            tracing::info!(
                page,
                url = %target,
                cards = card_count,
                records = page_records.len(),
                "page extracted"
            );

            if enrich && !page_records.is_empty() {
                transition(&mut state, CrawlState::EnrichingDetails, target.as_str());
                let concurrency = self.opts.detail_concurrency.max(1);
                let outcomes: Vec<Result<(JobRecord, DetailOutcome), ScrapeError>> =
                    stream::iter(page_records)
                        .map(|record| {
                            self.enrich_record(record, &portal, &strategy, mode, &pacer, cancel)
                        })
                        .buffered(concurrency)
                        .collect()
                        .await;
                for outcome in outcomes {
                    let (record, detail) = outcome?;
                    match detail {
                        DetailOutcome::Enriched => report.details_enriched += 1,
                        DetailOutcome::Failed => report.details_failed += 1,
                        DetailOutcome::NoUrl => {}
                    }
                    report.records.push(record);
                }
            } else {
                report.records.extend(page_records);
            }
        }

        transition(&mut state, CrawlState::Done, base.as_str());
        report.state = state;
        tracing::info!(
            url = %base,
            records = report.records.len(),
            pages_skipped = report.pages_skipped,
            details_failed = report.details_failed,
            "crawl finished"
        );
        Ok(report)
    }

    /// A portal configured as dynamic is always rendered; otherwise the
    /// scraper-wide mode applies.
    fn render_mode_for(&self, portal: &Portal) -> RenderMode {
        match self.portals.get(portal).map(PortalConfig::render_mode) {
            Some(RenderMode::Dynamic) => RenderMode::Dynamic,
            _ => self.opts.render,
        }
    }

    async fn enrich_record(
        &self,
        record: JobRecord,
        portal: &Portal,
        strategy: &ResolvedStrategy,
        mode: RenderMode,
        pacer: &Pacer,
        cancel: &CancelHandle,
    ) -> Result<(JobRecord, DetailOutcome), ScrapeError> {
        if record.url().is_empty() {
            return Ok((record, DetailOutcome::NoUrl));
        }
        if cancel.is_cancelled() {
            return Err(ScrapeError::cancelled(record.url(), "enrich"));
        }

        pace(pacer, cancel, record.url(), "enrich").await?;
        let raw = match self.fetcher.fetch(record.url(), mode, cancel).await {
            Ok(raw) => raw,
            Err(e) if e.is_cancelled() => return Err(e),
            Err(e) => {
                tracing::warn!(url = record.url(), error = %e, "detail fetch failed; keeping list-page record");
                return Ok((record, DetailOutcome::Failed));
            }
        };

        match extract_detail_page(&raw, portal, strategy) {
            Ok(detail) => Ok((record.enrich(&detail), DetailOutcome::Enriched)),
            Err(e) => {
                tracing::warn!(url = record.url(), error = %e, "detail extraction failed");
                Ok((record, DetailOutcome::Failed))
            }
        }
    }
}
