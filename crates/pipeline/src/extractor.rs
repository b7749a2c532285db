use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

use firmscout_cache::company_key;
use firmscout_core::{
    ids, Cache, CompanyParser, CompanyRecord, ErrorEntry, ErrorKind, ExtractError, ExtractRequest,
    ExtractResponse, Extractor, ExtractionMetadata, PageFetcher, SearchProvider,
};
use firmscout_core::config::AppConfig;
use firmscout_crawl::{CrawlStage, HostPoliteness, RobotsPolicy};
use firmscout_discovery::DiscoveryStage;
use firmscout_resilience::{
    attempt_recovery, run_resilient, BreakerRegistry, FailureClass, RateLimiters, RetryPolicy,
};

use crate::aggregate::{aggregate, SourcePartial, MIN_PARSE_CONFIDENCE};

/// What one pass over stages F, G, H produced.
#[derive(Default)]
struct RunOutcome {
    record: Option<CompanyRecord>,
    pages_attempted: usize,
    pages_crawled: usize,
    sources_found: Vec<String>,
    queries_used: Vec<String>,
    errors: Vec<ErrorEntry>,
    warnings: Vec<String>,
}

/// The single-request pipeline: validate, consult the cache, then run
/// discovery, crawl, and aggregation under the resilience substrate, with an
/// optional recovery re-run when everything fails in a classifiable way.
pub struct CompanyExtractor {
    parser: Arc<dyn CompanyParser>,
    cache: Option<Arc<dyn Cache>>,
    breakers: Arc<BreakerRegistry>,
    retry: RetryPolicy,
    discovery: DiscoveryStage,
    crawl: CrawlStage,
    company_ttl: Duration,
    recovery_attempts: u32,
    crawl_concurrency: usize,
}

impl CompanyExtractor {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: &AppConfig,
        search: Arc<dyn SearchProvider>,
        fetcher: Arc<dyn PageFetcher>,
        parser: Arc<dyn CompanyParser>,
        cache: Option<Arc<dyn Cache>>,
        robots: Option<Arc<dyn RobotsPolicy>>,
        limiters: &RateLimiters,
        breakers: Arc<BreakerRegistry>,
        gauges: Option<Arc<firmscout_core::ResourceGauges>>,
    ) -> Self {
        let cache = if config.cache.enable { cache } else { None };
        let discovery = DiscoveryStage::new(
            search,
            Arc::clone(&limiters.search),
            cache.clone(),
            Duration::from_secs(config.cache.ttl_serp_s),
        );
        let politeness = Arc::new(HostPoliteness::new(
            Duration::from_secs(config.crawler.min_host_delay_s),
            Duration::from_secs(config.crawler.throttle_block_s),
            Duration::from_secs(config.crawler.auth_block_s),
        ));
        let mut crawl = CrawlStage::new(
            fetcher,
            Arc::clone(&limiters.crawl),
            politeness,
            robots,
            cache.clone(),
            Duration::from_secs(config.cache.ttl_crawl_s),
            config.crawler.max_concurrent_fetches,
        );
        if let Some(gauges) = gauges {
            crawl = crawl.with_gauges(gauges);
        }
        Self {
            parser,
            cache,
            breakers,
            retry: RetryPolicy::from_config(&config.retry),
            discovery,
            crawl,
            company_ttl: Duration::from_secs(config.cache.ttl_company_s),
            recovery_attempts: config.runtime.recovery_attempts,
            crawl_concurrency: config.crawler.max_concurrent_fetches,
        }
    }

    async fn cached_record(&self, request: &ExtractRequest) -> Option<CompanyRecord> {
        let cache = self.cache.as_ref()?;
        let key = company_key(
            &request.company_name,
            request.domain.as_deref(),
            request.mode,
        );
        match cache.get(&key).await {
            Ok(Some(value)) => serde_json::from_value(value).ok(),
            Ok(None) => None,
            Err(e) => {
                warn!(error = %e, "company cache read failed, treating as miss");
                None
            }
        }
    }

    async fn store_record(&self, request: &ExtractRequest, record: &CompanyRecord) -> Option<String> {
        let cache = self.cache.as_ref()?;
        let key = company_key(
            &request.company_name,
            request.domain.as_deref(),
            request.mode,
        );
        match serde_json::to_value(record) {
            Ok(value) => {
                if let Err(e) = cache.set(&key, value, self.company_ttl).await {
                    warn!(error = %e, "company cache write failed");
                    return Some(format!("Failed to cache result: {e}"));
                }
                None
            }
            Err(e) => {
                error!(error = %e, "company record failed to serialize");
                Some(format!("Failed to cache result: {e}"))
            }
        }
    }

    async fn run_stages(
        &self,
        request: &ExtractRequest,
        crawl_concurrency: Option<usize>,
        retry: &RetryPolicy,
    ) -> RunOutcome {
        let mut out = RunOutcome::default();

        // Stage F: discovery, retried behind the search breaker.
        let discovered = run_resilient(retry, &self.breakers.search, || {
            self.discovery.discover(request)
        })
        .await;
        let candidates = match discovered {
            Ok(outcome) => {
                out.queries_used = outcome.queries_used;
                out.errors.extend(outcome.errors);
                outcome.candidates
            }
            Err(e) => {
                warn!(error = %e, "discovery failed, continuing without candidates");
                out.errors.push(e.entry());
                Vec::new()
            }
        };
        if candidates.is_empty() {
            out.warnings
                .push("No relevant URLs found through search".to_string());
            return out;
        }

        // Stage G: crawl, retried behind the crawl breaker. The last report
        // is kept so counters and per-URL errors survive a total failure.
        let last_report = Mutex::new(None);
        let crawled = run_resilient(retry, &self.breakers.crawl, || async {
            let report = self
                .crawl
                .crawl(&candidates, request, crawl_concurrency)
                .await;
            match report.total_failure() {
                Some(representative) => {
                    *last_report.lock().await = Some(report);
                    Err(representative)
                }
                None => Ok(report),
            }
        })
        .await;
        let report = match crawled {
            Ok(report) => report,
            Err(e) => {
                warn!(error = %e, "crawl failed for every candidate");
                out.errors.push(e.entry());
                last_report.lock().await.take().unwrap_or_default()
            }
        };
        out.pages_attempted = report.attempted;
        out.pages_crawled = report.succeeded;
        out.errors.extend(report.errors);
        out.warnings.extend(report.warnings);
        if report.pages.is_empty() {
            out.warnings
                .push("No web content successfully crawled".to_string());
            return out;
        }

        // Stage H: parse each page, keep confident partials, merge.
        let mut partials = Vec::new();
        for page in &report.pages {
            match self
                .parser
                .parse(&page.cleaned_text, &page.url, &request.company_name)
            {
                Some(parsed) => partials.push(SourcePartial {
                    url: page.url.clone(),
                    record: parsed.record,
                    confidence: parsed.confidence,
                }),
                None => out.errors.push(ErrorEntry::with_url(
                    ErrorKind::Parse,
                    "no company facts extracted",
                    page.url.clone(),
                )),
            }
        }
        out.sources_found = partials
            .iter()
            .filter(|p| p.confidence > MIN_PARSE_CONFIDENCE)
            .map(|p| p.url.clone())
            .collect();
        out.record = aggregate(partials);
        out
    }

    /// Picks the recovery class for a failed run from the shape of its
    /// captured errors: a majority of timeouts (or throttles, or thin pages)
    /// names the culprit, otherwise the company simply was not found.
    fn failure_class(errors: &[ErrorEntry]) -> FailureClass {
        let total = errors.len();
        if total == 0 {
            return FailureClass::NotFound;
        }
        let count = |kind: ErrorKind| errors.iter().filter(|e| e.kind == kind).count();
        if count(ErrorKind::Timeout) * 2 >= total {
            FailureClass::Timeout
        } else if count(ErrorKind::RateLimited) * 2 >= total {
            FailureClass::RateLimit
        } else if count(ErrorKind::InsufficientContent) * 2 >= total {
            FailureClass::DataQuality
        } else {
            FailureClass::NotFound
        }
    }

    fn cached_response(
        &self,
        request: &ExtractRequest,
        request_id: String,
        record: CompanyRecord,
        started: Instant,
    ) -> ExtractResponse {
        ExtractResponse {
            request_id,
            company_name: request.company_name.clone(),
            success: true,
            record: Some(record),
            metadata: ExtractionMetadata {
                pages_attempted: 0,
                pages_crawled: 0,
                sources_found: vec!["cache".to_string()],
                queries_used: Vec::new(),
                mode_used: request.mode,
                extraction_time: 0.0,
            },
            errors: Vec::new(),
            warnings: vec!["Result served from cache".to_string()],
            processing_time: started.elapsed().as_secs_f64(),
        }
    }
}

#[async_trait]
impl Extractor for CompanyExtractor {
    async fn extract(&self, request: ExtractRequest) -> ExtractResponse {
        let started = Instant::now();
        let request_id = ids::request_id();
        let company_name = request.company_name.clone();
        info!(
            request_id = %request_id,
            company = %company_name,
            mode = request.mode.as_str(),
            "extraction started"
        );

        if let Err(e) = request.validate() {
            return ExtractResponse {
                request_id,
                company_name,
                success: false,
                record: None,
                metadata: ExtractionMetadata::empty(request.mode),
                errors: vec![e.entry()],
                warnings: Vec::new(),
                processing_time: started.elapsed().as_secs_f64(),
            };
        }

        if let Some(record) = self.cached_record(&request).await {
            info!(request_id = %request_id, company = %company_name, "served from cache");
            return self.cached_response(&request, request_id, record, started);
        }

        let mut current = request.clone();
        let mut retry = self.retry.clone();
        let mut crawl_concurrency: Option<usize> = None;
        let mut recovery_left = self.recovery_attempts;
        let mut errors: Vec<ErrorEntry> = Vec::new();
        let mut warnings: Vec<String> = Vec::new();
        let mut metadata = ExtractionMetadata::empty(request.mode);

        loop {
            let run = self.run_stages(&current, crawl_concurrency, &retry).await;
            metadata.pages_attempted += run.pages_attempted;
            metadata.pages_crawled += run.pages_crawled;
            metadata.queries_used.extend(run.queries_used);
            metadata.sources_found.extend(run.sources_found);
            metadata.mode_used = current.mode;
            let run_errors = run.errors.clone();
            errors.extend(run.errors);
            warnings.extend(run.warnings);

            if let Some(record) = run.record {
                if let Some(cache_warning) = self.store_record(&current, &record).await {
                    warnings.push(cache_warning);
                }
                let processing_time = started.elapsed().as_secs_f64();
                metadata.extraction_time = processing_time;
                info!(
                    request_id = %request_id,
                    company = %company_name,
                    confidence = record.scores.confidence,
                    pages = metadata.pages_crawled,
                    elapsed_s = processing_time,
                    "extraction succeeded"
                );
                return ExtractResponse {
                    request_id,
                    company_name,
                    success: true,
                    record: Some(record),
                    metadata,
                    errors,
                    warnings,
                    processing_time,
                };
            }

            let class = Self::failure_class(&run_errors);
            if recovery_left > 0 {
                if let Some(plan) = attempt_recovery(
                    class,
                    &current,
                    crawl_concurrency.unwrap_or(self.crawl_concurrency),
                ) {
                    recovery_left -= 1;
                    warn!(
                        request_id = %request_id,
                        company = %company_name,
                        ?class,
                        note = %plan.note,
                        "recovery pass"
                    );
                    warnings.push(format!("Recovery applied: {}", plan.note));
                    crawl_concurrency = plan.crawl_concurrency.or(crawl_concurrency);
                    retry = retry.with_base_factor(plan.retry_base_factor);
                    if plan.request.validate().is_ok() {
                        current = plan.request;
                        continue;
                    }
                }
            }

            let not_found = ExtractError::CompanyNotFound {
                company: company_name.clone(),
                pages_attempted: metadata.pages_attempted,
                queries_used: metadata.queries_used.len(),
            };
            errors.push(not_found.entry());
            let processing_time = started.elapsed().as_secs_f64();
            metadata.extraction_time = processing_time;
            warn!(
                request_id = %request_id,
                company = %company_name,
                pages_attempted = metadata.pages_attempted,
                "extraction failed: no company information found"
            );
            return ExtractResponse {
                request_id,
                company_name,
                success: false,
                record: None,
                metadata,
                errors,
                warnings,
                processing_time,
            };
        }
    }
}
