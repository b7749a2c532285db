use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Mutex, Semaphore};
use tracing::{debug, info, warn};

use firmscout_cache::crawl_key;
use firmscout_core::{
    Cache, CandidateUrl, ErrorEntry, ErrorKind, ExtractError, ExtractRequest, FetchError,
    FetchedPage, PageFetcher, MIN_CONTENT_CHARS,
};
use firmscout_resilience::TokenBucket;

use crate::politeness::HostPoliteness;

/// How long one fetch slot waits for a crawl token.
const TOKEN_WAIT: Duration = Duration::from_secs(10);

/// External robots-policy collaborator. A denial is a warning, not an error.
#[async_trait]
pub trait RobotsPolicy: Send + Sync + 'static {
    async fn allowed(&self, url: &str) -> bool;
}

/// Policy that allows everything; used when robots checking is disabled.
pub struct AllowAll;

#[async_trait]
impl RobotsPolicy for AllowAll {
    async fn allowed(&self, _url: &str) -> bool {
        true
    }
}

#[derive(Debug, Default)]
pub struct CrawlReport {
    pub pages: Vec<FetchedPage>,
    pub attempted: usize,
    pub succeeded: usize,
    pub errors: Vec<ErrorEntry>,
    pub warnings: Vec<String>,
}

impl CrawlReport {
    /// When every attempt failed, a representative error for the retry and
    /// breaker layer: the majority failure kind wins.
    pub fn total_failure(&self) -> Option<ExtractError> {
        if self.attempted == 0 || self.succeeded > 0 || self.errors.is_empty() {
            return None;
        }
        let timeouts = self
            .errors
            .iter()
            .filter(|e| e.kind == ErrorKind::Timeout)
            .count();
        let throttled = self
            .errors
            .iter()
            .filter(|e| e.kind == ErrorKind::RateLimited)
            .count();
        let message = format!("{} of {} fetches failed", self.errors.len(), self.attempted);
        if timeouts * 2 >= self.errors.len() {
            Some(ExtractError::Timeout {
                seconds: 0,
                context: message,
            })
        } else if throttled * 2 >= self.errors.len() {
            Some(ExtractError::RateLimited(message))
        } else {
            Some(ExtractError::Crawl {
                url: self.errors[0].url.clone().unwrap_or_default(),
                message,
            })
        }
    }
}

enum FetchResult {
    Page(Box<FetchedPage>),
    Failed(ErrorEntry),
    Skipped(String),
}

/// Fetches ranked candidates under a concurrency bound, the crawl token
/// bucket, per-host politeness, and status-code host blocking. Every
/// candidate counts as attempted; only pages clearing the content threshold
/// count as succeeded.
#[derive(Clone)]
pub struct CrawlStage {
    fetcher: Arc<dyn PageFetcher>,
    limiter: Arc<TokenBucket>,
    politeness: Arc<HostPoliteness>,
    robots: Option<Arc<dyn RobotsPolicy>>,
    cache: Option<Arc<dyn Cache>>,
    crawl_ttl: Duration,
    default_concurrency: usize,
    gauges: Option<Arc<firmscout_core::ResourceGauges>>,
}

impl CrawlStage {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        fetcher: Arc<dyn PageFetcher>,
        limiter: Arc<TokenBucket>,
        politeness: Arc<HostPoliteness>,
        robots: Option<Arc<dyn RobotsPolicy>>,
        cache: Option<Arc<dyn Cache>>,
        crawl_ttl: Duration,
        default_concurrency: usize,
    ) -> Self {
        Self {
            fetcher,
            limiter,
            politeness,
            robots,
            cache,
            crawl_ttl,
            default_concurrency: default_concurrency.max(1),
            gauges: None,
        }
    }

    /// Attaches the process-wide load gauges so open fetches are visible to
    /// the resource governor.
    pub fn with_gauges(mut self, gauges: Arc<firmscout_core::ResourceGauges>) -> Self {
        self.gauges = Some(gauges);
        self
    }

    async fn cached_page(&self, url: &str) -> Option<FetchedPage> {
        let cache = self.cache.as_ref()?;
        match cache.get(&crawl_key(url)).await {
            Ok(Some(value)) => serde_json::from_value(value).ok(),
            Ok(None) => None,
            Err(e) => {
                debug!(error = %e, url, "crawl cache read failed, treating as miss");
                None
            }
        }
    }

    async fn store_page(&self, page: &FetchedPage) {
        if let Some(cache) = &self.cache {
            if let Ok(value) = serde_json::to_value(page) {
                if let Err(e) = cache.set(&crawl_key(&page.url), value, self.crawl_ttl).await {
                    debug!(error = %e, url = %page.url, "crawl cache write failed");
                }
            }
        }
    }

    async fn fetch_one(&self, candidate: &CandidateUrl, timeout_s: u64) -> FetchResult {
        let url = &candidate.url;

        if let Some(mut page) = self.cached_page(url).await {
            debug!(url, "crawl cache hit");
            page.source_priority = candidate.priority;
            return FetchResult::Page(Box::new(page));
        }

        let host = url::Url::parse(url)
            .ok()
            .and_then(|u| u.host_str().map(str::to_string))
            .unwrap_or_default();
        if host.is_empty() {
            return FetchResult::Failed(ErrorEntry::with_url(
                ErrorKind::Crawl,
                format!("unparseable URL: {url}"),
                url.clone(),
            ));
        }

        if self.politeness.is_blocked(&host) {
            return FetchResult::Failed(ErrorEntry::with_url(
                ErrorKind::Crawl,
                format!("host {host} is temporarily blocked"),
                url.clone(),
            ));
        }

        if let Some(robots) = &self.robots {
            if !robots.allowed(url).await {
                return FetchResult::Skipped(format!("robots policy disallows {url}"));
            }
        }

        if !self.limiter.wait_for(1, TOKEN_WAIT).await {
            return FetchResult::Failed(ErrorEntry::with_url(
                ErrorKind::RateLimited,
                format!("crawl token wait timed out for {url}"),
                url.clone(),
            ));
        }

        self.politeness.wait_turn(&host).await;

        let timeout = Duration::from_secs(timeout_s);
        let _connection = self.gauges.as_ref().map(|g| g.track_connection());
        // Hard deadline regardless of what the fetcher does internally.
        let fetched = match tokio::time::timeout(timeout, self.fetcher.fetch(url, timeout)).await {
            Ok(result) => result,
            Err(_) => Err(FetchError::Timeout(timeout_s)),
        };
        drop(_connection);

        match fetched {
            Ok(outcome) => {
                let content_chars = outcome
                    .cleaned_text
                    .chars()
                    .filter(|c| !c.is_whitespace())
                    .count();
                if content_chars < MIN_CONTENT_CHARS {
                    return FetchResult::Failed(
                        ExtractError::InsufficientContent {
                            url: url.clone(),
                            chars: content_chars,
                        }
                        .entry(),
                    );
                }
                let page = FetchedPage {
                    url: url.clone(),
                    title: outcome.title,
                    word_count: outcome.cleaned_text.split_whitespace().count(),
                    cleaned_text: outcome.cleaned_text,
                    markdown: outcome.markdown,
                    fetched_at: chrono::Utc::now(),
                    elapsed_ms: outcome.elapsed_ms,
                    source_priority: candidate.priority,
                };
                self.store_page(&page).await;
                FetchResult::Page(Box::new(page))
            }
            Err(FetchError::Timeout(seconds)) => FetchResult::Failed(ErrorEntry::with_url(
                ErrorKind::Timeout,
                format!("fetch timed out after {seconds}s"),
                url.clone(),
            )),
            Err(error) => {
                if let Some(status) = error.status() {
                    self.politeness.note_status(&host, status);
                }
                FetchResult::Failed(ErrorEntry::with_url(
                    ErrorKind::Crawl,
                    error.to_string(),
                    url.clone(),
                ))
            }
        }
    }

    pub async fn crawl(
        &self,
        candidates: &[CandidateUrl],
        request: &ExtractRequest,
        concurrency_override: Option<usize>,
    ) -> CrawlReport {
        if candidates.is_empty() {
            return CrawlReport::default();
        }

        let concurrency = concurrency_override
            .unwrap_or(self.default_concurrency)
            .max(1);
        let semaphore = Arc::new(Semaphore::new(concurrency));
        let report = Arc::new(Mutex::new(CrawlReport::default()));

        let mut handles = Vec::with_capacity(candidates.len());
        for candidate in candidates.iter().cloned() {
            let semaphore = Arc::clone(&semaphore);
            let report = Arc::clone(&report);
            let timeout_s = request.timeout_s;
            let stage = self.clone();
            handles.push(tokio::spawn(async move {
                // Acquire only fails after runtime shutdown.
                let Ok(_permit) = semaphore.acquire().await else {
                    return;
                };
                let result = stage.fetch_one(&candidate, timeout_s).await;
                let mut report = report.lock().await;
                report.attempted += 1;
                match result {
                    FetchResult::Page(page) => {
                        report.succeeded += 1;
                        report.pages.push(*page);
                    }
                    FetchResult::Failed(entry) => report.errors.push(entry),
                    FetchResult::Skipped(warning) => report.warnings.push(warning),
                }
            }));
        }
        for handle in handles {
            if let Err(e) = handle.await {
                warn!(error = %e, "crawl task failed to join");
            }
        }

        let mut report = match Arc::try_unwrap(report) {
            Ok(mutex) => mutex.into_inner(),
            Err(shared) => {
                // All tasks joined, so this clone is of a settled report.
                let guard = shared.lock().await;
                CrawlReport {
                    pages: guard.pages.clone(),
                    attempted: guard.attempted,
                    succeeded: guard.succeeded,
                    errors: guard.errors.clone(),
                    warnings: guard.warnings.clone(),
                }
            }
        };
        report.pages.sort_by(|a, b| {
            b.source_priority
                .partial_cmp(&a.source_priority)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        info!(
            attempted = report.attempted,
            succeeded = report.succeeded,
            errors = report.errors.len(),
            "crawl stage complete"
        );
        report
    }

    pub fn blocked_hosts(&self) -> usize {
        self.politeness.blocked_count()
    }
}
