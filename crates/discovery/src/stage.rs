use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use firmscout_cache::serp_key;
use firmscout_core::{
    Cache, CandidateUrl, ErrorEntry, ExtractError, ExtractRequest, SearchProvider,
    SearchProviderError, SearchResults,
};
use firmscout_resilience::TokenBucket;

use crate::queries::{generate_queries, MAX_QUERIES};
use crate::scoring::{score_url, CandidateSet};

/// Top organic results considered per query.
const RESULTS_PER_QUERY: usize = 5;
/// Pause between consecutive provider calls.
const QUERY_PACING: Duration = Duration::from_millis(500);
/// How long a query waits for a search token before counting as rate limited.
const TOKEN_WAIT: Duration = Duration::from_secs(5);

pub struct DiscoveryOutcome {
    pub candidates: Vec<CandidateUrl>,
    pub queries_used: Vec<String>,
    pub errors: Vec<ErrorEntry>,
}

/// Turns a request into a ranked candidate list via the search provider.
/// Per-query failures are captured; the stage as a whole fails only when no
/// query produced anything and at least one failed, which is what the
/// pipeline's retry/breaker wrapper keys on.
pub struct DiscoveryStage {
    provider: Arc<dyn SearchProvider>,
    limiter: Arc<TokenBucket>,
    cache: Option<Arc<dyn Cache>>,
    serp_ttl: Duration,
}

impl DiscoveryStage {
    pub fn new(
        provider: Arc<dyn SearchProvider>,
        limiter: Arc<TokenBucket>,
        cache: Option<Arc<dyn Cache>>,
        serp_ttl: Duration,
    ) -> Self {
        Self {
            provider,
            limiter,
            cache,
            serp_ttl,
        }
    }

    async fn cached_results(&self, key: &str) -> Option<SearchResults> {
        let cache = self.cache.as_ref()?;
        match cache.get(key).await {
            Ok(Some(value)) => serde_json::from_value(value).ok(),
            Ok(None) => None,
            Err(e) => {
                debug!(error = %e, "serp cache read failed, treating as miss");
                None
            }
        }
    }

    async fn store_results(&self, key: &str, results: &SearchResults) {
        if let Some(cache) = &self.cache {
            if let Ok(value) = serde_json::to_value(results) {
                if let Err(e) = cache.set(key, value, self.serp_ttl).await {
                    debug!(error = %e, "serp cache write failed");
                }
            }
        }
    }

    pub async fn discover(&self, request: &ExtractRequest) -> Result<DiscoveryOutcome, ExtractError> {
        let queries = generate_queries(request);
        let mut set = CandidateSet::new();
        let mut queries_used = Vec::new();
        let mut errors: Vec<ErrorEntry> = Vec::new();
        let mut provider_failures = 0usize;

        for (i, query) in queries.iter().take(MAX_QUERIES).enumerate() {
            if i > 0 {
                tokio::time::sleep(QUERY_PACING).await;
            }
            queries_used.push(query.clone());

            let key = serp_key(query, &request.country, &request.language, 1);
            let results = if let Some(cached) = self.cached_results(&key).await {
                debug!(query = %query, "serp cache hit");
                cached
            } else {
                if !self.limiter.wait_for(1, TOKEN_WAIT).await {
                    provider_failures += 1;
                    errors.push(
                        ExtractError::RateLimited(format!("search token wait for '{query}'"))
                            .entry(),
                    );
                    continue;
                }
                match self
                    .provider
                    .search(query, &request.country, &request.language, 1)
                    .await
                {
                    Ok(results) => {
                        self.store_results(&key, &results).await;
                        results
                    }
                    Err(e) => {
                        warn!(query = %query, error = %e, "search query failed");
                        provider_failures += 1;
                        errors.push(search_error(query, e).entry());
                        continue;
                    }
                }
            };

            for result in results.organic.iter().take(RESULTS_PER_QUERY) {
                let priority = score_url(&result.url, &result.title, &result.description, request);
                set.insert(CandidateUrl {
                    url: result.url.clone(),
                    title: result.title.clone(),
                    snippet: result.description.clone(),
                    priority,
                });
            }
        }

        if set.is_empty() && provider_failures > 0 {
            // Nothing usable and the provider itself misbehaved: surface one
            // representative failure so retry and the breaker can react.
            let message = errors
                .last()
                .map(|e| e.message.clone())
                .unwrap_or_else(|| "all queries failed".to_string());
            return Err(ExtractError::Search {
                query: queries_used.last().cloned().unwrap_or_default(),
                message,
            });
        }

        let candidates = set.into_ranked(request.max_pages);
        info!(
            company = %request.company_name,
            queries = queries_used.len(),
            candidates = candidates.len(),
            "discovery complete"
        );
        Ok(DiscoveryOutcome {
            candidates,
            queries_used,
            errors,
        })
    }
}

fn search_error(query: &str, error: SearchProviderError) -> ExtractError {
    match error {
        SearchProviderError::RateLimited(m) => ExtractError::RateLimited(m),
        SearchProviderError::Timeout(s) => ExtractError::Timeout {
            seconds: s,
            context: format!("search '{query}'"),
        },
        other => ExtractError::Search {
            query: query.to_string(),
            message: other.to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use firmscout_core::OrganicResult;
    use std::sync::Mutex;

    struct ScriptedProvider {
        responses: Mutex<Vec<Result<SearchResults, SearchProviderError>>>,
        calls: Mutex<Vec<String>>,
    }

    impl ScriptedProvider {
        fn new(responses: Vec<Result<SearchResults, SearchProviderError>>) -> Self {
            Self {
                responses: Mutex::new(responses),
                calls: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl SearchProvider for ScriptedProvider {
        async fn search(
            &self,
            query: &str,
            _country: &str,
            _language: &str,
            _page: u32,
        ) -> Result<SearchResults, SearchProviderError> {
            self.calls.lock().unwrap().push(query.to_string());
            let mut responses = self.responses.lock().unwrap();
            if responses.is_empty() {
                Ok(SearchResults::default())
            } else {
                responses.remove(0)
            }
        }
    }

    fn organic(url: &str, title: &str) -> OrganicResult {
        OrganicResult {
            rank: 1,
            title: title.to_string(),
            url: url.to_string(),
            description: String::new(),
        }
    }

    fn limiter() -> Arc<TokenBucket> {
        Arc::new(TokenBucket::new("search", 100, 10, Duration::from_secs(1)))
    }

    #[tokio::test]
    async fn ranks_and_caps_candidates() {
        let provider = Arc::new(ScriptedProvider::new(vec![Ok(SearchResults {
            organic: vec![
                organic("https://acme.com/about", "About Acme"),
                organic("https://unrelated.net/x", "Something else"),
            ],
            total: 2,
        })]));
        let stage = DiscoveryStage::new(provider, limiter(), None, Duration::from_secs(60));
        let request = ExtractRequest::builder("Acme")
            .domain("acme.com")
            .mode(firmscout_core::ExtractionMode::Basic)
            .include_social(false)
            .max_pages(5)
            .build()
            .unwrap();

        let outcome = stage.discover(&request).await.unwrap();
        assert_eq!(outcome.queries_used.len(), 1);
        assert_eq!(outcome.candidates[0].url, "https://acme.com/about");
        assert!(outcome.candidates[0].priority > outcome.candidates[1].priority);
    }

    #[tokio::test]
    async fn partial_failures_are_captured_not_fatal() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            Ok(SearchResults {
                organic: vec![organic("https://acme.com", "Acme")],
                total: 1,
            }),
            Err(SearchProviderError::Unavailable("503".into())),
        ]));
        let stage = DiscoveryStage::new(provider, limiter(), None, Duration::from_secs(60));
        let request = ExtractRequest::builder("Acme").build().unwrap();

        let outcome = stage.discover(&request).await.unwrap();
        assert!(!outcome.candidates.is_empty());
        assert_eq!(outcome.errors.len(), 1);
    }

    #[tokio::test]
    async fn total_failure_is_an_error() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            Err(SearchProviderError::Unavailable("503".into())),
            Err(SearchProviderError::Unavailable("503".into())),
            Err(SearchProviderError::Unavailable("503".into())),
        ]));
        let stage = DiscoveryStage::new(provider, limiter(), None, Duration::from_secs(60));
        let request = ExtractRequest::builder("Acme").build().unwrap();

        let result = stage.discover(&request).await;
        assert!(matches!(result, Err(ExtractError::Search { .. })));
    }

    #[tokio::test]
    async fn empty_results_without_failures_is_ok() {
        let provider = Arc::new(ScriptedProvider::new(vec![]));
        let stage = DiscoveryStage::new(provider, limiter(), None, Duration::from_secs(60));
        let request = ExtractRequest::builder("Acme")
            .mode(firmscout_core::ExtractionMode::Basic)
            .include_social(false)
            .build()
            .unwrap();

        let outcome = stage.discover(&request).await.unwrap();
        assert!(outcome.candidates.is_empty());
        assert!(outcome.errors.is_empty());
    }
}
