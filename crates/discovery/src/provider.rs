use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, warn};

use firmscout_core::config::SearchConfig;
use firmscout_core::{OrganicResult, SearchProvider, SearchProviderError, SearchResults};

#[derive(Debug, Deserialize)]
struct WireResult {
    #[serde(default)]
    rank: u32,
    #[serde(default)]
    title: String,
    url: String,
    #[serde(default)]
    description: String,
}

#[derive(Debug, Deserialize)]
struct WireResponse {
    #[serde(default)]
    organic_results: Vec<WireResult>,
    #[serde(default)]
    total: u64,
}

/// Search provider backed by a JSON SERP API endpoint.
pub struct HttpSearchProvider {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    timeout_s: u64,
}

impl HttpSearchProvider {
    pub fn new(config: &SearchConfig) -> Result<Self, firmscout_core::ExtractError> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(config.timeout_s))
            .build()
            .map_err(|e| firmscout_core::ExtractError::Unexpected(e.to_string()))?;
        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            api_key: config.api_key.clone(),
            timeout_s: config.timeout_s,
        })
    }
}

#[async_trait]
impl SearchProvider for HttpSearchProvider {
    async fn search(
        &self,
        query: &str,
        country: &str,
        language: &str,
        page: u32,
    ) -> Result<SearchResults, SearchProviderError> {
        debug!(query, country, language, page, "serp request");

        let mut request = self.client.get(&self.endpoint).query(&[
            ("q", query),
            ("country", country),
            ("language", language),
            ("page", &page.to_string()),
        ]);
        if !self.api_key.is_empty() {
            request = request.bearer_auth(&self.api_key);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                SearchProviderError::Timeout(self.timeout_s)
            } else {
                SearchProviderError::Unavailable(e.to_string())
            }
        })?;

        let status = response.status();
        match status.as_u16() {
            200..=299 => {}
            429 => {
                warn!(query, "serp provider throttled us");
                return Err(SearchProviderError::RateLimited(format!(
                    "status {status}"
                )));
            }
            401 | 403 => {
                return Err(SearchProviderError::Auth(format!("status {status}")));
            }
            s => {
                return Err(SearchProviderError::Unavailable(format!("status {s}")));
            }
        }

        let wire: WireResponse = response
            .json()
            .await
            .map_err(|e| SearchProviderError::Unavailable(format!("bad response body: {e}")))?;

        Ok(SearchResults {
            organic: wire
                .organic_results
                .into_iter()
                .map(|r| OrganicResult {
                    rank: r.rank,
                    title: r.title,
                    url: r.url,
                    description: r.description,
                })
                .collect(),
            total: wire.total,
        })
    }
}
