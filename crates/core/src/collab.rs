//! Collaborator contracts the pipeline depends on. Implementations live in
//! their own crates; tests substitute scripted doubles.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::record::CompanyRecord;
use crate::request::ExtractRequest;
use crate::types::ExtractResponse;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrganicResult {
    pub rank: u32,
    pub title: String,
    pub url: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchResults {
    #[serde(default)]
    pub organic: Vec<OrganicResult>,
    #[serde(default)]
    pub total: u64,
}

#[derive(Error, Debug)]
pub enum SearchProviderError {
    #[error("search provider unavailable: {0}")]
    Unavailable(String),
    #[error("search provider rate limited: {0}")]
    RateLimited(String),
    #[error("search timed out after {0}s")]
    Timeout(u64),
    #[error("search auth error: {0}")]
    Auth(String),
}

#[async_trait]
pub trait SearchProvider: Send + Sync + 'static {
    async fn search(
        &self,
        query: &str,
        country: &str,
        language: &str,
        page: u32,
    ) -> Result<SearchResults, SearchProviderError>;
}

/// Fetch result before it is turned into a [`crate::FetchedPage`]. The crawl
/// stage owns thresholds and politeness; the fetcher only moves bytes and
/// strips markup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchOutcome {
    pub status: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub cleaned_text: String,
    pub markdown: String,
    pub elapsed_ms: u64,
}

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("fetch timed out after {0}s")]
    Timeout(u64),
    #[error("http status {status} from {url}")]
    Http { status: u16, url: String },
    #[error("network error: {0}")]
    Network(String),
    #[error("body too large: {size} bytes (max {max})")]
    BodyTooLarge { size: usize, max: usize },
}

impl FetchError {
    pub fn status(&self) -> Option<u16> {
        match self {
            FetchError::Http { status, .. } => Some(*status),
            _ => None,
        }
    }
}

#[async_trait]
pub trait PageFetcher: Send + Sync + 'static {
    async fn fetch(&self, url: &str, timeout: Duration) -> Result<FetchOutcome, FetchError>;
}

/// A per-source partial record plus the parser's own confidence claim.
/// Data-quality and completeness claims travel inside `record.scores`; the
/// aggregator recomputes the final scores and never trusts these as-is.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParsedCompany {
    pub record: CompanyRecord,
    pub confidence: f64,
}

/// Pure HTML/text to facts extraction. No I/O.
pub trait CompanyParser: Send + Sync + 'static {
    fn parse(&self, content: &str, url: &str, expected_name: &str) -> Option<ParsedCompany>;
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub hit_rate: f64,
    pub entries: usize,
}

/// Key/value store with TTLs. Callers treat every error as a miss; an
/// unavailable backend must degrade the pipeline, never fail it.
#[async_trait]
pub trait Cache: Send + Sync + 'static {
    async fn get(&self, key: &str) -> Result<Option<serde_json::Value>, crate::ExtractError>;
    async fn set(
        &self,
        key: &str,
        value: serde_json::Value,
        ttl: Duration,
    ) -> Result<(), crate::ExtractError>;
    async fn delete(&self, key: &str) -> Result<bool, crate::ExtractError>;
    /// Deletes every key containing `pattern`; returns how many were removed.
    async fn invalidate(&self, pattern: &str) -> Result<usize, crate::ExtractError>;
    fn stats(&self) -> CacheStats;
}

/// Anything that can run one extraction end to end. Lets the concurrent
/// runtime and the batch orchestrator be tested against a scripted pipeline.
#[async_trait]
pub trait Extractor: Send + Sync + 'static {
    async fn extract(&self, request: ExtractRequest) -> ExtractResponse;
}
