use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ErrorEntry;
use crate::record::CompanyRecord;
use crate::request::ExtractionMode;

/// A URL surfaced by discovery with its crawl priority.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandidateUrl {
    pub url: String,
    pub title: String,
    pub snippet: String,
    pub priority: f64,
}

/// One successfully fetched page, ready for parsing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchedPage {
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub cleaned_text: String,
    pub markdown: String,
    pub fetched_at: DateTime<Utc>,
    pub elapsed_ms: u64,
    pub word_count: usize,
    pub source_priority: f64,
}

/// Pages with less cleaned content than this are discarded.
pub const MIN_CONTENT_CHARS: usize = 100;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionMetadata {
    pub pages_attempted: usize,
    pub pages_crawled: usize,
    pub sources_found: Vec<String>,
    pub queries_used: Vec<String>,
    pub mode_used: ExtractionMode,
    /// Seconds spent inside the pipeline stages.
    pub extraction_time: f64,
}

impl ExtractionMetadata {
    pub fn empty(mode: ExtractionMode) -> Self {
        Self {
            pages_attempted: 0,
            pages_crawled: 0,
            sources_found: Vec::new(),
            queries_used: Vec::new(),
            mode_used: mode,
            extraction_time: 0.0,
        }
    }
}

/// What `extract` hands back. `success` is true iff a record was produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractResponse {
    pub request_id: String,
    pub company_name: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub record: Option<CompanyRecord>,
    pub metadata: ExtractionMetadata,
    pub errors: Vec<ErrorEntry>,
    pub warnings: Vec<String>,
    /// Wall-clock seconds from request receipt to response.
    pub processing_time: f64,
}
