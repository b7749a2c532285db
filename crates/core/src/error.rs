use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("search failed for '{query}': {message}")]
    Search { query: String, message: String },

    #[error("crawl failed for {url}: {message}")]
    Crawl { url: String, message: String },

    #[error("parse failed for {url}: {message}")]
    Parse { url: String, message: String },

    #[error("aggregation failed: {0}")]
    Aggregation(String),

    #[error("rate limited: {0}")]
    RateLimited(String),

    #[error("timeout after {seconds}s: {context}")]
    Timeout { seconds: u64, context: String },

    #[error("circuit '{0}' is open")]
    CircuitOpen(String),

    #[error("insufficient content from {url}: {chars} chars")]
    InsufficientContent { url: String, chars: usize },

    #[error("no company information found for '{company}' ({pages_attempted} pages attempted, {queries_used} queries)")]
    CompanyNotFound {
        company: String,
        pages_attempted: usize,
        queries_used: usize,
    },

    #[error("cache error: {0}")]
    Cache(String),

    #[error("unexpected error: {0}")]
    Unexpected(String),
}

/// Discriminant used in responses and exports. One variant per taxonomy entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    Search,
    Crawl,
    Parse,
    Aggregation,
    RateLimited,
    Timeout,
    CircuitOpen,
    InsufficientContent,
    CompanyNotFound,
    Cache,
    Unexpected,
}

/// One captured failure, attached to a response rather than aborting it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorEntry {
    pub kind: ErrorKind,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

impl ExtractError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ExtractError::Validation(_) => ErrorKind::Validation,
            ExtractError::Search { .. } => ErrorKind::Search,
            ExtractError::Crawl { .. } => ErrorKind::Crawl,
            ExtractError::Parse { .. } => ErrorKind::Parse,
            ExtractError::Aggregation(_) => ErrorKind::Aggregation,
            ExtractError::RateLimited(_) => ErrorKind::RateLimited,
            ExtractError::Timeout { .. } => ErrorKind::Timeout,
            ExtractError::CircuitOpen(_) => ErrorKind::CircuitOpen,
            ExtractError::InsufficientContent { .. } => ErrorKind::InsufficientContent,
            ExtractError::CompanyNotFound { .. } => ErrorKind::CompanyNotFound,
            ExtractError::Cache(_) => ErrorKind::Cache,
            ExtractError::Unexpected(_) => ErrorKind::Unexpected,
        }
    }

    /// The URL this failure is scoped to, when it has one.
    pub fn url(&self) -> Option<&str> {
        match self {
            ExtractError::Crawl { url, .. }
            | ExtractError::Parse { url, .. }
            | ExtractError::InsufficientContent { url, .. } => Some(url),
            _ => None,
        }
    }

    pub fn entry(&self) -> ErrorEntry {
        ErrorEntry {
            kind: self.kind(),
            message: self.to_string(),
            url: self.url().map(str::to_string),
        }
    }
}

impl ErrorEntry {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            url: None,
        }
    }

    pub fn with_url(kind: ErrorKind, message: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            url: Some(url.into()),
        }
    }
}
