use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use firmscout_core::{ids, ExtractError, ExtractResponse, ExtractionMode};

/// Scheduling class for a batch. Lower score runs first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchPriority {
    Urgent,
    High,
    Normal,
    Low,
}

impl BatchPriority {
    pub fn score(&self) -> u8 {
        match self {
            BatchPriority::Urgent => 1,
            BatchPriority::High => 2,
            BatchPriority::Normal => 3,
            BatchPriority::Low => 4,
        }
    }

    /// Task-queue priority for this bucket (the task queue is a max-heap).
    pub fn task_priority(&self) -> f64 {
        (5 - self.score()) as f64
    }
}

impl std::str::FromStr for BatchPriority {
    type Err = ExtractError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "urgent" => Ok(BatchPriority::Urgent),
            "high" => Ok(BatchPriority::High),
            "normal" => Ok(BatchPriority::Normal),
            "low" => Ok(BatchPriority::Low),
            other => Err(ExtractError::Validation(format!(
                "unknown batch priority: {other}"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExportFormat {
    Json,
    Csv,
    Tabular,
}

impl std::str::FromStr for ExportFormat {
    type Err = ExtractError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(ExportFormat::Json),
            "csv" => Ok(ExportFormat::Csv),
            "tabular" => Ok(ExportFormat::Tabular),
            other => Err(ExtractError::Validation(format!(
                "unknown export format: {other}"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchStatus {
    Queued,
    Processing,
    Completed,
    PartiallyCompleted,
    Failed,
    Cancelled,
}

impl BatchStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            BatchStatus::Completed
                | BatchStatus::PartiallyCompleted
                | BatchStatus::Failed
                | BatchStatus::Cancelled
        )
    }
}

/// What a caller hands in. Turned into a validated [`BatchRequest`] by the
/// orchestrator.
#[derive(Debug, Clone)]
pub struct BatchSubmission {
    pub company_names: Vec<String>,
    pub mode: ExtractionMode,
    pub priority: BatchPriority,
    pub domain_hints: HashMap<String, String>,
    pub country: String,
    pub language: String,
    pub timeout_s: u64,
    pub max_pages: usize,
    pub export_format: ExportFormat,
}

impl BatchSubmission {
    pub fn new(company_names: Vec<String>) -> Self {
        Self {
            company_names,
            mode: ExtractionMode::Comprehensive,
            priority: BatchPriority::Normal,
            domain_hints: HashMap::new(),
            country: "US".to_string(),
            language: "en".to_string(),
            timeout_s: 30,
            max_pages: 5,
            export_format: ExportFormat::Json,
        }
    }
}

/// Validated batch: names trimmed, case-insensitively deduplicated (first
/// spelling wins, order preserved), 1 to 100 companies.
#[derive(Debug, Clone)]
pub struct BatchRequest {
    pub batch_id: String,
    pub companies: Vec<String>,
    pub submission: BatchSubmission,
    pub created_at: DateTime<Utc>,
}

impl BatchRequest {
    pub fn validated(submission: BatchSubmission) -> Result<Self, ExtractError> {
        let mut seen = std::collections::HashSet::new();
        let companies: Vec<String> = submission
            .company_names
            .iter()
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty())
            .filter(|n| seen.insert(n.to_lowercase()))
            .collect();
        if companies.is_empty() {
            return Err(ExtractError::Validation(
                "batch contains no company names".into(),
            ));
        }
        if companies.len() > 100 {
            return Err(ExtractError::Validation(format!(
                "batch has {} companies after deduplication (max 100)",
                companies.len()
            )));
        }
        Ok(Self {
            batch_id: ids::batch_id(),
            companies,
            submission,
            created_at: Utc::now(),
        })
    }
}

/// Point-in-time progress. `completed` counts successful extractions,
/// `failed` everything settled without one.
#[derive(Debug, Clone, Serialize)]
pub struct BatchProgress {
    pub batch_id: String,
    pub total: usize,
    pub completed: usize,
    pub failed: usize,
    pub processing: usize,
    pub queued: usize,
    pub success_rate: f64,
    pub avg_processing_time: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub eta_s: Option<f64>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SummaryStats {
    pub total_companies: usize,
    pub successful_extractions: usize,
    pub success_rate: f64,
    pub avg_confidence: f64,
    pub avg_processing_time: f64,
    pub industry_distribution: HashMap<String, usize>,
    pub size_distribution: HashMap<String, usize>,
    pub with_contact_info: usize,
    pub with_social_media: usize,
    pub with_personnel: usize,
}

/// Finished batch. Results iterate in submission order regardless of
/// completion order.
#[derive(Debug, Clone, Serialize)]
pub struct BatchResult {
    pub batch_id: String,
    pub status: BatchStatus,
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub results: Vec<(String, ExtractResponse)>,
    pub summary: SummaryStats,
    pub processing_time: f64,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub export_path: Option<String>,
}

/// Registered observers receive progress snapshots by reference; they must
/// not block.
pub trait ProgressObserver: Send + Sync + 'static {
    fn on_progress(&self, progress: &BatchProgress);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dedup_is_case_insensitive_and_order_preserving() {
        let request = BatchRequest::validated(BatchSubmission::new(vec![
            "OpenAI".into(),
            "openai".into(),
            "Anthropic".into(),
            "  OPENAI ".into(),
        ]))
        .unwrap();
        assert_eq!(request.companies, vec!["OpenAI", "Anthropic"]);
    }

    #[test]
    fn empty_batch_is_rejected() {
        assert!(BatchRequest::validated(BatchSubmission::new(vec![])).is_err());
        assert!(BatchRequest::validated(BatchSubmission::new(vec!["   ".into()])).is_err());
    }

    #[test]
    fn oversized_batch_is_rejected() {
        let names: Vec<String> = (0..101).map(|i| format!("Company {i}")).collect();
        assert!(BatchRequest::validated(BatchSubmission::new(names)).is_err());
    }

    #[test]
    fn priority_scores_and_task_priorities() {
        assert_eq!(BatchPriority::Urgent.score(), 1);
        assert_eq!(BatchPriority::Low.score(), 4);
        assert!(BatchPriority::Urgent.task_priority() > BatchPriority::Low.task_priority());
    }
}
