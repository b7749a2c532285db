use firmscout_core::ExtractError;

/// Failure categories that drive retry and recovery decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    Transient,
    Timeout,
    RateLimit,
    DataQuality,
    NotFound,
    Permanent,
}

fn message_looks_transient(message: &str) -> bool {
    let lower = message.to_lowercase();
    lower.contains("timeout")
        || lower.contains("temporary")
        || lower.contains("unavailable")
        || lower.contains("connection")
        || lower.contains("reset")
        || lower.contains("50")
}

pub fn classify(error: &ExtractError) -> FailureClass {
    match error {
        ExtractError::RateLimited(_) => FailureClass::RateLimit,
        ExtractError::Timeout { .. } => FailureClass::Timeout,
        ExtractError::Search { message, .. } => {
            if message.to_lowercase().contains("timeout") {
                FailureClass::Timeout
            } else if message_looks_transient(message) {
                FailureClass::Transient
            } else {
                FailureClass::Permanent
            }
        }
        ExtractError::Crawl { message, .. } => {
            if message.to_lowercase().contains("timeout") {
                FailureClass::Timeout
            } else {
                FailureClass::Transient
            }
        }
        ExtractError::Parse { .. }
        | ExtractError::Aggregation(_)
        | ExtractError::InsufficientContent { .. } => FailureClass::DataQuality,
        ExtractError::CompanyNotFound { .. } => FailureClass::NotFound,
        ExtractError::Cache(_) => FailureClass::Transient,
        ExtractError::Validation(_)
        | ExtractError::CircuitOpen(_)
        | ExtractError::Unexpected(_) => FailureClass::Permanent,
    }
}

pub fn is_retryable(class: FailureClass) -> bool {
    matches!(
        class,
        FailureClass::Transient
            | FailureClass::Timeout
            | FailureClass::RateLimit
            | FailureClass::DataQuality
    )
}
