use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::ExtractError;

static DOMAIN_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?:[a-zA-Z0-9](?:[a-zA-Z0-9\-]{0,61}[a-zA-Z0-9])?\.)+[a-zA-Z]{2,}$").unwrap()
});

/// Controls query generation and the default include flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionMode {
    Basic,
    Comprehensive,
    ContactFocused,
    FinancialFocused,
}

impl ExtractionMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExtractionMode::Basic => "basic",
            ExtractionMode::Comprehensive => "comprehensive",
            ExtractionMode::ContactFocused => "contact_focused",
            ExtractionMode::FinancialFocused => "financial_focused",
        }
    }
}

impl std::str::FromStr for ExtractionMode {
    type Err = ExtractError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "basic" => Ok(ExtractionMode::Basic),
            "comprehensive" => Ok(ExtractionMode::Comprehensive),
            "contact_focused" | "contact" => Ok(ExtractionMode::ContactFocused),
            "financial_focused" | "financial" => Ok(ExtractionMode::FinancialFocused),
            other => Err(ExtractError::Validation(format!(
                "unknown extraction mode: {other}"
            ))),
        }
    }
}

/// A single extraction request. Construct through [`ExtractRequest::builder`],
/// which validates every field; the pipeline re-validates before running so a
/// hand-modified request (recovery path) cannot smuggle bad values in.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractRequest {
    pub company_name: String,
    pub domain: Option<String>,
    pub mode: ExtractionMode,
    /// ISO 3166-1 alpha-2, uppercase.
    pub country: String,
    /// ISO 639-1, lowercase.
    pub language: String,
    pub include_social: bool,
    pub include_financial: bool,
    pub include_contact: bool,
    pub include_personnel: bool,
    pub include_subsidiaries: bool,
    pub max_pages: usize,
    pub timeout_s: u64,
}

impl ExtractRequest {
    pub fn builder(company_name: impl Into<String>) -> ExtractRequestBuilder {
        ExtractRequestBuilder::new(company_name)
    }

    pub fn validate(&self) -> Result<(), ExtractError> {
        if self.company_name.trim().is_empty() {
            return Err(ExtractError::Validation("company name is empty".into()));
        }
        if let Some(domain) = &self.domain {
            if !DOMAIN_RE.is_match(domain) {
                return Err(ExtractError::Validation(format!(
                    "invalid domain: {domain}"
                )));
            }
        }
        if self.country.len() != 2 || !self.country.chars().all(|c| c.is_ascii_uppercase()) {
            return Err(ExtractError::Validation(format!(
                "country must be ISO 3166-1 alpha-2 uppercase, got '{}'",
                self.country
            )));
        }
        if self.language.len() != 2 || !self.language.chars().all(|c| c.is_ascii_lowercase()) {
            return Err(ExtractError::Validation(format!(
                "language must be ISO 639-1 lowercase, got '{}'",
                self.language
            )));
        }
        if !(1..=20).contains(&self.max_pages) {
            return Err(ExtractError::Validation(format!(
                "max_pages must be within 1..=20, got {}",
                self.max_pages
            )));
        }
        if !(5..=120).contains(&self.timeout_s) {
            return Err(ExtractError::Validation(format!(
                "timeout_s must be within 5..=120, got {}",
                self.timeout_s
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct ExtractRequestBuilder {
    request: ExtractRequest,
}

impl ExtractRequestBuilder {
    pub fn new(company_name: impl Into<String>) -> Self {
        Self {
            request: ExtractRequest {
                company_name: company_name.into().trim().to_string(),
                domain: None,
                mode: ExtractionMode::Comprehensive,
                country: "US".to_string(),
                language: "en".to_string(),
                include_social: true,
                include_financial: true,
                include_contact: true,
                include_personnel: false,
                include_subsidiaries: false,
                max_pages: 5,
                timeout_s: 30,
            },
        }
    }

    pub fn domain(mut self, domain: impl Into<String>) -> Self {
        self.request.domain = Some(domain.into().trim().trim_start_matches("www.").to_lowercase());
        self
    }

    pub fn mode(mut self, mode: ExtractionMode) -> Self {
        self.request.mode = mode;
        self
    }

    pub fn country(mut self, country: impl Into<String>) -> Self {
        self.request.country = country.into();
        self
    }

    pub fn language(mut self, language: impl Into<String>) -> Self {
        self.request.language = language.into();
        self
    }

    pub fn include_social(mut self, on: bool) -> Self {
        self.request.include_social = on;
        self
    }

    pub fn include_financial(mut self, on: bool) -> Self {
        self.request.include_financial = on;
        self
    }

    pub fn include_contact(mut self, on: bool) -> Self {
        self.request.include_contact = on;
        self
    }

    pub fn include_personnel(mut self, on: bool) -> Self {
        self.request.include_personnel = on;
        self
    }

    pub fn include_subsidiaries(mut self, on: bool) -> Self {
        self.request.include_subsidiaries = on;
        self
    }

    pub fn max_pages(mut self, n: usize) -> Self {
        self.request.max_pages = n;
        self
    }

    pub fn timeout_s(mut self, s: u64) -> Self {
        self.request.timeout_s = s;
        self
    }

    pub fn build(self) -> Result<ExtractRequest, ExtractError> {
        self.request.validate()?;
        Ok(self.request)
    }
}
