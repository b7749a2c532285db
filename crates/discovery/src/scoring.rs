use url::Url;

use firmscout_core::{CandidateUrl, ExtractRequest, ExtractionMode};

const HIGH_VALUE_HOSTS: [&str; 6] = [
    "linkedin.com",
    "crunchbase.com",
    "bloomberg.com",
    "forbes.com",
    "reuters.com",
    "sec.gov",
];

const HIGH_VALUE_PATHS: [&str; 9] = [
    "about",
    "contact",
    "company",
    "team",
    "leadership",
    "investors",
    "careers",
    "press",
    "news",
];

const CONTACT_TITLE_TERMS: [&str; 5] = ["contact", "address", "phone", "email", "location"];
const FINANCIAL_TITLE_TERMS: [&str; 5] =
    ["investor", "funding", "financial", "revenue", "valuation"];
const COMPANY_TERMS: [&str; 7] = [
    "company",
    "business",
    "corporation",
    "organization",
    "startup",
    "enterprise",
    "firm",
];

/// Hosts unlikely to be the company's own site; they keep a reduced score
/// rather than being dropped.
const DISCOUNTED_HOSTS: [&str; 7] = [
    "wikipedia.org",
    "facebook.com",
    "instagram.com",
    "twitter.com",
    "youtube.com",
    "pinterest.com",
    "reddit.com",
];

/// Pure scoring function: same inputs, same score. Clipped to [0, 1].
pub fn score_url(url: &str, title: &str, description: &str, request: &ExtractRequest) -> f64 {
    let Ok(parsed) = Url::parse(&url.to_lowercase()) else {
        return 0.0;
    };
    let host = parsed
        .host_str()
        .unwrap_or("")
        .trim_start_matches("www.")
        .to_string();
    if host.is_empty() {
        return 0.0;
    }
    let path = parsed.path().to_lowercase();
    let name_lower = request.company_name.to_lowercase();

    let mut score: f64 = 0.0;

    let compact_name: String = name_lower.chars().filter(|c| *c != ' ').collect();
    if let Some(domain) = &request.domain {
        if host.contains(&domain.to_lowercase()) {
            score += 0.4;
        } else if host.replace(['-', '_'], "").contains(&compact_name) {
            score += 0.3;
        }
    } else if host.replace(['-', '_'], "").contains(&compact_name) {
        score += 0.3;
    }

    if HIGH_VALUE_HOSTS.iter().any(|hv| host.contains(hv)) {
        score += 0.2;
    }

    if HIGH_VALUE_PATHS.iter().any(|hv| path.contains(hv)) {
        score += 0.15;
    }

    let title_lower = title.to_lowercase();
    if !title_lower.is_empty() {
        if title_lower.contains(&name_lower) {
            score += 0.2;
        }
        let mode_terms: &[&str] = match request.mode {
            ExtractionMode::ContactFocused => &CONTACT_TITLE_TERMS,
            ExtractionMode::FinancialFocused => &FINANCIAL_TITLE_TERMS,
            _ => &[],
        };
        if mode_terms.iter().any(|t| title_lower.contains(t)) {
            score += 0.1;
        }
    }

    let desc_lower = description.to_lowercase();
    if !desc_lower.is_empty() {
        if desc_lower.contains(&name_lower) {
            score += 0.1;
        }
        if COMPANY_TERMS.iter().any(|t| desc_lower.contains(t)) {
            score += 0.05;
        }
    }

    if DISCOUNTED_HOSTS.iter().any(|d| host.contains(d)) {
        score *= 0.7;
    }

    score.clamp(0.0, 1.0)
}

/// Folds scored results into a deduplicated candidate list: repeated URLs
/// keep their maximum score and their first insertion position.
#[derive(Default)]
pub struct CandidateSet {
    ordered: Vec<CandidateUrl>,
    index: std::collections::HashMap<String, usize>,
}

impl CandidateSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, candidate: CandidateUrl) {
        match self.index.get(&candidate.url) {
            Some(&i) => {
                if candidate.priority > self.ordered[i].priority {
                    self.ordered[i].priority = candidate.priority;
                }
            }
            None => {
                self.index.insert(candidate.url.clone(), self.ordered.len());
                self.ordered.push(candidate);
            }
        }
    }

    /// Candidates sorted by priority, ties broken by insertion order, capped
    /// at `limit`.
    pub fn into_ranked(mut self, limit: usize) -> Vec<CandidateUrl> {
        self.ordered
            .sort_by(|a, b| b.priority.partial_cmp(&a.priority).unwrap_or(std::cmp::Ordering::Equal));
        self.ordered.truncate(limit);
        self.ordered
    }

    pub fn len(&self) -> usize {
        self.ordered.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ordered.is_empty()
    }
}
