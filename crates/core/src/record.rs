use std::collections::HashMap;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

static EMAIL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-zA-Z0-9._%+\-]+@[a-zA-Z0-9.\-]+\.[a-zA-Z]{2,}$").unwrap());

static STOCK_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Z0-9.\-]{1,10}$").unwrap());

pub fn is_valid_email(s: &str) -> bool {
    EMAIL_RE.is_match(s)
}

/// Valid iff at least 7 digits remain after stripping separators.
pub fn is_valid_phone(s: &str) -> bool {
    s.chars().filter(|c| c.is_ascii_digit()).count() >= 7
}

pub fn normalize_stock_symbol(s: &str) -> Option<String> {
    let upper = s.trim().to_ascii_uppercase();
    STOCK_RE.is_match(&upper).then_some(upper)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompanySize {
    Micro,
    Small,
    Medium,
    Large,
    Enterprise,
}

impl CompanySize {
    pub fn from_employee_count(count: u64) -> Self {
        match count {
            0..=10 => CompanySize::Micro,
            11..=50 => CompanySize::Small,
            51..=500 => CompanySize::Medium,
            501..=5000 => CompanySize::Large,
            _ => CompanySize::Enterprise,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CompanySize::Micro => "micro",
            CompanySize::Small => "small",
            CompanySize::Medium => "medium",
            CompanySize::Large => "large",
            CompanySize::Enterprise => "enterprise",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SocialPlatform {
    Linkedin,
    Twitter,
    Facebook,
    Instagram,
    Youtube,
    Github,
    Tiktok,
}

impl SocialPlatform {
    /// Platform must agree with the profile URL's host.
    pub fn matches_host(&self, host: &str) -> bool {
        let host = host.trim_start_matches("www.");
        match self {
            SocialPlatform::Linkedin => host.ends_with("linkedin.com"),
            SocialPlatform::Twitter => host.ends_with("twitter.com") || host.ends_with("x.com"),
            SocialPlatform::Facebook => host.ends_with("facebook.com"),
            SocialPlatform::Instagram => host.ends_with("instagram.com"),
            SocialPlatform::Youtube => host.ends_with("youtube.com"),
            SocialPlatform::Github => host.ends_with("github.com"),
            SocialPlatform::Tiktok => host.ends_with("tiktok.com"),
        }
    }

    pub fn from_host(host: &str) -> Option<Self> {
        [
            SocialPlatform::Linkedin,
            SocialPlatform::Twitter,
            SocialPlatform::Facebook,
            SocialPlatform::Instagram,
            SocialPlatform::Youtube,
            SocialPlatform::Github,
            SocialPlatform::Tiktok,
        ]
        .into_iter()
        .find(|p| p.matches_host(host))
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SocialPlatform::Linkedin => "linkedin",
            SocialPlatform::Twitter => "twitter",
            SocialPlatform::Facebook => "facebook",
            SocialPlatform::Instagram => "instagram",
            SocialPlatform::Youtube => "youtube",
            SocialPlatform::Github => "github",
            SocialPlatform::Tiktok => "tiktok",
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BasicInfo {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub legal_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub website: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tagline: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub industry: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sector: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub founded_year: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<CompanySize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub employee_count: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub headquarters: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub locations: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stock_symbol: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_public: Option<bool>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContactInfo {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub postal_code: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub additional_emails: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub additional_phones: Vec<String>,
}

impl ContactInfo {
    pub fn is_empty(&self) -> bool {
        self.email.is_none()
            && self.phone.is_none()
            && self.address.is_none()
            && self.city.is_none()
            && self.state.is_none()
            && self.country.is_none()
            && self.postal_code.is_none()
            && self.additional_emails.is_empty()
            && self.additional_phones.is_empty()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SocialProfile {
    pub platform: SocialPlatform,
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub followers: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verified: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FinancialItem {
    pub label: String,
    pub amount: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Financials {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub items: Vec<FinancialItem>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub investors: Vec<String>,
}

impl Financials {
    pub fn is_empty(&self) -> bool {
        self.items.is_empty() && self.investors.is_empty()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Person {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub linkedin: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bio: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Scores {
    pub confidence: f64,
    pub data_quality: f64,
    pub completeness: f64,
}

/// Merged output of the aggregator. `basic.name` is the only required field.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompanyRecord {
    pub basic: BasicInfo,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contact: Option<ContactInfo>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub social: Vec<SocialProfile>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub financials: Option<Financials>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub personnel: Vec<Person>,
    pub scores: Scores,
}

impl CompanyRecord {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            basic: BasicInfo {
                name: name.into(),
                ..BasicInfo::default()
            },
            contact: None,
            social: Vec::new(),
            financials: None,
            personnel: Vec::new(),
            scores: Scores::default(),
        }
    }

    /// Restores the record-level invariants after field-by-field mutation:
    /// social deduped by platform with verified entries winning, personnel
    /// deduped by lowercased name, locations sorted and excluding the
    /// headquarters value, stock symbol uppercased, invalid contact values
    /// dropped.
    pub fn normalize(&mut self) {
        let mut by_platform: HashMap<SocialPlatform, SocialProfile> = HashMap::new();
        for profile in self.social.drain(..) {
            let supersedes = match by_platform.get(&profile.platform) {
                None => true,
                Some(existing) => {
                    profile.verified == Some(true) && existing.verified != Some(true)
                }
            };
            if supersedes {
                by_platform.insert(profile.platform, profile);
            }
        }
        let mut social: Vec<SocialProfile> = by_platform.into_values().collect();
        social.sort_by_key(|p| p.platform.as_str());
        self.social = social;

        let mut seen = std::collections::HashSet::new();
        self.personnel
            .retain(|p| seen.insert(p.name.trim().to_lowercase()));

        self.basic.locations.sort();
        self.basic.locations.dedup();
        if let Some(hq) = &self.basic.headquarters {
            let hq = hq.clone();
            self.basic.locations.retain(|l| l != &hq);
        }

        if let Some(symbol) = self.basic.stock_symbol.take() {
            self.basic.stock_symbol = normalize_stock_symbol(&symbol);
        }

        if let Some(contact) = &mut self.contact {
            if let Some(email) = &contact.email {
                if !is_valid_email(email) {
                    contact.email = None;
                }
            }
            if let Some(phone) = &contact.phone {
                if !is_valid_phone(phone) {
                    contact.phone = None;
                }
            }
            contact.additional_emails.retain(|e| is_valid_email(e));
            contact.additional_phones.retain(|p| is_valid_phone(p));
            if contact.is_empty() {
                self.contact = None;
            }
        }
    }
}
