//! Heuristic company-facts extraction from cleaned page text. Pure string
//! work: no I/O, no DOM, deterministic for a given input.

mod patterns;

use tracing::debug;
use url::Url;

use firmscout_core::{
    is_valid_email, is_valid_phone, CompanyParser, CompanyRecord, CompanySize, ContactInfo,
    FinancialItem, Financials, ParsedCompany, Person, SocialPlatform, SocialProfile,
};

use patterns::*;

const CURRENT_YEAR: i32 = 2026;

#[derive(Default)]
pub struct HeuristicCompanyParser;

impl HeuristicCompanyParser {
    pub fn new() -> Self {
        Self
    }

    fn extract_contact(&self, content: &str) -> Option<ContactInfo> {
        let mut contact = ContactInfo::default();

        let emails: Vec<String> = find_unique(&EMAIL_RE, content)
            .into_iter()
            .filter(|e| is_valid_email(e))
            .collect();
        if let Some((first, rest)) = emails.split_first() {
            contact.email = Some(first.clone());
            contact.additional_emails = rest.to_vec();
        }

        let phones: Vec<String> = find_unique(&PHONE_RE, content)
            .into_iter()
            .map(|p| p.trim().to_string())
            .filter(|p| is_valid_phone(p))
            .collect();
        if let Some((first, rest)) = phones.split_first() {
            contact.phone = Some(first.clone());
            contact.additional_phones = rest.to_vec();
        }

        (!contact.is_empty()).then_some(contact)
    }

    fn extract_social(&self, content: &str) -> Vec<SocialProfile> {
        let mut profiles = Vec::new();
        for m in SOCIAL_URL_RE.find_iter(content) {
            let link = m.as_str().trim_end_matches(['.', ',', ')']);
            let Ok(parsed) = Url::parse(link) else {
                continue;
            };
            let Some(host) = parsed.host_str() else {
                continue;
            };
            let Some(platform) = SocialPlatform::from_host(host) else {
                continue;
            };
            let username = parsed
                .path_segments()
                .and_then(|mut segments| segments.find(|s| !s.is_empty() && *s != "company"))
                .map(|s| s.trim_start_matches('@').to_string());
            profiles.push(SocialProfile {
                platform,
                url: link.to_string(),
                username,
                followers: None,
                verified: None,
            });
        }
        profiles
    }

    fn extract_personnel(&self, content: &str) -> Vec<Person> {
        let mut people = Vec::new();
        for cap in PERSON_BEFORE_TITLE_RE.captures_iter(content) {
            people.push(Person {
                name: cap[1].to_string(),
                title: Some(cap[2].to_string()),
                linkedin: None,
                email: None,
                bio: None,
            });
        }
        for cap in TITLE_BEFORE_PERSON_RE.captures_iter(content) {
            people.push(Person {
                name: cap[2].to_string(),
                title: Some(cap[1].to_string()),
                linkedin: None,
                email: None,
                bio: None,
            });
        }
        people
    }

    fn extract_financials(&self, content: &str) -> Option<Financials> {
        let mut financials = Financials::default();
        for (re, label) in [
            (&*RAISED_RE, "funding_raised"),
            (&*REVENUE_RE, "revenue"),
            (&*VALUATION_RE, "valuation"),
        ] {
            if let Some(cap) = re.captures(content) {
                financials.items.push(FinancialItem {
                    label: label.to_string(),
                    amount: cap[1].trim().to_string(),
                });
            }
        }
        if let Some(cap) = INVESTORS_RE.captures(content) {
            financials.investors = cap[1]
                .split(|c| c == ',' || c == ';')
                .flat_map(|chunk| chunk.split(" and "))
                .map(|s| s.trim().trim_end_matches('.').to_string())
                .filter(|s| s.len() > 1 && s.len() < 60)
                .collect();
        }
        (!financials.is_empty()).then_some(financials)
    }

    fn extract_description(&self, content: &str, name: &str) -> Option<String> {
        let lower_name = name.to_lowercase();
        content
            .split(['.', '\n'])
            .map(str::trim)
            .find(|sentence| {
                sentence.len() > 40
                    && sentence.len() < 400
                    && sentence.to_lowercase().contains(&lower_name)
            })
            .map(|s| format!("{s}."))
    }

    /// Does the page URL's host look like it belongs to the company?
    fn host_matches_name(&self, url: &str, name: &str) -> bool {
        let Ok(parsed) = Url::parse(url) else {
            return false;
        };
        let Some(host) = parsed.host_str() else {
            return false;
        };
        let compact: String = name
            .to_lowercase()
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .collect();
        !compact.is_empty() && host.replace(['-', '_'], "").contains(&compact)
    }
}

impl CompanyParser for HeuristicCompanyParser {
    fn parse(&self, content: &str, url: &str, expected_name: &str) -> Option<ParsedCompany> {
        let trimmed = content.trim();
        if trimmed.len() < 50 || expected_name.trim().is_empty() {
            return None;
        }

        let mut record = CompanyRecord::new(expected_name.trim());
        let name_mentioned = trimmed
            .to_lowercase()
            .contains(&expected_name.trim().to_lowercase());

        record.basic.description = self.extract_description(trimmed, expected_name);

        if let Some(cap) = FOUNDED_RE.captures(trimmed) {
            if let Ok(year) = cap[1].parse::<i32>() {
                if (1800..=CURRENT_YEAR).contains(&year) {
                    record.basic.founded_year = Some(year);
                }
            }
        }

        if let Some(cap) = EMPLOYEES_RE.captures(trimmed) {
            if let Ok(count) = cap[1].replace(',', "").parse::<u64>() {
                record.basic.employee_count = Some(count);
                record.basic.size = Some(CompanySize::from_employee_count(count));
            }
        }

        if let Some(cap) = HEADQUARTERS_RE.captures(trimmed) {
            record.basic.headquarters = Some(cap[1].trim().to_string());
        }

        if let Some(cap) = STOCK_RE.captures(trimmed) {
            record.basic.stock_symbol = Some(cap[1].to_string());
            record.basic.is_public = Some(true);
        }

        if let Some(cap) = INDUSTRY_RE.captures(trimmed) {
            record.basic.industry = Some(cap[1].trim().to_string());
        }

        if self.host_matches_name(url, expected_name) {
            if let Ok(parsed) = Url::parse(url) {
                if let Some(host) = parsed.host_str() {
                    let domain = host.trim_start_matches("www.").to_string();
                    record.basic.website = Some(format!("https://{domain}"));
                    record.basic.domain = Some(domain);
                }
            }
        }

        record.contact = self.extract_contact(trimmed);
        record.social = self.extract_social(trimmed);
        record.personnel = self.extract_personnel(trimmed);
        record.financials = self.extract_financials(trimmed);
        record.normalize();

        // Confidence: name presence dominates, each populated section helps.
        let mut confidence: f64 = 0.05;
        if name_mentioned {
            confidence += 0.3;
        }
        if record.basic.domain.is_some() {
            confidence += 0.1;
        }
        let sections = [
            record.contact.is_some(),
            !record.social.is_empty(),
            !record.personnel.is_empty(),
            record.financials.is_some(),
            record.basic.founded_year.is_some() || record.basic.employee_count.is_some(),
            record.basic.description.is_some(),
        ];
        confidence += 0.08 * sections.iter().filter(|&&s| s).count() as f64;
        let confidence = confidence.min(1.0);

        // Completeness over the fields this parser knows how to fill.
        let tracked = [
            record.basic.description.is_some(),
            record.basic.industry.is_some(),
            record.basic.founded_year.is_some(),
            record.basic.employee_count.is_some(),
            record.basic.headquarters.is_some(),
            record.basic.domain.is_some(),
            record.contact.is_some(),
            !record.social.is_empty(),
            !record.personnel.is_empty(),
            record.financials.is_some(),
        ];
        let filled = tracked.iter().filter(|&&t| t).count();
        let completeness = filled as f64 / tracked.len() as f64;

        // Quality: validated contact points over extracted ones, blended with
        // whether the name checks out.
        let mut quality: f64 = if name_mentioned { 0.6 } else { 0.2 };
        if record.contact.is_some() {
            quality += 0.2;
        }
        if record.basic.domain.is_some() {
            quality += 0.2;
        }
        record.scores.confidence = confidence;
        record.scores.completeness = completeness;
        record.scores.data_quality = quality.min(1.0);

        debug!(
            url,
            confidence,
            completeness,
            sections = filled,
            "parsed company facts"
        );

        Some(ParsedCompany { record, confidence })
    }
}
