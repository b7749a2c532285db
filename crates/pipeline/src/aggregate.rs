use firmscout_core::{CompanyRecord, Scores};
use tracing::debug;

/// Partials at or below this confidence are discarded before merging.
pub const MIN_PARSE_CONFIDENCE: f64 = 0.1;

/// One parser output attributed to its source page.
#[derive(Debug, Clone)]
pub struct SourcePartial {
    pub url: String,
    pub record: CompanyRecord,
    pub confidence: f64,
}

fn fill<T>(target: &mut Option<T>, source: Option<T>) {
    if target.is_none() {
        *target = source;
    }
}

/// Folds `other` into `base`. Scalars fill only when missing; collections
/// append here and are deduplicated by the final normalize pass, whose rules
/// (verified social wins, first personnel wins) depend on `base` having been
/// the highest-confidence source.
fn merge_into(base: &mut CompanyRecord, other: CompanyRecord) {
    let basic = &mut base.basic;
    let other_basic = other.basic;
    fill(&mut basic.legal_name, other_basic.legal_name);
    fill(&mut basic.domain, other_basic.domain);
    fill(&mut basic.website, other_basic.website);
    fill(&mut basic.description, other_basic.description);
    fill(&mut basic.tagline, other_basic.tagline);
    fill(&mut basic.industry, other_basic.industry);
    fill(&mut basic.sector, other_basic.sector);
    fill(&mut basic.founded_year, other_basic.founded_year);
    fill(&mut basic.stock_symbol, other_basic.stock_symbol);
    fill(&mut basic.is_public, other_basic.is_public);
    fill(&mut basic.headquarters, other_basic.headquarters.clone());
    if basic.employee_count.is_none() {
        basic.employee_count = other_basic.employee_count;
        basic.size = other_basic.size;
    }
    basic.locations.extend(other_basic.locations);
    if let Some(hq) = other_basic.headquarters {
        basic.locations.push(hq);
    }

    base.social.extend(other.social);
    base.personnel.extend(other.personnel);

    match (&mut base.contact, other.contact) {
        (Some(contact), Some(other_contact)) => {
            fill(&mut contact.email, other_contact.email);
            fill(&mut contact.phone, other_contact.phone);
            if contact.address.is_none() && other_contact.address.is_some() {
                contact.address = other_contact.address;
                contact.city = other_contact.city;
                contact.state = other_contact.state;
                contact.country = other_contact.country;
                contact.postal_code = other_contact.postal_code;
            }
            contact.additional_emails.extend(other_contact.additional_emails);
            contact.additional_phones.extend(other_contact.additional_phones);
        }
        (contact @ None, Some(other_contact)) => *contact = Some(other_contact),
        _ => {}
    }

    match (&mut base.financials, other.financials) {
        (Some(financials), Some(other_fin)) => {
            for item in other_fin.items {
                if !financials.items.iter().any(|i| i.label == item.label) {
                    financials.items.push(item);
                }
            }
            for investor in other_fin.investors {
                if !financials.investors.contains(&investor) {
                    financials.investors.push(investor);
                }
            }
        }
        (financials @ None, Some(other_fin)) => *financials = Some(other_fin),
        _ => {}
    }
}

/// Merges per-source partials into one record. The highest-confidence source
/// is the base; the rest contribute fill-if-missing scalars and merged
/// collections. Final scores are recomputed: mean confidence plus a
/// multi-source bonus capped at 0.3, per-source maxima for quality and
/// completeness. Returns `None` when nothing clears the confidence floor.
pub fn aggregate(mut partials: Vec<SourcePartial>) -> Option<CompanyRecord> {
    partials.retain(|p| p.confidence > MIN_PARSE_CONFIDENCE);
    if partials.is_empty() {
        return None;
    }

    // Stable sort: equal-confidence sources keep their crawl ranking.
    partials.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let n = partials.len();
    let mean_confidence = partials.iter().map(|p| p.confidence).sum::<f64>() / n as f64;
    let bonus = (0.1 * (n as f64 - 1.0)).min(0.3);
    let data_quality = partials
        .iter()
        .map(|p| p.record.scores.data_quality)
        .fold(0.0, f64::max);
    let completeness = partials
        .iter()
        .map(|p| p.record.scores.completeness)
        .fold(0.0, f64::max);

    let mut sources = partials.into_iter();
    let base = sources.next()?;
    let mut record = base.record;
    if let Some(hq) = record.basic.headquarters.clone() {
        record.basic.locations.push(hq);
    }
    for partial in sources {
        merge_into(&mut record, partial.record);
    }

    record.scores = Scores {
        confidence: (mean_confidence + bonus).min(1.0),
        data_quality,
        completeness,
    };
    record.normalize();

    debug!(
        sources = n,
        confidence = record.scores.confidence,
        "aggregated company record"
    );
    Some(record)
}

#[cfg(test)]
mod tests {
    use super::*;
    use firmscout_core::{ContactInfo, Person, SocialPlatform, SocialProfile};

    fn partial(url: &str, confidence: f64, record: CompanyRecord) -> SourcePartial {
        SourcePartial {
            url: url.to_string(),
            record,
            confidence,
        }
    }

    fn record_with(name: &str, f: impl FnOnce(&mut CompanyRecord)) -> CompanyRecord {
        let mut record = CompanyRecord::new(name);
        f(&mut record);
        record
    }

    fn social(platform: SocialPlatform, url: &str, verified: Option<bool>) -> SocialProfile {
        SocialProfile {
            platform,
            url: url.to_string(),
            username: None,
            followers: None,
            verified,
        }
    }

    fn person(name: &str, title: &str) -> Person {
        Person {
            name: name.to_string(),
            title: Some(title.to_string()),
            linkedin: None,
            email: None,
            bio: None,
        }
    }

    #[test]
    fn empty_and_low_confidence_yield_none() {
        assert!(aggregate(vec![]).is_none());
        let weak = partial("u", 0.1, CompanyRecord::new("Acme"));
        assert!(aggregate(vec![weak]).is_none());
    }

    #[test]
    fn single_source_keeps_fields_and_recomputes_scores() {
        let mut record = CompanyRecord::new("Acme");
        record.basic.founded_year = Some(2010);
        record.scores.data_quality = 0.8;
        record.scores.completeness = 0.4;
        let merged = aggregate(vec![partial("u", 0.7, record)]).unwrap();
        assert_eq!(merged.basic.founded_year, Some(2010));
        // n=1: no bonus, confidence is the parse confidence itself.
        assert!((merged.scores.confidence - 0.7).abs() < 1e-9);
        assert!((merged.scores.data_quality - 0.8).abs() < 1e-9);
    }

    #[test]
    fn duplicate_source_is_idempotent_up_to_the_bonus() {
        let make = || {
            record_with("Acme", |r| {
                r.basic.founded_year = Some(2010);
                r.basic.headquarters = Some("Berlin".into());
                r.social = vec![social(
                    SocialPlatform::Twitter,
                    "https://twitter.com/acme",
                    None,
                )];
                r.personnel = vec![person("Jane Doe", "CEO")];
            })
        };
        let merged = aggregate(vec![
            partial("u1", 0.6, make()),
            partial("u2", 0.6, make()),
        ])
        .unwrap();
        assert_eq!(merged.basic.founded_year, Some(2010));
        assert_eq!(merged.social.len(), 1);
        assert_eq!(merged.personnel.len(), 1);
        assert!(merged.basic.locations.is_empty());
        // mean 0.6 + bonus 0.1 for the second source.
        assert!((merged.scores.confidence - 0.7).abs() < 1e-9);
    }

    #[test]
    fn base_is_highest_confidence_and_scalars_fill_missing() {
        let strong = record_with("Acme Inc", |r| {
            r.basic.description = Some("from the strong source".into());
        });
        let weak = record_with("Acme", |r| {
            r.basic.description = Some("from the weak source".into());
            r.basic.founded_year = Some(1999);
        });
        let merged = aggregate(vec![
            partial("weak", 0.3, weak),
            partial("strong", 0.9, strong),
        ])
        .unwrap();
        assert_eq!(merged.basic.name, "Acme Inc");
        assert_eq!(
            merged.basic.description.as_deref(),
            Some("from the strong source")
        );
        assert_eq!(merged.basic.founded_year, Some(1999));
    }

    #[test]
    fn verified_social_supersedes_unverified() {
        let base = record_with("Acme", |r| {
            r.social = vec![social(
                SocialPlatform::Linkedin,
                "https://linkedin.com/company/acme-old",
                None,
            )];
        });
        let other = record_with("Acme", |r| {
            r.social = vec![social(
                SocialPlatform::Linkedin,
                "https://linkedin.com/company/acme",
                Some(true),
            )];
        });
        let merged = aggregate(vec![partial("a", 0.8, base), partial("b", 0.4, other)]).unwrap();
        assert_eq!(merged.social.len(), 1);
        assert_eq!(merged.social[0].url, "https://linkedin.com/company/acme");
    }

    #[test]
    fn personnel_first_write_wins() {
        let base = record_with("Acme", |r| {
            r.personnel = vec![person("Jane Doe", "CEO")];
        });
        let other = record_with("Acme", |r| {
            r.personnel = vec![person("jane doe", "Intern"), person("Bob Roe", "CTO")];
        });
        let merged = aggregate(vec![partial("a", 0.8, base), partial("b", 0.4, other)]).unwrap();
        assert_eq!(merged.personnel.len(), 2);
        let jane = merged
            .personnel
            .iter()
            .find(|p| p.name.eq_ignore_ascii_case("jane doe"))
            .unwrap();
        assert_eq!(jane.title.as_deref(), Some("CEO"));
    }

    #[test]
    fn locations_union_excludes_headquarters() {
        let base = record_with("Acme", |r| {
            r.basic.headquarters = Some("Berlin".into());
            r.basic.locations = vec!["Paris".into()];
        });
        let other = record_with("Acme", |r| {
            r.basic.headquarters = Some("Amsterdam".into());
            r.basic.locations = vec!["Berlin".into(), "Oslo".into()];
        });
        let merged = aggregate(vec![partial("a", 0.8, base), partial("b", 0.4, other)]).unwrap();
        assert_eq!(merged.basic.headquarters.as_deref(), Some("Berlin"));
        assert_eq!(
            merged.basic.locations,
            vec!["Amsterdam".to_string(), "Oslo".to_string(), "Paris".to_string()]
        );
    }

    #[test]
    fn contact_scalars_first_non_empty_wins() {
        let base = record_with("Acme", |r| {
            r.contact = Some(ContactInfo {
                email: Some("info@acme.com".into()),
                ..ContactInfo::default()
            });
        });
        let other = record_with("Acme", |r| {
            r.contact = Some(ContactInfo {
                email: Some("other@acme.com".into()),
                phone: Some("+1 555 010 2030".into()),
                ..ContactInfo::default()
            });
        });
        let merged = aggregate(vec![partial("a", 0.8, base), partial("b", 0.4, other)]).unwrap();
        let contact = merged.contact.unwrap();
        assert_eq!(contact.email.as_deref(), Some("info@acme.com"));
        assert_eq!(contact.phone.as_deref(), Some("+1 555 010 2030"));
    }

    #[test]
    fn confidence_bonus_caps_at_point_three() {
        let partials: Vec<SourcePartial> = (0..6)
            .map(|i| partial(&format!("u{i}"), 0.5, CompanyRecord::new("Acme")))
            .collect();
        let merged = aggregate(partials).unwrap();
        assert!((merged.scores.confidence - 0.8).abs() < 1e-9);
    }

    #[test]
    fn quality_and_completeness_take_the_max() {
        let mut a = CompanyRecord::new("Acme");
        a.scores.data_quality = 0.9;
        a.scores.completeness = 0.2;
        let mut b = CompanyRecord::new("Acme");
        b.scores.data_quality = 0.3;
        b.scores.completeness = 0.7;
        let merged = aggregate(vec![partial("a", 0.8, a), partial("b", 0.4, b)]).unwrap();
        assert!((merged.scores.data_quality - 0.9).abs() < 1e-9);
        assert!((merged.scores.completeness - 0.7).abs() < 1e-9);
    }
}
