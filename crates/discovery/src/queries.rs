use firmscout_core::{ExtractRequest, ExtractionMode};

/// At most this many queries ever reach the search provider.
pub const MAX_QUERIES: usize = 3;

/// Deterministic query set for a request. Order matters: the cheapest,
/// highest-yield queries come first because only the first [`MAX_QUERIES`]
/// are executed.
pub fn generate_queries(request: &ExtractRequest) -> Vec<String> {
    let name = &request.company_name;
    let mut queries = vec![format!("\"{name}\" company information")];

    if let Some(domain) = &request.domain {
        queries.push(format!("\"{name}\" site:{domain}"));
    }

    if matches!(
        request.mode,
        ExtractionMode::Comprehensive | ExtractionMode::ContactFocused
    ) {
        queries.push(format!("\"{name}\" contact information"));
        queries.push(format!("\"{name}\" address phone email"));
        queries.push(format!("\"{name}\" about us"));
    }

    if matches!(
        request.mode,
        ExtractionMode::Comprehensive | ExtractionMode::FinancialFocused
    ) {
        queries.push(format!("\"{name}\" funding investors"));
        queries.push(format!("\"{name}\" revenue valuation"));
        queries.push(format!("\"{name}\" crunchbase"));
    }

    if request.include_social {
        queries.push(format!("\"{name}\" linkedin"));
        queries.push(format!("\"{name}\" twitter"));
        queries.push(format!("\"{name}\" social media"));
    }

    if request.include_personnel {
        queries.push(format!("\"{name}\" CEO founder"));
        queries.push(format!("\"{name}\" leadership team"));
        queries.push(format!("\"{name}\" executives"));
    }

    queries
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_query_always_first() {
        let req = ExtractRequest::builder("Acme")
            .mode(ExtractionMode::Basic)
            .include_social(false)
            .build()
            .unwrap();
        let queries = generate_queries(&req);
        assert_eq!(queries, vec!["\"Acme\" company information".to_string()]);
    }

    #[test]
    fn domain_hint_adds_site_query() {
        let req = ExtractRequest::builder("Acme")
            .domain("acme.com")
            .mode(ExtractionMode::Basic)
            .include_social(false)
            .build()
            .unwrap();
        let queries = generate_queries(&req);
        assert_eq!(queries[1], "\"Acme\" site:acme.com");
    }

    #[test]
    fn comprehensive_mode_covers_contact_and_financial() {
        let req = ExtractRequest::builder("Acme").build().unwrap();
        let queries = generate_queries(&req);
        assert!(queries.iter().any(|q| q.contains("contact information")));
        assert!(queries.iter().any(|q| q.contains("funding investors")));
        assert!(queries.iter().any(|q| q.contains("linkedin")));
    }

    #[test]
    fn personnel_flag_adds_leadership_queries() {
        let req = ExtractRequest::builder("Acme")
            .mode(ExtractionMode::Basic)
            .include_social(false)
            .include_personnel(true)
            .build()
            .unwrap();
        let queries = generate_queries(&req);
        assert!(queries.iter().any(|q| q.contains("CEO founder")));
    }

    #[test]
    fn deterministic_for_equal_requests() {
        let req = ExtractRequest::builder("Acme").build().unwrap();
        assert_eq!(generate_queries(&req), generate_queries(&req));
    }
}
