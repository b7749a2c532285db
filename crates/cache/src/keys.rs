//! Domain-tagged cache keys: `"{tag}:{md5(normalized inputs)}"`. Inputs are
//! lowercased, trimmed, and joined with `|` before hashing, so logically
//! equal lookups always land on the same key.

use firmscout_core::ExtractionMode;

fn fingerprint(tag: &str, parts: &[&str]) -> String {
    let normalized: Vec<String> = parts
        .iter()
        .map(|p| p.trim().to_lowercase())
        .collect();
    let digest = md5::compute(normalized.join("|").as_bytes());
    format!("{tag}:{digest:x}")
}

pub fn company_key(name: &str, domain: Option<&str>, mode: ExtractionMode) -> String {
    fingerprint("company", &[name, domain.unwrap_or(""), mode.as_str()])
}

pub fn serp_key(query: &str, country: &str, language: &str, page: u32) -> String {
    fingerprint("serp", &[query, country, language, &page.to_string()])
}

pub fn crawl_key(url: &str) -> String {
    fingerprint("crawl", &[url])
}

pub fn batch_key(names: &[String], mode: ExtractionMode) -> String {
    let mut sorted: Vec<String> = names.iter().map(|n| n.trim().to_lowercase()).collect();
    sorted.sort();
    sorted.push(mode.as_str().to_string());
    let digest = md5::compute(sorted.join("|").as_bytes());
    format!("batch:{digest:x}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_are_tagged_and_stable() {
        let a = company_key("Acme", Some("acme.com"), ExtractionMode::Basic);
        let b = company_key("  acme ", Some("ACME.COM"), ExtractionMode::Basic);
        assert!(a.starts_with("company:"));
        assert_eq!(a, b);
    }

    #[test]
    fn domain_presence_changes_the_key() {
        let with = company_key("Acme", Some("acme.com"), ExtractionMode::Basic);
        let without = company_key("Acme", None, ExtractionMode::Basic);
        assert_ne!(with, without);
    }

    #[test]
    fn serp_key_varies_by_page() {
        let p1 = serp_key("acme", "US", "en", 1);
        let p2 = serp_key("acme", "US", "en", 2);
        assert!(p1.starts_with("serp:"));
        assert_ne!(p1, p2);
    }

    #[test]
    fn batch_key_is_order_insensitive() {
        let a = batch_key(&["Acme".into(), "Globex".into()], ExtractionMode::Basic);
        let b = batch_key(&["globex".into(), "ACME".into()], ExtractionMode::Basic);
        assert_eq!(a, b);
    }
}
