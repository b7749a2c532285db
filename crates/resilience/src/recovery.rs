use tracing::info;

use firmscout_core::{ExtractRequest, ExtractionMode};

use crate::classify::FailureClass;

const NAME_SUFFIXES: [&str; 5] = ["inc", "llc", "corp", "co", "company"];

/// A rebuilt request plus the pipeline-level knobs recovery is allowed to
/// turn. Applied once (by default) after the outer retry budget is spent.
#[derive(Debug, Clone)]
pub struct RecoveryPlan {
    pub request: ExtractRequest,
    /// Lowered crawl concurrency for the re-run, when rate limiting was the
    /// problem.
    pub crawl_concurrency: Option<usize>,
    /// Factor applied to the retry base delay on the re-run.
    pub retry_base_factor: f64,
    pub note: String,
}

/// Company-name variants with common corporate suffixes stripped, original
/// first. "Acme Corp." yields ["Acme Corp.", "Acme"].
pub fn name_variants(name: &str) -> Vec<String> {
    let mut variants = vec![name.trim().to_string()];
    let mut current = name.trim().to_string();
    loop {
        let lower = current.to_lowercase();
        // Byte offsets below assume the lowercased form has the same length;
        // bail out for the rare scripts where it does not.
        if lower.len() != current.len() {
            break;
        }
        let mut stripped = None;
        for suffix in NAME_SUFFIXES {
            for sep in [", ", " "] {
                let tail = format!("{sep}{suffix}");
                if let Some(base) = lower
                    .strip_suffix(&format!("{tail}."))
                    .or_else(|| lower.strip_suffix(&tail))
                {
                    stripped = Some(current[..base.len()].trim_end_matches([',', ' ']).to_string());
                    break;
                }
            }
            if stripped.is_some() {
                break;
            }
        }
        match stripped {
            Some(s) if !s.is_empty() && s != current => {
                current = s.clone();
                if !variants.contains(&s) {
                    variants.push(s);
                }
            }
            _ => break,
        }
    }
    variants
}

/// Builds the modified request for one recovery pass, or `None` when the
/// failure class has no strategy.
pub fn attempt_recovery(
    class: FailureClass,
    request: &ExtractRequest,
    crawl_concurrency: usize,
) -> Option<RecoveryPlan> {
    let mut modified = request.clone();
    match class {
        FailureClass::Timeout => {
            modified.timeout_s = ((modified.timeout_s as f64 * 0.7) as u64).max(10);
            modified.max_pages = (modified.max_pages / 2).max(1);
            modified.mode = ExtractionMode::Basic;
            info!(
                timeout_s = modified.timeout_s,
                max_pages = modified.max_pages,
                "recovery: reduced timeout, fewer pages, basic mode"
            );
            Some(RecoveryPlan {
                request: modified,
                crawl_concurrency: None,
                retry_base_factor: 1.0,
                note: "reduced timeout and scope after timeouts".into(),
            })
        }
        FailureClass::RateLimit => {
            let lowered = (crawl_concurrency / 2).max(1);
            info!(crawl_concurrency = lowered, "recovery: lowered concurrency, doubled backoff");
            Some(RecoveryPlan {
                request: modified,
                crawl_concurrency: Some(lowered),
                retry_base_factor: 2.0,
                note: "lowered concurrency after rate limiting".into(),
            })
        }
        FailureClass::DataQuality => {
            modified.mode = ExtractionMode::Comprehensive;
            modified.include_social = true;
            modified.include_personnel = true;
            modified.max_pages = (modified.max_pages + 2).min(10);
            info!(max_pages = modified.max_pages, "recovery: widened extraction scope");
            Some(RecoveryPlan {
                request: modified,
                crawl_concurrency: None,
                retry_base_factor: 1.0,
                note: "widened scope after low-quality data".into(),
            })
        }
        FailureClass::NotFound => {
            modified.domain = None;
            let variants = name_variants(&modified.company_name);
            if let Some(variant) = variants.into_iter().find(|v| *v != modified.company_name) {
                info!(variant = %variant, "recovery: retrying with simplified name");
                modified.company_name = variant;
            } else if request.domain.is_none() {
                // Nothing left to vary.
                return None;
            }
            Some(RecoveryPlan {
                request: modified,
                crawl_concurrency: None,
                retry_base_factor: 1.0,
                note: "dropped domain hint and simplified name".into(),
            })
        }
        FailureClass::Transient | FailureClass::Permanent => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> ExtractRequest {
        ExtractRequest::builder("Acme Corp")
            .domain("acme.com")
            .timeout_s(30)
            .max_pages(8)
            .build()
            .unwrap()
    }

    #[test]
    fn variants_strip_suffixes() {
        assert_eq!(name_variants("Acme Corp"), vec!["Acme Corp", "Acme"]);
        assert_eq!(
            name_variants("Widgets, Inc."),
            vec!["Widgets, Inc.", "Widgets"]
        );
        assert_eq!(name_variants("Plainname"), vec!["Plainname"]);
    }

    #[test]
    fn timeout_recovery_shrinks_the_request() {
        let plan = attempt_recovery(FailureClass::Timeout, &request(), 3).unwrap();
        assert_eq!(plan.request.timeout_s, 21);
        assert_eq!(plan.request.max_pages, 4);
        assert_eq!(plan.request.mode, ExtractionMode::Basic);
    }

    #[test]
    fn timeout_recovery_floors_at_ten_seconds() {
        let mut req = request();
        req.timeout_s = 12;
        let plan = attempt_recovery(FailureClass::Timeout, &req, 3).unwrap();
        assert_eq!(plan.request.timeout_s, 10);
    }

    #[test]
    fn rate_limit_recovery_halves_concurrency() {
        let plan = attempt_recovery(FailureClass::RateLimit, &request(), 3).unwrap();
        assert_eq!(plan.crawl_concurrency, Some(1));
        assert_eq!(plan.retry_base_factor, 2.0);
    }

    #[test]
    fn data_quality_recovery_widens_scope() {
        let plan = attempt_recovery(FailureClass::DataQuality, &request(), 3).unwrap();
        assert_eq!(plan.request.mode, ExtractionMode::Comprehensive);
        assert!(plan.request.include_personnel);
        assert_eq!(plan.request.max_pages, 10);
    }

    #[test]
    fn not_found_recovery_drops_domain_and_simplifies_name() {
        let plan = attempt_recovery(FailureClass::NotFound, &request(), 3).unwrap();
        assert_eq!(plan.request.domain, None);
        assert_eq!(plan.request.company_name, "Acme");
    }

    #[test]
    fn not_found_without_levers_returns_none() {
        let req = ExtractRequest::builder("Plainname").build().unwrap();
        assert!(attempt_recovery(FailureClass::NotFound, &req, 3).is_none());
    }

    #[test]
    fn permanent_failures_have_no_strategy() {
        assert!(attempt_recovery(FailureClass::Permanent, &request(), 3).is_none());
    }
}
