use std::collections::HashMap;

use firmscout_core::ExtractResponse;

use crate::types::SummaryStats;

/// Summary over a finished batch's responses. Distributions only consider
/// successful records.
pub fn summarize(results: &[(String, ExtractResponse)]) -> SummaryStats {
    let total = results.len();
    let successful: Vec<&ExtractResponse> = results
        .iter()
        .map(|(_, r)| r)
        .filter(|r| r.success && r.record.is_some())
        .collect();

    let mut industry_distribution: HashMap<String, usize> = HashMap::new();
    let mut size_distribution: HashMap<String, usize> = HashMap::new();
    let mut with_contact_info = 0;
    let mut with_social_media = 0;
    let mut with_personnel = 0;
    let mut confidence_sum = 0.0;

    for response in &successful {
        let record = response.record.as_ref().expect("filtered on is_some");
        confidence_sum += record.scores.confidence;
        if let Some(industry) = &record.basic.industry {
            *industry_distribution.entry(industry.clone()).or_default() += 1;
        }
        if let Some(size) = record.basic.size {
            *size_distribution.entry(size.as_str().to_string()).or_default() += 1;
        }
        if record.contact.is_some() {
            with_contact_info += 1;
        }
        if !record.social.is_empty() {
            with_social_media += 1;
        }
        if !record.personnel.is_empty() {
            with_personnel += 1;
        }
    }

    let processing_sum: f64 = results.iter().map(|(_, r)| r.processing_time).sum();

    SummaryStats {
        total_companies: total,
        successful_extractions: successful.len(),
        success_rate: if total > 0 {
            successful.len() as f64 / total as f64
        } else {
            0.0
        },
        avg_confidence: if successful.is_empty() {
            0.0
        } else {
            confidence_sum / successful.len() as f64
        },
        avg_processing_time: if total > 0 {
            processing_sum / total as f64
        } else {
            0.0
        },
        industry_distribution,
        size_distribution,
        with_contact_info,
        with_social_media,
        with_personnel,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use firmscout_core::{CompanyRecord, CompanySize, ExtractionMetadata, ExtractionMode, Scores};

    fn response(name: &str, success: bool, industry: Option<&str>) -> (String, ExtractResponse) {
        let record = success.then(|| {
            let mut record = CompanyRecord::new(name);
            record.basic.industry = industry.map(str::to_string);
            record.basic.size = Some(CompanySize::Small);
            record.scores = Scores {
                confidence: 0.8,
                data_quality: 0.5,
                completeness: 0.5,
            };
            record
        });
        (
            name.to_string(),
            ExtractResponse {
                request_id: "r".into(),
                company_name: name.to_string(),
                success,
                record,
                metadata: ExtractionMetadata::empty(ExtractionMode::Basic),
                errors: vec![],
                warnings: vec![],
                processing_time: 2.0,
            },
        )
    }

    #[test]
    fn summarizes_distributions_and_rates() {
        let results = vec![
            response("A", true, Some("Robotics")),
            response("B", true, Some("Robotics")),
            response("C", false, None),
        ];
        let stats = summarize(&results);
        assert_eq!(stats.total_companies, 3);
        assert_eq!(stats.successful_extractions, 2);
        assert!((stats.success_rate - 2.0 / 3.0).abs() < 1e-9);
        assert_eq!(stats.industry_distribution["Robotics"], 2);
        assert_eq!(stats.size_distribution["small"], 2);
        assert!((stats.avg_confidence - 0.8).abs() < 1e-9);
        assert!((stats.avg_processing_time - 2.0).abs() < 1e-9);
    }

    #[test]
    fn empty_results_are_all_zero() {
        let stats = summarize(&[]);
        assert_eq!(stats.total_companies, 0);
        assert_eq!(stats.success_rate, 0.0);
    }
}
