use std::path::{Path, PathBuf};

use serde_json::{json, Value};
use tracing::info;

use firmscout_core::{ExtractError, ExtractResponse};

use crate::types::{BatchResult, ExportFormat};

const CSV_COLUMNS: [&str; 17] = [
    "company_name",
    "success",
    "processing_time",
    "description",
    "industry",
    "founded_year",
    "employee_count",
    "email",
    "phone",
    "address",
    "social_count",
    "personnel_count",
    "confidence_score",
    "data_quality_score",
    "completeness_score",
    "errors",
    "warnings",
];

fn row_values(company: &str, response: &ExtractResponse) -> Vec<Value> {
    let record = response.record.as_ref();
    let basic = record.map(|r| &r.basic);
    let contact = record.and_then(|r| r.contact.as_ref());
    let opt_str = |v: Option<&String>| v.map(|s| json!(s)).unwrap_or(Value::Null);
    vec![
        json!(company),
        json!(response.success),
        json!(response.processing_time),
        opt_str(basic.and_then(|b| b.description.as_ref())),
        opt_str(basic.and_then(|b| b.industry.as_ref())),
        basic
            .and_then(|b| b.founded_year)
            .map(|y| json!(y))
            .unwrap_or(Value::Null),
        basic
            .and_then(|b| b.employee_count)
            .map(|c| json!(c))
            .unwrap_or(Value::Null),
        opt_str(contact.and_then(|c| c.email.as_ref())),
        opt_str(contact.and_then(|c| c.phone.as_ref())),
        opt_str(contact.and_then(|c| c.address.as_ref())),
        json!(record.map(|r| r.social.len()).unwrap_or(0)),
        json!(record.map(|r| r.personnel.len()).unwrap_or(0)),
        json!(record.map(|r| r.scores.confidence).unwrap_or(0.0)),
        json!(record.map(|r| r.scores.data_quality).unwrap_or(0.0)),
        json!(record.map(|r| r.scores.completeness).unwrap_or(0.0)),
        json!(response
            .errors
            .iter()
            .map(|e| e.message.clone())
            .collect::<Vec<_>>()
            .join("; ")),
        json!(response.warnings.join("; ")),
    ]
}

fn cell_to_string(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn export_json(result: &BatchResult, path: &Path) -> Result<(), ExtractError> {
    let body = json!({
        "batch_info": {
            "batch_id": result.batch_id,
            "status": result.status,
            "total_companies": result.total,
            "successful_extractions": result.succeeded,
            "failed_extractions": result.failed,
            "created_at": result.created_at.to_rfc3339(),
            "processing_time": result.processing_time,
        },
        "summary_stats": result.summary,
        "companies": result
            .results
            .iter()
            .map(|(name, response)| json!({
                "company_name": name,
                "response": response,
            }))
            .collect::<Vec<_>>(),
    });
    let text = serde_json::to_string_pretty(&body)
        .map_err(|e| ExtractError::Unexpected(e.to_string()))?;
    std::fs::write(path, text).map_err(|e| ExtractError::Unexpected(e.to_string()))
}

fn export_csv(result: &BatchResult, path: &Path) -> Result<(), ExtractError> {
    let mut writer =
        csv::Writer::from_path(path).map_err(|e| ExtractError::Unexpected(e.to_string()))?;
    writer
        .write_record(CSV_COLUMNS)
        .map_err(|e| ExtractError::Unexpected(e.to_string()))?;
    for (company, response) in &result.results {
        let cells: Vec<String> = row_values(company, response)
            .iter()
            .map(cell_to_string)
            .collect();
        writer
            .write_record(&cells)
            .map_err(|e| ExtractError::Unexpected(e.to_string()))?;
    }
    writer
        .flush()
        .map_err(|e| ExtractError::Unexpected(e.to_string()))
}

/// CSV's column set with per-cell JSON typing kept intact.
fn export_tabular(result: &BatchResult, path: &Path) -> Result<(), ExtractError> {
    let body = json!({
        "batch_id": result.batch_id,
        "columns": CSV_COLUMNS,
        "rows": result
            .results
            .iter()
            .map(|(company, response)| Value::Array(row_values(company, response)))
            .collect::<Vec<_>>(),
        "summary_stats": result.summary,
    });
    let text = serde_json::to_string_pretty(&body)
        .map_err(|e| ExtractError::Unexpected(e.to_string()))?;
    std::fs::write(path, text).map_err(|e| ExtractError::Unexpected(e.to_string()))
}

/// Writes the batch result to `dir` in the requested format and returns the
/// file path.
pub fn write_export(
    result: &BatchResult,
    format: ExportFormat,
    dir: &Path,
) -> Result<PathBuf, ExtractError> {
    std::fs::create_dir_all(dir).map_err(|e| ExtractError::Unexpected(e.to_string()))?;
    let stamp = result.created_at.format("%Y%m%d_%H%M%S");
    let (ext, writer): (&str, fn(&BatchResult, &Path) -> Result<(), ExtractError>) = match format {
        ExportFormat::Json => ("json", export_json),
        ExportFormat::Csv => ("csv", export_csv),
        ExportFormat::Tabular => ("tabular.json", export_tabular),
    };
    let path = dir.join(format!("{}_{stamp}.{ext}", result.batch_id));
    writer(result, &path)?;
    info!(path = %path.display(), "batch export written");
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{BatchStatus, SummaryStats};
    use firmscout_core::{CompanyRecord, ExtractionMetadata, ExtractionMode, Scores};

    fn sample_result() -> BatchResult {
        let mut record = CompanyRecord::new("Acme");
        record.basic.industry = Some("Robotics".into());
        record.basic.founded_year = Some(2015);
        record.scores = Scores {
            confidence: 0.8,
            data_quality: 0.6,
            completeness: 0.5,
        };
        let ok = ExtractResponse {
            request_id: "r1".into(),
            company_name: "Acme".into(),
            success: true,
            record: Some(record),
            metadata: ExtractionMetadata::empty(ExtractionMode::Basic),
            errors: vec![],
            warnings: vec!["note".into()],
            processing_time: 1.5,
        };
        let failed = ExtractResponse {
            request_id: "r2".into(),
            company_name: "Globex".into(),
            success: false,
            record: None,
            metadata: ExtractionMetadata::empty(ExtractionMode::Basic),
            errors: vec![firmscout_core::ErrorEntry::new(
                firmscout_core::ErrorKind::CompanyNotFound,
                "nothing found",
            )],
            warnings: vec![],
            processing_time: 3.0,
        };
        BatchResult {
            batch_id: "batch-test".into(),
            status: BatchStatus::PartiallyCompleted,
            total: 2,
            succeeded: 1,
            failed: 1,
            results: vec![("Acme".into(), ok), ("Globex".into(), failed)],
            summary: SummaryStats::default(),
            processing_time: 4.5,
            created_at: chrono::Utc::now(),
            export_path: None,
        }
    }

    #[test]
    fn json_export_has_batch_info_and_companies() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_export(&sample_result(), ExportFormat::Json, dir.path()).unwrap();
        let body: Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(body["batch_info"]["total_companies"], 2);
        assert_eq!(body["companies"].as_array().unwrap().len(), 2);
        assert_eq!(body["companies"][0]["company_name"], "Acme");
    }

    #[test]
    fn csv_export_has_header_and_one_row_per_company() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_export(&sample_result(), ExportFormat::Csv, dir.path()).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("company_name,success,processing_time"));
        assert!(lines[1].starts_with("Acme,true,1.5"));
        assert!(lines[2].contains("nothing found"));
    }

    #[test]
    fn tabular_export_keeps_cell_types() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_export(&sample_result(), ExportFormat::Tabular, dir.path()).unwrap();
        let body: Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        let rows = body["rows"].as_array().unwrap();
        assert_eq!(rows.len(), 2);
        // success stays boolean, founded year stays numeric.
        assert_eq!(rows[0][1], Value::Bool(true));
        assert_eq!(rows[0][5], serde_json::json!(2015));
        assert!(rows[1][5].is_null());
    }
}
