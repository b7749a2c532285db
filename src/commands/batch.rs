use std::time::Duration;

use anyhow::Result;
use tracing::info;

use firmscout_batch::BatchSubmission;
use firmscout_core::AppConfig;

use crate::service::FirmscoutService;

/// Company names from a file (one per line) or a comma-separated argument.
fn load_names(names: &str) -> Result<Vec<String>> {
    if std::path::Path::new(names).exists() {
        let content = std::fs::read_to_string(names)?;
        Ok(content
            .lines()
            .map(|l| l.trim().to_string())
            .filter(|l| !l.is_empty())
            .collect())
    } else {
        Ok(names.split(',').map(|s| s.trim().to_string()).collect())
    }
}

pub async fn run(
    mut config: AppConfig,
    names: String,
    mode: String,
    priority: String,
    format: String,
    output: Option<String>,
) -> Result<()> {
    if let Some(dir) = output {
        config.export.dir = dir;
    }
    let company_names = load_names(&names)?;
    info!(companies = company_names.len(), "batch submission");

    let mut submission = BatchSubmission::new(company_names);
    submission.mode = mode.parse()?;
    submission.priority = priority.parse()?;
    submission.export_format = format.parse()?;

    let service = FirmscoutService::start(&config)?;
    let batch_id = service.orchestrator.submit_batch(submission)?;
    println!("batch {batch_id} submitted");

    loop {
        tokio::time::sleep(Duration::from_secs(1)).await;
        let Some(status) = service.orchestrator.batch_status(&batch_id) else {
            anyhow::bail!("batch {batch_id} disappeared");
        };
        if let Some(progress) = &status.progress {
            println!(
                "progress: {}/{} done ({} failed, {} processing, {} queued)",
                progress.completed + progress.failed,
                progress.total,
                progress.failed,
                progress.processing,
                progress.queued,
            );
        }
        if status.status.is_terminal() {
            break;
        }
    }

    let result = service
        .orchestrator
        .batch_result(&batch_id)
        .ok_or_else(|| anyhow::anyhow!("batch {batch_id} finished without a result"))?;
    println!(
        "batch {:?}: {} succeeded, {} failed of {}",
        result.status, result.succeeded, result.failed, result.total
    );
    println!("{}", serde_json::to_string_pretty(&result.summary)?);
    if let Some(path) = &result.export_path {
        println!("export written to {path}");
    }

    service.shutdown().await;
    Ok(())
}
