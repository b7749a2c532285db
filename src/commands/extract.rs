use anyhow::Result;
use tracing::info;

use firmscout_core::{AppConfig, ExtractRequest};

use crate::service::FirmscoutService;

#[allow(clippy::too_many_arguments)]
pub async fn run(
    config: AppConfig,
    company: String,
    domain: Option<String>,
    mode: String,
    country: String,
    language: String,
    max_pages: usize,
    timeout: u64,
    personnel: bool,
) -> Result<()> {
    let mut builder = ExtractRequest::builder(&company)
        .mode(mode.parse()?)
        .country(country)
        .language(language)
        .max_pages(max_pages)
        .timeout_s(timeout)
        .include_personnel(personnel);
    if let Some(domain) = domain {
        builder = builder.domain(domain);
    }
    let request = builder.build()?;

    let service = FirmscoutService::start(&config)?;
    let response = service.extract(request).await;
    info!(
        company = %company,
        success = response.success,
        pages = response.metadata.pages_crawled,
        elapsed_s = response.processing_time,
        "extraction finished"
    );
    println!("{}", serde_json::to_string_pretty(&response)?);
    service.shutdown().await;

    if response.success {
        Ok(())
    } else {
        anyhow::bail!("no company information found for '{company}'")
    }
}
