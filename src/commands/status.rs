use anyhow::Result;

use firmscout_core::AppConfig;

use crate::service::FirmscoutService;

pub async fn run(config: AppConfig) -> Result<()> {
    let service = FirmscoutService::start(&config)?;
    let stats = service.service_stats();
    println!("{}", serde_json::to_string_pretty(&stats)?);
    service.shutdown().await;
    Ok(())
}
