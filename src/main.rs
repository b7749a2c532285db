mod cli;
mod commands;
mod service;

use anyhow::Result;
use clap::Parser;
use tracing::warn;

// mimalloc keeps memory from ballooning under many concurrent extractions.
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

use firmscout_core::AppConfig;

use crate::cli::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let config_str = std::fs::read_to_string(&cli.config).unwrap_or_else(|_| {
        warn!(path = %cli.config, "config file not found, using defaults");
        include_str!("../config/default.toml").to_string()
    });
    let mut config: AppConfig = toml::from_str(&config_str)?;

    // Environment overrides for the knobs that vary per deployment.
    if let Ok(v) = std::env::var("FIRMSCOUT_WORKERS") {
        if let Some(n) = v.parse::<usize>().ok().filter(|&n| n > 0 && n <= 64) {
            config.runtime.max_concurrent_extractions = n;
        }
    }
    if let Ok(v) = std::env::var("FIRMSCOUT_CACHE") {
        config.cache.enable = v != "0" && v.to_lowercase() != "false";
    }
    if let Ok(v) = std::env::var("SERP_API_KEY") {
        config.search.api_key = v;
    }
    if let Ok(v) = std::env::var("SERP_ENDPOINT") {
        config.search.endpoint = v;
    }

    match cli.command {
        Commands::Extract {
            company,
            domain,
            mode,
            country,
            language,
            max_pages,
            timeout,
            personnel,
        } => {
            commands::extract::run(
                config, company, domain, mode, country, language, max_pages, timeout, personnel,
            )
            .await?;
        }
        Commands::Batch {
            names,
            mode,
            priority,
            format,
            output,
        } => {
            commands::batch::run(config, names, mode, priority, format, output).await?;
        }
        Commands::Status => {
            commands::status::run(config).await?;
        }
    }

    Ok(())
}
