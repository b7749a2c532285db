use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "firmscout", about = "Company intelligence extraction from the open web")]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "config/default.toml")]
    pub config: String,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Extract one company's record and print it as JSON
    Extract {
        /// Company name to search for
        company: String,

        /// Known company domain (improves URL ranking)
        #[arg(short, long)]
        domain: Option<String>,

        /// Extraction mode: basic, comprehensive, contact, financial
        #[arg(short, long, default_value = "comprehensive")]
        mode: String,

        /// ISO 3166-1 alpha-2 country for search
        #[arg(long, default_value = "US")]
        country: String,

        /// ISO 639-1 language for search
        #[arg(long, default_value = "en")]
        language: String,

        /// Maximum pages to crawl (1-20)
        #[arg(long, default_value = "5")]
        max_pages: usize,

        /// Per-fetch timeout in seconds (5-120)
        #[arg(long, default_value = "30")]
        timeout: u64,

        /// Also extract key personnel
        #[arg(long)]
        personnel: bool,
    },
    /// Extract many companies and export the results
    Batch {
        /// Company names (comma-separated, or a file with one per line)
        names: String,

        /// Extraction mode for every company
        #[arg(short, long, default_value = "comprehensive")]
        mode: String,

        /// Scheduling priority: urgent, high, normal, low
        #[arg(short, long, default_value = "normal")]
        priority: String,

        /// Export format: json, csv, tabular
        #[arg(short, long, default_value = "json")]
        format: String,

        /// Export directory (overrides the config)
        #[arg(short, long)]
        output: Option<String>,
    },
    /// Show rate-limiter, breaker, cache, queue, and governor views
    Status,
}
