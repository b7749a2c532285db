use serde::Deserialize;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub runtime: RuntimeConfig,
    #[serde(default)]
    pub limits: RateLimitConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub breaker: BreakerConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub crawler: CrawlerConfig,
    #[serde(default)]
    pub governor: GovernorConfig,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub export: ExportConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RuntimeConfig {
    #[serde(default = "default_max_extractions")]
    pub max_concurrent_extractions: usize,
    #[serde(default = "default_max_batches")]
    pub max_concurrent_batches: usize,
    /// How many times the recovery path may rebuild and re-run a failed
    /// request. The sources this models are ambiguous about the bound, so it
    /// is a knob rather than a constant.
    #[serde(default = "default_recovery_attempts")]
    pub recovery_attempts: u32,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            max_concurrent_extractions: default_max_extractions(),
            max_concurrent_batches: default_max_batches(),
            recovery_attempts: default_recovery_attempts(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct BucketConfig {
    pub capacity: u64,
    pub refill_rate: u64,
    #[serde(default = "default_refill_interval_ms")]
    pub refill_interval_ms: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RateLimitConfig {
    #[serde(default = "default_search_bucket")]
    pub search: BucketConfig,
    #[serde(default = "default_crawl_bucket")]
    pub crawl: BucketConfig,
    #[serde(default = "default_extraction_bucket")]
    pub extraction: BucketConfig,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            search: default_search_bucket(),
            crawl: default_crawl_bucket(),
            extraction: default_extraction_bucket(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    #[serde(default = "default_exp_base")]
    pub exp_base: f64,
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,
    #[serde(default = "default_jitter")]
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            exp_base: default_exp_base(),
            multiplier: default_multiplier(),
            jitter: default_jitter(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct BreakerConfig {
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,
    #[serde(default = "default_recovery_timeout_s")]
    pub recovery_timeout_s: u64,
    #[serde(default = "default_success_threshold")]
    pub success_threshold: u32,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: default_failure_threshold(),
            recovery_timeout_s: default_recovery_timeout_s(),
            success_threshold: default_success_threshold(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct CacheConfig {
    #[serde(default = "default_true")]
    pub enable: bool,
    #[serde(default = "default_ttl_company_s")]
    pub ttl_company_s: u64,
    #[serde(default = "default_ttl_serp_s")]
    pub ttl_serp_s: u64,
    #[serde(default = "default_ttl_crawl_s")]
    pub ttl_crawl_s: u64,
    #[serde(default = "default_ttl_batch_s")]
    pub ttl_batch_s: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enable: true,
            ttl_company_s: default_ttl_company_s(),
            ttl_serp_s: default_ttl_serp_s(),
            ttl_crawl_s: default_ttl_crawl_s(),
            ttl_batch_s: default_ttl_batch_s(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct CrawlerConfig {
    #[serde(default = "default_crawl_concurrency")]
    pub max_concurrent_fetches: usize,
    #[serde(default = "default_min_host_delay_s")]
    pub min_host_delay_s: u64,
    /// Host block after 429/503 responses.
    #[serde(default = "default_throttle_block_s")]
    pub throttle_block_s: u64,
    /// Host block after 401/403 responses.
    #[serde(default = "default_auth_block_s")]
    pub auth_block_s: u64,
    #[serde(default = "default_true")]
    pub enable_robots: bool,
    #[serde(default = "default_max_body_mb")]
    pub max_body_size_mb: usize,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_fetches: default_crawl_concurrency(),
            min_host_delay_s: default_min_host_delay_s(),
            throttle_block_s: default_throttle_block_s(),
            auth_block_s: default_auth_block_s(),
            enable_robots: true,
            max_body_size_mb: default_max_body_mb(),
            user_agent: default_user_agent(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct GovernorConfig {
    #[serde(default = "default_max_memory_mb")]
    pub max_memory_mb: u64,
    #[serde(default = "default_max_cpu_percent")]
    pub max_cpu_percent: f64,
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
    #[serde(default = "default_sample_interval_s")]
    pub sample_interval_s: u64,
}

impl Default for GovernorConfig {
    fn default() -> Self {
        Self {
            max_memory_mb: default_max_memory_mb(),
            max_cpu_percent: default_max_cpu_percent(),
            max_connections: default_max_connections(),
            sample_interval_s: default_sample_interval_s(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct SearchConfig {
    #[serde(default = "default_search_endpoint")]
    pub endpoint: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_search_timeout_s")]
    pub timeout_s: u64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            endpoint: default_search_endpoint(),
            api_key: String::new(),
            timeout_s: default_search_timeout_s(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ExportConfig {
    #[serde(default = "default_export_dir")]
    pub dir: String,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            dir: default_export_dir(),
        }
    }
}

fn default_max_extractions() -> usize { 5 }
fn default_max_batches() -> usize { 3 }
fn default_recovery_attempts() -> u32 { 1 }
fn default_refill_interval_ms() -> u64 { 1000 }
fn default_search_bucket() -> BucketConfig {
    BucketConfig { capacity: 10, refill_rate: 2, refill_interval_ms: 1000 }
}
fn default_crawl_bucket() -> BucketConfig {
    BucketConfig { capacity: 20, refill_rate: 5, refill_interval_ms: 1000 }
}
fn default_extraction_bucket() -> BucketConfig {
    BucketConfig { capacity: 10, refill_rate: 1, refill_interval_ms: 1000 }
}
fn default_max_attempts() -> u32 { 3 }
fn default_base_delay_ms() -> u64 { 1000 }
fn default_max_delay_ms() -> u64 { 60_000 }
fn default_exp_base() -> f64 { 2.0 }
fn default_multiplier() -> f64 { 1.0 }
fn default_jitter() -> bool { true }
fn default_failure_threshold() -> u32 { 5 }
fn default_recovery_timeout_s() -> u64 { 60 }
fn default_success_threshold() -> u32 { 2 }
fn default_true() -> bool { true }
fn default_ttl_company_s() -> u64 { 24 * 3600 }
fn default_ttl_serp_s() -> u64 { 6 * 3600 }
fn default_ttl_crawl_s() -> u64 { 12 * 3600 }
fn default_ttl_batch_s() -> u64 { 6 * 3600 }
fn default_crawl_concurrency() -> usize { 3 }
fn default_min_host_delay_s() -> u64 { 1 }
fn default_throttle_block_s() -> u64 { 24 * 3600 }
fn default_auth_block_s() -> u64 { 3600 }
fn default_max_body_mb() -> usize { 10 }
fn default_user_agent() -> String {
    "Mozilla/5.0 (Windows NT 10.0; rv:128.0) Gecko/20100101 Firefox/128.0".to_string()
}
fn default_max_memory_mb() -> u64 { 512 }
fn default_max_cpu_percent() -> f64 { 80.0 }
fn default_max_connections() -> usize { 100 }
fn default_sample_interval_s() -> u64 { 30 }
fn default_search_endpoint() -> String {
    "https://serpapi.example.com/search".to_string()
}
fn default_search_timeout_s() -> u64 { 15 }
fn default_export_dir() -> String { "exports".to_string() }
