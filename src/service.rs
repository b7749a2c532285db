use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use serde::Serialize;

use firmscout_batch::{BatchOrchestrator, BatchStats};
use firmscout_cache::MemoryCache;
use firmscout_core::{
    AppConfig, Cache, CacheStats, ExtractRequest, ExtractResponse, Extractor, ResourceGauges,
};
use firmscout_crawl::{AllowAll, HttpPageFetcher, RobotsPolicy};
use firmscout_discovery::HttpSearchProvider;
use firmscout_governor::{ConnectionPool, Mitigations, ResourceGovernor};
use firmscout_parser::HeuristicCompanyParser;
use firmscout_pipeline::CompanyExtractor;
use firmscout_resilience::{BreakerRegistry, BreakerSnapshot, BucketStatus, RateLimiters};
use firmscout_runtime::{ExtractionRuntime, QueueStats};

/// One aggregate view over every subsystem, for the status command.
#[derive(Debug, Clone, Serialize)]
pub struct ServiceStats {
    pub rate_limiters: Vec<BucketStatus>,
    pub breakers: Vec<BreakerSnapshot>,
    pub cache: CacheStats,
    pub queue: QueueStats,
    pub batches: BatchStats,
    pub health: firmscout_governor::HealthView,
}

/// Fully wired service: live collaborators plugged into the pipeline,
/// runtime, orchestrator, and governor.
pub struct FirmscoutService {
    cache: Option<Arc<MemoryCache>>,
    limiters: Arc<RateLimiters>,
    breakers: Arc<BreakerRegistry>,
    extractor: Arc<CompanyExtractor>,
    pub runtime: Arc<ExtractionRuntime>,
    pub orchestrator: Arc<BatchOrchestrator>,
    pub governor: Arc<ResourceGovernor>,
}

impl FirmscoutService {
    pub fn start(config: &AppConfig) -> Result<Self> {
        let gauges = ResourceGauges::new();
        let cache = config.cache.enable.then(|| Arc::new(MemoryCache::new()));
        let dyn_cache: Option<Arc<dyn Cache>> = cache.clone().map(|c| c as Arc<dyn Cache>);
        let limiters = Arc::new(RateLimiters::from_config(&config.limits));
        let breakers = Arc::new(BreakerRegistry::from_config(&config.breaker));

        let search = Arc::new(HttpSearchProvider::new(&config.search)?);
        let fetcher = Arc::new(HttpPageFetcher::new(&config.crawler)?);
        let parser = Arc::new(HeuristicCompanyParser::new());
        // No robots collaborator ships with the CLI; the hook stays open for
        // embedders and defaults to allow-everything when enabled.
        let robots: Option<Arc<dyn RobotsPolicy>> = config
            .crawler
            .enable_robots
            .then(|| Arc::new(AllowAll) as Arc<dyn RobotsPolicy>);

        let extractor = Arc::new(CompanyExtractor::new(
            config,
            search,
            fetcher,
            parser,
            dyn_cache.clone(),
            robots,
            &limiters,
            Arc::clone(&breakers),
            Some(Arc::clone(&gauges)),
        ));

        let runtime = ExtractionRuntime::start(
            Arc::clone(&extractor) as Arc<dyn Extractor>,
            Arc::clone(&limiters.extraction),
            config.runtime.max_concurrent_extractions,
            Some(Arc::clone(&gauges)),
        );

        let orchestrator = BatchOrchestrator::start(
            Arc::clone(&runtime),
            config.runtime.max_concurrent_batches,
            PathBuf::from(&config.export.dir),
            dyn_cache,
            Duration::from_secs(config.cache.ttl_batch_s),
        );

        let pool = Arc::new(ConnectionPool::new(
            config.governor.max_connections,
            Arc::clone(&gauges),
        ));
        let mitigations = Mitigations {
            trim_cache: cache.clone().map(|c| {
                Box::new(move || c.trim_expired()) as Box<dyn Fn() -> usize + Send + Sync>
            }),
        };
        let governor =
            ResourceGovernor::start(config.governor.clone(), gauges, pool, mitigations);

        Ok(Self {
            cache,
            limiters,
            breakers,
            extractor,
            runtime,
            orchestrator,
            governor,
        })
    }

    pub async fn extract(&self, request: ExtractRequest) -> ExtractResponse {
        self.extractor.extract(request).await
    }

    pub fn service_stats(&self) -> ServiceStats {
        ServiceStats {
            rate_limiters: self.limiters.snapshot(),
            breakers: self.breakers.snapshot(),
            cache: self
                .cache
                .as_ref()
                .map(|c| c.stats())
                .unwrap_or_default(),
            queue: self.runtime.stats(),
            batches: self.orchestrator.stats(),
            health: self.governor.health(),
        }
    }

    /// Drains batches, stops workers, stops the governor. Order matters:
    /// batches finish against a live runtime.
    pub async fn shutdown(&self) {
        self.orchestrator.shutdown().await;
        self.runtime.shutdown().await;
        self.governor.shutdown().await;
    }
}
