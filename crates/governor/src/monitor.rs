use std::collections::VecDeque;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use sysinfo::{Pid, ProcessRefreshKind, ProcessesToUpdate, System};
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use firmscout_core::config::GovernorConfig;
use firmscout_core::ResourceGauges;

use crate::pool::{ConnectionPool, PoolStats};

const ADVISORY_HISTORY: usize = 100;

const MEMORY_WARN: f64 = 0.80;
const MEMORY_CRIT: f64 = 0.90;
const CPU_WARN: f64 = 0.70;
const CPU_CRIT: f64 = 0.85;
const CONN_WARN: f64 = 0.80;
const CONN_CRIT: f64 = 0.95;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AdvisoryLevel {
    Warning,
    Critical,
}

#[derive(Debug, Clone, Serialize)]
pub struct ResourceSample {
    pub memory_mb: f64,
    pub cpu_percent: f64,
    pub open_connections: i64,
    pub active_requests: i64,
    pub taken_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ResourceAdvisory {
    pub level: AdvisoryLevel,
    pub message: String,
    pub sample: ResourceSample,
    pub issued_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthView {
    pub within_limits: bool,
    pub warnings: Vec<String>,
    pub recent_advisories: usize,
    pub pool: PoolStats,
}

pub trait AdvisoryObserver: Send + Sync + 'static {
    fn on_advisory(&self, advisory: &ResourceAdvisory);
}

/// Best-effort mitigation hooks, each going through the owning component's
/// own API. The governor never mutates another component directly.
#[derive(Default)]
pub struct Mitigations {
    pub trim_cache: Option<Box<dyn Fn() -> usize + Send + Sync>>,
}

/// Samples process and pool load on an interval, emits advisories when
/// thresholds are crossed, and triggers mitigation on critical breaches.
pub struct ResourceGovernor {
    config: GovernorConfig,
    gauges: Arc<ResourceGauges>,
    pool: Arc<ConnectionPool>,
    mitigations: Mitigations,
    observers: DashMap<String, Arc<dyn AdvisoryObserver>>,
    advisories: StdMutex<VecDeque<ResourceAdvisory>>,
    last_sample: StdMutex<Option<ResourceSample>>,
    system: StdMutex<System>,
    shutdown_tx: broadcast::Sender<()>,
    sampler: Mutex<Option<JoinHandle<()>>>,
}

impl ResourceGovernor {
    pub fn start(
        config: GovernorConfig,
        gauges: Arc<ResourceGauges>,
        pool: Arc<ConnectionPool>,
        mitigations: Mitigations,
    ) -> Arc<Self> {
        let (shutdown_tx, _) = broadcast::channel(1);
        let governor = Arc::new(Self {
            config,
            gauges,
            pool,
            mitigations,
            observers: DashMap::new(),
            advisories: StdMutex::new(VecDeque::with_capacity(ADVISORY_HISTORY)),
            last_sample: StdMutex::new(None),
            system: StdMutex::new(System::new()),
            shutdown_tx,
            sampler: Mutex::new(None),
        });

        let handle = {
            let this = Arc::clone(&governor);
            // Subscribe before spawning so an early shutdown is not missed.
            let mut shutdown = governor.shutdown_tx.subscribe();
            tokio::spawn(async move {
                let interval = Duration::from_secs(this.config.sample_interval_s.max(1));
                info!(interval_s = interval.as_secs(), "resource governor started");
                loop {
                    tokio::select! {
                        _ = shutdown.recv() => break,
                        _ = tokio::time::sleep(interval) => {
                            let sample = this.take_sample();
                            this.process_sample(sample);
                        }
                    }
                }
                info!("resource governor stopped");
            })
        };
        if let Ok(mut slot) = governor.sampler.try_lock() {
            *slot = Some(handle);
        }
        governor
    }

    fn take_sample(&self) -> ResourceSample {
        let pid = Pid::from_u32(std::process::id());
        let mut system = self.system.lock().unwrap();
        system.refresh_processes_specifics(
            ProcessesToUpdate::Some(&[pid]),
            true,
            ProcessRefreshKind::new().with_memory().with_cpu(),
        );
        let (memory_mb, cpu_percent) = system
            .process(pid)
            .map(|p| (p.memory() as f64 / (1024.0 * 1024.0), p.cpu_usage() as f64))
            .unwrap_or((0.0, 0.0));
        ResourceSample {
            memory_mb,
            cpu_percent,
            open_connections: self.gauges.open_connections(),
            active_requests: self.gauges.active_requests(),
            taken_at: Utc::now(),
        }
    }

    fn breaches(&self, sample: &ResourceSample) -> Vec<(AdvisoryLevel, String)> {
        let mut found = Vec::new();
        let mem_util = sample.memory_mb / self.config.max_memory_mb as f64;
        if mem_util >= MEMORY_CRIT {
            found.push((
                AdvisoryLevel::Critical,
                format!("memory at {:.0}% of the {} MB cap", mem_util * 100.0, self.config.max_memory_mb),
            ));
        } else if mem_util >= MEMORY_WARN {
            found.push((
                AdvisoryLevel::Warning,
                format!("memory at {:.0}% of the {} MB cap", mem_util * 100.0, self.config.max_memory_mb),
            ));
        }

        let cpu_util = sample.cpu_percent / self.config.max_cpu_percent;
        if cpu_util >= CPU_CRIT {
            found.push((
                AdvisoryLevel::Critical,
                format!("cpu at {:.0}% of the {:.0}% cap", cpu_util * 100.0, self.config.max_cpu_percent),
            ));
        } else if cpu_util >= CPU_WARN {
            found.push((
                AdvisoryLevel::Warning,
                format!("cpu at {:.0}% of the {:.0}% cap", cpu_util * 100.0, self.config.max_cpu_percent),
            ));
        }

        let conn_util = sample.open_connections as f64 / self.config.max_connections as f64;
        if conn_util >= CONN_CRIT {
            found.push((
                AdvisoryLevel::Critical,
                format!("{} open connections of {} allowed", sample.open_connections, self.config.max_connections),
            ));
        } else if conn_util >= CONN_WARN {
            found.push((
                AdvisoryLevel::Warning,
                format!("{} open connections of {} allowed", sample.open_connections, self.config.max_connections),
            ));
        }
        found
    }

    /// Evaluates one sample: records it, emits advisories, and runs
    /// mitigation when anything critical shows up. Public so tests (and any
    /// embedding process) can drive the governor with synthetic samples.
    pub fn process_sample(&self, sample: ResourceSample) {
        let breaches = self.breaches(&sample);
        *self.last_sample.lock().unwrap() = Some(sample.clone());

        if breaches.is_empty() {
            debug!(
                memory_mb = sample.memory_mb,
                cpu = sample.cpu_percent,
                connections = sample.open_connections,
                "resource sample within limits"
            );
            return;
        }

        let critical = breaches.iter().any(|(l, _)| *l == AdvisoryLevel::Critical);
        for (level, message) in breaches {
            warn!(?level, %message, "resource advisory");
            let advisory = ResourceAdvisory {
                level,
                message,
                sample: sample.clone(),
                issued_at: Utc::now(),
            };
            {
                let mut history = self.advisories.lock().unwrap();
                if history.len() == ADVISORY_HISTORY {
                    history.pop_front();
                }
                history.push_back(advisory.clone());
            }
            for observer in self.observers.iter() {
                observer.on_advisory(&advisory);
            }
        }

        if critical {
            if let Some(trim) = &self.mitigations.trim_cache {
                let removed = trim();
                info!(removed, "mitigation: cache trimmed");
            }
            self.pool.recycle();
        }
    }

    pub fn register_observer(&self, id: &str, observer: Arc<dyn AdvisoryObserver>) {
        self.observers.insert(id.to_string(), observer);
    }

    pub fn unregister_observer(&self, id: &str) {
        self.observers.remove(id);
    }

    pub fn health(&self) -> HealthView {
        let last = self.last_sample.lock().unwrap().clone();
        let warnings: Vec<String> = last
            .as_ref()
            .map(|s| self.breaches(s).into_iter().map(|(_, m)| m).collect())
            .unwrap_or_default();
        HealthView {
            within_limits: warnings.is_empty(),
            warnings,
            recent_advisories: self.advisories.lock().unwrap().len(),
            pool: self.pool.stats(),
        }
    }

    pub async fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
        let handle = self.sampler.lock().await.take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn config() -> GovernorConfig {
        GovernorConfig {
            max_memory_mb: 100,
            max_cpu_percent: 80.0,
            max_connections: 10,
            sample_interval_s: 3600,
        }
    }

    fn sample(memory_mb: f64, cpu: f64, connections: i64) -> ResourceSample {
        ResourceSample {
            memory_mb,
            cpu_percent: cpu,
            open_connections: connections,
            active_requests: 0,
            taken_at: Utc::now(),
        }
    }

    fn governor(mitigations: Mitigations) -> Arc<ResourceGovernor> {
        let gauges = ResourceGauges::new();
        let pool = Arc::new(ConnectionPool::new(10, Arc::clone(&gauges)));
        ResourceGovernor::start(config(), gauges, pool, mitigations)
    }

    #[tokio::test]
    async fn quiet_sample_leaves_health_green() {
        let g = governor(Mitigations::default());
        g.process_sample(sample(10.0, 5.0, 1));
        let health = g.health();
        assert!(health.within_limits);
        assert!(health.warnings.is_empty());
        assert_eq!(health.recent_advisories, 0);
        g.shutdown().await;
    }

    #[tokio::test]
    async fn warning_threshold_emits_advisory_without_mitigation() {
        let g = governor(Mitigations::default());
        g.process_sample(sample(85.0, 5.0, 1));
        let health = g.health();
        assert!(!health.within_limits);
        assert_eq!(health.recent_advisories, 1);
        assert_eq!(health.pool.recycles, 0);
        g.shutdown().await;
    }

    #[tokio::test]
    async fn critical_breach_trims_cache_and_recycles_pool() {
        let trims = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&trims);
        let g = governor(Mitigations {
            trim_cache: Some(Box::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
                3
            })),
        });
        g.process_sample(sample(95.0, 5.0, 1));
        assert_eq!(trims.load(Ordering::SeqCst), 1);
        assert_eq!(g.health().pool.recycles, 1);
        g.shutdown().await;
    }

    #[tokio::test]
    async fn observers_see_each_advisory() {
        struct Recorder(AtomicUsize);
        impl AdvisoryObserver for Recorder {
            fn on_advisory(&self, _advisory: &ResourceAdvisory) {
                self.0.fetch_add(1, Ordering::SeqCst);
            }
        }
        let g = governor(Mitigations::default());
        let recorder = Arc::new(Recorder(AtomicUsize::new(0)));
        g.register_observer("r1", recorder.clone());
        // Memory and connections both breach: two advisories.
        g.process_sample(sample(95.0, 5.0, 10));
        assert_eq!(recorder.0.load(Ordering::SeqCst), 2);
        g.unregister_observer("r1");
        g.process_sample(sample(95.0, 5.0, 10));
        assert_eq!(recorder.0.load(Ordering::SeqCst), 2);
        g.shutdown().await;
    }

    #[tokio::test]
    async fn cpu_thresholds_scale_with_the_cap() {
        let g = governor(Mitigations::default());
        // 70% of the 80% cap is 56 absolute.
        g.process_sample(sample(10.0, 57.0, 0));
        assert_eq!(g.health().recent_advisories, 1);
        g.shutdown().await;
    }
}
