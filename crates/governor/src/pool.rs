use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::Serialize;
use tracing::info;

use firmscout_core::ResourceGauges;

/// Connection-pool accounting. The HTTP clients own their sockets; this
/// tracks utilization against the configured cap and supports the
/// close-then-rebuild mitigation by bumping a generation counter that
/// clients watch.
pub struct ConnectionPool {
    capacity: usize,
    gauges: Arc<ResourceGauges>,
    generation: AtomicU64,
    recycles: AtomicU64,
}

#[derive(Debug, Clone, Serialize)]
pub struct PoolStats {
    pub capacity: usize,
    pub open_connections: i64,
    pub active_requests: i64,
    pub generation: u64,
    pub recycles: u64,
}

impl ConnectionPool {
    pub fn new(capacity: usize, gauges: Arc<ResourceGauges>) -> Self {
        Self {
            capacity: capacity.max(1),
            gauges,
            generation: AtomicU64::new(0),
            recycles: AtomicU64::new(0),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Open connections as a fraction of capacity.
    pub fn utilization(&self) -> f64 {
        self.gauges.open_connections() as f64 / self.capacity as f64
    }

    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Relaxed)
    }

    /// Marks the pool for rebuild. In-flight requests finish on the old
    /// generation; new clients are built against the new one.
    pub fn recycle(&self) {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        self.recycles.fetch_add(1, Ordering::Relaxed);
        info!(generation, "connection pool recycled");
    }

    pub fn stats(&self) -> PoolStats {
        PoolStats {
            capacity: self.capacity,
            open_connections: self.gauges.open_connections(),
            active_requests: self.gauges.active_requests(),
            generation: self.generation.load(Ordering::Relaxed),
            recycles: self.recycles.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn utilization_tracks_gauges() {
        let gauges = ResourceGauges::new();
        let pool = ConnectionPool::new(4, Arc::clone(&gauges));
        assert_eq!(pool.utilization(), 0.0);
        let _a = gauges.track_connection();
        let _b = gauges.track_connection();
        assert!((pool.utilization() - 0.5).abs() < 1e-9);
    }

    #[test]
    fn recycle_bumps_generation() {
        let pool = ConnectionPool::new(4, ResourceGauges::new());
        assert_eq!(pool.generation(), 0);
        pool.recycle();
        pool.recycle();
        assert_eq!(pool.generation(), 2);
        assert_eq!(pool.stats().recycles, 2);
    }
}
