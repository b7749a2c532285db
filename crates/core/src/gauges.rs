//! Process-wide load gauges. Stages increment them through RAII guards; the
//! resource governor only ever reads them.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

#[derive(Default)]
pub struct ResourceGauges {
    open_connections: AtomicI64,
    active_requests: AtomicI64,
}

impl ResourceGauges {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn open_connections(&self) -> i64 {
        self.open_connections.load(Ordering::Relaxed).max(0)
    }

    pub fn active_requests(&self) -> i64 {
        self.active_requests.load(Ordering::Relaxed).max(0)
    }

    pub fn track_connection(self: &Arc<Self>) -> ConnectionGuard {
        self.open_connections.fetch_add(1, Ordering::Relaxed);
        ConnectionGuard {
            gauges: Arc::clone(self),
        }
    }

    pub fn track_request(self: &Arc<Self>) -> RequestGuard {
        self.active_requests.fetch_add(1, Ordering::Relaxed);
        RequestGuard {
            gauges: Arc::clone(self),
        }
    }
}

pub struct ConnectionGuard {
    gauges: Arc<ResourceGauges>,
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.gauges.open_connections.fetch_sub(1, Ordering::Relaxed);
    }
}

pub struct RequestGuard {
    gauges: Arc<ResourceGauges>,
}

impl Drop for RequestGuard {
    fn drop(&mut self) {
        self.gauges.active_requests.fetch_sub(1, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn guards_balance_the_counters() {
        let gauges = ResourceGauges::new();
        {
            let _c1 = gauges.track_connection();
            let _c2 = gauges.track_connection();
            let _r = gauges.track_request();
            assert_eq!(gauges.open_connections(), 2);
            assert_eq!(gauges.active_requests(), 1);
        }
        assert_eq!(gauges.open_connections(), 0);
        assert_eq!(gauges.active_requests(), 0);
    }
}
