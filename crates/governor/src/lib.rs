pub mod monitor;
pub mod pool;

pub use monitor::{
    AdvisoryLevel, AdvisoryObserver, HealthView, Mitigations, ResourceAdvisory, ResourceGovernor,
    ResourceSample,
};
pub use pool::{ConnectionPool, PoolStats};
