pub mod provider;
pub mod queries;
pub mod scoring;
pub mod stage;

pub use provider::HttpSearchProvider;
pub use queries::{generate_queries, MAX_QUERIES};
pub use scoring::{score_url, CandidateSet};
pub use stage::{DiscoveryOutcome, DiscoveryStage};
