pub mod fetcher;
pub mod politeness;
pub mod stage;

pub use fetcher::{clean_html, HttpPageFetcher};
pub use politeness::HostPoliteness;
pub use stage::{AllowAll, CrawlReport, CrawlStage, RobotsPolicy};
