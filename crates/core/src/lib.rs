pub mod collab;
pub mod config;
pub mod error;
pub mod gauges;
pub mod ids;
pub mod record;
pub mod request;
pub mod types;

pub use collab::{
    Cache, CacheStats, CompanyParser, Extractor, FetchError, FetchOutcome, OrganicResult,
    PageFetcher, ParsedCompany, SearchProvider, SearchProviderError, SearchResults,
};
pub use config::AppConfig;
pub use gauges::ResourceGauges;
pub use error::{ErrorEntry, ErrorKind, ExtractError};
pub use record::*;
pub use request::{ExtractRequest, ExtractRequestBuilder, ExtractionMode};
pub use types::*;
