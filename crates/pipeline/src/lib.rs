pub mod aggregate;
pub mod extractor;

pub use aggregate::{aggregate, SourcePartial, MIN_PARSE_CONFIDENCE};
pub use extractor::CompanyExtractor;
