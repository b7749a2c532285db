pub mod keys;
pub mod memory;

pub use keys::{batch_key, company_key, crawl_key, serp_key};
pub use memory::MemoryCache;
