mod file_cache;
mod types;
mod usage;

pub use file_cache::FileCache;
pub use types::{CacheKey, CacheLookup, UsageRecord};
pub use usage::UsageLedger;
