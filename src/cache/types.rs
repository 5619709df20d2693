use bytes::Bytes;
use serde_json::json;
use sha2::{Digest, Sha256};
use std::fmt;

use crate::gateway::{LogicalPath, PromptAnswers};

/// Key for cache entries: SHA-256 of the canonical (path, answers) pair
#[derive(Debug, Clone, Hash, PartialEq, Eq)]
pub struct CacheKey(String);

impl CacheKey {
    /// Generate cache key for a report request
    pub fn derive(path: &LogicalPath, answers: &PromptAnswers) -> Self {
        // answers is a BTreeMap, so the serialisation is order independent
        let canonical = json!({
            "path": path.components(),
            "promptAnswers": answers,
        });
        let mut hasher = Sha256::new();
        hasher.update(canonical.to_string().as_bytes());
        Self(format!("{:x}", hasher.finalize()))
    }

    /// Rehydrate a key read back from the usage ledger
    pub(crate) fn from_hex(hex: String) -> Self {
        Self(hex)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Result of a cache read
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheLookup {
    Hit { bytes: Bytes, age_secs: u64 },
    Absent,
}

impl CacheLookup {
    /// Entry age in seconds, -1 when absent
    pub fn age_secs(&self) -> i64 {
        match self {
            Self::Hit { age_secs, .. } => i64::try_from(*age_secs).unwrap_or(i64::MAX),
            Self::Absent => -1,
        }
    }
}

/// One row of the usage ledger
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsageRecord {
    pub key: CacheKey,
    pub path: LogicalPath,
    pub answers: PromptAnswers,
    /// Unix seconds
    pub last_used: i64,
}
