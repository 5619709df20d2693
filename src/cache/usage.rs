//! Usage ledger: which cache keys were served recently, driving warm-ups

use rusqlite::{params, Connection};
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::types::{CacheKey, UsageRecord};
use crate::constants::{LEDGER_ATTEMPTS, LEDGER_BUSY_TIMEOUT_MS, LEDGER_RETRY_DELAY_MS};
use crate::gateway::{LogicalPath, PromptAnswers};
use crate::utils::{GatewayError, Result};

const CREATE_TABLE: &str = "CREATE TABLE IF NOT EXISTS usage (
    hash TEXT PRIMARY KEY,
    path TEXT NOT NULL,
    prompt_answers TEXT NULL,
    last_used INTEGER NOT NULL
)";

/// SQLite-backed table of (key, path, answers, last used)
#[derive(Debug, Clone)]
pub struct UsageLedger {
    db_path: PathBuf,
    retry_delay: Duration,
}

impl UsageLedger {
    /// Open (creating if needed) the ledger at `db_path`
    pub fn new(db_path: PathBuf) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let ledger = Self {
            db_path,
            retry_delay: Duration::from_millis(LEDGER_RETRY_DELAY_MS),
        };
        ledger.with_retry(|| ledger.open().map(drop))?;
        Ok(ledger)
    }

    /// Override the pause between busy retries
    pub fn with_retry_delay(mut self, retry_delay: Duration) -> Self {
        self.retry_delay = retry_delay;
        self
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    /// Upsert the row for `key` with the current time
    pub fn record_use(
        &self,
        key: &CacheKey,
        path: &LogicalPath,
        answers: &PromptAnswers,
    ) -> Result<()> {
        self.record_use_at(key, path, answers, chrono::Utc::now().timestamp())
    }

    /// Upsert the row for `key` with an explicit unix timestamp
    pub fn record_use_at(
        &self,
        key: &CacheKey,
        path: &LogicalPath,
        answers: &PromptAnswers,
        last_used: i64,
    ) -> Result<()> {
        let path_str = path.to_string();
        let answers_json = serde_json::to_string(answers)
            .map_err(|e| GatewayError::Storage(format!("failed to encode prompt answers: {}", e)))?;

        self.with_retry(|| {
            let conn = self.open()?;
            conn.execute(
                "INSERT OR REPLACE INTO usage (hash, path, prompt_answers, last_used)
                 VALUES (?1, ?2, ?3, ?4)",
                params![key.as_str(), path_str, answers_json, last_used],
            )?;
            Ok(())
        })
    }

    /// Rows used within the last `used_within` seconds
    pub fn recently_used(&self, used_within: u64) -> Result<Vec<UsageRecord>> {
        let min_timestamp = chrono::Utc::now()
            .timestamp()
            .saturating_sub(i64::try_from(used_within).unwrap_or(i64::MAX));

        let rows = self.with_retry(|| {
            let conn = self.open()?;
            let mut stmt = conn.prepare(
                "SELECT hash, path, prompt_answers, last_used
                 FROM usage WHERE last_used >= ?1 ORDER BY last_used DESC",
            )?;
            let rows = stmt
                .query_map([min_timestamp], |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, Option<String>>(2)?,
                        row.get::<_, i64>(3)?,
                    ))
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        })?;

        rows.into_iter()
            .map(|(hash, path, answers_json, last_used)| {
                let answers = match answers_json.as_deref() {
                    None | Some("") | Some("null") => PromptAnswers::new(),
                    Some(json) => serde_json::from_str(json).map_err(|e| {
                        GatewayError::Storage(format!("bad prompt answers for {}: {}", path, e))
                    })?,
                };
                Ok(UsageRecord {
                    key: CacheKey::from_hex(hash),
                    path: LogicalPath::parse(&path),
                    answers,
                    last_used,
                })
            })
            .collect()
    }

    fn open(&self) -> Result<Connection> {
        let conn = Connection::open(&self.db_path)?;
        conn.busy_timeout(Duration::from_millis(LEDGER_BUSY_TIMEOUT_MS))?;
        conn.execute(CREATE_TABLE, [])?;
        Ok(conn)
    }

    /// Run `op`, retrying a bounded number of times while the store is busy
    fn with_retry<T>(&self, mut op: impl FnMut() -> Result<T>) -> Result<T> {
        let mut attempt = 1;
        loop {
            match op() {
                Err(GatewayError::StorageBusy(msg)) if attempt < LEDGER_ATTEMPTS => {
                    tracing::debug!(
                        "usage ledger busy (attempt {}/{}): {}",
                        attempt,
                        LEDGER_ATTEMPTS,
                        msg
                    );
                    attempt += 1;
                    std::thread::sleep(self.retry_delay);
                }
                other => return other,
            }
        }
    }
}
