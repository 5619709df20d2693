use serde::Serialize;
use std::time::Duration;

/// Backend folder path. The first component is either the current-user
/// marker `~` or `Public Folders`; the rest are display names.
pub type RemotePath = Vec<String>;

/// What a folder child is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    Folder,
    Report,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FolderEntry {
    pub name: String,
    pub kind: EntryKind,
}

/// A resolved backend object
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteObject {
    Folder {
        path: RemotePath,
        children: Vec<FolderEntry>,
    },
    Report {
        path: RemotePath,
    },
}

/// Fixed-delay retry schedule for backend requests
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub delay: Duration,
    /// Retries after the first attempt; negative retries forever
    pub retry_count: i64,
}

impl RetryPolicy {
    pub fn new(delay: Duration, retry_count: i64) -> Self {
        Self { delay, retry_count }
    }

    /// Whether another attempt may follow `attempts_made` failed ones
    pub fn allows_another(&self, attempts_made: u64) -> bool {
        match u64::try_from(self.retry_count) {
            Ok(retries) => attempts_made <= retries,
            Err(_) => true,
        }
    }
}

/// Everything needed to open one backend session
#[derive(Debug, Clone)]
pub struct SessionParams {
    pub user: String,
    pub password: String,
    pub base_url: String,
    pub namespace: String,
    pub dsn: String,
    pub retry: RetryPolicy,
    pub timeout: Duration,
    pub concurrent_requests: usize,
}
