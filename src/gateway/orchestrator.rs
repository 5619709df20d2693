use bytes::Bytes;
use serde_json::{json, Map, Value};
use std::sync::Arc;
use std::time::Duration;

use super::path::LogicalPath;
use super::request::{GatewayResponse, OutputFormat, ReportRequest, Staleness};
use crate::app::GatewayConfig;
use crate::cache::{CacheKey, CacheLookup, FileCache, UsageLedger};
use crate::cognos::{
    BackendConnector, FolderEntry, RemoteObject, RemotePath, RetryPolicy, SessionParams,
};
use crate::constants::{CURRENT_USER_MARKER, PUBLIC_FOLDERS, PUBLIC_ROOT};
use crate::convert::csv_to_json;
use crate::utils::{GatewayError, Result};

/// Serves report and folder requests from the cache or the backend
pub struct Gateway {
    config: Arc<GatewayConfig>,
    cache: FileCache,
    ledger: UsageLedger,
    connector: Arc<dyn BackendConnector>,
}

impl Gateway {
    pub fn new(
        config: Arc<GatewayConfig>,
        cache: FileCache,
        ledger: UsageLedger,
        connector: Arc<dyn BackendConnector>,
    ) -> Self {
        Self {
            config,
            cache,
            ledger,
            connector,
        }
    }

    pub fn cache(&self) -> &FileCache {
        &self.cache
    }

    pub fn ledger(&self) -> &UsageLedger {
        &self.ledger
    }

    /// Answer one request.
    ///
    /// Report CSV is cached raw and keyed by path and prompt answers, so a
    /// cached entry serves both output formats. Folder listings always come
    /// from the backend.
    pub async fn prepare_response(&self, request: ReportRequest) -> Result<GatewayResponse> {
        self.prepare(request, true).await
    }

    pub(super) async fn prepare(
        &self,
        request: ReportRequest,
        record_usage: bool,
    ) -> Result<GatewayResponse> {
        let staleness = request.staleness.resolve(self.config.max_age_secs);
        let key = CacheKey::derive(&request.path, &request.answers);

        if let Some((csv, age_secs)) = self.cached(&key, staleness).await? {
            tracing::debug!("serving {} from cache ({}s old)", request.path, age_secs);
            if record_usage {
                self.note_use(&key, &request).await;
            }
            return render_report(&request, csv, Some(age_secs));
        }

        if staleness == Staleness::OnlyIfCached {
            return Err(GatewayError::NotCached(format!(
                "{} is not in the cache",
                request.path
            )));
        }

        let (params, remote_path) = self.plan_session(&request.path)?;
        let backend = self.connector.connect(params).await?;
        match backend.resolve(&remote_path).await? {
            RemoteObject::Folder { children, .. } => render_listing(request.format, &children),
            RemoteObject::Report { path } => {
                let csv = backend.download_csv(&path, &request.answers).await?;
                self.store(&key, csv.clone()).await?;
                if record_usage {
                    self.note_use(&key, &request).await;
                }
                render_report(&request, csv, None)
            }
        }
    }

    /// Prompt names of the report at `path`
    pub async fn list_prompts(&self, path: &LogicalPath) -> Result<Vec<String>> {
        let (params, remote_path) = self.plan_session(path)?;
        let backend = self.connector.connect(params).await?;
        match backend.resolve(&remote_path).await? {
            RemoteObject::Report { path } => backend.list_report_prompts(&path).await,
            RemoteObject::Folder { .. } => Err(GatewayError::MalformedInput(format!(
                "{} is a folder; only reports have prompts",
                path
            ))),
        }
    }

    /// Delete cache entries older than the configured retention
    pub fn sweep(&self) -> Result<usize> {
        let removed = self.cache.sweep(self.config.retention())?;
        if removed > 0 {
            tracing::info!("swept {} expired cache entries", removed);
        }
        Ok(removed)
    }

    async fn cached(&self, key: &CacheKey, staleness: Staleness) -> Result<Option<(Bytes, u64)>> {
        let bound = match staleness {
            Staleness::NoCache => return Ok(None),
            Staleness::OnlyIfCached => u64::MAX,
            Staleness::MaxAge(max_age) => max_age,
            Staleness::Default => self.config.max_age_secs,
        };

        let cache = self.cache.clone();
        let lookup_key = key.clone();
        let lookup = tokio::task::spawn_blocking(move || cache.get(&lookup_key))
            .await
            .map_err(|e| GatewayError::Storage(format!("cache read task failed: {}", e)))??;

        match lookup {
            CacheLookup::Hit { bytes, age_secs } if age_secs <= bound => Ok(Some((bytes, age_secs))),
            CacheLookup::Hit { age_secs, .. } => {
                tracing::debug!("cache entry {} is stale ({}s > {}s)", key, age_secs, bound);
                Ok(None)
            }
            CacheLookup::Absent => Ok(None),
        }
    }

    /// Write an entry on the blocking pool
    async fn store(&self, key: &CacheKey, csv: Bytes) -> Result<()> {
        let cache = self.cache.clone();
        let key = key.clone();
        tokio::task::spawn_blocking(move || cache.put(&key, &csv))
            .await
            .map_err(|e| GatewayError::Storage(format!("cache write task failed: {}", e)))?
    }

    /// Pick backend credentials and the backend path for a logical path.
    ///
    /// `public` uses any configured user and starts at Public Folders; any
    /// other root names a user (first `_` standing for `\`) and starts at
    /// that user's My Folders.
    fn plan_session(&self, path: &LogicalPath) -> Result<(SessionParams, RemotePath)> {
        let dsn = path.dsn()?;
        let root = path.root()?;

        let (user, password, remote_root) = if root == PUBLIC_ROOT {
            let (user, password) = self
                .config
                .cognos_users
                .iter()
                .find(|(user, _)| !user.is_empty())
                .ok_or_else(|| {
                    GatewayError::ConfigError("no Cognos users are configured".to_string())
                })?;
            (user.clone(), password.clone(), PUBLIC_FOLDERS)
        } else {
            let user = root.replacen('_', "\\", 1);
            let password = self.config.cognos_users.get(&user).cloned().ok_or_else(|| {
                GatewayError::NotFound(format!("no password for {} in the config file", user))
            })?;
            (user, password, CURRENT_USER_MARKER)
        };

        let remote_path: RemotePath = std::iter::once(remote_root.to_string())
            .chain(path.tail().iter().cloned())
            .collect();

        let params = SessionParams {
            user,
            password,
            base_url: self.config.cognos_url.clone(),
            namespace: self.config.cognos_namespace.clone(),
            dsn: dsn.to_string(),
            retry: RetryPolicy::new(
                Duration::from_secs(self.config.retry_delay_secs),
                self.config.retry_count,
            ),
            timeout: Duration::from_secs(self.config.http_timeout_secs),
            concurrent_requests: self.config.concurrent_requests,
        };
        Ok((params, remote_path))
    }

    /// Failures here never fail the request
    async fn note_use(&self, key: &CacheKey, request: &ReportRequest) {
        let ledger = self.ledger.clone();
        let key = key.clone();
        let path = request.path.clone();
        let answers = request.answers.clone();

        let outcome =
            tokio::task::spawn_blocking(move || ledger.record_use(&key, &path, &answers)).await;
        match outcome {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::warn!("could not record use of {}: {}", request.path, e),
            Err(e) => tracing::warn!("usage ledger task failed: {}", e),
        }
    }
}

fn render_report(
    request: &ReportRequest,
    csv: Bytes,
    age_secs: Option<u64>,
) -> Result<GatewayResponse> {
    match request.format {
        OutputFormat::Csv => Ok(GatewayResponse {
            body: csv,
            format: OutputFormat::Csv,
            filename: Some(request.path.suggested_filename()),
            age_secs,
        }),
        OutputFormat::Json => Ok(GatewayResponse {
            body: Bytes::from(csv_to_json(&String::from_utf8_lossy(&csv))?),
            format: OutputFormat::Json,
            filename: None,
            age_secs,
        }),
    }
}

/// Newline-separated names, or a JSON object of name -> {type}
fn render_listing(format: OutputFormat, children: &[FolderEntry]) -> Result<GatewayResponse> {
    let body = match format {
        OutputFormat::Csv => children
            .iter()
            .map(|child| format!("{}\n", child.name))
            .collect::<String>()
            .into_bytes(),
        OutputFormat::Json => {
            let listing: Map<String, Value> = children
                .iter()
                .map(|child| (child.name.clone(), json!({ "type": child.kind })))
                .collect();
            serde_json::to_vec_pretty(&listing).map_err(|e| {
                GatewayError::MalformedInput(format!("failed to encode folder listing: {}", e))
            })?
        }
    };

    Ok(GatewayResponse {
        body: Bytes::from(body),
        format,
        filename: None,
        age_secs: None,
    })
}
