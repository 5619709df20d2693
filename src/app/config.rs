use directories::ProjectDirs;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::constants::{
    DEFAULT_COGNOS_NAMESPACE, DEFAULT_CONCURRENT_REQUESTS, DEFAULT_HTTP_TIMEOUT_SECS,
    DEFAULT_MAX_AGE_SECS, DEFAULT_RETRY_COUNT, DEFAULT_RETRY_DELAY_SECS,
    DEFAULT_SWEEP_INTERVAL_SECS,
};
use crate::utils::{GatewayError, Result};

const CONFIG_FILE: &str = "config.toml";
const ENV_PREFIX: &str = "REPORTGATE_";
const REPORT_PASSWORDS_KEY: &str = "report_passwords";

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Shared secret that opens every report and mints per-report secrets
    #[serde(default)]
    pub master_password: String,

    /// Canonical logical path -> per-report secret
    #[serde(default)]
    pub report_passwords: BTreeMap<String, String>,

    /// Base URL of the Cognos server (ex: https://cognos.example.org)
    #[serde(default)]
    pub cognos_url: String,

    /// Namespace chosen on the Cognos sign-in page
    #[serde(default = "default_namespace")]
    pub cognos_namespace: String,

    /// Backend user -> password. `DOMAIN\user` names are addressed as
    /// `DOMAIN_user` in request paths.
    #[serde(default)]
    pub cognos_users: BTreeMap<String, String>,

    /// Seconds between attempts of a failed backend request
    #[serde(default = "default_retry_delay")]
    pub retry_delay_secs: u64,

    /// Retries after the first attempt; negative retries forever
    #[serde(default = "default_retry_count")]
    pub retry_count: i64,

    /// Per backend request timeout, report generation included
    #[serde(default = "default_http_timeout")]
    pub http_timeout_secs: u64,

    /// Max in-flight backend requests per session
    #[serde(default = "default_concurrent_requests")]
    pub concurrent_requests: usize,

    /// Staleness bound used when a request does not state one
    #[serde(default = "default_max_age")]
    pub max_age_secs: u64,

    /// Entries older than this are swept; falls back to `max_age_secs`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_retention_secs: Option<u64>,

    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_dir: Option<PathBuf>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage_db: Option<PathBuf>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            master_password: String::new(),
            report_passwords: BTreeMap::new(),
            cognos_url: String::new(),
            cognos_namespace: default_namespace(),
            cognos_users: BTreeMap::new(),
            retry_delay_secs: default_retry_delay(),
            retry_count: default_retry_count(),
            http_timeout_secs: default_http_timeout(),
            concurrent_requests: default_concurrent_requests(),
            max_age_secs: default_max_age(),
            cache_retention_secs: None,
            sweep_interval_secs: default_sweep_interval(),
            cache_dir: None,
            usage_db: None,
        }
    }
}

fn default_namespace() -> String {
    DEFAULT_COGNOS_NAMESPACE.to_string()
}

fn default_retry_delay() -> u64 {
    DEFAULT_RETRY_DELAY_SECS
}

fn default_retry_count() -> i64 {
    DEFAULT_RETRY_COUNT
}

fn default_http_timeout() -> u64 {
    DEFAULT_HTTP_TIMEOUT_SECS
}

fn default_concurrent_requests() -> usize {
    DEFAULT_CONCURRENT_REQUESTS
}

fn default_max_age() -> u64 {
    DEFAULT_MAX_AGE_SECS
}

fn default_sweep_interval() -> u64 {
    DEFAULT_SWEEP_INTERVAL_SECS
}

impl GatewayConfig {
    /// Template written on first run; one empty user slot to fill in
    pub fn template() -> Self {
        let mut config = Self::default();
        config.cognos_users.insert(String::new(), String::new());
        config
    }

    /// Reject configs that cannot serve a single request
    pub fn validate(&self) -> Result<()> {
        if self.master_password.is_empty() {
            return Err(GatewayError::ConfigError(
                "master_password must be set".to_string(),
            ));
        }
        if self.cognos_url.is_empty() {
            return Err(GatewayError::ConfigError("cognos_url must be set".to_string()));
        }
        if self.cognos_users.keys().all(|user| user.is_empty()) {
            return Err(GatewayError::ConfigError(
                "at least 1 Cognos user must be listed under [cognos_users]".to_string(),
            ));
        }
        if self.concurrent_requests == 0 {
            return Err(GatewayError::ConfigError(
                "concurrent_requests must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn retention(&self) -> Duration {
        Duration::from_secs(self.cache_retention_secs.unwrap_or(self.max_age_secs))
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs.max(1))
    }

    /// Cache directory, defaulting to the platform cache dir
    pub fn cache_dir(&self) -> Result<PathBuf> {
        match &self.cache_dir {
            Some(dir) => Ok(dir.clone()),
            None => Ok(project_dirs()?.cache_dir().join("responses")),
        }
    }

    /// Usage ledger database, defaulting to the platform data dir
    pub fn usage_db(&self) -> Result<PathBuf> {
        match &self.usage_db {
            Some(path) => Ok(path.clone()),
            None => Ok(project_dirs()?.data_dir().join("usage.sqlite3")),
        }
    }
}

fn project_dirs() -> Result<ProjectDirs> {
    ProjectDirs::from("", "", "reportgate").ok_or_else(|| {
        GatewayError::ConfigError("could not determine a home directory".to_string())
    })
}

/// Get the default configuration file path
pub fn default_config_path() -> Result<PathBuf> {
    Ok(project_dirs()?.config_dir().join(CONFIG_FILE))
}

/// Load configuration from the file plus `REPORTGATE_` environment overrides.
///
/// A missing file is replaced by a template and reported as an error so the
/// operator fills it in before anything runs.
pub fn load_config(path: &Path) -> Result<GatewayConfig> {
    if !path.exists() {
        save_config(&GatewayConfig::template(), path)?;
        return Err(GatewayError::ConfigError(format!(
            "No config file was found. A template has been written to {}; \
             fill in master_password, cognos_url and [cognos_users] and start again",
            path.display()
        )));
    }

    let config: GatewayConfig = Figment::from(Serialized::defaults(GatewayConfig::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed(ENV_PREFIX))
        .extract()
        .map_err(|e| {
            GatewayError::ConfigError(format!("failed to load {}: {}", path.display(), e))
        })?;

    config.validate()?;
    Ok(config)
}

/// Save configuration to file
pub fn save_config(config: &GatewayConfig, path: &Path) -> Result<()> {
    let toml_string = toml::to_string_pretty(config)
        .map_err(|e| GatewayError::ConfigError(format!("failed to serialize config: {}", e)))?;
    write_atomic(path, toml_string.as_bytes())
}

/// Rewrite only the `report_passwords` table of the file at `path`.
///
/// Other keys keep their values, though comments and key order are not
/// preserved. Environment overrides never leak into the file.
pub fn persist_report_passwords(path: &Path, passwords: &BTreeMap<String, String>) -> Result<()> {
    let content = std::fs::read_to_string(path)?;
    let mut document: toml::Table = content.parse().map_err(|e| {
        GatewayError::ConfigError(format!("failed to parse {}: {}", path.display(), e))
    })?;

    let table = passwords
        .iter()
        .map(|(report, secret)| (report.clone(), toml::Value::String(secret.clone())))
        .collect::<toml::Table>();
    document.insert(REPORT_PASSWORDS_KEY.to_string(), toml::Value::Table(table));

    let toml_string = toml::to_string_pretty(&document)
        .map_err(|e| GatewayError::ConfigError(format!("failed to serialize config: {}", e)))?;
    write_atomic(path, toml_string.as_bytes())
}

fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir)?;

    let mut file = tempfile::NamedTempFile::new_in(dir)?;
    file.write_all(contents)?;
    file.as_file().sync_all()?;
    file.persist(path).map_err(|e| GatewayError::IoError(e.error))?;
    Ok(())
}
