use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::config::{load_config, GatewayConfig};
use crate::auth::{ConfigFileSink, CredentialStore};
use crate::cache::{FileCache, UsageLedger};
use crate::cognos::{BackendConnector, CognosConnector};
use crate::gateway::Gateway;
use crate::utils::Result;

/// Process-wide state shared by every request
pub struct AppContext {
    pub config_path: PathBuf,
    pub config: Arc<GatewayConfig>,
    pub credentials: Arc<CredentialStore>,
    pub gateway: Arc<Gateway>,
}

impl AppContext {
    /// Load the config file and open the cache and usage ledger
    pub fn initialize(config_path: &Path) -> Result<Self> {
        let config = load_config(config_path)?;
        Self::from_config(config, config_path, Arc::new(CognosConnector))
    }

    pub fn from_config(
        config: GatewayConfig,
        config_path: &Path,
        connector: Arc<dyn BackendConnector>,
    ) -> Result<Self> {
        let cache = FileCache::new(config.cache_dir()?)?;
        let ledger = UsageLedger::new(config.usage_db()?)?;
        tracing::debug!(
            "cache at {}, usage ledger at {}",
            cache.cache_dir().display(),
            ledger.db_path().display()
        );

        let credentials = CredentialStore::new(
            config.master_password.clone(),
            config.report_passwords.clone(),
            Box::new(ConfigFileSink::new(config_path.to_path_buf())),
        );

        let config = Arc::new(config);
        let gateway = Gateway::new(config.clone(), cache, ledger, connector);

        Ok(Self {
            config_path: config_path.to_path_buf(),
            config,
            credentials: Arc::new(credentials),
            gateway: Arc::new(gateway),
        })
    }
}
