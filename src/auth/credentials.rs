use parking_lot::Mutex;
use rand::{distributions::Alphanumeric, rngs::OsRng, Rng};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;
use subtle::ConstantTimeEq;

use crate::app::persist_report_passwords;
use crate::constants::{AUTH_FLOOR_MS, REPORT_PASSWORD_LEN};
use crate::gateway::LogicalPath;
use crate::utils::{GatewayError, Result};

/// Where minted report passwords are written
pub trait CredentialSink: Send + Sync {
    fn persist(&self, report_passwords: &BTreeMap<String, String>) -> Result<()>;
}

/// Writes the `report_passwords` table back into the config file
pub struct ConfigFileSink {
    path: PathBuf,
}

impl ConfigFileSink {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

impl CredentialSink for ConfigFileSink {
    fn persist(&self, report_passwords: &BTreeMap<String, String>) -> Result<()> {
        persist_report_passwords(&self.path, report_passwords)
    }
}

struct CredentialState {
    master_password: String,
    report_passwords: BTreeMap<String, String>,
}

/// Master secret plus per-report secrets, minted on first master use
pub struct CredentialStore {
    state: Mutex<CredentialState>,
    sink: Box<dyn CredentialSink>,
    floor: Duration,
}

impl CredentialStore {
    pub fn new(
        master_password: String,
        report_passwords: BTreeMap<String, String>,
        sink: Box<dyn CredentialSink>,
    ) -> Self {
        Self {
            state: Mutex::new(CredentialState {
                master_password,
                report_passwords,
            }),
            sink,
            floor: Duration::from_millis(AUTH_FLOOR_MS),
        }
    }

    /// Minimum wall-clock time every access check takes
    pub fn with_floor(mut self, floor: Duration) -> Self {
        self.floor = floor;
        self
    }

    /// Check `provided` against the report's own password or the master
    /// password. Master access to a report with no password yet mints and
    /// persists one before returning.
    ///
    /// Never returns sooner than the configured floor, whichever branch is
    /// taken, so response timing says nothing about the secrets.
    pub async fn allowed_access(&self, provided: &str, path: &LogicalPath) -> Result<bool> {
        let deadline = tokio::time::Instant::now() + self.floor;
        let outcome = self.check(provided, path);
        // the lock is already released here
        tokio::time::sleep_until(deadline).await;
        outcome
    }

    fn check(&self, provided: &str, path: &LogicalPath) -> Result<bool> {
        if provided.is_empty() {
            return Ok(false);
        }
        let resource = path.to_string();

        let mut state = self.state.lock();
        let has_report_password = match state.report_passwords.get(&resource) {
            Some(stored) if secrets_match(provided, stored) => return Ok(true),
            Some(_) => true,
            None => false,
        };

        if !secrets_match(provided, &state.master_password) {
            return Ok(false);
        }

        if !has_report_password {
            state
                .report_passwords
                .insert(resource.clone(), mint_secret());
            if let Err(err) = self.sink.persist(&state.report_passwords) {
                state.report_passwords.remove(&resource);
                tracing::error!("failed to persist report password for {}: {}", resource, err);
                return Err(GatewayError::Storage(format!(
                    "could not save the new password for {}: {}",
                    resource, err
                )));
            }
            tracing::info!("created report password for {}", resource);
        }

        Ok(true)
    }

    /// Current password for a report, if one has been minted
    pub fn report_password(&self, path: &LogicalPath) -> Option<String> {
        self.state
            .lock()
            .report_passwords
            .get(&path.to_string())
            .cloned()
    }

    pub fn report_password_count(&self) -> usize {
        self.state.lock().report_passwords.len()
    }
}

fn secrets_match(provided: &str, stored: &str) -> bool {
    provided.as_bytes().ct_eq(stored.as_bytes()).into()
}

/// Random alphanumeric secret from the OS CSPRNG
pub fn mint_secret() -> String {
    OsRng
        .sample_iter(&Alphanumeric)
        .take(REPORT_PASSWORD_LEN)
        .map(char::from)
        .collect()
}
