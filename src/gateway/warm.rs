use std::time::Duration;

use super::orchestrator::Gateway;
use super::request::{OutputFormat, ReportRequest, Staleness};
use crate::utils::{GatewayError, Result};

/// Outcome of one warming pass
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct WarmReport {
    pub swept: usize,
    pub attempted: usize,
    pub refreshed: usize,
    pub failed: usize,
}

impl Gateway {
    /// Refetch every report used within `used_within`.
    ///
    /// Expired entries are swept first. A failing report is logged and
    /// skipped; warming itself does not count as use.
    pub async fn warm(&self, used_within: Duration) -> Result<WarmReport> {
        let mut report = WarmReport {
            swept: self.sweep().unwrap_or_else(|e| {
                tracing::warn!("cache sweep failed: {}", e);
                0
            }),
            ..WarmReport::default()
        };

        let ledger = self.ledger().clone();
        let used_within = used_within.as_secs();
        let records = tokio::task::spawn_blocking(move || ledger.recently_used(used_within))
            .await
            .map_err(|e| GatewayError::Storage(format!("usage ledger task failed: {}", e)))??;

        for record in records {
            report.attempted += 1;
            tracing::info!("warming {}", record.path);

            let path = record.path.clone();
            let request = ReportRequest::new(record.path, OutputFormat::Csv)
                .with_answers(record.answers)
                .with_staleness(Staleness::NoCache);
            match self.prepare(request, false).await {
                Ok(_) => report.refreshed += 1,
                Err(e) => {
                    report.failed += 1;
                    tracing::warn!("failed to warm {}: {}", path, e);
                }
            }
        }

        tracing::info!(
            "warmed {} of {} recently used reports ({} failed)",
            report.refreshed,
            report.attempted,
            report.failed
        );
        Ok(report)
    }
}
