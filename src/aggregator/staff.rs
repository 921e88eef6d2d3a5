//! Staff roster reconstruction.
//!
//! The registry keeps accounts behind a private mapping with no counter, so
//! the roster is rebuilt the same way as the other read models: a bounded
//! sequential probe. Accounts are plaintext; there is no decryption step.

use std::sync::Arc;

use crate::aggregator::ScanConfig;
use crate::contracts::{PosError, StaffAccount, StaffRegistry};
use crate::ledger::retry::resilient_read;
use crate::metrics::ScanMetrics;

pub struct StaffScanner<L> {
    registry: Arc<L>,
    config: ScanConfig,
    metrics: Arc<ScanMetrics>,
}

impl<L: StaffRegistry> StaffScanner<L> {
    pub fn new(registry: Arc<L>, config: ScanConfig, metrics: Arc<ScanMetrics>) -> Self {
        Self {
            registry,
            config,
            metrics,
        }
    }

    /// Runs one full roster scan. A slot with `exists == false` is a
    /// revoked account and is skipped; `NotFound` ends the scan.
    pub async fn scan(&self) -> Result<Vec<StaffAccount>, PosError> {
        let mut accounts = Vec::new();

        for id in 1..=self.config.max_scan_id {
            let account =
                match resilient_read(&self.config.retry, || self.registry.staff_account(id)).await
                {
                    Ok(account) => account,
                    Err(e) if e.is_not_found() => {
                        tracing::debug!(id, "reached end of populated staff range");
                        break;
                    }
                    Err(e) if id == 1 => {
                        return Err(PosError::Setup(format!("first staff probe failed: {e}")));
                    }
                    Err(e) => {
                        tracing::error!(id, error = %e, "stopping staff scan on fetch error");
                        self.metrics.record_scan_abort();
                        break;
                    }
                };

            if !account.exists {
                self.metrics.record_skip();
                continue;
            }
            accounts.push(account);
            self.metrics.record_aggregated();
        }

        Ok(accounts)
    }
}
