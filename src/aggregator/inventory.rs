//! Decrypted inventory reconstruction.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::aggregator::ScanConfig;
use crate::contracts::{InventoryLedger, PosError};
use crate::crypto::PayloadCipher;
use crate::ledger::retry::resilient_read;
use crate::metrics::ScanMetrics;

/// The plaintext of an encrypted item payload. Cost price lives here so
/// profit can be computed client-side without exposing it on the ledger.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemDetails {
    pub name: String,
    pub category: String,
    pub cost_price: f64,
    pub selling_price: f64,
}

/// A decrypted item joined with its on-ledger stock counters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InventoryItem {
    pub record_id: u64,
    pub name: String,
    pub category: String,
    pub cost_price: f64,
    pub selling_price: f64,
    pub current_stock: u64,
    pub total_sold: u64,
}

/// Rebuilds the decrypted inventory list by sequentially probing item IDs.
pub struct InventoryScanner<L> {
    ledger: Arc<L>,
    cipher: Arc<PayloadCipher>,
    config: ScanConfig,
    metrics: Arc<ScanMetrics>,
}

impl<L: InventoryLedger> InventoryScanner<L> {
    pub fn new(
        ledger: Arc<L>,
        cipher: Arc<PayloadCipher>,
        config: ScanConfig,
        metrics: Arc<ScanMetrics>,
    ) -> Self {
        Self {
            ledger,
            cipher,
            config,
            metrics,
        }
    }

    /// Runs one full inventory scan. Same skip/stop discipline as the sales
    /// aggregation: empty or unreadable slots are skipped, `NotFound` ends
    /// the scan, any other fetch error stops it conservatively.
    pub async fn scan(&self) -> Result<Vec<InventoryItem>, PosError> {
        let mut items = Vec::new();

        for id in 1..=self.config.max_scan_id {
            let record = match resilient_read(&self.config.retry, || self.ledger.item(id)).await {
                Ok(record) => record,
                Err(e) if e.is_not_found() => {
                    tracing::debug!(id, "reached end of populated item range");
                    break;
                }
                Err(e) if id == 1 => {
                    return Err(PosError::Setup(format!("first item probe failed: {e}")));
                }
                Err(e) => {
                    tracing::error!(id, error = %e, "stopping inventory scan on fetch error");
                    self.metrics.record_scan_abort();
                    break;
                }
            };

            if record.encrypted_payload.is_empty() {
                self.metrics.record_skip();
                continue;
            }

            let details: ItemDetails = match self
                .cipher
                .decrypt(&record.encrypted_payload)
                .map_err(PosError::from)
                .and_then(|plaintext| Ok(serde_json::from_str(&plaintext)?))
            {
                Ok(details) => details,
                Err(e) => {
                    tracing::warn!(id, error = %e, "skipping unreadable item record");
                    self.metrics.record_decrypt_failure();
                    continue;
                }
            };

            items.push(InventoryItem {
                record_id: id,
                name: details.name,
                category: details.category,
                cost_price: details.cost_price,
                selling_price: details.selling_price,
                current_stock: record.current_stock,
                total_sold: record.total_sold,
            });
            self.metrics.record_aggregated();
        }

        Ok(items)
    }
}
