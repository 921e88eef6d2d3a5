//! Sales metrics reconstruction.
//!
//! Metrics are a pure function of the decrypted transaction set at scan
//! time: every pass recomputes totals and the monthly series from scratch
//! and fully replaces the previous snapshot. There is no incremental update.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{Datelike, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::aggregator::ScanConfig;
use crate::contracts::{PosError, TransactionLedger};
use crate::crypto::PayloadCipher;
use crate::ledger::retry::resilient_read;
use crate::metrics::ScanMetrics;

/// One line of a sale. Prices are stored in the payload at sale time so the
/// receipt stays immutable even if the item is later repriced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SaleLine {
    pub record_id: u64,
    pub quantity: u64,
    pub selling_price: f64,
    pub cost_price: f64,
}

/// The plaintext of an encrypted transaction payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionPayload {
    /// Unix seconds at checkout, kept for the receipt. Month bucketing uses
    /// the ledger-assigned timestamp, not this field.
    pub timestamp: i64,
    pub items: Vec<SaleLine>,
}

/// Month-keyed series emitted as three parallel arrays, chronologically
/// ordered by the underlying (year, month), not by label or insertion order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TimeSeries {
    pub labels: Vec<String>,
    pub monthly_revenue: Vec<f64>,
    pub monthly_profit: Vec<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SalesSnapshot {
    pub total_revenue: f64,
    pub total_profit: f64,
    pub units_sold: u64,
    pub transactions_aggregated: u64,
    pub timeseries: TimeSeries,
}

struct MonthBucket {
    label: String,
    revenue: f64,
    profit: f64,
}

/// Rebuilds the sales read model by sequentially probing transaction IDs.
pub struct SalesAggregator<L> {
    ledger: Arc<L>,
    cipher: Arc<PayloadCipher>,
    config: ScanConfig,
    metrics: Arc<ScanMetrics>,
}

impl<L: TransactionLedger> SalesAggregator<L> {
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

    /// Runs one full aggregation pass.
    ///
    /// Individual record failures are absorbed: an empty slot or an
    /// undecryptable/malformed payload is skipped so one bad record cannot
    /// blank the whole report. Only a terminal failure on the very first
    /// probed ID, before any data could be gathered, escalates to a
    /// top-level error.
    pub async fn aggregate(&self) -> Result<SalesSnapshot, PosError> {
        let mut snapshot = SalesSnapshot::default();
        let mut buckets: BTreeMap<(i32, u32), MonthBucket> = BTreeMap::new();

        for id in 1..=self.config.max_scan_id {
            let record =
                match resilient_read(&self.config.retry, || self.ledger.transaction(id)).await {
                    Ok(record) => record,
                    Err(e) if e.is_not_found() => {
                        tracing::debug!(id, "reached end of populated transaction range");
                        break;
                    }
                    Err(e) if id == 1 => {
                        return Err(PosError::Setup(format!(
                            "first transaction probe failed: {e}"
                        )));
                    }
                    Err(e) => {
                        tracing::error!(id, error = %e, "stopping transaction scan on fetch error");
                        self.metrics.record_scan_abort();
                        break;
                    }
                };

            if record.encrypted_payload.is_empty() {
                // Deleted/unused slot: not proof the sequence has ended.
                self.metrics.record_skip();
                continue;
            }

            let plaintext = match self.cipher.decrypt(&record.encrypted_payload) {
                Ok(p) => p,
                Err(e) => {
                    tracing::warn!(id, error = %e, "skipping undecryptable transaction");
                    self.metrics.record_decrypt_failure();
                    continue;
                }
            };
            let payload: TransactionPayload = match serde_json::from_str(&plaintext) {
                Ok(p) => p,
                Err(e) => {
                    tracing::warn!(id, error = %e, "skipping malformed transaction payload");
                    self.metrics.record_decrypt_failure();
                    continue;
                }
            };

            let Some(month) = Utc.timestamp_opt(record.timestamp, 0).single() else {
                tracing::warn!(
                    id,
                    timestamp = record.timestamp,
                    "skipping transaction with out-of-range timestamp"
                );
                self.metrics.record_skip();
                continue;
            };

            let mut tx_revenue = 0.0;
            let mut tx_profit = 0.0;
            for line in &payload.items {
                let quantity = line.quantity as f64;
                tx_revenue += line.selling_price * quantity;
                tx_profit += (line.selling_price - line.cost_price) * quantity;
                snapshot.units_sold += line.quantity;
            }
            snapshot.total_revenue += tx_revenue;
            snapshot.total_profit += tx_profit;
            snapshot.transactions_aggregated += 1;
            self.metrics.record_aggregated();

            let bucket = buckets
                .entry((month.year(), month.month()))
                .or_insert_with(|| MonthBucket {
                    label: month.format("%b %Y").to_string(),
                    revenue: 0.0,
                    profit: 0.0,
                });
            bucket.revenue += tx_revenue;
            bucket.profit += tx_profit;
        }

        // Keyed by (year, month), so iteration order is chronological.
        for bucket in buckets.into_values() {
            snapshot.timeseries.labels.push(bucket.label);
            snapshot.timeseries.monthly_revenue.push(bucket.revenue);
            snapshot.timeseries.monthly_profit.push(bucket.profit);
        }

        Ok(snapshot)
    }
}
