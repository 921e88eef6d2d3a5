//! Sequential scans over the dense ledger ID spaces.
//!
//! All scans share the same shape: probe IDs 1..=max_scan_id strictly in
//! order through the resilient reader, skip empty/unreadable slots, stop at
//! the first `NotFound` (the end-of-data boundary) or any other terminal
//! fetch error. A deleted slot mid-range therefore never truncates a scan,
//! while a missing ID always does.

pub mod inventory;
pub mod sales;
pub mod staff;

use crate::ledger::retry::RetryConfig;

pub use inventory::{InventoryItem, InventoryScanner, ItemDetails};
pub use sales::{SaleLine, SalesAggregator, SalesSnapshot, TimeSeries, TransactionPayload};
pub use staff::StaffScanner;

/// Shared configuration for sequential scans.
#[derive(Debug, Clone)]
pub struct ScanConfig {
    /// Ceiling on how many sequential IDs to probe. The ledger exposes no
    /// record counter, so the scan is bounded by configuration instead.
    pub max_scan_id: u64,
    /// Retry budget for each individual fetch.
    pub retry: RetryConfig,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            max_scan_id: 100,
            retry: RetryConfig::default(),
        }
    }
}
