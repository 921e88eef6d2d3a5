//! Periodic re-aggregation with cancel-on-teardown semantics.
//!
//! The aggregation functions themselves know nothing about polling cadence;
//! this module owns the timer, runs passes, and commits results into a
//! shared snapshot slot. Every pass carries a monotonically increasing pass
//! number and a completed pass is dropped if a newer pass has already
//! committed, so a slow overlapping pass can never overwrite fresher data
//! with stale data.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::Notify;
use tokio::task::JoinHandle;

use crate::aggregator::{
    InventoryItem, InventoryScanner, SalesAggregator, SalesSnapshot, ScanConfig, StaffScanner,
};
use crate::contracts::{
    InventoryLedger, LockResultExt, PosError, StaffAccount, StaffRegistry, TransactionLedger,
};
use crate::crypto::PayloadCipher;
use crate::metrics::ScanMetrics;

/// Configuration for the snapshot poller.
#[derive(Debug, Clone)]
pub struct PollerConfig {
    /// Interval between aggregation passes.
    pub interval: Duration,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(30),
        }
    }
}

impl PollerConfig {
    /// Creates a config from environment variables.
    ///
    /// Reads `CHAINPOS_POLL_INTERVAL_SECS` (default: 30).
    pub fn from_env() -> Self {
        let default = Self::default();
        Self {
            interval: std::env::var("CHAINPOS_POLL_INTERVAL_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(default.interval),
        }
    }
}

/// The complete read model produced by one aggregation pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DashboardSnapshot {
    /// Pass sequence number; higher means fresher.
    pub pass: u64,
    /// Unix seconds when the pass completed.
    pub refreshed_at: i64,
    pub sales: SalesSnapshot,
    pub inventory: Vec<InventoryItem>,
    pub staff: Vec<StaffAccount>,
}

#[derive(Default)]
struct SnapshotState {
    latest: Option<DashboardSnapshot>,
    last_error: Option<String>,
    committed_pass: u64,
}

/// The single mutable snapshot slot shared between the poller and the API.
///
/// The last successful snapshot survives failed passes; only a newer
/// successful pass replaces it.
#[derive(Default)]
pub struct SharedSnapshot {
    state: RwLock<SnapshotState>,
}

impl SharedSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the latest committed snapshot, if any pass has completed.
    pub fn latest(&self) -> Result<Option<DashboardSnapshot>, PosError> {
        Ok(self.state.read().map_lock_err()?.latest.clone())
    }

    /// Returns the error from the most recent failed pass, if newer than the
    /// last committed snapshot.
    pub fn last_error(&self) -> Result<Option<String>, PosError> {
        Ok(self.state.read().map_lock_err()?.last_error.clone())
    }

    /// Commits a completed pass. Returns false (and changes nothing) when a
    /// newer pass has already committed.
    pub fn commit(&self, snapshot: DashboardSnapshot) -> Result<bool, PosError> {
        let mut state = self.state.write().map_lock_err()?;
        if snapshot.pass <= state.committed_pass {
            return Ok(false);
        }
        state.committed_pass = snapshot.pass;
        state.latest = Some(snapshot);
        state.last_error = None;
        Ok(true)
    }

    /// Records a failed pass without touching the last good snapshot.
    pub fn record_pass_error(&self, pass: u64, message: String) -> Result<(), PosError> {
        let mut state = self.state.write().map_lock_err()?;
        if pass > state.committed_pass {
            state.last_error = Some(message);
        }
        Ok(())
    }
}

/// The three scans that make up one pass, run strictly in sequence.
struct PassRunner<L> {
    sales: SalesAggregator<L>,
    inventory: InventoryScanner<L>,
    staff: StaffScanner<L>,
}

impl<L> PassRunner<L>
where
    L: TransactionLedger + InventoryLedger + StaffRegistry,
{
    async fn run(&self, pass: u64) -> Result<DashboardSnapshot, PosError> {
        let sales = self.sales.aggregate().await?;
        let inventory = self.inventory.scan().await?;
        let staff = self.staff.scan().await?;
        Ok(DashboardSnapshot {
            pass,
            refreshed_at: Utc::now().timestamp(),
            sales,
            inventory,
            staff,
        })
    }
}

/// Background task that re-aggregates the read model on a fixed interval.
pub struct SnapshotPoller<L>
where
    L: TransactionLedger + InventoryLedger + StaffRegistry + 'static,
{
    runner: Arc<PassRunner<L>>,
    snapshot: Arc<SharedSnapshot>,
    metrics: Arc<ScanMetrics>,
    config: PollerConfig,
    /// Pass numbers handed out so far; the next pass gets this + 1.
    next_pass: Arc<AtomicU64>,
    /// Flag to signal shutdown
    shutdown: Arc<AtomicBool>,
    /// Wakes the background task out of its interval sleep
    wake: Arc<Notify>,
    /// Handle to the background task
    task_handle: RwLock<Option<JoinHandle<()>>>,
}

impl<L> SnapshotPoller<L>
where
    L: TransactionLedger + InventoryLedger + StaffRegistry + 'static,
{
    pub fn new(
        ledger: Arc<L>,
        cipher: Arc<PayloadCipher>,
        scan_config: ScanConfig,
        config: PollerConfig,
        metrics: Arc<ScanMetrics>,
    ) -> Self {
        let runner = PassRunner {
            sales: SalesAggregator::new(
                Arc::clone(&ledger),
                Arc::clone(&cipher),
                scan_config.clone(),
                Arc::clone(&metrics),
            ),
            inventory: InventoryScanner::new(
                Arc::clone(&ledger),
                Arc::clone(&cipher),
                scan_config.clone(),
                Arc::clone(&metrics),
            ),
            staff: StaffScanner::new(ledger, scan_config, Arc::clone(&metrics)),
        };
        Self {
            runner: Arc::new(runner),
            snapshot: Arc::new(SharedSnapshot::new()),
            metrics,
            config,
            next_pass: Arc::new(AtomicU64::new(0)),
            shutdown: Arc::new(AtomicBool::new(false)),
            wake: Arc::new(Notify::new()),
            task_handle: RwLock::new(None),
        }
    }

    /// The snapshot slot this poller commits into.
    pub fn snapshot(&self) -> Arc<SharedSnapshot> {
        Arc::clone(&self.snapshot)
    }

    /// Runs one pass end to end and commits it (unless stale by the time it
    /// finishes). Returns the snapshot produced by this pass either way.
    async fn run_pass(
        runner: &PassRunner<L>,
        snapshot: &SharedSnapshot,
        metrics: &ScanMetrics,
        next_pass: &AtomicU64,
    ) -> Result<DashboardSnapshot, PosError> {
        let pass = next_pass.fetch_add(1, Ordering::SeqCst) + 1;
        let started = Instant::now();

        match runner.run(pass).await {
            Ok(result) => {
                let duration_us = started.elapsed().as_micros() as u64;
                if snapshot.commit(result.clone())? {
                    metrics.record_pass(duration_us);
                    tracing::info!(
                        pass,
                        duration_us,
                        transactions = result.sales.transactions_aggregated,
                        items = result.inventory.len(),
                        "aggregation pass committed"
                    );
                } else {
                    metrics.record_stale_drop();
                    tracing::warn!(pass, "dropping stale aggregation pass");
                }
                Ok(result)
            }
            Err(e) => {
                metrics.record_pass_error();
                snapshot.record_pass_error(pass, e.to_string())?;
                tracing::error!(pass, error = %e, "aggregation pass failed");
                Err(e)
            }
        }
    }

    /// Starts the poller background task. The first pass runs immediately.
    pub async fn start(&self) -> Result<(), PosError> {
        self.shutdown.store(false, Ordering::SeqCst);

        let runner = Arc::clone(&self.runner);
        let snapshot = Arc::clone(&self.snapshot);
        let metrics = Arc::clone(&self.metrics);
        let next_pass = Arc::clone(&self.next_pass);
        let shutdown = Arc::clone(&self.shutdown);
        let wake = Arc::clone(&self.wake);
        let interval = self.config.interval;

        let handle = tokio::spawn(async move {
            tracing::info!(interval_secs = interval.as_secs(), "poller task started");

            loop {
                if shutdown.load(Ordering::SeqCst) {
                    tracing::info!("poller shutdown requested");
                    break;
                }

                // Pass errors are already recorded in the snapshot slot.
                let _ = Self::run_pass(&runner, &snapshot, &metrics, &next_pass).await;

                tokio::select! {
                    _ = tokio::time::sleep(interval) => {},
                    _ = wake.notified() => {},
                }
            }

            tracing::info!("poller task stopped");
        });

        let mut task_handle = self.task_handle.write().map_lock_err()?;
        *task_handle = Some(handle);

        Ok(())
    }

    /// Stops the poller gracefully and waits for the task to finish.
    pub async fn stop(&self) -> Result<(), PosError> {
        self.shutdown.store(true, Ordering::SeqCst);
        self.wake.notify_one();

        let handle = {
            let mut task_handle = self.task_handle.write().map_lock_err()?;
            task_handle.take()
        };

        if let Some(handle) = handle {
            handle
                .await
                .map_err(|e| PosError::Setup(format!("poller task join error: {e}")))?;
        }

        Ok(())
    }

    /// Runs a pass inline, outside the timer, and returns its snapshot.
    pub async fn refresh_now(&self) -> Result<DashboardSnapshot, PosError> {
        Self::run_pass(
            &self.runner,
            &self.snapshot,
            &self.metrics,
            &self.next_pass,
        )
        .await
    }
}
