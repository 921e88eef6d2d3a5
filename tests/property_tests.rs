use std::collections::BTreeSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use backon::BackoffBuilder;
use chrono::{TimeZone, Utc};
use proptest::prelude::*;

use chainpos::aggregator::{SaleLine, SalesAggregator, ScanConfig, TransactionPayload};
use chainpos::contracts::{LedgerError, TransactionRecord};
use chainpos::crypto::PayloadCipher;
use chainpos::ledger::retry::{resilient_read, RetryConfig};
use chainpos::ledger::MemoryLedger;
use chainpos::metrics::ScanMetrics;

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
        .unwrap()
}

// =============================================================================
// Retry properties
// =============================================================================

/// Property: n transient failures followed by success take exactly n + 1
/// attempts, and the total backoff slept is base * (1 + 2 + .. + n).
fn prop_retry_attempt_count(transients: usize, max_attempts: usize, base_ms: u64) {
    let config = RetryConfig {
        max_attempts,
        base_delay: Duration::from_millis(base_ms),
    };
    let attempts = AtomicUsize::new(0);

    runtime().block_on(async {
        tokio::time::pause();
        let started = tokio::time::Instant::now();

        let value = resilient_read(&config, || {
            let n = attempts.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < transients {
                    Err(LedgerError::NetworkError(format!("transient-{n}")))
                } else {
                    Ok(7u32)
                }
            }
        })
        .await
        .unwrap();

        assert_eq!(value, 7);
        assert_eq!(attempts.load(Ordering::SeqCst), transients + 1);

        // The timer has millisecond granularity, so each sleep may overshoot
        // by a moment even under paused time.
        let slept_ms = (1..=transients as u64).map(|n| base_ms * n).sum::<u64>();
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_millis(slept_ms));
        assert!(elapsed <= Duration::from_millis(slept_ms + 2 * transients as u64));
    });
}

/// Property: the backoff schedule has max_attempts - 1 entries and the k-th
/// delay is exactly k times the base delay.
fn prop_backoff_is_linear(max_attempts: usize, base_ms: u64) {
    let config = RetryConfig {
        max_attempts,
        base_delay: Duration::from_millis(base_ms),
    };
    let delays: Vec<Duration> = config.backoff().build().collect();
    assert_eq!(delays.len(), max_attempts.saturating_sub(1));
    for (i, delay) in delays.iter().enumerate() {
        assert_eq!(*delay, Duration::from_millis(base_ms * (i as u64 + 1)));
    }
}

// =============================================================================
// Aggregation properties
// =============================================================================

/// Property: the sales snapshot equals a direct fold over the seeded payloads,
/// and the monthly labels come out in chronological order.
fn prop_aggregation_matches_direct_fold(sales: &[(i32, u32, Vec<SaleLine>)]) {
    let cipher = Arc::new(PayloadCipher::new(&[11u8; 32]));
    let ledger = Arc::new(MemoryLedger::new());

    let mut expected_revenue = 0.0;
    let mut expected_profit = 0.0;
    let mut expected_units = 0u64;
    let mut months = BTreeSet::new();

    for (year, month, lines) in sales {
        let timestamp = Utc
            .with_ymd_and_hms(*year, *month, 15, 12, 0, 0)
            .unwrap()
            .timestamp();
        let payload = TransactionPayload {
            timestamp,
            items: lines.clone(),
        };
        ledger.push_transaction(TransactionRecord {
            encrypted_payload: cipher
                .encrypt(&serde_json::to_string(&payload).unwrap())
                .unwrap(),
            seller: "0xstaff".to_string(),
            timestamp,
        });

        // Same accumulation order as the scan: per-transaction, then totals.
        let mut tx_revenue = 0.0;
        let mut tx_profit = 0.0;
        for line in lines {
            let quantity = line.quantity as f64;
            tx_revenue += line.selling_price * quantity;
            tx_profit += (line.selling_price - line.cost_price) * quantity;
            expected_units += line.quantity;
        }
        expected_revenue += tx_revenue;
        expected_profit += tx_profit;
        months.insert((*year, *month));
    }

    let aggregator = SalesAggregator::new(
        Arc::clone(&ledger),
        cipher,
        ScanConfig {
            max_scan_id: sales.len() as u64 + 10,
            retry: RetryConfig {
                max_attempts: 1,
                base_delay: Duration::from_millis(1),
            },
        },
        Arc::new(ScanMetrics::default()),
    );

    let snapshot = runtime().block_on(aggregator.aggregate()).unwrap();

    assert_eq!(snapshot.transactions_aggregated, sales.len() as u64);
    assert_eq!(snapshot.units_sold, expected_units);
    assert_eq!(snapshot.total_revenue, expected_revenue);
    assert_eq!(snapshot.total_profit, expected_profit);

    let expected_labels: Vec<String> = months
        .iter()
        .map(|(year, month)| {
            Utc.with_ymd_and_hms(*year, *month, 15, 12, 0, 0)
                .unwrap()
                .format("%b %Y")
                .to_string()
        })
        .collect();
    assert_eq!(snapshot.timeseries.labels, expected_labels);
    assert_eq!(snapshot.timeseries.monthly_revenue.len(), months.len());
    assert_eq!(snapshot.timeseries.monthly_profit.len(), months.len());
}

// =============================================================================
// Crypto properties
// =============================================================================

/// Property: any non-empty plaintext survives an encrypt/decrypt cycle, and
/// re-encrypting produces a different wire string because the nonce is fresh.
fn prop_encryption_round_trips(plaintext: &str) {
    let cipher = PayloadCipher::new(&[42u8; 32]);
    let first = cipher.encrypt(plaintext).unwrap();
    let second = cipher.encrypt(plaintext).unwrap();
    assert_ne!(first, second);
    assert_eq!(cipher.decrypt(&first).unwrap(), plaintext);
    assert_eq!(cipher.decrypt(&second).unwrap(), plaintext);
}

// =============================================================================
// Proptest strategies
// =============================================================================

prop_compose! {
    fn arb_sale_line()(
        record_id in 1u64..50,
        quantity in 1u64..20,
        cost_cents in 0u32..5_000,
        margin_cents in 0u32..5_000,
    ) -> SaleLine {
        let cost_price = cost_cents as f64 / 100.0;
        SaleLine {
            record_id,
            quantity,
            selling_price: cost_price + margin_cents as f64 / 100.0,
            cost_price,
        }
    }
}

prop_compose! {
    fn arb_sale()(
        year in 2023i32..2026,
        month in 1u32..=12,
        lines in prop::collection::vec(arb_sale_line(), 1..5),
    ) -> (i32, u32, Vec<SaleLine>) {
        (year, month, lines)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(50))]

        #[test]
        fn test_retry_attempt_count(
            transients in 0usize..4,
            extra_budget in 1usize..3,
            base_ms in 1u64..1_000,
        ) {
            prop_retry_attempt_count(transients, transients + extra_budget, base_ms);
        }

        #[test]
        fn test_backoff_is_linear(
            max_attempts in 1usize..8,
            base_ms in 1u64..1_000,
        ) {
            prop_backoff_is_linear(max_attempts, base_ms);
        }

        #[test]
        fn test_aggregation_matches_direct_fold(
            sales in prop::collection::vec(arb_sale(), 0..12),
        ) {
            prop_aggregation_matches_direct_fold(&sales);
        }

        #[test]
        fn test_encryption_round_trips(plaintext in ".{1,200}") {
            prop_encryption_round_trips(&plaintext);
        }
    }
}
