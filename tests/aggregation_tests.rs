use std::sync::Arc;
use std::time::Duration;

use chainpos::aggregator::{
    InventoryScanner, ItemDetails, SaleLine, SalesAggregator, ScanConfig, StaffScanner,
    TransactionPayload,
};
use chainpos::contracts::{
    ItemRecord, LedgerError, PosError, StaffAccount, StaffRegistry, TransactionRecord,
};
use chainpos::crypto::PayloadCipher;
use chainpos::ledger::retry::RetryConfig;
use chainpos::ledger::MemoryLedger;
use chainpos::metrics::ScanMetrics;

const JAN_2024: i64 = 1_704_067_200; // 2024-01-01 00:00:00 UTC
const FEB_2024: i64 = 1_706_745_600; // 2024-02-01 00:00:00 UTC
const MAR_2024: i64 = 1_709_251_200; // 2024-03-01 00:00:00 UTC

fn cipher() -> Arc<PayloadCipher> {
    Arc::new(PayloadCipher::new(&[7u8; 32]))
}

fn scan_config(max_scan_id: u64) -> ScanConfig {
    ScanConfig {
        max_scan_id,
        retry: RetryConfig {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
        },
    }
}

fn aggregator(ledger: &Arc<MemoryLedger>, max_scan_id: u64) -> SalesAggregator<MemoryLedger> {
    SalesAggregator::new(
        Arc::clone(ledger),
        cipher(),
        scan_config(max_scan_id),
        Arc::new(ScanMetrics::default()),
    )
}

/// Seeds one encrypted transaction with a single line and returns its ID.
fn seed_sale(
    ledger: &MemoryLedger,
    timestamp: i64,
    quantity: u64,
    selling_price: f64,
    cost_price: f64,
) -> u64 {
    let payload = TransactionPayload {
        timestamp,
        items: vec![SaleLine {
            record_id: 1,
            quantity,
            selling_price,
            cost_price,
        }],
    };
    let plaintext = serde_json::to_string(&payload).unwrap();
    ledger.push_transaction(TransactionRecord {
        encrypted_payload: cipher().encrypt(&plaintext).unwrap(),
        seller: "0xstaff".to_string(),
        timestamp,
    })
}

#[tokio::test(start_paused = true)]
async fn scan_aggregates_skips_deleted_and_stops_at_not_found() {
    let ledger = Arc::new(MemoryLedger::new());
    // IDs 1, 2, 4 populated; ID 3 deleted (empty sentinel); ID 5 not found.
    seed_sale(&ledger, JAN_2024, 1, 10.0, 4.0);
    seed_sale(&ledger, JAN_2024, 2, 20.0, 8.0);
    seed_sale(&ledger, JAN_2024, 3, 30.0, 12.0);
    seed_sale(&ledger, JAN_2024, 4, 40.0, 16.0);
    ledger.delete_transaction(3);

    let snapshot = aggregator(&ledger, 10).aggregate().await.unwrap();

    assert_eq!(snapshot.transactions_aggregated, 3);
    assert_eq!(snapshot.units_sold, 1 + 2 + 4);
    assert_eq!(snapshot.total_revenue, 10.0 + 40.0 + 160.0);
    assert_eq!(snapshot.total_profit, 6.0 + 24.0 + 96.0);

    // 1..=5 probed in order, 6..=10 never touched.
    assert_eq!(ledger.transaction_fetch_log(), vec![1, 2, 3, 4, 5]);
}

/// The scan deliberately treats two flavors of "no record here" differently:
/// an empty-payload slot is a skip, a NotFound error is a stop. A ledger
/// that raised NotFound for deleted mid-range slots would truncate the scan
/// at the deletion point, losing every later record.
#[tokio::test(start_paused = true)]
async fn skip_versus_stop_asymmetry_is_preserved() {
    // Deleted slot as empty sentinel: scan continues past it.
    let skipping = Arc::new(MemoryLedger::new());
    seed_sale(&skipping, JAN_2024, 1, 10.0, 5.0);
    seed_sale(&skipping, JAN_2024, 1, 10.0, 5.0);
    seed_sale(&skipping, JAN_2024, 1, 10.0, 5.0);
    skipping.delete_transaction(2);
    let snapshot = aggregator(&skipping, 10).aggregate().await.unwrap();
    assert_eq!(snapshot.transactions_aggregated, 2);

    // Same logical situation surfaced as NotFound: scan stops, record 3 is
    // silently lost.
    let stopping = Arc::new(MemoryLedger::new());
    seed_sale(&stopping, JAN_2024, 1, 10.0, 5.0);
    seed_sale(&stopping, JAN_2024, 1, 10.0, 5.0);
    seed_sale(&stopping, JAN_2024, 1, 10.0, 5.0);
    stopping.inject_transaction_fault(2, LedgerError::NotFound { id: 2 });
    let snapshot = aggregator(&stopping, 10).aggregate().await.unwrap();
    assert_eq!(snapshot.transactions_aggregated, 1);
    assert!(!stopping.transaction_fetch_log().contains(&3));
}

#[tokio::test(start_paused = true)]
async fn malformed_payload_is_skipped_not_fatal() {
    let ledger = Arc::new(MemoryLedger::new());
    seed_sale(&ledger, JAN_2024, 1, 10.0, 4.0);
    ledger.push_transaction(TransactionRecord {
        encrypted_payload: cipher().encrypt("definitely not json").unwrap(),
        seller: "0xstaff".to_string(),
        timestamp: JAN_2024,
    });
    seed_sale(&ledger, JAN_2024, 2, 10.0, 4.0);

    let snapshot = aggregator(&ledger, 10).aggregate().await.unwrap();
    assert_eq!(snapshot.transactions_aggregated, 2);
    assert_eq!(snapshot.units_sold, 3);
    // The bad record did not end the scan.
    assert_eq!(ledger.transaction_fetch_log(), vec![1, 2, 3, 4]);
}

#[tokio::test(start_paused = true)]
async fn undecryptable_payload_is_skipped_not_fatal() {
    let ledger = Arc::new(MemoryLedger::new());
    seed_sale(&ledger, JAN_2024, 1, 10.0, 4.0);
    let foreign = PayloadCipher::new(&[9u8; 32]);
    ledger.push_transaction(TransactionRecord {
        encrypted_payload: foreign.encrypt("{\"timestamp\":0,\"items\":[]}").unwrap(),
        seller: "0xstaff".to_string(),
        timestamp: JAN_2024,
    });
    seed_sale(&ledger, JAN_2024, 5, 10.0, 4.0);

    let snapshot = aggregator(&ledger, 10).aggregate().await.unwrap();
    assert_eq!(snapshot.transactions_aggregated, 2);
    assert_eq!(snapshot.units_sold, 6);
}

#[tokio::test(start_paused = true)]
async fn time_series_is_chronological_not_insertion_ordered() {
    let ledger = Arc::new(MemoryLedger::new());
    // Inserted out of order: March first, then January, then February.
    seed_sale(&ledger, MAR_2024, 1, 200.0, 100.0);
    seed_sale(&ledger, JAN_2024, 1, 100.0, 50.0);
    seed_sale(&ledger, FEB_2024, 1, 150.0, 75.0);

    let snapshot = aggregator(&ledger, 10).aggregate().await.unwrap();
    assert_eq!(
        snapshot.timeseries.labels,
        vec!["Jan 2024", "Feb 2024", "Mar 2024"]
    );
    assert_eq!(snapshot.timeseries.monthly_revenue, vec![100.0, 150.0, 200.0]);
    assert_eq!(snapshot.timeseries.monthly_profit, vec![50.0, 75.0, 100.0]);
}

#[tokio::test(start_paused = true)]
async fn month_buckets_accumulate_within_a_month() {
    let ledger = Arc::new(MemoryLedger::new());
    seed_sale(&ledger, JAN_2024, 1, 100.0, 60.0);
    seed_sale(&ledger, JAN_2024 + 86_400 * 20, 1, 50.0, 30.0);

    let snapshot = aggregator(&ledger, 10).aggregate().await.unwrap();
    assert_eq!(snapshot.timeseries.labels, vec!["Jan 2024"]);
    assert_eq!(snapshot.timeseries.monthly_revenue, vec![150.0]);
    assert_eq!(snapshot.timeseries.monthly_profit, vec![60.0]);
}

#[tokio::test(start_paused = true)]
async fn aggregation_is_idempotent_over_an_unchanged_universe() {
    let ledger = Arc::new(MemoryLedger::new());
    seed_sale(&ledger, JAN_2024, 3, 19.99, 7.5);
    seed_sale(&ledger, MAR_2024, 2, 42.0, 17.25);

    let agg = aggregator(&ledger, 10);
    let first = agg.aggregate().await.unwrap();
    let second = agg.aggregate().await.unwrap();
    assert_eq!(first, second);
}

#[tokio::test(start_paused = true)]
async fn transient_fetch_errors_are_absorbed_by_the_retry_budget() {
    let ledger = Arc::new(MemoryLedger::new());
    seed_sale(&ledger, JAN_2024, 1, 10.0, 4.0);
    seed_sale(&ledger, JAN_2024, 1, 10.0, 4.0);
    ledger.inject_transaction_fault(2, LedgerError::NetworkError("blip".to_string()));
    ledger.inject_transaction_fault(2, LedgerError::BadData("blip".to_string()));

    let snapshot = aggregator(&ledger, 10).aggregate().await.unwrap();
    assert_eq!(snapshot.transactions_aggregated, 2);
    // id 2 was attempted three times: two transient failures, then success.
    assert_eq!(ledger.transaction_fetch_log(), vec![1, 2, 2, 2, 3]);
}

#[tokio::test(start_paused = true)]
async fn exhausted_retries_stop_the_scan_but_keep_partial_data() {
    let ledger = Arc::new(MemoryLedger::new());
    seed_sale(&ledger, JAN_2024, 1, 10.0, 4.0);
    seed_sale(&ledger, JAN_2024, 2, 10.0, 4.0);
    seed_sale(&ledger, JAN_2024, 4, 10.0, 4.0);
    for _ in 0..3 {
        ledger.inject_transaction_fault(3, LedgerError::NetworkError("down".to_string()));
    }

    let snapshot = aggregator(&ledger, 10).aggregate().await.unwrap();
    // Records 1 and 2 survive; the scan never reaches record 3's data or 4.
    assert_eq!(snapshot.transactions_aggregated, 2);
    assert!(!ledger.transaction_fetch_log().contains(&4));
}

#[tokio::test(start_paused = true)]
async fn terminal_failure_on_the_first_probe_is_a_top_level_error() {
    let ledger = Arc::new(MemoryLedger::new());
    seed_sale(&ledger, JAN_2024, 1, 10.0, 4.0);
    ledger.inject_transaction_fault(1, LedgerError::Other("provider misconfigured".to_string()));

    let err = aggregator(&ledger, 10).aggregate().await.unwrap_err();
    assert!(matches!(err, PosError::Setup(_)));
}

#[tokio::test(start_paused = true)]
async fn empty_universe_yields_an_empty_snapshot() {
    let ledger = Arc::new(MemoryLedger::new());
    let snapshot = aggregator(&ledger, 10).aggregate().await.unwrap();
    assert_eq!(snapshot.transactions_aggregated, 0);
    assert!(snapshot.timeseries.labels.is_empty());
    assert_eq!(ledger.transaction_fetch_log(), vec![1]);
}

#[tokio::test(start_paused = true)]
async fn inventory_scan_joins_counters_with_decrypted_details() {
    let ledger = Arc::new(MemoryLedger::new());
    let c = cipher();
    for (name, stock, sold) in [("Americano", 12, 30), ("Flat White", 0, 44)] {
        let details = ItemDetails {
            name: name.to_string(),
            category: "coffee".to_string(),
            cost_price: 1.2,
            selling_price: 3.5,
        };
        ledger.push_item(ItemRecord {
            encrypted_payload: c.encrypt(&serde_json::to_string(&details).unwrap()).unwrap(),
            current_stock: stock,
            total_sold: sold,
        });
    }
    ledger.push_item(ItemRecord {
        encrypted_payload: String::new(), // deleted slot
        current_stock: 0,
        total_sold: 0,
    });

    let scanner = InventoryScanner::new(
        Arc::clone(&ledger),
        c,
        scan_config(10),
        Arc::new(ScanMetrics::default()),
    );
    let items = scanner.scan().await.unwrap();

    assert_eq!(items.len(), 2);
    assert_eq!(items[0].record_id, 1);
    assert_eq!(items[0].name, "Americano");
    assert_eq!(items[0].current_stock, 12);
    assert_eq!(items[1].total_sold, 44);
}

#[tokio::test(start_paused = true)]
async fn staff_scan_skips_revoked_slots_and_stops_at_the_end() {
    let ledger = Arc::new(MemoryLedger::with_manager("0xboss"));
    ledger.push_staff(StaffAccount {
        wallet_address: "0xrevoked".to_string(),
        username: "former_employee".to_string(),
        created_at: JAN_2024,
        exists: false,
    });
    ledger
        .create_staff_account("alice", "0xalice")
        .await
        .unwrap();

    let scanner = StaffScanner::new(
        Arc::clone(&ledger),
        scan_config(10),
        Arc::new(ScanMetrics::default()),
    );
    let accounts: Vec<StaffAccount> = scanner.scan().await.unwrap();
    // The revoked slot between live accounts is skipped, not a stop signal.
    assert_eq!(accounts.len(), 2);
    assert_eq!(accounts[0].username, "manager");
    assert_eq!(accounts[1].username, "alice");
}

#[tokio::test(start_paused = true)]
async fn staff_scan_stops_on_a_not_found_fault_mid_range() {
    let ledger = Arc::new(MemoryLedger::with_manager("0xboss"));
    ledger
        .create_staff_account("alice", "0xalice")
        .await
        .unwrap();
    ledger.inject_staff_fault(2, LedgerError::NotFound { id: 2 });

    let scanner = StaffScanner::new(
        Arc::clone(&ledger),
        scan_config(10),
        Arc::new(ScanMetrics::default()),
    );
    let accounts: Vec<StaffAccount> = scanner.scan().await.unwrap();
    assert_eq!(accounts.len(), 1);
    assert_eq!(accounts[0].username, "manager");
}
