use std::fmt::Write;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;

use super::Histogram;

/// Central registry for all chainpos observability metrics.
#[derive(Default)]
pub struct MetricsRegistry {
    /// Aggregation pass / scan metrics
    pub scan: Arc<ScanMetrics>,
    /// HTTP surface metrics
    pub api: Arc<ApiMetrics>,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Formats all metrics in Prometheus exposition format.
    pub fn format_prometheus(&self) -> String {
        let mut output = String::with_capacity(4096);
        output.push_str(&self.scan.format_prometheus());
        output.push_str(&self.api.format_prometheus());
        output
    }
}

/// Metrics for the aggregation passes and their sequential scans.
#[derive(Default)]
pub struct ScanMetrics {
    /// Completed aggregation passes
    pub passes_total: AtomicU64,
    /// Passes that aborted with a top-level error
    pub pass_errors_total: AtomicU64,
    /// Completed passes dropped because a newer pass had already committed
    pub stale_passes_dropped_total: AtomicU64,
    /// Records decrypted and folded into a snapshot
    pub records_aggregated_total: AtomicU64,
    /// Empty-sentinel or revoked slots skipped
    pub records_skipped_total: AtomicU64,
    /// Records skipped because decryption or payload parsing failed
    pub decrypt_failures_total: AtomicU64,
    /// Scans stopped early by an unclassified fetch error
    pub scan_aborts_total: AtomicU64,
    /// Histogram of full-pass durations in microseconds
    pub pass_duration_us: Histogram,
}

impl ScanMetrics {
    #[inline]
    pub fn record_pass(&self, duration_us: u64) {
        self.passes_total.fetch_add(1, Ordering::Relaxed);
        self.pass_duration_us.observe(duration_us);
    }

    #[inline]
    pub fn record_pass_error(&self) {
        self.pass_errors_total.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_stale_drop(&self) {
        self.stale_passes_dropped_total
            .fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_aggregated(&self) {
        self.records_aggregated_total.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_skip(&self) {
        self.records_skipped_total.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_decrypt_failure(&self) {
        self.decrypt_failures_total.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_scan_abort(&self) {
        self.scan_aborts_total.fetch_add(1, Ordering::Relaxed);
    }

    /// Formats scan metrics in Prometheus exposition format.
    pub fn format_prometheus(&self) -> String {
        let mut output = String::with_capacity(1024);

        let counters = [
            (
                "chainpos_passes_total",
                "Completed aggregation passes",
                &self.passes_total,
            ),
            (
                "chainpos_pass_errors_total",
                "Aggregation passes aborted with a top-level error",
                &self.pass_errors_total,
            ),
            (
                "chainpos_stale_passes_dropped_total",
                "Completed passes dropped in favor of a newer snapshot",
                &self.stale_passes_dropped_total,
            ),
            (
                "chainpos_records_aggregated_total",
                "Records folded into snapshots",
                &self.records_aggregated_total,
            ),
            (
                "chainpos_records_skipped_total",
                "Empty or revoked slots skipped during scans",
                &self.records_skipped_total,
            ),
            (
                "chainpos_decrypt_failures_total",
                "Records skipped due to decrypt or parse failure",
                &self.decrypt_failures_total,
            ),
            (
                "chainpos_scan_aborts_total",
                "Scans stopped early by an unclassified fetch error",
                &self.scan_aborts_total,
            ),
        ];
        for (name, help, value) in counters {
            let _ = writeln!(output, "# HELP {name} {help}");
            let _ = writeln!(output, "# TYPE {name} counter");
            let _ = writeln!(output, "{name} {}", value.load(Ordering::Relaxed));
        }

        output.push_str(&self.pass_duration_us.format_prometheus(
            "chainpos_pass_duration_us",
            "Full aggregation pass duration in microseconds",
        ));
        output
    }
}

/// Per-route request counters for the HTTP surface.
#[derive(Default)]
pub struct ApiMetrics {
    requests: DashMap<String, AtomicU64>,
    pub errors_total: AtomicU64,
}

impl ApiMetrics {
    #[inline]
    pub fn record_request(&self, route: &str) {
        self.requests
            .entry(route.to_string())
            .or_default()
            .fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_error(&self) {
        self.errors_total.fetch_add(1, Ordering::Relaxed);
    }

    /// Formats API metrics in Prometheus exposition format.
    pub fn format_prometheus(&self) -> String {
        let mut output = String::with_capacity(512);

        let _ = writeln!(
            output,
            "# HELP chainpos_http_requests_total HTTP requests by route"
        );
        let _ = writeln!(output, "# TYPE chainpos_http_requests_total counter");
        let mut routes: Vec<(String, u64)> = self
            .requests
            .iter()
            .map(|e| (e.key().clone(), e.value().load(Ordering::Relaxed)))
            .collect();
        routes.sort();
        for (route, count) in routes {
            let _ = writeln!(
                output,
                "chainpos_http_requests_total{{route=\"{route}\"}} {count}"
            );
        }

        let _ = writeln!(
            output,
            "# HELP chainpos_http_errors_total HTTP error responses"
        );
        let _ = writeln!(output, "# TYPE chainpos_http_errors_total counter");
        let _ = writeln!(
            output,
            "chainpos_http_errors_total {}",
            self.errors_total.load(Ordering::Relaxed)
        );
        output
    }
}
