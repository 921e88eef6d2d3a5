use std::fmt::Write;
use std::sync::atomic::{AtomicU64, Ordering};

/// Upper bounds (microseconds) of the duration buckets.
const BOUNDS_US: [u64; 8] = [
    100,
    500,
    1_000,
    5_000,
    10_000,
    50_000,
    100_000,
    1_000_000,
];

/// Lock-free duration histogram with fixed microsecond buckets.
pub struct Histogram {
    buckets: [AtomicU64; BOUNDS_US.len()],
    overflow: AtomicU64,
    count: AtomicU64,
    sum: AtomicU64,
}

impl Default for Histogram {
    fn default() -> Self {
        Self {
            buckets: std::array::from_fn(|_| AtomicU64::new(0)),
            overflow: AtomicU64::new(0),
            count: AtomicU64::new(0),
            sum: AtomicU64::new(0),
        }
    }
}

impl Histogram {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records one observation in microseconds.
    pub fn observe(&self, value_us: u64) {
        match BOUNDS_US.iter().position(|&bound| value_us <= bound) {
            Some(i) => self.buckets[i].fetch_add(1, Ordering::Relaxed),
            None => self.overflow.fetch_add(1, Ordering::Relaxed),
        };
        self.count.fetch_add(1, Ordering::Relaxed);
        self.sum.fetch_add(value_us, Ordering::Relaxed);
    }

    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }

    pub fn sum(&self) -> u64 {
        self.sum.load(Ordering::Relaxed)
    }

    /// Formats the histogram in Prometheus exposition format with
    /// cumulative bucket counts.
    pub fn format_prometheus(&self, name: &str, help: &str) -> String {
        let mut output = String::with_capacity(512);
        let _ = writeln!(output, "# HELP {name} {help}");
        let _ = writeln!(output, "# TYPE {name} histogram");

        let mut cumulative = 0u64;
        for (i, bound) in BOUNDS_US.iter().enumerate() {
            cumulative += self.buckets[i].load(Ordering::Relaxed);
            let _ = writeln!(output, "{name}_bucket{{le=\"{bound}\"}} {cumulative}");
        }
        cumulative += self.overflow.load(Ordering::Relaxed);
        let _ = writeln!(output, "{name}_bucket{{le=\"+Inf\"}} {cumulative}");
        let _ = writeln!(output, "{name}_sum {}", self.sum());
        let _ = writeln!(output, "{name}_count {}", self.count());
        output
    }
}
