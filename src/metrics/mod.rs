//! Observability metrics for the scan pipeline and the HTTP surface.

mod histogram;
mod registry;

pub use histogram::Histogram;
pub use registry::{ApiMetrics, MetricsRegistry, ScanMetrics};
