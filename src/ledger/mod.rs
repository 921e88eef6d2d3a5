pub mod memory;
pub mod retry;

pub use memory::MemoryLedger;
pub use retry::{resilient_read, LinearBackoff, LinearBuilder, RetryConfig};
