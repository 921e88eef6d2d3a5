pub mod aggregator;
pub mod api;
pub mod config;
pub mod contracts;
pub mod crypto;
pub mod ledger;
pub mod metrics;
pub mod poller;
