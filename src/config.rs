//! Process configuration.
//!
//! Everything the core logic needs is read here once at startup and passed
//! down as explicit structs; no module reads ambient environment state after
//! construction.

use crate::aggregator::ScanConfig;
use crate::api::ServerConfig;
use crate::ledger::retry::RetryConfig;
use crate::poller::PollerConfig;

/// Development-only key. Deployments must set `CHAINPOS_ENCRYPTION_KEY`.
pub const DEV_ENCRYPTION_KEY_HEX: &str =
    "636861696e706f732d6465762d6b65792d636861696e706f732d6465762d6b65";

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    /// Hex-encoded 32-byte deployment key for payload encryption.
    pub encryption_key_hex: String,
    pub scan: ScanConfig,
    pub poller: PollerConfig,
    /// Wallet seeded with the Manager and Staff roles at startup.
    pub manager_address: String,
}

impl AppConfig {
    /// Creates the configuration from environment variables.
    ///
    /// Environment variables:
    /// - `CHAINPOS_HOST` / `CHAINPOS_PORT`: HTTP bind address (default 0.0.0.0:8080)
    /// - `CHAINPOS_ENCRYPTION_KEY`: hex-encoded 32-byte key
    /// - `CHAINPOS_MAX_SCAN_ID`: scan ceiling per ID space (default: 100)
    /// - `CHAINPOS_MANAGER_ADDR`: manager wallet (default: "0xmanager")
    /// - plus the retry and poller variables documented on their configs
    pub fn from_env() -> Self {
        let default_server = ServerConfig::default();
        let server = ServerConfig {
            host: std::env::var("CHAINPOS_HOST").unwrap_or(default_server.host),
            port: std::env::var("CHAINPOS_PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(default_server.port),
        };

        let encryption_key_hex = match std::env::var("CHAINPOS_ENCRYPTION_KEY") {
            Ok(key) => key,
            Err(_) => {
                tracing::warn!(
                    "CHAINPOS_ENCRYPTION_KEY not set, using the development key"
                );
                DEV_ENCRYPTION_KEY_HEX.to_string()
            }
        };

        let scan = ScanConfig {
            max_scan_id: std::env::var("CHAINPOS_MAX_SCAN_ID")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(ScanConfig::default().max_scan_id),
            retry: RetryConfig::from_env(),
        };

        Self {
            server,
            encryption_key_hex,
            scan,
            poller: PollerConfig::from_env(),
            manager_address: std::env::var("CHAINPOS_MANAGER_ADDR")
                .unwrap_or_else(|_| "0xmanager".to_string()),
        }
    }
}
