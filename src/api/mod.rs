mod handlers;

use std::future::Future;
use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;

use crate::contracts::{InventoryLedger, StaffRegistry, TransactionLedger};

pub use handlers::{
    AddItemRequest, AppState, CreateStaffRequest, ErrorBody, RecordSaleRequest,
};

/// Creates the API router.
pub fn create_router<L>(state: Arc<AppState<L>>) -> Router
where
    L: TransactionLedger + InventoryLedger + StaffRegistry + 'static,
{
    Router::new()
        .route("/health", get(handlers::health_check))
        .route("/metrics", get(handlers::metrics_text::<L>))
        .route("/sales/summary", get(handlers::get_sales_summary::<L>))
        .route("/sales", post(handlers::record_sale::<L>))
        .route("/inventory", get(handlers::get_inventory::<L>))
        .route("/inventory", post(handlers::add_item::<L>))
        .route("/staff", get(handlers::get_staff::<L>))
        .route("/staff", post(handlers::create_staff::<L>))
        .route("/refresh", post(handlers::refresh::<L>))
        .with_state(state)
}

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 8080,
        }
    }
}

/// Starts the HTTP server.
pub async fn start_server<L, F>(
    config: ServerConfig,
    state: Arc<AppState<L>>,
    shutdown: F,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>>
where
    L: TransactionLedger + InventoryLedger + StaffRegistry + 'static,
    F: Future<Output = ()> + Send + 'static,
{
    let router = create_router(state);
    let addr = format!("{}:{}", config.host, config.port);

    tracing::info!("Starting HTTP server on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await?;

    Ok(())
}
