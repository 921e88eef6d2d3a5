use std::collections::BTreeMap;
use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::Json;
use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::aggregator::{InventoryItem, SaleLine, SalesSnapshot, TransactionPayload};
use crate::contracts::{
    InventoryLedger, LedgerError, PosError, Role, StaffAccount, StaffRegistry, TransactionLedger,
};
use crate::crypto::PayloadCipher;
use crate::metrics::MetricsRegistry;
use crate::poller::{SharedSnapshot, SnapshotPoller};

/// Application state shared across handlers.
pub struct AppState<L>
where
    L: TransactionLedger + InventoryLedger + StaffRegistry + 'static,
{
    pub ledger: Arc<L>,
    pub cipher: Arc<PayloadCipher>,
    pub poller: Arc<SnapshotPoller<L>>,
    pub snapshot: Arc<SharedSnapshot>,
    pub registry: Arc<MetricsRegistry>,
}

impl<L> AppState<L>
where
    L: TransactionLedger + InventoryLedger + StaffRegistry + 'static,
{
    pub fn new(
        ledger: Arc<L>,
        cipher: Arc<PayloadCipher>,
        poller: Arc<SnapshotPoller<L>>,
        registry: Arc<MetricsRegistry>,
    ) -> Self {
        let snapshot = poller.snapshot();
        Self {
            ledger,
            cipher,
            poller,
            snapshot,
            registry,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

fn error_response(e: PosError) -> (StatusCode, Json<ErrorBody>) {
    let status = match &e {
        PosError::Ledger(LedgerError::NotFound { .. }) => StatusCode::NOT_FOUND,
        PosError::Ledger(LedgerError::Unauthorized(_)) => StatusCode::FORBIDDEN,
        PosError::Ledger(err) if err.is_transient() => StatusCode::BAD_GATEWAY,
        PosError::Ledger(_) => StatusCode::UNPROCESSABLE_ENTITY,
        PosError::Setup(_) => StatusCode::SERVICE_UNAVAILABLE,
        PosError::Crypto(_) | PosError::Json(_) | PosError::LockPoisoned(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    (
        status,
        Json(ErrorBody {
            error: e.to_string(),
        }),
    )
}

pub async fn health_check() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

pub async fn metrics_text<L>(State(state): State<Arc<AppState<L>>>) -> impl IntoResponse
where
    L: TransactionLedger + InventoryLedger + StaffRegistry + 'static,
{
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.registry.format_prometheus(),
    )
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SalesSummaryResponse {
    pub pass: u64,
    pub refreshed_at: i64,
    #[serde(flatten)]
    pub sales: SalesSnapshot,
}

pub async fn get_sales_summary<L>(
    State(state): State<Arc<AppState<L>>>,
) -> Result<Json<SalesSummaryResponse>, (StatusCode, Json<ErrorBody>)>
where
    L: TransactionLedger + InventoryLedger + StaffRegistry + 'static,
{
    state.registry.api.record_request("/sales/summary");

    let latest = state.snapshot.latest().map_err(|e| {
        state.registry.api.record_error();
        error_response(e)
    })?;
    match latest {
        Some(snapshot) => Ok(Json(SalesSummaryResponse {
            pass: snapshot.pass,
            refreshed_at: snapshot.refreshed_at,
            sales: snapshot.sales,
        })),
        None => {
            state.registry.api.record_error();
            let error = state
                .snapshot
                .last_error()
                .ok()
                .flatten()
                .unwrap_or_else(|| "no aggregation pass has completed yet".to_string());
            Err((StatusCode::SERVICE_UNAVAILABLE, Json(ErrorBody { error })))
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct InventoryQuery {
    /// Include items with zero stock. The dashboard hides them by default.
    #[serde(default)]
    pub include_out_of_stock: bool,
}

pub async fn get_inventory<L>(
    State(state): State<Arc<AppState<L>>>,
    Query(query): Query<InventoryQuery>,
) -> Result<Json<Vec<InventoryItem>>, (StatusCode, Json<ErrorBody>)>
where
    L: TransactionLedger + InventoryLedger + StaffRegistry + 'static,
{
    state.registry.api.record_request("/inventory");

    let latest = state.snapshot.latest().map_err(|e| {
        state.registry.api.record_error();
        error_response(e)
    })?;
    let items = latest.map(|s| s.inventory).unwrap_or_default();
    let items = if query.include_out_of_stock {
        items
    } else {
        items.into_iter().filter(|i| i.current_stock > 0).collect()
    };
    Ok(Json(items))
}

pub async fn get_staff<L>(
    State(state): State<Arc<AppState<L>>>,
) -> Result<Json<Vec<StaffAccount>>, (StatusCode, Json<ErrorBody>)>
where
    L: TransactionLedger + InventoryLedger + StaffRegistry + 'static,
{
    state.registry.api.record_request("/staff");

    let latest = state.snapshot.latest().map_err(|e| {
        state.registry.api.record_error();
        error_response(e)
    })?;
    Ok(Json(latest.map(|s| s.staff).unwrap_or_default()))
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AddItemRequest {
    pub name: String,
    pub category: String,
    pub cost_price: f64,
    pub selling_price: f64,
    pub initial_stock: u64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AddItemResponse {
    pub record_id: u64,
}

pub async fn add_item<L>(
    State(state): State<Arc<AppState<L>>>,
    Json(request): Json<AddItemRequest>,
) -> Result<(StatusCode, Json<AddItemResponse>), (StatusCode, Json<ErrorBody>)>
where
    L: TransactionLedger + InventoryLedger + StaffRegistry + 'static,
{
    state.registry.api.record_request("/inventory:post");

    if request.name.is_empty() || request.cost_price < 0.0 || request.selling_price < 0.0 {
        state.registry.api.record_error();
        return Err((
            StatusCode::BAD_REQUEST,
            Json(ErrorBody {
                error: "item needs a name and non-negative prices".to_string(),
            }),
        ));
    }

    let details = crate::aggregator::ItemDetails {
        name: request.name,
        category: request.category,
        cost_price: request.cost_price,
        selling_price: request.selling_price,
    };
    let result: Result<u64, PosError> = async {
        let plaintext = serde_json::to_string(&details)?;
        let encrypted = state.cipher.encrypt(&plaintext)?;
        Ok(state.ledger.add_item(&encrypted, request.initial_stock).await?)
    }
    .await;

    match result {
        Ok(record_id) => Ok((StatusCode::CREATED, Json(AddItemResponse { record_id }))),
        Err(e) => {
            state.registry.api.record_error();
            Err(error_response(e))
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RecordSaleRequest {
    /// Wallet of the staff member recording the sale. Must hold the Staff
    /// role on the registry; the role is never inferred from the username.
    pub seller: String,
    pub items: Vec<SaleLine>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RecordSaleResponse {
    pub tx_id: u64,
}

pub async fn record_sale<L>(
    State(state): State<Arc<AppState<L>>>,
    Json(request): Json<RecordSaleRequest>,
) -> Result<(StatusCode, Json<RecordSaleResponse>), (StatusCode, Json<ErrorBody>)>
where
    L: TransactionLedger + InventoryLedger + StaffRegistry + 'static,
{
    state.registry.api.record_request("/sales:post");

    if request.items.is_empty() {
        state.registry.api.record_error();
        return Err((
            StatusCode::BAD_REQUEST,
            Json(ErrorBody {
                error: "a sale needs at least one line".to_string(),
            }),
        ));
    }

    let result: Result<u64, PosError> = async {
        let allowed = state
            .ledger
            .has_role(Role::Staff, &request.seller)
            .await?;
        if !allowed {
            return Err(LedgerError::Unauthorized(format!(
                "{} does not hold the staff role",
                request.seller
            ))
            .into());
        }

        // Validate every line against current stock before touching anything:
        // a rejected sale must leave no partial drawdowns behind. Quantities
        // are merged per record so repeated lines are checked as one total.
        let mut totals: BTreeMap<u64, u64> = BTreeMap::new();
        for line in &request.items {
            *totals.entry(line.record_id).or_default() += line.quantity;
        }
        for (&record_id, &quantity) in &totals {
            let record = state.ledger.item(record_id).await?;
            if record.current_stock < quantity {
                return Err(LedgerError::Other(format!(
                    "insufficient stock for record {record_id}: {} on hand, {quantity} requested",
                    record.current_stock
                ))
                .into());
            }
        }
        for (&record_id, &quantity) in &totals {
            state.ledger.update_stock(record_id, -(quantity as i64)).await?;
        }

        let payload = TransactionPayload {
            timestamp: Utc::now().timestamp(),
            items: request.items.clone(),
        };
        let plaintext = serde_json::to_string(&payload)?;
        let encrypted = state.cipher.encrypt(&plaintext)?;
        Ok(state.ledger.process_sale(&encrypted, &request.seller).await?)
    }
    .await;

    match result {
        Ok(tx_id) => Ok((StatusCode::CREATED, Json(RecordSaleResponse { tx_id }))),
        Err(e) => {
            state.registry.api.record_error();
            Err(error_response(e))
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CreateStaffRequest {
    pub username: String,
    pub wallet_address: String,
    /// Wallet of the manager authorizing the account.
    pub manager: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CreateStaffResponse {
    pub staff_id: u64,
}

pub async fn create_staff<L>(
    State(state): State<Arc<AppState<L>>>,
    Json(request): Json<CreateStaffRequest>,
) -> Result<(StatusCode, Json<CreateStaffResponse>), (StatusCode, Json<ErrorBody>)>
where
    L: TransactionLedger + InventoryLedger + StaffRegistry + 'static,
{
    state.registry.api.record_request("/staff:post");

    let result: Result<u64, PosError> = async {
        let allowed = state.ledger.has_role(Role::Manager, &request.manager).await?;
        if !allowed {
            return Err(LedgerError::Unauthorized(format!(
                "{} does not hold the manager role",
                request.manager
            ))
            .into());
        }
        Ok(state
            .ledger
            .create_staff_account(&request.username, &request.wallet_address)
            .await?)
    }
    .await;

    match result {
        Ok(staff_id) => Ok((StatusCode::CREATED, Json(CreateStaffResponse { staff_id }))),
        Err(e) => {
            state.registry.api.record_error();
            Err(error_response(e))
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RefreshResponse {
    pub pass: u64,
    pub refreshed_at: i64,
    pub transactions_aggregated: u64,
    pub items: usize,
    pub staff: usize,
}

/// Forces an aggregation pass outside the polling cadence.
pub async fn refresh<L>(
    State(state): State<Arc<AppState<L>>>,
) -> Result<Json<RefreshResponse>, (StatusCode, Json<ErrorBody>)>
where
    L: TransactionLedger + InventoryLedger + StaffRegistry + 'static,
{
    state.registry.api.record_request("/refresh");

    match state.poller.refresh_now().await {
        Ok(snapshot) => Ok(Json(RefreshResponse {
            pass: snapshot.pass,
            refreshed_at: snapshot.refreshed_at,
            transactions_aggregated: snapshot.sales.transactions_aggregated,
            items: snapshot.inventory.len(),
            staff: snapshot.staff.len(),
        })),
        Err(e) => {
            state.registry.api.record_error();
            Err(error_response(e))
        }
    }
}
