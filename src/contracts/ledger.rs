use std::future::Future;

use serde::{Deserialize, Serialize};

use crate::contracts::error::LedgerError;

/// A sales transaction as stored on the ledger.
///
/// The payload is opaque ciphertext; only the submitting wallet and the
/// ledger-assigned timestamp are readable without the deployment key. An empty
/// payload marks a deleted/unused slot, which scans must skip, not stop at.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionRecord {
    pub encrypted_payload: String,
    pub seller: String,
    /// Unix seconds, assigned by the ledger at submission.
    pub timestamp: i64,
}

/// An inventory item as stored on the ledger: opaque ciphertext plus the
/// plaintext stock counters the ledger maintains itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemRecord {
    pub encrypted_payload: String,
    pub current_stock: u64,
    pub total_sold: u64,
}

/// A staff account slot on the registry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StaffAccount {
    pub wallet_address: String,
    pub username: String,
    /// Unix seconds.
    pub created_at: i64,
    /// False for a reserved-but-revoked slot; scans skip these.
    pub exists: bool,
}

/// Roles resolved by the authoritative registry lookup.
///
/// Never inferred from usernames or any other free-text field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Manager,
    Staff,
}

/// Read/write contract for the transaction ledger.
///
/// # Behavior
/// - Transaction IDs are dense positive integers assigned from 1.
/// - `transaction` returns `LedgerError::NotFound` past the populated range
///   and an empty-payload record for a deleted slot inside it.
pub trait TransactionLedger: Send + Sync {
    /// Fetches the transaction stored at `id`.
    fn transaction(
        &self,
        id: u64,
    ) -> impl Future<Output = Result<TransactionRecord, LedgerError>> + Send;

    /// Submits an encrypted sale payload. Returns the assigned transaction ID.
    fn process_sale(
        &self,
        encrypted_payload: &str,
        seller: &str,
    ) -> impl Future<Output = Result<u64, LedgerError>> + Send;
}

/// Read/write contract for the inventory ledger.
pub trait InventoryLedger: Send + Sync {
    /// Fetches the item stored at `id`.
    fn item(&self, id: u64) -> impl Future<Output = Result<ItemRecord, LedgerError>> + Send;

    /// Adds a new item with an encrypted detail payload. Returns the record ID.
    fn add_item(
        &self,
        encrypted_payload: &str,
        initial_stock: u64,
    ) -> impl Future<Output = Result<u64, LedgerError>> + Send;

    /// Adjusts stock by `delta` (negative for a sale).
    fn update_stock(
        &self,
        id: u64,
        delta: i64,
    ) -> impl Future<Output = Result<(), LedgerError>> + Send;
}

/// Read/write contract for the staff registry.
pub trait StaffRegistry: Send + Sync {
    /// Fetches the staff account stored at `id`.
    fn staff_account(
        &self,
        id: u64,
    ) -> impl Future<Output = Result<StaffAccount, LedgerError>> + Send;

    /// Authoritative role check for an account.
    fn has_role(
        &self,
        role: Role,
        account: &str,
    ) -> impl Future<Output = Result<bool, LedgerError>> + Send;

    /// Registers a staff account and grants it the Staff role.
    /// Returns the assigned staff ID.
    fn create_staff_account(
        &self,
        username: &str,
        wallet_address: &str,
    ) -> impl Future<Output = Result<u64, LedgerError>> + Send;
}
