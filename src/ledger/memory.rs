//! In-process ledger used for local deployments and tests.
//!
//! IDs are dense and assigned from 1 in submission order, matching the
//! on-chain contracts. A deleted slot keeps its ID and returns an
//! empty-payload record (the skip sentinel); an ID past the populated range
//! returns `NotFound` (the stop signal). Faults can be scripted per ID to
//! exercise the retry and scan-termination paths.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Mutex, MutexGuard};

use chrono::Utc;

use crate::contracts::{
    InventoryLedger, ItemRecord, LedgerError, Role, StaffAccount, StaffRegistry,
    TransactionLedger, TransactionRecord,
};

#[derive(Default)]
struct Inner {
    transactions: Vec<TransactionRecord>,
    items: Vec<ItemRecord>,
    staff: Vec<StaffAccount>,
    roles: HashSet<(Role, String)>,
    transaction_faults: HashMap<u64, VecDeque<LedgerError>>,
    item_faults: HashMap<u64, VecDeque<LedgerError>>,
    staff_faults: HashMap<u64, VecDeque<LedgerError>>,
    transaction_fetch_log: Vec<u64>,
}

#[derive(Default)]
pub struct MemoryLedger {
    inner: Mutex<Inner>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a ledger with a seeded manager account holding both roles.
    pub fn with_manager(wallet_address: &str) -> Self {
        let ledger = Self::new();
        {
            let mut inner = ledger.inner.lock().expect("fresh mutex");
            inner.staff.push(StaffAccount {
                wallet_address: wallet_address.to_string(),
                username: "manager".to_string(),
                created_at: Utc::now().timestamp(),
                exists: true,
            });
            inner
                .roles
                .insert((Role::Manager, wallet_address.to_string()));
            inner.roles.insert((Role::Staff, wallet_address.to_string()));
        }
        ledger
    }

    fn lock(&self) -> Result<MutexGuard<'_, Inner>, LedgerError> {
        self.inner
            .lock()
            .map_err(|e| LedgerError::Other(format!("ledger lock poisoned: {e}")))
    }

    /// Seeds a transaction record directly, preserving its timestamp.
    pub fn push_transaction(&self, record: TransactionRecord) -> u64 {
        let mut inner = self.inner.lock().expect("ledger lock poisoned");
        inner.transactions.push(record);
        inner.transactions.len() as u64
    }

    /// Seeds an item record directly.
    pub fn push_item(&self, record: ItemRecord) -> u64 {
        let mut inner = self.inner.lock().expect("ledger lock poisoned");
        inner.items.push(record);
        inner.items.len() as u64
    }

    /// Seeds a staff slot directly, allowing revoked (`exists: false`) slots.
    pub fn push_staff(&self, account: StaffAccount) -> u64 {
        let mut inner = self.inner.lock().expect("ledger lock poisoned");
        inner.staff.push(account);
        inner.staff.len() as u64
    }

    /// Grants a role to an account.
    pub fn grant_role(&self, role: Role, account: &str) {
        let mut inner = self.inner.lock().expect("ledger lock poisoned");
        inner.roles.insert((role, account.to_string()));
    }

    /// Marks a transaction slot deleted: the ID stays, the payload empties.
    pub fn delete_transaction(&self, id: u64) {
        let mut inner = self.inner.lock().expect("ledger lock poisoned");
        if let Some(record) = inner.transactions.get_mut(id as usize - 1) {
            record.encrypted_payload.clear();
        }
    }

    /// Marks an item slot deleted.
    pub fn delete_item(&self, id: u64) {
        let mut inner = self.inner.lock().expect("ledger lock poisoned");
        if let Some(record) = inner.items.get_mut(id as usize - 1) {
            record.encrypted_payload.clear();
        }
    }

    /// Scripts a one-shot fault for the next `transaction(id)` call.
    /// Multiple injections for the same ID are consumed in order.
    pub fn inject_transaction_fault(&self, id: u64, error: LedgerError) {
        let mut inner = self.inner.lock().expect("ledger lock poisoned");
        inner
            .transaction_faults
            .entry(id)
            .or_default()
            .push_back(error);
    }

    /// Scripts a one-shot fault for the next `item(id)` call.
    pub fn inject_item_fault(&self, id: u64, error: LedgerError) {
        let mut inner = self.inner.lock().expect("ledger lock poisoned");
        inner.item_faults.entry(id).or_default().push_back(error);
    }

    /// Scripts a one-shot fault for the next `staff_account(id)` call.
    pub fn inject_staff_fault(&self, id: u64, error: LedgerError) {
        let mut inner = self.inner.lock().expect("ledger lock poisoned");
        inner.staff_faults.entry(id).or_default().push_back(error);
    }

    /// IDs passed to `transaction`, in call order. Used by scan tests to
    /// prove which slots were probed.
    pub fn transaction_fetch_log(&self) -> Vec<u64> {
        self.inner
            .lock()
            .expect("ledger lock poisoned")
            .transaction_fetch_log
            .clone()
    }
}

fn take_fault(faults: &mut HashMap<u64, VecDeque<LedgerError>>, id: u64) -> Option<LedgerError> {
    let script = faults.get_mut(&id)?;
    let fault = script.pop_front();
    if script.is_empty() {
        faults.remove(&id);
    }
    fault
}

impl TransactionLedger for MemoryLedger {
    async fn transaction(&self, id: u64) -> Result<TransactionRecord, LedgerError> {
        let mut inner = self.lock()?;
        inner.transaction_fetch_log.push(id);
        if let Some(fault) = take_fault(&mut inner.transaction_faults, id) {
            return Err(fault);
        }
        id.checked_sub(1)
            .and_then(|i| inner.transactions.get(i as usize))
            .cloned()
            .ok_or(LedgerError::NotFound { id })
    }

    async fn process_sale(
        &self,
        encrypted_payload: &str,
        seller: &str,
    ) -> Result<u64, LedgerError> {
        if encrypted_payload.is_empty() {
            return Err(LedgerError::Other("empty sale payload".to_string()));
        }
        let mut inner = self.lock()?;
        inner.transactions.push(TransactionRecord {
            encrypted_payload: encrypted_payload.to_string(),
            seller: seller.to_string(),
            timestamp: Utc::now().timestamp(),
        });
        Ok(inner.transactions.len() as u64)
    }
}

impl InventoryLedger for MemoryLedger {
    async fn item(&self, id: u64) -> Result<ItemRecord, LedgerError> {
        let mut inner = self.lock()?;
        if let Some(fault) = take_fault(&mut inner.item_faults, id) {
            return Err(fault);
        }
        id.checked_sub(1)
            .and_then(|i| inner.items.get(i as usize))
            .cloned()
            .ok_or(LedgerError::NotFound { id })
    }

    async fn add_item(
        &self,
        encrypted_payload: &str,
        initial_stock: u64,
    ) -> Result<u64, LedgerError> {
        if encrypted_payload.is_empty() {
            return Err(LedgerError::Other("empty item payload".to_string()));
        }
        let mut inner = self.lock()?;
        inner.items.push(ItemRecord {
            encrypted_payload: encrypted_payload.to_string(),
            current_stock: initial_stock,
            total_sold: 0,
        });
        Ok(inner.items.len() as u64)
    }

    async fn update_stock(&self, id: u64, delta: i64) -> Result<(), LedgerError> {
        let mut inner = self.lock()?;
        let record = id
            .checked_sub(1)
            .and_then(|i| inner.items.get_mut(i as usize))
            .ok_or(LedgerError::NotFound { id })?;

        let new_stock = record.current_stock as i64 + delta;
        if new_stock < 0 {
            return Err(LedgerError::Other(format!(
                "stock underflow for record {id}: {} {delta:+}",
                record.current_stock
            )));
        }
        record.current_stock = new_stock as u64;
        if delta < 0 {
            record.total_sold += (-delta) as u64;
        }
        Ok(())
    }
}

impl StaffRegistry for MemoryLedger {
    async fn staff_account(&self, id: u64) -> Result<StaffAccount, LedgerError> {
        let mut inner = self.lock()?;
        if let Some(fault) = take_fault(&mut inner.staff_faults, id) {
            return Err(fault);
        }
        id.checked_sub(1)
            .and_then(|i| inner.staff.get(i as usize))
            .cloned()
            .ok_or(LedgerError::NotFound { id })
    }

    async fn has_role(&self, role: Role, account: &str) -> Result<bool, LedgerError> {
        let inner = self.lock()?;
        Ok(inner.roles.contains(&(role, account.to_string())))
    }

    async fn create_staff_account(
        &self,
        username: &str,
        wallet_address: &str,
    ) -> Result<u64, LedgerError> {
        if username.is_empty() || wallet_address.is_empty() {
            return Err(LedgerError::Other(
                "username and wallet address are required".to_string(),
            ));
        }
        let mut inner = self.lock()?;
        if inner.staff.iter().any(|s| s.username == username) {
            return Err(LedgerError::Other(format!("username taken: {username}")));
        }
        inner.staff.push(StaffAccount {
            wallet_address: wallet_address.to_string(),
            username: username.to_string(),
            created_at: Utc::now().timestamp(),
            exists: true,
        });
        let id = inner.staff.len() as u64;
        inner.roles.insert((Role::Staff, wallet_address.to_string()));
        Ok(id)
    }
}
