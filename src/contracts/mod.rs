pub mod error;
pub mod ledger;

pub use error::{CryptoError, LedgerError, LockResultExt, PosError};
pub use ledger::{
    InventoryLedger, ItemRecord, Role, StaffAccount, StaffRegistry, TransactionLedger,
    TransactionRecord,
};
