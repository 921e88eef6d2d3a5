use std::sync::{PoisonError, RwLockReadGuard, RwLockWriteGuard};

use thiserror::Error;

/// Errors raised by a ledger collaborator.
///
/// The transient kinds (`BadData`, `CallException`, `NetworkError`) mirror the
/// RPC provider's error codes and are the only kinds worth retrying. Everything
/// else is terminal: `NotFound` is the end-of-data boundary for a sequential
/// scan, the rest propagate to the caller.
#[derive(Error, Debug, Clone)]
pub enum LedgerError {
    #[error("bad data from provider: {0}")]
    BadData(String),

    #[error("call exception: {0}")]
    CallException(String),

    #[error("network error: {0}")]
    NetworkError(String),

    #[error("record {id} not found")]
    NotFound { id: u64 },

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("ledger error: {0}")]
    Other(String),
}

impl LedgerError {
    /// True for error kinds that are worth retrying.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            LedgerError::BadData(_) | LedgerError::CallException(_) | LedgerError::NetworkError(_)
        )
    }

    /// True for the clean end-of-data boundary signal.
    pub fn is_not_found(&self) -> bool {
        matches!(self, LedgerError::NotFound { .. })
    }
}

#[derive(Error, Debug)]
pub enum CryptoError {
    #[error("encryption failed")]
    EncryptionFailed,

    #[error("decryption failed: key mismatch or corrupted ciphertext")]
    DecryptionFailed,

    #[error("ciphertext is not valid base64: {0}")]
    InvalidEncoding(#[from] base64::DecodeError),

    #[error("ciphertext too short: {len} bytes, need at least {min}")]
    CiphertextTooShort { len: usize, min: usize },

    #[error("decrypted payload is not valid UTF-8")]
    InvalidUtf8(#[from] std::string::FromUtf8Error),

    #[error("encryption key must be {expected} bytes, got {actual}")]
    InvalidKeyLength { expected: usize, actual: usize },

    #[error("encryption key is not valid hex: {0}")]
    InvalidKeyEncoding(#[from] hex::FromHexError),
}

/// Top-level error type for the service.
#[derive(Error, Debug)]
pub enum PosError {
    #[error("ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("crypto error: {0}")]
    Crypto(#[from] CryptoError),

    #[error("payload parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("aggregation aborted: {0}")]
    Setup(String),

    #[error("lock poisoned: {0}")]
    LockPoisoned(String),
}

/// Extension trait for converting lock errors to PosError.
pub trait LockResultExt<T> {
    /// Converts a lock error to a PosError.
    fn map_lock_err(self) -> Result<T, PosError>;
}

impl<'a, T> LockResultExt<RwLockReadGuard<'a, T>>
    for Result<RwLockReadGuard<'a, T>, PoisonError<RwLockReadGuard<'a, T>>>
{
    #[inline]
    fn map_lock_err(self) -> Result<RwLockReadGuard<'a, T>, PosError> {
        self.map_err(|e| PosError::LockPoisoned(e.to_string()))
    }
}

impl<'a, T> LockResultExt<RwLockWriteGuard<'a, T>>
    for Result<RwLockWriteGuard<'a, T>, PoisonError<RwLockWriteGuard<'a, T>>>
{
    #[inline]
    fn map_lock_err(self) -> Result<RwLockWriteGuard<'a, T>, PosError> {
        self.map_err(|e| PosError::LockPoisoned(e.to_string()))
    }
}
