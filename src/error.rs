//! Unified error model for the vault.
//! Every public operation returns `VaultResult<T>`; missing files and folders are
//! reported through `Option`/`bool`/empty results, never through an error.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum VaultError {
    /// Path cannot be normalized to a usable root segment, or is otherwise malformed.
    #[error("bad path: {0}")]
    BadPath(String),
    /// Value is not text, binary or a typed numeric array, or does not match the file it is appended to.
    #[error("unsupported value: {0}")]
    UnsupportedValue(String),
    /// The store failed or aborted a transaction (quota, I/O, closed handle).
    #[error("storage transaction failed: {0}")]
    StorageTransaction(String),
    /// Stored bytes could not be decoded.
    #[error("corrupt record: {0}")]
    Corrupt(String),
    /// Host filesystem I/O outside the store (export sinks).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl VaultError {
    pub fn code_str(&self) -> &'static str {
        match self {
            VaultError::BadPath(_) => "bad_path",
            VaultError::UnsupportedValue(_) => "unsupported_value",
            VaultError::StorageTransaction(_) => "storage_transaction",
            VaultError::Corrupt(_) => "corrupt",
            VaultError::Io(_) => "io",
        }
    }

    /// Transaction aborts may succeed when re-issued by the caller; nothing else will.
    pub fn is_retryable(&self) -> bool {
        matches!(self, VaultError::StorageTransaction(_))
    }

    pub fn bad_path<S: Into<String>>(msg: S) -> Self { VaultError::BadPath(msg.into()) }
    pub fn unsupported<S: Into<String>>(msg: S) -> Self { VaultError::UnsupportedValue(msg.into()) }
    pub fn txn<S: Into<String>>(msg: S) -> Self { VaultError::StorageTransaction(msg.into()) }
    pub fn corrupt<S: Into<String>>(msg: S) -> Self { VaultError::Corrupt(msg.into()) }
}

impl From<serde_json::Error> for VaultError {
    fn from(err: serde_json::Error) -> Self {
        VaultError::Corrupt(format!("json: {err}"))
    }
}

impl From<csv::Error> for VaultError {
    fn from(err: csv::Error) -> Self {
        VaultError::Corrupt(format!("csv: {err}"))
    }
}

pub type VaultResult<T> = Result<T, VaultError>;

#[cfg(test)]
#[path = "error_tests.rs"]
mod error_tests;
