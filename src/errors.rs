//! Error types for the raspadinha platform core
//!
//! Storage and configuration failures live here together with the root
//! error type. Domain errors (payout tables, plays, wallet, catalog) are
//! declared next to the code that raises them and fold into
//! [`RaspadinhaError`] through `From`.

use crate::games::catalog::CatalogError;
use crate::games::payout_table::PayoutTableError;
use crate::games::settlement::PlayError;
use crate::games::types::UserId;
use crate::games::wallet::WalletError;
use std::fmt;
use thiserror::Error;

/// Failure classes shared by every domain error.
///
/// The HTTP layer maps these onto status codes; the settlement engine uses
/// them to label failure metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    /// Game, user or ledger entry missing
    NotFound,
    /// Game exists but is deactivated
    Unavailable,
    /// Operator data error (empty or invalid payout table)
    Misconfigured,
    /// Business rule: balance would go negative
    InsufficientFunds,
    /// Rejected input (bad amounts, stale price, illegal status transition)
    Invalid,
    /// Lock contention or storage timeout, safe to retry from scratch
    Conflict,
    /// Unexpected storage failure
    Internal,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::NotFound => "not_found",
            FailureKind::Unavailable => "unavailable",
            FailureKind::Misconfigured => "misconfigured",
            FailureKind::InsufficientFunds => "insufficient_funds",
            FailureKind::Invalid => "invalid",
            FailureKind::Conflict => "conflict",
            FailureKind::Internal => "internal",
        }
    }

    /// Whether resubmitting the same request may succeed
    pub fn is_transient(&self) -> bool {
        matches!(self, FailureKind::Conflict | FailureKind::Internal)
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Storage system errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database open failed: {0}")]
    DatabaseOpenFailed(String),

    #[error("Read failed: {0}")]
    ReadFailed(String),

    #[error("Write failed: {0}")]
    WriteFailed(String),

    #[error("Corrupted data: {0}")]
    CorruptedData(String),

    #[error("Timed out after {waited_ms}ms waiting for balance lock of user {user_id}")]
    LockTimeout { user_id: UserId, waited_ms: u64 },
}

impl StorageError {
    pub fn kind(&self) -> FailureKind {
        match self {
            StorageError::LockTimeout { .. } => FailureKind::Conflict,
            _ => FailureKind::Internal,
        }
    }
}

impl From<rocksdb::Error> for StorageError {
    fn from(e: rocksdb::Error) -> Self {
        StorageError::WriteFailed(e.to_string())
    }
}

/// Configuration loading and validation errors
#[derive(Debug, Error)]
pub enum ConfigurationError {
    #[error("Validation failed: {0}")]
    ValidationFailed(String),

    #[error("Failed to load configuration: {0}")]
    LoadFailed(String),
}

/// Root error type for all raspadinha operations
#[derive(Debug, Error)]
pub enum RaspadinhaError {
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Payout table error: {0}")]
    PayoutTable(#[from] PayoutTableError),

    #[error("Play error: {0}")]
    Play(#[from] PlayError),

    #[error("Wallet error: {0}")]
    Wallet(#[from] WalletError),

    #[error("Catalog error: {0}")]
    Catalog(#[from] CatalogError),
}

impl RaspadinhaError {
    pub fn kind(&self) -> FailureKind {
        match self {
            RaspadinhaError::Configuration(_) => FailureKind::Internal,
            RaspadinhaError::Storage(e) => e.kind(),
            RaspadinhaError::PayoutTable(_) => FailureKind::Misconfigured,
            RaspadinhaError::Play(e) => e.kind(),
            RaspadinhaError::Wallet(e) => e.kind(),
            RaspadinhaError::Catalog(e) => e.kind(),
        }
    }
}

impl From<std::io::Error> for RaspadinhaError {
    fn from(e: std::io::Error) -> Self {
        RaspadinhaError::Configuration(ConfigurationError::LoadFailed(e.to_string()))
    }
}

impl From<toml::de::Error> for RaspadinhaError {
    fn from(e: toml::de::Error) -> Self {
        RaspadinhaError::Configuration(ConfigurationError::LoadFailed(e.to_string()))
    }
}

// Convenience type alias for Results
pub type RaspadinhaResult<T> = Result<T, RaspadinhaError>;

/// Result alias for storage adapter calls
pub type StorageResult<T> = Result<T, StorageError>;
