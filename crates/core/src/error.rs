//! Error types for the wallet domain layer.
//!
//! This module defines two error types:
//!
//! - [`WalletError`] - The error taxonomy surfaced by [`crate::services::WalletService`]
//! - [`StorageError`] - Ledger store errors raised by persistence adapters
//!
//! Storage errors convert into wallet errors via `From`, so `?` works
//! across the service/store boundary. Any store failure that is not a
//! lookup miss or an optimistic conflict surfaces as `Internal`.

use std::fmt;

use thiserror::Error;

use crate::models::CurrencyCode;

// =============================================================================
// Wallet Errors
// =============================================================================

/// Errors returned by wallet operations.
#[derive(Debug, Error)]
pub enum WalletError {
    /// No resolved caller identity, or the caller's role is insufficient.
    #[error("Access denied: {0}")]
    AccessDenied(String),

    /// No wallet for the owner, or no pending transfer with the given id.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Non-positive amount, unknown currency, malformed PIN, self-transfer.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// The debit would drive a currency balance negative.
    #[error("Insufficient funds: {currency} balance is {available}, requested {requested}")]
    InsufficientFunds {
        /// Currency being debited.
        currency: CurrencyCode,
        /// Balance held in that currency.
        available: i64,
        /// Amount that was requested.
        requested: i64,
    },

    /// PIN comparison failed.
    #[error("Invalid PIN")]
    InvalidPin,

    /// The wallet changed between read and write. Nothing was written.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Underlying store failure, including an aborted or timed-out transaction.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl WalletError {
    /// Classify this error for transport layers.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::AccessDenied(_) => ErrorKind::AccessDenied,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::InvalidInput(_) => ErrorKind::InvalidInput,
            Self::InsufficientFunds { .. } => ErrorKind::InsufficientFunds,
            Self::InvalidPin => ErrorKind::InvalidPin,
            Self::Conflict(_) => ErrorKind::Conflict,
            Self::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Whether retrying the same call may succeed without changing its input.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Conflict(_) | Self::Internal(_))
    }
}

/// Stable error classification exposed to API clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    AccessDenied,
    NotFound,
    InvalidInput,
    InsufficientFunds,
    InvalidPin,
    Conflict,
    Internal,
}

impl ErrorKind {
    /// Machine-readable code, e.g. `INSUFFICIENT_FUNDS`.
    pub fn code(self) -> &'static str {
        match self {
            Self::AccessDenied => "ACCESS_DENIED",
            Self::NotFound => "NOT_FOUND",
            Self::InvalidInput => "INVALID_INPUT",
            Self::InsufficientFunds => "INSUFFICIENT_FUNDS",
            Self::InvalidPin => "INVALID_PIN",
            Self::Conflict => "CONFLICT",
            Self::Internal => "INTERNAL",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

// =============================================================================
// Storage Errors
// =============================================================================

/// Ledger store errors.
///
/// These errors originate from storage operations like queries,
/// transactions, and document serialization.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Failed to establish database connection.
    #[error("Database connection error: {0}")]
    ConnectionError(String),

    /// Query execution failed.
    #[error("Query execution error: {0}")]
    QueryError(String),

    /// Requested document was not found.
    #[error("Record not found: {0}")]
    NotFound(String),

    /// Database constraint was violated (unique owner, etc.).
    #[error("Constraint violation: {0}")]
    ConstraintViolation(String),

    /// Database migration failed.
    #[error("Migration error: {0}")]
    MigrationError(String),

    /// Transaction begin/commit/rollback failed.
    #[error("Transaction error: {0}")]
    TransactionError(String),

    /// Document serialization/deserialization failed.
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Conditional write lost against a concurrent writer.
    #[error("Version conflict: {0}")]
    Conflict(String),

    /// Transaction exceeded its deadline and was rolled back.
    #[error("Transaction timed out after {0} ms")]
    Timeout(u128),
}

impl From<StorageError> for WalletError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound(what) => WalletError::NotFound(what),
            StorageError::Conflict(what) => WalletError::Conflict(what),
            StorageError::ConstraintViolation(what) => WalletError::InvalidInput(what),
            other => WalletError::Internal(other.to_string()),
        }
    }
}

// =============================================================================
// Result Type Aliases
// =============================================================================

/// Result type for wallet operations.
pub type WalletResult<T> = Result<T, WalletError>;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;
