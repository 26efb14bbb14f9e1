//! Shared helper functions for PostgreSQL row conversion.

use std::time::Duration;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use wallet_core::error::{StorageError, StorageResult};
use wallet_core::models::Wallet;

/// PostgreSQL `query_canceled`, raised when `statement_timeout` fires.
const QUERY_CANCELED: &str = "57014";

/// Raw `wallets` row.
#[derive(sqlx::FromRow)]
pub struct WalletRow {
    pub id: Uuid,
    pub owner_id: String,
    pub version: i64,
    pub document: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl WalletRow {
    /// Decode the document, trusting the row's columns over the document's
    /// copy of the same fields.
    pub fn into_wallet(self) -> StorageResult<Wallet> {
        let mut wallet: Wallet = serde_json::from_value(self.document).map_err(|e| {
            StorageError::SerializationError(format!("wallet {} document: {}", self.id, e))
        })?;

        if wallet.id.0 != self.id {
            return Err(StorageError::SerializationError(format!(
                "wallet {} document carries id {}",
                self.id, wallet.id
            )));
        }
        if wallet.owner_id().as_str() != self.owner_id {
            return Err(StorageError::SerializationError(format!(
                "wallet {} document carries owner {}, row has {}",
                self.id,
                wallet.owner_id(),
                self.owner_id
            )));
        }

        wallet.version = self.version;
        wallet.created_at = self.created_at;
        wallet.updated_at = self.updated_at;
        Ok(wallet)
    }
}

/// Encode a wallet as its JSONB document.
pub fn wallet_to_document(wallet: &Wallet) -> StorageResult<serde_json::Value> {
    serde_json::to_value(wallet).map_err(|e| {
        StorageError::SerializationError(format!("wallet {} document: {}", wallet.id, e))
    })
}

/// Classify a sqlx error raised by a write.
pub fn map_write_error(err: sqlx::Error, timeout: Duration) -> StorageError {
    if let Some(db) = err.as_database_error() {
        if db.is_unique_violation() {
            return StorageError::ConstraintViolation(db.message().to_string());
        }
        if db.code().as_deref() == Some(QUERY_CANCELED) {
            return StorageError::Timeout(timeout.as_millis());
        }
    }
    StorageError::QueryError(err.to_string())
}
