//! Ledger store implementation for PostgreSQL.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgConnection, PgPool};
use tracing::{debug, trace};

use wallet_core::error::{StorageError, StorageResult};
use wallet_core::models::{UserId, Wallet};
use wallet_core::ports::LedgerStore;

use super::database::Database;
use super::helpers::{WalletRow, map_write_error, wallet_to_document};

const SELECT_WALLET: &str = r#"
    SELECT id, owner_id, version, document, created_at, updated_at
    FROM wallets
"#;

/// PostgreSQL implementation of [`LedgerStore`].
///
/// Each wallet is one row holding the aggregate as a JSONB document.
/// Writes are conditional on the `version` column.
pub struct PgLedgerStore {
    pool: PgPool,
    statement_timeout: Duration,
}

impl PgLedgerStore {
    pub fn new(db: &Database) -> Self {
        Self {
            pool: db.pool().clone(),
            statement_timeout: db.statement_timeout(),
        }
    }

    /// Replace one document if its stored version still matches.
    async fn write_versioned(&self, conn: &mut PgConnection, wallet: &Wallet) -> StorageResult<()> {
        let document = wallet_to_document(wallet)?;

        let result = sqlx::query(
            r#"
            UPDATE wallets
            SET document = $3, version = version + 1, updated_at = $4
            WHERE id = $1 AND version = $2
            "#,
        )
        .bind(wallet.id.0)
        .bind(wallet.version)
        .bind(&document)
        .bind(wallet.updated_at)
        .execute(&mut *conn)
        .await
        .map_err(|e| map_write_error(e, self.statement_timeout))?;

        if result.rows_affected() == 1 {
            trace!(wallet = %wallet.id, version = wallet.version + 1, "Wallet written");
            return Ok(());
        }

        // Nothing matched: either the row is gone or another writer got there first.
        let current: Option<(i64,)> = sqlx::query_as("SELECT version FROM wallets WHERE id = $1")
            .bind(wallet.id.0)
            .fetch_optional(&mut *conn)
            .await
            .map_err(|e| StorageError::QueryError(e.to_string()))?;

        match current {
            Some((stored,)) => {
                debug!(wallet = %wallet.id, expected = wallet.version, stored, "Version mismatch");
                Err(StorageError::Conflict(format!(
                    "wallet {} is at version {}, write expected {}",
                    wallet.id, stored, wallet.version
                )))
            }
            None => Err(StorageError::NotFound(format!("wallet {}", wallet.id))),
        }
    }
}

#[async_trait]
impl LedgerStore for PgLedgerStore {
    async fn find_by_owner(&self, owner: &UserId) -> StorageResult<Option<Wallet>> {
        let row = sqlx::query_as::<_, WalletRow>(&format!("{} WHERE owner_id = $1", SELECT_WALLET))
            .bind(owner.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StorageError::QueryError(e.to_string()))?;

        row.map(WalletRow::into_wallet).transpose()
    }

    async fn insert(&self, wallet: &Wallet) -> StorageResult<()> {
        let document = wallet_to_document(wallet)?;

        sqlx::query(
            r#"
            INSERT INTO wallets (id, owner_id, version, document, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(wallet.id.0)
        .bind(wallet.owner_id().as_str())
        .bind(wallet.version)
        .bind(&document)
        .bind(wallet.created_at)
        .bind(wallet.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| map_write_error(e, self.statement_timeout))?;

        Ok(())
    }

    async fn update(&self, wallet: &Wallet) -> StorageResult<()> {
        let mut conn = self
            .pool
            .acquire()
            .await
            .map_err(|e| StorageError::ConnectionError(e.to_string()))?;

        self.write_versioned(&mut *conn, wallet).await
    }

    async fn update_atomic(&self, wallets: &[&Wallet]) -> StorageResult<()> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StorageError::TransactionError(e.to_string()))?;

        // Integer literal only; SET does not take bind parameters.
        sqlx::query(&format!(
            "SET LOCAL statement_timeout = {}",
            self.statement_timeout.as_millis()
        ))
        .execute(&mut *tx)
        .await
        .map_err(|e| StorageError::TransactionError(e.to_string()))?;

        // Any error drops `tx`, which rolls back every write above it.
        for wallet in wallets {
            self.write_versioned(&mut *tx, wallet).await?;
        }

        tx.commit()
            .await
            .map_err(|e| StorageError::TransactionError(e.to_string()))?;

        Ok(())
    }

    async fn wallets_with_pending(
        &self,
        created_before: DateTime<Utc>,
        limit: usize,
    ) -> StorageResult<Vec<Wallet>> {
        let rows = sqlx::query_as::<_, WalletRow>(&format!(
            r#"{}
            WHERE jsonb_array_length(document -> 'pendingTransfers') > 0
              AND EXISTS (
                  SELECT 1
                  FROM jsonb_array_elements(document -> 'pendingTransfers') AS p
                  WHERE (p ->> 'createdAt')::timestamptz <= $1
              )
            ORDER BY updated_at
            LIMIT $2
            "#,
            SELECT_WALLET
        ))
        .bind(created_before)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StorageError::QueryError(e.to_string()))?;

        rows.into_iter().map(WalletRow::into_wallet).collect()
    }

    async fn is_healthy(&self) -> bool {
        sqlx::query("SELECT 1").fetch_one(&self.pool).await.is_ok()
    }
}
