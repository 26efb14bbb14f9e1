//! Port trait for wallet persistence.
//!
//! The ledger store owns physical persistence and transaction boundaries.
//! It never interprets balances or transfer states; it only stores and
//! replaces whole wallet documents, guarded by the document version.
//! Implementations live in the infrastructure layer (e.g., `wallet-storage`).

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::StorageResult;
use crate::models::{UserId, Wallet};

/// Persistence facade for wallet documents.
///
/// # Versioning
///
/// Every stored wallet carries a `version`. [`LedgerStore::update`] and
/// [`LedgerStore::update_atomic`] only write a document whose stored
/// version still equals `wallet.version`, and bump it by one on success.
/// A mismatch fails with [`crate::error::StorageError::Conflict`] and
/// nothing is written.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Load the wallet owned by `owner`.
    async fn find_by_owner(&self, owner: &UserId) -> StorageResult<Option<Wallet>>;

    /// Insert a new wallet. Fails with `ConstraintViolation` if the owner already has one.
    async fn insert(&self, wallet: &Wallet) -> StorageResult<()>;

    /// Replace a single wallet document, conditional on its version.
    async fn update(&self, wallet: &Wallet) -> StorageResult<()>;

    /// Replace several wallet documents in one transaction.
    ///
    /// Either every document is written or none is. Any conflict or
    /// write error aborts the whole batch.
    async fn update_atomic(&self, wallets: &[&Wallet]) -> StorageResult<()>;

    /// Wallets holding at least one pending transfer created at or before
    /// `created_before`, at most `limit` of them.
    async fn wallets_with_pending(
        &self,
        created_before: DateTime<Utc>,
        limit: usize,
    ) -> StorageResult<Vec<Wallet>>;

    /// Whether the backing store currently accepts queries.
    async fn is_healthy(&self) -> bool;
}
