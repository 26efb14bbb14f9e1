//! In-memory ledger store for development and testing.
//!
//! Honors the same version and atomicity contract as the PostgreSQL
//! adapter. Not durable.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, RwLock};

use wallet_core::error::{StorageError, StorageResult};
use wallet_core::models::{UserId, Wallet};
use wallet_core::ports::LedgerStore;

/// Injected failures, used to exercise abort paths.
#[derive(Debug, Default)]
struct Faults {
    /// Writes touching these owners fail with `QueryError`.
    failing_owners: HashSet<UserId>,
    /// Delay applied before every atomic batch.
    atomic_delay: Option<Duration>,
    /// Reported by the health check.
    unavailable: bool,
}

/// In-memory ledger store keyed by owner.
#[derive(Debug, Default)]
pub struct MemoryLedgerStore {
    wallets: RwLock<HashMap<UserId, Wallet>>,
    faults: Mutex<Faults>,
}

impl MemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent write of `owner`'s wallet fail.
    pub async fn fail_writes_for(&self, owner: &UserId) {
        self.faults.lock().await.failing_owners.insert(owner.clone());
    }

    /// Stall atomic batches, e.g. to trip a transaction timeout.
    pub async fn delay_atomic_writes(&self, delay: Duration) {
        self.faults.lock().await.atomic_delay = Some(delay);
    }

    /// Make the health check report the store as down.
    pub async fn set_unavailable(&self, unavailable: bool) {
        self.faults.lock().await.unavailable = unavailable;
    }

    /// Remove all injected failures.
    pub async fn clear_faults(&self) {
        *self.faults.lock().await = Faults::default();
    }

    /// Stored copy of `owner`'s wallet.
    pub async fn snapshot(&self, owner: &UserId) -> Option<Wallet> {
        self.wallets.read().await.get(owner).cloned()
    }

    /// Number of stored wallets.
    pub async fn len(&self) -> usize {
        self.wallets.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.wallets.read().await.is_empty()
    }

    async fn check_fault(&self, wallet: &Wallet) -> StorageResult<()> {
        if self.faults.lock().await.failing_owners.contains(wallet.owner_id()) {
            return Err(StorageError::QueryError(format!(
                "injected write failure for {}",
                wallet.owner_id()
            )));
        }
        Ok(())
    }
}

/// Version check against the stored copy.
fn check_version(stored: &HashMap<UserId, Wallet>, wallet: &Wallet) -> StorageResult<()> {
    match stored.get(wallet.owner_id()) {
        Some(current) if current.id != wallet.id => Err(StorageError::NotFound(format!(
            "wallet {}",
            wallet.id
        ))),
        Some(current) if current.version != wallet.version => {
            Err(StorageError::Conflict(format!(
                "wallet {} is at version {}, write expected {}",
                wallet.id, current.version, wallet.version
            )))
        }
        Some(_) => Ok(()),
        None => Err(StorageError::NotFound(format!("wallet {}", wallet.id))),
    }
}

fn bumped(wallet: &Wallet) -> Wallet {
    let mut next = wallet.clone();
    next.version += 1;
    next
}

#[async_trait]
impl LedgerStore for MemoryLedgerStore {
    async fn find_by_owner(&self, owner: &UserId) -> StorageResult<Option<Wallet>> {
        Ok(self.wallets.read().await.get(owner).cloned())
    }

    async fn insert(&self, wallet: &Wallet) -> StorageResult<()> {
        self.check_fault(wallet).await?;
        let mut wallets = self.wallets.write().await;
        if wallets.contains_key(wallet.owner_id()) {
            return Err(StorageError::ConstraintViolation(format!(
                "owner {} already has a wallet",
                wallet.owner_id()
            )));
        }
        wallets.insert(wallet.owner_id().clone(), wallet.clone());
        Ok(())
    }

    async fn update(&self, wallet: &Wallet) -> StorageResult<()> {
        self.check_fault(wallet).await?;
        let mut wallets = self.wallets.write().await;
        check_version(&wallets, wallet)?;
        wallets.insert(wallet.owner_id().clone(), bumped(wallet));
        Ok(())
    }

    async fn update_atomic(&self, batch: &[&Wallet]) -> StorageResult<()> {
        let delay = self.faults.lock().await.atomic_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        // Validate the whole batch under one write lock before applying any of it.
        let mut wallets = self.wallets.write().await;
        for wallet in batch {
            check_version(&wallets, wallet)?;
            self.check_fault(wallet).await?;
        }
        for wallet in batch {
            wallets.insert(wallet.owner_id().clone(), bumped(wallet));
        }
        Ok(())
    }

    async fn wallets_with_pending(
        &self,
        created_before: DateTime<Utc>,
        limit: usize,
    ) -> StorageResult<Vec<Wallet>> {
        let wallets = self.wallets.read().await;
        let mut due: Vec<Wallet> = wallets
            .values()
            .filter(|w| !w.pending_created_before(created_before).is_empty())
            .cloned()
            .collect();
        due.sort_by_key(|w| w.updated_at);
        due.truncate(limit);
        Ok(due)
    }

    async fn is_healthy(&self) -> bool {
        !self.faults.lock().await.unavailable
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wallet_core::models::Owner;

    fn wallet(owner: &str) -> Wallet {
        Wallet::new(Owner::with_id(UserId::new(owner).unwrap()), Utc::now())
    }

    #[tokio::test]
    async fn test_update_bumps_version_and_rejects_stale() {
        let store = MemoryLedgerStore::new();
        let w = wallet("a");
        store.insert(&w).await.unwrap();

        store.update(&w).await.unwrap();
        assert_eq!(store.snapshot(w.owner_id()).await.unwrap().version, 1);

        // `w` still carries version 0
        let err = store.update(&w).await.unwrap_err();
        assert!(matches!(err, StorageError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_duplicate_owner_is_constraint_violation() {
        let store = MemoryLedgerStore::new();
        store.insert(&wallet("a")).await.unwrap();
        let err = store.insert(&wallet("a")).await.unwrap_err();
        assert!(matches!(err, StorageError::ConstraintViolation(_)));
    }

    // Test critique: un lot atomique est tout ou rien
    #[tokio::test]
    async fn test_atomic_batch_is_all_or_nothing() {
        let store = MemoryLedgerStore::new();
        let a = wallet("a");
        let b = wallet("b");
        store.insert(&a).await.unwrap();
        store.insert(&b).await.unwrap();
        store.fail_writes_for(b.owner_id()).await;

        let mut a2 = a.clone();
        a2.events.clear();
        a2.updated_at = Utc::now();
        assert!(store.update_atomic(&[&a2, &b]).await.is_err());
        assert_eq!(store.snapshot(a.owner_id()).await.unwrap(), a);

        store.clear_faults().await;
        store.update_atomic(&[&a2, &b]).await.unwrap();
        assert_eq!(store.snapshot(a.owner_id()).await.unwrap().version, 1);
        assert_eq!(store.snapshot(b.owner_id()).await.unwrap().version, 1);
    }

    #[tokio::test]
    async fn test_health_follows_injected_outage() {
        let store = MemoryLedgerStore::new();
        assert!(store.is_healthy().await);
        store.set_unavailable(true).await;
        assert!(!store.is_healthy().await);
        store.clear_faults().await;
        assert!(store.is_healthy().await);
    }

    #[tokio::test]
    async fn test_update_of_missing_wallet_is_not_found() {
        let store = MemoryLedgerStore::new();
        let err = store.update(&wallet("ghost")).await.unwrap_err();
        assert!(matches!(err, StorageError::NotFound(_)));
    }
}
