//! Wallet service - the single writer of wallet documents.
//!
//! Every operation resolves the caller from the [`RequestContext`], runs the
//! pure aggregate or transfer-protocol step in memory, and persists the
//! result through the [`LedgerStore`]. Validation that needs no stored
//! state happens before the first store call.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, error, info, instrument, warn};

use super::transfer;
use crate::error::{StorageError, WalletError, WalletResult};
use crate::metrics::{
    CommitTimer, record_conflict, record_operation, record_transfer_confirmed,
    record_transfers_expired,
};
use crate::models::{
    Balance, CurrencyCode, RequestContext, Role, TransferEvent, TransferId, TransferStatus,
    UserId, Wallet, ensure_positive,
};
use crate::pin::{PinConfig, PinHasher};
use crate::ports::LedgerStore;

// =============================================================================
// Configuration
// =============================================================================

/// How `confirm_transfer` treats wallets that never set a PIN.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PinPolicy {
    /// Verify the PIN only once one has been set. Unverified confirmations
    /// are logged with `pin_verified = false`.
    #[default]
    RequireWhenSet,
    /// Refuse confirmation with `InvalidPin` until a PIN is set.
    Always,
}

/// Configuration for the wallet service.
#[derive(Debug, Clone)]
pub struct WalletConfig {
    /// Age after which a pending transfer is cancelled.
    pub pending_ttl: Duration,
    /// Upper bound on the two-wallet commit.
    pub transaction_timeout: Duration,
    /// PIN requirement for confirmations.
    pub pin_policy: PinPolicy,
    /// PIN format and hashing cost.
    pub pin: PinConfig,
    /// Maximum wallets examined per expiry sweep.
    pub sweep_batch: usize,
}

impl Default for WalletConfig {
    fn default() -> Self {
        Self {
            pending_ttl: Duration::from_secs(15 * 60),
            transaction_timeout: Duration::from_secs(5),
            pin_policy: PinPolicy::RequireWhenSet,
            pin: PinConfig::default(),
            sweep_batch: 100,
        }
    }
}

// =============================================================================
// WalletService
// =============================================================================

/// Public orchestrator for wallet operations.
pub struct WalletService {
    config: WalletConfig,
    pending_ttl: chrono::Duration,
    store: Arc<dyn LedgerStore>,
    pins: PinHasher,
}

impl WalletService {
    pub fn new(config: WalletConfig, store: Arc<dyn LedgerStore>) -> WalletResult<Self> {
        let pending_ttl = chrono::Duration::from_std(config.pending_ttl)
            .map_err(|e| WalletError::InvalidInput(format!("pending TTL out of range: {}", e)))?;
        let pins = PinHasher::new(config.pin.clone())?;
        Ok(Self {
            config,
            pending_ttl,
            store,
            pins,
        })
    }

    /// Whether the ledger store is reachable.
    pub async fn is_healthy(&self) -> bool {
        self.store.is_healthy().await
    }

    /// Create the caller's wallet with zero balances.
    #[instrument(skip_all)]
    pub async fn create(&self, ctx: &RequestContext) -> WalletResult<Wallet> {
        let result: WalletResult<Wallet> = async {
            let caller = ctx.caller()?;
            let wallet = Wallet::new(caller.owner.clone(), Utc::now());
            self.store.insert(&wallet).await.map_err(|e| match e {
                StorageError::ConstraintViolation(_) => {
                    WalletError::InvalidInput(format!("wallet for {} already exists", caller.id()))
                }
                other => other.into(),
            })?;
            info!(owner = %caller.id(), wallet = %wallet.id, "👛 Wallet created");
            Ok(wallet)
        }
        .await;
        observe("create", result)
    }

    /// The caller's full wallet.
    #[instrument(skip_all)]
    pub async fn wallet(&self, ctx: &RequestContext) -> WalletResult<Wallet> {
        let result: WalletResult<Wallet> = async {
            let caller = ctx.caller()?;
            self.load(caller.id()).await
        }
        .await;
        observe("wallet", result)
    }

    /// Credit `owner`'s wallet. Admin only.
    #[instrument(skip(self, ctx), fields(owner = %owner, currency = %currency))]
    pub async fn deposit(
        &self,
        ctx: &RequestContext,
        owner: &UserId,
        amount: i64,
        currency: CurrencyCode,
    ) -> WalletResult<Balance> {
        let result: WalletResult<Balance> = async {
            let caller = ctx.caller()?;
            if caller.role != Role::Admin {
                return Err(WalletError::AccessDenied("deposit requires the admin role".into()));
            }
            ensure_positive(amount)?;

            let mut wallet = self.load(owner).await?;
            wallet.deposit(amount, currency, Utc::now())?;
            self.persist("deposit", &wallet).await?;

            info!(amount, by = %caller.id(), "💰 Deposit applied");
            Ok(wallet.balance)
        }
        .await;
        observe("deposit", result)
    }

    /// Debit the caller's wallet. Payout-eligible roles only.
    #[instrument(skip(self, ctx), fields(currency = %currency))]
    pub async fn withdraw(
        &self,
        ctx: &RequestContext,
        amount: i64,
        currency: CurrencyCode,
    ) -> WalletResult<Balance> {
        let result: WalletResult<Balance> = async {
            let caller = ctx.caller()?;
            if !caller.role.is_payout_eligible() {
                return Err(WalletError::AccessDenied(
                    "withdrawals are limited to drivers".into(),
                ));
            }
            ensure_positive(amount)?;

            let mut wallet = self.load(caller.id()).await?;
            wallet.withdraw(amount, currency, Utc::now())?;
            self.persist("withdraw", &wallet).await?;

            info!(owner = %caller.id(), amount, "💸 Withdrawal applied");
            Ok(wallet.balance)
        }
        .await;
        observe("withdraw", result)
    }

    /// Propose a transfer from the caller to `to`. No funds move.
    #[instrument(skip(self, ctx), fields(to = %to, currency = %currency))]
    pub async fn transfer(
        &self,
        ctx: &RequestContext,
        to: &UserId,
        amount: i64,
        currency: CurrencyCode,
    ) -> WalletResult<TransferEvent> {
        let result: WalletResult<TransferEvent> = async {
            let caller = ctx.caller()?;
            ensure_positive(amount)?;
            if caller.id() == to {
                return Err(WalletError::InvalidInput(
                    "cannot transfer to your own wallet".into(),
                ));
            }

            let mut sender = self.load(caller.id()).await?;
            let event = transfer::propose(&mut sender, to, amount, currency, Utc::now())?;
            self.persist("transfer", &sender).await?;

            debug!(transfer = %event.id, from = %caller.id(), amount, "Transfer pending");
            Ok(event)
        }
        .await;
        observe("transfer", result)
    }

    /// Settle one of the caller's pending transfers.
    ///
    /// Both wallets are written in a single atomic store call bounded by
    /// the transaction timeout. If the commit fails or times out the
    /// transfer stays pending and the call may be retried.
    #[instrument(skip(self, ctx, pin), fields(transfer = %transfer_id))]
    pub async fn confirm_transfer(
        &self,
        ctx: &RequestContext,
        transfer_id: &str,
        pin: &str,
    ) -> WalletResult<()> {
        let result = self.confirm_inner(ctx, transfer_id, pin).await;
        observe("confirm_transfer", result)
    }

    async fn confirm_inner(
        &self,
        ctx: &RequestContext,
        transfer_id: &str,
        pin: &str,
    ) -> WalletResult<()> {
        let caller = ctx.caller()?;
        let id = TransferId::parse(transfer_id)?;
        let now = Utc::now();

        let mut sender = self.load(caller.id()).await?;
        let (_, pending) = sender
            .find_pending_transfer(id)
            .ok_or_else(|| WalletError::NotFound(format!("pending transfer {}", id)))?;
        let pending = pending.clone();

        if transfer::is_expired(&pending, now, self.pending_ttl) {
            transfer::abandon(&mut sender, id, TransferStatus::Cancelled, now)?;
            self.persist("confirm_transfer", &sender).await?;
            warn!(owner = %caller.id(), "⏰ Confirmation of expired transfer, cancelled");
            record_transfers_expired(1);
            return Err(WalletError::NotFound(format!("pending transfer {} has expired", id)));
        }

        let pin_verified = self.check_pin(&sender, pin)?;

        if !sender.can_transfer(pending.amount, pending.currency) {
            warn!(owner = %caller.id(), amount = pending.amount, "⚠️  Confirmation rejected, insufficient funds");
            return Err(WalletError::InsufficientFunds {
                currency: pending.currency,
                available: sender.balance.get(pending.currency),
                requested: pending.amount,
            });
        }

        let Some(receiver_id) = pending.to.clone() else {
            return Err(WalletError::Internal(format!("transfer {} has no receiver", id)));
        };
        let Some(mut receiver) = self.store.find_by_owner(&receiver_id).await? else {
            transfer::abandon(&mut sender, id, TransferStatus::Failed, now)?;
            self.persist("confirm_transfer", &sender).await?;
            warn!(receiver = %receiver_id, "⚠️  Receiver has no wallet, transfer failed");
            return Err(WalletError::NotFound(format!("wallet for {}", receiver_id)));
        };

        let confirmed = transfer::settle(&mut sender, &mut receiver, id, now)?;
        self.commit(&sender, &receiver).await?;

        record_transfer_confirmed(confirmed.currency.as_str());
        info!(
            from = %caller.id(),
            to = %receiver_id,
            amount = confirmed.amount,
            currency = %confirmed.currency,
            pin_verified,
            "✅ Transfer confirmed"
        );
        Ok(())
    }

    /// Cancel one of the caller's pending transfers.
    #[instrument(skip(self, ctx), fields(transfer = %transfer_id))]
    pub async fn cancel_transfer(
        &self,
        ctx: &RequestContext,
        transfer_id: &str,
    ) -> WalletResult<TransferEvent> {
        let result: WalletResult<TransferEvent> = async {
            let caller = ctx.caller()?;
            let id = TransferId::parse(transfer_id)?;

            let mut sender = self.load(caller.id()).await?;
            let cancelled = transfer::abandon(&mut sender, id, TransferStatus::Cancelled, Utc::now())?;
            self.persist("cancel_transfer", &sender).await?;

            debug!(owner = %caller.id(), "Transfer cancelled");
            Ok(cancelled)
        }
        .await;
        observe("cancel_transfer", result)
    }

    /// The caller's balances, optionally narrowed to one currency.
    #[instrument(skip_all)]
    pub async fn balance(
        &self,
        ctx: &RequestContext,
        currency: Option<CurrencyCode>,
    ) -> WalletResult<Balance> {
        let result: WalletResult<Balance> = async {
            let caller = ctx.caller()?;
            let wallet = self.load(caller.id()).await?;
            Ok(match currency {
                Some(currency) => wallet.balance.only(currency),
                None => wallet.balance,
            })
        }
        .await;
        observe("balance", result)
    }

    /// The caller's resolved transfer history, oldest first.
    #[instrument(skip_all)]
    pub async fn transactions(&self, ctx: &RequestContext) -> WalletResult<Vec<TransferEvent>> {
        let result: WalletResult<Vec<TransferEvent>> = async {
            let caller = ctx.caller()?;
            Ok(self.load(caller.id()).await?.transfer_history)
        }
        .await;
        observe("transactions", result)
    }

    /// Set or replace the caller's PIN.
    ///
    /// `old` is required once a PIN exists.
    #[instrument(skip_all)]
    pub async fn set_pin(
        &self,
        ctx: &RequestContext,
        old: Option<&str>,
        new: &str,
    ) -> WalletResult<()> {
        let result: WalletResult<()> = async {
            let caller = ctx.caller()?;
            self.pins.validate(new)?;

            let mut wallet = self.load(caller.id()).await?;
            if wallet.has_pin() {
                let old = old.filter(|p| !p.is_empty()).ok_or_else(|| {
                    WalletError::InvalidInput("current PIN is required to change it".into())
                })?;
                wallet.compare_pin(&self.pins, old)?;
            }
            wallet.set_pin(&self.pins, new, Utc::now())?;
            self.persist("set_pin", &wallet).await?;

            info!(owner = %caller.id(), "🔑 PIN updated");
            Ok(())
        }
        .await;
        observe("set_pin", result)
    }

    /// Cancel every pending transfer older than the configured TTL.
    ///
    /// Wallets whose write loses the version check are skipped; the next
    /// sweep picks them up again. Returns the number of transfers cancelled.
    #[instrument(skip(self))]
    pub async fn expire_pending_transfers(&self, now: DateTime<Utc>) -> WalletResult<usize> {
        let cutoff = now - self.pending_ttl;
        let wallets = self
            .store
            .wallets_with_pending(cutoff, self.config.sweep_batch)
            .await?;

        let mut expired = 0;
        for mut wallet in wallets {
            let ids = wallet.pending_created_before(cutoff);
            if ids.is_empty() {
                continue;
            }
            for id in &ids {
                transfer::abandon(&mut wallet, *id, TransferStatus::Cancelled, now)?;
            }
            match self.store.update(&wallet).await {
                Ok(()) => {
                    debug!(owner = %wallet.owner_id(), count = ids.len(), "Expired pending transfers");
                    expired += ids.len();
                }
                Err(StorageError::Conflict(reason)) => {
                    record_conflict("expire");
                    warn!(owner = %wallet.owner_id(), reason = %reason, "⚠️  Wallet changed during sweep, skipping");
                }
                Err(e) => {
                    error!(owner = %wallet.owner_id(), error = ?e, "❌ Failed to expire transfers");
                    return Err(e.into());
                }
            }
        }

        if expired > 0 {
            info!(count = expired, "⏰ Pending transfers expired");
            record_transfers_expired(expired as u64);
        }
        Ok(expired)
    }

    // -------------------------------------------------------------------------
    // Helpers
    // -------------------------------------------------------------------------

    async fn load(&self, owner: &UserId) -> WalletResult<Wallet> {
        self.store
            .find_by_owner(owner)
            .await?
            .ok_or_else(|| WalletError::NotFound(format!("wallet for {}", owner)))
    }

    async fn persist(&self, operation: &'static str, wallet: &Wallet) -> WalletResult<()> {
        self.store.update(wallet).await.map_err(|e| {
            match &e {
                StorageError::Conflict(_) => {
                    record_conflict(operation);
                    warn!(owner = %wallet.owner_id(), operation, "⚠️  Optimistic conflict");
                }
                _ => error!(owner = %wallet.owner_id(), operation, error = ?e, "❌ Wallet write failed"),
            }
            e.into()
        })
    }

    /// Returns whether the PIN was actually verified.
    fn check_pin(&self, sender: &Wallet, pin: &str) -> WalletResult<bool> {
        match (self.config.pin_policy, sender.has_pin()) {
            (_, true) => {
                sender.compare_pin(&self.pins, pin).inspect_err(|_| {
                    warn!(owner = %sender.owner_id(), "⚠️  Confirmation rejected, wrong PIN");
                })?;
                Ok(true)
            }
            (PinPolicy::RequireWhenSet, false) => Ok(false),
            (PinPolicy::Always, false) => {
                warn!(owner = %sender.owner_id(), "⚠️  Confirmation rejected, no PIN set");
                Err(WalletError::InvalidPin)
            }
        }
    }

    async fn commit(&self, sender: &Wallet, receiver: &Wallet) -> WalletResult<()> {
        let _timer = CommitTimer::new();
        let timeout = self.config.transaction_timeout;
        let outcome = tokio::time::timeout(timeout, self.store.update_atomic(&[sender, receiver]))
            .await
            .unwrap_or(Err(StorageError::Timeout(timeout.as_millis())));

        outcome.map_err(|e| {
            match &e {
                StorageError::Conflict(_) => {
                    record_conflict("confirm_transfer");
                    warn!(error = %e, "⚠️  Transfer commit lost a version check, still pending");
                }
                _ => error!(error = ?e, "❌ Transfer commit aborted, still pending"),
            }
            WalletError::from(e)
        })
    }
}

/// Count the outcome of a public operation.
fn observe<T>(operation: &'static str, result: WalletResult<T>) -> WalletResult<T> {
    match &result {
        Ok(_) => record_operation(operation, "ok"),
        Err(e) => record_operation(operation, e.kind().code()),
    }
    result
}
