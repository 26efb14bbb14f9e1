//! The wallet aggregate.
//!
//! All operations here are pure in-memory mutations of a loaded
//! [`Wallet`]. Persisting the result is the service's job. Each mutating
//! operation validates fully before touching any field, so a failed call
//! leaves the wallet exactly as it was.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::currency::{Balance, CurrencyCode, ensure_positive};
use super::{Owner, TransferId, UserId, WalletId};
use crate::error::{WalletError, WalletResult};
use crate::pin::PinHasher;

// =============================================================================
// Audit Events
// =============================================================================

/// Direction of a balance movement in the audit log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LedgerEventKind {
    Deposit,
    Withdraw,
}

/// Append-only audit record of a balance movement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerEvent {
    pub kind: LedgerEventKind,
    pub amount: i64,
    pub currency: CurrencyCode,
    pub timestamp: DateTime<Utc>,
}

// =============================================================================
// Transfer Events
// =============================================================================

/// What kind of balance-affecting action a transfer event records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransferKind {
    Deposit,
    Withdraw,
    Transfer,
}

/// Lifecycle state of a transfer event.
///
/// ```text
/// pending ──► confirmed
///    │──────► failed
///    └──────► cancelled
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransferStatus {
    Pending,
    Confirmed,
    Failed,
    Cancelled,
}

impl TransferStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, TransferStatus::Pending)
    }

    /// Only `pending` may move, and only to a terminal state.
    pub fn can_transition_to(self, next: TransferStatus) -> bool {
        self == TransferStatus::Pending && next.is_terminal()
    }
}

/// Record of a deposit, withdrawal, or peer transfer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferEvent {
    pub id: TransferId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<UserId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to: Option<UserId>,
    #[serde(rename = "type")]
    pub kind: TransferKind,
    pub status: TransferStatus,
    pub amount: i64,
    pub currency: CurrencyCode,
    pub created_at: DateTime<Utc>,
    /// When the event reached a terminal state.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_at: Option<DateTime<Utc>>,
}

impl TransferEvent {
    /// New pending peer transfer.
    pub fn pending_transfer(
        from: UserId,
        to: UserId,
        amount: i64,
        currency: CurrencyCode,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: TransferId::generate(),
            from: Some(from),
            to: Some(to),
            kind: TransferKind::Transfer,
            status: TransferStatus::Pending,
            amount,
            currency,
            created_at: now,
            resolved_at: None,
        }
    }

    /// Move to a terminal status.
    pub fn resolve(mut self, status: TransferStatus, now: DateTime<Utc>) -> WalletResult<Self> {
        if !self.status.can_transition_to(status) {
            return Err(WalletError::InvalidInput(format!(
                "transfer {} cannot move from {:?} to {:?}",
                self.id, self.status, status
            )));
        }
        self.status = status;
        self.resolved_at = Some(now);
        Ok(self)
    }
}

// =============================================================================
// Wallet
// =============================================================================

/// Financial account of one owner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Wallet {
    pub id: WalletId,
    pub owner: Owner,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pin_hash: Option<String>,
    pub balance: Balance,
    #[serde(default)]
    pub events: Vec<LedgerEvent>,
    #[serde(default)]
    pub transfer_history: Vec<TransferEvent>,
    #[serde(default)]
    pub pending_transfers: Vec<TransferEvent>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Optimistic concurrency token. Owned by the ledger store.
    #[serde(default)]
    pub version: i64,
}

impl Wallet {
    /// Fresh wallet with zero balances.
    pub fn new(owner: Owner, now: DateTime<Utc>) -> Self {
        Self {
            id: WalletId::generate(),
            owner,
            pin_hash: None,
            balance: Balance::new(),
            events: Vec::new(),
            transfer_history: Vec::new(),
            pending_transfers: Vec::new(),
            created_at: now,
            updated_at: now,
            version: 0,
        }
    }

    pub fn owner_id(&self) -> &UserId {
        &self.owner.id
    }

    pub fn can_withdraw(&self, amount: i64, currency: CurrencyCode) -> bool {
        self.balance.can_debit(amount, currency)
    }

    pub fn can_transfer(&self, amount: i64, currency: CurrencyCode) -> bool {
        self.balance.can_debit(amount, currency)
    }

    /// Credit the wallet and record a confirmed deposit.
    pub fn deposit(
        &mut self,
        amount: i64,
        currency: CurrencyCode,
        now: DateTime<Utc>,
    ) -> WalletResult<&TransferEvent> {
        self.credit(amount, currency, now)?;
        self.transfer_history.push(TransferEvent {
            id: TransferId::generate(),
            from: None,
            to: Some(self.owner.id.clone()),
            kind: TransferKind::Deposit,
            status: TransferStatus::Confirmed,
            amount,
            currency,
            created_at: now,
            resolved_at: Some(now),
        });
        Ok(self.last_history_entry())
    }

    /// Debit the wallet and record a confirmed withdrawal.
    pub fn withdraw(
        &mut self,
        amount: i64,
        currency: CurrencyCode,
        now: DateTime<Utc>,
    ) -> WalletResult<&TransferEvent> {
        self.debit(amount, currency, now)?;
        self.transfer_history.push(TransferEvent {
            id: TransferId::generate(),
            from: Some(self.owner.id.clone()),
            to: None,
            kind: TransferKind::Withdraw,
            status: TransferStatus::Confirmed,
            amount,
            currency,
            created_at: now,
            resolved_at: Some(now),
        });
        Ok(self.last_history_entry())
    }

    /// Balance movement plus audit event, without a history record.
    pub(crate) fn credit(
        &mut self,
        amount: i64,
        currency: CurrencyCode,
        now: DateTime<Utc>,
    ) -> WalletResult<()> {
        self.balance.credit(amount, currency)?;
        self.events.push(LedgerEvent {
            kind: LedgerEventKind::Deposit,
            amount,
            currency,
            timestamp: now,
        });
        self.updated_at = now;
        Ok(())
    }

    pub(crate) fn debit(
        &mut self,
        amount: i64,
        currency: CurrencyCode,
        now: DateTime<Utc>,
    ) -> WalletResult<()> {
        ensure_positive(amount)?;
        self.balance.debit(amount, currency)?;
        self.events.push(LedgerEvent {
            kind: LedgerEventKind::Withdraw,
            amount,
            currency,
            timestamp: now,
        });
        self.updated_at = now;
        Ok(())
    }

    fn last_history_entry(&self) -> &TransferEvent {
        // Callers push immediately before borrowing.
        &self.transfer_history[self.transfer_history.len() - 1]
    }

    /// Position and entry of a pending transfer.
    pub fn find_pending_transfer(&self, id: TransferId) -> Option<(usize, &TransferEvent)> {
        self.pending_transfers
            .iter()
            .enumerate()
            .find(|(_, t)| t.id == id)
    }

    /// Append a new pending transfer. At most one entry per id.
    pub(crate) fn push_pending(&mut self, event: TransferEvent, now: DateTime<Utc>) -> WalletResult<()> {
        if self.find_pending_transfer(event.id).is_some() {
            return Err(WalletError::InvalidInput(format!(
                "transfer {} is already pending",
                event.id
            )));
        }
        self.pending_transfers.push(event);
        self.updated_at = now;
        Ok(())
    }

    /// Remove a pending transfer, returning it.
    pub(crate) fn take_pending(&mut self, id: TransferId) -> Option<TransferEvent> {
        let (index, _) = self.find_pending_transfer(id)?;
        Some(self.pending_transfers.remove(index))
    }

    /// Move a pending transfer into history as `failed` or `cancelled`.
    pub fn resolve_pending(
        &mut self,
        id: TransferId,
        status: TransferStatus,
        now: DateTime<Utc>,
    ) -> WalletResult<TransferEvent> {
        if matches!(status, TransferStatus::Confirmed | TransferStatus::Pending) {
            return Err(WalletError::InvalidInput(format!(
                "pending transfers are only resolved to failed or cancelled, not {:?}",
                status
            )));
        }
        let (_, pending) = self
            .find_pending_transfer(id)
            .ok_or_else(|| WalletError::NotFound(format!("pending transfer {}", id)))?;
        let resolved = pending.clone().resolve(status, now)?;
        self.take_pending(id);
        self.transfer_history.push(resolved.clone());
        self.updated_at = now;
        Ok(resolved)
    }

    /// Ids of pending transfers created at or before `cutoff`.
    pub fn pending_created_before(&self, cutoff: DateTime<Utc>) -> Vec<TransferId> {
        self.pending_transfers
            .iter()
            .filter(|t| t.created_at <= cutoff)
            .map(|t| t.id)
            .collect()
    }

    // -------------------------------------------------------------------------
    // PIN
    // -------------------------------------------------------------------------

    pub fn has_pin(&self) -> bool {
        self.pin_hash.is_some()
    }

    /// Hash and store a new PIN, replacing any previous one.
    pub fn set_pin(&mut self, hasher: &PinHasher, pin: &str, now: DateTime<Utc>) -> WalletResult<()> {
        let hash = hasher.hash(pin)?;
        self.pin_hash = Some(hash);
        self.updated_at = now;
        Ok(())
    }

    /// Constant-time comparison against the stored PIN. No PIN set is a mismatch.
    pub fn compare_pin(&self, hasher: &PinHasher, candidate: &str) -> WalletResult<()> {
        match &self.pin_hash {
            Some(stored) => hasher.verify(candidate, stored),
            None => Err(WalletError::InvalidPin),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pin::PinConfig;

    fn cup() -> CurrencyCode {
        CurrencyCode::parse("CUP").unwrap()
    }

    fn wallet(owner: &str) -> Wallet {
        Wallet::new(Owner::with_id(UserId::new(owner).unwrap()), Utc::now())
    }

    #[test]
    fn deposit_credits_and_records() {
        let mut w = wallet("a");
        let event = w.deposit(200, cup(), Utc::now()).unwrap().clone();

        assert_eq!(w.balance.get(cup()), 200);
        assert_eq!(event.kind, TransferKind::Deposit);
        assert_eq!(event.status, TransferStatus::Confirmed);
        assert_eq!(w.events.len(), 1);
        assert_eq!(w.events[0].kind, LedgerEventKind::Deposit);
        assert_eq!(w.transfer_history.len(), 1);
    }

    #[test]
    fn withdraw_over_balance_fails_without_side_effects() {
        let mut w = wallet("a");
        w.deposit(200, cup(), Utc::now()).unwrap();
        let before = w.clone();

        let err = w.withdraw(250, cup(), Utc::now()).unwrap_err();
        assert!(matches!(err, WalletError::InsufficientFunds { .. }));
        assert_eq!(w, before);
    }

    #[test]
    fn deposit_then_withdraw_restores_balance() {
        let mut w = wallet("a");
        w.deposit(50, cup(), Utc::now()).unwrap();
        w.deposit(75, cup(), Utc::now()).unwrap();
        w.withdraw(75, cup(), Utc::now()).unwrap();

        assert_eq!(w.balance.get(cup()), 50);
        let kinds: Vec<_> = w.events.iter().map(|e| e.kind).collect();
        assert_eq!(
            kinds,
            vec![LedgerEventKind::Deposit, LedgerEventKind::Deposit, LedgerEventKind::Withdraw]
        );
    }

    #[test]
    fn resolve_pending_moves_entry_once() {
        let mut w = wallet("a");
        let event = TransferEvent::pending_transfer(
            UserId::new("a").unwrap(),
            UserId::new("b").unwrap(),
            10,
            cup(),
            Utc::now(),
        );
        let id = event.id;
        w.push_pending(event.clone(), Utc::now()).unwrap();
        assert!(w.push_pending(event, Utc::now()).is_err());

        let resolved = w.resolve_pending(id, TransferStatus::Cancelled, Utc::now()).unwrap();
        assert_eq!(resolved.status, TransferStatus::Cancelled);
        assert!(resolved.resolved_at.is_some());
        assert!(w.find_pending_transfer(id).is_none());
        assert_eq!(w.transfer_history.len(), 1);

        let again = w.resolve_pending(id, TransferStatus::Cancelled, Utc::now());
        assert!(matches!(again, Err(WalletError::NotFound(_))));
    }

    #[test]
    fn resolve_pending_refuses_confirmed() {
        let mut w = wallet("a");
        let event = TransferEvent::pending_transfer(
            UserId::new("a").unwrap(),
            UserId::new("b").unwrap(),
            10,
            cup(),
            Utc::now(),
        );
        let id = event.id;
        w.push_pending(event, Utc::now()).unwrap();
        assert!(w.resolve_pending(id, TransferStatus::Confirmed, Utc::now()).is_err());
        assert!(w.find_pending_transfer(id).is_some());
    }

    #[test]
    fn status_transitions_only_leave_pending() {
        use TransferStatus::*;
        assert!(Pending.can_transition_to(Confirmed));
        assert!(Pending.can_transition_to(Cancelled));
        assert!(!Pending.can_transition_to(Pending));
        assert!(!Confirmed.can_transition_to(Cancelled));
        assert!(!Failed.can_transition_to(Confirmed));
    }

    #[test]
    fn pin_roundtrip_and_mismatch() {
        let hasher = PinHasher::new(PinConfig::low_cost()).unwrap();
        let mut w = wallet("a");
        assert!(matches!(w.compare_pin(&hasher, "1234"), Err(WalletError::InvalidPin)));

        w.set_pin(&hasher, "1234", Utc::now()).unwrap();
        assert!(w.compare_pin(&hasher, "1234").is_ok());
        assert!(matches!(w.compare_pin(&hasher, "4321"), Err(WalletError::InvalidPin)));
    }

    #[test]
    fn document_uses_camel_case_fields() {
        let mut w = wallet("a");
        w.deposit(5, cup(), Utc::now()).unwrap();
        let doc = serde_json::to_value(&w).unwrap();
        assert!(doc.get("transferHistory").is_some());
        assert!(doc.get("pendingTransfers").is_some());
        assert!(doc.get("pinHash").is_none());
        assert_eq!(doc["transferHistory"][0]["type"], "deposit");
        assert_eq!(doc["transferHistory"][0]["status"], "confirmed");
    }

    #[test]
    fn document_reads_back_into_wallet() {
        let mut w = wallet("a");
        w.deposit(200, cup(), Utc::now()).unwrap();
        let pending = TransferEvent::pending_transfer(
            UserId::new("a").unwrap(),
            UserId::new("b").unwrap(),
            50,
            cup(),
            Utc::now(),
        );
        w.push_pending(pending, Utc::now()).unwrap();

        let doc = serde_json::to_string(&w).unwrap();
        let back: Wallet = serde_json::from_str(&doc).unwrap();
        assert_eq!(back, w);
        assert_eq!(back.balance.get(cup()), 200);
    }

    // Test critique: un document avec une devise inconnue est rejeté
    #[test]
    fn document_with_unknown_currency_is_rejected() {
        let mut doc = serde_json::to_value(wallet("a")).unwrap();
        doc["balance"]["amount"] = serde_json::json!({ "XYZ": 10 });
        assert!(serde_json::from_value::<Wallet>(doc).is_err());
    }
}
