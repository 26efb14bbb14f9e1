//! Peer transfer protocol.
//!
//! A transfer is proposed by the sender, which records a `pending` entry on
//! the sender's wallet without moving funds. Confirmation debits the sender,
//! credits the receiver, and moves the entry into both histories as
//! `confirmed`. These functions only mutate in-memory aggregates; the
//! caller persists both wallets in one atomic store write.

use chrono::{DateTime, Duration, Utc};

use crate::error::{WalletError, WalletResult};
use crate::models::{CurrencyCode, TransferEvent, TransferId, TransferStatus, UserId, Wallet};
use crate::models::ensure_positive;

/// Record a pending transfer from `sender` to `to`.
///
/// Performs a point-in-time affordability check only; no balance changes.
pub fn propose(
    sender: &mut Wallet,
    to: &UserId,
    amount: i64,
    currency: CurrencyCode,
    now: DateTime<Utc>,
) -> WalletResult<TransferEvent> {
    ensure_positive(amount)?;
    if sender.owner_id() == to {
        return Err(WalletError::InvalidInput(
            "cannot transfer to your own wallet".into(),
        ));
    }
    if !sender.can_transfer(amount, currency) {
        return Err(WalletError::InsufficientFunds {
            currency,
            available: sender.balance.get(currency),
            requested: amount,
        });
    }

    let event =
        TransferEvent::pending_transfer(sender.owner_id().clone(), to.clone(), amount, currency, now);
    sender.push_pending(event.clone(), now)?;
    Ok(event)
}

/// Apply a pending transfer to both wallets.
///
/// Every precondition is checked before either wallet is touched, so an
/// error leaves both exactly as they were.
pub fn settle(
    sender: &mut Wallet,
    receiver: &mut Wallet,
    transfer_id: TransferId,
    now: DateTime<Utc>,
) -> WalletResult<TransferEvent> {
    if sender.id == receiver.id || sender.owner_id() == receiver.owner_id() {
        return Err(WalletError::InvalidInput(
            "sender and receiver wallets must differ".into(),
        ));
    }

    let (_, pending) = sender
        .find_pending_transfer(transfer_id)
        .ok_or_else(|| WalletError::NotFound(format!("pending transfer {}", transfer_id)))?;
    let (amount, currency) = (pending.amount, pending.currency);

    if pending.to.as_ref() != Some(receiver.owner_id()) {
        return Err(WalletError::InvalidInput(format!(
            "transfer {} is not addressed to {}",
            transfer_id,
            receiver.owner_id()
        )));
    }
    if !sender.can_transfer(amount, currency) {
        return Err(WalletError::InsufficientFunds {
            currency,
            available: sender.balance.get(currency),
            requested: amount,
        });
    }
    if !receiver.balance.can_credit(amount, currency) {
        return Err(WalletError::InvalidInput(format!(
            "{} balance of {} would overflow",
            currency,
            receiver.owner_id()
        )));
    }

    // Cannot fail past this point.
    let Some(pending) = sender.take_pending(transfer_id) else {
        return Err(WalletError::NotFound(format!("pending transfer {}", transfer_id)));
    };
    let confirmed = pending.resolve(TransferStatus::Confirmed, now)?;
    sender.debit(amount, currency, now)?;
    receiver.credit(amount, currency, now)?;
    sender.transfer_history.push(confirmed.clone());
    receiver.transfer_history.push(confirmed.clone());
    Ok(confirmed)
}

/// Resolve a pending transfer without moving funds.
pub fn abandon(
    sender: &mut Wallet,
    transfer_id: TransferId,
    status: TransferStatus,
    now: DateTime<Utc>,
) -> WalletResult<TransferEvent> {
    sender.resolve_pending(transfer_id, status, now)
}

/// Whether a pending transfer has outlived `ttl`.
pub fn is_expired(event: &TransferEvent, now: DateTime<Utc>, ttl: Duration) -> bool {
    event.status == TransferStatus::Pending && event.created_at + ttl <= now
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Owner, TransferKind};

    fn cup() -> CurrencyCode {
        CurrencyCode::parse("CUP").unwrap()
    }

    fn funded(owner: &str, amount: i64) -> Wallet {
        let mut w = Wallet::new(Owner::with_id(UserId::new(owner).unwrap()), Utc::now());
        if amount > 0 {
            w.deposit(amount, cup(), Utc::now()).unwrap();
        }
        w
    }

    #[test]
    fn propose_does_not_move_funds() {
        let mut a = funded("a", 200);
        let b = UserId::new("b").unwrap();

        let event = propose(&mut a, &b, 100, cup(), Utc::now()).unwrap();
        assert_eq!(event.status, TransferStatus::Pending);
        assert_eq!(event.kind, TransferKind::Transfer);
        assert_eq!(a.balance.get(cup()), 200);
        assert_eq!(a.pending_transfers.len(), 1);
    }

    #[test]
    fn propose_rejects_self_and_unaffordable() {
        let mut a = funded("a", 50);
        let own = a.owner_id().clone();
        assert!(matches!(
            propose(&mut a, &own, 10, cup(), Utc::now()),
            Err(WalletError::InvalidInput(_))
        ));

        let b = UserId::new("b").unwrap();
        assert!(matches!(
            propose(&mut a, &b, 51, cup(), Utc::now()),
            Err(WalletError::InsufficientFunds { .. })
        ));
        assert!(a.pending_transfers.is_empty());
    }

    #[test]
    fn settle_moves_funds_and_records_both_sides() {
        let mut a = funded("a", 200);
        let mut b = funded("b", 0);
        let event = propose(&mut a, b.owner_id(), 100, cup(), Utc::now()).unwrap();

        let confirmed = settle(&mut a, &mut b, event.id, Utc::now()).unwrap();
        assert_eq!(confirmed.status, TransferStatus::Confirmed);
        assert_eq!(a.balance.get(cup()), 100);
        assert_eq!(b.balance.get(cup()), 100);
        assert!(a.pending_transfers.is_empty());
        assert_eq!(a.transfer_history.last().unwrap().id, event.id);
        assert_eq!(b.transfer_history.last().unwrap().id, event.id);
    }

    // Test critique: le re-contrôle au moment de la confirmation
    #[test]
    fn settle_rechecks_affordability() {
        let mut a = funded("a", 200);
        let mut b = funded("b", 0);
        let event = propose(&mut a, b.owner_id(), 150, cup(), Utc::now()).unwrap();
        a.withdraw(100, cup(), Utc::now()).unwrap();

        let (a_before, b_before) = (a.clone(), b.clone());
        let err = settle(&mut a, &mut b, event.id, Utc::now()).unwrap_err();
        assert!(matches!(err, WalletError::InsufficientFunds { .. }));
        assert_eq!(a, a_before);
        assert_eq!(b, b_before);
    }

    #[test]
    fn settle_rejects_wrong_receiver() {
        let mut a = funded("a", 200);
        let mut c = funded("c", 0);
        let event = propose(&mut a, &UserId::new("b").unwrap(), 100, cup(), Utc::now()).unwrap();

        assert!(settle(&mut a, &mut c, event.id, Utc::now()).is_err());
        assert_eq!(a.pending_transfers.len(), 1);
    }

    #[test]
    fn settle_twice_is_not_found() {
        let mut a = funded("a", 200);
        let mut b = funded("b", 0);
        let event = propose(&mut a, b.owner_id(), 100, cup(), Utc::now()).unwrap();
        settle(&mut a, &mut b, event.id, Utc::now()).unwrap();

        let err = settle(&mut a, &mut b, event.id, Utc::now()).unwrap_err();
        assert!(matches!(err, WalletError::NotFound(_)));
        assert_eq!(b.balance.get(cup()), 100);
    }

    #[test]
    fn expiry_uses_creation_time() {
        let created = Utc::now() - Duration::minutes(20);
        let event = TransferEvent::pending_transfer(
            UserId::new("a").unwrap(),
            UserId::new("b").unwrap(),
            1,
            cup(),
            created,
        );
        assert!(is_expired(&event, Utc::now(), Duration::minutes(15)));
        assert!(!is_expired(&event, Utc::now(), Duration::minutes(30)));
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use crate::models::Owner;
    use proptest::prelude::*;

    fn cup() -> CurrencyCode {
        CurrencyCode::parse("CUP").unwrap()
    }

    fn wallet_with(owner: &str, amount: i64) -> Wallet {
        let mut w = Wallet::new(Owner::with_id(UserId::new(owner).unwrap()), Utc::now());
        if amount > 0 {
            w.deposit(amount, cup(), Utc::now()).unwrap();
        }
        w
    }

    proptest! {
        #[test]
        fn settle_conserves_or_changes_nothing(
            sender_funds in 0..10_000i64,
            receiver_funds in 0..10_000i64,
            proposed in 1..10_000i64,
            spent in 0..10_000i64,
        ) {
            let mut a = wallet_with("a", sender_funds);
            let mut b = wallet_with("b", receiver_funds);
            let total = sender_funds + receiver_funds;

            let Ok(event) = propose(&mut a, b.owner_id(), proposed, cup(), Utc::now()) else {
                prop_assert!(proposed > sender_funds);
                return Ok(());
            };
            if spent > 0 && a.can_withdraw(spent, cup()) {
                a.withdraw(spent, cup(), Utc::now()).unwrap();
            }
            let (a_before, b_before) = (a.clone(), b.clone());

            match settle(&mut a, &mut b, event.id, Utc::now()) {
                Ok(_) => {
                    let now_total = a.balance.get(cup()) + b.balance.get(cup());
                    prop_assert_eq!(now_total, a_before.balance.get(cup()) + b_before.balance.get(cup()));
                    prop_assert!(now_total <= total);
                    prop_assert!(a.balance.get(cup()) >= 0);
                }
                Err(WalletError::InsufficientFunds { .. }) => {
                    prop_assert_eq!(a, a_before);
                    prop_assert_eq!(b, b_before);
                }
                Err(e) => prop_assert!(false, "unexpected error: {}", e),
            }
        }
    }
}
