//! Property tests over random operation sequences.

use std::sync::Arc;

use proptest::prelude::*;

use wallet_core::error::WalletError;
use wallet_core::models::{Caller, CurrencyCode, Owner, RequestContext, Role, UserId};
use wallet_core::pin::PinConfig;
use wallet_core::services::{WalletConfig, WalletService};
use wallet_storage::MemoryLedgerStore;

const OWNERS: [&str; 3] = ["w0", "w1", "w2"];

#[derive(Debug, Clone)]
enum Op {
    Deposit { to: usize, amount: i64 },
    Withdraw { from: usize, amount: i64 },
    Transfer { from: usize, to: usize, amount: i64 },
}

fn op_strategy() -> impl Strategy<Value = Vec<Op>> {
    let idx = 0..OWNERS.len();
    proptest::collection::vec(
        prop_oneof![
            (idx.clone(), 1..500i64).prop_map(|(to, amount)| Op::Deposit { to, amount }),
            (idx.clone(), 1..500i64).prop_map(|(from, amount)| Op::Withdraw { from, amount }),
            (idx.clone(), idx, 1..500i64)
                .prop_map(|(from, to, amount)| Op::Transfer { from, to, amount }),
        ],
        0..24,
    )
}

fn cup() -> CurrencyCode {
    CurrencyCode::parse("CUP").unwrap()
}

fn driver(owner: &str) -> RequestContext {
    RequestContext::with_caller(Caller::new(
        Owner::with_id(UserId::new(owner).unwrap()),
        Role::Driver,
    ))
}

fn admin() -> RequestContext {
    RequestContext::with_caller(Caller::new(
        Owner::with_id(UserId::new("admin").unwrap()),
        Role::Admin,
    ))
}

async fn service() -> WalletService {
    let config = WalletConfig {
        pin: PinConfig::low_cost(),
        ..WalletConfig::default()
    };
    let service = WalletService::new(config, Arc::new(MemoryLedgerStore::new())).unwrap();
    for owner in OWNERS {
        service.create(&driver(owner)).await.unwrap();
    }
    service
}

async fn balances(service: &WalletService) -> Vec<i64> {
    let mut out = Vec::with_capacity(OWNERS.len());
    for owner in OWNERS {
        out.push(service.balance(&driver(owner), None).await.unwrap().get(cup()));
    }
    out
}

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("runtime")
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Transfers conserve the total; only deposits and withdrawals change it.
    /// No balance is ever negative, and a failed debit changes nothing.
    #[test]
    fn property_conservation_and_non_negativity(ops in op_strategy()) {
        runtime().block_on(async move {
            let service = service().await;
            let admin = admin();
            let mut expected_total: i64 = 0;

            for op in ops {
                let before = balances(&service).await;
                match op {
                    Op::Deposit { to, amount } => {
                        let owner = UserId::new(OWNERS[to]).unwrap();
                        service.deposit(&admin, &owner, amount, cup()).await.unwrap();
                        expected_total += amount;
                    }
                    Op::Withdraw { from, amount } => {
                        match service.withdraw(&driver(OWNERS[from]), amount, cup()).await {
                            Ok(_) => expected_total -= amount,
                            Err(WalletError::InsufficientFunds { .. }) => {
                                assert!(amount > before[from]);
                                assert_eq!(balances(&service).await, before.clone());
                            }
                            Err(e) => panic!("unexpected withdraw error: {}", e),
                        }
                    }
                    Op::Transfer { from, to, amount } => {
                        let sender = driver(OWNERS[from]);
                        let receiver = UserId::new(OWNERS[to]).unwrap();
                        match service.transfer(&sender, &receiver, amount, cup()).await {
                            Ok(event) => {
                                service
                                    .confirm_transfer(&sender, &event.id.to_string(), "")
                                    .await
                                    .unwrap();
                            }
                            Err(WalletError::InvalidInput(_)) => assert_eq!(from, to),
                            Err(WalletError::InsufficientFunds { .. }) => {
                                assert!(amount > before[from]);
                            }
                            Err(e) => panic!("unexpected transfer error: {}", e),
                        }
                    }
                }

                let after = balances(&service).await;
                assert!(after.iter().all(|b| *b >= 0));
                assert_eq!(after.iter().sum::<i64>(), expected_total);
            }
        });
    }

    /// Depositing then withdrawing the same amount restores the balance
    /// and appends exactly one event of each kind.
    #[test]
    fn property_deposit_withdraw_roundtrip(start in 0..1_000i64, amount in 1..1_000i64) {
        runtime().block_on(async move {
            let service = service().await;
            let owner = UserId::new(OWNERS[0]).unwrap();
            let ctx = driver(OWNERS[0]);
            if start > 0 {
                service.deposit(&admin(), &owner, start, cup()).await.unwrap();
            }
            let before = service.wallet(&ctx).await.unwrap();

            service.deposit(&admin(), &owner, amount, cup()).await.unwrap();
            service.withdraw(&ctx, amount, cup()).await.unwrap();

            let after = service.wallet(&ctx).await.unwrap();
            assert_eq!(after.balance.get(cup()), before.balance.get(cup()));
            assert_eq!(after.events.len(), before.events.len() + 2);
        });
    }

    /// Confirmed transfers never confirm twice nor duplicate in history.
    #[test]
    fn property_confirmation_is_single_shot(amount in 1..200i64) {
        runtime().block_on(async move {
            let service = service().await;
            let sender = driver(OWNERS[0]);
            let receiver = UserId::new(OWNERS[1]).unwrap();
            service
                .deposit(&admin(), &UserId::new(OWNERS[0]).unwrap(), 200, cup())
                .await
                .unwrap();

            let event = service.transfer(&sender, &receiver, amount, cup()).await.unwrap();
            let id = event.id.to_string();
            service.confirm_transfer(&sender, &id, "").await.unwrap();
            let replay = service.confirm_transfer(&sender, &id, "").await;
            assert!(matches!(replay, Err(WalletError::NotFound(_))));

            for ctx in [sender, driver(OWNERS[1])] {
                let history = service.transactions(&ctx).await.unwrap();
                assert_eq!(history.iter().filter(|t| t.id == event.id).count(), 1);
            }
        });
    }
}
