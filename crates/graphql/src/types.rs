//! GraphQL type definitions.

use std::collections::BTreeMap;

use async_graphql::{Enum, ErrorExtensions, InputObject, Json, SimpleObject};
use chrono::{DateTime, Utc};

use wallet_core::error::WalletError;
use wallet_core::models;

use crate::schema::{WalletMutation, WalletQuery};

/// The wallet GraphQL schema type.
pub type WalletSchema = async_graphql::Schema<WalletQuery, WalletMutation, async_graphql::EmptySubscription>;

// -----------------------------------------------------------------------------
// Enums
// -----------------------------------------------------------------------------

#[derive(Enum, Clone, Copy, Debug, PartialEq, Eq)]
#[graphql(remote = "wallet_core::models::TransferKind")]
pub enum TransferType {
    Deposit,
    Withdraw,
    Transfer,
}

#[derive(Enum, Clone, Copy, Debug, PartialEq, Eq)]
#[graphql(remote = "wallet_core::models::TransferStatus")]
pub enum TransferStatus {
    Pending,
    Confirmed,
    Failed,
    Cancelled,
}

// -----------------------------------------------------------------------------
// Objects
// -----------------------------------------------------------------------------

/// Wallet owner display data.
#[derive(SimpleObject)]
#[graphql(name = "Owner")]
pub struct OwnerView {
    pub id: String,
    pub name: String,
    pub last_name: String,
    pub email: String,
}

/// One currency's amount.
#[derive(SimpleObject)]
pub struct CurrencyAmount {
    pub currency: String,
    pub amount: i64,
}

/// Balances in minor units.
#[derive(SimpleObject)]
#[graphql(name = "Balance")]
pub struct BalanceView {
    /// `{currencyCode: amount}` map.
    pub amount: Json<BTreeMap<String, i64>>,
    /// Same data as a typed list.
    pub entries: Vec<CurrencyAmount>,
}

impl From<models::Balance> for BalanceView {
    fn from(balance: models::Balance) -> Self {
        let entries: Vec<CurrencyAmount> = balance
            .amount
            .iter()
            .map(|(currency, amount)| CurrencyAmount {
                currency: currency.to_string(),
                amount: *amount,
            })
            .collect();
        let amount = entries
            .iter()
            .map(|e| (e.currency.clone(), e.amount))
            .collect();
        Self {
            amount: Json(amount),
            entries,
        }
    }
}

/// Deposit, withdrawal, or peer transfer record.
#[derive(SimpleObject)]
#[graphql(name = "Transfer")]
pub struct TransferView {
    pub id: String,
    pub from: Option<String>,
    pub to: Option<String>,
    #[graphql(name = "type")]
    pub kind: TransferType,
    pub status: TransferStatus,
    pub amount: i64,
    pub currency: String,
    pub created_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
}

impl From<models::TransferEvent> for TransferView {
    fn from(t: models::TransferEvent) -> Self {
        Self {
            id: t.id.to_string(),
            from: t.from.map(|u| u.to_string()),
            to: t.to.map(|u| u.to_string()),
            kind: t.kind.into(),
            status: t.status.into(),
            amount: t.amount,
            currency: t.currency.to_string(),
            created_at: t.created_at,
            resolved_at: t.resolved_at,
        }
    }
}

/// Full wallet as seen by its owner. The PIN hash is never exposed.
#[derive(SimpleObject)]
#[graphql(name = "Wallet")]
pub struct WalletView {
    pub id: String,
    pub owner: OwnerView,
    pub has_pin: bool,
    pub balance: BalanceView,
    pub transfer_history: Vec<TransferView>,
    pub pending_transfers: Vec<TransferView>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<models::Wallet> for WalletView {
    fn from(w: models::Wallet) -> Self {
        Self {
            id: w.id.to_string(),
            has_pin: w.has_pin(),
            owner: OwnerView {
                id: w.owner.id.to_string(),
                name: w.owner.name,
                last_name: w.owner.last_name,
                email: w.owner.email,
            },
            balance: w.balance.into(),
            transfer_history: w.transfer_history.into_iter().map(Into::into).collect(),
            pending_transfers: w.pending_transfers.into_iter().map(Into::into).collect(),
            created_at: w.created_at,
            updated_at: w.updated_at,
        }
    }
}

/// Error entry of an [`OperationResponse`].
#[derive(SimpleObject, Debug, Clone)]
pub struct OperationError {
    /// Stable error code, e.g. `INVALID_PIN`.
    pub kind: String,
    pub message: String,
}

/// Result of a mutation that returns no value.
#[derive(SimpleObject, Debug, Clone)]
pub struct OperationResponse {
    pub success: bool,
    pub errors: Vec<OperationError>,
}

impl OperationResponse {
    pub fn from_result(result: Result<(), WalletError>) -> Self {
        match result {
            Ok(()) => Self {
                success: true,
                errors: Vec::new(),
            },
            Err(e) => Self {
                success: false,
                errors: vec![OperationError {
                    kind: e.kind().code().to_string(),
                    message: public_message(&e),
                }],
            },
        }
    }
}

// -----------------------------------------------------------------------------
// Inputs
// -----------------------------------------------------------------------------

#[derive(InputObject)]
pub struct DepositInput {
    /// Owner id of the wallet to credit.
    pub to: String,
    pub amount: i64,
    pub currency: String,
}

#[derive(InputObject)]
pub struct WithdrawInput {
    pub amount: i64,
    pub currency: String,
}

#[derive(InputObject)]
pub struct TransferInput {
    /// Owner id of the receiving wallet.
    pub to: String,
    pub amount: i64,
    pub currency: String,
}

#[derive(InputObject)]
pub struct ConfirmTransferInput {
    pub transfer_id: String,
    pub pin: String,
}

#[derive(InputObject)]
pub struct SetPinInput {
    /// Current PIN; required once a PIN is set.
    pub old: Option<String>,
    pub new: String,
}

// -----------------------------------------------------------------------------
// Errors
// -----------------------------------------------------------------------------

/// Client-facing message. Store failures are not described.
fn public_message(err: &WalletError) -> String {
    match err {
        WalletError::Internal(_) => "internal error".to_string(),
        other => other.to_string(),
    }
}

/// GraphQL error carrying `extensions.code`.
pub fn graphql_error(err: WalletError) -> async_graphql::Error {
    let code = err.kind().code();
    async_graphql::Error::new(public_message(&err)).extend_with(|_, ext| ext.set("code", code))
}

#[cfg(test)]
mod tests {
    use super::*;
    use wallet_core::models::{CurrencyCode, Owner, UserId};

    #[test]
    fn test_wallet_view_hides_pin_hash() {
        let mut wallet =
            models::Wallet::new(Owner::with_id(UserId::new("u1").unwrap()), Utc::now());
        wallet.pin_hash = Some("$argon2id$secret".into());

        let view = WalletView::from(wallet);
        assert!(view.has_pin);
        assert_eq!(view.owner.id, "u1");
    }

    #[test]
    fn test_balance_view_keeps_both_shapes() {
        let mut balance = models::Balance::new();
        balance.credit(200, CurrencyCode::parse("CUP").unwrap()).unwrap();
        balance.credit(5, CurrencyCode::parse("USD").unwrap()).unwrap();

        let view = BalanceView::from(balance);
        assert_eq!(view.amount.0.get("CUP"), Some(&200));
        assert_eq!(view.entries.len(), 2);
    }

    // Test critique: les erreurs internes ne fuient pas vers le client
    #[test]
    fn test_internal_errors_are_masked() {
        let response = OperationResponse::from_result(Err(WalletError::Internal(
            "connection to 10.0.0.3 refused".into(),
        )));
        assert!(!response.success);
        assert_eq!(response.errors[0].kind, "INTERNAL");
        assert_eq!(response.errors[0].message, "internal error");

        let response = OperationResponse::from_result(Err(WalletError::InvalidPin));
        assert_eq!(response.errors[0].kind, "INVALID_PIN");
    }
}
