//! GraphQL schema definition.
//!
//! Resolvers are thin: they parse transport inputs into domain types,
//! call the [`WalletService`] with the per-request [`RequestContext`],
//! and convert the result.

use std::sync::Arc;

use async_graphql::{Context, EmptySubscription, Object, Result, Schema};

use wallet_core::error::WalletResult;
use wallet_core::models::{CurrencyCode, RequestContext, UserId};
use wallet_core::services::WalletService;

use crate::types::{
    BalanceView, ConfirmTransferInput, DepositInput, OperationResponse, SetPinInput,
    TransferInput, TransferView, WalletSchema, WalletView, WithdrawInput, graphql_error,
};

// -----------------------------------------------------------------------------
// Schema Configuration
// -----------------------------------------------------------------------------

/// Maximum query depth to prevent deeply nested queries (DoS protection).
/// Note: GraphQL introspection requires depth ~13, so we use 15 to allow it.
pub const MAX_QUERY_DEPTH: usize = 15;

/// Maximum query complexity score (DoS protection).
pub const MAX_QUERY_COMPLEXITY: usize = 500;

/// Build the wallet schema with depth and complexity limits.
pub fn build_schema(service: Arc<WalletService>) -> WalletSchema {
    Schema::build(WalletQuery, WalletMutation, EmptySubscription)
        .data(service)
        .limit_depth(MAX_QUERY_DEPTH)
        .limit_complexity(MAX_QUERY_COMPLEXITY)
        .finish()
}

/// Service and caller for the current request. No context means anonymous.
fn request<'a>(ctx: &'a Context<'_>) -> Result<(&'a Arc<WalletService>, RequestContext)> {
    let service = ctx.data::<Arc<WalletService>>()?;
    let caller = ctx.data_opt::<RequestContext>().cloned().unwrap_or_default();
    Ok((service, caller))
}

fn parse_currency(code: &str) -> WalletResult<CurrencyCode> {
    CurrencyCode::parse(code)
}

// -----------------------------------------------------------------------------
// Query
// -----------------------------------------------------------------------------

#[derive(Default)]
pub struct WalletQuery;

#[Object]
impl WalletQuery {
    /// The caller's wallet.
    async fn wallet<'ctx>(&self, ctx: &Context<'ctx>) -> Result<WalletView> {
        let (service, caller) = request(ctx)?;
        let wallet = service.wallet(&caller).await.map_err(graphql_error)?;
        Ok(wallet.into())
    }

    /// The caller's balances, optionally for a single currency.
    async fn balance<'ctx>(
        &self,
        ctx: &Context<'ctx>,
        currency: Option<String>,
    ) -> Result<BalanceView> {
        let (service, caller) = request(ctx)?;
        let filter = currency
            .as_deref()
            .map(parse_currency)
            .transpose()
            .map_err(graphql_error)?;
        let balance = service.balance(&caller, filter).await.map_err(graphql_error)?;
        Ok(balance.into())
    }

    /// The caller's resolved transfers, oldest first.
    async fn transactions<'ctx>(&self, ctx: &Context<'ctx>) -> Result<Vec<TransferView>> {
        let (service, caller) = request(ctx)?;
        let history = service.transactions(&caller).await.map_err(graphql_error)?;
        Ok(history.into_iter().map(Into::into).collect())
    }
}

// -----------------------------------------------------------------------------
// Mutation
// -----------------------------------------------------------------------------

#[derive(Default)]
pub struct WalletMutation;

#[Object]
impl WalletMutation {
    /// Create the caller's wallet.
    async fn create_wallet<'ctx>(&self, ctx: &Context<'ctx>) -> Result<WalletView> {
        let (service, caller) = request(ctx)?;
        let wallet = service.create(&caller).await.map_err(graphql_error)?;
        Ok(wallet.into())
    }

    /// Credit a wallet. Admin only.
    async fn deposit<'ctx>(&self, ctx: &Context<'ctx>, input: DepositInput) -> Result<BalanceView> {
        let (service, caller) = request(ctx)?;
        let result: WalletResult<_> = async {
            let to = UserId::new(input.to)?;
            let currency = parse_currency(&input.currency)?;
            service.deposit(&caller, &to, input.amount, currency).await
        }
        .await;
        Ok(result.map_err(graphql_error)?.into())
    }

    /// Debit the caller's wallet. Drivers only.
    async fn withdraw<'ctx>(
        &self,
        ctx: &Context<'ctx>,
        input: WithdrawInput,
    ) -> Result<BalanceView> {
        let (service, caller) = request(ctx)?;
        let currency = parse_currency(&input.currency).map_err(graphql_error)?;
        let balance = service
            .withdraw(&caller, input.amount, currency)
            .await
            .map_err(graphql_error)?;
        Ok(balance.into())
    }

    /// Propose a transfer. Funds move on confirmation.
    async fn transfer<'ctx>(
        &self,
        ctx: &Context<'ctx>,
        input: TransferInput,
    ) -> Result<TransferView> {
        let (service, caller) = request(ctx)?;
        let result: WalletResult<_> = async {
            let to = UserId::new(input.to)?;
            let currency = parse_currency(&input.currency)?;
            service.transfer(&caller, &to, input.amount, currency).await
        }
        .await;
        Ok(result.map_err(graphql_error)?.into())
    }

    /// Confirm a pending transfer with the caller's PIN.
    async fn confirm_transfer<'ctx>(
        &self,
        ctx: &Context<'ctx>,
        input: ConfirmTransferInput,
    ) -> Result<OperationResponse> {
        let (service, caller) = request(ctx)?;
        let result = service
            .confirm_transfer(&caller, &input.transfer_id, &input.pin)
            .await;
        Ok(OperationResponse::from_result(result))
    }

    /// Cancel one of the caller's pending transfers.
    async fn cancel_transfer<'ctx>(
        &self,
        ctx: &Context<'ctx>,
        transfer_id: String,
    ) -> Result<TransferView> {
        let (service, caller) = request(ctx)?;
        let cancelled = service
            .cancel_transfer(&caller, &transfer_id)
            .await
            .map_err(graphql_error)?;
        Ok(cancelled.into())
    }

    /// Set or change the caller's PIN.
    async fn set_pin<'ctx>(
        &self,
        ctx: &Context<'ctx>,
        input: SetPinInput,
    ) -> Result<OperationResponse> {
        let (service, caller) = request(ctx)?;
        let result = service
            .set_pin(&caller, input.old.as_deref(), &input.new)
            .await;
        Ok(OperationResponse::from_result(result))
    }
}
