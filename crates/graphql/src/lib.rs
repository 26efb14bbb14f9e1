//! GraphQL API for the wallet ledger.
//!
//! Exposes wallet queries and mutations over HTTP. Caller identity comes
//! from gateway headers (see [`context_from_headers`]); every resolver
//! delegates to [`wallet_core::services::WalletService`].
//!
//! ```ignore
//! use std::sync::Arc;
//! use wallet_graphql::{serve_with_shutdown, ServerConfig};
//!
//! serve_with_shutdown(Arc::new(service), ServerConfig::default(), shutdown).await?;
//! ```

mod schema;
mod server;
mod types;

pub use schema::{MAX_QUERY_COMPLEXITY, MAX_QUERY_DEPTH, WalletMutation, WalletQuery, build_schema};
pub use server::{
    ServerConfig, USER_EMAIL_HEADER, USER_ID_HEADER, USER_LAST_NAME_HEADER, USER_NAME_HEADER,
    USER_ROLE_HEADER, context_from_headers, router, serve_with_shutdown,
};
pub use types::{OperationError, OperationResponse, WalletSchema, graphql_error};
