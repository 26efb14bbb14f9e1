//! PostgreSQL storage adapter.
//!
//! This module implements the [`LedgerStore`](wallet_core::ports::LedgerStore)
//! port using PostgreSQL as the backing store.
//!
//! # Architecture
//!
//! - [`Database`] - Connection pool and migrations
//! - [`PgLedgerStore`] - Wallet documents in a single `wallets` table
//!
//! # Usage
//!
//! ```ignore
//! let config = DatabaseConfig::for_service(&database_url, Duration::from_secs(5));
//! let db = Database::connect(&config).await?;
//! db.migrate().await?;
//!
//! let store = PgLedgerStore::new(&db);
//! ```

mod database;
mod helpers;
mod wallet_store;

pub use database::{Database, DatabaseConfig};
pub use wallet_store::PgLedgerStore;
