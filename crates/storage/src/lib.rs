//! Storage layer for the wallet ledger.
//!
//! This crate provides implementations of the
//! [`LedgerStore`](wallet_core::ports::LedgerStore) port defined in
//! `wallet-core`: a PostgreSQL adapter for production and an in-memory
//! store for tests and local runs.
//!
//! # Architecture
//!
//! - [`postgres::Database`] - Connection pool management and migrations
//! - [`postgres::PgLedgerStore`] - JSONB wallet documents with version checks
//! - [`memory::MemoryLedgerStore`] - Same contract, held in process memory
//!
//! # Usage
//!
//! ```ignore
//! use wallet_storage::{Database, DatabaseConfig, PgLedgerStore};
//!
//! // Connect to the database
//! let config = DatabaseConfig::for_service(&database_url, tx_timeout);
//! let db = Database::connect(&config).await?;
//!
//! // Run migrations
//! db.migrate().await?;
//!
//! // Create the store
//! let store: Arc<dyn LedgerStore> = Arc::new(PgLedgerStore::new(&db));
//! ```

pub mod memory;
pub mod postgres;

pub use memory::MemoryLedgerStore;
pub use postgres::{Database, DatabaseConfig, PgLedgerStore};
