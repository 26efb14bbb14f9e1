//! Core domain layer for the wallet ledger.
//!
//! This crate contains the domain models, the ledger store port, and the
//! services that move money between wallets. It follows hexagonal
//! architecture principles - this is the innermost layer with no
//! dependencies on infrastructure.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      wallet (binary)                        │
//! ├─────────────────────────────────────────────────────────────┤
//! │       wallet-graphql        │         wallet-storage        │
//! │           (API)             │   (PostgreSQL / in-memory)    │
//! ├─────────────────────────────┴───────────────────────────────┤
//! │                     wallet-core  ← YOU ARE HERE             │
//! │            (models, ports, services, pin, errors)           │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//!
//! - [`models`] - Wallet aggregate, balances, transfer events, identity
//! - [`ports`] - The [`ports::LedgerStore`] trait adapters implement
//! - [`services`] - [`services::WalletService`] and the transfer protocol
//! - [`pin`] - Argon2id PIN hashing
//! - [`error`] - Domain and storage error types
//! - [`metrics`] - Prometheus metrics definitions
//!
//! # Transfer Lifecycle
//!
//! 1. `transfer` records a `pending` entry on the sender; no funds move
//! 2. `confirm_transfer` re-checks PIN and funds, loads the receiver
//! 3. Both wallets are mutated in memory, then written in one atomic batch
//! 4. Unconfirmed entries are cancelled explicitly or by the expiry sweep

pub mod error;
pub mod metrics;
pub mod models;
pub mod pin;
pub mod ports;
pub mod services;
