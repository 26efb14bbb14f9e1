mod sweeper;
pub mod transfer;
mod wallet;

pub use sweeper::PendingSweeper;
pub use wallet::{PinPolicy, WalletConfig, WalletService};
