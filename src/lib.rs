//! mintdesk - SPL token deployment and transfer core
//!
//! Creates a mint, mints its initial supply to the connected wallet and
//! transfers it on, against either a remote (provider-backed) wallet or a
//! locally held keypair.

pub mod accounts;
pub mod amount;
pub mod balance;
pub mod config;
pub mod confirm;
pub mod deploy;
pub mod errors;
pub mod metrics;
pub mod network;
pub mod recipients;
pub mod retry;
pub mod rpc;
pub mod session;
pub mod storage;
pub mod structured_logging;
pub mod token;
pub mod transfer;
pub mod wallet;

#[cfg(any(test, feature = "test_utils"))]
pub mod test_utils;

// Re-export commonly used types
pub use amount::TokenBalance;
pub use deploy::{DeploySettings, DeploymentOrchestrator};
pub use errors::{DeploymentError, TransferError, WalletError};
pub use network::{Network, NetworkGateway};
pub use session::Session;
pub use solana_sdk::{pubkey::Pubkey, signature::Signature};
pub use token::{DeploymentResult, TokenConfig, TokenMetadataDraft};
pub use transfer::{TransferExecutor, TransferRequest, TransferResult};
