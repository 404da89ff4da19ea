//! Error taxonomy for mintdesk
//!
//! Every fallible operation in the crate surfaces one of these types:
//! - `NetworkError`: the gateway could not build a connection handle
//! - `RpcError`: an RPC call or confirmation wait failed
//! - `WalletError`: provider connection, signing or key material failed
//! - `StorageError`: the durable client store failed
//! - `ValidationError` / `AmountError`: user input rejected before any network call
//! - `ChainError`: one submitted transaction failed (RPC, wallet or instruction build)
//! - `DeploymentError`, `TransferError`, `BalanceQueryError`: operation-level results

use serde::{Deserialize, Serialize};
use solana_rpc_client_api::client_error::{Error as ClientError, ErrorKind as ClientErrorKind};
use std::fmt;
use thiserror::Error;

/// Connectivity failures raised by the network gateway
#[derive(Debug, Clone, Error)]
pub enum NetworkError {
    #[error("Unknown network '{0}' (expected devnet or mainnet)")]
    UnknownNetwork(String),

    #[error("Failed to connect to {network}: {reason}")]
    Connectivity { network: String, reason: String },
}

/// RPC and confirmation errors
#[derive(Debug, Clone, Error)]
pub enum RpcError {
    /// Transport-level errors (network, connection)
    #[error("Transport error: {message} (endpoint: {endpoint})")]
    Transport { endpoint: String, message: String },

    /// The RPC server answered with an error (includes preflight failures)
    #[error("RPC response error: {message} (endpoint: {endpoint})")]
    Response { endpoint: String, message: String },

    /// The transaction landed but its execution failed
    #[error("Transaction failed: {0}")]
    TransactionFailed(String),

    /// Confirmation did not arrive before the local timeout
    #[error("Transaction confirmation timeout after {timeout_ms}ms")]
    ConfirmationTimeout { timeout_ms: u64 },

    /// The blockhash validity window closed before confirmation
    #[error("Transaction expired: block height exceeded (last valid block height {last_valid_block_height})")]
    BlockHeightExceeded { last_valid_block_height: u64 },

    #[error("Account not found: {0}")]
    AccountNotFound(String),

    #[error("Invalid account data for {account}: {reason}")]
    InvalidAccountData { account: String, reason: String },
}

impl RpcError {
    /// Create from ClientError with endpoint context
    pub fn from_client_error(err: ClientError, endpoint: &str) -> Self {
        match err.kind() {
            ClientErrorKind::Io(_) | ClientErrorKind::Reqwest(_) => RpcError::Transport {
                endpoint: endpoint.to_string(),
                message: err.to_string(),
            },
            ClientErrorKind::TransactionError(tx_err) => {
                RpcError::TransactionFailed(tx_err.to_string())
            }
            _ => RpcError::Response {
                endpoint: endpoint.to_string(),
                message: err.to_string(),
            },
        }
    }

    pub fn category(&self) -> &'static str {
        match self {
            RpcError::Transport { .. } => "transport",
            RpcError::Response { .. } => "response",
            RpcError::TransactionFailed(_) => "transaction",
            RpcError::ConfirmationTimeout { .. } => "timeout",
            RpcError::BlockHeightExceeded { .. } => "expired",
            RpcError::AccountNotFound(_) | RpcError::InvalidAccountData { .. } => "account",
        }
    }
}

/// Durable client store errors
#[derive(Debug, Clone, Error)]
pub enum StorageError {
    #[error("Storage backend error: {0}")]
    Backend(String),

    #[error("Corrupt value under key '{key}': {reason}")]
    Corrupt { key: String, reason: String },
}

impl From<sled::Error> for StorageError {
    fn from(err: sled::Error) -> Self {
        StorageError::Backend(err.to_string())
    }
}

/// Wallet connection and signing errors
#[derive(Debug, Clone, Error)]
pub enum WalletError {
    #[error("No wallet connected")]
    NotConnected,

    #[error("{provider} connection failed: {reason}")]
    Connection { provider: String, reason: String },

    #[error("Failed to get public key from {0}")]
    MissingPublicKey(String),

    #[error("User rejected the request in {0}")]
    UserRejected(String),

    #[error("Signing failed: {0}")]
    Signing(String),

    #[error("Transaction was not signed properly by the wallet")]
    IncompleteSignatures,

    #[error("Invalid seed phrase: {0}")]
    InvalidSeedPhrase(String),

    #[error("Invalid key material: {0}")]
    InvalidKeyMaterial(String),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl WalletError {
    pub fn category(&self) -> &'static str {
        match self {
            WalletError::NotConnected => "not_connected",
            WalletError::Connection { .. } | WalletError::MissingPublicKey(_) => "connection",
            WalletError::UserRejected(_) => "rejected",
            WalletError::Signing(_) | WalletError::IncompleteSignatures => "signing",
            WalletError::InvalidSeedPhrase(_) | WalletError::InvalidKeyMaterial(_) => "key_material",
            WalletError::Storage(_) => "storage",
        }
    }
}

/// A single rejected form field
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{field}: {message}")]
pub struct FieldError {
    pub field: &'static str,
    pub message: String,
}

impl FieldError {
    pub fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

/// Form validation failure, one entry per rejected field
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{}", join_fields(.errors))]
pub struct ValidationError {
    pub errors: Vec<FieldError>,
}

impl ValidationError {
    pub fn field(&self, name: &str) -> Option<&FieldError> {
        self.errors.iter().find(|e| e.field == name)
    }
}

fn join_fields(errors: &[FieldError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

/// Integer amount conversion errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AmountError {
    #[error("Amount must be greater than 0")]
    NotPositive,

    #[error("Invalid amount '{0}'")]
    Malformed(String),

    #[error("Amount '{input}' has more than {decimals} decimal places")]
    TooPrecise { input: String, decimals: u8 },

    #[error("Amount overflows the token's u64 range")]
    Overflow,
}

/// Failure of one submitted transaction
#[derive(Debug, Clone, Error)]
pub enum ChainError {
    #[error(transparent)]
    Rpc(#[from] RpcError),

    #[error(transparent)]
    Wallet(#[from] WalletError),

    #[error("Instruction build error (program={program}): {reason}")]
    InstructionBuild { program: String, reason: String },
}

impl ChainError {
    pub fn instruction_failed(program: impl Into<String>, reason: impl fmt::Display) -> Self {
        Self::InstructionBuild {
            program: program.into(),
            reason: reason.to_string(),
        }
    }

    pub fn category(&self) -> &'static str {
        match self {
            ChainError::Rpc(e) => e.category(),
            ChainError::Wallet(e) => e.category(),
            ChainError::InstructionBuild { .. } => "instruction",
        }
    }
}

/// Deployment phase, used in logs and in `DeploymentError`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DeployPhase {
    MintCreation,
    InitialMint,
}

impl DeployPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeployPhase::MintCreation => "mint-creation",
            DeployPhase::InitialMint => "initial-mint",
        }
    }
}

impl fmt::Display for DeployPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// User-facing classification of a failed deployment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeployFailureKind {
    InsufficientFunds,
    BlockchainCongestion,
    UserRejected,
    Generic,
}

impl DeployFailureKind {
    /// Classify an underlying error message by known substrings
    pub fn classify(message: &str) -> Self {
        let lower = message.to_lowercase();
        if lower.contains("insufficient funds")
            || lower.contains("insufficient lamports")
            || lower.contains("0x1")
        {
            DeployFailureKind::InsufficientFunds
        } else if lower.contains("blockhash") || lower.contains("block height exceeded") {
            DeployFailureKind::BlockchainCongestion
        } else if lower.contains("user rejected") {
            DeployFailureKind::UserRejected
        } else {
            DeployFailureKind::Generic
        }
    }

    /// Remediation hint shown to the user; `None` for unmatched errors
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            DeployFailureKind::InsufficientFunds => {
                Some("Insufficient SOL balance. Please add more SOL to your wallet.")
            }
            DeployFailureKind::BlockchainCongestion => Some(
                "Transaction could not be processed by the network. Please try again.",
            ),
            DeployFailureKind::UserRejected => Some("Transaction was rejected in your wallet."),
            DeployFailureKind::Generic => None,
        }
    }
}

fn describe_failure(kind: &DeployFailureKind, attempts: &u32, cause: &str) -> String {
    match kind.hint() {
        Some(hint) => hint.to_string(),
        None => format!("Failed after {} attempts: {}", attempts, cause),
    }
}

/// Deployment orchestrator errors
#[derive(Debug, Clone, Error)]
pub enum DeploymentError {
    #[error("Token deployment failed: No wallet connected")]
    NoWallet,

    /// The stored wallet exists but could not be loaded
    #[error("Token deployment failed: {0}")]
    Wallet(WalletError),

    #[error("Token deployment failed: {0}")]
    InvalidConfig(#[from] ValidationError),

    #[error("Token deployment failed: a deployment is already in progress")]
    InProgress,

    #[error("Token deployment failed: {0}")]
    Network(#[from] NetworkError),

    /// All attempts of a retried phase failed
    #[error("Token deployment failed: {}", describe_failure(.kind, .attempts, .cause))]
    Exhausted {
        phase: DeployPhase,
        attempts: u32,
        kind: DeployFailureKind,
        cause: String,
    },
}

impl DeploymentError {
    pub fn exhausted(phase: DeployPhase, attempts: u32, cause: &ChainError) -> Self {
        let cause = cause.to_string();
        Self::Exhausted {
            phase,
            attempts,
            kind: DeployFailureKind::classify(&cause),
            cause,
        }
    }

    pub fn kind(&self) -> Option<DeployFailureKind> {
        match self {
            DeploymentError::Exhausted { kind, .. } => Some(*kind),
            _ => None,
        }
    }

    pub fn category(&self) -> &'static str {
        match self {
            DeploymentError::NoWallet => "wallet",
            DeploymentError::Wallet(e) => e.category(),
            DeploymentError::InvalidConfig(_) => "config",
            DeploymentError::InProgress => "busy",
            DeploymentError::Network(_) => "network",
            DeploymentError::Exhausted { .. } => "exhausted",
        }
    }
}

/// Transfer executor errors; the first five are pre-flight rejections
#[derive(Debug, Clone, Error)]
pub enum TransferError {
    #[error("Recipient address is required")]
    MissingRecipient,

    #[error("Invalid recipient address '{0}'")]
    InvalidRecipient(String),

    #[error(transparent)]
    Amount(#[from] AmountError),

    #[error("Amount exceeds your balance (requested {requested}, available {available})")]
    ExceedsBalance { requested: String, available: String },

    #[error("No token selected for transfer")]
    MissingMint,

    #[error("Invalid token mint address '{0}'")]
    InvalidMint(String),

    #[error("Token transfer failed: a transfer is already in progress")]
    InProgress,

    #[error("Token transfer failed: {0}")]
    Network(#[from] NetworkError),

    #[error("Token transfer failed: {0}")]
    Chain(#[from] ChainError),
}

impl TransferError {
    /// Whether the request was rejected before touching the network
    pub fn is_preflight(&self) -> bool {
        matches!(
            self,
            TransferError::MissingRecipient
                | TransferError::InvalidRecipient(_)
                | TransferError::Amount(_)
                | TransferError::ExceedsBalance { .. }
                | TransferError::MissingMint
                | TransferError::InvalidMint(_)
        )
    }

    /// Metric label for a failed transfer
    pub fn category(&self) -> &'static str {
        match self {
            TransferError::InProgress => "busy",
            TransferError::Network(_) => "network",
            TransferError::Chain(e) => e.category(),
            _ => "validation",
        }
    }
}

impl From<WalletError> for DeploymentError {
    fn from(err: WalletError) -> Self {
        match err {
            WalletError::NotConnected => DeploymentError::NoWallet,
            other => DeploymentError::Wallet(other),
        }
    }
}

impl From<WalletError> for TransferError {
    fn from(err: WalletError) -> Self {
        TransferError::Chain(ChainError::Wallet(err))
    }
}

impl From<RpcError> for TransferError {
    fn from(err: RpcError) -> Self {
        TransferError::Chain(ChainError::Rpc(err))
    }
}

/// Balance lookup failure; swallowed by `get_token_balance`
#[derive(Debug, Clone, Error)]
pub enum BalanceQueryError {
    #[error(transparent)]
    Wallet(#[from] WalletError),

    #[error(transparent)]
    Network(#[from] NetworkError),

    #[error(transparent)]
    Rpc(#[from] RpcError),
}
