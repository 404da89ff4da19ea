//! RPC surface consumed by the orchestration core
//!
//! `LedgerRpc` is the seam between the deployment/transfer logic and the
//! network. Production code uses `SolanaRpc` (the non-blocking
//! `solana_client` RPC client); tests substitute an in-memory ledger.

use crate::errors::RpcError;
use async_trait::async_trait;
use solana_client::nonblocking::rpc_client::RpcClient;
use solana_rpc_client_api::{config::RpcSendTransactionConfig, request::TokenAccountsFilter};
use solana_sdk::{
    account::Account,
    commitment_config::{CommitmentConfig, CommitmentLevel},
    hash::Hash,
    pubkey::Pubkey,
    signature::Signature,
    transaction::Transaction,
};
use std::str::FromStr;
use tracing::debug;

/// A blockhash plus the last block height at which it is still valid
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockhashInfo {
    pub blockhash: Hash,
    pub last_valid_block_height: u64,
}

/// Outcome reported for a submitted signature
pub type SignatureStatus = Option<Result<(), String>>;

/// RPC operations needed to create mints, holder accounts and transfers
#[async_trait]
pub trait LedgerRpc: Send + Sync {
    /// Endpoint URL (for error context and logs)
    fn endpoint(&self) -> &str;

    async fn minimum_balance_for_rent_exemption(&self, data_len: usize) -> Result<u64, RpcError>;

    async fn latest_blockhash(&self, commitment: CommitmentConfig)
        -> Result<BlockhashInfo, RpcError>;

    /// Submit a signed transaction with preflight at the given commitment
    async fn send_transaction(
        &self,
        tx: &Transaction,
        preflight: CommitmentLevel,
    ) -> Result<Signature, RpcError>;

    /// `None` while the signature has not reached `commitment`
    async fn signature_status(
        &self,
        signature: &Signature,
        commitment: CommitmentConfig,
    ) -> Result<SignatureStatus, RpcError>;

    async fn block_height(&self, commitment: CommitmentConfig) -> Result<u64, RpcError>;

    async fn get_account(
        &self,
        pubkey: &Pubkey,
        commitment: CommitmentConfig,
    ) -> Result<Option<Account>, RpcError>;

    /// Token accounts of `owner` holding `mint`
    async fn token_accounts_by_owner(
        &self,
        owner: &Pubkey,
        mint: &Pubkey,
    ) -> Result<Vec<Pubkey>, RpcError>;
}

/// `LedgerRpc` over a live cluster endpoint
pub struct SolanaRpc {
    client: RpcClient,
    endpoint: String,
}

impl std::fmt::Debug for SolanaRpc {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SolanaRpc")
            .field("endpoint", &self.endpoint)
            .finish_non_exhaustive()
    }
}

impl SolanaRpc {
    /// Reads default to "confirmed" consistency
    pub fn new(endpoint: &str) -> Self {
        Self {
            client: RpcClient::new_with_commitment(
                endpoint.to_string(),
                CommitmentConfig::confirmed(),
            ),
            endpoint: endpoint.to_string(),
        }
    }

    fn map_err(&self, err: solana_rpc_client_api::client_error::Error) -> RpcError {
        RpcError::from_client_error(err, &self.endpoint)
    }
}

#[async_trait]
impl LedgerRpc for SolanaRpc {
    fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn minimum_balance_for_rent_exemption(&self, data_len: usize) -> Result<u64, RpcError> {
        self.client
            .get_minimum_balance_for_rent_exemption(data_len)
            .await
            .map_err(|e| self.map_err(e))
    }

    async fn latest_blockhash(
        &self,
        commitment: CommitmentConfig,
    ) -> Result<BlockhashInfo, RpcError> {
        let (blockhash, last_valid_block_height) = self
            .client
            .get_latest_blockhash_with_commitment(commitment)
            .await
            .map_err(|e| self.map_err(e))?;
        Ok(BlockhashInfo {
            blockhash,
            last_valid_block_height,
        })
    }

    async fn send_transaction(
        &self,
        tx: &Transaction,
        preflight: CommitmentLevel,
    ) -> Result<Signature, RpcError> {
        let config = RpcSendTransactionConfig {
            skip_preflight: false,
            preflight_commitment: Some(preflight),
            ..RpcSendTransactionConfig::default()
        };
        self.client
            .send_transaction_with_config(tx, config)
            .await
            .map_err(|e| self.map_err(e))
    }

    async fn signature_status(
        &self,
        signature: &Signature,
        commitment: CommitmentConfig,
    ) -> Result<SignatureStatus, RpcError> {
        let status = self
            .client
            .get_signature_status_with_commitment(signature, commitment)
            .await
            .map_err(|e| self.map_err(e))?;
        Ok(status.map(|result| result.map_err(|e| e.to_string())))
    }

    async fn block_height(&self, commitment: CommitmentConfig) -> Result<u64, RpcError> {
        self.client
            .get_block_height_with_commitment(commitment)
            .await
            .map_err(|e| self.map_err(e))
    }

    async fn get_account(
        &self,
        pubkey: &Pubkey,
        commitment: CommitmentConfig,
    ) -> Result<Option<Account>, RpcError> {
        let response = self
            .client
            .get_account_with_commitment(pubkey, commitment)
            .await
            .map_err(|e| self.map_err(e))?;
        Ok(response.value)
    }

    async fn token_accounts_by_owner(
        &self,
        owner: &Pubkey,
        mint: &Pubkey,
    ) -> Result<Vec<Pubkey>, RpcError> {
        let keyed = self
            .client
            .get_token_accounts_by_owner(owner, TokenAccountsFilter::Mint(*mint))
            .await
            .map_err(|e| self.map_err(e))?;

        let mut accounts = Vec::with_capacity(keyed.len());
        for entry in keyed {
            match Pubkey::from_str(&entry.pubkey) {
                Ok(pubkey) => accounts.push(pubkey),
                Err(e) => debug!(pubkey = %entry.pubkey, error = %e, "Skipping unparseable token account"),
            }
        }
        Ok(accounts)
    }
}
