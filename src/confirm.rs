//! Transaction submission and confirmation
//!
//! A submission stamps a fresh blockhash, collects every required
//! signature, sends with preflight, then polls the signature status until
//! it lands, the blockhash expires, or the timeout wins the race. A
//! timed-out transaction is abandoned, not cancelled: it can still land
//! after this function has returned an error.

use crate::errors::{ChainError, RpcError, WalletError};
use crate::metrics::{self, Timer};
use crate::rpc::{BlockhashInfo, LedgerRpc};
use crate::wallet::WalletSigner;
use solana_sdk::{
    commitment_config::{CommitmentConfig, CommitmentLevel},
    instruction::Instruction,
    signature::{Keypair, Signature},
    transaction::Transaction,
};
use std::time::Duration;
use tokio::time::{sleep, timeout};
use tracing::{debug, warn};

/// How long and at which commitment to wait for a signature
#[derive(Debug, Clone, Copy)]
pub struct ConfirmOptions {
    pub commitment: CommitmentConfig,
    pub timeout: Duration,
    pub poll_interval: Duration,
}

/// Blockhash, preflight and confirmation settings for one submission
#[derive(Debug, Clone, Copy)]
pub struct SubmitOptions {
    pub blockhash_commitment: CommitmentConfig,
    pub preflight: CommitmentLevel,
    pub confirm: ConfirmOptions,
}

impl SubmitOptions {
    /// Everything at "finalized"; used for mint creation
    pub fn finalized(timeout: Duration, poll_interval: Duration) -> Self {
        Self::at(CommitmentConfig::finalized(), timeout, poll_interval)
    }

    pub fn confirmed(timeout: Duration, poll_interval: Duration) -> Self {
        Self::at(CommitmentConfig::confirmed(), timeout, poll_interval)
    }

    fn at(commitment: CommitmentConfig, timeout: Duration, poll_interval: Duration) -> Self {
        Self {
            blockhash_commitment: commitment,
            preflight: commitment.commitment,
            confirm: ConfirmOptions {
                commitment,
                timeout,
                poll_interval,
            },
        }
    }
}

/// Wait for `signature` to reach `opts.commitment`
pub async fn confirm_signature(
    rpc: &dyn LedgerRpc,
    signature: &Signature,
    last_valid_block_height: u64,
    opts: &ConfirmOptions,
) -> Result<(), RpcError> {
    let timer = Timer::new();

    let wait = async {
        loop {
            match rpc.signature_status(signature, opts.commitment).await? {
                Some(Ok(())) => return Ok(()),
                Some(Err(reason)) => return Err(RpcError::TransactionFailed(reason)),
                None => {}
            }
            let height = rpc.block_height(opts.commitment).await?;
            if height > last_valid_block_height {
                return Err(RpcError::BlockHeightExceeded {
                    last_valid_block_height,
                });
            }
            sleep(opts.poll_interval).await;
        }
    };

    match timeout(opts.timeout, wait).await {
        Ok(Ok(())) => {
            metrics::record(|m| timer.observe_duration(&m.confirmation_latency));
            debug!(signature = %signature, elapsed_secs = timer.elapsed_secs(), "Transaction confirmed");
            Ok(())
        }
        Ok(Err(err)) => {
            if matches!(err, RpcError::BlockHeightExceeded { .. }) {
                metrics::record(|m| m.blockhash_expirations.inc());
            }
            Err(err)
        }
        Err(_) => {
            metrics::record(|m| m.confirmation_timeouts.inc());
            // The transaction may still land after this point
            warn!(
                signature = %signature,
                timeout_ms = opts.timeout.as_millis() as u64,
                "Confirmation timed out, abandoning pending transaction"
            );
            Err(RpcError::ConfirmationTimeout {
                timeout_ms: opts.timeout.as_millis() as u64,
            })
        }
    }
}

/// Build, sign, send and confirm one transaction paid for by `wallet`
///
/// `extra_signers` sign locally before the wallet is asked for its
/// signature, so a remote provider sees a partially signed transaction.
pub async fn submit_transaction(
    rpc: &dyn LedgerRpc,
    wallet: &dyn WalletSigner,
    instructions: &[Instruction],
    extra_signers: &[&Keypair],
    opts: &SubmitOptions,
) -> Result<Signature, ChainError> {
    let payer = wallet.pubkey();
    let BlockhashInfo {
        blockhash,
        last_valid_block_height,
    } = rpc.latest_blockhash(opts.blockhash_commitment).await?;

    let mut tx = Transaction::new_with_payer(instructions, Some(&payer));
    tx.message.recent_blockhash = blockhash;
    if !extra_signers.is_empty() {
        tx.try_partial_sign(extra_signers, blockhash)
            .map_err(|e| WalletError::Signing(e.to_string()))?;
    }

    let tx = wallet.sign_transaction(tx).await?;
    if !tx.is_signed() || tx.message.recent_blockhash != blockhash {
        return Err(WalletError::IncompleteSignatures.into());
    }

    let signature = rpc.send_transaction(&tx, opts.preflight).await?;
    debug!(
        signature = %signature,
        payer = %payer,
        last_valid_block_height = last_valid_block_height,
        "Transaction submitted"
    );

    confirm_signature(rpc, &signature, last_valid_block_height, &opts.confirm).await?;
    Ok(signature)
}
