//! Transfer executor
//!
//! One-shot: a transfer is never retried. Pre-flight checks run against the
//! caller's last known balance and reject a request before any RPC call.

use crate::accounts::{mint_decimals, resolve_or_create_holder};
use crate::amount::{parse_ui_amount, parse_ui_units, TokenBalance, MAX_DECIMALS};
use crate::config::DeployConfig;
use crate::confirm::{submit_transaction, SubmitOptions};
use crate::errors::{ChainError, TransferError};
use crate::metrics;
use crate::network::Network;
use crate::recipients::RecentRecipients;
use crate::rpc::LedgerRpc;
use crate::session::{OperationKind, Session};
use crate::structured_logging::{OperationContext, StructuredLogger};
use crate::wallet::WalletSigner;
use chrono::Utc;
use serde::Serialize;
use solana_sdk::{pubkey::Pubkey, signature::Signature};
use std::str::FromStr;
use std::time::Duration;

/// Transfer form input
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransferRequest {
    pub recipient: String,
    /// Decimal amount in whole tokens, e.g. `"12.5"`
    pub amount: String,
    pub mint: Option<String>,
}

/// A request that passed pre-flight validation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CheckedTransfer {
    pub recipient: Pubkey,
    pub mint: Pubkey,
}

impl TransferRequest {
    /// Pre-flight checks, in order: recipient, amount, balance, mint
    pub fn validate(&self, balance: &TokenBalance) -> Result<CheckedTransfer, TransferError> {
        let recipient = self.recipient.trim();
        if recipient.is_empty() {
            return Err(TransferError::MissingRecipient);
        }
        let recipient = Pubkey::from_str(recipient)
            .map_err(|_| TransferError::InvalidRecipient(recipient.to_string()))?;

        // Compare at a common scale fine enough for any mint created here
        let scale = balance.decimals.max(MAX_DECIMALS);
        let requested = parse_ui_units(&self.amount, scale)?;
        let available = u128::from(balance.raw) * 10u128.pow(u32::from(scale - balance.decimals));
        if requested > available {
            return Err(TransferError::ExceedsBalance {
                requested: self.amount.trim().to_string(),
                available: balance.to_string(),
            });
        }

        let mint = match self.mint.as_deref().map(str::trim) {
            None | Some("") => return Err(TransferError::MissingMint),
            Some(mint) => {
                Pubkey::from_str(mint).map_err(|_| TransferError::InvalidMint(mint.to_string()))?
            }
        };

        Ok(CheckedTransfer { recipient, mint })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferResult {
    pub success: bool,
    #[serde(rename = "transactionId")]
    pub signature: String,
    pub amount: String,
    pub recipient: String,
    pub mint: String,
    pub raw_amount: u64,
}

#[derive(Debug, Clone, Copy)]
pub struct TransferExecutor {
    confirm_timeout: Duration,
    poll_interval: Duration,
}

impl Default for TransferExecutor {
    fn default() -> Self {
        Self::from(&DeployConfig::default())
    }
}

impl From<&DeployConfig> for TransferExecutor {
    fn from(config: &DeployConfig) -> Self {
        Self {
            confirm_timeout: config.confirm_timeout(),
            poll_interval: config.poll_interval(),
        }
    }
}

impl TransferExecutor {
    /// Send `request.amount` of `request.mint` from the session wallet
    ///
    /// `balance` is the sender's last known balance of that mint, used only
    /// for the pre-flight check. Missing holder accounts for either side
    /// are created and paid for by the sender.
    pub async fn transfer(
        &self,
        session: &Session,
        network: Network,
        request: &TransferRequest,
        balance: &TokenBalance,
    ) -> Result<TransferResult, TransferError> {
        let _guard = session
            .begin(OperationKind::Transfer)
            .ok_or(TransferError::InProgress)?;

        let checked = request.validate(balance).map_err(|e| {
            metrics::record(|m| m.transfers_rejected.inc());
            e
        })?;

        let wallet = session.wallet()?;
        let connection = session.connection(network)?;
        let ctx = OperationContext::new("transfer", network);

        let outcome = self
            .execute(connection.rpc.as_ref(), wallet.as_ref(), &checked, &request.amount, &ctx.logger)
            .await;

        let mint = checked.mint.to_string();
        match outcome {
            Ok((signature, raw_amount)) => {
                ctx.logger
                    .log_transfer_success(&mint, &signature.to_string(), ctx.elapsed_ms());
                metrics::record(|m| m.transfers_success.inc());

                let recipient = checked.recipient.to_string();
                let mut recent = RecentRecipients::load(session.store()).unwrap_or_else(|e| {
                    ctx.logger.warn(&format!("discarding unreadable recent recipients: {}", e));
                    RecentRecipients::default()
                });
                recent.record(&recipient, Utc::now());
                if let Err(e) = recent.save(session.store()) {
                    ctx.logger.warn(&format!("failed to persist recent recipients: {}", e));
                }

                Ok(TransferResult {
                    success: true,
                    signature: signature.to_string(),
                    amount: request.amount.trim().to_string(),
                    recipient,
                    mint,
                    raw_amount,
                })
            }
            Err(e) => {
                ctx.logger
                    .log_transfer_failure(&mint, &e.to_string(), ctx.elapsed_ms());
                metrics::record(|m| {
                    m.transfers_failed
                        .with_label_values(&[e.category()])
                        .inc()
                });
                Err(e)
            }
        }
    }

    async fn execute(
        &self,
        rpc: &dyn LedgerRpc,
        signer: &dyn WalletSigner,
        checked: &CheckedTransfer,
        amount: &str,
        logger: &StructuredLogger,
    ) -> Result<(Signature, u64), TransferError> {
        let opts = SubmitOptions::confirmed(self.confirm_timeout, self.poll_interval);
        let sender = signer.pubkey();

        // Settle the exact amount before anything is paid for
        let decimals = mint_decimals(rpc, &checked.mint).await?;
        let raw_amount = parse_ui_amount(amount, decimals)?;
        logger.log_transfer_attempt(&checked.mint.to_string(), &checked.recipient.to_string(), raw_amount);

        let source = resolve_or_create_holder(rpc, signer, &checked.mint, &sender, &opts).await?;
        let destination =
            resolve_or_create_holder(rpc, signer, &checked.mint, &checked.recipient, &opts).await?;

        let ix = spl_token::instruction::transfer(
            &spl_token::id(),
            &source.address,
            &destination.address,
            &sender,
            &[],
            raw_amount,
        )
        .map_err(|e| ChainError::instruction_failed("spl-token", e))?;

        let signature = submit_transaction(rpc, signer, &[ix], &[], &opts).await?;
        Ok((signature, raw_amount))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::AmountError;

    fn request(recipient: &str, amount: &str, mint: Option<&str>) -> TransferRequest {
        TransferRequest {
            recipient: recipient.to_string(),
            amount: amount.to_string(),
            mint: mint.map(str::to_string),
        }
    }

    #[test]
    fn test_preflight_order() {
        let balance = TokenBalance::new(30_000_000, 6);
        let recipient = Pubkey::new_unique().to_string();
        let mint = Pubkey::new_unique().to_string();

        assert!(matches!(
            request("", "0", None).validate(&balance),
            Err(TransferError::MissingRecipient)
        ));
        assert!(matches!(
            request("nope", "5", Some(&mint)).validate(&balance),
            Err(TransferError::InvalidRecipient(_))
        ));
        assert!(matches!(
            request(&recipient, "0", None).validate(&balance),
            Err(TransferError::Amount(AmountError::NotPositive))
        ));
        assert!(matches!(
            request(&recipient, "50", None).validate(&balance),
            Err(TransferError::ExceedsBalance { .. })
        ));
        assert!(matches!(
            request(&recipient, "30", None).validate(&balance),
            Err(TransferError::MissingMint)
        ));

        let checked = request(&recipient, "30", Some(&mint)).validate(&balance).unwrap();
        assert_eq!(checked.recipient.to_string(), recipient);
    }

    #[test]
    fn test_fractional_amount_against_balance() {
        let balance = TokenBalance::new(25, 1);
        let recipient = Pubkey::new_unique().to_string();
        let mint = Some(Pubkey::new_unique().to_string());

        let mut req = request(&recipient, "2.5", None);
        req.mint = mint.clone();
        assert!(req.validate(&balance).is_ok());

        req.amount = "2.51".to_string();
        let err = req.validate(&balance).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Amount exceeds your balance (requested 2.51, available 2.5)"
        );
        assert!(err.is_preflight());
    }

    #[test]
    fn test_large_whole_token_balance() {
        // 100 billion tokens on a 0-decimal mint; past u64 once scaled to 9
        let balance = TokenBalance::new(100_000_000_000, 0);
        let recipient = Pubkey::new_unique().to_string();
        let mint = Pubkey::new_unique().to_string();

        let checked = request(&recipient, "50000000000", Some(&mint)).validate(&balance);
        assert!(checked.is_ok());
        assert!(matches!(
            request(&recipient, "100000000001", Some(&mint)).validate(&balance),
            Err(TransferError::ExceedsBalance { .. })
        ));
    }
}
