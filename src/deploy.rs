//! Deployment orchestrator
//!
//! Two phases, each retried on its own with a fixed delay:
//! 1. mint creation: a fresh mint keypair and a fresh finalized blockhash
//!    every attempt, confirmed at "finalized"
//! 2. initial supply: resolve or create the owner's holder account, then
//!    mint `supply × 10^decimals` to it, confirmed at "confirmed"
//!
//! A deployment succeeds once the mint exists. Phase 2 is best-effort: if
//! it cannot complete, the result records `"unknown"` as the mint
//! transaction id.
//!
//! Known limitation: a mint-creation attempt that times out is abandoned,
//! not cancelled. If it lands after the timeout and a retry also lands, two
//! mints exist and only the second is reported.

use crate::accounts::resolve_or_create_holder;
use crate::config::DeployConfig;
use crate::confirm::{submit_transaction, SubmitOptions};
use crate::errors::{ChainError, DeployPhase, DeploymentError, RpcError};
use crate::metrics;
use crate::network::Network;
use crate::retry::{retry_with_fixed_delay, RetryPolicy};
use crate::rpc::LedgerRpc;
use crate::session::{OperationKind, Session};
use crate::storage::keys;
use crate::structured_logging::{OperationContext, StructuredLogger};
use crate::token::{DeploymentResult, TokenConfig, TokenMetadataDraft, UNKNOWN_TX};
use crate::wallet::WalletSigner;
use chrono::Utc;
use solana_sdk::{
    pubkey::Pubkey,
    signature::{Keypair, Signature, Signer},
    system_instruction,
};
use spl_token::solana_program::program_pack::Pack;
use spl_token::state::Mint;
use std::time::Duration;
use tracing::{debug, warn};

/// Retry and confirmation parameters of a deployment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeploySettings {
    pub mint_retry: RetryPolicy,
    pub supply_retry: RetryPolicy,
    pub confirm_timeout: Duration,
    pub poll_interval: Duration,
}

impl Default for DeploySettings {
    fn default() -> Self {
        Self::from(&DeployConfig::default())
    }
}

impl From<&DeployConfig> for DeploySettings {
    fn from(config: &DeployConfig) -> Self {
        Self {
            mint_retry: config.mint_retry_policy(),
            supply_retry: config.supply_retry_policy(),
            confirm_timeout: config.confirm_timeout(),
            poll_interval: config.poll_interval(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct DeploymentOrchestrator {
    settings: DeploySettings,
}

impl DeploymentOrchestrator {
    pub fn new(settings: DeploySettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &DeploySettings {
        &self.settings
    }

    /// Create the mint described by `config` on `network` and mint its
    /// initial supply to the session wallet
    ///
    /// `metadata` is descriptive only and is never written on-chain.
    pub async fn deploy(
        &self,
        session: &Session,
        config: &TokenConfig,
        metadata: Option<&TokenMetadataDraft>,
        network: Network,
    ) -> Result<DeploymentResult, DeploymentError> {
        let _guard = session
            .begin(OperationKind::Deploy)
            .ok_or(DeploymentError::InProgress)?;

        config.validate()?;
        let raw_supply = config.raw_initial_supply()?;

        let wallet = session.wallet().map_err(|e| {
            debug!(error = %e, "No wallet available for deployment");
            DeploymentError::from(e)
        })?;
        let connection = session.connection(network)?;

        let ctx = OperationContext::new("deploy", network);
        let logger = &ctx.logger;
        let rpc: &dyn LedgerRpc = connection.rpc.as_ref();
        let signer: &dyn WalletSigner = wallet.as_ref();
        let authority = signer.pubkey();

        logger.log_deploy_started(&config.name, &config.symbol, network, &authority.to_string());
        if let Some(metadata) = metadata {
            debug!(
                context_id = %logger.context_id(),
                description_len = metadata.description.len(),
                external_url = %metadata.external_url,
                attributes = metadata.attributes.len(),
                "Token metadata kept off-chain"
            );
        }

        // Phase 1
        let mint_opts = SubmitOptions::finalized(self.settings.confirm_timeout, self.settings.poll_interval);
        let mint_policy = self.settings.mint_retry;
        let decimals = config.decimals;
        let created = retry_with_fixed_delay(DeployPhase::MintCreation.as_str(), &mint_policy, |attempt| {
            logger.log_phase_attempt(DeployPhase::MintCreation, attempt, mint_policy.max_attempts);
            metrics::record(|m| {
                m.deploy_attempts
                    .with_label_values(&[DeployPhase::MintCreation.as_str()])
                    .inc()
            });
            create_mint_once(rpc, signer, decimals, mint_opts, attempt, logger)
        })
        .await;

        let (mint, create_sig, attempts) = match created {
            Ok(created) => created,
            Err(exhausted) => {
                let err = DeploymentError::exhausted(
                    DeployPhase::MintCreation,
                    exhausted.attempts,
                    &exhausted.last_error,
                );
                logger.log_deploy_failure(
                    DeployPhase::MintCreation,
                    exhausted.attempts,
                    &exhausted.last_error.to_string(),
                );
                metrics::record(|m| {
                    m.deployments_failed
                        .with_label_values(&[exhausted.last_error.category()])
                        .inc()
                });
                return Err(err);
            }
        };
        logger.log_mint_created(&mint.to_string(), &create_sig.to_string(), attempts);

        // Phase 2
        let mint_tx = self
            .mint_initial_supply(rpc, signer, &mint, raw_supply, logger)
            .await;

        let result = DeploymentResult {
            token_name: config.name.clone(),
            token_symbol: config.symbol.clone(),
            mint_address: mint.to_string(),
            initial_supply: config.initial_supply,
            decimals: config.decimals,
            owner: authority.to_string(),
            network,
            deploy_time: Utc::now(),
            create_tx_id: create_sig.to_string(),
            mint_tx_id: mint_tx
                .map(|sig| sig.to_string())
                .unwrap_or_else(|| UNKNOWN_TX.to_string()),
        };

        if result.is_fully_minted() {
            metrics::record(|m| m.deployments_success.inc());
        } else {
            metrics::record(|m| m.deployments_partial.inc());
        }
        if let Err(e) = session.store().set(keys::DEPLOYMENT_RESULT, &result) {
            logger.warn(&format!("failed to persist deployment result: {}", e));
        }

        Ok(result)
    }

    /// Holder account plus retried `MintTo`; `None` when either step gives up
    async fn mint_initial_supply(
        &self,
        rpc: &dyn LedgerRpc,
        signer: &dyn WalletSigner,
        mint: &Pubkey,
        raw_supply: u64,
        logger: &StructuredLogger,
    ) -> Option<Signature> {
        let opts = SubmitOptions::confirmed(self.settings.confirm_timeout, self.settings.poll_interval);
        let owner = signer.pubkey();

        let holder = match resolve_or_create_holder(rpc, signer, mint, &owner, &opts).await {
            Ok(holder) => holder,
            Err(e) => {
                logger.log_partial_success(
                    &mint.to_string(),
                    &format!("holder account unavailable: {}", e),
                );
                return None;
            }
        };

        let policy = self.settings.supply_retry;
        let minted = retry_with_fixed_delay(DeployPhase::InitialMint.as_str(), &policy, |attempt| {
            logger.log_phase_attempt(DeployPhase::InitialMint, attempt, policy.max_attempts);
            metrics::record(|m| {
                m.deploy_attempts
                    .with_label_values(&[DeployPhase::InitialMint.as_str()])
                    .inc()
            });
            mint_supply_once(rpc, signer, *mint, holder.address, raw_supply, opts)
        })
        .await;

        match minted {
            Ok(signature) => {
                logger.log_supply_minted(
                    &mint.to_string(),
                    &holder.address.to_string(),
                    raw_supply,
                    &signature.to_string(),
                );
                Some(signature)
            }
            Err(exhausted) => {
                logger.log_partial_success(
                    &mint.to_string(),
                    &format!(
                        "initial mint failed after {} attempts: {}",
                        exhausted.attempts, exhausted.last_error
                    ),
                );
                None
            }
        }
    }
}

/// One mint-creation attempt with a brand-new mint keypair
async fn create_mint_once(
    rpc: &dyn LedgerRpc,
    signer: &dyn WalletSigner,
    decimals: u8,
    opts: SubmitOptions,
    attempt: u32,
    logger: &StructuredLogger,
) -> Result<(Pubkey, Signature, u32), ChainError> {
    let mint = Keypair::new();
    let authority = signer.pubkey();

    let lamports = rpc.minimum_balance_for_rent_exemption(Mint::LEN).await?;
    let create = system_instruction::create_account(
        &authority,
        &mint.pubkey(),
        lamports,
        Mint::LEN as u64,
        &spl_token::id(),
    );
    let initialize = spl_token::instruction::initialize_mint(
        &spl_token::id(),
        &mint.pubkey(),
        &authority,
        Some(&authority),
        decimals,
    )
    .map_err(|e| ChainError::instruction_failed("spl-token", e))?;

    match submit_transaction(rpc, signer, &[create, initialize], &[&mint], &opts).await {
        Ok(signature) => Ok((mint.pubkey(), signature, attempt)),
        Err(err) => {
            if matches!(err, ChainError::Rpc(RpcError::ConfirmationTimeout { .. })) {
                logger.warn(&format!(
                    "abandoned mint-creation transaction for {} may still land",
                    mint.pubkey()
                ));
            }
            Err(err)
        }
    }
}

async fn mint_supply_once(
    rpc: &dyn LedgerRpc,
    signer: &dyn WalletSigner,
    mint: Pubkey,
    holder: Pubkey,
    raw_supply: u64,
    opts: SubmitOptions,
) -> Result<Signature, ChainError> {
    let authority = signer.pubkey();
    let ix = spl_token::instruction::mint_to(
        &spl_token::id(),
        &mint,
        &holder,
        &authority,
        &[],
        raw_supply,
    )
    .map_err(|e| ChainError::instruction_failed("spl-token", e))?;

    let signature = submit_transaction(rpc, signer, &[ix], &[], &opts).await?;
    if raw_supply == 0 {
        warn!(mint = %mint, "Minted zero initial supply");
    }
    Ok(signature)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{mock_session, MockLedger, SendBehavior};
    use crate::wallet::ProviderRegistry;
    use std::sync::Arc;

    fn config() -> TokenConfig {
        TokenConfig {
            name: "Test".to_string(),
            symbol: "TST".to_string(),
            initial_supply: 1000,
            decimals: 6,
        }
    }

    async fn funded_session(ledger: &Arc<MockLedger>) -> Session {
        let session = mock_session(ledger.clone(), ProviderRegistry::new());
        let outcome = session.connect(None).await.unwrap();
        ledger.fund(&outcome.wallet.pubkey(), 10_000_000_000);
        session
    }

    #[tokio::test(start_paused = true)]
    async fn test_deploy_without_wallet() {
        let ledger = Arc::new(MockLedger::new());
        let session = mock_session(ledger, ProviderRegistry::new());
        let err = DeploymentOrchestrator::default()
            .deploy(&session, &config(), None, Network::Devnet)
            .await
            .unwrap_err();
        assert!(matches!(err, DeploymentError::NoWallet));
    }

    #[tokio::test(start_paused = true)]
    async fn test_deploy_with_unreadable_stored_wallet() {
        use crate::errors::{StorageError, WalletError};
        use crate::wallet::WalletKind;

        let ledger = Arc::new(MockLedger::new());
        let session = mock_session(ledger.clone(), ProviderRegistry::new());
        session.store().set(keys::WALLET_TYPE, &WalletKind::Local).unwrap();
        session.store().set(keys::WALLET_PUBLIC_KEY, "not-a-key").unwrap();

        let err = DeploymentOrchestrator::default()
            .deploy(&session, &config(), None, Network::Devnet)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            DeploymentError::Wallet(WalletError::Storage(StorageError::Corrupt { .. }))
        ));
        assert!(err.to_string().starts_with("Token deployment failed:"));
        assert!(ledger.sent_transactions().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_deploy_rejects_invalid_config_before_network() {
        let ledger = Arc::new(MockLedger::new());
        let session = funded_session(&ledger).await;
        let mut cfg = config();
        cfg.decimals = 10;

        let err = DeploymentOrchestrator::default()
            .deploy(&session, &cfg, None, Network::Devnet)
            .await
            .unwrap_err();
        assert!(matches!(err, DeploymentError::InvalidConfig(_)));
        assert!(ledger.sent_transactions().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_deploy_mints_exact_supply() {
        let ledger = Arc::new(MockLedger::new());
        let session = funded_session(&ledger).await;
        let mut cfg = config();
        cfg.initial_supply = 1_000_000;
        cfg.decimals = 9;

        let result = DeploymentOrchestrator::default()
            .deploy(&session, &cfg, None, Network::Devnet)
            .await
            .unwrap();

        let mint: Pubkey = result.mint_address.parse().unwrap();
        let state = ledger.mint(&mint).unwrap();
        assert_eq!(state.supply, 1_000_000_000_000_000);
        assert_eq!(state.decimals, 9);
        assert!(result.is_fully_minted());
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_concurrent_deploy_is_rejected() {
        let ledger = Arc::new(MockLedger::new());
        let session = funded_session(&ledger).await;
        let _held = session.begin(OperationKind::Deploy).unwrap();

        let err = DeploymentOrchestrator::default()
            .deploy(&session, &config(), None, Network::Devnet)
            .await
            .unwrap_err();
        assert!(matches!(err, DeploymentError::InProgress));
    }

    #[tokio::test(start_paused = true)]
    async fn test_mint_retry_uses_fresh_keypair_and_blockhash() {
        let ledger = Arc::new(MockLedger::new());
        let session = funded_session(&ledger).await;
        ledger.script_sends([
            SendBehavior::Fail("Blockhash not found".to_string()),
            SendBehavior::Fail("Blockhash not found".to_string()),
        ]);

        let result = DeploymentOrchestrator::default()
            .deploy(&session, &config(), None, Network::Devnet)
            .await
            .unwrap();

        let sent = ledger.sent_transactions();
        // Three mint-creation attempts, then holder creation and MintTo
        let mint_attempts: Vec<Pubkey> = sent[..3].iter().map(|tx| tx.message.account_keys[1]).collect();
        assert_eq!(mint_attempts[2].to_string(), result.mint_address);
        assert_ne!(mint_attempts[0], mint_attempts[1]);
        assert_ne!(mint_attempts[1], mint_attempts[2]);
        assert_ne!(mint_attempts[0], mint_attempts[2]);

        let blockhashes: Vec<_> = sent[..3].iter().map(|tx| tx.message.recent_blockhash).collect();
        assert_ne!(blockhashes[0], blockhashes[1]);
        assert_ne!(blockhashes[1], blockhashes[2]);
    }
}
