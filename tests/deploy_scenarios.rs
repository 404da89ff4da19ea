//! End-to-end deployment scenarios against the in-memory ledger
//!
//! Covers:
//! - Funded wallet: mint created, supply minted, result persisted
//! - Unfunded wallet: phase 1 exhausted with the funds hint
//! - Holder-account failure: partial success with an unknown mint tx
//! - Abandoned mint-creation attempt that still lands

use mintdesk::errors::{DeployFailureKind, DeployPhase};
use mintdesk::storage::keys;
use mintdesk::test_utils::{mock_session, MockLedger, SendBehavior};
use mintdesk::token::UNKNOWN_TX;
use mintdesk::wallet::ProviderRegistry;
use mintdesk::{
    DeploySettings, DeploymentError, DeploymentOrchestrator, DeploymentResult, Network, Session,
    TokenConfig, TokenMetadataDraft,
};
use solana_sdk::pubkey::Pubkey;
use spl_associated_token_account::get_associated_token_address;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

fn token(supply: u64, decimals: u8) -> TokenConfig {
    TokenConfig {
        name: "Test".to_string(),
        symbol: "TST".to_string(),
        initial_supply: supply,
        decimals,
    }
}

async fn session_with_lamports(ledger: &Arc<MockLedger>, lamports: u64) -> (Session, Pubkey) {
    let session = mock_session(ledger.clone(), ProviderRegistry::new());
    let owner = session.connect(None).await.unwrap().wallet.pubkey();
    ledger.fund(&owner, lamports);
    (session, owner)
}

#[tokio::test(start_paused = true)]
async fn test_funded_deploy_mints_supply_to_owner() {
    let ledger = Arc::new(MockLedger::new());
    let (session, owner) = session_with_lamports(&ledger, 2_000_000_000).await;
    let metadata = TokenMetadataDraft {
        description: "Reference only".to_string(),
        ..Default::default()
    };

    let result = DeploymentOrchestrator::default()
        .deploy(&session, &token(1000, 6), Some(&metadata), Network::Devnet)
        .await
        .unwrap();

    assert_eq!(result.owner, owner.to_string());
    assert_eq!(result.network, Network::Devnet);
    assert!(result.is_fully_minted());

    let mint: Pubkey = result.mint_address.parse().unwrap();
    let holder = ledger
        .token_account(&get_associated_token_address(&owner, &mint))
        .unwrap();
    assert_eq!(holder.amount, 1_000_000_000);
    assert_eq!(ledger.mint(&mint).unwrap().mint_authority.unwrap(), owner);

    let stored: DeploymentResult = session.store().get(keys::DEPLOYMENT_RESULT).unwrap().unwrap();
    assert_eq!(stored, result);
}

#[tokio::test(start_paused = true)]
async fn test_insufficient_funds_exhausts_mint_creation() {
    let ledger = Arc::new(MockLedger::new());
    // Enough for fees, not for the mint's rent
    let (session, _) = session_with_lamports(&ledger, 100_000).await;

    let started = Instant::now();
    let err = DeploymentOrchestrator::default()
        .deploy(&session, &token(1000, 6), None, Network::Devnet)
        .await
        .unwrap_err();

    match &err {
        DeploymentError::Exhausted {
            phase,
            attempts,
            kind,
            ..
        } => {
            assert_eq!(*phase, DeployPhase::MintCreation);
            assert_eq!(*attempts, 3);
            assert_eq!(*kind, DeployFailureKind::InsufficientFunds);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(err.to_string().contains("Insufficient SOL balance"));

    // Two 3s delays between three attempts
    assert!(started.elapsed() >= Duration::from_secs(6));
    assert_eq!(ledger.sent_transactions().len(), 3);
    assert!(ledger.mint_addresses().is_empty());
    assert!(session.store().get::<DeploymentResult>(keys::DEPLOYMENT_RESULT).unwrap().is_none());
}

#[tokio::test(start_paused = true)]
async fn test_holder_failure_is_partial_success() {
    let ledger = Arc::new(MockLedger::new());
    let (session, _) = session_with_lamports(&ledger, 2_000_000_000).await;
    ledger.fail_program(spl_associated_token_account::id(), "account creation unavailable");

    let result = DeploymentOrchestrator::default()
        .deploy(&session, &token(500, 2), None, Network::Devnet)
        .await
        .unwrap();

    assert_eq!(result.mint_tx_id, UNKNOWN_TX);
    assert!(!result.is_fully_minted());
    let mint: Pubkey = result.mint_address.parse().unwrap();
    assert_eq!(ledger.mint(&mint).unwrap().supply, 0);
}

#[tokio::test(start_paused = true)]
async fn test_supply_retries_then_reports_unknown() {
    let ledger = Arc::new(MockLedger::new());
    let (session, _) = session_with_lamports(&ledger, 2_000_000_000).await;
    ledger.script_sends([
        SendBehavior::Land, // mint creation
        SendBehavior::Land, // holder account
        SendBehavior::Fail("node is behind".to_string()),
        SendBehavior::Fail("node is behind".to_string()),
        SendBehavior::Fail("node is behind".to_string()),
    ]);

    let started = Instant::now();
    let result = DeploymentOrchestrator::default()
        .deploy(&session, &token(10, 0), None, Network::Devnet)
        .await
        .unwrap();

    assert_eq!(result.mint_tx_id, UNKNOWN_TX);
    assert_eq!(ledger.sent_transactions().len(), 5);
    assert!(started.elapsed() >= Duration::from_secs(4));
}

#[tokio::test(start_paused = true)]
async fn test_abandoned_mint_attempt_can_still_land() {
    let ledger = Arc::new(MockLedger::new());
    let (session, _) = session_with_lamports(&ledger, 2_000_000_000).await;
    // First attempt executes but is never reported, so the wait gives up
    ledger.script_sends([SendBehavior::LandUnreported]);

    let result = DeploymentOrchestrator::default()
        .deploy(&session, &token(1, 0), None, Network::Devnet)
        .await
        .unwrap();

    let mints = ledger.mint_addresses();
    assert_eq!(mints.len(), 2);
    let reported: Pubkey = result.mint_address.parse().unwrap();
    assert!(mints.contains(&reported));
    let orphan = mints.iter().find(|m| **m != reported).unwrap();
    assert_eq!(ledger.mint(orphan).unwrap().supply, 0);
}

#[tokio::test(start_paused = true)]
async fn test_confirmation_timeout_counts_as_failed_attempt() {
    let ledger = Arc::new(MockLedger::new());
    let (session, _) = session_with_lamports(&ledger, 2_000_000_000).await;
    ledger.freeze_block_height();
    ledger.script_sends([
        SendBehavior::NeverConfirm,
        SendBehavior::NeverConfirm,
        SendBehavior::NeverConfirm,
    ]);

    let settings = DeploySettings {
        confirm_timeout: Duration::from_secs(5),
        ..DeploySettings::default()
    };
    let err = DeploymentOrchestrator::new(settings)
        .deploy(&session, &token(1, 0), None, Network::Devnet)
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        DeploymentError::Exhausted {
            phase: DeployPhase::MintCreation,
            attempts: 3,
            ..
        }
    ));
    assert!(err.to_string().contains("confirmation timeout"));
}
