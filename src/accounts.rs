//! Holder (associated token) accounts and mint state lookups

use crate::amount::TokenBalance;
use crate::confirm::{submit_transaction, SubmitOptions};
use crate::errors::{ChainError, RpcError};
use crate::rpc::LedgerRpc;
use crate::wallet::WalletSigner;
use solana_sdk::{
    account::Account, commitment_config::CommitmentConfig, pubkey::Pubkey, signature::Signature,
};
use spl_associated_token_account::{
    get_associated_token_address, instruction::create_associated_token_account_idempotent,
};
use spl_token::solana_program::program_pack::Pack;
use spl_token::state::{Account as TokenAccount, Mint};
use tracing::{debug, info};

/// A holder account, and the transaction that created it if this call did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HolderAccount {
    pub address: Pubkey,
    pub created: Option<Signature>,
}

/// Return `owner`'s associated account for `mint`, creating it (funded by
/// `wallet`) when it does not exist yet
pub async fn resolve_or_create_holder(
    rpc: &dyn LedgerRpc,
    wallet: &dyn WalletSigner,
    mint: &Pubkey,
    owner: &Pubkey,
    opts: &SubmitOptions,
) -> Result<HolderAccount, ChainError> {
    let address = get_associated_token_address(owner, mint);

    if let Some(account) = rpc.get_account(&address, opts.confirm.commitment).await? {
        ensure_token_owned(&address, &account)?;
        debug!(holder = %address, owner = %owner, mint = %mint, "Holder account exists");
        return Ok(HolderAccount {
            address,
            created: None,
        });
    }

    let ix = create_associated_token_account_idempotent(
        &wallet.pubkey(),
        owner,
        mint,
        &spl_token::id(),
    );
    let signature = submit_transaction(rpc, wallet, &[ix], &[], opts).await?;
    info!(holder = %address, owner = %owner, mint = %mint, signature = %signature, "Created holder account");

    Ok(HolderAccount {
        address,
        created: Some(signature),
    })
}

fn ensure_token_owned(address: &Pubkey, account: &Account) -> Result<(), RpcError> {
    if account.owner != spl_token::id() {
        return Err(RpcError::InvalidAccountData {
            account: address.to_string(),
            reason: format!("owned by {}, not the token program", account.owner),
        });
    }
    Ok(())
}

async fn load_account(rpc: &dyn LedgerRpc, address: &Pubkey) -> Result<Account, RpcError> {
    let account = rpc
        .get_account(address, CommitmentConfig::confirmed())
        .await?
        .ok_or_else(|| RpcError::AccountNotFound(address.to_string()))?;
    ensure_token_owned(address, &account)?;
    Ok(account)
}

pub async fn load_mint(rpc: &dyn LedgerRpc, mint: &Pubkey) -> Result<Mint, RpcError> {
    let account = load_account(rpc, mint).await?;
    Mint::unpack(&account.data).map_err(|e| RpcError::InvalidAccountData {
        account: mint.to_string(),
        reason: e.to_string(),
    })
}

/// Decimal scale recorded on the mint
pub async fn mint_decimals(rpc: &dyn LedgerRpc, mint: &Pubkey) -> Result<u8, RpcError> {
    Ok(load_mint(rpc, mint).await?.decimals)
}

/// Raw amount of a holder account, scaled by its mint's decimals
pub async fn holder_balance(rpc: &dyn LedgerRpc, holder: &Pubkey) -> Result<TokenBalance, RpcError> {
    let account = load_account(rpc, holder).await?;
    let state = TokenAccount::unpack(&account.data).map_err(|e| RpcError::InvalidAccountData {
        account: holder.to_string(),
        reason: e.to_string(),
    })?;
    let decimals = mint_decimals(rpc, &state.mint).await?;
    Ok(TokenBalance::new(state.amount, decimals))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::MockLedger;
    use crate::wallet::LocalWallet;
    use solana_sdk::signature::Keypair;
    use std::time::Duration;

    fn opts() -> SubmitOptions {
        SubmitOptions::confirmed(Duration::from_secs(45), Duration::from_millis(500))
    }

    #[tokio::test(start_paused = true)]
    async fn test_creates_then_reuses_holder() {
        let ledger = MockLedger::new();
        let wallet = LocalWallet::from_keypair(Keypair::new());
        ledger.fund(&wallet.pubkey(), 1_000_000_000);
        let mint = ledger.create_mint(&wallet.pubkey(), 6);
        let recipient = Pubkey::new_unique();

        let created = resolve_or_create_holder(&ledger, &wallet, &mint, &recipient, &opts())
            .await
            .unwrap();
        assert!(created.created.is_some());
        assert_eq!(created.address, get_associated_token_address(&recipient, &mint));
        assert_eq!(ledger.token_account(&created.address).unwrap().owner, recipient);

        let reused = resolve_or_create_holder(&ledger, &wallet, &mint, &recipient, &opts())
            .await
            .unwrap();
        assert_eq!(reused.address, created.address);
        assert!(reused.created.is_none());
    }

    #[tokio::test]
    async fn test_mint_decimals_and_balance() {
        let ledger = MockLedger::new();
        let owner = Pubkey::new_unique();
        let mint = ledger.create_mint(&owner, 4);
        let holder = ledger.create_token_account(&owner, &mint, 12_345);

        assert_eq!(mint_decimals(&ledger, &mint).await.unwrap(), 4);
        let balance = holder_balance(&ledger, &holder).await.unwrap();
        assert_eq!(balance, TokenBalance::new(12_345, 4));
        assert_eq!(balance.to_string(), "1.2345");
    }

    #[tokio::test]
    async fn test_missing_mint_is_not_found() {
        let ledger = MockLedger::new();
        let err = mint_decimals(&ledger, &Pubkey::new_unique()).await.unwrap_err();
        assert!(matches!(err, RpcError::AccountNotFound(_)));
    }

    #[tokio::test]
    async fn test_system_account_is_not_a_mint() {
        let ledger = MockLedger::new();
        let address = Pubkey::new_unique();
        ledger.fund(&address, 10);
        let err = mint_decimals(&ledger, &address).await.unwrap_err();
        assert!(matches!(err, RpcError::InvalidAccountData { .. }));
    }
}
