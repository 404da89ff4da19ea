//! Balance query

use crate::accounts::holder_balance;
use crate::amount::TokenBalance;
use crate::errors::BalanceQueryError;
use crate::metrics;
use crate::network::Network;
use crate::session::Session;
use solana_sdk::pubkey::Pubkey;
use tracing::{debug, warn};

/// Session wallet's balance of `mint`; zero when it holds no account
pub async fn query_token_balance(
    session: &Session,
    network: Network,
    mint: &Pubkey,
) -> Result<TokenBalance, BalanceQueryError> {
    let wallet = session.wallet()?;
    let connection = session.connection(network)?;
    let rpc = connection.rpc.as_ref();
    let owner = wallet.pubkey();

    let accounts = rpc.token_accounts_by_owner(&owner, mint).await?;
    let Some(holder) = accounts.first() else {
        debug!(owner = %owner, mint = %mint, "No holder account, balance is zero");
        return Ok(TokenBalance::zero());
    };
    Ok(holder_balance(rpc, holder).await?)
}

/// Like [`query_token_balance`] but never fails: errors read as zero
pub async fn get_token_balance(session: &Session, network: Network, mint: &Pubkey) -> TokenBalance {
    match query_token_balance(session, network, mint).await {
        Ok(balance) => balance,
        Err(e) => {
            warn!(mint = %mint, network = %network, error = %e, "Balance query failed, reporting zero");
            metrics::record(|m| m.balance_query_failures.inc());
            TokenBalance::zero()
        }
    }
}
