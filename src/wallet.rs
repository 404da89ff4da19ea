//! Wallet adapter: one signing interface over two key custody models
//!
//! `RemoteWallet` forwards every signature request to an injected provider
//! (an extension-style wallet that holds the key). `LocalWallet` holds the
//! keypair itself and signs in-process. Both are used through
//! `WalletSigner`, chosen once at connect time.

use crate::errors::WalletError;
use async_trait::async_trait;
use bip39::Mnemonic;
use serde::{Deserialize, Serialize};
use solana_sdk::{
    pubkey::Pubkey,
    signature::{keypair_from_seed, Keypair, Signer},
    transaction::Transaction,
};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info};
use zeroize::Zeroizing;

/// Wallet variant tag, persisted under `walletType`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WalletKind {
    Phantom,
    Solflare,
    #[serde(rename = "local")]
    Local,
}

impl WalletKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            WalletKind::Phantom => "Phantom",
            WalletKind::Solflare => "Solflare",
            WalletKind::Local => "local",
        }
    }

    pub fn is_remote(&self) -> bool {
        !matches!(self, WalletKind::Local)
    }
}

impl fmt::Display for WalletKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WalletKind {
    type Err = WalletError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Phantom" | "phantom" => Ok(WalletKind::Phantom),
            "Solflare" | "solflare" => Ok(WalletKind::Solflare),
            "local" | "Local" => Ok(WalletKind::Local),
            other => Err(WalletError::Connection {
                provider: other.to_string(),
                reason: "unknown wallet type".to_string(),
            }),
        }
    }
}

/// Order in which installed providers are preferred
pub const PROVIDER_PRIORITY: [WalletKind; 2] = [WalletKind::Solflare, WalletKind::Phantom];

/// Account events a provider can push after connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderEvent {
    Connected(Pubkey),
    Disconnected,
}

/// An externally hosted wallet that owns the secret key
#[async_trait]
pub trait WalletProvider: Send + Sync {
    fn kind(&self) -> WalletKind;

    fn is_connected(&self) -> bool;

    /// `None` until the provider has an authorized account
    fn public_key(&self) -> Option<Pubkey>;

    async fn connect(&self) -> Result<(), WalletError>;

    async fn sign_transaction(&self, tx: Transaction) -> Result<Transaction, WalletError>;

    async fn sign_all_transactions(
        &self,
        txs: Vec<Transaction>,
    ) -> Result<Vec<Transaction>, WalletError>;

    /// Event stream, for providers that emit connect/disconnect
    fn subscribe(&self) -> Option<broadcast::Receiver<ProviderEvent>> {
        None
    }
}

/// Capability set every wallet variant exposes to the orchestration core
#[async_trait]
pub trait WalletSigner: Send + Sync {
    fn pubkey(&self) -> Pubkey;

    fn kind(&self) -> WalletKind;

    /// Add this wallet's signature; signatures already present are kept
    async fn sign_transaction(&self, tx: Transaction) -> Result<Transaction, WalletError>;

    async fn sign_all_transactions(
        &self,
        txs: Vec<Transaction>,
    ) -> Result<Vec<Transaction>, WalletError>;
}

/// The current wallet of a session
pub type WalletHandle = Arc<dyn WalletSigner>;

/// Provider-backed wallet
pub struct RemoteWallet {
    provider: Arc<dyn WalletProvider>,
    pubkey: Pubkey,
}

impl fmt::Debug for RemoteWallet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteWallet")
            .field("kind", &self.provider.kind())
            .field("pubkey", &self.pubkey)
            .finish()
    }
}

impl RemoteWallet {
    /// Rebuild from a persisted identity without a new connect round-trip
    pub fn restore(provider: Arc<dyn WalletProvider>, pubkey: Pubkey) -> Self {
        Self { provider, pubkey }
    }
}

#[async_trait]
impl WalletSigner for RemoteWallet {
    fn pubkey(&self) -> Pubkey {
        self.pubkey
    }

    fn kind(&self) -> WalletKind {
        self.provider.kind()
    }

    async fn sign_transaction(&self, tx: Transaction) -> Result<Transaction, WalletError> {
        self.provider.sign_transaction(tx).await
    }

    async fn sign_all_transactions(
        &self,
        txs: Vec<Transaction>,
    ) -> Result<Vec<Transaction>, WalletError> {
        self.provider.sign_all_transactions(txs).await
    }
}

/// Connect `provider` (unless already connected) and wrap it
///
/// A provider that reports no public key after connecting is rejected.
pub async fn connect_remote(provider: Arc<dyn WalletProvider>) -> Result<RemoteWallet, WalletError> {
    let kind = provider.kind();
    if !provider.is_connected() {
        debug!(provider = %kind, "Requesting provider connection");
        provider
            .connect()
            .await
            .map_err(|e| WalletError::Connection {
                provider: kind.to_string(),
                reason: e.to_string(),
            })?;
    }
    let pubkey = provider
        .public_key()
        .ok_or_else(|| WalletError::MissingPublicKey(kind.to_string()))?;

    info!(provider = %kind, wallet = %pubkey, "Connected to {}", kind);
    Ok(RemoteWallet { provider, pubkey })
}

/// Wallet holding its own keypair
pub struct LocalWallet {
    keypair: Keypair,
}

impl fmt::Debug for LocalWallet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalWallet")
            .field("pubkey", &self.keypair.pubkey())
            .finish_non_exhaustive()
    }
}

impl LocalWallet {
    pub fn from_keypair(keypair: Keypair) -> Self {
        Self { keypair }
    }

    /// Restore from the 64-byte secret key layout persisted under `localKeypair`
    pub fn from_secret_bytes(bytes: &[u8]) -> Result<Self, WalletError> {
        if bytes.len() != 64 {
            return Err(WalletError::InvalidKeyMaterial(format!(
                "expected 64 bytes, got {}",
                bytes.len()
            )));
        }
        if bytes.iter().all(|&b| b == 0) {
            return Err(WalletError::InvalidKeyMaterial(
                "all-zero key rejected".to_string(),
            ));
        }
        let keypair = Keypair::try_from(bytes)
            .map_err(|e| WalletError::InvalidKeyMaterial(e.to_string()))?;
        Ok(Self { keypair })
    }

    /// BIP-39 seed (empty passphrase), first 32 bytes as the ed25519 secret
    pub fn from_seed_phrase(phrase: &str) -> Result<Self, WalletError> {
        let mnemonic = Mnemonic::parse(phrase.trim())
            .map_err(|e| WalletError::InvalidSeedPhrase(e.to_string()))?;
        Self::from_mnemonic(&mnemonic)
    }

    /// Fresh random wallet plus the 12-word phrase that restores it
    pub fn generate() -> Result<(Self, Zeroizing<String>), WalletError> {
        let entropy = Zeroizing::new(rand::random::<[u8; 16]>());
        let mnemonic = Mnemonic::from_entropy(&entropy[..])
            .map_err(|e| WalletError::InvalidSeedPhrase(e.to_string()))?;
        let wallet = Self::from_mnemonic(&mnemonic)?;
        Ok((wallet, Zeroizing::new(mnemonic.to_string())))
    }

    fn from_mnemonic(mnemonic: &Mnemonic) -> Result<Self, WalletError> {
        let seed = Zeroizing::new(mnemonic.to_seed(""));
        let keypair = keypair_from_seed(&seed[..32])
            .map_err(|e| WalletError::InvalidKeyMaterial(e.to_string()))?;
        Ok(Self { keypair })
    }

    pub fn secret_bytes(&self) -> Zeroizing<Vec<u8>> {
        Zeroizing::new(self.keypair.to_bytes().to_vec())
    }

    fn sign_in_place(&self, tx: &mut Transaction) -> Result<(), WalletError> {
        let blockhash = tx.message.recent_blockhash;
        tx.try_partial_sign(&[&self.keypair], blockhash)
            .map_err(|e| WalletError::Signing(e.to_string()))
    }
}

#[async_trait]
impl WalletSigner for LocalWallet {
    fn pubkey(&self) -> Pubkey {
        self.keypair.pubkey()
    }

    fn kind(&self) -> WalletKind {
        WalletKind::Local
    }

    async fn sign_transaction(&self, mut tx: Transaction) -> Result<Transaction, WalletError> {
        self.sign_in_place(&mut tx)?;
        Ok(tx)
    }

    async fn sign_all_transactions(
        &self,
        mut txs: Vec<Transaction>,
    ) -> Result<Vec<Transaction>, WalletError> {
        for tx in txs.iter_mut() {
            self.sign_in_place(tx)?;
        }
        Ok(txs)
    }
}

/// Installed remote providers
#[derive(Default, Clone)]
pub struct ProviderRegistry {
    providers: Vec<Arc<dyn WalletProvider>>,
}

impl fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.providers.iter().map(|p| p.kind()))
            .finish()
    }
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a provider, replacing any of the same kind
    pub fn register(&mut self, provider: Arc<dyn WalletProvider>) {
        let kind = provider.kind();
        self.providers.retain(|p| p.kind() != kind);
        self.providers.push(provider);
    }

    pub fn get(&self, kind: WalletKind) -> Option<Arc<dyn WalletProvider>> {
        self.providers.iter().find(|p| p.kind() == kind).cloned()
    }

    /// Highest-priority installed provider
    pub fn preferred(&self) -> Option<Arc<dyn WalletProvider>> {
        PROVIDER_PRIORITY.iter().find_map(|kind| self.get(*kind))
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::ScriptedProvider;
    use solana_sdk::{hash::Hash, system_instruction};

    const PHRASE: &str =
        "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon about";

    fn transfer_tx(payer: &Pubkey) -> Transaction {
        let ix = system_instruction::transfer(payer, &Pubkey::new_unique(), 1);
        let mut tx = Transaction::new_with_payer(&[ix], Some(payer));
        tx.message.recent_blockhash = Hash::new_unique();
        tx
    }

    #[test]
    fn test_wallet_kind_serde_tags() {
        assert_eq!(serde_json::to_string(&WalletKind::Local).unwrap(), "\"local\"");
        assert_eq!(serde_json::to_string(&WalletKind::Phantom).unwrap(), "\"Phantom\"");
        assert_eq!("Solflare".parse::<WalletKind>().unwrap(), WalletKind::Solflare);
        assert!("Ledger".parse::<WalletKind>().is_err());
    }

    #[test]
    fn test_seed_phrase_is_deterministic() {
        let a = LocalWallet::from_seed_phrase(PHRASE).unwrap();
        let b = LocalWallet::from_seed_phrase(&format!("  {}  ", PHRASE)).unwrap();
        assert_eq!(a.pubkey(), b.pubkey());
    }

    #[test]
    fn test_invalid_seed_phrase_rejected() {
        let err = LocalWallet::from_seed_phrase("not a real mnemonic").unwrap_err();
        assert!(matches!(err, WalletError::InvalidSeedPhrase(_)));
    }

    #[test]
    fn test_generated_phrase_restores_same_key() {
        let (wallet, phrase) = LocalWallet::generate().unwrap();
        assert_eq!(phrase.split_whitespace().count(), 12);
        let restored = LocalWallet::from_seed_phrase(&phrase).unwrap();
        assert_eq!(wallet.pubkey(), restored.pubkey());
    }

    #[test]
    fn test_secret_bytes_roundtrip_and_zero_key() {
        let wallet = LocalWallet::from_keypair(Keypair::new());
        let restored = LocalWallet::from_secret_bytes(&wallet.secret_bytes()).unwrap();
        assert_eq!(wallet.pubkey(), restored.pubkey());

        assert!(matches!(
            LocalWallet::from_secret_bytes(&[0u8; 64]),
            Err(WalletError::InvalidKeyMaterial(_))
        ));
        assert!(matches!(
            LocalWallet::from_secret_bytes(&[1u8; 32]),
            Err(WalletError::InvalidKeyMaterial(_))
        ));
    }

    #[tokio::test]
    async fn test_local_wallet_signs_locally() {
        let wallet = LocalWallet::from_keypair(Keypair::new());
        let signed = wallet
            .sign_transaction(transfer_tx(&wallet.pubkey()))
            .await
            .unwrap();
        assert!(signed.is_signed());
        assert!(signed.verify().is_ok());
    }

    #[tokio::test]
    async fn test_connect_remote_connects_when_needed() {
        let provider = Arc::new(ScriptedProvider::new(WalletKind::Phantom));
        assert!(!provider.is_connected());

        let wallet = connect_remote(provider.clone()).await.unwrap();
        assert!(provider.is_connected());
        assert_eq!(wallet.pubkey(), provider.pubkey());
        assert_eq!(wallet.kind(), WalletKind::Phantom);
        assert_eq!(provider.connect_calls(), 1);

        // Already connected: no second connect() round-trip
        connect_remote(provider.clone()).await.unwrap();
        assert_eq!(provider.connect_calls(), 1);
    }

    #[tokio::test]
    async fn test_connect_remote_requires_public_key() {
        let provider = Arc::new(ScriptedProvider::new(WalletKind::Solflare).withholding_public_key());
        let err = connect_remote(provider).await.unwrap_err();
        assert!(matches!(err, WalletError::MissingPublicKey(ref p) if p == "Solflare"));
    }

    #[tokio::test]
    async fn test_remote_wallet_delegates_signing() {
        let provider = Arc::new(ScriptedProvider::new(WalletKind::Phantom));
        let wallet = connect_remote(provider.clone()).await.unwrap();

        let signed = wallet
            .sign_all_transactions(vec![transfer_tx(&wallet.pubkey()), transfer_tx(&wallet.pubkey())])
            .await
            .unwrap();
        assert!(signed.iter().all(|tx| tx.is_signed()));
        assert_eq!(provider.sign_calls(), 2);
    }

    #[test]
    fn test_registry_prefers_solflare() {
        let mut registry = ProviderRegistry::new();
        assert!(registry.preferred().is_none());

        registry.register(Arc::new(ScriptedProvider::new(WalletKind::Phantom)));
        assert_eq!(registry.preferred().unwrap().kind(), WalletKind::Phantom);

        registry.register(Arc::new(ScriptedProvider::new(WalletKind::Solflare)));
        assert_eq!(registry.preferred().unwrap().kind(), WalletKind::Solflare);
        assert!(registry.get(WalletKind::Local).is_none());
    }
}
