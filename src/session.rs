//! Session context: the one current wallet plus shared collaborators
//!
//! Every orchestration call takes a `&Session` instead of reaching for
//! process-wide state. The session owns the durable store, the network
//! gateway, the installed providers, and at most one current wallet. It also
//! carries one in-flight flag per operation kind so a deployment (or a
//! transfer) cannot run concurrently with itself.

use crate::errors::{NetworkError, StorageError, WalletError};
use crate::network::{Connection, Network, NetworkGateway};
use crate::storage::{keys, ClientStore};
use crate::wallet::{
    connect_remote, LocalWallet, ProviderEvent, ProviderRegistry, RemoteWallet, WalletHandle,
    WalletKind, WalletProvider, WalletSigner,
};
use parking_lot::RwLock;
use solana_sdk::pubkey::Pubkey;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use zeroize::Zeroizing;

/// Operations guarded against running concurrently with themselves
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationKind {
    Deploy,
    Transfer,
}

impl OperationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationKind::Deploy => "deploy",
            OperationKind::Transfer => "transfer",
        }
    }
}

/// Clears its in-flight flag on drop
#[must_use = "the operation is only guarded while the guard is alive"]
pub struct InFlightGuard<'a> {
    flag: &'a AtomicBool,
    kind: OperationKind,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
        debug!(operation = self.kind.as_str(), "Operation guard released");
    }
}

/// Result of `Session::connect`
pub struct ConnectOutcome {
    pub wallet: WalletHandle,
    /// Set only when a fresh local wallet was generated; shown once, never stored
    pub recovery_phrase: Option<Zeroizing<String>>,
}

pub struct Session {
    store: ClientStore,
    gateway: Arc<NetworkGateway>,
    providers: ProviderRegistry,
    wallet: RwLock<Option<WalletHandle>>,
    deploy_in_flight: AtomicBool,
    transfer_in_flight: AtomicBool,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("providers", &self.providers)
            .field("wallet", &self.wallet.read().as_ref().map(|w| w.pubkey()))
            .finish_non_exhaustive()
    }
}

impl Session {
    pub fn new(store: ClientStore, gateway: Arc<NetworkGateway>, providers: ProviderRegistry) -> Self {
        Self {
            store,
            gateway,
            providers,
            wallet: RwLock::new(None),
            deploy_in_flight: AtomicBool::new(false),
            transfer_in_flight: AtomicBool::new(false),
        }
    }

    pub fn store(&self) -> &ClientStore {
        &self.store
    }

    pub fn connection(&self, network: Network) -> Result<Arc<Connection>, NetworkError> {
        self.gateway.connection(network)
    }

    /// Connect the preferred installed provider, or fall back to a local
    /// wallet derived from `seed_phrase` (generated when absent)
    pub async fn connect(&self, seed_phrase: Option<&str>) -> Result<ConnectOutcome, WalletError> {
        if let Some(provider) = self.providers.preferred() {
            let remote = connect_remote(provider).await?;
            self.persist_identity(remote.kind(), &remote.pubkey(), None)?;
            let wallet: WalletHandle = Arc::new(remote);
            self.set_current(wallet.clone());
            return Ok(ConnectOutcome {
                wallet,
                recovery_phrase: None,
            });
        }

        debug!("No wallet provider installed, using a local keypair");
        let (local, recovery_phrase) = match seed_phrase {
            Some(phrase) => (LocalWallet::from_seed_phrase(phrase)?, None),
            None => {
                let (wallet, phrase) = LocalWallet::generate()?;
                (wallet, Some(phrase))
            }
        };
        let secret = local.secret_bytes();
        self.persist_identity(WalletKind::Local, &local.pubkey(), Some(secret.as_slice()))?;
        info!(wallet = %local.pubkey(), generated = recovery_phrase.is_some(), "Local wallet ready");

        let wallet: WalletHandle = Arc::new(local);
        self.set_current(wallet.clone());
        Ok(ConnectOutcome {
            wallet,
            recovery_phrase,
        })
    }

    /// Rebuild the previously active wallet from the store, without any
    /// provider round-trip
    ///
    /// Returns `None` when nothing is stored, when a remote wallet's provider
    /// is no longer installed, or when a local wallet's key bytes are gone.
    pub fn restore(&self) -> Result<Option<WalletHandle>, WalletError> {
        let kind: Option<WalletKind> = self.store.get(keys::WALLET_TYPE)?;
        let pubkey: Option<String> = self.store.get(keys::WALLET_PUBLIC_KEY)?;
        let (Some(kind), Some(pubkey)) = (kind, pubkey) else {
            return Ok(None);
        };
        let pubkey = Pubkey::from_str(&pubkey).map_err(|e| StorageError::Corrupt {
            key: keys::WALLET_PUBLIC_KEY.to_string(),
            reason: e.to_string(),
        })?;

        let wallet: WalletHandle = match kind {
            WalletKind::Local => {
                let Some(secret) = self.store.get::<Vec<u8>>(keys::LOCAL_KEYPAIR)? else {
                    return Ok(None);
                };
                let secret = Zeroizing::new(secret);
                let local = LocalWallet::from_secret_bytes(&secret)?;
                if local.pubkey() != pubkey {
                    warn!(stored = %pubkey, derived = %local.pubkey(), "Stored public key does not match key material");
                }
                Arc::new(local)
            }
            remote => match self.providers.get(remote) {
                Some(provider) => Arc::new(RemoteWallet::restore(provider, pubkey)),
                None => {
                    debug!(provider = %remote, "Stored provider not installed, skipping restore");
                    return Ok(None);
                }
            },
        };

        info!(wallet = %wallet.pubkey(), kind = %kind, "Restoring {} wallet from client store", kind);
        self.set_current(wallet.clone());
        Ok(Some(wallet))
    }

    /// Current wallet, restoring from the store if needed
    pub fn wallet(&self) -> Result<WalletHandle, WalletError> {
        if let Some(wallet) = self.current_wallet() {
            return Ok(wallet);
        }
        self.restore()?.ok_or(WalletError::NotConnected)
    }

    /// In-memory wallet only
    pub fn current_wallet(&self) -> Option<WalletHandle> {
        self.wallet.read().clone()
    }

    /// Forget the current wallet and its stored identity; idempotent
    pub fn disconnect(&self) -> Result<(), WalletError> {
        let previous = self.wallet.write().take();
        for key in keys::WALLET_IDENTITY {
            self.store.remove(key)?;
        }
        match previous {
            Some(wallet) => info!(wallet = %wallet.pubkey(), "Wallet disconnected"),
            None => debug!("Disconnect with no wallet in memory"),
        }
        Ok(())
    }

    /// Claim the in-flight flag for `kind`; `None` if already held
    pub fn begin(&self, kind: OperationKind) -> Option<InFlightGuard<'_>> {
        let flag = match kind {
            OperationKind::Deploy => &self.deploy_in_flight,
            OperationKind::Transfer => &self.transfer_in_flight,
        };
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| InFlightGuard { flag, kind })
    }

    /// React to a provider's account event
    pub fn handle_provider_event(&self, provider: WalletKind, event: &ProviderEvent) {
        match event {
            ProviderEvent::Disconnected => {
                let is_current = self
                    .current_wallet()
                    .map(|w| w.kind() == provider)
                    .unwrap_or(false);
                if is_current {
                    info!(provider = %provider, "Provider disconnected, clearing session");
                    if let Err(e) = self.disconnect() {
                        warn!(provider = %provider, error = %e, "Failed to clear wallet identity");
                    }
                }
            }
            ProviderEvent::Connected(pubkey) => {
                debug!(provider = %provider, wallet = %pubkey, "Provider reported connection");
            }
        }
    }

    /// Forward `provider`'s events to this session until either side goes away
    pub fn watch_provider(self: &Arc<Self>, provider: &Arc<dyn WalletProvider>) -> Option<JoinHandle<()>> {
        let mut events = provider.subscribe()?;
        let kind = provider.kind();
        let session = Arc::downgrade(self);
        Some(tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(event) => match session.upgrade() {
                        Some(session) => session.handle_provider_event(kind, &event),
                        None => break,
                    },
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(provider = %kind, skipped = skipped, "Dropped provider events");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        }))
    }

    fn set_current(&self, wallet: WalletHandle) {
        *self.wallet.write() = Some(wallet);
    }

    fn persist_identity(
        &self,
        kind: WalletKind,
        pubkey: &Pubkey,
        secret: Option<&[u8]>,
    ) -> Result<(), StorageError> {
        self.store.set(keys::WALLET_PUBLIC_KEY, &pubkey.to_string())?;
        self.store.set(keys::WALLET_TYPE, &kind)?;
        match secret {
            Some(bytes) => self.store.set(keys::LOCAL_KEYPAIR, bytes)?,
            None => self.store.remove(keys::LOCAL_KEYPAIR)?,
        }
        self.store.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{mock_session, MockLedger, ScriptedProvider};

    const PHRASE: &str =
        "legal winner thank year wave sausage worth useful legal winner thank yellow";

    fn registry(providers: &[Arc<ScriptedProvider>]) -> ProviderRegistry {
        let mut registry = ProviderRegistry::new();
        for provider in providers {
            registry.register(provider.clone());
        }
        registry
    }

    #[tokio::test]
    async fn test_local_connect_persists_identity() {
        let session = mock_session(Arc::new(MockLedger::new()), ProviderRegistry::new());
        let outcome = session.connect(Some(PHRASE)).await.unwrap();
        assert!(outcome.recovery_phrase.is_none());
        assert_eq!(outcome.wallet.kind(), WalletKind::Local);

        let store = session.store();
        assert_eq!(
            store.get::<WalletKind>(keys::WALLET_TYPE).unwrap(),
            Some(WalletKind::Local)
        );
        assert_eq!(
            store.get::<String>(keys::WALLET_PUBLIC_KEY).unwrap(),
            Some(outcome.wallet.pubkey().to_string())
        );
        assert_eq!(
            store.get::<Vec<u8>>(keys::LOCAL_KEYPAIR).unwrap().map(|b| b.len()),
            Some(64)
        );
    }

    #[tokio::test]
    async fn test_generated_wallet_returns_phrase_once() {
        let session = mock_session(Arc::new(MockLedger::new()), ProviderRegistry::new());
        let outcome = session.connect(None).await.unwrap();
        let phrase = outcome.recovery_phrase.unwrap();

        let restored = LocalWallet::from_seed_phrase(&phrase).unwrap();
        assert_eq!(restored.pubkey(), outcome.wallet.pubkey());
    }

    #[tokio::test]
    async fn test_provider_preferred_over_local() {
        let phantom = Arc::new(ScriptedProvider::new(WalletKind::Phantom));
        let solflare = Arc::new(ScriptedProvider::new(WalletKind::Solflare));
        let session = mock_session(
            Arc::new(MockLedger::new()),
            registry(&[phantom.clone(), solflare.clone()]),
        );

        let outcome = session.connect(Some(PHRASE)).await.unwrap();
        assert_eq!(outcome.wallet.kind(), WalletKind::Solflare);
        assert_eq!(outcome.wallet.pubkey(), solflare.pubkey());
        assert_eq!(phantom.connect_calls(), 0);
        assert!(session.store().get::<Vec<u8>>(keys::LOCAL_KEYPAIR).unwrap().is_none());
    }

    #[tokio::test]
    async fn test_rejected_connect_is_connection_error() {
        let phantom = Arc::new(ScriptedProvider::new(WalletKind::Phantom).rejecting_connect());
        let session = mock_session(Arc::new(MockLedger::new()), registry(&[phantom]));

        let err = session.connect(None).await.err().unwrap();
        assert!(matches!(err, WalletError::Connection { ref provider, .. } if provider == "Phantom"));
        assert!(err.to_string().to_lowercase().contains("user rejected"));
        assert!(session.current_wallet().is_none());
    }

    #[tokio::test]
    async fn test_disconnect_is_idempotent() {
        let session = mock_session(Arc::new(MockLedger::new()), ProviderRegistry::new());
        session.connect(Some(PHRASE)).await.unwrap();

        session.disconnect().unwrap();
        session.disconnect().unwrap();

        assert!(session.current_wallet().is_none());
        for key in keys::WALLET_IDENTITY {
            assert!(!session.store().contains(key).unwrap());
        }
        assert!(matches!(session.wallet(), Err(WalletError::NotConnected)));
    }

    #[test]
    fn test_in_flight_guard_is_exclusive_per_kind() {
        let session = mock_session(Arc::new(MockLedger::new()), ProviderRegistry::new());

        let guard = session.begin(OperationKind::Deploy).unwrap();
        assert!(session.begin(OperationKind::Deploy).is_none());
        // Different kinds do not block each other
        let transfer = session.begin(OperationKind::Transfer).unwrap();

        drop(guard);
        assert!(session.begin(OperationKind::Deploy).is_some());
        drop(transfer);
    }

    #[tokio::test]
    async fn test_disconnect_event_clears_matching_wallet() {
        let phantom = Arc::new(ScriptedProvider::new(WalletKind::Phantom));
        let session = mock_session(Arc::new(MockLedger::new()), registry(&[phantom.clone()]));
        session.connect(None).await.unwrap();

        // An event for another provider is ignored
        session.handle_provider_event(WalletKind::Solflare, &ProviderEvent::Disconnected);
        assert!(session.current_wallet().is_some());

        session.handle_provider_event(WalletKind::Phantom, &ProviderEvent::Disconnected);
        assert!(session.current_wallet().is_none());
        assert!(!session.store().contains(keys::WALLET_TYPE).unwrap());
    }
}
