//! Network selection and the cached connection gateway
//!
//! The gateway keeps a single connection slot. Asking for the network the
//! slot already holds returns the cached handle; asking for another one
//! replaces the slot wholesale. The slot is an `ArcSwapOption`, so readers
//! never lock and a replacement is a single atomic pointer store.

use crate::errors::NetworkError;
use crate::rpc::{LedgerRpc, SolanaRpc};
use arc_swap::ArcSwapOption;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::info;

/// Supported clusters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    Devnet,
    Mainnet,
}

impl Network {
    pub fn as_str(&self) -> &'static str {
        match self {
            Network::Devnet => "devnet",
            Network::Mainnet => "mainnet",
        }
    }

    /// Public RPC endpoint of the cluster
    pub fn default_endpoint(&self) -> &'static str {
        match self {
            Network::Devnet => "https://api.devnet.solana.com",
            Network::Mainnet => "https://api.mainnet-beta.solana.com",
        }
    }

    /// Cluster name used in explorer links
    pub fn explorer_cluster(&self) -> &'static str {
        match self {
            Network::Devnet => "devnet",
            Network::Mainnet => "mainnet-beta",
        }
    }
}

impl Default for Network {
    fn default() -> Self {
        Network::Devnet
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Network {
    type Err = NetworkError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "devnet" => Ok(Network::Devnet),
            "mainnet" | "mainnet-beta" => Ok(Network::Mainnet),
            other => Err(NetworkError::UnknownNetwork(other.to_string())),
        }
    }
}

/// Maps a network to its RPC endpoint, honouring configured overrides
#[derive(Debug, Clone, Default)]
pub struct EndpointResolver {
    overrides: HashMap<Network, String>,
}

impl EndpointResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_override(mut self, network: Network, url: impl Into<String>) -> Self {
        self.overrides.insert(network, url.into());
        self
    }

    pub fn resolve(&self, network: Network) -> String {
        self.overrides
            .get(&network)
            .cloned()
            .unwrap_or_else(|| network.default_endpoint().to_string())
    }
}

/// A connection handle bound to one network
pub struct Connection {
    pub network: Network,
    pub endpoint: String,
    pub rpc: Arc<dyn LedgerRpc>,
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("network", &self.network)
            .field("endpoint", &self.endpoint)
            .finish_non_exhaustive()
    }
}

/// Builds the RPC client for a (network, endpoint) pair
pub type ConnectionFactory =
    dyn Fn(Network, &str) -> Result<Arc<dyn LedgerRpc>, NetworkError> + Send + Sync;

/// Process-wide connection cache, one slot
pub struct NetworkGateway {
    resolver: EndpointResolver,
    factory: Arc<ConnectionFactory>,
    current: ArcSwapOption<Connection>,
}

impl fmt::Debug for NetworkGateway {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NetworkGateway")
            .field("resolver", &self.resolver)
            .field("current", &self.current.load().as_ref().map(|c| c.network))
            .finish_non_exhaustive()
    }
}

impl NetworkGateway {
    /// Gateway backed by live `SolanaRpc` clients
    pub fn new(resolver: EndpointResolver) -> Self {
        Self::with_factory(resolver, Arc::new(solana_rpc_factory))
    }

    pub fn with_factory(resolver: EndpointResolver, factory: Arc<ConnectionFactory>) -> Self {
        Self {
            resolver,
            factory,
            current: ArcSwapOption::empty(),
        }
    }

    /// Cached handle for `network`, constructing and caching a new one when
    /// the slot holds a different network (or nothing)
    pub fn connection(&self, network: Network) -> Result<Arc<Connection>, NetworkError> {
        if let Some(conn) = self.current.load_full() {
            if conn.network == network {
                return Ok(conn);
            }
        }

        let endpoint = self.resolver.resolve(network);
        let rpc = (self.factory)(network, &endpoint)?;
        let conn = Arc::new(Connection {
            network,
            endpoint,
            rpc,
        });
        self.current.store(Some(Arc::clone(&conn)));
        info!(network = %network, endpoint = %conn.endpoint, "Connected to Solana {}", network);
        Ok(conn)
    }

    /// Network of the cached handle, if any
    pub fn current_network(&self) -> Option<Network> {
        self.current.load().as_ref().map(|c| c.network)
    }
}

fn solana_rpc_factory(network: Network, endpoint: &str) -> Result<Arc<dyn LedgerRpc>, NetworkError> {
    let parsed = url::Url::parse(endpoint).map_err(|e| NetworkError::Connectivity {
        network: network.to_string(),
        reason: format!("invalid endpoint '{}': {}", endpoint, e),
    })?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(NetworkError::Connectivity {
            network: network.to_string(),
            reason: format!("unsupported endpoint scheme '{}'", parsed.scheme()),
        });
    }
    Ok(Arc::new(SolanaRpc::new(endpoint)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::MockLedger;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting_gateway(counter: Arc<AtomicUsize>) -> NetworkGateway {
        NetworkGateway::with_factory(
            EndpointResolver::new(),
            Arc::new(move |_, endpoint| {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(Arc::new(MockLedger::with_endpoint(endpoint)) as Arc<dyn LedgerRpc>)
            }),
        )
    }

    #[test]
    fn test_network_parse() {
        assert_eq!("devnet".parse::<Network>().unwrap(), Network::Devnet);
        assert_eq!("Mainnet".parse::<Network>().unwrap(), Network::Mainnet);
        assert_eq!("mainnet-beta".parse::<Network>().unwrap(), Network::Mainnet);
        assert!(matches!(
            "testnet".parse::<Network>(),
            Err(NetworkError::UnknownNetwork(_))
        ));
    }

    #[test]
    fn test_resolver_override() {
        let resolver = EndpointResolver::new().with_override(Network::Devnet, "http://localhost:8899");
        assert_eq!(resolver.resolve(Network::Devnet), "http://localhost:8899");
        assert_eq!(
            resolver.resolve(Network::Mainnet),
            "https://api.mainnet-beta.solana.com"
        );
    }

    #[test]
    fn test_gateway_caches_same_network() {
        let counter = Arc::new(AtomicUsize::new(0));
        let gateway = counting_gateway(counter.clone());

        let first = gateway.connection(Network::Devnet).unwrap();
        let second = gateway.connection(Network::Devnet).unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_gateway_replaces_on_network_change() {
        let counter = Arc::new(AtomicUsize::new(0));
        let gateway = counting_gateway(counter.clone());

        let devnet = gateway.connection(Network::Devnet).unwrap();
        let mainnet = gateway.connection(Network::Mainnet).unwrap();
        assert!(!Arc::ptr_eq(&devnet, &mainnet));
        assert_eq!(mainnet.endpoint, "https://api.mainnet-beta.solana.com");
        assert_eq!(gateway.current_network(), Some(Network::Mainnet));

        // Switching back builds a fresh handle; only one slot is kept
        let devnet_again = gateway.connection(Network::Devnet).unwrap();
        assert!(!Arc::ptr_eq(&devnet, &devnet_again));
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_invalid_endpoint_is_connectivity_error() {
        let gateway = NetworkGateway::new(
            EndpointResolver::new().with_override(Network::Devnet, "not a url"),
        );
        let err = gateway.connection(Network::Devnet).unwrap_err();
        assert!(matches!(err, NetworkError::Connectivity { .. }));
        assert!(gateway.current_network().is_none());
    }
}
