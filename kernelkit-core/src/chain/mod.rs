//! Immutable chain configuration supplied when a store is created.

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::error::{KernelKitError, KernelKitResult};

mod cache;

pub use cache::{ChainClientCache, ClientBuilder, EndpointClient, EndpointClientBuilder};

/// Base URL of the bundler RPC service. The project id is appended as a path segment.
pub const BUNDLER_URL: &str = "https://rpc.zerodev.app/api/v2/bundler";

/// Native currency of a chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NativeCurrency {
    /// Human readable name, e.g. `Ether`.
    pub name: String,
    /// Ticker symbol, e.g. `ETH`.
    pub symbol: String,
    /// Number of decimals.
    pub decimals: u8,
}

impl Default for NativeCurrency {
    fn default() -> Self {
        Self {
            name: "Ether".to_string(),
            symbol: "ETH".to_string(),
            decimals: 18,
        }
    }
}

/// A chain the application can connect accounts on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Chain {
    /// EIP-155 chain id.
    pub id: u64,
    /// Display name.
    pub name: String,
    /// Public RPC endpoint used when neither a transport override nor a project id exists.
    #[serde(default)]
    pub rpc_url: Option<String>,
    /// Native currency.
    #[serde(default)]
    pub native_currency: NativeCurrency,
}

impl Chain {
    /// Creates a chain with the default (ether) native currency and no RPC URL.
    #[must_use]
    pub fn new(id: u64, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            rpc_url: None,
            native_currency: NativeCurrency::default(),
        }
    }

    /// Sets the default public RPC endpoint.
    #[must_use]
    pub fn with_rpc_url(mut self, rpc_url: impl Into<String>) -> Self {
        self.rpc_url = Some(rpc_url.into());
        self
    }
}

/// How clients reach a chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Transport {
    /// JSON-RPC over HTTP.
    Http {
        /// Endpoint URL.
        url: String,
    },
}

impl Transport {
    /// HTTP transport to `url`.
    #[must_use]
    pub fn http(url: impl Into<String>) -> Self {
        Self::Http { url: url.into() }
    }

    /// Endpoint URL of the transport.
    #[must_use]
    pub fn url(&self) -> &str {
        match self {
            Self::Http { url } => url,
        }
    }
}

/// Validated chain list, per-chain project ids and transport overrides.
///
/// The chain list is non-empty and holds unique ids; the first chain is the
/// default active chain of a fresh store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainConfig {
    chains: Vec<Chain>,
    project_ids: BTreeMap<u64, String>,
    transports: BTreeMap<u64, Transport>,
}

impl ChainConfig {
    /// Builds a configuration from an ordered chain list and per-chain project ids.
    ///
    /// # Errors
    /// - `KernelKitError::EmptyChainList` if `chains` is empty.
    /// - `KernelKitError::DuplicateChain` if a chain id repeats.
    /// - `KernelKitError::NotConfigured` if a project id names a chain not in the list.
    pub fn new(
        chains: Vec<Chain>,
        project_ids: impl IntoIterator<Item = (u64, String)>,
    ) -> KernelKitResult<Self> {
        if chains.is_empty() {
            return Err(KernelKitError::EmptyChainList);
        }
        let mut seen = HashSet::new();
        for chain in &chains {
            if !seen.insert(chain.id) {
                return Err(KernelKitError::DuplicateChain { chain_id: chain.id });
            }
        }
        let project_ids: BTreeMap<u64, String> = project_ids.into_iter().collect();
        if let Some(chain_id) = project_ids.keys().find(|id| !seen.contains(id)) {
            return Err(KernelKitError::NotConfigured {
                chain_id: *chain_id,
            });
        }
        Ok(Self {
            chains,
            project_ids,
            transports: BTreeMap::new(),
        })
    }

    /// Overrides the transport used for `chain_id`.
    ///
    /// # Errors
    /// `KernelKitError::NotConfigured` if the chain is not in the list.
    pub fn with_transport(
        mut self,
        chain_id: u64,
        transport: Transport,
    ) -> KernelKitResult<Self> {
        if self.chain(chain_id).is_none() {
            return Err(KernelKitError::NotConfigured { chain_id });
        }
        self.transports.insert(chain_id, transport);
        Ok(self)
    }

    /// Configured chains, in configuration order.
    #[must_use]
    pub fn chains(&self) -> &[Chain] {
        &self.chains
    }

    /// Project ids keyed by chain id.
    #[must_use]
    pub const fn project_ids(&self) -> &BTreeMap<u64, String> {
        &self.project_ids
    }

    /// Transport overrides keyed by chain id.
    #[must_use]
    pub const fn transports(&self) -> &BTreeMap<u64, Transport> {
        &self.transports
    }

    /// The first configured chain.
    #[must_use]
    pub fn default_chain(&self) -> &Chain {
        // `new` rejects empty lists.
        &self.chains[0]
    }

    /// Looks up a configured chain.
    #[must_use]
    pub fn chain(&self, chain_id: u64) -> Option<&Chain> {
        self.chains.iter().find(|chain| chain.id == chain_id)
    }

    /// Looks up a configured chain, failing for unknown ids.
    ///
    /// # Errors
    /// `KernelKitError::NotConfigured` if the chain is not in the list.
    pub fn require_chain(&self, chain_id: u64) -> KernelKitResult<&Chain> {
        self.chain(chain_id)
            .ok_or(KernelKitError::NotConfigured { chain_id })
    }

    /// Project id configured for `chain_id`.
    #[must_use]
    pub fn project_id(&self, chain_id: u64) -> Option<&str> {
        self.project_ids.get(&chain_id).map(String::as_str)
    }

    /// Resolves the transport for a configured chain: the explicit override, then the
    /// project-id-derived bundler endpoint, then the chain's public RPC URL.
    ///
    /// # Errors
    /// - `KernelKitError::NotConfigured` if the chain is not in the list.
    /// - `KernelKitError::MissingTransport` if none of the three sources exists.
    pub fn resolve_transport(&self, chain_id: u64) -> KernelKitResult<Transport> {
        let chain = self.require_chain(chain_id)?;
        if let Some(transport) = self.transports.get(&chain_id) {
            return Ok(transport.clone());
        }
        if let Some(project_id) = self.project_id(chain_id) {
            return Ok(Transport::http(format!("{BUNDLER_URL}/{project_id}")));
        }
        chain
            .rpc_url
            .as_ref()
            .map(Transport::http)
            .ok_or(KernelKitError::MissingTransport { chain_id })
    }
}
