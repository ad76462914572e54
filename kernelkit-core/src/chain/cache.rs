//! Lazily built, per-chain network clients.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use super::{Chain, ChainConfig, Transport};
use crate::error::KernelKitResult;

/// Builds a network client for a chain. Client construction is expensive, so the
/// cache calls this at most once per chain id.
pub trait ClientBuilder: Send + Sync {
    /// Client produced by the builder.
    type Client: Send + Sync;

    /// Builds a client for `chain` reached through `transport`.
    ///
    /// # Errors
    /// Any failure of the underlying client constructor.
    fn build(&self, chain: &Chain, transport: &Transport) -> KernelKitResult<Self::Client>;
}

/// Write-once-per-key cache of clients. Entries live as long as the cache.
pub struct ChainClientCache<B: ClientBuilder> {
    builder: B,
    clients: Mutex<HashMap<u64, Arc<B::Client>>>,
}

impl<B: ClientBuilder> ChainClientCache<B> {
    /// Creates an empty cache around `builder`.
    #[must_use]
    pub fn new(builder: B) -> Self {
        Self {
            builder,
            clients: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the cached client for `chain_id`, if one has been built.
    #[must_use]
    pub fn cached(&self, chain_id: u64) -> Option<Arc<B::Client>> {
        self.clients.lock().get(&chain_id).cloned()
    }

    /// Returns the client for `chain_id`, building and caching it on first use.
    ///
    /// # Errors
    /// - `KernelKitError::NotConfigured` / `MissingTransport` from transport resolution.
    /// - Any error of the builder. Nothing is cached in that case.
    pub fn get_or_build(
        &self,
        config: &ChainConfig,
        chain_id: u64,
    ) -> KernelKitResult<Arc<B::Client>> {
        // Held across the build so two callers never construct the same client twice.
        let mut clients = self.clients.lock();
        if let Some(client) = clients.get(&chain_id) {
            return Ok(Arc::clone(client));
        }
        let chain = config.require_chain(chain_id)?;
        let transport = config.resolve_transport(chain_id)?;
        let client = Arc::new(self.builder.build(chain, &transport)?);
        log::debug!("built client for chain {chain_id} via {}", transport.url());
        clients.insert(chain_id, Arc::clone(&client));
        Ok(client)
    }

    /// Number of cached clients.
    #[must_use]
    pub fn len(&self) -> usize {
        self.clients.lock().len()
    }

    /// Whether no client has been built yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.clients.lock().is_empty()
    }
}

/// Client descriptor: the chain together with the endpoint it is reached through.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointClient {
    /// Chain the client talks to.
    pub chain: Chain,
    /// Resolved endpoint.
    pub url: String,
}

/// [`ClientBuilder`] producing [`EndpointClient`]s. Hosts that construct their own
/// RPC stack from the resolved endpoint can use it as is.
#[derive(Debug, Clone, Copy, Default)]
pub struct EndpointClientBuilder;

impl ClientBuilder for EndpointClientBuilder {
    type Client = EndpointClient;

    fn build(&self, chain: &Chain, transport: &Transport) -> KernelKitResult<EndpointClient> {
        Ok(EndpointClient {
            chain: chain.clone(),
            url: transport.url().to_string(),
        })
    }
}
