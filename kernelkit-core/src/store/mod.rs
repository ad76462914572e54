//! The connection store.
//!
//! A [`ConnectionStore`] owns the immutable chain configuration, the lazily
//! built per-chain clients and the mutable [`ConnectionState`]. State changes
//! are written through to the optional durable backend and then announced to
//! subscribers, synchronously and in subscription order.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use serde_json::Value;

use crate::account::AuthContext;
use crate::chain::{
    Chain, ChainClientCache, ChainConfig, ClientBuilder, EndpointClientBuilder, Transport,
};
use crate::error::{KernelKitError, KernelKitResult};

pub mod persist;
mod state;
mod subscribe;

pub use persist::{default_migration, MigrateFn, PersistOptions, STORE_SCHEMA_VERSION};
pub use state::{
    AccountBinding, AccountHandle, AuthMethod, Connection, ConnectionId, ConnectionState,
    LiveClient, ValidatorHandle,
};
pub use subscribe::{EqualityFn, SubscribeOptions, Subscription};

use subscribe::{selector_entry, Listeners};

/// Versioned, optionally persisted, multi-chain connection state.
pub struct ConnectionStore<B: ClientBuilder = EndpointClientBuilder> {
    config: ChainConfig,
    clients: ChainClientCache<B>,
    initial: ConnectionState,
    state: RwLock<Arc<ConnectionState>>,
    listeners: Arc<Mutex<Listeners>>,
    persistence: Option<PersistOptions>,
}

impl<B: ClientBuilder> ConnectionStore<B> {
    /// Creates an in-memory store: nothing is read or written durably.
    #[must_use]
    pub fn new(config: ChainConfig, builder: B) -> Self {
        let initial = ConnectionState::initial(&config);
        Self::assemble(config, builder, initial.clone(), initial, None)
    }

    /// Creates a store backed by durable storage.
    ///
    /// The latest snapshot is read once here. Snapshots written under another schema
    /// version go through the configured migration and the result is written back.
    /// Unreadable snapshots yield the initial state.
    #[must_use]
    pub fn with_persistence(config: ChainConfig, builder: B, options: PersistOptions) -> Self {
        let initial = ConnectionState::initial(&config);
        let hydrated = persist::hydrate(&options, &initial);
        let store = Self::assemble(config, builder, initial, hydrated.state, Some(options));
        if hydrated.migrated {
            store.persist(&store.state());
        }
        store
    }

    fn assemble(
        config: ChainConfig,
        builder: B,
        initial: ConnectionState,
        state: ConnectionState,
        persistence: Option<PersistOptions>,
    ) -> Self {
        Self {
            config,
            clients: ChainClientCache::new(builder),
            initial,
            state: RwLock::new(Arc::new(state)),
            listeners: Arc::new(Mutex::new(Listeners::default())),
            persistence,
        }
    }

    /// The chain configuration.
    #[must_use]
    pub const fn config(&self) -> &ChainConfig {
        &self.config
    }

    /// Configured chains, in configuration order.
    #[must_use]
    pub fn chains(&self) -> &[Chain] {
        self.config.chains()
    }

    /// Per-chain project identifiers.
    #[must_use]
    pub const fn project_ids(&self) -> &BTreeMap<u64, String> {
        self.config.project_ids()
    }

    /// Per-chain transport overrides.
    #[must_use]
    pub const fn transports(&self) -> &BTreeMap<u64, Transport> {
        self.config.transports()
    }

    /// Descriptor of `chain_id`.
    ///
    /// # Errors
    /// `KernelKitError::NotConfigured` if the chain is not configured.
    pub fn chain(&self, chain_id: u64) -> KernelKitResult<&Chain> {
        self.config.require_chain(chain_id)
    }

    /// Project identifier of `chain_id`, if one is configured.
    #[must_use]
    pub fn project_id(&self, chain_id: u64) -> Option<&str> {
        self.config.project_id(chain_id)
    }

    /// Transport clients for `chain_id` are built with.
    ///
    /// # Errors
    /// `KernelKitError::NotConfigured` or `KernelKitError::MissingTransport`.
    pub fn resolve_transport(&self, chain_id: u64) -> KernelKitResult<Transport> {
        self.config.resolve_transport(chain_id)
    }

    /// The state a fresh store starts from.
    #[must_use]
    pub const fn initial_state(&self) -> &ConnectionState {
        &self.initial
    }

    /// Snapshot of the current state.
    #[must_use]
    pub fn state(&self) -> Arc<ConnectionState> {
        Arc::clone(&self.state.read())
    }

    /// Active chain id.
    #[must_use]
    pub fn chain_id(&self) -> u64 {
        self.state.read().chain_id
    }

    /// Descriptor of the active chain.
    ///
    /// # Errors
    /// `KernelKitError::NotConfigured` if the active chain id is not configured.
    pub fn active_chain(&self) -> KernelKitResult<&Chain> {
        self.chain(self.chain_id())
    }

    /// Context for authentication and session flows on `chain_id`.
    ///
    /// # Errors
    /// `KernelKitError::NotConfigured` if the chain is not configured.
    pub fn auth_context(&self, chain_id: u64) -> KernelKitResult<AuthContext> {
        Ok(AuthContext {
            chain: self.chain(chain_id)?.clone(),
            project_id: self.project_id(chain_id).map(str::to_string),
        })
    }

    /// Replaces the state with `updater(current)`.
    ///
    /// The updater runs without any store lock held; the result is persisted and
    /// subscribers are notified before this returns.
    pub fn set_state<F>(&self, updater: F)
    where
        F: FnOnce(&ConnectionState) -> ConnectionState,
    {
        let current = self.state();
        self.install(updater(&current));
    }

    /// Replaces the state with `state`.
    pub fn replace_state(&self, state: ConnectionState) {
        self.install(state);
    }

    /// Replaces the state with an untyped value.
    ///
    /// A value that is not an object, lacks any key of the initial state or does not
    /// decode resets the store to the initial state instead.
    pub fn set_state_raw(&self, value: Value) {
        self.install(persist::state_from_value(value, &self.initial));
    }

    fn install(&self, state: ConnectionState) {
        let state = Arc::new(state);
        *self.state.write() = Arc::clone(&state);
        self.persist(&state);
        self.notify();
    }

    fn persist(&self, state: &ConnectionState) {
        let Some(options) = &self.persistence else {
            return;
        };
        let result = persist::encode_snapshot(state, options.version).and_then(|bytes| {
            options
                .backend
                .write(options.key.clone(), bytes)
                .map_err(KernelKitError::from)
        });
        if let Err(err) = result {
            log::warn!("failed to persist connection state: {err}");
        }
    }

    fn notify(&self) {
        let entries = self.listeners.lock().snapshot();
        for (id, notify) in entries {
            // An earlier listener may have unsubscribed this one.
            if !self.listeners.lock().contains(id) {
                continue;
            }
            let state = self.state();
            notify(&state);
        }
    }

    /// Calls `listener(next, previous)` whenever `selector(state)` changes.
    ///
    /// Listeners may update the store from inside the callback; later listeners of
    /// the same round then observe the newest state.
    #[must_use]
    pub fn subscribe<T, S, L>(
        &self,
        selector: S,
        listener: L,
        options: SubscribeOptions<T>,
    ) -> Subscription
    where
        T: Clone + PartialEq + Send + 'static,
        S: Fn(&ConnectionState) -> T + Send + Sync + 'static,
        L: Fn(&T, &T) + Send + Sync + 'static,
    {
        let current = self.state();
        let listener = Arc::new(listener);
        let immediate = options.emit_immediately.then(|| selector(&current));
        let entry = selector_entry(&current, selector, Arc::clone(&listener), options.equality);
        let id = self.listeners.lock().insert(entry);
        if let Some(slice) = immediate {
            listener(&slice, &slice);
        }
        Subscription::new(&self.listeners, id)
    }

    /// Calls `on_change(next, previous)` whenever the active chain changes.
    #[must_use]
    pub fn watch_chain_id<F>(&self, on_change: F) -> Subscription
    where
        F: Fn(u64, u64) + Send + Sync + 'static,
    {
        self.subscribe(
            |state| state.chain_id,
            move |next, previous| on_change(*next, *previous),
            SubscribeOptions::default(),
        )
    }

    /// Number of registered listeners.
    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.listeners.lock().len()
    }

    /// Client of `chain_id`, or of the active chain when `None`.
    ///
    /// Clients are built on first use and then returned as the same instance for
    /// the lifetime of the store.
    ///
    /// # Errors
    /// - `KernelKitError::NotConfigured` for an explicit unknown chain, or when the
    ///   active chain is not configured and no client is cached for it.
    /// - `KernelKitError::MissingTransport` or a builder error on first use.
    pub fn get_client(&self, chain_id: Option<u64>) -> KernelKitResult<Arc<B::Client>> {
        if let Some(chain_id) = chain_id {
            self.config.require_chain(chain_id)?;
            return self.clients.get_or_build(&self.config, chain_id);
        }
        let active = self.chain_id();
        if self.config.chain(active).is_none() {
            return self
                .clients
                .cached(active)
                .ok_or(KernelKitError::NotConfigured { chain_id: active });
        }
        self.clients.get_or_build(&self.config, active)
    }

    /// Clients built so far.
    #[must_use]
    pub fn client_count(&self) -> usize {
        self.clients.len()
    }
}
