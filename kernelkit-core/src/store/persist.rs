//! Versioned snapshot persistence and schema migration.
//!
//! Only `chainId`, `current` and `connections` are written, flattened next to a
//! `version` tag. Anything read back that does not look like a state is
//! replaced by the fresh initial state; storage is outside the application's
//! control and must never brick it.

use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;

use super::state::ConnectionState;
use crate::error::KernelKitResult;
use crate::storage::{KeyValueStore, STORE_KEY};

/// Schema version of the snapshot written by this release.
pub const STORE_SCHEMA_VERSION: u32 = 1;

/// Produces a valid state from a snapshot written under a different schema version.
///
/// Arguments: the stored state object (version tag removed) if it was an object,
/// the stored version (`0` when absent), and the fresh initial state.
pub type MigrateFn =
    Arc<dyn Fn(Option<&Value>, u32, &ConnectionState) -> ConnectionState + Send + Sync>;

/// Persistence settings of a [`ConnectionStore`](super::ConnectionStore).
#[derive(Clone)]
pub struct PersistOptions {
    /// Durable backend.
    pub backend: Arc<dyn KeyValueStore>,
    /// Key the snapshot is stored under.
    pub key: String,
    /// Running schema version.
    pub version: u32,
    /// Migration applied when the stored version differs.
    pub migrate: MigrateFn,
}

impl PersistOptions {
    /// Persist to `backend` under [`STORE_KEY`] with the running schema version and
    /// [`default_migration`].
    #[must_use]
    pub fn new(backend: Arc<dyn KeyValueStore>) -> Self {
        Self {
            backend,
            key: STORE_KEY.to_string(),
            version: STORE_SCHEMA_VERSION,
            migrate: Arc::new(default_migration),
        }
    }

    /// Overrides the storage key.
    #[must_use]
    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = key.into();
        self
    }

    /// Overrides the running schema version.
    #[must_use]
    pub const fn with_version(mut self, version: u32) -> Self {
        self.version = version;
        self
    }

    /// Overrides the migration.
    #[must_use]
    pub fn with_migration<F>(mut self, migrate: F) -> Self
    where
        F: Fn(Option<&Value>, u32, &ConnectionState) -> ConnectionState + Send + Sync + 'static,
    {
        self.migrate = Arc::new(migrate);
        self
    }
}

/// Keeps the stored `chainId` when it is a number and starts everything else fresh.
#[must_use]
pub fn default_migration(
    persisted: Option<&Value>,
    _version: u32,
    initial: &ConnectionState,
) -> ConnectionState {
    let chain_id = persisted
        .and_then(|state| state.get("chainId"))
        .and_then(Value::as_u64)
        .unwrap_or(initial.chain_id);
    ConnectionState {
        chain_id,
        ..initial.clone()
    }
}

#[derive(Serialize)]
struct Snapshot<'a> {
    version: u32,
    #[serde(flatten)]
    state: &'a ConnectionState,
}

pub(crate) fn encode_snapshot(state: &ConnectionState, version: u32) -> KernelKitResult<Vec<u8>> {
    Ok(serde_json::to_vec(&Snapshot { version, state })?)
}

/// Keys every well-formed state object carries, taken from the initial state so
/// the list cannot drift from the struct.
fn required_keys(initial: &ConnectionState) -> Vec<String> {
    match serde_json::to_value(initial) {
        Ok(Value::Object(object)) => object.keys().cloned().collect(),
        _ => Vec::new(),
    }
}

/// Adopts `value` as a state if it is an object carrying every required key and
/// decodes cleanly; otherwise returns the initial state.
pub(crate) fn state_from_value(value: Value, initial: &ConnectionState) -> ConnectionState {
    let Some(object) = value.as_object() else {
        log::warn!("rejecting non-object state, resetting to initial state");
        return initial.clone();
    };
    if let Some(missing) = required_keys(initial)
        .into_iter()
        .find(|key| !object.contains_key(key))
    {
        log::warn!("state is missing `{missing}`, resetting to initial state");
        return initial.clone();
    }
    match serde_json::from_value::<ConnectionState>(value) {
        Ok(mut state) => {
            let mut dropped = Vec::new();
            state.connections.retain(|id, connection| {
                let keep = !connection.accounts.is_empty();
                if !keep {
                    log::warn!("dropping connection {id} without accounts");
                    dropped.push(id.clone());
                }
                keep
            });
            if state.current.as_ref().is_some_and(|id| dropped.contains(id)) {
                state.current = None;
            }
            state
        }
        Err(err) => {
            log::warn!("malformed state ({err}), resetting to initial state");
            initial.clone()
        }
    }
}

/// Outcome of reading the persisted snapshot.
pub(crate) struct Hydrated {
    pub(crate) state: ConnectionState,
    /// The state came out of a migration and should be written back.
    pub(crate) migrated: bool,
}

pub(crate) fn hydrate(options: &PersistOptions, initial: &ConnectionState) -> Hydrated {
    let fresh = |state| Hydrated {
        state,
        migrated: false,
    };
    let bytes = match options.backend.read(options.key.clone()) {
        Ok(Some(bytes)) => bytes,
        Ok(None) => return fresh(initial.clone()),
        Err(err) => {
            log::warn!("failed to read persisted state: {err}");
            return fresh(initial.clone());
        }
    };
    let mut value = match serde_json::from_slice::<Value>(&bytes) {
        Ok(value) => value,
        Err(err) => {
            log::warn!("persisted state is not valid JSON ({err}), starting fresh");
            return fresh(initial.clone());
        }
    };

    let stored_version = value
        .as_object_mut()
        .and_then(|object| object.remove("version"))
        .and_then(|version| version.as_u64())
        .and_then(|version| u32::try_from(version).ok());

    match stored_version {
        Some(version) if version == options.version => fresh(state_from_value(value, initial)),
        other => {
            let from = other.unwrap_or(0);
            log::debug!("migrating persisted state from version {from} to {}", options.version);
            let persisted = value.is_object().then_some(&value);
            Hydrated {
                state: (options.migrate)(persisted, from, initial),
                migrated: true,
            }
        }
    }
}
