use std::collections::BTreeMap;
use std::sync::Arc;

use alloy_primitives::Address;
use serde_json::{Map, Value};

use super::id::SessionId;
use super::record::{EncodedSessionRecord, SessionRecord};
use crate::error::{KernelKitError, KernelKitResult};
use crate::storage::{KeyValueStore, SESSIONS_KEY};

/// Durable map of session records keyed by [`SessionId`].
///
/// The whole map lives under a single storage key and is rewritten on every change.
/// Writes are last-write-wins.
pub struct SessionRegistry {
    backend: Arc<dyn KeyValueStore>,
    key: String,
}

impl SessionRegistry {
    /// Registry stored under [`SESSIONS_KEY`].
    #[must_use]
    pub fn new(backend: Arc<dyn KeyValueStore>) -> Self {
        Self {
            backend,
            key: SESSIONS_KEY.to_string(),
        }
    }

    /// Overrides the storage key.
    #[must_use]
    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = key.into();
        self
    }

    /// Raw stored map. Missing or unparsable storage reads as empty.
    fn read_raw(&self) -> KernelKitResult<Map<String, Value>> {
        let Some(bytes) = self.backend.read(self.key.clone())? else {
            return Ok(Map::new());
        };
        match serde_json::from_slice::<Value>(&bytes) {
            Ok(Value::Object(map)) => Ok(map),
            Ok(_) | Err(_) => {
                log::warn!("session storage is corrupt, treating it as empty");
                Ok(Map::new())
            }
        }
    }

    fn write_raw(&self, map: Map<String, Value>) -> KernelKitResult<()> {
        let bytes = serde_json::to_vec(&Value::Object(map))?;
        self.backend.write(self.key.clone(), bytes)?;
        Ok(())
    }

    /// Stores `record` under `id`, replacing any record already there.
    ///
    /// Entries this version cannot decode are carried over untouched.
    ///
    /// # Errors
    /// - `KernelKitError::PoliciesEmpty` or `KernelKitError::PermissionsEmpty` if the
    ///   record grants nothing.
    /// - Storage failures.
    pub fn create(&self, id: &SessionId, record: &SessionRecord) -> KernelKitResult<()> {
        record.grants.ensure_not_empty()?;
        let mut map = self.read_raw()?;
        remove_keys_of(&mut map, id);
        map.insert(id.to_string(), serde_json::to_value(record.encode())?);
        self.write_raw(map)?;
        log::debug!("stored session {id} for {}", record.smart_account);
        Ok(())
    }

    /// Every decodable record. Never fails: unreadable storage yields an empty map
    /// and undecodable entries are skipped.
    #[must_use]
    pub fn get_all(&self) -> BTreeMap<SessionId, SessionRecord> {
        let map = match self.read_raw() {
            Ok(map) => map,
            Err(err) => {
                log::warn!("failed to read sessions: {err}");
                return BTreeMap::new();
            }
        };
        map.into_iter()
            .filter_map(|(key, value)| match decode_entry(&key, value) {
                Ok(entry) => Some(entry),
                Err(err) => {
                    log::warn!("skipping session {key}: {err}");
                    None
                }
            })
            .collect()
    }

    /// Record stored under `id`.
    #[must_use]
    pub fn get(&self, id: &SessionId) -> Option<SessionRecord> {
        self.get_all().remove(id)
    }

    /// Removes the record under `id`. Returns whether one existed.
    ///
    /// # Errors
    /// Storage failures.
    pub fn remove(&self, id: &SessionId) -> KernelKitResult<bool> {
        let mut map = self.read_raw()?;
        if !remove_keys_of(&mut map, id) {
            return Ok(false);
        }
        self.write_raw(map)?;
        Ok(true)
    }

    /// Picks the session to act with for `account` on `chain_id`.
    ///
    /// # Errors
    /// See [`resolve_session`].
    pub fn resolve(
        &self,
        account: Address,
        chain_id: u64,
        explicit: Option<&SessionId>,
    ) -> KernelKitResult<(SessionId, SessionRecord)> {
        resolve_session(self.get_all(), account, chain_id, explicit)
    }
}

/// Drops every stored key that parses to `id`, whatever its spelling (`0xDEAD:1`
/// and `0xdead:1` are the same session). Returns whether any was present.
fn remove_keys_of(map: &mut Map<String, Value>, id: &SessionId) -> bool {
    let before = map.len();
    map.retain(|key, _| key.parse::<SessionId>().ok().as_ref() != Some(id));
    map.len() != before
}

fn decode_entry(key: &str, value: Value) -> KernelKitResult<(SessionId, SessionRecord)> {
    let id = key.parse::<SessionId>()?;
    let encoded = serde_json::from_value::<EncodedSessionRecord>(value)?;
    Ok((id, SessionRecord::decode(encoded)?))
}

/// Picks a session out of `sessions`.
///
/// Candidates are the records of `account` scoped to `chain_id`. With no candidate
/// the account has no session here. An explicit id then selects exactly that record.
/// Without one, a single candidate is selected and several are ambiguous.
///
/// # Errors
/// - `KernelKitError::SessionNotAvailable` if no candidate exists.
/// - `KernelKitError::SessionNotFound` if the explicit id has no record.
/// - `KernelKitError::SessionIdMissing` if several candidates exist and no id was given.
pub fn resolve_session(
    mut sessions: BTreeMap<SessionId, SessionRecord>,
    account: Address,
    chain_id: u64,
    explicit: Option<&SessionId>,
) -> KernelKitResult<(SessionId, SessionRecord)> {
    let mut candidates: Vec<SessionId> = sessions
        .iter()
        .filter(|(id, record)| record.smart_account == account && id.is_scoped_to(chain_id))
        .map(|(id, _)| id.clone())
        .collect();

    if candidates.is_empty() {
        return Err(KernelKitError::SessionNotAvailable { account });
    }
    if let Some(id) = explicit {
        return sessions
            .remove_entry(id)
            .ok_or_else(|| KernelKitError::SessionNotFound {
                session_id: id.to_string(),
            });
    }
    if candidates.len() > 1 {
        return Err(KernelKitError::SessionIdMissing);
    }
    let id = candidates.swap_remove(0);
    sessions
        .remove_entry(&id)
        .ok_or_else(|| KernelKitError::SessionNotFound {
            session_id: id.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use alloy_primitives::{Bytes, B256};

    use super::*;
    use crate::session::permission::Permission;
    use crate::session::record::SessionGrants;
    use crate::storage::InMemoryStore;

    fn record(account: u8) -> SessionRecord {
        SessionRecord {
            smart_account: Address::with_last_byte(account),
            enable_signature: Bytes::from_static(&[0xee]),
            grants: SessionGrants::Permissions(vec![Permission::new(Address::with_last_byte(9))]),
            session_key: B256::with_last_byte(account),
        }
    }

    fn registry() -> (Arc<InMemoryStore>, SessionRegistry) {
        let backend = Arc::new(InMemoryStore::new());
        (backend.clone(), SessionRegistry::new(backend))
    }

    #[test]
    fn test_create_and_get() {
        let (_, registry) = registry();
        let id = SessionId::scoped([1], 1);
        registry.create(&id, &record(0xaa)).unwrap();

        let stored = registry.get(&id).unwrap();
        assert_eq!(stored.smart_account, Address::with_last_byte(0xaa));
        assert_eq!(registry.get_all().len(), 1);
    }

    #[test]
    fn test_create_overwrites() {
        let (_, registry) = registry();
        let id = SessionId::scoped([1], 1);
        registry.create(&id, &record(0xaa)).unwrap();
        registry.create(&id, &record(0xbb)).unwrap();

        assert_eq!(registry.get_all().len(), 1);
        assert_eq!(
            registry.get(&id).unwrap().smart_account,
            Address::with_last_byte(0xbb)
        );
    }

    #[test]
    fn test_corrupt_storage_reads_empty() {
        let (backend, registry) = registry();
        backend
            .write(SESSIONS_KEY.to_string(), b"{not json".to_vec())
            .unwrap();
        assert!(registry.get_all().is_empty());

        registry.create(&SessionId::scoped([2], 1), &record(0xaa)).unwrap();
        assert_eq!(registry.get_all().len(), 1);
    }

    #[test]
    fn test_undecodable_entries_are_skipped_and_kept() {
        let (backend, registry) = registry();
        backend
            .write(
                SESSIONS_KEY.to_string(),
                br#"{"0x99:1": {"smartAccount": 5}}"#.to_vec(),
            )
            .unwrap();
        registry.create(&SessionId::scoped([1], 1), &record(0xaa)).unwrap();

        assert_eq!(registry.get_all().len(), 1);
        let raw: Value =
            serde_json::from_slice(&backend.read(SESSIONS_KEY.to_string()).unwrap().unwrap())
                .unwrap();
        assert!(raw.get("0x99:1").is_some());
    }

    #[test]
    fn test_remove() {
        let (_, registry) = registry();
        let id = SessionId::scoped([1], 1);
        registry.create(&id, &record(0xaa)).unwrap();
        assert!(registry.remove(&id).unwrap());
        assert!(!registry.remove(&id).unwrap());
        assert!(registry.get(&id).is_none());
    }

    #[test]
    fn test_create_rejects_empty_grants() {
        let (backend, registry) = registry();
        let id = SessionId::scoped([1], 1);

        let mut empty = record(0xaa);
        empty.grants = SessionGrants::Policies(Vec::new());
        assert!(matches!(
            registry.create(&id, &empty),
            Err(KernelKitError::PoliciesEmpty)
        ));
        empty.grants = SessionGrants::Permissions(Vec::new());
        assert!(matches!(
            registry.create(&id, &empty),
            Err(KernelKitError::PermissionsEmpty)
        ));

        assert!(backend.read(SESSIONS_KEY.to_string()).unwrap().is_none());
        assert!(registry.get_all().is_empty());
    }

    fn store_raw(backend: &InMemoryStore, key: &str, record: &SessionRecord) {
        let mut raw = Map::new();
        raw.insert(key.to_string(), serde_json::to_value(record.encode()).unwrap());
        backend
            .write(SESSIONS_KEY.to_string(), serde_json::to_vec(&raw).unwrap())
            .unwrap();
    }

    #[test]
    fn test_remove_matches_any_key_spelling() {
        let (backend, registry) = registry();
        store_raw(&backend, "0xDEAD:1", &record(0xaa));

        let id: SessionId = "0xdead:1".parse().unwrap();
        assert!(registry.get(&id).is_some());
        assert!(registry.remove(&id).unwrap());
        assert!(registry.get_all().is_empty());
        assert!(!registry.remove(&id).unwrap());
    }

    #[test]
    fn test_create_replaces_differently_spelled_key() {
        let (backend, registry) = registry();
        store_raw(&backend, "0xDEAD:1", &record(0xaa));

        let id = SessionId::scoped([0xde, 0xad], 1);
        registry.create(&id, &record(0xbb)).unwrap();

        let raw: Value =
            serde_json::from_slice(&backend.read(SESSIONS_KEY.to_string()).unwrap().unwrap())
                .unwrap();
        let keys: Vec<String> = raw.as_object().unwrap().keys().cloned().collect();
        assert_eq!(keys, vec!["0xdead:1"]);
        assert_eq!(
            registry.get(&id).unwrap().smart_account,
            Address::with_last_byte(0xbb)
        );
    }

    #[test]
    fn test_resolve_ignores_other_chains_and_legacy_ids() {
        let (_, registry) = registry();
        let account = Address::with_last_byte(0xaa);
        registry.create(&SessionId::scoped([1], 137), &record(0xaa)).unwrap();
        registry.create(&SessionId::unscoped([2]), &record(0xaa)).unwrap();
        registry.create(&SessionId::scoped([3], 1), &record(0xaa)).unwrap();

        let (id, _) = registry.resolve(account, 1, None).unwrap();
        assert_eq!(id, SessionId::scoped([3], 1));
    }
}
