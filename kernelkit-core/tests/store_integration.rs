//! Integration tests for the connection store.

mod common;

use std::sync::{Arc, Mutex};

use alloy_primitives::Address;
use common::{chains, CountingBuilder, ScriptedAuthenticator};
use kernelkit_core::account::AuthRequest;
use kernelkit_core::actions;
use kernelkit_core::storage::{InMemoryStore, KeyValueStore, STORE_KEY};
use kernelkit_core::store::{
    default_migration, ConnectionId, ConnectionState, ConnectionStore, PersistOptions,
    SubscribeOptions, Subscription,
};
use kernelkit_core::{EntryPointVersion, KernelKitError};
use serde_json::{json, Value};

fn ecdsa() -> AuthRequest {
    AuthRequest::Ecdsa {
        connector: "injected".to_string(),
    }
}

fn with_chain(chain_id: u64) -> impl FnOnce(&ConnectionState) -> ConnectionState {
    move |state| ConnectionState {
        chain_id,
        ..state.clone()
    }
}

fn stored(backend: &InMemoryStore) -> Value {
    serde_json::from_slice(&backend.read(STORE_KEY.to_string()).unwrap().unwrap()).unwrap()
}

#[test]
fn test_default_client_is_first_chain() {
    let store = ConnectionStore::new(chains(), CountingBuilder::default());
    let client = store.get_client(None).unwrap();
    assert_eq!(client.chain_id, 1);
    assert_eq!(client.url, "https://rpc.zerodev.app/api/v2/bundler/project-1");
}

#[test]
fn test_clients_are_memoized_per_chain() {
    let store = ConnectionStore::new(chains(), CountingBuilder::default());
    for chain_id in [1, 137] {
        let first = store.get_client(Some(chain_id)).unwrap();
        let second = store.get_client(Some(chain_id)).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }
    store.get_client(None).unwrap();
    assert_eq!(store.client_count(), 2);
}

#[test]
fn test_unknown_chain_fails_without_caching() {
    let store = ConnectionStore::new(chains(), CountingBuilder::default());
    for chain_id in [0, 5, 10, u64::MAX] {
        let err = store.get_client(Some(chain_id)).unwrap_err();
        assert!(matches!(err, KernelKitError::NotConfigured { chain_id: c } if c == chain_id));
    }
    assert_eq!(store.client_count(), 0);
}

#[test]
fn test_cached_client_survives_unconfigured_active_chain() {
    let store = ConnectionStore::new(chains(), CountingBuilder::default());
    let client = store.get_client(None).unwrap();
    store.set_state(with_chain(999));
    assert!(store.get_client(None).is_err());

    store.set_state(with_chain(1));
    assert!(Arc::ptr_eq(&client, &store.get_client(None).unwrap()));
}

#[tokio::test]
async fn test_connect_then_disconnect() {
    let address = Address::with_last_byte(0xab);
    let store = ConnectionStore::new(chains(), CountingBuilder::default());
    let authenticator = ScriptedAuthenticator::new(address, EntryPointVersion::V07);

    let id = actions::connect(&store, &authenticator, ecdsa()).await.unwrap();
    assert_eq!(id.as_str(), format!("ecdsa:{address}"));
    assert_eq!(store.state().current.as_ref(), Some(&id));
    assert_eq!(store.state().connections[&id].chain_id, 1);
    assert!(actions::active_client(&store).is_ok());

    actions::disconnect(&store);
    let state = store.state();
    assert!(state.current.is_none());
    assert!(state.connections.contains_key(&id));
    assert!(state.connections[&id].accounts[0].client.is_none());
    assert!(matches!(
        actions::active_account(&store),
        Err(KernelKitError::NotConnected)
    ));

    actions::disconnect(&store);
    assert!(store.state().current.is_none());
}

#[tokio::test]
async fn test_passkey_registration_requires_username() {
    let store = ConnectionStore::new(chains(), CountingBuilder::default());
    let authenticator = ScriptedAuthenticator::new(Address::ZERO, EntryPointVersion::V07);
    let request = AuthRequest::Passkey {
        mode: kernelkit_core::account::PasskeyMode::Register,
        username: None,
    };
    let err = actions::connect(&store, &authenticator, request).await.unwrap_err();
    assert!(matches!(err, KernelKitError::PasskeyUsernameRequired));
    assert!(authenticator.requests().is_empty());
}

#[tokio::test]
async fn test_switch_chain() {
    let address = Address::with_last_byte(0xab);
    let store = ConnectionStore::new(chains(), CountingBuilder::default());
    let authenticator = ScriptedAuthenticator::new(address, EntryPointVersion::V07);

    assert!(matches!(
        actions::switch_chain(&store, &authenticator, 137).await,
        Err(KernelKitError::NotConnected)
    ));
    let id = actions::connect(&store, &authenticator, ecdsa()).await.unwrap();

    assert!(matches!(
        actions::switch_chain(&store, &authenticator, 5).await,
        Err(KernelKitError::NotConfigured { chain_id: 5 })
    ));
    assert!(matches!(
        actions::switch_chain(&store, &authenticator, 1).await,
        Err(KernelKitError::AlreadyOnChain { chain_id: 1 })
    ));

    actions::switch_chain(&store, &authenticator, 137).await.unwrap();
    assert_eq!(store.chain_id(), 137);
    assert_eq!(store.state().connections[&id].chain_id, 137);

    let (request, chain_id) = authenticator.requests().pop().unwrap();
    assert_eq!(chain_id, 137);
    let AuthRequest::Reconnect { validator } = request else {
        panic!("expected a reconnect request");
    };
    assert_eq!(Some(validator.method), id.method());
}

#[tokio::test]
async fn test_failed_switch_leaves_state_untouched() {
    let store = ConnectionStore::new(chains(), CountingBuilder::default());
    let address = Address::with_last_byte(0xab);
    actions::connect(
        &store,
        &ScriptedAuthenticator::new(address, EntryPointVersion::V07),
        ecdsa(),
    )
    .await
    .unwrap();
    let before = store.state();

    let failing = ScriptedAuthenticator::failing(address);
    assert!(actions::switch_chain(&store, &failing, 137).await.is_err());
    assert_eq!(*store.state(), *before);
}

#[test]
fn test_missing_connections_key_resets() {
    let store = ConnectionStore::new(chains(), CountingBuilder::default());
    store.set_state(with_chain(137));
    store.set_state_raw(json!({"chainId": 137, "current": "ecdsa:0xabc"}));
    assert_eq!(*store.state(), *store.initial_state());
}

#[test]
fn test_migration_carries_chain_id_only() {
    let backend = Arc::new(InMemoryStore::new());
    backend
        .write(
            STORE_KEY.to_string(),
            serde_json::to_vec(&json!({
                "version": 1,
                "chainId": 137,
                "current": "ecdsa:0xabc",
                "connections": {"ecdsa:0xabc": {"chainId": 137, "accounts": []}}
            }))
            .unwrap(),
        )
        .unwrap();

    let seen = Arc::new(Mutex::new(None));
    let sink = Arc::clone(&seen);
    let options = PersistOptions::new(backend.clone())
        .with_version(2)
        .with_migration(move |persisted, version, initial| {
            *sink.lock().unwrap() = Some(version);
            default_migration(persisted, version, initial)
        });
    let store = ConnectionStore::with_persistence(chains(), CountingBuilder::default(), options);

    let state = store.state();
    assert_eq!(state.chain_id, 137);
    assert!(state.current.is_none());
    assert!(state.connections.is_empty());
    assert_eq!(*seen.lock().unwrap(), Some(1));

    let written = stored(&backend);
    assert_eq!(written["version"], 2);
    assert_eq!(written["chainId"], 137);
}

#[test]
fn test_corrupt_snapshot_yields_initial_state() {
    for blob in [&b"]]]"[..], b"null", br#"{"version":1,"chainId":"x"}"#] {
        let backend = Arc::new(InMemoryStore::new());
        backend.write(STORE_KEY.to_string(), blob.to_vec()).unwrap();
        let store = ConnectionStore::with_persistence(
            chains(),
            CountingBuilder::default(),
            PersistOptions::new(backend),
        );
        assert_eq!(*store.state(), *store.initial_state());
    }
}

#[test]
fn test_restored_unconfigured_chain_has_no_client() {
    let backend = Arc::new(InMemoryStore::new());
    backend
        .write(
            STORE_KEY.to_string(),
            br#"{"version":1,"chainId":10,"current":null,"connections":{}}"#.to_vec(),
        )
        .unwrap();
    let store = ConnectionStore::with_persistence(
        chains(),
        CountingBuilder::default(),
        PersistOptions::new(backend),
    );
    assert_eq!(store.chain_id(), 10);

    let err = store.get_client(None).unwrap_err();
    assert!(matches!(err, KernelKitError::NotConfigured { chain_id: 10 }));
    assert_eq!(store.client_count(), 0);

    assert_eq!(store.get_client(Some(137)).unwrap().chain_id, 137);
    assert_eq!(store.client_count(), 1);
}

#[tokio::test]
async fn test_state_survives_restart_without_clients() {
    let backend = Arc::new(InMemoryStore::new());
    let address = Address::with_last_byte(0xab);
    let id = {
        let store = ConnectionStore::with_persistence(
            chains(),
            CountingBuilder::default(),
            PersistOptions::new(backend.clone()),
        );
        let authenticator = ScriptedAuthenticator::new(address, EntryPointVersion::V06);
        actions::connect(&store, &authenticator, ecdsa()).await.unwrap()
    };

    let written = stored(&backend);
    let accounts = &written["connections"][id.as_str()]["accounts"];
    assert_eq!(accounts[0]["entryPoint"], "v0.6");
    assert!(accounts[0].get("client").is_none());

    let store = ConnectionStore::with_persistence(
        chains(),
        CountingBuilder::default(),
        PersistOptions::new(backend),
    );
    let account = actions::active_account(&store).unwrap();
    assert_eq!(account.account.address, address);
    assert!(account.client.is_none());
}

#[test]
fn test_listener_may_update_store() {
    let store = Arc::new(ConnectionStore::new(chains(), CountingBuilder::default()));
    let first_seen = Arc::new(Mutex::new(Vec::new()));
    let second_seen = Arc::new(Mutex::new(Vec::new()));

    let inner = Arc::downgrade(&store);
    let sink = Arc::clone(&first_seen);
    let _first = store.subscribe(
        |state| state.chain_id,
        move |next, _| {
            sink.lock().unwrap().push(*next);
            if *next == 137 {
                if let Some(store) = inner.upgrade() {
                    store.set_state(with_chain(1));
                }
            }
        },
        SubscribeOptions::default(),
    );
    let sink = Arc::clone(&second_seen);
    let _second = store.subscribe(
        |state| state.chain_id,
        move |next, _| sink.lock().unwrap().push(*next),
        SubscribeOptions::default(),
    );

    store.set_state(with_chain(137));

    assert_eq!(store.chain_id(), 1);
    assert_eq!(*first_seen.lock().unwrap(), vec![137, 1]);
    // The nested update landed before the second listener ran, so it never saw 137.
    assert!(second_seen.lock().unwrap().is_empty());
}

#[test]
fn test_listener_may_unsubscribe_later_listener() {
    let store = ConnectionStore::new(chains(), CountingBuilder::default());
    let calls = Arc::new(Mutex::new(Vec::new()));

    let victim_slot = Arc::new(Mutex::new(None::<Subscription>));
    let slot = Arc::clone(&victim_slot);
    let sink = Arc::clone(&calls);
    let _first = store.subscribe(
        |state| state.chain_id,
        move |_, _| {
            sink.lock().unwrap().push("first");
            if let Some(subscription) = slot.lock().unwrap().take() {
                subscription.unsubscribe();
            }
        },
        SubscribeOptions::default(),
    );
    let sink = Arc::clone(&calls);
    let second = store.subscribe(
        |state| state.chain_id,
        move |_, _| sink.lock().unwrap().push("second"),
        SubscribeOptions::default(),
    );
    *victim_slot.lock().unwrap() = Some(second.clone());

    store.set_state(with_chain(137));
    assert_eq!(*calls.lock().unwrap(), vec!["first"]);
    assert!(!second.is_active());

    second.unsubscribe();
    drop(store);
    second.unsubscribe();
}

#[test]
fn test_listener_sees_previous_slice() {
    let store = ConnectionStore::new(chains(), CountingBuilder::default());
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let _subscription = store.subscribe(
        |state| state.current.clone(),
        move |next, previous| sink.lock().unwrap().push((next.clone(), previous.clone())),
        SubscribeOptions::default(),
    );

    store.set_state(with_chain(137));
    assert!(seen.lock().unwrap().is_empty());

    store.set_state_raw(json!({"chainId": 1, "current": "ecdsa:0x01", "connections": {}}));
    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].0.as_ref().map(|id| id.as_str()), Some("ecdsa:0x01"));
    assert_eq!(seen[0].1, None);
}

#[test]
fn test_subscribe_with_custom_equality() {
    let store = ConnectionStore::new(chains(), CountingBuilder::default());
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let _subscription = store.subscribe(
        |state| state.current.clone(),
        move |next, _| sink.lock().unwrap().push(next.as_ref().map(|id| id.to_string())),
        SubscribeOptions::default().with_equality(
            |a: &Option<ConnectionId>, b: &Option<ConnectionId>| a.is_some() == b.is_some(),
        ),
    );

    for current in [json!("ecdsa:0x01"), json!("ecdsa:0x02"), Value::Null] {
        store.set_state_raw(json!({"chainId": 1, "current": current, "connections": {}}));
    }
    // Switching between two active connections counts as no change.
    assert_eq!(
        *seen.lock().unwrap(),
        vec![Some("ecdsa:0x01".to_string()), None]
    );
}
