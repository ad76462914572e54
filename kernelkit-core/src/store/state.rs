//! Connection state: the persisted core of the store.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use alloy_primitives::{Address, Bytes};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::account::AccountClient;
use crate::chain::ChainConfig;
use crate::entry_point::EntryPointVersion;

/// Authentication method that produced a connection.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    uniffi::Enum,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum AuthMethod {
    /// Externally owned account signer (injected wallet, wallet connect, ...).
    Ecdsa,
    /// WebAuthn passkey.
    Passkey,
    /// Social login.
    Social,
}

/// Identifier of a connection: `"<method>:<address>"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionId(String);

impl ConnectionId {
    /// Deterministic identifier for an account authenticated through `method`.
    #[must_use]
    pub fn new(method: AuthMethod, address: Address) -> Self {
        Self(format!("{method}:{address}"))
    }

    /// Authentication method encoded in the identifier, if it is a known one.
    #[must_use]
    pub fn method(&self) -> Option<AuthMethod> {
        let (method, _) = self.0.split_once(':')?;
        AuthMethod::from_str(method).ok()
    }

    /// The identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for ConnectionId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Persistable reference to a smart account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountHandle {
    /// Counterfactual or deployed smart-account address.
    pub address: Address,
}

/// Persistable reference to the sudo validator of a smart account.
///
/// `data` is whatever the authentication collaborator needs to rebuild the
/// validator (the signer address for ECDSA, serialized passkey data, ...).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidatorHandle {
    /// Method the validator belongs to.
    pub method: AuthMethod,
    /// Opaque reconstruction data.
    #[serde(default)]
    pub data: Bytes,
}

/// Live, non-persistable account client attached to a binding.
#[derive(Clone)]
pub struct LiveClient(pub Arc<dyn AccountClient>);

impl fmt::Debug for LiveClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("LiveClient").field(&self.0.address()).finish()
    }
}

impl PartialEq for LiveClient {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

/// One smart account of a connection together with its validator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountBinding {
    /// The smart account.
    pub account: AccountHandle,
    /// Its sudo validator.
    pub validator: ValidatorHandle,
    /// Entry point revision of the account.
    pub entry_point: EntryPointVersion,
    /// Live client, if one has been attached in this process. Never persisted.
    #[serde(skip)]
    pub client: Option<LiveClient>,
}

impl AccountBinding {
    /// Binding without a live client.
    #[must_use]
    pub const fn new(
        account: AccountHandle,
        validator: ValidatorHandle,
        entry_point: EntryPointVersion,
    ) -> Self {
        Self {
            account,
            validator,
            entry_point,
            client: None,
        }
    }
}

/// A persisted binding between an authentication method, a chain and an account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Connection {
    /// Chain the connection was created on.
    pub chain_id: u64,
    /// Bound accounts. Never empty for connections created through [`Connection::new`].
    pub accounts: Vec<AccountBinding>,
}

impl Connection {
    /// Connection holding a single account.
    #[must_use]
    pub fn new(chain_id: u64, binding: AccountBinding) -> Self {
        Self {
            chain_id,
            accounts: vec![binding],
        }
    }

    /// The first (primary) account of the connection.
    #[must_use]
    pub fn primary(&self) -> Option<&AccountBinding> {
        self.accounts.first()
    }
}

/// Mutable, persisted state of a [`ConnectionStore`](super::ConnectionStore).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionState {
    /// Active chain id.
    pub chain_id: u64,
    /// Active connection, if any.
    pub current: Option<ConnectionId>,
    /// Every known connection.
    pub connections: BTreeMap<ConnectionId, Connection>,
}

impl ConnectionState {
    /// Fresh state: first configured chain, nothing connected.
    #[must_use]
    pub fn initial(config: &ChainConfig) -> Self {
        Self {
            chain_id: config.default_chain().id,
            current: None,
            connections: BTreeMap::new(),
        }
    }

    /// The active connection, if `current` is set and present in the map.
    #[must_use]
    pub fn active_connection(&self) -> Option<(&ConnectionId, &Connection)> {
        let id = self.current.as_ref()?;
        self.connections.get_key_value(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn binding() -> AccountBinding {
        AccountBinding::new(
            AccountHandle {
                address: Address::with_last_byte(0xab),
            },
            ValidatorHandle {
                method: AuthMethod::Passkey,
                data: Bytes::from_static(b"passkey"),
            },
            EntryPointVersion::V07,
        )
    }

    #[test]
    fn test_connection_id_format() {
        let id = ConnectionId::new(AuthMethod::Ecdsa, Address::with_last_byte(0xab));
        assert_eq!(
            id.as_str(),
            format!("ecdsa:{}", Address::with_last_byte(0xab))
        );
        assert_eq!(id.method(), Some(AuthMethod::Ecdsa));
        assert_eq!(ConnectionId::from("wallet:0x1".to_string()).method(), None);
        assert_eq!(ConnectionId::from("garbage".to_string()).method(), None);
    }

    #[test]
    fn test_state_serializes_without_live_clients() {
        let id = ConnectionId::new(AuthMethod::Passkey, Address::with_last_byte(0xab));
        let state = ConnectionState {
            chain_id: 137,
            current: Some(id.clone()),
            connections: BTreeMap::from([(id, Connection::new(137, binding()))]),
        };

        let value = serde_json::to_value(&state).unwrap();
        let object = value.as_object().unwrap();
        assert_eq!(object.len(), 3);
        assert_eq!(value["chainId"], 137);
        let account = &value["connections"][state.current.as_ref().unwrap().as_str()]["accounts"][0];
        assert_eq!(account["entryPoint"], "v0.7");
        assert!(account.get("client").is_none());

        let decoded: ConnectionState = serde_json::from_value(value).unwrap();
        assert_eq!(decoded, state);
    }
}
