//! Application-level flows over the store, the session registry and the
//! collaborator traits.
//!
//! Every action takes what it needs as arguments; nothing is looked up ambiently.

use std::sync::Arc;

use alloy_primitives::{B256, U256};

use crate::account::{
    AccountAuthenticator, AccountClient, AuthRequest, Call, SessionAccountBuilder,
    SessionBuildRequest,
};
use crate::chain::ClientBuilder;
use crate::error::{KernelKitError, KernelKitResult};
use crate::nonce::NonceLane;
use crate::session::{
    create_session_key, Permission, Policy, SessionGrants, SessionId, SessionRecord,
    SessionRegistry,
};
use crate::store::{AccountBinding, Connection, ConnectionId, ConnectionStore, LiveClient};

/// Authenticates on the active chain and makes the resulting account the active
/// connection.
///
/// # Errors
/// - `KernelKitError::PasskeyUsernameRequired` for a passkey registration without a name.
/// - `KernelKitError::NotConfigured` if the active chain is not configured.
/// - Any authenticator error.
pub async fn connect<B: ClientBuilder>(
    store: &ConnectionStore<B>,
    authenticator: &dyn AccountAuthenticator,
    request: AuthRequest,
) -> KernelKitResult<ConnectionId> {
    request.validate()?;
    let chain_id = store.chain_id();
    let context = store.auth_context(chain_id)?;
    let authenticated = authenticator.authenticate(request, &context).await?;

    let id = ConnectionId::new(authenticated.validator.method, authenticated.account.address);
    let binding = AccountBinding {
        account: authenticated.account,
        validator: authenticated.validator,
        entry_point: authenticated.entry_point,
        client: authenticated.client.map(LiveClient),
    };
    store.set_state(|state| {
        let mut next = state.clone();
        next.connections
            .insert(id.clone(), Connection::new(chain_id, binding));
        next.current = Some(id.clone());
        next
    });
    log::debug!("connected {id} on chain {chain_id}");
    Ok(id)
}

/// Clears the active connection and drops its live clients. The connection record
/// itself is kept. Does nothing when nothing is connected.
pub fn disconnect<B: ClientBuilder>(store: &ConnectionStore<B>) {
    let Some(current) = store.state().current.clone() else {
        return;
    };
    store.set_state(|state| {
        let mut next = state.clone();
        if let Some(connection) = next.connections.get_mut(&current) {
            for binding in &mut connection.accounts {
                binding.client = None;
            }
        }
        next.current = None;
        next
    });
    log::debug!("disconnected {current}");
}

/// Primary account of the active connection.
///
/// # Errors
/// `KernelKitError::NotConnected` without an active connection.
pub fn active_account<B: ClientBuilder>(
    store: &ConnectionStore<B>,
) -> KernelKitResult<AccountBinding> {
    let state = store.state();
    state
        .active_connection()
        .and_then(|(_, connection)| connection.primary())
        .cloned()
        .ok_or(KernelKitError::NotConnected)
}

/// Live client of the active account.
///
/// # Errors
/// `KernelKitError::NotConnected` without an active connection or attached client.
pub fn active_client<B: ClientBuilder>(
    store: &ConnectionStore<B>,
) -> KernelKitResult<Arc<dyn AccountClient>> {
    active_account(store)?
        .client
        .map(|client| client.0)
        .ok_or(KernelKitError::NotConnected)
}

/// Attaches a live client to the primary account of the active connection.
///
/// # Errors
/// - `KernelKitError::NotConnected` without an active connection.
/// - `KernelKitError::InvalidInput` if the client belongs to another account.
pub fn attach_client<B: ClientBuilder>(
    store: &ConnectionStore<B>,
    client: Arc<dyn AccountClient>,
) -> KernelKitResult<()> {
    let account = active_account(store)?;
    if client.address() != account.account.address {
        return Err(KernelKitError::InvalidInput {
            attribute: "client".to_string(),
            reason: format!("client is for {}", client.address()),
        });
    }
    store.set_state(|state| {
        let mut next = state.clone();
        if let Some(binding) = next
            .current
            .clone()
            .and_then(|id| next.connections.get_mut(&id))
            .and_then(|connection| connection.accounts.first_mut())
        {
            binding.client = Some(LiveClient(client));
        }
        next
    });
    Ok(())
}

/// Moves the active connection to `chain_id`, rebuilding its account there.
///
/// # Errors
/// - `KernelKitError::NotConfigured` if `chain_id` is not configured.
/// - `KernelKitError::AlreadyOnChain` if `chain_id` is already active.
/// - `KernelKitError::NotConnected` without an active connection.
/// - Any authenticator error. The store is left untouched in that case.
pub async fn switch_chain<B: ClientBuilder>(
    store: &ConnectionStore<B>,
    authenticator: &dyn AccountAuthenticator,
    chain_id: u64,
) -> KernelKitResult<AccountBinding> {
    let context = store.auth_context(chain_id)?;
    if chain_id == store.chain_id() {
        return Err(KernelKitError::AlreadyOnChain { chain_id });
    }
    let state = store.state();
    let (id, primary) = state
        .active_connection()
        .and_then(|(id, connection)| Some((id.clone(), connection.primary()?.clone())))
        .ok_or(KernelKitError::NotConnected)?;

    let request = AuthRequest::Reconnect {
        validator: primary.validator,
    };
    let rebuilt = authenticator.authenticate(request, &context).await?;
    let binding = AccountBinding {
        account: rebuilt.account,
        validator: rebuilt.validator,
        entry_point: rebuilt.entry_point,
        client: rebuilt.client.map(LiveClient),
    };

    store.set_state(|state| {
        let mut next = state.clone();
        if let Some(connection) = next.connections.get_mut(&id) {
            connection.chain_id = chain_id;
            match connection.accounts.first_mut() {
                Some(first) => *first = binding.clone(),
                None => connection.accounts.push(binding.clone()),
            }
        }
        next.chain_id = chain_id;
        next
    });
    log::debug!("switched {id} to chain {chain_id}");
    Ok(binding)
}

/// A session created by [`create_session`] or [`create_basic_session`].
#[derive(Debug, Clone)]
pub struct CreatedSession {
    /// Chain-scoped identifier the record is stored under.
    pub id: SessionId,
    /// The stored record.
    pub record: SessionRecord,
}

/// Creates a policy-based session for the active v0.7 account and stores it.
///
/// # Errors
/// - `KernelKitError::NotConnected` without an active connection.
/// - `KernelKitError::NotSupported` for v0.6 accounts.
/// - `KernelKitError::PoliciesEmpty` without policies.
/// - Builder and storage errors.
pub async fn create_session<B: ClientBuilder>(
    store: &ConnectionStore<B>,
    registry: &SessionRegistry,
    builder: &dyn SessionAccountBuilder,
    policies: Vec<Arc<dyn Policy>>,
) -> KernelKitResult<CreatedSession> {
    let sudo = active_account(store)?;
    if !sudo.entry_point.supports_policies() {
        return Err(KernelKitError::NotSupported {
            action: "create session".to_string(),
            version: sudo.entry_point.to_string(),
        });
    }
    if policies.is_empty() {
        return Err(KernelKitError::PoliciesEmpty);
    }
    store_new_session(store, registry, builder, sudo, SessionGrants::Policies(policies)).await
}

/// Creates a permission-based session for the active v0.6 account and stores it.
///
/// # Errors
/// - `KernelKitError::NotConnected` without an active connection.
/// - `KernelKitError::NotSupported` for v0.7 accounts.
/// - `KernelKitError::PermissionsEmpty` without permissions.
/// - Builder and storage errors.
pub async fn create_basic_session<B: ClientBuilder>(
    store: &ConnectionStore<B>,
    registry: &SessionRegistry,
    builder: &dyn SessionAccountBuilder,
    permissions: Vec<Permission>,
) -> KernelKitResult<CreatedSession> {
    let sudo = active_account(store)?;
    if !sudo.entry_point.supports_permissions() {
        return Err(KernelKitError::NotSupported {
            action: "create basic session".to_string(),
            version: sudo.entry_point.to_string(),
        });
    }
    if permissions.is_empty() {
        return Err(KernelKitError::PermissionsEmpty);
    }
    store_new_session(
        store,
        registry,
        builder,
        sudo,
        SessionGrants::Permissions(permissions),
    )
    .await
}

async fn store_new_session<B: ClientBuilder>(
    store: &ConnectionStore<B>,
    registry: &SessionRegistry,
    builder: &dyn SessionAccountBuilder,
    sudo: AccountBinding,
    grants: SessionGrants,
) -> KernelKitResult<CreatedSession> {
    let chain_id = store.chain_id();
    let context = store.auth_context(chain_id)?;
    let session_key = create_session_key();
    let built = builder
        .build(SessionBuildRequest {
            session_key,
            sudo,
            grants: grants.clone(),
            context,
        })
        .await?;

    let id = SessionId::scoped(built.session_tag.to_vec(), chain_id);
    let record = SessionRecord {
        smart_account: built.smart_account,
        enable_signature: built.enable_signature,
        grants,
        session_key,
    };
    registry.create(&id, &record)?;
    Ok(CreatedSession { id, record })
}

/// Nonce to submit with on `lane`, or `None` to let the client use its default lane.
async fn lane_nonce(
    client: &dyn AccountClient,
    lane: &NonceLane,
) -> KernelKitResult<Option<U256>> {
    match lane.nonce_key(client.entry_point()) {
        Some(key) => Ok(Some(client.get_nonce(key).await?)),
        None => Ok(None),
    }
}

fn require_calls(calls: &[Call]) -> KernelKitResult<()> {
    if calls.is_empty() {
        return Err(KernelKitError::InvalidInput {
            attribute: "calls".to_string(),
            reason: "at least one call is required".to_string(),
        });
    }
    Ok(())
}

/// Submits `calls` as one user operation on the nonce lane `lane`.
///
/// # Errors
/// `KernelKitError::InvalidInput` without calls, and any client error.
pub async fn send_user_operation(
    client: &dyn AccountClient,
    lane: &NonceLane,
    calls: Vec<Call>,
) -> KernelKitResult<B256> {
    require_calls(&calls)?;
    let nonce = lane_nonce(client, lane).await?;
    client.send_user_operation(calls, nonce).await
}

/// Submits `calls` on the nonce lane `lane` and waits for the transaction.
///
/// # Errors
/// `KernelKitError::InvalidInput` without calls, and any client error.
pub async fn send_transactions(
    client: &dyn AccountClient,
    lane: &NonceLane,
    calls: Vec<Call>,
) -> KernelKitResult<B256> {
    require_calls(&calls)?;
    let nonce = lane_nonce(client, lane).await?;
    client.send_transactions(calls, nonce).await
}

async fn session_client<B: ClientBuilder>(
    store: &ConnectionStore<B>,
    registry: &SessionRegistry,
    builder: &dyn SessionAccountBuilder,
    session_id: Option<&SessionId>,
) -> KernelKitResult<Arc<dyn AccountClient>> {
    let sudo = active_account(store)?;
    let chain_id = store.chain_id();
    let (id, record) = registry.resolve(sudo.account.address, chain_id, session_id)?;
    let context = store.auth_context(chain_id)?;
    log::debug!("acting through session {id}");
    builder.session_client(&record, &sudo, &context).await
}

/// Submits `calls` as a user operation signed by a session of the active account.
///
/// # Errors
/// - `KernelKitError::NotConnected` without an active connection.
/// - Session resolution errors (`SessionNotAvailable`, `SessionIdMissing`,
///   `SessionNotFound`).
/// - Builder and client errors.
pub async fn send_with_session<B: ClientBuilder>(
    store: &ConnectionStore<B>,
    registry: &SessionRegistry,
    builder: &dyn SessionAccountBuilder,
    session_id: Option<&SessionId>,
    lane: &NonceLane,
    calls: Vec<Call>,
) -> KernelKitResult<B256> {
    require_calls(&calls)?;
    let client = session_client(store, registry, builder, session_id).await?;
    send_user_operation(client.as_ref(), lane, calls).await
}

/// Submits `calls` signed by a session of the active account and waits for the
/// transaction.
///
/// # Errors
/// As [`send_with_session`].
pub async fn send_transactions_with_session<B: ClientBuilder>(
    store: &ConnectionStore<B>,
    registry: &SessionRegistry,
    builder: &dyn SessionAccountBuilder,
    session_id: Option<&SessionId>,
    lane: &NonceLane,
    calls: Vec<Call>,
) -> KernelKitResult<B256> {
    require_calls(&calls)?;
    let client = session_client(store, registry, builder, session_id).await?;
    send_transactions(client.as_ref(), lane, calls).await
}
