//! Boundaries to the account-abstraction stack.
//!
//! Building a deployable account from a validator, talking to the bundler and
//! running passkey or social ceremonies all happen behind these traits. The
//! state layer only ever sees the handles they return.

use std::fmt;
use std::sync::Arc;

use alloy_primitives::{Address, Bytes, B256, U256};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::chain::Chain;
use crate::entry_point::EntryPointVersion;
use crate::error::{KernelKitError, KernelKitResult};
use crate::session::{SessionGrants, SessionRecord};
use crate::store::{AccountBinding, AccountHandle, AuthMethod, ValidatorHandle};

/// A single call executed by the smart account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Call {
    /// Target contract or recipient.
    pub to: Address,
    /// Native value sent with the call.
    #[serde(default)]
    pub value: U256,
    /// Calldata.
    #[serde(default)]
    pub data: Bytes,
}

impl Call {
    /// Plain value transfer.
    #[must_use]
    pub fn transfer(to: Address, value: U256) -> Self {
        Self {
            to,
            value,
            data: Bytes::new(),
        }
    }
}

/// Live client of a smart account, able to read nonces and submit operations.
#[async_trait]
pub trait AccountClient: Send + Sync {
    /// Address of the smart account.
    fn address(&self) -> Address;

    /// Entry point revision of the smart account.
    fn entry_point(&self) -> EntryPointVersion;

    /// Reads the next nonce of the lane identified by `key`.
    async fn get_nonce(&self, key: U256) -> KernelKitResult<U256>;

    /// Submits a user operation executing `calls` and returns its hash. `None`
    /// lets the client pick the next nonce of the default lane.
    async fn send_user_operation(
        &self,
        calls: Vec<Call>,
        nonce: Option<U256>,
    ) -> KernelKitResult<B256>;

    /// Submits `calls` and waits for inclusion, returning the transaction hash.
    async fn send_transactions(&self, calls: Vec<Call>, nonce: Option<U256>)
        -> KernelKitResult<B256>;
}

/// Whether a passkey ceremony creates a new credential or uses an existing one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PasskeyMode {
    /// Create a new credential.
    Register,
    /// Use an existing credential.
    Login,
}

/// What the caller asks the authenticator to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthRequest {
    /// Wrap an externally owned signer.
    Ecdsa {
        /// Host-side identifier of the wallet connector.
        connector: String,
    },
    /// Run a passkey ceremony.
    Passkey {
        /// Register or log in.
        mode: PasskeyMode,
        /// Credential name. Required for registration.
        username: Option<String>,
    },
    /// Run a social login.
    Social {
        /// Login provider, e.g. `google`.
        provider: String,
    },
    /// Rebuild an account from a known validator, e.g. on another chain.
    Reconnect {
        /// Validator of the connection being rebuilt.
        validator: ValidatorHandle,
    },
}

impl AuthRequest {
    /// Authentication method the request resolves to.
    #[must_use]
    pub const fn method(&self) -> AuthMethod {
        match self {
            Self::Ecdsa { .. } => AuthMethod::Ecdsa,
            Self::Passkey { .. } => AuthMethod::Passkey,
            Self::Social { .. } => AuthMethod::Social,
            Self::Reconnect { validator } => validator.method,
        }
    }

    /// Rejects requests that can never succeed.
    ///
    /// # Errors
    /// `KernelKitError::PasskeyUsernameRequired` for a registration without a username.
    pub fn validate(&self) -> KernelKitResult<()> {
        match self {
            Self::Passkey {
                mode: PasskeyMode::Register,
                username,
            } if username.as_deref().is_none_or(|name| name.trim().is_empty()) => {
                Err(KernelKitError::PasskeyUsernameRequired)
            }
            _ => Ok(()),
        }
    }
}

/// Chain an authentication or session flow runs against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthContext {
    /// Target chain.
    pub chain: Chain,
    /// Project identifier configured for the chain, if any.
    pub project_id: Option<String>,
}

/// Result of a successful authentication.
#[derive(Clone)]
pub struct AuthenticatedAccount {
    /// Sudo validator of the account.
    pub validator: ValidatorHandle,
    /// The smart account.
    pub account: AccountHandle,
    /// Entry point revision of the account.
    pub entry_point: EntryPointVersion,
    /// Client for the account, if the authenticator built one.
    pub client: Option<Arc<dyn AccountClient>>,
}

impl fmt::Debug for AuthenticatedAccount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthenticatedAccount")
            .field("validator", &self.validator)
            .field("account", &self.account)
            .field("entry_point", &self.entry_point)
            .field("client", &self.client.is_some())
            .finish()
    }
}

/// Turns a sign-in request into a smart account.
#[async_trait]
pub trait AccountAuthenticator: Send + Sync {
    /// Authenticates and builds the account on `context.chain`.
    async fn authenticate(
        &self,
        request: AuthRequest,
        context: &AuthContext,
    ) -> KernelKitResult<AuthenticatedAccount>;
}

/// Everything a session builder needs to enable a session key on an account.
#[derive(Debug, Clone)]
pub struct SessionBuildRequest {
    /// Fresh session private key.
    pub session_key: B256,
    /// The account granting the session, with its sudo validator.
    pub sudo: AccountBinding,
    /// Capabilities handed to the session key.
    pub grants: SessionGrants,
    /// Chain the session is created on.
    pub context: AuthContext,
}

/// Session material produced by a [`SessionAccountBuilder`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuiltSession {
    /// Identifier tag of the session, e.g. the permission id.
    pub session_tag: Bytes,
    /// Address of the session-capable account.
    pub smart_account: Address,
    /// Signature of the sudo validator enabling the session.
    pub enable_signature: Bytes,
}

/// Builds session-capable accounts.
#[async_trait]
pub trait SessionAccountBuilder: Send + Sync {
    /// Enables the session key of `request` and returns the session material.
    async fn build(&self, request: SessionBuildRequest) -> KernelKitResult<BuiltSession>;

    /// Rebuilds a client that signs with the session key of a stored record.
    async fn session_client(
        &self,
        record: &SessionRecord,
        sudo: &AccountBinding,
        context: &AuthContext,
    ) -> KernelKitResult<Arc<dyn AccountClient>>;
}
