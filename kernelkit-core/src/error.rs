use alloy_primitives::Address;
use thiserror::Error;

use crate::storage::StorageError;

/// Result type for `KernelKit` operations.
pub type KernelKitResult<T, E = KernelKitError> = std::result::Result<T, E>;

/// Error outputs from `KernelKit`.
///
/// Variants are grouped by kind so that callers (and UI layers) can tell a
/// misconfiguration apart from "please connect" or "please select a session".
#[derive(Debug, Error, uniffi::Error)]
#[uniffi(flat_error)]
pub enum KernelKitError {
    /// The requested chain is not part of the configured chain list.
    #[error("chain {chain_id} is not configured")]
    NotConfigured {
        /// Chain id that was requested.
        chain_id: u64,
    },
    /// A chain configuration was built from an empty chain list.
    #[error("at least one chain must be configured")]
    EmptyChainList,
    /// The same chain id appears twice in the chain list.
    #[error("chain {chain_id} is configured more than once")]
    DuplicateChain {
        /// Chain id that was repeated.
        chain_id: u64,
    },
    /// Neither a transport override, a project id nor a default RPC URL exists for the chain.
    #[error("no transport available for chain {chain_id}")]
    MissingTransport {
        /// Chain id without a transport.
        chain_id: u64,
    },
    /// There is no active connection.
    #[error("no account is connected")]
    NotConnected,
    /// The requested session id has no record.
    #[error("session {session_id} not found")]
    SessionNotFound {
        /// Session identifier that was looked up.
        session_id: String,
    },
    /// No stored session belongs to the account.
    #[error("no session available for account {account}")]
    SessionNotAvailable {
        /// Smart account address the lookup was made for.
        account: Address,
    },
    /// More than one session matches the account and no session id was given.
    #[error("multiple sessions match this account, a session id is required")]
    SessionIdMissing,
    /// The active connection is already on the requested chain.
    #[error("already on chain {chain_id}")]
    AlreadyOnChain {
        /// Active chain id.
        chain_id: u64,
    },
    /// The action is not available for the account's entry point version.
    #[error("{action} is not supported by entry point {version}")]
    NotSupported {
        /// Action that was attempted.
        action: String,
        /// Entry point version of the active account.
        version: String,
    },
    /// A session was requested without policies.
    #[error("policies can not be empty")]
    PoliciesEmpty,
    /// A basic session was requested without permissions.
    #[error("permissions can not be empty")]
    PermissionsEmpty,
    /// Passkey registration requires a username.
    #[error("username is required to register a passkey")]
    PasskeyUsernameRequired,
    /// The presented input is not valid for the requested operation.
    #[error("invalid_input_{attribute}: {reason}")]
    InvalidInput {
        /// Name of the offending attribute.
        attribute: String,
        /// Why the value was rejected.
        reason: String,
    },
    /// An external collaborator (network client, authenticator, bundler) failed.
    #[error("collaborator error: {0}")]
    Collaborator(String),
    /// Unexpected error serializing information.
    #[error("serialization_error: {0}")]
    Serialization(String),
    /// The durable storage backend failed.
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl From<serde_json::Error> for KernelKitError {
    fn from(error: serde_json::Error) -> Self {
        Self::Serialization(error.to_string())
    }
}

impl KernelKitError {
    /// Whether the error is a configuration error (unknown or unusable chain).
    #[must_use]
    pub const fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::NotConfigured { .. }
                | Self::EmptyChainList
                | Self::DuplicateChain { .. }
                | Self::MissingTransport { .. }
        )
    }

    /// Whether the error means something the caller looked for does not exist.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::NotConnected
                | Self::SessionNotFound { .. }
                | Self::SessionNotAvailable { .. }
        )
    }
}
