use std::fmt;
use std::sync::Arc;

use alloy_primitives::{Address, Bytes, B256};
use rand::{rngs::OsRng, RngCore};
use serde::{Deserialize, Serialize};

use super::permission::Permission;
use super::policy::{decode_policy, encode_policies, EncodedPolicy, Policy};
use crate::entry_point::EntryPointVersion;
use crate::error::{KernelKitError, KernelKitResult};

/// Capabilities granted to a session key: policies (v0.7) or permissions (v0.6),
/// never both.
#[derive(Debug, Clone)]
pub enum SessionGrants {
    /// Policy grants of a v0.7 session.
    Policies(Vec<Arc<dyn Policy>>),
    /// Permission grants of a v0.6 basic session.
    Permissions(Vec<Permission>),
}

impl SessionGrants {
    /// Policies, empty for permission grants.
    #[must_use]
    pub fn policies(&self) -> &[Arc<dyn Policy>] {
        match self {
            Self::Policies(policies) => policies,
            Self::Permissions(_) => &[],
        }
    }

    /// Permissions, empty for policy grants.
    #[must_use]
    pub fn permissions(&self) -> &[Permission] {
        match self {
            Self::Policies(_) => &[],
            Self::Permissions(permissions) => permissions,
        }
    }

    /// Number of grants.
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Policies(policies) => policies.len(),
            Self::Permissions(permissions) => permissions.len(),
        }
    }

    /// Whether nothing is granted.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Fails when nothing is granted. An empty grant list of either kind cannot be
    /// decoded again.
    ///
    /// # Errors
    /// `KernelKitError::PoliciesEmpty` or `KernelKitError::PermissionsEmpty`.
    pub fn ensure_not_empty(&self) -> KernelKitResult<()> {
        match self {
            Self::Policies(policies) if policies.is_empty() => Err(KernelKitError::PoliciesEmpty),
            Self::Permissions(permissions) if permissions.is_empty() => {
                Err(KernelKitError::PermissionsEmpty)
            }
            _ => Ok(()),
        }
    }

    /// Entry point revision this kind of grant belongs to.
    #[must_use]
    pub const fn entry_point(&self) -> EntryPointVersion {
        match self {
            Self::Policies(_) => EntryPointVersion::V07,
            Self::Permissions(_) => EntryPointVersion::V06,
        }
    }
}

/// A stored session. Never mutated in place: replaced wholesale or removed.
#[derive(Clone)]
pub struct SessionRecord {
    /// Account the session acts for.
    pub smart_account: Address,
    /// Signature of the sudo validator enabling the session.
    pub enable_signature: Bytes,
    /// Granted capabilities.
    pub grants: SessionGrants,
    /// Ephemeral session private key.
    pub session_key: B256,
}

impl fmt::Debug for SessionRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionRecord")
            .field("smart_account", &self.smart_account)
            .field("enable_signature", &self.enable_signature)
            .field("grants", &self.grants)
            .field("session_key", &"<redacted>")
            .finish()
    }
}

/// Storage form of a [`SessionRecord`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncodedSessionRecord {
    /// Account the session acts for.
    pub smart_account: Address,
    /// Enable signature.
    pub enable_signature: Bytes,
    /// Policy snapshots.
    #[serde(default)]
    pub policies: Vec<EncodedPolicy>,
    /// Legacy permissions.
    #[serde(default)]
    pub permissions: Vec<Permission>,
    /// Session private key.
    pub session_key: B256,
}

impl SessionRecord {
    /// Storage form of the record. Policies are snapshotted.
    #[must_use]
    pub fn encode(&self) -> EncodedSessionRecord {
        EncodedSessionRecord {
            smart_account: self.smart_account,
            enable_signature: self.enable_signature.clone(),
            policies: encode_policies(self.grants.policies()),
            permissions: self.grants.permissions().to_vec(),
            session_key: self.session_key,
        }
    }

    /// Rebuilds a record from storage. Policies come back frozen.
    ///
    /// # Errors
    /// `KernelKitError::Serialization` unless exactly one of policies and
    /// permissions is populated.
    pub fn decode(encoded: EncodedSessionRecord) -> KernelKitResult<Self> {
        let grants = match (encoded.policies.is_empty(), encoded.permissions.is_empty()) {
            (false, true) => SessionGrants::Policies(
                encoded.policies.into_iter().map(decode_policy).collect(),
            ),
            (true, false) => SessionGrants::Permissions(encoded.permissions),
            (false, false) => {
                return Err(KernelKitError::Serialization(
                    "session holds both policies and permissions".to_string(),
                ))
            }
            (true, true) => {
                return Err(KernelKitError::Serialization(
                    "session holds neither policies nor permissions".to_string(),
                ))
            }
        };
        Ok(Self {
            smart_account: encoded.smart_account,
            enable_signature: encoded.enable_signature,
            grants,
            session_key: encoded.session_key,
        })
    }
}

/// Draws a fresh session private key from the operating system RNG.
#[must_use]
pub fn create_session_key() -> B256 {
    let mut key = [0u8; 32];
    OsRng.fill_bytes(&mut key);
    B256::from(key)
}
