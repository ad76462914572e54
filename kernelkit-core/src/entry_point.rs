//! Account-abstraction protocol revisions.

use alloy_primitives::{address, Address};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// `EntryPoint` v0.6 contract address.
pub const ENTRYPOINT_ADDRESS_V06: Address = address!("5FF137D4b0FDCD49DcA30c7CF57E578a026d2789");

/// `EntryPoint` v0.7 contract address.
pub const ENTRYPOINT_ADDRESS_V07: Address = address!("0000000071727De22E5E9d8BAf0edAc6f37da032");

/// Revision of the `EntryPoint` contract an account is deployed against.
///
/// Determines the nonce-key width and whether sessions are granted through
/// permissions (v0.6) or policies (v0.7).
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    uniffi::Enum,
)]
pub enum EntryPointVersion {
    /// `EntryPoint` v0.6, used by Kernel v2 accounts.
    #[serde(rename = "v0.6")]
    #[strum(serialize = "v0.6")]
    V06,
    /// `EntryPoint` v0.7, used by Kernel v3 accounts.
    #[serde(rename = "v0.7")]
    #[strum(serialize = "v0.7")]
    V07,
}

impl EntryPointVersion {
    /// Address of the `EntryPoint` contract for this revision.
    #[must_use]
    pub const fn address(self) -> Address {
        match self {
            Self::V06 => ENTRYPOINT_ADDRESS_V06,
            Self::V07 => ENTRYPOINT_ADDRESS_V07,
        }
    }

    /// Resolves the revision deployed at `address`, if it is a known `EntryPoint`.
    #[must_use]
    pub fn from_address(address: Address) -> Option<Self> {
        [Self::V06, Self::V07]
            .into_iter()
            .find(|version| version.address() == address)
    }

    /// Sessions on this revision are granted through policies.
    #[must_use]
    pub const fn supports_policies(self) -> bool {
        matches!(self, Self::V07)
    }

    /// Sessions on this revision are granted through legacy permissions.
    #[must_use]
    pub const fn supports_permissions(self) -> bool {
        matches!(self, Self::V06)
    }
}

/// Kernel smart-account major version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, uniffi::Enum)]
#[strum(serialize_all = "lowercase")]
pub enum KernelVersion {
    /// Kernel v2 (`EntryPoint` v0.6).
    V2,
    /// Kernel v3 (`EntryPoint` v0.7).
    V3,
}

impl KernelVersion {
    /// `EntryPoint` revision the kernel version is deployed against.
    #[must_use]
    pub const fn entry_point(self) -> EntryPointVersion {
        match self {
            Self::V2 => EntryPointVersion::V06,
            Self::V3 => EntryPointVersion::V07,
        }
    }
}
