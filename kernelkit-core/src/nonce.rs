//! Nonce-key derivation for parallel operation lanes.
//!
//! An account's nonce is `key << 64 | sequence`. Operations submitted under
//! different keys do not contend for the same sequence slot, so deriving a key
//! per logical lane lets several operations be in flight at once.

use alloy_primitives::{keccak256, U256};
use rand::{distributions::Alphanumeric, Rng};

use crate::entry_point::EntryPointVersion;

/// Length of randomly generated nonce seeds.
pub const NONCE_SEED_LEN: usize = 16;

/// Width in bits of the custom key for v0.6 accounts (the whole nonce key).
const V06_KEY_BITS: usize = 192;

/// Width in bits of the custom key for v0.7 Kernel accounts. The remaining key bits
/// encode the validation mode and validator address.
const V07_KEY_BITS: usize = 16;

/// Derives the nonce key for `seed` on accounts of the given entry point revision.
///
/// Deterministic: the same `(seed, version)` always yields the same key.
#[must_use]
pub fn derive_nonce_key(seed: &str, version: EntryPointVersion) -> U256 {
    let hash = U256::from_be_bytes(keccak256(seed.as_bytes()).0);
    let bits = match version {
        EntryPointVersion::V06 => V06_KEY_BITS,
        EntryPointVersion::V07 => V07_KEY_BITS,
    };
    hash & ((U256::from(1u8) << bits) - U256::from(1u8))
}

/// Generates a fresh random seed of [`NONCE_SEED_LEN`] alphanumeric characters.
#[must_use]
pub fn generate_nonce_seed() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(NONCE_SEED_LEN)
        .map(char::from)
        .collect()
}

/// Derives a nonce key and renders it as a `0x`-prefixed, 32-byte padded hex string.
#[uniffi::export]
#[must_use]
pub fn nonce_key_hex(seed: &str, version: EntryPointVersion) -> String {
    format!("{:#066x}", derive_nonce_key(seed, version))
}

/// How an operation picks its nonce.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum NonceLane {
    /// Use the account's default nonce sequence.
    #[default]
    Sequential,
    /// Use a lane keyed by a fresh random seed, so the operation never collides
    /// with anything else in flight.
    Parallel,
    /// Use the lane keyed by a fixed seed. Repeatable across calls.
    Keyed(String),
}

impl NonceLane {
    /// Seed for this lane, generating one for [`NonceLane::Parallel`].
    #[must_use]
    pub fn seed(&self) -> Option<String> {
        match self {
            Self::Sequential => None,
            Self::Parallel => Some(generate_nonce_seed()),
            Self::Keyed(seed) => Some(seed.clone()),
        }
    }

    /// Nonce key for this lane, or `None` for the default sequence.
    #[must_use]
    pub fn nonce_key(&self, version: EntryPointVersion) -> Option<U256> {
        self.seed().map(|seed| derive_nonce_key(&seed, version))
    }
}
