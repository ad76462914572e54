//! Durable key/value storage used by the connection store and the session registry.
//!
//! The host platform supplies the backend (browser local storage, a keychain-backed
//! file, ...). Values are opaque bytes; each component owns exactly one key.

pub mod error;
pub mod memory;
pub mod traits;

pub use error::{StorageError, StorageResult};
pub use memory::InMemoryStore;
pub use traits::KeyValueStore;

/// Storage key holding the versioned connection-store snapshot.
pub const STORE_KEY: &str = "kernelkit.store";

/// Storage key holding the session map.
pub const SESSIONS_KEY: &str = "kernelkit.sessions";
