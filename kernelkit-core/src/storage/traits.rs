//! Platform interface for durable storage.

use super::error::StorageResult;

/// Key/value store for small blobs, supplied by the host platform.
///
/// Writes replace the whole value for a key. Implementations should make a write
/// visible atomically: a reader sees either the previous or the new bytes.
#[uniffi::export(with_foreign)]
pub trait KeyValueStore: Send + Sync {
    /// Reads the value stored under `key`, if present.
    ///
    /// # Errors
    ///
    /// Returns an error if the read fails.
    fn read(&self, key: String) -> StorageResult<Option<Vec<u8>>>;

    /// Replaces the value stored under `key`.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    fn write(&self, key: String, value: Vec<u8>) -> StorageResult<()>;

    /// Removes the value stored under `key`. Removing a missing key is not an error.
    ///
    /// # Errors
    ///
    /// Returns an error if the delete fails.
    fn delete(&self, key: String) -> StorageResult<()>;
}
