//! File-backed [`KeyValueStore`]: one file per key under a root directory.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use eyre::WrapErr;
use kernelkit_core::storage::{KeyValueStore, StorageError, StorageResult};

/// Stores each key as `<root>/<key>.json`. Writes go to a temporary sibling first
/// and are renamed into place.
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    /// Opens (and creates if needed) the store directory.
    pub fn open(root: impl Into<PathBuf>) -> eyre::Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root).wrap_err_with(|| format!("creating {}", root.display()))?;
        Ok(Self { root })
    }

    fn path(&self, key: &str) -> StorageResult<PathBuf> {
        if key.is_empty() || key.starts_with('.') || key.contains(['/', '\\']) {
            return Err(StorageError::Backend(format!("invalid storage key `{key}`")));
        }
        Ok(self.root.join(format!("{key}.json")))
    }
}

fn backend_error(path: &Path, err: &io::Error) -> StorageError {
    StorageError::Backend(format!("{}: {err}", path.display()))
}

impl KeyValueStore for FileStore {
    fn read(&self, key: String) -> StorageResult<Option<Vec<u8>>> {
        let path = self.path(&key)?;
        match fs::read(&path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(backend_error(&path, &err)),
        }
    }

    fn write(&self, key: String, value: Vec<u8>) -> StorageResult<()> {
        let path = self.path(&key)?;
        let staging = path.with_extension("json.tmp");
        fs::write(&staging, &value).map_err(|err| backend_error(&staging, &err))?;
        fs::rename(&staging, &path).map_err(|err| backend_error(&path, &err))?;
        tracing::debug!(key = %key, bytes = value.len(), "wrote storage key");
        Ok(())
    }

    fn delete(&self, key: String) -> StorageResult<()> {
        let path = self.path(&key)?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(backend_error(&path, &err)),
        }
    }
}
