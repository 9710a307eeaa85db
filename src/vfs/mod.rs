//! Virtual file/directory layer over a `StoreHandle`.
//!
//! Files are chunked into the `files` collection; every directory has a record in
//! `directories` listing its chunk keys and child-folder markers. Each public
//! operation normalizes its path first and commits in a single store transaction.

use std::sync::Arc;

pub mod paths;
pub mod keys;
pub mod types;
pub mod codec;
pub mod locks;
mod directory;
pub(crate) mod ops;

pub use codec::{TypedArray, Value};
pub use keys::Keys;
pub use paths::normalize_path;
pub use types::{DirEntry, DirListing, DirectoryRecord, ElementType, EntryKind, ValueKind, ValueMeta};

use crate::config::VaultConfig;
use crate::error::{VaultError, VaultResult};
use crate::storage::StoreHandle;
use locks::PathLocks;

/// A vault: one store plus the configuration and per-path locks used by every operation.
pub struct Vault {
    store: Arc<StoreHandle>,
    config: VaultConfig,
    locks: PathLocks,
}

impl Vault {
    pub fn new(store: StoreHandle, config: VaultConfig) -> Self {
        Self { store: Arc::new(store), config, locks: PathLocks::new() }
    }

    /// Open the persistent store named in `config` under `config.root`.
    pub fn open(config: VaultConfig) -> VaultResult<Self> {
        let store = StoreHandle::open(&config.root, config.store_settings())?;
        tracing::info!(target: "chunkvault::vfs", "opened vault '{}' at {}", config.store_name, config.root.display());
        Ok(Self::new(store, config))
    }

    pub fn in_memory(config: VaultConfig) -> Self {
        let store = StoreHandle::in_memory(&config.store_name);
        Self::new(store, config)
    }

    pub fn store(&self) -> &StoreHandle { &self.store }

    pub fn config(&self) -> &VaultConfig { &self.config }

    pub fn default_chunk_size(&self) -> Option<usize> { self.config.chunk_size }

    pub(crate) fn locks(&self) -> &PathLocks { &self.locks }

    /// Checkpoint and close the underlying store.
    pub fn close(self) -> VaultResult<()> { self.store.close() }

    /// Normalized path of a file. Files always live inside a directory, so a path
    /// needs at least two segments.
    pub(crate) fn file_path(path: &str) -> VaultResult<String> {
        let p = normalize_path(path, None);
        paths::validate(&p)?;
        if paths::parent_dir(&p).is_none() {
            return Err(VaultError::bad_path(format!("file path needs a directory segment: '{p}'")));
        }
        Ok(p)
    }

    /// Normalized path of a directory; "/" itself is not addressable.
    pub(crate) fn dir_path(path: &str) -> VaultResult<String> {
        let p = normalize_path(path, None);
        paths::validate(&p)?;
        if paths::root_dir(&p).is_none() {
            return Err(VaultError::bad_path(format!("path has no root segment: '{path}'")));
        }
        Ok(p)
    }
}

#[cfg(test)]
#[path = "tests/directory_tests.rs"]
mod directory_tests;

#[cfg(test)]
#[path = "tests/ops_tests.rs"]
mod ops_tests;
