//! Vault configuration: JSON file (`vault.json`) with serde defaults, then
//! environment overrides.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::VaultResult;
use crate::storage::StoreSettings;

pub const DEFAULT_CHUNK_SIZE: usize = 256 * 1024;
pub const DEFAULT_REGISTRY_PATH: &str = "/data/folderList.csv";

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct VaultConfig {
    /// Host directory holding store directories.
    pub root: PathBuf,
    pub store_name: String,
    /// Default chunk size for writes and appends; `None` stores every file as one chunk.
    pub chunk_size: Option<usize>,
    /// Vault path of the folder registry CSV.
    pub registry_path: String,
    pub quota_bytes: Option<u64>,
    pub sync_on_commit: bool,
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("vault"),
            store_name: "myDB".to_string(),
            chunk_size: Some(DEFAULT_CHUNK_SIZE),
            registry_path: DEFAULT_REGISTRY_PATH.to_string(),
            quota_bytes: None,
            sync_on_commit: true,
        }
    }
}

impl VaultConfig {
    /// Read `path` if it exists (defaults otherwise), then apply environment overrides.
    pub fn load(path: impl AsRef<Path>) -> VaultResult<Self> {
        let path = path.as_ref();
        let mut cfg = if path.exists() {
            let bytes = std::fs::read(path)?;
            let cfg: VaultConfig = serde_json::from_slice(&bytes)?;
            debug!(target: "chunkvault::config", "loaded config from {}", path.display());
            cfg
        } else {
            VaultConfig::default()
        };
        cfg.apply_env(|k| std::env::var(k).ok());
        Ok(cfg)
    }

    /// Apply `CHUNKVAULT_ROOT`, `CHUNKVAULT_CHUNK_SIZE` and `CHUNKVAULT_QUOTA_BYTES`.
    /// A chunk size of `0` disables chunking. Unparseable numbers are ignored with a warning.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(root) = lookup("CHUNKVAULT_ROOT") {
            if !root.trim().is_empty() { self.root = PathBuf::from(root.trim()); }
        }
        if let Some(v) = lookup("CHUNKVAULT_CHUNK_SIZE") {
            match v.trim().parse::<usize>() {
                Ok(0) => self.chunk_size = None,
                Ok(n) => self.chunk_size = Some(n),
                Err(_) => warn!(target: "chunkvault::config", "ignoring CHUNKVAULT_CHUNK_SIZE='{}'", v),
            }
        }
        if let Some(v) = lookup("CHUNKVAULT_QUOTA_BYTES") {
            match v.trim().parse::<u64>() {
                Ok(n) => self.quota_bytes = Some(n),
                Err(_) => warn!(target: "chunkvault::config", "ignoring CHUNKVAULT_QUOTA_BYTES='{}'", v),
            }
        }
    }

    pub fn store_settings(&self) -> StoreSettings {
        StoreSettings {
            name: self.store_name.clone(),
            quota_bytes: self.quota_bytes,
            sync_on_commit: self.sync_on_commit,
        }
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod config_tests;
