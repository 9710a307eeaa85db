//!
//! chunkvault storage module
//! -------------------------
//! Ordered key-value store holding the two vault collections (`directories`,
//! `files`). A store lives under `<root>/<name>/`:
//!
//! - `store.json`      settings (name, quota, commit sync)
//! - `snapshot.bin`    bincode image of both collections, written on checkpoint
//! - `wal/current.lg`  commit records appended since the last checkpoint
//!
//! All mutations go through `StoreHandle::transaction`, which is atomic: either
//! every put/delete issued by the closure becomes visible, or none does.
//! An in-memory handle (no directory) behaves identically minus durability.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

pub mod kv;
pub mod wal;

pub use kv::{Collection, KvOp, KvRead, ReadView, Txn};
use kv::Collections;
use wal::{WalReader, WalWriter};

use crate::error::{VaultError, VaultResult};

#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
pub struct StoreSettings {
    pub name: String,
    /// Upper bound on stored key+value bytes across both collections. A commit that
    /// would exceed it is aborted.
    #[serde(default)]
    pub quota_bytes: Option<u64>,
    /// fsync the WAL on every commit.
    #[serde(default = "StoreSettings::default_sync")]
    pub sync_on_commit: bool,
}

impl StoreSettings {
    fn default_sync() -> bool { true }

    pub fn named(name: &str) -> Self {
        Self { name: name.to_string(), ..Self::default() }
    }
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self { name: "myDB".to_string(), quota_bytes: None, sync_on_commit: Self::default_sync() }
    }
}

#[derive(Serialize, Deserialize)]
struct Snapshot { version: u32, created_ms: i64, data: Collections }

fn now_ms() -> i64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_millis() as i64).unwrap_or(0)
}

/// Handle to one named store. Cheap to share behind an `Arc`; all methods take `&self`.
pub struct StoreHandle {
    settings: StoreSettings,
    dir: Option<PathBuf>,
    data: RwLock<Collections>,
    wal: Mutex<Option<WalWriter>>,
    next_txn: AtomicU64,
    closed: AtomicBool,
}

impl StoreHandle {
    /// Store kept purely in memory; nothing is written to disk.
    pub fn in_memory(name: &str) -> Self {
        Self::build(StoreSettings::named(name), None, Collections::default(), None)
    }

    /// Open (or create) the store `<root>/<settings.name>/`, loading the last snapshot and
    /// replaying committed WAL records on top of it.
    pub fn open(root: impl AsRef<Path>, settings: StoreSettings) -> VaultResult<Self> {
        let dir = root.as_ref().join(&settings.name);
        std::fs::create_dir_all(&dir)?;
        let settings_bytes = serde_json::to_vec_pretty(&settings)?;
        std::fs::write(dir.join("store.json"), settings_bytes)?;

        let mut data = Collections::default();
        let snap_path = dir.join("snapshot.bin");
        if snap_path.exists() {
            let bytes = std::fs::read(&snap_path)?;
            let snap: Snapshot = bincode::deserialize(&bytes)
                .map_err(|e| VaultError::corrupt(format!("snapshot {}: {e}", snap_path.display())))?;
            debug!(target: "chunkvault::storage", "loaded snapshot v{} taken at {}ms", snap.version, snap.created_ms);
            data = snap.data;
        }

        let wal_path = dir.join("wal").join("current.lg");
        let mut last_txn = 0u64;
        if wal_path.exists() {
            let mut reader = WalReader::open(&wal_path)?;
            let commits = reader.read_all()?;
            reader.discard_torn_tail()?;
            let replayed = commits.len();
            for c in commits {
                for op in &c.ops { data.apply(op); }
                last_txn = last_txn.max(c.txn_id);
            }
            if replayed > 0 {
                info!(target: "chunkvault::storage", "store '{}': replayed {} WAL commits", settings.name, replayed);
            }
        }
        data.recount();

        let writer = WalWriter::create(&wal_path, settings.sync_on_commit)?;
        let handle = Self::build(settings, Some(dir), data, Some(writer));
        handle.next_txn.store(last_txn + 1, Ordering::SeqCst);
        Ok(handle)
    }

    fn build(settings: StoreSettings, dir: Option<PathBuf>, data: Collections, wal: Option<WalWriter>) -> Self {
        Self {
            settings,
            dir,
            data: RwLock::new(data),
            wal: Mutex::new(wal),
            next_txn: AtomicU64::new(1),
            closed: AtomicBool::new(false),
        }
    }

    pub fn name(&self) -> &str { &self.settings.name }

    pub fn settings(&self) -> &StoreSettings { &self.settings }

    pub fn dir(&self) -> Option<&Path> { self.dir.as_deref() }

    pub fn is_closed(&self) -> bool { self.closed.load(Ordering::SeqCst) }

    fn ensure_open(&self) -> VaultResult<()> {
        if self.is_closed() {
            return Err(VaultError::txn(format!("store '{}' is closed", self.settings.name)));
        }
        Ok(())
    }

    /// Run `f` against a consistent view of committed data.
    pub fn read<T>(&self, f: impl FnOnce(&ReadView<'_>) -> VaultResult<T>) -> VaultResult<T> {
        self.ensure_open()?;
        let guard = self.data.read();
        f(&ReadView { data: &*guard })
    }

    pub fn get(&self, col: Collection, key: &str) -> VaultResult<Option<Vec<u8>>> {
        self.read(|v| Ok(v.get(col, key).map(|b| b.to_vec())))
    }

    pub fn contains(&self, col: Collection, key: &str) -> VaultResult<bool> {
        self.read(|v| Ok(v.contains(col, key)))
    }

    /// Copy out every `(key, value)` whose key starts with `prefix`, in key order.
    pub fn scan_prefix(&self, col: Collection, prefix: &str) -> VaultResult<Vec<(String, Vec<u8>)>> {
        self.read(|v| {
            let mut out = Vec::new();
            v.scan_prefix(col, prefix, |k, b| {
                out.push((k.to_string(), b.to_vec()));
                Ok(std::ops::ControlFlow::Continue(()))
            })?;
            Ok(out)
        })
    }

    /// Copy out every entry with `lo <= key < hi`, in key order.
    pub fn range(&self, col: Collection, lo: &str, hi: &str) -> VaultResult<Vec<(String, Vec<u8>)>> {
        self.ensure_open()?;
        if lo >= hi { return Ok(Vec::new()); }
        let guard = self.data.read();
        Ok(guard.range(col, lo, hi).map(|(k, v)| (k.clone(), v.clone())).collect())
    }

    pub fn len(&self, col: Collection) -> VaultResult<usize> {
        self.ensure_open()?;
        Ok(self.data.read().len(col))
    }

    pub fn bytes_used(&self) -> u64 { self.data.read().bytes_used() }

    /// Run `f` inside one atomic transaction.
    ///
    /// The closure sees its own writes. If it returns an error or panics, if the quota
    /// would be exceeded, or if the commit record cannot be logged, every mutation is
    /// undone. Transactions are serialized by the store's write lock.
    pub fn transaction<T>(&self, f: impl FnOnce(&mut Txn<'_>) -> VaultResult<T>) -> VaultResult<T> {
        self.ensure_open()?;
        let mut guard = self.data.write();
        let mut txn = Txn::new(&mut guard);
        let out = match f(&mut txn) {
            Ok(v) => v,
            Err(e) => {
                debug!(target: "chunkvault::storage", "transaction aborted: {}", e);
                txn.rollback();
                return Err(e);
            }
        };
        if let Some(quota) = self.settings.quota_bytes {
            let used = txn.bytes_used();
            if used > quota {
                txn.rollback();
                warn!(target: "chunkvault::storage", "store '{}': quota exceeded ({} > {} bytes)", self.settings.name, used, quota);
                return Err(VaultError::txn(format!("quota exceeded: {used} > {quota} bytes")));
            }
        }
        if txn.ops().is_empty() {
            txn.commit();
            return Ok(out);
        }
        let txn_id = self.next_txn.fetch_add(1, Ordering::SeqCst);
        let mut wal = self.wal.lock();
        if let Some(w) = wal.as_mut() {
            if let Err(e) = w.append_commit(txn_id, txn.ops()) {
                txn.rollback();
                return Err(e);
            }
        }
        txn.commit();
        Ok(out)
    }

    /// Write a snapshot of committed data and truncate the WAL. No-op for in-memory stores.
    pub fn checkpoint(&self) -> VaultResult<()> {
        self.ensure_open()?;
        self.checkpoint_inner()
    }

    fn checkpoint_inner(&self) -> VaultResult<()> {
        let Some(dir) = &self.dir else { return Ok(()) };
        // Hold the WAL lock across snapshot+truncate so no commit lands in between
        let mut wal = self.wal.lock();
        let guard = self.data.read();
        let snap = Snapshot { version: 1, created_ms: now_ms(), data: guard.clone() };
        drop(guard);
        let bytes = bincode::serialize(&snap).map_err(|e| VaultError::txn(format!("encode snapshot: {e}")))?;
        let path = dir.join("snapshot.bin");
        let tmp = path.with_extension("bin.tmp");
        std::fs::write(&tmp, bytes)?;
        std::fs::rename(&tmp, &path)?;
        if let Some(w) = wal.as_mut() { w.truncate()?; }
        debug!(target: "chunkvault::storage", "store '{}': checkpoint written to {}", self.settings.name, path.display());
        Ok(())
    }

    /// Checkpoint and mark the handle closed; later calls fail with `StorageTransaction`.
    pub fn close(&self) -> VaultResult<()> {
        if self.closed.swap(true, Ordering::SeqCst) { return Ok(()); }
        let res = self.checkpoint_inner();
        *self.wal.lock() = None;
        info!(target: "chunkvault::storage", "store '{}' closed", self.settings.name);
        res
    }
}

impl Drop for StoreHandle {
    fn drop(&mut self) {
        if self.is_closed() || self.dir.is_none() { return; }
        if let Err(e) = self.checkpoint_inner() {
            warn!(target: "chunkvault::storage", "store '{}': checkpoint on drop failed: {}", self.settings.name, e);
        }
    }
}

#[cfg(test)]
#[path = "storage_tests.rs"]
mod storage_tests;
