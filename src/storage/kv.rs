use std::collections::BTreeMap;
use std::ops::{Bound, ControlFlow};

use serde::{Deserialize, Serialize};

use crate::error::VaultResult;

/// The two named collections every vault store carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Collection {
    Directories,
    Files,
}

impl Collection {
    pub const ALL: [Collection; 2] = [Collection::Directories, Collection::Files];

    pub fn name(&self) -> &'static str {
        match self {
            Collection::Directories => "directories",
            Collection::Files => "files",
        }
    }
}

type Tree = BTreeMap<String, Vec<u8>>;

/// Ordered key space for both collections plus a running byte count used for quota checks.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub(crate) struct Collections {
    directories: Tree,
    files: Tree,
    bytes_used: u64,
}

fn entry_bytes(key: &str, value: &[u8]) -> u64 { (key.len() + value.len()) as u64 }

impl Collections {
    fn tree(&self, col: Collection) -> &Tree {
        match col {
            Collection::Directories => &self.directories,
            Collection::Files => &self.files,
        }
    }

    fn tree_mut(&mut self, col: Collection) -> &mut Tree {
        match col {
            Collection::Directories => &mut self.directories,
            Collection::Files => &mut self.files,
        }
    }

    pub(crate) fn bytes_used(&self) -> u64 { self.bytes_used }

    pub(crate) fn len(&self, col: Collection) -> usize { self.tree(col).len() }

    /// Recount `bytes_used` from the stored entries (after snapshot load and WAL replay).
    pub(crate) fn recount(&mut self) {
        let mut total = 0u64;
        for col in Collection::ALL {
            for (k, v) in self.tree(col) { total += entry_bytes(k, v); }
        }
        self.bytes_used = total;
    }

    pub(crate) fn get(&self, col: Collection, key: &str) -> Option<&[u8]> {
        self.tree(col).get(key).map(|v| v.as_slice())
    }

    pub(crate) fn scan_prefix<F>(&self, col: Collection, prefix: &str, mut visit: F) -> VaultResult<()>
    where
        F: FnMut(&str, &[u8]) -> VaultResult<ControlFlow<()>>,
    {
        for (k, v) in self.tree(col).range::<str, _>((Bound::Included(prefix), Bound::Unbounded)) {
            if !k.starts_with(prefix) { break; }
            if visit(k, v)?.is_break() { break; }
        }
        Ok(())
    }

    /// Entries with `lo <= key < hi`, in key order.
    pub(crate) fn range(&self, col: Collection, lo: &str, hi: &str) -> impl Iterator<Item = (&String, &Vec<u8>)> {
        self.tree(col).range::<str, _>((Bound::Included(lo), Bound::Excluded(hi)))
    }

    pub(crate) fn put(&mut self, col: Collection, key: String, value: Vec<u8>) -> Option<Vec<u8>> {
        self.bytes_used += entry_bytes(&key, &value);
        let old = self.tree_mut(col).insert(key.clone(), value);
        if let Some(o) = &old { self.bytes_used = self.bytes_used.saturating_sub(entry_bytes(&key, o)); }
        old
    }

    pub(crate) fn remove(&mut self, col: Collection, key: &str) -> Option<Vec<u8>> {
        let old = self.tree_mut(col).remove(key);
        if let Some(o) = &old { self.bytes_used = self.bytes_used.saturating_sub(entry_bytes(key, o)); }
        old
    }

    pub(crate) fn remove_prefix(&mut self, col: Collection, prefix: &str) -> Vec<(String, Vec<u8>)> {
        let keys: Vec<String> = self.tree(col)
            .range::<str, _>((Bound::Included(prefix), Bound::Unbounded))
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, _)| k.clone())
            .collect();
        let mut removed = Vec::with_capacity(keys.len());
        for k in keys {
            if let Some(v) = self.remove(col, &k) { removed.push((k, v)); }
        }
        removed
    }

    /// Put back a value captured before a mutation (`None` means the key did not exist).
    fn restore(&mut self, col: Collection, key: String, old: Option<Vec<u8>>) {
        match old {
            Some(v) => { self.put(col, key, v); }
            None => { self.remove(col, &key); }
        }
    }

    pub(crate) fn apply(&mut self, op: &KvOp) {
        match op {
            KvOp::Put { col, key, value } => { self.put(*col, key.clone(), value.clone()); }
            KvOp::Delete { col, key } => { self.remove(*col, key); }
            KvOp::DeletePrefix { col, prefix } => { self.remove_prefix(*col, prefix); }
        }
    }
}

/// A single logged mutation. Replaying a committed op list in order reproduces the commit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum KvOp {
    Put { col: Collection, key: String, value: Vec<u8> },
    Delete { col: Collection, key: String },
    DeletePrefix { col: Collection, prefix: String },
}

/// Read access shared by committed-state views and open transactions.
pub trait KvRead {
    fn get(&self, col: Collection, key: &str) -> Option<&[u8]>;

    /// Visit keys starting with `prefix` in ascending key order until the visitor breaks.
    fn scan_prefix<F>(&self, col: Collection, prefix: &str, visit: F) -> VaultResult<()>
    where
        F: FnMut(&str, &[u8]) -> VaultResult<ControlFlow<()>>;

    fn contains(&self, col: Collection, key: &str) -> bool { self.get(col, key).is_some() }
}

/// Consistent view of committed data, valid while the store's read lock is held.
pub struct ReadView<'a> {
    pub(crate) data: &'a Collections,
}

impl KvRead for ReadView<'_> {
    fn get(&self, col: Collection, key: &str) -> Option<&[u8]> { self.data.get(col, key) }

    fn scan_prefix<F>(&self, col: Collection, prefix: &str, visit: F) -> VaultResult<()>
    where
        F: FnMut(&str, &[u8]) -> VaultResult<ControlFlow<()>>,
    {
        self.data.scan_prefix(col, prefix, visit)
    }
}

struct Undo {
    col: Collection,
    key: String,
    old: Option<Vec<u8>>,
}

/// Open transaction over both collections.
///
/// Mutations are applied in place under the store's write lock so reads observe
/// earlier writes of the same transaction. Every mutation records an undo entry.
/// Unless `commit` is called, the entries are replayed in reverse on drop, so an
/// error return or a panic inside the closure leaves committed data untouched.
pub struct Txn<'a> {
    data: &'a mut Collections,
    ops: Vec<KvOp>,
    undo: Vec<Undo>,
}

impl<'a> Txn<'a> {
    pub(crate) fn new(data: &'a mut Collections) -> Self {
        Self { data, ops: Vec::new(), undo: Vec::new() }
    }

    pub fn put(&mut self, col: Collection, key: impl Into<String>, value: Vec<u8>) {
        let key = key.into();
        let old = self.data.put(col, key.clone(), value.clone());
        self.undo.push(Undo { col, key: key.clone(), old });
        self.ops.push(KvOp::Put { col, key, value });
    }

    pub fn delete(&mut self, col: Collection, key: &str) -> bool {
        match self.data.remove(col, key) {
            Some(old) => {
                self.undo.push(Undo { col, key: key.to_string(), old: Some(old) });
                self.ops.push(KvOp::Delete { col, key: key.to_string() });
                true
            }
            None => false,
        }
    }

    /// Delete every key in `[prefix, prefix + U+10FFFF)`. Returns the number of keys removed.
    pub fn delete_prefix(&mut self, col: Collection, prefix: &str) -> usize {
        let removed = self.data.remove_prefix(col, prefix);
        let n = removed.len();
        if n > 0 {
            for (key, old) in removed {
                self.undo.push(Undo { col, key, old: Some(old) });
            }
            self.ops.push(KvOp::DeletePrefix { col, prefix: prefix.to_string() });
        }
        n
    }

    pub(crate) fn bytes_used(&self) -> u64 { self.data.bytes_used() }

    pub(crate) fn ops(&self) -> &[KvOp] { &self.ops }

    fn undo_all(&mut self) {
        while let Some(Undo { col, key, old }) = self.undo.pop() {
            self.data.restore(col, key, old);
        }
    }

    pub(crate) fn rollback(mut self) { self.undo_all(); }

    /// Keep the applied mutations; nothing is undone when the transaction drops.
    pub(crate) fn commit(mut self) { self.undo.clear(); }
}

impl Drop for Txn<'_> {
    fn drop(&mut self) { self.undo_all(); }
}

impl KvRead for Txn<'_> {
    fn get(&self, col: Collection, key: &str) -> Option<&[u8]> { self.data.get(col, key) }

    fn scan_prefix<F>(&self, col: Collection, prefix: &str, visit: F) -> VaultResult<()>
    where
        F: FnMut(&str, &[u8]) -> VaultResult<ControlFlow<()>>,
    {
        self.data.scan_prefix(col, prefix, visit)
    }
}
