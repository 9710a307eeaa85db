use std::collections::BTreeSet;

use tracing::debug;

use super::keys::Keys;
use super::paths::{self, ancestors, normalize_path, root_dir};
use super::types::{DirEntry, DirListing, DirectoryRecord, EntryKind};
use super::Vault;
use crate::error::{VaultError, VaultResult};
use crate::storage::{Collection, KvRead, Txn};

pub(crate) fn load_dir<R: KvRead>(r: &R, dir: &str) -> VaultResult<Option<DirectoryRecord>> {
    r.get(Collection::Directories, dir).map(DirectoryRecord::decode).transpose()
}

pub(crate) fn save_dir(t: &mut Txn<'_>, rec: &DirectoryRecord) -> VaultResult<()> {
    t.put(Collection::Directories, rec.name.clone(), rec.encode()?);
    Ok(())
}

/// Make sure `dir` and every ancestor have a record, each linked from its parent by a
/// folder marker. Records that already exist keep their entries.
pub(crate) fn ensure_dir_chain(t: &mut Txn<'_>, dir: &str) -> VaultResult<()> {
    let mut chain = ancestors(dir);
    chain.push(dir.to_string());
    let mut parent: Option<String> = None;
    for d in chain {
        if !t.contains(Collection::Directories, &d) {
            save_dir(t, &DirectoryRecord::new(d.clone()))?;
        }
        if let Some(p) = &parent {
            let mut rec = load_dir(&*t, p)?.unwrap_or_else(|| DirectoryRecord::new(p.clone()));
            if !matches!(rec.files.get(&d), Some(DirEntry::Folder)) {
                rec.files.insert(d.clone(), DirEntry::Folder);
                save_dir(t, &rec)?;
            }
        }
        parent = Some(d);
    }
    Ok(())
}

/// Base file paths of the chunk entries in a record, deduplicated and sorted.
fn file_bases(rec: &DirectoryRecord) -> BTreeSet<String> {
    rec.files.iter()
        .filter(|(_, e)| !e.is_folder())
        .map(|(k, _)| Keys::base_of(k).to_string())
        .collect()
}

impl Vault {
    /// Normalize `path`, create the record of its root directory if absent and return
    /// the normalized path.
    pub async fn ensure_directory_initialized(&self, path: &str) -> VaultResult<String> {
        self.ensure_directory_initialized_sync(path)
    }

    pub(crate) fn ensure_directory_initialized_sync(&self, path: &str) -> VaultResult<String> {
        let p = normalize_path(path, None);
        let root = root_dir(&p).ok_or_else(|| VaultError::bad_path(format!("path has no root segment: '{path}'")))?;
        paths::validate(&p)?;
        if !self.store.contains(Collection::Directories, &root)? {
            self.store.transaction(|t| {
                if !t.contains(Collection::Directories, &root) {
                    save_dir(t, &DirectoryRecord::new(root.clone()))?;
                    debug!(target: "chunkvault::vfs", "initialized root directory {}", root);
                }
                Ok(())
            })?;
        }
        Ok(p)
    }

    /// Create a folder (and any missing ancestors). Returns false when it already existed;
    /// an existing record is left untouched.
    pub async fn create_folder(&self, name: &str) -> VaultResult<bool> {
        let dir = Vault::dir_path(name)?;
        // ensure_dir_chain creates the root record in the same transaction
        let created = self.store.transaction(|t| {
            let existed = t.contains(Collection::Directories, &dir);
            ensure_dir_chain(t, &dir)?;
            Ok(!existed)
        })?;
        if created { debug!(target: "chunkvault::vfs", "created folder {}", dir); }
        Ok(created)
    }

    /// Delete a folder with every file chunk and nested folder beneath it, and unlink it
    /// from its parent. Returns false when nothing was there.
    pub async fn delete_folder(&self, name: &str) -> VaultResult<bool> {
        let dir = Vault::dir_path(name)?;
        let prefix = Keys::dir_prefix(&dir);
        let removed = self.store.transaction(|t| {
            let chunks = t.delete_prefix(Collection::Files, &prefix);
            let nested = t.delete_prefix(Collection::Directories, &prefix);
            let own = t.delete(Collection::Directories, &dir);
            if let Some(parent) = paths::parent_dir(&dir) {
                if let Some(mut rec) = load_dir(&*t, parent)? {
                    if rec.files.remove(&dir).is_some() { save_dir(t, &rec)?; }
                }
            }
            debug!(target: "chunkvault::vfs", "delete_folder {}: {} chunks, {} nested dirs", dir, chunks, nested);
            Ok(own || chunks > 0 || nested > 0)
        })?;
        Ok(removed)
    }

    /// Base paths of the files directly inside `directory` (chunk suffixes stripped), sorted.
    /// Empty when the directory does not exist.
    pub async fn list_filenames(&self, directory: &str) -> VaultResult<Vec<String>> {
        let dir = Vault::dir_path(directory)?;
        self.store.read(|v| {
            Ok(load_dir(v, &dir)?.map(|rec| file_bases(&rec).into_iter().collect()).unwrap_or_default())
        })
    }

    /// Immediate entries of `directory`: files (one per base path) and child folders, by path.
    pub async fn list_directory(&self, directory: &str) -> VaultResult<Vec<DirListing>> {
        let dir = Vault::dir_path(directory)?;
        self.store.read(|v| {
            let Some(rec) = load_dir(v, &dir)? else { return Ok(Vec::new()) };
            let mut out: Vec<DirListing> = file_bases(&rec).into_iter()
                .map(|path| DirListing { path, kind: EntryKind::File })
                .collect();
            out.extend(rec.files.iter().filter(|(_, e)| e.is_folder())
                .map(|(k, _)| DirListing { path: k.clone(), kind: EntryKind::Folder }));
            out.sort_by(|a, b| a.path.cmp(&b.path));
            Ok(out)
        })
    }

    pub async fn dir_exists(&self, directory: &str) -> VaultResult<bool> {
        let dir = Vault::dir_path(directory)?;
        self.store.contains(Collection::Directories, &dir)
    }
}
