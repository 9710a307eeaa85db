//! File operations: chunked write, append-with-merge, read, delete and byte-range reads.

use std::ops::ControlFlow;

use tracing::debug;

use super::codec::{self, Value};
use super::directory::{ensure_dir_chain, load_dir, save_dir};
use super::keys::Keys;
use super::paths;
use super::types::{ChunkRecord, DirEntry, DirectoryRecord, ValueMeta};
use super::Vault;
use crate::error::VaultResult;
use crate::storage::{Collection, KvRead, Txn};

/// Visit the stored chunks of `path` in order: chunk 0 (bare path), then 1..N by key.
/// Returns false when the file does not exist.
pub(crate) fn visit_chunks<R, F>(r: &R, path: &str, mut visit: F) -> VaultResult<bool>
where
    R: KvRead,
    F: FnMut(usize, &[u8]) -> VaultResult<ControlFlow<()>>,
{
    let Some(first) = r.get(Collection::Files, path) else { return Ok(false) };
    if visit(0, first)?.is_break() { return Ok(true); }
    r.scan_prefix(Collection::Files, &Keys::chunk_prefix(path), |k, v| {
        match Keys::chunk_index(k, path) {
            Some(i) => visit(i, v),
            None => Ok(ControlFlow::Continue(())),
        }
    })?;
    Ok(true)
}

fn effective_chunk_size(chunk_size: Option<usize>) -> Option<usize> {
    chunk_size.filter(|&c| c > 0)
}

/// Drop every directory entry that belongs to `path`.
fn unlink_chunks(rec: &mut DirectoryRecord, path: &str) -> bool {
    let before = rec.files.len();
    rec.files.retain(|k, e| e.is_folder() || Keys::base_of(k) != path);
    rec.files.len() != before
}

/// Replace the whole content of `path` inside an open transaction.
fn write_in_txn(t: &mut Txn<'_>, path: &str, bytes: Vec<u8>, meta: ValueMeta, chunk_size: Option<usize>) -> VaultResult<usize> {
    let dir = paths::parent_dir(path).unwrap_or("/").to_string();
    ensure_dir_chain(t, &dir)?;

    t.delete(Collection::Files, path);
    t.delete_prefix(Collection::Files, &Keys::chunk_prefix(path));

    let pieces: Vec<&[u8]> = match effective_chunk_size(chunk_size) {
        Some(cs) if !bytes.is_empty() => bytes.chunks(cs).collect(),
        _ => vec![bytes.as_slice()],
    };
    let mut rec = load_dir(&*t, &dir)?.unwrap_or_else(|| DirectoryRecord::new(dir.clone()));
    unlink_chunks(&mut rec, path);
    for (i, piece) in pieces.iter().enumerate() {
        let key = Keys::chunk(path, i);
        let chunk = ChunkRecord { key: key.clone(), meta: meta.clone(), payload: piece.to_vec() };
        t.put(Collection::Files, key.clone(), chunk.encode()?);
        rec.files.insert(key, DirEntry::Chunk(meta.clone()));
    }
    save_dir(t, &rec)?;
    Ok(pieces.len())
}

impl Vault {
    /// Write `value` to `path` with the configured chunk size, replacing any previous content.
    pub async fn write_file(&self, path: &str, value: impl Into<Value>) -> VaultResult<()> {
        self.write_file_with(path, value, self.config.chunk_size).await
    }

    /// Write with an explicit chunk size; `None` (or 0) stores the value as one chunk.
    pub async fn write_file_with(&self, path: &str, value: impl Into<Value>, chunk_size: Option<usize>) -> VaultResult<()> {
        let path = Vault::file_path(path)?;
        self.write_sync(&path, value.into(), chunk_size)
    }

    /// Write to an already normalized file path.
    pub(crate) fn write_sync(&self, path: &str, value: Value, chunk_size: Option<usize>) -> VaultResult<()> {
        self.ensure_directory_initialized_sync(path)?;
        let (bytes, meta) = codec::encode(value);
        let size = bytes.len();
        let n = self.store.transaction(|t| write_in_txn(t, path, bytes, meta, chunk_size))?;
        debug!(target: "chunkvault::vfs", "wrote {} ({} bytes, {} chunks)", path, size, n);
        Ok(())
    }

    /// Append `value` to `path` with the configured chunk size.
    pub async fn append_file(&self, path: &str, value: impl Into<Value>) -> VaultResult<()> {
        self.append_file_with(path, value, self.config.chunk_size).await
    }

    /// Append to the last chunk while it has room, then spill into new chunks of exactly
    /// `chunk_size` bytes. Creates the file when absent. Appends to the same path are
    /// serialized.
    pub async fn append_file_with(&self, path: &str, value: impl Into<Value>, chunk_size: Option<usize>) -> VaultResult<()> {
        let path = Vault::file_path(path)?;
        self.ensure_directory_initialized_sync(&path)?;
        let value = value.into();
        let _guard = self.locks.lock(&path).await;
        self.append_sync(&path, value, chunk_size)
    }

    pub(crate) fn append_sync(&self, path: &str, value: Value, chunk_size: Option<usize>) -> VaultResult<()> {
        let (bytes, meta_in) = codec::encode(value);
        let cs = effective_chunk_size(chunk_size);
        let added = bytes.len();
        let spilled = self.store.transaction(|t| {
            let Some(raw_first) = t.get(Collection::Files, path) else {
                write_in_txn(t, path, bytes, meta_in, chunk_size)?;
                return Ok(0usize);
            };
            let mut first = ChunkRecord::decode(raw_first)?;

            // last chunk and total size by ordered scan
            let mut total = first.payload.len();
            let mut last: Option<(usize, Vec<u8>)> = None;
            t.scan_prefix(Collection::Files, &Keys::chunk_prefix(path), |k, v| {
                if let Some(i) = Keys::chunk_index(k, path) {
                    total += ChunkRecord::payload_of(v)?.len();
                    last = Some((i, v.to_vec()));
                }
                Ok(ControlFlow::Continue(()))
            })?;
            let merged = codec::merged_meta(&first.meta, &meta_in, total + bytes.len())?;
            let (last_idx, mut tail) = match last {
                Some((i, raw)) => (i, Some(ChunkRecord::decode(&raw)?)),
                None => (0, None),
            };

            let dir = paths::parent_dir(path).unwrap_or("/").to_string();
            ensure_dir_chain(t, &dir)?;
            let mut rec = load_dir(&*t, &dir)?.unwrap_or_else(|| DirectoryRecord::new(dir.clone()));

            let last_rec = tail.as_mut().unwrap_or(&mut first);
            let room = match cs {
                Some(cs) => cs.saturating_sub(last_rec.payload.len()),
                None => bytes.len(),
            };
            let fill = room.min(bytes.len());
            last_rec.payload.extend_from_slice(&bytes[..fill]);

            let mut spilled = 0usize;
            if let Some(cs) = cs {
                for (j, piece) in bytes[fill..].chunks(cs).enumerate() {
                    let key = Keys::chunk(path, last_idx + 1 + j);
                    let chunk = ChunkRecord { key: key.clone(), meta: merged.clone(), payload: piece.to_vec() };
                    t.put(Collection::Files, key.clone(), chunk.encode()?);
                    rec.files.insert(key, DirEntry::Chunk(merged.clone()));
                    spilled += 1;
                }
            }
            if let Some(tail) = tail {
                if fill > 0 { t.put(Collection::Files, tail.key.clone(), tail.encode()?); }
            }
            first.meta = merged.clone();
            t.put(Collection::Files, path.to_string(), first.encode()?);
            rec.files.insert(path.to_string(), DirEntry::Chunk(merged));
            save_dir(t, &rec)?;
            Ok(spilled)
        })?;
        debug!(target: "chunkvault::vfs", "appended {} bytes to {} ({} new chunks)", added, path, spilled);
        Ok(())
    }

    /// Decoded content of `path`, or `None` when the file does not exist.
    pub async fn read_file(&self, path: &str) -> VaultResult<Option<Value>> {
        let path = Vault::file_path(path)?;
        self.store.read(|v| {
            let Some(raw) = v.get(Collection::Files, &path) else { return Ok(None) };
            let meta = ChunkRecord::decode(raw)?.meta;
            let mut bytes = Vec::new();
            visit_chunks(v, &path, |_, chunk| {
                bytes.extend_from_slice(ChunkRecord::payload_of(chunk)?);
                Ok(ControlFlow::Continue(()))
            })?;
            codec::decode(bytes, &meta).map(Some)
        })
    }

    /// Whole file as text (invalid UTF-8 replaced), whatever its kind.
    pub async fn read_file_as_text(&self, path: &str) -> VaultResult<Option<String>> {
        let path = Vault::file_path(path)?;
        if !self.store.contains(Collection::Files, &path)? { return Ok(None); }
        let bytes = self.read_bytes_sync(&path, 0, None)?;
        Ok(Some(String::from_utf8_lossy(&bytes).into_owned()))
    }

    pub async fn exists(&self, path: &str) -> VaultResult<bool> {
        let path = Vault::file_path(path)?;
        self.store.contains(Collection::Files, &path)
    }

    /// Total payload bytes across all chunks; 0 when the file does not exist.
    pub async fn get_file_size(&self, path: &str) -> VaultResult<u64> {
        let path = Vault::file_path(path)?;
        self.file_size_sync(&path)
    }

    pub(crate) fn file_size_sync(&self, path: &str) -> VaultResult<u64> {
        self.store.read(|v| {
            let mut total = 0u64;
            visit_chunks(v, path, |_, chunk| {
                total += ChunkRecord::payload_of(chunk)?.len() as u64;
                Ok(ControlFlow::Continue(()))
            })?;
            Ok(total)
        })
    }

    /// Delete every chunk of `path` and its directory entries. Returns false when absent.
    pub async fn delete_file(&self, path: &str) -> VaultResult<bool> {
        let path = Vault::file_path(path)?;
        let deleted = self.store.transaction(|t| {
            let first = t.delete(Collection::Files, &path);
            let rest = t.delete_prefix(Collection::Files, &Keys::chunk_prefix(&path));
            if let Some(dir) = paths::parent_dir(&path) {
                if let Some(mut rec) = load_dir(&*t, dir)? {
                    if unlink_chunks(&mut rec, &path) { save_dir(t, &rec)?; }
                }
            }
            Ok(first || rest > 0)
        })?;
        if deleted { debug!(target: "chunkvault::vfs", "deleted {}", path); }
        Ok(deleted)
    }

    /// Hand each chunk's payload to `visitor` in chunk order until it breaks.
    /// Returns the number of chunks visited (0 when the file does not exist).
    pub async fn process_chunks_in_order<F>(&self, path: &str, mut visitor: F) -> VaultResult<usize>
    where
        F: FnMut(usize, &[u8]) -> ControlFlow<()>,
    {
        let path = Vault::file_path(path)?;
        self.store.read(|v| {
            let mut seen = 0usize;
            visit_chunks(v, &path, |i, chunk| {
                seen += 1;
                Ok(visitor(i, ChunkRecord::payload_of(chunk)?))
            })?;
            Ok(seen)
        })
    }

    /// Raw bytes `[start, end)` of `path` (`end = None` reads to the end), touching only the
    /// chunks that overlap the range. Empty when the file does not exist.
    pub async fn read_bytes(&self, path: &str, start: u64, end: Option<u64>) -> VaultResult<Vec<u8>> {
        let path = Vault::file_path(path)?;
        self.read_bytes_sync(&path, start, end)
    }

    /// `read_bytes` decoded as UTF-8, replacing invalid sequences.
    pub async fn read_text_range(&self, path: &str, start: u64, end: Option<u64>) -> VaultResult<String> {
        let path = Vault::file_path(path)?;
        let bytes = self.read_bytes_sync(&path, start, end)?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    pub(crate) fn read_bytes_sync(&self, path: &str, start: u64, end: Option<u64>) -> VaultResult<Vec<u8>> {
        let end = end.unwrap_or(u64::MAX);
        if end <= start { return Ok(Vec::new()); }
        self.store.read(|v| {
            let mut out = Vec::new();
            let mut offset = 0u64;
            visit_chunks(v, path, |_, chunk| {
                let payload = ChunkRecord::payload_of(chunk)?;
                let chunk_end = offset + payload.len() as u64;
                if chunk_end > start {
                    let lo = start.saturating_sub(offset) as usize;
                    let hi = (end.min(chunk_end) - offset) as usize;
                    out.extend_from_slice(&payload[lo..hi]);
                }
                offset = chunk_end;
                Ok(if offset >= end { ControlFlow::Break(()) } else { ControlFlow::Continue(()) })
            })?;
            Ok(out)
        })
    }
}
