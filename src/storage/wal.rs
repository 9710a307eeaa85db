//! Store WAL (write-ahead log)
//! ---------------------------
//! One record per committed transaction: a fixed header, a bincode payload
//! holding the ordered op list, and a CRC32 of the payload. Commit records are
//! fsynced when the store is configured for synchronous commits. On open the
//! log is replayed on top of the last snapshot; a checkpoint truncates it.

use std::fs::{File, OpenOptions};
use std::io::{ErrorKind, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crc32fast::Hasher as Crc32;
use serde::{Deserialize, Serialize};
use tracing::warn;

use super::kv::KvOp;
use crate::error::{VaultError, VaultResult};

const MAGIC_WAL: u32 = 0x4356_5731; // 'CVW1'
const REC_COMMIT: u8 = 1;
const HEADER_LEN: usize = 12;

#[derive(Debug, Clone, Copy)]
struct RecHeader { magic: u32, kind: u8, version: u8, len: u32 }

impl RecHeader {
    fn to_bytes(self) -> [u8; HEADER_LEN] {
        let mut buf = [0u8; HEADER_LEN];
        buf[0..4].copy_from_slice(&self.magic.to_le_bytes());
        buf[4] = self.kind;
        buf[5] = self.version;
        // bytes 6..8 reserved
        buf[8..12].copy_from_slice(&self.len.to_le_bytes());
        buf
    }

    fn from_bytes(buf: &[u8; HEADER_LEN]) -> Self {
        Self {
            magic: u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]),
            kind: buf[4],
            version: buf[5],
            len: u32::from_le_bytes([buf[8], buf[9], buf[10], buf[11]]),
        }
    }
}

/// Payload of one commit record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WalCommit {
    pub txn_id: u64,
    pub ops: Vec<KvOp>,
}

fn io_txn(ctx: &str, path: &Path, e: std::io::Error) -> VaultError {
    VaultError::txn(format!("{ctx} {}: {e}", path.display()))
}

/// Appends commit records to `wal/current.lg`.
pub struct WalWriter { file: File, path: PathBuf, sync: bool }

impl WalWriter {
    pub fn create(path: &Path, sync: bool) -> VaultResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| io_txn("create WAL dir", parent, e))?;
        }
        let file = OpenOptions::new().create(true).append(true).read(true).open(path)
            .map_err(|e| io_txn("open WAL for append", path, e))?;
        Ok(Self { file, path: path.to_path_buf(), sync })
    }

    pub fn path(&self) -> &Path { &self.path }

    pub fn append_commit(&mut self, txn_id: u64, ops: &[KvOp]) -> VaultResult<()> {
        let rec = WalCommit { txn_id, ops: ops.to_vec() };
        let payload = bincode::serialize(&rec).map_err(|e| VaultError::txn(format!("encode WAL record: {e}")))?;
        let len = u32::try_from(payload.len())
            .map_err(|_| VaultError::txn(format!("WAL record too large: {} bytes", payload.len())))?;
        let mut hasher = Crc32::new();
        hasher.update(&payload);
        let crc = hasher.finalize();
        let header = RecHeader { magic: MAGIC_WAL, kind: REC_COMMIT, version: 1, len };

        // Single buffer so a crash leaves at most one torn record at the tail
        let mut buf = Vec::with_capacity(HEADER_LEN + payload.len() + 4);
        buf.extend_from_slice(&header.to_bytes());
        buf.extend_from_slice(&payload);
        buf.extend_from_slice(&crc.to_le_bytes());
        self.file.write_all(&buf).map_err(|e| io_txn("append WAL", &self.path, e))?;
        if self.sync {
            self.file.flush().map_err(|e| io_txn("flush WAL", &self.path, e))?;
            self.file.sync_data().map_err(|e| io_txn("sync WAL", &self.path, e))?;
        }
        Ok(())
    }

    /// Drop all records; called once their effects are captured by a snapshot.
    pub fn truncate(&mut self) -> VaultResult<()> {
        self.file.set_len(0).map_err(|e| io_txn("truncate WAL", &self.path, e))?;
        self.file.sync_all().map_err(|e| io_txn("sync WAL", &self.path, e))?;
        Ok(())
    }
}

/// Reads commit records, validating magic and per-record CRC.
pub struct WalReader { file: File, end: u64, valid_end: u64, path: PathBuf }

impl WalReader {
    pub fn open(path: &Path) -> VaultResult<Self> {
        let mut file = OpenOptions::new().read(true).open(path)
            .map_err(|e| io_txn("open WAL for read", path, e))?;
        let end = file.seek(SeekFrom::End(0)).map_err(|e| io_txn("seek WAL", path, e))?;
        file.seek(SeekFrom::Start(0)).map_err(|e| io_txn("seek WAL", path, e))?;
        Ok(Self { file, end, valid_end: 0, path: path.to_path_buf() })
    }

    /// Offset just past the last complete record seen by `read_all`.
    pub fn valid_end(&self) -> u64 { self.valid_end }

    /// True when `read_all` stopped at a torn record before the end of the file.
    pub fn has_torn_tail(&self) -> bool { self.valid_end < self.end }

    /// Cut the file back to `valid_end` so new commits are not appended after torn bytes.
    pub fn discard_torn_tail(&self) -> VaultResult<()> {
        if !self.has_torn_tail() { return Ok(()); }
        let f = OpenOptions::new().write(true).open(&self.path)
            .map_err(|e| io_txn("open WAL for repair", &self.path, e))?;
        f.set_len(self.valid_end).map_err(|e| io_txn("truncate torn WAL tail", &self.path, e))?;
        f.sync_all().map_err(|e| io_txn("sync WAL", &self.path, e))?;
        warn!(target: "chunkvault::wal", "discarded {} torn bytes at the end of {}", self.end - self.valid_end, self.path.display());
        Ok(())
    }

    /// Read every complete record. A record cut short at the end of the file (crash
    /// mid-append) ends the log; a complete record with a bad CRC or magic is an error.
    pub fn read_all(&mut self) -> VaultResult<Vec<WalCommit>> {
        let mut out = Vec::new();
        let mut pos = 0u64;
        while pos < self.end {
            let mut hbuf = [0u8; HEADER_LEN];
            if let Err(e) = self.file.read_exact(&mut hbuf) {
                if e.kind() == ErrorKind::UnexpectedEof { warn!(target: "chunkvault::wal", "torn WAL header at offset {} in {}", pos, self.path.display()); break; }
                return Err(io_txn("read WAL", &self.path, e));
            }
            let header = RecHeader::from_bytes(&hbuf);
            if header.magic != MAGIC_WAL {
                return Err(VaultError::corrupt(format!("bad WAL magic at offset {pos}")));
            }
            if header.kind != REC_COMMIT {
                return Err(VaultError::corrupt(format!("unknown WAL record kind {} (v{})", header.kind, header.version)));
            }
            let mut payload = vec![0u8; header.len as usize];
            let mut crc_bytes = [0u8; 4];
            let body = self.file.read_exact(&mut payload).and_then(|_| self.file.read_exact(&mut crc_bytes));
            if let Err(e) = body {
                if e.kind() == ErrorKind::UnexpectedEof { warn!(target: "chunkvault::wal", "torn WAL record at offset {} in {}", pos, self.path.display()); break; }
                return Err(io_txn("read WAL", &self.path, e));
            }
            let mut hasher = Crc32::new();
            hasher.update(&payload);
            if hasher.finalize() != u32::from_le_bytes(crc_bytes) {
                return Err(VaultError::corrupt(format!("WAL record CRC mismatch at offset {pos}")));
            }
            let rec: WalCommit = bincode::deserialize(&payload)
                .map_err(|e| VaultError::corrupt(format!("decode WAL record at offset {pos}: {e}")))?;
            out.push(rec);
            pos += (HEADER_LEN + payload.len() + 4) as u64;
        }
        self.valid_end = pos;
        Ok(out)
    }
}

#[cfg(test)]
#[path = "wal_tests.rs"]
mod wal_tests;
