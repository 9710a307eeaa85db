//! Chunk key builders for the `files` collection.
//! Chunk 0 lives at the bare path; chunk n >= 1 at `{path}_chunk_{n:08}` so lexical
//! key order equals chunk order.

use super::paths::CHUNK_INFIX;

pub const CHUNK_INDEX_WIDTH: usize = 8;

/// Build keys for chunked file storage.
pub struct Keys;

impl Keys {
    pub fn chunk(path: &str, index: usize) -> String {
        if index == 0 { path.to_string() } else { format!("{path}{CHUNK_INFIX}{index:0width$}", width = CHUNK_INDEX_WIDTH) }
    }

    /// Prefix shared by chunks 1..N of `path` (chunk 0 is the bare path).
    #[inline]
    pub fn chunk_prefix(path: &str) -> String { format!("{path}{CHUNK_INFIX}") }

    /// Prefix of every key stored beneath a directory.
    #[inline]
    pub fn dir_prefix(dir: &str) -> String { format!("{}/", dir.trim_end_matches('/')) }

    /// File path a chunk key belongs to.
    pub fn base_of(key: &str) -> &str {
        match key.rfind(CHUNK_INFIX) {
            Some(idx) if Self::is_index(&key[idx + CHUNK_INFIX.len()..]) => &key[..idx],
            _ => key,
        }
    }

    /// Chunk index of `key` when it belongs to `path`.
    pub fn chunk_index(key: &str, path: &str) -> Option<usize> {
        if key == path { return Some(0); }
        let rest = key.strip_prefix(path)?.strip_prefix(CHUNK_INFIX)?;
        if !Self::is_index(rest) { return None; }
        rest.parse().ok()
    }

    fn is_index(s: &str) -> bool {
        !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit())
    }
}

#[cfg(test)]
#[path = "keys_tests.rs"]
mod keys_tests;
