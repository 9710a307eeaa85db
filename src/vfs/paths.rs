use unicode_normalization::UnicodeNormalization;

use crate::error::{VaultError, VaultResult};

pub const SEP: char = '/';
/// Infix separating a file path from its chunk index; reserved in user paths.
pub const CHUNK_INFIX: &str = "_chunk_";

/// Normalize a UTF-8 string to NFC.
pub fn normalize_nfc(input: &str) -> String {
    input.nfc().collect::<String>()
}

/// Normalize a vault path: NFC, a single leading '/', no empty segments, no trailing '/'.
/// With `base`, the (normalized) base directory is prefixed. An empty input yields "/".
pub fn normalize_path(path: &str, base: Option<&str>) -> String {
    let mut out = String::with_capacity(path.len() + base.map_or(0, str::len) + 1);
    for seg in base.into_iter().chain(std::iter::once(path)).flat_map(|p| p.split(SEP)) {
        if seg.is_empty() { continue; }
        out.push(SEP);
        out.push_str(seg);
    }
    if out.is_empty() { out.push(SEP); }
    normalize_nfc(&out)
}

/// Reject paths the key layout cannot represent unambiguously:
/// NUL characters, '.'/'..' segments, or the reserved chunk infix.
pub fn validate(path: &str) -> VaultResult<()> {
    if path.chars().any(|c| c == '\u{0000}') {
        return Err(VaultError::bad_path(format!("path cannot contain NUL characters: {path:?}")));
    }
    for seg in segments(path) {
        if seg == "." || seg == ".." {
            return Err(VaultError::bad_path(format!("segments '.' and '..' are not allowed: '{path}'")));
        }
    }
    if path.contains(CHUNK_INFIX) {
        return Err(VaultError::bad_path(format!("'{CHUNK_INFIX}' is reserved for chunk keys: '{path}'")));
    }
    Ok(())
}

/// Non-empty segments of a path.
pub fn segments(path: &str) -> impl Iterator<Item = &str> {
    path.split(SEP).filter(|s| !s.is_empty())
}

/// `/first` for a normalized path, or `None` for "/".
pub fn root_dir(path: &str) -> Option<String> {
    segments(path).next().map(|s| format!("{SEP}{s}"))
}

/// Directory containing `path`; `None` for a top-level entry or "/".
pub fn parent_dir(path: &str) -> Option<&str> {
    let trimmed = path.trim_end_matches(SEP);
    let idx = trimmed.rfind(SEP)?;
    if idx == 0 { None } else { Some(&trimmed[..idx]) }
}

/// Every proper ancestor directory of `path`, outermost first.
/// `/a/b/c` gives `["/a", "/a/b"]`.
pub fn ancestors(path: &str) -> Vec<String> {
    let segs: Vec<&str> = segments(path).collect();
    let mut out = Vec::with_capacity(segs.len().saturating_sub(1));
    let mut cur = String::new();
    for seg in segs.iter().take(segs.len().saturating_sub(1)) {
        cur.push(SEP);
        cur.push_str(seg);
        out.push(cur.clone());
    }
    out
}

/// Last segment of a path ("" for "/").
pub fn file_name(path: &str) -> &str {
    segments(path).last().unwrap_or("")
}
