//! Line-aligned range reads over CSV files stored in the vault.

use std::ops::ControlFlow;

use tracing::debug;

use super::export::ExportSink;
use super::parse::{parse_rows, split_header};
use super::{ColumnSet, CsvRange, CsvRows};
use crate::error::{VaultError, VaultResult};
use crate::vfs::ops::visit_chunks;
use crate::vfs::paths::file_name;
use crate::vfs::types::ChunkRecord;
use crate::vfs::Vault;

fn empty_rows(names: Vec<String>, transpose: bool) -> CsvRows {
    if transpose { CsvRows::Rows(Vec::new()) } else { CsvRows::Columns(ColumnSet::with_names(names)) }
}

fn strip_eol(line: &[u8]) -> &[u8] {
    let line = line.strip_suffix(b"\n").unwrap_or(line);
    line.strip_suffix(b"\r").unwrap_or(line)
}

/// Base name used for export pieces: `/data/ppg.csv` exports as `ppg.csv`, `ppg_1.csv`, ...
fn piece_name(stem: &str, index: usize) -> String {
    if index == 0 { format!("{stem}.csv") } else { format!("{stem}_{index}.csv") }
}

impl Vault {
    /// First line of the file including its '\n' (the whole file when it has none).
    /// Reads only as many chunks as needed. `None` when the file does not exist.
    pub(crate) fn header_bytes_sync(&self, path: &str) -> VaultResult<Option<Vec<u8>>> {
        self.store().read(|v| {
            let mut out = Vec::new();
            let found = visit_chunks(v, path, |_, chunk| {
                let payload = ChunkRecord::payload_of(chunk)?;
                match payload.iter().position(|&b| b == b'\n') {
                    Some(i) => {
                        out.extend_from_slice(&payload[..=i]);
                        Ok(ControlFlow::Break(()))
                    }
                    None => {
                        out.extend_from_slice(payload);
                        Ok(ControlFlow::Continue(()))
                    }
                }
            })?;
            Ok(found.then_some(out))
        })
    }

    /// Header line of a CSV file without its line terminator; empty when the file is absent.
    pub async fn get_header(&self, path: &str) -> VaultResult<String> {
        let path = Vault::file_path(path)?;
        let bytes = self.header_bytes_sync(&path)?.unwrap_or_default();
        Ok(String::from_utf8_lossy(strip_eol(&bytes)).into_owned())
    }

    /// Parse the complete lines inside bytes `[start, end)` (`end = None` means end of file).
    ///
    /// A partial leading line (when `start` is not on a line boundary) and the header line
    /// at offset 0 are skipped. A trailing line without '\n' only counts at end of file.
    /// `None` when the file does not exist or has no header.
    pub async fn read_range(&self, path: &str, start: u64, end: Option<u64>, transpose: bool) -> VaultResult<Option<CsvRange>> {
        let path = Vault::file_path(path)?;
        self.read_range_sync(&path, start, end, transpose)
    }

    pub(crate) fn read_range_sync(&self, path: &str, start: u64, end: Option<u64>, transpose: bool) -> VaultResult<Option<CsvRange>> {
        let Some(names) = self.header_names(path)? else { return Ok(None) };
        let total = self.file_size_sync(path)?;
        self.range_within(path, &names, start, end, total, transpose).map(Some)
    }

    /// Column names from the header line; `None` when the file is absent or has no header.
    fn header_names(&self, path: &str) -> VaultResult<Option<Vec<String>>> {
        let Some(header) = self.header_bytes_sync(path)? else { return Ok(None) };
        let header = String::from_utf8_lossy(strip_eol(&header)).into_owned();
        if header.trim().is_empty() { return Ok(None); }
        split_header(&header).map(Some)
    }

    /// Range read against an already known header and file size.
    fn range_within(&self, path: &str, names: &[String], start: u64, end: Option<u64>, total: u64, transpose: bool) -> VaultResult<CsvRange> {
        let names = names.to_vec();
        let end = end.unwrap_or(total).min(total);
        let nothing = |consumed: u64| CsvRange { rows: empty_rows(names.clone(), transpose), start, end: consumed, total_size: total };
        if start >= end {
            return Ok(nothing(start.min(total)));
        }

        // one byte before `start` tells whether it sits on a line boundary
        let read_from = start.saturating_sub(1);
        let bytes = self.read_bytes_sync(path, read_from, Some(end))?;
        let skip_leading = start == 0 || bytes.first() != Some(&b'\n');
        let mut body: &[u8] = if start == 0 { &bytes } else { &bytes[1..] };
        if skip_leading {
            match body.iter().position(|&b| b == b'\n') {
                Some(i) => body = &body[i + 1..],
                None => return Ok(nothing(if end == total { total } else { start })),
            }
        }
        let body_start = end - body.len() as u64;

        let (lines, consumed) = if end == total {
            (body, total)
        } else {
            match body.iter().rposition(|&b| b == b'\n') {
                Some(i) => (&body[..=i], body_start + i as u64 + 1),
                None => (&body[..0], body_start),
            }
        };
        let text = String::from_utf8_lossy(lines);
        let rows = parse_rows(&text, &names, transpose)?;
        Ok(CsvRange { rows, start, end: consumed, total_size: total })
    }

    /// Read the whole file in line-aligned windows of at most `max_chunk_size` bytes,
    /// calling `on_chunk(rows, start, end, total_size)` for each. A window is widened when
    /// a single line does not fit. Returns the number of callbacks made.
    pub async fn stream_ranges<F>(&self, path: &str, max_chunk_size: u64, transpose: bool, mut on_chunk: F) -> VaultResult<usize>
    where
        F: FnMut(CsvRows, u64, u64, u64),
    {
        let path = Vault::file_path(path)?;
        let Some(names) = self.header_names(&path)? else { return Ok(0) };
        let total = self.file_size_sync(&path)?;
        let step = max_chunk_size.max(1);
        let mut start = 0u64;
        let mut window = step;
        let mut calls = 0usize;
        while start < total {
            let end = start.saturating_add(window).min(total);
            let range = self.range_within(&path, &names, start, Some(end), total, transpose)?;
            if range.end <= start {
                window = window.saturating_mul(2);
                debug!(target: "chunkvault::tabular", "{}: line at {} exceeds {} bytes, widening", path, start, step);
                continue;
            }
            on_chunk(range.rows, start, range.end, total);
            calls += 1;
            start = range.end;
            window = step;
        }
        Ok(calls)
    }

    /// Split a CSV file into line-aligned pieces of at most `max_piece_bytes`, each starting
    /// with the header line, and hand them to `sink` as `name.csv`, `name_1.csv`, ...
    /// Returns the number of pieces (0 when the file does not exist).
    pub async fn export_bounded<S: ExportSink>(&self, path: &str, max_piece_bytes: u64, sink: &mut S) -> VaultResult<usize> {
        let path = Vault::file_path(path)?;
        let Some(mut header) = self.header_bytes_sync(&path)? else { return Ok(0) };
        let total = self.file_size_sync(&path)?;
        let mut pos = header.len() as u64;
        if !header.ends_with(b"\n") { header.push(b'\n'); }
        let header_len = header.len() as u64;
        if header_len >= max_piece_bytes {
            return Err(VaultError::unsupported(format!(
                "piece budget of {max_piece_bytes} bytes cannot hold the {header_len}-byte header")));
        }
        let budget = max_piece_bytes - header_len;
        let name = file_name(&path);
        let stem = name.strip_suffix(".csv").unwrap_or(name);

        let mut pieces = 0usize;
        loop {
            let end = pos.saturating_add(budget).min(total);
            let bytes = self.read_bytes_sync(&path, pos, Some(end))?;
            let take = if end == total {
                bytes.len()
            } else {
                match bytes.iter().rposition(|&b| b == b'\n') {
                    Some(i) => i + 1,
                    None => return Err(VaultError::unsupported(format!(
                        "line at offset {pos} does not fit in a {max_piece_bytes}-byte piece"))),
                }
            };
            let mut piece = Vec::with_capacity(header.len() + take);
            piece.extend_from_slice(&header);
            piece.extend_from_slice(&bytes[..take]);
            sink.write_piece(&piece_name(stem, pieces), &piece)?;
            pieces += 1;
            pos += take as u64;
            if pos >= total { break; }
        }
        debug!(target: "chunkvault::tabular", "exported {} in {} pieces", path, pieces);
        Ok(pieces)
    }
}

#[cfg(test)]
#[path = "stream_tests.rs"]
mod stream_tests;
