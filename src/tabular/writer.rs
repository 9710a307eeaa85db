//! CSV table writer: header creation and row/column appends through `append_file`.

use chrono::{FixedOffset, Local, TimeZone};
use csv::{Terminator, WriterBuilder};
use serde_json::{Map, Value as JsonValue};

use super::parse::split_header;
use crate::error::{VaultError, VaultResult};
use crate::storage::Collection;
use crate::vfs::{Value, Vault};

const ISO_LOCAL_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3f(UTC%:z)";
pub const LOCALIZED_COLUMN: &str = "localized";
pub const TIMESTAMP_COLUMN: &str = "timestamp";

/// Render epoch milliseconds in the local time zone, e.g. `2024-05-01T14:03:07.250(UTC+02:00)`.
pub fn to_iso_local(ms: i64) -> String {
    Local.timestamp_millis_opt(ms).single()
        .map(|dt| dt.format(ISO_LOCAL_FORMAT).to_string())
        .unwrap_or_default()
}

/// Same rendering with an explicit UTC offset.
pub fn to_iso_with_offset(ms: i64, offset: FixedOffset) -> String {
    offset.timestamp_millis_opt(ms).single()
        .map(|dt| dt.format(ISO_LOCAL_FORMAT).to_string())
        .unwrap_or_default()
}

/// Move `timestamp` to the front and, with `localized`, insert a `localized` column after a
/// leading time column.
pub fn normalize_header(header: &[&str], localized: bool) -> Vec<String> {
    let mut cols: Vec<String> = header.iter().map(|s| s.to_string()).collect();
    if let Some(i) = cols.iter().position(|c| c == TIMESTAMP_COLUMN) {
        if i > 0 {
            let ts = cols.remove(i);
            cols.insert(0, ts);
        }
    }
    if localized {
        let leads_with_time = cols.first()
            .map(|c| { let c = c.to_lowercase(); c.contains("time") || c.contains("unix") })
            .unwrap_or(false);
        if leads_with_time && cols.get(1).map(String::as_str) != Some(LOCALIZED_COLUMN) {
            cols.insert(1, LOCALIZED_COLUMN.to_string());
        }
    }
    cols
}

fn render_cell(v: &JsonValue) -> String {
    match v {
        JsonValue::Null => String::new(),
        JsonValue::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Encode rows as CSV lines terminated by '\n'. Cells containing line breaks are rejected
/// because readers split on '\n'.
fn encode_lines<'a>(rows: impl IntoIterator<Item = &'a [String]>) -> VaultResult<String> {
    let mut wtr = WriterBuilder::new().has_headers(false).terminator(Terminator::Any(b'\n')).from_writer(Vec::new());
    for row in rows {
        if let Some(bad) = row.iter().find(|c| c.contains('\n') || c.contains('\r')) {
            return Err(VaultError::unsupported(format!("CSV cell contains a line break: {bad:?}")));
        }
        wtr.write_record(row)?;
    }
    let bytes = wtr.into_inner().map_err(|e| VaultError::corrupt(format!("csv: {e}")))?;
    String::from_utf8(bytes).map_err(|e| VaultError::corrupt(format!("csv: {e}")))
}

fn timestamp_ms(v: Option<&JsonValue>) -> Option<i64> {
    match v? {
        JsonValue::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        JsonValue::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Value of row `i` in a column map: an array element, or a scalar on the first row only.
fn column_cell<'a>(columns: &'a Map<String, JsonValue>, name: &str, i: usize) -> Option<&'a JsonValue> {
    match columns.get(name)? {
        JsonValue::Array(a) => a.get(i),
        scalar => (i == 0).then_some(scalar),
    }
}

impl Vault {
    /// Create a CSV file holding only its header unless the file already exists.
    /// Returns the header as written (or as it would have been written).
    pub async fn create_csv(&self, path: &str, header: &[&str], localized: bool) -> VaultResult<Vec<String>> {
        let path = Vault::file_path(path)?;
        let cols = normalize_header(header, localized);
        let _guard = self.locks().lock(&path).await;
        if !self.store().contains(Collection::Files, &path)? {
            let line = encode_lines([cols.as_slice()])?;
            self.write_sync(&path, Value::Text(line), self.default_chunk_size())?;
        }
        Ok(cols)
    }

    /// Header for an append: explicit, else the existing file's, else `timestamp` followed
    /// by `keys`.
    fn resolve_header<'a>(&self, path: &str, given: Option<&[String]>, keys: impl Iterator<Item = &'a String>) -> VaultResult<Vec<String>> {
        if let Some(h) = given { return Ok(h.to_vec()); }
        if let Some(bytes) = self.header_bytes_sync(path)? {
            let line = String::from_utf8_lossy(&bytes);
            let names = split_header(line.trim_end())?;
            if !names.is_empty() { return Ok(names); }
        }
        let mut cols = vec![TIMESTAMP_COLUMN.to_string()];
        cols.extend(keys.filter(|k| k.as_str() != TIMESTAMP_COLUMN).cloned());
        Ok(cols)
    }

    fn append_encoded(&self, path: &str, header: &[String], rows: Vec<Vec<String>>) -> VaultResult<usize> {
        let exists = self.store().contains(Collection::Files, path)?;
        let mut lines: Vec<&[String]> = Vec::with_capacity(rows.len() + 1);
        if !exists { lines.push(header); }
        lines.extend(rows.iter().map(Vec::as_slice));
        if lines.is_empty() { return Ok(0); }
        let text = encode_lines(lines)?;
        self.append_sync(path, Value::Text(text), self.default_chunk_size())?;
        Ok(rows.len())
    }

    /// Append row objects, one CSV line each, creating the file with its header when absent.
    /// Cells missing from a row are left empty; a `localized` column missing from the row is
    /// rendered from its `timestamp`. Returns the number of rows appended.
    pub async fn append_rows(&self, path: &str, rows: &[Map<String, JsonValue>], header: Option<&[String]>) -> VaultResult<usize> {
        let path = Vault::file_path(path)?;
        self.ensure_directory_initialized_sync(&path)?;
        let _guard = self.locks().lock(&path).await;
        let first_keys = rows.first().into_iter().flat_map(|r| r.keys());
        let cols = self.resolve_header(&path, header, first_keys)?;
        let encoded: Vec<Vec<String>> = rows.iter().map(|row| {
            cols.iter().map(|c| match row.get(c) {
                Some(v) => render_cell(v),
                None if c == LOCALIZED_COLUMN => timestamp_ms(row.get(TIMESTAMP_COLUMN)).map(to_iso_local).unwrap_or_default(),
                None => String::new(),
            }).collect()
        }).collect();
        self.append_encoded(&path, &cols, encoded)
    }

    /// Append column arrays (`{column: [values...]}`) as rows. A scalar fills only the first
    /// row; shorter arrays leave trailing cells empty. Returns the number of rows appended.
    pub async fn append_columns(&self, path: &str, columns: &Map<String, JsonValue>, header: Option<&[String]>) -> VaultResult<usize> {
        let path = Vault::file_path(path)?;
        self.ensure_directory_initialized_sync(&path)?;
        let _guard = self.locks().lock(&path).await;
        let cols = self.resolve_header(&path, header, columns.keys())?;
        let n = columns.values()
            .map(|v| match v { JsonValue::Array(a) => a.len(), _ => 1 })
            .max()
            .unwrap_or(0);
        let encoded: Vec<Vec<String>> = (0..n).map(|i| {
            cols.iter().map(|c| match column_cell(columns, c, i) {
                Some(v) => render_cell(v),
                None if c == LOCALIZED_COLUMN && !columns.contains_key(LOCALIZED_COLUMN) => {
                    timestamp_ms(column_cell(columns, TIMESTAMP_COLUMN, i)).map(to_iso_local).unwrap_or_default()
                }
                None => String::new(),
            }).collect()
        }).collect();
        self.append_encoded(&path, &cols, encoded)
    }
}

#[cfg(test)]
#[path = "writer_tests.rs"]
mod writer_tests;
