//! Folder registry: a CSV file (`folder,lastmodified`) listing known top-level folders.

use chrono::Utc;
use csv::ReaderBuilder;
use tracing::{debug, warn};

use crate::error::{VaultError, VaultResult};
use crate::storage::Collection;
use crate::vfs::{Value, Vault};

pub const REGISTRY_HEADER: [&str; 2] = ["folder", "lastmodified"];

impl Vault {
    /// `(folder, lastmodified)` rows of a registry, in file order; empty when absent.
    /// Folder names are kept verbatim: `null` or `1.50` are names, not literals.
    fn registry_rows(&self, path: &str) -> VaultResult<Vec<(String, i64)>> {
        if !self.store().contains(Collection::Files, path)? { return Ok(Vec::new()); }
        let bytes = self.read_bytes_sync(path, 0, None)?;
        let mut rdr = ReaderBuilder::new().has_headers(true).flexible(true).from_reader(bytes.as_slice());
        let header = rdr.headers()?.clone();
        let column = |name: &str| header.iter().position(|h| h.trim() == name);
        let folder_idx = column(REGISTRY_HEADER[0]).unwrap_or(0);
        let ts_idx = column(REGISTRY_HEADER[1]);
        let mut rows = Vec::new();
        for rec in rdr.records() {
            let rec = rec?;
            let Some(folder) = rec.get(folder_idx) else { continue };
            if folder.trim().is_empty() { continue; }
            let ts = ts_idx.and_then(|i| rec.get(i)).and_then(|t| t.trim().parse().ok()).unwrap_or(0);
            rows.push((folder.to_string(), ts));
        }
        Ok(rows)
    }

    /// Record `folder` in the registry at `registry_path` (the configured path when `None`):
    /// refresh its `lastmodified` if listed, otherwise add it. The file is rewritten in full.
    /// Blank names are ignored. Returns the registered folders in file order.
    pub async fn upsert_folder_registry(&self, folder: &str, registry_path: Option<&str>) -> VaultResult<Vec<String>> {
        let path = Vault::file_path(registry_path.unwrap_or(&self.config().registry_path))?;
        if folder.trim().is_empty() {
            warn!(target: "chunkvault::tabular", "ignoring blank folder name for registry {}", path);
            return Ok(self.registry_rows(&path)?.into_iter().map(|(f, _)| f).collect());
        }
        let _guard = self.locks().lock(&path).await;
        let now = Utc::now().timestamp_millis();
        let mut rows = self.registry_rows(&path)?;
        match rows.iter_mut().find(|(f, _)| f == folder) {
            Some(row) => row.1 = now,
            None => rows.push((folder.to_string(), now)),
        }

        let mut wtr = csv::WriterBuilder::new().has_headers(false).terminator(csv::Terminator::Any(b'\n')).from_writer(Vec::new());
        wtr.write_record(REGISTRY_HEADER)?;
        for (f, ts) in &rows {
            wtr.write_record([f.as_str(), ts.to_string().as_str()])?;
        }
        let bytes = wtr.into_inner().map_err(|e| VaultError::corrupt(format!("csv: {e}")))?;
        let text = String::from_utf8_lossy(&bytes).into_owned();
        self.write_sync(&path, Value::Text(text), self.default_chunk_size())?;
        debug!(target: "chunkvault::tabular", "registry {} now lists {} folders", path, rows.len());
        Ok(rows.into_iter().map(|(f, _)| f).collect())
    }

    /// Folder names listed in the registry (the configured path when `None`).
    pub async fn list_known_folders(&self, registry_path: Option<&str>) -> VaultResult<Vec<String>> {
        let path = Vault::file_path(registry_path.unwrap_or(&self.config().registry_path))?;
        Ok(self.registry_rows(&path)?.into_iter().map(|(f, _)| f).collect())
    }
}

#[cfg(test)]
#[path = "registry_tests.rs"]
mod registry_tests;
