use std::path::{Path, PathBuf};

use tracing::info;

use crate::error::VaultResult;

/// Destination for exported CSV pieces.
pub trait ExportSink {
    fn write_piece(&mut self, name: &str, contents: &[u8]) -> VaultResult<()>;
}

/// Collects pieces in memory as `(name, contents)`.
impl ExportSink for Vec<(String, Vec<u8>)> {
    fn write_piece(&mut self, name: &str, contents: &[u8]) -> VaultResult<()> {
        self.push((name.to_string(), contents.to_vec()));
        Ok(())
    }
}

/// Writes each piece as a file in a host directory (created on demand).
pub struct DirectorySink {
    dir: PathBuf,
    written: Vec<PathBuf>,
}

impl DirectorySink {
    pub fn new(dir: impl AsRef<Path>) -> VaultResult<Self> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir, written: Vec::new() })
    }

    pub fn written(&self) -> &[PathBuf] { &self.written }
}

impl ExportSink for DirectorySink {
    fn write_piece(&mut self, name: &str, contents: &[u8]) -> VaultResult<()> {
        let path = self.dir.join(name);
        std::fs::write(&path, contents)?;
        info!(target: "chunkvault::tabular", "wrote {} ({} bytes)", path.display(), contents.len());
        self.written.push(path);
        Ok(())
    }
}
