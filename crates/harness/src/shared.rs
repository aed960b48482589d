use std::path::{Path, PathBuf};

use tempfile::TempDir;

use formstore_engine::{EngineError, Workspace, WorkspaceConfig};

/// A workspace database file that several handles (one per thread) open
/// concurrently. The file is removed when this is dropped.
pub struct SharedDb {
    _dir: TempDir,
    path: PathBuf,
}

impl SharedDb {
    pub fn new() -> std::io::Result<Self> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("workspace.db");
        Ok(Self { _dir: dir, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn config(&self) -> WorkspaceConfig {
        WorkspaceConfig::on_disk(&self.path)
    }

    pub fn open(&self) -> Result<Workspace, EngineError> {
        Workspace::open(self.config())
    }
}
