//! Per-test scratch files
//!
//! A test that materializes files inside a sandbox acquires a `ScratchGuard`
//! first and registers every file and directory it creates. `release` removes
//! them; if the test bails out early the guard's `Drop` does the same.

use std::path::{Path, PathBuf};
use tracing::{debug, warn};

#[derive(Debug, Default)]
pub struct ScratchGuard {
    files: Vec<PathBuf>,
    dirs: Vec<PathBuf>,
    released: bool,
}

impl ScratchGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a path to be removed on release (it may not exist yet)
    pub fn track(&mut self, path: impl Into<PathBuf>) -> PathBuf {
        let path = path.into();
        self.files.push(path.clone());
        path
    }

    /// Write `content` to `root/relative`, creating and tracking missing parents
    pub async fn write(
        &mut self,
        root: &Path,
        relative: &Path,
        content: &[u8],
    ) -> std::io::Result<PathBuf> {
        let full = root.join(relative);
        if let Some(parent) = full.parent() {
            self.create_dirs(root, parent).await?;
        }
        self.files.push(full.clone());
        tokio::fs::write(&full, content).await?;
        Ok(full)
    }

    /// Remove everything created through this guard
    pub fn release(mut self) {
        self.remove_all();
    }

    async fn create_dirs(&mut self, root: &Path, dir: &Path) -> std::io::Result<()> {
        // Record only directories we create, outermost first
        let mut missing = Vec::new();
        let mut current = Some(dir);
        while let Some(path) = current {
            if path == root || path.exists() {
                break;
            }
            missing.push(path.to_path_buf());
            current = path.parent();
        }
        for path in missing.into_iter().rev() {
            tokio::fs::create_dir(&path).await?;
            self.dirs.push(path);
        }
        Ok(())
    }

    fn remove_all(&mut self) {
        if self.released {
            return;
        }
        self.released = true;

        for path in self.files.drain(..) {
            if !path.exists() {
                continue;
            }
            if let Err(e) = std::fs::remove_file(&path) {
                warn!("Failed to remove {:?}: {}", path, e);
            }
        }
        for path in self.dirs.drain(..).rev() {
            if !path.is_dir() {
                continue;
            }
            if let Err(e) = std::fs::remove_dir(&path) {
                warn!("Failed to remove {:?}: {}", path, e);
            }
        }
        debug!("Scratch files released");
    }
}

impl Drop for ScratchGuard {
    fn drop(&mut self) {
        self.remove_all();
    }
}
