//! Temporary sandbox directories
//!
//! A `SandboxDir` owns a `tempfile::TempDir`; the tree is removed when the
//! value is dropped, so every exit path of the pipeline releases it.

use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::{debug, info, warn};

use super::config::SandboxConfig;
use crate::core::utils::{copy_item, enclosed_path};
use crate::error::{GraderError, Result};

/// One ephemeral sandbox directory
#[derive(Debug)]
pub struct SandboxDir {
    dir: TempDir,
    /// Subdirectory commands run in
    working_directory: PathBuf,
}

impl SandboxDir {
    /// Create a new sandbox directory
    pub fn new(prefix: &str, working_directory: &str) -> Result<Self> {
        let dir = tempfile::Builder::new()
            .prefix(prefix)
            .tempdir()
            .map_err(|source| GraderError::Sandbox {
                path: std::env::temp_dir(),
                source,
            })?;

        let working_directory = if working_directory.is_empty() {
            PathBuf::new()
        } else {
            enclosed_path(working_directory).ok_or_else(|| {
                GraderError::Config(format!(
                    "working directory must be relative: {}",
                    working_directory
                ))
            })?
        };

        let sandbox = Self {
            dir,
            working_directory,
        };
        let work_dir = sandbox.work_dir();
        std::fs::create_dir_all(&work_dir).map_err(|source| GraderError::Sandbox {
            path: work_dir.clone(),
            source,
        })?;

        info!("Sandbox created at {:?}", sandbox.path());
        Ok(sandbox)
    }

    /// Root of the sandbox tree
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Directory commands run in
    pub fn work_dir(&self) -> PathBuf {
        self.dir.path().join(&self.working_directory)
    }

    /// Copy a file or directory from `src_dir` into the sandbox root.
    ///
    /// Returns whether the source existed.
    pub fn copy_in(&self, src_dir: &Path, item: &str) -> Result<bool> {
        let copied = copy_item(src_dir, item, self.path()).map_err(|source| {
            GraderError::Sandbox {
                path: src_dir.join(item),
                source,
            }
        })?;
        if copied {
            debug!("Copied {:?} into {:?}", src_dir.join(item), self.path());
        } else {
            warn!("Nothing to copy at {:?}", src_dir.join(item));
        }
        Ok(copied)
    }

    /// Remove the sandbox tree now, reporting failures
    pub fn cleanup(self) -> Result<()> {
        let path = self.path().to_path_buf();
        self.dir
            .close()
            .map_err(|source| GraderError::Sandbox { path: path.clone(), source })?;
        info!("Cleaned up sandbox {:?}", path);
        Ok(())
    }
}

/// Submission sandbox plus reference sandbox
#[derive(Debug)]
pub struct SandboxPair {
    pub submission: SandboxDir,
    pub reference: SandboxDir,
}

impl SandboxPair {
    pub fn new(config: &SandboxConfig, working_directory: &str) -> Result<Self> {
        Ok(Self {
            submission: SandboxDir::new(&config.prefix, working_directory)?,
            reference: SandboxDir::new(&config.prefix, working_directory)?,
        })
    }

    pub fn cleanup(self) -> Result<()> {
        let submission = self.submission.cleanup();
        let reference = self.reference.cleanup();
        submission.and(reference)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pair_is_disjoint() {
        let pair = SandboxPair::new(&SandboxConfig::default(), "").unwrap();
        assert_ne!(pair.submission.path(), pair.reference.path());
    }

    #[test]
    fn test_sandbox_removed_on_drop() {
        let path = {
            let sandbox = SandboxDir::new("Autograder_", "").unwrap();
            sandbox.path().to_path_buf()
        };
        assert!(!path.exists());
    }

    #[test]
    fn test_working_directory_is_created() {
        let sandbox = SandboxDir::new("Autograder_", "pa1/src").unwrap();
        assert!(sandbox.work_dir().is_dir());
        assert!(sandbox.work_dir().ends_with("pa1/src"));
    }

    #[test]
    fn test_rejects_escaping_working_directory() {
        assert!(SandboxDir::new("Autograder_", "../outside").is_err());
    }

    #[test]
    fn test_explicit_cleanup() {
        let sandbox = SandboxDir::new("Autograder_", "").unwrap();
        let path = sandbox.path().to_path_buf();
        sandbox.cleanup().unwrap();
        assert!(!path.exists());
    }
}
