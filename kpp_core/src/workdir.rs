//! The per-invocation scratch directory for intermediate and final files.

use std::path::{Path, PathBuf};

use tempfile::TempDir;
use tracing::debug;

use crate::error::Result;

/// A scoped build directory. Cleaned up on drop unless created with
/// `keep`; cleanup is best-effort and never influences the exit status.
/// The vendor translator cannot read from stdin, so the preprocessed file
/// has to live somewhere other processes can open.
#[derive(Debug)]
pub struct BuildDir {
    // `None` when the caller asked to keep the directory
    inner: Option<TempDir>,
    path: PathBuf,
}

impl BuildDir {
    pub fn create(prefix: &str, keep: bool) -> Result<Self> {
        let tmp = tempfile::Builder::new()
            .prefix(prefix)
            .suffix("-buildd")
            .tempdir()?;
        debug!("build directory: {}", tmp.path().display());

        if keep {
            let path = tmp.keep();
            Ok(BuildDir { inner: None, path })
        } else {
            let path = tmp.path().to_path_buf();
            Ok(BuildDir {
                inner: Some(tmp),
                path,
            })
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether the directory outlives the process.
    pub fn kept(&self) -> bool {
        self.inner.is_none()
    }

    /// Disarms cleanup, leaving whatever has been produced so far on disk.
    /// Used when a failed run should stay inspectable.
    pub fn retain(&mut self) {
        if let Some(tmp) = self.inner.take() {
            drop(tmp.keep());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scoped_dir_is_removed_on_drop() {
        let path = {
            let build = BuildDir::create("kpp-test-", false).unwrap();
            assert!(build.path().is_dir());
            assert!(!build.kept());
            build.path().to_path_buf()
        };
        assert!(!path.exists());
    }

    #[test]
    fn kept_dir_survives_drop() {
        let path = {
            let build = BuildDir::create("kpp-test-", true).unwrap();
            assert!(build.kept());
            build.path().to_path_buf()
        };
        assert!(path.exists());
        std::fs::remove_dir_all(&path).unwrap();
    }

    #[test]
    fn retained_dir_survives_drop() {
        let path = {
            let mut build = BuildDir::create("kpp-test-", false).unwrap();
            build.retain();
            assert!(build.kept());
            build.path().to_path_buf()
        };
        assert!(path.exists());
        std::fs::remove_dir_all(&path).unwrap();
    }

    #[test]
    fn name_carries_prefix_and_suffix() {
        let build = BuildDir::create("ktransw-", false).unwrap();
        let name = build.path().file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("ktransw-"));
        assert!(name.ends_with("-buildd"));
    }
}
