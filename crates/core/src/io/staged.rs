//! Staged, atomic file writes
//!
//! Writers never touch the final path directly. Output goes to a
//! process-unique temp file next to the target and is renamed into place
//! on commit; a failed or cancelled write leaves the final path untouched.

use std::collections::HashMap;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::process;
use std::sync::{Arc, Mutex, OnceLock};

use tracing::debug;

use crate::error::{Error, Result};

/// A temp file destined for a final path.
///
/// Dropping without [`commit`](StagedWriter::commit) removes the temp file.
#[derive(Debug)]
pub struct StagedWriter {
    final_path: PathBuf,
    tmp_path: PathBuf,
    committed: bool,
}

impl StagedWriter {
    pub fn begin(final_path: impl Into<PathBuf>) -> Result<Self> {
        let final_path = final_path.into();
        if let Some(parent) = final_path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let mut tmp_name = final_path
            .file_name()
            .ok_or_else(|| Error::Write {
                path: final_path.clone(),
                reason: "Path has no file name".to_string(),
            })?
            .to_os_string();
        tmp_name.push(format!(".tmp.{}", process::id()));
        let tmp_path = final_path.with_file_name(tmp_name);
        Ok(StagedWriter {
            final_path,
            tmp_path,
            committed: false,
        })
    }

    /// Open the temp file for writing
    pub fn create(&self) -> Result<File> {
        File::create(&self.tmp_path).map_err(|e| Error::Write {
            path: self.final_path.clone(),
            reason: e.to_string(),
        })
    }

    pub fn tmp_path(&self) -> &Path {
        &self.tmp_path
    }

    pub fn final_path(&self) -> &Path {
        &self.final_path
    }

    /// Move the temp file onto the final path
    pub fn commit(mut self) -> Result<PathBuf> {
        fs::rename(&self.tmp_path, &self.final_path).map_err(|e| Error::Write {
            path: self.final_path.clone(),
            reason: e.to_string(),
        })?;
        self.committed = true;
        debug!(path = %self.final_path.display(), "committed output");
        Ok(self.final_path.clone())
    }
}

impl Drop for StagedWriter {
    fn drop(&mut self) {
        if !self.committed && self.tmp_path.exists() {
            let _ = fs::remove_file(&self.tmp_path);
        }
    }
}

/// Process-wide registry serializing writers that target the same path
#[derive(Debug, Default)]
pub struct PathLocks {
    inner: Mutex<HashMap<PathBuf, Arc<Mutex<()>>>>,
}

impl PathLocks {
    /// The mutex guarding a canonical output path
    pub fn for_path(&self, path: &Path) -> Arc<Mutex<()>> {
        let key = path
            .canonicalize()
            .unwrap_or_else(|_| path.to_path_buf());
        let mut map = self.inner.lock().unwrap();
        Arc::clone(map.entry(key).or_default())
    }
}

/// The shared per-process lock registry
pub fn path_locks() -> &'static PathLocks {
    static LOCKS: OnceLock<PathLocks> = OnceLock::new();
    LOCKS.get_or_init(PathLocks::default)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_commit_moves_into_place() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("out.txt");
        let staged = StagedWriter::begin(&target).unwrap();
        staged.create().unwrap().write_all(b"data").unwrap();
        assert!(!target.exists());
        staged.commit().unwrap();
        assert_eq!(fs::read(&target).unwrap(), b"data");
    }

    #[test]
    fn test_drop_without_commit_cleans_up() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("out.txt");
        let tmp_path;
        {
            let staged = StagedWriter::begin(&target).unwrap();
            staged.create().unwrap().write_all(b"half").unwrap();
            tmp_path = staged.tmp_path().to_path_buf();
            assert!(tmp_path.exists());
        }
        assert!(!tmp_path.exists());
        assert!(!target.exists());
    }

    #[test]
    fn test_path_locks_shared_per_path() {
        let locks = PathLocks::default();
        let a = locks.for_path(Path::new("/tmp/geoprep-lock-test"));
        let b = locks.for_path(Path::new("/tmp/geoprep-lock-test"));
        assert!(Arc::ptr_eq(&a, &b));
        let c = locks.for_path(Path::new("/tmp/geoprep-lock-other"));
        assert!(!Arc::ptr_eq(&a, &c));
    }
}
