//! Temporary-artifact guard for a single run.
//!
//! [`ScratchSpace`] owns every transient file a run creates: the per-page
//! JPEGs and the intermediate PDF. Dropping it removes them, including on
//! early `?` returns and unwinding.

use crate::error::SplitError;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::{debug, warn};

/// Owns the temporary files of one run and deletes them on drop.
#[derive(Debug)]
pub struct ScratchSpace {
    image_dir: PathBuf,
    // Kept alive for its Drop; `None` when the caller chose the directory.
    _temp_dir: Option<TempDir>,
    tracked: Vec<PathBuf>,
}

impl ScratchSpace {
    /// Prepare a place for page images.
    ///
    /// With `work_dir = None` a private temporary directory is created and
    /// removed wholesale on drop. With an explicit directory it is created if
    /// needed and only tracked files are removed; the directory itself stays.
    pub fn new(work_dir: Option<&Path>) -> Result<Self, SplitError> {
        match work_dir {
            Some(dir) => {
                fs::create_dir_all(dir).map_err(|e| SplitError::WorkDirFailed {
                    path: dir.to_path_buf(),
                    source: e,
                })?;
                Ok(Self {
                    image_dir: dir.to_path_buf(),
                    _temp_dir: None,
                    tracked: Vec::new(),
                })
            }
            None => {
                let temp_dir = tempfile::Builder::new()
                    .prefix("pdfsplit-")
                    .tempdir()
                    .map_err(|e| SplitError::WorkDirFailed {
                        path: std::env::temp_dir(),
                        source: e,
                    })?;
                Ok(Self {
                    image_dir: temp_dir.path().to_path_buf(),
                    _temp_dir: Some(temp_dir),
                    tracked: Vec::new(),
                })
            }
        }
    }

    /// Directory page images should be written to.
    pub fn image_dir(&self) -> &Path {
        &self.image_dir
    }

    /// Path for the rendered image of source page `page_num` (1-indexed).
    pub fn page_image_path(&self, page_num: usize) -> PathBuf {
        self.image_dir.join(format!("temp_page_{page_num}.jpg"))
    }

    /// Register a file for removal when the guard drops.
    ///
    /// Register before the file is written so a failure half-way through
    /// still cleans up.
    pub fn track(&mut self, path: impl Into<PathBuf>) {
        let path = path.into();
        if !self.tracked.contains(&path) {
            self.tracked.push(path);
        }
    }

    /// Files currently registered for removal.
    pub fn tracked(&self) -> &[PathBuf] {
        &self.tracked
    }
}

impl Drop for ScratchSpace {
    fn drop(&mut self) {
        for path in self.tracked.drain(..) {
            match fs::remove_file(&path) {
                Ok(()) => debug!("Removed temporary file {}", path.display()),
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => warn!("Failed to remove temporary file {}: {}", path.display(), e),
            }
        }
    }
}
