//! Local preview handles for selected images.
//!
//! A preview is a temporary on-disk copy of the selected file that a host can
//! open in a viewer before (or without) uploading anything. It lives exactly
//! as long as the [`PreviewHandle`]: releasing or dropping the handle removes
//! the file, so replacing a selection never leaks the old copy.

use crate::error::SvgrError;
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;
use tracing::debug;

/// A temporary file backing the preview of one selected image.
#[derive(Debug)]
pub struct PreviewHandle {
    file: NamedTempFile,
}

impl PreviewHandle {
    /// Write `bytes` to a fresh temp file whose extension matches `extension`.
    pub fn allocate(bytes: &[u8], extension: &str) -> Result<Self, SvgrError> {
        let suffix = format!(".{}", extension.trim_start_matches('.'));
        let mut file = tempfile::Builder::new()
            .prefix("svgr-preview-")
            .suffix(&suffix)
            .tempfile()
            .map_err(|e| SvgrError::Internal(format!("preview tempfile: {e}")))?;
        file.write_all(bytes)
            .and_then(|_| file.flush())
            .map_err(|e| SvgrError::Internal(format!("preview write: {e}")))?;
        debug!("Allocated preview {}", file.path().display());
        Ok(Self { file })
    }

    /// Path a viewer can open.
    pub fn path(&self) -> &Path {
        self.file.path()
    }

    /// Remove the backing file now instead of waiting for drop.
    pub fn release(self) {
        let path = self.file.path().to_path_buf();
        match self.file.close() {
            Ok(()) => debug!("Released preview {}", path.display()),
            Err(e) => debug!("Preview {} already gone: {}", path.display(), e),
        }
    }
}
