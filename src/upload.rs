//! Scoped on-disk copy of an uploaded document.
//!
//! The file lives exactly as long as its [`TemporaryUpload`]: `close` removes it
//! on the normal path and `Drop` removes it on every other one (early return,
//! error, panic unwinding, cancelled request future).

use crate::error::ProcessingError;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, warn};

#[derive(Debug)]
pub struct TemporaryUpload {
    file: NamedTempFile,
    size: usize,
}

impl TemporaryUpload {
    /// Write `data` to a uniquely named `.pdf` file in `dir` (system temp dir
    /// when `None`).
    pub async fn create(dir: Option<PathBuf>, data: Vec<u8>) -> Result<Self, ProcessingError> {
        tokio::task::spawn_blocking(move || Self::create_blocking(dir.as_deref(), &data))
            .await
            .map_err(|e| ProcessingError::Internal(format!("Upload writer task failed: {}", e)))?
    }

    fn create_blocking(dir: Option<&Path>, data: &[u8]) -> Result<Self, ProcessingError> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("report-").suffix(".pdf");
        let mut file = match dir {
            Some(dir) => builder.tempfile_in(dir)?,
            None => builder.tempfile()?,
        };
        file.write_all(data)?;
        file.flush()?;
        debug!("Wrote temporary upload {:?} ({} bytes)", file.path(), data.len());
        Ok(Self {
            file,
            size: data.len(),
        })
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Delete the file now, reporting failures instead of swallowing them.
    pub fn close(self) {
        let path = self.file.path().to_path_buf();
        match self.file.close() {
            Ok(()) => debug!("Cleaned up temporary file: {:?}", path),
            Err(e) => warn!("Failed to clean up temporary file {:?}: {}", path, e),
        }
    }
}
