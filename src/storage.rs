// SPDX-License-Identifier: MPL-2.0

//! File and gallery collaborators
//!
//! Filenames follow `prefix_<yyyyMMddHHmmssSSS>.<ext>`. Writes never replace
//! an existing file.

use crate::constants::file_formats;
use crate::errors::{CaptureError, CaptureResult};
use chrono::NaiveDateTime;
use std::fs::OpenOptions;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// Millisecond timestamp token, 24-hour clock
pub fn timestamp_token(at: NaiveDateTime) -> String {
    at.format(file_formats::TIMESTAMP_FORMAT).to_string()
}

/// Suggested filename for a product written at `at`
pub fn suggest_filename(prefix: &str, at: NaiveDateTime, extension: &str) -> String {
    format!("{}_{}.{}", prefix, timestamp_token(at), extension)
}

/// Persists encoded bytes under a suggested filename
pub trait PhotoStore: Send + Sync {
    /// Write `data` as `filename`, returning the final path
    ///
    /// Fails with `TargetExists` without writing if the path is taken.
    fn persist(&self, data: &[u8], filename: &str) -> CaptureResult<PathBuf>;
}

/// External media index (gallery) registration
pub trait MediaIndexer: Send + Sync {
    fn register(&self, path: &Path, mime_type: &str) -> CaptureResult<()>;
}

/// Indexer that only records the registration in the log
#[derive(Debug, Default, Clone, Copy)]
pub struct LogMediaIndexer;

impl MediaIndexer for LogMediaIndexer {
    fn register(&self, path: &Path, mime_type: &str) -> CaptureResult<()> {
        info!(path = %path.display(), mime_type, "Registered with media index");
        Ok(())
    }
}

/// Store rooted at a directory on the local filesystem
#[derive(Debug, Clone)]
pub struct FsPhotoStore {
    root: PathBuf,
}

impl FsPhotoStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

/// Create `path` and write `data`, refusing to clobber an existing file
pub fn write_new(path: &Path, data: &[u8]) -> CaptureResult<()> {
    let mut file = match OpenOptions::new().write(true).create_new(true).open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == ErrorKind::AlreadyExists => {
            return Err(CaptureError::TargetExists(path.to_path_buf()));
        }
        Err(e) => return Err(e.into()),
    };
    file.write_all(data)?;
    file.sync_all()?;
    Ok(())
}

impl PhotoStore for FsPhotoStore {
    fn persist(&self, data: &[u8], filename: &str) -> CaptureResult<PathBuf> {
        std::fs::create_dir_all(&self.root)?;
        let path = self.root.join(filename);
        debug!(path = %path.display(), size = data.len(), "Persisting capture");
        write_new(&path, data)?;
        info!(path = %path.display(), "Capture saved");
        Ok(path)
    }
}

/// Persist on the blocking pool
pub async fn persist_async(
    store: Arc<dyn PhotoStore>,
    data: Vec<u8>,
    filename: String,
) -> CaptureResult<PathBuf> {
    tokio::task::spawn_blocking(move || store.persist(&data, &filename))
        .await
        .map_err(|e| CaptureError::Io(format!("save task error: {}", e)))?
}
