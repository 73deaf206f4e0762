//! Request-scoped temporary files.
//!
//! Every temporary artifact the pipeline materializes (a staged upload, a
//! preprocessed image, a rasterized PDF page) lives in the service temp
//! directory under a unique name and is removed when its [`ScratchFile`]
//! guard drops, on success and failure alike.

use std::path::{Path, PathBuf};

use uuid::Uuid;

/// Owned temporary file path, deleted on drop.
#[derive(Debug)]
pub struct ScratchFile {
    path: PathBuf,
}

impl ScratchFile {
    /// Reserve a unique path in `dir`. The file itself is created by
    /// whoever writes to the path; dropping the guard removes it if
    /// present.
    pub fn allocate(dir: &Path, tag: &str, ext: &str) -> Self {
        let ext = ext.trim_start_matches('.');
        let name = format!("{}_{}.{}", tag, Uuid::new_v4().simple(), ext);
        Self {
            path: dir.join(name),
        }
    }

    /// Reserve a unique path and write `bytes` to it.
    pub async fn with_bytes(
        dir: &Path,
        tag: &str,
        ext: &str,
        bytes: &[u8],
    ) -> std::io::Result<Self> {
        let file = Self::allocate(dir, tag, ext);
        tokio::fs::write(&file.path, bytes).await?;
        Ok(file)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Path with the extension stripped, for tools that append their own.
    pub fn stem_path(&self) -> PathBuf {
        self.path.with_extension("")
    }
}

impl Drop for ScratchFile {
    fn drop(&mut self) {
        if let Err(err) = std::fs::remove_file(&self.path) {
            if err.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!("failed to remove scratch file {:?}: {}", self.path, err);
            }
        }
    }
}
