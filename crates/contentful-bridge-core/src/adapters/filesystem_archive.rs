//! # Filesystem Archive Adapter
//!
//! Local filesystem implementation of [`ArchiveStorage`] for development.
//! Blobs land at `{base}/{container}/{name}`.

use crate::archive::{ArchiveError, ArchiveStorage};
use async_trait::async_trait;
use bytes::Bytes;
use std::path::{Path, PathBuf};
use tokio::{fs, io::AsyncWriteExt};
use tracing::debug;

#[cfg(test)]
#[path = "filesystem_archive_tests.rs"]
mod tests;

/// Filesystem-based archive storage
///
/// ```no_run
/// use contentful_bridge_core::adapters::FilesystemArchive;
/// use std::path::PathBuf;
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let archive = FilesystemArchive::new(PathBuf::from("./data/archive")).await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct FilesystemArchive {
    base_path: PathBuf,
}

impl FilesystemArchive {
    /// Create archive rooted at `base_path`, creating the directory if needed
    ///
    /// # Errors
    ///
    /// Returns error if the base directory cannot be created.
    pub async fn new(base_path: PathBuf) -> Result<Self, ArchiveError> {
        fs::create_dir_all(&base_path)
            .await
            .map_err(|e| ArchiveError::Io {
                message: format!("Failed to create base directory: {}", e),
            })?;

        Ok(Self { base_path })
    }

    /// Root directory of the archive
    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    fn blob_path(&self, container: &str, name: &str) -> Result<PathBuf, ArchiveError> {
        for part in [container, name] {
            if part.is_empty() || part.contains(['/', '\\']) || part == "." || part == ".." {
                return Err(ArchiveError::Configuration {
                    message: format!("Invalid archive path component: '{}'", part),
                });
            }
        }
        Ok(self.base_path.join(container).join(name))
    }
}

#[async_trait]
impl ArchiveStorage for FilesystemArchive {
    async fn put_blob(
        &self,
        container: &str,
        name: &str,
        payload: Bytes,
    ) -> Result<Option<String>, ArchiveError> {
        let blob_path = self.blob_path(container, name)?;

        if let Some(parent) = blob_path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| ArchiveError::Io {
                    message: format!("Failed to create container directory: {}", e),
                })?;
        }

        // Write then rename so readers never see a partial blob
        let temp_path = blob_path.with_file_name(format!("{}.tmp", name));
        if let Err(e) = write_then_rename(&temp_path, &blob_path, &payload).await {
            let _ = fs::remove_file(&temp_path).await;
            return Err(e);
        }

        debug!(path = %blob_path.display(), size = payload.len(), "Wrote archive blob");
        Ok(None)
    }
}

async fn write_then_rename(
    temp_path: &Path,
    blob_path: &Path,
    payload: &[u8],
) -> Result<(), ArchiveError> {
    let mut file = fs::File::create(temp_path)
        .await
        .map_err(|e| ArchiveError::Io {
            message: format!("Failed to create temp file: {}", e),
        })?;

    file.write_all(payload)
        .await
        .map_err(|e| ArchiveError::Io {
            message: format!("Failed to write blob: {}", e),
        })?;

    file.flush().await.map_err(|e| ArchiveError::Io {
        message: format!("Failed to flush blob: {}", e),
    })?;
    drop(file);

    fs::rename(temp_path, blob_path)
        .await
        .map_err(|e| ArchiveError::Io {
            message: format!("Failed to finalize blob: {}", e),
        })
}
