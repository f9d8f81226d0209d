//! Filesystem image store.
//!
//! Objects are written atomically (temp file + rename) below a base
//! directory and addressed publicly as `{public_base_url}/{key}`. The API
//! server exposes the same directory under `/images`.

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use petmatch_core::{Error, ImageBlob, ImageStore, Result};

/// Stores uploaded photos on local disk.
#[derive(Debug, Clone)]
pub struct FilesystemImageStore {
    base_path: PathBuf,
    public_base_url: String,
}

impl FilesystemImageStore {
    /// Create a store rooted at `base_path`, serving URLs under `public_base_url`.
    pub fn new(base_path: impl Into<PathBuf>, public_base_url: impl Into<String>) -> Self {
        Self {
            base_path: base_path.into(),
            public_base_url: public_base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// Resolve a key to its on-disk path, rejecting anything that could
    /// escape the base directory.
    pub fn path_for(&self, key: &str) -> Result<PathBuf> {
        let relative = Path::new(key);
        let safe = !key.is_empty()
            && !key.contains('\\')
            && relative
                .components()
                .all(|c| matches!(c, Component::Normal(_)));
        if !safe {
            return Err(Error::InvalidInput(format!("invalid storage key: {}", key)));
        }
        Ok(self.base_path.join(relative))
    }

    pub fn url_for(&self, key: &str) -> String {
        format!("{}/{}", self.public_base_url, key)
    }

    /// Write, read back and delete a probe file so misconfigured storage
    /// fails at startup rather than on the first upload.
    pub async fn validate(&self) -> std::result::Result<(), String> {
        let test_dir = self.base_path.join(".health-check");
        let test_file = test_dir.join("probe.bin");
        let data = b"image-store-health-check";

        fs::create_dir_all(&test_dir)
            .await
            .map_err(|e| format!("create_dir_all({:?}): {}", test_dir, e))?;
        fs::write(&test_file, data)
            .await
            .map_err(|e| format!("write({:?}): {}", test_file, e))?;
        let read_back = fs::read(&test_file)
            .await
            .map_err(|e| format!("read({:?}): {}", test_file, e))?;
        if read_back != data {
            return Err("read-back mismatch".to_string());
        }
        fs::remove_file(&test_file)
            .await
            .map_err(|e| format!("remove_file({:?}): {}", test_file, e))?;
        let _ = fs::remove_dir(&test_dir).await;
        Ok(())
    }
}

#[async_trait]
impl ImageStore for FilesystemImageStore {
    async fn store(&self, key: &str, blob: &ImageBlob) -> Result<String> {
        let full_path = self.path_for(key)?;
        debug!(
            subsystem = "db",
            component = "image_store",
            storage_key = %key,
            size = blob.data.len(),
            "Writing image"
        );

        if let Some(parent) = full_path.parent() {
            fs::create_dir_all(parent).await.map_err(|e| {
                warn!(parent = %parent.display(), error = %e, "image_store: create_dir_all failed");
                e
            })?;
        }

        let temp_path = full_path.with_extension("tmp");
        let mut file = fs::File::create(&temp_path).await?;
        file.write_all(&blob.data).await?;
        file.sync_all().await?;
        drop(file);

        fs::rename(&temp_path, &full_path).await.map_err(|e| {
            warn!(from = %temp_path.display(), to = %full_path.display(), error = %e, "image_store: rename failed");
            e
        })?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&full_path, std::fs::Permissions::from_mode(0o644)).await?;
        }

        Ok(self.url_for(key))
    }

    fn backend_name(&self) -> &'static str {
        "filesystem"
    }
}
