//! Image blob persistence
//!
//! Notes only ever hold an opaque reference to their rendered image; the
//! store behind that reference is injected. Production uses the local
//! filesystem under the data dir, dev/degraded mode inlines the bytes as
//! a data URI. Deletion is best-effort at the call sites: a leaked blob
//! is recoverable, a blocked note removal is not.

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use std::path::PathBuf;
use sticky_common::{Error, Result};
use tracing::debug;

/// Blob storage port
#[async_trait]
pub trait ImageStore: Send + Sync {
    /// Persist image bytes under a caller-chosen key, returning the
    /// durable reference stored on the note.
    async fn save(&self, bytes: &[u8], content_type: &str, key: &str) -> Result<String>;

    /// Release the blob behind a previously returned reference
    async fn delete(&self, image_url: &str) -> Result<()>;
}

/// Filesystem store serving uploads from a public URL prefix
pub struct LocalImageStore {
    root: PathBuf,
    public_prefix: String,
}

impl LocalImageStore {
    pub fn new(root: PathBuf, public_prefix: String) -> Self {
        Self {
            root,
            public_prefix: public_prefix.trim_end_matches('/').to_string(),
        }
    }

    fn file_name(content_type: &str, key: &str) -> String {
        let ext = match content_type {
            "image/png" => "png",
            "image/jpeg" => "jpg",
            "image/gif" => "gif",
            "image/webp" => "webp",
            _ => "bin",
        };
        format!("{}.{}", key, ext)
    }
}

#[async_trait]
impl ImageStore for LocalImageStore {
    async fn save(&self, bytes: &[u8], content_type: &str, key: &str) -> Result<String> {
        tokio::fs::create_dir_all(&self.root)
            .await
            .map_err(|e| Error::Upload(format!("cannot create upload dir: {}", e)))?;

        let file_name = Self::file_name(content_type, key);
        let path = self.root.join(&file_name);
        tokio::fs::write(&path, bytes)
            .await
            .map_err(|e| Error::Upload(format!("cannot write {}: {}", path.display(), e)))?;

        debug!(path = %path.display(), size = bytes.len(), "stored image");
        Ok(format!("{}/{}", self.public_prefix, file_name))
    }

    async fn delete(&self, image_url: &str) -> Result<()> {
        let Some(file_name) = image_url.rsplit('/').next() else {
            return Err(Error::Upload(format!("unrecognized image url: {}", image_url)));
        };
        let path = self.root.join(file_name);
        tokio::fs::remove_file(&path)
            .await
            .map_err(|e| Error::Upload(format!("cannot remove {}: {}", path.display(), e)))?;
        Ok(())
    }
}

/// Inline store for dev/degraded mode: the "reference" is the image
/// itself as a data URI, so there is nothing to release on delete.
pub struct DataUriImageStore;

#[async_trait]
impl ImageStore for DataUriImageStore {
    async fn save(&self, bytes: &[u8], content_type: &str, _key: &str) -> Result<String> {
        Ok(format!("data:{};base64,{}", content_type, BASE64.encode(bytes)))
    }

    async fn delete(&self, _image_url: &str) -> Result<()> {
        Ok(())
    }
}
