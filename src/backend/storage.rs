use async_trait::async_trait;
use bytes::Bytes;
use std::path::{Component, Path, PathBuf};
use url::Url;

use super::{ObjectStorage, RemoteError};

/// Bucket kept as a directory on disk.
pub struct LocalObjectStorage {
    root: PathBuf,
    public_base: Url,
}

impl LocalObjectStorage {
    /// `public_base` is the URL the bucket directory is served from; when
    /// `None`, objects are addressed with `file://` URLs.
    pub fn new(root: PathBuf, public_base: Option<Url>) -> Result<Self, RemoteError> {
        let public_base = match public_base {
            Some(url) => url,
            None => {
                let absolute = if root.is_absolute() {
                    root.clone()
                } else {
                    std::env::current_dir()?.join(&root)
                };
                Url::from_directory_path(&absolute).map_err(|_| {
                    RemoteError::Unavailable(format!(
                        "storage path is not usable as a URL: {}",
                        absolute.display()
                    ))
                })?
            }
        };
        Ok(Self { root, public_base })
    }

    fn object_path(&self, path: &str) -> Result<PathBuf, RemoteError> {
        let relative = Path::new(path);
        let safe = relative
            .components()
            .all(|c| matches!(c, Component::Normal(_)));
        if !safe {
            return Err(RemoteError::Unavailable(format!(
                "invalid object path: {}",
                path
            )));
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl ObjectStorage for LocalObjectStorage {
    async fn upload(
        &self,
        path: &str,
        data: Bytes,
        content_type: &str,
    ) -> Result<(), RemoteError> {
        let target = self.object_path(path)?;
        if tokio::fs::try_exists(&target).await? {
            return Err(RemoteError::Conflict(format!("object exists: {}", path)));
        }
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&target, &data).await?;
        tracing::debug!("Stored {} ({}, {} bytes)", path, content_type, data.len());
        Ok(())
    }

    fn public_url(&self, path: &str) -> Result<String, RemoteError> {
        self.object_path(path)?;
        let base = if self.public_base.path().ends_with('/') {
            self.public_base.clone()
        } else {
            let mut base = self.public_base.clone();
            base.set_path(&format!("{}/", base.path()));
            base
        };
        base.join(path)
            .map(String::from)
            .map_err(|e| RemoteError::Unavailable(format!("public url for {}: {}", path, e)))
    }
}
