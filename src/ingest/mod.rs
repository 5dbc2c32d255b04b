//! Image ingestion: pick images for a post, then compress, upload and
//! resolve public URLs for the whole batch.

pub mod compress;

use bytes::Bytes;
use futures::future::try_join_all;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::backend::ObjectStorage;
use crate::db::models::ImageList;
use crate::error::{AppError, AppResult};

pub use compress::{compress_image, compression_quality, Payload, Quality};

/// A post holds at most this many images.
pub const MAX_IMAGES: usize = 3;

/// Folder inside the bucket that post images are uploaded to.
const IMAGE_FOLDER: &str = "images";

/// Append `picked` to `current`, or reject the whole batch when the result
/// would hold more than `max` images.
pub fn select_images<T: Clone>(current: &[T], picked: &[T], max: usize) -> AppResult<Vec<T>> {
    if current.len() + picked.len() > max {
        return Err(AppError::ImageLimitExceeded { max });
    }
    Ok(current.iter().chain(picked).cloned().collect())
}

/// Bucket object name for a local file: a unique prefix plus the file's
/// base name, with a `.jpg` extension when the bytes were re-encoded.
pub fn object_name(source: &Path, reencoded: bool) -> String {
    let base = source
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "image".to_string());
    let base = if reencoded {
        Path::new(&base)
            .with_extension("jpg")
            .to_string_lossy()
            .into_owned()
    } else {
        base
    };
    format!("{}/{}_{}", IMAGE_FOLDER, uuid::Uuid::now_v7(), base)
}

pub struct ImageIngestor {
    storage: Arc<dyn ObjectStorage>,
    threshold: u64,
}

impl ImageIngestor {
    /// Files larger than `threshold` bytes are recompressed before upload.
    pub fn new(storage: Arc<dyn ObjectStorage>, threshold: u64) -> Self {
        Self { storage, threshold }
    }

    /// Upload every image and return their public URLs in input order.
    ///
    /// All or nothing: if any image fails, no list is returned. Objects
    /// already uploaded for the batch are left in the bucket.
    pub async fn ingest(&self, images: &[PathBuf]) -> AppResult<ImageList> {
        let urls = try_join_all(images.iter().map(|path| self.ingest_one(path))).await?;
        tracing::info!("Uploaded {} image(s)", urls.len());
        Ok(ImageList::new(urls))
    }

    async fn ingest_one(&self, source: &Path) -> AppResult<String> {
        let data = Bytes::from(tokio::fs::read(source).await?);
        let payload = compress_image(data, self.threshold).await;

        let name = object_name(source, payload.reencoded);
        let content_type = mime_guess::from_path(&name).first_or_octet_stream();

        self.storage
            .upload(&name, payload.data, content_type.essence_str())
            .await?;
        let url = self.storage.public_url(&name)?;
        tracing::debug!("Uploaded {} as {}", source.display(), name);
        Ok(url)
    }
}
