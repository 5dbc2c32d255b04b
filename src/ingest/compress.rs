//! Size-driven JPEG recompression.

use bytes::Bytes;
use image::codecs::jpeg::JpegEncoder;
use image::DynamicImage;

/// Lossy JPEG quality (1-100). Clamped on construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Quality(u8);

impl Quality {
    pub fn new(value: u8) -> Self {
        Self(value.clamp(1, 100))
    }

    pub fn value(self) -> u8 {
        self.0
    }
}

/// Pick a quality for a file of `size` bytes, or `None` when it is at or
/// under `threshold` and should be uploaded as is. The further over the
/// threshold, the lower the quality, bottoming out at 20.
pub fn compression_quality(size: u64, threshold: u64) -> Option<Quality> {
    if size <= threshold {
        return None;
    }
    let quality = if size > threshold.saturating_mul(8) {
        20
    } else if size > threshold.saturating_mul(4) {
        40
    } else if size > threshold.saturating_mul(2) {
        60
    } else {
        80
    };
    Some(Quality::new(quality))
}

/// Bytes ready for upload.
#[derive(Debug, Clone, PartialEq)]
pub struct Payload {
    pub data: Bytes,
    /// True when `data` was re-encoded as JPEG.
    pub reencoded: bool,
}

impl Payload {
    pub fn original(data: Bytes) -> Self {
        Self {
            data,
            reencoded: false,
        }
    }
}

fn encode_jpeg(data: &[u8], quality: Quality) -> Result<Vec<u8>, image::ImageError> {
    let img = image::load_from_memory(data)?;
    // JPEG has no alpha channel.
    let rgb = DynamicImage::ImageRgb8(img.to_rgb8());
    let mut out = Vec::new();
    let encoder = JpegEncoder::new_with_quality(&mut out, quality.value());
    rgb.write_with_encoder(encoder)?;
    Ok(out)
}

/// Recompress `data` if it is over `threshold`. Decoding or encoding
/// failures fall back to the original bytes.
///
/// ```
/// # tokio_test::block_on(async {
/// use avera::ingest::compress_image;
///
/// let small = bytes::Bytes::from_static(b"tiny");
/// let payload = compress_image(small.clone(), 1024).await;
/// assert!(!payload.reencoded);
/// assert_eq!(payload.data, small);
/// # });
/// ```
pub async fn compress_image(data: Bytes, threshold: u64) -> Payload {
    let Some(quality) = compression_quality(data.len() as u64, threshold) else {
        return Payload::original(data);
    };

    let input = data.clone();
    let result = tokio::task::spawn_blocking(move || encode_jpeg(&input, quality)).await;
    match result {
        Ok(Ok(encoded)) => {
            tracing::debug!(
                "Compressed image from {} to {} bytes at quality {}",
                data.len(),
                encoded.len(),
                quality.value()
            );
            Payload {
                data: Bytes::from(encoded),
                reencoded: true,
            }
        }
        Ok(Err(e)) => {
            tracing::warn!("Image compression failed, uploading original: {}", e);
            Payload::original(data)
        }
        Err(e) => {
            tracing::warn!("Image compression task failed, uploading original: {}", e);
            Payload::original(data)
        }
    }
}
