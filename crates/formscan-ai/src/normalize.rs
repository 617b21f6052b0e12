//! Image normalization: turn a captured or selected picture into a
//! base64 payload the model endpoint accepts.

use std::io::Cursor;
use std::path::Path;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{GenericImageView, ImageError, ImageReader};
use thiserror::Error;
use tracing::debug;

const JPEG: &str = "image/jpeg";

#[derive(Debug, Error)]
pub enum NormalizeError {
    #[error("could not read image: {0}")]
    Io(#[from] std::io::Error),

    #[error("not a recognised image format")]
    UnrecognizedFormat,

    #[error("could not decode image: {0}")]
    Decode(#[source] ImageError),

    #[error("could not encode image: {0}")]
    Encode(#[source] ImageError),

    #[error("image worker failed: {0}")]
    Worker(#[from] tokio::task::JoinError),
}

/// How a picture is prepared for transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NormalizeStrategy {
    /// Send the file bytes as-is with their own media type.
    PassThrough,
    /// Shrink anything wider than `max_width` (aspect preserved) and
    /// re-encode as JPEG at `quality` (1-100).
    Downscale { max_width: u32, quality: u8 },
}

impl Default for NormalizeStrategy {
    fn default() -> Self {
        Self::Downscale {
            max_width: 1600,
            quality: 85,
        }
    }
}

/// Transport-ready image: base64 data plus its declared media type.
#[derive(Clone, PartialEq, Eq)]
pub struct ImagePayload {
    pub data: String,
    pub media_type: String,
    pub width: u32,
    pub height: u32,
}

impl std::fmt::Debug for ImagePayload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImagePayload")
            .field("data", &format_args!("<{} base64 chars>", self.data.len()))
            .field("media_type", &self.media_type)
            .field("width", &self.width)
            .field("height", &self.height)
            .finish()
    }
}

impl ImagePayload {
    pub fn decoded_bytes(&self) -> Result<Vec<u8>, base64::DecodeError> {
        STANDARD.decode(&self.data)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ImageNormalizer {
    strategy: NormalizeStrategy,
}

impl ImageNormalizer {
    pub fn new(strategy: NormalizeStrategy) -> Self {
        Self { strategy }
    }

    pub fn pass_through() -> Self {
        Self::new(NormalizeStrategy::PassThrough)
    }

    pub fn downscale(max_width: u32, quality: u8) -> Self {
        Self::new(NormalizeStrategy::Downscale {
            max_width: max_width.max(1),
            quality: quality.clamp(1, 100),
        })
    }

    pub fn strategy(&self) -> NormalizeStrategy {
        self.strategy
    }

    /// Normalize in-memory image bytes. Fails if they are not a decodable image.
    pub fn normalize(&self, bytes: &[u8]) -> Result<ImagePayload, NormalizeError> {
        let payload = match self.strategy {
            NormalizeStrategy::PassThrough => pass_through(bytes)?,
            NormalizeStrategy::Downscale { max_width, quality } => {
                downscale(bytes, max_width, quality)?
            }
        };
        debug!(
            media_type = %payload.media_type,
            width = payload.width,
            height = payload.height,
            encoded_len = payload.data.len(),
            "normalized image"
        );
        Ok(payload)
    }

    /// Read a file and normalize it off the async executor.
    pub async fn normalize_file(&self, path: &Path) -> Result<ImagePayload, NormalizeError> {
        let bytes = tokio::fs::read(path).await?;
        let normalizer = *self;
        tokio::task::spawn_blocking(move || normalizer.normalize(&bytes)).await?
    }
}

fn pass_through(bytes: &[u8]) -> Result<ImagePayload, NormalizeError> {
    let reader = ImageReader::new(Cursor::new(bytes)).with_guessed_format()?;
    let format = reader.format().ok_or(NormalizeError::UnrecognizedFormat)?;
    // A full decode catches truncated bodies behind a valid header.
    let (width, height) = reader.decode().map_err(NormalizeError::Decode)?.dimensions();

    Ok(ImagePayload {
        data: STANDARD.encode(bytes),
        media_type: format.to_mime_type().to_string(),
        width,
        height,
    })
}

fn downscale(bytes: &[u8], max_width: u32, quality: u8) -> Result<ImagePayload, NormalizeError> {
    let decoded = image::load_from_memory(bytes).map_err(NormalizeError::Decode)?;
    let (width, height) = decoded.dimensions();

    let image = if width > max_width {
        let scaled_height = (height as f64 * max_width as f64 / width as f64).round().max(1.0) as u32;
        decoded.resize_exact(max_width, scaled_height, FilterType::Triangle)
    } else {
        decoded
    };

    // JPEG has no alpha channel.
    let rgb = image.to_rgb8();
    drop(image);

    let mut encoded = Vec::new();
    JpegEncoder::new_with_quality(&mut encoded, quality)
        .encode_image(&rgb)
        .map_err(NormalizeError::Encode)?;

    Ok(ImagePayload {
        data: STANDARD.encode(&encoded),
        media_type: JPEG.to_string(),
        width: rgb.width(),
        height: rgb.height(),
    })
}
