//! Image encoding: rendered pages → JPEG bytes → base64 data URIs.
//!
//! Scans of handwriting are photographic; JPEG keeps two 2× pages per
//! request well below API upload limits where PNG would not. Alpha is
//! dropped before encoding since JPEG has no alpha channel.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::codecs::jpeg::JpegEncoder;
use image::DynamicImage;
use tracing::debug;

/// Media type of every stored page.
pub const JPEG_MIME: &str = "image/jpeg";

/// Encode a rendered page as JPEG at `quality` (1–100).
pub fn encode_jpeg(img: &DynamicImage, quality: u8) -> Result<Vec<u8>, image::ImageError> {
    let rgb = DynamicImage::ImageRgb8(img.to_rgb8());
    let mut buf = Vec::new();
    let encoder = JpegEncoder::new_with_quality(&mut buf, quality.clamp(1, 100));
    rgb.write_with_encoder(encoder)?;
    Ok(buf)
}

/// A base64-encoded image ready to embed in a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedImage {
    pub mime_type: &'static str,
    /// Standard base64 of the image bytes, no line breaks.
    pub data: String,
}

impl EncodedImage {
    /// Base64-wrap stored JPEG bytes.
    pub fn from_jpeg(bytes: &[u8]) -> Self {
        let data = STANDARD.encode(bytes);
        debug!("Encoded image → {} bytes base64", data.len());
        Self {
            mime_type: JPEG_MIME,
            data,
        }
    }

    /// `data:<mime>;base64,<data>` form used by chat-completions APIs.
    pub fn data_uri(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, self.data)
    }
}
