//! Photo capture: data URIs and image files in, base64 payloads out.

use std::io::Cursor;
use std::path::Path;

use base64::Engine;
use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, GenericImageView};
use serde::{Deserialize, Serialize};

use crate::types::{GlitchError, GlitchResult};

/// Maximum upload dimension (width or height).
const MAX_UPLOAD_SIZE: u32 = 1024;

/// JPEG quality for uploads.
const UPLOAD_QUALITY: u8 = 85;

/// A captured photo, ready to be sent inline with a generation request.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhotoPayload {
    pub mime_type: String,
    /// Standard base64, no data-URI prefix.
    pub data: String,
}

impl std::fmt::Debug for PhotoPayload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PhotoPayload")
            .field("mime_type", &self.mime_type)
            .field("data_len", &self.data.len())
            .finish()
    }
}

impl PhotoPayload {
    /// Parse a `data:<mime>;base64,<payload>` URI as produced by a file reader.
    pub fn from_data_uri(uri: &str) -> GlitchResult<Self> {
        let rest = uri
            .trim()
            .strip_prefix("data:")
            .ok_or_else(|| GlitchError::InvalidInput("Not a data URI".to_string()))?;

        let (header, payload) = rest
            .split_once(',')
            .ok_or_else(|| GlitchError::InvalidInput("Data URI has no payload".to_string()))?;

        let mime = header.strip_suffix(";base64").ok_or_else(|| {
            GlitchError::InvalidInput("Data URI is not base64-encoded".to_string())
        })?;
        if !mime.starts_with("image/") {
            return Err(GlitchError::InvalidInput(format!(
                "Unsupported MIME type: {mime}"
            )));
        }

        let payload = payload.trim();
        base64::engine::general_purpose::STANDARD
            .decode(payload)
            .map_err(|e| GlitchError::InvalidInput(format!("Invalid base64: {e}")))?;

        Ok(Self {
            mime_type: mime.to_string(),
            data: payload.to_string(),
        })
    }

    /// Load an image file and normalize it to a downsized JPEG.
    pub fn from_file(path: impl AsRef<Path>) -> GlitchResult<Self> {
        let path = path.as_ref();
        if !is_supported_format(path) {
            return Err(GlitchError::InvalidInput(format!(
                "Unsupported image format: {}",
                path.display()
            )));
        }
        let img = image::open(path)?;
        Self::from_image(&img)
    }

    pub fn from_image(img: &DynamicImage) -> GlitchResult<Self> {
        let bytes = encode_upload_jpeg(img)?;
        Ok(Self {
            mime_type: "image/jpeg".to_string(),
            data: base64::engine::general_purpose::STANDARD.encode(bytes),
        })
    }

    pub fn to_data_uri(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, self.data)
    }
}

/// Encode as JPEG, preserving aspect ratio, max 1024x1024.
fn encode_upload_jpeg(img: &DynamicImage) -> GlitchResult<Vec<u8>> {
    let (w, h) = img.dimensions();

    let scaled = if w > MAX_UPLOAD_SIZE || h > MAX_UPLOAD_SIZE {
        img.resize(
            MAX_UPLOAD_SIZE,
            MAX_UPLOAD_SIZE,
            image::imageops::FilterType::Lanczos3,
        )
    } else {
        img.clone()
    };

    let rgb = scaled.to_rgb8();
    let mut buf = Vec::new();
    let mut cursor = Cursor::new(&mut buf);
    let encoder = JpegEncoder::new_with_quality(&mut cursor, UPLOAD_QUALITY);
    rgb.write_with_encoder(encoder)?;
    tracing::debug!("Encoded photo upload: {w}x{h} -> {} bytes", buf.len());
    Ok(buf)
}

/// Check if a file path points to a supported image format.
pub fn is_supported_format(path: &Path) -> bool {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase();

    matches!(
        ext.as_str(),
        "png" | "jpg" | "jpeg" | "webp" | "gif" | "bmp"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let img = DynamicImage::new_rgb8(width, height);
        let mut buf = Vec::new();
        let encoder = image::codecs::png::PngEncoder::new(&mut buf);
        img.write_with_encoder(encoder).unwrap();
        buf
    }

    #[test]
    fn test_data_uri() {
        let encoded = base64::engine::general_purpose::STANDARD.encode(png_bytes(2, 2));
        let uri = format!("data:image/png;base64,{encoded}");
        let photo = PhotoPayload::from_data_uri(&uri).unwrap();
        assert_eq!(photo.mime_type, "image/png");
        assert_eq!(photo.data, encoded);
        assert_eq!(photo.to_data_uri(), uri);
    }

    #[test]
    fn test_data_uri_rejects_garbage() {
        assert!(PhotoPayload::from_data_uri("image/png;base64,AAAA").is_err());
        assert!(PhotoPayload::from_data_uri("data:image/png;base64").is_err());
        assert!(PhotoPayload::from_data_uri("data:image/png,AAAA").is_err());
        assert!(PhotoPayload::from_data_uri("data:text/plain;base64,AAAA").is_err());
        assert!(PhotoPayload::from_data_uri("data:image/png;base64,@@@@").is_err());
    }

    #[test]
    fn test_from_file_downsizes_to_jpeg() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("box.png");
        std::fs::write(&path, png_bytes(2000, 1000)).unwrap();

        let photo = PhotoPayload::from_file(&path).unwrap();
        assert_eq!(photo.mime_type, "image/jpeg");

        let bytes = base64::engine::general_purpose::STANDARD
            .decode(&photo.data)
            .unwrap();
        let loaded = image::load_from_memory(&bytes).unwrap();
        let (w, h) = loaded.dimensions();
        assert!(w <= MAX_UPLOAD_SIZE);
        assert!(h <= MAX_UPLOAD_SIZE);
    }

    #[test]
    fn test_from_file_rejects_unsupported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rules.pdf");
        std::fs::write(&path, b"%PDF-1.4").unwrap();
        assert!(matches!(
            PhotoPayload::from_file(&path),
            Err(GlitchError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_supported_formats() {
        assert!(is_supported_format(Path::new("box.png")));
        assert!(is_supported_format(Path::new("box.JPG")));
        assert!(is_supported_format(Path::new("box.webp")));
        assert!(!is_supported_format(Path::new("box.txt")));
        assert!(!is_supported_format(Path::new("box")));
    }
}
