//! Image normalization and encoding.
//!
//! Everything the pipeline does to pixels lives here: re-encoding source
//! photos to JPEG for the model, and fitting styled output onto the fixed
//! delivery frame. Decode and encode run on the blocking pool; the async
//! entry points are thin `spawn_blocking` wrappers.

use std::io::Cursor;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use image::ImageFormat;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use thiserror::Error;

/// JPEG quality used when re-encoding source photos for the model.
pub const JPEG_QUALITY: u8 = 85;

#[derive(Debug, Error)]
pub enum ImagingError {
    #[error("failed to decode image: {0}")]
    Decode(String),
    #[error("failed to encode image: {0}")]
    Encode(String),
    #[error("image task aborted: {0}")]
    TaskAborted(String),
}

/// Fixed output dimensions every delivered artifact is fitted to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputFrame {
    pub width: u32,
    pub height: u32,
}

impl Default for OutputFrame {
    fn default() -> Self {
        // 3:4 portrait, the shape the booth prints.
        Self {
            width: 1080,
            height: 1440,
        }
    }
}

impl OutputFrame {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

/// Fit an image onto the frame: scale preserving aspect ratio until the frame
/// is covered, center-crop the overflow, encode as PNG.
pub async fn normalize(bytes: Vec<u8>, frame: OutputFrame) -> Result<Vec<u8>, ImagingError> {
    tokio::task::spawn_blocking(move || normalize_blocking(&bytes, frame))
        .await
        .map_err(|e| ImagingError::TaskAborted(e.to_string()))?
}

pub fn normalize_blocking(bytes: &[u8], frame: OutputFrame) -> Result<Vec<u8>, ImagingError> {
    let image = image::load_from_memory(bytes).map_err(|e| ImagingError::Decode(e.to_string()))?;
    let framed = image.resize_to_fill(frame.width, frame.height, FilterType::Lanczos3);
    let mut out = Cursor::new(Vec::new());
    framed
        .write_to(&mut out, ImageFormat::Png)
        .map_err(|e| ImagingError::Encode(e.to_string()))?;
    Ok(out.into_inner())
}

/// Re-encode an image as base64 JPEG for transport to the model.
pub async fn to_jpeg_base64(bytes: Vec<u8>, quality: u8) -> Result<String, ImagingError> {
    tokio::task::spawn_blocking(move || to_jpeg_base64_blocking(&bytes, quality))
        .await
        .map_err(|e| ImagingError::TaskAborted(e.to_string()))?
}

pub fn to_jpeg_base64_blocking(bytes: &[u8], quality: u8) -> Result<String, ImagingError> {
    let image = image::load_from_memory(bytes).map_err(|e| ImagingError::Decode(e.to_string()))?;
    // JPEG has no alpha channel.
    let rgb = image.to_rgb8();
    let mut out = Cursor::new(Vec::new());
    let encoder = JpegEncoder::new_with_quality(&mut out, quality);
    rgb.write_with_encoder(encoder)
        .map_err(|e| ImagingError::Encode(e.to_string()))?;
    Ok(BASE64.encode(out.into_inner()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, Rgb, RgbImage, Rgba, RgbaImage};

    fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let img = RgbImage::from_pixel(width, height, Rgb([120, 30, 200]));
        let mut out = Cursor::new(Vec::new());
        DynamicImage::ImageRgb8(img)
            .write_to(&mut out, ImageFormat::Png)
            .unwrap();
        out.into_inner()
    }

    #[test]
    fn test_normalize_crops_landscape_to_frame() {
        let frame = OutputFrame::new(50, 100);
        let out = normalize_blocking(&png_bytes(400, 100), frame).unwrap();
        let decoded = image::load_from_memory(&out).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (50, 100));
    }

    #[test]
    fn test_normalize_upscales_small_input() {
        let frame = OutputFrame::new(50, 100);
        let out = normalize_blocking(&png_bytes(10, 10), frame).unwrap();
        let decoded = image::load_from_memory(&out).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (50, 100));
    }

    #[test]
    fn test_normalize_emits_png() {
        let out = normalize_blocking(&png_bytes(80, 60), OutputFrame::new(40, 40)).unwrap();
        assert_eq!(image::guess_format(&out).unwrap(), ImageFormat::Png);
    }

    #[test]
    fn test_normalize_rejects_garbage() {
        let err = normalize_blocking(b"not an image", OutputFrame::default()).unwrap_err();
        assert!(matches!(err, ImagingError::Decode(_)));
    }

    #[test]
    fn test_jpeg_base64_round_trips_dimensions() {
        let encoded = to_jpeg_base64_blocking(&png_bytes(64, 48), JPEG_QUALITY).unwrap();
        let jpeg = BASE64.decode(encoded).unwrap();
        assert_eq!(image::guess_format(&jpeg).unwrap(), ImageFormat::Jpeg);
        let decoded = image::load_from_memory(&jpeg).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (64, 48));
    }

    #[test]
    fn test_jpeg_base64_flattens_alpha() {
        let img = RgbaImage::from_pixel(32, 32, Rgba([255, 0, 0, 128]));
        let mut src = Cursor::new(Vec::new());
        DynamicImage::ImageRgba8(img)
            .write_to(&mut src, ImageFormat::Png)
            .unwrap();
        let encoded = to_jpeg_base64_blocking(&src.into_inner(), JPEG_QUALITY).unwrap();
        assert!(BASE64.decode(encoded).is_ok());
    }

    #[tokio::test]
    async fn test_async_wrappers_delegate() {
        let frame = OutputFrame::new(20, 20);
        let out = normalize(png_bytes(100, 100), frame).await.unwrap();
        let decoded = image::load_from_memory(&out).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (20, 20));

        let encoded = to_jpeg_base64(png_bytes(10, 10), JPEG_QUALITY).await.unwrap();
        assert!(!encoded.is_empty());
    }
}
