//! Thumbnail derivation.
//!
//! A thumbnail is a cache artifact: a pure function of the original bytes and
//! the maximum dimension, stored beside the original at [`thumbnail_key`].

use std::io::Cursor;
use std::path::Path;

use bytes::Bytes;
use image::{DynamicImage, GenericImageView, ImageFormat};

use crate::error::{AppError, Result};

/// Derived image bytes and their MIME type
#[derive(Debug, Clone)]
pub struct Thumbnail {
    pub data: Bytes,
    pub mime_type: &'static str,
}

/// Storage key of the cached thumbnail for an original key
pub fn thumbnail_key(key: &str) -> String {
    format!("{}.thumb", key)
}

/// Detect the encoding from magic bytes, falling back to the filename's
/// extension ("jpg" and "jpeg" both map to JPEG).
pub fn detect_format(data: &[u8], filename_hint: Option<&str>) -> Option<ImageFormat> {
    image::guess_format(data).ok().or_else(|| {
        filename_hint
            .and_then(|name| Path::new(name).extension())
            .and_then(ImageFormat::from_extension)
    })
}

/// MIME type for raw image bytes, if they are a recognizable image
pub fn sniff_mime(data: &[u8]) -> Option<&'static str> {
    image::guess_format(data).ok().map(|f| f.to_mime_type())
}

/// Downsample so neither side exceeds `max_dimension`, keeping the aspect
/// ratio, and re-encode in the original format. Images already within bounds
/// are re-encoded at their own size.
pub fn make_thumbnail(
    data: &[u8],
    max_dimension: u32,
    filename_hint: Option<&str>,
) -> Result<Thumbnail> {
    if max_dimension == 0 {
        return Err(AppError::Validation(
            "Thumbnail dimension must be positive".to_string(),
        ));
    }

    let format = detect_format(data, filename_hint)
        .ok_or_else(|| AppError::Validation("Unrecognized image format".to_string()))?;

    let original = image::load_from_memory_with_format(data, format)
        .map_err(|e| AppError::Validation(format!("Failed to decode image: {}", e)))?;

    let (width, height) = original.dimensions();
    let resized: DynamicImage = if width <= max_dimension && height <= max_dimension {
        original
    } else {
        original.thumbnail(max_dimension, max_dimension)
    };

    let mut out = Cursor::new(Vec::new());
    resized
        .write_to(&mut out, format)
        .map_err(|e| AppError::Validation(format!("Failed to encode thumbnail: {}", e)))?;

    Ok(Thumbnail {
        data: Bytes::from(out.into_inner()),
        mime_type: format.to_mime_type(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    fn encoded(width: u32, height: u32, format: ImageFormat) -> Vec<u8> {
        let img = RgbImage::from_fn(width, height, |x, y| Rgb([(x % 255) as u8, (y % 255) as u8, 90]));
        let mut out = Cursor::new(Vec::new());
        DynamicImage::ImageRgb8(img).write_to(&mut out, format).unwrap();
        out.into_inner()
    }

    #[test]
    fn test_thumbnail_key() {
        assert_eq!(thumbnail_key("uploads/abc/cat.png"), "uploads/abc/cat.png.thumb");
    }

    #[test]
    fn test_wide_png_keeps_aspect_ratio() {
        let thumb = make_thumbnail(&encoded(800, 400, ImageFormat::Png), 400, None).unwrap();
        assert_eq!(thumb.mime_type, "image/png");
        let decoded = image::load_from_memory(&thumb.data).unwrap();
        assert_eq!(decoded.dimensions(), (400, 200));
    }

    #[test]
    fn test_tall_jpeg_stays_jpeg() {
        let thumb = make_thumbnail(&encoded(300, 900, ImageFormat::Jpeg), 300, Some("x.jpg")).unwrap();
        assert_eq!(thumb.mime_type, "image/jpeg");
        let decoded = image::load_from_memory(&thumb.data).unwrap();
        assert_eq!(decoded.dimensions(), (100, 300));
    }

    #[test]
    fn test_small_image_is_not_upscaled() {
        let thumb = make_thumbnail(&encoded(120, 80, ImageFormat::Png), 400, None).unwrap();
        let decoded = image::load_from_memory(&thumb.data).unwrap();
        assert_eq!(decoded.dimensions(), (120, 80));
    }

    #[test]
    fn test_derivation_is_deterministic() {
        let original = encoded(640, 480, ImageFormat::Png);
        let a = make_thumbnail(&original, 128, None).unwrap();
        let b = make_thumbnail(&original, 128, None).unwrap();
        assert_eq!(a.data, b.data);
    }

    #[test]
    fn test_non_image_is_rejected() {
        let err = make_thumbnail(b"definitely not an image", 400, Some("notes.txt")).unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[test]
    fn test_detect_format_from_extension() {
        assert_eq!(detect_format(b"", Some("photo.JPG")), Some(ImageFormat::Jpeg));
        assert_eq!(detect_format(b"", Some("photo.jpeg")), Some(ImageFormat::Jpeg));
        assert_eq!(detect_format(b"", None), None);
    }
}
