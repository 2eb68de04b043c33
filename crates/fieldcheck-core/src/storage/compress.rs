//! Upload-time image compression.
//!
//! Durable copies keep full quality; this only runs on the bytes about to be
//! transmitted.

use std::io::Cursor;

use image::{codecs::jpeg::JpegEncoder, DynamicImage, GenericImageView};

use crate::{Error, Result};

/// Bounds applied to photos right before upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompressionOptions {
    /// Longest allowed edge in pixels.
    pub max_dimension: u32,
    /// JPEG quality for the re-encoded image.
    pub jpeg_quality: u8,
}

impl Default for CompressionOptions {
    fn default() -> Self {
        Self {
            max_dimension: 1280,
            jpeg_quality: 70,
        }
    }
}

/// Re-encoded photo ready for a multipart part.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompressedImage {
    pub bytes: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

impl CompressedImage {
    pub const MIME_TYPE: &'static str = "image/jpeg";
}

/// Resize to fit `max_dimension` (never upscaling) and re-encode as JPEG.
pub fn compress_for_upload(source_bytes: &[u8], options: CompressionOptions) -> Result<CompressedImage> {
    if source_bytes.is_empty() {
        return Err(Error::Image("Photo bytes cannot be empty".to_string()));
    }
    if options.max_dimension == 0 {
        return Err(Error::InvalidInput(
            "Photo max dimension must be greater than zero".to_string(),
        ));
    }

    let source = image::load_from_memory(source_bytes)
        .map_err(|error| Error::Image(format!("Failed to decode photo for upload: {error}")))?;

    let (source_width, source_height) = source.dimensions();
    let resized = if source_width <= options.max_dimension && source_height <= options.max_dimension
    {
        source
    } else {
        source.thumbnail(options.max_dimension, options.max_dimension)
    };
    let (width, height) = resized.dimensions();

    let rgb = DynamicImage::ImageRgb8(resized.to_rgb8());
    let mut cursor = Cursor::new(Vec::new());
    let mut encoder = JpegEncoder::new_with_quality(&mut cursor, options.jpeg_quality.clamp(1, 100));
    encoder
        .encode_image(&rgb)
        .map_err(|error| Error::Image(format!("Failed to encode JPEG photo: {error}")))?;

    Ok(CompressedImage {
        bytes: cursor.into_inner(),
        width,
        height,
    })
}

/// Swap a file name's extension for `.jpg` after re-encoding.
pub fn jpeg_file_name(file_name: &str) -> String {
    let stem = file_name
        .rsplit_once('.')
        .map_or(file_name, |(stem, _)| stem)
        .trim();
    let stem = if stem.is_empty() { "photo" } else { stem };
    format!("{stem}.jpg")
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use image::{ImageBuffer, ImageFormat, Rgba};

    pub(crate) fn source_png(width: u32, height: u32) -> Vec<u8> {
        let image = ImageBuffer::<Rgba<u8>, Vec<u8>>::from_fn(width, height, |x, y| {
            Rgba([(x % 255) as u8, (y % 255) as u8, 180, 255])
        });

        let mut cursor = Cursor::new(Vec::new());
        DynamicImage::ImageRgba8(image)
            .write_to(&mut cursor, ImageFormat::Png)
            .unwrap();
        cursor.into_inner()
    }

    #[test]
    fn compress_bounds_longest_edge_and_preserves_ratio() {
        let source = source_png(2000, 1000);
        let result = compress_for_upload(
            &source,
            CompressionOptions {
                max_dimension: 400,
                jpeg_quality: 60,
            },
        )
        .unwrap();

        assert_eq!(result.width, 400);
        assert_eq!(result.height, 200);
        assert_eq!(&result.bytes[..2], &[0xFF, 0xD8]);
    }

    #[test]
    fn compress_does_not_upscale_small_images() {
        let source = source_png(64, 32);
        let result = compress_for_upload(&source, CompressionOptions::default()).unwrap();
        assert_eq!((result.width, result.height), (64, 32));
    }

    #[test]
    fn compress_rejects_invalid_source() {
        let err = compress_for_upload(b"not-an-image", CompressionOptions::default()).unwrap_err();
        match err {
            Error::Image(message) => assert!(message.contains("decode")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn jpeg_file_name_replaces_extension() {
        assert_eq!(jpeg_file_name("door_0.png"), "door_0.jpg");
        assert_eq!(jpeg_file_name("IMG_1"), "IMG_1.jpg");
        assert_eq!(jpeg_file_name(".png"), "photo.jpg");
    }
}
