//! Durable photo storage and upload-time image processing.

mod compress;
mod promoter;

pub use compress::{compress_for_upload, jpeg_file_name, CompressedImage, CompressionOptions};
pub use promoter::PhotoPromoter;

#[cfg(test)]
pub(crate) use compress::tests::source_png;
