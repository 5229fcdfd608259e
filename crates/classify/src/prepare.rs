//! Image preparation before upload.
//!
//! Screenshots from high-density displays are large; the model only needs a
//! low-detail view. Images are bounded to a maximum dimension and re-encoded
//! as JPEG, which also normalizes formats (and transparency) the service may
//! not accept.

use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;

/// Longest edge, in pixels, of the image sent to the service.
pub const DEFAULT_MAX_DIMENSION: u32 = 1024;
const JPEG_QUALITY: u8 = 85;

/// Decodes `bytes`, downsizes to fit within `max_dimension` (preserving
/// aspect ratio), and re-encodes as RGB JPEG.
///
/// CPU-bound: call from a blocking context.
pub fn prepare_image(bytes: &[u8], max_dimension: u32) -> Result<Vec<u8>> {
    let image = image::load_from_memory(bytes).or_raise(|| ErrorKind::Image)?;
    let image = if image.width().max(image.height()) > max_dimension {
        let resized = image.resize(max_dimension, max_dimension, FilterType::Lanczos3);
        tracing::debug!(width = resized.width(), height = resized.height(), "Resized image for upload");
        resized
    } else {
        image
    };
    let rgb = image.to_rgb8();
    let mut out = Vec::new();
    JpegEncoder::new_with_quality(&mut out, JPEG_QUALITY).encode_image(&rgb).or_raise(|| ErrorKind::Image)?;
    Ok(out)
}
