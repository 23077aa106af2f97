use std::io::Cursor;

use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, RgbImage};

use crate::error::{PipelineError, Result};

pub const JPEG_QUALITY: u8 = 90;

/// Resize straight to a `size` x `size` square, ignoring aspect ratio.
pub fn to_canonical(img: &DynamicImage, size: u32) -> RgbImage {
    img.resize_exact(size, size, FilterType::Triangle).to_rgb8()
}

/// Encode an RGB image as JPEG.
pub fn encode_jpeg(img: &RgbImage) -> Result<Vec<u8>> {
    let mut buf = Cursor::new(Vec::new());
    JpegEncoder::new_with_quality(&mut buf, JPEG_QUALITY).encode_image(img)?;
    Ok(buf.into_inner())
}

/// Decode an uploaded or client-echoed image.
pub fn decode_image(bytes: &[u8]) -> Result<DynamicImage> {
    if bytes.is_empty() {
        return Err(PipelineError::InvalidInput("image payload is empty".to_string()));
    }
    image::load_from_memory(bytes)
        .map_err(|e| PipelineError::InvalidInput(format!("could not decode image: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn test_canonical_resize_ignores_aspect_ratio() {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(300, 120, Rgb([10, 20, 30])));
        let resized = to_canonical(&img, 256);
        assert_eq!(resized.dimensions(), (256, 256));
    }

    #[test]
    fn test_jpeg_encode_decode() {
        let img = RgbImage::from_pixel(64, 48, Rgb([200, 100, 50]));
        let jpeg = encode_jpeg(&img).unwrap();
        let decoded = decode_image(&jpeg).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (64, 48));
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(matches!(decode_image(b""), Err(PipelineError::InvalidInput(_))));
        assert!(matches!(decode_image(b"not an image"), Err(PipelineError::InvalidInput(_))));
    }
}
