use image::imageops::FilterType;
use image::ImageFormat;
use std::io::Cursor;
use thiserror::Error;
use tracing::debug;

/// Longest edge of a derived thumbnail, in pixels
pub const THUMBNAIL_MAX_EDGE: u32 = 100;

#[derive(Debug, Error)]
pub enum ThumbnailError {
    #[error("failed to decode image")]
    Decode(#[source] image::ImageError),
    #[error("failed to encode thumbnail")]
    Encode(#[source] image::ImageError),
}

/// Derive a JPEG thumbnail from an encoded source image.
///
/// The source is decoded, resized so its longer edge is at most
/// [`THUMBNAIL_MAX_EDGE`] pixels while preserving aspect ratio (Lanczos3
/// resampling), and re-encoded as JPEG. A source already within the bound is
/// re-encoded at its original dimensions, never upscaled. Deterministic for
/// identical input; output size varies with content.
pub fn make_thumbnail(source: &[u8]) -> Result<Vec<u8>, ThumbnailError> {
    let img = image::load_from_memory(source).map_err(ThumbnailError::Decode)?;

    let thumb = if img.width() <= THUMBNAIL_MAX_EDGE && img.height() <= THUMBNAIL_MAX_EDGE {
        img
    } else {
        img.resize(THUMBNAIL_MAX_EDGE, THUMBNAIL_MAX_EDGE, FilterType::Lanczos3)
    };

    let mut buf = Cursor::new(Vec::new());
    thumb
        .write_to(&mut buf, ImageFormat::Jpeg)
        .map_err(ThumbnailError::Encode)?;

    debug!(
        source_bytes = source.len(),
        thumbnail_bytes = buf.get_ref().len(),
        width = thumb.width(),
        height = thumb.height(),
        "Thumbnail derived"
    );

    Ok(buf.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbImage;

    fn encode_png(width: u32, height: u32) -> Vec<u8> {
        let img = RgbImage::from_fn(width, height, |x, y| {
            image::Rgb([(x % 256) as u8, (y % 256) as u8, 128])
        });
        let mut buf = Cursor::new(Vec::new());
        image::DynamicImage::ImageRgb8(img)
            .write_to(&mut buf, ImageFormat::Png)
            .unwrap();
        buf.into_inner()
    }

    #[test]
    fn test_thumbnail_bounds_and_aspect_ratio() {
        let source = encode_png(500, 300);

        let thumb_bytes = make_thumbnail(&source).unwrap();
        let thumb = image::load_from_memory(&thumb_bytes).unwrap();

        // Longer edge bounded, aspect ratio preserved within rounding.
        assert_eq!(thumb.width(), 100);
        assert_eq!(thumb.height(), 60);
    }

    #[test]
    fn test_thumbnail_portrait_source() {
        let source = encode_png(200, 400);

        let thumb_bytes = make_thumbnail(&source).unwrap();
        let thumb = image::load_from_memory(&thumb_bytes).unwrap();

        assert_eq!(thumb.height(), 100);
        assert_eq!(thumb.width(), 50);
    }

    #[test]
    fn test_small_source_not_upscaled() {
        let source = encode_png(40, 20);

        let thumb_bytes = make_thumbnail(&source).unwrap();
        let thumb = image::load_from_memory(&thumb_bytes).unwrap();

        // A source already within the bound keeps its dimensions.
        assert_eq!((thumb.width(), thumb.height()), (40, 20));
    }

    #[test]
    fn test_thumbnail_is_jpeg() {
        let source = encode_png(120, 80);

        let thumb_bytes = make_thumbnail(&source).unwrap();
        assert_eq!(
            image::guess_format(&thumb_bytes).unwrap(),
            ImageFormat::Jpeg
        );
    }

    #[test]
    fn test_corrupt_input_rejected() {
        let err = make_thumbnail(b"definitely not an image").unwrap_err();
        assert!(matches!(err, ThumbnailError::Decode(_)));
    }

    #[test]
    fn test_deterministic_output() {
        let source = encode_png(300, 300);
        assert_eq!(make_thumbnail(&source).unwrap(), make_thumbnail(&source).unwrap());
    }
}
