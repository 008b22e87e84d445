//! Image encoding: `DynamicImage` → base64 PNG wrapped in `ImageData`.
//!
//! The vision endpoint receives each unit of work twice, once per
//! [`ImageDetail`]. PNG keeps glyph edges lossless; JPEG artefacts on small
//! print measurably hurt OCR.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use edgequake_llm::ImageData;
use image::DynamicImage;
use std::io::Cursor;
use tracing::debug;

/// Resolution hint sent with an encoded image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageDetail {
    Low,
    High,
}

impl ImageDetail {
    fn as_str(&self) -> &'static str {
        match self {
            ImageDetail::Low => "low",
            ImageDetail::High => "high",
        }
    }
}

/// Encode an RGB image as a base64 PNG ready for the endpoint.
pub fn encode_image(
    img: &DynamicImage,
    detail: ImageDetail,
) -> Result<ImageData, image::ImageError> {
    let rgb = DynamicImage::ImageRgb8(img.to_rgb8());
    let mut buf = Vec::new();
    rgb.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)?;

    let b64 = STANDARD.encode(&buf);
    debug!(
        "Encoded {}x{} image → {} bytes base64 ({})",
        img.width(),
        img.height(),
        b64.len(),
        detail.as_str()
    );

    Ok(ImageData::new(b64, "image/png").with_detail(detail.as_str()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    #[test]
    fn encode_small_image_as_png() {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(10, 10, Rgba([255, 0, 0, 255])));
        let data = encode_image(&img, ImageDetail::High).expect("encode should succeed");
        assert_eq!(data.mime_type, "image/png");

        let decoded = STANDARD.decode(&data.data).expect("valid base64");
        let back = image::load_from_memory(&decoded).expect("valid png");
        assert_eq!((back.width(), back.height()), (10, 10));
    }
}
