//! Image encoding: `DynamicImage` → RGB PNG → base64.
//!
//! The same base64 string feeds both the multimodal request (as
//! [`ImageData`]) and the results page (as a `data:` URL), so a page is
//! encoded once.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use edgequake_llm::ImageData;
use image::DynamicImage;
use std::io::Cursor;
use tracing::debug;

/// A page encoded for the model and for display.
#[derive(Debug, Clone)]
pub struct EncodedPage {
    pub image: ImageData,
    pub png_base64: String,
}

/// Encode a rendered page as a base64 PNG.
///
/// Alpha is dropped first: scans are opaque and some vision backends reject
/// RGBA input.
pub fn encode_page(img: &DynamicImage) -> Result<EncodedPage, image::ImageError> {
    let rgb = DynamicImage::ImageRgb8(img.to_rgb8());
    let mut buf = Vec::new();
    rgb.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)?;

    let b64 = STANDARD.encode(&buf);
    debug!("Encoded {}x{} page → {} bytes base64", rgb.width(), rgb.height(), b64.len());

    Ok(EncodedPage {
        image: ImageData::new(b64.clone(), "image/png"),
        png_base64: b64,
    })
}
