//! Page rasterisation: render every page of an in-memory PDF to an image.
//!
//! pdfium is a blocking C library, so all work runs on
//! `tokio::task::spawn_blocking` under [`with_pdfium`].
//!
//! Pages are scaled by `dpi / 72` and then capped at `max_rendered_pixels`
//! on the longest edge, so an oversized scan cannot blow up memory or the
//! request body sent to the model.
//!
//! A page that fails to render does not fail the document; its error is
//! returned in place of the image and the caller decides what to skip.

use crate::config::GradingConfig;
use crate::error::GraderError;
use crate::output::UploadedPdf;
use crate::pipeline::engine::{open_document, with_pdfium};
use crate::pipeline::input::validate_pdf;
use image::DynamicImage;
use pdfium_render::prelude::*;
use tracing::{debug, info, warn};

/// Every page of a document, rendered or not.
#[derive(Debug)]
pub struct RenderedDocument {
    pub page_count: usize,
    /// `(page_num_1based, image or render error)` in page order.
    pub pages: Vec<(usize, Result<DynamicImage, String>)>,
}

impl RenderedDocument {
    /// Number of pages that produced an image.
    pub fn rendered(&self) -> usize {
        self.pages.iter().filter(|(_, r)| r.is_ok()).count()
    }
}

/// Rasterise all pages of `upload`.
///
/// # Errors
/// - [`GraderError::NotAPdf`] / [`GraderError::CorruptPdf`]: unreadable input
/// - [`GraderError::EmptyDocument`]: the document has zero pages
pub async fn render_pages(
    upload: &UploadedPdf,
    config: &GradingConfig,
) -> Result<RenderedDocument, GraderError> {
    validate_pdf(upload)?;
    let name = upload.file_name.clone();
    let bytes = upload.bytes.clone();
    let dpi = config.dpi;
    let max_pixels = config.max_rendered_pixels;

    tokio::task::spawn_blocking(move || {
        with_pdfium(|pdfium| render_pages_blocking(pdfium, &name, &bytes, dpi, max_pixels))
    })
    .await
    .map_err(|e| GraderError::Internal(format!("Render task panicked: {}", e)))?
}

/// Blocking implementation of page rendering.
pub fn render_pages_blocking(
    pdfium: &Pdfium,
    name: &str,
    bytes: &[u8],
    dpi: u32,
    max_pixels: u32,
) -> Result<RenderedDocument, GraderError> {
    let document = open_document(pdfium, name, bytes)?;
    let pages = document.pages();
    let page_count = pages.len() as usize;

    if page_count == 0 {
        return Err(GraderError::EmptyDocument {
            name: name.to_string(),
        });
    }
    info!("'{}' loaded: {} pages", name, page_count);

    let render_config = PdfRenderConfig::new()
        .scale_page_by_factor(dpi as f32 / 72.0)
        .set_maximum_width(max_pixels as i32)
        .set_maximum_height(max_pixels as i32);

    let mut rendered = Vec::with_capacity(page_count);
    for (idx, page) in pages.iter().enumerate() {
        let page_num = idx + 1;
        match page.render_with_config(&render_config) {
            Ok(bitmap) => {
                let image = bitmap.as_image();
                debug!(
                    "{}: rendered page {} → {}x{} px",
                    name,
                    page_num,
                    image.width(),
                    image.height()
                );
                rendered.push((page_num, Ok(image)));
            }
            Err(e) => {
                warn!("{}: could not render page {}: {:?}", name, page_num, e);
                rendered.push((page_num, Err(format!("{:?}", e))));
            }
        }
    }

    Ok(RenderedDocument {
        page_count,
        pages: rendered,
    })
}
