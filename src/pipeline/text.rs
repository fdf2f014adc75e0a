//! Text-layer extraction for the digital answer key.
//!
//! The key is a typed document, so its embedded text is read directly; no
//! rasterisation or model call is involved.

use crate::error::GraderError;
use crate::output::UploadedPdf;
use crate::pipeline::engine::{open_document, with_pdfium};
use crate::pipeline::input::validate_pdf;
use pdfium_render::prelude::*;
use tracing::{debug, info, warn};

/// Text read from a digital PDF.
#[derive(Debug, Clone)]
pub struct ExtractedText {
    pub text: String,
    pub page_count: usize,
    /// 1-indexed pages whose text could not be read.
    pub unreadable_pages: Vec<usize>,
}

/// Extract the text of every page, each followed by a newline.
///
/// # Errors
/// - [`GraderError::NotAPdf`]: the bytes are not a PDF
/// - [`GraderError::CorruptPdf`]: pdfium cannot parse the document
/// - [`GraderError::EmptyDocument`]: the document has zero pages
/// - [`GraderError::NoExtractableText`]: no page yielded any text
pub async fn extract_text(upload: &UploadedPdf) -> Result<ExtractedText, GraderError> {
    validate_pdf(upload)?;
    let name = upload.file_name.clone();
    let bytes = upload.bytes.clone();

    tokio::task::spawn_blocking(move || {
        with_pdfium(|pdfium| extract_text_blocking(pdfium, &name, &bytes))
    })
    .await
    .map_err(|e| GraderError::Internal(format!("Text extraction task panicked: {}", e)))?
}

/// Blocking implementation of text extraction.
pub fn extract_text_blocking(
    pdfium: &Pdfium,
    name: &str,
    bytes: &[u8],
) -> Result<ExtractedText, GraderError> {
    let document = open_document(pdfium, name, bytes)?;
    let pages = document.pages();
    let page_count = pages.len() as usize;

    if page_count == 0 {
        return Err(GraderError::EmptyDocument {
            name: name.to_string(),
        });
    }

    let mut text = String::new();
    let mut unreadable_pages = Vec::new();

    for (idx, page) in pages.iter().enumerate() {
        match page.text() {
            Ok(page_text) => {
                let page_text = page_text.all();
                if !page_text.trim().is_empty() {
                    text.push_str(&page_text);
                    text.push('\n');
                }
                debug!("{}: page {} → {} chars", name, idx + 1, page_text.len());
            }
            Err(e) => {
                warn!(
                    "Warning: could not extract text from page {} of '{}': {:?}",
                    idx + 1,
                    name,
                    e
                );
                unreadable_pages.push(idx + 1);
            }
        }
    }

    if text.trim().is_empty() {
        return Err(GraderError::NoExtractableText {
            name: name.to_string(),
        });
    }

    info!(
        "Extracted {} chars from {} pages of '{}'",
        text.len(),
        page_count,
        name
    );

    Ok(ExtractedText {
        text,
        page_count,
        unreadable_pages,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::engine::pdfium_available;

    /// Run `f` against pdfium, or skip the test when no library is installed.
    macro_rules! with_pdfium_or_skip {
        ($f:expr) => {{
            if !pdfium_available() {
                println!("SKIP: pdfium library not available");
                return;
            }
            with_pdfium($f)
        }};
    }

    #[tokio::test]
    async fn non_pdf_is_rejected_before_parsing() {
        let upload = UploadedPdf::new("key.docx", b"PK\x03\x04rest".to_vec());
        let err = extract_text(&upload).await.unwrap_err();
        assert!(matches!(err, GraderError::NotAPdf { .. }), "got: {err:?}");
    }

    #[test]
    fn zero_page_pdf_is_a_domain_error() {
        let result = with_pdfium_or_skip!(|pdfium: &Pdfium| {
            let bytes = pdfium
                .create_new_pdf()
                .and_then(|doc| doc.save_to_bytes())
                .expect("create empty PDF");
            extract_text_blocking(pdfium, "empty.pdf", &bytes)
        });

        let err = result.unwrap_err();
        assert!(
            matches!(err, GraderError::EmptyDocument { ref name } if name == "empty.pdf"),
            "got: {err:?}"
        );
    }

    #[test]
    fn blank_page_has_no_extractable_text() {
        let result = with_pdfium_or_skip!(|pdfium: &Pdfium| {
            let bytes = {
                let mut doc = pdfium.create_new_pdf().expect("new pdf");
                doc.pages_mut()
                    .create_page_at_end(PdfPagePaperSize::a4())
                    .expect("add page");
                doc.save_to_bytes().expect("save")
            };
            extract_text_blocking(pdfium, "blank.pdf", &bytes)
        });

        let err = result.unwrap_err();
        assert!(matches!(err, GraderError::NoExtractableText { .. }), "got: {err:?}");
    }

    #[test]
    fn garbage_after_magic_is_corrupt() {
        let result = with_pdfium_or_skip!(|pdfium: &Pdfium| {
            extract_text_blocking(pdfium, "bad.pdf", b"%PDF-1.4 not really")
        });

        let err = result.unwrap_err();
        assert!(matches!(err, GraderError::CorruptPdf { .. }), "got: {err:?}");
    }
}
