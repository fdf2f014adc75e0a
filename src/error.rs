//! Error types for the pdf-autograder library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`GraderError`]: **Fatal** for the document being processed: the bytes
//!   are not a PDF, the answer key has no text, the model provider is not
//!   configured. For the answer key this stops the whole run; for a student
//!   submission it is recorded on that submission and the batch continues.
//!
//! * [`PageError`]: **Non-fatal**: a single handwritten page failed (render
//!   glitch, transient API error) but the other pages are fine. Stored inside
//!   [`crate::output::PageResult`] so the transcription keeps every page that
//!   could be read.

use thiserror::Error;

/// All fatal errors returned by the pdf-autograder library.
#[derive(Debug, Error)]
pub enum GraderError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// No file was supplied where one is required.
    #[error("No {what} was uploaded")]
    MissingUpload { what: String },

    /// The uploaded bytes do not start with the `%PDF` signature.
    #[error("'{name}' is not a valid PDF (first bytes: {magic:?})")]
    NotAPdf { name: String, magic: Vec<u8> },

    // ── PDF errors ────────────────────────────────────────────────────────
    /// pdfium could not parse the document.
    #[error("Error reading PDF file '{name}': {detail}")]
    CorruptPdf { name: String, detail: String },

    /// The document parsed but contains no pages.
    #[error("PDF file '{name}' contains no pages")]
    EmptyDocument { name: String },

    /// Every page was readable but none produced any text.
    #[error("No text could be extracted from '{name}'")]
    NoExtractableText { name: String },

    // ── Model errors ──────────────────────────────────────────────────────
    /// The configured provider is not initialised (missing API key etc.).
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    /// The model returned an error for a whole-document request (comparison).
    #[error("LLM API error: {message}")]
    LlmApiError { message: String },

    /// Every handwritten page failed; there is nothing to grade.
    #[error("All {total} pages of '{name}' failed after {retries} retries each.\nFirst error: {first_error}")]
    AllPagesFailed {
        name: String,
        total: usize,
        retries: u32,
        first_error: String,
    },

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not write a report file.
    #[error("Failed to write report '{path}': {source}")]
    ReportWriteFailed {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// CSV serialisation failed.
    #[error("Failed to build CSV report: {0}")]
    Csv(#[from] csv::Error),

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Pdfium binding errors ─────────────────────────────────────────────
    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\n\
Install libpdfium for your platform, or set PDFIUM_LIB_PATH=/path/to/libpdfium\n\
(either the library file itself or the directory containing it).\n"
    )]
    PdfiumBindingFailed(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// A non-fatal error for a single handwritten page.
#[derive(Debug, Clone, Error, serde::Serialize, serde::Deserialize)]
pub enum PageError {
    /// Page rasterisation failed.
    #[error("Page {page}: rasterisation failed: {detail}")]
    RenderFailed { page: usize, detail: String },

    /// PNG encoding of the rendered page failed.
    #[error("Page {page}: image encoding failed: {detail}")]
    EncodeFailed { page: usize, detail: String },

    /// LLM call failed after retries.
    #[error("Page {page}: LLM call failed after {retries} retries: {detail}")]
    LlmFailed {
        page: usize,
        retries: u8,
        detail: String,
    },

    /// LLM call timed out on every attempt.
    #[error("Page {page}: LLM call timed out after {secs}s")]
    Timeout { page: usize, secs: u64 },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_names_the_file() {
        let e = GraderError::EmptyDocument {
            name: "key.pdf".into(),
        };
        assert_eq!(e.to_string(), "PDF file 'key.pdf' contains no pages");
    }

    #[test]
    fn all_pages_failed_display() {
        let e = GraderError::AllPagesFailed {
            name: "alice.pdf".into(),
            total: 3,
            retries: 2,
            first_error: "quota exceeded".into(),
        };
        let msg = e.to_string();
        assert!(msg.contains("All 3 pages"), "got: {msg}");
        assert!(msg.contains("alice.pdf"));
        assert!(msg.contains("quota exceeded"));
    }

    #[test]
    fn page_error_display() {
        let e = PageError::Timeout { page: 4, secs: 60 };
        assert_eq!(e.to_string(), "Page 4: LLM call timed out after 60s");
    }

    #[test]
    fn page_error_roundtrips_through_json() {
        let e = PageError::LlmFailed {
            page: 2,
            retries: 3,
            detail: "503".into(),
        };
        let json = serde_json::to_string(&e).unwrap();
        let back: PageError = serde_json::from_str(&json).unwrap();
        assert_eq!(back.to_string(), e.to_string());
    }
}
