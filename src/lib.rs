//! # pdf-autograder
//!
//! Grade handwritten answer sheets against a typed answer key with a
//! multimodal model.
//!
//! An instructor supplies one digital answer-key PDF and any number of
//! scanned student PDFs. The key's text layer is read directly; every
//! student page is rasterised and transcribed by the model; the model then
//! compares each transcript with the key and writes a question-by-question
//! analysis ending in a `Total Score` line, which is scraped into a score.
//!
//! ## Pipeline Overview
//!
//! ```text
//! answer key ─▶ pdfium text layer ─────────────────────────────┐
//!                                                               ▼
//! student PDF ─▶ render ─▶ PNG/base64 ─▶ model OCR per page ─▶ compare ─▶ score
//!                                                               │
//!                           HTML results · grading_results.txt · student_scores.csv
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use pdf_autograder::{grade, GradingConfig, UploadedPdf};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Gemini by default; reads GEMINI_API_KEY.
//!     let config = GradingConfig::default();
//!     let key = UploadedPdf::new("key.pdf", std::fs::read("key.pdf")?);
//!     let alice = UploadedPdf::new("alice.pdf", std::fs::read("alice.pdf")?);
//!
//!     let report = grade(&key, &[alice], None, &config).await?;
//!     for s in &report.submissions {
//!         println!("{}: {}", s.name, s.score());
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `autograder` binary (clap + anyhow + indicatif + tracing-subscriber) |

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod error;
pub mod grade;
pub mod model;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod report;
pub mod score;
pub mod web;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{GradingConfig, GradingConfigBuilder, DEFAULT_MODEL, DEFAULT_PROVIDER};
pub use error::{GraderError, PageError};
pub use grade::grade;
pub use model::{GenerativeModel, ModelRequest, ModelResponse, ProviderModel};
pub use output::{
    AnswerKey, GradingReport, GradingStats, PageImage, PageResult, StudentSubmission, UploadedPdf,
};
pub use progress::{
    GradingProgressCallback, LogProgressCallback, NoopProgressCallback, ProgressCallback,
};
pub use report::{csv_report, text_report, write_reports, CSV_REPORT_FILE, TEXT_REPORT_FILE};
pub use score::{clean_score, display_score, extract_score, NO_SCORE};
pub use web::{build_router, start_server, AppState, ServerConfig};
