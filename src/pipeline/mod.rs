//! Pipeline stages for grading one batch.
//!
//! Each submodule implements exactly one step, so each is testable on its own
//! and [`crate::grade`] only wires them together.
//!
//! ## Data Flow
//!
//! ```text
//!                ┌─▶ text ───────────────────────────────▶ key text
//! input ─▶ engine┤
//!                └─▶ render ─▶ encode ─▶ ocr ─▶ postprocess ─▶ transcript
//!                                                   │
//!                              key text + transcript ─▶ compare ─▶ analysis
//! ```
//!
//! 1. [`input`]: validate uploads and derive student names
//! 2. [`engine`]: bind pdfium and open documents from memory
//! 3. [`text`]: read the text layer of the digital answer key
//! 4. [`render`]: rasterise pages; runs in `spawn_blocking` because pdfium
//!    is not async-safe
//! 5. [`encode`]: RGB PNG + base64 for the multimodal request body
//! 6. [`ocr`]: one model call per handwritten page, failures skipped
//! 7. [`postprocess`]: deterministic cleanup of model transcriptions
//! 8. [`compare`]: the grading call that produces the analysis narrative

pub mod compare;
pub mod encode;
pub mod engine;
pub mod input;
pub mod ocr;
pub mod postprocess;
pub mod render;
pub mod text;
