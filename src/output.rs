//! Result types produced by a grading run.
//!
//! Everything here is plain data, `Serialize` so the CLI can dump it as JSON
//! and the web layer can hand it straight to the templates.

use crate::error::PageError;
use crate::score::{clean_score, display_score, extract_score};
use serde::{Deserialize, Serialize};

/// An uploaded PDF held in memory.
#[derive(Debug, Clone)]
pub struct UploadedPdf {
    /// Original file name as supplied by the browser or CLI.
    pub file_name: String,
    /// Raw bytes.
    pub bytes: Vec<u8>,
}

impl UploadedPdf {
    pub fn new(file_name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            file_name: file_name.into(),
            bytes,
        }
    }
}

/// A rendered page kept for display.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageImage {
    /// 1-indexed page number.
    pub page_num: usize,
    /// Base64-encoded PNG.
    pub png_base64: String,
}

/// Result of transcribing a single handwritten page.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageResult {
    /// 1-indexed page number.
    pub page_num: usize,
    /// Transcribed text; empty when `error` is set.
    pub text: String,
    pub input_tokens: usize,
    pub output_tokens: usize,
    pub duration_ms: u64,
    pub retries: u8,
    pub error: Option<PageError>,
}

/// The processed answer key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnswerKey {
    pub file_name: String,
    pub text: String,
    pub page_count: usize,
    #[serde(default)]
    pub page_images: Vec<PageImage>,
}

/// One student's graded submission.
///
/// `text` and `analysis` stay empty until processing of that student
/// completes; `error` is set instead when it could not.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StudentSubmission {
    pub name: String,
    pub file_name: String,
    /// Transcription of all readable pages, separated by page breaks.
    pub text: String,
    pub pages: Vec<PageResult>,
    /// The model's comparison narrative.
    pub analysis: String,
    #[serde(default)]
    pub page_images: Vec<PageImage>,
    /// Why this submission could not be graded, if it could not.
    pub error: Option<String>,
}

impl StudentSubmission {
    /// Score text scraped from the analysis, or `"N/A"`.
    pub fn score(&self) -> String {
        extract_score(&self.analysis)
    }

    /// Score reduced to digits and slash.
    pub fn clean_score(&self) -> String {
        clean_score(&self.score())
    }

    /// Score truncated for headings.
    pub fn display_score(&self) -> String {
        display_score(&self.score())
    }

    pub fn failed_pages(&self) -> usize {
        self.pages.iter().filter(|p| p.error.is_some()).count()
    }
}

/// Counters for a grading run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GradingStats {
    pub students: usize,
    pub graded_students: usize,
    pub failed_students: usize,
    pub processed_pages: usize,
    pub failed_pages: usize,
    pub total_input_tokens: u64,
    pub total_output_tokens: u64,
    pub total_duration_ms: u64,
}

/// Everything a grading run produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GradingReport {
    pub answer_key: AnswerKey,
    /// In upload order.
    pub submissions: Vec<StudentSubmission>,
    pub stats: GradingStats,
}
