//! Progress-callback trait for grading events.
//!
//! Inject an [`Arc<dyn GradingProgressCallback>`] via
//! [`crate::config::GradingConfigBuilder::progress_callback`] to receive events
//! as the run works through the answer key, each student, and each
//! handwritten page. The CLI drives a terminal progress bar from these; the
//! web server forwards them to the log.

use std::sync::Arc;
use tracing::{info, warn};

/// Called by [`crate::grade::grade`] as it processes a batch.
///
/// Implementations must be `Send + Sync`: pages of one student may be
/// transcribed concurrently, so the page events can arrive from different
/// tasks and out of order. All methods default to no-ops.
pub trait GradingProgressCallback: Send + Sync {
    /// Called once before the answer key is read.
    fn on_batch_start(&self, students: usize) {
        let _ = students;
    }

    /// Called after the answer key text has been extracted.
    fn on_answer_key_ready(&self, page_count: usize, text_len: usize) {
        let _ = (page_count, text_len);
    }

    /// Called once per student before their pages are rendered.
    fn on_student_start(&self, name: &str, index: usize, total: usize) {
        let _ = (name, index, total);
    }

    /// Called when a page of the current student has been transcribed.
    fn on_page_complete(&self, name: &str, page_num: usize, total_pages: usize, text_len: usize) {
        let _ = (name, page_num, total_pages, text_len);
    }

    /// Called when a page of the current student is skipped after all retries.
    fn on_page_error(&self, name: &str, page_num: usize, total_pages: usize, error: &str) {
        let _ = (name, page_num, total_pages, error);
    }

    /// Called when a student is finished, graded or not.
    fn on_student_complete(&self, name: &str, score: &str, error: Option<&str>) {
        let _ = (name, score, error);
    }

    /// Called once after every student has been attempted.
    fn on_batch_complete(&self, students: usize, graded: usize) {
        let _ = (students, graded);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl GradingProgressCallback for NoopProgressCallback {}

/// Forwards every event to `tracing`, one line each.
pub struct LogProgressCallback;

impl GradingProgressCallback for LogProgressCallback {
    fn on_batch_start(&self, students: usize) {
        info!("Grading {} student submission(s)", students);
    }

    fn on_answer_key_ready(&self, page_count: usize, text_len: usize) {
        info!("Answer key: {} pages, {} chars", page_count, text_len);
    }

    fn on_student_start(&self, name: &str, index: usize, total: usize) {
        info!("[{}/{}] Processing {}'s answers", index, total, name);
    }

    fn on_page_complete(&self, name: &str, page_num: usize, total_pages: usize, text_len: usize) {
        info!(
            "{}: page {}/{} transcribed ({} chars)",
            name, page_num, total_pages, text_len
        );
    }

    fn on_page_error(&self, name: &str, page_num: usize, total_pages: usize, error: &str) {
        warn!("{}: page {}/{} skipped: {}", name, page_num, total_pages, error);
    }

    fn on_student_complete(&self, name: &str, score: &str, error: Option<&str>) {
        match error {
            None => info!("{}: score {}", name, score),
            Some(e) => warn!("{}: not graded: {}", name, e),
        }
    }

    fn on_batch_complete(&self, students: usize, graded: usize) {
        info!("Graded {}/{} submissions", graded, students);
    }
}

/// Convenience alias matching the type stored in [`crate::config::GradingConfig`].
pub type ProgressCallback = Arc<dyn GradingProgressCallback>;
