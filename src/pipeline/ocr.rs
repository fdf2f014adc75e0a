//! Handwriting transcription: one model call per rendered page.
//!
//! Each page image is sent with the OCR prompt. A page whose call still fails
//! after the retries is recorded with its [`PageError`] and left out of the
//! transcript; the other pages carry on.

use crate::config::GradingConfig;
use crate::error::PageError;
use crate::model::{generate_with_retry, CallFailure, GenerativeModel, ModelRequest};
use crate::output::PageResult;
use crate::pipeline::postprocess::clean_transcript;
use crate::prompts::{HANDWRITING_OCR_PROMPT, PAGE_BREAK};
use edgequake_llm::ImageData;
use futures::stream::{self, StreamExt};
use std::sync::Arc;

/// Transcribe a single page.
///
/// Always returns a `PageResult`; callers check `result.error`.
pub async fn transcribe_page(
    model: &Arc<dyn GenerativeModel>,
    student: &str,
    page_num: usize,
    image: ImageData,
    config: &GradingConfig,
) -> PageResult {
    let prompt = config.ocr_prompt.as_deref().unwrap_or(HANDWRITING_OCR_PROMPT);
    let request = ModelRequest::with_image(prompt, image, config);
    let label = format!("{} p{}", student, page_num);

    match generate_with_retry(model, &request, config, &label).await {
        Ok(done) => PageResult {
            page_num,
            text: clean_transcript(&done.response.content),
            input_tokens: done.response.input_tokens,
            output_tokens: done.response.output_tokens,
            duration_ms: done.duration_ms,
            retries: done.retries.min(u8::MAX as u32) as u8,
            error: None,
        },
        Err(failure) => {
            let retries = config.max_retries.min(u8::MAX as u32) as u8;
            let error = match failure {
                CallFailure::TimedOut { secs } => PageError::Timeout {
                    page: page_num,
                    secs,
                },
                CallFailure::Failed { detail } => PageError::LlmFailed {
                    page: page_num,
                    retries,
                    detail,
                },
            };
            PageResult {
                retries,
                ..failed_page(page_num, error)
            }
        }
    }
}

/// A page that never reached the model, or whose call failed.
pub fn failed_page(page_num: usize, error: PageError) -> PageResult {
    PageResult {
        page_num,
        text: String::new(),
        input_tokens: 0,
        output_tokens: 0,
        duration_ms: 0,
        retries: 0,
        error: Some(error),
    }
}

/// Transcribe pages with up to `config.concurrency` calls in flight.
///
/// `pages` holds `(page_num_1based, image)`; `total_pages` is the document
/// page count reported to the progress callback. Results come back sorted by
/// page number.
pub async fn transcribe_pages(
    model: &Arc<dyn GenerativeModel>,
    student: &str,
    pages: Vec<(usize, ImageData)>,
    total_pages: usize,
    config: &GradingConfig,
) -> Vec<PageResult> {
    let mut results: Vec<PageResult> = stream::iter(pages.into_iter().map(|(page_num, image)| {
        let model = Arc::clone(model);
        async move {
            let result = transcribe_page(&model, student, page_num, image, config).await;
            if let Some(ref cb) = config.progress_callback {
                match &result.error {
                    None => cb.on_page_complete(student, page_num, total_pages, result.text.len()),
                    Some(e) => cb.on_page_error(student, page_num, total_pages, &e.to_string()),
                }
            }
            result
        }
    }))
    .buffer_unordered(config.concurrency)
    .collect()
    .await;

    results.sort_by_key(|p| p.page_num);
    results
}

/// Join successful pages in order, each followed by [`PAGE_BREAK`].
pub fn assemble_transcript(pages: &[PageResult]) -> String {
    pages
        .iter()
        .filter(|p| p.error.is_none())
        .fold(String::new(), |mut acc, p| {
            acc.push_str(&p.text);
            acc.push_str(PAGE_BREAK);
            acc
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::testing::ScriptedModel;
    use crate::progress::GradingProgressCallback;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn config() -> GradingConfig {
        GradingConfig::builder()
            .max_retries(1)
            .retry_backoff_ms(1)
            .concurrency(3)
            .build()
            .unwrap()
    }

    fn image() -> ImageData {
        ImageData::new("iVBORw0KGgo=".to_string(), "image/png")
    }

    #[tokio::test]
    async fn page_text_is_cleaned() {
        let scripted = ScriptedModel::new(vec![Ok("```\nQ1. 12\r\n```")], "");
        let model: Arc<dyn GenerativeModel> = scripted.clone();

        let result = transcribe_page(&model, "alice", 1, image(), &config()).await;
        assert!(result.error.is_none());
        assert_eq!(result.text, "Q1. 12");
        assert_eq!(result.input_tokens, 10);

        let seen = scripted.seen.lock().unwrap();
        assert_eq!(seen[0].images.len(), 1);
        assert_eq!(seen[0].text, HANDWRITING_OCR_PROMPT);
    }

    #[tokio::test]
    async fn failed_page_records_llm_error() {
        let scripted = ScriptedModel::new(vec![Err("quota"), Err("quota")], "");
        let model: Arc<dyn GenerativeModel> = scripted.clone();

        let result = transcribe_page(&model, "alice", 2, image(), &config()).await;
        match result.error {
            Some(PageError::LlmFailed { page, retries, ref detail }) => {
                assert_eq!(page, 2);
                assert_eq!(retries, 1);
                assert!(detail.contains("quota"));
            }
            ref other => panic!("unexpected: {other:?}"),
        }
        assert!(result.text.is_empty());
    }

    #[derive(Default)]
    struct Counter {
        ok: AtomicUsize,
        failed: AtomicUsize,
    }

    impl GradingProgressCallback for Counter {
        fn on_page_complete(&self, _: &str, _: usize, _: usize, _: usize) {
            self.ok.fetch_add(1, Ordering::SeqCst);
        }
        fn on_page_error(&self, _: &str, _: usize, _: usize, _: &str) {
            self.failed.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn pages_are_sorted_and_reported() {
        let counter = Arc::new(Counter::default());
        let config = GradingConfig::builder()
            .max_retries(0)
            .concurrency(1)
            .progress_callback(counter.clone())
            .build()
            .unwrap();
        let scripted = ScriptedModel::new(vec![Ok("one"), Err("boom"), Ok("three")], "");
        let model: Arc<dyn GenerativeModel> = scripted.clone();

        let pages = vec![(1, image()), (2, image()), (3, image())];
        let results = transcribe_pages(&model, "bob", pages, 3, &config).await;

        let nums: Vec<usize> = results.iter().map(|p| p.page_num).collect();
        assert_eq!(nums, vec![1, 2, 3]);
        assert!(results[1].error.is_some());
        assert_eq!(counter.ok.load(Ordering::SeqCst), 2);
        assert_eq!(counter.failed.load(Ordering::SeqCst), 1);

        assert_eq!(
            assemble_transcript(&results),
            format!("one{PAGE_BREAK}three{PAGE_BREAK}")
        );
    }

    #[test]
    fn transcript_of_no_pages_is_empty() {
        assert_eq!(assemble_transcript(&[]), "");
    }
}
