//! Batch grading entry point.
//!
//! [`grade`] reads the answer key once, then works through the students in
//! upload order. The answer key is fatal: without its text there is nothing
//! to grade against. A student whose document cannot be processed keeps
//! its error on the submission (score `N/A`) and the batch moves on.

use crate::config::GradingConfig;
use crate::error::{GraderError, PageError};
use crate::model::{resolve_model, GenerativeModel};
use crate::output::{
    AnswerKey, GradingReport, GradingStats, PageImage, StudentSubmission, UploadedPdf,
};
use crate::pipeline::{compare, encode, input, ocr, render, text};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Grade every student submission against the answer key.
///
/// `manual_name` names the student when exactly one submission is uploaded.
///
/// # Returns
/// `Ok(GradingReport)` even if some students failed
/// (check `report.stats.failed_students`).
///
/// # Errors
/// Returns `Err(GraderError)` only for run-level failures:
/// - No student files
/// - The model provider cannot be configured
/// - The answer key is not a readable PDF with text
pub async fn grade(
    key: &UploadedPdf,
    students: &[UploadedPdf],
    manual_name: Option<&str>,
    config: &GradingConfig,
) -> Result<GradingReport, GraderError> {
    let total_start = Instant::now();
    if students.is_empty() {
        return Err(GraderError::MissingUpload {
            what: "student answer sheets".to_string(),
        });
    }
    info!(
        "Starting grading run: key '{}', {} student file(s)",
        key.file_name,
        students.len()
    );

    // ── Step 1: Resolve the model ────────────────────────────────────────
    let model = resolve_model(config)?;

    if let Some(ref cb) = config.progress_callback {
        cb.on_batch_start(students.len());
    }

    // ── Step 2: Answer key ───────────────────────────────────────────────
    let answer_key = process_answer_key(key, config).await?;
    if let Some(ref cb) = config.progress_callback {
        cb.on_answer_key_ready(answer_key.page_count, answer_key.text.len());
    }

    grade_students(&model, answer_key, students, manual_name, config, total_start).await
}

/// Grade `students` sequentially against an already processed key.
async fn grade_students(
    model: &Arc<dyn GenerativeModel>,
    answer_key: AnswerKey,
    students: &[UploadedPdf],
    manual_name: Option<&str>,
    config: &GradingConfig,
    total_start: Instant,
) -> Result<GradingReport, GraderError> {
    let names = input::name_students(students, manual_name);
    let total = students.len();
    let mut submissions = Vec::with_capacity(total);
    let mut stats = GradingStats {
        students: total,
        ..Default::default()
    };

    for (idx, (upload, name)) in students.iter().zip(names).enumerate() {
        if let Some(ref cb) = config.progress_callback {
            cb.on_student_start(&name, idx + 1, total);
        }

        let mut submission = StudentSubmission {
            name,
            file_name: upload.file_name.clone(),
            ..Default::default()
        };

        match grade_student(model, upload, &mut submission, &answer_key.text, config).await {
            Ok((input_tokens, output_tokens)) => {
                stats.graded_students += 1;
                stats.total_input_tokens += input_tokens;
                stats.total_output_tokens += output_tokens;
            }
            Err(e) => {
                warn!("{}: not graded: {}", submission.name, e);
                submission.text.clear();
                submission.analysis.clear();
                submission.error = Some(e.to_string());
                stats.failed_students += 1;
            }
        }

        let failed_pages = submission.failed_pages();
        stats.processed_pages += submission.pages.len() - failed_pages;
        stats.failed_pages += failed_pages;
        for page in &submission.pages {
            stats.total_input_tokens += page.input_tokens as u64;
            stats.total_output_tokens += page.output_tokens as u64;
        }

        if let Some(ref cb) = config.progress_callback {
            cb.on_student_complete(
                &submission.name,
                &submission.score(),
                submission.error.as_deref(),
            );
        }
        submissions.push(submission);
    }

    stats.total_duration_ms = total_start.elapsed().as_millis() as u64;
    info!(
        "Grading complete: {}/{} students graded, {} pages, {}ms total",
        stats.graded_students, stats.students, stats.processed_pages, stats.total_duration_ms
    );

    if let Some(ref cb) = config.progress_callback {
        cb.on_batch_complete(stats.students, stats.graded_students);
    }

    Ok(GradingReport {
        answer_key,
        submissions,
        stats,
    })
}

/// Extract the key text and, when configured, its page images.
async fn process_answer_key(
    key: &UploadedPdf,
    config: &GradingConfig,
) -> Result<AnswerKey, GraderError> {
    let extracted = text::extract_text(key).await?;
    if !extracted.unreadable_pages.is_empty() {
        warn!(
            "Answer key '{}': pages {:?} had no readable text",
            key.file_name, extracted.unreadable_pages
        );
    }

    let page_images = if config.keep_page_images {
        match render::render_pages(key, config).await {
            Ok(doc) => doc
                .pages
                .into_iter()
                .filter_map(|(page_num, image)| {
                    let image = image.ok()?;
                    match encode::encode_page(&image) {
                        Ok(encoded) => Some(PageImage {
                            page_num,
                            png_base64: encoded.png_base64,
                        }),
                        Err(e) => {
                            warn!("Answer key page {}: encoding failed: {}", page_num, e);
                            None
                        }
                    }
                })
                .collect(),
            Err(e) => {
                warn!("Answer key '{}': page images unavailable: {}", key.file_name, e);
                Vec::new()
            }
        }
    } else {
        Vec::new()
    };

    Ok(AnswerKey {
        file_name: key.file_name.clone(),
        text: extracted.text,
        page_count: extracted.page_count,
        page_images,
    })
}

/// Transcribe and grade one student, filling `submission` as it goes.
///
/// Returns the comparison call's `(input, output)` tokens; page tokens are
/// on `submission.pages`.
async fn grade_student(
    model: &Arc<dyn GenerativeModel>,
    upload: &UploadedPdf,
    submission: &mut StudentSubmission,
    key_text: &str,
    config: &GradingConfig,
) -> Result<(u64, u64), GraderError> {
    let name = submission.name.clone();

    // ── Rasterise ────────────────────────────────────────────────────────
    let rendered = render::render_pages(upload, config).await?;
    let total_pages = rendered.page_count;

    // ── Encode; render/encode failures become page errors ────────────────
    let mut encoded = Vec::with_capacity(total_pages);
    let mut pages = Vec::with_capacity(total_pages);
    for (page_num, image) in rendered.pages {
        let error = match image {
            Ok(image) => match encode::encode_page(&image) {
                Ok(page) => {
                    if config.keep_page_images {
                        submission.page_images.push(PageImage {
                            page_num,
                            png_base64: page.png_base64,
                        });
                    }
                    encoded.push((page_num, page.image));
                    continue;
                }
                Err(e) => PageError::EncodeFailed {
                    page: page_num,
                    detail: e.to_string(),
                },
            },
            Err(detail) => PageError::RenderFailed {
                page: page_num,
                detail,
            },
        };
        if let Some(ref cb) = config.progress_callback {
            cb.on_page_error(&name, page_num, total_pages, &error.to_string());
        }
        pages.push(ocr::failed_page(page_num, error));
    }
    debug!("{}: {} of {} pages encoded", name, encoded.len(), total_pages);

    // ── Transcribe ───────────────────────────────────────────────────────
    pages.extend(ocr::transcribe_pages(model, &name, encoded, total_pages, config).await);
    pages.sort_by_key(|p| p.page_num);
    submission.pages = pages;

    if submission.failed_pages() == submission.pages.len() {
        let first_error = submission
            .pages
            .iter()
            .find_map(|p| p.error.as_ref())
            .map(|e| e.to_string())
            .unwrap_or_else(|| "Unknown error".to_string());
        return Err(GraderError::AllPagesFailed {
            name: upload.file_name.clone(),
            total: total_pages,
            retries: config.max_retries,
            first_error,
        });
    }

    let transcript = ocr::assemble_transcript(&submission.pages);
    info!(
        "{}: transcribed {}/{} pages ({} chars)",
        name,
        submission.pages.len() - submission.failed_pages(),
        total_pages,
        transcript.len()
    );

    // ── Compare ──────────────────────────────────────────────────────────
    let response = compare::compare(model, &name, &transcript, key_text, config).await?;
    submission.text = transcript;
    submission.analysis = response.content;

    Ok((response.input_tokens as u64, response.output_tokens as u64))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::testing::ScriptedModel;
    use crate::pipeline::engine::pdfium_available;

    fn config_with(model: Arc<dyn GenerativeModel>) -> GradingConfig {
        GradingConfig::builder()
            .backend(model)
            .max_retries(0)
            .retry_backoff_ms(1)
            .build()
            .unwrap()
    }

    /// A PDF of `pages` empty A4 pages.
    async fn blank_pdf(pages: usize) -> Vec<u8> {
        tokio::task::spawn_blocking(move || {
            crate::pipeline::engine::with_pdfium(|pdfium| {
                let mut doc = pdfium
                    .create_new_pdf()
                    .map_err(|e| GraderError::Internal(format!("{e:?}")))?;
                for _ in 0..pages {
                    doc.pages_mut()
                        .create_page_at_end(pdfium_render::prelude::PdfPagePaperSize::a4())
                        .map_err(|e| GraderError::Internal(format!("{e:?}")))?;
                }
                doc.save_to_bytes()
                    .map_err(|e| GraderError::Internal(format!("{e:?}")))
            })
        })
        .await
        .unwrap()
        .unwrap()
    }

    fn key_text() -> AnswerKey {
        AnswerKey {
            file_name: "key.pdf".into(),
            text: "Q1. 42\n".into(),
            page_count: 1,
            page_images: vec![],
        }
    }

    #[tokio::test]
    async fn no_students_is_an_error() {
        let config = config_with(ScriptedModel::new(vec![], "unused"));
        let key = UploadedPdf::new("key.pdf", b"%PDF-1.4".to_vec());
        let err = grade(&key, &[], None, &config).await.unwrap_err();
        assert!(matches!(err, GraderError::MissingUpload { .. }), "got: {err:?}");
    }

    #[tokio::test]
    async fn non_pdf_key_is_fatal() {
        let scripted = ScriptedModel::new(vec![], "unused");
        let config = config_with(scripted.clone());
        let key = UploadedPdf::new("key.txt", b"plain text".to_vec());
        let students = vec![UploadedPdf::new("alice.pdf", b"%PDF-1.4".to_vec())];

        let err = grade(&key, &students, None, &config).await.unwrap_err();
        assert!(matches!(err, GraderError::NotAPdf { .. }), "got: {err:?}");
        assert_eq!(scripted.calls(), 0);
    }

    #[tokio::test]
    async fn failed_students_are_recorded_and_the_batch_continues() {
        use crate::progress::GradingProgressCallback;
        use std::sync::Mutex;

        #[derive(Default)]
        struct Events(Mutex<Vec<String>>);
        impl GradingProgressCallback for Events {
            fn on_student_start(&self, name: &str, index: usize, total: usize) {
                self.0.lock().unwrap().push(format!("start {name} {index}/{total}"));
            }
            fn on_student_complete(&self, name: &str, score: &str, error: Option<&str>) {
                let status = if error.is_some() { "failed" } else { "ok" };
                self.0.lock().unwrap().push(format!("done {name} {score} {status}"));
            }
            fn on_batch_complete(&self, students: usize, graded: usize) {
                self.0.lock().unwrap().push(format!("batch {graded}/{students}"));
            }
        }

        let events = Arc::new(Events::default());
        let scripted = ScriptedModel::new(vec![], "unused");
        let config = GradingConfig::builder()
            .backend(scripted.clone())
            .progress_callback(events.clone())
            .build()
            .unwrap();
        let key = key_text();
        let students = vec![
            UploadedPdf::new("alice.pdf", b"hello".to_vec()),
            UploadedPdf::new("alice.PDF", Vec::new()),
        ];
        let model: Arc<dyn GenerativeModel> = scripted.clone();

        let report = grade_students(&model, key, &students, None, &config, Instant::now())
            .await
            .unwrap();

        assert_eq!(report.stats.students, 2);
        assert_eq!(report.stats.failed_students, 2);
        assert_eq!(report.stats.graded_students, 0);
        assert_eq!(report.submissions[0].name, "alice");
        assert_eq!(report.submissions[1].name, "alice (2)");
        for submission in &report.submissions {
            assert!(submission.error.as_deref().unwrap().contains("not a valid PDF"));
            assert!(submission.text.is_empty() && submission.analysis.is_empty());
            assert_eq!(submission.score(), "N/A");
        }
        assert_eq!(scripted.calls(), 0);
        assert_eq!(
            *events.0.lock().unwrap(),
            vec![
                "start alice 1/2",
                "done alice N/A failed",
                "start alice (2) 2/2",
                "done alice (2) N/A failed",
                "batch 0/2",
            ]
        );
    }

    #[tokio::test]
    async fn blank_key_is_fatal_before_any_student() {
        if !pdfium_available() {
            println!("SKIP: pdfium library not available");
            return;
        }
        let scripted = ScriptedModel::new(vec![], "unused");
        let config = config_with(scripted.clone());
        let blank = blank_pdf(1).await;
        let key = UploadedPdf::new("key.pdf", blank);
        let students = vec![UploadedPdf::new("alice.pdf", b"not a pdf".to_vec())];

        let err = grade(&key, &students, None, &config).await.unwrap_err();
        assert!(matches!(err, GraderError::NoExtractableText { .. }), "got: {err:?}");
        assert_eq!(scripted.calls(), 0);
    }

    #[tokio::test]
    async fn every_page_failing_fails_the_student() {
        if !pdfium_available() {
            println!("SKIP: pdfium library not available");
            return;
        }
        let scripted = ScriptedModel::new(vec![Err("quota"), Err("quota")], "Total Score: 9/10");
        let model: Arc<dyn GenerativeModel> = scripted.clone();
        let config = config_with(model.clone());
        let upload = UploadedPdf::new("alice.pdf", blank_pdf(2).await);
        let mut submission = StudentSubmission {
            name: "alice".into(),
            file_name: "alice.pdf".into(),
            ..Default::default()
        };

        let err = grade_student(&model, &upload, &mut submission, "Q1. 42", &config)
            .await
            .unwrap_err();
        match err {
            GraderError::AllPagesFailed {
                ref name,
                total,
                retries,
                ref first_error,
            } => {
                assert_eq!(name, "alice.pdf");
                assert_eq!(total, 2);
                assert_eq!(retries, 0);
                assert!(first_error.contains("quota"), "got: {first_error}");
            }
            other => panic!("unexpected: {other:?}"),
        }
        assert_eq!(submission.pages.len(), 2);
        for (page, expected) in submission.pages.iter().zip(1..) {
            assert_eq!(page.page_num, expected);
            assert!(
                matches!(page.error, Some(PageError::LlmFailed { .. })),
                "page {}: {:?}",
                page.page_num,
                page.error
            );
        }
        // No comparison is attempted.
        assert_eq!(scripted.calls(), 2);
        assert!(submission.analysis.is_empty());
    }

    #[tokio::test]
    async fn all_pages_failed_is_recorded_with_no_score() {
        if !pdfium_available() {
            println!("SKIP: pdfium library not available");
            return;
        }
        let scripted = ScriptedModel::new(vec![Err("quota"), Err("quota")], "Total Score: 9/10");
        let config = config_with(scripted.clone());
        let model: Arc<dyn GenerativeModel> = scripted.clone();
        let students = vec![UploadedPdf::new("alice.pdf", blank_pdf(2).await)];

        let report = grade_students(&model, key_text(), &students, None, &config, Instant::now())
            .await
            .unwrap();

        let alice = &report.submissions[0];
        assert_eq!(alice.score(), "N/A");
        assert!(alice.error.as_deref().unwrap().contains("alice.pdf"));
        assert_eq!(alice.failed_pages(), 2);
        assert_eq!(report.stats.failed_students, 1);
        assert_eq!(report.stats.failed_pages, 2);
        assert_eq!(report.stats.processed_pages, 0);
    }
}
