//! The grading call: compare a student's transcript with the answer key.

use crate::config::GradingConfig;
use crate::error::GraderError;
use crate::model::{generate_with_retry, GenerativeModel, ModelRequest, ModelResponse};
use crate::prompts::{comparison_prompt, COMPARISON_INSTRUCTIONS};
use std::sync::Arc;
use tracing::info;

/// Ask the model for a question-by-question analysis ending in a
/// `Total Score` line. Returns the raw response; the score is scraped later.
///
/// # Errors
/// [`GraderError::LlmApiError`] when every attempt fails or times out.
pub async fn compare(
    model: &Arc<dyn GenerativeModel>,
    student: &str,
    student_text: &str,
    key_text: &str,
    config: &GradingConfig,
) -> Result<ModelResponse, GraderError> {
    let instructions = config
        .comparison_instructions
        .as_deref()
        .unwrap_or(COMPARISON_INSTRUCTIONS);
    let prompt = comparison_prompt(instructions, student_text, key_text);
    let request = ModelRequest::text(prompt, config);
    let label = format!("{} comparison", student);

    let done = generate_with_retry(model, &request, config, &label)
        .await
        .map_err(|failure| GraderError::LlmApiError {
            message: format!("comparison for '{}' failed: {}", student, failure),
        })?;

    info!(
        "{}: analysis received ({} chars, {} retries)",
        student,
        done.response.content.len(),
        done.retries
    );
    Ok(done.response)
}
