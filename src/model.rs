//! The seam between the grading pipeline and the generative model.
//!
//! Every model call in the crate (one per handwritten page, one comparison per
//! student) goes through [`GenerativeModel`]. The production implementation,
//! [`ProviderModel`], wraps an `edgequake-llm` provider so any vision-capable
//! backend it knows (Gemini, OpenAI, Anthropic, Ollama, …) can be used.
//! Tests plug in scripted implementations instead.
//!
//! ## Retry Strategy
//!
//! [`generate_with_retry`] applies the configured per-call timeout and retries
//! failures with exponential backoff (`retry_backoff_ms * 2^(retry - 1)`,
//! saturating). With the defaults the wait sequence is 500 ms → 1 s → 2 s.

use crate::config::{GradingConfig, DEFAULT_MODEL, DEFAULT_PROVIDER};
use crate::error::GraderError;
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, ImageData, LLMProvider, ProviderFactory};
use std::sync::Arc;
use std::time::Instant;
use tokio::time::{sleep, timeout, Duration};
use tracing::{debug, info, warn};

/// One request to the model: optional system text, user text, and images.
#[derive(Debug, Clone)]
pub struct ModelRequest {
    pub system: Option<String>,
    pub text: String,
    pub images: Vec<ImageData>,
    pub temperature: f32,
    pub max_tokens: usize,
}

impl ModelRequest {
    /// A text-only request using the sampling settings from `config`.
    pub fn text(text: impl Into<String>, config: &GradingConfig) -> Self {
        Self {
            system: None,
            text: text.into(),
            images: Vec::new(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        }
    }

    /// A request carrying one image alongside the prompt text.
    pub fn with_image(text: impl Into<String>, image: ImageData, config: &GradingConfig) -> Self {
        Self {
            images: vec![image],
            ..Self::text(text, config)
        }
    }
}

/// The model's answer plus token accounting.
#[derive(Debug, Clone, Default)]
pub struct ModelResponse {
    pub content: String,
    pub input_tokens: usize,
    pub output_tokens: usize,
}

/// A text+image in, text out generative model.
#[async_trait]
pub trait GenerativeModel: Send + Sync {
    /// Human-readable identifier, used in logs.
    fn name(&self) -> String;

    /// Run a single completion.
    async fn generate(&self, request: &ModelRequest) -> Result<ModelResponse, GraderError>;
}

/// [`GenerativeModel`] backed by an `edgequake-llm` provider.
pub struct ProviderModel {
    provider: Arc<dyn LLMProvider>,
    label: String,
}

impl ProviderModel {
    pub fn new(provider: Arc<dyn LLMProvider>, label: impl Into<String>) -> Self {
        Self {
            provider,
            label: label.into(),
        }
    }
}

#[async_trait]
impl GenerativeModel for ProviderModel {
    fn name(&self) -> String {
        self.label.clone()
    }

    async fn generate(&self, request: &ModelRequest) -> Result<ModelResponse, GraderError> {
        let mut messages = Vec::with_capacity(2);
        if let Some(ref system) = request.system {
            messages.push(ChatMessage::system(system.as_str()));
        }
        if request.images.is_empty() {
            messages.push(ChatMessage::user(request.text.as_str()));
        } else {
            messages.push(ChatMessage::user_with_images(
                request.text.as_str(),
                request.images.clone(),
            ));
        }

        let options = CompletionOptions {
            temperature: Some(request.temperature),
            max_tokens: Some(request.max_tokens),
            ..Default::default()
        };

        let response = self
            .provider
            .chat(&messages, Some(&options))
            .await
            .map_err(|e| GraderError::LlmApiError {
                message: e.to_string(),
            })?;

        Ok(ModelResponse {
            content: response.content,
            input_tokens: response.prompt_tokens as usize,
            output_tokens: response.completion_tokens as usize,
        })
    }
}

/// Resolve the model backend, from most-specific to least-specific:
///
/// 1. `config.backend`: used as-is.
/// 2. `config.provider_name`, else `AUTOGRADER_PROVIDER`, else [`DEFAULT_PROVIDER`],
///    with `config.model`, else `AUTOGRADER_MODEL`, else [`DEFAULT_MODEL`].
///
/// The provider reads its own API key (`GEMINI_API_KEY`, `OPENAI_API_KEY`, …)
/// from the environment.
pub fn resolve_model(config: &GradingConfig) -> Result<Arc<dyn GenerativeModel>, GraderError> {
    if let Some(ref backend) = config.backend {
        return Ok(Arc::clone(backend));
    }

    let provider_name = config
        .provider_name
        .clone()
        .or_else(|| non_empty_env("AUTOGRADER_PROVIDER"))
        .unwrap_or_else(|| DEFAULT_PROVIDER.to_string());
    let model = config
        .model
        .clone()
        .or_else(|| non_empty_env("AUTOGRADER_MODEL"))
        .unwrap_or_else(|| DEFAULT_MODEL.to_string());

    let provider = ProviderFactory::create_llm_provider(&provider_name, &model).map_err(|e| {
        GraderError::ProviderNotConfigured {
            provider: provider_name.clone(),
            hint: format!(
                "Set the API key for '{provider_name}' (e.g. GEMINI_API_KEY) or pick another \
                 provider with --provider / AUTOGRADER_PROVIDER.\nError: {e}"
            ),
        }
    })?;

    info!("Using model {}/{}", provider_name, model);
    Ok(Arc::new(ProviderModel::new(
        provider,
        format!("{provider_name}/{model}"),
    )))
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// Successful call plus how many retries it took.
#[derive(Debug, Clone)]
pub struct Completed {
    pub response: ModelResponse,
    pub retries: u32,
    pub duration_ms: u64,
}

/// Why a call failed after the last attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum CallFailure {
    /// The final attempt exceeded `api_timeout_secs`.
    TimedOut { secs: u64 },
    /// The final attempt returned an error.
    Failed { detail: String },
}

impl std::fmt::Display for CallFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CallFailure::TimedOut { secs } => write!(f, "timed out after {secs}s"),
            CallFailure::Failed { detail } => f.write_str(detail),
        }
    }
}

/// Delay before retry `attempt` (1-based): `base * 2^(attempt-1)`, saturating.
fn backoff_ms(base: u64, attempt: u32) -> u64 {
    base.saturating_mul(2u64.saturating_pow(attempt.saturating_sub(1)))
}

/// Call the model with timeout and exponential-backoff retries.
///
/// `label` identifies the call in logs (e.g. `"alice p3"`).
pub async fn generate_with_retry(
    model: &Arc<dyn GenerativeModel>,
    request: &ModelRequest,
    config: &GradingConfig,
    label: &str,
) -> Result<Completed, CallFailure> {
    let start = Instant::now();
    let limit = Duration::from_secs(config.api_timeout_secs);
    let mut last = CallFailure::Failed {
        detail: "Unknown error".to_string(),
    };

    for attempt in 0..=config.max_retries {
        if attempt > 0 {
            let backoff = backoff_ms(config.retry_backoff_ms, attempt);
            warn!(
                "{}: retry {}/{} after {}ms",
                label, attempt, config.max_retries, backoff
            );
            sleep(Duration::from_millis(backoff)).await;
        }

        match timeout(limit, model.generate(request)).await {
            Ok(Ok(response)) => {
                debug!(
                    "{}: {} input tokens, {} output tokens, {:?}",
                    label,
                    response.input_tokens,
                    response.output_tokens,
                    start.elapsed()
                );
                return Ok(Completed {
                    response,
                    retries: attempt,
                    duration_ms: start.elapsed().as_millis() as u64,
                });
            }
            Ok(Err(e)) => {
                warn!("{}: attempt {} failed: {}", label, attempt + 1, e);
                last = CallFailure::Failed {
                    detail: e.to_string(),
                };
            }
            Err(_) => {
                warn!(
                    "{}: attempt {} timed out after {}s",
                    label,
                    attempt + 1,
                    config.api_timeout_secs
                );
                last = CallFailure::TimedOut {
                    secs: config.api_timeout_secs,
                };
            }
        }
    }

    Err(last)
}
