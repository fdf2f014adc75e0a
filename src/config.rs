//! Configuration types for a grading run.
//!
//! All grading behaviour is controlled through [`GradingConfig`], built via
//! its [`GradingConfigBuilder`]. The web server builds one config at start-up
//! and shares it across requests; the CLI builds one from its flags.

use crate::error::GraderError;
use crate::model::GenerativeModel;
use crate::progress::ProgressCallback;
use std::fmt;
use std::sync::Arc;

/// Default model used when neither the config nor the environment names one.
pub const DEFAULT_MODEL: &str = "gemini-2.0-flash";

/// Default provider used when neither the config nor the environment names one.
pub const DEFAULT_PROVIDER: &str = "gemini";

/// Configuration for grading a batch of submissions.
///
/// Built via [`GradingConfig::builder()`] or using
/// [`GradingConfig::default()`].
///
/// # Example
/// ```rust
/// use pdf_autograder::GradingConfig;
///
/// let config = GradingConfig::builder()
///     .dpi(200)
///     .concurrency(2)
///     .model("gemini-2.0-flash")
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct GradingConfig {
    /// Rendering DPI for handwritten pages. Range: 72–400. Default: 150.
    ///
    /// Handwriting needs more pixels than print; raise this for faint pencil.
    pub dpi: u32,

    /// Maximum rendered image dimension (width or height) in pixels. Default: 2000.
    pub max_rendered_pixels: u32,

    /// Number of pages of one student sent to the model at once. Default: 4.
    pub concurrency: usize,

    /// LLM model identifier, e.g. "gemini-2.0-flash". If None, uses
    /// `AUTOGRADER_MODEL` or [`DEFAULT_MODEL`].
    pub model: Option<String>,

    /// LLM provider name (e.g. "gemini", "openai", "ollama"). If None, uses
    /// `AUTOGRADER_PROVIDER` or [`DEFAULT_PROVIDER`].
    pub provider_name: Option<String>,

    /// Pre-constructed model backend. Takes precedence over `provider_name`.
    pub backend: Option<Arc<dyn GenerativeModel>>,

    /// Sampling temperature. Default: 0.1.
    pub temperature: f32,

    /// Maximum tokens the model may generate per call. Default: 4096.
    pub max_tokens: usize,

    /// Maximum retry attempts on a failed model call. Default: 3.
    pub max_retries: u32,

    /// Initial retry delay in milliseconds, doubled after each attempt. Default: 500.
    pub retry_backoff_ms: u64,

    /// Per-call timeout in seconds. Default: 120.
    pub api_timeout_secs: u64,

    /// Custom handwriting transcription prompt. If None, uses
    /// [`crate::prompts::HANDWRITING_OCR_PROMPT`].
    pub ocr_prompt: Option<String>,

    /// Custom grading instructions placed before the student answers and
    /// answer key. If None, uses [`crate::prompts::COMPARISON_INSTRUCTIONS`].
    pub comparison_instructions: Option<String>,

    /// Render every page of the key and submissions as PNG for display.
    /// Default: true. The CLI turns this off.
    pub keep_page_images: bool,

    /// Progress events for long runs.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for GradingConfig {
    fn default() -> Self {
        Self {
            dpi: 150,
            max_rendered_pixels: 2000,
            concurrency: 4,
            model: None,
            provider_name: None,
            backend: None,
            temperature: 0.1,
            max_tokens: 4096,
            max_retries: 3,
            retry_backoff_ms: 500,
            api_timeout_secs: 120,
            ocr_prompt: None,
            comparison_instructions: None,
            keep_page_images: true,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for GradingConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GradingConfig")
            .field("dpi", &self.dpi)
            .field("max_rendered_pixels", &self.max_rendered_pixels)
            .field("concurrency", &self.concurrency)
            .field("model", &self.model)
            .field("provider_name", &self.provider_name)
            .field("backend", &self.backend.as_ref().map(|b| b.name()))
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("max_retries", &self.max_retries)
            .field("retry_backoff_ms", &self.retry_backoff_ms)
            .field("api_timeout_secs", &self.api_timeout_secs)
            .field("keep_page_images", &self.keep_page_images)
            .finish()
    }
}

impl GradingConfig {
    /// Create a new builder for `GradingConfig`.
    pub fn builder() -> GradingConfigBuilder {
        GradingConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`GradingConfig`].
#[derive(Debug)]
pub struct GradingConfigBuilder {
    config: GradingConfig,
}

impl GradingConfigBuilder {
    pub fn dpi(mut self, dpi: u32) -> Self {
        self.config.dpi = dpi;
        self
    }

    pub fn max_rendered_pixels(mut self, px: u32) -> Self {
        self.config.max_rendered_pixels = px.max(100);
        self
    }

    pub fn concurrency(mut self, n: usize) -> Self {
        self.config.concurrency = n;
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = Some(model.into());
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = Some(name.into());
        self
    }

    pub fn backend(mut self, backend: Arc<dyn GenerativeModel>) -> Self {
        self.config.backend = Some(backend);
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.config.max_retries = n;
        self
    }

    pub fn retry_backoff_ms(mut self, ms: u64) -> Self {
        self.config.retry_backoff_ms = ms;
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = secs;
        self
    }

    pub fn ocr_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.ocr_prompt = Some(prompt.into());
        self
    }

    pub fn comparison_instructions(mut self, text: impl Into<String>) -> Self {
        self.config.comparison_instructions = Some(text.into());
        self
    }

    pub fn keep_page_images(mut self, v: bool) -> Self {
        self.config.keep_page_images = v;
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<GradingConfig, GraderError> {
        let c = &self.config;
        if c.dpi < 72 || c.dpi > 400 {
            return Err(GraderError::InvalidConfig(format!(
                "DPI must be 72–400, got {}",
                c.dpi
            )));
        }
        if c.concurrency == 0 {
            return Err(GraderError::InvalidConfig(
                "Concurrency must be ≥ 1".into(),
            ));
        }
        if c.max_tokens == 0 {
            return Err(GraderError::InvalidConfig(
                "max_tokens must be ≥ 1".into(),
            ));
        }
        if c.api_timeout_secs == 0 {
            return Err(GraderError::InvalidConfig(
                "API timeout must be at least one second".into(),
            ));
        }
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_build() {
        let config = GradingConfig::builder().build().unwrap();
        assert_eq!(config.dpi, 150);
        assert_eq!(config.concurrency, 4);
        assert_eq!(config.max_retries, 3);
        assert!(config.keep_page_images);
    }

    #[test]
    fn dpi_out_of_range_is_rejected() {
        let err = GradingConfig::builder().dpi(50).build().unwrap_err();
        assert!(err.to_string().contains("DPI"), "got: {err}");
        assert!(GradingConfig::builder().dpi(401).build().is_err());
    }

    #[test]
    fn zero_concurrency_is_rejected() {
        assert!(GradingConfig::builder().concurrency(0).build().is_err());
    }

    #[test]
    fn temperature_is_clamped() {
        let config = GradingConfig::builder().temperature(9.0).build().unwrap();
        assert_eq!(config.temperature, 2.0);
    }

    #[test]
    fn debug_hides_backend_internals() {
        let config = GradingConfig::builder().model("gemini-2.5-pro").build().unwrap();
        let dbg = format!("{config:?}");
        assert!(dbg.contains("gemini-2.5-pro"));
        assert!(dbg.contains("backend: None"));
    }
}
