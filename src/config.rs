//! Configuration for a pipeline run.
//!
//! All pipeline behaviour is controlled through [`PipelineConfig`], built via
//! its [`PipelineConfigBuilder`]. One struct means one place to look when two
//! runs behave differently, and it can be shared across requests behind an
//! `Arc`.

use crate::error::PipelineError;
use crate::progress::ProgressCallback;
use edgequake_llm::LLMProvider;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// Raster width for OCR pages (A4 portrait, 300 DPI-equivalent output).
pub const DEFAULT_RASTER_WIDTH: u32 = 1654;

/// Raster height for OCR pages.
pub const DEFAULT_RASTER_HEIGHT: u32 = 2339;

/// Upper bound for the base retry wait.
pub const MAX_RETRY_BACKOFF_MS: u64 = 60_000;

/// Configuration for one document pipeline.
///
/// # Example
/// ```rust
/// use medpdf::PipelineConfig;
///
/// let config = PipelineConfig::builder()
///     .ocr_language("eng+deu")
///     .max_ocr_pages(50)
///     .model("gpt-4.1-mini")
///     .build()
///     .unwrap();
/// assert_eq!(config.max_ocr_pages, 50);
/// ```
#[derive(Clone)]
pub struct PipelineConfig {
    // ── OCR ──────────────────────────────────────────────────────────────
    /// Tesseract language code(s). Default: `eng`.
    pub ocr_language: String,

    /// Path or name of the tesseract executable. Default: `tesseract`.
    pub tesseract_binary: PathBuf,

    /// Raster width in pixels for OCR pages. Default: 1654.
    pub raster_width: u32,

    /// Raster height in pixels for OCR pages. Default: 2339.
    pub raster_height: u32,

    /// Hard cap on pages sent through OCR. Default: 200.
    ///
    /// The page loop only stops when the rasteriser reports end of document;
    /// this bound keeps a pathological document from running forever.
    pub max_ocr_pages: usize,

    /// Wall-clock budget for the whole OCR stage in seconds. Default: 600.
    pub ocr_timeout_secs: u64,

    /// Parent directory for per-run raster directories. Default: system temp dir.
    pub work_dir: Option<PathBuf>,

    /// PDF user password for encrypted documents.
    pub password: Option<String>,

    // ── Summarisation ────────────────────────────────────────────────────
    /// LLM model identifier. If None, uses `gpt-4.1-nano`.
    pub model: Option<String>,

    /// LLM provider name (e.g. "openai", "anthropic", "ollama").
    pub provider_name: Option<String>,

    /// Pre-constructed LLM provider. Takes precedence over `provider_name`.
    pub provider: Option<Arc<dyn LLMProvider>>,

    /// Sampling temperature. Default: 0.2.
    pub temperature: f32,

    /// Maximum tokens for the summary. Default: 1024.
    pub max_tokens: usize,

    /// Per-call timeout for the model in seconds. Default: 60.
    pub api_timeout_secs: u64,

    /// Extra attempts after a failed model call. Default: 0 (single shot).
    pub max_retries: u32,

    /// Initial retry delay in milliseconds, doubled per attempt. Default: 500.
    pub retry_backoff_ms: u64,

    /// Custom summary instruction. If None, uses [`crate::prompts::SUMMARY_PROMPT`].
    pub summary_prompt: Option<String>,

    // ── Observability ────────────────────────────────────────────────────
    /// Receives stage and per-page events.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            ocr_language: "eng".to_string(),
            tesseract_binary: PathBuf::from("tesseract"),
            raster_width: DEFAULT_RASTER_WIDTH,
            raster_height: DEFAULT_RASTER_HEIGHT,
            max_ocr_pages: 200,
            ocr_timeout_secs: 600,
            work_dir: None,
            password: None,
            model: None,
            provider_name: None,
            provider: None,
            temperature: 0.2,
            max_tokens: 1024,
            api_timeout_secs: 60,
            max_retries: 0,
            retry_backoff_ms: 500,
            summary_prompt: None,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for PipelineConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineConfig")
            .field("ocr_language", &self.ocr_language)
            .field("tesseract_binary", &self.tesseract_binary)
            .field("raster", &format_args!("{}x{}", self.raster_width, self.raster_height))
            .field("max_ocr_pages", &self.max_ocr_pages)
            .field("ocr_timeout_secs", &self.ocr_timeout_secs)
            .field("work_dir", &self.work_dir)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("model", &self.model)
            .field("provider_name", &self.provider_name)
            .field("provider", &self.provider.as_ref().map(|_| "<dyn LLMProvider>"))
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("api_timeout_secs", &self.api_timeout_secs)
            .field("max_retries", &self.max_retries)
            .field("progress_callback", &self.progress_callback.is_some())
            .finish()
    }
}

impl PipelineConfig {
    /// Create a new builder for `PipelineConfig`.
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`PipelineConfig`].
#[derive(Debug)]
pub struct PipelineConfigBuilder {
    config: PipelineConfig,
}

impl PipelineConfigBuilder {
    pub fn ocr_language(mut self, lang: impl Into<String>) -> Self {
        self.config.ocr_language = lang.into();
        self
    }

    pub fn tesseract_binary(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.tesseract_binary = path.into();
        self
    }

    pub fn raster_size(mut self, width: u32, height: u32) -> Self {
        self.config.raster_width = width.max(100);
        self.config.raster_height = height.max(100);
        self
    }

    pub fn max_ocr_pages(mut self, n: usize) -> Self {
        self.config.max_ocr_pages = n.max(1);
        self
    }

    pub fn ocr_timeout_secs(mut self, secs: u64) -> Self {
        self.config.ocr_timeout_secs = secs;
        self
    }

    pub fn work_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.work_dir = Some(dir.into());
        self
    }

    pub fn password(mut self, pwd: impl Into<String>) -> Self {
        self.config.password = Some(pwd.into());
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

    pub fn provider(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.config.provider = Some(provider);
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

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = secs;
        self
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.config.max_retries = n.min(5);
        self
    }

    /// Base retry wait, clamped to 60 s.
    pub fn retry_backoff_ms(mut self, ms: u64) -> Self {
        self.config.retry_backoff_ms = ms.min(MAX_RETRY_BACKOFF_MS);
        self
    }

    pub fn summary_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.summary_prompt = Some(prompt.into());
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<PipelineConfig, PipelineError> {
        let c = &self.config;
        if c.ocr_language.trim().is_empty() {
            return Err(PipelineError::InvalidConfig(
                "OCR language must not be empty".into(),
            ));
        }
        if !c
            .ocr_language
            .chars()
            .all(|ch| ch.is_ascii_alphanumeric() || ch == '_' || ch == '+')
        {
            return Err(PipelineError::InvalidConfig(format!(
                "OCR language '{}' is not a tesseract language code",
                c.ocr_language
            )));
        }
        if c.ocr_timeout_secs == 0 {
            return Err(PipelineError::InvalidConfig(
                "OCR timeout must be ≥ 1 second".into(),
            ));
        }
        if c.api_timeout_secs == 0 {
            return Err(PipelineError::InvalidConfig(
                "API timeout must be ≥ 1 second".into(),
            ));
        }
        if let Some(ref prompt) = c.summary_prompt {
            if prompt.trim().is_empty() {
                return Err(PipelineError::InvalidConfig(
                    "Summary prompt must not be empty".into(),
                ));
            }
        }
        Ok(self.config)
    }
}
