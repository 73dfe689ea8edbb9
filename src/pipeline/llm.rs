//! Summarisation: one chat completion per document.
//!
//! All prompt wording lives in [`crate::prompts`]; this module owns provider
//! resolution, the timeout, and the optional retry loop.
//!
//! ## Retry Strategy
//!
//! The default is a single attempt (`max_retries = 0`): a failed call is
//! reported to the user, who can upload again. When retries are enabled the
//! wait doubles per attempt (`retry_backoff_ms * 2^(attempt-1)`), so 500 ms
//! base and 3 retries waits 500 ms → 1 s → 2 s.

use crate::config::PipelineConfig;
use crate::error::PipelineError;
use crate::output::Summary;
use crate::prompts::{document_message, SUMMARY_PROMPT};
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, LLMProvider, ProviderFactory};
use std::sync::Arc;
use std::time::Instant;
use tokio::time::{sleep, timeout, Duration};
use tracing::{debug, info, warn};

/// Default model when none is configured.
pub const DEFAULT_MODEL: &str = "gpt-4.1-nano";

/// Turns document text into a patient-facing summary.
///
/// The controller only depends on this trait, so tests can count calls
/// without a network.
#[async_trait]
pub trait Summarize: Send + Sync {
    /// Summarise `text`. Empty or whitespace-only text is rejected with
    /// [`PipelineError::EmptyText`] before any model call.
    async fn summarize(&self, text: &str) -> Result<Summary, PipelineError>;
}

/// Reject text that would produce a meaningless model call.
pub fn validate_text(text: &str) -> Result<&str, PipelineError> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        Err(PipelineError::EmptyText)
    } else {
        Ok(trimmed)
    }
}

/// [`Summarize`] backed by an edgequake-llm provider.
pub struct SummarizationClient {
    provider: Arc<dyn LLMProvider>,
    prompt: String,
    options: CompletionOptions,
    timeout: Duration,
    max_retries: u32,
    retry_backoff_ms: u64,
}

impl std::fmt::Debug for SummarizationClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SummarizationClient")
            .field("timeout", &self.timeout)
            .field("max_retries", &self.max_retries)
            .finish_non_exhaustive()
    }
}

impl SummarizationClient {
    pub fn new(provider: Arc<dyn LLMProvider>, config: &PipelineConfig) -> Self {
        Self {
            provider,
            prompt: config
                .summary_prompt
                .clone()
                .unwrap_or_else(|| SUMMARY_PROMPT.to_string()),
            options: build_options(config),
            timeout: Duration::from_secs(config.api_timeout_secs),
            max_retries: config.max_retries,
            retry_backoff_ms: config.retry_backoff_ms,
        }
    }

    /// Resolve the provider from `config` and the environment.
    pub async fn from_config(config: &PipelineConfig) -> Result<Self, PipelineError> {
        let provider = resolve_provider(config).await?;
        Ok(Self::new(provider, config))
    }

    async fn call_once(&self, messages: &[ChatMessage]) -> Result<Summary, PipelineError> {
        let start = Instant::now();
        let response = timeout(self.timeout, self.provider.chat(messages, Some(&self.options)))
            .await
            .map_err(|_| PipelineError::UpstreamTimeout {
                secs: self.timeout.as_secs(),
            })?
            .map_err(|e| PipelineError::UpstreamUnavailable {
                message: e.to_string(),
            })?;

        let text = response.content.trim().to_string();
        if text.is_empty() {
            return Err(PipelineError::UpstreamUnavailable {
                message: "model returned an empty summary".into(),
            });
        }

        let duration = start.elapsed();
        debug!(
            "Summary: {} input tokens, {} output tokens, {:?}",
            response.prompt_tokens, response.completion_tokens, duration
        );

        Ok(Summary {
            text,
            input_tokens: response.prompt_tokens,
            output_tokens: response.completion_tokens,
            duration_ms: duration.as_millis() as u64,
        })
    }
}

#[async_trait]
impl Summarize for SummarizationClient {
    async fn summarize(&self, text: &str) -> Result<Summary, PipelineError> {
        let text = validate_text(text)?;
        let messages = vec![
            ChatMessage::system(self.prompt.as_str()),
            ChatMessage::user(document_message(text).as_str()),
        ];

        info!("Requesting summary for {} chars", text.len());
        let mut last_err = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let backoff = backoff_ms(self.retry_backoff_ms, attempt);
                warn!(
                    "Summary: retry {}/{} after {}ms",
                    attempt, self.max_retries, backoff
                );
                sleep(Duration::from_millis(backoff)).await;
            }

            match self.call_once(&messages).await {
                Ok(summary) => return Ok(summary),
                Err(e) => {
                    warn!("Summary: attempt {} failed — {}", attempt + 1, e);
                    last_err = Some(e);
                }
            }
        }

        Err(last_err.unwrap_or_else(|| PipelineError::UpstreamUnavailable {
            message: "no attempt was made".into(),
        }))
    }
}

/// Wait before retry `attempt` (1-based), saturating instead of overflowing.
fn backoff_ms(base: u64, attempt: u32) -> u64 {
    base.saturating_mul(2u64.saturating_pow(attempt.saturating_sub(1)))
}

fn build_options(config: &PipelineConfig) -> CompletionOptions {
    CompletionOptions {
        temperature: Some(config.temperature),
        max_tokens: Some(config.max_tokens),
        ..Default::default()
    }
}

fn create_provider(provider_name: &str, model: &str) -> Result<Arc<dyn LLMProvider>, PipelineError> {
    ProviderFactory::create_llm_provider(provider_name, model).map_err(|e| {
        PipelineError::ProviderNotConfigured {
            provider: provider_name.to_string(),
            hint: format!("{e}"),
        }
    })
}

/// Resolve the LLM provider, from most-specific to least-specific:
///
/// 1. `config.provider`, used as-is
/// 2. `config.provider_name` plus `config.model`
/// 3. `EDGEQUAKE_LLM_PROVIDER` + `EDGEQUAKE_MODEL` when both are set
/// 4. OpenAI when `OPENAI_API_KEY` is set
/// 5. [`ProviderFactory::from_env`] auto-detection
pub async fn resolve_provider(
    config: &PipelineConfig,
) -> Result<Arc<dyn LLMProvider>, PipelineError> {
    if let Some(ref provider) = config.provider {
        return Ok(Arc::clone(provider));
    }

    if let Some(ref name) = config.provider_name {
        let model = config.model.as_deref().unwrap_or(DEFAULT_MODEL);
        return create_provider(name, model);
    }

    if let (Ok(prov), Ok(model)) = (
        std::env::var("EDGEQUAKE_LLM_PROVIDER"),
        std::env::var("EDGEQUAKE_MODEL"),
    ) {
        if !prov.is_empty() && !model.is_empty() {
            return create_provider(&prov, &model);
        }
    }

    if let Ok(openai_key) = std::env::var("OPENAI_API_KEY") {
        if !openai_key.is_empty() {
            let model = config.model.as_deref().unwrap_or(DEFAULT_MODEL);
            return create_provider("openai", model);
        }
    }

    let (llm_provider, _embedding) =
        ProviderFactory::from_env().map_err(|e| PipelineError::ProviderNotConfigured {
            provider: "auto".to_string(),
            hint: format!(
                "No LLM provider could be auto-detected from environment.\n\
                Set OPENAI_API_KEY, ANTHROPIC_API_KEY, or configure a provider.\n\
                Error: {}",
                e
            ),
        })?;

    Ok(llm_provider)
}
