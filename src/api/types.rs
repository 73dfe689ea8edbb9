//! API request and response types.

use crate::controller::PipelineController;
use crate::session::RunRegistry;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Header that ties uploads from one browser tab together.
pub const SESSION_HEADER: &str = "x-session-id";

/// Server settings read from the environment.
///
/// | Variable | Default |
/// |----------|---------|
/// | `MEDPDF_HOST` | `127.0.0.1` |
/// | `PORT` | `5000` |
/// | `MEDPDF_ALLOWED_ORIGIN` | `http://localhost:5173` |
/// | `MEDPDF_MAX_UPLOAD_MB` | `50` |
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// The single origin allowed by CORS (the UI dev server by default).
    pub allowed_origin: String,
    /// Maximum request body size in bytes.
    pub max_upload_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 5000,
            allowed_origin: "http://localhost:5173".to_string(),
            max_upload_bytes: 50 * 1024 * 1024,
        }
    }
}

impl ServerConfig {
    /// Read the settings from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read the settings through `lookup`; unset or unparsable values keep
    /// their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(host) = lookup("MEDPDF_HOST").filter(|h| !h.trim().is_empty()) {
            config.host = host.trim().to_string();
        }

        if let Some(value) = lookup("PORT") {
            match value.trim().parse::<u16>() {
                Ok(port) => config.port = port,
                Err(_) => tracing::warn!("Ignoring invalid PORT='{}'", value),
            }
        }

        if let Some(origin) = lookup("MEDPDF_ALLOWED_ORIGIN").filter(|o| !o.trim().is_empty()) {
            config.allowed_origin = origin.trim().to_string();
        }

        if let Some(value) = lookup("MEDPDF_MAX_UPLOAD_MB") {
            match value.trim().parse::<usize>() {
                Ok(mb) if mb > 0 => config.max_upload_bytes = mb * 1024 * 1024,
                _ => tracing::warn!(
                    "Ignoring invalid MEDPDF_MAX_UPLOAD_MB='{}', must be a positive integer",
                    value
                ),
            }
        }

        config
    }
}

/// Shared handler state.
#[derive(Clone)]
pub struct ApiState {
    pub controller: PipelineController,
    pub registry: Arc<RunRegistry>,
}

impl ApiState {
    pub fn new(controller: PipelineController) -> Self {
        Self {
            controller,
            registry: Arc::new(RunRegistry::new()),
        }
    }
}

/// Body of `POST /api/summarize`.
#[derive(Debug, Clone, Deserialize)]
pub struct SummarizeRequest {
    pub text: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummarizeResponse {
    pub summary: String,
}

/// Response of `POST /api/extractOcr`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OcrResponse {
    pub full_text: String,
}

/// Health check response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// Body of every error response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}
