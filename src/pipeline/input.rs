//! Input handling: turn an upload, a local path or a URL into a [`Document`].
//!
//! Every entry point validates the payload before any other stage sees it.
//! A non-PDF upload is rejected here with [`PipelineError::NotAPdf`], so no
//! extraction, OCR or model call is ever made for it.

use crate::error::PipelineError;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// Bytes that start every PDF header.
const PDF_MAGIC: &[u8] = b"%PDF";

/// PDF readers accept the header anywhere in the first 1024 bytes.
const MAGIC_SEARCH_WINDOW: usize = 1024;

/// An uploaded PDF held in memory for the duration of one run.
///
/// Cloning is cheap; the bytes are shared.
#[derive(Clone)]
pub struct Document {
    bytes: Arc<[u8]>,
    name: Option<String>,
}

impl std::fmt::Debug for Document {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Document")
            .field("name", &self.name)
            .field("len", &self.bytes.len())
            .finish()
    }
}

impl Document {
    /// Wrap raw bytes, checking the PDF magic.
    pub fn from_bytes(bytes: impl Into<Vec<u8>>, name: Option<String>) -> Result<Self, PipelineError> {
        let bytes = bytes.into();
        check_magic(&bytes)?;
        Ok(Self {
            bytes: bytes.into(),
            name,
        })
    }

    /// Accept a multipart upload.
    ///
    /// The declared content type must be `application/pdf` or a generic
    /// binary type; the bytes must carry the PDF magic either way.
    pub fn from_upload(
        bytes: impl Into<Vec<u8>>,
        content_type: Option<&str>,
        file_name: Option<String>,
    ) -> Result<Self, PipelineError> {
        if let Some(ct) = content_type {
            let essence = ct.split(';').next().unwrap_or("").trim().to_ascii_lowercase();
            if !matches!(
                essence.as_str(),
                "application/pdf" | "application/x-pdf" | "application/octet-stream" | ""
            ) {
                return Err(PipelineError::NotAPdf {
                    detail: format!("content type '{essence}'"),
                });
            }
        }
        Self::from_bytes(bytes, file_name)
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

fn check_magic(bytes: &[u8]) -> Result<(), PipelineError> {
    if bytes.is_empty() {
        return Err(PipelineError::NotAPdf {
            detail: "empty file".into(),
        });
    }
    let window = &bytes[..bytes.len().min(MAGIC_SEARCH_WINDOW)];
    if window.windows(PDF_MAGIC.len()).any(|w| w == PDF_MAGIC) {
        Ok(())
    } else {
        let first: Vec<u8> = bytes.iter().take(4).copied().collect();
        Err(PipelineError::NotAPdf {
            detail: format!("first bytes {:?}", first),
        })
    }
}

/// Check if the input string looks like a URL.
pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// Load a document from a local path or an HTTP(S) URL.
pub async fn resolve_input(input: &str, timeout_secs: u64) -> Result<Document, PipelineError> {
    if input.trim().is_empty() {
        return Err(PipelineError::InvalidInput {
            input: input.to_string(),
        });
    }
    if is_url(input) {
        download_url(input, timeout_secs).await
    } else {
        read_local(input).await
    }
}

async fn read_local(path_str: &str) -> Result<Document, PipelineError> {
    let path = PathBuf::from(path_str);

    let bytes = tokio::fs::read(&path).await.map_err(|e| match e.kind() {
        std::io::ErrorKind::PermissionDenied => PipelineError::PermissionDenied { path: path.clone() },
        _ => PipelineError::FileNotFound { path: path.clone() },
    })?;

    debug!("Read local PDF: {} ({} bytes)", path.display(), bytes.len());
    Document::from_bytes(bytes, file_name(&path))
}

async fn download_url(url: &str, timeout_secs: u64) -> Result<Document, PipelineError> {
    info!("Downloading PDF from: {}", url);

    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| PipelineError::DownloadFailed {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

    let response = client.get(url).send().await.map_err(|e| {
        if e.is_timeout() {
            PipelineError::DownloadTimeout {
                url: url.to_string(),
                secs: timeout_secs,
            }
        } else {
            PipelineError::DownloadFailed {
                url: url.to_string(),
                reason: e.to_string(),
            }
        }
    })?;

    if !response.status().is_success() {
        return Err(PipelineError::DownloadFailed {
            url: url.to_string(),
            reason: format!("HTTP {}", response.status()),
        });
    }

    let name = reqwest::Url::parse(url)
        .ok()
        .and_then(|u| u.path_segments().and_then(|mut s| s.next_back().map(str::to_string)))
        .filter(|s| !s.is_empty());

    let bytes = response
        .bytes()
        .await
        .map_err(|e| PipelineError::DownloadFailed {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

    info!("Downloaded {} bytes", bytes.len());
    Document::from_bytes(bytes.to_vec(), name)
}

fn file_name(path: &Path) -> Option<String> {
    path.file_name().map(|n| n.to_string_lossy().into_owned())
}
