//! Error types for the medpdf library.
//!
//! Three error types reflect three distinct failure scopes:
//!
//! * [`PipelineError`] — **Fatal**: the run cannot proceed (not a PDF, model
//!   unreachable, both extraction methods failed). Returned as
//!   `Err(PipelineError)` from coordinator, orchestrator and client calls and
//!   recorded on a failed [`crate::output::PipelineRun`].
//!
//! * [`PageError`] — **Non-fatal**: OCR could not recognise a single page but
//!   the other pages are fine. Stored in
//!   [`crate::output::ExtractionResult::failed_pages`] so one bad scan does
//!   not lose the whole document.
//!
//! * [`OcrError`] — raised by an [`crate::pipeline::ocr::OcrEngine`]
//!   implementation. The orchestrator decides whether it is page-local
//!   (becomes a [`PageError`]) or fatal (becomes [`PipelineError::Ocr`]).
//!
//! Every fatal error maps onto one [`ErrorKind`], the coarse taxonomy the HTTP
//! layer and the UI care about.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// Coarse error classes surfaced to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Bad input: wrong file type, missing field, empty text. Never retried.
    InputInvalid,
    /// The language model or OCR engine failed or timed out.
    UpstreamUnavailable,
    /// The document could not be turned into text.
    ExtractionFailed,
    /// The run was superseded by a newer upload.
    Cancelled,
    /// Bug or environment problem on our side.
    Internal,
}

/// All fatal errors returned by the medpdf library.
#[derive(Debug, Error)]
pub enum PipelineError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("PDF file not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// The input string is not a valid file path or URL.
    #[error("Invalid input '{input}': not a file path or a valid HTTP/HTTPS URL")]
    InvalidInput { input: String },

    /// HTTP URL was syntactically valid but download failed.
    #[error("Failed to download '{url}': {reason}\nCheck your internet connection.")]
    DownloadFailed { url: String, reason: String },

    /// Download exceeded the configured timeout.
    #[error("Download timed out after {secs}s for '{url}'")]
    DownloadTimeout { url: String, secs: u64 },

    /// The payload is not a PDF (magic bytes or declared content type).
    #[error("Please upload a valid PDF file ({detail})")]
    NotAPdf { detail: String },

    /// A required request field is absent.
    #[error("Missing required field '{field}'")]
    MissingField { field: &'static str },

    /// Summarisation was requested for empty text.
    #[error("Cannot summarise empty text")]
    EmptyText,

    /// Neither the text layer nor OCR produced any text.
    #[error("No readable text found in the document (text layer empty, OCR produced nothing)")]
    UnreadableDocument,

    // ── PDF errors ────────────────────────────────────────────────────────
    /// PDF header/trailer/xref is corrupt and cannot be parsed.
    #[error("PDF is corrupt: {detail}")]
    CorruptPdf { detail: String },

    /// PDF requires a password but none was provided.
    #[error("PDF is encrypted and requires a password.\nProvide it with --password <PASSWORD>.")]
    PasswordRequired,

    /// A password was provided but it is wrong.
    #[error("Wrong password for PDF")]
    WrongPassword,

    /// Reading the embedded text layer failed.
    #[error("Text extraction failed: {detail}")]
    TextExtraction { detail: String },

    /// The rasteriser failed for a page that does exist.
    #[error("Rasterisation failed for page {page}: {detail}")]
    RasterisationFailed { page: usize, detail: String },

    /// Both direct extraction and OCR failed.
    #[error("Extraction failed.\n  direct: {direct}\n  ocr:    {ocr}")]
    ExtractionFailed { direct: String, ocr: String },

    // ── OCR errors ────────────────────────────────────────────────────────
    /// The OCR engine could not be started or failed fatally.
    #[error(transparent)]
    Ocr(#[from] OcrError),

    /// Every rasterised page failed recognition.
    #[error("OCR failed on all {total} pages.\nFirst error: {first_error}")]
    AllPagesFailed { total: usize, first_error: String },

    /// The OCR loop exceeded its wall-clock budget.
    #[error("OCR timed out after {secs}s ({pages_done} pages processed)")]
    OcrTimedOut { secs: u64, pages_done: usize },

    // ── LLM errors ────────────────────────────────────────────────────────
    /// The configured provider is not initialised (missing API key etc.).
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    /// The language-model service returned an error or an empty answer.
    #[error("Language model unavailable: {message}")]
    UpstreamUnavailable { message: String },

    /// The language-model call exceeded its timeout.
    #[error("Language model call timed out after {secs}s")]
    UpstreamTimeout { secs: u64 },

    // ── Run control ───────────────────────────────────────────────────────
    /// The run was cancelled, normally because a newer upload superseded it.
    #[error("Run cancelled: superseded by a newer upload")]
    Cancelled,

    /// The controller was asked for a transition its table does not allow.
    #[error("Invalid pipeline transition: {event} while {from}")]
    InvalidTransition { from: String, event: String },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Pdfium binding errors ─────────────────────────────────────────────
    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\n\
Set PDFIUM_LIB_PATH=/path/to/libpdfium (file or directory), or install\n\
pdfium where the system loader can find it.\n"
    )]
    PdfiumBindingFailed(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl PipelineError {
    /// Classify the error for callers that only need the coarse class.
    pub fn kind(&self) -> ErrorKind {
        use PipelineError::*;
        match self {
            FileNotFound { .. }
            | PermissionDenied { .. }
            | InvalidInput { .. }
            | NotAPdf { .. }
            | MissingField { .. }
            | EmptyText
            | UnreadableDocument
            | PasswordRequired
            | WrongPassword
            | InvalidConfig(_) => ErrorKind::InputInvalid,

            DownloadFailed { .. }
            | DownloadTimeout { .. }
            | Ocr(_)
            | AllPagesFailed { .. }
            | OcrTimedOut { .. }
            | ProviderNotConfigured { .. }
            | UpstreamUnavailable { .. }
            | UpstreamTimeout { .. } => ErrorKind::UpstreamUnavailable,

            CorruptPdf { .. }
            | TextExtraction { .. }
            | RasterisationFailed { .. }
            | ExtractionFailed { .. } => ErrorKind::ExtractionFailed,

            Cancelled => ErrorKind::Cancelled,

            InvalidTransition { .. } | PdfiumBindingFailed(_) | Internal(_) => ErrorKind::Internal,
        }
    }
}

/// Errors raised by an OCR engine implementation.
#[derive(Debug, Clone, Error, Serialize, Deserialize)]
pub enum OcrError {
    /// The engine could not be started (binary missing, language not installed).
    #[error("OCR engine failed to start for language '{language}': {detail}")]
    Initialization { language: String, detail: String },

    /// The engine ran but could not recognise the given page.
    #[error("OCR recognition failed on page {page}: {detail}")]
    Recognition { page: usize, detail: String },

    /// Recognition of the page was still running at the run's OCR deadline.
    #[error("OCR of page {page} did not finish before the deadline")]
    DeadlineExceeded { page: usize },

    /// The engine was used after it had been shut down.
    #[error("OCR engine used after shutdown")]
    ShutDown,

    /// Tearing the engine down failed.
    #[error("OCR engine shutdown failed: {detail}")]
    Shutdown { detail: String },
}

/// A non-fatal error for a single OCR page.
///
/// Stored alongside the extraction result when a page fails; the loop
/// carries on with the next page.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum PageError {
    /// Recognition failed for this page.
    #[error("Page {page}: OCR failed: {detail}")]
    OcrFailed { page: usize, detail: String },
}
