//! Direct extraction first, OCR as fallback.
//!
//! The coordinator never fails just because a method returned nothing: an
//! empty OCR result is still a result. It fails only when OCR itself fails,
//! and reports [`PipelineError::ExtractionFailed`] when direct extraction had
//! already failed too.

use super::input::Document;
use super::normalize::normalize_text;
use super::orchestrator::OcrOrchestrator;
use super::text::TextExtractor;
use crate::error::PipelineError;
use crate::output::{ExtractionResult, Provenance};
use crate::progress::ProgressCallback;
use crate::session::CancelFlag;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

/// Outcome of the direct pass, kept so the caller can drive its state
/// machine between the two passes.
#[derive(Debug)]
pub enum DirectOutcome {
    /// The text layer had content.
    Found(ExtractionResult),
    /// The text layer was empty.
    Empty,
    /// Reading the text layer failed.
    Failed(PipelineError),
}

#[derive(Clone)]
pub struct ExtractionCoordinator {
    text: Arc<dyn TextExtractor>,
    ocr: OcrOrchestrator,
    progress: Option<ProgressCallback>,
}

impl ExtractionCoordinator {
    pub fn new(
        text: Arc<dyn TextExtractor>,
        ocr: OcrOrchestrator,
        progress: Option<ProgressCallback>,
    ) -> Self {
        Self {
            text,
            ocr,
            progress,
        }
    }

    /// Extract the text of `document`, falling back to OCR when the text
    /// layer is empty or unreadable.
    pub async fn extract(
        &self,
        document: &Document,
        run_id: Uuid,
        cancel: &CancelFlag,
    ) -> Result<ExtractionResult, PipelineError> {
        match self.direct(document).await {
            DirectOutcome::Found(result) => Ok(result),
            DirectOutcome::Empty => self.ocr(document, run_id, cancel, None).await,
            DirectOutcome::Failed(e) => self.ocr(document, run_id, cancel, Some(e)).await,
        }
    }

    /// Read the embedded text layer. Pages are joined with `\n` and the
    /// result normalised.
    pub async fn direct(&self, document: &Document) -> DirectOutcome {
        let extractor = Arc::clone(&self.text);
        let doc = document.clone();

        let pages = match tokio::task::spawn_blocking(move || extractor.extract_pages(&doc)).await
        {
            Ok(Ok(pages)) => pages,
            Ok(Err(e)) => {
                warn!("Direct extraction failed: {}", e);
                return DirectOutcome::Failed(e);
            }
            Err(join) => {
                return DirectOutcome::Failed(PipelineError::Internal(format!(
                    "text extraction task panicked: {}",
                    join
                )))
            }
        };

        let page_count = pages.len();
        let text = normalize_text(&pages.join("\n"));
        if text.is_empty() {
            info!("Text layer empty across {} pages; falling back to OCR", page_count);
            return DirectOutcome::Empty;
        }

        info!("Direct extraction: {} chars from {} pages", text.len(), page_count);
        let result = ExtractionResult {
            text,
            provenance: Provenance::Direct,
            page_count,
            failed_pages: Vec::new(),
            truncated: false,
        };
        self.publish(&result);
        DirectOutcome::Found(result)
    }

    /// Run the OCR pass. `direct_error` is the failure of the preceding
    /// direct pass, if any; when OCR fails too both causes are reported.
    pub async fn ocr(
        &self,
        document: &Document,
        run_id: Uuid,
        cancel: &CancelFlag,
        direct_error: Option<PipelineError>,
    ) -> Result<ExtractionResult, PipelineError> {
        let output = match self.ocr.run(document, run_id, cancel).await {
            Ok(output) => output,
            Err(PipelineError::Cancelled) => return Err(PipelineError::Cancelled),
            Err(ocr_err) => {
                return Err(match direct_error {
                    Some(direct_err) => PipelineError::ExtractionFailed {
                        direct: direct_err.to_string(),
                        ocr: ocr_err.to_string(),
                    },
                    None => ocr_err,
                })
            }
        };

        let result = ExtractionResult {
            text: normalize_text(&output.text),
            provenance: Provenance::Ocr,
            page_count: output.pages_processed,
            failed_pages: output.failed_pages,
            truncated: output.truncated,
        };
        self.publish(&result);
        Ok(result)
    }

    fn publish(&self, result: &ExtractionResult) {
        if let Some(cb) = &self.progress {
            cb.on_text_extracted(result);
        }
    }
}
