//! The OCR loop: rasterise, recognise, repeat until the document ends.
//!
//! ```text
//!   start engine ─▶ open source ─▶ next_page ─┬─ Page(img) ─▶ recognise ─▶ discard ─┐
//!                                             │                                      │
//!                                             │  ◀── cancel / deadline / page cap ◀──┘
//!                                             ├─ EndOfDocument ─▶ done
//!                                             └─ Error{page}   ─▶ RasterisationFailed
//! ```
//!
//! One engine serves the whole document and is released exactly once,
//! whichever way the loop exits. Rasters live in a per-run temp directory
//! that is removed when the stage ends.

use super::input::Document;
use super::normalize::normalize_text;
use super::ocr::{EngineLease, OcrEngineFactory};
use super::render::{PageSource, RasterOutcome, Rasterizer};
use crate::config::PipelineConfig;
use crate::error::{OcrError, PageError, PipelineError};
use crate::progress::ProgressCallback;
use crate::session::CancelFlag;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Text recognised from a document plus loop statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OcrOutput {
    /// `--- Page N ---` sections joined by blank lines; empty when no page
    /// yielded text.
    pub text: String,
    /// Pages handed to the engine.
    pub pages_processed: usize,
    pub failed_pages: Vec<PageError>,
    /// The page cap was hit before the document ended.
    pub truncated: bool,
}

/// Drives the page loop for one document at a time.
#[derive(Clone)]
pub struct OcrOrchestrator {
    rasterizer: Arc<dyn Rasterizer>,
    engines: Arc<dyn OcrEngineFactory>,
    language: String,
    max_pages: usize,
    timeout: Duration,
    work_dir: Option<PathBuf>,
    progress: Option<ProgressCallback>,
}

impl OcrOrchestrator {
    pub fn new(
        rasterizer: Arc<dyn Rasterizer>,
        engines: Arc<dyn OcrEngineFactory>,
        config: &PipelineConfig,
    ) -> Self {
        Self {
            rasterizer,
            engines,
            language: config.ocr_language.clone(),
            max_pages: config.max_ocr_pages,
            timeout: Duration::from_secs(config.ocr_timeout_secs),
            work_dir: config.work_dir.clone(),
            progress: config.progress_callback.clone(),
        }
    }

    /// Run OCR over `document` on the blocking pool.
    pub async fn run(
        &self,
        document: &Document,
        run_id: Uuid,
        cancel: &CancelFlag,
    ) -> Result<OcrOutput, PipelineError> {
        let this = self.clone();
        let document = document.clone();
        let cancel = cancel.clone();

        tokio::task::spawn_blocking(move || {
            let dir = this.make_work_dir(run_id)?;
            let result = this.run_blocking(&document, dir.path(), &cancel);
            if let Err(e) = dir.close() {
                warn!("Could not remove OCR work dir: {}", e);
            }
            result
        })
        .await
        .map_err(|e| PipelineError::Internal(format!("OCR task panicked: {}", e)))?
    }

    /// The page loop itself. Blocking; rasters are written to `work_dir`.
    pub fn run_blocking(
        &self,
        document: &Document,
        work_dir: &Path,
        cancel: &CancelFlag,
    ) -> Result<OcrOutput, PipelineError> {
        let mut lease = EngineLease::acquire(self.engines.as_ref(), &self.language)?;
        let mut source = self.rasterizer.open(document, work_dir)?;

        let result = self.page_loop(&mut lease, source.as_mut(), cancel);
        drop(source);

        if let Err(e) = lease.release() {
            warn!("OCR engine shutdown failed: {}", e);
        }

        let output = result?;
        if output.pages_processed > 0 && output.failed_pages.len() == output.pages_processed {
            return Err(PipelineError::AllPagesFailed {
                total: output.pages_processed,
                first_error: output.failed_pages[0].to_string(),
            });
        }

        info!(
            "OCR finished: {} pages, {} failed, {} chars{}",
            output.pages_processed,
            output.failed_pages.len(),
            output.text.len(),
            if output.truncated { " (truncated)" } else { "" }
        );
        Ok(output)
    }

    fn page_loop(
        &self,
        lease: &mut EngineLease,
        source: &mut dyn PageSource,
        cancel: &CancelFlag,
    ) -> Result<OcrOutput, PipelineError> {
        let deadline = Instant::now() + self.timeout;
        let mut sections: Vec<String> = Vec::new();
        let mut output = OcrOutput::default();

        loop {
            if cancel.is_cancelled() {
                info!("OCR cancelled after {} pages", output.pages_processed);
                return Err(PipelineError::Cancelled);
            }
            if Instant::now() >= deadline {
                return Err(self.timed_out(output.pages_processed));
            }

            let image = match source.next_page() {
                RasterOutcome::Page(image) => image,
                RasterOutcome::EndOfDocument => break,
                RasterOutcome::Error { page, cause } => {
                    return Err(PipelineError::RasterisationFailed {
                        page,
                        detail: cause,
                    })
                }
            };

            if output.pages_processed >= self.max_pages {
                warn!(
                    "Page cap of {} reached; OCR output is truncated",
                    self.max_pages
                );
                image.discard();
                output.truncated = true;
                break;
            }

            let page_num = image.page_num;
            if let Some(cb) = &self.progress {
                cb.on_ocr_page_start(page_num);
            }

            let recognised = lease.recognize(&image, deadline);
            image.discard();
            if let Err(OcrError::DeadlineExceeded { page }) = recognised {
                warn!("Page {}: still recognising at the OCR deadline", page);
                return Err(self.timed_out(output.pages_processed));
            }
            output.pages_processed += 1;

            match recognised {
                Ok(raw) => {
                    let text = normalize_text(&raw);
                    debug!("Page {}: {} chars recognised", page_num, text.len());
                    if let Some(cb) = &self.progress {
                        cb.on_ocr_page_complete(page_num, text.len());
                    }
                    if !text.is_empty() {
                        sections.push(format!("--- Page {page_num} ---\n{text}"));
                    }
                }
                Err(OcrError::Recognition { page, detail }) => {
                    warn!("Page {}: recognition failed: {}", page, detail);
                    if let Some(cb) = &self.progress {
                        cb.on_ocr_page_error(page, &detail);
                    }
                    output.failed_pages.push(PageError::OcrFailed { page, detail });
                }
                Err(fatal) => return Err(fatal.into()),
            }
        }

        output.text = sections.join("\n\n");
        Ok(output)
    }

    fn timed_out(&self, pages_done: usize) -> PipelineError {
        PipelineError::OcrTimedOut {
            secs: self.timeout.as_secs(),
            pages_done,
        }
    }

    fn make_work_dir(&self, run_id: Uuid) -> Result<tempfile::TempDir, PipelineError> {
        let prefix = format!("medpdf-{run_id}-");
        let mut builder = tempfile::Builder::new();
        builder.prefix(&prefix);
        let dir = match &self.work_dir {
            Some(parent) => builder.tempdir_in(parent),
            None => builder.tempdir(),
        };
        dir.map_err(|e| PipelineError::Internal(format!("cannot create OCR work dir: {}", e)))
    }
}
