//! The pipeline controller: one document in, one [`PipelineRun`] out.
//!
//! The controller owns the sequencing and nothing else. Every transition goes
//! through [`PipelineRun::advance`], so the recorded history always matches
//! the state table in [`crate::state`]. Stages are never retried
//! automatically; a new upload starts a fresh run.

use crate::config::PipelineConfig;
use crate::error::PipelineError;
use crate::output::{ExtractionResult, PipelineRun, Summary};
use crate::pipeline::coordinator::{DirectOutcome, ExtractionCoordinator};
use crate::pipeline::input::Document;
use crate::pipeline::llm::{SummarizationClient, Summarize};
use crate::pipeline::ocr::{OcrEngineFactory, TesseractCli};
use crate::pipeline::orchestrator::OcrOrchestrator;
use crate::pipeline::render::{PdfiumRasterizer, Rasterizer};
use crate::pipeline::text::{PdfiumTextExtractor, TextExtractor};
use crate::progress::ProgressCallback;
use crate::session::{CancelFlag, RunTicket};
use crate::state::{RunEvent, RunState};
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

/// The external collaborators a controller drives.
#[derive(Clone)]
pub struct Backends {
    pub text: Arc<dyn TextExtractor>,
    pub rasterizer: Arc<dyn Rasterizer>,
    pub engines: Arc<dyn OcrEngineFactory>,
    pub summarizer: Arc<dyn Summarize>,
}

impl Backends {
    /// pdfium for text and rasters, tesseract for OCR, edgequake-llm for
    /// the summary.
    pub async fn production(config: &PipelineConfig) -> Result<Self, PipelineError> {
        let summarizer = SummarizationClient::from_config(config).await?;
        Ok(Self {
            text: Arc::new(PdfiumTextExtractor::new(config.password.clone())),
            rasterizer: Arc::new(PdfiumRasterizer::new(
                config.raster_width,
                config.raster_height,
                config.password.clone(),
            )),
            engines: Arc::new(TesseractCli::new(config.tesseract_binary.clone())),
            summarizer: Arc::new(summarizer),
        })
    }
}

/// Sequences extraction, OCR fallback and summarisation for one document.
///
/// Cheap to clone; share one controller across requests.
#[derive(Clone)]
pub struct PipelineController {
    coordinator: ExtractionCoordinator,
    summarizer: Arc<dyn Summarize>,
    progress: Option<ProgressCallback>,
}

impl PipelineController {
    pub fn new(backends: Backends, config: &PipelineConfig) -> Self {
        let progress = config.progress_callback.clone();
        let ocr = OcrOrchestrator::new(backends.rasterizer, backends.engines, config);
        Self {
            coordinator: ExtractionCoordinator::new(backends.text, ocr, progress.clone()),
            summarizer: backends.summarizer,
            progress,
        }
    }

    /// Process `document` end to end with a run nobody else can cancel.
    pub async fn run(&self, document: &Document) -> PipelineRun {
        self.run_with(document, &RunTicket::detached()).await
    }

    /// Process `document` end to end. The returned run is always terminal.
    ///
    /// Dropping the future before it completes cancels the run, so OCR
    /// still in progress on the blocking pool stops at the next page.
    pub async fn run_with(&self, document: &Document, ticket: &RunTicket) -> PipelineRun {
        let start = Instant::now();
        let mut run = PipelineRun::new(ticket.run_id);
        info!("Run {}: processing {:?}", ticket.run_id, document);

        let abandoned = ticket.cancel.cancel_on_drop();
        let outcome = self.drive(&mut run, document, &ticket.cancel).await;
        abandoned.disarm();

        if let Err(e) = outcome {
            warn!("Run {}: failed while {}: {}", ticket.run_id, run.state, e);
            run.fail(&e);
            self.notify_stage(run.state);
        }

        run.duration_ms = start.elapsed().as_millis() as u64;
        info!(
            "Run {}: {} in {}ms",
            ticket.run_id, run.state, run.duration_ms
        );
        if let Some(cb) = &self.progress {
            cb.on_run_complete(&run);
        }
        run
    }

    async fn drive(
        &self,
        run: &mut PipelineRun,
        document: &Document,
        cancel: &CancelFlag,
    ) -> Result<(), PipelineError> {
        self.advance(run, RunEvent::Upload)?;

        let direct = self.coordinator.direct(document).await;
        ensure_live(cancel)?;

        let extraction = match direct {
            DirectOutcome::Found(result) => {
                self.advance(run, RunEvent::TextFound)?;
                result
            }
            fallback => {
                let direct_error = match fallback {
                    DirectOutcome::Failed(e) => Some(e),
                    _ => None,
                };
                self.advance(run, RunEvent::TextEmpty)?;
                let result = self
                    .coordinator
                    .ocr(document, run.id, cancel, direct_error)
                    .await?;
                self.advance(run, RunEvent::OcrFinished)?;
                result
            }
        };

        run.extraction = Some(extraction.clone());
        ensure_live(cancel)?;

        if extraction.is_empty() {
            return Err(PipelineError::UnreadableDocument);
        }

        let summary = until_cancelled(cancel, self.summarizer.summarize(&extraction.text)).await?;
        run.summary = Some(summary);
        self.advance(run, RunEvent::SummaryReady)?;
        Ok(())
    }

    /// OCR only, bypassing the text layer.
    pub async fn ocr_only(
        &self,
        document: &Document,
        ticket: &RunTicket,
    ) -> Result<ExtractionResult, PipelineError> {
        let abandoned = ticket.cancel.cancel_on_drop();
        let result = self
            .coordinator
            .ocr(document, ticket.run_id, &ticket.cancel, None)
            .await;
        abandoned.disarm();
        result
    }

    /// Summarise already extracted text.
    pub async fn summarize_text(
        &self,
        text: &str,
        ticket: &RunTicket,
    ) -> Result<Summary, PipelineError> {
        let abandoned = ticket.cancel.cancel_on_drop();
        let result = until_cancelled(&ticket.cancel, self.summarizer.summarize(text)).await;
        abandoned.disarm();
        result
    }

    fn advance(&self, run: &mut PipelineRun, event: RunEvent) -> Result<(), PipelineError> {
        let state = run.advance(event)?;
        self.notify_stage(state);
        Ok(())
    }

    fn notify_stage(&self, state: RunState) {
        if let Some(cb) = &self.progress {
            cb.on_stage(state);
        }
    }
}

fn ensure_live(cancel: &CancelFlag) -> Result<(), PipelineError> {
    if cancel.is_cancelled() {
        Err(PipelineError::Cancelled)
    } else {
        Ok(())
    }
}

async fn until_cancelled<T>(
    cancel: &CancelFlag,
    work: impl Future<Output = Result<T, PipelineError>>,
) -> Result<T, PipelineError> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(PipelineError::Cancelled),
        result = work => result,
    }
}
