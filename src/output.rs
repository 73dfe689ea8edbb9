//! Values produced by a pipeline run.
//!
//! [`PipelineRun`] is the single source of truth for one uploaded document:
//! a UI renders it, the CLI prints it as JSON, the HTTP layer returns it.
//! Nothing else holds run state.

use crate::error::{ErrorKind, PageError, PipelineError};
use crate::state::{RunEvent, RunState};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Which method produced an [`ExtractionResult`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provenance {
    /// Read from the PDF's embedded text layer.
    Direct,
    /// Recognised from rasterised pages.
    Ocr,
}

/// Normalised text of a document plus where it came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractionResult {
    /// Trimmed, normalised text. May be empty only on the OCR path.
    pub text: String,
    pub provenance: Provenance,
    /// Pages seen by the producing method.
    pub page_count: usize,
    /// OCR pages that could not be recognised (always empty for `Direct`).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub failed_pages: Vec<PageError>,
    /// OCR stopped at the page cap before the document ended.
    #[serde(default)]
    pub truncated: bool,
}

impl ExtractionResult {
    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }
}

/// A model-generated summary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Summary {
    pub text: String,
    pub input_tokens: usize,
    pub output_tokens: usize,
    pub duration_ms: u64,
}

/// Why a run ended in [`RunState::Failed`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunFailure {
    /// The state the run was in when the error happened.
    pub stage: RunState,
    pub kind: ErrorKind,
    pub message: String,
}

/// One end-to-end execution for a single document.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineRun {
    pub id: Uuid,
    pub state: RunState,
    /// Every state the run has been in, in order, starting with `Idle`.
    pub history: Vec<RunState>,
    /// Set as soon as extraction finishes; kept when summarisation fails.
    pub extraction: Option<ExtractionResult>,
    pub summary: Option<Summary>,
    pub failure: Option<RunFailure>,
    pub duration_ms: u64,
}

impl PipelineRun {
    /// A fresh run in `Idle`.
    pub fn new(id: Uuid) -> Self {
        Self {
            id,
            state: RunState::Idle,
            history: vec![RunState::Idle],
            extraction: None,
            summary: None,
            failure: None,
            duration_ms: 0,
        }
    }

    /// Advance the state machine and record the new state.
    pub fn advance(&mut self, event: RunEvent) -> Result<RunState, PipelineError> {
        let next = self.state.apply(event)?;
        self.state = next;
        self.history.push(next);
        Ok(next)
    }

    /// Move to `Failed`, recording the stage that was active.
    pub fn fail(&mut self, error: &PipelineError) {
        let stage = self.state;
        // Terminal runs keep their first failure.
        if self.advance(RunEvent::Fatal).is_ok() {
            self.failure = Some(RunFailure {
                stage,
                kind: error.kind(),
                message: error.to_string(),
            });
        }
    }

    pub fn is_done(&self) -> bool {
        self.state == RunState::Done
    }

    /// Convert the terminal run into the summary or an error.
    ///
    /// Handy for callers that only want the happy path.
    pub fn into_result(self) -> Result<Summary, RunFailure> {
        match (self.summary, self.failure) {
            (Some(summary), None) => Ok(summary),
            (_, Some(failure)) => Err(failure),
            (None, None) => Err(RunFailure {
                stage: self.state,
                kind: ErrorKind::Internal,
                message: format!("run not finished (state: {})", self.state),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fail_records_originating_stage() {
        let mut run = PipelineRun::new(Uuid::new_v4());
        run.advance(RunEvent::Upload).unwrap();
        run.advance(RunEvent::TextEmpty).unwrap();
        run.fail(&PipelineError::Cancelled);

        assert_eq!(run.state, RunState::Failed);
        let failure = run.failure.as_ref().unwrap();
        assert_eq!(failure.stage, RunState::OcrExtracting);
        assert_eq!(failure.kind, ErrorKind::Cancelled);
        assert_eq!(
            run.history,
            vec![
                RunState::Idle,
                RunState::Extracting,
                RunState::OcrExtracting,
                RunState::Failed
            ]
        );
    }

    #[test]
    fn second_failure_is_ignored() {
        let mut run = PipelineRun::new(Uuid::new_v4());
        run.advance(RunEvent::Upload).unwrap();
        run.fail(&PipelineError::EmptyText);
        run.fail(&PipelineError::Cancelled);
        assert_eq!(run.failure.unwrap().kind, ErrorKind::InputInvalid);
    }

    #[test]
    fn serialises_camel_case() {
        let mut run = PipelineRun::new(Uuid::new_v4());
        run.advance(RunEvent::Upload).unwrap();
        run.extraction = Some(ExtractionResult {
            text: "hello".into(),
            provenance: Provenance::Direct,
            page_count: 1,
            failed_pages: vec![],
            truncated: false,
        });
        let json = serde_json::to_value(&run).unwrap();
        assert_eq!(json["state"], "extracting");
        assert_eq!(json["extraction"]["provenance"], "direct");
        assert_eq!(json["extraction"]["pageCount"], 1);
        assert!(json["extraction"].get("failedPages").is_none());
    }

    #[test]
    fn unfinished_run_into_result_is_error() {
        let run = PipelineRun::new(Uuid::new_v4());
        let err = run.into_result().unwrap_err();
        assert_eq!(err.kind, ErrorKind::Internal);
    }
}
