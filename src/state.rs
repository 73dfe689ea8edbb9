//! The pipeline run state machine.
//!
//! ```text
//!            Upload           TextFound
//!   Idle ───────────▶ Extracting ───────────────────────▶ Summarizing ──SummaryReady──▶ Done
//!                         │                                   ▲
//!                         │ TextEmpty                         │ OcrFinished
//!                         ▼                                   │
//!                    OcrExtracting ───────────────────────────┘
//!
//!   Extracting | OcrExtracting | Summarizing ──Fatal──▶ Failed
//! ```
//!
//! [`RunState::apply`] is the whole transition table. It is a pure function so
//! the table can be tested without any runtime.

use crate::error::PipelineError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// State of one pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RunState {
    Idle,
    Extracting,
    OcrExtracting,
    Summarizing,
    Done,
    Failed,
}

/// Events that drive a run forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunEvent {
    /// A document was accepted.
    Upload,
    /// Direct extraction produced non-empty text.
    TextFound,
    /// Direct extraction produced nothing (or failed); fall back to OCR.
    TextEmpty,
    /// The OCR loop ended, with or without text.
    OcrFinished,
    /// The model returned a summary.
    SummaryReady,
    /// The current stage failed.
    Fatal,
}

impl RunState {
    /// Apply `event`, returning the next state or `InvalidTransition`.
    pub fn apply(self, event: RunEvent) -> Result<RunState, PipelineError> {
        use RunEvent::*;
        use RunState::*;
        let next = match (self, event) {
            (Idle, Upload) => Extracting,
            (Extracting, TextFound) => Summarizing,
            (Extracting, TextEmpty) => OcrExtracting,
            (OcrExtracting, OcrFinished) => Summarizing,
            (Summarizing, SummaryReady) => Done,
            (Extracting | OcrExtracting | Summarizing, Fatal) => Failed,
            (from, event) => {
                return Err(PipelineError::InvalidTransition {
                    from: from.to_string(),
                    event: format!("{event:?}"),
                })
            }
        };
        Ok(next)
    }

    /// `Done` and `Failed` accept no further events.
    pub fn is_terminal(self) -> bool {
        matches!(self, RunState::Done | RunState::Failed)
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RunState::Idle => "idle",
            RunState::Extracting => "extracting",
            RunState::OcrExtracting => "ocr-extracting",
            RunState::Summarizing => "summarizing",
            RunState::Done => "done",
            RunState::Failed => "failed",
        };
        f.write_str(s)
    }
}
