//! Progress-callback trait for pipeline events.
//!
//! Inject an [`Arc<dyn PipelineProgressCallback>`] via
//! [`crate::config::PipelineConfigBuilder::progress_callback`] to receive
//! stage transitions and per-page OCR events as a run advances. The CLI uses
//! it to drive a spinner; a UI can use `on_text_extracted` to show the text
//! before the summary arrives.
//!
//! # Example
//!
//! ```rust
//! use medpdf::{PipelineConfig, PipelineProgressCallback};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct PageCounter(AtomicUsize);
//!
//! impl PipelineProgressCallback for PageCounter {
//!     fn on_ocr_page_complete(&self, page_num: usize, text_len: usize) {
//!         self.0.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("page {page_num}: {text_len} chars");
//!     }
//! }
//!
//! let config = PipelineConfig::builder()
//!     .progress_callback(Arc::new(PageCounter(AtomicUsize::new(0))))
//!     .build()
//!     .unwrap();
//! ```

use crate::output::{ExtractionResult, PipelineRun};
use crate::state::RunState;
use std::sync::Arc;

/// Called by the pipeline as a run advances.
///
/// Implementations must be `Send + Sync`: OCR events fire from the blocking
/// thread pool while stage events fire from the async task. All methods have
/// default no-op implementations.
pub trait PipelineProgressCallback: Send + Sync {
    /// Called after every state transition of a run.
    fn on_stage(&self, state: RunState) {
        let _ = state;
    }

    /// Called as soon as extraction produced text, before summarisation.
    fn on_text_extracted(&self, result: &ExtractionResult) {
        let _ = result;
    }

    /// Called when a rendered page is handed to the OCR engine.
    ///
    /// # Arguments
    /// * `page_num` — 1-indexed page number
    fn on_ocr_page_start(&self, page_num: usize) {
        let _ = page_num;
    }

    /// Called when a page was recognised.
    ///
    /// # Arguments
    /// * `page_num` — 1-indexed page number
    /// * `text_len` — byte length of the recognised text
    fn on_ocr_page_complete(&self, page_num: usize, text_len: usize) {
        let _ = (page_num, text_len);
    }

    /// Called when recognition failed for a page; the loop continues.
    fn on_ocr_page_error(&self, page_num: usize, error: &str) {
        let _ = (page_num, error);
    }

    /// Called once with the terminal run (Done or Failed).
    fn on_run_complete(&self, run: &PipelineRun) {
        let _ = run;
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl PipelineProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::PipelineConfig`].
pub type ProgressCallback = Arc<dyn PipelineProgressCallback>;
