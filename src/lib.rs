//! # medpdf
//!
//! Turn a medical PDF (lab report, discharge letter, imaging report) into a
//! plain-language summary a patient can read.
//!
//! ## Pipeline Overview
//!
//! ```text
//! PDF upload
//!  │
//!  ├─ 1. Input      validate the upload (PDF magic, content type)
//!  ├─ 2. Direct     read the embedded text layer via pdfium
//!  ├─ 3. OCR        only if (2) is empty or fails: rasterise page by page,
//!  │                recognise with tesseract, stop at end of document
//!  ├─ 4. Normalise  same cleanup rules for both paths
//!  └─ 5. Summarise  one language-model call via edgequake-llm
//! ```
//!
//! Each run is an explicit [`PipelineRun`] value moving through
//! [`RunState`]s; a UI renders it, the CLI prints it, the HTTP API returns it.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use medpdf::{Backends, Document, PipelineConfig, PipelineController};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Provider auto-detected from OPENAI_API_KEY / ANTHROPIC_API_KEY / …
//!     let config = PipelineConfig::default();
//!     let controller = PipelineController::new(Backends::production(&config).await?, &config);
//!
//!     let document = Document::from_bytes(std::fs::read("labs.pdf")?, None)?;
//!     let run = controller.run(&document).await;
//!     match run.into_result() {
//!         Ok(summary) => println!("{}", summary.text),
//!         Err(failure) => eprintln!("{} failed: {}", failure.stage, failure.message),
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | The `medpdf` binary (clap + anyhow + tracing-subscriber + indicatif) |
//! | `api`   | on      | The HTTP API (axum + tower-http) |
//!
//! ## Runtime requirements
//!
//! * a pdfium shared library (`PDFIUM_LIB_PATH`, the working directory, or the
//!   system loader path)
//! * the `tesseract` executable with the configured language data
//!   (`TESSDATA_PREFIX` is passed through)
//! * credentials for one edgequake-llm provider

// ── Modules ──────────────────────────────────────────────────────────────

#[cfg(feature = "api")]
pub mod api;
pub mod config;
pub mod controller;
pub mod error;
pub mod output;
pub mod pdfium;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod session;
pub mod state;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{PipelineConfig, PipelineConfigBuilder};
pub use controller::{Backends, PipelineController};
pub use error::{ErrorKind, OcrError, PageError, PipelineError};
pub use output::{ExtractionResult, PipelineRun, Provenance, RunFailure, Summary};
pub use pipeline::input::{resolve_input, Document};
pub use pipeline::llm::{SummarizationClient, Summarize};
pub use pipeline::ocr::{OcrEngine, OcrEngineFactory, TesseractCli};
pub use pipeline::render::{PageImage, PageSource, RasterOutcome, Rasterizer};
pub use pipeline::text::TextExtractor;
pub use progress::{NoopProgressCallback, PipelineProgressCallback, ProgressCallback};
pub use session::{CancelFlag, RunRegistry, RunTicket};
pub use state::{RunEvent, RunState};
