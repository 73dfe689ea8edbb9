//! Pipeline stages for turning a medical PDF into a summary.
//!
//! Each submodule implements one step; the controller in
//! [`crate::controller`] sequences them.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ text ──(empty)──▶ render ──▶ ocr ──┐
//!   │        │                                 ├──▶ normalize ──▶ llm
//!   │        └──(text)─────────────────────────┘
//! (upload/path/URL)
//! ```
//!
//! 1. [`input`]        — validate the upload (PDF magic, content type)
//! 2. [`text`]         — read the embedded text layer via pdfium
//! 3. [`render`]       — rasterise pages lazily; explicit end-of-document
//! 4. [`ocr`]          — OCR engine adapter (tesseract) and its lifetime guard
//! 5. [`orchestrator`] — the page loop with its bounds and cancellation
//! 6. [`coordinator`]  — direct first, OCR as fallback
//! 7. [`normalize`]    — text cleanup shared by both extraction paths
//! 8. [`llm`]          — the single summarisation call

pub mod coordinator;
pub mod input;
pub mod llm;
pub mod normalize;
pub mod ocr;
pub mod orchestrator;
pub mod render;
pub mod text;
