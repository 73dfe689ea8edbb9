//! Direct extraction from the PDF's embedded text layer.

use super::input::Document;
use crate::error::PipelineError;
use crate::pdfium::{bind_pdfium, load_error};
use tracing::{debug, info};

/// Reads the embedded text layer of a document, one string per page.
///
/// Implementations are blocking; the coordinator calls them from
/// `spawn_blocking`.
pub trait TextExtractor: Send + Sync {
    /// Return the text of every page, in page order (page 1 first).
    fn extract_pages(&self, document: &Document) -> Result<Vec<String>, PipelineError>;
}

/// [`TextExtractor`] backed by pdfium.
#[derive(Debug, Clone, Default)]
pub struct PdfiumTextExtractor {
    password: Option<String>,
}

impl PdfiumTextExtractor {
    pub fn new(password: Option<String>) -> Self {
        Self { password }
    }
}

impl TextExtractor for PdfiumTextExtractor {
    fn extract_pages(&self, document: &Document) -> Result<Vec<String>, PipelineError> {
        let pdfium = bind_pdfium()?;
        let password = self.password.as_deref();

        let pdf = pdfium
            .load_pdf_from_byte_slice(document.bytes(), password)
            .map_err(|e| load_error(e, password))?;

        let pages = pdf.pages();
        let total = pages.len() as usize;
        info!("PDF loaded: {} pages", total);

        let mut out = Vec::with_capacity(total);
        for (idx, page) in pages.iter().enumerate() {
            let text = page
                .text()
                .map_err(|e| PipelineError::TextExtraction {
                    detail: format!("page {}: {:?}", idx + 1, e),
                })?
                .all();
            debug!("Page {}: {} chars in text layer", idx + 1, text.len());
            out.push(text);
        }

        Ok(out)
    }
}
