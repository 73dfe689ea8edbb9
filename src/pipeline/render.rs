//! Page rasterisation for OCR.
//!
//! A [`Rasterizer`] opens a document and hands back a [`PageSource`], a lazy
//! producer of page images. Each call to [`PageSource::next_page`] yields one
//! of three explicit outcomes:
//!
//! * [`RasterOutcome::Page`] — the next page, written as a PNG into the run's
//!   working directory
//! * [`RasterOutcome::EndOfDocument`] — there is no next page; the only
//!   normal way for the OCR loop to stop
//! * [`RasterOutcome::Error`] — the page exists but could not be produced
//!   (render failure, disk full); the run fails instead of silently
//!   returning a truncated text
//!
//! Rendering is CPU-bound and pdfium is not async-safe, so sources are used
//! from the blocking thread pool only.

use super::input::Document;
use crate::error::PipelineError;
use crate::pdfium::{bind_pdfium, load_error};
use once_cell::sync::OnceCell;
use pdfium_render::prelude::*;
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// A rasterised page on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageImage {
    /// 1-indexed page number.
    pub page_num: usize,
    /// PNG file inside the run's working directory.
    pub path: PathBuf,
    pub width: u32,
    pub height: u32,
}

impl PageImage {
    /// Remove the image file once OCR has consumed it.
    pub fn discard(self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!("Could not remove {}: {}", self.path.display(), e);
            }
        }
    }
}

/// Result of asking a [`PageSource`] for the next page.
#[derive(Debug)]
pub enum RasterOutcome {
    Page(PageImage),
    EndOfDocument,
    Error { page: usize, cause: String },
}

/// Lazy sequence of page images for one document.
pub trait PageSource {
    /// Produce the next page, starting at page 1.
    fn next_page(&mut self) -> RasterOutcome;
}

/// Opens documents for rasterisation.
pub trait Rasterizer: Send + Sync {
    /// Prepare `document` for page-by-page rendering into `work_dir`.
    ///
    /// Failing to open the document at all is a fatal error, not an empty
    /// document.
    fn open<'a>(
        &'a self,
        document: &'a Document,
        work_dir: &Path,
    ) -> Result<Box<dyn PageSource + 'a>, PipelineError>;
}

/// [`Rasterizer`] backed by pdfium.
///
/// Pages are rendered to `width` pixels wide, capped at `height` pixels
/// tall, preserving the aspect ratio (an A4 page fills 1654×2339 exactly).
///
/// The pdfium bindings are loaded on first use and shared by every document
/// this rasteriser opens.
pub struct PdfiumRasterizer {
    width: u32,
    height: u32,
    password: Option<String>,
    pdfium: OnceCell<Pdfium>,
}

impl PdfiumRasterizer {
    pub fn new(width: u32, height: u32, password: Option<String>) -> Self {
        Self {
            width,
            height,
            password,
            pdfium: OnceCell::new(),
        }
    }

    fn pdfium(&self) -> Result<&Pdfium, PipelineError> {
        self.pdfium.get_or_try_init(bind_pdfium)
    }
}

impl fmt::Debug for PdfiumRasterizer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PdfiumRasterizer")
            .field("size", &format_args!("{}x{}", self.width, self.height))
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("bound", &self.pdfium.get().is_some())
            .finish()
    }
}

impl Rasterizer for PdfiumRasterizer {
    fn open<'a>(
        &'a self,
        document: &'a Document,
        work_dir: &Path,
    ) -> Result<Box<dyn PageSource + 'a>, PipelineError> {
        let password = self.password.as_deref();
        let pdf = self
            .pdfium()?
            .load_pdf_from_byte_slice(document.bytes(), password)
            .map_err(|e| load_error(e, password))?;
        let total = pdf.pages().len() as usize;
        info!("Rasteriser opened document: {} pages", total);

        Ok(Box::new(PdfiumPageSource {
            pdf,
            total,
            next: 1,
            work_dir: work_dir.to_path_buf(),
            width: self.width,
            height: self.height,
        }))
    }
}

/// Page source over one loaded PDF. The document is parsed once in
/// [`PdfiumRasterizer::open`] and pages are pulled from it as needed.
struct PdfiumPageSource<'a> {
    pdf: PdfDocument<'a>,
    total: usize,
    next: usize,
    work_dir: PathBuf,
    width: u32,
    height: u32,
}

impl PdfiumPageSource<'_> {
    fn render(&self, page_num: usize) -> Result<PageImage, String> {
        let page = self
            .pdf
            .pages()
            .get((page_num - 1) as u16)
            .map_err(|e| format!("{:?}", e))?;

        let render_config = PdfRenderConfig::new()
            .set_target_width(self.width as i32)
            .set_maximum_height(self.height as i32);

        let image = page
            .render_with_config(&render_config)
            .map_err(|e| format!("{:?}", e))?
            .as_image();

        let path = self.work_dir.join(format!("page-{page_num:04}.png"));
        image
            .save_with_format(&path, image::ImageFormat::Png)
            .map_err(|e| format!("writing {}: {}", path.display(), e))?;

        debug!(
            "Rendered page {} → {}x{} px",
            page_num,
            image.width(),
            image.height()
        );

        Ok(PageImage {
            page_num,
            path,
            width: image.width(),
            height: image.height(),
        })
    }
}

impl PageSource for PdfiumPageSource<'_> {
    fn next_page(&mut self) -> RasterOutcome {
        let page_num = self.next;
        if page_num > self.total {
            return RasterOutcome::EndOfDocument;
        }
        self.next += 1;

        match self.render(page_num) {
            Ok(image) => RasterOutcome::Page(image),
            Err(cause) => RasterOutcome::Error {
                page: page_num,
                cause,
            },
        }
    }
}
