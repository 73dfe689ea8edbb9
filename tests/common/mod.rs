//! In-memory backends for integration tests.
//!
//! Every fake counts its calls so tests can assert which stages ran.

#![allow(dead_code)]

use async_trait::async_trait;
use medpdf::{
    Backends, Document, OcrEngine, OcrEngineFactory, OcrError, PageImage, PageSource,
    PipelineConfig, PipelineController, PipelineError, RasterOutcome, Rasterizer, Summarize,
    Summary, TextExtractor,
};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// A buffer that passes the PDF magic check.
pub fn pdf_doc() -> Document {
    Document::from_bytes(b"%PDF-1.7\n%fake\n".to_vec(), Some("test.pdf".into())).unwrap()
}

// ── Text layer ───────────────────────────────────────────────────────────────

pub struct FakeTextExtractor {
    pages: Result<Vec<String>, String>,
    pub calls: AtomicUsize,
}

impl FakeTextExtractor {
    pub fn with_pages(pages: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            pages: Ok(pages.iter().map(|p| p.to_string()).collect()),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn empty(page_count: usize) -> Arc<Self> {
        Self::with_pages(&vec![""; page_count])
    }

    pub fn failing(detail: &str) -> Arc<Self> {
        Arc::new(Self {
            pages: Err(detail.to_string()),
            calls: AtomicUsize::new(0),
        })
    }
}

impl TextExtractor for FakeTextExtractor {
    fn extract_pages(&self, _document: &Document) -> Result<Vec<String>, PipelineError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.pages.clone().map_err(|detail| PipelineError::CorruptPdf { detail })
    }
}

// ── Rasteriser ───────────────────────────────────────────────────────────────

/// Writes each page's scripted OCR text into the PNG path, so the fake
/// engine can "recognise" it back.
pub struct FakeRasterizer {
    pages: Vec<String>,
    error_at: Option<usize>,
    pub opens: AtomicUsize,
    pub next_calls: Arc<AtomicUsize>,
    pub seen_dirs: Mutex<Vec<PathBuf>>,
}

impl FakeRasterizer {
    pub fn with_pages(pages: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            pages: pages.iter().map(|p| p.to_string()).collect(),
            error_at: None,
            opens: AtomicUsize::new(0),
            next_calls: Arc::new(AtomicUsize::new(0)),
            seen_dirs: Mutex::new(Vec::new()),
        })
    }

    pub fn failing_at(pages: &[&str], page: usize) -> Arc<Self> {
        Arc::new(Self {
            pages: pages.iter().map(|p| p.to_string()).collect(),
            error_at: Some(page),
            opens: AtomicUsize::new(0),
            next_calls: Arc::new(AtomicUsize::new(0)),
            seen_dirs: Mutex::new(Vec::new()),
        })
    }
}

struct FakeSource<'a> {
    owner: &'a FakeRasterizer,
    next: usize,
    dir: PathBuf,
}

impl PageSource for FakeSource<'_> {
    fn next_page(&mut self) -> RasterOutcome {
        self.owner.next_calls.fetch_add(1, Ordering::SeqCst);
        let n = self.next;
        if n > self.owner.pages.len() {
            return RasterOutcome::EndOfDocument;
        }
        self.next += 1;
        if self.owner.error_at == Some(n) {
            return RasterOutcome::Error {
                page: n,
                cause: "disk full".into(),
            };
        }
        let path = self.dir.join(format!("page-{n:04}.png"));
        if let Err(e) = std::fs::write(&path, &self.owner.pages[n - 1]) {
            return RasterOutcome::Error {
                page: n,
                cause: e.to_string(),
            };
        }
        RasterOutcome::Page(PageImage {
            page_num: n,
            path,
            width: 1654,
            height: 2339,
        })
    }
}

impl Rasterizer for FakeRasterizer {
    fn open<'a>(
        &'a self,
        _document: &'a Document,
        work_dir: &Path,
    ) -> Result<Box<dyn PageSource + 'a>, PipelineError> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        self.seen_dirs.lock().unwrap().push(work_dir.to_path_buf());
        Ok(Box::new(FakeSource {
            owner: self,
            next: 1,
            dir: work_dir.to_path_buf(),
        }))
    }
}

// ── OCR engine ───────────────────────────────────────────────────────────────

#[derive(Default)]
pub struct EngineCounters {
    pub starts: AtomicUsize,
    pub shutdowns: AtomicUsize,
    pub recognised: Mutex<Vec<usize>>,
}

impl EngineCounters {
    /// Engines started and not yet shut down.
    pub fn live(&self) -> usize {
        self.starts.load(Ordering::SeqCst) - self.shutdowns.load(Ordering::SeqCst)
    }
}

pub struct FakeEngineFactory {
    pub counters: Arc<EngineCounters>,
    fail_init: bool,
    fail_pages: Vec<usize>,
    /// Raised after the given page is recognised.
    cancel_after: Option<(usize, medpdf::CancelFlag)>,
    per_page: Option<Duration>,
}

impl FakeEngineFactory {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            counters: Arc::default(),
            fail_init: false,
            fail_pages: Vec::new(),
            cancel_after: None,
            per_page: None,
        })
    }

    pub fn failing_init() -> Arc<Self> {
        Arc::new(Self {
            counters: Arc::default(),
            fail_init: true,
            fail_pages: Vec::new(),
            cancel_after: None,
            per_page: None,
        })
    }

    pub fn failing_pages(pages: &[usize]) -> Arc<Self> {
        Arc::new(Self {
            counters: Arc::default(),
            fail_init: false,
            fail_pages: pages.to_vec(),
            cancel_after: None,
            per_page: None,
        })
    }

    pub fn cancelling_after(page: usize, flag: medpdf::CancelFlag) -> Arc<Self> {
        Arc::new(Self {
            counters: Arc::default(),
            fail_init: false,
            fail_pages: Vec::new(),
            cancel_after: Some((page, flag)),
            per_page: None,
        })
    }

    /// Takes `per_page` of wall-clock time for every page.
    pub fn slow(per_page: Duration) -> Arc<Self> {
        Arc::new(Self {
            counters: Arc::default(),
            fail_init: false,
            fail_pages: Vec::new(),
            cancel_after: None,
            per_page: Some(per_page),
        })
    }
}

struct FakeEngine {
    counters: Arc<EngineCounters>,
    fail_pages: Vec<usize>,
    cancel_after: Option<(usize, medpdf::CancelFlag)>,
    per_page: Option<Duration>,
}

impl OcrEngine for FakeEngine {
    fn recognize(&mut self, page: &PageImage, _deadline: Instant) -> Result<String, OcrError> {
        if let Some(delay) = self.per_page {
            std::thread::sleep(delay);
        }
        self.counters.recognised.lock().unwrap().push(page.page_num);
        if let Some((after, flag)) = &self.cancel_after {
            if page.page_num == *after {
                flag.cancel();
            }
        }
        if self.fail_pages.contains(&page.page_num) {
            return Err(OcrError::Recognition {
                page: page.page_num,
                detail: "smudged scan".into(),
            });
        }
        std::fs::read_to_string(&page.path).map_err(|e| OcrError::Recognition {
            page: page.page_num,
            detail: e.to_string(),
        })
    }

    fn shutdown(&mut self) -> Result<(), OcrError> {
        self.counters.shutdowns.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

impl OcrEngineFactory for FakeEngineFactory {
    fn start(&self, language: &str) -> Result<Box<dyn OcrEngine>, OcrError> {
        if self.fail_init {
            return Err(OcrError::Initialization {
                language: language.to_string(),
                detail: "language data missing".into(),
            });
        }
        self.counters.starts.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeEngine {
            counters: Arc::clone(&self.counters),
            fail_pages: self.fail_pages.clone(),
            cancel_after: self.cancel_after.clone(),
            per_page: self.per_page,
        }))
    }
}

// ── Summariser ───────────────────────────────────────────────────────────────

pub struct FakeSummarizer {
    pub calls: AtomicUsize,
    pub inputs: Mutex<Vec<String>>,
    fail: Option<String>,
    delay: Option<Duration>,
}

impl FakeSummarizer {
    pub fn ok() -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            inputs: Mutex::new(Vec::new()),
            fail: None,
            delay: None,
        })
    }

    pub fn failing(message: &str) -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            inputs: Mutex::new(Vec::new()),
            fail: Some(message.to_string()),
            delay: None,
        })
    }

    pub fn slow(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            inputs: Mutex::new(Vec::new()),
            fail: None,
            delay: Some(delay),
        })
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Summarize for FakeSummarizer {
    async fn summarize(&self, text: &str) -> Result<Summary, PipelineError> {
        let text = medpdf::pipeline::llm::validate_text(text)?;
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inputs.lock().unwrap().push(text.to_string());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(message) = &self.fail {
            return Err(PipelineError::UpstreamUnavailable {
                message: message.clone(),
            });
        }
        Ok(Summary {
            text: format!("Summary of {} chars. Nothing concerning.", text.len()),
            input_tokens: text.len() / 4,
            output_tokens: 12,
            duration_ms: 1,
        })
    }
}

// ── Wiring ───────────────────────────────────────────────────────────────────

pub struct Harness {
    pub text: Arc<FakeTextExtractor>,
    pub rasterizer: Arc<FakeRasterizer>,
    pub engines: Arc<FakeEngineFactory>,
    pub summarizer: Arc<FakeSummarizer>,
    pub work_dir: tempfile::TempDir,
}

impl Harness {
    pub fn new(
        text: Arc<FakeTextExtractor>,
        rasterizer: Arc<FakeRasterizer>,
        engines: Arc<FakeEngineFactory>,
        summarizer: Arc<FakeSummarizer>,
    ) -> Self {
        Self {
            text,
            rasterizer,
            engines,
            summarizer,
            work_dir: tempfile::tempdir().unwrap(),
        }
    }

    pub fn config(&self) -> PipelineConfig {
        PipelineConfig::builder()
            .work_dir(self.work_dir.path())
            .build()
            .unwrap()
    }

    pub fn controller(&self) -> PipelineController {
        self.controller_with(&self.config())
    }

    pub fn controller_with(&self, config: &PipelineConfig) -> PipelineController {
        PipelineController::new(self.backends(), config)
    }

    pub fn backends(&self) -> Backends {
        Backends {
            text: self.text.clone(),
            rasterizer: self.rasterizer.clone(),
            engines: self.engines.clone(),
            summarizer: self.summarizer.clone(),
        }
    }

    /// Entries left in the work dir parent (per-run dirs must be gone).
    pub fn leftover_files(&self) -> usize {
        std::fs::read_dir(self.work_dir.path()).unwrap().count()
    }
}
