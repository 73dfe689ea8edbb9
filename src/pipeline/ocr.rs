//! OCR engine adapter.
//!
//! An engine is started once per document by an [`OcrEngineFactory`], used
//! for every page, and shut down exactly once. [`EngineLease`] enforces the
//! last part: the orchestrator calls [`EngineLease::release`] on every normal
//! exit path, and `Drop` covers panics and early returns.
//!
//! Every recognition call carries the run's OCR deadline. An engine that
//! cannot finish a page by then gives up with [`OcrError::DeadlineExceeded`],
//! so a single stuck page cannot outlive the run's time budget.

use super::render::PageImage;
use crate::error::OcrError;
use std::fs::{self, File};
use std::io;
use std::path::PathBuf;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// How often a running tesseract process is polled.
const POLL_INTERVAL: Duration = Duration::from_millis(25);

/// A running OCR engine.
pub trait OcrEngine: Send {
    /// Recognise the text of one page image, giving up at `deadline`.
    fn recognize(&mut self, page: &PageImage, deadline: Instant) -> Result<String, OcrError>;

    /// Release engine resources. Called exactly once.
    fn shutdown(&mut self) -> Result<(), OcrError>;
}

/// Starts OCR engines.
pub trait OcrEngineFactory: Send + Sync {
    /// Start an engine for `language` (tesseract code, e.g. `eng`).
    fn start(&self, language: &str) -> Result<Box<dyn OcrEngine>, OcrError>;
}

/// Scoped ownership of a started engine.
pub struct EngineLease {
    engine: Option<Box<dyn OcrEngine>>,
}

impl EngineLease {
    /// Start an engine and wrap it.
    pub fn acquire(factory: &dyn OcrEngineFactory, language: &str) -> Result<Self, OcrError> {
        let engine = factory.start(language)?;
        debug!("OCR engine started ({})", language);
        Ok(Self {
            engine: Some(engine),
        })
    }

    pub fn recognize(&mut self, page: &PageImage, deadline: Instant) -> Result<String, OcrError> {
        match self.engine.as_mut() {
            Some(engine) => engine.recognize(page, deadline),
            None => Err(OcrError::ShutDown),
        }
    }

    /// Shut the engine down now and report the outcome.
    pub fn release(mut self) -> Result<(), OcrError> {
        self.shutdown_inner()
    }

    fn shutdown_inner(&mut self) -> Result<(), OcrError> {
        match self.engine.take() {
            Some(mut engine) => {
                let result = engine.shutdown();
                debug!("OCR engine shut down");
                result
            }
            None => Ok(()),
        }
    }
}

impl Drop for EngineLease {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown_inner() {
            warn!("OCR engine shutdown failed during unwind: {}", e);
        }
    }
}

// ── Tesseract ────────────────────────────────────────────────────────────────

/// [`OcrEngineFactory`] that drives the `tesseract` command-line tool.
///
/// Starting the engine checks that the binary runs and that the requested
/// language data is installed, so a misconfigured host fails before the
/// first page is rendered.
#[derive(Debug, Clone)]
pub struct TesseractCli {
    binary: PathBuf,
}

impl TesseractCli {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }
}

impl Default for TesseractCli {
    fn default() -> Self {
        Self::new("tesseract")
    }
}

impl OcrEngineFactory for TesseractCli {
    fn start(&self, language: &str) -> Result<Box<dyn OcrEngine>, OcrError> {
        let init_err = |detail: String| OcrError::Initialization {
            language: language.to_string(),
            detail,
        };

        let output = Command::new(&self.binary)
            .arg("--list-langs")
            .output()
            .map_err(|e| init_err(format!("cannot run {}: {}", self.binary.display(), e)))?;

        if !output.status.success() {
            return Err(init_err(format!(
                "{} --list-langs exited with {}",
                self.binary.display(),
                output.status
            )));
        }

        // Older tesseract versions print the list on stderr.
        let mut listing = String::from_utf8_lossy(&output.stdout).into_owned();
        listing.push_str(&String::from_utf8_lossy(&output.stderr));
        let installed = parse_language_list(&listing);

        for lang in language.split('+') {
            if !installed.iter().any(|l| l == lang) {
                return Err(init_err(format!(
                    "language data '{}' not installed (available: {})",
                    lang,
                    installed.join(", ")
                )));
            }
        }

        info!("tesseract ready ({} languages installed)", installed.len());
        Ok(Box::new(TesseractSession {
            binary: self.binary.clone(),
            language: language.to_string(),
            open: true,
        }))
    }
}

/// Extract language codes from `tesseract --list-langs` output.
fn parse_language_list(listing: &str) -> Vec<String> {
    listing
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with("List of") && !l.contains(' '))
        .map(str::to_string)
        .collect()
}

struct TesseractSession {
    binary: PathBuf,
    language: String,
    open: bool,
}

impl OcrEngine for TesseractSession {
    /// Runs `tesseract <png> <base> -l <lang> --dpi 300`, which writes
    /// `<base>.txt` next to the raster. Output goes to files rather than
    /// pipes so the child never blocks on a full pipe while it is polled.
    fn recognize(&mut self, page: &PageImage, deadline: Instant) -> Result<String, OcrError> {
        if !self.open {
            return Err(OcrError::ShutDown);
        }

        let failed = |detail: String| OcrError::Recognition {
            page: page.page_num,
            detail,
        };
        let out_base = page.path.with_extension("");
        let txt_path = page.path.with_extension("txt");
        let log_path = page.path.with_extension("log");

        let log = File::create(&log_path).map_err(|e| failed(e.to_string()))?;
        let mut child = Command::new(&self.binary)
            .arg(&page.path)
            .arg(&out_base)
            .arg("-l")
            .arg(&self.language)
            .arg("--dpi")
            .arg("300")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::from(log))
            .spawn()
            .map_err(|e| failed(format!("cannot run {}: {}", self.binary.display(), e)))?;

        let waited = wait_until(&mut child, deadline);
        let stderr = fs::read_to_string(&log_path).unwrap_or_default();
        fs::remove_file(&log_path).ok();

        let status = match waited.map_err(|e| failed(e.to_string()))? {
            Some(status) => status,
            None => {
                fs::remove_file(&txt_path).ok();
                warn!("Page {}: tesseract killed at the OCR deadline", page.page_num);
                return Err(OcrError::DeadlineExceeded {
                    page: page.page_num,
                });
            }
        };

        if !status.success() {
            return Err(failed(format!("exit {}: {}", status, stderr.trim())));
        }

        let text = fs::read_to_string(&txt_path).map_err(|e| failed(e.to_string()))?;
        fs::remove_file(&txt_path).ok();
        Ok(text)
    }

    fn shutdown(&mut self) -> Result<(), OcrError> {
        self.open = false;
        Ok(())
    }
}

/// Wait for `child` to exit. Past `deadline` the child is killed and
/// reaped, and `None` is returned.
fn wait_until(child: &mut Child, deadline: Instant) -> io::Result<Option<ExitStatus>> {
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(Some(status));
        }
        let now = Instant::now();
        if now >= deadline {
            if let Err(e) = child.kill() {
                debug!("kill after deadline: {}", e);
            }
            child.wait()?;
            return Ok(None);
        }
        std::thread::sleep(POLL_INTERVAL.min(deadline - now));
    }
}
