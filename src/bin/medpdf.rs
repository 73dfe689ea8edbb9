//! CLI binary for medpdf.
//!
//! A thin shim over the library crate: maps flags onto `PipelineConfig`,
//! runs the pipeline or the HTTP server, and prints results.

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use medpdf::api::{self, ServerConfig};
use medpdf::pipeline::coordinator::ExtractionCoordinator;
use medpdf::pipeline::orchestrator::OcrOrchestrator;
use medpdf::pipeline::render::PdfiumRasterizer;
use medpdf::pipeline::text::PdfiumTextExtractor;
use medpdf::{
    resolve_input, Backends, ExtractionResult, PipelineConfig, PipelineController,
    PipelineProgressCallback, PipelineRun, ProgressCallback, RunState, RunTicket, TesseractCli,
};
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Spinner on stderr with one line per OCR page.
struct CliProgressCallback {
    bar: ProgressBar,
    pages: AtomicUsize,
    errors: AtomicUsize,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}  {elapsed:.dim}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);
        bar.set_style(style);
        bar.set_prefix("Preparing");
        bar.set_message("Opening PDF…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            pages: AtomicUsize::new(0),
            errors: AtomicUsize::new(0),
        })
    }
}

impl PipelineProgressCallback for CliProgressCallback {
    fn on_stage(&self, state: RunState) {
        let (prefix, msg) = match state {
            RunState::Idle => ("Preparing", "waiting"),
            RunState::Extracting => ("Extracting", "reading text layer"),
            RunState::OcrExtracting => ("OCR", "no text layer, recognising pages"),
            RunState::Summarizing => ("Summarising", "waiting for the model"),
            RunState::Done => ("Done", ""),
            RunState::Failed => ("Failed", ""),
        };
        self.bar.set_prefix(prefix);
        self.bar.set_message(msg);
    }

    fn on_text_extracted(&self, result: &ExtractionResult) {
        self.bar.println(format!(
            "  {} {} chars via {:?} from {} pages",
            green("✓"),
            result.text.len(),
            result.provenance,
            result.page_count
        ));
    }

    fn on_ocr_page_start(&self, page_num: usize) {
        self.bar.set_message(format!("page {page_num}"));
    }

    fn on_ocr_page_complete(&self, page_num: usize, text_len: usize) {
        self.pages.fetch_add(1, Ordering::SeqCst);
        self.bar.println(format!(
            "  {} Page {:>3}  {}",
            green("✓"),
            page_num,
            dim(&format!("{text_len:>5} chars"))
        ));
    }

    fn on_ocr_page_error(&self, page_num: usize, error: &str) {
        self.errors.fetch_add(1, Ordering::SeqCst);
        let msg: String = if error.chars().count() > 80 {
            format!("{}\u{2026}", error.chars().take(79).collect::<String>())
        } else {
            error.to_string()
        };
        self.bar
            .println(format!("  {} Page {:>3}  {}", red("✗"), page_num, red(&msg)));
    }

    fn on_run_complete(&self, run: &PipelineRun) {
        self.bar.finish_and_clear();
        let failed = self.errors.load(Ordering::SeqCst);
        if run.is_done() {
            eprintln!(
                "{} done in {:.1}s{}",
                green("✔"),
                run.duration_ms as f64 / 1000.0,
                if failed > 0 {
                    format!("  ({} of {} OCR pages failed)", failed, self.pages.load(Ordering::SeqCst) + failed)
                } else {
                    String::new()
                }
            );
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Summarise a lab report
  medpdf summarize labs.pdf

  # Summarise a PDF from a URL, full run as JSON
  medpdf summarize --json https://example.org/report.pdf > run.json

  # Just the text (OCR fallback included), no model call
  medpdf extract scan.pdf -o scan.txt

  # Force OCR with German and English language data
  medpdf extract --ocr-only --language deu+eng befund.pdf

  # Run the HTTP API for the web UI
  medpdf serve --port 5000 --allowed-origin http://localhost:5173

ENVIRONMENT VARIABLES:
  OPENAI_API_KEY          OpenAI API key
  ANTHROPIC_API_KEY       Anthropic API key
  EDGEQUAKE_LLM_PROVIDER  Override provider (openai, anthropic, gemini, ollama)
  EDGEQUAKE_MODEL         Override model ID
  PDFIUM_LIB_PATH         Path to libpdfium (file or directory)
  TESSDATA_PREFIX         Tesseract language data directory
  PORT, MEDPDF_HOST, MEDPDF_ALLOWED_ORIGIN, MEDPDF_MAX_UPLOAD_MB   (serve)
"#;

/// Summarise medical PDFs for patients.
#[derive(Parser, Debug)]
#[command(
    name = "medpdf",
    version,
    about = "Extract text from medical PDFs (with OCR fallback) and summarise it for patients",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true, env = "MEDPDF_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, global = true, env = "MEDPDF_QUIET")]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP API.
    Serve(ServeArgs),
    /// Extract text only (direct, then OCR fallback). No model call.
    Extract(ExtractArgs),
    /// Run the full pipeline and print the summary.
    Summarize(SummarizeArgs),
}

#[derive(Args, Debug)]
struct ServeArgs {
    /// Address to bind.
    #[arg(long, env = "MEDPDF_HOST", default_value = "127.0.0.1")]
    host: String,

    /// Port to listen on.
    #[arg(long, env = "PORT", default_value_t = 5000)]
    port: u16,

    /// Origin allowed by CORS.
    #[arg(long, env = "MEDPDF_ALLOWED_ORIGIN", default_value = "http://localhost:5173")]
    allowed_origin: String,

    /// Maximum upload size in MB.
    #[arg(long, env = "MEDPDF_MAX_UPLOAD_MB", default_value_t = 50,
          value_parser = clap::value_parser!(u64).range(1..=2048))]
    max_upload_mb: u64,

    #[command(flatten)]
    pipeline: PipelineArgs,
}

#[derive(Args, Debug)]
struct ExtractArgs {
    /// Local PDF file path or HTTP/HTTPS URL.
    input: String,

    /// Write the text to this file instead of stdout.
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Skip the text layer and OCR every page.
    #[arg(long)]
    ocr_only: bool,

    /// Print the ExtractionResult as JSON.
    #[arg(long)]
    json: bool,

    /// Disable the progress spinner.
    #[arg(long, env = "MEDPDF_NO_PROGRESS")]
    no_progress: bool,

    #[command(flatten)]
    pipeline: PipelineArgs,
}

#[derive(Args, Debug)]
struct SummarizeArgs {
    /// Local PDF file path or HTTP/HTTPS URL.
    input: String,

    /// Print the whole PipelineRun as JSON.
    #[arg(long)]
    json: bool,

    /// Disable the progress spinner.
    #[arg(long, env = "MEDPDF_NO_PROGRESS")]
    no_progress: bool,

    #[command(flatten)]
    pipeline: PipelineArgs,
}

/// Flags shared by every subcommand that runs the pipeline.
#[derive(Args, Debug)]
struct PipelineArgs {
    /// Tesseract language code(s), e.g. eng or deu+eng.
    #[arg(long, env = "MEDPDF_OCR_LANGUAGE", default_value = "eng")]
    language: String,

    /// Tesseract executable.
    #[arg(long, env = "MEDPDF_TESSERACT", default_value = "tesseract")]
    tesseract: PathBuf,

    /// Maximum pages sent through OCR.
    #[arg(long, env = "MEDPDF_MAX_OCR_PAGES", default_value_t = 200)]
    max_ocr_pages: usize,

    /// Wall-clock budget for OCR in seconds.
    #[arg(long, env = "MEDPDF_OCR_TIMEOUT", default_value_t = 600)]
    ocr_timeout: u64,

    /// PDF user password for encrypted documents.
    #[arg(long, env = "MEDPDF_PASSWORD")]
    password: Option<String>,

    /// LLM model ID (default: gpt-4.1-nano).
    #[arg(long, env = "EDGEQUAKE_MODEL")]
    model: Option<String>,

    /// LLM provider: openai, anthropic, gemini, ollama, azure.
    #[arg(long, env = "EDGEQUAKE_LLM_PROVIDER")]
    provider: Option<String>,

    /// LLM temperature (0.0–2.0).
    #[arg(long, env = "MEDPDF_TEMPERATURE", default_value_t = 0.2)]
    temperature: f32,

    /// Max output tokens for the summary.
    #[arg(long, env = "MEDPDF_MAX_TOKENS", default_value_t = 1024)]
    max_tokens: usize,

    /// Model call timeout in seconds.
    #[arg(long, env = "MEDPDF_API_TIMEOUT", default_value_t = 60)]
    api_timeout: u64,

    /// Retries after a failed model call.
    #[arg(long, env = "MEDPDF_MAX_RETRIES", default_value_t = 0)]
    max_retries: u32,

    /// Text file with a custom summary instruction.
    #[arg(long, env = "MEDPDF_PROMPT_FILE")]
    prompt_file: Option<PathBuf>,

    /// HTTP download timeout in seconds (URL inputs).
    #[arg(long, env = "MEDPDF_DOWNLOAD_TIMEOUT", default_value_t = 120)]
    download_timeout: u64,
}

impl PipelineArgs {
    fn to_config(&self, progress: Option<ProgressCallback>) -> Result<PipelineConfig> {
        let mut builder = PipelineConfig::builder()
            .ocr_language(&self.language)
            .tesseract_binary(&self.tesseract)
            .max_ocr_pages(self.max_ocr_pages)
            .ocr_timeout_secs(self.ocr_timeout)
            .temperature(self.temperature)
            .max_tokens(self.max_tokens)
            .api_timeout_secs(self.api_timeout)
            .max_retries(self.max_retries);

        if let Some(ref pwd) = self.password {
            builder = builder.password(pwd);
        }
        if let Some(ref model) = self.model {
            builder = builder.model(model);
        }
        if let Some(ref provider) = self.provider {
            builder = builder.provider_name(provider);
        }
        if let Some(ref path) = self.prompt_file {
            let prompt = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read prompt file: {}", path.display()))?;
            builder = builder.summary_prompt(prompt);
        }
        if let Some(cb) = progress {
            builder = builder.progress_callback(cb);
        }

        builder.build().context("Invalid configuration")
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The spinner gives all the feedback that matters, so INFO logs are
    // only shown for `serve` or when the spinner is off.
    let spinner = match &cli.command {
        Command::Serve(_) => false,
        Command::Extract(a) => !a.no_progress && !a.json,
        Command::Summarize(a) => !a.no_progress && !a.json,
    } && !cli.quiet;

    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || spinner {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    let progress = spinner.then(CliProgressCallback::new);

    match cli.command {
        Command::Serve(args) => serve(args).await,
        Command::Extract(args) => extract(args, progress).await,
        Command::Summarize(args) => summarize(args, progress).await,
    }
}

fn as_callback(cb: &Option<Arc<CliProgressCallback>>) -> Option<ProgressCallback> {
    cb.as_ref()
        .map(|c| Arc::clone(c) as Arc<dyn PipelineProgressCallback>)
}

async fn serve(args: ServeArgs) -> Result<()> {
    let pipeline = args.pipeline.to_config(None)?;
    let server = ServerConfig {
        host: args.host,
        port: args.port,
        allowed_origin: args.allowed_origin,
        max_upload_bytes: (args.max_upload_mb as usize) * 1024 * 1024,
    };
    api::serve(server, pipeline).await.context("Server error")
}

async fn extract(args: ExtractArgs, progress: Option<Arc<CliProgressCallback>>) -> Result<()> {
    let config = args.pipeline.to_config(as_callback(&progress))?;
    let document = resolve_input(&args.input, args.pipeline.download_timeout)
        .await
        .with_context(|| format!("Failed to load {}", args.input))?;

    let ocr = OcrOrchestrator::new(
        Arc::new(PdfiumRasterizer::new(
            config.raster_width,
            config.raster_height,
            config.password.clone(),
        )),
        Arc::new(TesseractCli::new(config.tesseract_binary.clone())),
        &config,
    );
    let coordinator = ExtractionCoordinator::new(
        Arc::new(PdfiumTextExtractor::new(config.password.clone())),
        ocr,
        config.progress_callback.clone(),
    );

    let ticket = RunTicket::detached();
    let result = if args.ocr_only {
        coordinator
            .ocr(&document, ticket.run_id, &ticket.cancel, None)
            .await
    } else {
        coordinator
            .extract(&document, ticket.run_id, &ticket.cancel)
            .await
    };

    if let Some(cb) = &progress {
        cb.bar.finish_and_clear();
    }
    let result = result.context("Extraction failed")?;

    let rendered = if args.json {
        serde_json::to_string_pretty(&result).context("Failed to serialize result")?
    } else {
        result.text.clone()
    };

    match args.output {
        Some(path) => {
            std::fs::write(&path, format!("{rendered}\n"))
                .with_context(|| format!("Failed to write {}", path.display()))?;
            eprintln!("{} wrote {}", green("✔"), bold(&path.display().to_string()));
        }
        None => {
            let mut stdout = io::stdout().lock();
            writeln!(stdout, "{rendered}").context("Failed to write to stdout")?;
        }
    }

    for failure in &result.failed_pages {
        eprintln!("{} {}", red("⚠"), failure);
    }
    if result.truncated {
        eprintln!(
            "{} OCR stopped at {} pages; raise --max-ocr-pages for the rest",
            red("⚠"),
            config.max_ocr_pages
        );
    }
    Ok(())
}

async fn summarize(args: SummarizeArgs, progress: Option<Arc<CliProgressCallback>>) -> Result<()> {
    let config = args.pipeline.to_config(as_callback(&progress))?;
    let document = resolve_input(&args.input, args.pipeline.download_timeout)
        .await
        .with_context(|| format!("Failed to load {}", args.input))?;

    let backends = match Backends::production(&config).await {
        Ok(b) => b,
        Err(e) => {
            if let Some(cb) = &progress {
                cb.bar.finish_and_clear();
            }
            return Err(e).context("Failed to initialise the language model provider");
        }
    };
    let controller = PipelineController::new(backends, &config);
    let run = controller.run(&document).await;

    if args.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&run).context("Failed to serialize run")?
        );
    }

    match run.into_result() {
        Ok(summary) => {
            if !args.json {
                println!("{}", summary.text);
            }
            Ok(())
        }
        Err(failure) => bail!("failed while {}: {}", failure.stage, failure.message),
    }
}
