//! Pipeline behaviour against in-memory backends.
//!
//! No pdfium, tesseract or network is needed; see `tests/e2e.rs` for the
//! live variants.

mod common;

use common::*;
use medpdf::{
    CancelFlag, ErrorKind, PipelineConfig, PipelineError, PipelineProgressCallback, Provenance,
    RunRegistry, RunState, RunTicket,
};
use medpdf::pipeline::coordinator::ExtractionCoordinator;
use medpdf::pipeline::orchestrator::OcrOrchestrator;
use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex};
use std::time::Duration;

const SCANNED: [&str; 3] = [
    "Patient: J. Doe\nHaemoglobin 13.1 g/dL",
    "Glucose 5.4 mmol/L (3.9-5.8)",
    "Signed: Dr. Smith",
];

fn coordinator(h: &Harness, config: &PipelineConfig) -> ExtractionCoordinator {
    let ocr = OcrOrchestrator::new(h.rasterizer.clone(), h.engines.clone(), config);
    ExtractionCoordinator::new(h.text.clone(), ocr, None)
}

// ── Scenario A: text layer present ───────────────────────────────────────────

#[tokio::test]
async fn text_layer_is_used_and_ocr_never_runs() {
    let h = Harness::new(
        FakeTextExtractor::with_pages(&["Page one: Na 140 mmol/L", "Page two: K 4.1 mmol/L"]),
        FakeRasterizer::with_pages(&SCANNED),
        FakeEngineFactory::new(),
        FakeSummarizer::ok(),
    );

    let run = h.controller().run(&pdf_doc()).await;

    assert_eq!(run.state, RunState::Done, "failure: {:?}", run.failure);
    let extraction = run.extraction.as_ref().unwrap();
    assert_eq!(extraction.provenance, Provenance::Direct);
    assert_eq!(
        extraction.text,
        "Page one: Na 140 mmol/L\nPage two: K 4.1 mmol/L"
    );
    assert_eq!(extraction.page_count, 2);
    assert!(!run.summary.as_ref().unwrap().text.is_empty());

    assert_eq!(h.rasterizer.opens.load(Ordering::SeqCst), 0);
    assert_eq!(h.engines.counters.starts.load(Ordering::SeqCst), 0);
    assert_eq!(h.summarizer.call_count(), 1);
    assert_eq!(
        run.history,
        vec![
            RunState::Idle,
            RunState::Extracting,
            RunState::Summarizing,
            RunState::Done
        ]
    );
}

#[tokio::test]
async fn empty_first_page_with_later_text_counts_as_direct() {
    let h = Harness::new(
        FakeTextExtractor::with_pages(&["", "  ", "Findings: normal"]),
        FakeRasterizer::with_pages(&SCANNED),
        FakeEngineFactory::new(),
        FakeSummarizer::ok(),
    );
    let run = h.controller().run(&pdf_doc()).await;
    let extraction = run.extraction.unwrap();
    assert_eq!(extraction.provenance, Provenance::Direct);
    assert_eq!(extraction.text, "Findings: normal");
    assert_eq!(h.engines.counters.starts.load(Ordering::SeqCst), 0);
}

// ── Scenario B: scanned document ─────────────────────────────────────────────

#[tokio::test]
async fn scanned_document_is_ocrd_page_by_page() {
    let h = Harness::new(
        FakeTextExtractor::empty(3),
        FakeRasterizer::with_pages(&SCANNED),
        FakeEngineFactory::new(),
        FakeSummarizer::ok(),
    );

    let run = h.controller().run(&pdf_doc()).await;

    assert_eq!(run.state, RunState::Done, "failure: {:?}", run.failure);
    let extraction = run.extraction.as_ref().unwrap();
    assert_eq!(extraction.provenance, Provenance::Ocr);
    assert_eq!(extraction.page_count, 3);

    // Pages 1, 2, 3 recognised; the fourth request hits end of document.
    assert_eq!(*h.engines.counters.recognised.lock().unwrap(), vec![1, 2, 3]);
    assert_eq!(h.rasterizer.next_calls.load(Ordering::SeqCst), 4);

    let p1 = extraction.text.find("--- Page 1 ---").unwrap();
    let p2 = extraction.text.find("--- Page 2 ---").unwrap();
    let p3 = extraction.text.find("--- Page 3 ---").unwrap();
    assert!(p1 < p2 && p2 < p3);
    assert!(extraction.text.contains("Glucose 5.4 mmol/L"));

    assert_eq!(h.engines.counters.starts.load(Ordering::SeqCst), 1);
    assert_eq!(h.engines.counters.shutdowns.load(Ordering::SeqCst), 1);
    assert_eq!(
        run.history,
        vec![
            RunState::Idle,
            RunState::Extracting,
            RunState::OcrExtracting,
            RunState::Summarizing,
            RunState::Done
        ]
    );
    assert_eq!(h.leftover_files(), 0, "per-run raster dir was not removed");
}

#[tokio::test]
async fn direct_failure_falls_back_to_ocr() {
    let h = Harness::new(
        FakeTextExtractor::failing("broken xref"),
        FakeRasterizer::with_pages(&SCANNED[..1]),
        FakeEngineFactory::new(),
        FakeSummarizer::ok(),
    );
    let run = h.controller().run(&pdf_doc()).await;
    assert_eq!(run.state, RunState::Done);
    assert_eq!(run.extraction.unwrap().provenance, Provenance::Ocr);
}

#[tokio::test]
async fn both_methods_failing_reports_both_causes() {
    let h = Harness::new(
        FakeTextExtractor::failing("broken xref"),
        FakeRasterizer::with_pages(&SCANNED),
        FakeEngineFactory::failing_init(),
        FakeSummarizer::ok(),
    );
    let run = h.controller().run(&pdf_doc()).await;

    let failure = run.failure.unwrap();
    assert_eq!(failure.kind, ErrorKind::ExtractionFailed);
    assert!(failure.message.contains("broken xref"), "got: {}", failure.message);
    assert!(failure.message.contains("language data missing"), "got: {}", failure.message);
    assert_eq!(h.summarizer.call_count(), 0);
}

// ── Scenario E: OCR engine fails to start ────────────────────────────────────

#[tokio::test]
async fn engine_start_failure_fails_in_ocr_stage() {
    let h = Harness::new(
        FakeTextExtractor::empty(2),
        FakeRasterizer::with_pages(&SCANNED),
        FakeEngineFactory::failing_init(),
        FakeSummarizer::ok(),
    );
    let run = h.controller().run(&pdf_doc()).await;

    assert_eq!(run.state, RunState::Failed);
    let failure = run.failure.as_ref().unwrap();
    assert_eq!(failure.stage, RunState::OcrExtracting);
    assert_eq!(failure.kind, ErrorKind::UpstreamUnavailable);
    assert_eq!(h.engines.counters.live(), 0);
    assert_eq!(h.rasterizer.opens.load(Ordering::SeqCst), 0);
    assert_eq!(h.summarizer.call_count(), 0);
}

// ── Page loop termination and isolation ──────────────────────────────────────

#[tokio::test]
async fn raster_error_fails_the_run_and_releases_engine() {
    let h = Harness::new(
        FakeTextExtractor::empty(3),
        FakeRasterizer::failing_at(&SCANNED, 2),
        FakeEngineFactory::new(),
        FakeSummarizer::ok(),
    );
    let run = h.controller().run(&pdf_doc()).await;

    assert_eq!(run.state, RunState::Failed);
    let failure = run.failure.unwrap();
    assert_eq!(failure.stage, RunState::OcrExtracting);
    assert!(failure.message.contains("page 2"), "got: {}", failure.message);
    assert_eq!(h.engines.counters.starts.load(Ordering::SeqCst), 1);
    assert_eq!(h.engines.counters.shutdowns.load(Ordering::SeqCst), 1);
    assert_eq!(h.summarizer.call_count(), 0);
}

#[tokio::test]
async fn one_unreadable_page_does_not_lose_the_document() {
    let h = Harness::new(
        FakeTextExtractor::empty(3),
        FakeRasterizer::with_pages(&SCANNED),
        FakeEngineFactory::failing_pages(&[2]),
        FakeSummarizer::ok(),
    );
    let run = h.controller().run(&pdf_doc()).await;

    assert_eq!(run.state, RunState::Done);
    let extraction = run.extraction.unwrap();
    assert_eq!(extraction.failed_pages.len(), 1);
    assert!(extraction.text.contains("--- Page 1 ---"));
    assert!(extraction.text.contains("--- Page 3 ---"));
    assert!(!extraction.text.contains("Glucose"));
}

#[tokio::test]
async fn every_page_failing_is_fatal() {
    let h = Harness::new(
        FakeTextExtractor::empty(2),
        FakeRasterizer::with_pages(&SCANNED[..2]),
        FakeEngineFactory::failing_pages(&[1, 2]),
        FakeSummarizer::ok(),
    );
    let run = h.controller().run(&pdf_doc()).await;
    let failure = run.failure.unwrap();
    assert_eq!(failure.stage, RunState::OcrExtracting);
    assert!(failure.message.contains("all 2 pages"), "got: {}", failure.message);
    assert_eq!(h.engines.counters.live(), 0);
}

#[tokio::test]
async fn page_cap_truncates_ocr() {
    let h = Harness::new(
        FakeTextExtractor::empty(3),
        FakeRasterizer::with_pages(&SCANNED),
        FakeEngineFactory::new(),
        FakeSummarizer::ok(),
    );
    let config = PipelineConfig::builder()
        .work_dir(h.work_dir.path())
        .max_ocr_pages(2)
        .build()
        .unwrap();
    let run = h.controller_with(&config).run(&pdf_doc()).await;

    let extraction = run.extraction.unwrap();
    assert!(extraction.truncated);
    assert_eq!(extraction.page_count, 2);
    assert!(!extraction.text.contains("--- Page 3 ---"));
}

// ── Empty after OCR ──────────────────────────────────────────────────────────

#[tokio::test]
async fn blank_scan_is_unreadable_and_never_summarised() {
    let h = Harness::new(
        FakeTextExtractor::empty(2),
        FakeRasterizer::with_pages(&["   ", "\n\x0c"]),
        FakeEngineFactory::new(),
        FakeSummarizer::ok(),
    );
    let run = h.controller().run(&pdf_doc()).await;

    assert_eq!(run.state, RunState::Failed);
    let failure = run.failure.as_ref().unwrap();
    assert_eq!(failure.stage, RunState::Summarizing);
    assert_eq!(failure.kind, ErrorKind::InputInvalid);
    assert_eq!(h.summarizer.call_count(), 0);

    // The (empty) OCR result is still published.
    let extraction = run.extraction.unwrap();
    assert_eq!(extraction.provenance, Provenance::Ocr);
    assert!(extraction.text.is_empty());
}

// ── Summarisation failures keep the text ─────────────────────────────────────

#[tokio::test]
async fn summary_failure_keeps_extracted_text() {
    let h = Harness::new(
        FakeTextExtractor::with_pages(&["Cholesterol 6.2 mmol/L"]),
        FakeRasterizer::with_pages(&[]),
        FakeEngineFactory::new(),
        FakeSummarizer::failing("503 Service Unavailable"),
    );
    let run = h.controller().run(&pdf_doc()).await;

    assert_eq!(run.state, RunState::Failed);
    let failure = run.failure.as_ref().unwrap();
    assert_eq!(failure.stage, RunState::Summarizing);
    assert_eq!(failure.kind, ErrorKind::UpstreamUnavailable);
    assert_eq!(run.extraction.unwrap().text, "Cholesterol 6.2 mmol/L");
    assert!(run.summary.is_none());
}

#[tokio::test]
async fn summarize_text_rejects_empty_without_a_call() {
    let h = Harness::new(
        FakeTextExtractor::empty(1),
        FakeRasterizer::with_pages(&[]),
        FakeEngineFactory::new(),
        FakeSummarizer::ok(),
    );
    let err = h
        .controller()
        .summarize_text("  \n ", &RunTicket::detached())
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::EmptyText));
    assert_eq!(h.summarizer.call_count(), 0);
}

// ── Idempotence ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn extraction_is_idempotent() {
    for text in [
        FakeTextExtractor::with_pages(&["A1c 6.1 %", "LDL 3.0"]),
        FakeTextExtractor::empty(3),
    ] {
        let h = Harness::new(
            text,
            FakeRasterizer::with_pages(&SCANNED),
            FakeEngineFactory::new(),
            FakeSummarizer::ok(),
        );
        let c = coordinator(&h, &h.config());
        let ticket = RunTicket::detached();
        let first = c.extract(&pdf_doc(), ticket.run_id, &ticket.cancel).await.unwrap();
        let second = c.extract(&pdf_doc(), ticket.run_id, &ticket.cancel).await.unwrap();
        assert_eq!(first.text, second.text);
        assert_eq!(first.provenance, second.provenance);
    }
}

// ── Cancellation ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn cancel_mid_ocr_stops_loop_and_releases_engine() {
    let flag = CancelFlag::new();
    let h = Harness::new(
        FakeTextExtractor::empty(3),
        FakeRasterizer::with_pages(&SCANNED),
        FakeEngineFactory::cancelling_after(1, flag.clone()),
        FakeSummarizer::ok(),
    );
    let ticket = RunTicket {
        run_id: uuid::Uuid::new_v4(),
        session: None,
        cancel: flag,
    };
    let run = h.controller().run_with(&pdf_doc(), &ticket).await;

    let failure = run.failure.unwrap();
    assert_eq!(failure.kind, ErrorKind::Cancelled);
    assert_eq!(failure.stage, RunState::OcrExtracting);
    assert_eq!(*h.engines.counters.recognised.lock().unwrap(), vec![1]);
    assert_eq!(h.engines.counters.live(), 0);
    assert_eq!(h.summarizer.call_count(), 0);
}

#[tokio::test]
async fn newer_upload_supersedes_pending_summary() {
    let h = Harness::new(
        FakeTextExtractor::with_pages(&["Ferritin 12 ng/mL"]),
        FakeRasterizer::with_pages(&[]),
        FakeEngineFactory::new(),
        FakeSummarizer::slow(Duration::from_secs(30)),
    );
    let controller = h.controller();
    let registry = RunRegistry::new();

    let first = registry.begin(Some("tab"));
    let pending = {
        let controller = controller.clone();
        let ticket = first.clone();
        tokio::spawn(async move { controller.run_with(&pdf_doc(), &ticket).await })
    };

    // Let the first run reach the model call.
    tokio::time::timeout(Duration::from_secs(5), async {
        while h.summarizer.call_count() == 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();

    let _second = registry.begin(Some("tab"));
    let run = tokio::time::timeout(Duration::from_secs(5), pending)
        .await
        .expect("superseded run did not stop")
        .unwrap();

    let failure = run.failure.unwrap();
    assert_eq!(failure.kind, ErrorKind::Cancelled);
    assert_eq!(failure.stage, RunState::Summarizing);
    assert!(run.extraction.is_some());
}

fn long_scan(pages: usize) -> Harness {
    let texts: Vec<String> = (1..=pages).map(|n| format!("scan page {n}")).collect();
    let texts: Vec<&str> = texts.iter().map(String::as_str).collect();
    Harness::new(
        FakeTextExtractor::empty(pages),
        FakeRasterizer::with_pages(&texts),
        FakeEngineFactory::slow(Duration::from_millis(50)),
        FakeSummarizer::ok(),
    )
}

/// Wait until the blocking OCR task has released its engine and work dir.
async fn wait_for_ocr_teardown(h: &Harness) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while h.engines.counters.live() > 0 || h.leftover_files() > 0 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("OCR kept running after its run was dropped");
}

#[tokio::test]
async fn dropped_run_stops_ocr() {
    let h = long_scan(20);
    let controller = h.controller();
    let ticket = RunTicket::detached();

    let outcome = tokio::time::timeout(
        Duration::from_millis(120),
        controller.run_with(&pdf_doc(), &ticket),
    )
    .await;
    assert!(outcome.is_err(), "run should still be in OCR");
    assert!(ticket.cancel.is_cancelled());

    let at_drop = h.engines.counters.recognised.lock().unwrap().len();
    wait_for_ocr_teardown(&h).await;
    tokio::time::sleep(Duration::from_millis(200)).await;

    let after = h.engines.counters.recognised.lock().unwrap().len();
    assert!(after <= at_drop + 1, "pages at drop={at_drop}, after={after}");
    assert!(after < 20);
    assert_eq!(h.summarizer.call_count(), 0);
}

#[tokio::test]
async fn disconnected_request_forgets_its_session() {
    let h = long_scan(20);
    let controller = h.controller();
    let registry = RunRegistry::new();

    let outcome = tokio::time::timeout(Duration::from_millis(120), async {
        let ticket = registry.begin(Some("tab"));
        controller.run_with(&pdf_doc(), &ticket).await
    })
    .await;
    assert!(outcome.is_err());
    assert_eq!(registry.active_sessions(), 0);

    wait_for_ocr_teardown(&h).await;
    assert!(h.engines.counters.recognised.lock().unwrap().len() < 20);
}

#[tokio::test]
async fn completed_run_leaves_its_ticket_uncancelled() {
    let h = Harness::new(
        FakeTextExtractor::with_pages(&["Na 140 mmol/L"]),
        FakeRasterizer::with_pages(&[]),
        FakeEngineFactory::new(),
        FakeSummarizer::ok(),
    );
    let ticket = RunTicket::detached();
    let run = h.controller().run_with(&pdf_doc(), &ticket).await;
    assert_eq!(run.state, RunState::Done);
    assert!(!ticket.cancel.is_cancelled());
}

// ── Progress events ──────────────────────────────────────────────────────────

#[derive(Default)]
struct Recorder {
    stages: Mutex<Vec<RunState>>,
    extracted: Mutex<Vec<Provenance>>,
    pages_done: Mutex<Vec<usize>>,
    completed: Mutex<usize>,
}

impl PipelineProgressCallback for Recorder {
    fn on_stage(&self, state: RunState) {
        self.stages.lock().unwrap().push(state);
    }
    fn on_text_extracted(&self, result: &medpdf::ExtractionResult) {
        self.extracted.lock().unwrap().push(result.provenance);
    }
    fn on_ocr_page_complete(&self, page_num: usize, _text_len: usize) {
        self.pages_done.lock().unwrap().push(page_num);
    }
    fn on_run_complete(&self, _run: &medpdf::PipelineRun) {
        *self.completed.lock().unwrap() += 1;
    }
}

#[tokio::test]
async fn progress_events_follow_the_run() {
    let h = Harness::new(
        FakeTextExtractor::empty(2),
        FakeRasterizer::with_pages(&SCANNED[..2]),
        FakeEngineFactory::new(),
        FakeSummarizer::ok(),
    );
    let recorder = Arc::new(Recorder::default());
    let config = PipelineConfig::builder()
        .work_dir(h.work_dir.path())
        .progress_callback(recorder.clone())
        .build()
        .unwrap();

    let run = h.controller_with(&config).run(&pdf_doc()).await;
    assert!(run.is_done());

    assert_eq!(
        *recorder.stages.lock().unwrap(),
        vec![
            RunState::Extracting,
            RunState::OcrExtracting,
            RunState::Summarizing,
            RunState::Done
        ]
    );
    assert_eq!(*recorder.extracted.lock().unwrap(), vec![Provenance::Ocr]);
    assert_eq!(*recorder.pages_done.lock().unwrap(), vec![1, 2]);
    assert_eq!(*recorder.completed.lock().unwrap(), 1);
}
