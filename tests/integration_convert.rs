//! Integration tests for the conversion pipeline

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use pagepress::{
    AssetContent, AssetMap, CancelToken, ConvertOptions, Converter, DocumentEmitter, Error,
    Orientation, PageSize, PrintParams, ProgressEvent, ProgressHandler, ProgressStatus,
    RenderBackend, RenderSession, Result, TocOptions, ROOT_DOCUMENT,
};

/// Emitter returning a fixed asset map.
#[derive(Debug)]
struct MockEmitter {
    assets: AssetMap,
}

impl MockEmitter {
    fn with_root(html: &str) -> Self {
        let mut assets = AssetMap::new();
        assets.insert(ROOT_DOCUMENT.to_string(), AssetContent::Text(html.to_string()));
        Self { assets }
    }
}

impl DocumentEmitter for MockEmitter {
    async fn emit(&self, _source: &str) -> anyhow::Result<AssetMap> {
        Ok(self.assets.clone())
    }
}

/// Emitter that always reports failure.
struct FailingEmitter;

impl DocumentEmitter for FailingEmitter {
    async fn emit(&self, source: &str) -> anyhow::Result<AssetMap> {
        anyhow::bail!("emitter rejected '{}'", source)
    }
}

/// In-memory rendering backend recording what the pipeline sends it.
#[derive(Debug, Clone)]
struct MockBackend {
    available: bool,
    fail_print: bool,
    hang_load: bool,
    content_height: f64,
    sessions_closed: Arc<AtomicUsize>,
    last_html: Arc<Mutex<String>>,
    last_params: Arc<Mutex<Option<PrintParams>>>,
}

impl Default for MockBackend {
    fn default() -> Self {
        Self {
            available: true,
            fail_print: false,
            hang_load: false,
            content_height: 1000.0,
            sessions_closed: Arc::new(AtomicUsize::new(0)),
            last_html: Arc::new(Mutex::new(String::new())),
            last_params: Arc::new(Mutex::new(None)),
        }
    }
}

impl RenderBackend for MockBackend {
    type Session = MockSession;

    fn is_available(&self) -> bool {
        self.available
    }

    async fn launch(&self) -> Result<MockSession> {
        Ok(MockSession {
            backend: self.clone(),
        })
    }
}

struct MockSession {
    backend: MockBackend,
}

impl RenderSession for MockSession {
    async fn load_document(&mut self, html: &str) -> Result<()> {
        if self.backend.hang_load {
            std::future::pending::<()>().await;
        }
        *self.backend.last_html.lock().unwrap() = html.to_string();
        Ok(())
    }

    async fn content_height(&mut self) -> Result<f64> {
        Ok(self.backend.content_height)
    }

    async fn print_to_pdf(&mut self, params: &PrintParams) -> Result<Vec<u8>> {
        *self.backend.last_params.lock().unwrap() = Some(params.clone());
        if self.backend.fail_print {
            return Err(Error::PrintFailed("mock print failure".into()));
        }
        Ok(b"%PDF-1.7 mock output".to_vec())
    }

    async fn close(self) -> Result<()> {
        self.backend.sessions_closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

fn fast_options() -> ConvertOptions {
    ConvertOptions {
        render_delay_ms: 0,
        ..Default::default()
    }
}

const GUIDE: &str = "<html><head><title>Guide</title></head>\
                     <body><h1>Intro</h1><h2>Setup</h2><h3>Details</h3></body></html>";

#[tokio::test]
async fn scenario_a_returns_bytes() {
    let backend = MockBackend::default();
    let converter = Converter::new(MockEmitter::with_root(GUIDE), backend.clone()).unwrap();

    let result = converter
        .convert(
            "guide.md",
            Some(ConvertOptions {
                page_size: PageSize::A4,
                orientation: Orientation::Portrait,
                ..fast_options()
            }),
        )
        .await;

    assert!(result.success, "error: {:?}", result.error);
    assert!(result.page_count.unwrap() >= 1);
    assert!(result.output_path.is_none());
    let data = result.data.expect("bytes populated");
    assert!(data.starts_with(b"%PDF"));
    assert_eq!(backend.sessions_closed.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn scenario_b_custom_without_height_fails_validation() {
    let backend = MockBackend::default();
    let converter = Converter::new(MockEmitter::with_root(GUIDE), backend.clone()).unwrap();

    let result = converter
        .convert(
            "guide.md",
            Some(ConvertOptions {
                page_size: PageSize::Custom,
                width: Some("100mm".to_string()),
                ..fast_options()
            }),
        )
        .await;

    assert!(!result.success);
    assert_eq!(result.error.unwrap().code(), "invalid-page-size");
    // Validation failure is terminal: no session is ever acquired
    assert_eq!(backend.sessions_closed.load(Ordering::SeqCst), 0);
    assert!(backend.last_html.lock().unwrap().is_empty());
}

#[tokio::test]
async fn scenario_c_writes_output_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested/out/report.pdf");
    let backend = MockBackend::default();
    let converter = Converter::new(MockEmitter::with_root(GUIDE), backend).unwrap();

    let result = converter
        .convert(
            "guide.md",
            Some(ConvertOptions {
                output_path: Some(path.clone()),
                ..fast_options()
            }),
        )
        .await;

    assert!(result.success, "error: {:?}", result.error);
    assert_eq!(result.output_path.as_deref(), Some(path.as_path()));
    assert!(result.data.is_none(), "bytes omitted when a path is requested");
    let written = std::fs::read(&path).unwrap();
    assert_eq!(written, b"%PDF-1.7 mock output");
}

#[tokio::test]
async fn missing_root_document_is_reported() {
    let backend = MockBackend::default();
    let converter = Converter::new(MockEmitter { assets: AssetMap::new() }, backend).unwrap();
    let result = converter.convert("guide.md", Some(fast_options())).await;
    assert!(!result.success);
    assert_eq!(result.error.unwrap().code(), "document-missing");
}

#[tokio::test]
async fn emitter_failure_is_forwarded() {
    let converter = Converter::new(FailingEmitter, MockBackend::default()).unwrap();
    let result = converter.convert("bad.md", Some(fast_options())).await;
    assert!(!result.success);
    let err = result.error.unwrap();
    assert_eq!(err.code(), "emitter-failed");
    assert!(err.to_string().contains("bad.md"));
}

#[test]
fn unavailable_backend_is_rejected_at_construction() {
    let backend = MockBackend {
        available: false,
        ..Default::default()
    };
    let err = Converter::new(MockEmitter::with_root(GUIDE), backend).unwrap_err();
    assert_eq!(err.code(), "backend-capability-unavailable");
}

#[tokio::test]
async fn session_released_on_print_failure() {
    let backend = MockBackend {
        fail_print: true,
        ..Default::default()
    };
    let converter = Converter::new(MockEmitter::with_root(GUIDE), backend.clone()).unwrap();
    let result = converter.convert("guide.md", Some(fast_options())).await;
    assert!(!result.success);
    assert_eq!(result.error.unwrap().code(), "print-generation-failed");
    assert_eq!(backend.sessions_closed.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn stalled_document_load_times_out() {
    let backend = MockBackend {
        hang_load: true,
        ..Default::default()
    };
    let converter = Converter::new(MockEmitter::with_root(GUIDE), backend.clone()).unwrap();
    let result = converter.convert("guide.md", Some(fast_options())).await;
    assert!(!result.success);
    assert_eq!(result.error.unwrap().code(), "document-load-timeout");
    // The stalled session is still released
    assert_eq!(backend.sessions_closed.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn failed_output_write_fails_the_conversion() {
    let dir = tempfile::tempdir().unwrap();
    // A plain file where the output directory should be makes the write fail
    let blocker = dir.path().join("occupied");
    std::fs::write(&blocker, b"plain file").unwrap();
    let path = blocker.join("report.pdf");

    let (handler, events) = collecting_handler();
    let converter =
        Converter::new(MockEmitter::with_root(GUIDE), MockBackend::default()).unwrap();
    let result = converter
        .convert(
            "guide.md",
            Some(ConvertOptions {
                output_path: Some(path),
                on_progress: Some(handler),
                ..fast_options()
            }),
        )
        .await;

    assert!(!result.success);
    assert_eq!(result.error.unwrap().code(), "file-write-failed");
    assert!(result.data.is_none(), "produced bytes are not returned as a fallback");
    assert!(result.output_path.is_none());
    // The terminal progress event on a failure path is Failed
    let events = events.lock().unwrap();
    assert_eq!(events.last().unwrap().status, ProgressStatus::Failed);
}

#[tokio::test]
async fn augmented_document_reaches_the_backend() {
    let mut emitter = MockEmitter::with_root(
        r#"<html><head><title>Guide</title><link rel="stylesheet" href="style.css"></head>
           <body><h1>Intro</h1><h2>Setup</h2><h3>Details</h3><img src="logo.png"></body></html>"#,
    );
    emitter.assets.insert(
        "style.css".to_string(),
        AssetContent::Text("h1 { color: blue; }".to_string()),
    );
    emitter.assets.insert(
        "logo.png".to_string(),
        AssetContent::Binary(vec![0x89, 0x50, 0x4e, 0x47]),
    );
    let backend = MockBackend::default();
    let converter = Converter::new(emitter, backend.clone()).unwrap();

    let result = converter
        .convert(
            "guide.md",
            Some(ConvertOptions {
                include_toc: true,
                toc: TocOptions {
                    max_depth: 2,
                    ..Default::default()
                },
                ..fast_options()
            }),
        )
        .await;
    assert!(result.success, "error: {:?}", result.error);

    let html = backend.last_html.lock().unwrap().clone();
    // Inlining left no external references
    assert!(!html.contains("<link"));
    assert!(!html.contains("logo.png"));
    assert!(html.contains("data:image/png;base64,"));
    assert!(html.contains("h1 { color: blue; }"));
    // Cover precedes the TOC, which holds exactly the depth<=2 headings
    let cover = html.find("pagepress-cover").unwrap();
    let toc = html.find("pagepress-toc").unwrap();
    assert!(cover < toc);
    assert_eq!(html.matches("pagepress-toc-entry").count(), 3);
    assert!(html.contains("@page"));
    assert!(html.contains("size: 210.00mm 297.00mm"));
}

#[tokio::test]
async fn landscape_geometry_reaches_print_params() {
    let backend = MockBackend::default();
    let converter = Converter::new(MockEmitter::with_root(GUIDE), backend.clone()).unwrap();
    let result = converter
        .convert(
            "guide.md",
            Some(ConvertOptions {
                orientation: Orientation::Landscape,
                ..fast_options()
            }),
        )
        .await;
    assert!(result.success);

    let params = backend.last_params.lock().unwrap().clone().unwrap();
    assert!(params.landscape);
    assert!(params.width_in > params.height_in);
    assert!((params.width_in - 297.0 / 25.4).abs() < 1e-9);
}

#[tokio::test]
async fn page_count_follows_content_height() {
    let backend = MockBackend {
        // A bit over three A4 pages at 96dpi
        content_height: 3500.0,
        ..Default::default()
    };
    let converter = Converter::new(MockEmitter::with_root(GUIDE), backend).unwrap();
    let result = converter.convert("guide.md", Some(fast_options())).await;
    assert_eq!(result.page_count, Some(4));
}

fn collecting_handler() -> (ProgressHandler, Arc<Mutex<Vec<ProgressEvent>>>) {
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = events.clone();
    let handler = ProgressHandler::new(move |e: &ProgressEvent| {
        sink.lock().unwrap().push(e.clone());
    });
    (handler, events)
}

#[tokio::test]
async fn progress_trail_is_ordered_and_terminal() {
    let (handler, events) = collecting_handler();
    let converter =
        Converter::new(MockEmitter::with_root(GUIDE), MockBackend::default()).unwrap();
    let result = converter
        .convert(
            "guide.md",
            Some(ConvertOptions {
                include_toc: true,
                on_progress: Some(handler),
                ..fast_options()
            }),
        )
        .await;
    assert!(result.success);

    let events = events.lock().unwrap();
    let statuses: Vec<_> = events.iter().map(|e| e.status).collect();
    assert_eq!(
        statuses,
        vec![
            ProgressStatus::ConvertingHtml,
            ProgressStatus::GeneratingCover,
            ProgressStatus::GeneratingToc,
            ProgressStatus::GeneratingPdf,
            ProgressStatus::GeneratingPdf,
            ProgressStatus::GeneratingPdf,
            ProgressStatus::Completed,
        ]
    );
    let last = events.last().unwrap();
    assert_eq!(last.percent, 100);
    assert!(events.windows(2).all(|w| w[0].percent <= w[1].percent));
    assert!(events.iter().all(|e| e.task_id == result.task_id));
}

#[tokio::test]
async fn concurrent_calls_are_independent() {
    let (handler_a, events_a) = collecting_handler();
    let (handler_b, events_b) = collecting_handler();
    let converter = Arc::new(
        Converter::new(MockEmitter::with_root(GUIDE), MockBackend::default()).unwrap(),
    );

    let (ra, rb) = tokio::join!(
        converter.convert(
            "a.md",
            Some(ConvertOptions {
                on_progress: Some(handler_a),
                ..fast_options()
            })
        ),
        converter.convert(
            "b.md",
            Some(ConvertOptions {
                on_progress: Some(handler_b),
                ..fast_options()
            })
        ),
    );

    assert!(ra.success && rb.success);
    assert_ne!(ra.task_id, rb.task_id);
    assert!(events_a
        .lock()
        .unwrap()
        .iter()
        .all(|e| e.task_id == ra.task_id));
    assert!(events_b
        .lock()
        .unwrap()
        .iter()
        .all(|e| e.task_id == rb.task_id));
}

#[tokio::test]
async fn cancellation_is_observed_at_stage_boundaries() {
    let token = CancelToken::new();
    token.cancel();
    let backend = MockBackend::default();
    let converter = Converter::new(MockEmitter::with_root(GUIDE), backend.clone()).unwrap();
    let result = converter
        .convert(
            "guide.md",
            Some(ConvertOptions {
                cancel: Some(token),
                ..fast_options()
            }),
        )
        .await;
    assert!(!result.success);
    assert_eq!(result.error.unwrap().code(), "cancelled");
    assert_eq!(backend.sessions_closed.load(Ordering::SeqCst), 0);
}
