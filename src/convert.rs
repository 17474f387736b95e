//! Conversion orchestration
//!
//! Drives one conversion end to end: option resolution, document emission,
//! resource inlining, augmentation, rendering, page estimation, and result
//! assembly. Every failure path folds into the returned
//! [`ConversionResult`]; nothing escapes [`Converter::convert`] as an error.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use log::{debug, warn};
use sha2::{Digest, Sha256};
use tokio::time::{sleep, timeout};

use crate::error::{Error, Result};
use crate::layout::PageGeometry;
use crate::{
    augment, inline, layout, metadata, options, AssetContent, ConversionResult, ConvertOptions,
    DocumentEmitter, PrintParams, ProgressEvent, ProgressHandler, ProgressStatus, RenderBackend,
    RenderSession, ROOT_DOCUMENT,
};

/// Fixed bound on the document-load wait.
pub const LOAD_TIMEOUT_MS: u64 = 30_000;

static TASK_COUNTER: AtomicU64 = AtomicU64::new(0);

fn new_task_id() -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    let counter = TASK_COUNTER.fetch_add(1, Ordering::Relaxed);
    let mut hasher = Sha256::new();
    hasher.update(nanos.to_le_bytes());
    hasher.update(counter.to_le_bytes());
    format!("task-{}", hex::encode(&hasher.finalize()[..6]))
}

/// Progress trail for one task. Percentages never move backwards.
struct ProgressTrail {
    task_id: String,
    handler: Option<ProgressHandler>,
    last_percent: AtomicU8,
}

impl ProgressTrail {
    fn new(task_id: String, handler: Option<ProgressHandler>) -> Self {
        Self {
            task_id,
            handler,
            last_percent: AtomicU8::new(0),
        }
    }

    fn emit(&self, status: ProgressStatus, percent: u8, message: &str) {
        let percent = self.last_percent.fetch_max(percent, Ordering::Relaxed).max(percent);
        debug!("{}: {:?} {}% ({})", self.task_id, status, percent, message);
        if let Some(handler) = &self.handler {
            handler.notify(&ProgressEvent {
                task_id: self.task_id.clone(),
                status,
                percent,
                message: Some(message.to_string()),
            });
        }
    }
}

fn check_cancel(options: &ConvertOptions) -> Result<()> {
    match &options.cancel {
        Some(token) if token.is_cancelled() => Err(Error::Cancelled),
        _ => Ok(()),
    }
}

/// Best-effort page estimate from rendered content height.
///
/// Approximate by contract: total content height divided by the nominal page
/// height, clamped to at least one page.
fn estimate_pages(content_height_px: f64, geometry: &PageGeometry) -> u32 {
    let per_page = geometry.height_px();
    if per_page <= 0.0 || !content_height_px.is_finite() {
        return 1;
    }
    (content_height_px / per_page).ceil().max(1.0) as u32
}

fn print_params(geometry: &PageGeometry, options: &ConvertOptions) -> PrintParams {
    let margin_in = |side: &Option<String>| {
        side.as_deref()
            .and_then(layout::css_length_to_mm)
            .map(|mm| mm / 25.4)
            .unwrap_or(20.0 / 25.4)
    };
    PrintParams {
        width_in: geometry.width_in(),
        height_in: geometry.height_in(),
        landscape: geometry.landscape,
        print_background: options.print_background,
        scale: options.scale,
        margin_top_in: margin_in(&options.margin.top),
        margin_right_in: margin_in(&options.margin.right),
        margin_bottom_in: margin_in(&options.margin.bottom),
        margin_left_in: margin_in(&options.margin.left),
    }
}

/// Converter over an injected document emitter and rendering backend.
///
/// Built with an explicit factory; there is no process-wide shared instance.
/// Each [`convert`](Converter::convert) call is an independent task with its
/// own identifier, progress trail, and rendering session.
#[derive(Debug)]
pub struct Converter<E, B> {
    emitter: E,
    backend: B,
}

impl<E, B> Converter<E, B>
where
    E: DocumentEmitter,
    B: RenderBackend,
{
    /// Build a converter, checking the backend capability once.
    pub fn new(emitter: E, backend: B) -> Result<Self> {
        if !backend.is_available() {
            return Err(Error::BackendUnavailable(
                "rendering engine not found in this environment".into(),
            ));
        }
        Ok(Self { emitter, backend })
    }

    /// Convert one source document to PDF.
    ///
    /// Never returns an error: every failure is reported through the result's
    /// `error` field with `success = false`. The terminal progress event is
    /// always `Completed` (100%) or `Failed`.
    pub async fn convert(
        &self,
        source: &str,
        options: Option<ConvertOptions>,
    ) -> ConversionResult {
        let started = Instant::now();
        let task_id = new_task_id();
        let (opts, validation) = options::resolve_and_validate(options);
        let trail = ProgressTrail::new(task_id.clone(), opts.on_progress.clone());

        let outcome = match validation.into_error() {
            Some(err) => Err(err),
            None => self.run(source, &opts, &trail).await,
        };

        match outcome {
            Ok((output_path, data, page_count)) => {
                trail.emit(ProgressStatus::Completed, 100, "conversion complete");
                ConversionResult {
                    success: true,
                    task_id,
                    output_path,
                    data,
                    page_count: Some(page_count),
                    error: None,
                    duration: started.elapsed(),
                }
            }
            Err(err) => {
                warn!("{}: conversion failed: {}", task_id, err);
                trail.emit(ProgressStatus::Failed, 0, err.code());
                ConversionResult {
                    success: false,
                    task_id,
                    output_path: None,
                    data: None,
                    page_count: None,
                    error: Some(err),
                    duration: started.elapsed(),
                }
            }
        }
    }

    async fn run(
        &self,
        source: &str,
        opts: &ConvertOptions,
        trail: &ProgressTrail,
    ) -> Result<(Option<PathBuf>, Option<Vec<u8>>, u32)> {
        check_cancel(opts)?;
        trail.emit(ProgressStatus::ConvertingHtml, 0, "emitting document");

        let assets = self.emitter.emit(source).await.map_err(Error::Emitter)?;
        check_cancel(opts)?;

        let root = match assets.get(ROOT_DOCUMENT) {
            Some(AssetContent::Text(html)) => html.clone(),
            _ => return Err(Error::MissingDocument(ROOT_DOCUMENT.to_string())),
        };

        let meta = metadata::extract(&assets);
        let mut html = inline::inline_assets(&root, &assets, opts.strict_asset_paths);
        let geometry = layout::resolve(opts)?;

        if opts.include_cover {
            trail.emit(ProgressStatus::GeneratingCover, 20, "generating cover");
            html = augment::insert_cover(&html, &meta, &opts.cover)?;
        }
        if opts.include_toc {
            trail.emit(ProgressStatus::GeneratingToc, 30, "generating table of contents");
            html = augment::insert_toc(&html, &opts.toc)?;
        }
        html = augment::inject_print_styles(&html, &geometry, opts);
        check_cancel(opts)?;

        trail.emit(ProgressStatus::GeneratingPdf, 40, "launching render session");
        let session = self.backend.launch().await?;
        let rendered = render_steps(session, &html, &geometry, opts, trail).await;
        let (bytes, page_count) = rendered?;
        check_cancel(opts)?;

        match &opts.output_path {
            Some(path) => {
                write_output(path, &bytes).await?;
                Ok((Some(path.clone()), None, page_count))
            }
            None => Ok((None, Some(bytes), page_count)),
        }
    }
}

/// Drive the rendering session through load, settle, print, and page
/// estimation. The session is released on every exit path.
async fn render_steps<S: RenderSession>(
    mut session: S,
    html: &str,
    geometry: &PageGeometry,
    opts: &ConvertOptions,
    trail: &ProgressTrail,
) -> Result<(Vec<u8>, u32)> {
    let result = drive(&mut session, html, geometry, opts, trail).await;
    if let Err(err) = session.close().await {
        warn!("render session close failed: {}", err);
    }
    result
}

async fn drive<S: RenderSession>(
    session: &mut S,
    html: &str,
    geometry: &PageGeometry,
    opts: &ConvertOptions,
    trail: &ProgressTrail,
) -> Result<(Vec<u8>, u32)> {
    timeout(
        Duration::from_millis(LOAD_TIMEOUT_MS),
        session.load_document(html),
    )
    .await
    .map_err(|_| Error::LoadTimeout(LOAD_TIMEOUT_MS))??;
    trail.emit(ProgressStatus::GeneratingPdf, 60, "document loaded");
    check_cancel(opts)?;

    // Settle delay for rendering work with no network-observable signal
    // (style recalculation, late script execution).
    sleep(Duration::from_millis(opts.render_delay_ms)).await;

    let params = print_params(geometry, opts);
    let bytes = session.print_to_pdf(&params).await?;
    trail.emit(ProgressStatus::GeneratingPdf, 80, "print output produced");

    let page_count = match session.content_height().await {
        Ok(height) => estimate_pages(height, geometry),
        Err(err) => {
            warn!("content height unavailable, assuming one page: {}", err);
            1
        }
    };
    Ok((bytes, page_count))
}

async fn write_output(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| Error::FileWrite {
                path: path.to_path_buf(),
                message: e.to_string(),
            })?;
        }
    }
    tokio::fs::write(path, bytes).await.map_err(|e| Error::FileWrite {
        path: path.to_path_buf(),
        message: e.to_string(),
    })
}
