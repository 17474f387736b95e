//! Pagepress document-to-PDF pipeline
//!
//! A conversion pipeline that takes the asset tree produced by a document
//! emitter (HTML, stylesheets, images), rewrites it into a single
//! self-contained document, optionally splices in a cover page and a table of
//! contents, and drives a pluggable rendering backend to produce paginated
//! PDF bytes.
//!
//! # Features
//!
//! - **CDP Backend** (`cdp` feature): print-to-PDF via headless Chrome
//! - **Pluggable Design**: emitter and rendering backend are injected traits
//! - **Self-contained Output**: stylesheets and images inlined before render
//!
//! # Example
//!
//! ```no_run
//! use pagepress::{ConvertOptions, Converter, PageSize};
//!
//! # async fn run<E, B>(emitter: E, backend: B) -> Result<(), Box<dyn std::error::Error>>
//! # where E: pagepress::DocumentEmitter, B: pagepress::RenderBackend {
//! let converter = Converter::new(emitter, backend)?;
//! let options = ConvertOptions {
//!     page_size: PageSize::A4,
//!     include_toc: true,
//!     ..Default::default()
//! };
//! let result = converter.convert("guide.md", Some(options)).await;
//! assert!(result.success);
//! # Ok(())
//! # }
//! ```

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub mod augment;
pub mod convert;
pub mod error;
pub mod inline;
pub mod layout;
pub mod metadata;
pub mod options;

pub use convert::Converter;
pub use error::{Error, Result};
pub use layout::PageGeometry;

// CDP-backed rendering backend (feature-gated)
#[cfg(feature = "cdp")]
pub mod cdp;

#[cfg(feature = "cdp")]
pub use cdp::ChromeBackend;

/// Well-known asset-map key of the root document entry.
pub const ROOT_DOCUMENT: &str = "index.html";

/// One emitted asset: either a text file (HTML, CSS) or raw bytes (images).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssetContent {
    Text(String),
    Binary(Vec<u8>),
}

impl AssetContent {
    /// Raw byte view regardless of variant.
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            AssetContent::Text(s) => s.as_bytes(),
            AssetContent::Binary(b) => b,
        }
    }
}

/// Mapping from relative file path to emitted content.
///
/// Produced by the [`DocumentEmitter`] collaborator; must contain a
/// [`ROOT_DOCUMENT`] text entry for a conversion to proceed.
pub type AssetMap = HashMap<String, AssetContent>;

/// Page size preset, or `Custom` paired with explicit `width`/`height`
/// options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PageSize {
    A3,
    A4,
    A5,
    Letter,
    Legal,
    Tabloid,
    Custom,
}

/// Page orientation. Custom dimensions are interpreted as portrait-oriented
/// and swapped once when landscape is requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Orientation {
    Portrait,
    Landscape,
}

/// Four independently optional CSS-length margins.
///
/// Unset sides are filled per-side from the fixed default during option
/// resolution (a structural merge, not a wholesale replacement).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Margins {
    pub top: Option<String>,
    pub right: Option<String>,
    pub bottom: Option<String>,
    pub left: Option<String>,
}

/// Cover page configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CoverOptions {
    /// Title override; falls back to the extracted document title
    pub title: Option<String>,
    /// Optional subtitle line
    pub subtitle: Option<String>,
    /// Author label shown on the metadata line
    pub author: Option<String>,
    /// Whether to show the author label
    pub show_author: bool,
    /// Whether to show the formatted modification date
    pub show_date: bool,
    /// Whether to show the version tag
    pub show_version: bool,
    /// Custom cover template with `{{title}}`, `{{subtitle}}`, `{{author}}`,
    /// `{{date}}` and `{{version}}` placeholders
    pub template: Option<String>,
}

impl Default for CoverOptions {
    fn default() -> Self {
        Self {
            title: None,
            subtitle: None,
            author: None,
            show_author: true,
            show_date: true,
            show_version: true,
            template: None,
        }
    }
}

/// Table-of-contents configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TocOptions {
    /// Heading shown above the entry list
    pub title: String,
    /// Deepest heading level included (1..=6)
    pub max_depth: u8,
    /// Whether to append heuristic page numbers to entries
    pub page_numbers: bool,
}

impl Default for TocOptions {
    fn default() -> Self {
        Self {
            title: "Table of Contents".to_string(),
            max_depth: 3,
            page_numbers: true,
        }
    }
}

/// Options for one conversion
///
/// All fields have defaults; see [`options::resolve`] for the merge rules and
/// [`options::validate`] for the validation rules applied to the merged
/// result. Deserializable from JS-style camelCase objects via
/// [`ConvertOptions::from_json`].
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ConvertOptions {
    /// Page size preset, or `Custom` with `width`/`height`
    pub page_size: PageSize,
    /// Custom page width as a CSS length (used with `PageSize::Custom`)
    pub width: Option<String>,
    /// Custom page height as a CSS length (used with `PageSize::Custom`)
    pub height: Option<String>,
    /// Page orientation
    pub orientation: Orientation,
    /// Page margins
    pub margin: Margins,
    /// Whether to synthesize a cover page
    pub include_cover: bool,
    /// Whether to synthesize a table of contents
    pub include_toc: bool,
    /// Cover page configuration
    pub cover: CoverOptions,
    /// Table-of-contents configuration
    pub toc: TocOptions,
    /// Whether to print background colors and images
    pub print_background: bool,
    /// Render scale factor, valid range (0, 2]
    pub scale: f64,
    /// Settle delay after document load, in milliseconds
    pub render_delay_ms: u64,
    /// Output file path; when absent the PDF bytes are returned instead
    pub output_path: Option<PathBuf>,
    /// Match inlined assets by full relative path instead of bare filename
    pub strict_asset_paths: bool,
    /// Progress callback, invoked at each stage transition
    #[serde(skip)]
    pub on_progress: Option<ProgressHandler>,
    /// Cancellation token, checked at each stage boundary
    #[serde(skip)]
    pub cancel: Option<CancelToken>,
}

impl Default for ConvertOptions {
    fn default() -> Self {
        Self {
            page_size: PageSize::A4,
            width: None,
            height: None,
            orientation: Orientation::Portrait,
            margin: Margins::default(),
            include_cover: true,
            include_toc: false,
            cover: CoverOptions::default(),
            toc: TocOptions::default(),
            print_background: true,
            scale: 1.0,
            render_delay_ms: 500,
            output_path: None,
            strict_asset_paths: false,
            on_progress: None,
            cancel: None,
        }
    }
}

impl ConvertOptions {
    /// Parse options from a JSON object (camelCase keys, all fields optional).
    pub fn from_json(json: &str) -> std::result::Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

/// Document metadata derived from the emitted assets
///
/// Derived, not authoritative: undiscoverable fields degrade to fixed
/// fallbacks, never to an error.
#[derive(Debug, Clone, Serialize)]
pub struct DocMetadata {
    pub title: String,
    pub created: DateTime<Utc>,
    pub modified: DateTime<Utc>,
    pub version: String,
    pub id: String,
}

/// Lifecycle status of a conversion task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProgressStatus {
    ConvertingHtml,
    GeneratingCover,
    GeneratingToc,
    GeneratingPdf,
    Completed,
    Failed,
}

/// One progress event; `percent` is monotonically non-decreasing within a
/// single conversion.
#[derive(Debug, Clone, Serialize)]
pub struct ProgressEvent {
    pub task_id: String,
    pub status: ProgressStatus,
    pub percent: u8,
    pub message: Option<String>,
}

/// Shared progress callback invoked at each stage transition.
#[derive(Clone)]
pub struct ProgressHandler(Arc<dyn Fn(&ProgressEvent) + Send + Sync>);

impl ProgressHandler {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&ProgressEvent) + Send + Sync + 'static,
    {
        Self(Arc::new(f))
    }

    pub fn notify(&self, event: &ProgressEvent) {
        (self.0)(event)
    }
}

impl fmt::Debug for ProgressHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ProgressHandler(..)")
    }
}

/// Cooperative cancellation token, checked at each stage boundary.
///
/// Cancelling does not abort a suspension point already in flight; the
/// conversion observes the token at the next boundary and fails with
/// [`Error::Cancelled`].
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Final outcome of one conversion task
///
/// Exactly one of `output_path` / `data` is populated on success. Built once
/// per call and immutable after return.
#[derive(Debug)]
pub struct ConversionResult {
    pub success: bool,
    pub task_id: String,
    pub output_path: Option<PathBuf>,
    pub data: Option<Vec<u8>>,
    pub page_count: Option<u32>,
    pub error: Option<Error>,
    pub duration: Duration,
}

/// Print parameters handed to the rendering session
///
/// Dimensions and margins are in inches, the unit print backends speak.
#[derive(Debug, Clone, PartialEq)]
pub struct PrintParams {
    pub width_in: f64,
    pub height_in: f64,
    pub landscape: bool,
    pub print_background: bool,
    pub scale: f64,
    pub margin_top_in: f64,
    pub margin_right_in: f64,
    pub margin_bottom_in: f64,
    pub margin_left_in: f64,
}

/// External collaborator that turns a source reference into an asset map.
///
/// The pipeline only requires the returned map to contain a [`ROOT_DOCUMENT`]
/// text entry; emitter failures are forwarded verbatim.
pub trait DocumentEmitter: Send + Sync {
    fn emit(&self, source: &str) -> impl Future<Output = anyhow::Result<AssetMap>> + Send;
}

/// Capability interface for the external print-rendering engine.
///
/// Injected at construction; availability is checked once when the
/// [`Converter`] is built, so runtime failures are never confused with a
/// missing capability.
pub trait RenderBackend: Send + Sync {
    type Session: RenderSession;

    /// Whether the backing engine is present in this environment.
    fn is_available(&self) -> bool;

    /// Acquire a fresh rendering session. One session per conversion; the
    /// pipeline never pools or retains sessions across calls.
    fn launch(&self) -> impl Future<Output = Result<Self::Session>> + Send;
}

/// A bounded-lifetime rendering session owned by a single conversion.
///
/// The pipeline releases the session on every exit path, including failures
/// during load, settle, or print.
pub trait RenderSession: Send {
    /// Load a complete HTML document and wait until no further network
    /// activity is pending.
    fn load_document(&mut self, html: &str) -> impl Future<Output = Result<()>> + Send;

    /// Total rendered content height in CSS pixels, used for the approximate
    /// page estimate.
    fn content_height(&mut self) -> impl Future<Output = Result<f64>> + Send;

    /// Produce paginated PDF bytes with the given print parameters.
    fn print_to_pdf(&mut self, params: &PrintParams) -> impl Future<Output = Result<Vec<u8>>> + Send;

    /// Release the session and its underlying engine resources.
    fn close(self) -> impl Future<Output = Result<()>> + Send;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_options() {
        let opts = ConvertOptions::default();
        assert_eq!(opts.page_size, PageSize::A4);
        assert_eq!(opts.orientation, Orientation::Portrait);
        assert!(opts.include_cover);
        assert!(!opts.include_toc);
        assert_eq!(opts.scale, 1.0);
        assert_eq!(opts.margin, Margins::default());
    }

    #[test]
    fn test_options_from_json() {
        let opts = ConvertOptions::from_json(
            r#"{"pageSize":"letter","orientation":"landscape","includeToc":true,
                "margin":{"top":"10mm"},"toc":{"maxDepth":2}}"#,
        )
        .unwrap();
        assert_eq!(opts.page_size, PageSize::Letter);
        assert_eq!(opts.orientation, Orientation::Landscape);
        assert!(opts.include_toc);
        assert_eq!(opts.margin.top.as_deref(), Some("10mm"));
        assert_eq!(opts.margin.left, None);
        assert_eq!(opts.toc.max_depth, 2);
    }

    #[test]
    fn test_cancel_token() {
        let token = CancelToken::new();
        let clone = token.clone();
        assert!(!clone.is_cancelled());
        token.cancel();
        assert!(clone.is_cancelled());
    }
}
