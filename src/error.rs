//! Error types for the conversion pipeline

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for conversion operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while converting a document to PDF
///
/// Each variant names a specific failure site; `code()` exposes the stable
/// string identifier hosts can match on.
#[derive(Error, Debug)]
pub enum Error {
    /// The rendering backend capability is not present in this environment
    #[error("Rendering backend unavailable: {0}")]
    BackendUnavailable(String),

    /// Launching a rendering session failed
    #[error("Failed to launch rendering session: {0}")]
    SessionLaunch(String),

    /// The document did not finish loading within the allowed time
    #[error("Document load timed out after {0}ms")]
    LoadTimeout(u64),

    /// PDF output generation failed
    #[error("PDF generation failed: {0}")]
    PrintFailed(String),

    /// Writing the output file failed
    #[error("Failed to write output file {path}: {message}")]
    FileWrite { path: PathBuf, message: String },

    /// Page size options did not validate
    #[error("Invalid page size: {0}")]
    InvalidPageSize(String),

    /// A margin value did not validate
    #[error("Invalid margin: {0}")]
    InvalidMargin(String),

    /// Cover page generation failed
    #[error("Cover generation failed: {0}")]
    CoverFailed(String),

    /// Table-of-contents generation failed
    #[error("TOC generation failed: {0}")]
    TocFailed(String),

    /// The document emitter reported failure (forwarded verbatim)
    #[error("Document emitter failed: {0}")]
    Emitter(#[from] anyhow::Error),

    /// The asset map is missing its root document entry
    #[error("Asset map has no root document entry '{0}'")]
    MissingDocument(String),

    /// The conversion was cancelled via its `CancelToken`
    #[error("Conversion cancelled")]
    Cancelled,
}

impl Error {
    /// Stable string code for this error, one per failure site.
    pub fn code(&self) -> &'static str {
        match self {
            Error::BackendUnavailable(_) => "backend-capability-unavailable",
            Error::SessionLaunch(_) => "session-launch-failed",
            Error::LoadTimeout(_) => "document-load-timeout",
            Error::PrintFailed(_) => "print-generation-failed",
            Error::FileWrite { .. } => "file-write-failed",
            Error::InvalidPageSize(_) => "invalid-page-size",
            Error::InvalidMargin(_) => "invalid-margin",
            Error::CoverFailed(_) => "cover-generation-failed",
            Error::TocFailed(_) => "toc-generation-failed",
            Error::Emitter(_) => "emitter-failed",
            Error::MissingDocument(_) => "document-missing",
            Error::Cancelled => "cancelled",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_stable() {
        assert_eq!(
            Error::BackendUnavailable("no engine".into()).code(),
            "backend-capability-unavailable"
        );
        assert_eq!(Error::LoadTimeout(30000).code(), "document-load-timeout");
        assert_eq!(
            Error::InvalidPageSize("custom without height".into()).code(),
            "invalid-page-size"
        );
        assert_eq!(Error::Cancelled.code(), "cancelled");
    }
}
