//! Option resolution and validation
//!
//! Overlays caller-supplied options onto the fixed defaults (including a
//! per-side merge of the margin sub-object) and validates the merged result.
//! All validation rules are evaluated independently; errors accumulate rather
//! than short-circuiting.

use log::warn;

use crate::error::Error;
use crate::layout::is_css_length;
use crate::{ConvertOptions, PageSize};

/// Fixed default applied to every unset margin side.
pub const DEFAULT_MARGIN: &str = "20mm";

/// Which of the two validation error codes a failure maps to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultKind {
    PageSize,
    Margin,
}

/// One validation failure with its code classification.
#[derive(Debug, Clone)]
pub struct Fault {
    pub kind: FaultKind,
    pub message: String,
}

/// Outcome of validating a merged option set.
#[derive(Debug, Clone, Default)]
pub struct Validation {
    pub valid: bool,
    pub errors: Vec<Fault>,
    pub warnings: Vec<String>,
}

impl Validation {
    /// Convert an invalid outcome into the corresponding error.
    ///
    /// Margin failures report `invalid-margin`; every other (or mixed)
    /// validation failure reports `invalid-page-size`, matching the two
    /// validation error codes of the result contract. Classification follows
    /// each fault's kind, never its message text.
    pub fn into_error(self) -> Option<Error> {
        if self.valid {
            return None;
        }
        let margin_only = self.errors.iter().all(|f| f.kind == FaultKind::Margin);
        let joined = self
            .errors
            .iter()
            .map(|f| f.message.as_str())
            .collect::<Vec<_>>()
            .join("; ");
        if margin_only {
            Some(Error::InvalidMargin(joined))
        } else {
            Some(Error::InvalidPageSize(joined))
        }
    }
}

/// Merge caller options over the defaults.
///
/// The margin sub-object merges structurally: each unset side falls back to
/// [`DEFAULT_MARGIN`] while set sides are kept as-is. The caller's value is
/// never mutated; the effective configuration is a fresh copy.
pub fn resolve(partial: Option<ConvertOptions>) -> ConvertOptions {
    let mut opts = partial.unwrap_or_default();
    let default = || Some(DEFAULT_MARGIN.to_string());
    opts.margin.top = opts.margin.top.take().or_else(default);
    opts.margin.right = opts.margin.right.take().or_else(default);
    opts.margin.bottom = opts.margin.bottom.take().or_else(default);
    opts.margin.left = opts.margin.left.take().or_else(default);
    opts
}

/// Validate a merged option set. Every rule runs; nothing short-circuits.
pub fn validate(options: &ConvertOptions) -> Validation {
    let mut errors = Vec::new();
    let mut warnings = Vec::new();
    let fault = |kind, message: String| Fault { kind, message };

    match options.page_size {
        PageSize::Custom => {
            if options.width.is_none() || options.height.is_none() {
                errors.push(fault(
                    FaultKind::PageSize,
                    "custom page size requires both width and height".to_string(),
                ));
            }
            for (name, value) in [("width", &options.width), ("height", &options.height)] {
                if let Some(v) = value {
                    if !is_css_length(v) {
                        errors.push(fault(
                            FaultKind::PageSize,
                            format!("{} '{}' is not a valid CSS length", name, v),
                        ));
                    }
                }
            }
        }
        _ => {
            if options.width.is_some() || options.height.is_some() {
                warnings.push(
                    "width/height are ignored unless pageSize is custom".to_string(),
                );
            }
        }
    }

    if !(options.scale > 0.0 && options.scale <= 2.0) {
        errors.push(fault(
            FaultKind::PageSize,
            format!("scale {} is outside the valid range (0, 2]", options.scale),
        ));
    }

    for (side, value) in [
        ("top", &options.margin.top),
        ("right", &options.margin.right),
        ("bottom", &options.margin.bottom),
        ("left", &options.margin.left),
    ] {
        if let Some(v) = value {
            if !is_css_length(v) {
                errors.push(fault(
                    FaultKind::Margin,
                    format!("margin {} '{}' is not a valid CSS length", side, v),
                ));
            }
        }
    }

    if options.include_toc && options.toc.max_depth == 0 {
        errors.push(fault(
            FaultKind::PageSize,
            "toc maxDepth must be at least 1".to_string(),
        ));
    }

    // render_delay_ms is unsigned, so the >= 0 rule holds by construction.

    Validation {
        valid: errors.is_empty(),
        errors,
        warnings,
    }
}

/// Resolve, validate, and log warnings in one step.
pub fn resolve_and_validate(
    partial: Option<ConvertOptions>,
) -> (ConvertOptions, Validation) {
    let opts = resolve(partial);
    let validation = validate(&opts);
    for w in &validation.warnings {
        warn!("option warning: {}", w);
    }
    (opts, validation)
}
