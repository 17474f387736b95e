//! Print-surface geometry resolution
//!
//! Resolves a page-size preset (or custom CSS-length pair) plus orientation
//! into concrete physical dimensions, and hosts the small CSS-length parser
//! shared with option validation.

use crate::error::{Error, Result};
use crate::{ConvertOptions, Orientation, PageSize};

/// Units accepted by the CSS-length grammar.
pub const CSS_UNITS: &[&str] = &["px", "mm", "cm", "in", "pt", "pc", "em", "rem"];

/// Resolved physical print surface, always stored as millimetres.
///
/// `landscape` records that the width/height pair has already been swapped;
/// the swap happens exactly once, at resolution time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageGeometry {
    pub width_mm: f64,
    pub height_mm: f64,
    pub landscape: bool,
}

impl PageGeometry {
    /// CSS `@page` size declaration, e.g. `210mm 297mm`.
    pub fn css_size(&self) -> String {
        format!("{:.2}mm {:.2}mm", self.width_mm, self.height_mm)
    }

    pub fn width_in(&self) -> f64 {
        self.width_mm / 25.4
    }

    pub fn height_in(&self) -> f64 {
        self.height_mm / 25.4
    }

    /// Nominal page height in CSS pixels (96 dpi), used by the page-count
    /// heuristic.
    pub fn height_px(&self) -> f64 {
        self.height_mm / 25.4 * 96.0
    }
}

/// Portrait dimensions of a preset in millimetres.
fn preset_mm(size: PageSize) -> Option<(f64, f64)> {
    match size {
        PageSize::A3 => Some((297.0, 420.0)),
        PageSize::A4 => Some((210.0, 297.0)),
        PageSize::A5 => Some((148.0, 210.0)),
        PageSize::Letter => Some((215.9, 279.4)),
        PageSize::Legal => Some((215.9, 355.6)),
        PageSize::Tabloid => Some((279.4, 431.8)),
        PageSize::Custom => None,
    }
}

/// Parse a CSS length into its numeric value and unit.
///
/// Grammar: an optional-decimal number immediately followed by one of
/// [`CSS_UNITS`]. Anything else (bare numbers included) is rejected.
pub fn parse_css_length(value: &str) -> Option<(f64, &'static str)> {
    let value = value.trim();
    let unit = *CSS_UNITS
        .iter()
        // "mm" must not win over "rem"/"em" suffixes; take the longest match
        .filter(|u| value.ends_with(**u))
        .max_by_key(|u| u.len())?;
    let number = &value[..value.len() - unit.len()];
    if number.is_empty() {
        return None;
    }
    let parsed: f64 = number.parse().ok()?;
    if !parsed.is_finite() || parsed < 0.0 {
        return None;
    }
    Some((parsed, unit))
}

/// Whether a string matches the CSS-length grammar.
pub fn is_css_length(value: &str) -> bool {
    parse_css_length(value).is_some()
}

/// Convert a CSS length to millimetres (px at 96 dpi, pt at 72 per inch).
pub fn css_length_to_mm(value: &str) -> Option<f64> {
    let (n, unit) = parse_css_length(value)?;
    let mm = match unit {
        "px" => n * 25.4 / 96.0,
        "mm" => n,
        "cm" => n * 10.0,
        "in" => n * 25.4,
        "pt" => n * 25.4 / 72.0,
        "pc" => n * 25.4 / 6.0,
        // em/rem at the 16px browser default
        "em" | "rem" => n * 16.0 * 25.4 / 96.0,
        _ => return None,
    };
    Some(mm)
}

/// Resolve the print geometry for the given effective options.
///
/// Custom pairs are interpreted as portrait-oriented by convention; the
/// landscape swap is applied after resolution, once.
pub fn resolve(options: &ConvertOptions) -> Result<PageGeometry> {
    let (width_mm, height_mm) = match preset_mm(options.page_size) {
        Some(pair) => pair,
        None => {
            let width = options.width.as_deref().ok_or_else(|| {
                Error::InvalidPageSize("custom page size requires a width".into())
            })?;
            let height = options.height.as_deref().ok_or_else(|| {
                Error::InvalidPageSize("custom page size requires a height".into())
            })?;
            let w = css_length_to_mm(width).ok_or_else(|| {
                Error::InvalidPageSize(format!("cannot parse width '{}'", width))
            })?;
            let h = css_length_to_mm(height).ok_or_else(|| {
                Error::InvalidPageSize(format!("cannot parse height '{}'", height))
            })?;
            if w <= 0.0 || h <= 0.0 {
                return Err(Error::InvalidPageSize(
                    "custom dimensions must be positive".into(),
                ));
            }
            (w, h)
        }
    };

    Ok(match options.orientation {
        Orientation::Portrait => PageGeometry {
            width_mm,
            height_mm,
            landscape: false,
        },
        Orientation::Landscape => PageGeometry {
            width_mm: height_mm,
            height_mm: width_mm,
            landscape: true,
        },
    })
}
