//! Resource inlining
//!
//! Rewrites the root document so it has no remaining external file
//! references: `<link>` stylesheet tags become inline `<style>` blocks, and
//! image/binary references become embedded `data:` URIs.
//!
//! Matching is by bare filename inside attribute values so absolute,
//! relative, and bare-name references all resolve. This is intentionally
//! permissive and can over-match when two distinct assets share a filename; a
//! stricter full-path mode is available behind `strict_asset_paths`.
//!
//! Inlining never fails: an unmatched or unusable asset simply leaves its
//! reference untouched in the document.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use log::debug;

use crate::{AssetContent, AssetMap, ROOT_DOCUMENT};

/// Produce a self-contained document from the root document and asset map.
pub fn inline_assets(html: &str, assets: &AssetMap, strict: bool) -> String {
    let mut out = html.to_string();

    // Pass 1: stylesheets
    for (path, content) in assets {
        if !is_stylesheet(path) {
            continue;
        }
        if let AssetContent::Text(css) = content {
            let key = match_key(path, strict);
            out = replace_link_tags(&out, key, css);
        }
    }

    // Pass 2: images and other binary assets
    for (path, content) in assets {
        if path == ROOT_DOCUMENT || is_stylesheet(path) {
            continue;
        }
        let inlinable = matches!(content, AssetContent::Binary(_)) || image_mime(path).is_some();
        if !inlinable {
            continue;
        }
        let mime = image_mime(path).unwrap_or("application/octet-stream");
        let data_uri = format!("data:{};base64,{}", mime, BASE64.encode(content.as_bytes()));
        let key = match_key(path, strict);
        debug!("inlining {} as {} ({} bytes)", path, mime, content.as_bytes().len());
        out = replace_attr_refs(&out, key, strict, &data_uri);
    }

    out
}

fn is_stylesheet(path: &str) -> bool {
    path.rsplit('.').next().is_some_and(|ext| ext.eq_ignore_ascii_case("css"))
}

/// MIME type for a known image extension.
fn image_mime(path: &str) -> Option<&'static str> {
    let ext = path.rsplit('.').next()?.to_ascii_lowercase();
    match ext.as_str() {
        "png" => Some("image/png"),
        "jpg" | "jpeg" => Some("image/jpeg"),
        "gif" => Some("image/gif"),
        "svg" => Some("image/svg+xml"),
        "webp" => Some("image/webp"),
        "bmp" => Some("image/bmp"),
        "ico" => Some("image/x-icon"),
        _ => None,
    }
}

/// Matching key for an asset: bare filename by default, full relative path in
/// strict mode.
fn match_key(path: &str, strict: bool) -> &str {
    if strict {
        path
    } else {
        path.rsplit('/').next().unwrap_or(path)
    }
}

fn reference_matches(value: &str, key: &str, strict: bool) -> bool {
    if strict {
        value == key || value.trim_start_matches("./") == key
    } else {
        value.contains(key)
    }
}

/// Replace every `<link>` tag referencing `key` with an inline style block.
fn replace_link_tags(html: &str, key: &str, css: &str) -> String {
    let mut out = String::with_capacity(html.len() + css.len());
    let mut rest = html;
    while let Some(start) = rest.find("<link") {
        let Some(end_rel) = rest[start..].find('>') else {
            break;
        };
        let end = start + end_rel + 1;
        let tag = &rest[start..end];
        out.push_str(&rest[..start]);
        if tag.contains(key) {
            out.push_str("<style>\n");
            out.push_str(css);
            out.push_str("\n</style>");
        } else {
            out.push_str(tag);
        }
        rest = &rest[end..];
    }
    out.push_str(rest);
    out
}

/// Replace `src`/`href` attribute values referencing `key` with
/// `replacement`.
fn replace_attr_refs(html: &str, key: &str, strict: bool, replacement: &str) -> String {
    let mut out = html.to_string();
    for attr in ["src", "href"] {
        out = replace_attr(&out, attr, key, strict, replacement);
    }
    out
}

fn replace_attr(html: &str, attr: &str, key: &str, strict: bool, replacement: &str) -> String {
    let double = format!("{}=\"", attr);
    let single = format!("{}='", attr);
    let mut out = String::with_capacity(html.len());
    let mut rest = html;

    loop {
        let found = [double.as_str(), single.as_str()]
            .iter()
            .filter_map(|n| rest.find(n).map(|i| (i, *n)))
            .min_by_key(|(i, _)| *i);
        let Some((idx, needle)) = found else {
            break;
        };
        let value_start = idx + needle.len();

        // Skip matches inside a longer attribute name like data-src
        let boundary = idx == 0
            || !matches!(
                rest.as_bytes()[idx - 1],
                b'a'..=b'z' | b'A'..=b'Z' | b'0'..=b'9' | b'-' | b'_'
            );

        out.push_str(&rest[..value_start]);
        rest = &rest[value_start..];

        let quote = needle.as_bytes()[needle.len() - 1] as char;
        let Some(end) = rest.find(quote) else {
            break;
        };
        let value = &rest[..end];
        if boundary && reference_matches(value, key, strict) {
            out.push_str(replacement);
        } else {
            out.push_str(value);
        }
        rest = &rest[end..];
    }
    out.push_str(rest);
    out
}
