//! Document metadata extraction
//!
//! Recovers a title from the root document and synthesizes identifiers and
//! timestamps. Extraction never fails; anything undiscoverable degrades to a
//! fixed fallback value.

use chrono::Utc;
use scraper::{Html, Selector};
use sha2::{Digest, Sha256};

use crate::{AssetContent, AssetMap, DocMetadata, ROOT_DOCUMENT};

/// Fallback title when the root document has none.
pub const UNTITLED: &str = "Untitled Document";

/// Derive metadata from the emitted assets.
pub fn extract(assets: &AssetMap) -> DocMetadata {
    let title = assets
        .get(ROOT_DOCUMENT)
        .and_then(|content| match content {
            AssetContent::Text(html) => extract_title(html),
            AssetContent::Binary(_) => None,
        })
        .unwrap_or_else(|| UNTITLED.to_string());

    let now = Utc::now();
    let mut hasher = Sha256::new();
    hasher.update(title.as_bytes());
    hasher.update(now.timestamp_nanos_opt().unwrap_or_default().to_le_bytes());
    let id = hex::encode(&hasher.finalize()[..8]);

    DocMetadata {
        title,
        created: now,
        modified: now,
        version: "1.0.0".to_string(),
        id,
    }
}

fn extract_title(html: &str) -> Option<String> {
    let document = Html::parse_document(html);
    let selector = Selector::parse("title").ok()?;
    let title = document
        .select(&selector)
        .next()
        .map(|n| n.text().collect::<String>())?;
    let title = title.trim();
    if title.is_empty() {
        None
    } else {
        Some(title.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assets_with_root(html: &str) -> AssetMap {
        let mut assets = AssetMap::new();
        assets.insert(ROOT_DOCUMENT.to_string(), AssetContent::Text(html.to_string()));
        assets
    }

    #[test]
    fn extracts_document_title() {
        let meta = extract(&assets_with_root(
            "<html><head><title> User Guide </title></head><body></body></html>",
        ));
        assert_eq!(meta.title, "User Guide");
        assert_eq!(meta.version, "1.0.0");
        assert_eq!(meta.id.len(), 16);
    }

    #[test]
    fn falls_back_when_untitled() {
        let meta = extract(&assets_with_root("<html><body><p>hi</p></body></html>"));
        assert_eq!(meta.title, UNTITLED);

        let empty = extract(&AssetMap::new());
        assert_eq!(empty.title, UNTITLED);
    }

    #[test]
    fn empty_title_element_falls_back() {
        let meta = extract(&assets_with_root(
            "<html><head><title>   </title></head><body></body></html>",
        ));
        assert_eq!(meta.title, UNTITLED);
    }
}
