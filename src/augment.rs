//! Document augmentation
//!
//! Optionally splices a synthesized cover page and table of contents into the
//! inlined document and injects the print stylesheet. Augmentation is modeled
//! as typed insertion directives applied to well-known anchors rather than
//! ad-hoc string patching.
//!
//! Ordering invariant: the cover must be spliced before the TOC is generated,
//! because TOC insertion locates the end of the cover block to position
//! itself after it.

use log::debug;
use scraper::{Html, Selector};

use crate::error::{Error, Result};
use crate::layout::PageGeometry;
use crate::options::DEFAULT_MARGIN;
use crate::{ConvertOptions, CoverOptions, DocMetadata, TocOptions};

/// End-of-block marker appended to every synthesized cover.
pub const COVER_END: &str = "<!-- pagepress:cover-end -->";

/// Anchor for a block insertion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertAt {
    AfterBodyOpen,
    AfterCoverBlock,
    BeforeHeadClose,
}

/// Apply one insertion directive; `None` when the anchor is absent.
pub fn apply_insertion(html: &str, at: InsertAt, block: &str) -> Option<String> {
    let pos = match at {
        InsertAt::AfterBodyOpen => {
            let start = html.find("<body")?;
            start + html[start..].find('>')? + 1
        }
        InsertAt::AfterCoverBlock => html.find(COVER_END)? + COVER_END.len(),
        InsertAt::BeforeHeadClose => html.find("</head>")?,
    };
    let mut out = String::with_capacity(html.len() + block.len() + 2);
    out.push_str(&html[..pos]);
    out.push('\n');
    out.push_str(block);
    out.push('\n');
    out.push_str(&html[pos..]);
    Some(out)
}

fn escape(text: &str) -> String {
    text.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
}

/// Splice a cover page immediately after the opening body tag.
pub fn insert_cover(html: &str, meta: &DocMetadata, options: &CoverOptions) -> Result<String> {
    let block = render_cover(meta, options);
    apply_insertion(html, InsertAt::AfterBodyOpen, &block)
        .ok_or_else(|| Error::CoverFailed("document has no <body> element".into()))
}

fn render_cover(meta: &DocMetadata, options: &CoverOptions) -> String {
    let title = options.title.clone().unwrap_or_else(|| meta.title.clone());
    let date = meta.modified.format("%B %e, %Y").to_string();
    let author = options.author.as_deref().unwrap_or("");

    if let Some(template) = &options.template {
        let mut block = template
            .replace("{{title}}", &title)
            .replace("{{subtitle}}", options.subtitle.as_deref().unwrap_or(""))
            .replace("{{author}}", author)
            .replace("{{date}}", &date)
            .replace("{{version}}", &meta.version);
        block.push('\n');
        block.push_str(COVER_END);
        return block;
    }

    let mut meta_line = Vec::new();
    if options.show_author && !author.is_empty() {
        meta_line.push(author.to_string());
    }
    if options.show_date {
        meta_line.push(date);
    }
    if options.show_version {
        meta_line.push(format!("v{}", meta.version));
    }

    let mut block = String::from("<div class=\"pagepress-cover\">\n");
    block.push_str(&format!(
        "  <h1 class=\"pagepress-cover-title\">{}</h1>\n",
        escape(&title)
    ));
    if let Some(subtitle) = &options.subtitle {
        block.push_str(&format!(
            "  <p class=\"pagepress-cover-subtitle\">{}</p>\n",
            escape(subtitle)
        ));
    }
    if !meta_line.is_empty() {
        block.push_str(&format!(
            "  <p class=\"pagepress-cover-meta\">{}</p>\n",
            escape(&meta_line.join(" \u{b7} "))
        ));
    }
    block.push_str("</div>\n");
    block.push_str(COVER_END);
    block
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct TocEntry {
    level: u8,
    text: String,
}

/// Splice a table of contents after the cover block (or after the opening
/// body tag when no cover exists).
pub fn insert_toc(html: &str, options: &TocOptions) -> Result<String> {
    let entries = scan_headings(html, options.max_depth);
    debug!("toc: {} entries at depth <= {}", entries.len(), options.max_depth);
    let block = render_toc(&entries, options);
    let at = if html.contains(COVER_END) {
        InsertAt::AfterCoverBlock
    } else {
        InsertAt::AfterBodyOpen
    };
    apply_insertion(html, at, &block)
        .ok_or_else(|| Error::TocFailed("document has no <body> element".into()))
}

fn scan_headings(html: &str, max_depth: u8) -> Vec<TocEntry> {
    let document = Html::parse_document(html);
    let selector = Selector::parse("h1, h2, h3, h4, h5, h6").unwrap();
    document
        .select(&selector)
        .filter_map(|el| {
            // Synthesized cover/TOC headings are not part of the document
            if el.value().attr("class").unwrap_or("").contains("pagepress-") {
                return None;
            }
            let level = el.value().name().as_bytes()[1] - b'0';
            if level > max_depth {
                return None;
            }
            let text = el.text().collect::<String>().trim().to_string();
            if text.is_empty() {
                None
            } else {
                Some(TocEntry { level, text })
            }
        })
        .collect()
}

fn render_toc(entries: &[TocEntry], options: &TocOptions) -> String {
    let mut block = String::from("<div class=\"pagepress-toc\">\n");
    block.push_str(&format!(
        "  <h2 class=\"pagepress-toc-title\">{}</h2>\n",
        escape(&options.title)
    ));
    for (i, entry) in entries.iter().enumerate() {
        let indent = 1.5 * f64::from(entry.level.saturating_sub(1));
        // Heuristic placeholder: assumes the cover is page 1 and each heading
        // starts a new page, which is not generally true.
        let page = if options.page_numbers {
            format!(
                "<span class=\"pagepress-toc-page\">{}</span>",
                i + 2
            )
        } else {
            String::new()
        };
        block.push_str(&format!(
            "  <div class=\"pagepress-toc-entry\" style=\"padding-left: {:.1}em\">{}{}</div>\n",
            indent,
            escape(&entry.text),
            page
        ));
    }
    block.push_str("</div>");
    block
}

/// Inject the print-media stylesheet just before the closing head element
/// (appended at the end when the document has no head).
pub fn inject_print_styles(
    html: &str,
    geometry: &PageGeometry,
    options: &ConvertOptions,
) -> String {
    let margin = |side: &Option<String>| {
        side.clone().unwrap_or_else(|| DEFAULT_MARGIN.to_string())
    };
    let style = format!(
        "<style>\n\
         @page {{\n\
           size: {size};\n\
           margin: {top} {right} {bottom} {left};\n\
         }}\n\
         body {{\n\
           -webkit-print-color-adjust: exact;\n\
           print-color-adjust: exact;\n\
         }}\n\
         .pagepress-cover {{\n\
           height: 100vh;\n\
           display: flex;\n\
           flex-direction: column;\n\
           justify-content: center;\n\
           align-items: center;\n\
           text-align: center;\n\
           page-break-after: always;\n\
         }}\n\
         .pagepress-toc {{\n\
           page-break-after: always;\n\
         }}\n\
         .pagepress-toc-entry {{\n\
           margin: 0.25em 0;\n\
         }}\n\
         .pagepress-toc-page {{\n\
           float: right;\n\
         }}\n\
         </style>",
        size = geometry.css_size(),
        top = margin(&options.margin.top),
        right = margin(&options.margin.right),
        bottom = margin(&options.margin.bottom),
        left = margin(&options.margin.left),
    );
    match apply_insertion(html, InsertAt::BeforeHeadClose, &style) {
        Some(out) => out,
        None => {
            let mut out = html.to_string();
            out.push('\n');
            out.push_str(&style);
            out
        }
    }
}
