//! HTML 文本提取

use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html, Node, Selector};

use crate::models::DocumentMetadata;

/// Subtrees that never carry page content
const STRIPPED_TAGS: &[&str] = &[
    "header", "footer", "nav", "aside", "script", "style", "noscript",
];
const HEADING_TAGS: &[&str] = &["h1", "h2", "h3"];
const BLOCK_TAGS: &[&str] = &["p", "li"];

static TITLE: Lazy<Selector> = Lazy::new(|| Selector::parse("title").expect("valid selector"));
static BODY: Lazy<Selector> = Lazy::new(|| Selector::parse("body").expect("valid selector"));
static INLINE_SPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^\S\n]+").expect("valid regex"));
static LINE_BREAKS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s*\n\s*").expect("valid regex"));

/// Extract the readable text of a page.
///
/// Headings (`h1`-`h3`) land on their own lines; paragraphs and list items are
/// joined with single spaces. Navigation, boilerplate and scripts are ignored.
pub fn clean_html_to_text(html: &str, url: &str) -> (String, DocumentMetadata) {
    let document = Html::parse_document(html);

    let mut metadata = DocumentMetadata::new(url);
    if let Some(title) = document.select(&TITLE).next() {
        let title = title.text().collect::<String>();
        let title = title.trim();
        if !title.is_empty() {
            metadata = metadata.with_title(title);
        }
    }

    let root = document
        .select(&BODY)
        .next()
        .unwrap_or_else(|| document.root_element());

    let mut segments = Vec::new();
    collect_segments(root, &mut segments);

    let joined = segments.join(" ");
    let text = INLINE_SPACE.replace_all(&joined, " ");
    let text = LINE_BREAKS.replace_all(&text, "\n");
    (text.trim().to_string(), metadata)
}

fn collect_segments(element: ElementRef<'_>, segments: &mut Vec<String>) {
    for child in element.children() {
        let Some(child) = ElementRef::wrap(child) else {
            continue;
        };
        let name = child.value().name();
        if STRIPPED_TAGS.contains(&name) {
            continue;
        }
        if HEADING_TAGS.contains(&name) {
            let text = element_text(child);
            if !text.is_empty() {
                segments.push(format!("\n{}\n", text));
            }
        } else if BLOCK_TAGS.contains(&name) {
            let text = element_text(child);
            if !text.is_empty() {
                segments.push(text);
            }
        } else {
            collect_segments(child, segments);
        }
    }
}

/// Text under `element` with whitespace collapsed to single spaces.
fn element_text(element: ElementRef<'_>) -> String {
    let mut parts = Vec::new();
    collect_text(element, &mut parts);
    parts
        .iter()
        .flat_map(|part| part.split_whitespace())
        .collect::<Vec<_>>()
        .join(" ")
}

fn collect_text(element: ElementRef<'_>, parts: &mut Vec<String>) {
    for child in element.children() {
        match child.value() {
            Node::Text(text) => {
                let text = text.trim();
                if !text.is_empty() {
                    parts.push(text.to_string());
                }
            }
            Node::Element(el) if !STRIPPED_TAGS.contains(&el.name()) => {
                if let Some(child) = ElementRef::wrap(child) {
                    collect_text(child, parts);
                }
            }
            _ => {}
        }
    }
}
