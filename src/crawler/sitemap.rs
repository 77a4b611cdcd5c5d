//! Sitemap 发现与解析

use quick_xml::Reader;
use quick_xml::events::Event;
use reqwest::{Client, StatusCode, Url};
use tracing::{error, info, warn};

use crate::error::{AppError, Result};

const DEFAULT_PRIORITY: f32 = 0.5;

/// A page listed in a sitemap
#[derive(Debug, Clone, PartialEq)]
pub struct SitemapEntry {
    pub url: String,
    pub priority: f32,
}

/// Parsed sitemap: page entries from a `<urlset>`, child sitemap URLs from a
/// `<sitemapindex>`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SitemapDocument {
    pub pages: Vec<SitemapEntry>,
    pub sitemaps: Vec<String>,
}

/// Locate the sitemap of `base_url`.
///
/// The first `Sitemap:` line of robots.txt wins; otherwise `/sitemap.xml` is
/// used when a HEAD request on it answers 200.
pub async fn find_sitemap_url(client: &Client, base_url: &Url) -> Option<String> {
    info!("Looking for the sitemap of {}", base_url);

    if let Ok(robots_url) = base_url.join("/robots.txt") {
        match client.get(robots_url).send().await {
            Ok(resp) if resp.status() == StatusCode::OK => match resp.text().await {
                Ok(body) => {
                    if let Some(url) = sitemap_from_robots(&body) {
                        info!("Sitemap found in robots.txt: {}", url);
                        return Some(url);
                    }
                }
                Err(e) => warn!("Could not read robots.txt: {}", e),
            },
            Ok(_) => {}
            Err(e) => warn!("Could not fetch robots.txt: {}", e),
        }
    }

    if let Ok(sitemap_url) = base_url.join("/sitemap.xml") {
        if let Ok(resp) = client.head(sitemap_url.clone()).send().await {
            if resp.status() == StatusCode::OK {
                info!("Sitemap found at the default location: {}", sitemap_url);
                return Some(sitemap_url.to_string());
            }
        }
    }

    error!("No sitemap found for {}", base_url);
    None
}

/// First `Sitemap:` directive of a robots.txt body.
pub fn sitemap_from_robots(body: &str) -> Option<String> {
    body.lines()
        .find(|line| line.to_lowercase().starts_with("sitemap:"))
        .and_then(|line| line.split_once(':'))
        .map(|(_, url)| url.trim().to_string())
        .filter(|url| !url.is_empty())
}

#[derive(Clone, Copy, PartialEq)]
enum Field {
    None,
    Loc,
    Priority,
}

/// Parse a sitemap or sitemap index.
///
/// Namespaces are ignored. A missing or unparseable `<priority>` counts as 0.5.
pub fn parse_sitemap(xml: &str) -> Result<SitemapDocument> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    let mut document = SitemapDocument::default();
    let mut in_url = false;
    let mut in_sitemap = false;
    let mut field = Field::None;
    let mut loc: Option<String> = None;
    let mut priority: Option<String> = None;

    loop {
        let event = reader
            .read_event()
            .map_err(|e| AppError::Serialization(format!("invalid sitemap: {}", e)))?;
        match event {
            Event::Start(start) => match start.local_name().as_ref() {
                b"url" => {
                    in_url = true;
                    loc = None;
                    priority = None;
                }
                b"sitemap" => {
                    in_sitemap = true;
                    loc = None;
                }
                b"loc" => field = Field::Loc,
                b"priority" => field = Field::Priority,
                _ => {}
            },
            Event::Text(text) => {
                let value = text
                    .unescape()
                    .map_err(|e| AppError::Serialization(format!("invalid sitemap: {}", e)))?;
                store_text(field, value.trim(), &mut loc, &mut priority);
            }
            Event::CData(data) => {
                let raw = data.into_inner();
                let value = String::from_utf8_lossy(&raw);
                store_text(field, value.trim(), &mut loc, &mut priority);
            }
            Event::End(end) => match end.local_name().as_ref() {
                b"url" if in_url => {
                    in_url = false;
                    if let Some(url) = loc.take().filter(|u| !u.is_empty()) {
                        let priority = priority
                            .take()
                            .and_then(|p| p.parse::<f32>().ok())
                            .unwrap_or(DEFAULT_PRIORITY);
                        document.pages.push(SitemapEntry { url, priority });
                    }
                }
                b"sitemap" if in_sitemap => {
                    in_sitemap = false;
                    if let Some(url) = loc.take().filter(|u| !u.is_empty()) {
                        document.sitemaps.push(url);
                    }
                }
                b"loc" | b"priority" => field = Field::None,
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(document)
}

fn store_text(field: Field, value: &str, loc: &mut Option<String>, priority: &mut Option<String>) {
    match field {
        Field::Loc => loc.get_or_insert_with(String::new).push_str(value),
        Field::Priority => priority.get_or_insert_with(String::new).push_str(value),
        Field::None => {}
    }
}

/// Highest priority first; equal priorities keep sitemap order.
pub fn sort_by_priority(entries: &mut [SitemapEntry]) {
    entries.sort_by(|a, b| {
        b.priority
            .partial_cmp(&a.priority)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
}
