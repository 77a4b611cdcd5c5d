//! 站点爬虫
//!
//! 查找站点的 sitemap，按优先级遍历，并返回清洗后文本自上次爬取以来发生变化的页面。

pub mod hash_store;
pub mod html;
pub mod sitemap;

pub use hash_store::HashStore;
pub use html::clean_html_to_text;
pub use sitemap::{SitemapDocument, SitemapEntry, find_sitemap_url, parse_sitemap};

use futures_util::{StreamExt, stream};
use reqwest::{Client, Url};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::config::config::CrawlerConfig;
use crate::error::{AppError, Result};
use crate::models::DocumentMetadata;

/// A new or changed page
#[derive(Debug, Clone)]
pub struct CrawledPage {
    pub url: String,
    pub text: String,
    pub metadata: DocumentMetadata,
}

/// Outcome of a crawl. The page hashes are only written by [`commit`],
/// once the pages have been indexed.
///
/// [`commit`]: CrawlResult::commit
pub struct CrawlResult {
    pub pages: Vec<CrawledPage>,
    hashes: HashStore,
}

impl CrawlResult {
    /// Persist the hashes of the collected pages.
    pub fn commit(&self) -> Result<()> {
        self.hashes.save()
    }
}

pub struct Crawler {
    client: Client,
    config: CrawlerConfig,
    hash_store_path: PathBuf,
}

impl Crawler {
    pub fn new(config: &CrawlerConfig, hash_store_path: impl Into<PathBuf>) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .user_agent(config.user_agent.clone())
            .build()?;

        Ok(Self {
            client,
            config: config.clone(),
            hash_store_path: hash_store_path.into(),
        })
    }

    /// GET `url`; non-2xx statuses are errors.
    pub async fn fetch(&self, url: &str) -> Result<String> {
        let response = self.client.get(url).send().await?.error_for_status()?;
        Ok(response.text().await?)
    }

    /// Collect at most `max_links` new or changed pages of `site_url`.
    ///
    /// With `force`, previously recorded hashes are discarded so every page
    /// counts as new.
    pub async fn collect_changed_pages(
        &self,
        site_url: &str,
        max_links: usize,
        force: bool,
    ) -> Result<CrawlResult> {
        let base = Url::parse(site_url)
            .map_err(|e| AppError::Validation(format!("invalid URL {}: {}", site_url, e)))?;

        let sitemap_url = find_sitemap_url(&self.client, &base)
            .await
            .ok_or_else(|| AppError::SitemapNotFound(site_url.to_string()))?;

        let mut entries = self.load_entries(&sitemap_url).await;
        sitemap::sort_by_priority(&mut entries);

        let mut hash_store = HashStore::load(&self.hash_store_path);
        if force {
            hash_store.clear();
        }

        let urls: Vec<String> = entries
            .into_iter()
            .filter_map(|entry| match Url::parse(&entry.url) {
                Ok(mut url) => {
                    url.set_fragment(None);
                    Some(url.to_string())
                }
                Err(e) => {
                    warn!("Skipping malformed sitemap URL {}: {}", entry.url, e);
                    None
                }
            })
            .collect();

        let mut pages = Vec::new();
        let mut fetches = stream::iter(urls)
            .map(|url| async move {
                let body = self.fetch(&url).await;
                (url, body)
            })
            .buffered(self.config.max_concurrent_fetches.max(1));

        while pages.len() < max_links {
            let Some((url, body)) = fetches.next().await else {
                break;
            };

            let html = match body {
                Ok(html) => html,
                Err(e) => {
                    warn!("Failed to fetch {}: {}", url, e);
                    continue;
                }
            };

            let (text, metadata) = clean_html_to_text(&html, &url);
            if text.chars().count() < self.config.min_page_chars {
                debug!("Skipping {}: too little text", url);
                continue;
            }

            if hash_store.has_changed(&url, &text) {
                info!("New or changed page: {}", url);
                pages.push(CrawledPage { url, text, metadata });
            }
        }
        drop(fetches);
        if pages.len() >= max_links {
            info!("Reached the limit of {} new or changed pages", max_links);
        }

        info!("Found {} new or changed pages", pages.len());
        Ok(CrawlResult {
            pages,
            hashes: hash_store,
        })
    }

    /// Page entries of a sitemap, following one level of sitemap index.
    async fn load_entries(&self, sitemap_url: &str) -> Vec<SitemapEntry> {
        let document = match self.fetch_sitemap(sitemap_url).await {
            Some(document) => document,
            None => return Vec::new(),
        };

        let mut entries = document.pages;
        for child in document.sitemaps {
            if let Some(child_doc) = self.fetch_sitemap(&child).await {
                entries.extend(child_doc.pages);
            }
        }
        entries
    }

    async fn fetch_sitemap(&self, url: &str) -> Option<SitemapDocument> {
        let xml = match self.fetch(url).await {
            Ok(xml) => xml,
            Err(e) => {
                error!("Failed to load sitemap {}: {}", url, e);
                return None;
            }
        };
        match parse_sitemap(&xml) {
            Ok(document) => Some(document),
            Err(e) => {
                error!("Failed to parse sitemap {}: {}", url, e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn page(title: &str, body: &str) -> String {
        format!(
            "<html><head><title>{}</title></head><body><p>{}</p></body></html>",
            title, body
        )
    }

    async fn site(pages: &[(&str, f32, String)]) -> MockServer {
        let server = MockServer::start().await;
        let mut xml = String::from("<urlset>");
        for (route, priority, html) in pages {
            xml.push_str(&format!(
                "<url><loc>{}{}#top</loc><priority>{}</priority></url>",
                server.uri(),
                route,
                priority
            ));
            Mock::given(method("GET"))
                .and(path(*route))
                .respond_with(ResponseTemplate::new(200).set_body_string(html.clone()))
                .mount(&server)
                .await;
        }
        xml.push_str("</urlset>");

        Mock::given(method("GET"))
            .and(path("/robots.txt"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(format!("Sitemap: {}/sitemap.xml", server.uri())),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/sitemap.xml"))
            .respond_with(ResponseTemplate::new(200).set_body_string(xml))
            .mount(&server)
            .await;
        server
    }

    fn crawler(dir: &std::path::Path) -> Crawler {
        let config = CrawlerConfig {
            min_page_chars: 20,
            ..CrawlerConfig::default()
        };
        Crawler::new(&config, dir.join("hashes.json")).unwrap()
    }

    #[tokio::test]
    async fn test_collects_pages_by_priority_and_skips_short_ones() {
        let long = "This paragraph is long enough to be indexed.".to_string();
        let server = site(&[
            ("/low", 0.2, page("Low", &long)),
            ("/high", 0.9, page("High", &long)),
            ("/short", 1.0, page("Short", "tiny")),
        ])
        .await;
        let dir = tempfile::tempdir().unwrap();
        let crawler = crawler(dir.path());

        let crawl = crawler
            .collect_changed_pages(&server.uri(), 10, false)
            .await
            .unwrap();
        let pages = &crawl.pages;
        let urls: Vec<_> = pages.iter().map(|p| p.url.clone()).collect();
        assert_eq!(
            urls,
            vec![format!("{}/high", server.uri()), format!("{}/low", server.uri())]
        );
        assert_eq!(pages[0].metadata.title.as_deref(), Some("High"));
        assert!(!dir.path().join("hashes.json").exists());
        crawl.commit().unwrap();
        assert!(dir.path().join("hashes.json").exists());
    }

    #[tokio::test]
    async fn test_second_crawl_skips_unchanged_pages_unless_forced() {
        let long = "Unchanged content that is definitely long enough.".to_string();
        let server = site(&[("/a", 0.5, page("A", &long))]).await;
        let dir = tempfile::tempdir().unwrap();
        let crawler = crawler(dir.path());

        let first = crawler.collect_changed_pages(&server.uri(), 10, false).await.unwrap();
        assert_eq!(first.pages.len(), 1);

        // Not committed yet, so the page still counts as new.
        let again = crawler.collect_changed_pages(&server.uri(), 10, false).await.unwrap();
        assert_eq!(again.pages.len(), 1);
        again.commit().unwrap();

        let second = crawler.collect_changed_pages(&server.uri(), 10, false).await.unwrap();
        assert!(second.pages.is_empty());

        let forced = crawler.collect_changed_pages(&server.uri(), 10, true).await.unwrap();
        assert_eq!(forced.pages.len(), 1);
    }

    #[tokio::test]
    async fn test_respects_max_links() {
        let server = site(&[
            ("/1", 0.9, page("1", "First page with plenty of words in it.")),
            ("/2", 0.8, page("2", "Second page with plenty of words in it.")),
            ("/3", 0.7, page("3", "Third page with plenty of words in it.")),
        ])
        .await;
        let dir = tempfile::tempdir().unwrap();

        let crawl = crawler(dir.path())
            .collect_changed_pages(&server.uri(), 2, false)
            .await
            .unwrap();
        assert_eq!(crawl.pages.len(), 2);
    }

    #[tokio::test]
    async fn test_follows_sitemap_index_into_child_sitemaps() {
        let server = MockServer::start().await;
        let index = format!(
            "<sitemapindex>\
             <sitemap><loc>{uri}/posts.xml</loc></sitemap>\
             <sitemap><loc>{uri}/pages.xml</loc></sitemap>\
             <sitemap><loc>{uri}/gone.xml</loc></sitemap>\
             </sitemapindex>",
            uri = server.uri()
        );
        let posts = format!(
            "<urlset><url><loc>{}/post</loc><priority>0.4</priority></url></urlset>",
            server.uri()
        );
        let pages = format!(
            "<urlset><url><loc>{}/about</loc><priority>0.8</priority></url></urlset>",
            server.uri()
        );
        for (route, body) in [
            ("/sitemap.xml", index),
            ("/posts.xml", posts),
            ("/pages.xml", pages),
            ("/post", page("Post", "A blog post long enough to be indexed.")),
            ("/about", page("About", "An about page long enough to be indexed.")),
        ] {
            Mock::given(method("GET"))
                .and(path(route))
                .respond_with(ResponseTemplate::new(200).set_body_string(body))
                .mount(&server)
                .await;
        }
        Mock::given(method("GET"))
            .and(path("/gone.xml"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/robots.txt"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(format!("Sitemap: {}/sitemap.xml", server.uri())),
            )
            .mount(&server)
            .await;
        let dir = tempfile::tempdir().unwrap();

        let crawl = crawler(dir.path())
            .collect_changed_pages(&server.uri(), 10, false)
            .await
            .unwrap();
        let urls: Vec<_> = crawl.pages.iter().map(|p| p.url.clone()).collect();
        assert_eq!(
            urls,
            vec![format!("{}/about", server.uri()), format!("{}/post", server.uri())]
        );
    }

    #[tokio::test]
    async fn test_missing_sitemap_is_an_error() {
        let server = MockServer::start().await;
        let dir = tempfile::tempdir().unwrap();

        let result = crawler(dir.path())
            .collect_changed_pages(&server.uri(), 10, false)
            .await;
        assert!(matches!(result, Err(AppError::SitemapNotFound(_))));
    }
}
