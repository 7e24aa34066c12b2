/// Course site crawler collecting downloadable document links
use async_trait::async_trait;
use regex::Regex;
use reqwest::Client;
use scraper::{Html, Selector};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};
use url::Url;

use crate::classify::classify_link;
use crate::config::CrawlerConfig;
use crate::error::{HarvestError, Result};
use crate::resource::Resource;

/// Source of page HTML, swappable for tests
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<String>;
}

/// Fetches pages over HTTP with connect/read timeouts
#[derive(Clone)]
pub struct HttpPageFetcher {
    client: Client,
}

impl HttpPageFetcher {
    pub fn new(cfg: &CrawlerConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(cfg.timeout_seconds))
            .connect_timeout(Duration::from_secs(cfg.timeout_seconds))
            .user_agent(cfg.user_agent.clone())
            .build()?;

        Ok(Self { client })
    }
}

#[async_trait]
impl PageFetcher for HttpPageFetcher {
    async fn fetch(&self, url: &str) -> Result<String> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| HarvestError::fetch(url, e))?;

        if !response.status().is_success() {
            return Err(HarvestError::fetch(url, format!("HTTP {}", response.status())));
        }

        response.text().await.map_err(|e| HarvestError::fetch(url, e))
    }
}

/// An anchor found on a page, resolved to an absolute URL
#[derive(Debug, Clone, PartialEq)]
pub struct PageLink {
    pub url: Url,
    pub text: String,
}

/// Outcome of crawling one course
#[derive(Debug, Clone, Default)]
pub struct CrawlResult {
    pub resources: Vec<Resource>,
    pub pages_visited: usize,
    pub pages_failed: usize,
    /// The page limit stopped the crawl before the frontier was exhausted
    pub truncated: bool,
}

/// Depth-first crawler over the pages of a single course
pub struct SiteCrawler {
    fetcher: Arc<dyn PageFetcher>,
    site_base: Url,
    max_pages: usize,
    document_pattern: Regex,
}

impl SiteCrawler {
    pub fn new(fetcher: Arc<dyn PageFetcher>, cfg: &CrawlerConfig) -> Result<Self> {
        let site_base = Url::parse(&cfg.site_base_url)
            .map_err(|e| HarvestError::Config(format!("invalid site base url: {}", e)))?;

        Ok(Self {
            fetcher,
            site_base,
            max_pages: cfg.max_pages,
            document_pattern: document_pattern(&cfg.document_extensions)?,
        })
    }

    /// Landing page of a course
    pub fn seed_url(&self, course_id: &str) -> Result<Url> {
        self.site_base
            .join(&format!("courses/{}/", course_id))
            .map_err(|e| HarvestError::Config(format!("invalid course id {}: {}", course_id, e)))
    }

    /// Crawl a course from its landing page.
    ///
    /// Documents on a page are emitted in anchor order, then its sub-pages are
    /// visited depth-first in anchor order. Each page is fetched at most once.
    /// A page that fails to load is logged and skipped.
    pub async fn crawl_course(&self, course_id: &str) -> Result<CrawlResult> {
        let seed = self.seed_url(course_id)?;
        info!("🔍 Crawling course {} from {}", course_id, seed);

        let mut result = CrawlResult::default();
        let mut visited: HashSet<String> = HashSet::new();
        let mut frontier = vec![seed];

        while let Some(page) = frontier.pop() {
            if visited.contains(page.as_str()) {
                continue;
            }
            if visited.len() >= self.max_pages {
                warn!(
                    "⚠️ Page limit {} reached for {}, stopping crawl",
                    self.max_pages, course_id
                );
                result.truncated = true;
                break;
            }
            visited.insert(page.as_str().to_string());

            let html = match self.fetcher.fetch(page.as_str()).await {
                Ok(html) => html,
                Err(e) => {
                    error!("Failed to scrape {}: {}", page, e);
                    result.pages_failed += 1;
                    continue;
                }
            };

            let links = extract_links(&html, &page);
            debug!("{} links on {}", links.len(), page);

            let mut subpages = Vec::new();
            for link in links {
                if self.is_document(&link.url) {
                    let subtype = classify_link(&link.text);
                    result
                        .resources
                        .push(Resource::document(link.url.as_str(), subtype, course_id, page.as_str()));
                } else if self.is_course_subpage(&link.url, course_id)
                    && !visited.contains(link.url.as_str())
                {
                    subpages.push(link.url);
                }
            }

            frontier.extend(subpages.into_iter().rev());
        }

        result.pages_visited = visited.len();
        info!(
            "📚 Found {} documents for {} ({} pages, {} failed)",
            result.resources.len(),
            course_id,
            result.pages_visited,
            result.pages_failed
        );

        Ok(result)
    }

    fn is_document(&self, url: &Url) -> bool {
        self.document_pattern.is_match(url.path())
    }

    /// Same-site page under `/courses/<course_id>/pages/`
    fn is_course_subpage(&self, url: &Url, course_id: &str) -> bool {
        url.host_str() == self.site_base.host_str()
            && url.path().starts_with(&format!("/courses/{}/pages/", course_id))
    }
}

/// Collect every `a[href]` on a page, resolved against `page_url`, fragments dropped
pub fn extract_links(html: &str, page_url: &Url) -> Vec<PageLink> {
    let document = Html::parse_document(html);
    let Ok(selector) = Selector::parse("a[href]") else {
        return Vec::new();
    };

    document
        .select(&selector)
        .filter_map(|anchor| {
            let href = anchor.value().attr("href")?.trim();
            if href.is_empty() || href.starts_with("mailto:") || href.starts_with("javascript:") {
                return None;
            }
            let mut url = page_url.join(href).ok()?;
            url.set_fragment(None);
            let text = anchor
                .text()
                .flat_map(str::split_whitespace)
                .collect::<Vec<_>>()
                .join(" ");
            Some(PageLink { url, text })
        })
        .collect()
}

fn document_pattern(extensions: &[String]) -> Result<Regex> {
    let alternatives = extensions
        .iter()
        .map(|ext| regex::escape(ext.trim_start_matches('.')))
        .collect::<Vec<_>>()
        .join("|");

    Regex::new(&format!(r"(?i)\.(?:{})$", alternatives))
        .map_err(|e| HarvestError::Config(format!("invalid document extensions: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::ResourceSubtype;
    use std::collections::HashMap;
    use std::sync::Mutex;

    const SITE: &str = "https://ocw.mit.edu";

    struct FakeFetcher {
        pages: HashMap<String, String>,
        fetched: Mutex<Vec<String>>,
    }

    impl FakeFetcher {
        fn new(pages: &[(&str, &str)]) -> Self {
            Self {
                pages: pages
                    .iter()
                    .map(|(url, html)| (format!("{}{}", SITE, url), html.to_string()))
                    .collect(),
                fetched: Mutex::new(Vec::new()),
            }
        }

        fn fetched(&self) -> Vec<String> {
            self.fetched.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl PageFetcher for FakeFetcher {
        async fn fetch(&self, url: &str) -> Result<String> {
            self.fetched.lock().unwrap().push(url.to_string());
            self.pages
                .get(url)
                .cloned()
                .ok_or_else(|| HarvestError::fetch(url, "HTTP 404 Not Found"))
        }
    }

    fn crawler(fetcher: Arc<FakeFetcher>, max_pages: usize) -> SiteCrawler {
        let cfg = CrawlerConfig {
            max_pages,
            ..Default::default()
        };
        SiteCrawler::new(fetcher, &cfg).unwrap()
    }

    fn cyclic_site() -> Arc<FakeFetcher> {
        Arc::new(FakeFetcher::new(&[
            (
                "/courses/6-006/",
                r##"<html><body>
                    <a href="/courses/6-006/pages/lecture-notes/">Lecture Notes</a>
                    <a href="/courses/6-006/pages/syllabus/">Syllabus</a>
                    <a href="/courses/6-006/abc_lec1.pdf">Lecture 1 Notes</a>
                    <a href="https://ocw.mit.edu/courses/6-006/pages/lecture-notes/#top">Back to notes</a>
                    <a href="/courses/18-01/pages/calculus/">Another course</a>
                    <a href="/search/">Search</a>
                </body></html>"##,
            ),
            (
                "/courses/6-006/pages/lecture-notes/",
                r#"<ul>
                    <li><a href="slides_lec2.PDF">Lecture 2 Slides</a></li>
                    <li><a href="/courses/6-006/">Course home</a></li>
                    <li><a href="/courses/6-006/pages/syllabus/">Syllabus</a></li>
                </ul>"#,
            ),
            (
                "/courses/6-006/pages/syllabus/",
                r#"<p><a href="/courses/6-006/pages/lecture-notes/">Back</a>
                   <a href="/courses/6-006/handout.pdf">Handout</a></p>"#,
            ),
        ]))
    }

    #[tokio::test]
    async fn test_crawl_terminates_on_cycle_and_fetches_each_page_once() {
        let fetcher = cyclic_site();
        let result = crawler(fetcher.clone(), 100).crawl_course("6-006").await.unwrap();

        let fetched = fetcher.fetched();
        assert_eq!(
            fetched,
            vec![
                "https://ocw.mit.edu/courses/6-006/",
                "https://ocw.mit.edu/courses/6-006/pages/lecture-notes/",
                "https://ocw.mit.edu/courses/6-006/pages/syllabus/",
            ]
        );
        assert_eq!(result.pages_visited, fetched.len());
        assert!(!result.truncated);
    }

    #[tokio::test]
    async fn test_crawl_collects_classified_documents_in_order() {
        let result = crawler(cyclic_site(), 100).crawl_course("6-006").await.unwrap();

        let found: Vec<(&str, ResourceSubtype, &str)> = result
            .resources
            .iter()
            .map(|r| (r.url.as_str(), r.subtype.clone(), r.page_url.as_deref().unwrap()))
            .collect();

        assert_eq!(
            found,
            vec![
                (
                    "https://ocw.mit.edu/courses/6-006/abc_lec1.pdf",
                    ResourceSubtype::Notes,
                    "https://ocw.mit.edu/courses/6-006/",
                ),
                (
                    "https://ocw.mit.edu/courses/6-006/pages/lecture-notes/slides_lec2.PDF",
                    ResourceSubtype::Slides,
                    "https://ocw.mit.edu/courses/6-006/pages/lecture-notes/",
                ),
                (
                    "https://ocw.mit.edu/courses/6-006/handout.pdf",
                    ResourceSubtype::Unknown,
                    "https://ocw.mit.edu/courses/6-006/pages/syllabus/",
                ),
            ]
        );
        assert!(result
            .resources
            .iter()
            .all(|r| r.course_handle.as_deref() == Some("6-006")));
    }

    #[tokio::test]
    async fn test_failed_page_is_abandoned_without_failing_crawl() {
        let fetcher = Arc::new(FakeFetcher::new(&[
            (
                "/courses/6-001/",
                r#"<a href="/courses/6-001/pages/missing/">Gone</a>
                   <a href="/courses/6-001/pages/readings/">Readings</a>"#,
            ),
            (
                "/courses/6-001/pages/readings/",
                r#"<a href="/courses/6-001/reading1.pdf">Reading 1</a>"#,
            ),
        ]));

        let result = crawler(fetcher.clone(), 100).crawl_course("6-001").await.unwrap();

        assert_eq!(result.pages_failed, 1);
        assert_eq!(result.pages_visited, 3);
        assert_eq!(fetcher.fetched().len(), 3);
        assert_eq!(result.resources.len(), 1);
    }

    #[tokio::test]
    async fn test_unreachable_seed_yields_empty_result() {
        let fetcher = Arc::new(FakeFetcher::new(&[]));
        let result = crawler(fetcher, 100).crawl_course("6-404").await.unwrap();

        assert!(result.resources.is_empty());
        assert_eq!(result.pages_failed, 1);
    }

    #[tokio::test]
    async fn test_page_limit_bounds_crawl() {
        let fetcher = Arc::new(FakeFetcher::new(&[
            ("/courses/c/", r#"<a href="/courses/c/pages/p1/">1</a>"#),
            ("/courses/c/pages/p1/", r#"<a href="/courses/c/pages/p2/">2</a>"#),
            ("/courses/c/pages/p2/", r#"<a href="/courses/c/pages/p3/">3</a>"#),
            ("/courses/c/pages/p3/", r#"<a href="/courses/c/x.pdf">x</a>"#),
        ]));

        let result = crawler(fetcher.clone(), 2).crawl_course("c").await.unwrap();

        assert!(result.truncated);
        assert_eq!(fetcher.fetched().len(), 2);
        assert_eq!(result.pages_visited, 2);
    }

    #[test]
    fn test_extract_links_resolves_relative_hrefs() {
        let page = Url::parse("https://ocw.mit.edu/courses/6-006/pages/lecture-notes/").unwrap();
        let links = extract_links(
            r#"<a href="lec1.pdf">  Lecture
                 1 </a><a href="mailto:ocw@mit.edu">Mail</a><a href="../syllabus/#grading">Syllabus</a>"#,
            &page,
        );

        assert_eq!(links.len(), 2);
        assert_eq!(
            links[0].url.as_str(),
            "https://ocw.mit.edu/courses/6-006/pages/lecture-notes/lec1.pdf"
        );
        assert_eq!(links[0].text, "Lecture 1");
        assert_eq!(links[1].url.as_str(), "https://ocw.mit.edu/courses/6-006/pages/syllabus/");
    }

    #[test]
    fn test_document_pattern_from_extensions() {
        let pattern = document_pattern(&["pdf".to_string(), ".pptx".to_string()]).unwrap();
        assert!(pattern.is_match("/courses/x/lec.PDF"));
        assert!(pattern.is_match("/courses/x/deck.pptx"));
        assert!(!pattern.is_match("/courses/x/pdf-notes/"));
    }
}
