use std::time::{Duration, Instant};

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{Html, Selector};
use tracing::debug;

use firmscout_core::config::CrawlerConfig;
use firmscout_core::{FetchError, FetchOutcome, PageFetcher};

static SCRIPT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<script[^>]*>.*?</script>").unwrap());
static STYLE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?is)<style[^>]*>.*?</style>").unwrap());
static NOSCRIPT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<noscript[^>]*>.*?</noscript>").unwrap());

fn selector(s: &str) -> Option<Selector> {
    Selector::parse(s).ok()
}

fn element_texts(document: &Html, sel: &str) -> Vec<String> {
    selector(sel)
        .map(|s| {
            document
                .select(&s)
                .map(|el| el.text().collect::<String>().trim().to_string())
                .filter(|t| !t.is_empty())
                .collect()
        })
        .unwrap_or_default()
}

/// Cleaned text, title, and a light markdown rendering of an HTML document.
/// Pure string work so it can run outside any await point.
pub fn clean_html(raw: &str) -> (Option<String>, String, String) {
    let stripped = SCRIPT_RE.replace_all(raw, " ");
    let stripped = STYLE_RE.replace_all(&stripped, " ");
    let stripped = NOSCRIPT_RE.replace_all(&stripped, " ");

    let document = Html::parse_document(&stripped);

    let title = selector("title")
        .and_then(|s| document.select(&s).next())
        .map(|el| el.text().collect::<String>().trim().to_string())
        .filter(|t| !t.is_empty());

    let cleaned_text = selector("body")
        .and_then(|s| document.select(&s).next())
        .map(|el| {
            el.text()
                .collect::<Vec<_>>()
                .join(" ")
                .split_whitespace()
                .collect::<Vec<_>>()
                .join(" ")
        })
        .unwrap_or_default();

    let mut markdown = String::new();
    if let Some(t) = &title {
        markdown.push_str(&format!("# {t}\n\n"));
    }
    for (sel, prefix) in [("h1", "# "), ("h2", "## "), ("h3", "### ")] {
        for heading in element_texts(&document, sel) {
            markdown.push_str(prefix);
            markdown.push_str(&heading);
            markdown.push('\n');
        }
    }
    for paragraph in element_texts(&document, "p") {
        markdown.push('\n');
        markdown.push_str(&paragraph);
        markdown.push('\n');
    }

    (title, cleaned_text, markdown)
}

/// reqwest-backed page fetcher. Moves bytes and strips markup; content
/// thresholds and politeness belong to the crawl stage.
pub struct HttpPageFetcher {
    client: reqwest::Client,
    max_body_size: usize,
}

impl HttpPageFetcher {
    pub fn new(config: &CrawlerConfig) -> Result<Self, firmscout_core::ExtractError> {
        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| firmscout_core::ExtractError::Unexpected(e.to_string()))?;
        Ok(Self {
            client,
            max_body_size: config.max_body_size_mb * 1024 * 1024,
        })
    }
}

#[async_trait]
impl PageFetcher for HttpPageFetcher {
    async fn fetch(&self, url: &str, timeout: Duration) -> Result<FetchOutcome, FetchError> {
        let start = Instant::now();

        let work = async {
            let response = self
                .client
                .get(url)
                .send()
                .await
                .map_err(|e| FetchError::Network(e.to_string()))?;

            let status = response.status().as_u16();
            if !(200..300).contains(&status) {
                return Err(FetchError::Http {
                    status,
                    url: url.to_string(),
                });
            }

            let body = response
                .bytes()
                .await
                .map_err(|e| FetchError::Network(e.to_string()))?;
            if body.len() > self.max_body_size {
                return Err(FetchError::BodyTooLarge {
                    size: body.len(),
                    max: self.max_body_size,
                });
            }
            Ok((status, String::from_utf8_lossy(&body).into_owned()))
        };

        let (status, raw) = tokio::time::timeout(timeout, work)
            .await
            .map_err(|_| FetchError::Timeout(timeout.as_secs()))??;

        let (title, cleaned_text, markdown) = clean_html(&raw);
        let elapsed_ms = start.elapsed().as_millis() as u64;
        debug!(url, status, elapsed_ms, chars = cleaned_text.len(), "fetched page");

        Ok(FetchOutcome {
            status,
            title,
            cleaned_text,
            markdown,
            elapsed_ms,
        })
    }
}
