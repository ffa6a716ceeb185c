use std::time::Duration;

use scraper::{ElementRef, Html, Selector};
use tracing::debug;
use url::Url;

use super::{SearchBuildError, SearchError, SearchFuture, SearchResult, Searchable, http_client};
use crate::recover::guarded_call;

pub(super) const DEFAULT_ENDPOINT_URL: &str = "https://html.duckduckgo.com/html/";
const LINK_PREFIX: &str = "https://duckduckgo.com";
const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
     (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

#[derive(Debug, Clone)]
pub struct DuckDuckGoSearchConfig {
    pub endpoint_url: String,
    pub timeout_ms: u64,
}

/// Scrapes the DuckDuckGo HTML result page. Needs no credentials.
#[derive(Clone)]
pub struct DuckDuckGoSearch {
    client: reqwest::Client,
    config: DuckDuckGoSearchConfig,
}

impl DuckDuckGoSearch {
    pub fn new(config: DuckDuckGoSearchConfig) -> Result<Self, SearchBuildError> {
        let client = http_client(config.timeout_ms, Some(BROWSER_USER_AGENT))?;
        Ok(Self { client, config })
    }

    async fn fetch(&self, query: &str, max_results: usize) -> Result<Vec<SearchResult>, SearchError> {
        let response = self
            .client
            .get(&self.config.endpoint_url)
            .query(&[("q", query)])
            .send()
            .await
            .map_err(|err| SearchError::Transport(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(SearchError::Status(status.as_u16()));
        }

        let page = response
            .text()
            .await
            .map_err(|err| SearchError::Decode(err.to_string()))?;

        Ok(parse_result_page(&page, max_results))
    }
}

impl Searchable for DuckDuckGoSearch {
    fn backend_name(&self) -> &'static str {
        "duckduckgo"
    }

    fn search<'a>(&'a self, query: &'a str, max_results: usize) -> SearchFuture<'a> {
        Box::pin(async move {
            if max_results == 0 || query.trim().is_empty() {
                return Vec::new();
            }

            let results = guarded_call(
                "duckduckgo_search",
                Duration::from_millis(self.config.timeout_ms),
                self.fetch(query, max_results),
            )
            .await
            .unwrap_or_default();
            debug!(backend = "duckduckgo", result_count = results.len(), "search completed");
            results
        })
    }
}

/// Extracts up to `max_results` result blocks from a DuckDuckGo HTML page.
/// Blocks without a title are skipped.
pub fn parse_result_page(page: &str, max_results: usize) -> Vec<SearchResult> {
    let (
        Ok(result_selector),
        Ok(anchor_selector),
        Ok(title_selector),
        Ok(snippet_selector),
        Ok(url_selector),
    ) = (
        Selector::parse(".result"),
        Selector::parse(".result__a"),
        Selector::parse(".result__title"),
        Selector::parse(".result__snippet"),
        Selector::parse(".result__url"),
    ) else {
        return Vec::new();
    };

    let document = Html::parse_document(page);
    let mut results = Vec::new();
    for block in document.select(&result_selector) {
        if results.len() >= max_results {
            break;
        }

        let Some(title_element) = block
            .select(&anchor_selector)
            .next()
            .or_else(|| block.select(&title_selector).next())
        else {
            continue;
        };
        let title = element_text(title_element);
        if title.is_empty() {
            continue;
        }

        let content = block
            .select(&snippet_selector)
            .next()
            .map(element_text)
            .unwrap_or_default();
        let url = title_element
            .value()
            .attr("href")
            .map(absolute_link)
            .or_else(|| {
                block
                    .select(&url_selector)
                    .next()
                    .map(element_text)
                    .filter(|text| !text.is_empty())
                    .map(|text| absolute_link(&text))
            })
            .unwrap_or_default();

        results.push(SearchResult {
            title,
            content,
            url,
        });
    }

    results
}

fn element_text(element: ElementRef<'_>) -> String {
    element
        .text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}

fn absolute_link(href: &str) -> String {
    let trimmed = href.trim();
    let Ok(base) = Url::parse(LINK_PREFIX) else {
        return trimmed.to_string();
    };
    let candidate = if trimmed.contains("://") || trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("https://{trimmed}")
    };

    match base.join(&candidate) {
        Ok(link) => redirect_target(&link).unwrap_or_else(|| link.to_string()),
        Err(_) => trimmed.to_string(),
    }
}

/// Outbound links on the result page are wrapped as `/l/?uddg=<target>`.
fn redirect_target(link: &Url) -> Option<String> {
    if link.domain() != Some("duckduckgo.com") || link.path() != "/l/" {
        return None;
    }
    link.query_pairs()
        .find(|(key, _)| key == "uddg")
        .map(|(_, target)| target.into_owned())
        .filter(|target| !target.is_empty())
}
