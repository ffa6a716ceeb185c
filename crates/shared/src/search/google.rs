use std::time::Duration;

use serde::Deserialize;
use tracing::{debug, warn};

use super::{SearchBuildError, SearchError, SearchFuture, SearchResult, Searchable, http_client};
use crate::recover::guarded_call;

pub(super) const DEFAULT_ENDPOINT_URL: &str = "https://www.googleapis.com/customsearch/v1";
const MAX_RESULTS_PER_REQUEST: usize = 10;
const MISSING_TITLE: &str = "제목 없음";
const MISSING_SNIPPET: &str = "내용 없음";
const CONFIG_ERROR_TITLE: &str = "검색 설정 오류";
const CONFIG_ERROR_CONTENT: &str =
    "Google API Key 또는 Search Engine ID가 설정되지 않았습니다. 환경 변수를 확인하세요.";

#[derive(Debug, Clone)]
pub struct GoogleSearchConfig {
    pub endpoint_url: String,
    pub api_key: Option<String>,
    pub search_engine_id: Option<String>,
    pub timeout_ms: u64,
}

impl GoogleSearchConfig {
    pub fn has_credentials(&self) -> bool {
        self.api_key.is_some() && self.search_engine_id.is_some()
    }
}

/// Google Custom Search JSON API backend.
#[derive(Clone)]
pub struct GoogleSearch {
    client: reqwest::Client,
    config: GoogleSearchConfig,
}

impl GoogleSearch {
    pub fn new(config: GoogleSearchConfig) -> Result<Self, SearchBuildError> {
        let client = http_client(config.timeout_ms, None)?;
        Ok(Self { client, config })
    }

    async fn fetch(
        &self,
        api_key: &str,
        search_engine_id: &str,
        query: &str,
        max_results: usize,
    ) -> Result<Vec<SearchResult>, SearchError> {
        let num = max_results.clamp(1, MAX_RESULTS_PER_REQUEST).to_string();
        let response = self
            .client
            .get(&self.config.endpoint_url)
            .query(&[
                ("key", api_key),
                ("cx", search_engine_id),
                ("q", query),
                ("num", num.as_str()),
            ])
            .send()
            .await
            .map_err(|err| SearchError::Transport(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(SearchError::Status(status.as_u16()));
        }

        let body = response
            .json::<CustomSearchResponse>()
            .await
            .map_err(|err| SearchError::Decode(err.to_string()))?;

        Ok(body
            .items
            .into_iter()
            .take(max_results)
            .map(|item| SearchResult {
                title: non_empty_or(item.title, MISSING_TITLE),
                content: non_empty_or(item.snippet, MISSING_SNIPPET),
                url: item.link.unwrap_or_default(),
            })
            .collect())
    }
}

impl Searchable for GoogleSearch {
    fn backend_name(&self) -> &'static str {
        "google"
    }

    fn search<'a>(&'a self, query: &'a str, max_results: usize) -> SearchFuture<'a> {
        Box::pin(async move {
            let (Some(api_key), Some(search_engine_id)) = (
                self.config.api_key.as_deref(),
                self.config.search_engine_id.as_deref(),
            ) else {
                warn!(backend = "google", "search credentials are not configured");
                return vec![configuration_error_result()];
            };

            if max_results == 0 || query.trim().is_empty() {
                return Vec::new();
            }

            let results = guarded_call(
                "google_search",
                Duration::from_millis(self.config.timeout_ms),
                self.fetch(api_key, search_engine_id, query, max_results),
            )
            .await
            .unwrap_or_default();
            debug!(backend = "google", result_count = results.len(), "search completed");
            results
        })
    }
}

fn configuration_error_result() -> SearchResult {
    SearchResult {
        title: CONFIG_ERROR_TITLE.to_string(),
        content: CONFIG_ERROR_CONTENT.to_string(),
        url: String::new(),
    }
}

fn non_empty_or(value: Option<String>, default: &str) -> String {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .unwrap_or_else(|| default.to_string())
}

#[derive(Debug, Deserialize)]
struct CustomSearchResponse {
    #[serde(default)]
    items: Vec<CustomSearchItem>,
}

#[derive(Debug, Deserialize)]
struct CustomSearchItem {
    title: Option<String>,
    snippet: Option<String>,
    link: Option<String>,
}
