mod duckduckgo;
mod google;

use std::fmt::Write as _;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::ConfigError;
use crate::config_env::{optional_trimmed_env, parse_u64_env};

pub use duckduckgo::{DuckDuckGoSearch, DuckDuckGoSearchConfig, parse_result_page};
pub use google::{GoogleSearch, GoogleSearchConfig};

pub const DEFAULT_MAX_RESULTS: usize = 5;
pub const DEFAULT_SEARCH_TIMEOUT_MS: u64 = 10_000;
pub const NO_RESULTS_MESSAGE: &str = "검색 결과가 없습니다.";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchResult {
    pub title: String,
    pub content: String,
    pub url: String,
}

pub type SearchFuture<'a> = Pin<Box<dyn Future<Output = Vec<SearchResult>> + Send + 'a>>;

/// A web search backend. Implementations never fail: transport and parse
/// problems are logged and reported as an empty result list.
pub trait Searchable: Send + Sync {
    fn backend_name(&self) -> &'static str;

    fn search<'a>(&'a self, query: &'a str, max_results: usize) -> SearchFuture<'a>;
}

#[derive(Debug, Error)]
pub(crate) enum SearchError {
    #[error("search request failed: {0}")]
    Transport(String),
    #[error("search backend returned status {0}")]
    Status(u16),
    #[error("search response could not be decoded: {0}")]
    Decode(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchBackendKind {
    Google,
    DuckDuckGo,
    Auto,
}

impl SearchBackendKind {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "google" | "google_search" => Some(Self::Google),
            "duckduckgo" | "duckduckgo_search" | "ddg" => Some(Self::DuckDuckGo),
            "auto" | "auto_search" => Some(Self::Auto),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SearchSettings {
    pub google: GoogleSearchConfig,
    pub duckduckgo: DuckDuckGoSearchConfig,
}

impl SearchSettings {
    pub fn from_env() -> Result<Self, ConfigError> {
        let timeout_ms = parse_u64_env("SEARCH_TIMEOUT_MS", DEFAULT_SEARCH_TIMEOUT_MS)?;
        Ok(Self {
            google: GoogleSearchConfig {
                endpoint_url: optional_trimmed_env("GOOGLE_SEARCH_URL")
                    .unwrap_or_else(|| google::DEFAULT_ENDPOINT_URL.to_string()),
                api_key: optional_trimmed_env("GOOGLE_API_KEY"),
                search_engine_id: optional_trimmed_env("GOOGLE_SEARCH_ENGINE_ID"),
                timeout_ms,
            },
            duckduckgo: DuckDuckGoSearchConfig {
                endpoint_url: optional_trimmed_env("DUCKDUCKGO_SEARCH_URL")
                    .unwrap_or_else(|| duckduckgo::DEFAULT_ENDPOINT_URL.to_string()),
                timeout_ms,
            },
        })
    }

    /// `Auto` prefers the JSON API when credentials exist and scrapes the
    /// HTML result page otherwise.
    pub fn build_backend(&self, kind: SearchBackendKind) -> Result<Arc<dyn Searchable>, SearchBuildError> {
        let resolved = match kind {
            SearchBackendKind::Auto if self.google.has_credentials() => SearchBackendKind::Google,
            SearchBackendKind::Auto => SearchBackendKind::DuckDuckGo,
            other => other,
        };

        match resolved {
            SearchBackendKind::Google => Ok(Arc::new(GoogleSearch::new(self.google.clone())?)),
            _ => Ok(Arc::new(DuckDuckGoSearch::new(self.duckduckgo.clone())?)),
        }
    }
}

#[derive(Debug, Error)]
#[error("failed to build search http client: {0}")]
pub struct SearchBuildError(pub String);

/// Renders results as a numbered citation block, or the no-results sentinel.
pub fn format_results(results: &[SearchResult]) -> String {
    if results.is_empty() {
        return NO_RESULTS_MESSAGE.to_string();
    }

    let mut formatted = String::new();
    for (index, result) in results.iter().enumerate() {
        let _ = writeln!(formatted, "[{}] {}", index + 1, result.title);
        let _ = writeln!(formatted, "{}", result.content);
        if !result.url.is_empty() {
            let _ = writeln!(formatted, "출처: {}", result.url);
        }
        formatted.push('\n');
    }

    formatted
}

fn http_client(timeout_ms: u64, user_agent: Option<&str>) -> Result<reqwest::Client, SearchBuildError> {
    let mut builder =
        reqwest::Client::builder().timeout(std::time::Duration::from_millis(timeout_ms));
    if let Some(user_agent) = user_agent {
        builder = builder.user_agent(user_agent);
    }
    builder
        .build()
        .map_err(|err| SearchBuildError(err.to_string()))
}
