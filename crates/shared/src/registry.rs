use std::fs;
use std::io::ErrorKind;
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use thiserror::Error;
use tracing::{info, warn};

use crate::datetime::{
    DatetimeProvider, TimeSource, format_date, format_datetime_info, format_time,
    format_time_difference,
};
use crate::keywords::extract_keywords;
use crate::search::{
    DEFAULT_MAX_RESULTS, SearchBackendKind, SearchBuildError, SearchResult, SearchSettings,
    Searchable, format_results,
};
use crate::timezone::DEFAULT_TIME_ZONE;

pub const DEFAULT_SERVICES_CONFIG_PATH: &str = "mcp_config.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceKind {
    Datetime,
    GoogleSearch,
    DuckduckgoSearch,
    AutoSearch,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceParams {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timezone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_results: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceConfig {
    pub name: String,
    pub kind: ServiceKind,
    #[serde(default)]
    pub params: ServiceParams,
}

/// Static service wiring, read once at startup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServicesConfig {
    pub services: Vec<ServiceConfig>,
}

impl Default for ServicesConfig {
    fn default() -> Self {
        Self {
            services: vec![
                ServiceConfig {
                    name: "datetime".to_string(),
                    kind: ServiceKind::Datetime,
                    params: ServiceParams {
                        timezone: Some(DEFAULT_TIME_ZONE.to_string()),
                        max_results: None,
                    },
                },
                ServiceConfig {
                    name: "search".to_string(),
                    kind: ServiceKind::GoogleSearch,
                    params: ServiceParams {
                        timezone: None,
                        max_results: Some(DEFAULT_MAX_RESULTS),
                    },
                },
            ],
        }
    }
}

impl ServicesConfig {
    /// A missing file means the default wiring; an unreadable or malformed
    /// one is an error.
    pub fn load(path: &Path) -> Result<Self, ServicesConfigError> {
        let raw = match fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(source) if source.kind() == ErrorKind::NotFound => {
                info!(path = %path.display(), "service config not found, using defaults");
                return Ok(Self::default());
            }
            Err(source) => {
                return Err(ServicesConfigError::Read {
                    path: path.display().to_string(),
                    source,
                });
            }
        };

        serde_json::from_str(&raw).map_err(|source| ServicesConfigError::Parse {
            path: path.display().to_string(),
            source,
        })
    }
}

#[derive(Debug, Error)]
pub enum ServicesConfigError {
    #[error("failed to read service config {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("service config {path} is not valid JSON: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("service '{0}' is configured more than once")]
    DuplicateService(String),
    #[error(transparent)]
    SearchBackend(#[from] SearchBuildError),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ToolError {
    #[error("unknown tool: {0}")]
    UnknownTool(String),
    #[error("invalid arguments for {tool}: {message}")]
    InvalidArguments { tool: String, message: String },
    #[error("no service provides {0}")]
    ServiceUnavailable(String),
}

/// A search backend with its configured result bound.
#[derive(Clone)]
pub struct SearchService {
    backend: Arc<dyn Searchable>,
    max_results: usize,
}

impl SearchService {
    pub fn new(backend: Arc<dyn Searchable>, max_results: usize) -> Self {
        Self {
            backend,
            max_results,
        }
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.backend_name()
    }

    pub fn max_results(&self) -> usize {
        self.max_results
    }

    pub async fn search(&self, query: &str) -> Vec<SearchResult> {
        self.search_with_limit(query, self.max_results).await
    }

    pub async fn search_with_limit(&self, query: &str, max_results: usize) -> Vec<SearchResult> {
        let mut results = self.backend.search(query, max_results).await;
        results.truncate(max_results);
        results
    }
}

#[derive(Clone)]
pub enum Capability {
    Time(Arc<dyn TimeSource>),
    Search(SearchService),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolDescriptor {
    pub name: &'static str,
    pub description: &'static str,
    pub input_schema: Value,
}

/// Service name to capability, built from static configuration. Services
/// keep their wiring order, and the first service of a capability is the
/// one turns and tools use.
#[derive(Clone, Default)]
pub struct ServiceRegistry {
    services: Vec<(String, Capability)>,
}

impl ServiceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(
        config: &ServicesConfig,
        search_settings: &SearchSettings,
    ) -> Result<Self, ServicesConfigError> {
        let mut registry = Self::new();
        for service in &config.services {
            if registry.contains(&service.name) {
                return Err(ServicesConfigError::DuplicateService(service.name.clone()));
            }

            let capability = match service.kind {
                ServiceKind::Datetime => {
                    let time_zone = service
                        .params
                        .timezone
                        .clone()
                        .unwrap_or_else(|| DEFAULT_TIME_ZONE.to_string());
                    Capability::Time(Arc::new(DatetimeProvider::new(time_zone)))
                }
                ServiceKind::GoogleSearch => {
                    search_capability(service, search_settings, SearchBackendKind::Google)?
                }
                ServiceKind::DuckduckgoSearch => {
                    search_capability(service, search_settings, SearchBackendKind::DuckDuckGo)?
                }
                ServiceKind::AutoSearch => {
                    search_capability(service, search_settings, SearchBackendKind::Auto)?
                }
            };

            if registry.has_capability_like(&capability) {
                warn!(
                    service = %service.name,
                    kind = ?service.kind,
                    "an earlier service already provides this capability"
                );
            }
            info!(service = %service.name, kind = ?service.kind, "registered service");
            registry.services.push((service.name.clone(), capability));
        }

        Ok(registry)
    }

    /// Replaces a service of the same name in place, otherwise appends.
    pub fn register(&mut self, name: impl Into<String>, capability: Capability) -> &mut Self {
        let name = name.into();
        match self.services.iter_mut().find(|(existing, _)| *existing == name) {
            Some((_, slot)) => *slot = capability,
            None => self.services.push((name, capability)),
        }
        self
    }

    pub fn service_names(&self) -> impl Iterator<Item = &str> {
        self.services.iter().map(|(name, _)| name.as_str())
    }

    fn contains(&self, name: &str) -> bool {
        self.services.iter().any(|(existing, _)| existing == name)
    }

    fn has_capability_like(&self, capability: &Capability) -> bool {
        match capability {
            Capability::Time(_) => self.time_source().is_some(),
            Capability::Search(_) => self.search_service().is_some(),
        }
    }

    pub fn time_source(&self) -> Option<&dyn TimeSource> {
        self.services.iter().find_map(|(_, capability)| match capability {
            Capability::Time(source) => Some(source.as_ref()),
            Capability::Search(_) => None,
        })
    }

    pub fn search_service(&self) -> Option<&SearchService> {
        self.services.iter().find_map(|(_, capability)| match capability {
            Capability::Search(service) => Some(service),
            Capability::Time(_) => None,
        })
    }

    /// Tools callable with the registered services.
    pub fn tools(&self) -> Vec<ToolDescriptor> {
        let mut tools = Vec::new();
        if self.time_source().is_some() {
            tools.push(ToolDescriptor {
                name: "get_current_time",
                description: "현재 시간 정보를 가져옵니다.",
                input_schema: json!({ "type": "object", "properties": {} }),
            });
            tools.push(ToolDescriptor {
                name: "get_current_date",
                description: "현재 날짜 정보를 가져옵니다.",
                input_schema: json!({ "type": "object", "properties": {} }),
            });
            tools.push(ToolDescriptor {
                name: "get_datetime_info",
                description: "현재 날짜와 시간에 대한 종합 정보를 가져옵니다.",
                input_schema: json!({
                    "type": "object",
                    "properties": {
                        "format": { "type": "string", "enum": ["text", "json"] }
                    }
                }),
            });
            tools.push(ToolDescriptor {
                name: "calculate_time_difference",
                description: "두 날짜 사이의 기간을 계산합니다.",
                input_schema: json!({
                    "type": "object",
                    "properties": {
                        "from_date": { "type": "string", "description": "YYYY-MM-DD 또는 YYYY/MM/DD" },
                        "to_date": { "type": "string", "description": "생략하면 오늘" }
                    },
                    "required": ["from_date"]
                }),
            });
        }
        if self.search_service().is_some() {
            tools.push(ToolDescriptor {
                name: "search",
                description: "웹 검색을 수행합니다.",
                input_schema: json!({
                    "type": "object",
                    "properties": {
                        "query": { "type": "string" },
                        "max_results": { "type": "integer", "minimum": 1, "maximum": 10 }
                    },
                    "required": ["query"]
                }),
            });
        }
        tools.push(ToolDescriptor {
            name: "extract_keywords",
            description: "텍스트에서 검색 키워드를 추출합니다.",
            input_schema: json!({
                "type": "object",
                "properties": { "text": { "type": "string" } },
                "required": ["text"]
            }),
        });
        tools
    }

    pub async fn call_tool(&self, name: &str, arguments: &Value) -> Result<String, ToolError> {
        match name {
            "get_current_time" => Ok(format_time(&self.require_time(name)?.current_time())),
            "get_current_date" => Ok(format_date(&self.require_time(name)?.current_date())),
            "get_datetime_info" => {
                let info = self.require_time(name)?.datetime_info();
                if optional_string_arg(arguments, "format") == Some("json") {
                    serde_json::to_string_pretty(&info).map_err(|err| invalid(name, err.to_string()))
                } else {
                    Ok(format_datetime_info(&info))
                }
            }
            "calculate_time_difference" => {
                let from = required_string_arg(name, arguments, "from_date")?;
                let to = optional_string_arg(arguments, "to_date");
                self.require_time(name)?
                    .time_difference(from, to)
                    .map(|difference| format_time_difference(&difference))
                    .map_err(|err| invalid(name, err.to_string()))
            }
            "search" => {
                let query = required_string_arg(name, arguments, "query")?;
                let service = self
                    .search_service()
                    .ok_or_else(|| ToolError::ServiceUnavailable(name.to_string()))?;
                let max_results = match arguments.get("max_results") {
                    None | Some(Value::Null) => service.max_results(),
                    Some(value) => value
                        .as_u64()
                        .and_then(|value| usize::try_from(value).ok())
                        .filter(|value| *value > 0)
                        .ok_or_else(|| invalid(name, "max_results must be a positive integer"))?,
                };
                let results = service.search_with_limit(query, max_results).await;
                Ok(format_results(&results))
            }
            "extract_keywords" => {
                let text = required_string_arg(name, arguments, "text")?;
                Ok(format!("추출된 키워드: {}", extract_keywords(text).join(", ")))
            }
            unknown => Err(ToolError::UnknownTool(unknown.to_string())),
        }
    }

    fn require_time(&self, tool: &str) -> Result<&dyn TimeSource, ToolError> {
        self.time_source()
            .ok_or_else(|| ToolError::ServiceUnavailable(tool.to_string()))
    }
}

fn search_capability(
    service: &ServiceConfig,
    search_settings: &SearchSettings,
    backend_kind: SearchBackendKind,
) -> Result<Capability, ServicesConfigError> {
    let backend = search_settings.build_backend(backend_kind)?;
    Ok(Capability::Search(SearchService::new(
        backend,
        service.params.max_results.unwrap_or(DEFAULT_MAX_RESULTS),
    )))
}

fn required_string_arg<'a>(tool: &str, arguments: &'a Value, key: &str) -> Result<&'a str, ToolError> {
    optional_string_arg(arguments, key).ok_or_else(|| invalid(tool, format!("missing string argument '{key}'")))
}

fn optional_string_arg<'a>(arguments: &'a Value, key: &str) -> Option<&'a str> {
    arguments
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|value| !value.is_empty())
}

fn invalid(tool: &str, message: impl Into<String>) -> ToolError {
    ToolError::InvalidArguments {
        tool: tool.to_string(),
        message: message.into(),
    }
}
