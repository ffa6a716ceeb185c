use serde::Serialize;
use shared::search::{SearchResult, format_results};

#[derive(Debug, Clone, Serialize)]
pub struct SearchReport {
    pub query: String,
    pub search_query: String,
    pub backend: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub keywords: Option<Vec<String>>,
    pub results: Vec<SearchResult>,
}

impl SearchReport {
    pub fn render_text(&self) -> String {
        let mut rendered = String::new();
        if let Some(keywords) = &self.keywords {
            rendered.push_str(&format!("추출된 키워드: {}\n\n", keywords.join(", ")));
        }
        rendered.push_str(&format_results(&self.results));
        rendered
    }

    pub fn render_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

/// Joins positional words back into one query.
pub fn join_query(words: &[String]) -> String {
    words
        .iter()
        .map(|word| word.trim())
        .filter(|word| !word.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}
