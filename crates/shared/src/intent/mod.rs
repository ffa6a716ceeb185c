mod model;
mod patterns;

use std::future::Future;
use std::pin::Pin;

use serde::{Deserialize, Serialize};

use crate::models::ChatMessage;

pub use model::{INTENT_SYSTEM_PROMPT, ModelIntentClassifier, extract_json_object, parse_intent_reply};
pub use patterns::{PatternIntentClassifier, PatternSignals, classify_by_patterns, decide, detect_signals};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentCategory {
    Datetime,
    Search,
    Mixed,
    General,
}

impl IntentCategory {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "datetime" => Some(Self::Datetime),
            "search" => Some(Self::Search),
            "mixed" => Some(Self::Mixed),
            "general" => Some(Self::General),
            _ => None,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Datetime => "datetime",
            Self::Search => "search",
            Self::Mixed => "mixed",
            Self::General => "general",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentSubtype {
    Time,
    Date,
    Datetime,
    Search,
    General,
}

impl IntentSubtype {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "time" => Some(Self::Time),
            "date" => Some(Self::Date),
            "datetime" => Some(Self::Datetime),
            "search" => Some(Self::Search),
            "general" => Some(Self::General),
            _ => None,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Time => "time",
            Self::Date => "date",
            Self::Datetime => "datetime",
            Self::Search => "search",
            Self::General => "general",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelativeImportance {
    Search,
    Datetime,
    Both,
}

impl RelativeImportance {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "search" => Some(Self::Search),
            "datetime" => Some(Self::Datetime),
            "both" => Some(Self::Both),
            _ => None,
        }
    }
}

/// What side information a query needs. Produced fresh per query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntentDecision {
    pub category: IntentCategory,
    pub subtype: IntentSubtype,
    pub datetime_needed: bool,
    pub search_needed: bool,
    pub relative_importance: RelativeImportance,
    pub reasoning: String,
}

impl IntentDecision {
    /// Neither datetime nor search; used when classification is disabled.
    pub fn general(reasoning: impl Into<String>) -> Self {
        Self {
            category: IntentCategory::General,
            subtype: IntentSubtype::General,
            datetime_needed: false,
            search_needed: false,
            relative_importance: RelativeImportance::Search,
            reasoning: reasoning.into(),
        }
    }

    /// Default when a model reply cannot be used: general intent that still
    /// searches.
    pub fn model_fallback(reasoning: impl Into<String>) -> Self {
        Self {
            search_needed: true,
            ..Self::general(reasoning)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentStrategy {
    Pattern,
    Model,
    Off,
}

impl IntentStrategy {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "pattern" | "regex" => Some(Self::Pattern),
            "model" | "llm" => Some(Self::Model),
            "off" | "none" | "disabled" => Some(Self::Off),
            _ => None,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pattern => "pattern",
            Self::Model => "model",
            Self::Off => "off",
        }
    }
}

pub type IntentFuture<'a> = Pin<Box<dyn Future<Output = IntentDecision> + Send + 'a>>;

/// Classifiers never fail; they degrade to a documented default decision.
pub trait IntentClassifier: Send + Sync {
    fn strategy(&self) -> IntentStrategy;

    fn classify<'a>(&'a self, query: &'a str, history: &'a [ChatMessage]) -> IntentFuture<'a>;
}

#[cfg(test)]
mod tests {
    use super::{IntentCategory, IntentDecision, IntentStrategy, IntentSubtype, RelativeImportance};

    #[test]
    fn enums_parse_case_insensitively() {
        assert_eq!(IntentCategory::parse("MIXED"), Some(IntentCategory::Mixed));
        assert_eq!(IntentSubtype::parse(" Date "), Some(IntentSubtype::Date));
        assert_eq!(
            RelativeImportance::parse("both"),
            Some(RelativeImportance::Both)
        );
        assert_eq!(IntentStrategy::parse("llm"), Some(IntentStrategy::Model));
        assert_eq!(IntentCategory::parse("weather"), None);
    }

    #[test]
    fn model_fallback_still_searches() {
        let decision = IntentDecision::model_fallback("unparseable reply");
        assert_eq!(decision.category, IntentCategory::General);
        assert!(!decision.datetime_needed);
        assert!(decision.search_needed);

        let general = IntentDecision::general("disabled");
        assert!(!general.search_needed);
    }

    #[test]
    fn decisions_serialize_with_snake_case_labels() {
        let encoded = serde_json::to_value(IntentDecision::general("x"))
            .expect("decision should serialize");
        assert_eq!(encoded["category"], "general");
        assert_eq!(encoded["relative_importance"], "search");
    }
}
