use serde::Deserialize;
use shared::intent::{IntentCategory, IntentSubtype, RelativeImportance};
use shared::models::ChatMessage;

#[derive(Debug, Clone, Deserialize)]
pub struct IntentEvalCaseFixture {
    pub case_id: String,
    pub description: String,
    pub query: String,
    #[serde(default)]
    pub history: Vec<ChatMessage>,
    #[serde(default)]
    pub include_in_model_mode: bool,
    pub expectations: IntentExpectations,
}

/// Only the fields that are present are compared.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct IntentExpectations {
    #[serde(default)]
    pub category: Option<IntentCategory>,
    #[serde(default)]
    pub subtype: Option<IntentSubtype>,
    #[serde(default)]
    pub datetime_needed: Option<bool>,
    #[serde(default)]
    pub search_needed: Option<bool>,
    #[serde(default)]
    pub relative_importance: Option<RelativeImportance>,
}
