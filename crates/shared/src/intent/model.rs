use std::fmt::Write as _;
use std::sync::Arc;
use std::time::Duration;

use serde_json::{Map, Value};
use tracing::{debug, warn};

use super::{
    IntentCategory, IntentClassifier, IntentDecision, IntentFuture, IntentStrategy,
    IntentSubtype, RelativeImportance,
};
use crate::llm::{InferenceParams, ModelGateway, ModelRequest, complete};
use crate::models::{ChatMessage, Role};
use crate::recover::guarded_call;

pub const INTENT_SYSTEM_PROMPT: &str = "You classify what auxiliary information a user's question needs before it is answered.\n\
Decide whether answering requires the current date/time, a fresh web search, both, or neither.\n\
Reply with exactly one JSON object and nothing else, using these keys:\n\
{\"intent\": \"datetime|search|mixed|general\", \"subtype\": \"time|date|datetime|search|general\", \
\"datetime_needed\": true|false, \"search_needed\": true|false, \
\"relative_importance\": \"search|datetime|both\", \"reasoning\": \"one short sentence\"}\n\
Use mixed when the answer combines calendar arithmetic with facts that must be looked up, \
such as how long ago a product was released.";

const CONTEXT_TURNS: usize = 4;
const CLASSIFIER_MAX_TOKENS: u32 = 300;

/// Asks the hosted model for a JSON decision. Any failure yields
/// [`IntentDecision::model_fallback`].
#[derive(Clone)]
pub struct ModelIntentClassifier {
    gateway: Arc<dyn ModelGateway>,
    model_id: String,
    timeout: Duration,
}

impl ModelIntentClassifier {
    pub fn new(gateway: Arc<dyn ModelGateway>, model_id: impl Into<String>, timeout: Duration) -> Self {
        Self {
            gateway,
            model_id: model_id.into(),
            timeout,
        }
    }

    fn request(&self, query: &str, history: &[ChatMessage]) -> ModelRequest {
        ModelRequest {
            model_id: self.model_id.clone(),
            system_prompt: INTENT_SYSTEM_PROMPT.to_string(),
            messages: vec![ChatMessage::user(classification_prompt(query, history))],
            params: InferenceParams {
                temperature: 0.0,
                top_p: None,
                top_k: None,
                max_tokens: CLASSIFIER_MAX_TOKENS,
                reasoning_budget_tokens: None,
            },
        }
    }
}

impl IntentClassifier for ModelIntentClassifier {
    fn strategy(&self) -> IntentStrategy {
        IntentStrategy::Model
    }

    fn classify<'a>(&'a self, query: &'a str, history: &'a [ChatMessage]) -> IntentFuture<'a> {
        Box::pin(async move {
            let request = self.request(query, history);
            match guarded_call(
                "intent_classifier",
                self.timeout,
                complete(self.gateway.as_ref(), request),
            )
            .await
            {
                Ok(reply) => {
                    let decision = parse_intent_reply(&reply);
                    debug!(
                        intent = decision.category.as_str(),
                        subtype = decision.subtype.as_str(),
                        "model classified query"
                    );
                    decision
                }
                Err(err) => IntentDecision::model_fallback(format!("classifier unavailable: {err}")),
            }
        })
    }
}

fn classification_prompt(query: &str, history: &[ChatMessage]) -> String {
    let context_start = history.len().saturating_sub(CONTEXT_TURNS * 2);
    let context = &history[context_start..];

    let mut prompt = String::new();
    if !context.is_empty() {
        prompt.push_str("Recent conversation:\n");
        for message in context.iter().filter(|message| message.role != Role::System) {
            let _ = writeln!(prompt, "{}: {}", message.role.as_str(), message.content);
        }
        prompt.push('\n');
    }
    let _ = write!(prompt, "Question to classify:\n{query}");
    prompt
}

/// Reads the first balanced JSON object in `reply`, filling defaults for
/// anything missing or malformed.
pub fn parse_intent_reply(reply: &str) -> IntentDecision {
    let Some(object) = extract_json_object(reply)
        .and_then(|raw| serde_json::from_str::<Value>(raw).ok())
        .and_then(|value| match value {
            Value::Object(map) => Some(map),
            _ => None,
        })
    else {
        warn!("intent reply did not contain a JSON object, using default decision");
        return IntentDecision::model_fallback("model reply was not valid JSON");
    };

    let fallback = IntentDecision::model_fallback("");
    let category = string_field(&object, "intent")
        .and_then(IntentCategory::parse)
        .unwrap_or(fallback.category);
    let subtype = string_field(&object, "subtype")
        .and_then(IntentSubtype::parse)
        .unwrap_or(match category {
            IntentCategory::Search => IntentSubtype::Search,
            IntentCategory::Datetime | IntentCategory::Mixed => IntentSubtype::Datetime,
            IntentCategory::General => IntentSubtype::General,
        });

    IntentDecision {
        category,
        subtype,
        datetime_needed: bool_field(&object, "datetime_needed").unwrap_or(fallback.datetime_needed),
        search_needed: bool_field(&object, "search_needed").unwrap_or(fallback.search_needed),
        relative_importance: string_field(&object, "relative_importance")
            .and_then(RelativeImportance::parse)
            .unwrap_or(fallback.relative_importance),
        reasoning: string_field(&object, "reasoning")
            .unwrap_or_default()
            .to_string(),
    }
}

fn string_field<'a>(object: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    object.get(key).and_then(Value::as_str)
}

fn bool_field(object: &Map<String, Value>, key: &str) -> Option<bool> {
    match object.get(key)? {
        Value::Bool(value) => Some(*value),
        Value::String(value) => match value.trim().to_ascii_lowercase().as_str() {
            "true" | "yes" => Some(true),
            "false" | "no" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

/// Returns the first `{...}` substring whose braces balance, ignoring
/// braces inside JSON strings.
pub fn extract_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0_usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, ch) in text[start..].char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }

        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..=start + offset]);
                }
            }
            _ => {}
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::{classification_prompt, extract_json_object, parse_intent_reply};
    use crate::intent::{IntentCategory, IntentSubtype, RelativeImportance};
    use crate::models::ChatMessage;

    #[test]
    fn extracts_first_balanced_object_around_prose() {
        let reply = "Sure! {\"intent\": \"search\", \"reasoning\": \"uses {braces} and \\\"quotes\\\"\"} trailing {\"x\": 1}";
        assert_eq!(
            extract_json_object(reply),
            Some("{\"intent\": \"search\", \"reasoning\": \"uses {braces} and \\\"quotes\\\"\"}")
        );
        assert_eq!(extract_json_object("no json here"), None);
        assert_eq!(extract_json_object("{\"unterminated\": true"), None);
    }

    #[test]
    fn parses_complete_decision() {
        let decision = parse_intent_reply(
            "```json\n{\"intent\":\"mixed\",\"subtype\":\"datetime\",\"datetime_needed\":true,\
             \"search_needed\":true,\"relative_importance\":\"both\",\"reasoning\":\"release age\"}\n```",
        );

        assert_eq!(decision.category, IntentCategory::Mixed);
        assert_eq!(decision.subtype, IntentSubtype::Datetime);
        assert!(decision.datetime_needed);
        assert!(decision.search_needed);
        assert_eq!(decision.relative_importance, RelativeImportance::Both);
        assert_eq!(decision.reasoning, "release age");
    }

    #[test]
    fn missing_keys_fall_back_to_defaults() {
        let decision = parse_intent_reply("{\"datetime_needed\": \"yes\"}");

        assert_eq!(decision.category, IntentCategory::General);
        assert!(decision.datetime_needed);
        assert!(decision.search_needed);
        assert_eq!(decision.relative_importance, RelativeImportance::Search);
    }

    #[test]
    fn unparseable_reply_uses_model_fallback() {
        let decision = parse_intent_reply("I think you need a search.");

        assert_eq!(decision.category, IntentCategory::General);
        assert!(!decision.datetime_needed);
        assert!(decision.search_needed);
    }

    #[test]
    fn prompt_includes_at_most_four_prior_turns() {
        let history = (0..6)
            .flat_map(|turn| {
                [
                    ChatMessage::user(format!("question {turn}")),
                    ChatMessage::assistant(format!("answer {turn}")),
                ]
            })
            .collect::<Vec<_>>();

        let prompt = classification_prompt("지금 몇 시야?", &history);
        assert!(!prompt.contains("question 1"));
        assert!(prompt.contains("user: question 2"));
        assert!(prompt.contains("assistant: answer 5"));
        assert!(prompt.ends_with("Question to classify:\n지금 몇 시야?"));
    }
}
