use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use shared::config::{AssistantConfig, ConfigError};
use shared::intent::{
    IntentClassifier, IntentDecision, ModelIntentClassifier, PatternIntentClassifier,
};
use shared::llm::{MessagesGateway, MessagesGatewayConfig, ModelGatewayConfigError};
use thiserror::Error;

use crate::case::IntentEvalCaseFixture;
use crate::cli::{CliOptions, EvalMode};
use crate::fixture_io::{FixtureIoError, load_cases};

#[derive(Debug)]
pub struct EvalSummary {
    mode: EvalMode,
    results: Vec<CaseResult>,
}

impl EvalSummary {
    pub fn has_failures(&self) -> bool {
        self.results
            .iter()
            .any(|result| !result.failures.is_empty())
    }

    pub fn print(&self) {
        println!("Intent Eval Harness ({})", self.mode.as_str());

        let mut passed = 0usize;
        for result in &self.results {
            if result.failures.is_empty() {
                passed += 1;
                println!("[PASS] {}: {}", result.case_id, result.description);
            } else {
                println!("[FAIL] {}: {}", result.case_id, result.description);
                for failure in &result.failures {
                    println!("  - {failure}");
                }
            }

            for note in &result.notes {
                println!("  * {note}");
            }
        }

        let total = self.results.len();
        let failed = total.saturating_sub(passed);
        println!(
            "Summary: {} total, {} passed, {} failed",
            total, passed, failed
        );
    }
}

#[derive(Debug)]
struct CaseResult {
    case_id: String,
    description: String,
    failures: Vec<String>,
    notes: Vec<String>,
}

#[derive(Debug, Error)]
pub enum EvalError {
    #[error(transparent)]
    Fixtures(#[from] FixtureIoError),
    #[error("failed to load assistant config in model mode: {0}")]
    AssistantConfig(#[from] ConfigError),
    #[error("failed to initialize the model gateway in model mode: {0}")]
    GatewayConfig(#[from] ModelGatewayConfigError),
    #[error("no fixture matched the selected mode and case filter")]
    NoCases,
}

pub async fn run_eval(options: &CliOptions) -> Result<EvalSummary, EvalError> {
    let mut cases = load_cases()?;
    cases.sort_by(|left, right| left.case_id.cmp(&right.case_id));

    if options.mode == EvalMode::Model {
        cases.retain(|case| case.include_in_model_mode);
    }
    if let Some(filter) = options.case_filter.as_deref() {
        cases.retain(|case| case.case_id.contains(filter));
    }
    if cases.is_empty() {
        return Err(EvalError::NoCases);
    }

    let classifier = build_classifier(options.mode)?;

    let mut results = Vec::with_capacity(cases.len());
    for case in &cases {
        let decision = classifier.classify(&case.query, &case.history).await;
        results.push(evaluate_case(case, &decision));
    }

    Ok(EvalSummary {
        mode: options.mode,
        results,
    })
}

fn build_classifier(mode: EvalMode) -> Result<Arc<dyn IntentClassifier>, EvalError> {
    match mode {
        EvalMode::Pattern => Ok(Arc::new(PatternIntentClassifier)),
        EvalMode::Model => {
            let config = AssistantConfig::from_env()?;
            let gateway = MessagesGateway::new(MessagesGatewayConfig::from_env()?)?;
            Ok(Arc::new(ModelIntentClassifier::new(
                Arc::new(gateway),
                config.profile.model_id,
                config.classifier_timeout,
            )))
        }
    }
}

fn evaluate_case(case: &IntentEvalCaseFixture, decision: &IntentDecision) -> CaseResult {
    let mut failures = Vec::new();
    let expected = &case.expectations;

    compare_field("category", expected.category, decision.category, &mut failures);
    compare_field("subtype", expected.subtype, decision.subtype, &mut failures);
    compare_field(
        "datetime_needed",
        expected.datetime_needed,
        decision.datetime_needed,
        &mut failures,
    );
    compare_field(
        "search_needed",
        expected.search_needed,
        decision.search_needed,
        &mut failures,
    );
    compare_field(
        "relative_importance",
        expected.relative_importance,
        decision.relative_importance,
        &mut failures,
    );

    let mut notes = Vec::new();
    if !decision.reasoning.is_empty() {
        notes.push(format!("reasoning: {}", decision.reasoning));
    }

    CaseResult {
        case_id: case.case_id.clone(),
        description: case.description.clone(),
        failures,
        notes,
    }
}

fn compare_field<T>(name: &str, expected: Option<T>, actual: T, failures: &mut Vec<String>)
where
    T: PartialEq + Serialize,
{
    if let Some(expected) = expected
        && expected != actual
    {
        failures.push(format!(
            "{name}: expected={}, actual={}",
            label(&expected),
            label(&actual)
        ));
    }
}

fn label<T: Serialize>(value: &T) -> String {
    match serde_json::to_value(value) {
        Ok(Value::String(text)) => text,
        Ok(other) => other.to_string(),
        Err(_) => "unknown".to_string(),
    }
}
