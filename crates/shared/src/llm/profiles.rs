use super::gateway::InferenceParams;

const REASONING_TEMPERATURE: f32 = 1.0;
const MAX_REASONING_BUDGET_TOKENS: u32 = 4_096;
const REASONING_OUTPUT_RESERVE_TOKENS: u32 = 1_000;

pub const DEFAULT_PROFILE_KEY: &str = "claude-3-7-sonnet";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModelProfile {
    pub key: &'static str,
    pub display_name: &'static str,
    pub model_id: &'static str,
    pub max_tokens: u32,
    pub supports_reasoning: bool,
}

pub const MODEL_PROFILES: [ModelProfile; 2] = [
    ModelProfile {
        key: "claude-3-7-sonnet",
        display_name: "Claude 3.7 Sonnet",
        model_id: "claude-3-7-sonnet-20250219",
        max_tokens: 8_192,
        supports_reasoning: true,
    },
    ModelProfile {
        key: "claude-3-5-haiku",
        display_name: "Claude 3.5 Haiku",
        model_id: "claude-3-5-haiku-20241022",
        max_tokens: 4_096,
        supports_reasoning: false,
    },
];

pub fn profile_for_key(key: &str) -> Option<ModelProfile> {
    let normalized = key.trim().to_ascii_lowercase();
    MODEL_PROFILES
        .iter()
        .copied()
        .find(|profile| profile.key == normalized)
}

/// User-facing sampling choices before profile rules are applied.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SamplingSettings {
    pub temperature: f32,
    pub top_p: f32,
    pub top_k: u32,
    /// Clamped to the profile maximum; `None` means the maximum.
    pub max_tokens: Option<u32>,
    pub reasoning: bool,
}

impl InferenceParams {
    /// Extended thinking forces temperature 1.0, drops top_p/top_k and
    /// reserves part of the output budget for the visible answer.
    pub fn for_profile(profile: &ModelProfile, sampling: SamplingSettings) -> Self {
        let max_tokens = sampling
            .max_tokens
            .unwrap_or(profile.max_tokens)
            .clamp(1, profile.max_tokens);

        let reasoning_budget = (sampling.reasoning && profile.supports_reasoning)
            .then(|| {
                MAX_REASONING_BUDGET_TOKENS
                    .min(max_tokens.saturating_sub(REASONING_OUTPUT_RESERVE_TOKENS))
            })
            .filter(|budget| *budget > 0);

        match reasoning_budget {
            Some(budget) => Self {
                temperature: REASONING_TEMPERATURE,
                top_p: None,
                top_k: None,
                max_tokens,
                reasoning_budget_tokens: Some(budget),
            },
            None => Self {
                temperature: sampling.temperature.clamp(0.0, 1.0),
                top_p: Some(sampling.top_p.clamp(0.0, 1.0)),
                top_k: Some(sampling.top_k),
                max_tokens,
                reasoning_budget_tokens: None,
            },
        }
    }
}
