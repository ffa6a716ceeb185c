use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::config_env::{
    optional_trimmed_env, parse_bool_env, parse_f32_env, parse_u32_env, parse_u64_env,
    parse_usize_env,
};
use crate::history::DEFAULT_MEMORY_WINDOW_TURNS;
use crate::intent::IntentStrategy;
use crate::llm::{DEFAULT_PROFILE_KEY, ModelProfile, SamplingSettings, profile_for_key};
use crate::registry::DEFAULT_SERVICES_CONFIG_PATH;
use crate::search::DEFAULT_SEARCH_TIMEOUT_MS;

pub const DEFAULT_SYSTEM_PROMPT: &str = "You're a helpful assistant who loves to respond in Korean. \
You'll answer questions based on the uploaded documents, when a document exists. \
When you're not certain about something, don't guess or make up information. \
Instead, honestly admit that you don't know.";

const DEFAULT_TEMPERATURE: f32 = 0.0;
const DEFAULT_TOP_P: f32 = 1.0;
const DEFAULT_TOP_K: u32 = 500;
const MAX_TOP_K: u32 = 500;
const MAX_MEMORY_WINDOW_TURNS: usize = 10;
const DEFAULT_CLASSIFIER_TIMEOUT_MS: u64 = 15_000;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required env var {0}")]
    MissingVar(String),
    #[error("invalid integer in env var {0}")]
    ParseInt(String),
    #[error("invalid number in env var {0}")]
    ParseFloat(String),
    #[error("invalid boolean in env var {0}")]
    ParseBool(String),
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),
    #[error("failed to load .env file: {0}")]
    Dotenv(String),
}

/// Loads `.env` from the working directory or its parents. A missing file
/// is not an error.
pub fn load_dotenv() -> Result<(), ConfigError> {
    match dotenvy::dotenv() {
        Ok(_) => Ok(()),
        Err(err) if err.not_found() => Ok(()),
        Err(err) => Err(ConfigError::Dotenv(err.to_string())),
    }
}

/// Per-process assistant settings read from the environment.
#[derive(Debug, Clone)]
pub struct AssistantConfig {
    pub system_prompt: String,
    pub profile: ModelProfile,
    pub sampling: SamplingSettings,
    pub memory_window_turns: usize,
    pub intent_strategy: IntentStrategy,
    pub search_timeout: Duration,
    pub classifier_timeout: Duration,
    pub services_config_path: PathBuf,
}

impl AssistantConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let config = Self::read_env()?;
        config.validate()?;
        Ok(config)
    }

    /// Parses the environment without range checks. Callers that layer
    /// overrides on top must call [`validate`](Self::validate) afterwards.
    pub fn read_env() -> Result<Self, ConfigError> {
        let profile_key = optional_trimmed_env("ASSISTANT_MODEL_PROFILE")
            .unwrap_or_else(|| DEFAULT_PROFILE_KEY.to_string());
        let profile = profile_for_key(&profile_key).ok_or_else(|| {
            ConfigError::InvalidConfiguration(format!(
                "ASSISTANT_MODEL_PROFILE '{profile_key}' is not a known model profile"
            ))
        })?;

        let intent_strategy = match optional_trimmed_env("ASSISTANT_INTENT_STRATEGY") {
            Some(raw) => IntentStrategy::parse(&raw).ok_or_else(|| {
                ConfigError::InvalidConfiguration(format!(
                    "ASSISTANT_INTENT_STRATEGY must be pattern, model, or off (got '{raw}')"
                ))
            })?,
            None => IntentStrategy::Pattern,
        };

        let max_tokens = match optional_trimmed_env("ASSISTANT_MAX_TOKENS") {
            Some(_) => Some(parse_u32_env("ASSISTANT_MAX_TOKENS", profile.max_tokens)?),
            None => None,
        };

        Ok(Self {
            system_prompt: optional_trimmed_env("ASSISTANT_SYSTEM_PROMPT")
                .unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.to_string()),
            profile,
            sampling: SamplingSettings {
                temperature: parse_f32_env("ASSISTANT_TEMPERATURE", DEFAULT_TEMPERATURE)?,
                top_p: parse_f32_env("ASSISTANT_TOP_P", DEFAULT_TOP_P)?,
                top_k: parse_u32_env("ASSISTANT_TOP_K", DEFAULT_TOP_K)?,
                max_tokens,
                reasoning: parse_bool_env("ASSISTANT_REASONING", false)?,
            },
            memory_window_turns: parse_usize_env(
                "ASSISTANT_MEMORY_WINDOW",
                DEFAULT_MEMORY_WINDOW_TURNS,
            )?,
            intent_strategy,
            search_timeout: Duration::from_millis(parse_u64_env(
                "ASSISTANT_SEARCH_TIMEOUT_MS",
                DEFAULT_SEARCH_TIMEOUT_MS,
            )?),
            classifier_timeout: Duration::from_millis(parse_u64_env(
                "ASSISTANT_CLASSIFIER_TIMEOUT_MS",
                DEFAULT_CLASSIFIER_TIMEOUT_MS,
            )?),
            services_config_path: PathBuf::from(
                optional_trimmed_env("MCP_CONFIG")
                    .unwrap_or_else(|| DEFAULT_SERVICES_CONFIG_PATH.to_string()),
            ),
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let sampling = &self.sampling;
        if !(0.0..=1.0).contains(&sampling.temperature) {
            return Err(ConfigError::InvalidConfiguration(
                "ASSISTANT_TEMPERATURE must be between 0.0 and 1.0".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&sampling.top_p) {
            return Err(ConfigError::InvalidConfiguration(
                "ASSISTANT_TOP_P must be between 0.0 and 1.0".to_string(),
            ));
        }
        if sampling.top_k > MAX_TOP_K {
            return Err(ConfigError::InvalidConfiguration(format!(
                "ASSISTANT_TOP_K must be at most {MAX_TOP_K}"
            )));
        }
        if let Some(max_tokens) = sampling.max_tokens
            && (max_tokens == 0 || max_tokens > self.profile.max_tokens)
        {
            return Err(ConfigError::InvalidConfiguration(format!(
                "ASSISTANT_MAX_TOKENS must be between 1 and {} for {}",
                self.profile.max_tokens, self.profile.key
            )));
        }
        if !(1..=MAX_MEMORY_WINDOW_TURNS).contains(&self.memory_window_turns) {
            return Err(ConfigError::InvalidConfiguration(format!(
                "ASSISTANT_MEMORY_WINDOW must be between 1 and {MAX_MEMORY_WINDOW_TURNS}"
            )));
        }
        if self.search_timeout.is_zero() || self.classifier_timeout.is_zero() {
            return Err(ConfigError::InvalidConfiguration(
                "timeouts must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;
    use std::time::Duration;

    use super::{AssistantConfig, ConfigError, DEFAULT_SYSTEM_PROMPT};
    use crate::intent::IntentStrategy;
    use crate::llm::{SamplingSettings, profile_for_key};

    fn config() -> AssistantConfig {
        AssistantConfig {
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            profile: profile_for_key("claude-3-5-haiku").expect("haiku profile should exist"),
            sampling: SamplingSettings {
                temperature: 0.0,
                top_p: 1.0,
                top_k: 500,
                max_tokens: None,
                reasoning: false,
            },
            memory_window_turns: 10,
            intent_strategy: IntentStrategy::Pattern,
            search_timeout: Duration::from_secs(10),
            classifier_timeout: Duration::from_secs(15),
            services_config_path: PathBuf::from("mcp_config.json"),
        }
    }

    #[test]
    fn defaults_validate() {
        config().validate().expect("default settings should be valid");
    }

    #[test]
    fn rejects_out_of_range_sampling() {
        let mut hot = config();
        hot.sampling.temperature = 1.5;
        assert!(matches!(
            hot.validate(),
            Err(ConfigError::InvalidConfiguration(_))
        ));

        let mut wide = config();
        wide.sampling.top_k = 501;
        assert!(wide.validate().is_err());
    }

    #[test]
    fn max_tokens_is_bounded_by_profile() {
        let mut long = config();
        long.sampling.max_tokens = Some(8192);
        assert!(long.validate().is_err());

        long.sampling.max_tokens = Some(4096);
        long.validate().expect("profile maximum should be accepted");
    }

    #[test]
    fn memory_window_must_be_between_one_and_ten() {
        let mut none = config();
        none.memory_window_turns = 0;
        assert!(none.validate().is_err());

        let mut many = config();
        many.memory_window_turns = 11;
        assert!(many.validate().is_err());
    }
}
