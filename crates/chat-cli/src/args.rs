use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use shared::config::AssistantConfig;
use shared::intent::IntentStrategy;
use shared::llm::profile_for_key;

use crate::ChatError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum IntentArg {
    Pattern,
    Model,
    Off,
}

impl From<IntentArg> for IntentStrategy {
    fn from(value: IntentArg) -> Self {
        match value {
            IntentArg::Pattern => Self::Pattern,
            IntentArg::Model => Self::Model,
            IntentArg::Off => Self::Off,
        }
    }
}

/// Flags override the matching `ASSISTANT_*` environment settings.
#[derive(Debug, Clone, Default, Parser)]
#[command(
    name = "assistant-chat",
    about = "Terminal chat with date/time and web search context"
)]
pub struct Args {
    /// Model profile key, e.g. claude-3-7-sonnet or claude-3-5-haiku.
    #[arg(long)]
    pub profile: Option<String>,

    #[arg(long)]
    pub temperature: Option<f32>,

    #[arg(long)]
    pub top_p: Option<f32>,

    #[arg(long)]
    pub top_k: Option<u32>,

    #[arg(long)]
    pub max_tokens: Option<u32>,

    /// Number of past turns sent with each request.
    #[arg(long)]
    pub memory_window: Option<usize>,

    #[arg(long)]
    pub system_prompt: Option<String>,

    #[arg(long, value_enum)]
    pub intent: Option<IntentArg>,

    /// Enable extended thinking on profiles that support it.
    #[arg(long)]
    pub reasoning: bool,

    /// Print reasoning deltas to stderr while streaming.
    #[arg(long)]
    pub show_reasoning: bool,

    /// Document whose text is added to the system prompt.
    #[arg(long)]
    pub document: Option<PathBuf>,
}

impl Args {
    /// Layers the flags over `config` and validates the result.
    pub fn apply(&self, config: &mut AssistantConfig) -> Result<(), ChatError> {
        if let Some(key) = self.profile.as_deref() {
            config.profile =
                profile_for_key(key).ok_or_else(|| ChatError::UnknownProfile(key.to_string()))?;
        }
        if let Some(temperature) = self.temperature {
            config.sampling.temperature = temperature;
        }
        if let Some(top_p) = self.top_p {
            config.sampling.top_p = top_p;
        }
        if let Some(top_k) = self.top_k {
            config.sampling.top_k = top_k;
        }
        if self.max_tokens.is_some() {
            config.sampling.max_tokens = self.max_tokens;
        }
        if let Some(memory_window) = self.memory_window {
            config.memory_window_turns = memory_window;
        }
        if let Some(system_prompt) = self.system_prompt.as_deref() {
            config.system_prompt = system_prompt.to_string();
        }
        if let Some(intent) = self.intent {
            config.intent_strategy = intent.into();
        }
        if self.reasoning {
            config.sampling.reasoning = true;
        }

        config.validate()?;
        Ok(())
    }
}
