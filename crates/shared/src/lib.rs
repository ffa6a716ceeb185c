pub mod config;
mod config_env;
pub mod datetime;
pub mod document;
pub mod history;
pub mod intent;
pub mod keywords;
pub mod llm;
pub mod models;
pub mod orchestrator;
pub mod prompt;
pub mod recover;
pub mod registry;
pub mod search;
pub mod session;
pub mod timezone;
