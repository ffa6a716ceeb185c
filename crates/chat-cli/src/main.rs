mod args;
mod command;

use std::io::IsTerminal;
use std::sync::Arc;

use clap::Parser;
use serde_json::{Map, Value};
use shared::config::{AssistantConfig, ConfigError, load_dotenv};
use shared::document::{DocumentError, load_document};
use shared::llm::{MessagesGateway, MessagesGatewayConfig, ModelDelta, ModelGatewayConfigError};
use shared::orchestrator::ConversationOrchestrator;
use shared::registry::{ServiceRegistry, ServicesConfig, ServicesConfigError};
use shared::search::SearchSettings;
use shared::session::{SessionContext, SessionStatus};
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Stdout};
use tracing::{info, warn};

use crate::args::Args;
use crate::command::{Command, HELP_TEXT};

const PROMPT: &str = "> ";
const DIM: &str = "\x1b[2m";
const RESET: &str = "\x1b[0m";

#[derive(Debug, Error)]
pub enum ChatError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("unknown model profile '{0}'")]
    UnknownProfile(String),
    #[error(transparent)]
    Gateway(#[from] ModelGatewayConfigError),
    #[error(transparent)]
    Services(#[from] ServicesConfigError),
    #[error(transparent)]
    Document(#[from] DocumentError),
    #[error("terminal i/o failed: {0}")]
    Io(#[from] std::io::Error),
}

#[tokio::main]
async fn main() {
    if let Err(err) = load_dotenv() {
        eprintln!("{err}");
        std::process::exit(1);
    }
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("RUST_LOG")
                .unwrap_or_else(|_| "assistant_chat=info,shared=warn".to_string()),
        )
        .with_writer(std::io::stderr)
        .json()
        .flatten_event(true)
        .with_current_span(true)
        .init();

    if let Err(err) = run(args).await {
        eprintln!("assistant-chat: {err}");
        std::process::exit(1);
    }
}

async fn run(args: Args) -> Result<(), ChatError> {
    let mut config = AssistantConfig::read_env()?;
    args.apply(&mut config)?;

    let gateway = Arc::new(MessagesGateway::new(MessagesGatewayConfig::from_env()?)?);
    let services = ServicesConfig::load(&config.services_config_path)?;
    let search_settings = SearchSettings::from_env()?;
    let registry = ServiceRegistry::from_config(&services, &search_settings)?;
    let orchestrator = ConversationOrchestrator::from_config(&config, gateway, registry);

    let mut session = SessionContext::new();
    if let Some(path) = args.document.as_deref() {
        session.attach_document(load_document(path)?);
    }

    let service_names = orchestrator.registry().service_names().collect::<Vec<_>>();
    info!(
        session_id = %session.id(),
        profile = config.profile.key,
        intent_strategy = ?orchestrator.intent_strategy(),
        services = ?service_names,
        "chat session started"
    );

    let mut stdout = tokio::io::stdout();
    let dim_reasoning = std::io::stderr().is_terminal();
    write_line(
        &mut stdout,
        &format!(
            "{} 와 대화를 시작합니다. /help 로 명령어를 확인하세요.",
            config.profile.display_name
        ),
    )
    .await?;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        stdout.write_all(PROMPT.as_bytes()).await?;
        stdout.flush().await?;

        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = tokio::signal::ctrl_c() => None,
        };
        let Some(line) = line else {
            write_line(&mut stdout, "").await?;
            break;
        };

        match Command::parse(&line) {
            Command::Empty => {}
            Command::Quit => break,
            Command::Help => write_line(&mut stdout, HELP_TEXT).await?,
            Command::Status => {
                let status = render_status(&session.status(), &orchestrator);
                write_line(&mut stdout, &status).await?;
            }
            Command::ListTools => {
                let tools = orchestrator
                    .registry()
                    .tools()
                    .into_iter()
                    .map(|tool| format!("- {}: {}", tool.name, tool.description))
                    .collect::<Vec<_>>()
                    .join("\n");
                write_line(&mut stdout, &tools).await?;
            }
            Command::CallTool { name, arguments } => {
                let output = call_tool(&orchestrator, &name, &arguments).await;
                write_line(&mut stdout, &output).await?;
            }
            Command::NewChat => {
                let status = orchestrator.new_chat(&mut session);
                info!(session_id = %status.session_id, "chat reset");
                write_line(&mut stdout, "새 대화를 시작합니다.").await?;
            }
            Command::Document(path) => match load_document(&path) {
                Ok(document) => {
                    let message = format!(
                        "문서를 첨부했습니다: {} ({}자)",
                        document.name,
                        document.char_count()
                    );
                    session.attach_document(document);
                    write_line(&mut stdout, &message).await?;
                }
                Err(err) => {
                    warn!(path = %path.display(), error = %err, "document attach failed");
                    write_line(&mut stdout, &err.to_string()).await?;
                }
            },
            Command::DetachDocument => {
                let message = match session.detach_document() {
                    Some(document) => format!("문서 첨부를 해제했습니다: {}", document.name),
                    None => "첨부된 문서가 없습니다.".to_string(),
                };
                write_line(&mut stdout, &message).await?;
            }
            Command::Unknown(raw) => {
                write_line(
                    &mut stdout,
                    &format!("알 수 없는 명령어입니다: {raw} (/help 참고)"),
                )
                .await?;
            }
            Command::Ask(query) => {
                ask(
                    &orchestrator,
                    &mut session,
                    &query,
                    &mut stdout,
                    args.show_reasoning,
                    dim_reasoning,
                )
                .await?;
            }
        }
    }

    info!(session_id = %session.id(), turns = session.history().turn_count(), "chat session ended");
    Ok(())
}

async fn ask(
    orchestrator: &ConversationOrchestrator,
    session: &mut SessionContext,
    query: &str,
    stdout: &mut Stdout,
    show_reasoning: bool,
    dim_reasoning: bool,
) -> Result<(), ChatError> {
    let mut turn = match orchestrator.begin_turn(session, query).await {
        Ok(turn) => turn,
        Err(err) => {
            warn!(error = %err, "turn rejected");
            return write_line(stdout, &err.to_string()).await;
        }
    };

    let mut stderr = tokio::io::stderr();
    let mut streamed_text = false;
    while let Some(delta) = turn.next_delta().await {
        match delta {
            Ok(ModelDelta::Text(chunk)) => {
                streamed_text = true;
                stdout.write_all(chunk.as_bytes()).await?;
                stdout.flush().await?;
            }
            Ok(ModelDelta::Reasoning(chunk)) if show_reasoning => {
                let rendered = if dim_reasoning {
                    format!("{DIM}{chunk}{RESET}")
                } else {
                    chunk
                };
                stderr.write_all(rendered.as_bytes()).await?;
                stderr.flush().await?;
            }
            Ok(ModelDelta::Reasoning(_)) => {}
            Err(_) => break,
        }
    }

    let reply = match orchestrator.complete_turn(session, turn).await {
        Ok(reply) => reply,
        Err(err) => return write_line(stdout, &err.to_string()).await,
    };
    if reply.is_error() {
        if streamed_text {
            write_line(stdout, "").await?;
        }
        write_line(stdout, &reply.text).await
    } else {
        write_line(stdout, "").await
    }
}

async fn call_tool(orchestrator: &ConversationOrchestrator, name: &str, arguments: &str) -> String {
    let arguments = if arguments.is_empty() {
        Value::Object(Map::new())
    } else {
        match serde_json::from_str::<Value>(arguments) {
            Ok(value) => value,
            Err(err) => return format!("도구 인자는 JSON 객체여야 합니다: {err}"),
        }
    };

    match orchestrator.registry().call_tool(name, &arguments).await {
        Ok(output) => output,
        Err(err) => {
            warn!(tool = name, error = %err, "tool call failed");
            err.to_string()
        }
    }
}

fn render_status(status: &SessionStatus, orchestrator: &ConversationOrchestrator) -> String {
    let settings = orchestrator.settings();
    let document = status.document_name.as_deref().unwrap_or("없음");
    format!(
        "세션 {}\n상태: {:?}\n대화 수: {}\n첨부 문서: {document}\n모델: {} (기억 {}턴, 의도 분류 {})",
        status.session_id,
        status.state,
        status.turns,
        settings.model_id,
        settings.memory_window_turns,
        orchestrator.intent_strategy().as_str()
    )
}

async fn write_line(stdout: &mut Stdout, text: &str) -> Result<(), ChatError> {
    stdout.write_all(text.as_bytes()).await?;
    stdout.write_all(b"\n").await?;
    stdout.flush().await?;
    Ok(())
}
