use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use serde::Serialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::AssistantConfig;
use crate::datetime::{TimeSource, format_date, format_datetime_info, format_time};
use crate::document::system_prompt_with_document;
use crate::intent::{
    IntentClassifier, IntentDecision, IntentStrategy, IntentSubtype, ModelIntentClassifier,
    PatternIntentClassifier,
};
use crate::keywords::extract_keywords;
use crate::llm::{InferenceParams, ModelDelta, ModelError, ModelGateway, ModelRequest, ModelStream};
use crate::models::ChatMessage;
use crate::prompt::{ContextBlocks, assemble_prompt};
use crate::recover::{CallError, guarded_call};
use crate::registry::ServiceRegistry;
use crate::search::{SearchResult, format_results};
use crate::session::{SessionContext, SessionError, SessionStatus, TurnGuard};

const DEFAULT_MODEL_OPEN_TIMEOUT: Duration = Duration::from_secs(300);

#[derive(Debug, Clone, PartialEq)]
pub struct TurnSettings {
    pub system_prompt: String,
    pub model_id: String,
    pub params: InferenceParams,
    pub memory_window_turns: usize,
    pub search_timeout: Duration,
    /// Bound on opening the stream. Deltas themselves are not timed.
    pub model_open_timeout: Duration,
}

impl TurnSettings {
    pub fn from_config(config: &AssistantConfig) -> Self {
        Self {
            system_prompt: config.system_prompt.clone(),
            model_id: config.profile.model_id.to_string(),
            params: InferenceParams::for_profile(&config.profile, config.sampling),
            memory_window_turns: config.memory_window_turns,
            search_timeout: config.search_timeout,
            model_open_timeout: DEFAULT_MODEL_OPEN_TIMEOUT,
        }
    }
}

/// Side information and the outbound request for one query.
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedTurn {
    pub decision: IntentDecision,
    pub datetime_block: Option<String>,
    pub search_query: Option<String>,
    pub search_results: Vec<SearchResult>,
    pub augmented_prompt: String,
    pub request: ModelRequest,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TurnReply {
    pub text: String,
    pub decision: IntentDecision,
    #[serde(skip)]
    pub error: Option<ModelError>,
}

impl TurnReply {
    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

/// An in-flight model response. The caller drains it with [`next_delta`]
/// and hands it back to [`ConversationOrchestrator::complete_turn`].
/// Dropping it without completing returns its session to the state it had
/// before the turn, with nothing recorded.
///
/// [`next_delta`]: PendingTurn::next_delta
pub struct PendingTurn {
    session_id: Uuid,
    guard: TurnGuard,
    query: String,
    decision: IntentDecision,
    stream: Option<ModelStream>,
    open_error: Option<ModelError>,
    text: String,
    failure: Option<ModelError>,
}

impl PendingTurn {
    /// The next increment, or `None` once the stream is finished. An error
    /// ends the stream.
    pub async fn next_delta(&mut self) -> Option<Result<ModelDelta, ModelError>> {
        if let Some(err) = self.open_error.take() {
            self.failure = Some(err.clone());
            return Some(Err(err));
        }

        let stream = self.stream.as_mut()?;
        match stream.next().await {
            Some(Ok(delta)) => {
                if let ModelDelta::Text(chunk) = &delta {
                    self.text.push_str(chunk);
                }
                Some(Ok(delta))
            }
            Some(Err(err)) => {
                self.stream = None;
                self.failure = Some(err.clone());
                Some(Err(err))
            }
            None => {
                self.stream = None;
                None
            }
        }
    }

    async fn drain(&mut self) {
        while self.next_delta().await.is_some() {}
    }
}

/// Runs one query through classification, side-information fetches, prompt
/// assembly and the model call. Side information is always fetched before
/// the model call, one step at a time.
pub struct ConversationOrchestrator {
    gateway: Arc<dyn ModelGateway>,
    classifier: Option<Arc<dyn IntentClassifier>>,
    registry: ServiceRegistry,
    settings: TurnSettings,
}

impl ConversationOrchestrator {
    pub fn new(
        gateway: Arc<dyn ModelGateway>,
        classifier: Option<Arc<dyn IntentClassifier>>,
        registry: ServiceRegistry,
        settings: TurnSettings,
    ) -> Self {
        Self {
            gateway,
            classifier,
            registry,
            settings,
        }
    }

    pub fn from_config(
        config: &AssistantConfig,
        gateway: Arc<dyn ModelGateway>,
        registry: ServiceRegistry,
    ) -> Self {
        let classifier: Option<Arc<dyn IntentClassifier>> = match config.intent_strategy {
            IntentStrategy::Pattern => Some(Arc::new(PatternIntentClassifier)),
            IntentStrategy::Model => Some(Arc::new(ModelIntentClassifier::new(
                gateway.clone(),
                config.profile.model_id,
                config.classifier_timeout,
            ))),
            IntentStrategy::Off => None,
        };
        Self::new(gateway, classifier, registry, TurnSettings::from_config(config))
    }

    pub fn settings(&self) -> &TurnSettings {
        &self.settings
    }

    pub fn registry(&self) -> &ServiceRegistry {
        &self.registry
    }

    pub fn intent_strategy(&self) -> IntentStrategy {
        self.classifier
            .as_ref()
            .map_or(IntentStrategy::Off, |classifier| classifier.strategy())
    }

    /// Never touches the session history.
    pub async fn prepare_turn(&self, session: &SessionContext, query: &str) -> PreparedTurn {
        let decision = match &self.classifier {
            Some(classifier) => classifier.classify(query, session.history().messages()).await,
            None => IntentDecision::general("intent classification disabled"),
        };
        info!(
            session_id = %session.id(),
            intent = decision.category.as_str(),
            subtype = decision.subtype.as_str(),
            datetime_needed = decision.datetime_needed,
            search_needed = decision.search_needed,
            "classified query"
        );

        let datetime_block = if decision.datetime_needed {
            self.datetime_block(decision.subtype)
        } else {
            None
        };

        let (search_query, search_results) = if decision.search_needed {
            self.fetch_search(query).await
        } else {
            (None, Vec::new())
        };
        let search_block = (!search_results.is_empty()).then(|| format_results(&search_results));

        let augmented_prompt = assemble_prompt(
            query,
            ContextBlocks {
                datetime: datetime_block.as_deref(),
                search: search_block.as_deref(),
            },
            decision.relative_importance,
        );

        let mut messages = session
            .history()
            .window(self.settings.memory_window_turns)
            .to_vec();
        messages.push(ChatMessage::user(augmented_prompt.clone()));

        let request = ModelRequest {
            model_id: self.settings.model_id.clone(),
            system_prompt: system_prompt_with_document(
                &self.settings.system_prompt,
                session.document(),
            ),
            messages,
            params: self.settings.params.clone(),
        };

        PreparedTurn {
            decision,
            datetime_block,
            search_query,
            search_results,
            augmented_prompt,
            request,
        }
    }

    /// Prepares the turn and opens the model stream. A stream that fails to
    /// open is reported through the returned turn, not as an error here.
    pub async fn begin_turn(
        &self,
        session: &mut SessionContext,
        query: &str,
    ) -> Result<PendingTurn, SessionError> {
        let query = query.trim();
        if query.is_empty() {
            return Err(SessionError::EmptyQuery);
        }
        let guard = session.start_turn()?;

        let prepared = self.prepare_turn(session, query).await;
        debug!(
            session_id = %session.id(),
            messages = prepared.request.messages.len(),
            "opening model stream"
        );

        let (stream, open_error) = match guarded_call(
            "model_stream",
            self.settings.model_open_timeout,
            self.gateway.stream(prepared.request),
        )
        .await
        {
            Ok(stream) => (Some(stream), None),
            Err(CallError::TimedOut { .. }) => (None, Some(ModelError::Timeout)),
            Err(CallError::Failed { source, .. }) => (None, Some(source)),
        };

        Ok(PendingTurn {
            session_id: session.id(),
            guard,
            query: query.to_string(),
            decision: prepared.decision,
            stream,
            open_error,
            text: String::new(),
            failure: None,
        })
    }

    /// Drains whatever is left of the stream and records the finished turn.
    /// A failed model call is recorded with its friendly message as the
    /// assistant reply. A turn from another session is rejected and
    /// dropped, which releases the session it came from.
    pub async fn complete_turn(
        &self,
        session: &mut SessionContext,
        mut turn: PendingTurn,
    ) -> Result<TurnReply, SessionError> {
        if turn.session_id != session.id() {
            return Err(SessionError::ForeignTurn {
                session: session.id(),
                turn_session: turn.session_id,
            });
        }
        turn.drain().await;

        let text = match &turn.failure {
            Some(err) => {
                warn!(session_id = %session.id(), error = %err, "model turn failed");
                err.user_message()
            }
            None => turn.text,
        };
        session.finish_turn(turn.guard, turn.query, text.clone());
        info!(
            session_id = %session.id(),
            turns = session.history().turn_count(),
            "turn completed"
        );

        Ok(TurnReply {
            text,
            decision: turn.decision,
            error: turn.failure,
        })
    }

    /// One full round without incremental display.
    pub async fn respond(
        &self,
        session: &mut SessionContext,
        query: &str,
    ) -> Result<TurnReply, SessionError> {
        let turn = self.begin_turn(session, query).await?;
        self.complete_turn(session, turn).await
    }

    /// "New chat": drops history and document context together.
    pub fn new_chat(&self, session: &mut SessionContext) -> SessionStatus {
        session.reset();
        info!(session_id = %session.id(), "session reset");
        session.status()
    }

    fn datetime_block(&self, subtype: IntentSubtype) -> Option<String> {
        let Some(source) = self.registry.time_source() else {
            warn!("datetime requested but no time service is registered");
            return None;
        };
        Some(render_datetime(source, subtype))
    }

    async fn fetch_search(&self, query: &str) -> (Option<String>, Vec<SearchResult>) {
        let Some(service) = self.registry.search_service() else {
            warn!("search requested but no search service is registered");
            return (None, Vec::new());
        };

        let keywords = extract_keywords(query);
        if keywords.is_empty() {
            debug!("no searchable keywords in query");
            return (None, Vec::new());
        }
        let search_query = keywords.join(" ");

        let results = guarded_call(
            "search",
            self.settings.search_timeout,
            async { Ok::<_, Infallible>(service.search(&search_query).await) },
        )
        .await
        .unwrap_or_default();
        info!(
            backend = service.backend_name(),
            query = %search_query,
            results = results.len(),
            "search finished"
        );

        (Some(search_query), results)
    }
}

fn render_datetime(source: &dyn TimeSource, subtype: IntentSubtype) -> String {
    match subtype {
        IntentSubtype::Time => format_time(&source.current_time()),
        IntentSubtype::Date => format_date(&source.current_date()),
        IntentSubtype::Datetime | IntentSubtype::Search | IntentSubtype::General => {
            format_datetime_info(&source.datetime_info())
        }
    }
}
