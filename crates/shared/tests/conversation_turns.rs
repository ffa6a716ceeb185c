use std::sync::Arc;
use std::time::Duration;

use chrono::{TimeZone, Utc};
use futures::stream;
use shared::datetime::{Clock, DatetimeProvider};
use shared::document::DocumentContext;
use shared::intent::{IntentStrategy, PatternIntentClassifier};
use shared::llm::{
    InferenceParams, ModelDelta, ModelError, ModelGateway, ModelRequest, ModelStreamFuture,
};
use shared::models::{ChatMessage, Role};
use shared::orchestrator::{ConversationOrchestrator, TurnSettings};
use shared::registry::{Capability, SearchService, ServiceRegistry};
use shared::search::{SearchFuture, SearchResult, Searchable};
use shared::session::{SessionContext, SessionError, SessionState};
use tokio::sync::Mutex;

enum FakeReply {
    Chunks(Vec<&'static str>),
    OpenFailure(ModelError),
    StreamFailure(&'static str, ModelError),
    NeverOpens,
}

struct FakeGateway {
    replies: Mutex<Vec<FakeReply>>,
    requests: Mutex<Vec<ModelRequest>>,
}

impl FakeGateway {
    fn with_replies(replies: Vec<FakeReply>) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.into_iter().rev().collect()),
            requests: Mutex::new(Vec::new()),
        })
    }
}

impl ModelGateway for FakeGateway {
    fn stream<'a>(&'a self, request: ModelRequest) -> ModelStreamFuture<'a> {
        Box::pin(async move {
            self.requests.lock().await.push(request);
            let reply = self
                .replies
                .lock()
                .await
                .pop()
                .unwrap_or(FakeReply::Chunks(vec!["default reply"]));

            match reply {
                FakeReply::Chunks(chunks) => {
                    let deltas = chunks
                        .into_iter()
                        .map(|chunk| Ok(ModelDelta::Text(chunk.to_string())))
                        .collect::<Vec<_>>();
                    Ok(Box::pin(stream::iter(deltas)) as shared::llm::ModelStream)
                }
                FakeReply::OpenFailure(err) => Err(err),
                FakeReply::StreamFailure(chunk, err) => {
                    let items = vec![Ok(ModelDelta::Text(chunk.to_string())), Err(err)];
                    Ok(Box::pin(stream::iter(items)) as shared::llm::ModelStream)
                }
                FakeReply::NeverOpens => std::future::pending().await,
            }
        })
    }
}

struct FakeSearch {
    queries: Mutex<Vec<String>>,
    delay: Option<Duration>,
}

impl Searchable for FakeSearch {
    fn backend_name(&self) -> &'static str {
        "fake"
    }

    fn search<'a>(&'a self, query: &'a str, max_results: usize) -> SearchFuture<'a> {
        Box::pin(async move {
            self.queries.lock().await.push(query.to_string());
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            vec![SearchResult {
                title: "아이폰 15 발표".to_string(),
                content: "2023년 9월 12일 공개되었습니다.".to_string(),
                url: "https://example.com/iphone15".to_string(),
            }]
            .into_iter()
            .take(max_results)
            .collect()
        })
    }
}

fn settings() -> TurnSettings {
    TurnSettings {
        system_prompt: "You're a helpful assistant.".to_string(),
        model_id: "test-model".to_string(),
        params: InferenceParams {
            temperature: 0.0,
            top_p: Some(1.0),
            top_k: Some(500),
            max_tokens: 1_024,
            reasoning_budget_tokens: None,
        },
        memory_window_turns: 2,
        search_timeout: Duration::from_secs(2),
        model_open_timeout: Duration::from_secs(2),
    }
}

fn orchestrator(gateway: Arc<FakeGateway>, search: Arc<FakeSearch>) -> ConversationOrchestrator {
    orchestrator_with(gateway, search, settings())
}

fn orchestrator_with(
    gateway: Arc<FakeGateway>,
    search: Arc<FakeSearch>,
    settings: TurnSettings,
) -> ConversationOrchestrator {
    let instant = Utc
        .with_ymd_and_hms(2024, 2, 29, 15, 0, 0)
        .single()
        .expect("valid utc datetime");
    let mut registry = ServiceRegistry::new();
    registry
        .register(
            "datetime",
            Capability::Time(Arc::new(DatetimeProvider::with_clock(
                "Asia/Seoul",
                Clock::Fixed(instant),
            ))),
        )
        .register("search", Capability::Search(SearchService::new(search, 5)));

    ConversationOrchestrator::new(
        gateway,
        Some(Arc::new(PatternIntentClassifier)),
        registry,
        settings,
    )
}

fn fake_search() -> Arc<FakeSearch> {
    Arc::new(FakeSearch {
        queries: Mutex::new(Vec::new()),
        delay: None,
    })
}

fn stalled_search() -> Arc<FakeSearch> {
    Arc::new(FakeSearch {
        queries: Mutex::new(Vec::new()),
        delay: Some(Duration::from_secs(30)),
    })
}

#[tokio::test]
async fn streamed_turn_is_recorded_after_completion() {
    let gateway = FakeGateway::with_replies(vec![FakeReply::Chunks(vec!["오늘은 ", "3월 1일입니다."])]);
    let orchestrator = orchestrator(gateway.clone(), fake_search());
    let mut session = SessionContext::new();

    let mut turn = orchestrator
        .begin_turn(&mut session, "오늘 며칠이야?")
        .await
        .expect("turn should begin");
    assert_eq!(session.state(), SessionState::AwaitingResponse);
    assert!(session.history().is_empty());

    let mut shown = String::new();
    while let Some(delta) = turn.next_delta().await {
        if let ModelDelta::Text(chunk) = delta.expect("delta should succeed") {
            shown.push_str(&chunk);
        }
    }
    assert!(session.history().is_empty());

    let reply = orchestrator
        .complete_turn(&mut session, turn)
        .await
        .expect("turn should complete");

    assert_eq!(shown, "오늘은 3월 1일입니다.");
    assert_eq!(reply.text, shown);
    assert!(!reply.is_error());
    assert_eq!(session.state(), SessionState::Idle);
    assert_eq!(
        session.history().messages(),
        &[
            ChatMessage::user("오늘 며칠이야?"),
            ChatMessage::assistant("오늘은 3월 1일입니다."),
        ]
    );

    let requests = gateway.requests.lock().await;
    let last = requests[0]
        .messages
        .last()
        .expect("request should carry the query");
    assert_eq!(last.role, Role::User);
    assert!(last.content.starts_with("오늘 며칠이야?"));
    assert!(last.content.contains("2024년 3월 1일 금요일"));
}

#[tokio::test]
async fn mixed_query_searches_with_keywords_and_orders_blocks() {
    let gateway = FakeGateway::with_replies(vec![FakeReply::Chunks(vec!["약 5개월 됐습니다 [1]."])]);
    let search = fake_search();
    let orchestrator = orchestrator(gateway.clone(), search.clone());
    let session = SessionContext::new();

    let prepared = orchestrator
        .prepare_turn(&session, "아이폰 15 출시된지 얼마나 됐어?")
        .await;

    assert!(prepared.decision.search_needed);
    assert!(prepared.decision.datetime_needed);
    let queries = search.queries.lock().await.clone();
    assert_eq!(queries.len(), 1);
    assert_eq!(prepared.search_query.as_deref(), Some(queries[0].as_str()));
    assert!(queries[0].contains("아이폰"));

    let prompt = &prepared.augmented_prompt;
    let datetime_at = prompt.find("2024년 3월 1일").expect("datetime block should be present");
    let search_at = prompt.find("아이폰 15 발표").expect("search block should be present");
    assert!(datetime_at < search_at);
    assert!(prompt.contains("출처: https://example.com/iphone15"));
}

#[tokio::test]
async fn general_query_is_sent_unchanged() {
    let gateway = FakeGateway::with_replies(Vec::new());
    let search = fake_search();
    let orchestrator = orchestrator(gateway, search.clone());
    let session = SessionContext::new();

    let prepared = orchestrator.prepare_turn(&session, "안녕, 반가워").await;

    assert_eq!(prepared.augmented_prompt, "안녕, 반가워");
    assert!(prepared.datetime_block.is_none());
    assert!(search.queries.lock().await.is_empty());
    assert_eq!(prepared.request.system_prompt, "You're a helpful assistant.");
}

#[tokio::test]
async fn history_window_and_document_shape_the_request() {
    let gateway = FakeGateway::with_replies(Vec::new());
    let orchestrator = orchestrator(gateway.clone(), fake_search());
    let mut session = SessionContext::new();
    session.attach_document(DocumentContext::from_text("notes.txt", "회의는 금요일입니다."));

    for question in ["첫 번째 질문", "두 번째 질문", "세 번째 질문"] {
        orchestrator
            .respond(&mut session, question)
            .await
            .expect("turn should complete");
    }

    let requests = gateway.requests.lock().await;
    let last = requests.last().expect("requests should be recorded");
    assert_eq!(last.messages.len(), 5);
    assert_eq!(last.messages[0], ChatMessage::user("첫 번째 질문"));
    assert_eq!(last.messages[4].content, "세 번째 질문");
    assert!(
        last.system_prompt
            .ends_with("\n\n참고할 문서 내용:\n\n회의는 금요일입니다.")
    );
}

#[tokio::test]
async fn upstream_failures_become_friendly_replies() {
    let gateway = FakeGateway::with_replies(vec![
        FakeReply::OpenFailure(ModelError::Throttled("status=429".to_string())),
        FakeReply::StreamFailure("부분 ", ModelError::Stream("connection reset".to_string())),
    ]);
    let orchestrator = orchestrator(gateway, fake_search());
    let mut session = SessionContext::new();

    let throttled = orchestrator
        .respond(&mut session, "안녕")
        .await
        .expect("failed turn should still complete");
    assert!(throttled.is_error());
    assert_eq!(
        throttled.text,
        "요청을 처리하지 못했습니다. 잠시 후 다시 말씀해 주세요. 🙏"
    );

    let interrupted = orchestrator
        .respond(&mut session, "다시 안녕")
        .await
        .expect("interrupted turn should still complete");
    assert_eq!(
        interrupted.error,
        Some(ModelError::Stream("connection reset".to_string()))
    );
    assert!(interrupted.text.starts_with("죄송합니다. 오류가 발생했습니다"));
    assert_eq!(session.history().turn_count(), 2);
    assert_eq!(session.state(), SessionState::Idle);
}

#[tokio::test]
async fn busy_session_rejects_a_second_turn() {
    let gateway = FakeGateway::with_replies(Vec::new());
    let orchestrator = orchestrator(gateway, fake_search());
    let mut session = SessionContext::new();
    let mut other = SessionContext::new();

    let pending = orchestrator
        .begin_turn(&mut session, "첫 질문")
        .await
        .expect("turn should begin");
    let second = orchestrator.begin_turn(&mut session, "두 번째 질문").await;
    assert!(matches!(second, Err(SessionError::Busy(id)) if id == session.id()));

    let foreign = orchestrator.complete_turn(&mut other, pending).await;
    assert!(matches!(foreign, Err(SessionError::ForeignTurn { .. })));
    assert!(other.history().is_empty());

    assert!(matches!(
        orchestrator.begin_turn(&mut other, "   ").await,
        Err(SessionError::EmptyQuery)
    ));
}

#[tokio::test]
async fn rejected_foreign_turn_releases_its_own_session() {
    let gateway = FakeGateway::with_replies(Vec::new());
    let orchestrator = orchestrator(gateway, fake_search());
    let mut session = SessionContext::new();
    let mut other = SessionContext::new();

    let pending = orchestrator
        .begin_turn(&mut session, "첫 질문")
        .await
        .expect("turn should begin");
    assert!(
        orchestrator
            .complete_turn(&mut other, pending)
            .await
            .is_err()
    );

    assert_eq!(session.state(), SessionState::Empty);
    assert!(session.history().is_empty());
    let reply = orchestrator
        .respond(&mut session, "다시 질문")
        .await
        .expect("session should accept the next turn");
    assert_eq!(reply.text, "default reply");
    assert_eq!(session.state(), SessionState::Idle);
}

#[tokio::test]
async fn dropped_turn_releases_the_session() {
    let gateway = FakeGateway::with_replies(Vec::new());
    let orchestrator = orchestrator(gateway, fake_search());
    let mut session = SessionContext::new();
    orchestrator
        .respond(&mut session, "안녕")
        .await
        .expect("turn should complete");

    let pending = orchestrator
        .begin_turn(&mut session, "중간에 그만둔 질문")
        .await
        .expect("turn should begin");
    assert_eq!(session.state(), SessionState::AwaitingResponse);
    drop(pending);

    assert_eq!(session.state(), SessionState::Idle);
    assert_eq!(session.history().turn_count(), 1);
    orchestrator
        .respond(&mut session, "다시 안녕")
        .await
        .expect("session should accept the next turn");
    assert_eq!(session.history().turn_count(), 2);
}

#[tokio::test]
async fn model_stream_that_never_opens_times_out() {
    let gateway = FakeGateway::with_replies(vec![FakeReply::NeverOpens]);
    let mut settings = settings();
    settings.model_open_timeout = Duration::from_millis(50);
    let orchestrator = orchestrator_with(gateway, fake_search(), settings);
    let mut session = SessionContext::new();

    let reply = orchestrator
        .respond(&mut session, "안녕")
        .await
        .expect("timed out turn should still complete");

    assert_eq!(reply.error, Some(ModelError::Timeout));
    assert_eq!(reply.text, ModelError::Timeout.user_message());
    assert_eq!(session.state(), SessionState::Idle);
    assert_eq!(
        session.history().messages(),
        &[
            ChatMessage::user("안녕"),
            ChatMessage::assistant(ModelError::Timeout.user_message()),
        ]
    );
}

#[tokio::test]
async fn stalled_search_is_dropped_from_the_prompt() {
    let gateway = FakeGateway::with_replies(Vec::new());
    let search = stalled_search();
    let mut settings = settings();
    settings.search_timeout = Duration::from_millis(50);
    let orchestrator = orchestrator_with(gateway, search.clone(), settings);
    let session = SessionContext::new();

    let prepared = orchestrator
        .prepare_turn(&session, "아이폰 15 출시된지 얼마나 됐어?")
        .await;

    assert!(prepared.decision.search_needed);
    assert_eq!(search.queries.lock().await.len(), 1);
    assert!(prepared.search_results.is_empty());
    assert!(!prepared.augmented_prompt.contains("아이폰 15 발표"));
    assert!(prepared.augmented_prompt.contains("2024년 3월 1일"));
}

#[tokio::test]
async fn new_chat_clears_history_and_document() {
    let gateway = FakeGateway::with_replies(Vec::new());
    let orchestrator = orchestrator(gateway, fake_search());
    let mut session = SessionContext::new();
    session.attach_document(DocumentContext::from_text("a.md", "본문"));
    orchestrator
        .respond(&mut session, "안녕")
        .await
        .expect("turn should complete");

    let status = orchestrator.new_chat(&mut session);

    assert_eq!(status.state, SessionState::Empty);
    assert_eq!(status.turns, 0);
    assert!(!status.has_document());
    assert!(session.history().is_empty());
    assert_eq!(orchestrator.intent_strategy(), IntentStrategy::Pattern);
}
