use std::collections::VecDeque;
use std::sync::Arc;

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode, header::CONTENT_TYPE};
use axum::routing::post;
use axum::{Json, Router};
use futures::StreamExt;
use serde_json::{Value, json};
use shared::llm::{
    InferenceParams, MessagesGateway, MessagesGatewayConfig, ModelDelta, ModelError,
    ModelGateway, ModelRequest, complete,
};
use shared::models::ChatMessage;
use tokio::net::TcpListener;
use tokio::sync::{Mutex, oneshot};

#[derive(Debug, Clone)]
struct MockReply {
    status: StatusCode,
    content_type: &'static str,
    body: String,
}

#[derive(Debug, Clone)]
struct TestServerState {
    replies: Arc<Mutex<VecDeque<MockReply>>>,
    seen_payloads: Arc<Mutex<Vec<Value>>>,
    seen_api_keys: Arc<Mutex<Vec<String>>>,
}

impl TestServerState {
    fn with_replies(replies: Vec<MockReply>) -> Self {
        Self {
            replies: Arc::new(Mutex::new(VecDeque::from(replies))),
            seen_payloads: Arc::new(Mutex::new(Vec::new())),
            seen_api_keys: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

#[tokio::test]
async fn streams_text_and_reasoning_deltas_in_order() {
    let state = TestServerState::with_replies(vec![sse_reply(&[
        json!({ "type": "message_start", "message": { "id": "msg_1" } }),
        json!({ "type": "content_block_delta", "index": 0, "delta": { "type": "thinking_delta", "thinking": "날짜 계산" } }),
        json!({ "type": "content_block_delta", "index": 1, "delta": { "type": "text_delta", "text": "오늘은 " } }),
        json!({ "type": "content_block_delta", "index": 1, "delta": { "type": "text_delta", "text": "금요일입니다." } }),
        json!({ "type": "message_stop" }),
    ])]);
    let (url, shutdown_tx, server_task) = spawn_test_server(state.clone()).await;

    let gateway = MessagesGateway::new(config_for(url, 0)).expect("gateway should build");
    let mut stream = gateway
        .stream(sample_request(Some(2_048)))
        .await
        .expect("stream should open");
    let mut deltas = Vec::new();
    while let Some(delta) = stream.next().await {
        deltas.push(delta.expect("delta should decode"));
    }

    shutdown_tx.send(()).expect("shutdown signal should send");
    server_task.await.expect("server task should join");

    assert_eq!(
        deltas,
        vec![
            ModelDelta::Reasoning("날짜 계산".to_string()),
            ModelDelta::Text("오늘은 ".to_string()),
            ModelDelta::Text("금요일입니다.".to_string()),
        ]
    );

    let payloads = state.seen_payloads.lock().await.clone();
    assert_eq!(payloads.len(), 1);
    assert_eq!(payloads[0]["model"], "test-model");
    assert_eq!(payloads[0]["system"], "한국어로 답하세요.");
    assert_eq!(payloads[0]["stream"], true);
    assert_eq!(payloads[0]["thinking"]["budget_tokens"], 2_048);
    assert_eq!(payloads[0]["messages"][0]["role"], "user");
    assert!(payloads[0].get("top_k").is_none());

    let api_keys = state.seen_api_keys.lock().await.clone();
    assert_eq!(api_keys, vec!["test-model-key".to_string()]);
}

#[tokio::test]
async fn retries_unavailable_upstream_before_streaming() {
    let state = TestServerState::with_replies(vec![
        error_reply(StatusCode::SERVICE_UNAVAILABLE, "api_error"),
        error_reply(StatusCode::BAD_GATEWAY, "api_error"),
        sse_reply(&[
            json!({ "type": "content_block_delta", "index": 0, "delta": { "type": "text_delta", "text": "ok" } }),
            json!({ "type": "message_stop" }),
        ]),
    ]);
    let (url, shutdown_tx, server_task) = spawn_test_server(state.clone()).await;

    let gateway = MessagesGateway::new(config_for(url, 2)).expect("gateway should build");
    let text = complete(&gateway, sample_request(None))
        .await
        .expect("request should succeed after retries");

    shutdown_tx.send(()).expect("shutdown signal should send");
    server_task.await.expect("server task should join");

    assert_eq!(text, "ok");
    assert_eq!(state.seen_payloads.lock().await.len(), 3);
}

#[tokio::test]
async fn throttling_maps_to_throttled_after_retries_are_exhausted() {
    let state = TestServerState::with_replies(vec![
        error_reply(StatusCode::TOO_MANY_REQUESTS, "rate_limit_error"),
        error_reply(StatusCode::TOO_MANY_REQUESTS, "rate_limit_error"),
    ]);
    let (url, shutdown_tx, server_task) = spawn_test_server(state.clone()).await;

    let gateway = MessagesGateway::new(config_for(url, 1)).expect("gateway should build");
    let err = complete(&gateway, sample_request(None))
        .await
        .expect_err("throttled request should fail");

    shutdown_tx.send(()).expect("shutdown signal should send");
    server_task.await.expect("server task should join");

    assert_eq!(
        err,
        ModelError::Throttled("status=429 type=rate_limit_error".to_string())
    );
    assert_eq!(
        err.user_message(),
        "요청을 처리하지 못했습니다. 잠시 후 다시 말씀해 주세요. 🙏"
    );
    assert_eq!(state.seen_payloads.lock().await.len(), 2);
}

#[tokio::test]
async fn does_not_retry_rejected_requests() {
    let state = TestServerState::with_replies(vec![
        error_reply(StatusCode::BAD_REQUEST, "invalid_request_error"),
        error_reply(StatusCode::UNAUTHORIZED, "authentication_error"),
    ]);
    let (url, shutdown_tx, server_task) = spawn_test_server(state.clone()).await;

    let gateway = MessagesGateway::new(config_for(url, 3)).expect("gateway should build");
    let invalid = complete(&gateway, sample_request(None))
        .await
        .expect_err("bad request should fail");
    let unauthorized = complete(&gateway, sample_request(None))
        .await
        .expect_err("unauthorized request should fail");

    shutdown_tx.send(()).expect("shutdown signal should send");
    server_task.await.expect("server task should join");

    assert!(matches!(invalid, ModelError::InvalidRequest(_)));
    assert_eq!(
        unauthorized,
        ModelError::ProviderFailure("status=401 type=authentication_error".to_string())
    );
    assert_eq!(state.seen_payloads.lock().await.len(), 2);
}

#[tokio::test]
async fn mid_stream_error_event_ends_the_stream() {
    let state = TestServerState::with_replies(vec![sse_reply(&[
        json!({ "type": "content_block_delta", "index": 0, "delta": { "type": "text_delta", "text": "부분" } }),
        json!({ "type": "error", "error": { "type": "overloaded_error", "message": "Overloaded" } }),
        json!({ "type": "content_block_delta", "index": 0, "delta": { "type": "text_delta", "text": "ignored" } }),
    ])]);
    let (url, shutdown_tx, server_task) = spawn_test_server(state.clone()).await;

    let gateway = MessagesGateway::new(config_for(url, 0)).expect("gateway should build");
    let mut stream = gateway
        .stream(sample_request(None))
        .await
        .expect("stream should open");
    let mut items = Vec::new();
    while let Some(item) = stream.next().await {
        items.push(item);
    }

    shutdown_tx.send(()).expect("shutdown signal should send");
    server_task.await.expect("server task should join");

    assert_eq!(
        items,
        vec![
            Ok(ModelDelta::Text("부분".to_string())),
            Err(ModelError::Throttled("overloaded_error: Overloaded".to_string())),
        ]
    );
}

fn config_for(messages_url: String, max_retries: u32) -> MessagesGatewayConfig {
    MessagesGatewayConfig {
        messages_url,
        api_key: "test-model-key".to_string(),
        api_version: "2023-06-01".to_string(),
        region: "us-west-2".to_string(),
        timeout_ms: 5_000,
        max_retries,
        retry_base_backoff_ms: 0,
    }
}

fn sample_request(reasoning_budget_tokens: Option<u32>) -> ModelRequest {
    ModelRequest {
        model_id: "test-model".to_string(),
        system_prompt: "한국어로 답하세요.".to_string(),
        messages: vec![ChatMessage::user("오늘 무슨 요일이야?")],
        params: InferenceParams {
            temperature: 1.0,
            top_p: None,
            top_k: None,
            max_tokens: 4_096,
            reasoning_budget_tokens,
        },
    }
}

fn sse_reply(events: &[Value]) -> MockReply {
    let body = events
        .iter()
        .map(|event| {
            let kind = event["type"].as_str().unwrap_or("message");
            format!("event: {kind}\ndata: {event}\n\n")
        })
        .collect::<String>();
    MockReply {
        status: StatusCode::OK,
        content_type: "text/event-stream",
        body,
    }
}

fn error_reply(status: StatusCode, error_type: &str) -> MockReply {
    MockReply {
        status,
        content_type: "application/json",
        body: json!({
            "type": "error",
            "error": { "type": error_type, "message": "mock failure" }
        })
        .to_string(),
    }
}

async fn spawn_test_server(
    state: TestServerState,
) -> (String, oneshot::Sender<()>, tokio::task::JoinHandle<()>) {
    let app = Router::new()
        .route("/v1/messages", post(test_messages_handler))
        .with_state(state);

    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("listener should bind");
    let local_addr = listener
        .local_addr()
        .expect("listener address should resolve");
    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

    let server_task = tokio::spawn(async move {
        let server = axum::serve(listener, app).with_graceful_shutdown(async move {
            let _ = shutdown_rx.await;
        });

        server.await.expect("test server should run");
    });

    (
        format!("http://{local_addr}/v1/messages"),
        shutdown_tx,
        server_task,
    )
}

async fn test_messages_handler(
    State(state): State<TestServerState>,
    headers: HeaderMap,
    Json(payload): Json<Value>,
) -> (StatusCode, [(axum::http::HeaderName, &'static str); 1], String) {
    state.seen_payloads.lock().await.push(payload);
    if let Some(value) = headers
        .get("x-api-key")
        .and_then(|value| value.to_str().ok())
    {
        state.seen_api_keys.lock().await.push(value.to_string());
    }

    let reply = state
        .replies
        .lock()
        .await
        .pop_front()
        .unwrap_or(MockReply {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            content_type: "application/json",
            body: String::new(),
        });
    (reply.status, [(CONTENT_TYPE, reply.content_type)], reply.body)
}
