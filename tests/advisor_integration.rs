//! End-to-end tests for the advisor against a local model endpoint.
//!
//! Each test starts a real Axum server on a random port that stands in for
//! the chat API, loads a matters CSV from a temp file, and drives the full
//! recommend / conflict-check flow through `HttpLlmClient`.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::Json;
use axum::Router;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use secrecy::SecretString;
use url::Url;

use matterscope::config::{ApiFlavor, LlmConfig, RetrievalConfig};
use matterscope::error::{LlmError, PipelineError};
use matterscope::legal::dataset::MatterDataset;
use matterscope::legal::render::{
    conflict_report_tables, recommendation_tables, render_tables_html,
};
use matterscope::llm::HttpLlmClient;
use matterscope::pipeline::Advisor;

const API_KEY: &str = "test-key-12345";

const MATTERS_CSV: &str = "\
Attorney,Practice Area,Matter Description,Work Email,Role Detail,Client Name,Matter
Ann Lee,Tax,Federal tax controversy and IRS audit defense,ann@firm.test,Partner,Acme Co,Acme IRS audit
Bo Kim,Corporate,Merger advisory for regional banks,bo@firm.test,Associate,Beta LLC,Beta acquisition
Ann Lee,Tax,State tax appeal,ann@firm.test,Partner,Gamma Inc,Gamma appeal
Cy Day,Litigation,Contract dispute against Acme Co,cy@firm.test,Counsel,Delta Corp,Delta v. Acme
";

#[derive(Clone)]
enum Behavior {
    Reply(String),
    Status(StatusCode),
    Raw(String),
    Stall(Duration),
}

struct FakeModel {
    flavor: ApiFlavor,
    behavior: Behavior,
    requests: Mutex<Vec<(HeaderMap, serde_json::Value)>>,
}

impl FakeModel {
    fn request_count(&self) -> usize {
        self.requests.lock().expect("lock").len()
    }
}

fn reply_body(flavor: ApiFlavor, text: &str) -> serde_json::Value {
    match flavor {
        ApiFlavor::ChatCompletions => serde_json::json!({
            "id": "chatcmpl-test",
            "choices": [{"index": 0, "message": {"role": "assistant", "content": text}}],
        }),
        ApiFlavor::Anthropic => serde_json::json!({
            "id": "msg-test",
            "type": "message",
            "content": [{"type": "text", "text": text}],
        }),
    }
}

async fn handle(
    State(model): State<Arc<FakeModel>>,
    headers: HeaderMap,
    Json(body): Json<serde_json::Value>,
) -> Response {
    model.requests.lock().expect("lock").push((headers, body));
    match &model.behavior {
        Behavior::Reply(text) => Json(reply_body(model.flavor, text)).into_response(),
        Behavior::Status(status) => (*status, "upstream exploded").into_response(),
        Behavior::Raw(raw) => (StatusCode::OK, raw.clone()).into_response(),
        Behavior::Stall(delay) => {
            tokio::time::sleep(*delay).await;
            Json(reply_body(model.flavor, "too late")).into_response()
        }
    }
}

/// Start a fake model endpoint on a random port.
async fn start_fake_model(
    flavor: ApiFlavor,
    behavior: Behavior,
) -> (SocketAddr, Arc<FakeModel>) {
    let model = Arc::new(FakeModel {
        flavor,
        behavior,
        requests: Mutex::new(Vec::new()),
    });
    let app = Router::new()
        .route("/v1/chat", post(handle))
        .with_state(Arc::clone(&model));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("serve");
    });
    (addr, model)
}

fn llm_config(addr: SocketAddr, flavor: ApiFlavor, timeout: Duration) -> LlmConfig {
    LlmConfig {
        flavor,
        endpoint: Url::parse(&format!("http://{addr}/v1/chat")).expect("endpoint"),
        model: "claude-v1".to_string(),
        max_tokens: 150,
        temperature: 0.9,
        timeout,
        api_key: Some(SecretString::from(API_KEY.to_string())),
    }
}

fn load_dataset() -> (tempfile::TempDir, Arc<MatterDataset>) {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("matters.csv");
    std::fs::write(&path, MATTERS_CSV).expect("write csv");
    let dataset = MatterDataset::load_path(&path, b',').expect("dataset loads");
    (dir, Arc::new(dataset))
}

async fn advisor_for(flavor: ApiFlavor, behavior: Behavior) -> (Advisor, Arc<FakeModel>) {
    advisor_with_timeout(flavor, behavior, Duration::from_secs(5)).await
}

async fn advisor_with_timeout(
    flavor: ApiFlavor,
    behavior: Behavior,
    timeout: Duration,
) -> (Advisor, Arc<FakeModel>) {
    let (addr, model) = start_fake_model(flavor, behavior).await;
    let (_dir, dataset) = load_dataset();
    let client = HttpLlmClient::new(llm_config(addr, flavor, timeout)).expect("client");
    let advisor = Advisor::new(&RetrievalConfig::default(), dataset, Arc::new(client));
    (advisor, model)
}

#[tokio::test]
async fn recommend_over_chat_completions() {
    let (advisor, model) = advisor_for(
        ApiFlavor::ChatCompletions,
        Behavior::Reply("1. Ann Lee\n\n1. Ann Lee\n2. Cy Day".to_string()),
    )
    .await;

    let rec = advisor
        .recommend("who can defend an IRS audit")
        .await
        .expect("recommendation");

    assert_eq!(rec.reduced_query, "an IRS audit");
    assert!(!rec.used_fallback);
    assert_eq!(rec.candidates[0].attorney.as_deref(), Some("Ann Lee"));
    assert_eq!(rec.reasoning, vec!["1. Ann Lee", "2. Cy Day"]);
    assert_eq!(rec.attorney_matters[0].matters.len(), 2);

    let requests = model.requests.lock().expect("lock");
    assert_eq!(requests.len(), 1);
    let (headers, body) = &requests[0];
    assert_eq!(
        headers.get("authorization").and_then(|v| v.to_str().ok()),
        Some("Bearer test-key-12345")
    );
    assert_eq!(body["model"], "claude-v1");
    assert_eq!(body["max_tokens"], 150);
    assert_eq!(body["messages"].as_array().map(Vec::len), Some(2));
    let user = body["messages"][1]["content"].as_str().expect("user prompt");
    assert!(user.starts_with("Based on the following information, please make a recommendation:"));
    assert!(user.contains("IRS audit defense"));

    let html = render_tables_html(&recommendation_tables(&rec)).expect("render");
    assert!(html.contains("<td>Ann Lee</td>"));
}

#[tokio::test]
async fn recommend_over_anthropic_messages() {
    let (advisor, model) = advisor_for(
        ApiFlavor::Anthropic,
        Behavior::Reply("Bo Kim has the merger background.".to_string()),
    )
    .await;

    let rec = advisor
        .recommend("advice on a bank merger advisory")
        .await
        .expect("recommendation");
    assert_eq!(rec.candidates[0].attorney.as_deref(), Some("Bo Kim"));
    assert_eq!(rec.reasoning, vec!["Bo Kim has the merger background."]);

    let requests = model.requests.lock().expect("lock");
    let (headers, body) = &requests[0];
    assert_eq!(
        headers.get("x-api-key").and_then(|v| v.to_str().ok()),
        Some(API_KEY)
    );
    assert!(headers.get("anthropic-version").is_some());
    assert!(body["system"].as_str().is_some_and(|s| s.contains("law firm")));
    assert_eq!(body["messages"].as_array().map(Vec::len), Some(1));
}

#[tokio::test]
async fn slow_model_times_out_without_output() {
    let (advisor, model) = advisor_with_timeout(
        ApiFlavor::ChatCompletions,
        Behavior::Stall(Duration::from_secs(3)),
        Duration::from_millis(200),
    )
    .await;

    let err = advisor
        .recommend("tax audit defense")
        .await
        .expect_err("deadline exceeded");
    let PipelineError::Llm(LlmError::Timeout { timeout }) = &err else {
        panic!("expected timeout, got {err:?}");
    };
    assert_eq!(*timeout, Duration::from_millis(200));
    assert!(err.to_string().contains("200ms"));
    assert!(err.user_message().contains("did not answer in time"));
    assert_eq!(model.request_count(), 1);
}

#[tokio::test]
async fn error_status_is_request_failed() {
    let (advisor, _model) = advisor_for(
        ApiFlavor::ChatCompletions,
        Behavior::Status(StatusCode::INTERNAL_SERVER_ERROR),
    )
    .await;

    let err = advisor.recommend("tax audit").await.expect_err("500");
    let PipelineError::Llm(LlmError::RequestFailed { status, reason }) = err else {
        panic!("expected RequestFailed");
    };
    assert_eq!(status, Some(500));
    assert!(reason.contains("upstream exploded"));
}

#[tokio::test]
async fn non_json_body_is_malformed() {
    let (advisor, _model) = advisor_for(
        ApiFlavor::ChatCompletions,
        Behavior::Raw("<html>gateway page</html>".to_string()),
    )
    .await;

    let err = advisor.recommend("tax audit").await.expect_err("malformed");
    assert!(matches!(
        err,
        PipelineError::Llm(LlmError::MalformedResponse { .. })
    ));
}

#[tokio::test]
async fn conflict_check_end_to_end() {
    let (advisor, model) = advisor_for(
        ApiFlavor::ChatCompletions,
        Behavior::Reply(
            "Client: Acme Co\nConflict Type: Prior Work\nDetails: IRS audit defense\n\
             Client: Acme Co\nConflict Type: Potential Opponent\nDetails: Delta v. Acme"
                .to_string(),
        ),
    )
    .await;

    let report = advisor.conflict_check("Acme Co").await.expect("report");
    assert_eq!(report.matches.len(), 2);
    assert_eq!(report.conflicts.len(), 2);
    assert_eq!(report.conflicts[1].conflict_type, "Potential Opponent");

    let requests = model.requests.lock().expect("lock");
    let user = requests[0].1["messages"][1]["content"]
        .as_str()
        .expect("user prompt")
        .to_string();
    assert!(user.starts_with("Prospective client: Acme Co"));
    assert!(user.contains("Delta v. Acme"));
    assert!(!user.contains("Beta acquisition"));
}

#[tokio::test]
async fn unknown_client_returns_empty_report_without_calling_model() {
    let (advisor, model) = advisor_for(
        ApiFlavor::ChatCompletions,
        Behavior::Reply("Client: X\nConflict Type: Prior Work\nDetails: y".to_string()),
    )
    .await;

    let report = advisor
        .conflict_check("Omega Holdings")
        .await
        .expect("empty report");
    assert!(report.matches.is_empty());
    assert!(report.conflicts.is_empty());
    assert_eq!(model.request_count(), 0);

    let html = render_tables_html(&conflict_report_tables(&report)).expect("render");
    assert!(html.contains("No results."));
}
