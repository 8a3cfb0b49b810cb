//! Integration tests for the workflow client retry policy
//!
//! A local stub server scripts the application-level status codes returned
//! per attempt, so transient cooldown/retry behavior, the retry ceiling,
//! hard failures, and response archiving are all observable end to end.

use axum::extract::State;
use axum::response::{IntoResponse, Response};
use axum::{routing::post, Json, Router};
use serde_json::{json, Value};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tempfile::TempDir;

use mflow_ci::services::envelope::decode_envelope;
use mflow_ci::models::NoteSnapshot;
use mflow_ci::services::workflow_client::{
    ClientConfig, WorkflowClient, WorkflowError, WorkflowKind, CODE_RATE_LIMITED,
    CODE_SERVICE_OVERLOADED,
};

/// Sentinel script entry: respond with a non-JSON body
const GARBAGE: i64 = -1;

#[derive(Clone)]
struct StubState {
    hits: Arc<AtomicUsize>,
    script: Arc<Vec<i64>>,
}

async fn run_workflow(State(state): State<StubState>, Json(_body): Json<Value>) -> Response {
    let attempt = state.hits.fetch_add(1, Ordering::SeqCst);
    let code = *state
        .script
        .get(attempt)
        .unwrap_or_else(|| state.script.last().expect("empty script"));

    if code == GARBAGE {
        return "definitely not an envelope".into_response();
    }

    if code == 0 {
        let inner = json!({
            "resp_code": 0,
            "resp_data": [
                { "note_id": "N1", "author_user_id": "A1", "note_liked_count": "3" }
            ]
        })
        .to_string();
        return Json(json!({ "code": 0, "msg": "ok", "data": inner })).into_response();
    }

    Json(json!({ "code": code, "msg": "throttled", "data": "" })).into_response()
}

async fn spawn_stub(script: Vec<i64>) -> (String, Arc<AtomicUsize>) {
    let hits = Arc::new(AtomicUsize::new(0));
    let state = StubState {
        hits: hits.clone(),
        script: Arc::new(script),
    };
    let app = Router::new()
        .route("/run", post(run_workflow))
        .with_state(state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (format!("http://{}/run", addr), hits)
}

fn client_config(
    endpoint: String,
    audit_dir: &Path,
    max_retries: u32,
    cooldown_ms: u64,
) -> ClientConfig {
    ClientConfig {
        endpoint,
        api_token: "test-token".to_string(),
        session_cookie: Some("session=abc".to_string()),
        max_retries,
        cooldown: Duration::from_millis(cooldown_ms),
        min_interval: Duration::from_millis(0),
        timeout: Duration::from_secs(5),
        audit_dir: audit_dir.to_path_buf(),
    }
}

#[tokio::test]
async fn two_transient_failures_then_success() {
    // Scenario E: rate-limited twice, then the payload comes through;
    // exactly two cooldown waits occur along the way
    let (endpoint, hits) = spawn_stub(vec![CODE_RATE_LIMITED, CODE_RATE_LIMITED, 0]).await;
    let audit = TempDir::new().unwrap();
    let client = WorkflowClient::new(client_config(endpoint, audit.path(), 3, 50)).unwrap();

    let start = Instant::now();
    let envelope = client
        .invoke(WorkflowKind::SearchNotes, serde_json::Map::new())
        .await
        .expect("expected eventual success");
    let elapsed = start.elapsed();

    assert_eq!(envelope.code, 0);
    assert_eq!(hits.load(Ordering::SeqCst), 3);
    assert!(elapsed >= Duration::from_millis(100), "two cooldowns expected");

    let decoded = decode_envelope::<Vec<NoteSnapshot>>(&envelope).expect("decode failed");
    assert_eq!(decoded.resp_data.len(), 1);
    assert_eq!(decoded.resp_data[0].note_id, "N1");
}

#[tokio::test]
async fn overloaded_code_is_also_transient() {
    let (endpoint, hits) = spawn_stub(vec![CODE_SERVICE_OVERLOADED, 0]).await;
    let audit = TempDir::new().unwrap();
    let client = WorkflowClient::new(client_config(endpoint, audit.path(), 3, 10)).unwrap();

    let envelope = client
        .invoke(WorkflowKind::SearchNotes, serde_json::Map::new())
        .await
        .expect("expected eventual success");

    assert_eq!(envelope.code, 0);
    assert_eq!(hits.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn retry_ceiling_is_strictly_enforced() {
    // endless rate limiting: at most the ceiling's worth of retries,
    // then an explicit failure
    let (endpoint, hits) = spawn_stub(vec![CODE_RATE_LIMITED]).await;
    let audit = TempDir::new().unwrap();
    let client = WorkflowClient::new(client_config(endpoint, audit.path(), 2, 10)).unwrap();

    let result = client
        .invoke(WorkflowKind::SearchNotes, serde_json::Map::new())
        .await;

    match result {
        Err(WorkflowError::RetryExhausted { attempts, .. }) => assert_eq!(attempts, 2),
        other => panic!("expected RetryExhausted, got {:?}", other.map(|e| e.code)),
    }
    // initial call + 2 retries
    assert_eq!(hits.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn hard_failure_code_is_not_retried() {
    let (endpoint, hits) = spawn_stub(vec![700_012]).await;
    let audit = TempDir::new().unwrap();
    let client = WorkflowClient::new(client_config(endpoint, audit.path(), 3, 10)).unwrap();

    let result = client
        .invoke(WorkflowKind::SearchNotes, serde_json::Map::new())
        .await;

    match result {
        Err(WorkflowError::Api { code, msg }) => {
            assert_eq!(code, 700_012);
            assert_eq!(msg, "throttled");
        }
        other => panic!("expected Api error, got {:?}", other.map(|e| e.code)),
    }
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn malformed_envelope_is_not_retried() {
    let (endpoint, hits) = spawn_stub(vec![GARBAGE]).await;
    let audit = TempDir::new().unwrap();
    let client = WorkflowClient::new(client_config(endpoint, audit.path(), 3, 10)).unwrap();

    let result = client
        .invoke(WorkflowKind::SearchNotes, serde_json::Map::new())
        .await;

    assert!(matches!(result, Err(WorkflowError::Protocol(_))));
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn responses_are_archived_per_call_site() {
    let (endpoint, _hits) = spawn_stub(vec![0]).await;
    let audit = TempDir::new().unwrap();
    let client = WorkflowClient::new(client_config(endpoint, audit.path(), 3, 10)).unwrap();

    client
        .invoke(WorkflowKind::SearchNotes, serde_json::Map::new())
        .await
        .expect("call failed");

    let entries: Vec<String> = std::fs::read_dir(audit.path())
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
        .collect();
    assert_eq!(entries.len(), 1);
    assert!(entries[0].starts_with("search_notes_"));
    assert!(entries[0].ends_with(".json"));

    // the archive is the verbatim body, so it still parses as an envelope
    let content = std::fs::read_to_string(audit.path().join(&entries[0])).unwrap();
    let value: Value = serde_json::from_str(&content).unwrap();
    assert_eq!(value["code"], 0);
}
