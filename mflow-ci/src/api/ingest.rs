//! Ingestion entry points
//!
//! One POST route per content category. Each accepts a request context
//! plus an already-decoded category payload, runs it through the
//! reconciliation engine, and answers with the uniform result envelope.
//! Nothing here panics across the boundary: storage failures become
//! code-500 envelopes.

use axum::{extract::State, routing::post, Json, Router};
use serde_json::Value;

use crate::models::{
    context_str, AuthorNotesRequest, CommentsRequest, NoteDetailRequest, SearchNoteRequest,
    TopicsRequest,
};
use crate::services::reconciler::{BatchOutcome, Reconciler};
use crate::api::ResponseEnvelope;
use crate::AppState;

fn stored_payload(outcome: &BatchOutcome, ids_key: &str) -> Value {
    let mut payload = serde_json::Map::new();
    payload.insert(
        "stored_count".to_string(),
        Value::from(outcome.persisted.len()),
    );
    payload.insert(
        ids_key.to_string(),
        serde_json::to_value(&outcome.persisted).unwrap_or_default(),
    );
    payload.insert(
        "errors".to_string(),
        serde_json::to_value(&outcome.errors).unwrap_or_default(),
    );
    Value::Object(payload)
}

async fn record_failure(state: &AppState, context: &str, error: &anyhow::Error) {
    tracing::error!(error = %error, "{} failed", context);
    *state.last_error.write().await = Some(format!("{}: {}", context, error));
}

/// POST /openapi/search_note
pub async fn ingest_search_note(
    State(state): State<AppState>,
    Json(request): Json<SearchNoteRequest>,
) -> Json<ResponseEnvelope> {
    let keyword = context_str(&request.req_info, "keywords").unwrap_or("");
    tracing::info!(
        keyword = %keyword,
        notes = request.req_body.data.len(),
        "Search-note ingestion request"
    );

    if request.req_body.data.is_empty() {
        return Json(ResponseEnvelope::error(400, "no note data provided"));
    }

    let reconciler = Reconciler::new(state.db.clone());
    match reconciler
        .reconcile_search(&request.req_info, &request.req_body.data)
        .await
    {
        Ok(outcome) => Json(ResponseEnvelope::success(
            "note data stored",
            stored_payload(&outcome, "note_ids"),
        )),
        Err(e) => {
            record_failure(&state, "search-note ingestion", &e).await;
            Json(ResponseEnvelope::error(
                500,
                format!("failed to store note data: {}", e),
            ))
        }
    }
}

/// POST /openapi/note_detail
pub async fn ingest_note_detail(
    State(state): State<AppState>,
    Json(request): Json<NoteDetailRequest>,
) -> Json<ResponseEnvelope> {
    let note_url = context_str(&request.req_info, "noteUrl").unwrap_or("");
    tracing::info!(note_url = %note_url, "Note-detail ingestion request");

    if request.req_body.data.note.note_id.trim().is_empty() {
        return Json(ResponseEnvelope::error(400, "no note detail data provided"));
    }

    let reconciler = Reconciler::new(state.db.clone());
    match reconciler
        .reconcile_note_detail(&request.req_info, &request.req_body.data)
        .await
    {
        Ok(outcome) => Json(ResponseEnvelope::success(
            "note detail stored",
            stored_payload(&outcome, "note_ids"),
        )),
        Err(e) => {
            record_failure(&state, "note-detail ingestion", &e).await;
            Json(ResponseEnvelope::error(
                500,
                format!("failed to store note detail: {}", e),
            ))
        }
    }
}

/// POST /openapi/comments
pub async fn ingest_comments(
    State(state): State<AppState>,
    Json(request): Json<CommentsRequest>,
) -> Json<ResponseEnvelope> {
    let note_url = context_str(&request.req_info, "noteUrl").unwrap_or("");
    tracing::info!(
        note_url = %note_url,
        comments = request.req_body.data.comments.len(),
        "Comment ingestion request"
    );

    if request.req_body.data.comments.is_empty() {
        return Json(ResponseEnvelope::error(400, "no comment data provided"));
    }

    let reconciler = Reconciler::new(state.db.clone());
    match reconciler
        .reconcile_comments(&request.req_info, &request.req_body.data)
        .await
    {
        Ok(outcome) => Json(ResponseEnvelope::success(
            "comment data stored",
            stored_payload(&outcome, "comment_ids"),
        )),
        Err(e) => {
            record_failure(&state, "comment ingestion", &e).await;
            Json(ResponseEnvelope::error(
                500,
                format!("failed to store comment data: {}", e),
            ))
        }
    }
}

/// POST /openapi/author_notes
pub async fn ingest_author_notes(
    State(state): State<AppState>,
    Json(request): Json<AuthorNotesRequest>,
) -> Json<ResponseEnvelope> {
    let profile_url = context_str(&request.req_info, "userProfileUrl").unwrap_or("");
    tracing::info!(
        profile_url = %profile_url,
        notes = request.req_body.data.notes.len(),
        "Author-notes ingestion request"
    );

    if request.req_body.data.author_info.user_id.trim().is_empty() {
        return Json(ResponseEnvelope::error(400, "no author data provided"));
    }

    let reconciler = Reconciler::new(state.db.clone());
    match reconciler
        .reconcile_author_notes(&request.req_info, &request.req_body.data)
        .await
    {
        Ok(outcome) => {
            let mut payload = stored_payload(&outcome, "note_ids");
            payload["author_id"] = Value::String(request.req_body.data.author_info.user_id.clone());
            Json(ResponseEnvelope::success("author notes stored", payload))
        }
        Err(e) => {
            record_failure(&state, "author-notes ingestion", &e).await;
            Json(ResponseEnvelope::error(
                500,
                format!("failed to store author notes: {}", e),
            ))
        }
    }
}

/// POST /openapi/topics
pub async fn ingest_topics(
    State(state): State<AppState>,
    Json(request): Json<TopicsRequest>,
) -> Json<ResponseEnvelope> {
    let keyword = context_str(&request.req_info, "keyword").unwrap_or("");
    tracing::info!(
        keyword = %keyword,
        topics = request.req_body.data.topic_list.len(),
        "Topic ingestion request"
    );

    if request.req_body.data.topic_list.is_empty() {
        return Json(ResponseEnvelope::error(400, "no topic data provided"));
    }

    let reconciler = Reconciler::new(state.db.clone());
    match reconciler
        .reconcile_topics(&request.req_info, &request.req_body.data)
        .await
    {
        Ok(outcome) => Json(ResponseEnvelope::success(
            "topic data stored",
            stored_payload(&outcome, "topic_names"),
        )),
        Err(e) => {
            record_failure(&state, "topic ingestion", &e).await;
            Json(ResponseEnvelope::error(
                500,
                format!("failed to store topic data: {}", e),
            ))
        }
    }
}

/// Build ingestion routes
pub fn ingest_routes() -> Router<AppState> {
    Router::new()
        .route("/openapi/search_note", post(ingest_search_note))
        .route("/openapi/note_detail", post(ingest_note_detail))
        .route("/openapi/comments", post(ingest_comments))
        .route("/openapi/author_notes", post(ingest_author_notes))
        .route("/openapi/topics", post(ingest_topics))
}
