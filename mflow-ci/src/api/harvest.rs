//! Harvest control API
//!
//! POST /harvest/start spawns one background harvest cycle; only one may
//! run at a time. GET /harvest/status reports the running flag and the
//! last completed cycle.

use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::atomic::Ordering;

use crate::error::{ApiError, ApiResult};
use crate::services::harvester::{CycleSummary, HarvestParams};
use crate::AppState;

/// POST /harvest/start request; omitted fields fall back to configuration
#[derive(Debug, Default, Deserialize)]
pub struct StartHarvestRequest {
    pub min_view_count: Option<i64>,
    pub topic_limit: Option<i64>,
    pub notes_per_topic: Option<i64>,
}

/// POST /harvest/start response
#[derive(Debug, Serialize)]
pub struct StartHarvestResponse {
    pub accepted: bool,
    pub params: HarvestParams,
}

/// GET /harvest/status response
#[derive(Debug, Serialize)]
pub struct HarvestStatusResponse {
    pub running: bool,
    pub last_cycle: Option<CycleSummary>,
}

/// POST /harvest/start
///
/// Begin one harvest cycle in the background. Returns 409 while a cycle
/// is still running.
pub async fn start_harvest(
    State(state): State<AppState>,
    payload: Option<Json<StartHarvestRequest>>,
) -> ApiResult<Json<StartHarvestResponse>> {
    let Some(harvester) = state.harvester.clone() else {
        return Err(ApiError::BadRequest(
            "workflow API token not configured; harvesting is disabled".to_string(),
        ));
    };

    if state.harvest_running.swap(true, Ordering::SeqCst) {
        return Err(ApiError::Conflict("harvest cycle already running".to_string()));
    }

    let mut params = state.harvest_defaults.clone();
    if let Some(Json(request)) = payload {
        if let Some(min_view_count) = request.min_view_count {
            params.min_view_count = min_view_count;
        }
        if let Some(topic_limit) = request.topic_limit {
            params.topic_limit = topic_limit;
        }
        if let Some(notes_per_topic) = request.notes_per_topic {
            params.notes_per_topic = notes_per_topic;
        }
    }

    tracing::info!(
        min_view_count = params.min_view_count,
        topic_limit = params.topic_limit,
        "Harvest cycle accepted"
    );

    let running = state.harvest_running.clone();
    let last_cycle = state.last_cycle.clone();
    let last_error = state.last_error.clone();
    let task_params = params.clone();
    tokio::spawn(async move {
        match harvester.run_cycle(&task_params).await {
            Ok(summary) => {
                *last_cycle.write().await = Some(summary);
            }
            Err(e) => {
                tracing::error!(error = %e, "Harvest cycle failed");
                *last_error.write().await = Some(format!("harvest cycle: {}", e));
            }
        }
        running.store(false, Ordering::SeqCst);
    });

    Ok(Json(StartHarvestResponse {
        accepted: true,
        params,
    }))
}

/// GET /harvest/status
pub async fn harvest_status(State(state): State<AppState>) -> Json<HarvestStatusResponse> {
    Json(HarvestStatusResponse {
        running: state.harvest_running.load(Ordering::SeqCst),
        last_cycle: state.last_cycle.read().await.clone(),
    })
}

/// Build harvest control routes
pub fn harvest_routes() -> Router<AppState> {
    Router::new()
        .route("/harvest/start", post(start_harvest))
        .route("/harvest/status", get(harvest_status))
}
