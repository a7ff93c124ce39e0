// Copyright (c) 2026 Chorus Systems, Inc.
// SPDX-License-Identifier: AGPL-3.0
//! HTTP API
//!
//! Thin axum surface over the orchestrator: scenario submission, result
//! lookup, cancellation, and a per-scenario SSE event stream. All domain
//! behavior lives below this layer.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::sse::{Event, KeepAlive, Sse},
    response::IntoResponse,
    routing::{delete, get, post},
    Json, Router,
};
use futures::stream::Stream;
use serde_json::json;
use tower_http::trace::TraceLayer;
use tracing::warn;

use crate::application::{Orchestrator, ResultStatus, SubmitError};
use crate::domain::events::SessionEvent;
use crate::domain::scenario::{ScenarioId, ScenarioRequest};
use crate::infrastructure::event_bus::EventBusError;

pub struct AppState {
    pub orchestrator: Orchestrator,
}

pub fn app(orchestrator: Orchestrator) -> Router {
    let state = Arc::new(AppState { orchestrator });

    Router::new()
        .route("/scenarios", post(submit_scenario))
        .route("/scenarios/{id}/result", get(get_result))
        .route("/scenarios/{id}/events", get(stream_events))
        .route("/scenarios/{id}", delete(cancel_scenario))
        .route("/healthz", get(health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

async fn submit_scenario(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ScenarioRequest>,
) -> impl IntoResponse {
    match state.orchestrator.submit(request).await {
        Ok(accepted) => (
            StatusCode::ACCEPTED,
            Json(json!({
                "scenario_id": accepted.scenario_id.to_string(),
                "accepted_at": accepted.accepted_at,
            })),
        ),
        Err(SubmitError::Invalid(err)) => (
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(json!({ "error": err.to_string() })),
        ),
    }
}

async fn get_result(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let Some(scenario_id) = parse_id(&id) else {
        return bad_id();
    };
    match state.orchestrator.get_result(scenario_id).await {
        ResultStatus::Ready(result) => (
            StatusCode::OK,
            Json(json!({ "status": "ready", "result": result })),
        ),
        ResultStatus::Pending { state } => (
            StatusCode::OK,
            Json(json!({ "status": "pending", "state": state })),
        ),
        ResultStatus::Failed { reason } => (
            StatusCode::OK,
            Json(json!({ "status": "failed", "reason": reason })),
        ),
        ResultStatus::NotFound => (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": "unknown scenario" })),
        ),
    }
}

async fn cancel_scenario(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let Some(scenario_id) = parse_id(&id) else {
        return bad_id();
    };
    if state.orchestrator.cancel(scenario_id) {
        (StatusCode::ACCEPTED, Json(json!({ "status": "cancelling" })))
    } else {
        (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": "scenario is not live" })),
        )
    }
}

/// Per-scenario SSE stream. Closes after the session's terminal state
/// event has been delivered.
async fn stream_events(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Sse<impl Stream<Item = Result<Event, axum::Error>>>, (StatusCode, Json<serde_json::Value>)>
{
    let Some(scenario_id) = parse_id(&id) else {
        return Err(bad_id());
    };

    let receiver = state
        .orchestrator
        .event_bus()
        .subscribe_scenario(scenario_id);

    let stream = futures::stream::unfold((receiver, false), |(mut rx, done)| async move {
        if done {
            return None;
        }
        loop {
            match rx.recv().await {
                Ok(event) => {
                    let terminal = matches!(
                        &event,
                        SessionEvent::SessionStateChanged { new_state, .. }
                            if new_state.is_terminal()
                    );
                    let sse = match Event::default().json_data(&event) {
                        Ok(sse) => sse,
                        Err(err) => {
                            warn!(error = %err, "Event serialization failed");
                            continue;
                        }
                    };
                    return Some((Ok(sse), (rx, terminal)));
                }
                Err(EventBusError::Lagged(n)) => {
                    return Some((
                        Ok(Event::default().comment(format!("lagged by {n} events"))),
                        (rx, false),
                    ));
                }
                Err(_) => return None,
            }
        }
    });

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

fn parse_id(raw: &str) -> Option<ScenarioId> {
    ScenarioId::from_string(raw).ok()
}

fn bad_id() -> (StatusCode, Json<serde_json::Value>) {
    (
        StatusCode::BAD_REQUEST,
        Json(json!({ "error": "invalid scenario id" })),
    )
}
