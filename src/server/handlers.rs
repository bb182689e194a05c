use std::convert::Infallible;

use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::Json;
use futures_util::stream::{self, Stream};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::info;

use crate::core::errors::ApiError;
use crate::pipeline::{RunOutcome, StreamEvent};
use crate::prompt::SourceRef;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct QueryRequest {
    pub query: String,
    pub max_sources: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct QueryResponse {
    pub answer: String,
    pub sources: Vec<SourceRef>,
}

pub async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

pub async fn query(
    State(state): State<AppState>,
    Json(request): Json<QueryRequest>,
) -> Result<Json<QueryResponse>, ApiError> {
    let query = request.query.trim();
    if query.is_empty() {
        return Err(ApiError::BadRequest("query must not be empty".to_string()));
    }
    info!(query = %query, "query received");

    let response = match state.pipeline.run(query, request.max_sources).await? {
        RunOutcome::Answer(answer) => QueryResponse {
            answer: answer.text,
            sources: answer.sources,
        },
        RunOutcome::Empty(reason) => QueryResponse {
            answer: reason.to_string(),
            sources: Vec::new(),
        },
    };

    Ok(Json(response))
}

pub async fn stream(
    State(state): State<AppState>,
    Json(request): Json<QueryRequest>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    let query = request.query.trim().to_string();
    if query.is_empty() {
        return Err(ApiError::BadRequest("query must not be empty".to_string()));
    }
    info!(query = %query, "stream query received");

    let rx = state.pipeline.run_stream(query, request.max_sources);
    let events = stream::unfold(rx, |mut rx| async move {
        let event = rx.recv().await?;
        Some((Ok(sse_event(&event)), rx))
    });

    Ok(Sse::new(events).keep_alive(KeepAlive::default()))
}

fn sse_event(event: &StreamEvent) -> Event {
    let payload = serde_json::to_string(event)
        .unwrap_or_else(|_| r#"{"type":"error","error":"serialization failed"}"#.to_string());
    Event::default().data(payload)
}
