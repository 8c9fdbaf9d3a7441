use std::sync::Arc;

use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::{Form, Json};
use serde::Deserialize;
use serde_json::json;

use crate::errors::BotError;
use crate::state::AppState;

pub async fn root(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let chunks = state.index.count().await.unwrap_or(0);
    Json(json!({
        "status": "running",
        "app": "concierge",
        "knowledge_base_chunks": chunks,
        "started_at": state.started_at.to_rfc3339(),
    }))
}

pub async fn health() -> impl IntoResponse {
    Json(json!({ "status": "healthy" }))
}

/// Transport-agnostic inbound message: who it is from and what they said.
/// Vendor envelopes (signatures, SIDs, profile names) stay with the
/// transport adapter that posts here.
#[derive(Debug, Deserialize)]
pub struct IncomingMessage {
    pub from: String,
    pub body: String,
}

pub async fn webhook(
    State(state): State<Arc<AppState>>,
    Form(payload): Form<IncomingMessage>,
) -> Result<String, BotError> {
    tracing::info!(from = %payload.from, "received message");

    match state
        .orchestrator
        .handle_message(&payload.from, &payload.body)
        .await
    {
        Ok(reply) => Ok(reply),
        Err(BotError::EmptyMessage) => Err(BotError::EmptyMessage),
        Err(err) => {
            // The conversant still gets a reply; operators see the error.
            tracing::error!(from = %payload.from, error = %err, "exchange failed");
            Ok(state.config.llm.fallback_reply.clone())
        }
    }
}

pub async fn knowledge_base_count(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, BotError> {
    let count = state.ingest.count().await?;
    Ok(Json(json!({ "count": count })))
}

pub async fn knowledge_base_clear(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, BotError> {
    let removed = state.ingest.clear_all().await?;
    Ok(Json(json!({ "status": "cleared", "removed": removed })))
}

pub async fn get_conversation(
    State(state): State<Arc<AppState>>,
    Path(conversant_id): Path<String>,
) -> Result<impl IntoResponse, BotError> {
    let history = state.conversations.history(&conversant_id).await?;
    Ok(Json(json!({
        "conversant_id": conversant_id,
        "history": history,
    })))
}

pub async fn clear_conversation(
    State(state): State<Arc<AppState>>,
    Path(conversant_id): Path<String>,
) -> Result<impl IntoResponse, BotError> {
    state.conversations.clear(&conversant_id).await?;
    Ok(Json(json!({
        "status": "cleared",
        "conversant_id": conversant_id,
    })))
}
