//! Chat endpoints: full answer and token stream.

use crate::state::AppState;
use axum::{
    body::{Body, Bytes},
    extract::State,
    http::header,
    response::IntoResponse,
    Json,
};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use shoreline_core::build_prompt;
use std::convert::Infallible;
use tracing::debug;

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct ChatResponse {
    pub response: String,
}

/// `POST /chat` — full answer with optional retrieved context.
///
/// Infallible by design: the engine degrades to demo output instead of
/// surfacing generation errors.
pub async fn chat(
    State(state): State<AppState>,
    Json(req): Json<ChatRequest>,
) -> Json<ChatResponse> {
    debug!(message = %req.message, "POST /chat");

    let retriever = state.retriever.read().await.clone();
    let prompt = build_prompt(&req.message, retriever.as_ref()).await;
    let response = state
        .engine
        .generate(&prompt, state.settings.generation_deadline())
        .await;

    Json(ChatResponse { response })
}

/// `POST /chat_stream` — fragments forwarded as a chunked plain-text body
/// in arrival order.
pub async fn chat_stream(
    State(state): State<AppState>,
    Json(req): Json<ChatRequest>,
) -> impl IntoResponse {
    debug!(message = %req.message, "POST /chat_stream");

    let retriever = state.retriever.read().await.clone();
    let prompt = build_prompt(&req.message, retriever.as_ref()).await;
    let stream = state
        .engine
        .stream(&prompt, state.settings.generation_deadline());

    let body = Body::from_stream(stream.map(|fragment| Ok::<_, Infallible>(Bytes::from(fragment))));

    (
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        body,
    )
}
