//! Ingestion endpoint: rebuild the vector index from the data directory.

use crate::state::AppState;
use axum::{extract::State, Json};
use serde_json::{json, Value};
use shoreline_core::{MemoryStore, Retriever};
use std::sync::Arc;
use tracing::{error, info};

/// `POST /ingest` — re-ingests the configured data directory and swaps the
/// retriever used by subsequent chat requests. Always answers 200; failures
/// are reported in the body, matching the rest of the degrade-don't-fail
/// surface.
pub async fn ingest(State(state): State<AppState>) -> Json<Value> {
    match run_ingest(&state).await {
        Ok(chunks) => {
            info!(chunks, "ingestion completed");
            Json(json!({ "status": "completed" }))
        }
        Err(err) => {
            error!(error = %err, "ingest failed");
            Json(json!({ "status": "error", "detail": err.to_string() }))
        }
    }
}

async fn run_ingest(state: &AppState) -> anyhow::Result<usize> {
    let store = MemoryStore::open(&state.settings.vector_db_dir).await?;
    let retriever = Retriever::new(
        Arc::clone(&state.backend),
        Arc::new(store),
        &state.settings,
    );
    let chunks = retriever.ingest_dir(&state.settings.data_dir).await?;

    *state.retriever.write().await = Some(retriever);
    Ok(chunks)
}
