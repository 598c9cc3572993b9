//! HTTP routes.

pub mod chat;
pub mod ingest;
pub mod scrape;

use crate::state::AppState;
use axum::http::HeaderValue;
use axum::{
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use shoreline_core::Settings;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::services::{ServeDir, ServeFile};
use tower_http::trace::TraceLayer;

/// Create the main API router.
pub fn create_router(state: AppState) -> Router {
    let cors = cors_layer(&state.settings);

    Router::new()
        .route("/health", get(health))
        .route("/chat", post(chat::chat))
        .route("/chat_stream", post(chat::chat_stream))
        .route("/scrape", post(scrape::scrape))
        .route("/ingest", post(ingest::ingest))
        // Serve the front-end UI at the root
        .fallback_service(ServeDir::new("web").fallback(ServeFile::new("web/index.html")))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

fn cors_layer(settings: &Settings) -> CorsLayer {
    let origins = settings.allowed_origins();
    if origins.iter().any(|origin| origin == "*") {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        let origins: Vec<HeaderValue> = origins
            .iter()
            .filter_map(|origin| origin.parse().ok())
            .collect();
        CorsLayer::new()
            .allow_origin(AllowOrigin::list(origins))
            .allow_methods(Any)
            .allow_headers(Any)
    }
}
