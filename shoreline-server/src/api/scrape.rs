//! Scrape endpoint: fetch a public URL or clean provided text.

use crate::error::ApiError;
use crate::scrape::{html_to_text, is_public_url, truncate_to_boundary};
use crate::state::AppState;
use axum::{extract::State, Json};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tracing::debug;

#[derive(Debug, Deserialize)]
pub struct ScrapeRequest {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub file_content: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ScrapeResponse {
    pub text: String,
}

/// `POST /scrape` — returns cleaned text from a URL or from inline content.
/// Exactly one source is required; URLs must point at public hosts.
pub async fn scrape(
    State(state): State<AppState>,
    Json(req): Json<ScrapeRequest>,
) -> Result<Json<ScrapeResponse>, ApiError> {
    debug!("POST /scrape");
    let limit = state.settings.scrape_max_bytes;

    let text = if let Some(url) = req.url.as_deref().filter(|u| !u.is_empty()) {
        if !is_public_url(url) {
            return Err(ApiError::bad_request("invalid url"));
        }
        let html = fetch_capped(&state, url, limit).await?;
        html_to_text(&html)
    } else if let Some(content) = req.file_content {
        content.trim().to_string()
    } else {
        return Err(ApiError::bad_request("url or file_content required"));
    };

    Ok(Json(ScrapeResponse {
        text: truncate_to_boundary(text, limit),
    }))
}

/// Downloads at most `limit` bytes of the response body.
async fn fetch_capped(state: &AppState, url: &str, limit: usize) -> Result<String, ApiError> {
    let response = state
        .http_client
        .get(url)
        .timeout(state.settings.scrape_timeout())
        .send()
        .await
        .map_err(|e| ApiError::bad_request(e.to_string()))?
        .error_for_status()
        .map_err(|e| ApiError::bad_request(e.to_string()))?;

    let mut body = response.bytes_stream();
    let mut raw: Vec<u8> = Vec::new();

    while let Some(chunk) = body.next().await {
        let chunk = chunk.map_err(|e| ApiError::bad_request(e.to_string()))?;
        raw.extend_from_slice(&chunk);
        if raw.len() >= limit {
            break;
        }
    }
    raw.truncate(limit);

    Ok(String::from_utf8_lossy(&raw).into_owned())
}
