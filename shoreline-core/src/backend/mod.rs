//! Generation backend abstraction layer.
//!
//! This module defines a common interface for the text-generation backends
//! (OpenAI, Ollama, demo echo) plus the selector that binds one of them at
//! engine construction time.

mod demo;
pub mod ollama;
pub mod openai;

pub use demo::DemoBackend;
pub use ollama::OllamaBackend;
pub use openai::OpenAiBackend;

use crate::config::Settings;
use async_trait::async_trait;
use futures::stream::BoxStream;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

/// Errors that can occur when interacting with a backend.
#[derive(Debug, Error)]
pub enum BackendError {
    /// The backend cannot be constructed (missing credentials, unreachable
    /// server). Only raised at bind time; the selector skips the candidate.
    #[error("backend unavailable: {0}")]
    Unavailable(String),

    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("malformed response: {0}")]
    Json(#[from] serde_json::Error),

    #[error("API error: {0}")]
    Api(String),
}

pub type Result<T> = std::result::Result<T, BackendError>;

/// A lazy sequence of output text fragments.
pub type FragmentStream = BoxStream<'static, Result<String>>;

/// Backend trait for text-generation providers.
///
/// A backend produces a sequence of text fragments for a prompt, either
/// incrementally (`stream_fragments`) or in one shot (`single_shot`), and
/// embeds text for similarity search. Implementations are immutable after
/// construction and safe to share across concurrent requests.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Short identifier used in logs.
    fn name(&self) -> &'static str;

    /// Whether the backend emits incremental fragments natively.
    fn supports_streaming(&self) -> bool;

    /// Native incremental fragment sequence for a prompt.
    ///
    /// The returned stream is finite and not restartable. Fragment order is
    /// the backend's emission order; concatenating all fragments yields the
    /// exact output text.
    fn stream_fragments(&self, prompt: &str) -> FragmentStream;

    /// Complete answer in a single call. Used by the engine when
    /// [`supports_streaming`](Backend::supports_streaming) is false.
    async fn single_shot(&self, prompt: &str) -> Result<String>;

    /// Generate an embedding vector for the given text.
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;
}

/// Probes candidate backends in priority order and binds the first one that
/// initializes: OpenAI (needs an API key), then Ollama (needs a reachable
/// local server). A failed candidate is skipped, never retried. When every
/// candidate fails the demo backend is bound, so `bind` itself cannot fail.
pub async fn bind(settings: &Settings) -> Arc<dyn Backend> {
    match OpenAiBackend::new(settings) {
        Ok(backend) => {
            info!(backend = backend.name(), model = %settings.openai_model, "using OpenAI backend");
            return Arc::new(backend);
        }
        Err(err) => {
            warn!(reason = "backend_unavailable", error = %err, "skipping OpenAI backend");
        }
    }

    match OllamaBackend::connect(settings).await {
        Ok(backend) => {
            info!(backend = backend.name(), model = %settings.ollama_model, "using Ollama backend");
            return Arc::new(backend);
        }
        Err(err) => {
            warn!(reason = "backend_unavailable", error = %err, "skipping Ollama backend");
        }
    }

    info!("no generation backend available, running in demo mode");
    Arc::new(DemoBackend::new(&settings.fallback_message))
}
