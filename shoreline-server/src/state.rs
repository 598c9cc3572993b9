//! Shared application state.

use shoreline_core::{Backend, ChatEngine, MemoryStore, Retriever, Settings};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{info, warn};

/// State shared by all request handlers.
///
/// The engine and backend binding are immutable for the process lifetime;
/// the retriever is swapped atomically after a successful `/ingest`.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<ChatEngine>,
    pub backend: Arc<dyn Backend>,
    pub retriever: Arc<RwLock<Option<Retriever>>>,
    pub settings: Arc<Settings>,
    pub http_client: reqwest::Client,
}

impl AppState {
    /// Binds a backend per the fallback selector and builds the state.
    pub async fn initialize(settings: Settings) -> Self {
        let backend = shoreline_core::bind(&settings).await;
        Self::with_backend(settings, backend).await
    }

    /// Builds the state around an already-bound backend.
    pub async fn with_backend(settings: Settings, backend: Arc<dyn Backend>) -> Self {
        let engine = Arc::new(ChatEngine::with_backend(
            Arc::clone(&backend),
            &settings.fallback_message,
        ));
        let retriever = load_retriever(Arc::clone(&backend), &settings).await;

        Self {
            engine,
            backend,
            retriever: Arc::new(RwLock::new(retriever)),
            settings: Arc::new(settings),
            http_client: reqwest::Client::new(),
        }
    }
}

/// Loads the vector index from disk when one exists. Failures leave the
/// service running without retrieval rather than refusing to start.
async fn load_retriever(backend: Arc<dyn Backend>, settings: &Settings) -> Option<Retriever> {
    if !settings.vector_db_dir.exists() {
        return None;
    }
    match MemoryStore::open(&settings.vector_db_dir).await {
        Ok(store) => {
            info!(dir = %settings.vector_db_dir.display(), "loaded vector DB");
            Some(Retriever::new(backend, Arc::new(store), settings))
        }
        Err(err) => {
            warn!(error = %err, "vector DB unavailable");
            None
        }
    }
}
