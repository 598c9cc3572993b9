//! Retrieval: vector index, chunking, ingestion, and query-time search.
//!
//! The retriever embeds text through the same backend capability that
//! answers chats, stores chunk embeddings in a [`VectorStore`], and returns
//! ranked text fragments for prompt augmentation.

pub mod chunker;
pub mod store;

pub use store::{Document, MemoryStore, SearchResult, VectorStore};

use crate::backend::{Backend, BackendError};
use crate::config::Settings;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum RetrievalError {
    #[error("embedding failed: {0}")]
    Embedding(#[from] BackendError),

    #[error("vector store error: {0}")]
    Store(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, RetrievalError>;

/// Similarity-search collaborator: embeds queries and returns ranked text
/// fragments from the knowledge base.
#[derive(Clone)]
pub struct Retriever {
    backend: Arc<dyn Backend>,
    store: Arc<dyn VectorStore>,
    chunk_size: usize,
    chunk_overlap: usize,
    top_k: usize,
}

impl Retriever {
    pub fn new(backend: Arc<dyn Backend>, store: Arc<dyn VectorStore>, settings: &Settings) -> Self {
        Self {
            backend,
            store,
            chunk_size: settings.chunk_size,
            chunk_overlap: settings.chunk_overlap,
            top_k: settings.top_k,
        }
    }

    /// Configured number of fragments to retrieve per query.
    pub fn top_k(&self) -> usize {
        self.top_k
    }

    /// Number of chunks in the knowledge base.
    pub async fn count(&self) -> usize {
        self.store.count().await
    }

    /// Returns up to `k` text fragments ranked by similarity to `query`.
    pub async fn search(&self, query: &str, k: usize) -> Result<Vec<String>> {
        let query_embedding = self.backend.embed(query).await?;

        let results = self
            .store
            .search(&query_embedding, k)
            .await
            .map_err(|e| RetrievalError::Store(e.to_string()))?;

        debug!(hits = results.len(), "vector search complete");
        Ok(results
            .into_iter()
            .map(|result| result.document.content)
            .collect())
    }

    /// Ingests every `*.txt` file under `data_dir`: chunk, embed, store,
    /// snapshot. Replaces the previous index contents. Returns the number
    /// of chunks ingested.
    pub async fn ingest_dir(&self, data_dir: &Path) -> Result<usize> {
        let mut chunk_count = 0;
        let mut documents = Vec::new();

        let mut entries = tokio::fs::read_dir(data_dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("txt") {
                continue;
            }
            let Ok(content) = tokio::fs::read_to_string(&path).await else {
                continue;
            };

            let source = path.to_string_lossy().to_string();
            for (i, chunk) in chunker::chunk_text(&content, self.chunk_size, self.chunk_overlap)
                .into_iter()
                .enumerate()
            {
                let embedding = self.backend.embed(&chunk).await?;
                let id = format!("{source}_chunk_{i}");
                documents.push(
                    Document::new(id, chunk, embedding)
                        .with_metadata("source", &source)
                        .with_metadata("chunk", i.to_string()),
                );
                chunk_count += 1;
            }
        }

        self.store
            .clear()
            .await
            .map_err(|e| RetrievalError::Store(e.to_string()))?;
        self.store
            .add(documents)
            .await
            .map_err(|e| RetrievalError::Store(e.to_string()))?;
        self.store
            .persist()
            .await
            .map_err(|e| RetrievalError::Store(e.to_string()))?;

        info!(chunks = chunk_count, dir = %data_dir.display(), "ingestion complete");
        Ok(chunk_count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::DemoBackend;

    fn test_retriever(store: Arc<dyn VectorStore>) -> Retriever {
        let settings = Settings::default();
        Retriever::new(
            Arc::new(DemoBackend::new(&settings.fallback_message)),
            store,
            &settings,
        )
    }

    #[tokio::test]
    async fn ingest_then_search_returns_relevant_fragments() {
        let data_dir = tempfile::tempdir().unwrap();
        tokio::fs::write(
            data_dir.path().join("beaches.txt"),
            "Leadbetter Beach is popular for surfing lessons.",
        )
        .await
        .unwrap();
        tokio::fs::write(
            data_dir.path().join("notes.md"),
            "ignored: not a txt file",
        )
        .await
        .unwrap();

        let retriever = test_retriever(Arc::new(MemoryStore::new()));
        let ingested = retriever.ingest_dir(data_dir.path()).await.unwrap();
        assert_eq!(ingested, 1);

        let fragments = retriever.search("surfing lessons", 3).await.unwrap();
        assert_eq!(fragments.len(), 1);
        assert!(fragments[0].contains("surfing"));
    }

    #[tokio::test]
    async fn reingest_replaces_previous_contents() {
        let data_dir = tempfile::tempdir().unwrap();
        tokio::fs::write(data_dir.path().join("a.txt"), "first version")
            .await
            .unwrap();

        let retriever = test_retriever(Arc::new(MemoryStore::new()));
        retriever.ingest_dir(data_dir.path()).await.unwrap();
        retriever.ingest_dir(data_dir.path()).await.unwrap();

        assert_eq!(retriever.count().await, 1);
    }

    #[tokio::test]
    async fn ingest_persists_a_snapshot() {
        let data_dir = tempfile::tempdir().unwrap();
        let db_dir = tempfile::tempdir().unwrap();
        tokio::fs::write(data_dir.path().join("a.txt"), "snapshot me")
            .await
            .unwrap();

        let store = Arc::new(MemoryStore::open(db_dir.path()).await.unwrap());
        let retriever = test_retriever(store);
        retriever.ingest_dir(data_dir.path()).await.unwrap();

        let reloaded = MemoryStore::open(db_dir.path()).await.unwrap();
        assert_eq!(reloaded.count().await, 1);
    }
}
