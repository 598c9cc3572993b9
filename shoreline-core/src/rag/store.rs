//! Vector store abstraction.
//!
//! One trait for document storage and similarity search, with an in-memory
//! implementation that snapshots itself to disk as JSON.

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;

const SNAPSHOT_FILE: &str = "store.json";

/// A document stored in the vector index: original text, its embedding, and
/// source metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub content: String,
    pub embedding: Vec<f32>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl Document {
    pub fn new(id: impl Into<String>, content: impl Into<String>, embedding: Vec<f32>) -> Self {
        Self {
            id: id.into(),
            content: content.into(),
            embedding,
            metadata: HashMap::new(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// A search hit, scored by cosine similarity (higher is closer).
#[derive(Debug, Clone)]
pub struct SearchResult {
    pub document: Document,
    pub score: f32,
}

/// Unified interface for vector index operations.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Adds documents to the index.
    async fn add(&self, documents: Vec<Document>) -> Result<()>;

    /// Returns up to `top_k` documents ranked by descending similarity.
    async fn search(&self, query_embedding: &[f32], top_k: usize) -> Result<Vec<SearchResult>>;

    /// Number of documents in the index.
    async fn count(&self) -> usize;

    /// Removes all documents.
    async fn clear(&self) -> Result<()>;

    /// Writes the index to its backing location, if it has one.
    async fn persist(&self) -> Result<()>;
}

/// In-memory vector index with an optional JSON snapshot on disk.
///
/// Scans are linear; this trades search speed for zero setup, which fits
/// the knowledge-base sizes this service ingests.
pub struct MemoryStore {
    documents: RwLock<Vec<Document>>,
    snapshot_path: Option<PathBuf>,
}

impl MemoryStore {
    /// A purely in-memory store with no snapshot.
    pub fn new() -> Self {
        Self {
            documents: RwLock::new(Vec::new()),
            snapshot_path: None,
        }
    }

    /// Opens a store backed by `dir`, loading an existing snapshot if one
    /// is present.
    pub async fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let snapshot_path = dir.as_ref().join(SNAPSHOT_FILE);
        let documents = if snapshot_path.exists() {
            let contents = tokio::fs::read_to_string(&snapshot_path).await?;
            serde_json::from_str(&contents)?
        } else {
            Vec::new()
        };

        Ok(Self {
            documents: RwLock::new(documents),
            snapshot_path: Some(snapshot_path),
        })
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl VectorStore for MemoryStore {
    async fn add(&self, mut documents: Vec<Document>) -> Result<()> {
        self.documents.write().await.append(&mut documents);
        Ok(())
    }

    async fn search(&self, query_embedding: &[f32], top_k: usize) -> Result<Vec<SearchResult>> {
        let documents = self.documents.read().await;

        let mut results: Vec<SearchResult> = documents
            .iter()
            .filter_map(|document| {
                cosine_similarity(query_embedding, &document.embedding).map(|score| SearchResult {
                    document: document.clone(),
                    score,
                })
            })
            .collect();

        results.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        results.truncate(top_k);
        Ok(results)
    }

    async fn count(&self) -> usize {
        self.documents.read().await.len()
    }

    async fn clear(&self) -> Result<()> {
        self.documents.write().await.clear();
        Ok(())
    }

    async fn persist(&self) -> Result<()> {
        let Some(path) = &self.snapshot_path else {
            return Ok(());
        };
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let documents = self.documents.read().await;
        let contents = serde_json::to_string(&*documents)?;
        tokio::fs::write(path, contents).await?;
        Ok(())
    }
}

/// Cosine similarity of two vectors; `None` on dimension mismatch or a
/// zero-norm operand.
fn cosine_similarity(a: &[f32], b: &[f32]) -> Option<f32> {
    if a.len() != b.len() || a.is_empty() {
        return None;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return None;
    }
    Some(dot / (norm_a * norm_b))
}
