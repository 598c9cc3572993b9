//! Deterministic echo backend used when no real provider is available.

use super::{Backend, FragmentStream, Result};
use async_trait::async_trait;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

const EMBEDDING_DIM: usize = 64;

/// Last-resort backend that echoes the prompt.
///
/// Never fails, which makes it usable both as the binding of last resort and
/// as the substitute when a real backend dies mid-stream. Output is emitted
/// character by character, matching the granularity callers already handle.
#[derive(Debug, Clone)]
pub struct DemoBackend {
    fallback_message: String,
}

impl DemoBackend {
    pub fn new(fallback_message: impl Into<String>) -> Self {
        Self {
            fallback_message: fallback_message.into(),
        }
    }

    /// The fixed response for an empty prompt.
    pub fn fallback_message(&self) -> &str {
        &self.fallback_message
    }

    fn demo_text(&self, prompt: &str) -> String {
        if prompt.is_empty() {
            self.fallback_message.clone()
        } else {
            format!("(demo) You said: {prompt}")
        }
    }
}

#[async_trait]
impl Backend for DemoBackend {
    fn name(&self) -> &'static str {
        "demo"
    }

    fn supports_streaming(&self) -> bool {
        true
    }

    fn stream_fragments(&self, prompt: &str) -> FragmentStream {
        let fragments: Vec<Result<String>> = self
            .demo_text(prompt)
            .chars()
            .map(|c| Ok(c.to_string()))
            .collect();
        Box::pin(futures::stream::iter(fragments))
    }

    async fn single_shot(&self, prompt: &str) -> Result<String> {
        Ok(self.demo_text(prompt))
    }

    /// Deterministic bag-of-words embedding. Not semantically meaningful,
    /// but stable across runs so retrieval stays exercisable offline.
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut embedding = vec![0.0f32; EMBEDDING_DIM];
        for word in text.split_whitespace() {
            let mut hasher = DefaultHasher::new();
            word.to_lowercase().hash(&mut hasher);
            embedding[(hasher.finish() % EMBEDDING_DIM as u64) as usize] += 1.0;
        }
        let norm = embedding.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut embedding {
                *v /= norm;
            }
        }
        Ok(embedding)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    #[tokio::test]
    async fn empty_prompt_streams_the_fallback_message() {
        let backend = DemoBackend::new("demo mode");
        let fragments: Vec<_> = backend
            .stream_fragments("")
            .map(|f| f.unwrap())
            .collect()
            .await;
        assert_eq!(fragments.concat(), "demo mode");
    }

    #[tokio::test]
    async fn prompt_is_echoed_with_prefix() {
        let backend = DemoBackend::new("demo mode");
        let reply = backend.single_shot("hello").await.unwrap();
        assert_eq!(reply, "(demo) You said: hello");
    }

    #[tokio::test]
    async fn embeddings_are_deterministic_and_normalized() {
        let backend = DemoBackend::new("demo mode");
        let a = backend.embed("santa barbara beaches").await.unwrap();
        let b = backend.embed("santa barbara beaches").await.unwrap();
        assert_eq!(a, b);
        let norm = a.iter().map(|v| v * v).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }
}
