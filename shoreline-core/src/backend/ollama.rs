//! Ollama backend for locally-served models.
//!
//! Talks to an Ollama server over its HTTP API, streaming chat completions
//! as newline-delimited JSON.

use super::{Backend, BackendError, FragmentStream, Result};
use crate::config::Settings;
use async_trait::async_trait;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const PROBE_TIMEOUT: Duration = Duration::from_secs(2);

/// Backend served by a local Ollama instance.
#[derive(Debug, Clone)]
pub struct OllamaBackend {
    base_url: String,
    model: String,
    embedding_model: String,
    http_client: reqwest::Client,
}

impl OllamaBackend {
    /// Connects to the configured Ollama server, probing it once.
    ///
    /// Fails with [`BackendError::Unavailable`] when the server does not
    /// answer, so the selector can move on to the next candidate.
    pub async fn connect(settings: &Settings) -> Result<Self> {
        let http_client = reqwest::Client::new();
        let probe_url = format!("{}/api/tags", settings.ollama_base_url);

        let response = http_client
            .get(&probe_url)
            .timeout(PROBE_TIMEOUT)
            .send()
            .await
            .map_err(|e| {
                BackendError::Unavailable(format!(
                    "Ollama server unreachable at {}: {e}",
                    settings.ollama_base_url
                ))
            })?;

        if !response.status().is_success() {
            return Err(BackendError::Unavailable(format!(
                "Ollama server at {} answered with status {}",
                settings.ollama_base_url,
                response.status()
            )));
        }

        Ok(Self {
            base_url: settings.ollama_base_url.clone(),
            model: settings.ollama_model.clone(),
            embedding_model: settings.ollama_embedding_model.clone(),
            http_client,
        })
    }

    fn chat_request(&self, prompt: &str, stream: bool) -> OllamaChatRequest {
        OllamaChatRequest {
            model: self.model.clone(),
            messages: vec![OllamaMessage {
                role: "user".to_string(),
                content: prompt.to_string(),
            }],
            stream,
        }
    }
}

#[async_trait]
impl Backend for OllamaBackend {
    fn name(&self) -> &'static str {
        "ollama"
    }

    fn supports_streaming(&self) -> bool {
        true
    }

    fn stream_fragments(&self, prompt: &str) -> FragmentStream {
        let url = format!("{}/api/chat", self.base_url);
        let request = self.chat_request(prompt, true);
        let client = self.http_client.clone();

        Box::pin(async_stream::try_stream! {
            let response = client.post(&url).json(&request).send().await?;

            if !response.status().is_success() {
                let error_text = response.text().await?;
                Err(BackendError::Api(error_text))?;
                return;
            }

            let mut body = response.bytes_stream();
            let mut buffer = Vec::new();

            'chunks: while let Some(chunk) = body.next().await {
                let chunk = chunk?;
                buffer.extend_from_slice(&chunk);

                while let Some(newline_pos) = buffer.iter().position(|&b| b == b'\n') {
                    let line = buffer.drain(..=newline_pos).collect::<Vec<_>>();

                    if line.len() <= 1 {
                        continue;
                    }

                    let line_str = String::from_utf8_lossy(&line[..line.len() - 1]);
                    let parsed: OllamaChatResponse = serde_json::from_str(&line_str)?;

                    if !parsed.message.content.is_empty() {
                        yield parsed.message.content;
                    }
                    if parsed.done {
                        break 'chunks;
                    }
                }
            }
        })
    }

    async fn single_shot(&self, prompt: &str) -> Result<String> {
        let url = format!("{}/api/chat", self.base_url);
        let request = self.chat_request(prompt, false);

        let response = self.http_client.post(&url).json(&request).send().await?;

        if !response.status().is_success() {
            let error_text = response.text().await?;
            return Err(BackendError::Api(error_text));
        }

        let parsed = response.json::<OllamaChatResponse>().await?;
        Ok(parsed.message.content)
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let url = format!("{}/api/embed", self.base_url);

        let request = OllamaEmbedRequest {
            model: self.embedding_model.clone(),
            input: text.to_string(),
        };

        let response = self.http_client.post(&url).json(&request).send().await?;

        if !response.status().is_success() {
            let error_text = response.text().await?;
            return Err(BackendError::Api(error_text));
        }

        let embed_response = response.json::<OllamaEmbedResponse>().await?;

        embed_response
            .embeddings
            .into_iter()
            .next()
            .ok_or_else(|| BackendError::Api("no embeddings returned".to_string()))
    }
}

// Ollama wire types (internal)

#[derive(Debug, Clone, Serialize)]
struct OllamaChatRequest {
    model: String,
    messages: Vec<OllamaMessage>,
    stream: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct OllamaMessage {
    role: String,
    content: String,
}

#[derive(Debug, Clone, Deserialize)]
struct OllamaChatResponse {
    message: OllamaMessage,
    #[serde(default)]
    done: bool,
}

#[derive(Debug, Clone, Serialize)]
struct OllamaEmbedRequest {
    model: String,
    input: String,
}

#[derive(Debug, Clone, Deserialize)]
struct OllamaEmbedResponse {
    #[serde(default)]
    embeddings: Vec<Vec<f32>>,
}
