//! OpenAI backend for the remote key-based service.
//!
//! Streams chat completions over server-sent events and generates
//! embeddings through the embeddings endpoint.

use super::{Backend, BackendError, FragmentStream, Result};
use crate::config::Settings;
use async_trait::async_trait;
use futures::StreamExt;
use serde::{Deserialize, Serialize};

/// Backend talking to the OpenAI API (or any API-compatible service).
#[derive(Debug, Clone)]
pub struct OpenAiBackend {
    api_key: String,
    base_url: String,
    model: String,
    embedding_model: String,
    http_client: reqwest::Client,
}

impl OpenAiBackend {
    /// Creates the backend from settings.
    ///
    /// Fails with [`BackendError::Unavailable`] when no API key is
    /// configured; no network call is made here.
    pub fn new(settings: &Settings) -> Result<Self> {
        let api_key = settings
            .openai_api_key
            .clone()
            .filter(|key| !key.is_empty())
            .ok_or_else(|| {
                BackendError::Unavailable("OPENAI_API_KEY is not configured".to_string())
            })?;

        Ok(Self {
            api_key,
            base_url: settings.openai_base_url.clone(),
            model: settings.openai_model.clone(),
            embedding_model: settings.openai_embedding_model.clone(),
            http_client: reqwest::Client::new(),
        })
    }

    fn chat_request(&self, prompt: &str, stream: bool) -> ChatCompletionRequest {
        ChatCompletionRequest {
            model: self.model.clone(),
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: prompt.to_string(),
            }],
            stream,
        }
    }
}

#[async_trait]
impl Backend for OpenAiBackend {
    fn name(&self) -> &'static str {
        "openai"
    }

    fn supports_streaming(&self) -> bool {
        true
    }

    fn stream_fragments(&self, prompt: &str) -> FragmentStream {
        let url = format!("{}/chat/completions", self.base_url);
        let request = self.chat_request(prompt, true);
        let client = self.http_client.clone();
        let api_key = self.api_key.clone();

        Box::pin(async_stream::try_stream! {
            let response = client
                .post(&url)
                .bearer_auth(&api_key)
                .json(&request)
                .send()
                .await?;

            if !response.status().is_success() {
                let error_text = response.text().await?;
                Err(BackendError::Api(error_text))?;
                return;
            }

            let mut body = response.bytes_stream();
            let mut buffer = Vec::new();

            'events: while let Some(chunk) = body.next().await {
                let chunk = chunk?;
                buffer.extend_from_slice(&chunk);

                while let Some(newline_pos) = buffer.iter().position(|&b| b == b'\n') {
                    let line = buffer.drain(..=newline_pos).collect::<Vec<_>>();
                    let line_str = String::from_utf8_lossy(&line[..line.len() - 1]);
                    let line_str = line_str.trim_end_matches('\r');

                    let Some(data) = line_str.strip_prefix("data:") else {
                        continue;
                    };
                    let data = data.trim_start();

                    if data == "[DONE]" {
                        break 'events;
                    }

                    let parsed: StreamChunk = serde_json::from_str(data)?;
                    let delta = parsed
                        .choices
                        .into_iter()
                        .next()
                        .and_then(|choice| choice.delta.content);

                    if let Some(content) = delta {
                        if !content.is_empty() {
                            yield content;
                        }
                    }
                }
            }
        })
    }

    async fn single_shot(&self, prompt: &str) -> Result<String> {
        let url = format!("{}/chat/completions", self.base_url);
        let request = self.chat_request(prompt, false);

        let response = self
            .http_client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let error_text = response.text().await?;
            return Err(BackendError::Api(error_text));
        }

        let completion = response.json::<ChatCompletion>().await?;
        let content = completion
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .unwrap_or_default();

        Ok(content)
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let url = format!("{}/embeddings", self.base_url);

        let request = EmbeddingRequest {
            model: self.embedding_model.clone(),
            input: text.to_string(),
        };

        let response = self
            .http_client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let error_text = response.text().await?;
            return Err(BackendError::Api(error_text));
        }

        let embed_response = response.json::<EmbeddingResponse>().await?;

        embed_response
            .data
            .into_iter()
            .next()
            .map(|item| item.embedding)
            .ok_or_else(|| BackendError::Api("no embeddings returned".to_string()))
    }
}

// OpenAI wire types (internal)

#[derive(Debug, Clone, Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<ChatMessage>,
    stream: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Clone, Deserialize)]
struct StreamChunk {
    choices: Vec<StreamChoice>,
}

#[derive(Debug, Clone, Deserialize)]
struct StreamChoice {
    delta: StreamDelta,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct StreamDelta {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct ChatCompletion {
    choices: Vec<CompletionChoice>,
}

#[derive(Debug, Clone, Deserialize)]
struct CompletionChoice {
    message: ChatMessage,
}

#[derive(Debug, Clone, Serialize)]
struct EmbeddingRequest {
    model: String,
    input: String,
}

#[derive(Debug, Clone, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingItem>,
}

#[derive(Debug, Clone, Deserialize)]
struct EmbeddingItem {
    embedding: Vec<f32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_requires_an_api_key() {
        let mut settings = Settings::default();
        settings.openai_api_key = None;
        assert!(matches!(
            OpenAiBackend::new(&settings),
            Err(BackendError::Unavailable(_))
        ));

        settings.openai_api_key = Some(String::new());
        assert!(OpenAiBackend::new(&settings).is_err());

        settings.openai_api_key = Some("sk-test".to_string());
        assert!(OpenAiBackend::new(&settings).is_ok());
    }
}
