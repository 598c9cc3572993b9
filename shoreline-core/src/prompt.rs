//! Prompt augmentation with retrieved context.

use crate::rag::Retriever;
use tracing::warn;

/// Returns the message wrapped with retrieved context, or the raw message
/// when no retriever is configured, the knowledge base is empty, or the
/// search fails. Retrieval failures are logged and swallowed; augmentation
/// must never block an answer.
pub async fn build_prompt(message: &str, retriever: Option<&Retriever>) -> String {
    let Some(retriever) = retriever else {
        return message.to_owned();
    };
    if retriever.count().await == 0 {
        return message.to_owned();
    }

    match retriever.search(message, retriever.top_k()).await {
        Ok(fragments) if !fragments.is_empty() => {
            format!(
                "Context:\n{}\n\nUser: {}\nAssistant:",
                fragments.join("\n\n"),
                message
            )
        }
        Ok(_) => message.to_owned(),
        Err(err) => {
            warn!(error = %err, "vector search failed, using raw message");
            message.to_owned()
        }
    }
}
