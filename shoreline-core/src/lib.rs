//! shoreline-core - generation dispatch and streaming engine
//!
//! Provides the pieces the Shoreline chat backend is built from:
//! - Backend capability abstraction (OpenAI, Ollama, demo echo) and the
//!   fallback selector that binds one at construction
//! - Token stream engine with deadline enforcement and silent degradation
//! - Producer/consumer bridge delivering fragments to async callers
//! - Retrieval (vector index, chunking, ingestion) and prompt augmentation
//! - Configuration loading
//!
//! The HTTP surface lives in `shoreline-server`; this crate has no
//! transport concerns.

pub mod backend;
pub mod config;
pub mod engine;
pub mod prompt;
pub mod rag;

pub use backend::{bind, Backend, BackendError, DemoBackend, OllamaBackend, OpenAiBackend};
pub use config::Settings;
pub use engine::{ChatEngine, TokenStream};
pub use prompt::build_prompt;
pub use rag::{MemoryStore, Retriever, VectorStore};
