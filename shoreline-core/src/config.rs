use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_yaml::Error),
}

pub type Result<T> = std::result::Result<T, ConfigError>;

const DEFAULT_FALLBACK_MESSAGE: &str =
    "The assistant is running in demo mode. Configure OPENAI_API_KEY for real answers.";

/// Application configuration.
///
/// Values come from three layers, later ones winning: built-in defaults, an
/// optional `config.yaml`, and environment variables.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// API key for the remote backend. Unset means the candidate is skipped.
    pub openai_api_key: Option<String>,
    pub openai_model: String,
    pub openai_base_url: String,
    pub openai_embedding_model: String,

    pub ollama_model: String,
    pub ollama_base_url: String,
    pub ollama_embedding_model: String,

    /// Fixed response used when no real backend is available or usable.
    pub fallback_message: String,
    /// Wall-clock budget for one generation, in seconds.
    pub generation_timeout_secs: f64,

    pub vector_db_dir: PathBuf,
    pub data_dir: PathBuf,
    pub top_k: usize,
    pub chunk_size: usize,
    pub chunk_overlap: usize,

    pub server_host: String,
    pub server_port: u16,
    pub cors_origins: String,
    pub log_level: String,
    pub scrape_timeout_secs: f64,
    pub scrape_max_bytes: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            openai_api_key: None,
            openai_model: "gpt-3.5-turbo".to_string(),
            openai_base_url: "https://api.openai.com/v1".to_string(),
            openai_embedding_model: "text-embedding-3-small".to_string(),
            ollama_model: "llama2".to_string(),
            ollama_base_url: "http://localhost:11434".to_string(),
            ollama_embedding_model: "nomic-embed-text".to_string(),
            fallback_message: DEFAULT_FALLBACK_MESSAGE.to_string(),
            generation_timeout_secs: 30.0,
            vector_db_dir: PathBuf::from("vector_db"),
            data_dir: PathBuf::from("data/santa_barbara"),
            top_k: 3,
            chunk_size: 500,
            chunk_overlap: 50,
            server_host: "0.0.0.0".to_string(),
            server_port: 5000,
            cors_origins: "*".to_string(),
            log_level: "info".to_string(),
            scrape_timeout_secs: 10.0,
            scrape_max_bytes: 100_000,
        }
    }
}

impl Settings {
    /// Load configuration from a YAML file, then apply environment overrides.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let mut settings: Settings = serde_yaml::from_str(&contents)?;
        settings.apply_env();
        Ok(settings)
    }

    /// Load `config.yaml` if it exists, otherwise start from defaults.
    /// Environment overrides are applied either way.
    pub fn load_or_default() -> Self {
        Self::load("config.yaml").unwrap_or_else(|_| {
            let mut settings = Self::default();
            settings.apply_env();
            settings
        })
    }

    fn apply_env(&mut self) {
        if let Ok(value) = env::var("OPENAI_API_KEY") {
            if !value.is_empty() {
                self.openai_api_key = Some(value);
            }
        }
        set_string(&mut self.openai_model, "OPENAI_MODEL");
        set_string(&mut self.openai_base_url, "OPENAI_BASE_URL");
        set_string(&mut self.ollama_model, "OLLAMA_MODEL");
        set_string(&mut self.ollama_base_url, "OLLAMA_BASE_URL");
        set_string(&mut self.fallback_message, "FALLBACK_MESSAGE");
        set_string(&mut self.server_host, "SERVER_HOST");
        set_string(&mut self.cors_origins, "CORS_ORIGINS");
        set_string(&mut self.log_level, "LOG_LEVEL");
        set_path(&mut self.vector_db_dir, "VECTOR_DB_DIR");
        set_path(&mut self.data_dir, "DATA_DIR");
        set_parsed(&mut self.server_port, "SERVER_PORT");
        set_parsed(&mut self.generation_timeout_secs, "GENERATION_TIMEOUT");
        set_parsed(&mut self.scrape_timeout_secs, "SCRAPE_TIMEOUT");
        set_parsed(&mut self.scrape_max_bytes, "SCRAPE_MAX_BYTES");
        set_parsed(&mut self.top_k, "TOP_K");
    }

    /// The generation deadline as a [`Duration`].
    pub fn generation_deadline(&self) -> Duration {
        Duration::from_secs_f64(self.generation_timeout_secs.max(0.0))
    }

    /// The scrape timeout as a [`Duration`].
    pub fn scrape_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.scrape_timeout_secs.max(0.0))
    }

    /// CORS origins parsed from the comma-separated `cors_origins` value.
    pub fn allowed_origins(&self) -> Vec<String> {
        self.cors_origins
            .split(',')
            .map(str::trim)
            .filter(|origin| !origin.is_empty())
            .map(str::to_string)
            .collect()
    }
}

fn set_string(field: &mut String, var: &str) {
    if let Ok(value) = env::var(var) {
        if !value.is_empty() {
            *field = value;
        }
    }
}

fn set_path(field: &mut PathBuf, var: &str) {
    if let Ok(value) = env::var(var) {
        if !value.is_empty() {
            *field = PathBuf::from(value);
        }
    }
}

fn set_parsed<T: std::str::FromStr>(field: &mut T, var: &str) {
    if let Ok(value) = env::var(var) {
        if let Ok(parsed) = value.parse() {
            *field = parsed;
        }
    }
}
