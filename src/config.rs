//! Carga y gestión de configuración de la aplicación (vector store + LLM + pipeline).

use std::env;
use std::str::FromStr;

use anyhow::{anyhow, Context, Result};

use crate::chunker::ChunkerConfig;
use crate::vfs::DEFAULT_EXCLUDED_DIRS;

#[derive(Clone, Debug)]
pub enum LlmProvider {
    OpenAI,
    Gemini,
    Ollama,
}

impl LlmProvider {
    pub fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "openai" => Ok(Self::OpenAI),
            "gemini" => Ok(Self::Gemini),
            "ollama" => Ok(Self::Ollama),
            other => Err(anyhow!("Proveedor LLM no soportado: {other}")),
        }
    }
}

/// Dónde se guardan los vectores.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum VectorBackend {
    Memory,
    Neo4j,
}

impl VectorBackend {
    pub fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "memory" => Ok(Self::Memory),
            "neo4j" => Ok(Self::Neo4j),
            other => Err(anyhow!("Backend vectorial no soportado: {other}")),
        }
    }
}

#[derive(Clone, Debug)]
pub struct Neo4jConfig {
    pub uri: String,
    pub user: String,
    pub password: String,
}

/// Configuración completa de la aplicación.
#[derive(Clone, Debug)]
pub struct AppConfig {
    pub server_addr: String,
    pub open_browser: bool,

    pub vector_backend: VectorBackend,
    pub neo4j: Option<Neo4jConfig>,

    pub llm_provider: LlmProvider,
    pub llm_embedding_model: String,
    pub llm_chat_model: String,
    pub llm_temperature: f64,

    pub chunker: ChunkerConfig,
    pub embed_batch_size: usize,
    pub retrieval_top_k: usize,
    pub max_display_file_bytes: u64,
    pub excluded_dirs: Vec<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server_addr: "127.0.0.1:3322".to_string(),
            open_browser: true,
            vector_backend: VectorBackend::Memory,
            neo4j: None,
            llm_provider: LlmProvider::OpenAI,
            llm_embedding_model: "text-embedding-3-small".to_string(),
            llm_chat_model: "gpt-4o-mini".to_string(),
            llm_temperature: 0.3,
            chunker: ChunkerConfig::default(),
            embed_batch_size: 64,
            retrieval_top_k: 12,
            max_display_file_bytes: 10 * 1024 * 1024,
            excluded_dirs: DEFAULT_EXCLUDED_DIRS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

fn parse_var<T: FromStr>(name: &str, default: T) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|e| anyhow!("Valor no válido para {name} ('{raw}'): {e}")),
        Err(_) => Ok(default),
    }
}

impl AppConfig {
    /// Carga la configuración desde variables de entorno (usando .env si existe).
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        let server_addr = env::var("SERVER_ADDR").unwrap_or(defaults.server_addr);
        let open_browser = parse_var("OPEN_BROWSER", defaults.open_browser)?;

        let vector_backend =
            VectorBackend::from_str(&env::var("VECTOR_BACKEND").unwrap_or_else(|_| "memory".into()))?;
        let neo4j = if vector_backend == VectorBackend::Neo4j {
            Some(Neo4jConfig {
                uri: env::var("NEO4J_URI").context("Falta NEO4J_URI en el entorno")?,
                user: env::var("NEO4J_USER").context("Falta NEO4J_USER en el entorno")?,
                password: env::var("NEO4J_PASSWORD")
                    .context("Falta NEO4J_PASSWORD en el entorno")?,
            })
        } else {
            None
        };

        let llm_provider_str =
            env::var("LLM_PROVIDER").unwrap_or_else(|_| "openai".to_string());
        let llm_provider = LlmProvider::from_str(&llm_provider_str)?;

        let llm_embedding_model =
            env::var("LLM_EMBEDDING_MODEL").unwrap_or(defaults.llm_embedding_model);
        let llm_chat_model = env::var("LLM_CHAT_MODEL").unwrap_or(defaults.llm_chat_model);
        let llm_temperature = parse_var("LLM_TEMPERATURE", defaults.llm_temperature)?;

        let chunker = ChunkerConfig {
            chunk_size: parse_var("CHUNK_SIZE", defaults.chunker.chunk_size)?,
            chunk_overlap: parse_var("CHUNK_OVERLAP", defaults.chunker.chunk_overlap)?,
            max_file_bytes: parse_var("MAX_INDEX_FILE_BYTES", defaults.chunker.max_file_bytes)?,
        };
        chunker.validate()?;

        let embed_batch_size = parse_var("EMBED_BATCH_SIZE", defaults.embed_batch_size)?.max(1);
        let retrieval_top_k = parse_var("RETRIEVAL_TOP_K", defaults.retrieval_top_k)?.max(1);
        let max_display_file_bytes =
            parse_var("MAX_DISPLAY_FILE_BYTES", defaults.max_display_file_bytes)?;

        let excluded_dirs = match env::var("EXCLUDED_DIRS") {
            Ok(raw) => raw
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect(),
            Err(_) => defaults.excluded_dirs,
        };

        Ok(Self {
            server_addr,
            open_browser,
            vector_backend,
            neo4j,
            llm_provider,
            llm_embedding_model,
            llm_chat_model,
            llm_temperature,
            chunker,
            embed_batch_size,
            retrieval_top_k,
            max_display_file_bytes,
            excluded_dirs,
        })
    }
}
