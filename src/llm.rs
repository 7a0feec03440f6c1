//! Abstracción sobre Rig para trabajar con distintos proveedores de LLM.
//! De momento se implementa OpenAI; Gemini/Ollama quedan preparados para el futuro.
//!
//! El pipeline sólo conoce los traits [`Embedder`] y [`ChatModel`]; así el
//! indexado y la consulta comparten siempre el mismo modelo de embeddings.

use crate::config::{AppConfig, LlmProvider};
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use rig::completion::Prompt;
use rig::embeddings::EmbeddingModel; // <- para .embed_texts
use tracing::debug;

/// Colaborador que convierte textos en vectores de dimensión fija.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Identificador del modelo; se guarda junto a cada namespace.
    fn model_id(&self) -> &str;

    /// Un vector por texto, en el mismo orden.
    async fn embed(&self, texts: Vec<String>) -> Result<Vec<Vec<f64>>>;
}

/// Colaborador de generación de texto.
#[async_trait]
pub trait ChatModel: Send + Sync {
    async fn complete(&self, preamble: &str, prompt: &str) -> Result<String>;
}

/// Gestor de LLMs y embeddings.
#[derive(Debug, Clone)]
pub struct LlmManager {
    pub provider: LlmProvider,
    pub embedding_model: String,
    pub chat_model: String,
    pub temperature: f64,
}

impl LlmManager {
    /// Construye el manager a partir de la configuración.
    pub fn from_config(cfg: &AppConfig) -> Result<Self> {
        Ok(Self {
            provider: cfg.llm_provider.clone(),
            embedding_model: cfg.llm_embedding_model.clone(),
            chat_model: cfg.llm_chat_model.clone(),
            temperature: cfg.llm_temperature,
        })
    }

    // ---------------------------------------------------------------------
    // EMBEDDINGS
    // ---------------------------------------------------------------------

    async fn embed_with_openai(&self, texts: Vec<String>) -> Result<Vec<Vec<f64>>> {
        use rig::providers::openai::{self, TEXT_EMBEDDING_3_SMALL};
        // Trait para client.embedding_model(...)
        use rig::client::EmbeddingsClient as _;

        let client = openai::Client::from_env();

        // Modelo de embeddings: config o default
        let model_name = if self.embedding_model.is_empty() {
            TEXT_EMBEDDING_3_SMALL
        } else {
            self.embedding_model.as_str()
        };

        let embedding_model = client.embedding_model(model_name);
        let expected = texts.len();
        let embeddings = embedding_model.embed_texts(texts).await?;

        if embeddings.len() != expected {
            return Err(anyhow!(
                "Número de embeddings ({}) distinto al número de textos ({})",
                embeddings.len(),
                expected
            ));
        }

        Ok(embeddings.into_iter().map(|emb| emb.vec).collect())
    }

    // ---------------------------------------------------------------------
    // CHAT / COMPLETION
    // ---------------------------------------------------------------------

    async fn complete_with_openai(&self, preamble: &str, prompt: &str) -> Result<String> {
        use rig::providers::openai;
        // Trait para client.agent(...)
        use rig::client::CompletionClient as _;

        let client = openai::Client::from_env();

        // Modelo de chat por defecto si no se ha configurado otro
        let model_name = if self.chat_model.is_empty() {
            "gpt-4o-mini"
        } else {
            self.chat_model.as_str()
        };

        let agent = client
            .agent(model_name)
            .preamble(preamble)
            .temperature(self.temperature)
            .build();

        let answer = agent.prompt(prompt).await?;
        Ok(answer)
    }
}

#[async_trait]
impl Embedder for LlmManager {
    fn model_id(&self) -> &str {
        &self.embedding_model
    }

    /// Nota: sólo implementado para OpenAI. Para otros proveedores
    /// se podrían añadir ramas adicionales al `match`.
    async fn embed(&self, texts: Vec<String>) -> Result<Vec<Vec<f64>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        debug!("Calculando {} embeddings con {}", texts.len(), self.embedding_model);
        match self.provider {
            LlmProvider::OpenAI => self.embed_with_openai(texts).await,
            ref other => Err(anyhow!(
                "Proveedor LLM {:?} aún no implementado para embeddings",
                other
            )),
        }
    }
}

#[async_trait]
impl ChatModel for LlmManager {
    async fn complete(&self, preamble: &str, prompt: &str) -> Result<String> {
        match self.provider {
            LlmProvider::OpenAI => self.complete_with_openai(preamble, prompt).await,
            ref other => Err(anyhow!(
                "Proveedor LLM {:?} aún no implementado para chat",
                other
            )),
        }
    }
}
