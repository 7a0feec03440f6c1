//! Consulta RAG sobre un repositorio indexado.
//!
//! Flujo:
//!   1. Búsqueda vectorial de los `top_k` chunks del namespace (opcionalmente
//!      sólo del fichero abierto).
//!   2. Construcción del prompt con esos chunks como contexto.
//!   3. El LLM responde; la respuesta vuelve junto a los chunks usados.

use std::sync::Arc;

use serde::Serialize;
use tracing::info;

use crate::{
    error::{PipelineError, Stage},
    llm::{ChatModel, Embedder},
    models::{Chunk, Namespace},
    prompt::{assemble, SYSTEM_INSTRUCTION},
    retriever::Retriever,
    vector_store::VectorStore,
};

/// Respuesta de una consulta RAG.
#[derive(Debug, Clone, Serialize)]
pub struct RagAnswer {
    pub answer: String,
    pub sources: Vec<Chunk>,
}

pub struct RagEngine {
    retriever: Retriever,
    chat: Arc<dyn ChatModel>,
    top_k: usize,
}

impl RagEngine {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        store: Arc<dyn VectorStore>,
        chat: Arc<dyn ChatModel>,
        top_k: usize,
    ) -> Self {
        Self {
            retriever: Retriever::new(embedder, store),
            chat,
            top_k: top_k.max(1),
        }
    }

    /// Lanza una consulta RAG. Si no se recupera nada el modelo responde
    /// igualmente, con un contexto vacío.
    pub async fn query(
        &self,
        question: &str,
        namespace: &Namespace,
        current_file: Option<&str>,
    ) -> Result<RagAnswer, PipelineError> {
        let hits = self
            .retriever
            .retrieve(question, namespace, self.top_k, current_file)
            .await?;
        let sources: Vec<Chunk> = hits.into_iter().map(|h| h.chunk).collect();

        let prompt = assemble(SYSTEM_INSTRUCTION, &sources, current_file, question);
        let answer = self
            .chat
            .complete(&prompt.system, &prompt.body)
            .await
            .map_err(|e| PipelineError::collaborator(Stage::Generation, e))?;

        info!(
            "Consulta respondida en '{}' con {} fuentes",
            namespace,
            sources.len()
        );
        Ok(RagAnswer { answer, sources })
    }
}
