//! Recuperación semántica dentro de un namespace.

use std::sync::Arc;

use tracing::debug;

use crate::error::{PipelineError, Stage};
use crate::llm::Embedder;
use crate::models::Namespace;
use crate::vector_store::{ScoredChunk, SearchFilter, VectorStore};

pub const DEFAULT_TOP_K: usize = 12;

pub struct Retriever {
    embedder: Arc<dyn Embedder>,
    store: Arc<dyn VectorStore>,
}

impl Retriever {
    pub fn new(embedder: Arc<dyn Embedder>, store: Arc<dyn VectorStore>) -> Self {
        Self { embedder, store }
    }

    /// Devuelve los `k` chunks más parecidos a `query` dentro de `namespace`,
    /// opcionalmente sólo del fichero `current_file`.
    ///
    /// Un namespace nunca indexado es un error (`NamespaceNotFound`); un
    /// resultado vacío es una respuesta válida.
    pub async fn retrieve(
        &self,
        query: &str,
        namespace: &Namespace,
        k: usize,
        current_file: Option<&str>,
    ) -> Result<Vec<ScoredChunk>, PipelineError> {
        if query.trim().is_empty() {
            return Err(PipelineError::invalid_input("La consulta no puede estar vacía"));
        }

        let info = self
            .store
            .namespace_info(namespace)
            .await
            .map_err(|e| PipelineError::collaborator(Stage::Retrieval, e))?
            .ok_or_else(|| PipelineError::NamespaceNotFound(namespace.as_str().to_string()))?;

        // Índice y consulta deben usar el mismo espacio de embeddings.
        let model = self.embedder.model_id();
        if !info.embedding_model.is_empty() && info.embedding_model != model {
            return Err(PipelineError::EmbeddingModelMismatch {
                stage: Stage::Retrieval,
                namespace: namespace.as_str().to_string(),
                indexed_with: info.embedding_model,
                current_model: model.to_string(),
            });
        }

        let query_vec = self
            .embedder
            .embed(vec![query.to_string()])
            .await
            .map_err(|e| PipelineError::collaborator(Stage::Retrieval, e))?
            .into_iter()
            .next()
            .ok_or_else(|| {
                PipelineError::collaborator(
                    Stage::Retrieval,
                    "No se pudo generar embedding de la query",
                )
            })?;

        let filter = SearchFilter {
            filename: current_file
                .map(str::trim)
                .filter(|f| !f.is_empty())
                .map(str::to_string),
        };

        let results = self
            .store
            .search(namespace, &query_vec, k.max(1), &filter)
            .await
            .map_err(|e| PipelineError::collaborator(Stage::Retrieval, e))?;

        debug!(
            "Recuperados {} chunks de '{}' (filtro: {:?})",
            results.len(),
            namespace,
            filter.filename
        );
        Ok(results)
    }
}
