//! Ingesta de repositorios: ficheros → chunks → embeddings en el vector store.
//!
//! Dos entradas: la lista de ficheros que envía un cliente por HTTP
//! (`/api/repo/process`) y el árbol de la sesión abierta (`/api/ingest`).

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::{
    app_state::Status,
    chunker::Chunker,
    error::PipelineError,
    indexer::Indexer,
    language::language_for,
    models::{Namespace, SourceFile},
};

/// Fichero tal y como llega en la petición de indexado.
#[derive(Debug, Clone, Deserialize)]
pub struct IncomingFile {
    pub name: String,
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub language: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessRequest {
    #[serde(default)]
    pub files: Vec<IncomingFile>,
    #[serde(default, alias = "username")]
    pub owner: String,
    #[serde(default, alias = "repoName")]
    pub repository: String,
}

/// Resumen de los resultados de una operación de ingesta.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestionSummary {
    pub success: bool,
    pub namespace: String,
    pub chunk_count: usize,
    pub file_count: usize,
}

impl std::fmt::Display for IngestionSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Resumen: {} ficheros indexados en {} chunks ({}).",
            self.file_count, self.chunk_count, self.namespace
        )
    }
}

pub struct IngestService {
    chunker: Chunker,
    indexer: Arc<Indexer>,
}

impl IngestService {
    pub fn new(chunker: Chunker, indexer: Arc<Indexer>) -> Self {
        Self { chunker, indexer }
    }

    pub fn max_file_bytes(&self) -> u64 {
        self.chunker.max_file_bytes()
    }

    /// Indexa los ficheros enviados por un cliente bajo `owner-repository`.
    pub async fn process_repository(
        &self,
        request: ProcessRequest,
    ) -> Result<IngestionSummary, PipelineError> {
        let namespace = Namespace::new(&request.owner, &request.repository)?;
        if request.files.is_empty() {
            return Err(PipelineError::EmptyInput);
        }

        let files: Vec<SourceFile> = request
            .files
            .into_iter()
            .map(|f| {
                let path = f.path.filter(|p| !p.is_empty()).unwrap_or_else(|| f.name.clone());
                let language = f
                    .language
                    .filter(|l| !l.is_empty())
                    .unwrap_or_else(|| language_for(&f.name).to_string());
                SourceFile::text(&f.name, &path, &language, f.content)
            })
            .collect();

        self.index_sources(files, &namespace, None).await
    }

    /// Trocea e indexa `files`. Si se pasa `status`, se actualiza el progreso
    /// tras cada lote escrito.
    pub async fn index_sources(
        &self,
        files: Vec<SourceFile>,
        namespace: &Namespace,
        status: Option<&Mutex<Status>>,
    ) -> Result<IngestionSummary, PipelineError> {
        info!("Troceando {} ficheros para '{}'...", files.len(), namespace);
        if let Some(status) = status {
            Status::set(status, true, format!("Troceando {} ficheros...", files.len()), 0.0);
        }

        let chunks = self.chunker.chunk_files(&files);
        if chunks.is_empty() {
            return Err(PipelineError::EmptyInput);
        }
        let file_count = chunks
            .iter()
            .map(|c| c.metadata.path.as_str())
            .collect::<HashSet<_>>()
            .len();
        info!("{} ficheros con contenido → {} chunks", file_count, chunks.len());

        let summary = self
            .indexer
            .index_with_progress(chunks, namespace, |written, total| {
                if let Some(status) = status {
                    Status::set(
                        status,
                        true,
                        format!("[{written}/{total}] Chunks indexados..."),
                        written as f32 / total as f32,
                    );
                }
            })
            .await?;

        Ok(IngestionSummary {
            success: true,
            namespace: summary.namespace,
            chunk_count: summary.chunk_count,
            file_count,
        })
    }
}
