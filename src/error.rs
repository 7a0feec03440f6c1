//! Errores del pipeline (indexado, recuperación y generación).
//!
//! Los colaboradores externos (embeddings, vector store, LLM, almacenamiento)
//! devuelven `anyhow::Result`; cada componente que los invoca traduce el fallo
//! a un `PipelineError` indicando la etapa en la que se produjo.

use serde::Serialize;
use thiserror::Error;

/// Etapa del pipeline en la que falló un colaborador.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Indexing,
    Retrieval,
    Generation,
    Storage,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Indexing => "indexing",
            Stage::Retrieval => "retrieval",
            Stage::Generation => "generation",
            Stage::Storage => "storage",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum PipelineError {
    /// No queda ningún documento con contenido tras el filtrado.
    #[error("No hay documentos con contenido para procesar")]
    EmptyInput,

    /// Petición mal formada (identificadores de repositorio vacíos, consulta vacía...).
    #[error("Entrada no válida: {0}")]
    InvalidInput(String),

    /// El namespace nunca se ha indexado. No es lo mismo que un resultado vacío.
    #[error("El repositorio '{0}' no ha sido indexado")]
    NamespaceNotFound(String),

    /// El namespace se indexó con otro modelo de embeddings; sus vectores no
    /// son comparables con los del modelo actual.
    #[error("El namespace '{namespace}' se indexó con el modelo '{indexed_with}', pero ahora se usa '{current_model}'")]
    EmbeddingModelMismatch {
        stage: Stage,
        namespace: String,
        indexed_with: String,
        current_model: String,
    },

    /// Fallo de un colaborador externo en una etapa concreta.
    #[error("Error en la etapa de {stage}: {message}")]
    Collaborator { stage: Stage, message: String },

    /// Parte de los chunks se escribió antes del fallo.
    #[error("Indexación parcial en '{namespace}': {written} de {total} chunks escritos ({message})")]
    PartialIndex {
        namespace: String,
        written: usize,
        total: usize,
        message: String,
    },

    /// Ya hay una consulta en curso para este turno de conversación.
    #[error("Ya hay una consulta en curso")]
    TurnInFlight,
}

impl PipelineError {
    pub fn collaborator(stage: Stage, err: impl std::fmt::Display) -> Self {
        Self::Collaborator {
            stage,
            message: err.to_string(),
        }
    }

    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Etapa asociada al error, si la hay.
    pub fn stage(&self) -> Option<Stage> {
        match self {
            PipelineError::Collaborator { stage, .. } => Some(*stage),
            PipelineError::PartialIndex { .. } => Some(Stage::Indexing),
            PipelineError::EmbeddingModelMismatch { stage, .. } => Some(*stage),
            _ => None,
        }
    }
}

/// Errores del árbol de ficheros virtual.
#[derive(Debug, Error)]
pub enum TreeError {
    #[error("Nodo no encontrado: {0}")]
    NodeNotFound(String),

    #[error("El nodo '{0}' no es una carpeta")]
    NotAFolder(String),

    #[error("El nodo '{0}' no es un fichero")]
    NotAFile(String),

    #[error("Ya existe '{0}'")]
    AlreadyExists(String),

    #[error("Nombre no válido: '{0}'")]
    InvalidName(String),

    #[error("No se puede eliminar la raíz del árbol")]
    RootRemoval,

    #[error("Error de almacenamiento en '{path}': {source}")]
    Storage {
        path: String,
        #[source]
        source: anyhow::Error,
    },
}

impl TreeError {
    pub fn storage(path: impl Into<String>, source: anyhow::Error) -> Self {
        Self::Storage {
            path: path.into(),
            source,
        }
    }
}
