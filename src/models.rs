//! Modelos de dominio: nodos del árbol virtual, chunks, namespaces,
//! mensajes de la conversación y bloques de edición.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::PipelineError;
use crate::storage::StorageRef;

/// Identificador opaco e inmutable de un nodo del árbol.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(String);

impl NodeId {
    pub fn generate() -> Self {
        NodeId(Uuid::new_v4().simple().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for NodeId {
    fn from(s: &str) -> Self {
        NodeId(s.to_string())
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Tipo de nodo pedido al crear o devuelto por el almacenamiento.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    File,
    Folder,
}

/// Estado propio de un fichero.
#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileState {
    pub content: String,
    pub is_content_loaded: bool,
    pub is_modified: bool,
}

/// Datos específicos de cada tipo de nodo: un fichero sólo tiene contenido
/// y una carpeta sólo tiene hijos.
#[derive(Debug, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum NodeKind {
    File(FileState),
    Folder { children: Vec<FileTreeNode> },
}

/// Nodo (fichero o carpeta) del árbol virtual. No guarda referencia al padre:
/// la relación se deduce de la posición en el árbol.
#[derive(Debug, Serialize)]
pub struct FileTreeNode {
    pub(crate) id: NodeId,
    pub(crate) name: String,
    pub(crate) path: String,
    #[serde(flatten)]
    pub(crate) kind: NodeKind,
    #[serde(skip)]
    pub(crate) storage_ref: StorageRef,
}

impl FileTreeNode {
    pub(crate) fn new_file(name: &str, path: String, storage_ref: StorageRef) -> Self {
        Self {
            id: NodeId::generate(),
            name: name.to_string(),
            path,
            kind: NodeKind::File(FileState::default()),
            storage_ref,
        }
    }

    pub(crate) fn new_folder(
        name: &str,
        path: String,
        storage_ref: StorageRef,
        children: Vec<FileTreeNode>,
    ) -> Self {
        Self {
            id: NodeId::generate(),
            name: name.to_string(),
            path,
            kind: NodeKind::Folder { children },
            storage_ref,
        }
    }

    pub fn id(&self) -> &NodeId {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn kind(&self) -> EntryKind {
        match self.kind {
            NodeKind::File(_) => EntryKind::File,
            NodeKind::Folder { .. } => EntryKind::Folder,
        }
    }

    pub fn is_file(&self) -> bool {
        matches!(self.kind, NodeKind::File(_))
    }

    pub fn storage_ref(&self) -> &StorageRef {
        &self.storage_ref
    }

    pub fn file_state(&self) -> Option<&FileState> {
        match &self.kind {
            NodeKind::File(state) => Some(state),
            NodeKind::Folder { .. } => None,
        }
    }

    /// Contenido en memoria (sólo ficheros).
    pub fn content(&self) -> Option<&str> {
        self.file_state().map(|s| s.content.as_str())
    }

    pub fn is_modified(&self) -> bool {
        self.file_state().map(|s| s.is_modified).unwrap_or(false)
    }

    pub fn is_content_loaded(&self) -> bool {
        self.file_state().map(|s| s.is_content_loaded).unwrap_or(false)
    }

    pub fn children(&self) -> &[FileTreeNode] {
        match &self.kind {
            NodeKind::Folder { children } => children,
            NodeKind::File(_) => &[],
        }
    }
}

/// Clave de partición del vector store: `owner-repository`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct Namespace(String);

impl Namespace {
    pub fn new(owner: &str, repository: &str) -> Result<Self, PipelineError> {
        let owner = owner.trim();
        let repository = repository.trim();
        if owner.is_empty() || repository.is_empty() {
            return Err(PipelineError::invalid_input(
                "El propietario y el nombre del repositorio son obligatorios",
            ));
        }
        Ok(Namespace(format!("{owner}-{repository}")))
    }

    /// Deduce propietario y repositorio del nombre de la carpeta abierta:
    /// `juan-mi-repo` → (`juan`, `mi-repo`); sin guion → (`local`, nombre).
    pub fn from_folder_name(folder: &str) -> Result<Self, PipelineError> {
        match folder.split_once('-') {
            Some((owner, repository)) if !owner.is_empty() && !repository.is_empty() => {
                Self::new(owner, repository)
            }
            _ => Self::new("local", folder),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Namespace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Contenido de un fichero tal y como llega al chunker.
#[derive(Debug, Clone)]
pub enum SourceContent {
    Text(String),
    Binary,
    Oversized { bytes: u64 },
}

/// Fichero de entrada del chunker.
#[derive(Debug, Clone)]
pub struct SourceFile {
    pub filename: String,
    pub path: String,
    pub language: String,
    pub content: SourceContent,
}

impl SourceFile {
    pub fn text(filename: &str, path: &str, language: &str, text: impl Into<String>) -> Self {
        Self {
            filename: filename.to_string(),
            path: path.to_string(),
            language: language.to_string(),
            content: SourceContent::Text(text.into()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    pub filename: String,
    pub path: String,
    pub language: String,
    pub namespace: String,
    /// Longitud (en caracteres) del fichero completo del que procede el chunk.
    pub size: usize,
}

/// Trozo contiguo del texto de un fichero, unidad de embedding y recuperación.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub content: String,
    pub metadata: ChunkMetadata,
}

/// Bloque de edición propuesto por el modelo: reemplazo completo de un fichero.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EditBlock {
    pub filename: String,
    pub content: String,
    applied: bool,
}

impl EditBlock {
    pub fn new(filename: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            filename: filename.into(),
            content: content.into(),
            applied: false,
        }
    }

    pub fn is_applied(&self) -> bool {
        self.applied
    }

    /// El flag es monótono: una vez aplicado no vuelve a `false`.
    pub(crate) fn mark_applied(&mut self) {
        self.applied = true;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// Turno de la conversación.
#[derive(Debug, Clone, Serialize)]
pub struct Message {
    pub id: String,
    pub role: Role,
    pub text: String,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sources: Option<Vec<Chunk>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub edits: Option<Vec<EditBlock>>,
}

impl Message {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            role: Role::User,
            text: text.into(),
            timestamp: Utc::now(),
            sources: None,
            edits: None,
        }
    }

    pub fn assistant(text: impl Into<String>, sources: Vec<Chunk>, edits: Vec<EditBlock>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            role: Role::Assistant,
            text: text.into(),
            timestamp: Utc::now(),
            sources: (!sources.is_empty()).then_some(sources),
            edits: (!edits.is_empty()).then_some(edits),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn namespace_joins_owner_and_repository() {
        let ns = Namespace::new("ayush", "codi").unwrap();
        assert_eq!(ns.as_str(), "ayush-codi");
    }

    #[test]
    fn namespace_rejects_missing_identifiers() {
        assert!(matches!(
            Namespace::new("", "codi"),
            Err(PipelineError::InvalidInput(_))
        ));
        assert!(matches!(
            Namespace::new("ayush", "  "),
            Err(PipelineError::InvalidInput(_))
        ));
    }

    #[test]
    fn namespace_from_folder_name_splits_on_first_dash() {
        assert_eq!(
            Namespace::from_folder_name("ayush-codi-star").unwrap().as_str(),
            "ayush-codi-star"
        );
        assert_eq!(
            Namespace::from_folder_name("proyecto").unwrap().as_str(),
            "local-proyecto"
        );
        assert_eq!(
            Namespace::from_folder_name("-raro").unwrap().as_str(),
            "local--raro"
        );
    }

    #[test]
    fn assistant_message_omits_empty_lists() {
        let msg = Message::assistant("hola", Vec::new(), Vec::new());
        let json = serde_json::to_value(&msg).unwrap();
        assert!(json.get("sources").is_none());
        assert!(json.get("edits").is_none());
        assert_eq!(json["role"], "assistant");
    }
}
