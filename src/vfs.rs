//! Árbol de ficheros virtual respaldado por un [`Storage`].
//!
//! El árbol no guarda punteros al padre: toda búsqueda es un recorrido en
//! pre-orden desde la raíz. El contenido de los ficheros se carga de forma
//! perezosa y la única vía para modificarlo es [`VirtualFileTree::set_content`],
//! que usan tanto las ediciones del usuario como el aplicador de ediciones.

use std::sync::Arc;

use futures::future::{BoxFuture, FutureExt};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::chunker::{binary_placeholder, oversized_placeholder};
use crate::error::TreeError;
use crate::language::{is_text_file, language_for};
use crate::models::{EntryKind, FileState, FileTreeNode, NodeId, NodeKind, SourceContent, SourceFile};
use crate::storage::{Storage, StorageRef};

/// Carpetas que nunca se cargan en el árbol.
pub const DEFAULT_EXCLUDED_DIRS: &[&str] = &[
    "node_modules",
    "venv",
    "env",
    ".env",
    "__pycache__",
    ".git",
    ".vscode",
    ".idea",
    "dist",
    "build",
    "out",
    "target",
    "bin",
    "obj",
    ".next",
    ".nuxt",
    "vendor",
    "packages",
    "bower_components",
    ".gradle",
    ".maven",
    ".pytest_cache",
    ".coverage",
    ".nyc_output",
    "coverage",
    ".sass-cache",
    ".cache",
    ".tmp",
    "tmp",
    "temp",
    ".DS_Store",
    "Thumbs.db",
];

/// Límite por defecto para mostrar un fichero en el editor.
pub const DEFAULT_MAX_DISPLAY_BYTES: u64 = 10 * 1024 * 1024;

/// Lista de carpetas excluidas durante la carga. La comparación ignora
/// mayúsculas; una carpeta con punto inicial también queda excluida si su
/// nombre contiene el de una entrada con punto inicial (`.env.local` cae por
/// `.env`, `.github` por `.git`).
#[derive(Debug, Clone)]
pub struct ExclusionPolicy {
    denied: Vec<String>,
}

impl ExclusionPolicy {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            denied: names
                .into_iter()
                .map(|n| n.as_ref().trim().to_lowercase())
                .filter(|n| !n.is_empty())
                .collect(),
        }
    }

    pub fn is_excluded(&self, name: &str) -> bool {
        let lower = name.to_lowercase();
        self.denied.iter().any(|denied| {
            *denied == lower
                || (lower.starts_with('.') && denied.starts_with('.') && lower.contains(&denied[1..]))
        })
    }
}

impl Default for ExclusionPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_EXCLUDED_DIRS)
    }
}

/// Resultado de guardar todos los ficheros modificados.
#[derive(Debug, Default, Serialize)]
pub struct PersistReport {
    pub saved: Vec<String>,
    pub failed: Vec<PersistFailure>,
}

#[derive(Debug, Serialize)]
pub struct PersistFailure {
    pub path: String,
    pub error: String,
}

impl PersistReport {
    pub fn all_saved(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Recorrido en pre-orden del árbol.
pub struct PreOrder<'a> {
    stack: Vec<&'a FileTreeNode>,
}

impl<'a> Iterator for PreOrder<'a> {
    type Item = &'a FileTreeNode;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.stack.pop()?;
        self.stack.extend(node.children().iter().rev());
        Some(node)
    }
}

pub struct VirtualFileTree {
    storage: Arc<dyn Storage>,
    root: FileTreeNode,
    max_display_bytes: u64,
}

fn join_path(parent: &str, name: &str) -> String {
    if parent.is_empty() {
        name.to_string()
    } else {
        format!("{parent}/{name}")
    }
}

fn validate_name(name: &str) -> Result<&str, TreeError> {
    let trimmed = name.trim();
    if trimmed.is_empty()
        || trimmed == "."
        || trimmed == ".."
        || trimmed.contains('/')
        || trimmed.contains('\\')
    {
        return Err(TreeError::InvalidName(name.to_string()));
    }
    Ok(trimmed)
}

fn sort_children(children: &mut [FileTreeNode]) {
    children.sort_by(|a, b| {
        let a_is_dir = !a.is_file();
        let b_is_dir = !b.is_file();
        b_is_dir.cmp(&a_is_dir).then_with(|| a.name.cmp(&b.name))
    });
}

fn node_mut<'a>(node: &'a mut FileTreeNode, id: &NodeId) -> Option<&'a mut FileTreeNode> {
    if node.id == *id {
        return Some(node);
    }
    if let NodeKind::Folder { children } = &mut node.kind {
        for child in children.iter_mut() {
            if let Some(found) = node_mut(child, id) {
                return Some(found);
            }
        }
    }
    None
}

fn file_state_mut<'a>(root: &'a mut FileTreeNode, id: &NodeId) -> Result<&'a mut FileState, TreeError> {
    let node = node_mut(root, id).ok_or_else(|| TreeError::NodeNotFound(id.to_string()))?;
    match &mut node.kind {
        NodeKind::File(state) => Ok(state),
        NodeKind::Folder { .. } => Err(TreeError::NotAFile(node.path.clone())),
    }
}

/// Quita el nodo `id` de la descendencia de `node`. Devuelve el nodo separado.
fn detach(node: &mut FileTreeNode, id: &NodeId) -> Option<FileTreeNode> {
    let NodeKind::Folder { children } = &mut node.kind else {
        return None;
    };
    if let Some(pos) = children.iter().position(|c| c.id == *id) {
        return Some(children.remove(pos));
    }
    children.iter_mut().find_map(|child| detach(child, id))
}

fn load_children<'a>(
    storage: &'a dyn Storage,
    dir: &'a StorageRef,
    dir_path: &'a str,
    policy: &'a ExclusionPolicy,
) -> BoxFuture<'a, Result<Vec<FileTreeNode>, TreeError>> {
    async move {
        let entries = storage
            .enumerate(dir)
            .await
            .map_err(|e| TreeError::storage(dir.display().to_string(), e))?;

        let mut children = Vec::with_capacity(entries.len());
        for entry in entries {
            if entry.kind == EntryKind::Folder && policy.is_excluded(&entry.name) {
                debug!("Excluido del árbol: {}", join_path(dir_path, &entry.name));
                continue;
            }
            let path = join_path(dir_path, &entry.name);
            match entry.kind {
                EntryKind::File => {
                    children.push(FileTreeNode::new_file(&entry.name, path, entry.reference));
                }
                EntryKind::Folder => {
                    // Una subcarpeta ilegible se muestra vacía en lugar de abortar la carga.
                    let grandchildren =
                        match load_children(storage, &entry.reference, &path, policy).await {
                            Ok(nodes) => nodes,
                            Err(err) => {
                                warn!("No se pudo leer la carpeta '{}': {}", path, err);
                                Vec::new()
                            }
                        };
                    children.push(FileTreeNode::new_folder(
                        &entry.name,
                        path,
                        entry.reference,
                        grandchildren,
                    ));
                }
            }
        }
        Ok(children)
    }
    .boxed()
}

impl VirtualFileTree {
    /// Construye el árbol completo desde `root_ref`. La raíz tiene ruta vacía y
    /// las rutas de los descendientes son relativas a ella, separadas por `/`.
    pub async fn load(
        storage: Arc<dyn Storage>,
        root_ref: StorageRef,
        root_name: &str,
        policy: &ExclusionPolicy,
    ) -> Result<Self, TreeError> {
        let children = load_children(storage.as_ref(), &root_ref, "", policy).await?;
        let root = FileTreeNode::new_folder(root_name, String::new(), root_ref, children);
        let tree = Self {
            storage,
            root,
            max_display_bytes: DEFAULT_MAX_DISPLAY_BYTES,
        };
        info!(
            "Árbol cargado desde '{}': {} nodos",
            tree.root.storage_ref.display(),
            tree.iter().count()
        );
        Ok(tree)
    }

    pub fn with_display_limit(mut self, bytes: u64) -> Self {
        self.max_display_bytes = bytes;
        self
    }

    pub fn root(&self) -> &FileTreeNode {
        &self.root
    }

    pub fn iter(&self) -> PreOrder<'_> {
        PreOrder {
            stack: vec![&self.root],
        }
    }

    pub fn find_by_id(&self, id: &NodeId) -> Option<&FileTreeNode> {
        self.iter().find(|n| n.id == *id)
    }

    pub fn find_by_path(&self, path: &str) -> Option<&FileTreeNode> {
        self.iter().find(|n| n.path == path)
    }

    /// Busca un fichero por ruta exacta y, si no hay, por nombre exacto. Gana
    /// el primero en pre-orden; las carpetas nunca coinciden.
    pub fn find_file(&self, target: &str) -> Option<&FileTreeNode> {
        self.iter()
            .find(|n| n.is_file() && n.path == target)
            .or_else(|| self.iter().find(|n| n.is_file() && n.name == target))
    }

    pub fn modified_files(&self) -> Vec<&FileTreeNode> {
        self.iter().filter(|n| n.is_modified()).collect()
    }

    /// Crea un fichero o carpeta vacíos bajo `parent_id`, primero en el
    /// almacenamiento y después en el árbol.
    pub async fn create_node(
        &mut self,
        parent_id: &NodeId,
        name: &str,
        kind: EntryKind,
    ) -> Result<NodeId, TreeError> {
        let name = validate_name(name)?;
        let storage = self.storage.clone();

        let (path, reference) = {
            let parent = self
                .find_by_id(parent_id)
                .ok_or_else(|| TreeError::NodeNotFound(parent_id.to_string()))?;
            let NodeKind::Folder { children } = &parent.kind else {
                return Err(TreeError::NotAFolder(parent.path.clone()));
            };
            let path = join_path(&parent.path, name);
            if children.iter().any(|c| c.name == name) {
                return Err(TreeError::AlreadyExists(path));
            }

            let created = match kind {
                EntryKind::File => storage.create_file(&parent.storage_ref, name).await,
                EntryKind::Folder => storage.create_directory(&parent.storage_ref, name).await,
            };
            let reference = created.map_err(|e| TreeError::storage(path.clone(), e))?;
            (path, reference)
        };

        let node = match kind {
            EntryKind::File => {
                let mut node = FileTreeNode::new_file(name, path, reference);
                // Recién creado: vacío y ya "cargado".
                node.kind = NodeKind::File(FileState {
                    content: String::new(),
                    is_content_loaded: true,
                    is_modified: false,
                });
                node
            }
            EntryKind::Folder => FileTreeNode::new_folder(name, path, reference, Vec::new()),
        };
        let id = node.id.clone();
        info!("Creado {:?} '{}'", kind, node.path);

        if let Some(NodeKind::Folder { children }) =
            node_mut(&mut self.root, parent_id).map(|p| &mut p.kind)
        {
            children.push(node);
            sort_children(children);
        }
        Ok(id)
    }

    /// Elimina el nodo (y su subárbol) del almacenamiento y del árbol.
    /// Devuelve los ids eliminados en pre-orden.
    pub async fn delete_node(&mut self, id: &NodeId) -> Result<Vec<NodeId>, TreeError> {
        if self.root.id == *id {
            return Err(TreeError::RootRemoval);
        }
        let storage = self.storage.clone();
        let node = self
            .find_by_id(id)
            .ok_or_else(|| TreeError::NodeNotFound(id.to_string()))?;
        storage
            .remove(&node.storage_ref, !node.is_file())
            .await
            .map_err(|e| TreeError::storage(node.path.clone(), e))?;

        let removed = detach(&mut self.root, id).ok_or_else(|| TreeError::NodeNotFound(id.to_string()))?;
        let ids: Vec<NodeId> = PreOrder { stack: vec![&removed] }
            .map(|n| n.id.clone())
            .collect();
        info!("Eliminado '{}' ({} nodos)", removed.path, ids.len());
        Ok(ids)
    }

    /// Devuelve el contenido para mostrar. Los ficheros binarios o mayores
    /// que el límite de visualización devuelven un texto marcador que no se
    /// guarda en el nodo.
    pub async fn load_content(&mut self, id: &NodeId) -> Result<String, TreeError> {
        let storage = self.storage.clone();
        let node = self
            .find_by_id(id)
            .ok_or_else(|| TreeError::NodeNotFound(id.to_string()))?;
        let state = node
            .file_state()
            .ok_or_else(|| TreeError::NotAFile(node.path.clone()))?;
        if state.is_content_loaded {
            return Ok(state.content.clone());
        }

        if !is_text_file(&node.name) {
            return Ok(binary_placeholder(&node.name));
        }
        let size = storage
            .file_size(&node.storage_ref)
            .await
            .map_err(|e| TreeError::storage(node.path.clone(), e))?;
        if size > self.max_display_bytes {
            return Ok(oversized_placeholder(size));
        }
        let text = storage
            .read_text(&node.storage_ref)
            .await
            .map_err(|e| TreeError::storage(node.path.clone(), e))?;

        let state = file_state_mut(&mut self.root, id)?;
        state.content = text.clone();
        state.is_content_loaded = true;
        Ok(text)
    }

    /// Único punto de mutación del contenido de un fichero.
    pub fn set_content(&mut self, id: &NodeId, text: impl Into<String>) -> Result<(), TreeError> {
        let state = file_state_mut(&mut self.root, id)?;
        state.content = text.into();
        state.is_content_loaded = true;
        state.is_modified = true;
        Ok(())
    }

    /// Escribe el fichero si está modificado. En caso de error el flag de
    /// modificado se mantiene.
    pub async fn persist(&mut self, id: &NodeId) -> Result<(), TreeError> {
        let storage = self.storage.clone();
        let node = self
            .find_by_id(id)
            .ok_or_else(|| TreeError::NodeNotFound(id.to_string()))?;
        let state = node
            .file_state()
            .ok_or_else(|| TreeError::NotAFile(node.path.clone()))?;
        if !state.is_modified {
            return Ok(());
        }
        storage
            .write_text(&node.storage_ref, &state.content)
            .await
            .map_err(|e| TreeError::storage(node.path.clone(), e))?;
        debug!("Guardado '{}'", node.path);

        file_state_mut(&mut self.root, id)?.is_modified = false;
        Ok(())
    }

    pub async fn persist_all(&mut self) -> PersistReport {
        let pending: Vec<(NodeId, String)> = self
            .modified_files()
            .into_iter()
            .map(|n| (n.id.clone(), n.path.clone()))
            .collect();

        let mut report = PersistReport::default();
        for (id, path) in pending {
            match self.persist(&id).await {
                Ok(()) => report.saved.push(path),
                Err(err) => {
                    warn!("No se pudo guardar '{}': {}", path, err);
                    report.failed.push(PersistFailure {
                        path,
                        error: err.to_string(),
                    });
                }
            }
        }
        info!(
            "Guardado masivo: {} ficheros guardados, {} con error",
            report.saved.len(),
            report.failed.len()
        );
        report
    }

    /// Ficheros del árbol como entrada del chunker. Se usa el contenido en
    /// memoria cuando está cargado; el resto se lee del almacenamiento. Los
    /// errores de lectura se registran y el fichero se omite.
    pub async fn source_files(&self, max_file_bytes: u64) -> Vec<SourceFile> {
        self.source_snapshot().read(max_file_bytes).await
    }

    /// Foto de los ficheros del árbol que no necesita el árbol para leerse.
    /// Permite soltar el bloqueo de la sesión antes de ir al almacenamiento.
    pub fn source_snapshot(&self) -> SourceSnapshot {
        let entries = self
            .iter()
            .filter(|n| n.is_file())
            .map(|node| SnapshotEntry {
                filename: node.name.clone(),
                path: node.path.clone(),
                loaded: node
                    .file_state()
                    .filter(|state| state.is_content_loaded)
                    .map(|state| state.content.clone()),
                storage_ref: StorageRef::new(node.storage_ref.as_path()),
            })
            .collect();
        SourceSnapshot {
            storage: self.storage.clone(),
            entries,
        }
    }
}

struct SnapshotEntry {
    filename: String,
    path: String,
    loaded: Option<String>,
    storage_ref: StorageRef,
}

/// Ficheros pendientes de leer, ver [`VirtualFileTree::source_snapshot`].
pub struct SourceSnapshot {
    storage: Arc<dyn Storage>,
    entries: Vec<SnapshotEntry>,
}

impl SourceSnapshot {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub async fn read(self, max_file_bytes: u64) -> Vec<SourceFile> {
        let mut files = Vec::with_capacity(self.entries.len());
        for entry in self.entries {
            let content = match entry.loaded {
                Some(text) => SourceContent::Text(text),
                None if !is_text_file(&entry.filename) => SourceContent::Binary,
                None => match self.storage.file_size(&entry.storage_ref).await {
                    Ok(bytes) if bytes > max_file_bytes => SourceContent::Oversized { bytes },
                    Ok(_) => match self.storage.read_text(&entry.storage_ref).await {
                        Ok(text) => SourceContent::Text(text),
                        Err(err) => {
                            warn!("Omitiendo '{}': {}", entry.path, err);
                            continue;
                        }
                    },
                    Err(err) => {
                        warn!("Omitiendo '{}': {}", entry.path, err);
                        continue;
                    }
                },
            };
            files.push(SourceFile {
                language: language_for(&entry.filename).to_string(),
                filename: entry.filename,
                path: entry.path,
                content,
            });
        }
        files
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MemoryStorage;
    use tokio_test::{assert_err, assert_ok};

    async fn tree_with(files: &[(&str, &str)]) -> (Arc<MemoryStorage>, VirtualFileTree) {
        let storage = Arc::new(MemoryStorage::with_files(files));
        let tree = VirtualFileTree::load(
            storage.clone(),
            MemoryStorage::root_ref(),
            "repo",
            &ExclusionPolicy::default(),
        )
        .await
        .unwrap();
        (storage, tree)
    }

    fn id_of(tree: &VirtualFileTree, path: &str) -> NodeId {
        tree.find_by_path(path).unwrap().id().clone()
    }

    #[test]
    fn exclusion_is_case_insensitive_and_matches_dotted_names() {
        let policy = ExclusionPolicy::default();
        assert!(policy.is_excluded("node_modules"));
        assert!(policy.is_excluded("Node_Modules"));
        assert!(policy.is_excluded(".env.local"));
        assert!(policy.is_excluded(".github"));
        assert!(!policy.is_excluded("environment"));
        assert!(!policy.is_excluded("src"));
        assert!(!policy.is_excluded(".settings"));
    }

    #[tokio::test]
    async fn load_skips_excluded_folders_and_builds_relative_paths() {
        let (_, tree) = tree_with(&[
            ("src/a.js", "a"),
            ("src/util/b.js", "b"),
            ("node_modules/x/index.js", "x"),
            (".git/HEAD", "ref"),
            ("README.md", "# hola"),
            ("notas.tmp", "excluidas sólo las carpetas"),
        ])
        .await;

        assert_eq!(tree.root().path(), "");
        assert!(tree.find_by_path("src/util/b.js").is_some());
        assert!(tree.find_by_path("README.md").is_some());
        assert!(tree.find_by_path("notas.tmp").is_some());
        assert!(tree.iter().all(|n| !n.path().starts_with("node_modules")));
        assert!(tree.iter().all(|n| !n.path().starts_with(".git")));
        assert!(tree.iter().all(|n| !n.is_content_loaded()));
    }

    #[tokio::test]
    async fn find_file_prefers_path_then_first_name_match() {
        let (_, tree) = tree_with(&[("lib/util.js", "1"), ("src/util.js", "2")]).await;
        assert_eq!(tree.find_file("src/util.js").unwrap().path(), "src/util.js");
        assert_eq!(tree.find_file("util.js").unwrap().path(), "lib/util.js");
        assert!(tree.find_file("src").is_none());
        assert!(tree.find_file("otro.js").is_none());
    }

    #[tokio::test]
    async fn create_node_validates_and_writes_through() {
        let (storage, mut tree) = tree_with(&[("src/a.js", "a")]).await;
        let src = id_of(&tree, "src");

        let id = tree.create_node(&src, "b.js", EntryKind::File).await.unwrap();
        let created = tree.find_by_id(&id).unwrap();
        assert_eq!(created.path(), "src/b.js");
        assert!(created.is_content_loaded());
        assert!(storage.exists("src/b.js"));

        let dir = tree.create_node(&src, "lib", EntryKind::Folder).await.unwrap();
        assert_eq!(tree.find_by_id(&dir).unwrap().kind(), EntryKind::Folder);

        assert!(matches!(
            tree.create_node(&src, "b.js", EntryKind::File).await,
            Err(TreeError::AlreadyExists(_))
        ));
        assert!(matches!(
            tree.create_node(&src, "x/y.js", EntryKind::File).await,
            Err(TreeError::InvalidName(_))
        ));
        let file = id_of(&tree, "src/a.js");
        assert!(matches!(
            tree.create_node(&file, "c.js", EntryKind::File).await,
            Err(TreeError::NotAFolder(_))
        ));
    }

    #[tokio::test]
    async fn delete_node_removes_the_whole_subtree() {
        let (storage, mut tree) =
            tree_with(&[("src/a.js", "a"), ("src/util/b.js", "b"), ("main.js", "m")]).await;
        let src = id_of(&tree, "src");
        let nested = id_of(&tree, "src/util/b.js");

        let removed = tree.delete_node(&src).await.unwrap();
        assert_eq!(removed.len(), 4);
        assert!(removed.contains(&nested));
        assert!(tree.find_by_id(&src).is_none());
        assert!(tree.find_by_id(&nested).is_none());
        assert!(tree.find_by_path("main.js").is_some());
        assert!(!storage.exists("src/util/b.js"));

        let root = tree.root().id().clone();
        assert!(matches!(tree.delete_node(&root).await, Err(TreeError::RootRemoval)));
    }

    #[tokio::test]
    async fn load_content_is_lazy_and_placeholders_are_not_stored() {
        let (_, tree) = tree_with(&[
            ("a.js", "const a = 1;"),
            ("logo.png", "\u{89}PNG"),
            ("big.txt", "0123456789012345678901234567890123456789"),
        ])
        .await;
        // 12 bytes caben; 40 no.
        let mut tree = tree.with_display_limit(20);

        let a = id_of(&tree, "a.js");
        assert_eq!(tree.load_content(&a).await.unwrap(), "const a = 1;");
        assert!(tree.find_by_id(&a).unwrap().is_content_loaded());

        let logo = id_of(&tree, "logo.png");
        assert_eq!(tree.load_content(&logo).await.unwrap(), "// Binary file: logo.png");
        assert!(!tree.find_by_id(&logo).unwrap().is_content_loaded());

        let big = id_of(&tree, "big.txt");
        assert!(tree.load_content(&big).await.unwrap().starts_with("// File too large"));
        assert!(!tree.find_by_id(&big).unwrap().is_content_loaded());
    }

    #[tokio::test]
    async fn set_content_and_persist_clear_the_modified_flag() {
        let (storage, mut tree) = tree_with(&[("a.js", "viejo"), ("b.js", "b")]).await;
        let a = id_of(&tree, "a.js");

        assert_ok!(tree.set_content(&a, "nuevo"));
        assert!(tree.find_by_id(&a).unwrap().is_modified());
        assert_eq!(tree.modified_files().len(), 1);

        assert_ok!(tree.persist(&a).await);
        assert!(!tree.find_by_id(&a).unwrap().is_modified());
        assert_eq!(storage.contents("a.js").unwrap(), "nuevo");

        let root = tree.root().id().clone();
        assert_err!(tree.set_content(&root, "x"));
    }

    #[tokio::test]
    async fn persist_all_reports_failures_and_keeps_them_modified() {
        let storage = Arc::new(MemoryStorage::with_files(&[("a.js", "a")]).failing_writes());
        let mut tree = VirtualFileTree::load(
            storage,
            MemoryStorage::root_ref(),
            "repo",
            &ExclusionPolicy::default(),
        )
        .await
        .unwrap();
        let a = id_of(&tree, "a.js");
        tree.set_content(&a, "cambio").unwrap();

        let report = tree.persist_all().await;
        assert!(!report.all_saved());
        assert_eq!(report.failed[0].path, "a.js");
        assert!(tree.find_by_id(&a).unwrap().is_modified());
    }

    #[tokio::test]
    async fn source_files_prefer_in_memory_content() {
        let (_, mut tree) = tree_with(&[
            ("a.js", "disco"),
            ("logo.png", "png"),
            ("big.md", "012345678901234567890123456789"),
            ("c.py", "print(1)"),
        ])
        .await;
        let a = id_of(&tree, "a.js");
        tree.set_content(&a, "memoria").unwrap();

        let files = tree.source_files(20).await;
        let by_path = |p: &str| files.iter().find(|f| f.path == p).unwrap();

        assert!(matches!(&by_path("a.js").content, SourceContent::Text(t) if t == "memoria"));
        assert!(matches!(by_path("logo.png").content, SourceContent::Binary));
        assert!(matches!(by_path("big.md").content, SourceContent::Oversized { bytes: 30 }));
        assert!(matches!(&by_path("c.py").content, SourceContent::Text(t) if t == "print(1)"));
        assert_eq!(by_path("c.py").language, "python");
    }

    #[tokio::test]
    async fn source_snapshot_reads_without_the_tree() {
        let (_, mut tree) = tree_with(&[("a.js", "disco"), ("src/b.js", "b")]).await;
        let snapshot = tree.source_snapshot();
        assert_eq!(snapshot.len(), 2);

        let a = id_of(&tree, "a.js");
        tree.set_content(&a, "después de la foto").unwrap();
        drop(tree);

        let files = snapshot.read(1024).await;
        assert_eq!(files.len(), 2);
        let a = files.iter().find(|f| f.path == "a.js").unwrap();
        assert!(matches!(&a.content, SourceContent::Text(t) if t == "disco"));
        assert!(files.iter().any(|f| f.path == "src/b.js"));
    }
}
