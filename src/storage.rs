//! Colaborador de almacenamiento: acceso a los ficheros reales que respaldan
//! el árbol virtual. La implementación por defecto trabaja sobre el sistema de
//! archivos local con `tokio::fs`.

use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use tracing::debug;

use crate::models::EntryKind;

/// Manejador opaco del recurso real. Cada nodo del árbol posee el suyo.
#[derive(Debug, PartialEq, Eq)]
pub struct StorageRef(PathBuf);

impl StorageRef {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        StorageRef(path.into())
    }

    pub fn as_path(&self) -> &Path {
        &self.0
    }

    pub fn display(&self) -> std::path::Display<'_> {
        self.0.display()
    }
}

/// Entrada devuelta al enumerar un directorio.
#[derive(Debug)]
pub struct StorageEntry {
    pub name: String,
    pub kind: EntryKind,
    pub reference: StorageRef,
}

#[async_trait]
pub trait Storage: Send + Sync {
    async fn enumerate(&self, dir: &StorageRef) -> Result<Vec<StorageEntry>>;
    async fn read_text(&self, file: &StorageRef) -> Result<String>;
    async fn write_text(&self, file: &StorageRef, text: &str) -> Result<()>;
    async fn file_size(&self, file: &StorageRef) -> Result<u64>;
    async fn create_file(&self, dir: &StorageRef, name: &str) -> Result<StorageRef>;
    async fn create_directory(&self, dir: &StorageRef, name: &str) -> Result<StorageRef>;
    async fn remove(&self, target: &StorageRef, recursive: bool) -> Result<()>;
}

/// Almacenamiento sobre el sistema de archivos local.
#[derive(Debug, Default, Clone)]
pub struct LocalStorage;

#[async_trait]
impl Storage for LocalStorage {
    async fn enumerate(&self, dir: &StorageRef) -> Result<Vec<StorageEntry>> {
        let mut read_dir = tokio::fs::read_dir(dir.as_path())
            .await
            .with_context(|| format!("No se pudo leer el directorio {}", dir.display()))?;

        let mut entries = Vec::new();
        while let Some(entry) = read_dir.next_entry().await? {
            let file_type = entry.file_type().await?;
            let kind = if file_type.is_dir() {
                EntryKind::Folder
            } else if file_type.is_file() {
                EntryKind::File
            } else {
                debug!("Ignorando entrada especial: {}", entry.path().display());
                continue;
            };
            entries.push(StorageEntry {
                name: entry.file_name().to_string_lossy().to_string(),
                kind,
                reference: StorageRef::new(entry.path()),
            });
        }

        // Carpetas primero y después orden alfabético.
        entries.sort_by(|a, b| {
            let a_is_dir = a.kind == EntryKind::Folder;
            let b_is_dir = b.kind == EntryKind::Folder;
            b_is_dir.cmp(&a_is_dir).then_with(|| a.name.cmp(&b.name))
        });
        Ok(entries)
    }

    async fn read_text(&self, file: &StorageRef) -> Result<String> {
        tokio::fs::read_to_string(file.as_path())
            .await
            .with_context(|| format!("No se pudo leer {} como texto UTF-8", file.display()))
    }

    async fn write_text(&self, file: &StorageRef, text: &str) -> Result<()> {
        tokio::fs::write(file.as_path(), text)
            .await
            .with_context(|| format!("No se pudo escribir {}", file.display()))
    }

    async fn file_size(&self, file: &StorageRef) -> Result<u64> {
        Ok(tokio::fs::metadata(file.as_path()).await?.len())
    }

    async fn create_file(&self, dir: &StorageRef, name: &str) -> Result<StorageRef> {
        let path = dir.as_path().join(name);
        tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await
            .with_context(|| format!("No se pudo crear el fichero {}", path.display()))?;
        Ok(StorageRef::new(path))
    }

    async fn create_directory(&self, dir: &StorageRef, name: &str) -> Result<StorageRef> {
        let path = dir.as_path().join(name);
        tokio::fs::create_dir(&path)
            .await
            .with_context(|| format!("No se pudo crear la carpeta {}", path.display()))?;
        Ok(StorageRef::new(path))
    }

    async fn remove(&self, target: &StorageRef, recursive: bool) -> Result<()> {
        let path = target.as_path();
        let meta = tokio::fs::metadata(path)
            .await
            .with_context(|| format!("No existe {}", path.display()))?;
        if meta.is_dir() {
            if recursive {
                tokio::fs::remove_dir_all(path).await?;
            } else {
                tokio::fs::remove_dir(path)
                    .await
                    .map_err(|e| anyhow!("No se pudo eliminar la carpeta {}: {e}", path.display()))?;
            }
        } else {
            tokio::fs::remove_file(path).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::{assert_err, assert_ok};

    #[tokio::test]
    async fn enumerate_lists_folders_first() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("b.rs"), "fn main() {}").unwrap();
        std::fs::write(dir.path().join("a.md"), "# hola").unwrap();
        std::fs::create_dir(dir.path().join("src")).unwrap();

        let storage = LocalStorage;
        let entries = storage
            .enumerate(&StorageRef::new(dir.path()))
            .await
            .unwrap();
        let names: Vec<_> = entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["src", "a.md", "b.rs"]);
        assert_eq!(entries[0].kind, EntryKind::Folder);
    }

    #[tokio::test]
    async fn create_write_read_and_remove() {
        let dir = tempfile::tempdir().unwrap();
        let storage = LocalStorage;
        let root = StorageRef::new(dir.path());

        let sub = storage.create_directory(&root, "lib").await.unwrap();
        let file = storage.create_file(&sub, "x.txt").await.unwrap();
        assert_ok!(storage.write_text(&file, "contenido").await);
        assert_eq!(storage.read_text(&file).await.unwrap(), "contenido");
        assert_eq!(storage.file_size(&file).await.unwrap(), 9);

        // Crear dos veces el mismo fichero falla.
        assert_err!(storage.create_file(&sub, "x.txt").await);

        assert_err!(storage.remove(&sub, false).await);
        assert_ok!(storage.remove(&sub, true).await);
        assert!(!dir.path().join("lib").exists());
    }
}
