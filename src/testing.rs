//! Dobles de prueba compartidos por los tests de los módulos.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;

use crate::llm::{ChatModel, Embedder};
use crate::models::{Chunk, ChunkMetadata, EntryKind};
use crate::storage::{Storage, StorageEntry, StorageRef};

pub fn chunk(filename: &str, content: &str) -> Chunk {
    Chunk {
        content: content.to_string(),
        metadata: ChunkMetadata {
            filename: filename.to_string(),
            path: filename.to_string(),
            language: "text".to_string(),
            namespace: String::new(),
            size: content.chars().count(),
        },
    }
}

/// Embedder determinista: histograma de bytes plegado en 8 dimensiones.
#[derive(Default)]
pub struct FakeEmbedder {
    pub fail_on: Option<&'static str>,
    pub delay: Option<Duration>,
    pub model: Option<&'static str>,
    pub calls: AtomicUsize,
    pub in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
}

pub fn fake_vector(text: &str) -> Vec<f64> {
    let mut v = vec![0.0; 8];
    for b in text.bytes() {
        v[(b % 8) as usize] += 1.0;
    }
    v
}

#[async_trait]
impl Embedder for FakeEmbedder {
    fn model_id(&self) -> &str {
        self.model.unwrap_or("fake-embedder")
    }

    async fn embed(&self, texts: Vec<String>) -> Result<Vec<Vec<f64>>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if let Some(bad) = self.fail_on {
            if texts.iter().any(|t| t == bad) {
                return Err(anyhow!("servicio de embeddings caído"));
            }
        }
        Ok(texts.iter().map(|t| fake_vector(t)).collect())
    }
}

/// Modelo de chat que devuelve una respuesta fija y guarda el último prompt.
pub struct FakeChat {
    pub answer: String,
    pub fail: bool,
    pub last_prompt: Mutex<Option<String>>,
}

impl FakeChat {
    pub fn answering(answer: &str) -> Self {
        Self {
            answer: answer.to_string(),
            fail: false,
            last_prompt: Mutex::new(None),
        }
    }
}

#[async_trait]
impl ChatModel for FakeChat {
    async fn complete(&self, _preamble: &str, prompt: &str) -> Result<String> {
        *self.last_prompt.lock().unwrap() = Some(prompt.to_string());
        if self.fail {
            return Err(anyhow!("límite de peticiones excedido"));
        }
        Ok(self.answer.clone())
    }
}

enum MemEntry {
    File(String),
    Dir,
}

/// Almacenamiento en memoria indexado por ruta absoluta ficticia.
pub struct MemoryStorage {
    entries: Mutex<BTreeMap<PathBuf, MemEntry>>,
    fail_writes: bool,
}

impl MemoryStorage {
    pub const ROOT: &'static str = "/repo";

    /// Crea el almacenamiento con la raíz y los ficheros dados (rutas relativas).
    pub fn with_files(files: &[(&str, &str)]) -> Self {
        let storage = Self {
            entries: Mutex::new(BTreeMap::new()),
            fail_writes: false,
        };
        {
            let mut entries = storage.entries.lock().unwrap();
            entries.insert(PathBuf::from(Self::ROOT), MemEntry::Dir);
            for (rel, content) in files {
                let path = Path::new(Self::ROOT).join(rel);
                let mut parent = path.parent();
                while let Some(dir) = parent {
                    if dir == Path::new("/") {
                        break;
                    }
                    entries.entry(dir.to_path_buf()).or_insert(MemEntry::Dir);
                    parent = dir.parent();
                }
                entries.insert(path, MemEntry::File(content.to_string()));
            }
        }
        storage
    }

    /// Toda escritura posterior falla.
    pub fn failing_writes(mut self) -> Self {
        self.fail_writes = true;
        self
    }

    pub fn root_ref() -> StorageRef {
        StorageRef::new(Self::ROOT)
    }

    pub fn contents(&self, rel: &str) -> Option<String> {
        match self.entries.lock().unwrap().get(&Path::new(Self::ROOT).join(rel)) {
            Some(MemEntry::File(c)) => Some(c.clone()),
            _ => None,
        }
    }

    pub fn exists(&self, rel: &str) -> bool {
        self.entries
            .lock()
            .unwrap()
            .contains_key(&Path::new(Self::ROOT).join(rel))
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn enumerate(&self, dir: &StorageRef) -> Result<Vec<StorageEntry>> {
        let entries = self.entries.lock().unwrap();
        let mut out = Vec::new();
        for (path, entry) in entries.iter() {
            if path.parent() == Some(dir.as_path()) {
                out.push(StorageEntry {
                    name: path.file_name().unwrap().to_string_lossy().to_string(),
                    kind: match entry {
                        MemEntry::File(_) => EntryKind::File,
                        MemEntry::Dir => EntryKind::Folder,
                    },
                    reference: StorageRef::new(path.clone()),
                });
            }
        }
        Ok(out)
    }

    async fn read_text(&self, file: &StorageRef) -> Result<String> {
        match self.entries.lock().unwrap().get(file.as_path()) {
            Some(MemEntry::File(c)) => Ok(c.clone()),
            _ => Err(anyhow!("no existe {}", file.display())),
        }
    }

    async fn write_text(&self, file: &StorageRef, text: &str) -> Result<()> {
        if self.fail_writes {
            return Err(anyhow!("disco de sólo lectura"));
        }
        self.entries
            .lock()
            .unwrap()
            .insert(file.as_path().to_path_buf(), MemEntry::File(text.to_string()));
        Ok(())
    }

    async fn file_size(&self, file: &StorageRef) -> Result<u64> {
        match self.entries.lock().unwrap().get(file.as_path()) {
            Some(MemEntry::File(c)) => Ok(c.len() as u64),
            _ => Err(anyhow!("no existe {}", file.display())),
        }
    }

    async fn create_file(&self, dir: &StorageRef, name: &str) -> Result<StorageRef> {
        let path = dir.as_path().join(name);
        let mut entries = self.entries.lock().unwrap();
        if entries.contains_key(&path) {
            return Err(anyhow!("ya existe {}", path.display()));
        }
        entries.insert(path.clone(), MemEntry::File(String::new()));
        Ok(StorageRef::new(path))
    }

    async fn create_directory(&self, dir: &StorageRef, name: &str) -> Result<StorageRef> {
        let path = dir.as_path().join(name);
        self.entries
            .lock()
            .unwrap()
            .insert(path.clone(), MemEntry::Dir);
        Ok(StorageRef::new(path))
    }

    async fn remove(&self, target: &StorageRef, _recursive: bool) -> Result<()> {
        let mut entries = self.entries.lock().unwrap();
        let before = entries.len();
        entries.retain(|path, _| !path.starts_with(target.as_path()));
        if entries.len() == before {
            return Err(anyhow!("no existe {}", target.display()));
        }
        Ok(())
    }
}
