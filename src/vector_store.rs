//! Vector store particionado por namespace.
//!
//! API pública:
//!   - trait [`VectorStore`] (escritura aditiva, búsqueda por similitud, gestión de namespaces).
//!   - [`InMemoryVectorStore`]: backend en memoria con búsqueda lineal por coseno.
//!
//! El backend de Neo4j vive en `neo4j_client`.

use std::collections::HashMap;
use std::sync::RwLock;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde::Serialize;
use tracing::{debug, trace};

use crate::models::{Chunk, Namespace};

/// Chunk con su vector, listo para escribir.
#[derive(Debug, Clone)]
pub struct VectorRecord {
    pub id: String,
    /// Posición del chunk dentro de la llamada de indexado.
    pub ordinal: usize,
    pub vector: Vec<f64>,
    pub chunk: Chunk,
}

/// Resultado de una búsqueda.
#[derive(Debug, Clone, Serialize)]
pub struct ScoredChunk {
    pub score: f64,
    pub chunk: Chunk,
}

#[derive(Debug, Clone, Default)]
pub struct SearchFilter {
    /// Restringe la búsqueda a los chunks de este fichero.
    pub filename: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NamespaceInfo {
    pub name: String,
    pub embedding_model: String,
    pub chunk_count: usize,
}

#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Escritura aditiva: nunca borra vectores previos del namespace.
    async fn upsert(
        &self,
        namespace: &Namespace,
        embedding_model: &str,
        records: Vec<VectorRecord>,
    ) -> Result<()>;

    /// Top-`k` por similitud dentro de `namespace`. El orden entre empates no
    /// está definido.
    async fn search(
        &self,
        namespace: &Namespace,
        query: &[f64],
        k: usize,
        filter: &SearchFilter,
    ) -> Result<Vec<ScoredChunk>>;

    /// `None` si el namespace nunca se ha indexado.
    async fn namespace_info(&self, namespace: &Namespace) -> Result<Option<NamespaceInfo>>;

    /// Elimina todos los vectores del namespace. Devuelve si existía.
    async fn delete_namespace(&self, namespace: &Namespace) -> Result<bool>;

    /// Namespaces cuyo nombre empieza por `prefix`, ordenados.
    async fn list_namespaces(&self, prefix: &str) -> Result<Vec<String>>;

    async fn health_check(&self) -> Result<()>;
}

pub fn cosine_similarity(a: &[f64], b: &[f64]) -> f64 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f64 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f64>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f64>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

#[derive(Debug, Default)]
struct Partition {
    embedding_model: String,
    dimension: usize,
    records: Vec<VectorRecord>,
}

/// Vector store en memoria. Pensado para desarrollo local y tests.
#[derive(Debug, Default)]
pub struct InMemoryVectorStore {
    partitions: RwLock<HashMap<String, Partition>>,
}

impl InMemoryVectorStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    async fn upsert(
        &self,
        namespace: &Namespace,
        embedding_model: &str,
        records: Vec<VectorRecord>,
    ) -> Result<()> {
        debug!("Escribiendo {} vectores en '{}'", records.len(), namespace);
        let mut partitions = self
            .partitions
            .write()
            .map_err(|e| anyhow!("No se pudo bloquear el vector store: {e}"))?;

        let partition = partitions
            .entry(namespace.as_str().to_string())
            .or_default();
        if partition.records.is_empty() {
            partition.embedding_model = embedding_model.to_string();
            partition.dimension = records.first().map(|r| r.vector.len()).unwrap_or(0);
        } else if partition.embedding_model != embedding_model {
            return Err(anyhow!(
                "'{}' contiene vectores del modelo '{}', no de '{}'",
                namespace,
                partition.embedding_model,
                embedding_model
            ));
        }

        for record in &records {
            if record.vector.len() != partition.dimension {
                return Err(anyhow!(
                    "Dimensión incorrecta: se esperaba {} y llegó {}",
                    partition.dimension,
                    record.vector.len()
                ));
            }
        }
        partition.records.extend(records);
        Ok(())
    }

    async fn search(
        &self,
        namespace: &Namespace,
        query: &[f64],
        k: usize,
        filter: &SearchFilter,
    ) -> Result<Vec<ScoredChunk>> {
        let partitions = self
            .partitions
            .read()
            .map_err(|e| anyhow!("No se pudo bloquear el vector store: {e}"))?;

        let Some(partition) = partitions.get(namespace.as_str()) else {
            return Ok(Vec::new());
        };

        let mut scored: Vec<ScoredChunk> = partition
            .records
            .iter()
            .filter(|r| {
                filter
                    .filename
                    .as_deref()
                    .map(|f| r.chunk.metadata.filename == f)
                    .unwrap_or(true)
            })
            .map(|r| ScoredChunk {
                score: cosine_similarity(query, &r.vector),
                chunk: r.chunk.clone(),
            })
            .collect();

        scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(k);
        trace!("Búsqueda en '{}': {} resultados", namespace, scored.len());
        Ok(scored)
    }

    async fn namespace_info(&self, namespace: &Namespace) -> Result<Option<NamespaceInfo>> {
        let partitions = self
            .partitions
            .read()
            .map_err(|e| anyhow!("No se pudo bloquear el vector store: {e}"))?;
        Ok(partitions.get(namespace.as_str()).map(|p| NamespaceInfo {
            name: namespace.as_str().to_string(),
            embedding_model: p.embedding_model.clone(),
            chunk_count: p.records.len(),
        }))
    }

    async fn delete_namespace(&self, namespace: &Namespace) -> Result<bool> {
        let mut partitions = self
            .partitions
            .write()
            .map_err(|e| anyhow!("No se pudo bloquear el vector store: {e}"))?;
        Ok(partitions.remove(namespace.as_str()).is_some())
    }

    async fn list_namespaces(&self, prefix: &str) -> Result<Vec<String>> {
        let partitions = self
            .partitions
            .read()
            .map_err(|e| anyhow!("No se pudo bloquear el vector store: {e}"))?;
        let mut names: Vec<String> = partitions
            .keys()
            .filter(|name| name.starts_with(prefix))
            .cloned()
            .collect();
        names.sort();
        Ok(names)
    }

    async fn health_check(&self) -> Result<()> {
        Ok(())
    }
}
