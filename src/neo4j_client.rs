//! Integración con Neo4j como vector store para los `:Chunk`.
//!
//! Cada chunk se guarda como nodo `:Chunk` con la propiedad `namespace`; cada
//! namespace indexado tiene además un nodo `:Namespace` con el modelo de
//! embeddings usado. La búsqueda calcula la similitud coseno sólo sobre los
//! chunks del namespace pedido, así que nunca se mezclan repositorios.

use crate::config::Neo4jConfig;
use crate::models::{Chunk, ChunkMetadata, Namespace};
use crate::vector_store::{NamespaceInfo, ScoredChunk, SearchFilter, VectorRecord, VectorStore};
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use neo4rs::{query, Graph};
use tracing::{debug, info};
use url::Url;

pub async fn connect_from_config(cfg: &Neo4jConfig) -> Result<Graph> {
    let url = Url::parse(&cfg.uri)?;
    let host = url.host_str().unwrap_or("localhost");
    let port = url.port().unwrap_or(7687);
    let addr = format!("{host}:{port}");

    info!("Conectando a Neo4j en {addr}...");
    let graph = Graph::new(&addr, &cfg.user, &cfg.password).await?;
    info!("Conexión a Neo4j OK");
    Ok(graph)
}

/// Crea constraints e índices básicos para las etiquetas usadas:
/// :Chunk y :Namespace.
pub async fn ensure_schema(graph: &Graph) -> Result<()> {
    let statements = [
        // Chunk.id único
        "CREATE CONSTRAINT chunk_id IF NOT EXISTS
         FOR (c:Chunk)
         REQUIRE c.id IS UNIQUE",
        // Namespace.name único
        "CREATE CONSTRAINT namespace_name IF NOT EXISTS
         FOR (n:Namespace)
         REQUIRE n.name IS UNIQUE",
        // Filtro por namespace en cada búsqueda
        "CREATE INDEX chunk_namespace IF NOT EXISTS
         FOR (c:Chunk)
         ON (c.namespace)",
    ];

    for stmt in statements {
        graph.run(query(stmt)).await?;
    }

    info!("Esquema de Neo4j asegurado (constraints e índices creados).");
    Ok(())
}

pub struct Neo4jVectorStore {
    graph: Graph,
}

impl Neo4jVectorStore {
    pub async fn connect(cfg: &Neo4jConfig) -> Result<Self> {
        let graph = connect_from_config(cfg).await?;
        ensure_schema(&graph).await?;
        Ok(Self { graph })
    }
}

#[async_trait]
impl VectorStore for Neo4jVectorStore {
    async fn upsert(
        &self,
        namespace: &Namespace,
        embedding_model: &str,
        records: Vec<VectorRecord>,
    ) -> Result<()> {
        let tx = self.graph.start_txn().await?;

        tx.run(
            query(
                "MERGE (n:Namespace {name: $name})
                 ON CREATE SET n.embedding_model = $model, n.created_at = datetime()",
            )
            .param("name", namespace.as_str())
            .param("model", embedding_model),
        )
        .await?;

        for record in &records {
            let meta = &record.chunk.metadata;
            tx.run(
                query(
                    "MERGE (c:Chunk {id: $id})
                     SET c.namespace = $namespace, c.ordinal = $ordinal, c.content = $content,
                         c.filename = $filename, c.path = $path, c.language = $language,
                         c.size = $size, c.embedding = $embedding",
                )
                .param("id", record.id.clone())
                .param("namespace", namespace.as_str())
                .param("ordinal", record.ordinal as i64)
                .param("content", record.chunk.content.clone())
                .param("filename", meta.filename.clone())
                .param("path", meta.path.clone())
                .param("language", meta.language.clone())
                .param("size", meta.size as i64)
                .param("embedding", record.vector.clone()),
            )
            .await?;
        }

        tx.commit().await?;
        debug!("{} chunks escritos en Neo4j para '{}'", records.len(), namespace);
        Ok(())
    }

    async fn search(
        &self,
        namespace: &Namespace,
        query_vec: &[f64],
        k: usize,
        filter: &SearchFilter,
    ) -> Result<Vec<ScoredChunk>> {
        let cypher = if filter.filename.is_some() {
            "MATCH (c:Chunk {namespace: $namespace})
             WHERE c.filename = $filename
             WITH c, vector.similarity.cosine(c.embedding, $embedding) AS score
             RETURN c.content AS content, c.filename AS filename, c.path AS path,
                    c.language AS language, c.size AS size, score
             ORDER BY score DESC
             LIMIT $k"
        } else {
            "MATCH (c:Chunk {namespace: $namespace})
             WITH c, vector.similarity.cosine(c.embedding, $embedding) AS score
             RETURN c.content AS content, c.filename AS filename, c.path AS path,
                    c.language AS language, c.size AS size, score
             ORDER BY score DESC
             LIMIT $k"
        };

        let mut q = query(cypher)
            .param("namespace", namespace.as_str())
            .param("embedding", query_vec.to_vec())
            .param("k", k as i64);
        if let Some(filename) = &filter.filename {
            q = q.param("filename", filename.clone());
        }

        let mut cursor = self.graph.execute(q).await?;
        let mut output = Vec::new();
        while let Some(row) = cursor.next().await? {
            let content: String = row
                .get("content")
                .ok_or_else(|| anyhow!("Falta campo 'content' en resultado de Neo4j"))?;
            let score: f64 = row
                .get("score")
                .ok_or_else(|| anyhow!("Falta campo 'score' en resultado de Neo4j"))?;
            let size: i64 = row.get("size").unwrap_or_default();

            output.push(ScoredChunk {
                score,
                chunk: Chunk {
                    content,
                    metadata: ChunkMetadata {
                        filename: row.get("filename").unwrap_or_default(),
                        path: row.get("path").unwrap_or_default(),
                        language: row.get("language").unwrap_or_default(),
                        namespace: namespace.as_str().to_string(),
                        size: size.max(0) as usize,
                    },
                },
            });
        }

        Ok(output)
    }

    async fn namespace_info(&self, namespace: &Namespace) -> Result<Option<NamespaceInfo>> {
        let mut cursor = self
            .graph
            .execute(
                query(
                    "MATCH (n:Namespace {name: $name})
                     OPTIONAL MATCH (c:Chunk {namespace: $name})
                     RETURN n.embedding_model AS model, count(c) AS chunks",
                )
                .param("name", namespace.as_str()),
            )
            .await?;

        match cursor.next().await? {
            Some(row) => {
                let chunks: i64 = row.get("chunks").unwrap_or_default();
                Ok(Some(NamespaceInfo {
                    name: namespace.as_str().to_string(),
                    embedding_model: row.get("model").unwrap_or_default(),
                    chunk_count: chunks.max(0) as usize,
                }))
            }
            None => Ok(None),
        }
    }

    async fn delete_namespace(&self, namespace: &Namespace) -> Result<bool> {
        let existed = self.namespace_info(namespace).await?.is_some();

        let tx = self.graph.start_txn().await?;
        tx.run(
            query("MATCH (c:Chunk {namespace: $name}) DETACH DELETE c")
                .param("name", namespace.as_str()),
        )
        .await?;
        tx.run(query("MATCH (n:Namespace {name: $name}) DELETE n").param("name", namespace.as_str()))
            .await?;
        tx.commit().await?;

        info!("Namespace '{}' eliminado de Neo4j", namespace);
        Ok(existed)
    }

    async fn list_namespaces(&self, prefix: &str) -> Result<Vec<String>> {
        let mut cursor = self
            .graph
            .execute(
                query(
                    "MATCH (n:Namespace) WHERE n.name STARTS WITH $prefix
                     RETURN n.name AS name ORDER BY name",
                )
                .param("prefix", prefix),
            )
            .await?;

        let mut names = Vec::new();
        while let Some(row) = cursor.next().await? {
            if let Some(name) = row.get::<String>("name") {
                names.push(name);
            }
        }
        Ok(names)
    }

    async fn health_check(&self) -> Result<()> {
        self.graph.run(query("RETURN 1")).await?;
        Ok(())
    }
}
