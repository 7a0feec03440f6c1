//! Indexado de chunks: embeddings por lotes y escritura en el vector store.
//!
//! Las llamadas sobre un mismo namespace se serializan con un mutex por
//! namespace; namespaces distintos se indexan en paralelo.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use futures::stream::{self, StreamExt};
use serde::Serialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{PipelineError, Stage};
use crate::llm::Embedder;
use crate::models::{Chunk, Namespace};
use crate::vector_store::{VectorRecord, VectorStore};

/// Lotes de embeddings en vuelo a la vez dentro de una llamada.
const EMBED_CONCURRENCY: usize = 4;

/// Resumen de una operación de indexado.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexSummary {
    pub namespace: String,
    pub chunk_count: usize,
}

pub struct Indexer {
    embedder: Arc<dyn Embedder>,
    store: Arc<dyn VectorStore>,
    batch_size: usize,
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl Indexer {
    pub fn new(embedder: Arc<dyn Embedder>, store: Arc<dyn VectorStore>, batch_size: usize) -> Self {
        Self {
            embedder,
            store,
            batch_size: batch_size.max(1),
            locks: Mutex::new(HashMap::new()),
        }
    }

    fn lock_map(&self) -> std::sync::MutexGuard<'_, HashMap<String, Arc<tokio::sync::Mutex<()>>>> {
        match self.locks.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn namespace_lock(&self, namespace: &Namespace) -> Arc<tokio::sync::Mutex<()>> {
        self.lock_map()
            .entry(namespace.as_str().to_string())
            .or_default()
            .clone()
    }

    /// Suelta la referencia a `lock` y borra la entrada del mapa si nadie
    /// más la está usando.
    fn release_namespace_lock(&self, namespace: &Namespace, lock: Arc<tokio::sync::Mutex<()>>) {
        let mut locks = self.lock_map();
        // Una referencia es la del mapa y otra la nuestra.
        if Arc::strong_count(&lock) == 2 {
            locks.remove(namespace.as_str());
        }
    }

    #[cfg(test)]
    fn tracked_namespaces(&self) -> usize {
        self.lock_map().len()
    }

    pub async fn index(
        &self,
        chunks: Vec<Chunk>,
        namespace: &Namespace,
    ) -> Result<IndexSummary, PipelineError> {
        self.index_with_progress(chunks, namespace, |_, _| {}).await
    }

    /// Igual que [`Indexer::index`], notificando `(escritos, total)` tras cada lote.
    pub async fn index_with_progress<F>(
        &self,
        chunks: Vec<Chunk>,
        namespace: &Namespace,
        on_progress: F,
    ) -> Result<IndexSummary, PipelineError>
    where
        F: Fn(usize, usize) + Send + Sync,
    {
        if chunks.is_empty() {
            return Err(PipelineError::EmptyInput);
        }

        let lock = self.namespace_lock(namespace);
        let result = {
            let _guard = lock.lock().await;
            self.index_locked(chunks, namespace, on_progress).await
        };
        self.release_namespace_lock(namespace, lock);
        result
    }

    /// Un namespace ya indexado sólo admite vectores del mismo modelo.
    async fn ensure_same_model(&self, namespace: &Namespace) -> Result<(), PipelineError> {
        let model = self.embedder.model_id();
        let info = self
            .store
            .namespace_info(namespace)
            .await
            .map_err(|e| PipelineError::collaborator(Stage::Indexing, e))?;
        match info {
            Some(info) if !info.embedding_model.is_empty() && info.embedding_model != model => {
                warn!(
                    "'{}' se indexó con '{}'; se rechaza indexar con '{}'",
                    namespace, info.embedding_model, model
                );
                Err(PipelineError::EmbeddingModelMismatch {
                    stage: Stage::Indexing,
                    namespace: namespace.as_str().to_string(),
                    indexed_with: info.embedding_model,
                    current_model: model.to_string(),
                })
            }
            _ => Ok(()),
        }
    }

    async fn index_locked<F>(
        &self,
        mut chunks: Vec<Chunk>,
        namespace: &Namespace,
        on_progress: F,
    ) -> Result<IndexSummary, PipelineError>
    where
        F: Fn(usize, usize) + Send + Sync,
    {
        self.ensure_same_model(namespace).await?;

        for chunk in &mut chunks {
            chunk.metadata.namespace = namespace.as_str().to_string();
        }

        let total = chunks.len();
        let batches: Vec<Vec<Chunk>> = chunks
            .chunks(self.batch_size)
            .map(|batch| batch.to_vec())
            .collect();
        info!(
            "Indexando {} chunks en '{}' ({} lotes)",
            total,
            namespace,
            batches.len()
        );

        let embedder = self.embedder.clone();
        let mut embedded = stream::iter(batches.into_iter().enumerate())
            .map(|(batch_idx, batch)| {
                let embedder = embedder.clone();
                async move {
                    let texts = batch.iter().map(|c| c.content.clone()).collect();
                    let vectors = embedder.embed(texts).await;
                    (batch_idx, batch, vectors)
                }
            })
            .buffered(EMBED_CONCURRENCY);

        let mut written = 0usize;
        while let Some((batch_idx, batch, vectors)) = embedded.next().await {
            let result = match vectors {
                Ok(vectors) if vectors.len() == batch.len() => {
                    let base = written;
                    let records = batch
                        .into_iter()
                        .zip(vectors)
                        .enumerate()
                        .map(|(i, (chunk, vector))| VectorRecord {
                            id: Uuid::new_v4().to_string(),
                            ordinal: base + i,
                            vector,
                            chunk,
                        })
                        .collect::<Vec<_>>();
                    let count = records.len();
                    self.store
                        .upsert(namespace, self.embedder.model_id(), records)
                        .await
                        .map(|_| count)
                }
                Ok(vectors) => Err(anyhow::anyhow!(
                    "El lote {} devolvió {} embeddings para {} chunks",
                    batch_idx,
                    vectors.len(),
                    batch.len()
                )),
                Err(err) => Err(err),
            };

            match result {
                Ok(count) => {
                    written += count;
                    debug!("Lote {} escrito ({}/{})", batch_idx, written, total);
                    on_progress(written, total);
                }
                Err(err) if written == 0 => {
                    return Err(PipelineError::collaborator(Stage::Indexing, err));
                }
                Err(err) => {
                    warn!(
                        "Indexación de '{}' interrumpida tras {} de {} chunks: {}",
                        namespace, written, total, err
                    );
                    return Err(PipelineError::PartialIndex {
                        namespace: namespace.as_str().to_string(),
                        written,
                        total,
                        message: err.to_string(),
                    });
                }
            }
        }

        info!("✅ {} chunks indexados en '{}'", written, namespace);
        Ok(IndexSummary {
            namespace: namespace.as_str().to_string(),
            chunk_count: written,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{chunk, FakeEmbedder};
    use crate::vector_store::{InMemoryVectorStore, SearchFilter};
    use std::sync::atomic::Ordering;
    use std::time::Duration;

    fn ns(repo: &str) -> Namespace {
        Namespace::new("test", repo).unwrap()
    }

    #[tokio::test]
    async fn empty_input_is_rejected() {
        let indexer = Indexer::new(
            Arc::new(FakeEmbedder::default()),
            Arc::new(InMemoryVectorStore::new()),
            8,
        );
        let err = indexer.index(Vec::new(), &ns("r")).await.unwrap_err();
        assert!(matches!(err, PipelineError::EmptyInput));
    }

    #[tokio::test]
    async fn writes_all_chunks_with_namespace_and_order() {
        let store = Arc::new(InMemoryVectorStore::new());
        let indexer = Indexer::new(Arc::new(FakeEmbedder::default()), store.clone(), 2);
        let chunks = (0..5).map(|i| chunk("a.rs", &format!("fn f{i}() {{}}"))).collect();

        let progress = Mutex::new(Vec::new());
        let summary = indexer
            .index_with_progress(chunks, &ns("r"), |w, t| progress.lock().unwrap().push((w, t)))
            .await
            .unwrap();

        assert_eq!(summary.chunk_count, 5);
        assert_eq!(*progress.lock().unwrap(), vec![(2, 5), (4, 5), (5, 5)]);
        let info = store.namespace_info(&ns("r")).await.unwrap().unwrap();
        assert_eq!(info.chunk_count, 5);
        assert_eq!(info.embedding_model, "fake-embedder");

        let hits = store
            .search(&ns("r"), &[1.0; 8], 10, &SearchFilter::default())
            .await
            .unwrap();
        assert!(hits.iter().all(|h| h.chunk.metadata.namespace == "test-r"));
    }

    #[tokio::test]
    async fn first_batch_failure_is_an_indexing_error() {
        let embedder = FakeEmbedder {
            fail_on: Some("uno"),
            ..FakeEmbedder::default()
        };
        let indexer = Indexer::new(Arc::new(embedder), Arc::new(InMemoryVectorStore::new()), 2);
        let err = indexer
            .index(vec![chunk("a", "uno"), chunk("a", "dos")], &ns("r"))
            .await
            .unwrap_err();
        assert_eq!(err.stage(), Some(Stage::Indexing));
        assert!(matches!(err, PipelineError::Collaborator { .. }));
    }

    #[tokio::test]
    async fn later_failure_reports_partial_index() {
        let embedder = FakeEmbedder {
            fail_on: Some("dos"),
            ..FakeEmbedder::default()
        };
        let indexer = Indexer::new(Arc::new(embedder), Arc::new(InMemoryVectorStore::new()), 1);
        let err = indexer
            .index(
                vec![chunk("a", "uno"), chunk("a", "dos"), chunk("a", "tres")],
                &ns("r"),
            )
            .await
            .unwrap_err();
        match err {
            PipelineError::PartialIndex { written, total, .. } => {
                assert_eq!(written, 1);
                assert_eq!(total, 3);
            }
            other => panic!("se esperaba PartialIndex, llegó {other:?}"),
        }
    }

    #[tokio::test]
    async fn same_namespace_calls_are_serialized() {
        let embedder = Arc::new(FakeEmbedder {
            delay: Some(Duration::from_millis(20)),
            ..FakeEmbedder::default()
        });
        let indexer = Indexer::new(embedder.clone(), Arc::new(InMemoryVectorStore::new()), 64);
        let target = ns("mismo");

        let (a, b) = tokio::join!(
            indexer.index(vec![chunk("a", "uno")], &target),
            indexer.index(vec![chunk("b", "dos")], &target),
        );
        assert!(a.is_ok() && b.is_ok());
        assert_eq!(embedder.max_in_flight.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn different_namespaces_run_in_parallel() {
        let embedder = Arc::new(FakeEmbedder {
            delay: Some(Duration::from_millis(20)),
            ..FakeEmbedder::default()
        });
        let indexer = Indexer::new(embedder.clone(), Arc::new(InMemoryVectorStore::new()), 64);

        let (uno, dos) = (ns("uno"), ns("dos"));
        let (a, b) = tokio::join!(
            indexer.index(vec![chunk("a", "uno")], &uno),
            indexer.index(vec![chunk("b", "dos")], &dos),
        );
        assert!(a.is_ok() && b.is_ok());
        assert_eq!(embedder.max_in_flight.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn reindexing_with_another_model_is_rejected_before_embedding() {
        let store = Arc::new(InMemoryVectorStore::new());
        let target = ns("r");
        Indexer::new(Arc::new(FakeEmbedder::default()), store.clone(), 8)
            .index(vec![chunk("a", "uno")], &target)
            .await
            .unwrap();

        let other = Arc::new(FakeEmbedder {
            model: Some("otro"),
            ..FakeEmbedder::default()
        });
        let err = Indexer::new(other.clone(), store.clone(), 8)
            .index(vec![chunk("b", "dos")], &target)
            .await
            .unwrap_err();

        assert!(matches!(err, PipelineError::EmbeddingModelMismatch { .. }));
        assert_eq!(err.stage(), Some(Stage::Indexing));
        assert_eq!(other.calls.load(Ordering::SeqCst), 0);
        let info = store.namespace_info(&target).await.unwrap().unwrap();
        assert_eq!(info.chunk_count, 1);
        assert_eq!(info.embedding_model, "fake-embedder");
    }

    #[tokio::test]
    async fn same_model_keeps_adding_to_the_namespace() {
        let store = Arc::new(InMemoryVectorStore::new());
        let indexer = Indexer::new(Arc::new(FakeEmbedder::default()), store.clone(), 8);
        indexer.index(vec![chunk("a", "uno")], &ns("r")).await.unwrap();
        indexer.index(vec![chunk("a", "dos")], &ns("r")).await.unwrap();
        assert_eq!(store.namespace_info(&ns("r")).await.unwrap().unwrap().chunk_count, 2);
    }

    #[tokio::test]
    async fn namespace_locks_are_dropped_once_idle() {
        let indexer = Indexer::new(
            Arc::new(FakeEmbedder::default()),
            Arc::new(InMemoryVectorStore::new()),
            8,
        );
        for repo in ["uno", "dos", "tres"] {
            indexer.index(vec![chunk("a", repo)], &ns(repo)).await.unwrap();
        }
        let _ = indexer.index(Vec::new(), &ns("cuatro")).await;
        assert_eq!(indexer.tracked_namespaces(), 0);
    }
}
