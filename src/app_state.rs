use std::sync::{Arc, Mutex};

use anyhow::Result;
use tokio::sync::oneshot;

use crate::{
    chunker::Chunker,
    config::AppConfig,
    indexer::Indexer,
    ingest::IngestService,
    llm::{ChatModel, Embedder},
    rag::RagEngine,
    session::Session,
    storage::Storage,
    vector_store::VectorStore,
};

#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub store: Arc<dyn VectorStore>,
    pub storage: Arc<dyn Storage>,
    pub ingest: Arc<IngestService>,
    pub rag: Arc<RagEngine>,
    /// Sesión abierta con `select-directory`. La consulta al modelo se hace
    /// sin mantener este lock.
    pub session: Arc<tokio::sync::Mutex<Option<Session>>>,
    pub status: Arc<Mutex<Status>>,
    pub shutdown_sender: Arc<Mutex<Option<oneshot::Sender<()>>>>,
}

impl AppState {
    pub fn new(
        config: AppConfig,
        embedder: Arc<dyn Embedder>,
        chat: Arc<dyn ChatModel>,
        store: Arc<dyn VectorStore>,
        storage: Arc<dyn Storage>,
        shutdown_sender: Option<oneshot::Sender<()>>,
    ) -> Result<Self> {
        let chunker = Chunker::new(&config.chunker)?;
        let indexer = Arc::new(Indexer::new(
            embedder.clone(),
            store.clone(),
            config.embed_batch_size,
        ));
        let ingest = Arc::new(IngestService::new(chunker, indexer));
        let rag = Arc::new(RagEngine::new(
            embedder,
            store.clone(),
            chat,
            config.retrieval_top_k,
        ));

        Ok(Self {
            config,
            store,
            storage,
            ingest,
            rag,
            session: Arc::new(tokio::sync::Mutex::new(None)),
            status: Arc::new(Mutex::new(Status {
                is_busy: false,
                message: "Servidor listo.".to_string(),
                progress: 0.0,
            })),
            shutdown_sender: Arc::new(Mutex::new(shutdown_sender)),
        })
    }
}

/// Estado de la indexación en segundo plano que consulta el frontend.
#[derive(Debug, Clone, Default, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Status {
    pub is_busy: bool,
    pub message: String,
    pub progress: f32, // Valor entre 0.0 y 1.0
}

impl Status {
    pub fn set(shared: &Mutex<Status>, is_busy: bool, message: impl Into<String>, progress: f32) {
        let mut status = match shared.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        status.is_busy = is_busy;
        status.message = message.into();
        status.progress = progress.clamp(0.0, 1.0);
    }

    pub fn snapshot(shared: &Mutex<Status>) -> Status {
        match shared.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Marca el estado como ocupado si no lo estaba. Devuelve `false` si ya
    /// había una indexación en curso.
    pub fn try_begin(shared: &Mutex<Status>, message: impl Into<String>) -> bool {
        let mut status = match shared.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if status.is_busy {
            return false;
        }
        status.is_busy = true;
        status.message = message.into();
        status.progress = 0.0;
        true
    }
}
