use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use axum::Router;
use codi_rag_webapp::{
    api,
    app_state::AppState,
    config::{AppConfig, VectorBackend},
    llm::LlmManager,
    neo4j_client::Neo4jVectorStore,
    storage::LocalStorage,
    vector_store::{InMemoryVectorStore, VectorStore},
};
use tokio::sync::oneshot;
use tower_http::{
    cors::{Any, CorsLayer},
    services::ServeDir,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Cargar .env e inicializar logging
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // 2. Cargar configuración
    let cfg = AppConfig::from_env().context("Error al cargar la configuración")?;

    // 3. Vector store: en memoria o Neo4j
    let store: Arc<dyn VectorStore> = match cfg.vector_backend {
        VectorBackend::Memory => {
            info!("Usando vector store en memoria (los índices se pierden al cerrar).");
            Arc::new(InMemoryVectorStore::new())
        }
        VectorBackend::Neo4j => {
            let neo4j = cfg
                .neo4j
                .as_ref()
                .ok_or_else(|| anyhow!("Falta la configuración de Neo4j"))?;
            Arc::new(
                Neo4jVectorStore::connect(neo4j)
                    .await
                    .context("Error conectando a Neo4j")?,
            )
        }
    };

    // 4. Inicializar gestor de LLMs (embeddings + chat)
    let llm_manager =
        Arc::new(LlmManager::from_config(&cfg).context("Error inicializando LLM Manager")?);

    // Crear canal para la señal de apagado.
    let (shutdown_tx, shutdown_rx) = oneshot::channel();

    // 5. Crear estado compartido de la aplicación
    let app_state = AppState::new(
        cfg.clone(),
        llm_manager.clone(),
        llm_manager,
        store,
        Arc::new(LocalStorage),
        Some(shutdown_tx),
    )?;

    // 6. Configurar el router de la API y el servicio de ficheros estáticos
    let app = Router::new()
        .merge(api::create_router(app_state))
        .fallback_service(ServeDir::new("frontend"))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        );

    // 7. Iniciar el servidor
    let listener = tokio::net::TcpListener::bind(&cfg.server_addr)
        .await
        .with_context(|| format!("No se pudo escuchar en {}", cfg.server_addr))?;
    let server_url = format!("http://{}", cfg.server_addr);
    info!("🚀 Servidor escuchando en {}", &server_url);

    // Abrir el frontend en el navegador por defecto
    if cfg.open_browser && webbrowser::open(&server_url).is_err() {
        info!("No se pudo abrir el navegador. Por favor, accede a {} manualmente.", server_url);
    }

    // Configurar el apagado ordenado.
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            shutdown_rx.await.ok();
            info!("Señal de apagado recibida, iniciando cierre del servidor.");
        })
        .await?;

    info!("✅ Servidor cerrado correctamente.");
    Ok(())
}
