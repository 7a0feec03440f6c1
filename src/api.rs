use std::path::PathBuf;

use axum::{
    extract::{Json, Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{delete, get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::spawn;
use tracing::{error, info};

use crate::{
    app_state::{AppState, Status},
    edit_applier::BatchReport,
    error::{PipelineError, Stage, TreeError},
    ingest::{IngestionSummary, ProcessRequest},
    models::{EntryKind, Message, Namespace, NodeId},
    prompt::SYSTEM_INSTRUCTION,
    rag::RagAnswer,
    session::Session,
    storage::StorageRef,
    vfs::{ExclusionPolicy, PersistReport, VirtualFileTree},
};

type ApiError = (StatusCode, Json<serde_json::Value>);
type ApiResult<T> = Result<T, ApiError>;

// --- Payloads de la API ---

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryPayload {
    query: String,
    #[serde(default, alias = "username")]
    owner: String,
    #[serde(default, alias = "repoName")]
    repository: String,
    #[serde(default)]
    current_filename: Option<String>,
}

#[derive(Deserialize)]
pub struct SelectDirPayload {
    path: String,
}

#[derive(Deserialize)]
pub struct NodePayload {
    id: NodeId,
}

#[derive(Deserialize)]
pub struct UpdateFilePayload {
    id: NodeId,
    content: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateNodePayload {
    parent_id: NodeId,
    name: String,
    kind: EntryKind,
}

#[derive(Deserialize)]
pub struct AskPayload {
    question: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplyEditsPayload {
    message_id: String,
    #[serde(default)]
    index: Option<usize>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenFileResponse {
    id: NodeId,
    path: String,
    content: String,
    is_modified: bool,
}

// --- Router ---

pub fn create_router(app_state: AppState) -> Router {
    Router::new()
        // Repositorios (sin estado)
        .route("/api/repo/process", post(process_repository_handler))
        .route("/api/repo/query", post(query_repository_handler))
        .route("/api/repo/:owner/:repository", delete(delete_repository_handler))
        .route("/api/repo/:owner", get(list_repositories_handler))
        .route("/api/health", get(health_handler))
        .route("/api/system-prompt", get(system_prompt_handler))
        // Sesión: árbol de ficheros
        .route("/api/select-directory", post(select_directory_handler))
        .route("/api/tree", get(tree_handler))
        .route("/api/file/open", post(open_file_handler))
        .route("/api/file/update", post(update_file_handler))
        .route("/api/file/save", post(save_file_handler))
        .route("/api/file/create", post(create_node_handler))
        .route("/api/file/delete", post(delete_node_handler))
        .route("/api/save-all", post(save_all_handler))
        // Sesión: indexado y conversación
        .route("/api/ingest", post(ingest_handler))
        .route("/api/status", get(status_handler))
        .route("/api/ask", post(ask_handler))
        .route("/api/ask/cancel", post(cancel_ask_handler))
        .route("/api/edits/apply", post(apply_edits_handler))
        .route("/api/messages", get(messages_handler))
        .route("/api/shutdown", post(shutdown_handler))
        .with_state(app_state)
}

// --- Traducción de errores ---

fn error_body(status: StatusCode, message: String, stage: Option<Stage>) -> ApiError {
    (status, Json(json!({ "error": message, "stage": stage })))
}

fn pipeline_error(err: PipelineError) -> ApiError {
    let status = match &err {
        PipelineError::EmptyInput | PipelineError::InvalidInput(_) => StatusCode::BAD_REQUEST,
        PipelineError::NamespaceNotFound(_) => StatusCode::NOT_FOUND,
        PipelineError::EmbeddingModelMismatch { .. } | PipelineError::TurnInFlight => {
            StatusCode::CONFLICT
        }
        PipelineError::Collaborator { stage: Stage::Storage, .. } => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
        PipelineError::Collaborator { .. } | PipelineError::PartialIndex { .. } => {
            StatusCode::BAD_GATEWAY
        }
    };
    if status.is_server_error() {
        error!("{}", err);
    }
    error_body(status, err.to_string(), err.stage())
}

fn tree_error(err: TreeError) -> ApiError {
    let (status, stage) = match &err {
        TreeError::NodeNotFound(_) => (StatusCode::NOT_FOUND, None),
        TreeError::AlreadyExists(_) => (StatusCode::CONFLICT, None),
        TreeError::NotAFolder(_)
        | TreeError::NotAFile(_)
        | TreeError::InvalidName(_)
        | TreeError::RootRemoval => (StatusCode::BAD_REQUEST, None),
        TreeError::Storage { .. } => (StatusCode::INTERNAL_SERVER_ERROR, Some(Stage::Storage)),
    };
    if stage.is_some() {
        error!("{:?}", err);
    }
    error_body(status, err.to_string(), stage)
}

fn no_session() -> ApiError {
    error_body(
        StatusCode::BAD_REQUEST,
        "Primero debe seleccionar un directorio.".to_string(),
        None,
    )
}

fn tree_json(tree: &VirtualFileTree) -> ApiResult<serde_json::Value> {
    serde_json::to_value(tree.root()).map_err(|e| {
        error_body(
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("No se pudo serializar el árbol: {e}"),
            None,
        )
    })
}

// --- Handlers: repositorios ---

#[axum::debug_handler]
async fn process_repository_handler(
    State(state): State<AppState>,
    Json(payload): Json<ProcessRequest>,
) -> ApiResult<Json<IngestionSummary>> {
    let summary = state
        .ingest
        .process_repository(payload)
        .await
        .map_err(pipeline_error)?;
    info!("{}", summary);
    Ok(Json(summary))
}

#[axum::debug_handler]
async fn query_repository_handler(
    State(state): State<AppState>,
    Json(payload): Json<QueryPayload>,
) -> ApiResult<Json<RagAnswer>> {
    let namespace = Namespace::new(&payload.owner, &payload.repository).map_err(pipeline_error)?;
    let answer = state
        .rag
        .query(&payload.query, &namespace, payload.current_filename.as_deref())
        .await
        .map_err(pipeline_error)?;
    Ok(Json(answer))
}

#[axum::debug_handler]
async fn delete_repository_handler(
    State(state): State<AppState>,
    Path((owner, repository)): Path<(String, String)>,
) -> ApiResult<Json<serde_json::Value>> {
    let namespace = Namespace::new(&owner, &repository).map_err(pipeline_error)?;
    let existed = state
        .store
        .delete_namespace(&namespace)
        .await
        .map_err(|e| pipeline_error(PipelineError::collaborator(Stage::Indexing, e)))?;
    info!("Repositorio '{}' eliminado (existía: {})", namespace, existed);
    Ok(Json(json!({ "success": true, "namespace": namespace, "existed": existed })))
}

#[axum::debug_handler]
async fn list_repositories_handler(
    State(state): State<AppState>,
    Path(owner): Path<String>,
) -> ApiResult<Json<serde_json::Value>> {
    let prefix = format!("{}-", owner.trim());
    let namespaces = state
        .store
        .list_namespaces(&prefix)
        .await
        .map_err(|e| pipeline_error(PipelineError::collaborator(Stage::Retrieval, e)))?;
    let repositories: Vec<&str> = namespaces
        .iter()
        .filter_map(|ns| ns.strip_prefix(prefix.as_str()))
        .collect();
    Ok(Json(json!({ "owner": owner, "repositories": repositories })))
}

#[axum::debug_handler]
async fn health_handler(State(state): State<AppState>) -> ApiResult<Json<serde_json::Value>> {
    match state.store.health_check().await {
        Ok(()) => Ok(Json(json!({
            "status": "ok",
            "backend": format!("{:?}", state.config.vector_backend).to_lowercase(),
        }))),
        Err(e) => {
            error!("Error en el health check del vector store: {}", e);
            Err(error_body(
                StatusCode::SERVICE_UNAVAILABLE,
                e.to_string(),
                Some(Stage::Retrieval),
            ))
        }
    }
}

#[axum::debug_handler]
async fn system_prompt_handler() -> Json<serde_json::Value> {
    Json(json!({ "systemPrompt": SYSTEM_INSTRUCTION }))
}

// --- Handlers: árbol de ficheros de la sesión ---

#[axum::debug_handler]
async fn select_directory_handler(
    State(state): State<AppState>,
    Json(payload): Json<SelectDirPayload>,
) -> ApiResult<Json<serde_json::Value>> {
    let path = PathBuf::from(payload.path.trim());
    let is_dir = tokio::fs::metadata(&path)
        .await
        .map(|m| m.is_dir())
        .unwrap_or(false);
    if !is_dir {
        return Err(error_body(
            StatusCode::BAD_REQUEST,
            "La ruta proporcionada no es un directorio válido.".to_string(),
            None,
        ));
    }

    let root_name = path
        .file_name()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| path.to_string_lossy().to_string());
    let namespace = Namespace::from_folder_name(&root_name).map_err(pipeline_error)?;
    let policy = ExclusionPolicy::new(&state.config.excluded_dirs);

    let tree = VirtualFileTree::load(state.storage.clone(), StorageRef::new(path.clone()), &root_name, &policy)
        .await
        .map_err(tree_error)?
        .with_display_limit(state.config.max_display_file_bytes);
    let tree_value = tree_json(&tree)?;

    *state.session.lock().await = Some(Session::new(tree, namespace.clone()));
    info!("Directorio fijado: {}", path.display());
    Ok(Json(json!({ "namespace": namespace, "tree": tree_value })))
}

#[axum::debug_handler]
async fn tree_handler(State(state): State<AppState>) -> ApiResult<Json<serde_json::Value>> {
    let guard = state.session.lock().await;
    let session = guard.as_ref().ok_or_else(no_session)?;
    Ok(Json(tree_json(session.tree())?))
}

#[axum::debug_handler]
async fn open_file_handler(
    State(state): State<AppState>,
    Json(payload): Json<NodePayload>,
) -> ApiResult<Json<OpenFileResponse>> {
    let mut guard = state.session.lock().await;
    let session = guard.as_mut().ok_or_else(no_session)?;
    let content = session.open_file(&payload.id).await.map_err(tree_error)?;
    let node = session
        .tree()
        .find_by_id(&payload.id)
        .ok_or_else(|| tree_error(TreeError::NodeNotFound(payload.id.to_string())))?;
    Ok(Json(OpenFileResponse {
        id: payload.id.clone(),
        path: node.path().to_string(),
        content,
        is_modified: node.is_modified(),
    }))
}

#[axum::debug_handler]
async fn update_file_handler(
    State(state): State<AppState>,
    Json(payload): Json<UpdateFilePayload>,
) -> ApiResult<StatusCode> {
    let mut guard = state.session.lock().await;
    let session = guard.as_mut().ok_or_else(no_session)?;
    session
        .update_file(&payload.id, payload.content)
        .map_err(tree_error)?;
    Ok(StatusCode::NO_CONTENT)
}

#[axum::debug_handler]
async fn save_file_handler(
    State(state): State<AppState>,
    Json(payload): Json<NodePayload>,
) -> ApiResult<StatusCode> {
    let mut guard = state.session.lock().await;
    let session = guard.as_mut().ok_or_else(no_session)?;
    session
        .tree_mut()
        .persist(&payload.id)
        .await
        .map_err(tree_error)?;
    Ok(StatusCode::NO_CONTENT)
}

#[axum::debug_handler]
async fn create_node_handler(
    State(state): State<AppState>,
    Json(payload): Json<CreateNodePayload>,
) -> ApiResult<(StatusCode, Json<serde_json::Value>)> {
    let mut guard = state.session.lock().await;
    let session = guard.as_mut().ok_or_else(no_session)?;
    let id = session
        .tree_mut()
        .create_node(&payload.parent_id, &payload.name, payload.kind)
        .await
        .map_err(tree_error)?;
    let tree_value = tree_json(session.tree())?;
    Ok((StatusCode::CREATED, Json(json!({ "id": id, "tree": tree_value }))))
}

#[axum::debug_handler]
async fn delete_node_handler(
    State(state): State<AppState>,
    Json(payload): Json<NodePayload>,
) -> ApiResult<Json<serde_json::Value>> {
    let mut guard = state.session.lock().await;
    let session = guard.as_mut().ok_or_else(no_session)?;
    let removed = session.delete_node(&payload.id).await.map_err(tree_error)?;
    let tree_value = tree_json(session.tree())?;
    Ok(Json(json!({ "removed": removed, "tree": tree_value })))
}

#[axum::debug_handler]
async fn save_all_handler(State(state): State<AppState>) -> ApiResult<Json<PersistReport>> {
    let mut guard = state.session.lock().await;
    let session = guard.as_mut().ok_or_else(no_session)?;
    Ok(Json(session.tree_mut().persist_all().await))
}

// --- Handlers: indexado y conversación de la sesión ---

#[axum::debug_handler]
async fn ingest_handler(State(state): State<AppState>) -> ApiResult<StatusCode> {
    // Con la sesión bloqueada sólo se toma la foto del árbol; la lectura y el
    // indexado van fuera del bloqueo.
    let (snapshot, namespace) = {
        let guard = state.session.lock().await;
        let session = guard.as_ref().ok_or_else(no_session)?;
        if !Status::try_begin(&state.status, "Leyendo ficheros del árbol...") {
            return Err(error_body(
                StatusCode::CONFLICT,
                "Ya hay una indexación en curso.".to_string(),
                Some(Stage::Indexing),
            ));
        }
        (session.tree().source_snapshot(), session.namespace().clone())
    };

    spawn(async move {
        let files = snapshot.read(state.ingest.max_file_bytes()).await;
        let result = state
            .ingest
            .index_sources(files, &namespace, Some(state.status.as_ref()))
            .await;

        match result {
            Ok(summary) => {
                Status::set(
                    &state.status,
                    false,
                    format!("¡Indexación completada! {}", summary),
                    0.0,
                );
            }
            Err(err) => {
                error!("Error de ingesta: {}", err);
                Status::set(
                    &state.status,
                    false,
                    format!("Error en la indexación: {}", err),
                    0.0,
                );
            }
        }
    });

    Ok(StatusCode::ACCEPTED)
}

#[axum::debug_handler]
async fn status_handler(State(state): State<AppState>) -> Json<Status> {
    Json(Status::snapshot(&state.status))
}

#[axum::debug_handler]
async fn ask_handler(
    State(state): State<AppState>,
    Json(payload): Json<AskPayload>,
) -> ApiResult<Json<Message>> {
    let ticket = {
        let mut guard = state.session.lock().await;
        let session = guard.as_mut().ok_or_else(no_session)?;
        session.begin_turn(&payload.question).map_err(pipeline_error)?
    };

    let result = state
        .rag
        .query(&ticket.question, &ticket.namespace, ticket.current_file.as_deref())
        .await;

    let mut guard = state.session.lock().await;
    let session = guard.as_mut().ok_or_else(no_session)?;
    match result {
        Ok(rag) => session
            .complete_turn(&ticket, &rag.answer, rag.sources)
            .cloned()
            .map(Json)
            .ok_or_else(|| {
                error_body(
                    StatusCode::CONFLICT,
                    "La consulta se canceló antes de recibir la respuesta.".to_string(),
                    None,
                )
            }),
        Err(err) => {
            session.fail_turn(&ticket);
            Err(pipeline_error(err))
        }
    }
}

#[axum::debug_handler]
async fn cancel_ask_handler(State(state): State<AppState>) -> ApiResult<Json<serde_json::Value>> {
    let mut guard = state.session.lock().await;
    let session = guard.as_mut().ok_or_else(no_session)?;
    Ok(Json(json!({ "cancelled": session.cancel_turn() })))
}

#[axum::debug_handler]
async fn apply_edits_handler(
    State(state): State<AppState>,
    Json(payload): Json<ApplyEditsPayload>,
) -> ApiResult<Json<BatchReport>> {
    let mut guard = state.session.lock().await;
    let session = guard.as_mut().ok_or_else(no_session)?;
    let report = session
        .apply_edits(&payload.message_id, payload.index)
        .map_err(pipeline_error)?;
    Ok(Json(report))
}

#[axum::debug_handler]
async fn messages_handler(State(state): State<AppState>) -> ApiResult<Json<Vec<Message>>> {
    let guard = state.session.lock().await;
    let session = guard.as_ref().ok_or_else(no_session)?;
    Ok(Json(session.messages().to_vec()))
}

// --- Handler de Apagado ---

#[axum::debug_handler]
async fn shutdown_handler(State(state): State<AppState>) -> impl IntoResponse {
    info!("Petición de apagado recibida.");
    let sender = match state.shutdown_sender.lock() {
        Ok(mut guard) => guard.take(),
        Err(poisoned) => poisoned.into_inner().take(),
    };
    if let Some(sender) = sender {
        let _ = sender.send(());
    }
    StatusCode::OK
}
