//! Asistente de código RAG: indexa repositorios en un vector store, responde
//! preguntas con contexto recuperado y aplica las ediciones que propone el
//! modelo sobre un árbol de ficheros virtual.

pub mod api;
pub mod app_state;
pub mod chunker;
pub mod config;
pub mod edit_applier;
pub mod edit_protocol;
pub mod error;
pub mod indexer;
pub mod ingest;
pub mod language;
pub mod llm;
pub mod models;
pub mod neo4j_client;
pub mod prompt;
pub mod rag;
pub mod retriever;
pub mod session;
pub mod storage;
pub mod vector_store;
pub mod vfs;

#[cfg(test)]
mod testing;
