//! Error types shared across the store, the embedding adapters and analysis.

use crate::traits::{DirectoryId, FileId};
use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by the embedding store and its components.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("file not found: id={0}")]
    FileNotFound(FileId),
    #[error("file not found: path={0}")]
    PathNotFound(String),
    #[error("directory not found: id={0}")]
    DirectoryNotFound(DirectoryId),
    #[error("embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
    #[error("invalid embedding: {0}")]
    InvalidEmbedding(String),
    /// The catalog and the vector index disagree. Indicates a storage bug.
    #[error("store consistency violated: {0}")]
    Consistency(String),
}

/// Per-file failures reported by an [`crate::EmbeddingGenerator`].
#[derive(Debug, Error)]
pub enum EmbedError {
    #[error("failed to decode {path}: {reason}")]
    Decode { path: PathBuf, reason: String },
    #[error("embedding model error: {0}")]
    Model(String),
}

/// Errors that abort an analysis run.
#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("invalid analysis root {path}: {reason}")]
    Input { path: PathBuf, reason: String },
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Errors from a text query.
#[derive(Debug, Error)]
pub enum SearchError {
    #[error(transparent)]
    Embed(#[from] EmbedError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;
