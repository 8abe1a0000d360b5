use crate::error::EmbedError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

/// Identifier of a File row. Never reused after the file is deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FileId(pub i64);

/// Identifier of a Directory row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DirectoryId(pub i64);

impl fmt::Display for FileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for DirectoryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One nearest-neighbor result, resolved back to its file path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub path: String,
    /// Cosine distance in `[0, 2]`.
    pub distance: f64,
    /// Display similarity in `[0, 1]`, see [`crate::store::similarity_from_distance`].
    pub similarity: f64,
}

/// A registered directory and how many files it currently references.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectorySummary {
    pub id: DirectoryId,
    pub path: String,
    pub file_count: i64,
}

/// Emitted once per attempted file during an analysis run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub directory_id: DirectoryId,
    pub analyzed_files: usize,
    pub total_files: usize,
}

/// A stored file with its embedding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileRecord {
    pub id: FileId,
    pub path: String,
    pub embedding: Vec<f32>,
}

/// Row counts across the store's tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreStats {
    pub files: i64,
    pub directories: i64,
    pub memberships: i64,
    pub vectors: i64,
    pub dimension: Option<usize>,
}

/// Source of fixed-length embeddings for audio files and text queries.
///
/// Audio and text embeddings must live in the same vector space, otherwise text
/// queries against analyzed audio are meaningless.
pub trait EmbeddingGenerator {
    fn generate_audio_embedding(&self, path: &Path) -> Result<Vec<f32>, EmbedError>;
    fn generate_text_embedding(&self, text: &str) -> Result<Vec<f32>, EmbedError>;
}
