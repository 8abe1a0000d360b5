//! Persistent embedding store.
//!
//! Composes the [`Catalog`], the [`Membership`] ledger and the [`VectorIndex`]
//! behind three composite operations: upsert a file under a directory, delete a
//! directory with orphan cleanup, and nearest-neighbor search. Each mutating
//! operation runs in a single SQLite transaction, so the catalog and the index are
//! never observed out of step.

pub mod catalog;
pub mod membership;
pub mod schema;
pub mod vector_index;

pub use catalog::Catalog;
pub use membership::Membership;
pub use vector_index::{Neighbor, VectorIndex, cosine_distance, similarity_from_distance};

use crate::error::{StoreError, StoreResult};
use crate::traits::{DirectoryId, DirectorySummary, FileId, FileRecord, SearchHit, StoreStats};
use log::{debug, info};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};

/// Outcome of [`EmbeddingStore::delete_directory`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryRemoval {
    pub directory_existed: bool,
    /// Files that were referenced by the deleted directory.
    pub detached_files: usize,
    /// Files deleted because no other directory referenced them.
    pub removed_files: Vec<FileId>,
}

pub struct EmbeddingStore {
    db_path: String,
    conn: Connection,
}

impl EmbeddingStore {
    /// Opens (or creates) the store at `db_path` and checks its consistency.
    pub fn open(db_path: &str) -> StoreResult<Self> {
        info!("Opening embedding store at: {}", db_path);
        let conn = Connection::open(db_path)?;
        Self::init(db_path, conn)
    }

    pub fn open_in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init(":memory:", conn)
    }

    fn init(db_path: &str, conn: Connection) -> StoreResult<Self> {
        schema::create_tables(&conn)?;
        let store = EmbeddingStore {
            db_path: db_path.to_string(),
            conn,
        };
        store.verify()?;
        let stats = store.stats()?;
        info!(
            "Embedding store ready: {} files, {} directories, dimension {:?}",
            stats.files, stats.directories, stats.dimension
        );
        Ok(store)
    }

    pub fn db_path(&self) -> &str {
        &self.db_path
    }

    /// Registers a directory for analysis, reusing the id of a known path.
    pub fn register_directory(&self, path: &str) -> StoreResult<DirectoryId> {
        let id = Catalog::new(&self.conn).put_directory(path)?;
        info!("Directory {} registered with id: {}", path, id);
        Ok(id)
    }

    /// Stores `embedding` for `path` and attaches the file to `directory`.
    ///
    /// Re-upserting a known path replaces its embedding in place and keeps its id.
    pub fn upsert_file(
        &mut self,
        directory: DirectoryId,
        path: &str,
        embedding: &[f32],
    ) -> StoreResult<FileId> {
        validate_embedding(embedding)?;
        let tx = self.conn.transaction()?;

        match schema::dimension(&tx)? {
            Some(expected) if expected != embedding.len() => {
                return Err(StoreError::DimensionMismatch {
                    expected,
                    actual: embedding.len(),
                });
            }
            Some(_) => {}
            None => schema::set_dimension(&tx, embedding.len())?,
        }

        let catalog = Catalog::new(&tx);
        if !catalog.directory_exists(directory)? {
            return Err(StoreError::DirectoryNotFound(directory));
        }
        let id = catalog.put_file(path, embedding)?;
        VectorIndex::new(&tx).insert(id, embedding)?;
        Membership::new(&tx).add(id, directory)?;

        tx.commit()?;
        debug!("Upserted file {} (id {}) under directory {}", path, id, directory);
        Ok(id)
    }

    /// Deletes a directory and every file no other directory still references.
    ///
    /// Unknown ids are a no-op.
    pub fn delete_directory(&mut self, directory: DirectoryId) -> StoreResult<DirectoryRemoval> {
        let tx = self.conn.transaction()?;

        let catalog = Catalog::new(&tx);
        let membership = Membership::new(&tx);
        let index = VectorIndex::new(&tx);

        let directory_existed = catalog.remove_directory(directory)?;
        let candidates = membership.remove_for_directory(directory)?;
        let mut removed_files = Vec::new();
        for id in &candidates {
            if membership.has_any(*id)? {
                continue;
            }
            catalog.remove_file(*id)?;
            index.remove(*id)?;
            removed_files.push(*id);
        }

        tx.commit()?;
        info!(
            "Deleted directory {} (existed: {}): detached {} files, removed {} orphans",
            directory,
            directory_existed,
            candidates.len(),
            removed_files.len()
        );
        Ok(DirectoryRemoval {
            directory_existed,
            detached_files: candidates.len(),
            removed_files,
        })
    }

    /// Returns up to `k` files nearest to `query`, closest first.
    pub fn search(&self, query: &[f32], k: usize) -> StoreResult<Vec<SearchHit>> {
        validate_embedding(query)?;
        match schema::dimension(&self.conn)? {
            None => return Ok(Vec::new()),
            Some(expected) if expected != query.len() => {
                return Err(StoreError::DimensionMismatch {
                    expected,
                    actual: query.len(),
                });
            }
            Some(_) => {}
        }

        let neighbors = VectorIndex::new(&self.conn).knn(query, k)?;
        let catalog = Catalog::new(&self.conn);
        let mut hits = Vec::with_capacity(neighbors.len());
        for neighbor in neighbors {
            let path = catalog.get_file(neighbor.id).map_err(|e| match e {
                StoreError::FileNotFound(id) => StoreError::Consistency(format!(
                    "vector index holds file id {id} which is missing from the catalog"
                )),
                other => other,
            })?;
            hits.push(SearchHit {
                path,
                distance: neighbor.distance,
                similarity: similarity_from_distance(neighbor.distance),
            });
        }
        debug!("Search returned {} results.", hits.len());
        Ok(hits)
    }

    pub fn list_directories(&self) -> StoreResult<Vec<DirectorySummary>> {
        Catalog::new(&self.conn).list_directories()
    }

    /// Looks up a stored file by path.
    pub fn file(&self, path: &str) -> StoreResult<FileRecord> {
        Catalog::new(&self.conn).get_file_by_path(path)
    }

    /// Directories that currently reference the file at `path`.
    pub fn directories_for_file(&self, path: &str) -> StoreResult<Vec<DirectoryId>> {
        let record = self.file(path)?;
        Membership::new(&self.conn).directories_for_file(record.id)
    }

    pub fn stats(&self) -> StoreResult<StoreStats> {
        let catalog = Catalog::new(&self.conn);
        Ok(StoreStats {
            files: catalog.file_count()?,
            directories: catalog.directory_count()?,
            memberships: Membership::new(&self.conn).count()?,
            vectors: VectorIndex::new(&self.conn).len()?,
            dimension: schema::dimension(&self.conn)?,
        })
    }

    /// Checks that the catalog and the vector index hold exactly the same files.
    pub fn verify(&self) -> StoreResult<()> {
        let catalog_ids = Catalog::new(&self.conn).file_ids()?;
        let index = VectorIndex::new(&self.conn);
        let index_ids = index.ids()?;

        if let Some(id) = index_ids.difference(&catalog_ids).next() {
            return Err(StoreError::Consistency(format!(
                "vector index holds file id {id} which is missing from the catalog"
            )));
        }
        if let Some(id) = catalog_ids.difference(&index_ids).next() {
            return Err(StoreError::Consistency(format!(
                "catalog file id {id} has no vector in the index"
            )));
        }
        if let Some(dimension) = schema::dimension(&self.conn)? {
            index.check_dimension(dimension)?;
        }
        debug!("Store consistency check passed for {} files.", catalog_ids.len());
        Ok(())
    }
}

fn validate_embedding(embedding: &[f32]) -> StoreResult<()> {
    if embedding.is_empty() {
        return Err(StoreError::InvalidEmbedding("embedding is empty".to_string()));
    }
    if let Some(position) = embedding.iter().position(|x| !x.is_finite()) {
        return Err(StoreError::InvalidEmbedding(format!(
            "non-finite value at position {position}"
        )));
    }
    Ok(())
}
