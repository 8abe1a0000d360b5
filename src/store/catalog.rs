use super::vector_index::{bytes_to_embedding, embedding_to_bytes};
use crate::error::{StoreError, StoreResult};
use crate::traits::{DirectoryId, DirectorySummary, FileId, FileRecord};
use log::debug;
use rusqlite::{Connection, OptionalExtension};
use std::collections::BTreeSet;

/// File and Directory records keyed by unique path.
pub struct Catalog<'c> {
    conn: &'c Connection,
}

impl<'c> Catalog<'c> {
    pub fn new(conn: &'c Connection) -> Self {
        Self { conn }
    }

    /// Inserts a file or overwrites the embedding of the file with the same path.
    ///
    /// The returned id is stable across overwrites.
    pub fn put_file(&self, path: &str, embedding: &[f32]) -> StoreResult<FileId> {
        self.conn.execute(
            "INSERT INTO files (path, embedding) VALUES (?1, ?2)
             ON CONFLICT(path) DO UPDATE SET embedding = excluded.embedding",
            rusqlite::params![path, embedding_to_bytes(embedding)],
        )?;
        // last_insert_rowid is not updated by the conflict branch.
        let id: i64 = self.conn.query_row(
            "SELECT id FROM files WHERE path = ?1",
            [path],
            |row| row.get(0),
        )?;
        debug!("Stored file {} with id: {}", path, id);
        Ok(FileId(id))
    }

    pub fn get_file(&self, id: FileId) -> StoreResult<String> {
        self.conn
            .query_row("SELECT path FROM files WHERE id = ?1", [id.0], |row| {
                row.get(0)
            })
            .optional()?
            .ok_or(StoreError::FileNotFound(id))
    }

    pub fn get_file_by_path(&self, path: &str) -> StoreResult<FileRecord> {
        let row: Option<(i64, Vec<u8>)> = self
            .conn
            .query_row(
                "SELECT id, embedding FROM files WHERE path = ?1",
                [path],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;
        let (id, bytes) = row.ok_or_else(|| StoreError::PathNotFound(path.to_string()))?;
        Ok(FileRecord {
            id: FileId(id),
            path: path.to_string(),
            embedding: bytes_to_embedding(&bytes)?,
        })
    }

    pub fn file_ids(&self) -> StoreResult<BTreeSet<FileId>> {
        let mut stmt = self.conn.prepare("SELECT id FROM files")?;
        let ids = stmt
            .query_map([], |row| row.get::<_, i64>(0).map(FileId))?
            .collect::<Result<BTreeSet<_>, _>>()?;
        Ok(ids)
    }

    pub fn file_count(&self) -> StoreResult<i64> {
        let count = self
            .conn
            .query_row("SELECT COUNT(*) FROM files", [], |row| row.get(0))?;
        Ok(count)
    }

    /// Registers a directory, returning the existing id if the path is known.
    pub fn put_directory(&self, path: &str) -> StoreResult<DirectoryId> {
        let rows_affected = self.conn.execute(
            "INSERT OR IGNORE INTO directories (path) VALUES (?1)",
            [path],
        )?;
        let id: i64 = self.conn.query_row(
            "SELECT id FROM directories WHERE path = ?1",
            [path],
            |row| row.get(0),
        )?;
        if rows_affected == 0 {
            debug!("Directory {} already registered with id: {}", path, id);
        } else {
            debug!("Registered directory {} with id: {}", path, id);
        }
        Ok(DirectoryId(id))
    }

    pub fn directory_exists(&self, id: DirectoryId) -> StoreResult<bool> {
        let found: Option<i64> = self
            .conn
            .query_row("SELECT id FROM directories WHERE id = ?1", [id.0], |row| {
                row.get(0)
            })
            .optional()?;
        Ok(found.is_some())
    }

    /// Returns false when no such directory existed.
    pub fn remove_directory(&self, id: DirectoryId) -> StoreResult<bool> {
        let rows_affected = self
            .conn
            .execute("DELETE FROM directories WHERE id = ?1", [id.0])?;
        Ok(rows_affected > 0)
    }

    pub fn directory_count(&self) -> StoreResult<i64> {
        let count = self
            .conn
            .query_row("SELECT COUNT(*) FROM directories", [], |row| row.get(0))?;
        Ok(count)
    }

    pub fn list_directories(&self) -> StoreResult<Vec<DirectorySummary>> {
        let mut stmt = self.conn.prepare(
            "SELECT d.id, d.path, COUNT(m.file_id)
             FROM directories d
             LEFT JOIN file_directory_memberships m ON m.directory_id = d.id
             GROUP BY d.id, d.path
             ORDER BY d.id",
        )?;
        let directories = stmt
            .query_map([], |row| {
                Ok(DirectorySummary {
                    id: DirectoryId(row.get(0)?),
                    path: row.get(1)?,
                    file_count: row.get(2)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(directories)
    }

    /// Deletes the file row for `id`. Returns false if it was not stored.
    pub fn remove_file(&self, id: FileId) -> StoreResult<bool> {
        let rows_affected = self.conn.execute("DELETE FROM files WHERE id = ?1", [id.0])?;
        if rows_affected > 0 {
            debug!("Removed file id: {}", id);
        }
        Ok(rows_affected > 0)
    }
}
