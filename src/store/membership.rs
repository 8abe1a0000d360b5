use crate::error::StoreResult;
use crate::traits::{DirectoryId, FileId};
use log::debug;
use rusqlite::Connection;
use std::collections::BTreeSet;

/// Many-to-many ledger of which directories reference which files.
pub struct Membership<'c> {
    conn: &'c Connection,
}

impl<'c> Membership<'c> {
    pub fn new(conn: &'c Connection) -> Self {
        Self { conn }
    }

    /// Records that `directory` references `file`. Adding an existing pair is a no-op.
    ///
    /// Returns true if a new row was written.
    pub fn add(&self, file: FileId, directory: DirectoryId) -> StoreResult<bool> {
        let rows_affected = self.conn.execute(
            "INSERT OR IGNORE INTO file_directory_memberships (file_id, directory_id)
             VALUES (?1, ?2)",
            [file.0, directory.0],
        )?;
        debug!(
            "Membership file {} in directory {}: {}",
            file,
            directory,
            if rows_affected > 0 { "added" } else { "already present" }
        );
        Ok(rows_affected > 0)
    }

    /// Deletes every row for `directory`, returning the files that were attached to it.
    pub fn remove_for_directory(&self, directory: DirectoryId) -> StoreResult<BTreeSet<FileId>> {
        let mut stmt = self
            .conn
            .prepare("SELECT file_id FROM file_directory_memberships WHERE directory_id = ?1")?;
        let affected = stmt
            .query_map([directory.0], |row| row.get::<_, i64>(0).map(FileId))?
            .collect::<Result<BTreeSet<_>, _>>()?;

        self.conn.execute(
            "DELETE FROM file_directory_memberships WHERE directory_id = ?1",
            [directory.0],
        )?;
        debug!(
            "Detached {} files from directory {}",
            affected.len(),
            directory
        );
        Ok(affected)
    }

    pub fn has_any(&self, file: FileId) -> StoreResult<bool> {
        let exists: i64 = self.conn.query_row(
            "SELECT EXISTS (SELECT 1 FROM file_directory_memberships WHERE file_id = ?1)",
            [file.0],
            |row| row.get(0),
        )?;
        Ok(exists != 0)
    }

    pub fn directories_for_file(&self, file: FileId) -> StoreResult<Vec<DirectoryId>> {
        let mut stmt = self.conn.prepare(
            "SELECT directory_id FROM file_directory_memberships
             WHERE file_id = ?1 ORDER BY directory_id",
        )?;
        let directories = stmt
            .query_map([file.0], |row| row.get::<_, i64>(0).map(DirectoryId))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(directories)
    }

    pub fn count(&self) -> StoreResult<i64> {
        let count = self.conn.query_row(
            "SELECT COUNT(*) FROM file_directory_memberships",
            [],
            |row| row.get(0),
        )?;
        Ok(count)
    }
}
