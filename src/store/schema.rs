use crate::error::{StoreError, StoreResult};
use log::debug;
use rusqlite::{Connection, OptionalExtension};

const DIMENSION_KEY: &str = "dimension";

/// Creates the store tables if they are missing. Existing data is kept.
pub fn create_tables(conn: &Connection) -> StoreResult<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS files (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            path TEXT NOT NULL UNIQUE,
            embedding BLOB NOT NULL
        );
        CREATE TABLE IF NOT EXISTS directories (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            path TEXT NOT NULL UNIQUE
        );
        CREATE TABLE IF NOT EXISTS file_directory_memberships (
            file_id INTEGER NOT NULL,
            directory_id INTEGER NOT NULL,
            PRIMARY KEY (file_id, directory_id)
        );
        CREATE INDEX IF NOT EXISTS idx_memberships_directory
            ON file_directory_memberships (directory_id);
        CREATE TABLE IF NOT EXISTS file_vectors (
            file_id INTEGER PRIMARY KEY,
            embedding BLOB NOT NULL
        );
        CREATE TABLE IF NOT EXISTS store_meta (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        );",
    )?;
    debug!("Created store tables if they did not exist.");
    Ok(())
}

/// Embedding dimension fixed by the first upsert, if any.
pub fn dimension(conn: &Connection) -> StoreResult<Option<usize>> {
    let value: Option<String> = conn
        .query_row(
            "SELECT value FROM store_meta WHERE key = ?1",
            [DIMENSION_KEY],
            |row| row.get(0),
        )
        .optional()?;
    value
        .map(|v| {
            v.parse::<usize>()
                .map_err(|e| StoreError::Consistency(format!("bad stored dimension {v:?}: {e}")))
        })
        .transpose()
}

pub fn set_dimension(conn: &Connection, dimension: usize) -> StoreResult<()> {
    conn.execute(
        "INSERT INTO store_meta (key, value) VALUES (?1, ?2)
         ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        rusqlite::params![DIMENSION_KEY, dimension.to_string()],
    )?;
    debug!("Recorded embedding dimension {}", dimension);
    Ok(())
}
