use crate::error::{StoreError, StoreResult};
use crate::traits::FileId;
use log::debug;
use rusqlite::Connection;
use std::cmp::Ordering;
use std::collections::BTreeSet;

/// Nearest-neighbor candidate returned by [`VectorIndex::knn`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbor {
    pub id: FileId,
    pub distance: f64,
}

/// Serializes an embedding as little-endian `f32` bytes.
pub fn embedding_to_bytes(embedding: &[f32]) -> Vec<u8> {
    embedding.iter().flat_map(|f| f.to_le_bytes()).collect()
}

/// Inverse of [`embedding_to_bytes`].
pub fn bytes_to_embedding(bytes: &[u8]) -> StoreResult<Vec<f32>> {
    if bytes.len() % 4 != 0 {
        return Err(StoreError::Consistency(format!(
            "embedding blob of {} bytes is not a whole number of f32 values",
            bytes.len()
        )));
    }
    Ok(bytes
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect())
}

fn l2_norm(v: &[f32]) -> f64 {
    v.iter().map(|x| (*x as f64) * (*x as f64)).sum::<f64>().sqrt()
}

/// Cosine distance `1 - cos(a, b)`, clamped into `[0, 2]`.
///
/// A zero-norm operand has no direction; its distance to anything is `1.0`.
pub fn cosine_distance(a: &[f32], b: &[f32]) -> f64 {
    distance_with_norm(a, l2_norm(a), b)
}

fn distance_with_norm(a: &[f32], norm_a: f64, b: &[f32]) -> f64 {
    let norm_b = l2_norm(b);
    if norm_a < 1e-12 || norm_b < 1e-12 {
        return 1.0;
    }
    let dot: f64 = a
        .iter()
        .zip(b.iter())
        .map(|(x, y)| (*x as f64) * (*y as f64))
        .sum();
    (1.0 - dot / (norm_a * norm_b)).clamp(0.0, 2.0)
}

/// Maps a cosine distance to a display similarity in `[0, 1]`.
///
/// Distance 0 is similarity 1, distance 2 is similarity 0.
pub fn similarity_from_distance(distance: f64) -> f64 {
    (1.0 - distance / 2.0).clamp(0.0, 1.0)
}

/// Exact cosine-distance index over the `file_vectors` table.
///
/// Holds one vector per file id. Queries scan every stored vector.
pub struct VectorIndex<'c> {
    conn: &'c Connection,
}

impl<'c> VectorIndex<'c> {
    pub fn new(conn: &'c Connection) -> Self {
        Self { conn }
    }

    /// Adds the vector for `id`, replacing any vector already stored for it.
    pub fn insert(&self, id: FileId, vector: &[f32]) -> StoreResult<()> {
        // Replace is delete-then-insert.
        self.remove(id)?;
        self.conn.execute(
            "INSERT INTO file_vectors (file_id, embedding) VALUES (?1, ?2)",
            rusqlite::params![id.0, embedding_to_bytes(vector)],
        )?;
        debug!("Indexed vector for file id: {}", id);
        Ok(())
    }

    /// Removes the vector for `id`. Unknown ids are ignored.
    pub fn remove(&self, id: FileId) -> StoreResult<()> {
        let rows_affected = self
            .conn
            .execute("DELETE FROM file_vectors WHERE file_id = ?1", [id.0])?;
        if rows_affected > 0 {
            debug!("Removed vector for file id: {}", id);
        }
        Ok(())
    }

    /// Returns the `k` nearest vectors to `query`, ascending by distance.
    ///
    /// Equal distances are ordered by id.
    pub fn knn(&self, query: &[f32], k: usize) -> StoreResult<Vec<Neighbor>> {
        if k == 0 {
            return Ok(Vec::new());
        }
        let query_norm = l2_norm(query);
        let mut stmt = self
            .conn
            .prepare("SELECT file_id, embedding FROM file_vectors")?;
        let rows = stmt.query_map([], |row| {
            let id: i64 = row.get(0)?;
            let bytes: Vec<u8> = row.get(1)?;
            Ok((id, bytes))
        })?;

        let mut neighbors = Vec::new();
        for row in rows {
            let (id, bytes) = row?;
            let vector = bytes_to_embedding(&bytes)?;
            if vector.len() != query.len() {
                return Err(StoreError::DimensionMismatch {
                    expected: vector.len(),
                    actual: query.len(),
                });
            }
            neighbors.push(Neighbor {
                id: FileId(id),
                distance: distance_with_norm(query, query_norm, &vector),
            });
        }

        neighbors.sort_by(|a, b| {
            a.distance
                .partial_cmp(&b.distance)
                .unwrap_or(Ordering::Equal)
                .then(a.id.cmp(&b.id))
        });
        neighbors.truncate(k);
        debug!("KNN query returned {} neighbors.", neighbors.len());
        Ok(neighbors)
    }

    pub fn len(&self) -> StoreResult<i64> {
        let count = self
            .conn
            .query_row("SELECT COUNT(*) FROM file_vectors", [], |row| row.get(0))?;
        Ok(count)
    }

    pub fn is_empty(&self) -> StoreResult<bool> {
        Ok(self.len()? == 0)
    }

    pub fn ids(&self) -> StoreResult<BTreeSet<FileId>> {
        let mut stmt = self.conn.prepare("SELECT file_id FROM file_vectors")?;
        let ids = stmt
            .query_map([], |row| row.get::<_, i64>(0).map(FileId))?
            .collect::<Result<BTreeSet<_>, _>>()?;
        Ok(ids)
    }

    /// Checks every stored blob decodes to `dimension` components.
    pub fn check_dimension(&self, dimension: usize) -> StoreResult<()> {
        let expected_bytes = dimension
            .checked_mul(4)
            .and_then(|bytes| i64::try_from(bytes).ok())
            .ok_or_else(|| {
                StoreError::Consistency(format!("recorded dimension {dimension} is out of range"))
            })?;
        let mut stmt = self
            .conn
            .prepare("SELECT file_id, length(embedding) FROM file_vectors")?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?))
        })?;
        for row in rows {
            let (id, byte_len) = row?;
            if byte_len != expected_bytes {
                return Err(StoreError::Consistency(format!(
                    "vector for file id {id} has {byte_len} bytes, expected {expected_bytes}"
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::schema;

    fn create_test_conn() -> Connection {
        let conn = Connection::open_in_memory().expect("Failed to open in-memory database");
        schema::create_tables(&conn).expect("Failed to create tables");
        conn
    }

    #[test]
    fn test_knn_on_empty_index() {
        let conn = create_test_conn();
        let index = VectorIndex::new(&conn);

        let neighbors = index.knn(&[1.0, 0.0, 0.0], 5).unwrap();
        assert!(neighbors.is_empty());
        assert!(index.is_empty().unwrap());
    }

    #[test]
    fn test_knn_orders_by_distance() {
        let conn = create_test_conn();
        let index = VectorIndex::new(&conn);
        index.insert(FileId(1), &[0.0, 1.0]).unwrap();
        index.insert(FileId(2), &[1.0, 0.0]).unwrap();
        index.insert(FileId(3), &[-1.0, 0.0]).unwrap();
        index.insert(FileId(4), &[1.0, 1.0]).unwrap();

        let neighbors = index.knn(&[1.0, 0.0], 10).unwrap();
        let ids: Vec<i64> = neighbors.iter().map(|n| n.id.0).collect();
        assert_eq!(ids, vec![2, 4, 1, 3]);
        assert!(neighbors[0].distance.abs() < 1e-9);
        assert!((neighbors[2].distance - 1.0).abs() < 1e-9);
        assert!((neighbors[3].distance - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_knn_limits_to_k() {
        let conn = create_test_conn();
        let index = VectorIndex::new(&conn);
        for i in 1..=5 {
            index.insert(FileId(i), &[i as f32, 1.0]).unwrap();
        }

        assert_eq!(index.knn(&[1.0, 0.0], 3).unwrap().len(), 3);
        assert_eq!(index.knn(&[1.0, 0.0], 50).unwrap().len(), 5);
        assert!(index.knn(&[1.0, 0.0], 0).unwrap().is_empty());
    }

    #[test]
    fn test_ties_are_ordered_by_id() {
        let conn = create_test_conn();
        let index = VectorIndex::new(&conn);
        index.insert(FileId(9), &[2.0, 0.0]).unwrap();
        index.insert(FileId(3), &[3.0, 0.0]).unwrap();

        let neighbors = index.knn(&[1.0, 0.0], 2).unwrap();
        assert_eq!(neighbors[0].id, FileId(3));
        assert_eq!(neighbors[1].id, FileId(9));
    }

    #[test]
    fn test_insert_replaces_existing_vector() {
        let conn = create_test_conn();
        let index = VectorIndex::new(&conn);
        index.insert(FileId(1), &[1.0, 0.0]).unwrap();
        index.insert(FileId(1), &[0.0, 1.0]).unwrap();

        assert_eq!(index.len().unwrap(), 1);
        let neighbors = index.knn(&[0.0, 1.0], 1).unwrap();
        assert_eq!(neighbors[0].id, FileId(1));
        assert!(neighbors[0].distance.abs() < 1e-9);
    }

    #[test]
    fn test_remove_nonexistent_is_noop() {
        let conn = create_test_conn();
        let index = VectorIndex::new(&conn);
        index.insert(FileId(1), &[1.0, 0.0]).unwrap();

        assert!(index.remove(FileId(42)).is_ok());
        assert_eq!(index.len().unwrap(), 1);

        index.remove(FileId(1)).unwrap();
        assert!(index.is_empty().unwrap());
    }

    #[test]
    fn test_knn_rejects_wrong_dimension() {
        let conn = create_test_conn();
        let index = VectorIndex::new(&conn);
        index.insert(FileId(1), &[1.0, 0.0, 0.0]).unwrap();

        let result = index.knn(&[1.0, 0.0], 1);
        assert!(matches!(
            result,
            Err(StoreError::DimensionMismatch { expected: 3, actual: 2 })
        ));
    }

    #[test]
    fn test_check_dimension() {
        let conn = create_test_conn();
        let index = VectorIndex::new(&conn);
        index.insert(FileId(1), &[1.0, 0.0, 0.0]).unwrap();

        assert!(index.check_dimension(3).is_ok());
        assert!(matches!(
            index.check_dimension(2),
            Err(StoreError::Consistency(_))
        ));
        assert!(matches!(
            index.check_dimension(usize::MAX),
            Err(StoreError::Consistency(_))
        ));
    }

    #[test]
    fn test_cosine_distance_range() {
        assert!(cosine_distance(&[1.0, 0.0], &[3.0, 0.0]).abs() < 1e-9);
        assert!((cosine_distance(&[1.0, 0.0], &[0.0, 2.0]) - 1.0).abs() < 1e-9);
        assert!((cosine_distance(&[1.0, 0.0], &[-1.0, 0.0]) - 2.0).abs() < 1e-9);
        assert_eq!(cosine_distance(&[0.0, 0.0], &[1.0, 0.0]), 1.0);
    }

    #[test]
    fn test_similarity_is_monotonic_and_bounded() {
        let mut previous = f64::INFINITY;
        for step in 0..=200 {
            let distance = step as f64 / 100.0;
            let similarity = similarity_from_distance(distance);
            assert!((0.0..=1.0).contains(&similarity));
            assert!(similarity < previous);
            previous = similarity;
        }
        assert_eq!(similarity_from_distance(0.0), 1.0);
        assert_eq!(similarity_from_distance(2.0), 0.0);
        assert_eq!(similarity_from_distance(2.5), 0.0);
        assert_eq!(similarity_from_distance(-0.1), 1.0);
    }

    #[test]
    fn test_embedding_bytes_roundtrip() {
        let embedding = vec![0.25_f32, -1.5, 3.0e-7];
        let bytes = embedding_to_bytes(&embedding);
        assert_eq!(bytes.len(), 12);
        assert_eq!(bytes_to_embedding(&bytes).unwrap(), embedding);

        assert!(matches!(
            bytes_to_embedding(&bytes[..5]),
            Err(StoreError::Consistency(_))
        ));
    }
}
