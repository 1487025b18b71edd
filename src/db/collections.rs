use rusqlite::{OptionalExtension, params};
use tracing::info;

use super::models::{COSINE, Collection};
use super::{Db, DbError};

impl Db {
    /// Get or create the collection `name`, bound to `model` with `dims`
    /// dimensions under cosine distance. An existing collection bound to a
    /// different model or width is an error.
    pub fn open_collection(
        &self,
        name: &str,
        model: &str,
        dims: usize,
    ) -> Result<Collection, DbError> {
        if let Some(existing) = self.find_collection(name)? {
            if existing.embedding_model != model || existing.dimensions != dims {
                return Err(DbError::CollectionMismatch {
                    name: name.to_string(),
                    existing_model: existing.embedding_model,
                    existing_dims: existing.dimensions,
                    model: model.to_string(),
                    dims,
                });
            }
            self.create_vec_table(&existing)?;
            return Ok(existing);
        }

        self.conn.execute(
            "INSERT INTO collections (name, embedding_model, dimensions, distance_metric) VALUES (?, ?, ?, ?)",
            params![name, model, dims as i64, COSINE],
        )?;
        let collection = Collection {
            id: self.conn.last_insert_rowid(),
            name: name.to_string(),
            embedding_model: model.to_string(),
            dimensions: dims,
            distance_metric: COSINE.to_string(),
        };
        self.create_vec_table(&collection)?;
        info!(
            "Created collection '{name}' ({model}, {dims} dims, {})",
            collection.distance_metric
        );
        Ok(collection)
    }

    pub fn find_collection(&self, name: &str) -> Result<Option<Collection>, DbError> {
        let found = self
            .conn
            .query_row(
                "SELECT id, name, embedding_model, dimensions, distance_metric FROM collections WHERE name = ?",
                params![name],
                |row| {
                    Ok(Collection {
                        id: row.get(0)?,
                        name: row.get(1)?,
                        embedding_model: row.get(2)?,
                        dimensions: row.get::<_, i64>(3)? as usize,
                        distance_metric: row.get(4)?,
                    })
                },
            )
            .optional()?;
        Ok(found)
    }

    /// Drop every record and vector of the collection and recreate its
    /// vector table with the same binding. Idempotent.
    pub fn clear_collection(&mut self, collection: &Collection) -> Result<(), DbError> {
        let tx = self.conn.transaction()?;
        tx.execute_batch(&format!("DROP TABLE IF EXISTS {}", collection.vec_table()))?;
        tx.execute(
            "DELETE FROM records WHERE collection_id = ?",
            params![collection.id],
        )?;
        tx.execute_batch(&vec_table_sql(collection))?;
        tx.commit()?;
        info!("Cleared collection '{}'", collection.name);
        Ok(())
    }

    fn create_vec_table(&self, collection: &Collection) -> Result<(), DbError> {
        self.conn.execute_batch(&vec_table_sql(collection))?;
        Ok(())
    }
}

fn vec_table_sql(collection: &Collection) -> String {
    format!(
        "CREATE VIRTUAL TABLE IF NOT EXISTS {} USING vec0(embedding FLOAT[{}])",
        collection.vec_table(),
        collection.dimensions
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_collection_is_stable() {
        let db = Db::open_in_memory().unwrap();
        let a = db.open_collection("code", "mini", 8).unwrap();
        let b = db.open_collection("code", "mini", 8).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.distance_metric, "cosine");

        let other = db.open_collection("docs", "mini", 8).unwrap();
        assert_ne!(a.id, other.id);
        assert_ne!(a.vec_table(), other.vec_table());
    }

    #[test]
    fn test_open_collection_rejects_other_binding() {
        let db = Db::open_in_memory().unwrap();
        db.open_collection("code", "mini", 8).unwrap();

        let err = db.open_collection("code", "mini", 16).unwrap_err();
        assert!(matches!(err, DbError::CollectionMismatch { existing_dims: 8, .. }));
        assert!(db.open_collection("code", "other-model", 8).is_err());
    }

    #[test]
    fn test_clear_is_idempotent() {
        let mut db = Db::open_in_memory().unwrap();
        let c = db.open_collection("code", "mini", 4).unwrap();
        db.clear_collection(&c).unwrap();
        db.clear_collection(&c).unwrap();
        assert_eq!(db.find_collection("code").unwrap(), Some(c));
    }
}
