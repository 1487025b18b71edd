use rusqlite::{OptionalExtension, params};

use super::models::{Collection, NewRecord};
use super::{Db, DbError, serialize_vector};

impl Db {
    /// Insert or replace records with their embeddings in one transaction.
    /// Either every record of the batch is stored or none is.
    pub fn upsert_records(
        &mut self,
        collection: &Collection,
        records: &[NewRecord<'_>],
        embeddings: &[Vec<f32>],
    ) -> Result<usize, DbError> {
        if records.len() != embeddings.len() {
            return Err(DbError::LengthMismatch {
                records: records.len(),
                embeddings: embeddings.len(),
            });
        }
        if let Some(bad) = embeddings.iter().find(|e| e.len() != collection.dimensions) {
            return Err(DbError::DimensionMismatch {
                expected: collection.dimensions,
                actual: bad.len(),
            });
        }

        let vec_table = collection.vec_table();
        let tx = self.conn.transaction()?;

        for (record, embedding) in records.iter().zip(embeddings) {
            let existing: Option<i64> = tx
                .query_row(
                    "SELECT id FROM records WHERE collection_id = ? AND record_id = ?",
                    params![collection.id, record.record_id],
                    |row| row.get(0),
                )
                .optional()?;

            // vec0 tables do not take part in foreign key cascades.
            if let Some(rowid) = existing {
                tx.execute(
                    &format!("DELETE FROM {vec_table} WHERE rowid = ?"),
                    params![rowid],
                )?;
                tx.execute("DELETE FROM records WHERE id = ?", params![rowid])?;
            }

            let metadata = serde_json::to_string(&record.metadata)?;
            tx.execute(
                "INSERT INTO records (collection_id, record_id, content, metadata) VALUES (?, ?, ?, ?)",
                params![collection.id, record.record_id, record.content, metadata],
            )?;
            let rowid = tx.last_insert_rowid();

            tx.execute(
                &format!("INSERT INTO {vec_table} (rowid, embedding) VALUES (?, ?)"),
                params![rowid, serialize_vector(embedding)],
            )?;
        }

        tx.commit()?;
        Ok(records.len())
    }

    pub fn count_records(&self, collection: &Collection) -> Result<usize, DbError> {
        let count: i64 = self.conn.query_row(
            "SELECT count(*) FROM records WHERE collection_id = ?",
            params![collection.id],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }
}
