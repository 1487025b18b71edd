use std::collections::BTreeMap;

use rusqlite::params;
use rusqlite::types::Value;

use super::models::{Collection, CollectionStats, MetadataFilter, RecordMetadata, SearchHit};
use super::{Db, DbError, serialize_vector};
use crate::indexer::chunk::MetaValue;

/// Records inspected when computing statistics distributions.
pub const STATS_SAMPLE_LIMIT: usize = 100;

/// JSON path for a top-level metadata key.
fn json_path(key: &str) -> String {
    format!("$.\"{}\"", key.replace('"', ""))
}

fn filter_value(value: &MetaValue) -> Value {
    match value {
        MetaValue::Bool(b) => Value::Integer(i64::from(*b)),
        MetaValue::Int(i) => Value::Integer(*i),
        MetaValue::Float(f) => Value::Real(*f),
        MetaValue::Text(s) => Value::Text(s.clone()),
    }
}

impl Db {
    /// Nearest neighbours of `query_vector` by cosine distance, optionally
    /// restricted to records whose metadata matches `filter` exactly.
    pub fn search(
        &self,
        collection: &Collection,
        query_vector: &[f32],
        top_k: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<SearchHit>, DbError> {
        if query_vector.len() != collection.dimensions {
            return Err(DbError::DimensionMismatch {
                expected: collection.dimensions,
                actual: query_vector.len(),
            });
        }
        if top_k == 0 {
            return Ok(Vec::new());
        }

        let mut query = format!(
            r#"
            SELECT
                r.record_id,
                r.content,
                r.metadata,
                vec_distance_cosine(v.embedding, ?) AS distance
            FROM {} v
            JOIN records r ON v.rowid = r.id
            WHERE r.collection_id = ?
            "#,
            collection.vec_table()
        );

        let mut params: Vec<Value> = vec![
            Value::Blob(serialize_vector(query_vector)),
            Value::Integer(collection.id),
        ];

        for (key, value) in filter.into_iter().flatten() {
            query.push_str(" AND json_extract(r.metadata, ?) = ?");
            params.push(Value::Text(json_path(key)));
            params.push(filter_value(value));
        }

        query.push_str(" ORDER BY distance ASC LIMIT ?");
        params.push(Value::Integer(top_k as i64));

        let param_refs: Vec<&dyn rusqlite::ToSql> =
            params.iter().map(|p| p as &dyn rusqlite::ToSql).collect();

        let mut stmt = self.conn.prepare(&query)?;
        let rows = stmt.query_map(param_refs.as_slice(), |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, f64>(3)?,
            ))
        })?;

        let mut hits = Vec::new();
        for row in rows {
            let (id, content, metadata, distance) = row?;
            hits.push(SearchHit {
                id,
                content,
                metadata: serde_json::from_str::<RecordMetadata>(&metadata)?,
                similarity: 1.0 - distance,
            });
        }
        Ok(hits)
    }

    /// Record count plus language and chunk-type distributions. The count is
    /// exact; distributions cover at most `sample_limit` records.
    pub fn collection_stats(
        &self,
        collection: &Collection,
        sample_limit: usize,
    ) -> Result<CollectionStats, DbError> {
        let total = self.count_records(collection)?;

        let mut stmt = self.conn.prepare(
            r#"
            SELECT
                json_extract(metadata, '$.language'),
                json_extract(metadata, '$.chunk_type')
            FROM records
            WHERE collection_id = ?
            LIMIT ?
            "#,
        )?;
        let rows = stmt.query_map(params![collection.id, sample_limit as i64], |row| {
            Ok((
                row.get::<_, Option<String>>(0)?,
                row.get::<_, Option<String>>(1)?,
            ))
        })?;

        let mut languages = BTreeMap::new();
        let mut chunk_types = BTreeMap::new();
        let mut sample_size = 0;
        for row in rows {
            let (language, chunk_type) = row?;
            sample_size += 1;
            *languages
                .entry(language.unwrap_or_else(|| "unknown".to_string()))
                .or_insert(0) += 1;
            *chunk_types
                .entry(chunk_type.unwrap_or_else(|| "unknown".to_string()))
                .or_insert(0) += 1;
        }

        Ok(CollectionStats {
            collection: collection.name.clone(),
            embedding_model: collection.embedding_model.clone(),
            distance_metric: collection.distance_metric.clone(),
            location: self.location().to_string(),
            total_records: total,
            languages,
            chunk_types,
            sampled: total > sample_size,
            sample_size,
        })
    }
}
