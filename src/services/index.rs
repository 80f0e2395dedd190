//! The semantic index (C4): stores embedding vectors and scores them against
//! a query by exhaustive cosine scan. The corpus is small by design (see the
//! data model's non-goal on approximate-nearest-neighbor indexing), so a
//! full scan stays well under a millisecond.

use crate::models::embedding::{cosine_similarity, vector_from_bytes, vector_to_bytes};
use crate::models::entity::EntityId;
use crate::models::observation::ObservationId;
use crate::models::Embedding;
use crate::storage::Store;
use crate::{now_iso, Result};
use rusqlite::params;
use std::sync::Arc;

/// A scored semantic-search hit, denormalized with the entity and
/// observation context a caller needs without a further lookup.
#[derive(Debug, Clone)]
pub struct EmbeddingHit {
    /// The matched observation's id.
    pub observation_id: ObservationId,
    /// The owning entity's id.
    pub entity_id: EntityId,
    /// The owning entity's name.
    pub entity_name: String,
    /// The owning entity's type, if any.
    pub entity_type: Option<String>,
    /// The observation's content.
    pub content: String,
    /// The observation's source tag, if any.
    pub source: Option<String>,
    /// The observation's creation timestamp.
    pub created_at: String,
    /// Cosine similarity of the query vector to this hit's vector, in `[-1, 1]`.
    pub similarity: f64,
}

/// Filters narrowing a semantic search before scoring.
#[derive(Debug, Clone, Default)]
pub struct SemanticSearchFilter {
    /// Restrict to entities of this type.
    pub entity_type: Option<String>,
    /// Restrict to observations created at or after this ISO-8601 timestamp.
    pub since: Option<String>,
}

/// Stores and scores embedding vectors.
pub struct SemanticIndex {
    store: Arc<Store>,
}

impl SemanticIndex {
    /// Builds a semantic index over the given store.
    #[must_use]
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }

    /// Stores a new embedding row for `observation_id`, owned by `entity_id`.
    pub fn store(
        &self,
        entity_id: &EntityId,
        observation_id: &ObservationId,
        vector: &[f32],
        text_content: &str,
    ) -> Result<Embedding> {
        let id = crate::models::embedding::EmbeddingId::new();
        let now = now_iso();
        let bytes = vector_to_bytes(vector);
        let conn = self.store.lock();
        conn.execute(
            "INSERT INTO embeddings (id, entity_id, observation_id, vector, text_content, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![id.to_string(), entity_id.as_str(), observation_id.as_str(), bytes, text_content, now],
        )?;
        Ok(Embedding {
            id,
            entity_id: entity_id.clone(),
            observation_id: observation_id.clone(),
            vector: vector.to_vec(),
            text_content: text_content.to_string(),
            created_at: now,
        })
    }

    /// Deletes the embedding owned by `observation_id`, if any.
    pub fn delete_by_observation(&self, observation_id: &ObservationId) -> Result<bool> {
        let conn = self.store.lock();
        let affected = conn.execute(
            "DELETE FROM embeddings WHERE observation_id = ?1",
            params![observation_id.as_str()],
        )?;
        Ok(affected > 0)
    }

    /// Deletes every embedding owned by `entity_id`. Returns the count removed.
    pub fn delete_by_entity(&self, entity_id: &EntityId) -> Result<usize> {
        let conn = self.store.lock();
        let affected = conn.execute(
            "DELETE FROM embeddings WHERE entity_id = ?1",
            params![entity_id.as_str()],
        )?;
        Ok(affected)
    }

    /// Lists full embedding rows, optionally scoped to one entity. Used by
    /// write-path dedup and consolidation, neither of which needs scoring
    /// against a query.
    pub fn list_by_entity(&self, entity_id: Option<&EntityId>) -> Result<Vec<Embedding>> {
        let conn = self.store.lock();
        let sql = "SELECT id, entity_id, observation_id, vector, text_content, created_at
                   FROM embeddings WHERE (?1 IS NULL OR entity_id = ?1)";
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt.query_map(params![entity_id.map(EntityId::as_str)], |row| {
            Ok(Embedding {
                id: row.get::<_, String>(0)?.into(),
                entity_id: EntityId::from(row.get::<_, String>(1)?),
                observation_id: ObservationId::from(row.get::<_, String>(2)?),
                vector: vector_from_bytes(&row.get::<_, Vec<u8>>(3)?),
                text_content: row.get(4)?,
                created_at: row.get(5)?,
            })
        })?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(Into::into)
    }

    /// Scores every stored vector (optionally pre-filtered by entity type and
    /// minimum `created_at`) against `query_vector`, sorts by similarity
    /// descending, and truncates to `limit`.
    pub fn search(
        &self,
        query_vector: &[f32],
        limit: usize,
        filter: &SemanticSearchFilter,
    ) -> Result<Vec<EmbeddingHit>> {
        let conn = self.store.lock();
        let sql = "
            SELECT emb.observation_id, emb.entity_id, e.name, e.entity_type,
                   o.content, o.source, o.created_at, emb.vector
            FROM embeddings emb
            JOIN entities e ON e.id = emb.entity_id
            JOIN observations o ON o.id = emb.observation_id
            WHERE (?1 IS NULL OR e.entity_type = ?1)
              AND (?2 IS NULL OR o.created_at >= ?2)
        ";
        let mut stmt = conn.prepare(sql)?;
        let mut hits: Vec<EmbeddingHit> = stmt
            .query_map(params![filter.entity_type, filter.since], |row| {
                let vector_bytes: Vec<u8> = row.get(7)?;
                Ok((
                    ObservationId::from(row.get::<_, String>(0)?),
                    EntityId::from(row.get::<_, String>(1)?),
                    row.get::<_, String>(2)?,
                    row.get::<_, Option<String>>(3)?,
                    row.get::<_, String>(4)?,
                    row.get::<_, Option<String>>(5)?,
                    row.get::<_, String>(6)?,
                    vector_bytes,
                ))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?
            .into_iter()
            .map(|(observation_id, entity_id, entity_name, entity_type, content, source, created_at, vector_bytes)| {
                let similarity = cosine_similarity(query_vector, &vector_from_bytes(&vector_bytes));
                EmbeddingHit {
                    observation_id,
                    entity_id,
                    entity_name,
                    entity_type,
                    content,
                    source,
                    created_at,
                    similarity,
                }
            })
            .collect();

        hits.sort_by(|a, b| b.similarity.partial_cmp(&a.similarity).unwrap_or(std::cmp::Ordering::Equal));
        hits.truncate(limit);
        Ok(hits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repositories::{EntityRepository, ObservationRepository};

    fn unit(mut v: Vec<f32>) -> Vec<f32> {
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        for x in &mut v {
            *x /= norm;
        }
        v
    }

    #[test]
    fn search_ranks_by_similarity_descending() {
        let store = Arc::new(crate::storage::Store::open_in_memory_for_tests().unwrap());
        let entities = EntityRepository::new(store.clone());
        let observations = ObservationRepository::new(store.clone());
        let index = SemanticIndex::new(store);

        let e = entities.find_or_create("k", None).unwrap();
        let o1 = observations.create(&e.id, "near match", None).unwrap();
        let o2 = observations.create(&e.id, "far match", None).unwrap();

        let mut close = vec![0.0f32; crate::models::EMBEDDING_DIM];
        close[0] = 1.0;
        close[1] = 0.1;
        let close = unit(close);

        let mut far = vec![0.0f32; crate::models::EMBEDDING_DIM];
        far[2] = 1.0;
        let far = unit(far);

        index.store(&e.id, &o1.id, &close, "near match").unwrap();
        index.store(&e.id, &o2.id, &far, "far match").unwrap();

        let query = close.clone();
        let hits = index.search(&query, 10, &SemanticSearchFilter::default()).unwrap();
        assert_eq!(hits[0].observation_id, o1.id);
        assert!(hits[0].similarity > hits[1].similarity);
    }

    #[test]
    fn delete_by_observation_removes_only_that_row() {
        let store = Arc::new(crate::storage::Store::open_in_memory_for_tests().unwrap());
        let entities = EntityRepository::new(store.clone());
        let observations = ObservationRepository::new(store.clone());
        let index = SemanticIndex::new(store);

        let e = entities.find_or_create("k", None).unwrap();
        let o = observations.create(&e.id, "x", None).unwrap();
        let v = unit(vec![1.0; crate::models::EMBEDDING_DIM]);
        index.store(&e.id, &o.id, &v, "x").unwrap();

        assert!(index.delete_by_observation(&o.id).unwrap());
        assert!(index.list_by_entity(Some(&e.id)).unwrap().is_empty());
    }
}
