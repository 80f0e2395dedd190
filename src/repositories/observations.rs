use crate::models::entity::EntityId;
use crate::models::observation::ObservationId;
use crate::models::Observation;
use crate::storage::sql::substring_like_pattern;
use crate::storage::Store;
use crate::{now_iso, Result};
use rusqlite::{params, Row};
use std::sync::Arc;

/// Default cap on [`ObservationRepository::lexical_search`] results.
pub const DEFAULT_LEXICAL_LIMIT: i64 = 50;

/// A lexical-search hit, denormalized with enough entity context to report
/// without a second round-trip.
#[derive(Debug, Clone)]
pub struct LexicalHit {
    /// The matching observation.
    pub observation: Observation,
    /// Name of the owning entity.
    pub entity_name: String,
    /// Type of the owning entity, if any.
    pub entity_type: Option<String>,
}

/// Filters accepted by [`ObservationRepository::lexical_search`].
#[derive(Debug, Clone, Default)]
pub struct LexicalSearchFilter {
    /// Restrict to entities of this type.
    pub entity_type: Option<String>,
    /// Restrict to observations created at or after this ISO-8601 timestamp.
    pub since: Option<String>,
}

fn row_to_observation(row: &Row<'_>) -> rusqlite::Result<Observation> {
    Ok(Observation {
        id: ObservationId::from(row.get::<_, String>(0)?),
        entity_id: EntityId::from(row.get::<_, String>(1)?),
        content: row.get(2)?,
        source: row.get(3)?,
        created_at: row.get(4)?,
    })
}

const SELECT_COLUMNS: &str = "id, entity_id, content, source, created_at";

/// Typed CRUD over the `observations` table.
pub struct ObservationRepository {
    store: Arc<Store>,
}

impl ObservationRepository {
    /// Builds a repository over the given store.
    #[must_use]
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }

    /// Creates an observation under `entity_id` and advances that entity's
    /// `updated_at`.
    pub fn create(
        &self,
        entity_id: &EntityId,
        content: &str,
        source: Option<&str>,
    ) -> Result<Observation> {
        Observation::validate_content(content)?;
        if let Some(s) = source {
            Observation::validate_source(s)?;
        }

        let id = ObservationId::new();
        let now = now_iso();
        let conn = self.store.lock();
        conn.execute(
            "INSERT INTO observations (id, entity_id, content, source, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![id.as_str(), entity_id.as_str(), content, source, now],
        )?;
        conn.execute(
            "UPDATE entities SET updated_at = ?1 WHERE id = ?2",
            params![now, entity_id.as_str()],
        )?;

        Ok(Observation {
            id,
            entity_id: entity_id.clone(),
            content: content.to_string(),
            source: source.map(ToString::to_string),
            created_at: now,
        })
    }

    /// Lists all observations of an entity, newest first.
    pub fn list_by_entity(&self, entity_id: &EntityId) -> Result<Vec<Observation>> {
        let conn = self.store.lock();
        let sql = format!(
            "SELECT {SELECT_COLUMNS} FROM observations
             WHERE entity_id = ?1
             ORDER BY created_at DESC"
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params![entity_id.as_str()], row_to_observation)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(Into::into)
    }

    /// Substring match on observation content OR owning entity name,
    /// newest first, optionally filtered by entity type and a minimum
    /// `created_at`. Capped at `limit` (default [`DEFAULT_LEXICAL_LIMIT`]).
    pub fn lexical_search(
        &self,
        query: &str,
        filter: &LexicalSearchFilter,
        limit: Option<i64>,
    ) -> Result<Vec<LexicalHit>> {
        let limit = limit.unwrap_or(DEFAULT_LEXICAL_LIMIT);
        let pattern = substring_like_pattern(&query.to_lowercase());
        let conn = self.store.lock();
        let sql = "
            SELECT o.id, o.entity_id, o.content, o.source, o.created_at,
                   e.name, e.entity_type
            FROM observations o
            JOIN entities e ON e.id = o.entity_id
            WHERE (LOWER(o.content) LIKE ?1 ESCAPE '\\' OR LOWER(e.name) LIKE ?1 ESCAPE '\\')
              AND (?2 IS NULL OR e.entity_type = ?2)
              AND (?3 IS NULL OR o.created_at >= ?3)
            ORDER BY o.created_at DESC
            LIMIT ?4
        ";
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt.query_map(
            params![pattern, filter.entity_type, filter.since, limit],
            |row| {
                Ok(LexicalHit {
                    observation: row_to_observation(row)?,
                    entity_name: row.get(5)?,
                    entity_type: row.get(6)?,
                })
            },
        )?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(Into::into)
    }

    /// Fetches observations by id, preserving the order of `ids`. Ids with
    /// no matching row are silently omitted.
    pub fn fetch_by_ids(&self, ids: &[ObservationId]) -> Result<Vec<Observation>> {
        let conn = self.store.lock();
        let mut stmt = conn.prepare(&format!("SELECT {SELECT_COLUMNS} FROM observations WHERE id = ?1"))?;
        let mut by_id = std::collections::HashMap::with_capacity(ids.len());
        for id in ids {
            if let Some(obs) = stmt
                .query_row(params![id.as_str()], row_to_observation)
                .ok()
            {
                by_id.insert(id.clone(), obs);
            }
        }
        Ok(ids.iter().filter_map(|id| by_id.remove(id)).collect())
    }

    /// Deletes a single observation by id.
    pub fn delete(&self, id: &ObservationId) -> Result<bool> {
        let conn = self.store.lock();
        let affected = conn.execute("DELETE FROM observations WHERE id = ?1", params![id.as_str()])?;
        Ok(affected > 0)
    }

    /// Deletes every observation belonging to `entity_id`, returning the
    /// count removed.
    pub fn delete_by_entity(&self, entity_id: &EntityId) -> Result<usize> {
        let conn = self.store.lock();
        let affected = conn.execute(
            "DELETE FROM observations WHERE entity_id = ?1",
            params![entity_id.as_str()],
        )?;
        Ok(affected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repositories::EntityRepository;

    fn setup() -> (EntityRepository, ObservationRepository) {
        let store = Arc::new(crate::storage::Store::open_in_memory_for_tests().unwrap());
        (EntityRepository::new(store.clone()), ObservationRepository::new(store))
    }

    #[test]
    fn create_touches_owning_entity() {
        let (entities, observations) = setup();
        let e = entities.find_or_create("k", None).unwrap();
        let before = e.updated_at.clone();
        std::thread::sleep(std::time::Duration::from_millis(2));
        observations.create(&e.id, "likes tea", None).unwrap();
        let after = entities.find_by_id(&e.id).unwrap().unwrap();
        assert!(after.updated_at >= before);
    }

    #[test]
    fn list_by_entity_is_newest_first() {
        let (entities, observations) = setup();
        let e = entities.find_or_create("k", None).unwrap();
        let first = observations.create(&e.id, "first", None).unwrap();
        std::thread::sleep(std::time::Duration::from_millis(2));
        let second = observations.create(&e.id, "second", None).unwrap();
        let listed = observations.list_by_entity(&e.id).unwrap();
        assert_eq!(listed[0].id, second.id);
        assert_eq!(listed[1].id, first.id);
    }

    #[test]
    fn lexical_search_matches_content_or_entity_name() {
        let (entities, observations) = setup();
        let e = entities.find_or_create("hippocampus", None).unwrap();
        observations.create(&e.id, "unrelated content", None).unwrap();
        let by_content = observations
            .lexical_search("unrelated", &LexicalSearchFilter::default(), None)
            .unwrap();
        assert_eq!(by_content.len(), 1);
        let by_name = observations
            .lexical_search("hippo", &LexicalSearchFilter::default(), None)
            .unwrap();
        assert_eq!(by_name.len(), 1);
    }

    #[test]
    fn fetch_by_ids_preserves_requested_order() {
        let (entities, observations) = setup();
        let e = entities.find_or_create("k", None).unwrap();
        let a = observations.create(&e.id, "a", None).unwrap();
        let b = observations.create(&e.id, "b", None).unwrap();
        let fetched = observations.fetch_by_ids(&[b.id.clone(), a.id.clone()]).unwrap();
        assert_eq!(fetched[0].id, b.id);
        assert_eq!(fetched[1].id, a.id);
    }

    #[test]
    fn delete_by_entity_removes_all() {
        let (entities, observations) = setup();
        let e = entities.find_or_create("k", None).unwrap();
        observations.create(&e.id, "a", None).unwrap();
        observations.create(&e.id, "b", None).unwrap();
        assert_eq!(observations.delete_by_entity(&e.id).unwrap(), 2);
        assert!(observations.list_by_entity(&e.id).unwrap().is_empty());
    }
}
