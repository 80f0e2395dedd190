use crate::models::Entity;
use crate::models::entity::EntityId;
use crate::storage::sql::substring_like_pattern;
use crate::storage::Store;
use crate::{now_iso, Error, Result};
use rusqlite::{params, OptionalExtension, Row};
use std::sync::Arc;

/// Default page size for [`EntityRepository::list`].
pub const DEFAULT_LIST_LIMIT: i64 = 100;
/// Result cap for [`EntityRepository::search_by_name_substring`].
pub const SUBSTRING_SEARCH_LIMIT: i64 = 10;

/// Typed CRUD over the `entities` table.
pub struct EntityRepository {
    store: Arc<Store>,
}

fn row_to_entity(row: &Row<'_>) -> rusqlite::Result<Entity> {
    Ok(Entity {
        id: EntityId::from(row.get::<_, String>(0)?),
        name: row.get(1)?,
        entity_type: row.get(2)?,
        created_at: row.get(3)?,
        updated_at: row.get(4)?,
    })
}

const SELECT_COLUMNS: &str = "id, name, entity_type, created_at, updated_at";

impl EntityRepository {
    /// Builds a repository over the given store.
    #[must_use]
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }

    /// Looks up an entity by its opaque id.
    pub fn find_by_id(&self, id: &EntityId) -> Result<Option<Entity>> {
        let conn = self.store.lock();
        conn.query_row(
            &format!("SELECT {SELECT_COLUMNS} FROM entities WHERE id = ?1"),
            params![id.as_str()],
            row_to_entity,
        )
        .optional()
        .map_err(Into::into)
    }

    /// Looks up an entity by its exact, case-sensitive name.
    pub fn find_by_name(&self, name: &str) -> Result<Option<Entity>> {
        let conn = self.store.lock();
        conn.query_row(
            &format!("SELECT {SELECT_COLUMNS} FROM entities WHERE name = ?1"),
            params![name],
            row_to_entity,
        )
        .optional()
        .map_err(Into::into)
    }

    /// Atomically returns the entity named `name`, creating it with the
    /// given `entity_type` if it does not already exist.
    pub fn find_or_create(&self, name: &str, entity_type: Option<&str>) -> Result<Entity> {
        Entity::validate_name(name)?;
        if let Some(t) = entity_type {
            Entity::validate_type(t)?;
        }

        if let Some(existing) = self.find_by_name(name)? {
            return Ok(existing);
        }

        let id = EntityId::new();
        let now = now_iso();
        let conn = self.store.lock();
        let inserted = conn.execute(
            "INSERT INTO entities (id, name, entity_type, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(name) DO NOTHING",
            params![id.as_str(), name, entity_type, now, now],
        )?;
        drop(conn);

        if inserted == 0 {
            // Lost a race with a concurrent find_or_create for the same name.
            return self
                .find_by_name(name)?
                .ok_or_else(|| Error::OperationFailed {
                    operation: "entities.find_or_create".to_string(),
                    cause: "insert raced and re-read found nothing".to_string(),
                });
        }

        Ok(Entity {
            id,
            name: name.to_string(),
            entity_type: entity_type.map(ToString::to_string),
            created_at: now.clone(),
            updated_at: now,
        })
    }

    /// Lists entities ordered by `updated_at` descending, optionally
    /// filtered by type, up to `limit` rows (default
    /// [`DEFAULT_LIST_LIMIT`]).
    pub fn list(&self, entity_type: Option<&str>, limit: Option<i64>) -> Result<Vec<Entity>> {
        let limit = limit.unwrap_or(DEFAULT_LIST_LIMIT);
        let conn = self.store.lock();
        let sql = format!(
            "SELECT {SELECT_COLUMNS} FROM entities
             WHERE (?1 IS NULL OR entity_type = ?1)
             ORDER BY updated_at DESC
             LIMIT ?2"
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params![entity_type, limit], row_to_entity)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(Into::into)
    }

    /// Advances `updated_at` to the current wall-clock time.
    pub fn touch(&self, id: &EntityId) -> Result<()> {
        let conn = self.store.lock();
        conn.execute(
            "UPDATE entities SET updated_at = ?1 WHERE id = ?2",
            params![now_iso(), id.as_str()],
        )?;
        Ok(())
    }

    /// Deletes an entity. Cascades to its observations, embeddings, and
    /// relationships via foreign-key `ON DELETE CASCADE`.
    pub fn delete(&self, id: &EntityId) -> Result<bool> {
        let conn = self.store.lock();
        let affected = conn.execute("DELETE FROM entities WHERE id = ?1", params![id.as_str()])?;
        Ok(affected > 0)
    }

    /// Case-insensitive substring search over entity names, capped at
    /// [`SUBSTRING_SEARCH_LIMIT`] results.
    pub fn search_by_name_substring(&self, query: &str) -> Result<Vec<Entity>> {
        let pattern = substring_like_pattern(&query.to_lowercase());
        let conn = self.store.lock();
        let sql = format!(
            "SELECT {SELECT_COLUMNS} FROM entities
             WHERE LOWER(name) LIKE ?1 ESCAPE '\\'
             ORDER BY updated_at DESC
             LIMIT ?2"
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params![pattern, SUBSTRING_SEARCH_LIMIT], row_to_entity)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::Store;

    fn repo() -> EntityRepository {
        EntityRepository::new(Arc::new(Store::open_in_memory_for_tests().unwrap()))
    }

    #[test]
    fn find_or_create_is_idempotent_by_name() {
        let repo = repo();
        let a = repo.find_or_create("karolina", Some("person")).unwrap();
        let b = repo.find_or_create("karolina", None).unwrap();
        assert_eq!(a.id, b.id);
        assert_eq!(b.entity_type.as_deref(), Some("person"));
    }

    #[test]
    fn find_or_create_rejects_oversized_name() {
        let repo = repo();
        assert!(repo.find_or_create(&"a".repeat(201), None).is_err());
    }

    #[test]
    fn list_orders_by_updated_at_descending() {
        let repo = repo();
        let a = repo.find_or_create("a", None).unwrap();
        let b = repo.find_or_create("b", None).unwrap();
        repo.touch(&a.id).unwrap();
        let listed = repo.list(None, None).unwrap();
        assert_eq!(listed[0].id, a.id);
        assert_eq!(listed[1].id, b.id);
    }

    #[test]
    fn delete_removes_entity() {
        let repo = repo();
        let a = repo.find_or_create("a", None).unwrap();
        assert!(repo.delete(&a.id).unwrap());
        assert!(repo.find_by_id(&a.id).unwrap().is_none());
        assert!(!repo.delete(&a.id).unwrap());
    }

    #[test]
    fn search_by_name_substring_is_case_insensitive_and_capped() {
        let repo = repo();
        for i in 0..15 {
            repo.find_or_create(&format!("Project-{i}"), None).unwrap();
        }
        let hits = repo.search_by_name_substring("project").unwrap();
        assert_eq!(hits.len(), SUBSTRING_SEARCH_LIMIT as usize);
    }

    #[test]
    fn search_by_name_substring_escapes_like_metacharacters() {
        let repo = repo();
        repo.find_or_create("50%_off", None).unwrap();
        repo.find_or_create("something else", None).unwrap();
        let hits = repo.search_by_name_substring("%").unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].name, "50%_off");
    }
}
