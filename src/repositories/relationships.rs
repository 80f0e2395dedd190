use crate::models::entity::EntityId;
use crate::models::relationship::RelationshipId;
use crate::models::Relationship;
use crate::storage::Store;
use crate::{now_iso, Result};
use rusqlite::{params, Row};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

fn row_to_relationship(row: &Row<'_>) -> rusqlite::Result<Relationship> {
    Ok(Relationship {
        id: RelationshipId::from(row.get::<_, String>(0)?),
        from_entity: EntityId::from(row.get::<_, String>(1)?),
        to_entity: EntityId::from(row.get::<_, String>(2)?),
        relation_type: row.get(3)?,
        created_at: row.get(4)?,
    })
}

const SELECT_COLUMNS: &str = "id, from_entity, to_entity, relation_type, created_at";

/// A BFS-discovered neighbor entity, along with its shortest-path distance
/// from the seed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NeighborInfo {
    /// Hop count from the seed entity (shortest path).
    pub depth: u32,
    /// The neighbor's name.
    pub name: String,
    /// The neighbor's type, if any.
    pub entity_type: Option<String>,
}

/// Typed CRUD over the `relationships` table, plus undirected BFS traversal.
pub struct RelationshipRepository {
    store: Arc<Store>,
}

impl RelationshipRepository {
    /// Builds a repository over the given store.
    #[must_use]
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }

    /// Creates a directed relationship `from` → `to`.
    pub fn create(
        &self,
        from: &EntityId,
        to: &EntityId,
        relation_type: &str,
    ) -> Result<Relationship> {
        let id = RelationshipId::new();
        let now = now_iso();
        let conn = self.store.lock();
        conn.execute(
            "INSERT INTO relationships (id, from_entity, to_entity, relation_type, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![id.as_str(), from.as_str(), to.as_str(), relation_type, now],
        )?;
        Ok(Relationship {
            id,
            from_entity: from.clone(),
            to_entity: to.clone(),
            relation_type: relation_type.to_string(),
            created_at: now,
        })
    }

    /// Lists every relationship touching `entity_id`, as either endpoint.
    pub fn list_by_entity(&self, entity_id: &EntityId) -> Result<Vec<Relationship>> {
        let conn = self.store.lock();
        let sql = format!(
            "SELECT {SELECT_COLUMNS} FROM relationships
             WHERE from_entity = ?1 OR to_entity = ?1
             ORDER BY created_at DESC"
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params![entity_id.as_str()], row_to_relationship)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(Into::into)
    }

    /// Returns whether any relationship exists between `a` and `b`,
    /// regardless of direction.
    pub fn exists_between(&self, a: &EntityId, b: &EntityId) -> Result<bool> {
        let conn = self.store.lock();
        let count: i64 = conn.query_row(
            "SELECT count(*) FROM relationships
             WHERE (from_entity = ?1 AND to_entity = ?2)
                OR (from_entity = ?2 AND to_entity = ?1)",
            params![a.as_str(), b.as_str()],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    /// Deletes a single relationship by id.
    pub fn delete(&self, id: &RelationshipId) -> Result<bool> {
        let conn = self.store.lock();
        let affected = conn.execute("DELETE FROM relationships WHERE id = ?1", params![id.as_str()])?;
        Ok(affected > 0)
    }

    /// Deletes every relationship touching `entity_id`, as either endpoint.
    /// Returns the count removed.
    pub fn delete_by_entity(&self, entity_id: &EntityId) -> Result<usize> {
        let conn = self.store.lock();
        let affected = conn.execute(
            "DELETE FROM relationships WHERE from_entity = ?1 OR to_entity = ?1",
            params![entity_id.as_str()],
        )?;
        Ok(affected)
    }

    /// Breadth-first search over the relationship graph, treated as
    /// undirected, up to `max_depth` hops (clamped to `[0, 3]` by callers).
    /// The seed is excluded from the result; each neighbor is reported once,
    /// at its shortest-path depth.
    pub fn related_entities(
        &self,
        seed: &EntityId,
        max_depth: u32,
    ) -> Result<HashMap<EntityId, NeighborInfo>> {
        let mut result = HashMap::new();
        if max_depth == 0 {
            return Ok(result);
        }

        let conn = self.store.lock();
        let mut visited: HashSet<EntityId> = HashSet::new();
        visited.insert(seed.clone());
        let mut frontier: VecDeque<EntityId> = VecDeque::new();
        frontier.push_back(seed.clone());
        let mut depth = 0u32;

        while depth < max_depth && !frontier.is_empty() {
            depth += 1;
            let current: Vec<EntityId> = frontier.drain(..).collect();
            for node in current {
                let mut stmt = conn.prepare(
                    "SELECT CASE WHEN from_entity = ?1 THEN to_entity ELSE from_entity END
                     FROM relationships WHERE from_entity = ?1 OR to_entity = ?1",
                )?;
                let neighbor_ids: Vec<String> = stmt
                    .query_map(params![node.as_str()], |row| row.get(0))?
                    .collect::<rusqlite::Result<Vec<_>>>()?;

                for neighbor_id in neighbor_ids {
                    let neighbor = EntityId::from(neighbor_id);
                    if visited.contains(&neighbor) {
                        continue;
                    }
                    visited.insert(neighbor.clone());

                    if let Some((name, entity_type)) = conn
                        .query_row(
                            "SELECT name, entity_type FROM entities WHERE id = ?1",
                            params![neighbor.as_str()],
                            |row| Ok((row.get::<_, String>(0)?, row.get::<_, Option<String>>(1)?)),
                        )
                        .ok()
                    {
                        result.insert(neighbor.clone(), NeighborInfo { depth, name, entity_type });
                    }
                    frontier.push_back(neighbor);
                }
            }
        }

        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repositories::EntityRepository;

    fn setup() -> (EntityRepository, RelationshipRepository) {
        let store = Arc::new(crate::storage::Store::open_in_memory_for_tests().unwrap());
        (EntityRepository::new(store.clone()), RelationshipRepository::new(store))
    }

    #[test]
    fn exists_between_is_direction_independent() {
        let (entities, relationships) = setup();
        let a = entities.find_or_create("a", None).unwrap();
        let b = entities.find_or_create("b", None).unwrap();
        relationships.create(&a.id, &b.id, "relates_to").unwrap();
        assert!(relationships.exists_between(&a.id, &b.id).unwrap());
        assert!(relationships.exists_between(&b.id, &a.id).unwrap());
    }

    #[test]
    fn related_entities_excludes_seed_and_respects_depth_zero() {
        let (entities, relationships) = setup();
        let a = entities.find_or_create("a", None).unwrap();
        let b = entities.find_or_create("b", None).unwrap();
        relationships.create(&a.id, &b.id, "relates_to").unwrap();

        let zero = relationships.related_entities(&a.id, 0).unwrap();
        assert!(zero.is_empty());

        let one = relationships.related_entities(&a.id, 1).unwrap();
        assert!(!one.contains_key(&a.id));
        assert_eq!(one.get(&b.id).unwrap().depth, 1);
    }

    #[test]
    fn related_entities_result_size_is_monotone_in_depth() {
        let (entities, relationships) = setup();
        let a = entities.find_or_create("a", None).unwrap();
        let b = entities.find_or_create("b", None).unwrap();
        let c = entities.find_or_create("c", None).unwrap();
        relationships.create(&a.id, &b.id, "relates_to").unwrap();
        relationships.create(&b.id, &c.id, "relates_to").unwrap();

        let depth1 = relationships.related_entities(&a.id, 1).unwrap();
        let depth2 = relationships.related_entities(&a.id, 2).unwrap();
        assert!(depth1.len() <= depth2.len());
        assert_eq!(depth2.get(&c.id).unwrap().depth, 2);
    }

    #[test]
    fn delete_by_entity_removes_relationships_on_either_endpoint() {
        let (entities, relationships) = setup();
        let a = entities.find_or_create("a", None).unwrap();
        let b = entities.find_or_create("b", None).unwrap();
        let c = entities.find_or_create("c", None).unwrap();
        relationships.create(&a.id, &b.id, "relates_to").unwrap();
        relationships.create(&c.id, &a.id, "relates_to").unwrap();
        assert_eq!(relationships.delete_by_entity(&a.id).unwrap(), 2);
    }
}
