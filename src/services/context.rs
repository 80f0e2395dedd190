//! Context assembly (C7): resolves a topic to an entity through a cascade
//! of exact name match, substring match, and semantic fallback, then
//! expands outward through the relationship graph.

use crate::embedding::Embedder;
use crate::models::entity::EntityId;
use crate::models::Entity;
use crate::repositories::{EntityRepository, ObservationRepository, RelationshipRepository};
use crate::services::index::{SemanticIndex, SemanticSearchFilter};
use crate::{Error, Result};
use std::sync::Arc;

/// Minimum similarity for the semantic fallback in topic resolution.
pub const TOPIC_SEMANTIC_THRESHOLD: f64 = 0.2;
/// Default neighborhood expansion depth when the caller specifies none.
pub const DEFAULT_RELATED_DEPTH: u32 = 1;
/// Hard ceiling on the expansion depth, regardless of what the caller asks for.
pub const MAX_RELATED_DEPTH: u32 = 3;
/// Maximum length, in characters, of a context topic.
pub const MAX_TOPIC_LEN: usize = 200;

/// A related entity surfaced by graph expansion, with its recent observations.
#[derive(Debug, Clone)]
pub struct RelatedEntitySummary {
    /// The related entity's id.
    pub entity_id: EntityId,
    /// The related entity's name.
    pub name: String,
    /// The related entity's type, if any.
    pub entity_type: Option<String>,
    /// Hop count from the topic entity.
    pub depth: u32,
    /// This entity's observations, newest first.
    pub observations: Vec<String>,
}

/// A relationship rendered with both endpoints' names resolved, for direct
/// display without a further lookup.
#[derive(Debug, Clone)]
pub struct NamedRelationship {
    /// Name of the `from` endpoint.
    pub from_name: String,
    /// Name of the `to` endpoint.
    pub to_name: String,
    /// The relationship's type tag.
    pub relation_type: String,
}

/// The assembled context for a topic: the resolved entity, its own
/// observations, its related entities, and the relationships connecting them.
#[derive(Debug, Clone)]
pub struct ContextResult {
    /// The entity the topic resolved to.
    pub entity: Entity,
    /// How the topic was resolved: `"exact"`, `"substring"`, or `"semantic"`.
    pub resolution: &'static str,
    /// The topic entity's own observations, newest first.
    pub observations: Vec<String>,
    /// Entities reachable within the requested depth, ordered by depth then
    /// name.
    pub related: Vec<RelatedEntitySummary>,
    /// Relationships among the topic entity and its related entities.
    pub relationships: Vec<NamedRelationship>,
}

/// Implements topic resolution and graph-bounded context assembly (C7).
pub struct ContextService {
    entities: Arc<EntityRepository>,
    observations: Arc<ObservationRepository>,
    relationships: Arc<RelationshipRepository>,
    index: Arc<SemanticIndex>,
    embedder: Arc<dyn Embedder>,
}

impl ContextService {
    /// Builds a context service over the given repositories, index, and
    /// embedder.
    #[must_use]
    pub fn new(
        entities: Arc<EntityRepository>,
        observations: Arc<ObservationRepository>,
        relationships: Arc<RelationshipRepository>,
        index: Arc<SemanticIndex>,
        embedder: Arc<dyn Embedder>,
    ) -> Self {
        Self {
            entities,
            observations,
            relationships,
            index,
            embedder,
        }
    }

    /// Resolves `topic` to an entity and assembles its context out to
    /// `depth` hops (clamped to `[0, `[`MAX_RELATED_DEPTH`]`]`, default
    /// [`DEFAULT_RELATED_DEPTH`]).
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if `topic` exceeds [`MAX_TOPIC_LEN`]
    /// characters, [`Error::NotFound`] if no entity resolves for `topic`,
    /// and propagates any store or embedder failure.
    pub fn assemble(&self, topic: &str, depth: Option<u32>) -> Result<ContextResult> {
        let topic_len = topic.chars().count();
        if topic_len > MAX_TOPIC_LEN {
            return Err(Error::InvalidInput(format!(
                "topic must be at most {MAX_TOPIC_LEN} characters, got {topic_len}"
            )));
        }

        let depth = depth.unwrap_or(DEFAULT_RELATED_DEPTH).min(MAX_RELATED_DEPTH);
        let (entity, resolution) = self.resolve_topic(topic)?;

        let own_observations = self
            .observations
            .list_by_entity(&entity.id)?
            .into_iter()
            .map(|o| o.content)
            .collect();

        let neighbors = self.relationships.related_entities(&entity.id, depth)?;
        let mut related = Vec::with_capacity(neighbors.len());
        for (neighbor_id, info) in &neighbors {
            let observations = self
                .observations
                .list_by_entity(neighbor_id)?
                .into_iter()
                .map(|o| o.content)
                .collect();
            related.push(RelatedEntitySummary {
                entity_id: neighbor_id.clone(),
                name: info.name.clone(),
                entity_type: info.entity_type.clone(),
                depth: info.depth,
                observations,
            });
        }
        related.sort_by(|a, b| a.depth.cmp(&b.depth).then_with(|| a.name.cmp(&b.name)));

        let mut participant_ids: Vec<EntityId> = neighbors.keys().cloned().collect();
        participant_ids.push(entity.id.clone());
        let mut names = std::collections::HashMap::with_capacity(participant_ids.len() + 1);
        names.insert(entity.id.clone(), entity.name.clone());
        for (id, info) in &neighbors {
            names.insert(id.clone(), info.name.clone());
        }

        let mut relationships = Vec::new();
        let mut seen = std::collections::HashSet::new();
        for id in &participant_ids {
            for rel in self.relationships.list_by_entity(id)? {
                if !seen.insert(rel.id.clone()) {
                    continue;
                }
                let (Some(from_name), Some(to_name)) =
                    (names.get(&rel.from_entity), names.get(&rel.to_entity))
                else {
                    continue;
                };
                relationships.push(NamedRelationship {
                    from_name: from_name.clone(),
                    to_name: to_name.clone(),
                    relation_type: rel.relation_type,
                });
            }
        }

        Ok(ContextResult {
            entity,
            resolution,
            observations: own_observations,
            related,
            relationships,
        })
    }

    /// Exact name match, then substring match on the best (most recently
    /// updated) hit, then a semantic fallback over all observations.
    fn resolve_topic(&self, topic: &str) -> Result<(Entity, &'static str)> {
        if let Some(entity) = self.entities.find_by_name(topic)? {
            return Ok((entity, "exact"));
        }

        let substring_hits = self.entities.search_by_name_substring(topic)?;
        if let Some(entity) = substring_hits.into_iter().next() {
            return Ok((entity, "substring"));
        }

        let vector = self.embedder.embed(topic)?;
        let hits = self
            .index
            .search(&vector, 1, &SemanticSearchFilter::default())?;
        let Some(best) = hits.into_iter().find(|h| h.similarity >= TOPIC_SEMANTIC_THRESHOLD) else {
            return Err(Error::NotFound(format!("no entity resolves for topic {topic:?}")));
        };
        let entity = self.entities.find_by_id(&best.entity_id)?.ok_or_else(|| {
            Error::NotFound(format!(
                "entity {} referenced by an embedding row is missing",
                best.entity_id
            ))
        })?;
        Ok((entity, "semantic"))
    }
}
