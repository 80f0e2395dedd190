//! Write-path dedup (C6): the `remember` algorithm. Embeds new content,
//! scores it against every existing embedding on the same entity, and
//! skips, replaces, or inserts depending on the best match — then runs
//! relationship auto-detection against recently-touched entities.

use crate::embedding::Embedder;
use crate::models::entity::Entity;
use crate::models::observation::Observation;
use crate::models::{embedding::cosine_similarity, strip_control_chars};
use crate::models::{EntityId, ObservationId, DEFAULT_RELATION_TYPE};
use crate::repositories::{EntityRepository, ObservationRepository, RelationshipRepository};
use crate::services::index::SemanticIndex;
use crate::services::relate::candidate_name_regex;
use crate::Result;
use std::sync::Arc;

/// Similarity above which a new observation is treated as a near-duplicate
/// of an existing one under the same entity.
pub const DEDUP_SIMILARITY_THRESHOLD: f64 = 0.85;
/// Entity name used when the caller supplies none.
pub const DEFAULT_ENTITY_NAME: &str = "general";
/// How many of the most-recently-updated entities are considered as
/// relationship auto-link candidates.
const RELATIONSHIP_CANDIDATE_LIMIT: i64 = 500;
/// Candidate names shorter than this are never auto-linked (too likely to
/// false-positive as a common word).
const MIN_CANDIDATE_NAME_LEN: usize = 3;

/// What happened to the new observation during a `remember` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RememberOutcome {
    /// A sufficiently similar, at-least-as-long observation already existed;
    /// nothing new was stored.
    Deduplicated,
    /// A shorter existing observation was replaced by the new, longer one.
    Replaced {
        /// The content of the observation that was replaced.
        previous_content: String,
    },
    /// No sufficiently similar observation existed; a new one was created.
    Created,
}

/// The full outcome of a `remember` call.
#[derive(Debug, Clone)]
pub struct RememberResult {
    /// The (possibly newly created) owning entity's id.
    pub entity_id: EntityId,
    /// The owning entity's name.
    pub entity_name: String,
    /// The id of the observation now representing this content (either the
    /// deduplicated match, the replacement, or the newly created row).
    pub observation_id: ObservationId,
    /// Names of entities newly linked to the owning entity by auto-detection.
    pub relationships_created: Vec<String>,
    /// What happened to the new content.
    pub outcome: RememberOutcome,
}

/// Implements the write-path dedup algorithm (C6).
pub struct RememberService {
    entities: Arc<EntityRepository>,
    observations: Arc<ObservationRepository>,
    relationships: Arc<RelationshipRepository>,
    index: Arc<SemanticIndex>,
    embedder: Arc<dyn Embedder>,
}

impl RememberService {
    /// Builds a remember service over the given repositories, index, and
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

    /// Embeds `content`, resolves or creates the owning entity, and either
    /// deduplicates against, replaces, or inserts alongside its existing
    /// observations before running relationship auto-detection.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::InvalidInput`] if `content`, `entity`, or
    /// `source` fail their length constraints, and propagates any embedder
    /// or store failure.
    pub fn remember(
        &self,
        content: &str,
        entity: Option<&str>,
        entity_type: Option<&str>,
        source: Option<&str>,
    ) -> Result<RememberResult> {
        let cleaned = strip_control_chars(content);
        Observation::validate_content(&cleaned)?;
        if let Some(s) = source {
            Observation::validate_source(s)?;
        }

        let entity_name = entity.unwrap_or(DEFAULT_ENTITY_NAME);
        Entity::validate_name(entity_name)?;
        let entity_row = self.entities.find_or_create(entity_name, entity_type)?;

        let vector = self.embedder.embed(&cleaned)?;
        let existing = self.index.list_by_entity(Some(&entity_row.id))?;

        let best = existing
            .iter()
            .map(|candidate| (candidate, cosine_similarity(&vector, &candidate.vector)))
            .filter(|(_, similarity)| *similarity >= DEDUP_SIMILARITY_THRESHOLD)
            .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));

        if let Some((matched, _similarity)) = best {
            if matched.text_content.chars().count() >= cleaned.chars().count() {
                return Ok(RememberResult {
                    entity_id: entity_row.id,
                    entity_name: entity_row.name,
                    observation_id: matched.observation_id.clone(),
                    relationships_created: Vec::new(),
                    outcome: RememberOutcome::Deduplicated,
                });
            }

            let previous_content = matched.text_content.clone();
            let previous_observation_id = matched.observation_id.clone();
            self.index.delete_by_observation(&previous_observation_id)?;
            self.observations.delete(&previous_observation_id)?;

            let created = self.observations.create(&entity_row.id, &cleaned, source)?;
            self.index
                .store(&entity_row.id, &created.id, &vector, &cleaned)?;
            let relationships_created = self.auto_link(&entity_row.id, &cleaned)?;

            return Ok(RememberResult {
                entity_id: entity_row.id,
                entity_name: entity_row.name,
                observation_id: created.id,
                relationships_created,
                outcome: RememberOutcome::Replaced { previous_content },
            });
        }

        let created = self.observations.create(&entity_row.id, &cleaned, source)?;
        self.index
            .store(&entity_row.id, &created.id, &vector, &cleaned)?;
        let relationships_created = self.auto_link(&entity_row.id, &cleaned)?;

        Ok(RememberResult {
            entity_id: entity_row.id,
            entity_name: entity_row.name,
            observation_id: created.id,
            relationships_created,
            outcome: RememberOutcome::Created,
        })
    }

    /// Scans up to [`RELATIONSHIP_CANDIDATE_LIMIT`] most-recently-updated
    /// entities and links `source_id` to any whose name appears in `content`
    /// as a whole word, skipping `"general"`, short names, and pairs that
    /// already have a relationship in either direction.
    fn auto_link(&self, source_id: &EntityId, content: &str) -> Result<Vec<String>> {
        let candidates = self
            .entities
            .list(None, Some(RELATIONSHIP_CANDIDATE_LIMIT))?;
        let mut linked = Vec::new();

        for candidate in candidates {
            if &candidate.id == source_id {
                continue;
            }
            if candidate.name == DEFAULT_ENTITY_NAME {
                continue;
            }
            if candidate.name.chars().count() < MIN_CANDIDATE_NAME_LEN {
                continue;
            }
            let Some(pattern) = candidate_name_regex(&candidate.name) else {
                continue;
            };
            if !pattern.is_match(content) {
                continue;
            }
            if self
                .relationships
                .exists_between(source_id, &candidate.id)?
            {
                continue;
            }

            self.relationships
                .create(source_id, &candidate.id, DEFAULT_RELATION_TYPE)?;
            linked.push(candidate.name);
        }

        Ok(linked)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::Store;

    struct StubEmbedder;

    impl Embedder for StubEmbedder {
        fn embed(&self, text: &str) -> Result<Vec<f32>> {
            let mut v = vec![0.0f32; crate::models::EMBEDDING_DIM];
            for (i, byte) in text.bytes().enumerate() {
                v[i % v.len()] += f32::from(byte);
            }
            let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
            if norm > 0.0 {
                for x in &mut v {
                    *x /= norm;
                }
            }
            Ok(v)
        }
    }

    fn service() -> RememberService {
        let store = Arc::new(Store::open_in_memory_for_tests().unwrap());
        RememberService::new(
            Arc::new(EntityRepository::new(store.clone())),
            Arc::new(ObservationRepository::new(store.clone())),
            Arc::new(RelationshipRepository::new(store.clone())),
            Arc::new(SemanticIndex::new(store)),
            Arc::new(StubEmbedder),
        )
    }

    #[test]
    fn remember_twice_with_identical_content_deduplicates() {
        let svc = service();
        let first = svc
            .remember("likes dark roast coffee", Some("k"), None, None)
            .unwrap();
        assert_eq!(first.outcome, RememberOutcome::Created);

        let second = svc
            .remember("likes dark roast coffee", Some("k"), None, None)
            .unwrap();
        assert_eq!(second.outcome, RememberOutcome::Deduplicated);
        assert_eq!(second.observation_id, first.observation_id);
    }

    #[test]
    fn longer_duplicate_replaces_shorter_match() {
        let svc = service();
        let short = svc
            .remember("PhD in atmospheric physics from TU Delft", Some("k"), None, None)
            .unwrap();
        assert_eq!(short.outcome, RememberOutcome::Created);

        let long = svc
            .remember(
                "PhD in atmospheric physics from TU Delft and works in climate tech",
                Some("k"),
                None,
                None,
            )
            .unwrap();
        match long.outcome {
            RememberOutcome::Replaced { previous_content } => {
                assert_eq!(previous_content, "PhD in atmospheric physics from TU Delft");
            }
            other => panic!("expected Replaced, got {other:?}"),
        }
    }

    #[test]
    fn defaults_to_general_entity() {
        let svc = service();
        let result = svc.remember("a stray fact", None, None, None).unwrap();
        assert_eq!(result.entity_name, DEFAULT_ENTITY_NAME);
    }

    #[test]
    fn auto_links_mentioned_entity() {
        let svc = service();
        svc.remember("bio", Some("karolina"), None, None).unwrap();
        svc.remember("project notes", Some("hippocampus"), None, None)
            .unwrap();

        let result = svc
            .remember(
                "karolina is the creator of hippocampus",
                Some("notes"),
                None,
                None,
            )
            .unwrap();

        let mut names = result.relationships_created.clone();
        names.sort();
        assert_eq!(names, vec!["hippocampus".to_string(), "karolina".to_string()]);
    }

    #[test]
    fn does_not_duplicate_existing_relationship() {
        let svc = service();
        svc.remember("bio", Some("karolina"), None, None).unwrap();
        svc.remember("mentions karolina once", Some("notes"), None, None)
            .unwrap();
        let second = svc
            .remember("mentions karolina again elsewhere", Some("notes"), None, None)
            .unwrap();
        assert!(second.relationships_created.is_empty());
    }
}
