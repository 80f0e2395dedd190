//! Mutation operations (C9): `update`, `merge`, and `forget`. Unlike recall
//! and dedup, these favor raising over degrading: a cross-entity `merge` or
//! a missing id is a caller error, not something to silently work around.

use crate::embedding::Embedder;
use crate::models::entity::EntityId;
use crate::models::observation::ObservationId;
use crate::models::Observation;
use crate::repositories::{EntityRepository, ObservationRepository, RelationshipRepository};
use crate::services::index::SemanticIndex;
use crate::{Error, Result};
use std::sync::Arc;

/// A request to merge several observations into one, under caller-supplied
/// final content.
#[derive(Debug, Clone)]
pub struct MergeRequest {
    /// Ids of the observations to merge. Must all belong to the same entity.
    pub observation_ids: Vec<ObservationId>,
    /// The content of the resulting, single observation.
    pub content: String,
}

/// The result of a successful merge.
#[derive(Debug, Clone)]
pub struct MergeResult {
    /// The entity the merged observations belonged to.
    pub entity_id: EntityId,
    /// The entity's name.
    pub entity_name: String,
    /// The newly created, merged observation.
    pub observation: Observation,
    /// How many observations were merged away.
    pub merged_count: usize,
}

/// Row counts removed by a [`MutationService::forget`] call.
#[derive(Debug, Clone, Copy, Default)]
pub struct ForgetCounts {
    /// Entities removed (0 or 1).
    pub entities: usize,
    /// Observations removed.
    pub observations: usize,
    /// Embeddings removed.
    pub embeddings: usize,
    /// Relationships removed.
    pub relationships: usize,
}

/// Implements the update/merge/forget mutation operations (C9).
pub struct MutationService {
    entities: Arc<EntityRepository>,
    observations: Arc<ObservationRepository>,
    relationships: Arc<RelationshipRepository>,
    index: Arc<SemanticIndex>,
    embedder: Arc<dyn Embedder>,
}

impl MutationService {
    /// Builds a mutation service over the given repositories, index, and
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

    /// Replaces the observation on `entity` whose content matches
    /// `old_content` exactly with one holding `new_content`, preserving the
    /// original's `source` tag and re-embedding.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::NotFound`] if `entity` does not exist or none
    /// of its observations match `old_content` exactly, and propagates any
    /// embedder or store failure.
    pub fn update(&self, entity: &str, old_content: &str, new_content: &str) -> Result<Observation> {
        let entity_row = self
            .entities
            .find_by_name(entity)?
            .ok_or_else(|| Error::NotFound(format!("entity {entity:?}")))?;

        let cleaned_new = crate::models::strip_control_chars(new_content);
        Observation::validate_content(&cleaned_new)?;

        let existing = self.observations.list_by_entity(&entity_row.id)?;
        let matched = existing
            .into_iter()
            .find(|o| o.content == old_content)
            .ok_or_else(|| {
                Error::NotFound(format!(
                    "no observation on entity {entity:?} matches the given content exactly"
                ))
            })?;

        let vector = self.embedder.embed(&cleaned_new)?;
        let created = self
            .observations
            .create(&entity_row.id, &cleaned_new, matched.source.as_deref())?;
        self.index
            .store(&entity_row.id, &created.id, &vector, &cleaned_new)?;

        self.index.delete_by_observation(&matched.id)?;
        self.observations.delete(&matched.id)?;

        Ok(created)
    }

    /// Merges the observations named in `request` into one new observation
    /// holding `request.content`, preserving the first non-null `source`
    /// among the originals, then deletes the originals.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::NotFound`] if any id has no matching
    /// observation, and [`crate::Error::PreconditionFailed`] if the
    /// observations span more than one entity. Neither failure mode is
    /// partially applied: on error, no row is modified.
    pub fn merge(&self, request: &MergeRequest) -> Result<MergeResult> {
        if request.observation_ids.len() < 2 {
            return Err(Error::InvalidInput(
                "merge requires at least two observation ids".to_string(),
            ));
        }

        let fetched = self.observations.fetch_by_ids(&request.observation_ids)?;
        if fetched.len() != request.observation_ids.len() {
            return Err(Error::NotFound(
                "one or more merge observation ids do not exist".to_string(),
            ));
        }

        let entity_id = fetched[0].entity_id.clone();
        if fetched.iter().any(|o| o.entity_id != entity_id) {
            return Err(Error::PreconditionFailed(
                "merge observations must all belong to the same entity".to_string(),
            ));
        }

        let entity_row = self
            .entities
            .find_by_id(&entity_id)?
            .ok_or_else(|| Error::NotFound(format!("entity {entity_id}")))?;

        let cleaned = crate::models::strip_control_chars(&request.content);
        Observation::validate_content(&cleaned)?;
        let source = fetched.iter().find_map(|o| o.source.clone());

        let vector = self.embedder.embed(&cleaned)?;
        let created = self
            .observations
            .create(&entity_id, &cleaned, source.as_deref())?;
        self.index
            .store(&entity_id, &created.id, &vector, &cleaned)?;

        for obs in &fetched {
            self.index.delete_by_observation(&obs.id)?;
            self.observations.delete(&obs.id)?;
        }

        Ok(MergeResult {
            entity_id,
            entity_name: entity_row.name,
            observation: created,
            merged_count: fetched.len(),
        })
    }

    /// Deletes either a whole entity (with its observations, embeddings, and
    /// relationships) or a single observation (with its embedding).
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::InvalidInput`] if both or neither of `entity`
    /// and `observation_id` are given, [`crate::Error::NotFound`] if the
    /// named entity or observation does not exist, and propagates any store
    /// failure.
    pub fn forget(
        &self,
        entity: Option<&str>,
        observation_id: Option<&ObservationId>,
    ) -> Result<ForgetCounts> {
        match (entity, observation_id) {
            (Some(_), Some(_)) | (None, None) => Err(Error::InvalidInput(
                "forget takes exactly one of entity or observation_id".to_string(),
            )),
            (Some(name), None) => self.forget_entity(name),
            (None, Some(id)) => self.forget_observation(id),
        }
    }

    fn forget_entity(&self, name: &str) -> Result<ForgetCounts> {
        let entity_row = self
            .entities
            .find_by_name(name)?
            .ok_or_else(|| Error::NotFound(format!("entity {name:?}")))?;

        let embeddings = self.index.delete_by_entity(&entity_row.id)?;
        let observations = self.observations.delete_by_entity(&entity_row.id)?;
        let relationships = self.relationships.delete_by_entity(&entity_row.id)?;
        self.entities.delete(&entity_row.id)?;

        Ok(ForgetCounts {
            entities: 1,
            observations,
            embeddings,
            relationships,
        })
    }

    fn forget_observation(&self, id: &ObservationId) -> Result<ForgetCounts> {
        let embedding_removed = self.index.delete_by_observation(id)?;
        let observation_removed = self.observations.delete(id)?;
        if !observation_removed {
            return Err(Error::NotFound(format!("observation {id}")));
        }

        Ok(ForgetCounts {
            entities: 0,
            observations: 1,
            embeddings: usize::from(embedding_removed),
            relationships: 0,
        })
    }
}
