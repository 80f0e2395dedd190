//! Retrieval fusion (C5): the `recall` algorithm. Runs semantic and lexical
//! search over the same query, merges them with semantic results ordered
//! first, and deduplicates by observation id on first occurrence.

use crate::embedding::Embedder;
use crate::models::entity::EntityId;
use crate::models::observation::ObservationId;
use crate::repositories::{LexicalSearchFilter, ObservationRepository};
use crate::services::index::{SemanticIndex, SemanticSearchFilter};
use crate::{Error, Result};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::warn;

/// Default result cap for [`RecallService::recall`].
pub const DEFAULT_RECALL_LIMIT: usize = 10;
/// Minimum similarity for a semantic hit to be included in fused results.
pub const SEMANTIC_FLOOR: f64 = 0.15;
/// Minimum allowed `limit`.
pub const MIN_RECALL_LIMIT: usize = 1;
/// Maximum allowed `limit`.
pub const MAX_RECALL_LIMIT: usize = 50;
/// Maximum length, in characters, of a recall query.
pub const MAX_QUERY_LEN: usize = 500;

/// Filters shared by the semantic and lexical legs of a recall.
#[derive(Debug, Clone, Default)]
pub struct RecallFilter {
    /// Restrict to entities of this type.
    pub entity_type: Option<String>,
    /// Restrict to observations created at or after this ISO-8601 timestamp.
    pub since: Option<String>,
}

/// A single fused recall hit.
#[derive(Debug, Clone)]
pub struct RecallHit {
    /// The matching observation's id.
    pub observation_id: ObservationId,
    /// The owning entity's id.
    pub entity_id: EntityId,
    /// The owning entity's name.
    pub entity_name: String,
    /// The owning entity's type, if any.
    pub entity_type: Option<String>,
    /// The observation's content.
    pub content: String,
    /// The observation's provenance tag, if any, as given to `remember`.
    pub source: Option<String>,
    /// ISO-8601 UTC timestamp the observation was created at.
    pub created_at: String,
    /// Which leg produced this hit: `"semantic"` or `"lexical"`.
    pub match_kind: &'static str,
    /// Cosine similarity, present only for semantic hits.
    pub similarity: Option<f64>,
}

/// Implements retrieval fusion (C5).
pub struct RecallService {
    observations: Arc<ObservationRepository>,
    index: Arc<SemanticIndex>,
    embedder: Arc<dyn Embedder>,
}

impl RecallService {
    /// Builds a recall service over the given observation repository,
    /// semantic index, and embedder.
    #[must_use]
    pub fn new(
        observations: Arc<ObservationRepository>,
        index: Arc<SemanticIndex>,
        embedder: Arc<dyn Embedder>,
    ) -> Self {
        Self {
            observations,
            index,
            embedder,
        }
    }

    /// Runs semantic and lexical search over `query`, merges them with
    /// semantic hits first, drops any lexical hit whose observation id
    /// already appeared among the semantic hits, and truncates to `limit`
    /// (default [`DEFAULT_RECALL_LIMIT`], clamped to
    /// `[`[`MIN_RECALL_LIMIT`]`, `[`MAX_RECALL_LIMIT`]`]`).
    ///
    /// If the embedder is unavailable, recall degrades to lexical-only
    /// rather than failing outright.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if `query` exceeds [`MAX_QUERY_LEN`]
    /// characters, and propagates any store failure from either leg.
    pub fn recall(
        &self,
        query: &str,
        filter: &RecallFilter,
        limit: Option<usize>,
    ) -> Result<Vec<RecallHit>> {
        let query_len = query.chars().count();
        if query_len > MAX_QUERY_LEN {
            return Err(Error::InvalidInput(format!(
                "query must be at most {MAX_QUERY_LEN} characters, got {query_len}"
            )));
        }

        let limit = limit
            .unwrap_or(DEFAULT_RECALL_LIMIT)
            .clamp(MIN_RECALL_LIMIT, MAX_RECALL_LIMIT);

        let semantic_filter = SemanticSearchFilter {
            entity_type: filter.entity_type.clone(),
            since: filter.since.clone(),
        };
        let semantic_hits = match self.embedder.embed(query) {
            Ok(vector) => self.index.search(&vector, limit, &semantic_filter)?,
            Err(err) => {
                warn!(error = %err, "embedder unavailable, degrading recall to lexical-only");
                Vec::new()
            }
        };

        let lexical_filter = LexicalSearchFilter {
            entity_type: filter.entity_type.clone(),
            since: filter.since.clone(),
        };
        let lexical_hits = self
            .observations
            .lexical_search(query, &lexical_filter, Some(limit as i64))?;

        let mut seen: HashSet<ObservationId> = HashSet::new();
        let mut fused = Vec::with_capacity(limit);

        for hit in semantic_hits {
            if hit.similarity < SEMANTIC_FLOOR {
                continue;
            }
            if !seen.insert(hit.observation_id.clone()) {
                continue;
            }
            fused.push(RecallHit {
                observation_id: hit.observation_id,
                entity_id: hit.entity_id,
                entity_name: hit.entity_name,
                entity_type: hit.entity_type,
                content: hit.content,
                source: hit.source,
                created_at: hit.created_at,
                match_kind: "semantic",
                similarity: Some(hit.similarity),
            });
        }

        for hit in lexical_hits {
            if !seen.insert(hit.observation.id.clone()) {
                continue;
            }
            fused.push(RecallHit {
                observation_id: hit.observation.id,
                entity_id: hit.observation.entity_id,
                entity_name: hit.entity_name,
                entity_type: hit.entity_type,
                content: hit.observation.content,
                source: hit.observation.source,
                created_at: hit.observation.created_at,
                match_kind: "lexical",
                similarity: None,
            });
        }

        fused.truncate(limit);
        Ok(fused)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repositories::EntityRepository;
    use crate::storage::Store;

    struct FailingEmbedder;

    impl Embedder for FailingEmbedder {
        fn embed(&self, _text: &str) -> Result<Vec<f32>> {
            Err(crate::Error::EmbedderUnavailable("no model loaded".to_string()))
        }
    }

    struct UnitFirstEmbedder;

    impl Embedder for UnitFirstEmbedder {
        fn embed(&self, _text: &str) -> Result<Vec<f32>> {
            let mut v = vec![0.0f32; crate::models::EMBEDDING_DIM];
            v[0] = 1.0;
            Ok(v)
        }
    }

    #[test]
    fn degrades_to_lexical_only_when_embedder_fails() {
        let store = Arc::new(Store::open_in_memory_for_tests().unwrap());
        let entities = EntityRepository::new(store.clone());
        let observations = Arc::new(ObservationRepository::new(store.clone()));
        let index = Arc::new(SemanticIndex::new(store));
        let svc = RecallService::new(observations.clone(), index, Arc::new(FailingEmbedder));

        let e = entities.find_or_create("k", None).unwrap();
        observations.create(&e.id, "loves dark roast coffee", None).unwrap();

        let hits = svc.recall("dark roast", &RecallFilter::default(), None).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].match_kind, "lexical");
    }

    #[test]
    fn deduplicates_hit_present_in_both_legs() {
        let store = Arc::new(Store::open_in_memory_for_tests().unwrap());
        let entities = EntityRepository::new(store.clone());
        let observations = Arc::new(ObservationRepository::new(store.clone()));
        let index = Arc::new(SemanticIndex::new(store));
        let svc = RecallService::new(observations.clone(), index.clone(), Arc::new(UnitFirstEmbedder));

        let e = entities.find_or_create("k", None).unwrap();
        let obs = observations.create(&e.id, "matches both legs", None).unwrap();
        let mut v = vec![0.0f32; crate::models::EMBEDDING_DIM];
        v[0] = 1.0;
        index.store(&e.id, &obs.id, &v, "matches both legs").unwrap();

        let hits = svc.recall("matches both legs", &RecallFilter::default(), None).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].match_kind, "semantic");
    }

    #[test]
    fn below_floor_semantic_hits_are_dropped() {
        let store = Arc::new(Store::open_in_memory_for_tests().unwrap());
        let entities = EntityRepository::new(store.clone());
        let observations = Arc::new(ObservationRepository::new(store.clone()));
        let index = Arc::new(SemanticIndex::new(store));
        let svc = RecallService::new(observations.clone(), index.clone(), Arc::new(UnitFirstEmbedder));

        let e = entities.find_or_create("k", None).unwrap();
        let obs = observations.create(&e.id, "orthogonal content", None).unwrap();
        let mut v = vec![0.0f32; crate::models::EMBEDDING_DIM];
        v[1] = 1.0;
        index.store(&e.id, &obs.id, &v, "orthogonal content").unwrap();

        let hits = svc.recall("unrelated query", &RecallFilter::default(), None).unwrap();
        assert!(hits.iter().all(|h| h.match_kind != "semantic"));
    }

    #[test]
    fn query_over_max_length_is_rejected() {
        let store = Arc::new(Store::open_in_memory_for_tests().unwrap());
        let observations = Arc::new(ObservationRepository::new(store.clone()));
        let index = Arc::new(SemanticIndex::new(store));
        let svc = RecallService::new(observations, index, Arc::new(UnitFirstEmbedder));

        let query = "a".repeat(MAX_QUERY_LEN + 1);
        assert!(svc.recall(&query, &RecallFilter::default(), None).is_err());
    }

    #[test]
    fn limit_is_clamped_to_the_allowed_range() {
        let store = Arc::new(Store::open_in_memory_for_tests().unwrap());
        let entities = EntityRepository::new(store.clone());
        let observations = Arc::new(ObservationRepository::new(store.clone()));
        let index = Arc::new(SemanticIndex::new(store));
        let svc = RecallService::new(observations.clone(), index, Arc::new(UnitFirstEmbedder));

        let e = entities.find_or_create("k", None).unwrap();
        for i in 0..5 {
            observations
                .create(&e.id, &format!("coffee note {i}"), None)
                .unwrap();
        }

        let hits = svc
            .recall("coffee", &RecallFilter::default(), Some(0))
            .unwrap();
        assert!(hits.len() <= MIN_RECALL_LIMIT);

        let hits = svc
            .recall("coffee", &RecallFilter::default(), Some(1000))
            .unwrap();
        assert!(hits.len() <= MAX_RECALL_LIMIT);
    }
}
