//! The engine: the process-wide object a transport layer calls into. Wires
//! the encrypted store, the embedder, the three repositories, and the six
//! C4-C9 services together behind one typed API, and is the seam at which
//! operation-level logging and metrics (§7) are attached.

use std::sync::Arc;

use crate::config::EngineConfig;
use crate::embedding::{Embedder, OnnxEmbedder};
use crate::io::{ExportOptions, ExportResult, ExportService};
use crate::models::entity::EntityId;
use crate::models::observation::ObservationId;
use crate::repositories::{EntityRepository, ObservationRepository, RelationshipRepository};
use crate::services::{
    Cluster, ConsolidationService, ContextResult, ContextService, ForgetCounts, MergeRequest,
    MergeResult, MutationService, RecallFilter, RecallHit, RecallService, RememberResult,
    RememberService, SemanticIndex,
};
use crate::storage::Store;
use crate::{Error, Result};

/// The memory engine: one encrypted store, one embedder, and the C4-C9
/// services built on top of them.
///
/// An `Engine` is meant to be opened once per process and shared (behind an
/// `Arc`, or simply owned by the caller for the process lifetime) across
/// every request handler, mirroring the process-wide-singleton treatment
/// the specification gives the store handle and the embedder pipeline.
pub struct Engine {
    entities: Arc<EntityRepository>,
    remember: RememberService,
    recall: RecallService,
    context: ContextService,
    consolidation: ConsolidationService,
    mutation: MutationService,
    export: ExportService,
}

impl Engine {
    /// Opens the encrypted store at `config.db_path`, runs any outstanding
    /// migrations, and wires every repository and service on top of it.
    /// The embedder is not loaded yet — it loads lazily on first use (see
    /// [`OnnxEmbedder::global`]).
    ///
    /// # Errors
    ///
    /// Returns [`Error::Fatal`] if the store cannot be opened (wrong
    /// passphrase, corrupted file, or a migration failure).
    pub fn open(config: &EngineConfig) -> Result<Self> {
        let store = Arc::new(Store::open(&config.db_path, &config.passphrase)?);
        let embedder = Self::embedder_handle(&config.embedder_cache_dir)?;
        Ok(Self::wire(store, embedder))
    }

    /// Wires an engine over an already-open store and embedder. Used by
    /// [`Self::open`] and by tests that substitute an in-memory store or a
    /// stub embedder.
    #[must_use]
    pub fn wire(store: Arc<Store>, embedder: Arc<dyn Embedder>) -> Self {
        let entities = Arc::new(EntityRepository::new(Arc::clone(&store)));
        let observations = Arc::new(ObservationRepository::new(Arc::clone(&store)));
        let relationships = Arc::new(RelationshipRepository::new(Arc::clone(&store)));
        let index = Arc::new(SemanticIndex::new(Arc::clone(&store)));

        backfill_missing_embeddings(&entities, &observations, &index, embedder.as_ref());

        Self {
            entities: Arc::clone(&entities),
            remember: RememberService::new(
                Arc::clone(&entities),
                Arc::clone(&observations),
                Arc::clone(&relationships),
                Arc::clone(&index),
                Arc::clone(&embedder),
            ),
            recall: RecallService::new(
                Arc::clone(&observations),
                Arc::clone(&index),
                Arc::clone(&embedder),
            ),
            context: ContextService::new(
                Arc::clone(&entities),
                Arc::clone(&observations),
                Arc::clone(&relationships),
                Arc::clone(&index),
                Arc::clone(&embedder),
            ),
            consolidation: ConsolidationService::new(Arc::clone(&index), Arc::clone(&entities)),
            mutation: MutationService::new(
                Arc::clone(&entities),
                Arc::clone(&observations),
                Arc::clone(&relationships),
                Arc::clone(&index),
                embedder,
            ),
            export: ExportService::new(entities, observations, relationships),
        }
    }

    fn embedder_handle(cache_dir: &std::path::Path) -> Result<Arc<dyn Embedder>> {
        // `OnnxEmbedder::global` itself defers model/tokenizer loading to
        // first use; wrapping it here just adapts `&'static` to `Arc` so
        // `Engine` has one embedder type regardless of how it was built.
        struct GlobalOnnxEmbedder {
            cache_dir: std::path::PathBuf,
        }

        impl Embedder for GlobalOnnxEmbedder {
            fn embed(&self, text: &str) -> Result<Vec<f32>> {
                OnnxEmbedder::global(&self.cache_dir)?.embed(text)
            }

            fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
                OnnxEmbedder::global(&self.cache_dir)?.embed_batch(texts)
            }
        }

        Ok(Arc::new(GlobalOnnxEmbedder {
            cache_dir: cache_dir.to_path_buf(),
        }))
    }

    /// Implements the `remember` tool (C6).
    ///
    /// # Errors
    ///
    /// Propagates [`Error::InvalidInput`] for out-of-range arguments and any
    /// embedder or store failure.
    #[tracing::instrument(skip(self, content), fields(operation = "remember", content_len = content.len()))]
    pub fn remember(
        &self,
        content: &str,
        entity: Option<&str>,
        entity_type: Option<&str>,
        source: Option<&str>,
    ) -> Result<RememberResult> {
        let start = std::time::Instant::now();
        let result = self.remember.remember(content, entity, entity_type, source);
        log_outcome("remember", start, result.is_ok());
        result
    }

    /// Implements the `recall` tool (C5).
    ///
    /// # Errors
    ///
    /// Propagates any store failure. Embedder failures degrade to
    /// lexical-only rather than erroring.
    #[tracing::instrument(skip(self, query), fields(operation = "recall", query_len = query.len()))]
    pub fn recall(
        &self,
        query: &str,
        filter: &RecallFilter,
        limit: Option<usize>,
    ) -> Result<Vec<RecallHit>> {
        let start = std::time::Instant::now();
        let result = self.recall.recall(query, filter, limit);
        log_outcome("recall", start, result.is_ok());
        result
    }

    /// Implements the `context` tool (C7).
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if no entity resolves for `topic`, and
    /// propagates any store or embedder failure.
    #[tracing::instrument(skip(self, topic), fields(operation = "context"))]
    pub fn context(&self, topic: &str, depth: Option<u32>) -> Result<ContextResult> {
        let start = std::time::Instant::now();
        let result = self.context.assemble(topic, depth);
        log_outcome("context", start, result.is_ok());
        result
    }

    /// Implements the `update` tool (C9).
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if `entity` or the exact-match
    /// observation cannot be found, and propagates any embedder or store
    /// failure.
    #[tracing::instrument(skip(self, old_content, new_content), fields(operation = "update"))]
    pub fn update(
        &self,
        entity: &str,
        old_content: &str,
        new_content: &str,
    ) -> Result<crate::models::Observation> {
        let start = std::time::Instant::now();
        let result = self.mutation.update(entity, old_content, new_content);
        log_outcome("update", start, result.is_ok());
        result
    }

    /// Implements the `merge` tool (C9).
    ///
    /// # Errors
    ///
    /// Returns [`Error::PreconditionFailed`] if the observations span more
    /// than one entity or any id is missing, and propagates any embedder or
    /// store failure.
    #[tracing::instrument(skip(self, request), fields(operation = "merge", count = request.observation_ids.len()))]
    pub fn merge(&self, request: &MergeRequest) -> Result<MergeResult> {
        let start = std::time::Instant::now();
        let result = self.mutation.merge(request);
        log_outcome("merge", start, result.is_ok());
        result
    }

    /// Implements the `forget` tool (C9).
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if both or neither of `entity` and
    /// `observation_id` are given, [`Error::NotFound`] if the named item
    /// doesn't exist, and propagates any store failure.
    #[tracing::instrument(skip(self), fields(operation = "forget"))]
    pub fn forget(
        &self,
        entity: Option<&str>,
        observation_id: Option<&ObservationId>,
    ) -> Result<ForgetCounts> {
        let start = std::time::Instant::now();
        let result = self.mutation.forget(entity, observation_id);
        log_outcome("forget", start, result.is_ok());
        result
    }

    /// Implements the `consolidate` tool (C8).
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if `threshold` is out of range, and
    /// propagates any store failure.
    #[tracing::instrument(skip(self), fields(operation = "consolidate"))]
    pub fn consolidate(&self, entity: Option<&str>, threshold: f64) -> Result<Vec<Cluster>> {
        let start = std::time::Instant::now();
        let entity_id = match entity {
            Some(name) => Some(self.resolve_entity_id(name)?),
            None => None,
        };
        let result = self.consolidation.consolidate(entity_id.as_ref(), threshold);
        log_outcome("consolidate", start, result.is_ok());
        result
    }

    /// Implements the `export` tool (§6).
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if `options.entity` is given but doesn't
    /// exist, and propagates any store failure.
    #[tracing::instrument(skip(self), fields(operation = "export"))]
    pub fn export(&self, options: &ExportOptions) -> Result<ExportResult> {
        let start = std::time::Instant::now();
        let result = self.export.export(options);
        log_outcome("export", start, result.is_ok());
        result
    }

    fn resolve_entity_id(&self, name: &str) -> Result<EntityId> {
        self.entities
            .find_by_name(name)?
            .map(|e| e.id)
            .ok_or_else(|| Error::NotFound(format!("entity {name:?}")))
    }
}

fn log_outcome(operation: &'static str, start: std::time::Instant, ok: bool) {
    let elapsed_ms = start.elapsed().as_secs_f64() * 1000.0;
    metrics::histogram!("engine_operation_duration_ms", "operation" => operation)
        .record(elapsed_ms);
    metrics::counter!(
        "engine_operation_total",
        "operation" => operation,
        "outcome" => if ok { "ok" } else { "error" },
    )
    .increment(1);
    tracing::debug!(operation, elapsed_ms, ok, "engine operation completed");
}

/// Startup backfill: every observation must have exactly one embedding row
/// (§3 invariants). Finds observations with no matching embedding and
/// embeds them. Embedder failures are logged and the gap is left for the
/// next startup rather than blocking process start.
fn backfill_missing_embeddings(
    entities: &Arc<EntityRepository>,
    observations: &Arc<ObservationRepository>,
    index: &Arc<SemanticIndex>,
    embedder: &dyn Embedder,
) {
    let existing = match index.list_by_entity(None) {
        Ok(rows) => rows,
        Err(err) => {
            tracing::warn!(error = %err, "backfill: failed to list existing embeddings");
            return;
        }
    };
    let embedded: std::collections::HashSet<_> =
        existing.into_iter().map(|e| e.observation_id).collect();

    let all_entities = match entities.list(None, Some(i64::MAX)) {
        Ok(rows) => rows,
        Err(err) => {
            tracing::warn!(error = %err, "backfill: failed to enumerate entities");
            return;
        }
    };

    let mut repaired = 0usize;
    let mut failed = 0usize;

    for entity in all_entities {
        let entity_id = entity.id;
        let obs = match observations.list_by_entity(&entity_id) {
            Ok(obs) => obs,
            Err(err) => {
                tracing::warn!(error = %err, "backfill: failed to list observations for entity");
                continue;
            }
        };
        for observation in obs {
            if embedded.contains(&observation.id) {
                continue;
            }
            match embedder.embed(&observation.content) {
                Ok(vector) => {
                    if let Err(err) = index.store(
                        &entity_id,
                        &observation.id,
                        &vector,
                        &observation.content,
                    ) {
                        tracing::warn!(error = %err, "backfill: failed to store embedding");
                        failed += 1;
                    } else {
                        repaired += 1;
                    }
                }
                Err(err) => {
                    tracing::warn!(error = %err, "backfill: embedder unavailable, leaving gap");
                    failed += 1;
                }
            }
        }
    }

    if repaired > 0 || failed > 0 {
        tracing::info!(repaired, failed, "startup embedding backfill complete");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::EMBEDDING_DIM;
    use crate::services::RememberOutcome;

    struct DeterministicEmbedder;

    impl Embedder for DeterministicEmbedder {
        fn embed(&self, text: &str) -> Result<Vec<f32>> {
            let mut vector = vec![0.0f32; EMBEDDING_DIM];
            for (i, byte) in text.bytes().enumerate() {
                vector[i % EMBEDDING_DIM] += f32::from(byte);
            }
            let norm: f32 = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
            if norm > 0.0 {
                for v in &mut vector {
                    *v /= norm;
                }
            } else {
                vector[0] = 1.0;
            }
            Ok(vector)
        }
    }

    fn test_engine() -> Engine {
        let store = Arc::new(Store::open_in_memory_for_tests().unwrap());
        Engine::wire(store, Arc::new(DeterministicEmbedder))
    }

    #[test]
    fn remember_then_recall_round_trips() {
        let engine = test_engine();
        let result = engine
            .remember("loves dark roast coffee", Some("karolina"), None, None)
            .unwrap();
        assert_eq!(result.outcome, RememberOutcome::Created);

        let hits = engine
            .recall("dark roast coffee", &RecallFilter::default(), None)
            .unwrap();
        assert!(hits.iter().any(|h| h.observation_id == result.observation_id));
    }

    #[test]
    fn forget_entity_removes_it_from_export() {
        let engine = test_engine();
        engine
            .remember("populated fact", Some("gallant"), None, None)
            .unwrap();
        engine.forget(Some("gallant"), None).unwrap();

        let export = engine
            .export(&ExportOptions::default())
            .unwrap();
        assert!(!export.data.contains("gallant"));
        assert!(engine.context("gallant", None).is_err());
    }
}
