//! The tool surface (§6): one struct per tool, implementing a common
//! [`Tool`] trait, collected into a static registry. This replaces string
//! matching on a tool name with type-safe dispatch, in the spirit of the
//! teacher's `mcp::dispatch::McpMethod` enum — generalized here to a trait
//! object per tool rather than a method enum, since each tool also owns its
//! JSON schema translation.
//!
//! Per §7's error disposition table: business-level failures (invalid
//! input, not-found) are caught here and folded into a `{success: false,
//! message}` payload; infrastructure failures (embedder, store, fatal)
//! propagate as an `Err` for the caller (the external transport) to handle.

use serde_json::Value;

use crate::engine::Engine;
use crate::io::{ExportFormat, ExportOptions};
use crate::models::observation::ObservationId;
use crate::services::{MergeRequest, RecallFilter};
use crate::{Error, Result};

use super::tool_types::{
    ClusterMemberView, ClusterView, ConsolidateArgs, ConsolidateOutput, ContextArgs,
    ContextOutput, EntityView, ExportArgs, ExportOutput, ForgetArgs, ForgetCountsView,
    ForgetOutput, MergeArgs, MergeOutput, RecallArgs, RecallMemory, RecallOutput,
    RelatedEntityView, RelationshipView, RememberArgs, RememberOutput, UpdateArgs, UpdateOutput,
};

/// A single callable tool in the surface the transport layer exposes.
pub trait Tool: Send + Sync {
    /// The tool's name, as it appears in `tools/call` requests.
    fn name(&self) -> &'static str;

    /// Deserializes `input`, calls into `engine`, and serializes the
    /// result (a business failure is a successful call returning a
    /// `{success: false, ...}` payload; only infrastructure failures are
    /// `Err`).
    ///
    /// # Errors
    ///
    /// Propagates [`Error::EmbedderUnavailable`], [`Error::Fatal`],
    /// [`Error::OperationFailed`], and [`Error::PreconditionFailed`].
    /// [`Error::InvalidInput`] and [`Error::NotFound`] are translated into
    /// the result payload instead.
    fn call(&self, engine: &Engine, input: Value) -> Result<Value>;
}

/// Returns every tool in the surface, in the order given by §6's table.
#[must_use]
pub fn all_tools() -> &'static [&'static dyn Tool] {
    &[
        &RememberTool,
        &RecallTool,
        &ContextTool,
        &UpdateTool,
        &ForgetTool,
        &MergeTool,
        &ConsolidateTool,
        &ExportTool,
    ]
}

/// Looks up a tool by name.
#[must_use]
pub fn find_tool(name: &str) -> Option<&'static dyn Tool> {
    all_tools().iter().copied().find(|t| t.name() == name)
}

fn parse_args<T: serde::de::DeserializeOwned>(input: Value) -> Result<T> {
    serde_json::from_value(input).map_err(|e| Error::InvalidInput(e.to_string()))
}

/// Distinguishes a business-level failure (render as a value) from an
/// infrastructure failure (propagate).
fn is_business_failure(err: &Error) -> bool {
    matches!(err, Error::InvalidInput(_) | Error::NotFound(_))
}

struct RememberTool;

impl Tool for RememberTool {
    fn name(&self) -> &'static str {
        "remember"
    }

    fn call(&self, engine: &Engine, input: Value) -> Result<Value> {
        let args: RememberArgs = parse_args(input)?;
        match engine.remember(
            &args.content,
            args.entity.as_deref(),
            args.entity_type.as_deref(),
            args.source.as_deref(),
        ) {
            Ok(result) => {
                use crate::services::RememberOutcome;
                let (deduplicated, replaced_observation, message) = match &result.outcome {
                    RememberOutcome::Deduplicated => (
                        Some(true),
                        None,
                        "an equivalent observation already existed; nothing new stored"
                            .to_string(),
                    ),
                    RememberOutcome::Replaced { previous_content } => (
                        None,
                        Some(previous_content.clone()),
                        "replaced a shorter existing observation".to_string(),
                    ),
                    RememberOutcome::Created => (None, None, "observation stored".to_string()),
                };
                Ok(serde_json::to_value(RememberOutput {
                    success: true,
                    entity_id: Some(result.entity_id.to_string()),
                    entity_name: Some(result.entity_name),
                    observation_id: Some(result.observation_id.to_string()),
                    relationships_created: result.relationships_created,
                    message,
                    deduplicated,
                    replaced_observation,
                })?)
            }
            Err(err) if is_business_failure(&err) => Ok(serde_json::to_value(RememberOutput {
                success: false,
                entity_id: None,
                entity_name: None,
                observation_id: None,
                relationships_created: Vec::new(),
                message: err.to_string(),
                deduplicated: None,
                replaced_observation: None,
            })?),
            Err(err) => Err(err),
        }
    }
}

struct RecallTool;

impl Tool for RecallTool {
    fn name(&self) -> &'static str {
        "recall"
    }

    fn call(&self, engine: &Engine, input: Value) -> Result<Value> {
        let args: RecallArgs = parse_args(input)?;
        let filter = RecallFilter {
            entity_type: args.entity_type,
            since: args.since,
        };
        match engine.recall(&args.query, &filter, args.limit) {
            Ok(hits) => {
                let memories: Vec<RecallMemory> = hits
                    .into_iter()
                    .map(|h| RecallMemory {
                        observation_id: h.observation_id.to_string(),
                        entity: h.entity_name,
                        entity_type: h.entity_type,
                        content: h.content,
                        source: h.source,
                        remembered_at: h.created_at,
                        similarity: h.similarity,
                    })
                    .collect();
                Ok(serde_json::to_value(RecallOutput {
                    success: true,
                    count: memories.len(),
                    memories,
                })?)
            }
            Err(err) if is_business_failure(&err) => Ok(serde_json::to_value(RecallOutput {
                success: false,
                count: 0,
                memories: Vec::new(),
            })?),
            Err(err) => Err(err),
        }
    }
}

struct ContextTool;

impl Tool for ContextTool {
    fn name(&self) -> &'static str {
        "context"
    }

    fn call(&self, engine: &Engine, input: Value) -> Result<Value> {
        let args: ContextArgs = parse_args(input)?;
        match engine.context(&args.topic, args.depth) {
            Ok(result) => {
                let entity = EntityView {
                    name: result.entity.name.clone(),
                    entity_type: result.entity.entity_type.clone(),
                    resolution: result.resolution,
                    observations: result.observations,
                };
                let relationships = result
                    .relationships
                    .into_iter()
                    .map(|r| RelationshipView {
                        from: r.from_name,
                        to: r.to_name,
                        relation_type: r.relation_type,
                    })
                    .collect();
                let related_entities = result
                    .related
                    .into_iter()
                    .map(|r| RelatedEntityView {
                        name: r.name,
                        entity_type: r.entity_type,
                        depth: r.depth,
                        observations: r.observations,
                    })
                    .collect();
                Ok(serde_json::to_value(ContextOutput {
                    success: true,
                    entity: Some(entity),
                    relationships,
                    related_entities,
                    message: String::new(),
                })?)
            }
            Err(err) if is_business_failure(&err) => {
                Ok(serde_json::to_value(ContextOutput {
                    success: false,
                    entity: None,
                    relationships: Vec::new(),
                    related_entities: Vec::new(),
                    message: format!("No entity found for topic {:?}.", args.topic),
                })?)
            }
            Err(err) => Err(err),
        }
    }
}

struct UpdateTool;

impl Tool for UpdateTool {
    fn name(&self) -> &'static str {
        "update"
    }

    fn call(&self, engine: &Engine, input: Value) -> Result<Value> {
        let args: UpdateArgs = parse_args(input)?;
        match engine.update(&args.entity, &args.old_content, &args.new_content) {
            Ok(observation) => Ok(serde_json::to_value(UpdateOutput {
                success: true,
                message: "observation updated".to_string(),
                observation_id: Some(observation.id.to_string()),
            })?),
            Err(err) if is_business_failure(&err) => Ok(serde_json::to_value(UpdateOutput {
                success: false,
                message: err.to_string(),
                observation_id: None,
            })?),
            Err(err) => Err(err),
        }
    }
}

struct ForgetTool;

impl Tool for ForgetTool {
    fn name(&self) -> &'static str {
        "forget"
    }

    fn call(&self, engine: &Engine, input: Value) -> Result<Value> {
        let args: ForgetArgs = parse_args(input)?;
        let observation_id = args.observation_id.as_deref().map(ObservationId::from);
        match engine.forget(args.entity.as_deref(), observation_id.as_ref()) {
            Ok(counts) => Ok(serde_json::to_value(ForgetOutput {
                success: true,
                message: "forgotten".to_string(),
                deleted: ForgetCountsView {
                    observations: counts.observations,
                    embeddings: counts.embeddings,
                    relationships: counts.relationships,
                    entity: counts.entities,
                },
            })?),
            Err(err) if is_business_failure(&err) => Ok(serde_json::to_value(ForgetOutput {
                success: false,
                message: err.to_string(),
                deleted: ForgetCountsView::default(),
            })?),
            Err(err) => Err(err),
        }
    }
}

struct MergeTool;

impl Tool for MergeTool {
    fn name(&self) -> &'static str {
        "merge"
    }

    fn call(&self, engine: &Engine, input: Value) -> Result<Value> {
        let args: MergeArgs = parse_args(input)?;
        let request = MergeRequest {
            observation_ids: args.observation_ids.into_iter().map(ObservationId::from).collect(),
            content: args.content,
        };
        match engine.merge(&request) {
            Ok(result) => Ok(serde_json::to_value(MergeOutput {
                success: true,
                new_observation_id: Some(result.observation.id.to_string()),
                merged_count: Some(result.merged_count),
                entity_name: Some(result.entity_name),
                message: "observations merged".to_string(),
            })?),
            Err(err) if is_business_failure(&err) => Ok(serde_json::to_value(MergeOutput {
                success: false,
                new_observation_id: None,
                merged_count: None,
                entity_name: None,
                message: err.to_string(),
            })?),
            // Precondition failures (cross-entity merge, missing ids) are
            // raised per §7's disposition table, not folded into the value.
            Err(err) => Err(err),
        }
    }
}

struct ConsolidateTool;

impl Tool for ConsolidateTool {
    fn name(&self) -> &'static str {
        "consolidate"
    }

    fn call(&self, engine: &Engine, input: Value) -> Result<Value> {
        let args: ConsolidateArgs = parse_args(input)?;
        let threshold = args.threshold.unwrap_or(0.8);
        match engine.consolidate(args.entity.as_deref(), threshold) {
            Ok(clusters) => {
                let total_observations = clusters.iter().map(|c| c.members.len()).sum();
                let views: Vec<ClusterView> = clusters
                    .into_iter()
                    .map(|c| ClusterView {
                        members: c
                            .members
                            .into_iter()
                            .map(|m| ClusterMemberView {
                                entity: m.entity_name,
                                observation_id: m.observation_id.to_string(),
                                content: m.content,
                            })
                            .collect(),
                        avg_similarity: c.avg_similarity,
                    })
                    .collect();
                Ok(serde_json::to_value(ConsolidateOutput {
                    success: true,
                    total_observations,
                    clusters: views,
                    message: String::new(),
                })?)
            }
            Err(err) if is_business_failure(&err) => {
                Ok(serde_json::to_value(ConsolidateOutput {
                    success: false,
                    total_observations: 0,
                    clusters: Vec::new(),
                    message: err.to_string(),
                })?)
            }
            Err(err) => Err(err),
        }
    }
}

struct ExportTool;

impl Tool for ExportTool {
    fn name(&self) -> &'static str {
        "export"
    }

    fn call(&self, engine: &Engine, input: Value) -> Result<Value> {
        let args: ExportArgs = parse_args(input)?;
        let format = match &args.format {
            Some(raw) => match raw.parse::<ExportFormat>() {
                Ok(f) => Some(f),
                Err(err) => {
                    return Ok(serde_json::to_value(ExportOutput {
                        success: false,
                        format: raw.clone(),
                        entity_count: 0,
                        observation_count: 0,
                        data: String::new(),
                        message: err.to_string(),
                    })?);
                }
            },
            None => None,
        };
        let options = ExportOptions {
            format,
            entity: args.entity,
            entity_type: args.entity_type,
        };
        match engine.export(&options) {
            Ok(result) => Ok(serde_json::to_value(ExportOutput {
                success: true,
                format: result.format.to_string(),
                entity_count: result.entity_count,
                observation_count: result.observation_count,
                data: result.data,
                message: "export complete".to_string(),
            })?),
            Err(err) if is_business_failure(&err) => Ok(serde_json::to_value(ExportOutput {
                success: false,
                format: args.format.unwrap_or_default(),
                entity_count: 0,
                observation_count: 0,
                data: String::new(),
                message: err.to_string(),
            })?),
            Err(err) => Err(err),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::OperationFailed {
            operation: "json_serialize".to_string(),
            cause: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::Embedder;
    use crate::models::EMBEDDING_DIM;
    use crate::storage::Store;
    use std::sync::Arc;

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
    fn registry_contains_every_spec_tool() {
        let names: Vec<&str> = all_tools().iter().map(|t| t.name()).collect();
        for expected in [
            "remember",
            "recall",
            "context",
            "update",
            "forget",
            "merge",
            "consolidate",
            "export",
        ] {
            assert!(names.contains(&expected), "missing tool {expected}");
        }
    }

    #[test]
    fn remember_tool_round_trips_through_json() {
        let engine = test_engine();
        let tool = find_tool("remember").unwrap();
        let input = serde_json::json!({"content": "likes dark roast coffee", "entity": "karolina"});
        let output = tool.call(&engine, input).unwrap();
        assert_eq!(output["success"], serde_json::json!(true));
        assert!(output["observation_id"].is_string());
    }

    #[test]
    fn context_tool_reports_business_failure_as_value() {
        let engine = test_engine();
        let tool = find_tool("context").unwrap();
        let input = serde_json::json!({"topic": "zzqxjwvfk_9847362"});
        let output = tool.call(&engine, input).unwrap();
        assert_eq!(output["success"], serde_json::json!(false));
    }

    #[test]
    fn forget_tool_requires_exactly_one_argument() {
        let engine = test_engine();
        let tool = find_tool("forget").unwrap();
        let output = tool.call(&engine, serde_json::json!({})).unwrap();
        assert_eq!(output["success"], serde_json::json!(false));
    }
}
