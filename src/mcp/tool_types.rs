//! Typed request/response shapes for the tool surface (§6). These are the
//! structs an external transport deserializes call arguments into and
//! serializes results out of; the transport itself (JSON-RPC framing,
//! stdio/HTTP loop) is out of scope here.

use serde::{Deserialize, Serialize};

/// Arguments for the `remember` tool.
#[derive(Debug, Clone, Deserialize)]
pub struct RememberArgs {
    /// The observation text, 1-2000 characters after control-character
    /// stripping.
    pub content: String,
    /// Owning entity name, defaulting to `"general"` if omitted.
    pub entity: Option<String>,
    /// Free-form entity category, at most 50 characters.
    #[serde(rename = "type")]
    pub entity_type: Option<String>,
    /// Provenance tag, at most 100 characters.
    pub source: Option<String>,
}

/// Result of a `remember` call.
#[derive(Debug, Clone, Serialize)]
pub struct RememberOutput {
    /// Whether the call completed without a business-level failure.
    pub success: bool,
    /// The owning entity's id.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entity_id: Option<String>,
    /// The owning entity's name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entity_name: Option<String>,
    /// The id of the observation now representing this content.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub observation_id: Option<String>,
    /// Names of entities newly linked by relationship auto-detection.
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub relationships_created: Vec<String>,
    /// Human-readable summary of what happened.
    pub message: String,
    /// Present and `true` only when an existing observation subsumed this
    /// call and nothing new was stored.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deduplicated: Option<bool>,
    /// Present only when a shorter existing observation was replaced; holds
    /// its content.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub replaced_observation: Option<String>,
}

/// Arguments for the `recall` tool.
#[derive(Debug, Clone, Deserialize)]
pub struct RecallArgs {
    /// Search text, at most 500 characters.
    pub query: String,
    /// Maximum results, 1-50 (default 10).
    pub limit: Option<usize>,
    /// Restrict to entities of this type.
    #[serde(rename = "type")]
    pub entity_type: Option<String>,
    /// Restrict to observations created at or after this ISO-8601 timestamp.
    pub since: Option<String>,
}

/// A single item in a `recall` result.
#[derive(Debug, Clone, Serialize)]
pub struct RecallMemory {
    /// The matching observation's id.
    pub observation_id: String,
    /// The owning entity's name.
    pub entity: String,
    /// The owning entity's type, if any.
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub entity_type: Option<String>,
    /// The observation's content.
    pub content: String,
    /// The observation's source tag, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    /// When the observation was created.
    pub remembered_at: String,
    /// Cosine similarity, present only for semantic hits.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub similarity: Option<f64>,
}

/// Result of a `recall` call.
#[derive(Debug, Clone, Serialize)]
pub struct RecallOutput {
    /// Whether the call completed without a business-level failure.
    pub success: bool,
    /// Number of memories returned.
    pub count: usize,
    /// The fused, deduplicated, truncated result set.
    pub memories: Vec<RecallMemory>,
}

/// Arguments for the `context` tool.
#[derive(Debug, Clone, Deserialize)]
pub struct ContextArgs {
    /// The entity name or free-text topic to resolve.
    pub topic: String,
    /// Neighborhood expansion depth, 0-3 (default 1).
    pub depth: Option<u32>,
}

/// A relationship rendered with both endpoint names resolved.
#[derive(Debug, Clone, Serialize)]
pub struct RelationshipView {
    /// Source endpoint name.
    pub from: String,
    /// Target endpoint name.
    pub to: String,
    /// Relation label.
    #[serde(rename = "type")]
    pub relation_type: String,
}

/// A related entity with its own observations, as surfaced by graph
/// expansion.
#[derive(Debug, Clone, Serialize)]
pub struct RelatedEntityView {
    /// Entity name.
    pub name: String,
    /// Entity type, if any.
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub entity_type: Option<String>,
    /// Hop count from the topic entity.
    pub depth: u32,
    /// This entity's observations, newest first.
    pub observations: Vec<String>,
}

/// The resolved topic entity, rendered for the `context` tool.
#[derive(Debug, Clone, Serialize)]
pub struct EntityView {
    /// Entity name.
    pub name: String,
    /// Entity type, if any.
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub entity_type: Option<String>,
    /// How the topic resolved to this entity: `"exact"`, `"substring"`, or
    /// `"semantic"`.
    pub resolution: &'static str,
    /// This entity's observations, newest first.
    pub observations: Vec<String>,
}

/// Result of a `context` call.
#[derive(Debug, Clone, Serialize)]
pub struct ContextOutput {
    /// Whether a topic entity was resolved.
    pub success: bool,
    /// The resolved entity and its own observations, absent on failure.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entity: Option<EntityView>,
    /// Relationships among the topic entity and its related entities.
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub relationships: Vec<RelationshipView>,
    /// Entities reachable within the requested depth.
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub related_entities: Vec<RelatedEntityView>,
    /// Human-readable summary, populated on failure.
    pub message: String,
}

/// Arguments for the `update` tool.
#[derive(Debug, Clone, Deserialize)]
pub struct UpdateArgs {
    /// Owning entity name.
    pub entity: String,
    /// Exact content of the observation to replace.
    pub old_content: String,
    /// New content for the replacement observation.
    pub new_content: String,
}

/// Result of an `update` call.
#[derive(Debug, Clone, Serialize)]
pub struct UpdateOutput {
    /// Whether the call completed without a business-level failure.
    pub success: bool,
    /// Human-readable summary.
    pub message: String,
    /// Id of the newly created observation, on success.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub observation_id: Option<String>,
}

/// Arguments for the `forget` tool. Exactly one of `entity` or
/// `observation_id` must be set.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct ForgetArgs {
    /// Name of the entity to forget, along with everything attached to it.
    pub entity: Option<String>,
    /// Id of a single observation to forget.
    pub observation_id: Option<String>,
}

/// Row counts removed by a `forget` call.
#[derive(Debug, Clone, Copy, Serialize, Default)]
pub struct ForgetCountsView {
    /// Observations removed.
    pub observations: usize,
    /// Embeddings removed.
    pub embeddings: usize,
    /// Relationships removed.
    pub relationships: usize,
    /// Entities removed (0 or 1).
    pub entity: usize,
}

/// Result of a `forget` call.
#[derive(Debug, Clone, Serialize)]
pub struct ForgetOutput {
    /// Whether the call completed without a business-level failure.
    pub success: bool,
    /// Human-readable summary.
    pub message: String,
    /// Counts of removed rows, by table.
    pub deleted: ForgetCountsView,
}

/// Arguments for the `merge` tool.
#[derive(Debug, Clone, Deserialize)]
pub struct MergeArgs {
    /// Ids of the observations to merge; must all belong to one entity.
    pub observation_ids: Vec<String>,
    /// Content for the resulting, single observation.
    pub content: String,
}

/// Result of a `merge` call.
#[derive(Debug, Clone, Serialize)]
pub struct MergeOutput {
    /// Whether the call completed without a business-level failure.
    pub success: bool,
    /// Id of the newly created observation, on success.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_observation_id: Option<String>,
    /// How many observations were merged away.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub merged_count: Option<usize>,
    /// The owning entity's name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entity_name: Option<String>,
    /// Human-readable summary.
    pub message: String,
}

/// Arguments for the `consolidate` tool.
#[derive(Debug, Clone, Deserialize)]
pub struct ConsolidateArgs {
    /// Restrict clustering to one entity's observations.
    pub entity: Option<String>,
    /// Similarity threshold, 0.5-1.0 (default 0.8).
    pub threshold: Option<f64>,
}

/// One clustered observation, rendered for the `consolidate` tool.
#[derive(Debug, Clone, Serialize)]
pub struct ClusterMemberView {
    /// Owning entity's name.
    pub entity: String,
    /// Observation id.
    pub observation_id: String,
    /// Observation content at embed time.
    pub content: String,
}

/// A consolidation cluster, rendered for the `consolidate` tool.
#[derive(Debug, Clone, Serialize)]
pub struct ClusterView {
    /// Clustered observations.
    pub members: Vec<ClusterMemberView>,
    /// Mean pairwise cosine similarity across the cluster, rounded to 3
    /// decimal places.
    pub avg_similarity: f64,
}

/// Result of a `consolidate` call.
#[derive(Debug, Clone, Serialize)]
pub struct ConsolidateOutput {
    /// Whether the call completed without a business-level failure.
    pub success: bool,
    /// Total observations considered before clustering.
    pub total_observations: usize,
    /// Clusters found, sorted by member count descending.
    pub clusters: Vec<ClusterView>,
    /// Human-readable summary.
    pub message: String,
}

/// Arguments for the `export` tool.
#[derive(Debug, Clone, Deserialize)]
pub struct ExportArgs {
    /// Export rendering: `"claude-md"`, `"markdown"`, or `"json"`.
    pub format: Option<String>,
    /// Restrict to a single named entity.
    pub entity: Option<String>,
    /// Restrict to entities of this type.
    #[serde(rename = "type")]
    pub entity_type: Option<String>,
}

/// Result of an `export` call.
#[derive(Debug, Clone, Serialize)]
pub struct ExportOutput {
    /// Whether the call completed without a business-level failure.
    pub success: bool,
    /// The format actually used.
    pub format: String,
    /// Number of entities included.
    pub entity_count: usize,
    /// Number of observations included.
    pub observation_count: usize,
    /// The rendered payload.
    pub data: String,
    /// Human-readable summary.
    pub message: String,
}
