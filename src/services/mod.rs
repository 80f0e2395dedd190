//! Algorithms built on top of the typed repositories (C4-C9): the semantic
//! index, retrieval fusion, write-path dedup, context assembly,
//! consolidation, and the mutation operations.

mod consolidation;
mod context;
mod dedup;
mod index;
mod mutation;
mod recall;
mod relate;

pub use consolidation::{Cluster, ClusterMember, ConsolidationService};
pub use context::{ContextResult, ContextService, NamedRelationship, RelatedEntitySummary};
pub use dedup::{RememberOutcome, RememberResult, RememberService};
pub use index::{EmbeddingHit, SemanticIndex, SemanticSearchFilter};
pub use mutation::{ForgetCounts, MergeRequest, MergeResult, MutationService};
pub use recall::{RecallFilter, RecallHit, RecallService};
pub use relate::candidate_name_regex;
