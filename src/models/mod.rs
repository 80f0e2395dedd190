//! Value types for the knowledge graph: entities, observations, relationships,
//! and their vector embeddings.

pub mod embedding;
pub mod entity;
pub mod observation;
pub mod relationship;

pub use embedding::{Embedding, EmbeddingId};
pub use entity::{Entity, EntityId};
pub use observation::{Observation, ObservationId};
pub use relationship::{DEFAULT_RELATION_TYPE, Relationship, RelationshipId};

/// Dimensionality of every stored embedding vector.
pub const EMBEDDING_DIM: usize = 384;

/// Strips the control characters the data model excludes from stored text:
/// `U+0000`–`U+0008`, `U+000B`, `U+000C`, `U+000E`–`U+001F`. Tab, line feed,
/// and carriage return are preserved.
#[must_use]
pub fn strip_control_chars(input: &str) -> String {
    input
        .chars()
        .filter(|&c| {
            let code = c as u32;
            !(code <= 0x08 || code == 0x0B || code == 0x0C || (0x0E..=0x1F).contains(&code))
        })
        .collect()
}
