use super::entity::EntityId;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque, stable identifier for a [`Relationship`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RelationshipId(String);

impl RelationshipId {
    /// Generates a fresh random identifier.
    #[must_use]
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// Borrows the identifier as a plain string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for RelationshipId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RelationshipId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for RelationshipId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// A directed, typed edge between two entities.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relationship {
    /// Opaque identifier.
    pub id: RelationshipId,
    /// Source endpoint. Cascade-deletes with the entity.
    pub from_entity: EntityId,
    /// Target endpoint. Cascade-deletes with the entity.
    pub to_entity: EntityId,
    /// Free-form relation label, defaulting to `relates_to` when auto-detected.
    pub relation_type: String,
    /// ISO-8601 UTC creation timestamp.
    pub created_at: String,
}

/// The default relation type assigned by auto-detection.
pub const DEFAULT_RELATION_TYPE: &str = "relates_to";
