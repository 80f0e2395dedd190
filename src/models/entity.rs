use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque, stable identifier for an [`Entity`]. Never reused once issued.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(String);

impl EntityId {
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

impl Default for EntityId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for EntityId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for EntityId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// A named node in the knowledge graph: a person, project, preference, or
/// any other subject that observations and relationships can attach to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    /// Opaque identifier, stable for the lifetime of the row.
    pub id: EntityId,
    /// Primary human handle. 1-200 characters, globally unique, case-sensitive.
    pub name: String,
    /// Free-form category such as `"person"`, `"project"`, `"preference"`. At most 50 characters.
    pub entity_type: Option<String>,
    /// ISO-8601 UTC creation timestamp.
    pub created_at: String,
    /// ISO-8601 UTC timestamp of the last observation or mutation touching this entity.
    pub updated_at: String,
}

/// Maximum length, in characters, of an entity name.
pub const MAX_NAME_LEN: usize = 200;
/// Maximum length, in characters, of an entity type tag.
pub const MAX_TYPE_LEN: usize = 50;

impl Entity {
    /// Validates a candidate name against the length constraint in the data model.
    pub fn validate_name(name: &str) -> crate::Result<()> {
        let len = name.chars().count();
        if len == 0 || len > MAX_NAME_LEN {
            return Err(crate::Error::InvalidInput(format!(
                "entity name must be 1-{MAX_NAME_LEN} characters, got {len}"
            )));
        }
        Ok(())
    }

    /// Validates a candidate type tag against the length constraint in the data model.
    pub fn validate_type(entity_type: &str) -> crate::Result<()> {
        if entity_type.chars().count() > MAX_TYPE_LEN {
            return Err(crate::Error::InvalidInput(format!(
                "entity type must be at most {MAX_TYPE_LEN} characters"
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test]
    fn entity_id_roundtrips_through_string() {
        let id = EntityId::from("abc-123");
        assert_eq!(id.as_str(), "abc-123");
        assert_eq!(id.to_string(), "abc-123");
    }

    #[test_case(0, false; "empty is rejected")]
    #[test_case(1, true; "single character is accepted")]
    #[test_case(200, true; "boundary length is accepted")]
    #[test_case(201, false; "one over boundary is rejected")]
    fn validate_name_respects_length_bound(len: usize, expect_ok: bool) {
        assert_eq!(Entity::validate_name(&"a".repeat(len)).is_ok(), expect_ok);
    }

    #[test_case(0, true; "empty type is accepted")]
    #[test_case(50, true; "boundary length is accepted")]
    #[test_case(51, false; "one over boundary is rejected")]
    fn validate_type_respects_length_bound(len: usize, expect_ok: bool) {
        assert_eq!(Entity::validate_type(&"a".repeat(len)).is_ok(), expect_ok);
    }
}
