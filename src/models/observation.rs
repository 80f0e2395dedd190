use super::entity::EntityId;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque, stable identifier for an [`Observation`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ObservationId(String);

impl ObservationId {
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

impl Default for ObservationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ObservationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for ObservationId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for ObservationId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// A free-text fact attached to one entity; the unit of storage and of
/// semantic search. Append-only from the caller's perspective: mutation
/// happens only through `update`/`merge`, both of which delete-then-insert
/// under a new identifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    /// Opaque identifier.
    pub id: ObservationId,
    /// Owning entity. Cascade-deletes with the entity.
    pub entity_id: EntityId,
    /// Observation text, 1-2000 characters after control-character stripping.
    pub content: String,
    /// Optional provenance tag, at most 100 characters.
    pub source: Option<String>,
    /// ISO-8601 UTC creation timestamp.
    pub created_at: String,
}

/// Maximum length, in characters, of observation content.
pub const MAX_CONTENT_LEN: usize = 2000;
/// Maximum length, in characters, of a source tag.
pub const MAX_SOURCE_LEN: usize = 100;

impl Observation {
    /// Validates content length after control-character stripping.
    pub fn validate_content(content: &str) -> crate::Result<()> {
        let len = content.chars().count();
        if len == 0 || len > MAX_CONTENT_LEN {
            return Err(crate::Error::InvalidInput(format!(
                "content must be 1-{MAX_CONTENT_LEN} characters after stripping control characters, got {len}"
            )));
        }
        Ok(())
    }

    /// Validates an optional source tag's length.
    pub fn validate_source(source: &str) -> crate::Result<()> {
        if source.chars().count() > MAX_SOURCE_LEN {
            return Err(crate::Error::InvalidInput(format!(
                "source must be at most {MAX_SOURCE_LEN} characters"
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case(0, false; "empty is rejected")]
    #[test_case(1, true; "single character is accepted")]
    #[test_case(2000, true; "boundary length is accepted")]
    #[test_case(2001, false; "one over boundary is rejected")]
    fn validate_content_respects_length_bound(len: usize, expect_ok: bool) {
        assert_eq!(
            Observation::validate_content(&"a".repeat(len)).is_ok(),
            expect_ok
        );
    }

    #[test_case(0, true; "empty source is accepted")]
    #[test_case(100, true; "boundary length is accepted")]
    #[test_case(101, false; "one over boundary is rejected")]
    fn validate_source_respects_length_bound(len: usize, expect_ok: bool) {
        assert_eq!(
            Observation::validate_source(&"a".repeat(len)).is_ok(),
            expect_ok
        );
    }
}
