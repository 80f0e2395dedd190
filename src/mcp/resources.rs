//! The read-only resource surface (§6): `context://`, returning the whole
//! knowledge graph in `claude-md` format, and `entity://{name}`, returning
//! one entity's context (its observations, direct relationships, and
//! depth-1 neighbors) in Markdown. This module only renders strings; a
//! resource-protocol server (URI routing, MIME types, subscriptions) is the
//! external transport's job, per §1's declared scope.

use crate::engine::Engine;
use crate::io::{ExportFormat, ExportOptions};
use crate::services::ContextResult;
use crate::{Error, Result};

/// URI scheme for the whole-graph resource.
pub const CONTEXT_SCHEME: &str = "context://";
/// URI prefix for the per-entity resource; the entity name follows,
/// percent-encoded.
pub const ENTITY_SCHEME_PREFIX: &str = "entity://";

/// Renders the entire knowledge graph as `claude-md`-format Markdown, the
/// payload for the `context://` resource.
///
/// # Errors
///
/// Propagates any store failure.
pub fn render_context_resource(engine: &Engine) -> Result<String> {
    let result = engine.export(&ExportOptions {
        format: Some(ExportFormat::ClaudeMd),
        entity: None,
        entity_type: None,
    })?;
    Ok(result.data)
}

/// Renders one entity's context — its own observations, its direct
/// relationships, and its depth-1 neighbors — as Markdown, the payload for
/// the `entity://{name}` resource. `raw_name` is taken percent-encoded, as
/// it would arrive in a resource URI, and decoded before lookup.
///
/// # Errors
///
/// Returns [`Error::NotFound`] if no entity has that name, and propagates
/// any store failure.
pub fn render_entity_resource(engine: &Engine, raw_name: &str) -> Result<String> {
    let name = percent_decode(raw_name);
    let context = engine.context(&name, Some(1))?;
    Ok(render_entity_markdown(&name, &context))
}

fn render_entity_markdown(name: &str, context: &ContextResult) -> String {
    let mut out = String::new();
    let type_label = context.entity.entity_type.as_deref().unwrap_or("untyped");
    out.push_str(&format!("# {name} ({type_label})\n\n"));

    out.push_str("## Observations\n\n");
    if context.observations.is_empty() {
        out.push_str("_No observations._\n\n");
    } else {
        for observation in &context.observations {
            out.push_str(&format!("- {observation}\n"));
        }
        out.push('\n');
    }

    out.push_str("## Relationships\n\n");
    if context.relationships.is_empty() {
        out.push_str("_No relationships._\n\n");
    } else {
        for rel in &context.relationships {
            out.push_str(&format!(
                "- {} --[{}]--> {}\n",
                rel.from_name, rel.relation_type, rel.to_name
            ));
        }
        out.push('\n');
    }

    out.push_str("## Related entities\n\n");
    if context.related.is_empty() {
        out.push_str("_No related entities within depth 1._\n");
    } else {
        for related in &context.related {
            let related_type = related.entity_type.as_deref().unwrap_or("untyped");
            out.push_str(&format!(
                "### {} ({related_type}, depth {})\n\n",
                related.name, related.depth
            ));
            if related.observations.is_empty() {
                out.push_str("_No observations._\n\n");
            } else {
                for observation in &related.observations {
                    out.push_str(&format!("- {observation}\n"));
                }
                out.push('\n');
            }
        }
    }

    out
}

/// Decodes `%XX` percent-escapes and `+` (as a space) in a resource URI
/// path segment. Invalid or truncated escapes are passed through verbatim
/// rather than rejected — the caller is only looking up an entity name, and
/// a malformed escape simply won't match anything.
fn percent_decode(input: &str) -> String {
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'%' if i + 2 < bytes.len() => {
                let hex = &input[i + 1..i + 3];
                if let Ok(value) = u8::from_str_radix(hex, 16) {
                    out.push(value);
                    i += 3;
                    continue;
                }
                out.push(bytes[i]);
                i += 1;
            }
            b'+' => {
                out.push(b' ');
                i += 1;
            }
            other => {
                out.push(other);
                i += 1;
            }
        }
    }
    String::from_utf8(out).unwrap_or_else(|_| input.to_string())
}

/// Splits an `entity://{name}` resource URI into its decoded entity name.
///
/// # Errors
///
/// Returns [`Error::InvalidInput`] if `uri` does not start with
/// [`ENTITY_SCHEME_PREFIX`].
pub fn entity_name_from_uri(uri: &str) -> Result<String> {
    uri.strip_prefix(ENTITY_SCHEME_PREFIX)
        .map(percent_decode)
        .ok_or_else(|| Error::InvalidInput(format!("not an entity:// uri: {uri:?}")))
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
    fn percent_decode_round_trips_spaces_and_escapes() {
        assert_eq!(percent_decode("karolina%20k"), "karolina k");
        assert_eq!(percent_decode("karolina+k"), "karolina k");
        assert_eq!(percent_decode("plain"), "plain");
    }

    #[test]
    fn entity_name_from_uri_requires_prefix() {
        assert!(entity_name_from_uri("context://").is_err());
        assert_eq!(
            entity_name_from_uri("entity://hippocampus").unwrap(),
            "hippocampus"
        );
    }

    #[test]
    fn context_resource_renders_claude_md_heading() {
        let engine = test_engine();
        engine.remember("likes tea", Some("karolina"), None, None).unwrap();
        let rendered = render_context_resource(&engine).unwrap();
        assert!(rendered.starts_with("# Memory Export"));
    }

    #[test]
    fn entity_resource_renders_observations_and_relationships() {
        let engine = test_engine();
        engine
            .remember("created hippocampus", Some("karolina"), None, None)
            .unwrap();
        let rendered = render_entity_resource(&engine, "karolina").unwrap();
        assert!(rendered.contains("# karolina"));
        assert!(rendered.contains("created hippocampus"));
    }

    #[test]
    fn entity_resource_missing_entity_is_not_found() {
        let engine = test_engine();
        assert!(render_entity_resource(&engine, "zzqxjwvfk_9847362").is_err());
    }
}
