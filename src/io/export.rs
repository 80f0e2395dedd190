//! Memory export: renders a slice of the knowledge graph into one of three
//! caller-selected formats (`json`, `claude-md`, `markdown`).

use crate::models::Entity;
use crate::repositories::{EntityRepository, ObservationRepository, RelationshipRepository};
use crate::{now_iso, Error, Result};
use serde::Serialize;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

/// Large-enough page size to treat [`EntityRepository::list`] as "all
/// entities" for export purposes.
const EXPORT_LIST_LIMIT: i64 = i64::MAX;

/// The caller-selected export rendering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    /// Structured, round-trippable JSON.
    Json,
    /// `claude-md` convention: type-grouped, metadata-free Markdown.
    ClaudeMd,
    /// Generic Markdown with per-entity metadata and relationships.
    Markdown,
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Json => "json",
            Self::ClaudeMd => "claude-md",
            Self::Markdown => "markdown",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for ExportFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "json" => Ok(Self::Json),
            "claude-md" => Ok(Self::ClaudeMd),
            "markdown" => Ok(Self::Markdown),
            other => Err(Error::InvalidInput(format!(
                "unknown export format {other:?}, expected one of json, claude-md, markdown"
            ))),
        }
    }
}

/// Narrows an export to a subset of the graph.
#[derive(Debug, Clone, Default)]
pub struct ExportOptions {
    /// Export format.
    pub format: Option<ExportFormat>,
    /// Restrict to a single named entity.
    pub entity: Option<String>,
    /// Restrict to entities of this type.
    pub entity_type: Option<String>,
}

/// The rendered export.
#[derive(Debug, Clone)]
pub struct ExportResult {
    /// Format the export was rendered in.
    pub format: ExportFormat,
    /// Number of entities included.
    pub entity_count: usize,
    /// Number of observations included.
    pub observation_count: usize,
    /// The rendered payload.
    pub data: String,
}

#[derive(Serialize)]
struct JsonExport {
    exported_at: String,
    entities: Vec<JsonEntity>,
    relationships: Vec<JsonRelationship>,
}

#[derive(Serialize)]
struct JsonEntity {
    name: String,
    #[serde(rename = "type")]
    entity_type: Option<String>,
    created_at: String,
    updated_at: String,
    observations: Vec<String>,
}

#[derive(Serialize)]
struct JsonRelationship {
    from: String,
    to: String,
    #[serde(rename = "type")]
    relation_type: String,
}

/// Renders exports of the knowledge graph (the `export` tool, §6).
pub struct ExportService {
    entities: Arc<EntityRepository>,
    observations: Arc<ObservationRepository>,
    relationships: Arc<RelationshipRepository>,
}

impl ExportService {
    /// Builds an export service over the given repositories.
    #[must_use]
    pub fn new(
        entities: Arc<EntityRepository>,
        observations: Arc<ObservationRepository>,
        relationships: Arc<RelationshipRepository>,
    ) -> Self {
        Self {
            entities,
            observations,
            relationships,
        }
    }

    /// Selects entities per `options`, gathers their observations and the
    /// relationships among them (deduplicated by id), and renders the
    /// result in the requested format (default [`ExportFormat::Json`]).
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::NotFound`] if `options.entity` is given but
    /// does not exist, and propagates any store failure.
    pub fn export(&self, options: &ExportOptions) -> Result<ExportResult> {
        let format = options.format.unwrap_or(ExportFormat::Json);

        let selected: Vec<Entity> = if let Some(name) = &options.entity {
            let entity = self
                .entities
                .find_by_name(name)?
                .ok_or_else(|| Error::NotFound(format!("entity {name:?}")))?;
            vec![entity]
        } else {
            self.entities
                .list(options.entity_type.as_deref(), Some(EXPORT_LIST_LIMIT))?
        };

        let mut entity_observations = Vec::with_capacity(selected.len());
        let mut observation_count = 0usize;
        let mut seen_relationship_ids = HashSet::new();
        let mut relationships = Vec::new();

        for entity in &selected {
            let observations = self.observations.list_by_entity(&entity.id)?;
            observation_count += observations.len();

            for rel in self.relationships.list_by_entity(&entity.id)? {
                if seen_relationship_ids.insert(rel.id.clone()) {
                    relationships.push(rel);
                }
            }

            entity_observations.push((entity.clone(), observations));
        }

        let data = match format {
            ExportFormat::Json => render_json(&entity_observations, &relationships)?,
            ExportFormat::ClaudeMd => render_claude_md(&entity_observations),
            ExportFormat::Markdown => render_markdown(&entity_observations, &relationships),
        };

        Ok(ExportResult {
            format,
            entity_count: selected.len(),
            observation_count,
            data,
        })
    }
}

type EntityObservations = (Entity, Vec<crate::models::Observation>);

fn render_json(
    entities: &[EntityObservations],
    relationships: &[crate::models::Relationship],
) -> Result<String> {
    let export = JsonExport {
        exported_at: now_iso(),
        entities: entities
            .iter()
            .map(|(entity, observations)| JsonEntity {
                name: entity.name.clone(),
                entity_type: entity.entity_type.clone(),
                created_at: entity.created_at.clone(),
                updated_at: entity.updated_at.clone(),
                observations: observations.iter().map(|o| o.content.clone()).collect(),
            })
            .collect(),
        relationships: relationships
            .iter()
            .map(|r| JsonRelationship {
                from: r.from_entity.to_string(),
                to: r.to_entity.to_string(),
                relation_type: r.relation_type.clone(),
            })
            .collect(),
    };
    serde_json::to_string_pretty(&export).map_err(|e| Error::OperationFailed {
        operation: "export.render_json".to_string(),
        cause: e.to_string(),
    })
}

fn render_claude_md(entities: &[EntityObservations]) -> String {
    let mut grouped: Vec<(String, Vec<&EntityObservations>)> = Vec::new();
    for item in entities {
        let type_heading = capitalize(item.0.entity_type.as_deref().unwrap_or("general"));
        match grouped.iter_mut().find(|(heading, _)| *heading == type_heading) {
            Some((_, items)) => items.push(item),
            None => grouped.push((type_heading, vec![item])),
        }
    }

    let mut out = String::from("# Memory Export\n");
    for (heading, items) in &grouped {
        out.push_str(&format!("\n## {heading}\n"));
        for (entity, observations) in items {
            out.push_str(&format!("\n### {}\n", entity.name));
            for observation in observations.iter() {
                out.push_str(&format!("- {}\n", observation.content));
            }
        }
    }
    out
}

fn render_markdown(
    entities: &[EntityObservations],
    relationships: &[crate::models::Relationship],
) -> String {
    let mut names = std::collections::HashMap::new();
    for (entity, _) in entities {
        names.insert(entity.id.clone(), entity.name.clone());
    }

    let mut out = format!("# Hippocampus Memory Export\nGenerated: {}\n", now_iso());
    for (entity, observations) in entities {
        out.push_str(&format!(
            "\n## {} ({})\n",
            entity.name,
            entity.entity_type.as_deref().unwrap_or("general")
        ));
        for observation in observations {
            let suffix = match (&observation.created_at, &observation.source) {
                (date, Some(source)) => format!(" [{date}, source: {source}]"),
                (date, None) => format!(" [{date}]"),
            };
            out.push_str(&format!("- {}{}\n", observation.content, suffix));
        }

        let entity_relationships: Vec<_> = relationships
            .iter()
            .filter(|r| r.from_entity == entity.id || r.to_entity == entity.id)
            .collect();
        if !entity_relationships.is_empty() {
            out.push_str("\n### Relationships\n");
            for rel in entity_relationships {
                let from = names.get(&rel.from_entity).map_or("?", String::as_str);
                let to = names.get(&rel.to_entity).map_or("?", String::as_str);
                out.push_str(&format!("- {from} --{}-- {to}\n", rel.relation_type));
            }
        }

        out.push_str("\n---\n");
    }
    out
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}
