//! Binary entry point for hippocampus.
//!
//! Thin CLI front-end over the engine: each subcommand builds a JSON
//! argument payload, hands it to the matching entry in the tool registry
//! (see [`hippocampus::mcp::tools`]), and prints the resulting JSON. This is
//! the same path an external transport would drive — the CLI just supplies
//! the request/response framing a terminal session needs instead of
//! JSON-RPC over stdio/HTTP.

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(missing_docs)]
// CLI output is the whole point of this binary.
#![allow(clippy::print_stdout, clippy::print_stderr)]

use std::process::ExitCode;

use clap::{Parser, Subcommand};
use hippocampus::mcp::tools;
use hippocampus::{Engine, EngineConfig};
use serde_json::{json, Value};

/// Self-hosted personal knowledge graph engine for AI assistants.
#[derive(Parser)]
#[command(name = "hippocampus", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Store an observation about an entity, deduplicating against
    /// near-identical existing ones.
    Remember {
        /// The observation text.
        content: String,
        /// Owning entity name (defaults to "general").
        #[arg(long)]
        entity: Option<String>,
        /// Free-form entity category.
        #[arg(long = "type")]
        entity_type: Option<String>,
        /// Provenance tag.
        #[arg(long)]
        source: Option<String>,
    },
    /// Search stored observations by meaning and by text.
    Recall {
        /// Search text.
        query: String,
        /// Maximum results (1-50, default 10).
        #[arg(long)]
        limit: Option<usize>,
        /// Restrict to entities of this type.
        #[arg(long = "type")]
        entity_type: Option<String>,
        /// Restrict to observations created at or after this ISO-8601 timestamp.
        #[arg(long)]
        since: Option<String>,
    },
    /// Assemble an entity's observations, relationships, and neighborhood.
    Context {
        /// Entity name or free-text topic to resolve.
        topic: String,
        /// Neighborhood expansion depth (0-3, default 1).
        #[arg(long)]
        depth: Option<u32>,
    },
    /// Replace an observation's exact content with new content.
    Update {
        /// Owning entity name.
        entity: String,
        /// Exact content of the observation to replace.
        old_content: String,
        /// New content for the replacement observation.
        new_content: String,
    },
    /// Delete an entity (with everything attached to it) or a single observation.
    Forget {
        /// Name of the entity to forget.
        #[arg(long, conflicts_with = "observation_id")]
        entity: Option<String>,
        /// Id of a single observation to forget.
        #[arg(long)]
        observation_id: Option<String>,
    },
    /// Merge several observations on the same entity into one.
    Merge {
        /// Ids of the observations to merge.
        #[arg(long = "id", required = true, num_args = 1..)]
        observation_ids: Vec<String>,
        /// Content for the resulting, single observation.
        #[arg(long)]
        content: String,
    },
    /// Identify near-duplicate observations eligible for merging.
    Consolidate {
        /// Restrict clustering to one entity's observations.
        #[arg(long)]
        entity: Option<String>,
        /// Similarity threshold (0.5-1.0, default 0.8).
        #[arg(long)]
        threshold: Option<f64>,
    },
    /// Render the knowledge graph (or a slice of it) to a file format.
    Export {
        /// Export rendering: "json" (default), "claude-md", or "markdown".
        #[arg(long)]
        format: Option<String>,
        /// Restrict to a single named entity.
        #[arg(long)]
        entity: Option<String>,
        /// Restrict to entities of this type.
        #[arg(long = "type")]
        entity_type: Option<String>,
    },
}

fn main() -> ExitCode {
    hippocampus::observability::init();

    let cli = Cli::parse();

    let config = match EngineConfig::from_env() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("configuration error: {err}");
            return ExitCode::FAILURE;
        }
    };

    let engine = match Engine::open(&config) {
        Ok(engine) => engine,
        Err(err) => {
            eprintln!("fatal: {err}");
            return ExitCode::FAILURE;
        }
    };

    match run(&engine, cli.command) {
        Ok(output) => {
            match serde_json::to_string_pretty(&output) {
                Ok(rendered) => println!("{rendered}"),
                Err(err) => eprintln!("failed to render output: {err}"),
            }
            ExitCode::SUCCESS
        }
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}

fn run(engine: &Engine, command: Command) -> hippocampus::Result<Value> {
    let (tool_name, args) = translate(command);
    let tool = tools::find_tool(tool_name).unwrap_or_else(|| {
        unreachable!("every Command variant maps to a registered tool name")
    });
    tool.call(engine, args)
}

fn translate(command: Command) -> (&'static str, Value) {
    match command {
        Command::Remember {
            content,
            entity,
            entity_type,
            source,
        } => (
            "remember",
            json!({
                "content": content,
                "entity": entity,
                "type": entity_type,
                "source": source,
            }),
        ),
        Command::Recall {
            query,
            limit,
            entity_type,
            since,
        } => (
            "recall",
            json!({
                "query": query,
                "limit": limit,
                "type": entity_type,
                "since": since,
            }),
        ),
        Command::Context { topic, depth } => (
            "context",
            json!({
                "topic": topic,
                "depth": depth,
            }),
        ),
        Command::Update {
            entity,
            old_content,
            new_content,
        } => (
            "update",
            json!({
                "entity": entity,
                "old_content": old_content,
                "new_content": new_content,
            }),
        ),
        Command::Forget {
            entity,
            observation_id,
        } => (
            "forget",
            json!({
                "entity": entity,
                "observation_id": observation_id,
            }),
        ),
        Command::Merge {
            observation_ids,
            content,
        } => (
            "merge",
            json!({
                "observation_ids": observation_ids,
                "content": content,
            }),
        ),
        Command::Consolidate { entity, threshold } => (
            "consolidate",
            json!({
                "entity": entity,
                "threshold": threshold,
            }),
        ),
        Command::Export {
            format,
            entity,
            entity_type,
        } => (
            "export",
            json!({
                "format": format,
                "entity": entity,
                "type": entity_type,
            }),
        ),
    }
}
