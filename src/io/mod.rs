//! Export of the knowledge graph to external formats (the `export` tool,
//! spec §6). Import and other file formats are out of scope — the engine's
//! only outbound path is the three formats the tool surface names.

mod export;

pub use export::{ExportFormat, ExportOptions, ExportResult, ExportService};
