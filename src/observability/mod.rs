//! Observability: structured logging and span-based tracing, configured
//! from the environment. Metrics are emitted ad hoc via the `metrics` crate
//! facade (see [`crate::storage::connection`] and [`crate::engine`] for
//! call sites) rather than through a dedicated module, since this crate has
//! no exporter to configure beyond what `tracing-subscriber` already wires
//! up for spans.
//!
//! Nothing here ever logs observation content, entity names beyond
//! identifiers, embedding data, or the store passphrase. Call sites are
//! responsible for keeping to that; this module only sets up *how* logs are
//! rendered, not *what* gets logged.

mod logging;
mod tracing_init;

pub use logging::{LogFormat, LoggingConfig};
pub use tracing_init::init;
