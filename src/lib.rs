//! # Hippocampus
//!
//! An encrypted, embedding-backed personal knowledge graph engine.
//!
//! Hippocampus accumulates, retrieves, and curates a single-user knowledge
//! graph made of entities, free-text observations about them, and typed
//! relationships between entities, with semantic search over every
//! observation. It is the engine only: the store, the embedder, the
//! repositories, the retrieval and write-path algorithms, and the
//! tool/resource surfaces a transport layer calls into. Request transport,
//! authorization, rate limiting, and process lifecycle are external.
//!
//! ## Example
//!
//! ```rust,ignore
//! use hippocampus::{Engine, EngineConfig};
//!
//! let config = EngineConfig::from_env()?;
//! let engine = Engine::open(config)?;
//! let result = engine.remember("prefers dark roast coffee", Some("karolina"), None, None)?;
//! ```

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

use thiserror::Error as ThisError;

pub mod config;
pub mod embedding;
pub mod engine;
pub mod io;
pub mod mcp;
pub mod models;
pub mod observability;
pub mod repositories;
pub mod services;
pub mod storage;

pub use config::EngineConfig;
pub use embedding::Embedder;
pub use engine::Engine;

/// Error type for hippocampus operations.
///
/// # Error Variant Triggers
///
/// | Variant | Raised When |
/// |---------|-------------|
/// | `InvalidInput` | A caller-supplied value fails a length, range, or shape constraint. |
/// | `NotFound` | A referenced entity, observation, or relationship does not exist. |
/// | `PreconditionFailed` | A multi-item operation's cross-item invariants are violated. |
/// | `EmbedderUnavailable` | The embedding pipeline could not load or failed during inference. |
/// | `OperationFailed` | A storage operation failed for an operation-specific reason. |
/// | `Fatal` | Store corruption, a wrong passphrase, or missing configuration at startup. |
#[derive(Debug, ThisError)]
pub enum Error {
    /// Invalid input was provided.
    ///
    /// Raised when:
    /// - content exceeds its length cap, or is empty after control-character stripping
    /// - `depth`, `limit`, or `threshold` fall outside their allowed ranges
    /// - an exclusive pair of arguments (e.g. `forget`'s `entity`/`observation_id`) is
    ///   given as neither or both
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// A referenced entity, observation, or relationship does not exist.
    ///
    /// Raised when:
    /// - `update`/`merge`/`forget` name an id or exact content that cannot be found
    /// - `context` resolves no entity for its topic
    #[error("not found: {0}")]
    NotFound(String),

    /// A multi-item operation's cross-item invariants were violated.
    ///
    /// Raised when:
    /// - `merge`'s observation ids span more than one entity
    /// - `merge` is given an id with no matching observation
    #[error("precondition failed: {0}")]
    PreconditionFailed(String),

    /// The embedding pipeline could not be loaded or failed during inference.
    ///
    /// Raised when:
    /// - the model or tokenizer file is missing or fails to parse
    /// - tokenization or ONNX inference errors
    #[error("embedder unavailable: {0}")]
    EmbedderUnavailable(String),

    /// A storage operation failed for a reason specific to that operation.
    ///
    /// Raised when:
    /// - a SQLite statement fails for a non-fatal, operation-specific reason
    #[error("operation '{operation}' failed: {cause}")]
    OperationFailed {
        /// The operation that failed, e.g. `"entities.find_or_create"`.
        operation: String,
        /// The underlying cause.
        cause: String,
    },

    /// The store cannot be opened, or required configuration is missing.
    ///
    /// Raised when:
    /// - the passphrase is wrong or the database file is corrupted
    /// - the recorded schema version exceeds what this build understands
    /// - required configuration (e.g. the passphrase itself) is absent
    #[error("fatal: {0}")]
    Fatal(String),
}

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        Self::OperationFailed {
            operation: "sqlite".to_string(),
            cause: err.to_string(),
        }
    }
}

/// Result type alias for hippocampus operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Current wall-clock time as an ISO-8601 UTC string, the timestamp format
/// used throughout the data model (`created_at`, `updated_at`).
#[must_use]
pub fn now_iso() -> String {
    chrono::Utc::now().to_rfc3339()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::InvalidInput("content too long".to_string());
        assert_eq!(err.to_string(), "invalid input: content too long");

        let err = Error::OperationFailed {
            operation: "entities.touch".to_string(),
            cause: "disk full".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "operation 'entities.touch' failed: disk full"
        );

        let err = Error::NotFound("entity 'ghost'".to_string());
        assert_eq!(err.to_string(), "not found: entity 'ghost'");
    }

    #[test]
    fn now_iso_parses_as_rfc3339() {
        let stamp = now_iso();
        assert!(chrono::DateTime::parse_from_rfc3339(&stamp).is_ok());
    }
}
