//! The embedder (C2): deterministic text → unit-length 384-dimensional
//! vector.

mod onnx;

pub use onnx::OnnxEmbedder;

use crate::models::EMBEDDING_DIM;
use crate::Result;

/// Produces embedding vectors from text. Implementations must be
/// deterministic: the same input always yields the same vector.
pub trait Embedder: Send + Sync {
    /// Dimensionality of vectors this embedder produces.
    fn dimensions(&self) -> usize {
        EMBEDDING_DIM
    }

    /// Embeds a single string into a unit-length vector.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::EmbedderUnavailable`] if the model cannot be
    /// loaded or inference fails.
    fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Embeds a batch of strings. The default implementation embeds each
    /// input independently; implementations that can batch inference more
    /// efficiently should override this.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::EmbedderUnavailable`] if any input fails.
    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        texts.iter().map(|t| self.embed(t)).collect()
    }
}
