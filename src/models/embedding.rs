use super::entity::EntityId;
use super::observation::ObservationId;
use super::EMBEDDING_DIM;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque, stable identifier for an [`Embedding`] row.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EmbeddingId(String);

impl EmbeddingId {
    /// Generates a fresh random identifier.
    #[must_use]
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

impl Default for EmbeddingId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for EmbeddingId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for EmbeddingId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// A 384-dimension, L2-normalized vector representation of one observation's
/// text, plus enough denormalized context to score and report a hit without
/// a join back to the observation table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Embedding {
    /// Opaque identifier.
    pub id: EmbeddingId,
    /// Owning entity. Cascade-deletes with the entity.
    pub entity_id: EntityId,
    /// Owning observation. Cascade-deletes with the observation.
    pub observation_id: ObservationId,
    /// Unit-length vector, exactly [`EMBEDDING_DIM`] elements.
    pub vector: Vec<f32>,
    /// Copy of the observation content at embed time.
    pub text_content: String,
    /// ISO-8601 UTC creation timestamp.
    pub created_at: String,
}

impl Embedding {
    /// Returns whether `vector` has the required dimensionality and is
    /// unit-length to within floating-point tolerance.
    #[must_use]
    pub fn is_valid_vector(vector: &[f32]) -> bool {
        if vector.len() != EMBEDDING_DIM {
            return false;
        }
        let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        (norm - 1.0).abs() < 1e-4
    }
}

/// Dot product of two equal-length unit vectors, i.e. their cosine
/// similarity. Accumulates in `f64` for precision before narrowing back to
/// `f32`-scale output.
#[must_use]
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| f64::from(*x) * f64::from(*y))
        .sum()
}

/// Serializes a vector as little-endian `f32` bytes, the on-disk
/// representation stored in the `embeddings.vector` column.
#[must_use]
pub fn vector_to_bytes(vector: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vector.len() * 4);
    for value in vector {
        bytes.extend_from_slice(&value.to_le_bytes());
    }
    bytes
}

/// Deserializes little-endian `f32` bytes back into a vector.
#[must_use]
pub fn vector_from_bytes(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit(mut v: Vec<f32>) -> Vec<f32> {
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        for x in &mut v {
            *x /= norm;
        }
        v
    }

    #[test]
    fn cosine_similarity_identical_vectors_is_one() {
        let v = unit(vec![0.1; EMBEDDING_DIM]);
        let sim = cosine_similarity(&v, &v);
        assert!((sim - 1.0).abs() < 1e-6);
    }

    #[test]
    fn cosine_similarity_is_symmetric() {
        let mut a = vec![0.0f32; EMBEDDING_DIM];
        let mut b = vec![0.0f32; EMBEDDING_DIM];
        a[0] = 1.0;
        a[1] = 0.5;
        b[0] = 0.3;
        b[2] = 0.9;
        let a = unit(a);
        let b = unit(b);
        assert!((cosine_similarity(&a, &b) - cosine_similarity(&b, &a)).abs() < 1e-12);
    }

    #[test]
    fn vector_bytes_round_trip() {
        let v = unit(vec![0.25; EMBEDDING_DIM]);
        let bytes = vector_to_bytes(&v);
        assert_eq!(bytes.len(), EMBEDDING_DIM * 4);
        let back = vector_from_bytes(&bytes);
        assert_eq!(v, back);
    }

    #[test]
    fn is_valid_vector_rejects_wrong_dimension_and_non_unit() {
        assert!(!Embedding::is_valid_vector(&[1.0, 0.0]));
        assert!(!Embedding::is_valid_vector(&vec![1.0; EMBEDDING_DIM]));
        let mut v = vec![0.0f32; EMBEDDING_DIM];
        v[0] = 1.0;
        assert!(Embedding::is_valid_vector(&v));
    }
}
