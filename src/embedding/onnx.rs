//! ONNX Runtime-backed embedder: a bundled `all-MiniLM-L6-v2`-equivalent
//! model, mean-pooled and L2-normalized, matching the semantics the data
//! model requires of every stored vector.

use crate::models::EMBEDDING_DIM;
use crate::{Error, Result};
use ndarray::{Array2, Axis};
use ort::session::Session;
use ort::value::Value;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, OnceLock};
use tokenizers::Tokenizer;

const MODEL_FILE_NAME: &str = "all-MiniLM-L6-v2.onnx";
const TOKENIZER_FILE_NAME: &str = "all-MiniLM-L6-v2-tokenizer.json";
const MODEL_URL: &str =
    "https://huggingface.co/sentence-transformers/all-MiniLM-L6-v2/resolve/main/onnx/model.onnx";
const TOKENIZER_URL: &str =
    "https://huggingface.co/sentence-transformers/all-MiniLM-L6-v2/resolve/main/tokenizer.json";
const MAX_SEQUENCE_LENGTH: usize = 256;

static GLOBAL: OnceLock<Result<OnnxEmbedder>> = OnceLock::new();

/// A lazily-loaded, process-wide ONNX embedding pipeline.
pub struct OnnxEmbedder {
    tokenizer: Tokenizer,
    session: Mutex<Session>,
}

impl OnnxEmbedder {
    /// Returns the process-wide embedder, loading the model and tokenizer
    /// (downloading into `cache_dir` first if absent) on first call.
    ///
    /// # Errors
    ///
    /// Returns [`Error::EmbedderUnavailable`] if the model or tokenizer
    /// cannot be obtained or fail to load.
    pub fn global(cache_dir: &Path) -> Result<&'static Self> {
        match GLOBAL.get_or_init(|| Self::load(cache_dir)) {
            Ok(embedder) => Ok(embedder),
            Err(e) => Err(Error::EmbedderUnavailable(e.to_string())),
        }
    }

    fn load(cache_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(cache_dir)
            .map_err(|e| Error::EmbedderUnavailable(format!("creating cache dir: {e}")))?;

        let model_path = cache_dir.join(MODEL_FILE_NAME);
        let tokenizer_path = cache_dir.join(TOKENIZER_FILE_NAME);

        ensure_downloaded(&model_path, MODEL_URL)?;
        ensure_downloaded(&tokenizer_path, TOKENIZER_URL)?;

        let tokenizer = Tokenizer::from_file(&tokenizer_path)
            .map_err(|e| Error::EmbedderUnavailable(format!("loading tokenizer: {e}")))?;

        let session = Session::builder()
            .map_err(|e| Error::EmbedderUnavailable(format!("building session: {e}")))?
            .commit_from_file(&model_path)
            .map_err(|e| Error::EmbedderUnavailable(format!("loading model: {e}")))?;

        Ok(Self {
            tokenizer,
            session: Mutex::new(session),
        })
    }

    fn embed_one(&self, text: &str) -> Result<Vec<f32>> {
        let encoding = self
            .tokenizer
            .encode(text, true)
            .map_err(|e| Error::EmbedderUnavailable(format!("tokenizing: {e}")))?;

        let ids: Vec<i64> = encoding
            .get_ids()
            .iter()
            .take(MAX_SEQUENCE_LENGTH)
            .map(|&id| i64::from(id))
            .collect();
        let mask: Vec<i64> = encoding
            .get_attention_mask()
            .iter()
            .take(MAX_SEQUENCE_LENGTH)
            .map(|&m| i64::from(m))
            .collect();
        let type_ids: Vec<i64> = vec![0i64; ids.len()];
        let seq_len = ids.len();

        let input_ids = Array2::from_shape_vec((1, seq_len), ids)
            .map_err(|e| Error::EmbedderUnavailable(format!("shaping input_ids: {e}")))?;
        let attention_mask = Array2::from_shape_vec((1, seq_len), mask)
            .map_err(|e| Error::EmbedderUnavailable(format!("shaping attention_mask: {e}")))?;
        let token_type_ids = Array2::from_shape_vec((1, seq_len), type_ids)
            .map_err(|e| Error::EmbedderUnavailable(format!("shaping token_type_ids: {e}")))?;

        let input_ids_value = Value::from_array(input_ids)
            .map_err(|e| Error::EmbedderUnavailable(format!("building input_ids tensor: {e}")))?;
        let attention_mask_value = Value::from_array(attention_mask.clone())
            .map_err(|e| Error::EmbedderUnavailable(format!("building attention_mask tensor: {e}")))?;
        let token_type_ids_value = Value::from_array(token_type_ids)
            .map_err(|e| Error::EmbedderUnavailable(format!("building token_type_ids tensor: {e}")))?;

        let mut session = crate::storage::connection::acquire_lock(&self.session);
        let outputs = session
            .run(ort::inputs![
                "input_ids" => input_ids_value,
                "attention_mask" => attention_mask_value,
                "token_type_ids" => token_type_ids_value,
            ])
            .map_err(|e| Error::EmbedderUnavailable(format!("running inference: {e}")))?;

        let (shape, data) = outputs["last_hidden_state"]
            .try_extract_raw_tensor::<f32>()
            .map_err(|e| Error::EmbedderUnavailable(format!("extracting output tensor: {e}")))?;
        let hidden_dim = shape[2] as usize;

        let pooled = mean_pool(data, seq_len, hidden_dim, attention_mask.view());
        Ok(l2_normalize(pooled))
    }
}

impl super::Embedder for OnnxEmbedder {
    fn dimensions(&self) -> usize {
        EMBEDDING_DIM
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.embed_one(text)
    }
}

/// Mean-pools token embeddings, weighting each token by its attention mask
/// so padding tokens contribute nothing.
fn mean_pool(
    data: &[f32],
    seq_len: usize,
    hidden_dim: usize,
    attention_mask: ndarray::ArrayView2<'_, i64>,
) -> Vec<f32> {
    let mut sums = vec![0.0f32; hidden_dim];
    let mut weight_total = 0.0f32;

    for (token_idx, &mask_value) in attention_mask.index_axis(Axis(0), 0).iter().enumerate() {
        if mask_value == 0 || token_idx >= seq_len {
            continue;
        }
        let weight = 1.0f32;
        weight_total += weight;
        let offset = token_idx * hidden_dim;
        for dim in 0..hidden_dim {
            sums[dim] += data[offset + dim] * weight;
        }
    }

    if weight_total > 0.0 {
        for value in &mut sums {
            *value /= weight_total;
        }
    }

    sums
}

/// Normalizes a vector to unit length, matching the store's invariant that
/// every vector satisfies `|‖v‖ − 1| < 10⁻⁴`.
fn l2_normalize(mut vector: Vec<f32>) -> Vec<f32> {
    let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for value in &mut vector {
            *value /= norm;
        }
    }
    vector
}

fn ensure_downloaded(path: &PathBuf, url: &str) -> Result<()> {
    if path.exists() {
        return Ok(());
    }

    tracing::info!(url, path = %path.display(), "downloading embedding model asset");
    let response = ureq::get(url)
        .call()
        .map_err(|e| Error::EmbedderUnavailable(format!("downloading {url}: {e}")))?;
    let mut reader = response.into_body().into_reader();
    let mut file = std::fs::File::create(path)
        .map_err(|e| Error::EmbedderUnavailable(format!("creating {}: {e}", path.display())))?;
    std::io::copy(&mut reader, &mut file)
        .map_err(|e| Error::EmbedderUnavailable(format!("writing {}: {e}", path.display())))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn l2_normalize_produces_unit_vector() {
        let v = l2_normalize(vec![3.0, 4.0]);
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-6);
    }

    #[test]
    fn l2_normalize_leaves_zero_vector_untouched() {
        assert_eq!(l2_normalize(vec![0.0, 0.0]), vec![0.0, 0.0]);
    }
}
