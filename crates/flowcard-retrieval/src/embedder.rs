//! Embedding providers.
//!
//! The default provider is a deterministic feature hasher: no network, no
//! model weights, same vector for the same text on every machine. The
//! `candle` feature swaps in a real sentence embedding model for callers
//! who want semantic nearest-neighbour quality instead of bag-of-hashes
//! similarity.

use async_trait::async_trait;

use crate::error::{RetrievalError, RetrievalResult};

/// Distinguishes asymmetric retrieval embeddings: a search query and the
/// card text it's meant to match are embedded differently so a provider
/// that supports asymmetric models (most sentence embedders do) can place
/// them correctly relative to each other.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbeddingMode {
    Query,
    Document,
}

impl EmbeddingMode {
    fn as_str(&self) -> &'static str {
        match self {
            EmbeddingMode::Query => "query",
            EmbeddingMode::Document => "document",
        }
    }
}

#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    async fn embed(&self, texts: Vec<String>, mode: EmbeddingMode) -> RetrievalResult<Vec<Vec<f32>>>;

    fn embedding_dim(&self) -> usize;

    fn provider_name(&self) -> &'static str;
}

/// Feature-hashed bag-of-words embedder. Tokens are lowercased and split on
/// non-alphanumeric boundaries; each token votes on one dimension with a
/// sign drawn from a second hash, then the vector is L2-normalised. Same
/// text always yields the same vector, on any machine, with no model to
/// download.
pub struct HashingEmbedder {
    dim: usize,
}

const DEFAULT_HASHING_DIM: usize = 256;

impl HashingEmbedder {
    pub fn new(dim: usize) -> Self {
        HashingEmbedder { dim }
    }
}

impl Default for HashingEmbedder {
    fn default() -> Self {
        HashingEmbedder::new(DEFAULT_HASHING_DIM)
    }
}

#[async_trait]
impl EmbeddingProvider for HashingEmbedder {
    async fn embed(&self, texts: Vec<String>, mode: EmbeddingMode) -> RetrievalResult<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| hash_embed(t, self.dim, mode)).collect())
    }

    fn embedding_dim(&self) -> usize {
        self.dim
    }

    fn provider_name(&self) -> &'static str {
        "hashing"
    }
}

fn hash_embed(text: &str, dim: usize, mode: EmbeddingMode) -> Vec<f32> {
    let mut vec = vec![0f32; dim];
    let mode_token = format!("mode|{}", mode.as_str());
    for token in tokenize(text).into_iter().chain(std::iter::once(mode_token)) {
        let slot_hash = xxhash_rust::xxh3::xxh3_64(token.as_bytes());
        let slot = (slot_hash % dim as u64) as usize;
        let sign_hash = xxhash_rust::xxh3::xxh3_64(format!("sign|{token}").as_bytes());
        let sign = if sign_hash % 2 == 0 { 1.0 } else { -1.0 };
        vec[slot] += sign;
    }
    let norm = vec.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in vec.iter_mut() {
            *x /= norm;
        }
    }
    vec
}

fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase().split(|c: char| !c.is_alphanumeric()).filter(|s| !s.is_empty()).map(str::to_string).collect()
}

#[cfg(feature = "candle")]
pub use candle_embedder::CandleEmbedder;

#[cfg(feature = "candle")]
mod candle_embedder {
    use std::path::PathBuf;
    use std::sync::Arc;

    use candle_core::{DType, Device, Tensor};
    use candle_nn::VarBuilder;
    use candle_transformers::models::jina_bert::{BertModel, Config};
    use hf_hub::api::sync::Api;
    use hf_hub::{Repo, RepoType};
    use once_cell::sync::OnceCell;
    use tokenizers::{PaddingParams, PaddingStrategy, Tokenizer};
    use tracing::info;

    use super::*;

    const MODEL_ID: &str = "jinaai/jina-embeddings-v2-base-en";
    const MODEL_DIM: usize = 768;

    struct LoadedModel {
        model: BertModel,
        tokenizer: Tokenizer,
        device: Device,
    }

    /// Lazily-loaded local sentence embedding model. Model weights are
    /// fetched once from the Hub cache on first use; subsequent calls reuse
    /// the in-process model.
    pub struct CandleEmbedder {
        inner: OnceCell<LoadedModel>,
    }

    impl CandleEmbedder {
        pub fn new() -> Self {
            CandleEmbedder { inner: OnceCell::new() }
        }

        fn ensure_loaded(&self) -> RetrievalResult<&LoadedModel> {
            self.inner.get_or_try_init(load_model)
        }
    }

    impl Default for CandleEmbedder {
        fn default() -> Self {
            Self::new()
        }
    }

    fn select_device() -> Device {
        #[cfg(feature = "metal")]
        if let Ok(device) = Device::new_metal(0) {
            return device;
        }
        #[cfg(feature = "cuda")]
        if let Ok(device) = Device::new_cuda(0) {
            return device;
        }
        Device::Cpu
    }

    fn load_model() -> RetrievalResult<LoadedModel> {
        let device = select_device();
        let api = Api::new().map_err(|e| RetrievalError::EmbeddingUnavailable(e.to_string()))?;
        let repo = api.repo(Repo::new(MODEL_ID.to_string(), RepoType::Model));
        let config_path: PathBuf = repo.get("config.json").map_err(|e| RetrievalError::EmbeddingUnavailable(e.to_string()))?;
        let tokenizer_path: PathBuf = repo.get("tokenizer.json").map_err(|e| RetrievalError::EmbeddingUnavailable(e.to_string()))?;
        let weights_path: PathBuf = repo.get("model.safetensors").map_err(|e| RetrievalError::EmbeddingUnavailable(e.to_string()))?;

        let config: Config = serde_json::from_str(&std::fs::read_to_string(config_path)?)?;
        let mut tokenizer = Tokenizer::from_file(tokenizer_path).map_err(|e| RetrievalError::EmbeddingUnavailable(e.to_string()))?;
        tokenizer.with_padding(Some(PaddingParams { strategy: PaddingStrategy::BatchLongest, ..Default::default() }));

        let vb = unsafe { VarBuilder::from_mmaped_safetensors(&[weights_path], DType::F32, &device)? };
        let model = BertModel::new(vb, &config)?;
        info!(model = MODEL_ID, "loaded candle embedding model");
        Ok(LoadedModel { model, tokenizer, device })
    }

    fn mean_pool(hidden: &Tensor, mask: &Tensor) -> candle_core::Result<Tensor> {
        let mask = mask.to_dtype(DType::F32)?.unsqueeze(2)?;
        let masked = hidden.broadcast_mul(&mask)?;
        let summed = masked.sum(1)?;
        let counts = mask.sum(1)?.clamp(1e-9, f32::MAX)?;
        summed.broadcast_div(&counts)
    }

    #[async_trait]
    impl EmbeddingProvider for CandleEmbedder {
        async fn embed(&self, texts: Vec<String>, mode: EmbeddingMode) -> RetrievalResult<Vec<Vec<f32>>> {
            if texts.is_empty() {
                return Ok(Vec::new());
            }
            let loaded = self.ensure_loaded()?;
            let prefix = mode.as_str();
            let texts: Vec<String> = texts.into_iter().map(|t| format!("{prefix}: {t}")).collect();
            let encodings =
                loaded.tokenizer.encode_batch(texts, true).map_err(|e| RetrievalError::EmbeddingUnavailable(e.to_string()))?;

            let ids: Vec<Vec<u32>> = encodings.iter().map(|e| e.get_ids().to_vec()).collect();
            let mask: Vec<Vec<u32>> = encodings.iter().map(|e| e.get_attention_mask().to_vec()).collect();

            let token_ids = Tensor::new(ids, &loaded.device)?;
            let attention_mask = Tensor::new(mask, &loaded.device)?;
            let hidden = loaded.model.forward(&token_ids)?;
            let pooled = mean_pool(&hidden, &attention_mask)?;
            let pooled = pooled.broadcast_div(&pooled.sqr()?.sum_keepdim(1)?.sqrt()?)?;

            Ok(pooled.to_vec2::<f32>()?)
        }

        fn embedding_dim(&self) -> usize {
            MODEL_DIM
        }

        fn provider_name(&self) -> &'static str {
            "candle-jina-v2-base-en"
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn same_text_yields_same_vector() {
        let embedder = HashingEmbedder::default();
        let a = embedder.embed(vec!["billing refund flow".to_string()], EmbeddingMode::Document).await.unwrap();
        let b = embedder.embed(vec!["billing refund flow".to_string()], EmbeddingMode::Document).await.unwrap();
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn different_text_yields_different_vector() {
        let embedder = HashingEmbedder::default();
        let a = embedder.embed(vec!["billing refund flow".to_string()], EmbeddingMode::Document).await.unwrap();
        let b = embedder.embed(vec!["unrelated topic entirely".to_string()], EmbeddingMode::Document).await.unwrap();
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn vectors_are_unit_length() {
        let embedder = HashingEmbedder::default();
        let v = embedder.embed(vec!["normalize me please".to_string()], EmbeddingMode::Document).await.unwrap();
        let norm = v[0].iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[tokio::test]
    async fn query_and_document_modes_yield_different_vectors_for_the_same_text() {
        let embedder = HashingEmbedder::default();
        let query = embedder.embed(vec!["billing refund flow".to_string()], EmbeddingMode::Query).await.unwrap();
        let document = embedder.embed(vec!["billing refund flow".to_string()], EmbeddingMode::Document).await.unwrap();
        assert_ne!(query, document);
    }
}
