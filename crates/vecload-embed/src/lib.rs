//! vecload-embed
//!
//! Sentence embedders behind `vecload_core::traits::Embedder`: a candle BERT
//! sentence transformer (all-MiniLM-L6-v2 by default) and a model-free hashed
//! embedder for tests and dry runs.

use anyhow::{anyhow, Context, Result};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use candle_core::{Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::bert::{BertModel, Config as BertConfig, DTYPE};
use tokenizers::Tokenizer;
use tracing::{debug, info};

use vecload_core::config::{resolve_with_base, EmbeddingBackend, EmbeddingSettings};
use vecload_core::traits::Embedder;

pub mod device;
pub mod hashed;
pub mod pool;
pub mod tokenize;

pub use hashed::HashEmbedder;
pub use pool::{masked_mean, EncodeOptions};

pub struct SentenceEmbedder {
    model: BertModel,
    tokenizer: Tokenizer,
    device: Device,
    dim: usize,
    max_len: usize,
    options: EncodeOptions,
}

impl SentenceEmbedder {
    pub fn load(model_dir: &Path, max_len: usize, options: EncodeOptions) -> Result<Self> {
        let device = device::select_device();
        info!(model_dir = %model_dir.display(), "loading sentence embedding model");

        let tokenizer_path = model_dir.join("tokenizer.json");
        let tokenizer = Tokenizer::from_file(&tokenizer_path)
            .map_err(|e| anyhow!("Failed to load tokenizer from {}: {}", tokenizer_path.display(), e))?;

        let config_path = model_dir.join("config.json");
        let config: BertConfig = serde_json::from_str(
            &std::fs::read_to_string(&config_path)
                .with_context(|| format!("Failed to read {}", config_path.display()))?,
        )?;

        let safetensors = model_dir.join("model.safetensors");
        let vb = if safetensors.exists() {
            debug!(path = %safetensors.display(), "loading safetensors weights");
            // SAFETY: the weights file is not modified while mapped.
            unsafe { VarBuilder::from_mmaped_safetensors(&[safetensors], DTYPE, &device)? }
        } else {
            let weights_path = model_dir.join("pytorch_model.bin");
            debug!(path = %weights_path.display(), "loading pickled weights");
            let weights = candle_core::pickle::read_all(&weights_path)?;
            let weights_map: HashMap<String, Tensor> = weights.into_iter().collect();
            VarBuilder::from_tensors(weights_map, DTYPE, &device)
        };
        let model = BertModel::load(vb, &config)?;

        let dim = config.hidden_size;
        let max_len = max_len.clamp(2, config.max_position_embeddings);
        info!(dim, max_len, pooling = ?options.pooling, normalize = options.normalize, "sentence embedding model loaded");
        Ok(Self { model, tokenizer, device, dim, max_len, options })
    }

    pub fn embed_text(&self, text: &str) -> Result<Vec<f32>> {
        let start = Instant::now();
        let input = tokenize::tokenize_on_device(&self.tokenizer, text, self.max_len, &self.device)?;
        let hidden = self
            .model
            .forward(&input.input_ids, &input.token_type_ids, Some(&input.attention_mask))?;
        let pooled = pool::pool(&hidden, &input.attention_mask, self.options)?;
        let emb: Vec<f32> = pooled.to_device(&Device::Cpu)?.squeeze(0)?.to_vec1()?;
        if emb.len() != self.dim {
            return Err(anyhow!("model produced {} values, expected {}", emb.len(), self.dim));
        }
        debug!(elapsed_ms = start.elapsed().as_millis() as u64, "embedded text");
        Ok(emb)
    }
}

impl Embedder for SentenceEmbedder {
    fn dim(&self) -> usize { self.dim }
    fn max_len(&self) -> usize { self.max_len }
    fn embed_text(&self, text: &str) -> Result<Vec<f32>> { SentenceEmbedder::embed_text(self, text) }
}

/// Builds the embedder selected by `settings`. `APP_USE_FAKE_EMBEDDINGS=1`
/// forces the hashed backend regardless of configuration.
pub fn load_embedder(settings: &EmbeddingSettings, base: &Path) -> Result<Arc<dyn Embedder>> {
    let use_fake = std::env::var("APP_USE_FAKE_EMBEDDINGS")
        .ok()
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(false);
    if use_fake || settings.backend == EmbeddingBackend::Hashed {
        info!(dim = settings.hashed_dim, "using hashed embedder");
        return Ok(Arc::new(HashEmbedder::new(settings.hashed_dim)));
    }
    let model_dir = resolve_model_dir(settings, base)?;
    let options = EncodeOptions { pooling: settings.pooling, normalize: settings.normalize };
    Ok(Arc::new(SentenceEmbedder::load(&model_dir, settings.max_len, options)?))
}

fn resolve_model_dir(settings: &EmbeddingSettings, base: &Path) -> Result<PathBuf> {
    for var in ["APP_MODEL_DIR", "MODEL_DIR"] {
        if let Ok(dir) = std::env::var(var) {
            let p = PathBuf::from(&dir);
            if p.exists() {
                debug!(source = var, path = %p.display(), "using model dir");
                return Ok(p);
            }
        }
    }
    let configured = resolve_with_base(base, &settings.model_dir);
    if configured.exists() {
        return Ok(configured);
    }
    Err(anyhow!("Could not locate embedding model directory {}", configured.display()))
}
