//! Local embedding generation using all-MiniLM-L6-v2 via candle.
//!
//! Produces 384-dimensional normalized embeddings. The model is loaded from a
//! local directory when one is given and complete, otherwise from the
//! Hugging Face Hub (downloads on first use).

use crate::error::{DocsiftError, Result};
use crate::similarity::Embedder;
use candle_core::{Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::bert::{BertModel, Config, HiddenAct, DTYPE};
use hf_hub::{api::sync::Api, Repo, RepoType};
use std::path::{Path, PathBuf};
use tokenizers::{PaddingParams, PaddingStrategy, Tokenizer, TruncationParams};

pub const MODEL_ID: &str = "sentence-transformers/all-MiniLM-L6-v2";
const REVISION: &str = "main";
const EMBEDDING_DIM: usize = 384;

fn err(context: &str, e: impl std::fmt::Display) -> DocsiftError {
    DocsiftError::Embedding(format!("{}: {}", context, e))
}

/// Local embedding model wrapper
pub struct LocalEmbedder {
    model: BertModel,
    tokenizer: Tokenizer,
    device: Device,
}

struct ModelFiles {
    config: PathBuf,
    tokenizer: PathBuf,
    weights: PathBuf,
}

impl ModelFiles {
    fn in_dir(dir: &Path) -> Option<Self> {
        let files = Self {
            config: dir.join("config.json"),
            tokenizer: dir.join("tokenizer.json"),
            weights: dir.join("model.safetensors"),
        };
        (files.config.is_file() && files.tokenizer.is_file() && files.weights.is_file()).then_some(files)
    }

    fn download() -> Result<Self> {
        let api = Api::new().map_err(|e| err("Failed to create HF API", e))?;
        let repo = api.repo(Repo::with_revision(
            MODEL_ID.to_string(),
            RepoType::Model,
            REVISION.to_string(),
        ));

        Ok(Self {
            config: repo.get("config.json").map_err(|e| err("Failed to download config", e))?,
            tokenizer: repo
                .get("tokenizer.json")
                .map_err(|e| err("Failed to download tokenizer", e))?,
            weights: repo
                .get("model.safetensors")
                .map_err(|e| err("Failed to download weights", e))?,
        })
    }
}

impl LocalEmbedder {
    /// Load the model, preferring `model_dir` when it holds a complete copy
    pub fn new(model_dir: Option<&Path>) -> Result<Self> {
        let device = select_device();

        let files = match model_dir.and_then(ModelFiles::in_dir) {
            Some(files) => {
                tracing::info!("[LocalEmbeddings] Loading model from {}", files.config.display());
                files
            }
            None => {
                tracing::info!("[LocalEmbeddings] Fetching {} from the Hugging Face Hub", MODEL_ID);
                ModelFiles::download()?
            }
        };

        // Load config
        let config_str =
            std::fs::read_to_string(&files.config).map_err(|e| err("Failed to read config", e))?;
        let mut config: Config =
            serde_json::from_str(&config_str).map_err(|e| err("Failed to parse config", e))?;

        // MiniLM uses gelu activation
        config.hidden_act = HiddenAct::Gelu;

        let mut tokenizer =
            Tokenizer::from_file(&files.tokenizer).map_err(|e| err("Failed to load tokenizer", e))?;

        // Configure tokenizer for batch processing
        let padding = PaddingParams {
            strategy: PaddingStrategy::BatchLongest,
            ..Default::default()
        };
        let truncation = TruncationParams {
            max_length: 512,
            ..Default::default()
        };
        tokenizer.with_padding(Some(padding));
        tokenizer
            .with_truncation(Some(truncation))
            .map_err(|e| err("Failed to set truncation", e))?;

        // Load model weights
        let vb = unsafe {
            VarBuilder::from_mmaped_safetensors(&[files.weights], DTYPE, &device)
                .map_err(|e| err("Failed to load weights", e))?
        };

        let model = BertModel::load(vb, &config).map_err(|e| err("Failed to build model", e))?;

        tracing::info!("[LocalEmbeddings] Model loaded: {}", MODEL_ID);

        Ok(Self { model, tokenizer, device })
    }

    fn forward(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(vec![]);
        }

        let encodings = self
            .tokenizer
            .encode_batch(texts.to_vec(), true)
            .map_err(|e| err("Tokenization failed", e))?;

        let batch_size = encodings.len();
        let seq_len = encodings[0].get_ids().len();

        // Build input tensors
        let mut all_ids = Vec::with_capacity(batch_size * seq_len);
        let mut all_mask = Vec::with_capacity(batch_size * seq_len);
        let mut all_type_ids = Vec::with_capacity(batch_size * seq_len);

        for encoding in &encodings {
            all_ids.extend(encoding.get_ids().iter().map(|&x| x as i64));
            all_mask.extend(encoding.get_attention_mask().iter().map(|&x| x as i64));
            all_type_ids.extend(encoding.get_type_ids().iter().map(|&x| x as i64));
        }

        let input_ids = Tensor::from_vec(all_ids, (batch_size, seq_len), &self.device)
            .map_err(|e| err("Failed to create input_ids tensor", e))?;
        let attention_mask = Tensor::from_vec(all_mask, (batch_size, seq_len), &self.device)
            .map_err(|e| err("Failed to create attention_mask tensor", e))?;
        let token_type_ids = Tensor::from_vec(all_type_ids, (batch_size, seq_len), &self.device)
            .map_err(|e| err("Failed to create token_type_ids tensor", e))?;

        let hidden_states = self
            .model
            .forward(&input_ids, &token_type_ids, Some(&attention_mask))
            .map_err(|e| err("Model forward failed", e))?;

        // Mean pooling with attention mask
        let mask_expanded = attention_mask
            .unsqueeze(2)
            .and_then(|m| m.to_dtype(DTYPE))
            .and_then(|m| m.broadcast_as(hidden_states.shape()))
            .map_err(|e| err("Mask expansion failed", e))?;

        let summed = hidden_states
            .mul(&mask_expanded)
            .and_then(|m| m.sum(1))
            .map_err(|e| err("Masked sum failed", e))?;

        let mask_sum = mask_expanded
            .sum(1)
            .and_then(|m| m.clamp(1e-9, f64::MAX))
            .map_err(|e| err("Mask sum failed", e))?;

        let pooled = summed.div(&mask_sum).map_err(|e| err("Division failed", e))?;

        // L2 normalize
        let norm = pooled
            .sqr()
            .and_then(|p| p.sum_keepdim(1))
            .and_then(|p| p.sqrt())
            .and_then(|p| p.clamp(1e-12, f64::MAX))
            .map_err(|e| err("Norm failed", e))?;

        let normalized = pooled
            .broadcast_div(&norm)
            .map_err(|e| err("Normalize failed", e))?;

        let flat: Vec<f32> = normalized
            .to_vec2::<f32>()
            .map_err(|e| err("To vec failed", e))?
            .into_iter()
            .flatten()
            .collect();

        Ok(flat.chunks(EMBEDDING_DIM).map(|chunk| chunk.to_vec()).collect())
    }
}

impl Embedder for LocalEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.forward(&[text])?
            .into_iter()
            .next()
            .ok_or_else(|| DocsiftError::Embedding("model returned no embedding".into()))
    }

    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        self.forward(texts)
    }
}

fn select_device() -> Device {
    // Try CUDA if feature enabled, otherwise CPU only
    #[cfg(feature = "cuda")]
    {
        if candle_core::utils::cuda_is_available() {
            match Device::new_cuda(0) {
                Ok(dev) => {
                    tracing::info!("[LocalEmbeddings] Using CUDA device (GPU)");
                    return dev;
                }
                Err(e) => {
                    tracing::warn!("[LocalEmbeddings] CUDA device creation failed: {}, falling back to CPU", e);
                }
            }
        }
    }

    tracing::debug!("[LocalEmbeddings] Using CPU");
    Device::Cpu
}
