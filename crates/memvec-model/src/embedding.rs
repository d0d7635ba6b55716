//! Candle-based sentence embedding provider.

use std::path::Path;
use std::sync::Mutex;

use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::bert::{BertModel, Config as BertConfig, DTYPE};
use candle_transformers::models::xlm_roberta::{Config as XLMRobertaConfig, XLMRobertaModel};
use tokenizers::{PaddingParams, PaddingStrategy, Tokenizer, TruncationParams};
use tracing::{debug, info};

use crate::config::{DevicePreference, EmbeddingConfig, HuggingFaceModelConfig, ModelArchitecture};
use crate::error::{ModelError, ModelResult};
use crate::EmbeddingProvider;

// ============================================================================
// ModelBackend enum
// ============================================================================

enum ModelBackend {
    Bert(BertModel),
    Roberta(XLMRobertaModel),
}

impl ModelBackend {
    fn forward(
        &self,
        input_ids: &Tensor,
        token_type_ids: &Tensor,
        attention_mask: &Tensor,
    ) -> candle_core::Result<Tensor> {
        match self {
            ModelBackend::Bert(model) => {
                model.forward(input_ids, token_type_ids, Some(attention_mask))
            }
            ModelBackend::Roberta(model) => {
                model.forward(input_ids, attention_mask, token_type_ids, None, None, None)
            }
        }
    }
}

// ============================================================================
// CandleEmbeddingModel
// ============================================================================

/// Candle-based embedding model.
///
/// Supports BERT and RoBERTa architectures with mean pooling and L2
/// normalization, so dot product equals cosine similarity on its output.
pub struct CandleEmbeddingModel {
    model_id: String,
    dimension: usize,
    batch_size: usize,
    model: Mutex<ModelBackend>,
    tokenizer: Mutex<Tokenizer>,
    device: Device,
}

impl std::fmt::Debug for CandleEmbeddingModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CandleEmbeddingModel")
            .field("model_id", &self.model_id)
            .field("dimension", &self.dimension)
            .finish()
    }
}

// SAFETY: the model and tokenizer are only touched behind their mutexes.
unsafe impl Send for CandleEmbeddingModel {}
unsafe impl Sync for CandleEmbeddingModel {}

impl CandleEmbeddingModel {
    /// Load the model described by `config` from disk.
    pub fn new(config: &EmbeddingConfig) -> ModelResult<Self> {
        let model_path = config.effective_model_path();

        if !model_path.exists() {
            return Err(ModelError::ModelNotFound {
                model_id: config.model_id.clone(),
                path: model_path,
            });
        }

        let hf_config = load_hf_config(&model_path)?;
        let architecture = hf_config.infer_architecture();
        let dimension = hf_config.hidden_size;
        let max_seq_len = config
            .max_sequence_length
            .min(hf_config.max_position_embeddings);

        info!(
            "Loading embedding model '{}' from {:?} (arch={}, dim={})",
            config.model_id, model_path, architecture, dimension
        );

        let (pad_id, pad_token) = match architecture {
            ModelArchitecture::Roberta | ModelArchitecture::Mpnet => (1, "<pad>"),
            ModelArchitecture::Bert | ModelArchitecture::Unknown => (0, "[PAD]"),
        };

        let tokenizer = load_tokenizer(&model_path, max_seq_len, pad_id, pad_token)?;
        let device = select_device(config.device)?;
        let model = load_model(&model_path, architecture, &device)?;

        Ok(Self {
            model_id: config.model_id.clone(),
            dimension,
            batch_size: config.batch_size.max(1),
            model: Mutex::new(model),
            tokenizer: Mutex::new(tokenizer),
            device,
        })
    }

    fn err(&self, e: impl std::fmt::Display) -> ModelError {
        ModelError::embedding_failed(&self.model_id, e.to_string())
    }

    fn embed_chunk(&self, texts: &[&str]) -> ModelResult<Vec<Vec<f32>>> {
        let encodings = {
            let tokenizer = self.tokenizer.lock().map_err(|e| self.err(e))?;
            let inputs: Vec<String> = texts.iter().map(|s| s.to_string()).collect();
            tokenizer
                .encode_batch(inputs, true)
                .map_err(|e| ModelError::tokenization(e.to_string()))?
        };

        let batch_size = encodings.len();
        let seq_len = encodings.first().map(|e| e.get_ids().len()).unwrap_or(0);

        let token_ids: Vec<u32> = encodings
            .iter()
            .flat_map(|e| e.get_ids().to_vec())
            .collect();
        let attention_mask: Vec<u32> = encodings
            .iter()
            .flat_map(|e| e.get_attention_mask().to_vec())
            .collect();

        let token_ids = Tensor::from_vec(token_ids, (batch_size, seq_len), &self.device)
            .map_err(|e| self.err(e))?;
        let attention_mask = Tensor::from_vec(attention_mask, (batch_size, seq_len), &self.device)
            .map_err(|e| self.err(e))?;
        let token_type_ids = token_ids.zeros_like().map_err(|e| self.err(e))?;

        let hidden_states = {
            let model = self.model.lock().map_err(|e| self.err(e))?;
            model
                .forward(&token_ids, &token_type_ids, &attention_mask)
                .map_err(|e| self.err(format!("Forward failed: {}", e)))?
        };

        let pooled = mean_pooling(&hidden_states, &attention_mask).map_err(|e| self.err(e))?;
        let normalized = l2_normalize(&pooled).map_err(|e| self.err(e))?;

        normalized.to_vec2::<f32>().map_err(|e| self.err(e))
    }
}

impl EmbeddingProvider for CandleEmbeddingModel {
    fn embed_batch(&self, texts: &[&str]) -> ModelResult<Vec<Vec<f32>>> {
        let mut out = Vec::with_capacity(texts.len());
        for chunk in texts.chunks(self.batch_size) {
            debug!("Embedding chunk of {} texts", chunk.len());
            out.extend(self.embed_chunk(chunk)?);
        }
        Ok(out)
    }

    fn warm_up(&self) -> ModelResult<()> {
        let _ = self.embed_chunk(&["warmup"])?;
        Ok(())
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn name(&self) -> &str {
        &self.model_id
    }
}

// ============================================================================
// Loading helpers
// ============================================================================

fn load_hf_config(model_path: &Path) -> ModelResult<HuggingFaceModelConfig> {
    let config_path = model_path.join("config.json");
    if !config_path.exists() {
        return Err(ModelError::model_load(
            model_path.display().to_string(),
            "config.json not found",
        ));
    }
    let content = std::fs::read_to_string(&config_path)?;
    serde_json::from_str(&content).map_err(|e| ModelError::InvalidConfig {
        message: e.to_string(),
    })
}

fn load_tokenizer(
    model_path: &Path,
    max_length: usize,
    pad_id: u32,
    pad_token: &str,
) -> ModelResult<Tokenizer> {
    let tokenizer_path = model_path.join("tokenizer.json");
    if !tokenizer_path.exists() {
        return Err(ModelError::model_load(
            model_path.display().to_string(),
            "tokenizer.json not found",
        ));
    }

    let mut tokenizer = Tokenizer::from_file(&tokenizer_path)
        .map_err(|e| ModelError::model_load(model_path.display().to_string(), e.to_string()))?;

    tokenizer.with_padding(Some(PaddingParams {
        strategy: PaddingStrategy::BatchLongest,
        pad_id,
        pad_token: pad_token.to_string(),
        ..Default::default()
    }));

    tokenizer
        .with_truncation(Some(TruncationParams {
            max_length,
            ..Default::default()
        }))
        .map_err(|e| ModelError::model_load(model_path.display().to_string(), e.to_string()))?;

    Ok(tokenizer)
}

fn select_device(pref: DevicePreference) -> ModelResult<Device> {
    match pref {
        DevicePreference::Auto => Ok(try_gpu().unwrap_or_else(|| {
            info!("Using CPU");
            Device::Cpu
        })),
        DevicePreference::Gpu => try_gpu().ok_or_else(|| ModelError::DeviceNotAvailable {
            reason: "no Metal or CUDA device is available to this build".to_string(),
        }),
        DevicePreference::Cpu => Ok(Device::Cpu),
    }
}

fn try_gpu() -> Option<Device> {
    #[cfg(feature = "metal")]
    {
        match Device::new_metal(0) {
            Ok(device) => {
                info!("Using Metal GPU");
                return Some(device);
            }
            Err(e) => debug!("Metal not available: {}", e),
        }
    }

    #[cfg(feature = "cuda")]
    {
        match Device::new_cuda(0) {
            Ok(device) => {
                info!("Using CUDA GPU");
                return Some(device);
            }
            Err(e) => debug!("CUDA not available: {}", e),
        }
    }

    None
}

fn load_model(
    model_path: &Path,
    architecture: ModelArchitecture,
    device: &Device,
) -> ModelResult<ModelBackend> {
    let weights_path = model_path.join("model.safetensors");
    if !weights_path.exists() {
        return Err(ModelError::model_load(
            model_path.display().to_string(),
            "model.safetensors not found",
        ));
    }

    let load_err = |e: candle_core::Error| {
        ModelError::model_load(model_path.display().to_string(), e.to_string())
    };

    // SAFETY: the weights file is not modified while mapped.
    let vb = unsafe {
        VarBuilder::from_mmaped_safetensors(&[weights_path], DTYPE, device).map_err(load_err)?
    };

    let content = std::fs::read_to_string(model_path.join("config.json"))?;
    match architecture {
        ModelArchitecture::Bert | ModelArchitecture::Unknown => {
            let bert_config: BertConfig = serde_json::from_str(&content)?;
            let model = BertModel::load(vb, &bert_config).map_err(load_err)?;
            Ok(ModelBackend::Bert(model))
        }
        ModelArchitecture::Roberta | ModelArchitecture::Mpnet => {
            let roberta_config: XLMRobertaConfig = serde_json::from_str(&content)?;
            let model = XLMRobertaModel::new(&roberta_config, vb).map_err(load_err)?;
            Ok(ModelBackend::Roberta(model))
        }
    }
}

fn mean_pooling(embeddings: &Tensor, mask: &Tensor) -> candle_core::Result<Tensor> {
    let mask_expanded = mask
        .unsqueeze(2)?
        .to_dtype(DType::F32)?
        .broadcast_as(embeddings.shape())?;
    let sum = embeddings.broadcast_mul(&mask_expanded)?.sum(1)?;
    let count = mask_expanded.sum(1)?.clamp(1e-9, f64::MAX)?;
    sum.broadcast_div(&count)
}

fn l2_normalize(embeddings: &Tensor) -> candle_core::Result<Tensor> {
    let norm = embeddings
        .sqr()?
        .sum_keepdim(1)?
        .sqrt()?
        .clamp(1e-12, f64::MAX)?;
    embeddings.broadcast_div(&norm)
}
