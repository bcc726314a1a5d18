use std::fs;
use std::path::{Path, PathBuf};

use candle_core::Device;
use serde::Deserialize;
use tracing::info;

use crate::engine::{CandleLlama, TextTokenizer};
use crate::error::{QueryError, Result};
use crate::prompting::{infer_family_from_filename, GenerationConfig, PromptFamily};
use crate::query::{QueryHfModel, QueryLlama};

/// Top-level TOML configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct RapConfig {
    pub model: ModelSettings,
    #[serde(default)]
    pub generation: GenerationSettings,
    #[serde(default)]
    pub log: LogSettings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ModelSettings {
    pub path: PathBuf,
    #[serde(default)]
    pub family: Option<PromptFamily>,
    #[serde(default)]
    pub tokenizer: Option<PathBuf>,
    #[serde(default)]
    pub tokenizer_repo: Option<String>,
    #[serde(default = "default_device")]
    pub device: String,
    #[serde(default = "default_max_batch_size")]
    pub max_batch_size: usize,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct GenerationSettings {
    pub max_response_length: Option<usize>,
    pub top_p: Option<f64>,
    pub seed: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LogSettings {
    pub file: Option<PathBuf>,
}

fn default_device() -> String {
    "cpu".to_string()
}

fn default_max_batch_size() -> usize {
    4
}

impl ModelSettings {
    /// Explicit family, or whatever the model file name suggests.
    pub fn resolved_family(&self) -> PromptFamily {
        self.family.unwrap_or_else(|| {
            self.path
                .file_stem()
                .and_then(|s| s.to_str())
                .map(infer_family_from_filename)
                .unwrap_or(PromptFamily::Unknown)
        })
    }
}

impl RapConfig {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path)
            .map_err(|e| QueryError::Config(format!("cannot read {}: {}", path.display(), e)))?;
        Self::from_toml_str(&raw)
    }

    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let cfg: RapConfig = toml::from_str(raw).map_err(|e| QueryError::Config(e.to_string()))?;
        if cfg.model.max_batch_size == 0 {
            return Err(QueryError::Config("model.max_batch_size must be at least 1".to_string()));
        }
        Ok(cfg)
    }

    pub fn device(&self) -> Result<Device> {
        parse_device(&self.model.device)
    }

    /// Family defaults with the `[generation]` overrides applied.
    pub fn generation_config(&self) -> GenerationConfig {
        let mut cfg = GenerationConfig::defaults_for(self.model.resolved_family());
        if let Some(top_p) = self.generation.top_p {
            cfg.top_p = top_p;
        }
        if let Some(seed) = self.generation.seed {
            cfg.seed = seed;
        }
        if let Some(max_tokens) = self.generation.max_response_length {
            cfg.max_tokens = max_tokens;
        }
        cfg
    }

    pub fn load_engine(&self) -> Result<CandleLlama> {
        let device = self.device()?;
        info!(device = %self.model.device, "building candle engine");
        Ok(CandleLlama::load(&self.model, self.generation_config(), device)?)
    }

    pub fn build_query_llama(&self) -> Result<QueryLlama<CandleLlama>> {
        let engine = self.load_engine()?;
        let max_response_length = self.generation_config().max_tokens;
        QueryLlama::new(engine, max_response_length, self.log.file.clone())
    }

    /// Generic transformer adapter over the same engine; `WorldModel` and
    /// `AgentModel` are built this way.
    pub fn build_hf_model(&self) -> Result<QueryHfModel<CandleLlama, TextTokenizer>> {
        let engine = self.load_engine()?;
        Ok(QueryHfModel::from_engine(engine, self.generation_config().max_tokens))
    }
}

pub fn parse_device(spec: &str) -> Result<Device> {
    let spec = spec.trim().to_lowercase();
    let (kind, ordinal) = match spec.split_once(':') {
        Some((kind, idx)) => {
            let ordinal = idx
                .parse::<usize>()
                .map_err(|_| QueryError::Config(format!("invalid device ordinal in '{}'", spec)))?;
            (kind.to_string(), ordinal)
        }
        None => (spec.clone(), 0),
    };

    match kind.as_str() {
        "cpu" => Ok(Device::Cpu),
        "cuda" => Ok(Device::new_cuda(ordinal)?),
        "metal" => Ok(Device::new_metal(ordinal)?),
        other => Err(QueryError::Config(format!("unknown device '{}'", other))),
    }
}
