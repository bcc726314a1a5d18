use anyhow::{Error as E, Result};
use candle_core::Device;
use tracing::info;

use crate::backend::RuntimeModel;
use crate::config::ModelSettings;
use crate::prompting::GenerationConfig;

use super::tokenizer::{fetch_tokenizer_from_hub, resolve_tokenizer_path, TextTokenizer};
use super::CandleLlama;

impl CandleLlama {
    pub fn load(settings: &ModelSettings, generation: GenerationConfig, device: Device) -> Result<Self> {
        let family = settings.resolved_family();
        info!(path = %settings.path.display(), ?family, "loading model weights");

        let model = RuntimeModel::load_from_gguf(&settings.path, family, &device)?;

        let tokenizer_path = match resolve_tokenizer_path(&settings.path, settings.tokenizer.as_deref()) {
            Some(path) => path,
            None => match settings.tokenizer_repo.as_deref() {
                Some(repo) => fetch_tokenizer_from_hub(repo)?,
                None => {
                    return Err(E::msg(
                        "Tokenizer not found for selected model (fail-fast policy).",
                    ))
                }
            },
        };
        info!(path = %tokenizer_path.display(), "using tokenizer");
        let tokenizer = TextTokenizer::from_file(&tokenizer_path, family)?;

        let special = tokenizer.special_tokens();
        info!(
            bos = ?special.bos,
            eos = special.eos,
            pad = special.pad,
            "special tokens identified"
        );

        Ok(Self {
            model,
            tokenizer,
            device,
            generation,
            max_batch_size: settings.max_batch_size,
            sampling_calls: 0,
        })
    }
}
