use std::path::{Path, PathBuf};

use anyhow::{Error as E, Result};
use candle_core::{Device, Tensor};
use tokenizers::Tokenizer;
use tracing::{info, warn};

use crate::backend::{PieceTokenizer, TensorTokenizer};
use crate::prompting::{clean_up_tokenization, PromptFamily};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpecialTokens {
    pub bos: Option<u32>,
    pub eos: u32,
    pub pad: u32,
}

/// `tokenizers::Tokenizer` with the ids both backend contracts need.
#[derive(Clone)]
pub struct TextTokenizer {
    inner: Tokenizer,
    special: SpecialTokens,
}

impl TextTokenizer {
    pub fn new(inner: Tokenizer, family: PromptFamily) -> Result<Self> {
        let special = resolve_special_tokens(&inner, family).map_err(E::msg)?;
        Ok(Self { inner, special })
    }

    pub fn from_file(path: impl AsRef<Path>, family: PromptFamily) -> Result<Self> {
        let inner = Tokenizer::from_file(path.as_ref()).map_err(E::msg)?;
        Self::new(inner, family)
    }

    pub fn special_tokens(&self) -> SpecialTokens {
        self.special
    }
}

impl PieceTokenizer for TextTokenizer {
    fn encode(&self, text: &str, bos: bool, eos: bool) -> Result<Vec<u32>> {
        let encoding = self.inner.encode(text, false).map_err(E::msg)?;
        let mut ids = Vec::with_capacity(encoding.len() + 2);
        if bos {
            if let Some(bos_id) = self.special.bos {
                ids.push(bos_id);
            }
        }
        ids.extend_from_slice(encoding.get_ids());
        if eos {
            ids.push(self.special.eos);
        }
        Ok(ids)
    }

    fn decode(&self, ids: &[u32]) -> Result<String> {
        self.inner.decode(ids, true).map_err(E::msg)
    }

    fn pad_id(&self) -> u32 {
        self.special.pad
    }

    fn eos_id(&self) -> u32 {
        self.special.eos
    }
}

impl TensorTokenizer for TextTokenizer {
    fn encode_tensor(&self, text: &str, device: &Device) -> Result<Tensor> {
        let encoding = self.inner.encode(text, true).map_err(E::msg)?;
        Ok(Tensor::new(encoding.get_ids(), device)?.unsqueeze(0)?)
    }

    fn batch_decode(
        &self,
        sequences: &[Vec<u32>],
        skip_special_tokens: bool,
        clean_up_tokenization_spaces: bool,
    ) -> Result<Vec<String>> {
        let slices: Vec<&[u32]> = sequences.iter().map(Vec::as_slice).collect();
        let decoded = self
            .inner
            .decode_batch(&slices, skip_special_tokens)
            .map_err(E::msg)?;
        if clean_up_tokenization_spaces {
            Ok(decoded.iter().map(|text| clean_up_tokenization(text)).collect())
        } else {
            Ok(decoded)
        }
    }
}

pub(crate) fn resolve_tokenizer_path(model_path: &Path, tokenizer_hint: Option<&Path>) -> Option<PathBuf> {
    if let Some(hint) = tokenizer_hint {
        if hint.exists() {
            return Some(hint.to_path_buf());
        }
    }

    let parent_dir = model_path.parent().unwrap_or(Path::new("."));
    let local_tok_path = parent_dir.join("tokenizer.json");
    if local_tok_path.exists() {
        return Some(local_tok_path);
    }

    let root_tok_path = Path::new("tokenizer.json");
    if root_tok_path.exists() {
        return Some(root_tok_path.to_path_buf());
    }

    let models_tok_path = Path::new("models").join("tokenizer.json");
    if models_tok_path.exists() {
        return Some(models_tok_path);
    }

    None
}

pub(crate) fn fetch_tokenizer_from_hub(repo: &str) -> Result<PathBuf> {
    info!(repo, "tokenizer.json not found locally, fetching from HF hub");
    let api = hf_hub::api::sync::Api::new()?;
    let path = api.model(repo.to_string()).get("tokenizer.json")?;
    Ok(path)
}

pub(crate) fn resolve_special_tokens(
    tokenizer: &Tokenizer,
    family: PromptFamily,
) -> Result<SpecialTokens, String> {
    let (bos, eos) = match family {
        PromptFamily::Llama => {
            let eos = tokenizer
                .token_to_id("<|end_of_text|>")
                .or_else(|| tokenizer.token_to_id("</s>"))
                .ok_or_else(|| {
                    "Tokenizer/model incompatibility: Llama requires <|end_of_text|> or </s>."
                        .to_string()
                })?;
            let bos = tokenizer
                .token_to_id("<|begin_of_text|>")
                .or_else(|| tokenizer.token_to_id("<s>"));
            (bos, eos)
        }
        PromptFamily::Qwen => {
            let eos = tokenizer
                .token_to_id("<|endoftext|>")
                .or_else(|| tokenizer.token_to_id("</s>"))
                .ok_or_else(|| {
                    "Tokenizer/model incompatibility: Qwen requires <|endoftext|> or </s>."
                        .to_string()
                })?;
            // Qwen prompts carry no BOS marker.
            (None, eos)
        }
        PromptFamily::Mistral => {
            let eos = tokenizer
                .token_to_id("</s>")
                .or_else(|| tokenizer.token_to_id("<|end_of_text|>"))
                .ok_or_else(|| {
                    "Tokenizer/model incompatibility: Mistral requires </s> or <|end_of_text|>."
                        .to_string()
                })?;
            (tokenizer.token_to_id("<s>"), eos)
        }
        PromptFamily::Unknown => {
            let eos = tokenizer
                .token_to_id("<|end_of_text|>")
                .or_else(|| tokenizer.token_to_id("</s>"))
                .or_else(|| tokenizer.token_to_id("<|endoftext|>"))
                .unwrap_or(2);
            let bos = tokenizer
                .token_to_id("<s>")
                .or_else(|| tokenizer.token_to_id("<|begin_of_text|>"));
            (bos, eos)
        }
    };

    let pad = tokenizer
        .token_to_id("<pad>")
        .or_else(|| tokenizer.get_padding().map(|p| p.pad_id))
        .or_else(|| tokenizer.token_to_id("<unk>"))
        .unwrap_or_else(|| {
            warn!(eos, "tokenizer has no pad or unk token, padding with EOS");
            eos
        });

    Ok(SpecialTokens { bos, eos, pad })
}
