use anyhow::{Error as E, Result};
use candle_core::quantized::gguf_file;
use candle_core::{Device, Tensor};
use candle_transformers::models::quantized_llama;
use candle_transformers::models::quantized_qwen2;

use crate::prompting::{GenerationOptions, PromptFamily};

/// Tokenizer side of a generic transformer backend.
pub trait TensorTokenizer {
    /// Encodes `text` into a `(1, seq)` id tensor placed on `device`.
    fn encode_tensor(&self, text: &str, device: &Device) -> Result<Tensor>;

    fn batch_decode(
        &self,
        sequences: &[Vec<u32>],
        skip_special_tokens: bool,
        clean_up_tokenization_spaces: bool,
    ) -> Result<Vec<String>>;
}

/// Generic transformer backend: ids in, ids out.
pub trait TextGenerationModel {
    /// Returns one id sequence (prompt followed by continuation) per returned sample.
    /// `options` arrive exactly as the caller passed them.
    fn generate(
        &mut self,
        input_ids: &Tensor,
        max_new_tokens: usize,
        options: &GenerationOptions,
    ) -> Result<Vec<Vec<u32>>>;
}

/// Tokenizer side of a batched LLaMA-style backend.
pub trait PieceTokenizer {
    fn encode(&self, text: &str, bos: bool, eos: bool) -> Result<Vec<u32>>;
    fn decode(&self, ids: &[u32]) -> Result<String>;
    fn pad_id(&self) -> u32;
    fn eos_id(&self) -> u32;
}

/// Batched LLaMA-style backend: prompts in, decoded strings out, plus a raw
/// forward pass for next-token logits.
pub trait BatchedGenerator {
    type Tokenizer: PieceTokenizer;

    fn tokenizer(&self) -> &Self::Tokenizer;

    fn max_batch_size(&self) -> usize;

    fn device(&self) -> &Device;

    /// One decoded string per prompt, in prompt order. Each string holds the
    /// prompt text followed by the continuation.
    fn generate(
        &mut self,
        prompts: &[String],
        max_gen_len: usize,
        temperature: f64,
        eos_token_id: Option<u32>,
    ) -> Result<Vec<String>>;

    /// Logits for the last position of each row: `(batch, vocab)`.
    fn forward(&mut self, tokens: &Tensor, start_pos: usize) -> Result<Tensor>;
}

/// Single-sequence logits producer driven by the decode loop.
pub trait LogitsSource {
    /// Last-position logits for `input` placed at `index_pos`, shaped `(1, vocab)`.
    fn next_logits(&mut self, input: &Tensor, index_pos: usize) -> Result<Tensor>;

    /// Positions the weights can address; decoding stops once they are used up.
    fn context_length(&self) -> usize;
}

pub enum RuntimeModel {
    Llama(quantized_llama::ModelWeights),
    Qwen2 {
        weights: quantized_qwen2::ModelWeights,
        context_length: usize,
    },
}

const QWEN2_FALLBACK_CONTEXT: usize = 4096;

impl RuntimeModel {
    pub fn load_from_gguf(path: &std::path::Path, family: PromptFamily, device: &Device) -> Result<Self> {
        let mut file = std::fs::File::open(path)
            .map_err(|e| E::msg(format!("Failed to open model file {}: {}", path.display(), e)))?;
        let content = gguf_file::Content::read(&mut file)?;

        match family {
            // Mistral GGUF exports use the llama architecture tensors.
            PromptFamily::Llama | PromptFamily::Mistral => {
                let model = quantized_llama::ModelWeights::from_gguf(content, &mut file, device)?;
                Ok(Self::Llama(model))
            }
            PromptFamily::Qwen => {
                let context_length = content
                    .metadata
                    .get("qwen2.context_length")
                    .and_then(|v| v.to_u32().ok())
                    .map(|v| v as usize)
                    .unwrap_or(QWEN2_FALLBACK_CONTEXT);
                match quantized_qwen2::ModelWeights::from_gguf(content, &mut file, device) {
                    Ok(weights) => Ok(Self::Qwen2 {
                        weights,
                        context_length,
                    }),
                    Err(e) => {
                        let msg = format!("{}", e);
                        if msg.contains("cannot find tensor info for output_norm.weight") {
                            Err(E::msg(
                                "Qwen load failed: missing 'output_norm.weight'. The GGUF is likely an incomplete split shard. Use a full single-file GGUF.",
                            ))
                        } else {
                            Err(E::msg(msg))
                        }
                    }
                }
            }
            PromptFamily::Unknown => Err(E::msg(
                "Unknown model family: cannot choose runtime backend. Set model.family explicitly.",
            )),
        }
    }

    /// Starting at `position == 0` discards the KV cache of the previous sequence.
    pub fn forward(&mut self, input_tensor: &Tensor, position: usize) -> Result<Tensor> {
        match self {
            Self::Llama(model) => Ok(model.forward(input_tensor, position)?),
            Self::Qwen2 { weights, .. } => Ok(weights.forward(input_tensor, position)?),
        }
    }
}

impl LogitsSource for RuntimeModel {
    fn next_logits(&mut self, input: &Tensor, index_pos: usize) -> Result<Tensor> {
        self.forward(input, index_pos)
    }

    fn context_length(&self) -> usize {
        match self {
            Self::Llama(_) => quantized_llama::MAX_SEQ_LEN,
            Self::Qwen2 { context_length, .. } => *context_length,
        }
    }
}
