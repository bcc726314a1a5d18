//! Fixtures shared by the unit tests: a tiny word-level tokenizer and scripted
//! backends that record what the adapters send them.

use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Once;
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{Error as E, Result};
use candle_core::{Device, Tensor};
use tokenizers::Tokenizer;

use crate::backend::{BatchedGenerator, TextGenerationModel};
use crate::engine::TextTokenizer;
use crate::prompting::{GenerationOptions, PromptFamily};

pub(crate) const TOKENIZER_JSON: &str = r#"{
  "version": "1.0",
  "truncation": null,
  "padding": null,
  "added_tokens": [
    {"id": 0, "content": "<unk>", "single_word": false, "lstrip": false, "rstrip": false, "normalized": false, "special": true},
    {"id": 1, "content": "<s>", "single_word": false, "lstrip": false, "rstrip": false, "normalized": false, "special": true},
    {"id": 2, "content": "</s>", "single_word": false, "lstrip": false, "rstrip": false, "normalized": false, "special": true}
  ],
  "normalizer": null,
  "pre_tokenizer": {"type": "Whitespace"},
  "post_processor": null,
  "decoder": null,
  "model": {
    "type": "WordLevel",
    "vocab": {"<unk>": 0, "<s>": 1, "</s>": 2, "Yes": 3, "No": 4, "the": 5, "answer": 6, "is": 7, ".": 8, ",": 9},
    "unk_token": "<unk>"
  }
}"#;

pub(crate) const VOCAB_SIZE: usize = 10;

pub(crate) fn init_tracing() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

pub(crate) fn test_tokenizer() -> TextTokenizer {
    let raw = Tokenizer::from_str(TOKENIZER_JSON).expect("fixture tokenizer");
    TextTokenizer::new(raw, PromptFamily::Llama).expect("fixture special tokens")
}

/// Same vocabulary under the Qwen family: encodes without a BOS marker.
pub(crate) fn qwen_tokenizer() -> TextTokenizer {
    let raw = Tokenizer::from_str(TOKENIZER_JSON).expect("fixture tokenizer");
    TextTokenizer::new(raw, PromptFamily::Qwen).expect("qwen special tokens")
}

/// Same vocabulary, but words are split around every "e", so "Yes No" no
/// longer maps to two ids.
pub(crate) fn split_word_tokenizer() -> TextTokenizer {
    let json = TOKENIZER_JSON.replace(
        r#""pre_tokenizer": {"type": "Whitespace"}"#,
        r#""pre_tokenizer": {"type": "Split", "pattern": {"String": "e"}, "behavior": "Isolated", "invert": false}"#,
    );
    let raw = Tokenizer::from_str(&json).expect("split tokenizer");
    TextTokenizer::new(raw, PromptFamily::Llama).expect("split special tokens")
}

pub(crate) fn mk_temp_dir(prefix: &str) -> PathBuf {
    let ts = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("time ok")
        .as_nanos();
    std::env::temp_dir().join(format!("{}_{}_{}", prefix, std::process::id(), ts))
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct GenerateCall {
    pub batch_len: usize,
    pub max_gen_len: usize,
    pub temperature: f64,
    pub eos_token_id: Option<u32>,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ForwardCall {
    pub tokens: Vec<Vec<u32>>,
    pub start_pos: usize,
}

/// Batched backend answering `"<prompt> #<n>"`, `n` counting every result
/// produced so far.
pub(crate) struct ScriptedBatchBackend {
    tokenizer: TextTokenizer,
    device: Device,
    max_batch_size: usize,
    produced: usize,
    logits: Vec<f32>,
    calls: Vec<GenerateCall>,
    forwards: Vec<ForwardCall>,
}

impl ScriptedBatchBackend {
    pub fn new(max_batch_size: usize) -> Self {
        Self {
            tokenizer: test_tokenizer(),
            device: Device::Cpu,
            max_batch_size,
            produced: 0,
            logits: vec![0.0; VOCAB_SIZE],
            calls: Vec::new(),
            forwards: Vec::new(),
        }
    }

    pub fn use_tokenizer(&mut self, tokenizer: TextTokenizer) {
        self.tokenizer = tokenizer;
    }

    pub fn set_logits(&mut self, values: &[(usize, f32)]) {
        for &(id, value) in values {
            self.logits[id] = value;
        }
    }

    pub fn calls(&self) -> &[GenerateCall] {
        &self.calls
    }

    pub fn forwards(&self) -> &[ForwardCall] {
        &self.forwards
    }
}

impl BatchedGenerator for ScriptedBatchBackend {
    type Tokenizer = TextTokenizer;

    fn tokenizer(&self) -> &TextTokenizer {
        &self.tokenizer
    }

    fn max_batch_size(&self) -> usize {
        self.max_batch_size
    }

    fn device(&self) -> &Device {
        &self.device
    }

    fn generate(
        &mut self,
        prompts: &[String],
        max_gen_len: usize,
        temperature: f64,
        eos_token_id: Option<u32>,
    ) -> Result<Vec<String>> {
        if prompts.len() > self.max_batch_size {
            return Err(E::msg("batch over capacity"));
        }
        self.calls.push(GenerateCall {
            batch_len: prompts.len(),
            max_gen_len,
            temperature,
            eos_token_id,
        });
        let out = prompts
            .iter()
            .enumerate()
            .map(|(i, p)| format!("{} #{}", p, self.produced + i))
            .collect::<Vec<_>>();
        self.produced += prompts.len();
        Ok(out)
    }

    fn forward(&mut self, tokens: &Tensor, start_pos: usize) -> Result<Tensor> {
        self.forwards.push(ForwardCall {
            tokens: tokens.to_vec2::<u32>()?,
            start_pos,
        });
        let batch = tokens.dim(0)?;
        let rows: Vec<f32> = (0..batch).flat_map(|_| self.logits.iter().copied()).collect();
        Ok(Tensor::from_vec(rows, (batch, VOCAB_SIZE), &self.device)?)
    }
}

/// Echoes the input ids back, so the same engine can also serve as a generic backend.
impl TextGenerationModel for ScriptedBatchBackend {
    fn generate(
        &mut self,
        input_ids: &Tensor,
        _max_new_tokens: usize,
        options: &GenerationOptions,
    ) -> Result<Vec<Vec<u32>>> {
        let input = input_ids.get(0)?.to_vec1::<u32>()?;
        Ok(vec![input; options.num_return_sequences])
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct TextGenerateCall {
    pub input_ids: Vec<u32>,
    pub max_new_tokens: usize,
    pub options: GenerationOptions,
}

/// Generic backend appending a fixed continuation to the input ids, once per
/// requested sequence.
pub(crate) struct ScriptedTextModel {
    continuation: Vec<u32>,
    failure: Option<String>,
    calls: Vec<TextGenerateCall>,
}

impl ScriptedTextModel {
    pub fn new(continuation: Vec<u32>) -> Self {
        Self {
            continuation,
            failure: None,
            calls: Vec::new(),
        }
    }

    pub fn fail_with(&mut self, message: &str) {
        self.failure = Some(message.to_string());
    }

    pub fn calls(&self) -> &[TextGenerateCall] {
        &self.calls
    }
}

impl TextGenerationModel for ScriptedTextModel {
    fn generate(
        &mut self,
        input_ids: &Tensor,
        max_new_tokens: usize,
        options: &GenerationOptions,
    ) -> Result<Vec<Vec<u32>>> {
        if let Some(message) = &self.failure {
            return Err(E::msg(message.clone()));
        }
        let input = input_ids.get(0)?.to_vec1::<u32>()?;
        self.calls.push(TextGenerateCall {
            input_ids: input.clone(),
            max_new_tokens,
            options: options.clone(),
        });
        let mut sequence = input;
        sequence.extend_from_slice(&self.continuation);
        Ok(vec![sequence; options.num_return_sequences])
    }
}
