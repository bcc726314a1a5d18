use std::ops::Range;

use serde::Deserialize;

/// Text used to locate the two next-token ids scored by `query_next_token`.
pub const YES_NO_TARGETS: &str = "Yes No";

pub const DEFAULT_TEMPERATURE: f64 = 0.8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PromptFamily {
    Llama,
    Qwen,
    Mistral,
    Unknown,
}

/// Sampling defaults of the engine, before per-call options are applied.
#[derive(Debug, Clone, Copy)]
pub struct GenerationConfig {
    pub top_p: f64,
    pub seed: u64,
    pub max_tokens: usize,
}

impl GenerationConfig {
    pub fn defaults_for(family: PromptFamily) -> Self {
        match family {
            PromptFamily::Llama => Self {
                top_p: 0.95,
                seed: 299_792_458,
                max_tokens: 256,
            },
            PromptFamily::Qwen => Self {
                top_p: 0.9,
                seed: 299_792_458,
                max_tokens: 256,
            },
            PromptFamily::Mistral => Self {
                top_p: 0.92,
                seed: 299_792_458,
                max_tokens: 256,
            },
            PromptFamily::Unknown => Self {
                top_p: 0.9,
                seed: 299_792_458,
                max_tokens: 256,
            },
        }
    }
}

/// Per-call generation options.
///
/// `QueryHfModel` hands these to its backend untouched; `QueryLlama` reads
/// `eos_token_id`, `num_return_sequences`, `do_sample` and `temperature`.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationOptions {
    pub eos_token_id: Option<u32>,
    pub num_return_sequences: usize,
    pub do_sample: bool,
    pub temperature: f64,
    pub top_p: Option<f64>,
    pub seed: Option<u64>,
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self {
            eos_token_id: None,
            num_return_sequences: 1,
            do_sample: true,
            temperature: DEFAULT_TEMPERATURE,
            top_p: None,
            seed: None,
        }
    }
}

impl GenerationOptions {
    pub fn with_eos_token_id(mut self, eos_token_id: u32) -> Self {
        self.eos_token_id = Some(eos_token_id);
        self
    }

    pub fn with_num_return_sequences(mut self, n: usize) -> Self {
        self.num_return_sequences = n;
        self
    }

    pub fn greedy(mut self) -> Self {
        self.do_sample = false;
        self
    }

    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = temperature;
        self
    }

    /// Greedy decoding whenever sampling is off, whatever `temperature` says.
    pub fn effective_temperature(&self) -> f64 {
        if self.do_sample {
            self.temperature
        } else {
            0.0
        }
    }
}

pub fn infer_family_from_filename(name: &str) -> PromptFamily {
    let lowered = name.to_lowercase();
    if lowered.contains("llama") {
        PromptFamily::Llama
    } else if lowered.contains("qwen") {
        PromptFamily::Qwen
    } else if lowered.contains("mistral") || lowered.contains("mixtral") {
        PromptFamily::Mistral
    } else {
        PromptFamily::Unknown
    }
}

/// Splits `0..total` into consecutive ranges of at most `max_batch_size`.
///
/// Panics if `max_batch_size` is zero; adapters reject that at construction.
pub fn batch_ranges(total: usize, max_batch_size: usize) -> impl Iterator<Item = Range<usize>> {
    (0..total)
        .step_by(max_batch_size)
        .map(move |start| start..(start + max_batch_size).min(total))
}

/// Hugging Face `clean_up_tokenization`: glue punctuation and English
/// contractions back onto the preceding word.
pub fn clean_up_tokenization(text: &str) -> String {
    text.replace(" .", ".")
        .replace(" ?", "?")
        .replace(" !", "!")
        .replace(" ,", ",")
        .replace(" ' ", "'")
        .replace(" n't", "n't")
        .replace(" 'm", "'m")
        .replace(" 's", "'s")
        .replace(" 've", "'ve")
        .replace(" 're", "'re")
}

/// Removes the first occurrence of `prompt` from `result`, wherever it sits.
pub fn strip_prompt(result: &str, prompt: &str) -> String {
    result.replacen(prompt, "", 1)
}
